pub mod sample {
    use rand::{distributions::Uniform, prelude::Distribution, Rng};

    use crate::{
        error::{CkksError, Result},
        util::he_standard_params::{HE_NOISE_MAX_DEVIATION_FACTOR, HE_NOISE_STANDARD_DEVIATION},
        Modulus,
    };

    /// Normal distribution that resamples anything beyond `max_deviation`
    /// from the mean.
    #[derive(Clone, Copy)]
    pub(crate) struct ClippedNormal {
        normal: rand_distr::Normal<f64>,
        max_deviation: f64,
    }

    impl ClippedNormal {
        pub(crate) fn new(mean: f64, standard_deviation: f64, max_deviation: f64) -> Result<Self> {
            if max_deviation <= 0.0 {
                return Err(CkksError::InvalidParameters("max deviation must be positive".into()));
            }
            let normal = rand_distr::Normal::new(mean, standard_deviation)
                .map_err(|e| CkksError::InvalidParameters(e.to_string()))?;
            Ok(Self { normal, max_deviation })
        }
    }

    impl Distribution<f64> for ClippedNormal {
        fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
            let mean = self.normal.mean();
            loop {
                let sample = self.normal.sample(rng);
                if (sample - mean).abs() <= self.max_deviation {
                    break sample;
                }
            }
        }
    }

    /// Writes the signed small value into every limb of coefficient `i`.
    #[inline]
    fn spread(value: i64, i: usize, degree: usize, moduli: &[Modulus], destination: &mut [u64]) {
        for (j, modulus) in moduli.iter().enumerate() {
            destination[i + j * degree] = if value >= 0 {
                value as u64
            } else {
                modulus.value() - value.unsigned_abs()
            };
        }
    }

    /// Uniform over {-1, 0, 1}.
    pub fn ternary<T: Rng>(rng: &mut T, degree: usize, moduli: &[Modulus], destination: &mut [u64]) {
        let distribution = Uniform::new_inclusive(-1i64, 1);
        for i in 0..degree {
            let sampled = rng.sample(distribution);
            spread(sampled, i, degree, moduli, destination);
        }
    }

    /// Rounded centered normal with standard deviation 3.2, clipped at 6 sigma.
    pub fn clipped_normal<T: Rng>(rng: &mut T, degree: usize, moduli: &[Modulus], destination: &mut [u64]) -> Result<()> {
        let distribution = ClippedNormal::new(
            0.0,
            HE_NOISE_STANDARD_DEVIATION,
            HE_NOISE_STANDARD_DEVIATION * HE_NOISE_MAX_DEVIATION_FACTOR,
        )?;
        for i in 0..degree {
            let sampled = rng.sample(distribution).round() as i64;
            spread(sampled, i, degree, moduli, destination);
        }
        Ok(())
    }

    /// Independent uniform residues in every limb.
    pub fn uniform<T: Rng>(rng: &mut T, degree: usize, moduli: &[Modulus], destination: &mut [u64]) {
        for (limb, modulus) in destination.chunks_exact_mut(degree).zip(moduli.iter()) {
            let distribution = Uniform::new(0, modulus.value());
            limb.iter_mut().for_each(|x| *x = rng.sample(distribution));
        }
    }

}

pub mod encrypt_zero {
    use crate::{
        context::ContextData,
        error::Result,
        polymod,
        util::BlakeRNG,
        Ciphertext,
    };
    use super::sample;

    /**
    Fresh encryption of zero under a public key, in NTT form at the level of
    `context_data`.

    The public key lives at the key level; its first limbs are exactly the
    limbs of any lower level, so only that prefix of each component is used.
    c_j = pk_j * u + e_j with u ternary and e_j clipped normal.
    */
    pub fn asymmetric(
        public_key: &Ciphertext,
        context_data: &ContextData,
        rng: &mut BlakeRNG,
    ) -> Result<Ciphertext> {
        let parms = context_data.parms();
        let coeff_modulus = parms.coeff_modulus();
        let coeff_count = parms.poly_modulus_degree();
        let ntt_tables = context_data.small_ntt_tables();
        let prefix = coeff_count * coeff_modulus.len();

        let mut destination = Ciphertext::from_context_data(context_data, public_key.size());

        let mut u = vec![0; prefix];
        sample::ternary(rng, coeff_count, coeff_modulus, &mut u);
        polymod::ntt_inplace_p(&mut u, coeff_count, ntt_tables);

        let mut e = vec![0; prefix];
        for j in 0..public_key.size() {
            polymod::dyadic_product_p(&u, &public_key.poly(j)[..prefix], coeff_count, coeff_modulus, destination.poly_mut(j));
            sample::clipped_normal(rng, coeff_count, coeff_modulus, &mut e)?;
            polymod::ntt_inplace_p(&mut e, coeff_count, ntt_tables);
            polymod::add_inplace_p(destination.poly_mut(j), &e, coeff_count, coeff_modulus);
        }
        Ok(destination)
    }

    /**
    Fresh encryption of zero under the secret key, in NTT form at the level
    of `context_data`: (-(a*s + e), a) with a uniform. `secret_key` holds the
    key at the key level in NTT form; its prefix is used.
    */
    pub fn symmetric(
        secret_key: &[u64],
        context_data: &ContextData,
        rng: &mut BlakeRNG,
    ) -> Result<Ciphertext> {
        let parms = context_data.parms();
        let coeff_modulus = parms.coeff_modulus();
        let coeff_count = parms.poly_modulus_degree();
        let ntt_tables = context_data.small_ntt_tables();
        let prefix = coeff_count * coeff_modulus.len();

        let mut destination = Ciphertext::from_context_data(context_data, 2);

        // c1 is uniform, so it is sampled directly in NTT form.
        sample::uniform(rng, coeff_count, coeff_modulus, destination.poly_mut(1));

        let mut noise = vec![0; prefix];
        sample::clipped_normal(rng, coeff_count, coeff_modulus, &mut noise)?;
        polymod::ntt_inplace_p(&mut noise, coeff_count, ntt_tables);

        let (c0, c1) = destination.data_mut().split_at_mut(prefix);
        polymod::dyadic_product_p(&secret_key[..prefix], &c1[..prefix], coeff_count, coeff_modulus, c0);
        polymod::add_inplace_p(c0, &noise, coeff_count, coeff_modulus);
        polymod::negate_inplace_p(c0, coeff_count, coeff_modulus);
        Ok(destination)
    }

}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::sample;
    use crate::{util::{BlakeRNG, PRNGSeed}, Modulus};

    fn moduli() -> Vec<Modulus> {
        vec![Modulus::new(97).unwrap(), Modulus::new(193).unwrap()]
    }

    fn signed(value: u64, modulus: &Modulus) -> i64 {
        if value > modulus.value() / 2 {
            value as i64 - modulus.value() as i64
        } else {
            value as i64
        }
    }

    #[test]
    fn test_ternary_is_consistent_across_limbs() {
        let moduli = moduli();
        let mut rng = BlakeRNG::from_seed(PRNGSeed([3; 64]));
        let mut poly = vec![0; 2 * 64];
        sample::ternary(&mut rng, 64, &moduli, &mut poly);
        for i in 0..64 {
            let a = signed(poly[i], &moduli[0]);
            let b = signed(poly[64 + i], &moduli[1]);
            assert_eq!(a, b);
            assert!((-1..=1).contains(&a));
        }
    }

    #[test]
    fn test_clipped_normal_bounds() {
        let moduli = moduli();
        let mut rng = BlakeRNG::from_seed(PRNGSeed([5; 64]));
        let mut poly = vec![0; 2 * 1024];
        sample::clipped_normal(&mut rng, 1024, &moduli, &mut poly).unwrap();
        let values: Vec<i64> = poly[..1024].iter().map(|&x| signed(x, &moduli[0])).collect();
        assert!(values.iter().all(|x| x.abs() <= 20));
        for i in 0..1024 {
            assert_eq!(values[i], signed(poly[1024 + i], &moduli[1]));
        }
        let variance = values.iter().map(|&x| (x * x) as f64).sum::<f64>() / 1024.0;
        assert!(variance > 5.0 && variance < 16.0);
    }

    #[test]
    fn test_uniform_in_range() {
        let moduli = moduli();
        let mut rng = BlakeRNG::from_seed(PRNGSeed([7; 64]));
        let mut poly = vec![0; 2 * 256];
        sample::uniform(&mut rng, 256, &moduli, &mut poly);
        assert!(poly[..256].iter().all(|&x| x < 97));
        assert!(poly[256..].iter().all(|&x| x < 193));
        assert!(poly[256..].iter().any(|&x| x >= 97));
    }
}
