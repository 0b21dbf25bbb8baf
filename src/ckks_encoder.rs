use std::sync::Arc;

use num_bigint::BigUint;
use num_complex::Complex;
use num_traits::{FromPrimitive, ToPrimitive};
use rayon::prelude::*;
use tracing::warn;

use crate::{
    error::{CkksError, Result},
    polymod,
    util::{self, dwthandler::{Arithmetic, DwtHandler}, GALOIS_GENERATOR},
    HeContext, Plaintext,
};

#[derive(Clone, Copy, Default)]
struct ComplexArith;
type FFTHandler = DwtHandler<ComplexArith>;

impl Arithmetic for ComplexArith {
    type Value = Complex<f64>;
    type Root = Complex<f64>;
    type Scalar = f64;

    #[inline]
    fn add(&self, a: &Self::Value, b: &Self::Value) -> Self::Value {
        a + b
    }

    #[inline]
    fn sub(&self, a: &Self::Value, b: &Self::Value) -> Self::Value {
        a - b
    }

    #[inline]
    fn mul_root(&self, a: &Self::Value, r: &Self::Root) -> Self::Value {
        a * r
    }

    #[inline]
    fn mul_scalar(&self, a: &Self::Value, s: &Self::Scalar) -> Self::Value {
        a * s
    }

    #[inline]
    fn guard(&self, a: &Self::Value) -> Self::Value {
        *a
    }
}

/// The m-th roots of unity, of which only the first eighth is computed.
struct ComplexRoots {
    roots: Vec<Complex<f64>>,
    degree_of_roots: usize,
}

#[inline]
fn mirror(a: Complex<f64>) -> Complex<f64> {
    Complex::new(a.im, a.re)
}

impl ComplexRoots {

    fn new(degree_of_roots: usize) -> Self {
        let roots = (0..=degree_of_roots / 8).map(|i| {
            Complex::from_polar(1.0, 2.0 * std::f64::consts::PI * (i as f64) / (degree_of_roots as f64))
        }).collect();
        Self {
            roots,
            degree_of_roots,
        }
    }

    fn get_root(&self, mut index: usize) -> Complex<f64> {
        index &= self.degree_of_roots - 1;
        let m = self.degree_of_roots;

        // 8-fold symmetry of the m-th roots.
        if index <= m / 8 {
            self.roots[index]
        } else if index <= m / 4 {
            mirror(self.roots[m / 4 - index])
        } else if index < m / 2 {
            -self.get_root(m / 2 - index).conj()
        } else if index <= 3 * m / 4 {
            -self.get_root(index - m / 2)
        } else {
            self.get_root(m - index).conj()
        }
    }

}

/// Provides SIMD encoding and decoding functionality for the [CKKS](crate::SchemeType::CKKS) scheme.
///
/// Converts vectors of up to N/2 real or complex numbers into plaintext
/// polynomials and back. Homomorphic operations on the encrypted polynomials
/// act slot-wise on the vectors.
///
/// ## Mathematical Background
/// If the polynomial modulus is X^N+1, the encoder implements an approximation
/// of the canonical embedding of Z\[X\]/(X^N+1) into C^(N/2). Slot i is the
/// evaluation at the primitive 2N-th root of unity with exponent 5^i mod 2N,
/// and the remaining roots carry the conjugates, so the polynomial has real
/// coefficients. With this ordering the Galois automorphism X -> X^(5^k)
/// rotates the slots cyclically by k, and X -> X^(2N-1) conjugates them.
///
/// ```rust
/// # use ckks_rns::*;
/// let context = HeContext::create_with_security(1024, &[30, 30, 30], SecurityLevel::None).unwrap();
/// let encoder = CKKSEncoder::new(context);
/// let plain = encoder.encode(&[1.5, -2.0], Some(2f64.powi(20)), None).unwrap();
/// let decoded = encoder.decode(&plain).unwrap();
/// assert!((decoded[0] - 1.5).abs() < 1e-3);
/// assert!((decoded[1] + 2.0).abs() < 1e-3);
/// assert!(decoded[2].abs() < 1e-3);
/// ```
pub struct CKKSEncoder {
    context: Arc<HeContext>,
    slots: usize,
    root_powers: Vec<Complex<f64>>,
    inv_root_powers: Vec<Complex<f64>>,
    matrix_reps_index_map: Vec<usize>,
    fft_handler: FFTHandler,
}

impl CKKSEncoder {

    /// Creates a CKKSEncoder initialized with the specified [HeContext].
    pub fn new(context: Arc<HeContext>) -> Self {
        let coeff_count = context.poly_modulus_degree();
        let slots = coeff_count / 2;
        let logn = coeff_count.trailing_zeros() as usize;

        let mut matrix_reps_index_map = vec![0; coeff_count];
        let mut pos = 1;
        let m = coeff_count * 2;
        for i in 0..slots {
            let index1 = (pos - 1) >> 1;
            let index2 = (m - pos - 1) >> 1;
            matrix_reps_index_map[i] = util::reverse_bits_usize(index1, logn);
            matrix_reps_index_map[i | slots] = util::reverse_bits_usize(index2, logn);
            pos = (pos * GALOIS_GENERATOR) & (m - 1);
        }

        // 1~(n-1)-th powers of the primitive 2n-th root
        let complex_roots = ComplexRoots::new(m);
        let mut root_powers = vec![Complex::default(); coeff_count];
        let mut inv_root_powers = vec![Complex::default(); coeff_count];
        for i in 1..coeff_count {
            root_powers[i] = complex_roots.get_root(util::reverse_bits_usize(i, logn));
            inv_root_powers[i] = complex_roots.get_root(util::reverse_bits_usize(i - 1, logn) + 1).conj();
        }

        Self {
            context,
            slots,
            root_powers,
            inv_root_powers,
            matrix_reps_index_map,
            fft_handler: FFTHandler::new(ComplexArith),
        }
    }

    /// Return the number of slots available for batching, N/2.
    pub fn slot_count(&self) -> usize {
        self.slots
    }

    /// Encodes real values into a plaintext. Shorter vectors are padded with
    /// zeros.
    ///
    /// `scale` defaults to the context's global scale and `level` to the top
    /// data level. Fails with [CkksError::VectorTooLong] past N/2 values,
    /// with [CkksError::InvalidState] if no scale is available and with
    /// [CkksError::InvalidParameters] if the scaled values do not fit in the
    /// level's modulus.
    pub fn encode(&self, values: &[f64], scale: Option<f64>, level: Option<usize>) -> Result<Plaintext> {
        let values: Vec<Complex<f64>> = values.iter().map(|&x| Complex::new(x, 0.0)).collect();
        self.encode_complex(&values, scale, level)
    }

    /// Same as [CKKSEncoder::encode], for complex slots.
    pub fn encode_complex(&self, values: &[Complex<f64>], scale: Option<f64>, level: Option<usize>) -> Result<Plaintext> {
        if values.len() > self.slots {
            warn!(len = values.len(), slots = self.slots, "too many values to encode");
            return Err(CkksError::VectorTooLong { len: values.len(), slots: self.slots });
        }
        if values.iter().any(|x| !x.re.is_finite() || !x.im.is_finite()) {
            return Err(CkksError::InvalidParameters("values to encode must be finite".into()));
        }
        let scale = match scale.or_else(|| self.context.global_scale()) {
            Some(scale) => scale,
            None => return Err(CkksError::InvalidState("no scale given and no global scale set".into())),
        };
        let level = level.unwrap_or_else(|| self.context.top_level());
        let context_data = self.context.context_data_at(level)?;
        let coeff_modulus = context_data.parms().coeff_modulus();
        let coeff_modulus_size = coeff_modulus.len();
        let coeff_count = context_data.poly_modulus_degree();
        let total_bits = context_data.total_coeff_modulus_bit_count();

        if !scale.is_finite() || scale <= 0.0 || scale.log2() + 1.0 >= total_bits as f64 {
            return Err(CkksError::InvalidParameters(format!(
                "scale {} is out of bounds for a {}-bit modulus", scale, total_bits
            )));
        }

        let n = self.slots * 2;
        let mut conj_values = vec![Complex::default(); n];
        for (i, value) in values.iter().enumerate() {
            conj_values[self.matrix_reps_index_map[i]] = *value;
            conj_values[self.matrix_reps_index_map[i + self.slots]] = value.conj();
        }

        let fix = scale / (n as f64);
        self.fft_handler.transform_from_rev(&mut conj_values, n.trailing_zeros() as usize, &self.inv_root_powers, Some(&fix));

        let max_coeff = conj_values.iter().map(|x| x.re.abs()).fold(0.0, f64::max);
        // One extra bit for the sign.
        let max_coeff_bit_count = max_coeff.max(1.0).log2().ceil() as usize;
        if max_coeff_bit_count >= total_bits {
            warn!(max_coeff_bit_count, total_bits, "values too large to encode");
            return Err(CkksError::InvalidParameters("values are too large to encode at this scale and level".into()));
        }

        let mut destination = Plaintext::from_context_data(&context_data, scale);
        let destination_data = destination.data_mut();
        if max_coeff_bit_count < 63 {
            for (i, value) in conj_values.iter().enumerate() {
                let coeffd = value.re.round();
                let coeffu = coeffd.abs() as u64;
                for (j, modulus) in coeff_modulus.iter().enumerate() {
                    let reduced = modulus.reduce(coeffu);
                    destination_data[i + j * coeff_count] = if coeffd < 0.0 {
                        util::negate_u64_mod(reduced, modulus)
                    } else {
                        reduced
                    };
                }
            }
        } else {
            let base_q = context_data.rns_tool().base_q();
            for (i, value) in conj_values.iter().enumerate() {
                let coeffd = value.re.round();
                let magnitude = BigUint::from_f64(coeffd.abs()).unwrap_or_default();
                let residues = base_q.decompose(&magnitude);
                for (j, modulus) in coeff_modulus.iter().enumerate() {
                    destination_data[i + j * coeff_count] = if coeffd < 0.0 {
                        util::negate_u64_mod(residues[j], modulus)
                    } else {
                        residues[j]
                    };
                }
            }
        }
        debug_assert_eq!(destination_data.len(), coeff_count * coeff_modulus_size);

        polymod::ntt_inplace_p(destination_data, coeff_count, context_data.small_ntt_tables());
        Ok(destination)
    }

    /// Decodes a plaintext into N/2 real values, the real parts of the slots.
    pub fn decode(&self, plain: &Plaintext) -> Result<Vec<f64>> {
        Ok(self.decode_complex(plain)?.into_iter().map(|x| x.re).collect())
    }

    /// Decodes a plaintext into N/2 complex values.
    ///
    /// Fails with [CkksError::ParameterMismatch] if the plaintext does not
    /// belong to a data level of this encoder's context.
    pub fn decode_complex(&self, plain: &Plaintext) -> Result<Vec<Complex<f64>>> {
        if self.context.level_of(plain.parms_id()).is_none() {
            return Err(CkksError::ParameterMismatch { operand: "plaintext" });
        }
        let context_data = self.context.get_context_data(plain.parms_id())
            .ok_or(CkksError::ParameterMismatch { operand: "plaintext" })?;
        let coeff_modulus_size = context_data.coeff_modulus_size();
        let coeff_count = context_data.poly_modulus_degree();
        if plain.data().len() != coeff_count * coeff_modulus_size {
            return Err(CkksError::ParameterMismatch { operand: "plaintext" });
        }
        if !plain.scale().is_finite() || plain.scale() <= 0.0 {
            return Err(CkksError::InvalidParameters(format!("plaintext scale {} is invalid", plain.scale())));
        }

        let mut plain_copy = plain.data().to_vec();
        polymod::intt_inplace_p(&mut plain_copy, coeff_count, context_data.small_ntt_tables());

        let inv_scale = 1.0 / plain.scale();
        let base_q = context_data.rns_tool().base_q();
        let modulus = context_data.total_coeff_modulus();
        let upper_half_threshold = context_data.upper_half_threshold();
        let mut res = (0..coeff_count).into_par_iter()
            .map(|i| {
                let residues: Vec<u64> = (0..coeff_modulus_size)
                    .map(|j| plain_copy[i + j * coeff_count])
                    .collect();
                let value = base_q.compose(&residues);
                let signed = if &value >= upper_half_threshold {
                    -(modulus - value).to_f64().unwrap_or(f64::INFINITY)
                } else {
                    value.to_f64().unwrap_or(f64::INFINITY)
                };
                Complex::new(signed * inv_scale, 0.0)
            })
            .collect::<Vec<_>>();

        self.fft_handler.transform_to_rev(&mut res, coeff_count.trailing_zeros() as usize, &self.root_powers, None);
        Ok((0..self.slots).map(|i| res[self.matrix_reps_index_map[i]]).collect())
    }

}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::SecurityLevel;

    fn context() -> Arc<HeContext> {
        HeContext::create_with_security(1024, &[30, 30, 30], SecurityLevel::None).unwrap()
    }

    #[test]
    fn test_real_round_trip() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let encoder = CKKSEncoder::new(context());
        assert_eq!(encoder.slot_count(), 512);
        let values: Vec<f64> = (0..512).map(|_| rng.gen_range(-10.0..10.0)).collect();
        let plain = encoder.encode(&values, Some(2f64.powi(25)), None).unwrap();
        assert_eq!(plain.level(), 1);
        assert_eq!(plain.coeff_modulus_size(), 2);
        let decoded = encoder.decode(&plain).unwrap();
        for (a, b) in decoded.iter().zip(values.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_complex_round_trip_with_padding() {
        let encoder = CKKSEncoder::new(context());
        let values = vec![Complex::new(1.0, -2.0), Complex::new(0.5, 3.25), Complex::new(-4.0, 0.0)];
        let plain = encoder.encode_complex(&values, Some(2f64.powi(25)), Some(0)).unwrap();
        assert_eq!(plain.level(), 0);
        let decoded = encoder.decode_complex(&plain).unwrap();
        assert_eq!(decoded.len(), 512);
        for (a, b) in decoded.iter().zip(values.iter()) {
            assert_abs_diff_eq!(a.re, b.re, epsilon = 1e-3);
            assert_abs_diff_eq!(a.im, b.im, epsilon = 1e-3);
        }
        assert!(decoded[3..].iter().all(|x| x.norm() < 1e-3));
    }

    #[test]
    fn test_wide_coefficients() {
        let context = HeContext::create_with_security(4096, &[40, 40, 40, 40], SecurityLevel::None).unwrap();
        let encoder = CKKSEncoder::new(context);
        let values = vec![1.0e6, -5.0e5, 3.0];
        // Coefficients reach about 2^70, past a single machine word.
        let plain = encoder.encode(&values, Some(2f64.powi(60)), None).unwrap();
        let decoded = encoder.decode(&plain).unwrap();
        for (a, b) in decoded.iter().zip(values.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_scale_resolution() {
        let context = context();
        let encoder = CKKSEncoder::new(context.clone());
        assert!(matches!(encoder.encode(&[1.0], None, None), Err(CkksError::InvalidState(_))));
        context.set_global_scale(2f64.powi(20)).unwrap();
        let plain = encoder.encode(&[1.0], None, None).unwrap();
        assert_eq!(plain.scale(), 2f64.powi(20));
        assert!(matches!(encoder.encode(&[1.0], Some(-1.0), None), Err(CkksError::InvalidParameters(_))));
    }

    #[test]
    fn test_encode_rejects() {
        let context = context();
        let encoder = CKKSEncoder::new(context.clone());
        let too_long = vec![0.0; 513];
        assert_eq!(
            encoder.encode(&too_long, Some(1024.0), None),
            Err(CkksError::VectorTooLong { len: 513, slots: 512 })
        );
        assert!(matches!(encoder.encode(&[1e30], Some(2f64.powi(20)), None), Err(CkksError::InvalidParameters(_))));
        assert!(matches!(encoder.encode(&[f64::NAN], Some(2f64.powi(20)), None), Err(CkksError::InvalidParameters(_))));
        assert!(matches!(encoder.encode(&[1.0], Some(2f64.powi(20)), Some(2)), Err(CkksError::InvalidParameters(_))));

        let other = HeContext::create_with_security(1024, &[30, 30, 31], SecurityLevel::None).unwrap();
        let foreign = CKKSEncoder::new(other).encode(&[1.0], Some(2f64.powi(20)), None).unwrap();
        assert_eq!(encoder.decode(&foreign), Err(CkksError::ParameterMismatch { operand: "plaintext" }));
    }
}
