use num_bigint::BigUint;

use crate::{
    error::{CkksError, Result},
    util::{self, MultiplyU64ModOperand, NTTTables},
    Modulus,
};

/// A set of pairwise coprime word-sized moduli together with the constants
/// needed to move between a big integer and its residues.
#[derive(Clone, Debug)]
pub struct RNSBase {
    base: Vec<Modulus>,
    base_prod: BigUint,
    punctured_prod: Vec<BigUint>,
    inv_punctured_prod_mod_base: Vec<MultiplyU64ModOperand>,
}

impl RNSBase {

    pub fn new(rnsbase: &[Modulus]) -> Result<Self> {
        if rnsbase.is_empty() {
            return Err(CkksError::InvalidParameters("RNS base cannot be empty".into()));
        }
        for (i, modulus) in rnsbase.iter().enumerate() {
            if modulus.is_zero() {
                return Err(CkksError::InvalidParameters("RNS base modulus cannot be zero".into()));
            }
            if rnsbase[..i].iter().any(|other| !util::are_coprime(other.value(), modulus.value())) {
                return Err(CkksError::InvalidParameters("RNS base moduli must be pairwise coprime".into()));
            }
        }

        let base_prod = rnsbase.iter().fold(BigUint::from(1u64), |acc, m| acc * m.value());
        let mut punctured_prod = Vec::with_capacity(rnsbase.len());
        let mut inv_punctured_prod_mod_base = Vec::with_capacity(rnsbase.len());
        for modulus in rnsbase {
            let punctured = &base_prod / modulus.value();
            let residue = (&punctured % modulus.value()).iter_u64_digits().next().unwrap_or(0);
            let inv = util::try_invert_u64_mod(residue, modulus)
                .ok_or_else(|| CkksError::InvalidParameters("RNS base product is not invertible".into()))?;
            inv_punctured_prod_mod_base.push(MultiplyU64ModOperand::new(inv, modulus));
            punctured_prod.push(punctured);
        }

        Ok(RNSBase {
            base: rnsbase.to_vec(),
            base_prod,
            punctured_prod,
            inv_punctured_prod_mod_base,
        })
    }

    pub fn len(&self) -> usize {self.base.len()}
    pub fn is_empty(&self) -> bool {self.base.is_empty()}
    pub fn base(&self) -> &[Modulus] {&self.base}
    pub fn base_at(&self, index: usize) -> &Modulus {&self.base[index]}
    pub fn base_prod(&self) -> &BigUint {&self.base_prod}
    pub fn punctured_prod(&self) -> &[BigUint] {&self.punctured_prod}

    pub fn contains(&self, modulus: &Modulus) -> bool {
        self.base.iter().any(|x| x == modulus)
    }

    /// Residues of `value` modulo each prime of the base.
    pub fn decompose(&self, value: &BigUint) -> Vec<u64> {
        self.base.iter()
            .map(|m| (value % m.value()).iter_u64_digits().next().unwrap_or(0))
            .collect()
    }

    /// The unique integer in [0, Q) with the given residues.
    pub fn compose(&self, residues: &[u64]) -> BigUint {
        debug_assert_eq!(residues.len(), self.base.len());
        let sum = residues.iter()
            .zip(self.base.iter())
            .zip(self.inv_punctured_prod_mod_base.iter().zip(self.punctured_prod.iter()))
            .fold(BigUint::default(), |acc, ((&r, m), (inv, punctured))| {
                acc + punctured * util::multiply_u64operand_mod(r, inv, m)
            });
        sum % &self.base_prod
    }

}

impl std::ops::Index<usize> for RNSBase {
    type Output = Modulus;
    fn index(&self, index: usize) -> &Self::Output {
        &self.base[index]
    }
}

/// Division by the last prime of a base, used to drop one limb while
/// dividing the represented value by that prime.
#[derive(Clone, Debug)]
pub struct RNSTool {
    coeff_count: usize,
    base_q: RNSBase,
    inv_q_last_mod_q: Vec<MultiplyU64ModOperand>,
}

impl RNSTool {

    pub fn new(poly_modulus_degree: usize, q: &RNSBase) -> Result<Self> {
        if q.len() < util::HE_COEFF_MOD_COUNT_MIN || q.len() > util::HE_COEFF_MOD_COUNT_MAX {
            return Err(CkksError::InvalidParameters(format!("RNS base of {} primes is out of range", q.len())));
        }
        if util::get_power_of_two(poly_modulus_degree as u64).is_none() {
            return Err(CkksError::InvalidParameters(format!("degree {} is not a power of two", poly_modulus_degree)));
        }
        let last = q.base_at(q.len() - 1);
        let inv_q_last_mod_q = q.base()[..q.len() - 1].iter()
            .map(|m| {
                util::try_invert_u64_mod(m.reduce(last.value()), m)
                    .map(|inv| MultiplyU64ModOperand::new(inv, m))
                    .ok_or_else(|| CkksError::InvalidParameters(format!(
                        "{} is not invertible modulo {}", last.value(), m.value()
                    )))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(RNSTool {
            coeff_count: poly_modulus_degree,
            base_q: q.clone(),
            inv_q_last_mod_q,
        })
    }

    pub fn base_q(&self) -> &RNSBase {&self.base_q}

    /// `q_last^{-1} mod q_i` for every prime but the last.
    pub fn inv_q_last_mod_q(&self) -> &[MultiplyU64ModOperand] {&self.inv_q_last_mod_q}

    /**
    Replaces the value held by an NTT-form polynomial over the whole base with
    round(value / q_last) over all primes but the last. The last limb is left
    holding garbage; callers truncate it.
    */
    pub fn divide_and_round_q_last_ntt_inplace(&self, input: &mut [u64], rns_ntt_tables: &[NTTTables]) {
        let base_q_size = self.base_q.len();
        let coeff_count = self.coeff_count;
        let last_modulus = self.base_q.base_at(base_q_size - 1);
        let (front, last) = input.split_at_mut((base_q_size - 1) * coeff_count);
        let last = &mut last[..coeff_count];

        rns_ntt_tables[base_q_size - 1].inverse_ntt_negacyclic_harvey(last);
        // Flooring becomes rounding once half of q_last is added.
        let half = last_modulus.value() >> 1;
        last.iter_mut().for_each(|x| *x = util::add_u64_mod(*x, half, last_modulus));

        let mut temp = vec![0; coeff_count];
        for (i, limb) in front.chunks_exact_mut(coeff_count).enumerate() {
            let modulus = self.base_q.base_at(i);
            if modulus.value() < last_modulus.value() {
                temp.iter_mut().zip(last.iter()).for_each(|(t, &x)| *t = modulus.reduce(x));
            } else {
                temp.copy_from_slice(last);
            }
            let neg_half_mod = modulus.value() - modulus.reduce(half);
            temp.iter_mut().for_each(|t| *t += neg_half_mod);
            rns_ntt_tables[i].ntt_negacyclic_harvey_lazy(&mut temp);
            // temp is in [0, 4q) here, so this stays below 9q < 2^64.
            let q_lazy = modulus.value() << 2;
            limb.iter_mut().zip(temp.iter()).for_each(|(x, &t)| *x += q_lazy - t);
            limb.iter_mut().for_each(|x| {
                *x = util::multiply_u64operand_mod(*x, &self.inv_q_last_mod_q[i], modulus)
            });
        }
    }

}
