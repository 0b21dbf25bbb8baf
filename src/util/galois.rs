use std::sync::OnceLock;

use crate::{
    error::{CkksError, Result},
    util, Modulus,
};

/// Generator of the rotation subgroup of (Z/2NZ)*.
pub(crate) const GALOIS_GENERATOR: usize = 5;

/// Maps rotation steps to Galois elements and applies the automorphisms
/// X -> X^elt to RNS polynomials.
pub struct GaloisTool {
    coeff_count_power: usize,
    coeff_count: usize,
    permutation_tables: Vec<OnceLock<Vec<usize>>>,
}

impl GaloisTool {

    pub fn new(coeff_count_power: usize) -> Self {
        let coeff_count = 1 << coeff_count_power;
        GaloisTool {
            coeff_count_power,
            coeff_count,
            permutation_tables: (0..coeff_count).map(|_| OnceLock::new()).collect(),
        }
    }

    /// Largest rotation step, in absolute value, that a key can be made for.
    pub fn max_step(&self) -> usize {
        (self.coeff_count >> 1) - 1
    }

    /// Element for the complex conjugation of the slots.
    pub fn conjugation_elt(&self) -> usize {
        (self.coeff_count << 1) - 1
    }

    /**
    Galois element `5^step mod 2N` for a rotation step. Positive steps rotate
    the slot vector left, negative steps rotate it right, and step 0 is the
    identity element 1.
    */
    pub fn get_elt_from_step(&self, step: i64) -> Result<usize> {
        let slots = self.coeff_count >> 1;
        let max = self.max_step();
        if step.unsigned_abs() as usize > max {
            return Err(CkksError::InvalidRotation { step, max });
        }
        let m_minus_one = (self.coeff_count << 1) - 1;
        let exponent = if step < 0 {slots - step.unsigned_abs() as usize} else {step as usize};
        let mut galois_elt = 1;
        for _ in 0..exponent {
            galois_elt = (galois_elt * GALOIS_GENERATOR) & m_minus_one;
        }
        Ok(galois_elt)
    }

    pub fn get_elts_from_steps(&self, steps: &[i64]) -> Result<Vec<usize>> {
        steps.iter().map(|&x| self.get_elt_from_step(x)).collect()
    }

    /// Whether `galois_elt` is a valid automorphism index for this ring.
    pub fn is_valid_elt(&self, galois_elt: usize) -> bool {
        galois_elt & 1 == 1 && galois_elt < (self.coeff_count << 1)
    }

    /// Position of a Galois element's table, (elt - 1) / 2.
    pub fn get_index_from_elt(galois_elt: usize) -> usize {
        (galois_elt - 1) >> 1
    }

    fn generate_table_ntt(&self, galois_elt: usize) -> Vec<usize> {
        let coeff_count = self.coeff_count;
        let mask = coeff_count - 1;
        (coeff_count..coeff_count << 1)
            .map(|i| {
                let reversed = util::reverse_bits_usize(i, self.coeff_count_power + 1);
                let index_raw = ((galois_elt * reversed) >> 1) & mask;
                util::reverse_bits_usize(index_raw, self.coeff_count_power)
            })
            .collect()
    }

    fn table_ntt(&self, galois_elt: usize) -> &[usize] {
        self.permutation_tables[Self::get_index_from_elt(galois_elt)]
            .get_or_init(|| self.generate_table_ntt(galois_elt))
    }

    /// Applies X -> X^elt to one limb in coefficient form; coefficients that
    /// wrap past X^N change sign.
    pub fn apply(&self, operand: &[u64], galois_elt: usize, modulus: &Modulus, result: &mut [u64]) {
        let mask = self.coeff_count - 1;
        let mut index_raw = 0;
        for &value in operand.iter().take(self.coeff_count) {
            let index = index_raw & mask;
            result[index] = if (index_raw >> self.coeff_count_power) & 1 == 1 {
                util::negate_u64_mod(value, modulus)
            } else {
                value
            };
            index_raw += galois_elt;
        }
    }

    /// Applies X -> X^elt to one limb in NTT form, which is a permutation.
    pub fn apply_ntt(&self, operand: &[u64], galois_elt: usize, result: &mut [u64]) {
        let table = self.table_ntt(galois_elt);
        result.iter_mut().zip(table.iter()).for_each(|(r, &t)| *r = operand[t]);
    }

    /// [GaloisTool::apply_ntt] over every limb of an RNS polynomial.
    pub fn apply_ntt_p(&self, poly: &[u64], galois_elt: usize, result: &mut [u64]) {
        let table = self.table_ntt(galois_elt);
        for (src, dst) in poly.chunks_exact(self.coeff_count).zip(result.chunks_exact_mut(self.coeff_count)) {
            dst.iter_mut().zip(table.iter()).for_each(|(r, &t)| *r = src[t]);
        }
    }

}
