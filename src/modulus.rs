use std::cmp::Ordering;
use std::collections::HashMap;

use crate::{
    error::{CkksError, Result},
    util,
    SecurityLevel,
};

/// Represent an integer modulus of up to 61 bits.
///
/// The primes of the modulus chain are instances of Modulus. Besides the
/// value, it stores the precomputation required by Barrett reduction.
#[derive(Debug, Eq, Clone, Copy, Default)]
pub struct Modulus {
    value: u64,
    const_ratio: [u64; 3],
    bit_count: usize,
    is_prime: bool,
}

impl Ord for Modulus {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl PartialOrd for Modulus {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Modulus {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl std::hash::Hash for Modulus {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl Modulus {

    /// Create a new Modulus. Zero gives the empty modulus; one and values
    /// above 61 bits are rejected.
    pub fn new(value: u64) -> Result<Self> {
        if value == 0 {
            return Ok(Self::default());
        }
        if value == 1 || value >> util::HE_MOD_BIT_COUNT_MAX != 0 {
            return Err(CkksError::InvalidParameters(format!(
                "modulus {} must be between 2 and {} bits", value, util::HE_MOD_BIT_COUNT_MAX
            )));
        }
        // floor(2^128 / value) and the remainder, without a 129-bit numerator.
        let mut ratio = u128::MAX / value as u128;
        let mut remainder = (u128::MAX % value as u128) as u64 + 1;
        if remainder == value {
            ratio += 1;
            remainder = 0;
        }
        let mut ret = Modulus {
            value,
            const_ratio: [ratio as u64, (ratio >> 64) as u64, remainder],
            bit_count: util::get_significant_bit_count(value),
            is_prime: false,
        };
        ret.is_prime = util::is_prime(&ret);
        Ok(ret)
    }

    /// Barrett reduction of a word.
    #[inline]
    pub fn reduce(&self, value: u64) -> u64 {
        util::barrett_reduce_u64(value, self)
    }

    /// Barrett reduction of a double word.
    #[inline]
    pub fn reduce_u128(&self, value: u128) -> u64 {
        util::barrett_reduce_u128(value, self)
    }

    /// floor(2^128 / value) as two words, then the remainder.
    pub fn const_ratio(&self) -> &[u64; 3] {&self.const_ratio}
    pub fn value(&self) -> u64 {self.value}
    pub fn is_prime(&self) -> bool {self.is_prime}
    pub fn is_zero(&self) -> bool {self.value == 0}
    pub fn bit_count(&self) -> usize {self.bit_count}

}

impl std::fmt::Display for Modulus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Modulus ({})", self.value)
    }
}

/// Static helpers for building a modulus chain.
pub struct CoeffModulus;

impl CoeffModulus {

    /// Largest bit-length of the product of all primes (data primes and the
    /// special prime) that keeps the given security level at this degree.
    /// Zero for a degree outside the HomomorphicEncryption.org table.
    pub fn max_bit_count(poly_modulus_degree: usize, sec_level: SecurityLevel) -> usize {
        util::he_standard_params::max_coeff_bit_count(poly_modulus_degree, sec_level).unwrap_or(0)
    }

    /// Distinct primes with the requested bit-lengths, each congruent to
    /// 1 modulo 2 * poly_modulus_degree so that every limb supports a
    /// negacyclic NTT. Equal inputs always give the same primes.
    pub fn create(poly_modulus_degree: usize, bit_sizes: &[usize]) -> Result<Vec<Modulus>> {
        if !(util::HE_POLY_MOD_DEGREE_MIN..=util::HE_POLY_MOD_DEGREE_MAX).contains(&poly_modulus_degree) ||
            util::get_power_of_two(poly_modulus_degree as u64).is_none()
        {
            return Err(CkksError::InvalidParameters(format!(
                "poly modulus degree {} is not a supported power of two", poly_modulus_degree
            )));
        }
        if !(util::HE_COEFF_MOD_COUNT_MIN..=util::HE_COEFF_MOD_COUNT_MAX).contains(&bit_sizes.len()) {
            return Err(CkksError::InvalidParameters(format!(
                "{} moduli requested, supported range is {}..={}",
                bit_sizes.len(), util::HE_COEFF_MOD_COUNT_MIN, util::HE_COEFF_MOD_COUNT_MAX
            )));
        }
        if let Some(bad) = bit_sizes.iter()
            .find(|&&b| !(util::HE_USER_MOD_BIT_COUNT_MIN..=util::HE_USER_MOD_BIT_COUNT_MAX).contains(&b))
        {
            return Err(CkksError::InvalidParameters(format!(
                "modulus bit size {} is outside {}..={}",
                bad, util::HE_USER_MOD_BIT_COUNT_MIN, util::HE_USER_MOD_BIT_COUNT_MAX
            )));
        }
        let mut count_table: HashMap<usize, usize> = HashMap::new();
        for &size in bit_sizes {
            *count_table.entry(size).or_default() += 1;
        }
        let factor = 2 * poly_modulus_degree as u64;
        let mut prime_table = HashMap::new();
        for (size, count) in count_table {
            prime_table.insert(size, util::get_primes(factor, size, count)?);
        }
        let mut result = Vec::with_capacity(bit_sizes.len());
        for size in bit_sizes {
            // Each bucket holds exactly as many primes as sizes requested.
            if let Some(prime) = prime_table.get_mut(size).and_then(Vec::pop) {
                result.push(prime);
            }
        }
        Ok(result)
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_modulus() {
        let closure =
        |modulus: u64, bit_count: usize, const_ratio: [u64; 3], is_prime: bool| {
            let m = Modulus::new(modulus).unwrap();
            assert_eq!(m.value(), modulus);
            assert_eq!(m.bit_count(), bit_count);
            assert_eq!(m.const_ratio(), &const_ratio);
            assert_eq!(m.is_prime(), is_prime);
        };
        closure(0, 0, [0, 0, 0], false);
        closure(2, 2, [0, 1 << 63, 0], true);
        closure(3, 2, [6148914691236517205, 6148914691236517205, 1], true);
        closure(0xF00000F00000F, 52, [1224979098644774929, 4369, 281470698520321], false);
        closure(0xF00000F000079, 52, [1224979096621368355, 4369, 1144844808538997], true);

        assert!(matches!(Modulus::new(1), Err(CkksError::InvalidParameters(_))));
        assert!(matches!(Modulus::new(1 << 62), Err(CkksError::InvalidParameters(_))));
    }

    #[test]
    fn test_compare_modulus() {
        let sm0 = Modulus::default();
        let sm2 = Modulus::new(2).unwrap();
        let sm5 = Modulus::new(5).unwrap();
        assert!(sm0 == sm0);
        assert!(sm5 >= sm5);
        assert!(sm5 != sm2);
        assert!(sm5 > sm2);
        assert!(sm0 < sm2);
    }

    #[test]
    fn test_custom() {
        let cm = CoeffModulus::create(2, &[3]).unwrap();
        assert_eq!(1, cm.len());
        assert_eq!(5, cm[0].value());

        let cm = CoeffModulus::create(2, &[3, 4]).unwrap();
        assert_eq!(5, cm[0].value());
        assert_eq!(13, cm[1].value());

        let cm = CoeffModulus::create(2, &[3, 5, 4, 5]).unwrap();
        assert_eq!(4, cm.len());
        assert_eq!(5, cm[0].value());
        assert_eq!(17, cm[1].value());
        assert_eq!(13, cm[2].value());
        assert_eq!(29, cm[3].value());

        let cm = CoeffModulus::create(32, &[30, 40, 30, 30, 40]).unwrap();
        assert_eq!(5, cm.len());
        for (m, bits) in cm.iter().zip([30, 40, 30, 30, 40]) {
            assert_eq!(bits, m.bit_count());
            assert_eq!(1, m.value() % 64);
        }
        assert_eq!(cm, CoeffModulus::create(32, &[30, 40, 30, 30, 40]).unwrap());
    }

    #[test]
    fn test_create_rejects() {
        assert!(CoeffModulus::create(1000, &[40]).is_err());
        assert!(CoeffModulus::create(1024, &[]).is_err());
        assert!(CoeffModulus::create(1024, &[61]).is_err());
        assert!(CoeffModulus::create(1024, &[1]).is_err());
    }

    #[test]
    fn test_max_bit_count() {
        assert_eq!(CoeffModulus::max_bit_count(8192, SecurityLevel::Tc128), 218);
        assert_eq!(CoeffModulus::max_bit_count(4096, SecurityLevel::Tc192), 75);
        assert_eq!(CoeffModulus::max_bit_count(100, SecurityLevel::Tc128), 0);
    }
}
