use super::dwthandler::{Arithmetic, DwtHandler};
use crate::{
    error::{CkksError, Result},
    util::{self, MultiplyU64ModOperand},
    Modulus,
};

/// Modular arithmetic that keeps values in [0, 4q) between butterflies.
#[derive(Clone, Copy, Default)]
struct ModArithLazy {
    modulus: Modulus,
    two_times_modulus: u64,
}

impl ModArithLazy {
    fn new(modulus: &Modulus) -> Self {
        ModArithLazy {
            modulus: *modulus,
            two_times_modulus: modulus.value() << 1
        }
    }
}

impl Arithmetic for ModArithLazy {
    type Value = u64;
    type Root = MultiplyU64ModOperand;
    type Scalar = MultiplyU64ModOperand;

    #[inline]
    fn add(&self, a: &u64, b: &u64) -> u64 {
        a + b
    }

    #[inline]
    fn sub(&self, a: &u64, b: &u64) -> u64 {
        a + self.two_times_modulus - b
    }

    #[inline]
    fn mul_root(&self, a: &u64, r: &MultiplyU64ModOperand) -> u64 {
        util::multiply_u64operand_mod_lazy(*a, r, &self.modulus)
    }

    #[inline]
    fn mul_scalar(&self, a: &u64, s: &MultiplyU64ModOperand) -> u64 {
        util::multiply_u64operand_mod_lazy(*a, s, &self.modulus)
    }

    #[inline]
    fn guard(&self, a: &u64) -> u64 {
        if *a >= self.two_times_modulus {*a - self.two_times_modulus} else {*a}
    }
}

/// Precomputed powers of the minimal primitive 2N-th root of unity for one
/// prime, driving the negacyclic NTT over that limb.
#[derive(Clone, Default)]
pub struct NTTTables {
    root: u64,
    coeff_count_power: usize,
    modulus: Modulus,
    inv_degree_modulo: MultiplyU64ModOperand,
    root_powers: Vec<MultiplyU64ModOperand>,
    inv_root_powers: Vec<MultiplyU64ModOperand>,
    handler: DwtHandler<ModArithLazy>,
}

impl NTTTables {

    pub fn new(coeff_count_power: usize, modulus: &Modulus) -> Result<Self> {
        let coeff_count = 1usize << coeff_count_power;
        let modulus = *modulus;
        let root = util::try_minimal_primitive_root(2 * coeff_count as u64, &modulus)
            .ok_or_else(|| CkksError::InvalidParameters(format!(
                "{} has no primitive {}-th root of unity", modulus.value(), 2 * coeff_count
            )))?;
        let inv_root = util::try_invert_u64_mod(root, &modulus)
            .ok_or_else(|| CkksError::InvalidParameters(format!("{} is not invertible", root)))?;
        let inv_degree = util::try_invert_u64_mod(coeff_count as u64 % modulus.value(), &modulus)
            .ok_or_else(|| CkksError::InvalidParameters(format!(
                "degree {} is not invertible modulo {}", coeff_count, modulus.value()
            )))?;

        // Forward powers go to bit-reversed slots.
        let mut root_powers = vec![MultiplyU64ModOperand::new(1, &modulus); coeff_count];
        let mut power = root;
        for i in 1..coeff_count {
            root_powers[util::reverse_bits_usize(i, coeff_count_power)] = MultiplyU64ModOperand::new(power, &modulus);
            power = util::multiply_u64_mod(power, root, &modulus);
        }

        // Inverse powers are scrambled as reverse_bits(i - 1) + 1.
        let mut inv_root_powers = vec![MultiplyU64ModOperand::new(1, &modulus); coeff_count];
        let mut power = inv_root;
        for i in 1..coeff_count {
            inv_root_powers[util::reverse_bits_usize(i - 1, coeff_count_power) + 1] = MultiplyU64ModOperand::new(power, &modulus);
            power = util::multiply_u64_mod(power, inv_root, &modulus);
        }

        Ok(NTTTables {
            root,
            coeff_count_power,
            modulus,
            inv_degree_modulo: MultiplyU64ModOperand::new(inv_degree, &modulus),
            root_powers,
            inv_root_powers,
            handler: DwtHandler::new(ModArithLazy::new(&modulus)),
        })
    }

    pub fn root(&self) -> u64 {self.root}
    pub fn root_powers(&self) -> &[MultiplyU64ModOperand] {&self.root_powers}
    pub fn inv_root_powers(&self) -> &[MultiplyU64ModOperand] {&self.inv_root_powers}
    pub fn modulus(&self) -> &Modulus {&self.modulus}
    pub fn coeff_count_power(&self) -> usize {self.coeff_count_power}
    pub fn coeff_count(&self) -> usize {1 << self.coeff_count_power}

    /// One table per prime, in chain order.
    pub fn create_ntt_tables(coeff_count_power: usize, moduli: &[Modulus]) -> Result<Vec<NTTTables>> {
        if moduli.is_empty() {
            return Err(CkksError::InvalidParameters("no moduli to build NTT tables for".into()));
        }
        moduli.iter().map(|m| Self::new(coeff_count_power, m)).collect()
    }

    /// Output lies in [0, 4q).
    pub fn ntt_negacyclic_harvey_lazy(&self, operand: &mut [u64]) {
        self.handler.transform_to_rev(operand, self.coeff_count_power, &self.root_powers, None);
    }

    pub fn ntt_negacyclic_harvey(&self, operand: &mut [u64]) {
        self.ntt_negacyclic_harvey_lazy(operand);
        let modulus = self.modulus.value();
        let two_times_modulus = modulus << 1;
        operand.iter_mut().for_each(|x| {
            if *x >= two_times_modulus {*x -= two_times_modulus}
            if *x >= modulus {*x -= modulus}
        });
    }

    /// Output lies in [0, 2q). The 1/n factor is folded into the last pass.
    pub fn inverse_ntt_negacyclic_harvey_lazy(&self, operand: &mut [u64]) {
        self.handler.transform_from_rev(operand, self.coeff_count_power, &self.inv_root_powers,
            Some(&self.inv_degree_modulo));
    }

    pub fn inverse_ntt_negacyclic_harvey(&self, operand: &mut [u64]) {
        self.inverse_ntt_negacyclic_harvey_lazy(operand);
        let modulus = self.modulus.value();
        operand.iter_mut().for_each(|x| {
            if *x >= modulus {*x -= modulus}
        });
    }

}

#[cfg(test)]
mod tests {
    use crate::CoeffModulus;

    use super::*;
    use rand::{Rng, SeedableRng};

    fn prime(factor: u64, bits: usize) -> Modulus {
        util::get_primes(factor, bits, 1).unwrap()[0]
    }

    #[test]
    fn test_ntt_basics() {
        let tables = NTTTables::new(1, &prime(4, 60)).unwrap();
        assert_eq!(2, tables.coeff_count());
        assert_eq!(1, tables.coeff_count_power());

        let tables = NTTTables::new(10, &prime(2048, 40)).unwrap();
        assert_eq!(1024, tables.coeff_count());

        let moduli = CoeffModulus::create(1024, &[20, 20, 20, 20, 20]).unwrap();
        let all = NTTTables::create_ntt_tables(10, &moduli).unwrap();
        assert_eq!(all.len(), 5);
        assert!(all.iter().all(|t| t.coeff_count() == 1024));

        // 17 is not 1 mod 2048.
        assert!(NTTTables::new(10, &Modulus::new(17).unwrap()).is_err());
        assert!(NTTTables::create_ntt_tables(10, &[]).is_err());
    }

    #[test]
    fn test_ntt_primitive_roots() {
        let modulus = Modulus::new(0xffffffffffc0001).unwrap();
        let tables = NTTTables::new(1, &modulus).unwrap();
        assert_eq!(1, tables.root_powers()[0].operand);
        assert_eq!(288794978602139552, tables.root_powers()[1].operand);
        let inv = util::try_invert_u64_mod(288794978602139552, &modulus).unwrap();
        assert_eq!(inv, tables.inv_root_powers()[1].operand);

        let tables = NTTTables::new(2, &modulus).unwrap();
        assert_eq!(288794978602139552, tables.root_powers()[1].operand);
        assert_eq!(178930308976060547, tables.root_powers()[2].operand);
        assert_eq!(748001537669050592, tables.root_powers()[3].operand);
    }

    #[test]
    fn test_negacyclic_ntt() {
        let modulus = Modulus::new(0xffffffffffc0001).unwrap();
        let tables = NTTTables::new(1, &modulus).unwrap();

        let mut poly = [0, 0];
        tables.ntt_negacyclic_harvey(&mut poly);
        assert_eq!(poly, [0, 0]);

        let mut poly = [1, 0];
        tables.ntt_negacyclic_harvey(&mut poly);
        assert_eq!(poly, [1, 1]);

        let mut poly = [1, 1];
        tables.ntt_negacyclic_harvey(&mut poly);
        assert_eq!(poly, [288794978602139553, 864126526004445282]);
    }

    #[test]
    fn test_inverse_negacyclic_ntt() {
        const COEFF_COUNT_POWER: usize = 3;
        const N: usize = 1 << COEFF_COUNT_POWER;
        let modulus = Modulus::new(0xffffffffffc0001).unwrap();
        let tables = NTTTables::new(COEFF_COUNT_POWER, &modulus).unwrap();

        let mut poly = [0; N];
        tables.inverse_ntt_negacyclic_harvey(&mut poly);
        assert_eq!(poly, [0; N]);

        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(42);
        for each in &mut poly {
            *each = modulus.reduce(rng.gen());
        }
        let copied = poly;

        tables.ntt_negacyclic_harvey(&mut poly);
        tables.inverse_ntt_negacyclic_harvey(&mut poly);
        assert_eq!(poly, copied);
    }

    #[test]
    fn test_ntt_multiplies_negacyclically() {
        // (1 + x) * x^3 = x^3 + x^4 = -1 + x^3 in Z_q[x]/(x^4 + 1)
        let modulus = prime(8, 40);
        let tables = NTTTables::new(2, &modulus).unwrap();
        let mut a = [1, 1, 0, 0];
        let mut b = [0, 0, 0, 1];
        tables.ntt_negacyclic_harvey(&mut a);
        tables.ntt_negacyclic_harvey(&mut b);
        let mut c: Vec<u64> = a.iter().zip(b.iter()).map(|(&x, &y)| util::multiply_u64_mod(x, y, &modulus)).collect();
        tables.inverse_ntt_negacyclic_harvey(&mut c);
        assert_eq!(c, vec![modulus.value() - 1, 0, 0, 1]);
    }
}
