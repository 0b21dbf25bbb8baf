pub const HE_MOD_BIT_COUNT_MAX: usize = 61;

pub const HE_POLY_MOD_DEGREE_MIN: usize = 2;
pub const HE_POLY_MOD_DEGREE_MAX: usize = 32768;

/// Smallest ring degree a [crate::HeContext] accepts.
pub const HE_CONTEXT_DEGREE_MIN: usize = 1024;

pub const HE_COEFF_MOD_COUNT_MIN: usize = 1;
pub const HE_COEFF_MOD_COUNT_MAX: usize = 64;

pub const HE_USER_MOD_BIT_COUNT_MIN: usize = 2;
pub const HE_USER_MOD_BIT_COUNT_MAX: usize = 60;

/// A fresh ciphertext has two polynomials, a product before relinearization three.
pub const HE_CIPHERTEXT_SIZE_MIN: usize = 2;
pub const HE_CIPHERTEXT_SIZE_MAX: usize = 3;

pub const HE_PRNG_SEED_BYTES: usize = 64;

/// Relative tolerance under which two scales count as equal.
pub const HE_SCALE_RELATIVE_TOLERANCE: f64 = 1e-9;

/// Relative distance under which an automatic rescale restores the first
/// operand's scale exactly.
pub const HE_RESCALE_SNAP_TOLERANCE: f64 = 1e-3;

#[inline]
pub fn get_significant_bit_count(value: u64) -> usize {
    if value == 0 {0}
    else {64 - value.leading_zeros() as usize}
}

/// Exponent of `value` if it is a power of two.
#[inline]
pub fn get_power_of_two(value: u64) -> Option<usize> {
    if value == 0 || (value & (value - 1)) != 0 {None}
    else {Some(63 - value.leading_zeros() as usize)}
}

#[inline]
pub fn reverse_bits_u64(operand: u64, bit_count: usize) -> u64 {
    if bit_count == 0 {
        0
    } else {
        operand.reverse_bits() >> (64 - bit_count)
    }
}

#[inline]
pub fn reverse_bits_usize(operand: usize, bit_count: usize) -> usize {
    reverse_bits_u64(operand as u64, bit_count) as usize
}

pub fn are_close_f64(value1: f64, value2: f64) -> bool {
    let scale_factor = value1.abs().max(value2.abs()).max(1.0);
    (value1 - value2).abs() <= HE_SCALE_RELATIVE_TOLERANCE * scale_factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_of_two() {
        assert_eq!(get_power_of_two(0), None);
        assert_eq!(get_power_of_two(1), Some(0));
        assert_eq!(get_power_of_two(8192), Some(13));
        assert_eq!(get_power_of_two(8191), None);
        assert_eq!(get_power_of_two(1 << 63), Some(63));
    }

    #[test]
    fn test_reverse_bits() {
        assert_eq!(reverse_bits_u64(0, 0), 0);
        assert_eq!(reverse_bits_u64(1, 3), 4);
        assert_eq!(reverse_bits_u64(6, 3), 3);
        assert_eq!(reverse_bits_usize(0b0001, 4), 0b1000);
        assert_eq!(reverse_bits_u64(0xFFFF_FFFF_0000_0000, 64), 0x0000_0000_FFFF_FFFF);
    }

    #[test]
    fn test_are_close() {
        let s = (1u64 << 40) as f64;
        assert!(are_close_f64(s, s));
        assert!(are_close_f64(s, s * (1.0 + 1e-12)));
        assert!(!are_close_f64(s, s * (1.0 + 1e-6)));
        assert!(are_close_f64(0.0, 1e-12));
    }
}
