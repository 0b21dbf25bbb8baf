use crate::error::{CkksError, Result};
use crate::modulus::Modulus;
use crate::util;

/// Miller-Rabin witnesses that make the test exact for every 64-bit input.
const MILLER_RABIN_WITNESSES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

pub fn gcd(x: u64, y: u64) -> u64 {
    if x < y {
        gcd(y, x)
    } else if y == 0 {
        x
    } else {
        let f = x % y;
        if f == 0 { y } else { gcd(y, f) }
    }
}

/** Extended GCD:
Returns (gcd, a, b) such that gcd = x * a + y * b.
*/
pub fn xgcd(mut x: u64, mut y: u64) -> (u64, i128, i128) {
    let (mut prev_a, mut a) = (1i128, 0i128);
    let (mut prev_b, mut b) = (0i128, 1i128);
    while y != 0 {
        let q = (x / y) as i128;
        let r = x % y;
        x = y;
        y = r;
        (prev_a, a) = (a, prev_a - q * a);
        (prev_b, b) = (b, prev_b - q * b);
    }
    (x, prev_a, prev_b)
}

pub fn are_coprime(x: u64, y: u64) -> bool {
    gcd(x, y) <= 1
}

pub fn try_invert_u64_mod_u64(value: u64, modulus: u64) -> Option<u64> {
    if value == 0 {return None;}
    let (cd, a, _) = xgcd(value, modulus);
    if cd != 1 {
        None
    } else {
        Some(a.rem_euclid(modulus as i128) as u64)
    }
}

pub fn is_prime(modulus: &Modulus) -> bool {
    let value = modulus.value();
    if value < 2 {return false;}
    for &p in &MILLER_RABIN_WITNESSES {
        if value == p {return true;}
        if value % p == 0 {return false;}
    }
    // value - 1 = 2^r * d with d odd
    let mut d = value - 1;
    let mut r = 0;
    while (d & 1) == 0 {d >>= 1; r += 1;}
    'witness: for &a in &MILLER_RABIN_WITNESSES {
        let mut x = util::exponentiate_u64_mod(a, d, modulus);
        if x == 1 || x == value - 1 {continue;}
        for _ in 1..r {
            x = util::multiply_u64_mod(x, x, modulus);
            if x == value - 1 {continue 'witness;}
        }
        return false;
    }
    true
}

/**
Collects `count` primes of exactly `bit_size` bits that are congruent to 1
modulo `factor`, largest first.
*/
pub fn get_primes(factor: u64, bit_size: usize, mut count: usize) -> Result<Vec<Modulus>> {
    let mut destination = vec![];
    // Start with (2^bit_size - 1) / factor * factor + 1
    let mut value = ((0x1u64 << bit_size) - 1) / factor * factor + 1;
    let lower_bound = 0x1u64 << (bit_size - 1);
    while count > 0 && value > lower_bound {
        let candidate = Modulus::new(value)?;
        if candidate.is_prime() {
            destination.push(candidate);
            count -= 1;
        }
        value -= factor;
    }
    if count > 0 {
        return Err(CkksError::InvalidParameters(format!(
            "not enough {}-bit primes congruent to 1 mod {}", bit_size, factor
        )));
    }
    Ok(destination)
}

pub fn is_primitive_root(root: u64, degree: u64, modulus: &Modulus) -> bool {
    if root == 0 {
        false
    } else {
        // degree is a power of two, so it suffices that root^(degree/2) == -1.
        util::exponentiate_u64_mod(root, degree >> 1, modulus) == (modulus.value() - 1)
    }
}

/**
Finds a primitive `degree`-th root of unity by walking the candidates
2, 3, 4, ... and projecting each onto the subgroup of order `degree`.
*/
pub fn try_primitive_root(degree: u64, modulus: &Modulus) -> Option<u64> {
    let size_entire_group = modulus.value() - 1;
    if degree == 0 || size_entire_group % degree != 0 {
        return None;
    }
    let size_quotient_group = size_entire_group / degree;
    (2..modulus.value())
        .map(|candidate| util::exponentiate_u64_mod(candidate, size_quotient_group, modulus))
        .find(|&root| is_primitive_root(root, degree, modulus))
}

/// The smallest primitive `degree`-th root of unity.
pub fn try_minimal_primitive_root(degree: u64, modulus: &Modulus) -> Option<u64> {
    let root = try_primitive_root(degree, modulus)?;
    let generator_sq = util::multiply_u64_mod(root, root, modulus);
    let mut current_generator = root;
    let mut minimal = root;
    // Every primitive root is an odd power of any other one.
    for _ in 0..((degree + 1) / 2) {
        minimal = minimal.min(current_generator);
        current_generator = util::multiply_u64_mod(current_generator, generator_sq, modulus);
    }
    Some(minimal)
}

#[cfg(test)]
mod tests {

    use super::*;

    fn m(value: u64) -> Modulus {
        Modulus::new(value).unwrap()
    }

    #[test]
    fn test_gcd() {
        assert_eq!(1, gcd(1, 1));
        assert_eq!(2, gcd(2, 2));
        assert_eq!(3, gcd(6, 15));
        assert_eq!(1, gcd(15, 7));
        assert_eq!(3, gcd(11112, 44445));

        assert_eq!(xgcd(7, 7), (7, 0, 1));
        assert_eq!(xgcd(1, 2), (1, 1, 0));
        assert_eq!(xgcd(5, 6), (1, -1, 1));
        assert_eq!(xgcd(13, 19), (1, 3, -2));
        assert_eq!(xgcd(14, 21), (7, -1, 1));
        assert_eq!(xgcd(21, 14), (7, 1, -1));
        assert!(are_coprime(13, 19));
        assert!(!are_coprime(14, 21));
    }

    #[test]
    fn test_try_invert() {
        assert_eq!(try_invert_u64_mod_u64(1, 2), Some(1));
        assert_eq!(try_invert_u64_mod_u64(2, 2), None);
        assert_eq!(try_invert_u64_mod_u64(0xffffff, 2), Some(1));
        assert_eq!(try_invert_u64_mod_u64(12345, 3), None);
        assert_eq!(try_invert_u64_mod_u64(5, 19), Some(4));
        assert_eq!(try_invert_u64_mod_u64(4, 19), Some(5));
    }

    #[test]
    fn test_is_prime() {
        assert!(!is_prime(&Modulus::default()));
        assert!(is_prime(&m(2)));
        assert!(is_prime(&m(3)));
        assert!(!is_prime(&m(4)));
        assert!(is_prime(&m(5)));
        assert!(!is_prime(&m(221)));
        assert!(is_prime(&m(65537)));
        assert!(!is_prime(&m(65536)));
        assert!(is_prime(&m(59399)));
        assert!(is_prime(&m(72307)));
        assert!(!is_prime(&m(72307 * 59399)));
        assert!(is_prime(&m(36893488147419103)));
        assert!(!is_prime(&m(36893488147419107)));
        // Strong pseudoprime to bases 2, 3, 5 and 7.
        assert!(!is_prime(&m(3215031751)));
    }

    #[test]
    fn test_get_primes() {
        let primes = get_primes(16384, 40, 3).unwrap();
        assert_eq!(primes.len(), 3);
        for p in &primes {
            assert_eq!(p.bit_count(), 40);
            assert_eq!(p.value() % 16384, 1);
        }
        assert!(primes[0].value() > primes[1].value());
        assert!(matches!(get_primes(1 << 20, 8, 1), Err(CkksError::InvalidParameters(_))));
    }

    #[test]
    fn test_primitive_root() {
        assert_eq!(try_primitive_root(2, &m(11)), Some(10));
        assert_eq!(try_primitive_root(2, &m(29)), Some(28));
        assert!([12, 17].contains(&try_primitive_root(4, &m(29)).unwrap()));
        assert_eq!(try_primitive_root(2, &m(1234565441)), Some(1234565440));
        let r = try_primitive_root(8, &m(1234565441)).unwrap();
        assert!([984839708, 273658408, 249725733, 960907033].contains(&r));
        assert_eq!(try_primitive_root(3, &m(29)), None);

        let modulus = m(11);
        assert!(is_primitive_root(10, 2, &modulus));
        assert!(!is_primitive_root(9, 2, &modulus));
        assert!(!is_primitive_root(10, 4, &modulus));
        let modulus = m(1234565441);
        assert!(is_primitive_root(960907033, 8, &modulus));
        assert!(is_primitive_root(1180581915, 16, &modulus));
        assert!(!is_primitive_root(1180581915, 32, &modulus));

        assert_eq!(try_minimal_primitive_root(2, &m(11)), Some(10));
        assert_eq!(try_minimal_primitive_root(4, &m(29)), Some(12));
        assert_eq!(try_minimal_primitive_root(8, &m(1234565441)), Some(249725733));
    }
}
