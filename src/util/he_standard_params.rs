//! Largest allowed bit counts for the full modulus chain, from the
//! HomomorphicEncryption.org security standard, for a ternary secret.

use crate::SecurityLevel;

/// Supported ring degrees, in the order of the rows below.
const DEGREES: [usize; 6] = [1024, 2048, 4096, 8192, 16384, 32768];

const TC128: [usize; 6] = [27, 54, 109, 218, 438, 881];
const TC192: [usize; 6] = [19, 37, 75, 152, 305, 611];
const TC256: [usize; 6] = [14, 29, 58, 118, 237, 476];

/// Bit budget of the whole chain (data primes and special prime) at this
/// degree, or `None` for a degree outside the table.
pub fn max_coeff_bit_count(poly_modulus_degree: usize, sec_level: SecurityLevel) -> Option<usize> {
    let row = DEGREES.iter().position(|&d| d == poly_modulus_degree)?;
    match sec_level {
        SecurityLevel::None => Some(usize::MAX),
        SecurityLevel::Tc128 => Some(TC128[row]),
        SecurityLevel::Tc192 => Some(TC192[row]),
        SecurityLevel::Tc256 => Some(TC256[row]),
    }
}

/// Standard deviation of the error distribution.
pub const HE_NOISE_STANDARD_DEVIATION: f64 = 3.2;

/// Samples further than this many standard deviations from zero are rejected.
pub const HE_NOISE_MAX_DEVIATION_FACTOR: f64 = 6.0;
