use thiserror::Error;

use crate::ParmsID;

/// Every way an engine call can fail.
///
/// All failures are local and synchronous. None of them are transient, so the
/// engine never retries: the caller has to change the call (other parameters,
/// the right key, aligned levels) and try again. A failed operation leaves
/// every other live object untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CkksError {
    /// Ring degree, modulus chain or another parameter is outside what the engine supports.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// The call is not allowed in the current state of the object.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The entropy source could not be initialized.
    #[error("Insufficient entropy: {0}")]
    InsufficientEntropy(String),

    /// A rotation step outside `-max..=max`.
    #[error("Invalid rotation step {step}: must lie within -{max}..={max}")]
    InvalidRotation { step: i64, max: usize },

    /// More values than slots.
    #[error("Vector too long: {len} values but only {slots} slots")]
    VectorTooLong { len: usize, slots: usize },

    /// The named operand was produced under a parameter set this context does not know.
    #[error("Parameter mismatch: {operand} was not created under this context")]
    ParameterMismatch { operand: &'static str },

    /// Operand scales differ beyond the relative tolerance.
    #[error("Scale mismatch: expected {expected:.2}, got {actual:.2}")]
    ScaleMismatch { expected: f64, actual: f64 },

    /// Operands belong to the same chain but sit at different levels.
    #[error("Level mismatch: expected level {expected}, got level {actual}")]
    LevelMismatch { expected: usize, actual: usize },

    /// A ciphertext of the wrong size for the operation.
    #[error("Invalid ciphertext degree for {operation}: ciphertext has {size} polynomials")]
    InvalidCiphertextDegree { operation: &'static str, size: usize },

    /// Required key material was not supplied.
    #[error("Missing key: {0}")]
    MissingKey(String),

    /// The ciphertext is already at level 0.
    #[error("Level exhausted: no modulus left to drop")]
    LevelExhausted,

    /// Raw coefficient data of the wrong shape or out of range.
    #[error("Malformed raw data: {0}")]
    MalformedRawData(String),

    /// The fingerprint does not belong to any level of the context's chain.
    #[error("Unknown fingerprint {0:?}")]
    UnknownFingerprint(ParmsID),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, CkksError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_operand() {
        let e = CkksError::ScaleMismatch { expected: 1024.0, actual: 2048.0 };
        assert_eq!(e.to_string(), "Scale mismatch: expected 1024.00, got 2048.00");
        let e = CkksError::InvalidCiphertextDegree { operation: "rotate", size: 3 };
        assert!(e.to_string().contains("rotate"));
        let e = CkksError::VectorTooLong { len: 10, slots: 4 };
        assert!(e.to_string().contains("10 values"));
    }
}
