//! Leveled CKKS homomorphic encryption over a residue number system.
//!
//! Real or complex vectors are encoded into polynomials of the ring
//! `Z_Q[X]/(X^N + 1)`, encrypted, and processed while encrypted: slot-wise
//! addition and multiplication, relinearization, rescaling and slot
//! rotations. Every coefficient is held as its residues modulo a chain of
//! word-sized primes, and every heavy loop runs per prime.
//!
//! ```rust
//! use ckks_rns::*;
//!
//! let context = HeContext::create_with_security(2048, &[50, 30, 50], SecurityLevel::None).unwrap();
//! let keygen = KeyGenerator::new(context.clone()).unwrap();
//! let relin_keys = keygen.relinearization_key().unwrap();
//! let encoder = CKKSEncoder::new(context.clone());
//! let encryptor = Encryptor::new(context.clone()).set_public_key(keygen.public_key().unwrap());
//! let decryptor = Decryptor::new(context.clone(), keygen.secret_key().clone()).unwrap();
//! let evaluator = Evaluator::new(context.clone());
//!
//! let scale = 2f64.powi(30);
//! let x = encryptor.encrypt(&encoder.encode(&[1.5, -2.0], Some(scale), None).unwrap()).unwrap();
//! let y = encryptor.encrypt(&encoder.encode(&[2.0, 0.5], Some(scale), None).unwrap()).unwrap();
//! let product = evaluator.multiply(&x, &y).unwrap();
//! let product = evaluator.relinearize(&product, &relin_keys).unwrap();
//! let product = evaluator.rescale(&product).unwrap();
//! let decoded = encoder.decode(&decryptor.decrypt(&product).unwrap()).unwrap();
//! assert!((decoded[0] - 3.0).abs() < 1e-3);
//! assert!((decoded[1] + 1.0).abs() < 1e-3);
//! ```

pub mod util;
pub(crate) use util::polysmallmod as polymod;

mod error;
mod modulus;
mod encryption_parameters;
mod context;
mod text;
mod key;
mod ckks_encoder;
mod encryptor;
mod evaluator;
mod serialize_serde;
mod shortcut;
pub mod raw;
pub mod valcheck;

pub use error::{CkksError, Result};
pub use modulus::{Modulus, CoeffModulus};
pub use encryption_parameters::{
    SchemeType, EncryptionParameters, ParmsID, PARMS_ID_ZERO, SecurityLevel,
};
pub use context::{HeContext, ContextData};
pub use text::{Plaintext, Ciphertext};
pub use key::{SecretKey, PublicKey, KSwitchKeys, RelinKeys, GaloisKeys, KeyGenerator};
pub use ckks_encoder::CKKSEncoder;
pub use encryptor::{Encryptor, Decryptor};
pub use evaluator::{EvaluationPolicy, Evaluator};
pub use raw::{
    RawData, RawShape, Marshal,
    export_ciphertext_coefficients, import_ciphertext,
    export_relin_key_coefficients, import_relin_keys,
    export_galois_key_coefficients, import_galois_keys,
};
pub use valcheck::ValCheck;
pub use shortcut::*;
