use std::sync::Arc;

use tracing::{instrument, warn};

use crate::{
    context::ContextData,
    error::{CkksError, Result},
    polymod,
    util::{rlwe, BlakeRNGFactory, PRNGSeed},
    Ciphertext, HeContext, Plaintext, PublicKey, SecretKey,
};

/// Encrypts [Plaintext] objects into [Ciphertext] objects.
///
/// Constructing an Encryptor requires a [HeContext]; the public key and/or
/// the secret key are set afterwards. With a public key it supports
/// asymmetric encryption through [Encryptor::encrypt], with a secret key
/// symmetric encryption through [Encryptor::encrypt_symmetric].
///
/// Every encryption samples fresh randomness from the encryptor's own
/// entropy provider: the OS for [Encryptor::new], a seed for
/// [Encryptor::with_seed].
///
/// ```rust
/// # use ckks_rns::*;
/// let context = HeContext::create_with_security(1024, &[30, 30, 30], SecurityLevel::None).unwrap();
/// let keygen = KeyGenerator::new(context.clone()).unwrap();
/// let encryptor = Encryptor::new(context.clone())
///     .set_public_key(keygen.public_key().unwrap());
/// let encoder = CKKSEncoder::new(context.clone());
/// let plain = encoder.encode(&[1.0, 2.0], Some(2f64.powi(25)), None).unwrap();
/// let encrypted = encryptor.encrypt(&plain).unwrap();
/// assert_eq!(encrypted.level(), context.top_level());
/// ```
pub struct Encryptor {
    context: Arc<HeContext>,
    public_key: Option<PublicKey>,
    secret_key: Option<SecretKey>,
    rng_factory: BlakeRNGFactory,
}

impl Encryptor {

    /// Creates a new Encryptor drawing on OS entropy.
    pub fn new(context: Arc<HeContext>) -> Self {
        Self {
            context,
            public_key: None,
            secret_key: None,
            rng_factory: BlakeRNGFactory::new(),
        }
    }

    /// Creates a new Encryptor whose randomness is derived from `seed`.
    pub fn with_seed(context: Arc<HeContext>, seed: PRNGSeed) -> Self {
        Self {
            rng_factory: BlakeRNGFactory::from_seed(seed),
            ..Self::new(context)
        }
    }

    /// Set the public key used by [Encryptor::encrypt].
    pub fn set_public_key(mut self, public_key: PublicKey) -> Self {
        self.public_key = Some(public_key);
        self
    }

    /// Set the secret key used by [Encryptor::encrypt_symmetric].
    pub fn set_secret_key(mut self, secret_key: SecretKey) -> Self {
        self.secret_key = Some(secret_key);
        self
    }

    pub fn public_key(&self) -> Option<&PublicKey> {
        self.public_key.as_ref()
    }

    fn plain_context_data(&self, plain: &Plaintext) -> Result<Arc<ContextData>> {
        self.context.level_of(plain.parms_id())
            .and_then(|_| self.context.get_context_data(plain.parms_id()))
            .filter(|c| plain.data().len() == c.coeff_modulus_size() * c.poly_modulus_degree())
            .ok_or_else(|| {
                warn!("plaintext does not belong to this context");
                CkksError::ParameterMismatch { operand: "plaintext" }
            })
    }

    fn check_key_level(&self, parms_id: &crate::ParmsID, operand: &'static str) -> Result<()> {
        if parms_id != self.context.key_parms_id() {
            return Err(CkksError::ParameterMismatch { operand });
        }
        Ok(())
    }

    /// Encrypts a plaintext under the public key, at the plaintext's level
    /// and scale.
    #[instrument(skip_all, level = "debug", fields(level = plain.level(), scale = plain.scale()))]
    pub fn encrypt(&self, plain: &Plaintext) -> Result<Ciphertext> {
        let public_key = self.public_key.as_ref()
            .ok_or_else(|| CkksError::MissingKey("encryptor has no public key".into()))?;
        self.check_key_level(public_key.parms_id(), "public key")?;
        let context_data = self.plain_context_data(plain)?;

        let mut rng = self.rng_factory.get_rng()?;
        let mut destination = rlwe::encrypt_zero::asymmetric(public_key.as_ciphertext(), &context_data, &mut rng)?;
        self.add_message(&context_data, plain, &mut destination);
        Ok(destination)
    }

    /// Encrypts a plaintext under the secret key, at the plaintext's level
    /// and scale. Symmetric ciphertexts carry less noise than public-key ones.
    #[instrument(skip_all, level = "debug", fields(level = plain.level(), scale = plain.scale()))]
    pub fn encrypt_symmetric(&self, plain: &Plaintext) -> Result<Ciphertext> {
        let secret_key = self.secret_key.as_ref()
            .ok_or_else(|| CkksError::MissingKey("encryptor has no secret key".into()))?;
        self.check_key_level(secret_key.parms_id(), "secret key")?;
        let context_data = self.plain_context_data(plain)?;

        let mut rng = self.rng_factory.get_rng()?;
        let mut destination = rlwe::encrypt_zero::symmetric(secret_key.data(), &context_data, &mut rng)?;
        self.add_message(&context_data, plain, &mut destination);
        Ok(destination)
    }

    fn add_message(&self, context_data: &ContextData, plain: &Plaintext, destination: &mut Ciphertext) {
        let coeff_count = context_data.poly_modulus_degree();
        let coeff_modulus = context_data.parms().coeff_modulus();
        polymod::add_inplace_p(destination.poly_mut(0), plain.data(), coeff_count, coeff_modulus);
        destination.set_scale(plain.scale());
    }

}

/// Decrypts [Ciphertext] objects into [Plaintext] objects.
///
/// Constructing a Decryptor requires a [HeContext] and the secret key. The
/// result of a decryption is the encoded message plus noise, which
/// [CKKSEncoder::decode](crate::CKKSEncoder::decode) turns back into values.
///
/// Ciphertexts of size 3, straight out of a multiplication, decrypt as well:
/// the third polynomial is paired with s^2.
pub struct Decryptor {
    context: Arc<HeContext>,
    // s and s^2 at the key level, in NTT form.
    secret_key_array: Vec<u64>,
}

impl Decryptor {

    /// Creates a new Decryptor. Fails with [CkksError::ParameterMismatch] if
    /// the secret key was generated under another context.
    pub fn new(context: Arc<HeContext>, secret_key: SecretKey) -> Result<Self> {
        if secret_key.parms_id() != context.key_parms_id() {
            return Err(CkksError::ParameterMismatch { operand: "secret key" });
        }
        let key_context_data = context.key_context_data()?;
        let coeff_count = key_context_data.poly_modulus_degree();
        let coeff_modulus = key_context_data.parms().coeff_modulus();
        let poly_size = coeff_count * coeff_modulus.len();

        let mut secret_key_array = vec![0; 2 * poly_size];
        let (first, second) = secret_key_array.split_at_mut(poly_size);
        first.copy_from_slice(secret_key.data());
        polymod::dyadic_product_p(first, first, coeff_count, coeff_modulus, second);
        Ok(Self {
            context,
            secret_key_array,
        })
    }

    /// Computes c_0 + c_1 * s (+ c_2 * s^2) at the ciphertext's level.
    #[instrument(skip_all, level = "debug", fields(level = encrypted.level(), size = encrypted.size()))]
    pub fn decrypt(&self, encrypted: &Ciphertext) -> Result<Plaintext> {
        let context_data = self.context.level_of(encrypted.parms_id())
            .and_then(|_| self.context.get_context_data(encrypted.parms_id()))
            .ok_or(CkksError::ParameterMismatch { operand: "ciphertext" })?;
        if !(crate::util::HE_CIPHERTEXT_SIZE_MIN..=crate::util::HE_CIPHERTEXT_SIZE_MAX).contains(&encrypted.size()) {
            return Err(CkksError::InvalidCiphertextDegree { operation: "decrypt", size: encrypted.size() });
        }
        let coeff_count = context_data.poly_modulus_degree();
        let coeff_modulus = context_data.parms().coeff_modulus();
        let poly_size = coeff_count * coeff_modulus.len();
        let key_poly_size = self.secret_key_array.len() / 2;

        let mut destination = Plaintext::from_context_data(&context_data, encrypted.scale());
        let result = destination.data_mut();
        result.copy_from_slice(encrypted.poly(0));
        for i in 1..encrypted.size() {
            let key_power = &self.secret_key_array[(i - 1) * key_poly_size..(i - 1) * key_poly_size + poly_size];
            polymod::dyadic_product_accumulate_p(encrypted.poly(i), key_power, coeff_count, coeff_modulus, result);
        }
        Ok(destination)
    }

}
