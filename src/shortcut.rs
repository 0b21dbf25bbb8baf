use std::sync::Arc;

use crate::{
    error::Result,
    KeyGenerator,
    Encryptor,
    Decryptor,
    HeContext,
    EncryptionParameters,
    SchemeType,
    CoeffModulus,
    SecurityLevel, Evaluator, PublicKey, CKKSEncoder
};

fn ckks_parameters(poly_modulus_degree: usize, coeff_modulus_bits: &[usize]) -> Result<EncryptionParameters> {
    Ok(EncryptionParameters::new(SchemeType::CKKS)
        .set_poly_modulus_degree(poly_modulus_degree)
        .set_coeff_modulus(&CoeffModulus::create(poly_modulus_degree, coeff_modulus_bits)?))
}

/// Create CKKS utilities suite for the encrypting/decrypting party.
///
/// The encryptor holds both the public key and the secret key, so it can
/// encrypt either way.
///
/// ```rust
/// use ckks_rns::*;
///
/// let (_, context, encoder, _, encryptor, decryptor) =
///     create_ckks_decryptor_suite(4096, &[40, 20, 40], SecurityLevel::Tc128).unwrap();
/// let plain = encoder.encode(&[0.5, 1.5, -2.0], Some(2f64.powi(30)), None).unwrap();
/// let encrypted = encryptor.encrypt(&plain).unwrap();
/// let decoded = encoder.decode(&decryptor.decrypt(&encrypted).unwrap()).unwrap();
/// assert!((decoded[2] + 2.0).abs() < 1e-3);
/// assert_eq!(encrypted.level(), context.top_level());
/// ```
pub fn create_ckks_decryptor_suite(poly_modulus_degree: usize, coeff_modulus_bits: &[usize], sec_level: SecurityLevel)
    -> Result<(EncryptionParameters, Arc<HeContext>, CKKSEncoder, KeyGenerator, Encryptor, Decryptor)>
{
    let params = ckks_parameters(poly_modulus_degree, coeff_modulus_bits)?;
    let context = HeContext::new(params.clone(), sec_level)?;
    let keygen = KeyGenerator::new(context.clone())?;
    let encryptor = Encryptor::new(context.clone())
        .set_public_key(keygen.public_key()?)
        .set_secret_key(keygen.secret_key().clone());
    let decryptor = Decryptor::new(context.clone(), keygen.secret_key().clone())?;
    let encoder = CKKSEncoder::new(context.clone());
    Ok((params, context, encoder, keygen, encryptor, decryptor))
}

/// Create CKKS utilities suite for the HE evaluation party, which only
/// holds the public key.
///
/// The same degree and bit sizes give the same primes, so the suite shares
/// the fingerprints of the decrypting party's context.
///
/// ```rust
/// use ckks_rns::*;
///
/// let (_, _, encoder, keygen, _, decryptor) =
///     create_ckks_decryptor_suite(4096, &[40, 20, 40], SecurityLevel::Tc128).unwrap();
/// let (_, _, _, encryptor, evaluator) =
///     create_ckks_evaluator_suite(4096, &[40, 20, 40], SecurityLevel::Tc128, keygen.public_key().unwrap()).unwrap();
/// let plain = encoder.encode(&[1.25, -0.5], Some(2f64.powi(30)), None).unwrap();
/// let encrypted = encryptor.encrypt(&plain).unwrap();
/// let doubled = evaluator.add(&encrypted, &encrypted).unwrap();
/// let decoded = encoder.decode(&decryptor.decrypt(&doubled).unwrap()).unwrap();
/// assert!((decoded[0] - 2.5).abs() < 1e-3);
/// assert!((decoded[1] + 1.0).abs() < 1e-3);
/// ```
pub fn create_ckks_evaluator_suite(
    poly_modulus_degree: usize,
    coeff_modulus_bits: &[usize],
    sec_level: SecurityLevel,
    public_key: PublicKey,
) -> Result<(EncryptionParameters, Arc<HeContext>, CKKSEncoder, Encryptor, Evaluator)> {
    let params = ckks_parameters(poly_modulus_degree, coeff_modulus_bits)?;
    let context = HeContext::new(params.clone(), sec_level)?;
    let encryptor = Encryptor::new(context.clone())
        .set_public_key(public_key);
    let evaluator = Evaluator::new(context.clone());
    let encoder = CKKSEncoder::new(context.clone());
    Ok((params, context, encoder, encryptor, evaluator))
}

/// Create CKKS utilities suite for the HE evaluation party from given parameters.
pub fn create_ckks_evaluator_suite_from_params(params: EncryptionParameters, sec_level: SecurityLevel)
    -> Result<(Arc<HeContext>, CKKSEncoder, Evaluator)>
{
    let context = HeContext::new(params, sec_level)?;
    let evaluator = Evaluator::new(context.clone());
    let encoder = CKKSEncoder::new(context.clone());
    Ok((context, encoder, evaluator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CkksError;

    #[test]
    fn test_suites_share_fingerprints() {
        let (params, context, _, _, _, _) =
            create_ckks_decryptor_suite(2048, &[25, 25], SecurityLevel::Tc128).unwrap();
        let (other, _, _) = create_ckks_evaluator_suite_from_params(params, SecurityLevel::Tc128).unwrap();
        assert_eq!(context.fingerprint_at(0).unwrap(), other.fingerprint_at(0).unwrap());
        assert_eq!(context.key_parms_id(), other.key_parms_id());
    }

    #[test]
    fn test_suite_rejects_parameters() {
        // 60 + 60 bits exceed the 54-bit budget of degree 2048.
        assert!(matches!(
            create_ckks_decryptor_suite(2048, &[60, 60], SecurityLevel::Tc128),
            Err(CkksError::InvalidParameters(_))
        ));
        assert!(create_ckks_decryptor_suite(2048, &[60, 60], SecurityLevel::None).is_ok());
    }
}
