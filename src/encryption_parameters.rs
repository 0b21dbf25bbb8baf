use crate::{
    error::{CkksError, Result},
    util, Modulus,
};

/// Describes the type of encryption scheme to be used.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, serde::Serialize, serde::Deserialize)]
pub enum SchemeType {
    /// Fallback. Not valid for encryption.
    #[default]
    None,
    /// Cheon-Kim-Kim-Song Scheme.
    /// - The original paper: [Homomorphic Encryption for Arithmetic of Approximate Numbers](https://eprint.iacr.org/2016/421)
    /// - RNS-CKKS: [A Full RNS Variant of Approximate Homomorphic Encryption](https://eprint.iacr.org/2018/931)
    CKKS,
}

impl From<SchemeType> for u8 {
    fn from(val: SchemeType) -> Self {
        match val {
            SchemeType::None => 0,
            SchemeType::CKKS => 2,
        }
    }
}

impl TryFrom<u8> for SchemeType {
    type Error = CkksError;
    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(SchemeType::None),
            2 => Ok(SchemeType::CKKS),
            _ => Err(CkksError::InvalidParameters(format!("unknown scheme identifier {}", value))),
        }
    }
}

/// Fingerprint of one level of encryption parameters: a digest of the scheme,
/// the ring degree and the moduli active at that level.
pub type ParmsID = util::hash::HashBlock;

/// The zero fingerprint. Never produced by a valid parameter set.
pub const PARMS_ID_ZERO: ParmsID = util::hash::HASH_ZERO_BLOCK;

/// A set of parameters defining the encryption scheme.
///
/// It holds the [SchemeType], the polynomial modulus degree and a modulus
/// chain. The setters only record values; [crate::HeContext::new] validates
/// the combination.
#[derive(Default, Clone, Debug, PartialEq)]
pub struct EncryptionParameters {
    scheme: SchemeType,
    poly_modulus_degree: usize,
    coeff_modulus: Vec<Modulus>,
    parms_id: ParmsID,
}

impl EncryptionParameters {

    /// What HE scheme do we use?
    pub fn scheme(&self) -> SchemeType {self.scheme}

    /// Polynomial modulus degree N. The scheme operates
    /// on the polynomial ring Z_q\[X\]/(X^N + 1).
    pub fn poly_modulus_degree(&self) -> usize {self.poly_modulus_degree}

    /// Coefficient moduli chain, defining the coefficient modulus q = q_0 * q_1 * ... * q_k.
    pub fn coeff_modulus(&self) -> &[Modulus] {
        &self.coeff_modulus
    }

    /// The fingerprint of exactly this parameter set.
    pub fn parms_id(&self) -> &ParmsID {
        &self.parms_id
    }

    /// Creates a new parameter set for the given scheme.
    /// ```rust
    /// # use ckks_rns::*;
    /// let poly_modulus_degree = 8192;
    /// let parms = EncryptionParameters::new(SchemeType::CKKS)
    ///     .set_poly_modulus_degree(poly_modulus_degree)
    ///     .set_coeff_modulus(&CoeffModulus::create(poly_modulus_degree, &[60, 40, 40, 60]).unwrap());
    /// let context = HeContext::new(parms, SecurityLevel::Tc128).unwrap();
    /// assert_eq!(context.top_level(), 2);
    /// ```
    pub fn new(scheme: SchemeType) -> Self {
        let mut ret = EncryptionParameters {
            scheme,
            ..Default::default()
        };
        ret.compute_parms_id();
        ret
    }

    /// See [EncryptionParameters::new] for an example.
    pub fn set_poly_modulus_degree(mut self, poly_modulus_degree: usize) -> Self {
        self.poly_modulus_degree = poly_modulus_degree;
        self.compute_parms_id();
        self
    }

    /// See [EncryptionParameters::new] for an example.
    pub fn set_coeff_modulus(mut self, coeff_modulus: &[Modulus]) -> Self {
        self.coeff_modulus = coeff_modulus.to_vec();
        self.compute_parms_id();
        self
    }

    fn compute_parms_id(&mut self) {
        let mut param_data = Vec::with_capacity(2 + self.coeff_modulus.len());
        param_data.push(u8::from(self.scheme) as u64);
        param_data.push(self.poly_modulus_degree as u64);
        param_data.extend(self.coeff_modulus.iter().map(|x| x.value()));
        self.parms_id = util::hash::hash(&param_data);
    }

    /// The same scheme and degree with the last prime of the chain removed.
    pub(crate) fn drop_last_modulus(&self) -> Self {
        let mut coeff_modulus = self.coeff_modulus.clone();
        coeff_modulus.pop();
        self.clone().set_coeff_modulus(&coeff_modulus)
    }

}

/// Represents a standard security level according to the HomomorphicEncryption.org
/// security standard.
///
/// Normal users should not
/// have to specify the security level explicitly anywhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum SecurityLevel {
    /// No security guaranteed.
    None = 0,
    /// 128-bit classical security.
    #[default]
    Tc128 = 128,
    /// 192-bit classical security.
    Tc192 = 192,
    /// 256-bit classical security.
    Tc256 = 256
}
