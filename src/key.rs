use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::{
    context::HeContext,
    error::{CkksError, Result},
    polymod,
    util::{self, rlwe, BlakeRNG, BlakeRNGFactory, PRNGSeed},
    Ciphertext, ParmsID, Plaintext,
};

/// Struct to store a secret key.
///
/// Internally the secret key is a [Plaintext] holding a ternary polynomial
/// in NTT form over every prime of the key level, data primes and special
/// prime alike. Lower levels use a prefix of its limbs.
///
/// The key never leaves the process: it has no serialization and no raw
/// export, and its [Debug] output is redacted.
///
/// - See [KeyGenerator] for the class that generates the secret key.
/// - See [PublicKey] for the class that stores the public key.
#[derive(Clone, Default)]
pub struct SecretKey {
    sk: Plaintext,
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKey")
            .field("parms_id", self.sk.parms_id())
            .finish_non_exhaustive()
    }
}

impl SecretKey {

    /// The [ParmsID] of the secret key, which is the key level's.
    pub fn parms_id(&self) -> &ParmsID {
        self.sk.parms_id()
    }

    pub(crate) fn data(&self) -> &[u64] {
        self.sk.data()
    }

}

/// Struct to store a public key.
///
/// Internally and mathematically the public key is a [Ciphertext] object at
/// the key level, symmetrically encrypting zero under the secret key.
///
/// - See [KeyGenerator] for the class that generates the public key.
/// - See [SecretKey] for the class that stores the secret key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PublicKey {
    pk: Ciphertext,
}

impl PublicKey {

    /// Wraps a [Ciphertext] object.
    pub fn new(pk: Ciphertext) -> Self {
        Self {pk}
    }

    /// The [ParmsID] of the public key.
    pub fn parms_id(&self) -> &ParmsID {
        self.pk.parms_id()
    }

    /// The inner [Ciphertext] object.
    pub fn as_ciphertext(&self) -> &Ciphertext {
        &self.pk
    }

    /// The data of the public key.
    pub fn data(&self) -> &[u64] {
        self.pk.data()
    }

}

impl From<Ciphertext> for PublicKey {
    fn from(pk: Ciphertext) -> Self {
        Self::new(pk)
    }
}

/// Struct to store one keyswitching key.
///
/// Key switching turns a polynomial that decrypts under some key s' into a
/// ciphertext that decrypts under the secret key s. The polynomial is split
/// into one digit per data prime and the key holds one [PublicKey] per digit:
/// digit j encrypts `P * s'` in its j-th limb, where P is the special prime.
///
/// - See [RelinKeys] for the class that stores the relinearization keys.
/// - See [GaloisKeys] for the class that stores the Galois keys.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KSwitchKeys {
    parms_id: ParmsID,
    keys: Vec<PublicKey>,
}

impl KSwitchKeys {

    pub(crate) fn from_members(parms_id: ParmsID, keys: Vec<PublicKey>) -> Self {
        Self {parms_id, keys}
    }

    /// The [ParmsID] of the keys, which is the key level's.
    pub fn parms_id(&self) -> &ParmsID {
        &self.parms_id
    }

    /// One key per decomposition digit.
    pub fn data(&self) -> &[PublicKey] {
        &self.keys
    }

    /// Number of decomposition digits.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

}

impl std::ops::Index<usize> for KSwitchKeys {
    type Output = PublicKey;
    fn index(&self, index: usize) -> &Self::Output {
        &self.keys[index]
    }
}

/// Struct to store relinearization keys.
///
/// # Relinearization
/// Freshly encrypted ciphertexts have a size of 2, and multiplying ciphertexts
/// of size 2 yields a ciphertext of size 3. Relinearization key-switches the
/// s^2 component back under s, bringing the size down to 2 again. A
/// relinearization key is therefore a [KSwitchKeys] for s' = s^2.
///
/// - See [KeyGenerator] for the class that generates the relinearization keys.
/// - See [GaloisKeys] for the class that stores the Galois keys.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RelinKeys {
    keys: KSwitchKeys,
}

impl RelinKeys {

    pub(crate) fn from_kswitch_keys(keys: KSwitchKeys) -> Self {
        Self {keys}
    }

    /// The [ParmsID] of the relinearization keys.
    pub fn parms_id(&self) -> &ParmsID {
        self.keys.parms_id()
    }

    /// As a reference to the inner keyswitching keys.
    pub fn as_kswitch_keys(&self) -> &KSwitchKeys {
        &self.keys
    }

}

/// Struct to store Galois keys.
///
/// # Slot rotations
/// Galois keys are used together with
/// [Evaluator::rotate](crate::Evaluator::rotate) and
/// [Evaluator::conjugate](crate::Evaluator::conjugate). The automorphism
/// X -> X^elt maps a ciphertext under s to one under s(X^elt); the key for
/// `elt` switches it back. Rotating by `k` slots uses `elt = 5^k mod 2N`,
/// and conjugation uses `elt = 2N - 1`.
///
/// Keys are stored per Galois element, so two steps that denote the same
/// rotation (for example `1` and `1 - N/2`) share one key.
///
/// - See [KeyGenerator] for the class that generates the Galois keys.
/// - See [RelinKeys] for the class that stores the relinearization keys.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GaloisKeys {
    parms_id: ParmsID,
    keys: BTreeMap<usize, KSwitchKeys>,
}

impl GaloisKeys {

    pub(crate) fn from_members(parms_id: ParmsID, keys: BTreeMap<usize, KSwitchKeys>) -> Self {
        Self {parms_id, keys}
    }

    /// Is there a key for the given Galois element?
    pub fn has_key(&self, galois_elt: usize) -> bool {
        self.keys.contains_key(&galois_elt)
    }

    /// Get the key for the given Galois element.
    pub fn key(&self, galois_elt: usize) -> Option<&KSwitchKeys> {
        self.keys.get(&galois_elt)
    }

    /// The Galois elements keys exist for, in increasing order.
    pub fn galois_elements(&self) -> Vec<usize> {
        self.keys.keys().copied().collect()
    }

    /// Number of distinct Galois elements.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The [ParmsID] of the Galois keys.
    pub fn parms_id(&self) -> &ParmsID {
        &self.parms_id
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&usize, &KSwitchKeys)> {
        self.keys.iter()
    }

}

/// Provides key generation utilities.
///
/// Generates a fresh secret key on construction. An existing KeyGenerator
/// can at any time be used to generate the public key, relinearization keys
/// and Galois keys matching that secret key. Constructing a KeyGenerator
/// freezes the global scale of its [HeContext].
///
/// Randomness comes from the operating system, unless the generator was
/// built with [KeyGenerator::with_seed], in which case every key it produces
/// is a deterministic function of the seed.
///
/// ```rust
/// # use ckks_rns::*;
/// let context = HeContext::create_with_security(1024, &[30, 30, 30], SecurityLevel::None).unwrap();
/// let keygen = KeyGenerator::new(context.clone()).unwrap();
/// let relin_keys = keygen.relinearization_key().unwrap();
/// assert_eq!(relin_keys.parms_id(), context.key_parms_id());
/// let galois_keys = keygen.galois_keys(&[1, -1]).unwrap();
/// assert_eq!(galois_keys.len(), 2);
/// ```
pub struct KeyGenerator {
    context: Arc<HeContext>,
    secret_key: SecretKey,
    rng_factory: BlakeRNGFactory,
}

impl KeyGenerator {

    /// Create a new KeyGenerator drawing on OS entropy.
    pub fn new(context: Arc<HeContext>) -> Result<Self> {
        Self::with_factory(context, BlakeRNGFactory::new())
    }

    /// Create a new KeyGenerator whose randomness is derived from `seed`.
    pub fn with_seed(context: Arc<HeContext>, seed: PRNGSeed) -> Result<Self> {
        Self::with_factory(context, BlakeRNGFactory::from_seed(seed))
    }

    fn with_factory(context: Arc<HeContext>, rng_factory: BlakeRNGFactory) -> Result<Self> {
        context.mark_keys_generated();
        let mut ret = Self {
            context,
            secret_key: SecretKey::default(),
            rng_factory,
        };
        ret.generate_sk()?;
        Ok(ret)
    }

    /// The [HeContext] used by the KeyGenerator.
    pub fn context(&self) -> &Arc<HeContext> {
        &self.context
    }

    /// The secret key generated on construction.
    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    #[instrument(skip(self), level = "debug", fields(degree = self.context.poly_modulus_degree()))]
    fn generate_sk(&mut self) -> Result<()> {
        let context_data = self.context.key_context_data()?;
        let coeff_count = context_data.poly_modulus_degree();
        let coeff_modulus = context_data.parms().coeff_modulus();

        let mut rng = self.rng_factory.get_rng()?;
        let mut sk = Plaintext::from_context_data(&context_data, 1.0);
        rlwe::sample::ternary(&mut rng, coeff_count, coeff_modulus, sk.data_mut());
        polymod::ntt_inplace_p(sk.data_mut(), coeff_count, context_data.small_ntt_tables());

        self.secret_key = SecretKey {sk};
        debug!(deterministic = self.rng_factory.is_deterministic(), "secret key sampled");
        Ok(())
    }

    /// Generates a public key: a fresh symmetric encryption of zero at the
    /// key level. Every call gives a different, equally valid key.
    #[instrument(skip(self), level = "debug")]
    pub fn public_key(&self) -> Result<PublicKey> {
        let context_data = self.context.key_context_data()?;
        let mut rng = self.rng_factory.get_rng()?;
        let pk = rlwe::encrypt_zero::symmetric(self.secret_key.data(), &context_data, &mut rng)?;
        Ok(PublicKey::new(pk))
    }

    /// Generates the relinearization key, a keyswitching key for s^2.
    #[instrument(skip(self), level = "debug")]
    pub fn relinearization_key(&self) -> Result<RelinKeys> {
        let context_data = self.context.key_context_data()?;
        let coeff_count = context_data.poly_modulus_degree();
        let coeff_modulus = context_data.parms().coeff_modulus();

        let sk = self.secret_key.data();
        let mut sk_squared = vec![0; sk.len()];
        polymod::dyadic_product_p(sk, sk, coeff_count, coeff_modulus, &mut sk_squared);

        let mut rng = self.rng_factory.get_rng()?;
        let keys = self.generate_one_kswitch_key(&sk_squared, &mut rng)?;
        Ok(RelinKeys::from_kswitch_keys(keys))
    }

    /// Generates Galois keys for the given rotation steps. Steps denoting the
    /// same rotation share one key, and step 0 needs none, so an empty or
    /// all-zero request gives an empty [GaloisKeys].
    ///
    /// Fails with [CkksError::InvalidRotation] before generating anything if
    /// any step lies outside `-(N/2 - 1)..=(N/2 - 1)`.
    pub fn galois_keys(&self, steps: &[i64]) -> Result<GaloisKeys> {
        let galois_elts = self.context.galois_tool().get_elts_from_steps(steps)?;
        self.galois_keys_from_elts(&galois_elts)
    }

    /// Same as [KeyGenerator::galois_keys], and also a key for slot conjugation.
    pub fn galois_keys_with_conjugation(&self, steps: &[i64]) -> Result<GaloisKeys> {
        let mut galois_elts = self.context.galois_tool().get_elts_from_steps(steps)?;
        galois_elts.push(self.context.galois_tool().conjugation_elt());
        self.galois_keys_from_elts(&galois_elts)
    }

    /// Generates Galois keys for raw Galois elements. Element 1 is the
    /// identity and is skipped.
    #[instrument(skip(self), level = "debug")]
    pub fn galois_keys_from_elts(&self, galois_elts: &[usize]) -> Result<GaloisKeys> {
        let galois_tool = self.context.galois_tool();
        if let Some(&bad) = galois_elts.iter().find(|&&elt| !galois_tool.is_valid_elt(elt)) {
            return Err(CkksError::InvalidParameters(format!("{} is not a Galois element of this ring", bad)));
        }

        let context_data = self.context.key_context_data()?;
        let sk = self.secret_key.data();
        let mut rng = self.rng_factory.get_rng()?;
        let mut keys = BTreeMap::new();
        for &galois_elt in galois_elts {
            if galois_elt == 1 || keys.contains_key(&galois_elt) {
                continue;
            }
            let mut rotated_secret_key = vec![0; sk.len()];
            galois_tool.apply_ntt_p(sk, galois_elt, &mut rotated_secret_key);
            keys.insert(galois_elt, self.generate_one_kswitch_key(&rotated_secret_key, &mut rng)?);
        }
        debug!(count = keys.len(), "galois keys generated");
        Ok(GaloisKeys::from_members(*context_data.parms_id(), keys))
    }

    /// One digit per data prime: digit i is an encryption of zero at the key
    /// level with `(P mod q_i) * new_key` added to limb i of its first
    /// component. `new_key` is in NTT form over the key level.
    fn generate_one_kswitch_key(&self, new_key: &[u64], rng: &mut BlakeRNG) -> Result<KSwitchKeys> {
        let context_data = self.context.key_context_data()?;
        let coeff_count = context_data.poly_modulus_degree();
        let key_modulus = context_data.parms().coeff_modulus();
        let decomp_mod_count = self.context.top_level() + 1;
        let special_prime = key_modulus[decomp_mod_count].value();

        let mut keys = Vec::with_capacity(decomp_mod_count);
        for i in 0..decomp_mod_count {
            let modulus = &key_modulus[i];
            let mut encrypted = rlwe::encrypt_zero::symmetric(self.secret_key.data(), &context_data, rng)?;
            let factor = util::MultiplyU64ModOperand::new(modulus.reduce(special_prime), modulus);
            let new_key_limb = &new_key[i * coeff_count..(i + 1) * coeff_count];
            encrypted.poly_component_mut(0, i).iter_mut().zip(new_key_limb.iter())
                .for_each(|(c, &k)| {
                    let product = util::multiply_u64operand_mod(k, &factor, modulus);
                    *c = util::add_u64_mod(*c, product, modulus);
                });
            keys.push(PublicKey::new(encrypted));
        }
        Ok(KSwitchKeys::from_members(*context_data.parms_id(), keys))
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SecurityLevel;

    fn context() -> Arc<HeContext> {
        HeContext::create_with_security(1024, &[30, 30, 30], SecurityLevel::None).unwrap()
    }

    /// c0 + c1 * s over the key level, in coefficient form and centered.
    fn phase(context: &HeContext, ciphertext: &Ciphertext, sk: &SecretKey) -> Vec<Vec<i64>> {
        let context_data = context.key_context_data().unwrap();
        let coeff_count = context_data.poly_modulus_degree();
        let coeff_modulus = context_data.parms().coeff_modulus();
        let mut result = ciphertext.poly(0).to_vec();
        polymod::dyadic_product_accumulate_p(ciphertext.poly(1), sk.data(), coeff_count, coeff_modulus, &mut result);
        polymod::intt_inplace_p(&mut result, coeff_count, context_data.small_ntt_tables());
        result.chunks(coeff_count).zip(coeff_modulus.iter())
            .map(|(limb, m)| limb.iter().map(|&x| {
                if x > m.value() / 2 {x as i64 - m.value() as i64} else {x as i64}
            }).collect())
            .collect()
    }

    #[test]
    fn test_secret_key_is_ternary() {
        let context = context();
        let keygen = KeyGenerator::new(context.clone()).unwrap();
        let context_data = context.key_context_data().unwrap();
        let sk = keygen.secret_key();
        assert_eq!(sk.parms_id(), context.key_parms_id());
        let mut coefficients = sk.data().to_vec();
        polymod::intt_inplace_p(&mut coefficients, 1024, context_data.small_ntt_tables());
        for (limb, m) in coefficients.chunks(1024).zip(context_data.parms().coeff_modulus()) {
            assert!(limb.iter().all(|&x| x <= 1 || x == m.value() - 1));
        }
        assert!(!format!("{:?}", sk).contains("sk"));
    }

    #[test]
    fn test_public_key_encrypts_zero() {
        let context = context();
        let keygen = KeyGenerator::new(context.clone()).unwrap();
        let pk = keygen.public_key().unwrap();
        assert_eq!(pk.parms_id(), context.key_parms_id());
        assert!(!pk.as_ciphertext().is_transparent());
        for limb in phase(&context, pk.as_ciphertext(), keygen.secret_key()) {
            assert!(limb.iter().all(|x| x.abs() <= 20));
        }
    }

    #[test]
    fn test_relinearization_key_digits() {
        let context = context();
        let keygen = KeyGenerator::new(context.clone()).unwrap();
        let relin_keys = keygen.relinearization_key().unwrap();
        let keys = relin_keys.as_kswitch_keys();
        assert_eq!(keys.len(), 2);
        for j in 0..keys.len() {
            let limbs = phase(&context, keys[j].as_ciphertext(), keygen.secret_key());
            // Outside limb j the digit is an encryption of zero.
            for (i, limb) in limbs.iter().enumerate() {
                if i != j {
                    assert!(limb.iter().all(|x| x.abs() <= 20));
                }
            }
            assert!(limbs[j].iter().any(|x| x.abs() > 20));
        }
    }

    #[test]
    fn test_galois_keys_dedup_and_validate() {
        let context = context();
        let keygen = KeyGenerator::new(context.clone()).unwrap();
        let galois_tool = context.galois_tool();

        let keys = keygen.galois_keys(&[1, 1 - 512, 0]).unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys.has_key(5));
        assert!(!keys.has_key(1));
        assert_eq!(keys.key(5).unwrap().len(), 2);

        assert!(keygen.galois_keys(&[]).unwrap().is_empty());
        assert!(keygen.galois_keys(&[0]).unwrap().is_empty());

        assert_eq!(
            keygen.galois_keys(&[1, 512]),
            Err(CkksError::InvalidRotation { step: 512, max: 511 })
        );

        let keys = keygen.galois_keys_with_conjugation(&[2, -2]).unwrap();
        assert_eq!(keys.len(), 3);
        assert!(keys.has_key(galois_tool.conjugation_elt()));
        assert_eq!(keys.galois_elements(), {
            let mut elts = vec![
                galois_tool.get_elt_from_step(2).unwrap(),
                galois_tool.get_elt_from_step(-2).unwrap(),
                2047,
            ];
            elts.sort();
            elts
        });

        assert!(keygen.galois_keys_from_elts(&[4]).is_err());
    }

    #[test]
    fn test_seeded_generators_agree() {
        let seed = PRNGSeed([42; 64]);
        let context = context();
        let a = KeyGenerator::with_seed(context.clone(), seed).unwrap();
        let b = KeyGenerator::with_seed(context.clone(), seed).unwrap();
        assert_eq!(a.secret_key().data(), b.secret_key().data());
        assert_eq!(a.public_key().unwrap(), b.public_key().unwrap());
        assert_eq!(a.relinearization_key().unwrap(), b.relinearization_key().unwrap());

        let c = KeyGenerator::with_seed(context, PRNGSeed([43; 64])).unwrap();
        assert_ne!(a.secret_key().data(), c.secret_key().data());
    }

    #[test]
    fn test_keygen_freezes_global_scale() {
        let context = context();
        context.set_global_scale(2f64.powi(20)).unwrap();
        let _keygen = KeyGenerator::new(context.clone()).unwrap();
        assert!(matches!(context.set_global_scale(2f64.powi(25)), Err(CkksError::InvalidState(_))));
        assert_eq!(context.global_scale(), Some(2f64.powi(20)));
    }
}
