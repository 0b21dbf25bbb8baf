use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use num_bigint::BigUint;
use tracing::{info, warn};

use crate::{
    error::{CkksError, Result},
    util::{self, GaloisTool, NTTTables, RNSBase, RNSTool},
    CoeffModulus, EncryptionParameters, Modulus, ParmsID, SchemeType, SecurityLevel,
};

/// Shared handle to one level of the modulus chain.
pub type ContextDataPointer = Arc<ContextData>;

/// Precomputation for one level of the modulus switching chain: the
/// parameters active at that level, their NTT tables and the RNS tool that
/// drops the last prime.
pub struct ContextData {
    parms: EncryptionParameters,
    chain_index: usize,
    total_coeff_modulus: BigUint,
    upper_half_threshold: BigUint,
    rns_tool: RNSTool,
    small_ntt_tables: Vec<NTTTables>,
    prev_parms_id: Option<ParmsID>,
    next_parms_id: Option<ParmsID>,
}

impl ContextData {

    fn new(parms: EncryptionParameters, chain_index: usize) -> Result<Self> {
        let coeff_count_power = util::get_power_of_two(parms.poly_modulus_degree() as u64)
            .ok_or_else(|| CkksError::InvalidParameters("poly modulus degree is not a power of two".into()))?;
        let base = RNSBase::new(parms.coeff_modulus())?;
        let rns_tool = RNSTool::new(parms.poly_modulus_degree(), &base)?;
        let small_ntt_tables = NTTTables::create_ntt_tables(coeff_count_power, parms.coeff_modulus())?;
        let total_coeff_modulus = base.base_prod().clone();
        let upper_half_threshold = (&total_coeff_modulus + 1u64) >> 1;
        Ok(ContextData {
            parms,
            chain_index,
            total_coeff_modulus,
            upper_half_threshold,
            rns_tool,
            small_ntt_tables,
            prev_parms_id: None,
            next_parms_id: None,
        })
    }

    /// Returns the [ParmsID] of this level.
    pub fn parms_id(&self) -> &ParmsID {
        self.parms.parms_id()
    }

    /// [EncryptionParameters] associated with this level.
    pub fn parms(&self) -> &EncryptionParameters {
        &self.parms
    }

    /// Position in the chain. Data levels count down to zero; the key level
    /// sits one above the top data level.
    pub fn chain_index(&self) -> usize {
        self.chain_index
    }

    /// Product of the primes active at this level.
    pub fn total_coeff_modulus(&self) -> &BigUint {
        &self.total_coeff_modulus
    }

    pub fn total_coeff_modulus_bit_count(&self) -> usize {
        self.total_coeff_modulus.bits() as usize
    }

    /// Values at or above this threshold represent negative integers.
    pub fn upper_half_threshold(&self) -> &BigUint {
        &self.upper_half_threshold
    }

    pub fn rns_tool(&self) -> &RNSTool {
        &self.rns_tool
    }

    /// NTT tables of the coefficient moduli.
    pub fn small_ntt_tables(&self) -> &[NTTTables] {
        &self.small_ntt_tables
    }

    pub fn coeff_modulus_size(&self) -> usize {
        self.parms.coeff_modulus().len()
    }

    pub fn poly_modulus_degree(&self) -> usize {
        self.parms.poly_modulus_degree()
    }

    /// The level with one more prime, if any.
    pub fn prev_parms_id(&self) -> Option<&ParmsID> {
        self.prev_parms_id.as_ref()
    }

    /// The level with one prime less, if any.
    pub fn next_parms_id(&self) -> Option<&ParmsID> {
        self.next_parms_id.as_ref()
    }

}

/**
Validated encryption parameters and the modulus switching chain built from them.

`modulus_bit_sizes` lists the data primes q_0..q_{L-1} followed by one special
prime P that only key-switching keys carry. The chain has a key level holding
all L + 1 primes, then data levels L - 1 down to 0, where level l keeps
q_0..q_l. A ciphertext's level is the chain index of its parameters, and each
level is identified by its own fingerprint ([ParmsID]).

The context is shared through [Arc] by every object derived from it. Its only
mutable state is the global default scale, which is frozen once a key
generator has been created.

```rust
# use ckks_rns::*;
let context = HeContext::create(8192, &[60, 40, 40, 60]).unwrap();
assert_eq!(context.top_level(), 2);
assert_eq!(context.modulus_chain().len(), 3);
assert_eq!(context.auxiliary_modulus_chain().len(), 1);
let fingerprint = context.fingerprint_at(1).unwrap();
assert_eq!(context.level_of(&fingerprint), Some(1));
```
*/
pub struct HeContext {
    poly_modulus_degree: usize,
    key_parms_id: ParmsID,
    first_parms_id: ParmsID,
    last_parms_id: ParmsID,
    context_data_map: HashMap<ParmsID, ContextDataPointer>,
    chain: Vec<ParmsID>,
    key_moduli: Vec<Modulus>,
    galois_tool: GaloisTool,
    sec_level: SecurityLevel,
    scale_state: Mutex<ScaleState>,
}

/// Default scale and whether key generation has frozen it. Both sit behind
/// one lock so a key generator cannot start between the check and the store.
#[derive(Default)]
struct ScaleState {
    global_scale: Option<f64>,
    keys_generated: bool,
}

fn reject(message: String) -> CkksError {
    warn!(%message, "rejected encryption parameters");
    CkksError::InvalidParameters(message)
}

impl HeContext {

    /// Generates the primes for `modulus_bit_sizes` and validates them
    /// against the 128-bit classical security table.
    pub fn create(poly_modulus_degree: usize, modulus_bit_sizes: &[usize]) -> Result<Arc<Self>> {
        Self::create_with_security(poly_modulus_degree, modulus_bit_sizes, SecurityLevel::Tc128)
    }

    /// As [HeContext::create], with an explicit security level.
    /// [SecurityLevel::None] skips the bit budget check.
    pub fn create_with_security(
        poly_modulus_degree: usize,
        modulus_bit_sizes: &[usize],
        sec_level: SecurityLevel,
    ) -> Result<Arc<Self>> {
        Self::check_degree(poly_modulus_degree)?;
        let moduli = CoeffModulus::create(poly_modulus_degree, modulus_bit_sizes)
            .map_err(|e| {
                warn!(error = %e, "rejected modulus bit sizes");
                e
            })?;
        let parms = EncryptionParameters::new(SchemeType::CKKS)
            .set_poly_modulus_degree(poly_modulus_degree)
            .set_coeff_modulus(&moduli);
        Self::new(parms, sec_level)
    }

    fn check_degree(poly_modulus_degree: usize) -> Result<usize> {
        if !(util::HE_CONTEXT_DEGREE_MIN..=util::HE_POLY_MOD_DEGREE_MAX).contains(&poly_modulus_degree) {
            return Err(reject(format!(
                "poly modulus degree {} is outside {}..={}",
                poly_modulus_degree, util::HE_CONTEXT_DEGREE_MIN, util::HE_POLY_MOD_DEGREE_MAX
            )));
        }
        util::get_power_of_two(poly_modulus_degree as u64)
            .ok_or_else(|| reject(format!("poly modulus degree {} is not a power of two", poly_modulus_degree)))
    }

    fn validate(parms: &EncryptionParameters, sec_level: SecurityLevel) -> Result<usize> {
        if parms.scheme() != SchemeType::CKKS {
            return Err(reject(format!("scheme {:?} is not supported", parms.scheme())));
        }
        let poly_modulus_degree = parms.poly_modulus_degree();
        let coeff_count_power = Self::check_degree(poly_modulus_degree)?;

        let coeff_modulus = parms.coeff_modulus();
        // One data prime and the special prime at the very least.
        if coeff_modulus.len() < 2 || coeff_modulus.len() > util::HE_COEFF_MOD_COUNT_MAX {
            return Err(reject(format!(
                "{} primes given, need between 2 and {}", coeff_modulus.len(), util::HE_COEFF_MOD_COUNT_MAX
            )));
        }
        let m = 2 * poly_modulus_degree as u64;
        for modulus in coeff_modulus {
            if !(util::HE_USER_MOD_BIT_COUNT_MIN..=util::HE_USER_MOD_BIT_COUNT_MAX).contains(&modulus.bit_count()) {
                return Err(reject(format!("modulus {} has an unsupported bit count {}", modulus, modulus.bit_count())));
            }
            if !modulus.is_prime() {
                return Err(reject(format!("modulus {} is not prime", modulus)));
            }
            if modulus.value() % m != 1 {
                return Err(reject(format!("modulus {} is not congruent to 1 modulo {}", modulus, m)));
            }
        }

        let total_bit_count = coeff_modulus.iter()
            .fold(BigUint::from(1u64), |acc, x| acc * x.value())
            .bits() as usize;
        if let Some(max) = util::he_standard_params::max_coeff_bit_count(poly_modulus_degree, sec_level) {
            if total_bit_count > max {
                return Err(reject(format!(
                    "modulus chain of {} bits exceeds the {} bit budget of degree {} at {:?}",
                    total_bit_count, max, poly_modulus_degree, sec_level
                )));
            }
        }
        Ok(coeff_count_power)
    }

    /// Validates the parameters and builds the whole modulus switching chain.
    pub fn new(parms: EncryptionParameters, sec_level: SecurityLevel) -> Result<Arc<Self>> {
        let coeff_count_power = Self::validate(&parms, sec_level)?;
        let poly_modulus_degree = parms.poly_modulus_degree();
        let key_moduli = parms.coeff_modulus().to_vec();

        // Key level first, then every data level down to a single prime.
        let top = key_moduli.len() - 1;
        let mut levels = Vec::with_capacity(top + 1);
        levels.push(ContextData::new(parms.clone(), top)?);
        let mut current = parms;
        for chain_index in (0..top).rev() {
            current = current.drop_last_modulus();
            levels.push(ContextData::new(current.clone(), chain_index)?);
        }

        for i in 0..levels.len() {
            if i > 0 {
                levels[i].prev_parms_id = Some(*levels[i - 1].parms_id());
            }
            if i + 1 < levels.len() {
                levels[i].next_parms_id = Some(*levels[i + 1].parms_id());
            }
        }

        // chain[l] holds the fingerprint of chain index l.
        let chain: Vec<ParmsID> = levels.iter().rev().map(|c| *c.parms_id()).collect();
        let key_parms_id = chain[top];
        let first_parms_id = chain[top - 1];
        let last_parms_id = chain[0];

        info!(
            degree = poly_modulus_degree,
            data_primes = top,
            total_bits = levels[0].total_coeff_modulus_bit_count(),
            ?sec_level,
            "created CKKS context"
        );

        let context_data_map = levels.into_iter()
            .map(|c| (*c.parms_id(), Arc::new(c)))
            .collect();

        Ok(Arc::new(HeContext {
            poly_modulus_degree,
            key_parms_id,
            first_parms_id,
            last_parms_id,
            context_data_map,
            chain,
            key_moduli,
            galois_tool: GaloisTool::new(coeff_count_power),
            sec_level,
            scale_state: Mutex::new(ScaleState::default()),
        }))
    }

    /// Get the [ParmsID] of the key level.
    pub fn key_parms_id(&self) -> &ParmsID {
        &self.key_parms_id
    }

    /// Get the [ParmsID] of the first ciphertext level.
    pub fn first_parms_id(&self) -> &ParmsID {
        &self.first_parms_id
    }

    /// Get the [ParmsID] of the last ciphertext level.
    pub fn last_parms_id(&self) -> &ParmsID {
        &self.last_parms_id
    }

    /// Get the [ContextData] pointer of the specified [ParmsID].
    pub fn get_context_data(&self, parms_id: &ParmsID) -> Option<ContextDataPointer> {
        self.context_data_map.get(parms_id).cloned()
    }

    pub(crate) fn key_context_data(&self) -> Result<ContextDataPointer> {
        self.get_context_data(&self.key_parms_id)
            .ok_or(CkksError::UnknownFingerprint(self.key_parms_id))
    }

    /// [ContextData] of a data level.
    pub fn context_data_at(&self, level: usize) -> Result<ContextDataPointer> {
        let parms_id = self.fingerprint_at(level)?;
        self.get_context_data(&parms_id).ok_or(CkksError::UnknownFingerprint(parms_id))
    }

    /// Get the security level of this set of encryption parameters.
    pub fn security_level(&self) -> SecurityLevel {
        self.sec_level
    }

    pub fn poly_modulus_degree(&self) -> usize {
        self.poly_modulus_degree
    }

    /// Number of complex slots, N/2.
    pub fn slot_count(&self) -> usize {
        self.poly_modulus_degree >> 1
    }

    /// Highest data level, one less than the number of data primes.
    pub fn top_level(&self) -> usize {
        self.chain.len() - 2
    }

    /// Fingerprint of the moduli active at a data level.
    pub fn fingerprint_at(&self, level: usize) -> Result<ParmsID> {
        if level > self.top_level() {
            return Err(CkksError::InvalidParameters(format!(
                "level {} is above the top level {}", level, self.top_level()
            )));
        }
        Ok(self.chain[level])
    }

    /// The data level a fingerprint belongs to. `None` for the key level and
    /// for fingerprints of other contexts.
    pub fn level_of(&self, parms_id: &ParmsID) -> Option<usize> {
        if parms_id == &self.key_parms_id {
            return None;
        }
        self.context_data_map.get(parms_id).map(|c| c.chain_index())
    }

    /// The data primes q_0..q_{L-1}.
    pub fn modulus_chain(&self) -> Vec<BigUint> {
        let data = &self.key_moduli[..self.key_moduli.len() - 1];
        data.iter().map(|m| BigUint::from(m.value())).collect()
    }

    /// The special prime P used only while key-switching.
    pub fn auxiliary_modulus_chain(&self) -> Vec<BigUint> {
        let special = &self.key_moduli[self.key_moduli.len() - 1..];
        special.iter().map(|m| BigUint::from(m.value())).collect()
    }

    pub fn galois_tool(&self) -> &GaloisTool {
        &self.galois_tool
    }

    fn scale_state(&self) -> MutexGuard<'_, ScaleState> {
        // The state holds plain values, so a poisoned lock is still consistent.
        self.scale_state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the default scale the encoder uses when none is given.
    /// Fails with [CkksError::InvalidState] once any key has been generated.
    pub fn set_global_scale(&self, scale: f64) -> Result<()> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(CkksError::InvalidParameters(format!("scale {} must be positive and finite", scale)));
        }
        let mut state = self.scale_state();
        if state.keys_generated {
            warn!(scale, "global scale change after key generation");
            return Err(CkksError::InvalidState(
                "the global scale cannot change after keys have been generated".into()
            ));
        }
        state.global_scale = Some(scale);
        Ok(())
    }

    /// The default scale, if one has been set.
    pub fn global_scale(&self) -> Option<f64> {
        self.scale_state().global_scale
    }

    pub(crate) fn mark_keys_generated(&self) {
        self.scale_state().keys_generated = true;
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_layout() {
        let context = HeContext::create(8192, &[60, 40, 40, 60]).unwrap();
        assert_eq!(context.top_level(), 2);
        assert_eq!(context.slot_count(), 4096);
        assert_eq!(context.security_level(), SecurityLevel::Tc128);

        let q = context.modulus_chain();
        let p = context.auxiliary_modulus_chain();
        assert_eq!(q.len(), 3);
        assert_eq!(p.len(), 1);
        assert_eq!(q[0].bits(), 60);
        assert_eq!(q[1].bits(), 40);
        assert_eq!(p[0].bits(), 60);
        assert_ne!(q[0], p[0]);

        let key = context.get_context_data(context.key_parms_id()).unwrap();
        assert_eq!(key.chain_index(), 3);
        assert_eq!(key.coeff_modulus_size(), 4);
        assert_eq!(key.prev_parms_id(), None);
        assert_eq!(key.next_parms_id(), Some(context.first_parms_id()));

        for level in 0..=2 {
            let data = context.context_data_at(level).unwrap();
            assert_eq!(data.chain_index(), level);
            assert_eq!(data.coeff_modulus_size(), level + 1);
            for (m, q) in data.parms().coeff_modulus().iter().zip(q.iter()) {
                assert_eq!(&BigUint::from(m.value()), q);
            }
            assert_eq!(context.level_of(data.parms_id()), Some(level));
        }
        assert_eq!(context.level_of(context.key_parms_id()), None);
        assert_eq!(context.fingerprint_at(0).unwrap(), *context.last_parms_id());
        assert_eq!(context.fingerprint_at(2).unwrap(), *context.first_parms_id());
        assert!(context.fingerprint_at(3).is_err());
        assert_eq!(context.context_data_at(0).unwrap().next_parms_id(), None);
    }

    #[test]
    fn test_fingerprints_are_deterministic() {
        let a = HeContext::create(4096, &[40, 30, 31]).unwrap();
        let b = HeContext::create(4096, &[40, 30, 31]).unwrap();
        let c = HeContext::create(4096, &[40, 30, 32]).unwrap();
        for level in 0..=a.top_level() {
            assert_eq!(a.fingerprint_at(level).unwrap(), b.fingerprint_at(level).unwrap());
        }
        assert_ne!(a.fingerprint_at(1).unwrap(), a.fingerprint_at(0).unwrap());
        // Same data primes, different special prime: only the key level differs.
        assert_eq!(a.fingerprint_at(1).unwrap(), c.fingerprint_at(1).unwrap());
        assert_ne!(a.key_parms_id(), c.key_parms_id());
        assert_eq!(c.level_of(a.key_parms_id()), None);
    }

    #[test]
    fn test_create_rejects_bad_parameters() {
        let invalid = |r: Result<Arc<HeContext>>| matches!(r, Err(CkksError::InvalidParameters(_)));
        assert!(invalid(HeContext::create(1000, &[30, 30])));
        assert!(invalid(HeContext::create(512, &[20, 20])));
        assert!(invalid(HeContext::create(65536, &[60, 60])));
        assert!(invalid(HeContext::create(8192, &[60])));
        assert!(invalid(HeContext::create(8192, &[61, 40])));
        assert!(invalid(HeContext::create(8192, &[1, 40])));
        // 240 bits is above the 218 bit budget of degree 8192.
        assert!(invalid(HeContext::create(8192, &[60, 60, 60, 60])));
        assert!(HeContext::create_with_security(8192, &[60, 60, 60, 60], SecurityLevel::None).is_ok());
        assert!(invalid(HeContext::create_with_security(8192, &[60, 40, 40, 60], SecurityLevel::Tc256)));
    }

    #[test]
    fn test_new_rejects_bad_moduli() {
        // Primes that are 1 mod 4096 are also 1 mod 2048.
        let moduli = CoeffModulus::create(2048, &[30, 30]).unwrap();
        let parms = EncryptionParameters::new(SchemeType::CKKS)
            .set_poly_modulus_degree(1024)
            .set_coeff_modulus(&moduli);
        assert!(HeContext::new(parms, SecurityLevel::None).is_ok());

        let composite = [Modulus::new(4097 * 3).unwrap(), moduli[0]];
        let parms = EncryptionParameters::new(SchemeType::CKKS)
            .set_poly_modulus_degree(1024)
            .set_coeff_modulus(&composite);
        assert!(HeContext::new(parms, SecurityLevel::None).is_err());

        // 12289 is prime but only 1 modulo 4096, not 8192.
        let not_ntt_friendly = [Modulus::new(12289).unwrap(), moduli[0]];
        let parms = EncryptionParameters::new(SchemeType::CKKS)
            .set_poly_modulus_degree(4096)
            .set_coeff_modulus(&not_ntt_friendly);
        assert!(HeContext::new(parms, SecurityLevel::None).is_err());

        let parms = EncryptionParameters::new(SchemeType::None)
            .set_poly_modulus_degree(1024)
            .set_coeff_modulus(&moduli);
        assert!(HeContext::new(parms, SecurityLevel::None).is_err());
    }

    #[test]
    fn test_global_scale_freezes_after_keygen() {
        let context = HeContext::create_with_security(1024, &[30, 30], SecurityLevel::None).unwrap();
        assert_eq!(context.global_scale(), None);
        assert!(context.set_global_scale(-1.0).is_err());
        context.set_global_scale(2f64.powi(20)).unwrap();
        assert_eq!(context.global_scale(), Some(2f64.powi(20)));
        context.mark_keys_generated();
        assert!(matches!(context.set_global_scale(2f64.powi(30)), Err(CkksError::InvalidState(_))));
        assert_eq!(context.global_scale(), Some(2f64.powi(20)));
    }

    #[test]
    fn test_global_scale_frozen_under_contention() {
        for _ in 0..20 {
            let context = HeContext::create_with_security(1024, &[30, 30], SecurityLevel::None).unwrap();
            let frozen = std::thread::scope(|scope| {
                let setter = scope.spawn(|| {
                    let mut exponent = 10;
                    while context.set_global_scale(2f64.powi(exponent)).is_ok() {
                        exponent = 10 + (exponent + 1) % 20;
                    }
                });
                let frozen = scope.spawn(|| {
                    context.mark_keys_generated();
                    context.global_scale()
                }).join().unwrap();
                setter.join().unwrap();
                frozen
            });
            // No store may land once the flag is up.
            assert_eq!(context.global_scale(), frozen);
        }
    }
}
