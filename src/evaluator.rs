use std::borrow::Cow;
use std::sync::Arc;

use itertools::izip;
use num_bigint::BigUint;
use num_traits::FromPrimitive;
use rayon::prelude::*;
use tracing::{debug, instrument, warn};

use crate::{
    context::ContextData,
    error::{CkksError, Result},
    polymod,
    util::{self, MultiplyU64ModOperand, HE_CIPHERTEXT_SIZE_MAX, HE_CIPHERTEXT_SIZE_MIN, HE_RESCALE_SNAP_TOLERANCE},
    Ciphertext, GaloisKeys, HeContext, KSwitchKeys, ParmsID, Plaintext, RelinKeys,
};

/// Follow-up steps an [Evaluator] takes on its own.
///
/// - `auto_relin`: products are relinearized with the key given to
///   [Evaluator::set_relin_keys].
/// - `auto_rescale`: products are rescaled once. When the dropped prime is
///   within [HE_RESCALE_SNAP_TOLERANCE] of the second factor's scale, the
///   result takes the first operand's scale exactly, so it can be added to
///   fresh ciphertexts of that scale.
/// - `auto_mod_switch`: binary operations bring the operand at the higher
///   level down to the other one's level instead of failing with
///   [CkksError::LevelMismatch].
///
/// An [Evaluator] starts out [EvaluationPolicy::MANUAL].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EvaluationPolicy {
    pub auto_relin: bool,
    pub auto_rescale: bool,
    pub auto_mod_switch: bool,
}

impl EvaluationPolicy {
    pub const MANUAL: Self = Self { auto_relin: false, auto_rescale: false, auto_mod_switch: false };
    pub const AUTOMATIC: Self = Self { auto_relin: true, auto_rescale: true, auto_mod_switch: true };
}

/// Provides operations on [Ciphertext] objects.
///
/// The arithmetic operations pass through the encryption layer to the
/// encoded vectors and act on them slot-wise, up to the approximation noise
/// CKKS carries.
///
/// ## Arithmetic Operations
/// Addition, subtraction and negation keep the level and scale. Multiplying
/// two ciphertexts of size 2 yields a ciphertext of size 3 whose scale is the
/// product of the input scales. The "plain" variants combine a ciphertext
/// with a [Plaintext] encoded at the same level, the "plain_scalar" variants
/// with one real constant in every slot.
///
/// ## Relinearization and rescaling
/// A size-3 ciphertext is only valid as input to [Evaluator::relinearize],
/// which switches it back to size 2 with the relinearization key (and to
/// decryption). [Evaluator::rescale] then divides by the last prime of the
/// level, dropping one level and bringing the scale back down. A ciphertext
/// at level 0 cannot be rescaled any further. An [EvaluationPolicy] can take
/// these steps, and level alignment, off the caller's hands.
///
/// ## Rotations
/// [Evaluator::rotate] cyclically shifts the slots; positive steps move slot
/// `i + step` into slot `i`. [Evaluator::conjugate] conjugates every slot.
/// Both require [GaloisKeys] for the corresponding Galois element.
///
/// ## Operand checks
/// Every operation validates its operands before touching any of them:
/// operands from another context fail with [CkksError::ParameterMismatch],
/// operands at different levels with [CkksError::LevelMismatch], different
/// scales with [CkksError::ScaleMismatch] and ciphertexts of the wrong size
/// with [CkksError::InvalidCiphertextDegree]. A failed `_inplace` call leaves
/// its operand as it was.
///
/// - See [RelinKeys] for more details on relinearization keys.
/// - See [GaloisKeys] for more details on Galois keys.
pub struct Evaluator {
    context: Arc<HeContext>,
    policy: EvaluationPolicy,
    relin_keys: Option<RelinKeys>,
}

fn reject(error: CkksError) -> CkksError {
    warn!(%error, "operation rejected");
    error
}

/// What a product needs once the tensor step is done, resolved before any
/// operand is touched.
struct FollowUp {
    relin: Option<Arc<ContextData>>,
    rescale: Option<Arc<ContextData>>,
}

/// Smallest `d` with `2^d >= exponent`: the levels [Evaluator::power] uses.
fn power_depth(exponent: u64) -> usize {
    exponent.next_power_of_two().trailing_zeros() as usize
}

impl Evaluator {

    /// Create a evaluator with the specified [HeContext].
    pub fn new(context: Arc<HeContext>) -> Self {
        Self {
            context,
            policy: EvaluationPolicy::MANUAL,
            relin_keys: None,
        }
    }

    pub fn set_policy(mut self, policy: EvaluationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Key used when the policy relinearizes on its own.
    pub fn set_relin_keys(mut self, relin_keys: RelinKeys) -> Self {
        self.relin_keys = Some(relin_keys);
        self
    }

    pub fn policy(&self) -> EvaluationPolicy {
        self.policy
    }

    pub fn context(&self) -> &Arc<HeContext> {
        &self.context
    }

    fn context_data_of(&self, ciphertext: &Ciphertext, operand: &'static str) -> Result<Arc<ContextData>> {
        self.context.level_of(ciphertext.parms_id())
            .and_then(|_| self.context.get_context_data(ciphertext.parms_id()))
            .filter(|c| {
                ciphertext.coeff_modulus_size() == c.coeff_modulus_size()
                    && ciphertext.data().len() == ciphertext.size() * c.coeff_modulus_size() * c.poly_modulus_degree()
            })
            .ok_or_else(|| reject(CkksError::ParameterMismatch { operand }))
    }

    fn check_size(ciphertext: &Ciphertext, operation: &'static str) -> Result<()> {
        if ciphertext.size() != HE_CIPHERTEXT_SIZE_MIN {
            return Err(reject(CkksError::InvalidCiphertextDegree { operation, size: ciphertext.size() }));
        }
        Ok(())
    }

    fn match_scale(expected: f64, actual: f64) -> Result<()> {
        if !util::are_close_f64(expected, actual) {
            return Err(reject(CkksError::ScaleMismatch { expected, actual }));
        }
        Ok(())
    }

    fn check_scale_bound(scale: f64, context_data: &ContextData) -> Result<()> {
        let bound = context_data.total_coeff_modulus_bit_count() as f64;
        if !scale.is_finite() || scale <= 0.0 || scale.log2() >= bound {
            return Err(reject(CkksError::InvalidParameters(format!(
                "scale 2^{:.1} does not fit in the {}-bit modulus of level {}",
                scale.log2(), bound, context_data.chain_index()
            ))));
        }
        Ok(())
    }

    /// Drops the primes above `context_data`'s level, keeping the scale.
    fn lower_inplace(encrypted: &mut Ciphertext, context_data: &ContextData) {
        if encrypted.parms_id() != context_data.parms_id() {
            let data = Self::drop_limbs(encrypted, context_data.coeff_modulus_size());
            let size = encrypted.size();
            encrypted.reset_level(context_data, size, data);
        }
    }

    fn lowered<'a>(encrypted: &'a Ciphertext, context_data: &ContextData) -> Cow<'a, Ciphertext> {
        if encrypted.parms_id() == context_data.parms_id() {
            return Cow::Borrowed(encrypted);
        }
        let mut switched = encrypted.clone();
        Self::lower_inplace(&mut switched, context_data);
        Cow::Owned(switched)
    }

    /// Level two operands meet at: the common one, or with `auto_mod_switch`
    /// the lower of the two.
    fn meeting_level(
        &self,
        context_data1: Arc<ContextData>,
        context_data2: Arc<ContextData>,
    ) -> Result<Arc<ContextData>> {
        if context_data1.parms_id() == context_data2.parms_id() {
            return Ok(context_data1);
        }
        if !self.policy.auto_mod_switch {
            return Err(reject(CkksError::LevelMismatch {
                expected: context_data1.chain_index(),
                actual: context_data2.chain_index(),
            }));
        }
        Ok(if context_data1.chain_index() < context_data2.chain_index() {context_data1} else {context_data2})
    }

    /// Checks a pair of size-2 ciphertexts for a binary operation. Returns
    /// the level they meet at and the second operand brought to it; the
    /// caller lowers the first one once every other check has passed.
    fn check_pair<'a>(
        &self,
        encrypted1: &Ciphertext,
        encrypted2: &'a Ciphertext,
        operation: &'static str,
    ) -> Result<(Arc<ContextData>, Cow<'a, Ciphertext>)> {
        let context_data1 = self.context_data_of(encrypted1, "first operand")?;
        let context_data2 = self.context_data_of(encrypted2, "second operand")?;
        Self::check_size(encrypted1, operation)?;
        Self::check_size(encrypted2, operation)?;
        let context_data = self.meeting_level(context_data1, context_data2)?;
        let encrypted2 = Self::lowered(encrypted2, &context_data);
        Ok((context_data, encrypted2))
    }

    fn check_plain<'a>(
        &self,
        encrypted: &Ciphertext,
        plain: &'a Plaintext,
        operation: &'static str,
    ) -> Result<(Arc<ContextData>, Cow<'a, Plaintext>)> {
        let context_data = self.context_data_of(encrypted, "ciphertext")?;
        let plain_context_data = self.context.level_of(plain.parms_id())
            .and_then(|_| self.context.get_context_data(plain.parms_id()))
            .filter(|c| plain.data().len() == c.coeff_modulus_size() * c.poly_modulus_degree())
            .ok_or_else(|| reject(CkksError::ParameterMismatch { operand: "plaintext" }))?;
        Self::check_size(encrypted, operation)?;
        let context_data = self.meeting_level(context_data, plain_context_data)?;
        if plain.parms_id() == context_data.parms_id() {
            return Ok((context_data, Cow::Borrowed(plain)));
        }
        // NTT form keeps limbs independent, so dropping the upper ones is exact.
        let mut switched = Plaintext::from_context_data(&context_data, plain.scale());
        let len = switched.data().len();
        switched.data_mut().copy_from_slice(&plain.data()[..len]);
        Ok((context_data, Cow::Owned(switched)))
    }

    fn check_kswitch_keys(&self, keys: &KSwitchKeys, context_data: &ContextData, operand: &'static str) -> Result<()> {
        if keys.parms_id() != self.context.key_parms_id() {
            return Err(reject(CkksError::ParameterMismatch { operand }));
        }
        let key_context_data = self.context.key_context_data()?;
        let key_poly_len = key_context_data.coeff_modulus_size() * key_context_data.poly_modulus_degree();
        let well_formed = keys.len() >= context_data.coeff_modulus_size()
            && keys.data().iter().all(|k| {
                k.parms_id() == self.context.key_parms_id()
                    && k.as_ciphertext().size() == HE_CIPHERTEXT_SIZE_MIN
                    && k.data().len() == HE_CIPHERTEXT_SIZE_MIN * key_poly_len
            });
        if !well_formed {
            return Err(reject(CkksError::ParameterMismatch { operand }));
        }
        Ok(())
    }

    /// Resolves the policy's follow-up for a product of `size` polynomials
    /// at `context_data`'s level.
    fn plan_follow_up(&self, context_data: &ContextData, size: usize) -> Result<FollowUp> {
        let relin = if self.policy.auto_relin && size == HE_CIPHERTEXT_SIZE_MAX {
            let keys = self.relin_keys.as_ref()
                .map(|k| k.as_kswitch_keys())
                .filter(|k| !k.is_empty())
                .ok_or_else(|| reject(CkksError::MissingKey(
                    "automatic relinearization needs a relinearization key".into()
                )))?;
            self.check_kswitch_keys(keys, context_data, "relinearization key")?;
            Some(self.context.key_context_data()?)
        } else {
            None
        };
        let rescale = if self.policy.auto_rescale {
            Some(self.next_context_data(context_data)?)
        } else {
            None
        };
        Ok(FollowUp { relin, rescale })
    }

    fn apply_follow_up(&self, encrypted: &mut Ciphertext, context_data: &ContextData, follow_up: FollowUp, base_scale: f64) {
        if let (Some(key_context_data), Some(relin_keys)) = (&follow_up.relin, &self.relin_keys) {
            let target = encrypted.poly(2).to_vec();
            encrypted.truncate(HE_CIPHERTEXT_SIZE_MIN);
            self.switch_key_inplace(encrypted, key_context_data, &target, relin_keys.as_kswitch_keys());
        }
        if let Some(next) = &follow_up.rescale {
            self.rescale_to_next_unchecked(encrypted, context_data, next);
            if (encrypted.scale() / base_scale - 1.0).abs() < HE_RESCALE_SNAP_TOLERANCE {
                encrypted.set_scale(base_scale);
            }
        }
    }

    /// Residues of `round(value * scale)` at `context_data`'s level. A
    /// constant polynomial is the same in NTT form, so these act on every
    /// slot at once.
    fn scalar_residues(value: f64, scale: f64, context_data: &ContextData) -> Result<Vec<u64>> {
        let scaled = (value * scale).round();
        let total_bits = context_data.total_coeff_modulus_bit_count() as f64;
        if !scaled.is_finite() || scaled.abs().max(1.0).log2() + 1.0 >= total_bits {
            return Err(reject(CkksError::InvalidParameters(format!(
                "constant {} at scale {} does not fit in the {}-bit modulus", value, scale, total_bits
            ))));
        }
        let magnitude = BigUint::from_f64(scaled.abs()).unwrap_or_default();
        let coeff_modulus = context_data.parms().coeff_modulus();
        Ok(context_data.rns_tool().base_q().decompose(&magnitude).into_iter()
            .zip(coeff_modulus)
            .map(|(r, m)| if scaled < 0.0 {util::negate_u64_mod(r, m)} else {r})
            .collect())
    }

    /// Negates a ciphertext in place.
    pub fn negate_inplace(&self, encrypted: &mut Ciphertext) -> Result<()> {
        let context_data = self.context_data_of(encrypted, "ciphertext")?;
        Self::check_size(encrypted, "negate")?;
        let coeff_count = context_data.poly_modulus_degree();
        let coeff_modulus = context_data.parms().coeff_modulus();
        let size = encrypted.size();
        polymod::negate_inplace_ps(encrypted.data_mut(), size, coeff_count, coeff_modulus);
        Ok(())
    }

    pub fn negate(&self, encrypted: &Ciphertext) -> Result<Ciphertext> {
        let mut destination = encrypted.clone();
        self.negate_inplace(&mut destination)?;
        Ok(destination)
    }

    /// Adds `encrypted2` to `encrypted1`. Both must sit at the same level
    /// with the same scale.
    pub fn add_inplace(&self, encrypted1: &mut Ciphertext, encrypted2: &Ciphertext) -> Result<()> {
        let (context_data, encrypted2) = self.check_pair(encrypted1, encrypted2, "add")?;
        Self::match_scale(encrypted1.scale(), encrypted2.scale())?;
        Self::lower_inplace(encrypted1, &context_data);
        let coeff_count = context_data.poly_modulus_degree();
        let coeff_modulus = context_data.parms().coeff_modulus();
        let size = encrypted1.size();
        polymod::add_inplace_ps(encrypted1.data_mut(), encrypted2.data(), size, coeff_count, coeff_modulus);
        Ok(())
    }

    /// Same as [Evaluator::add_inplace], returning a new ciphertext.
    pub fn add(&self, encrypted1: &Ciphertext, encrypted2: &Ciphertext) -> Result<Ciphertext> {
        let mut destination = encrypted1.clone();
        self.add_inplace(&mut destination, encrypted2)?;
        Ok(destination)
    }

    /// Subtracts `encrypted2` from `encrypted1`.
    pub fn sub_inplace(&self, encrypted1: &mut Ciphertext, encrypted2: &Ciphertext) -> Result<()> {
        let (context_data, encrypted2) = self.check_pair(encrypted1, encrypted2, "sub")?;
        Self::match_scale(encrypted1.scale(), encrypted2.scale())?;
        Self::lower_inplace(encrypted1, &context_data);
        let coeff_count = context_data.poly_modulus_degree();
        let coeff_modulus = context_data.parms().coeff_modulus();
        let size = encrypted1.size();
        polymod::sub_inplace_ps(encrypted1.data_mut(), encrypted2.data(), size, coeff_count, coeff_modulus);
        Ok(())
    }

    pub fn sub(&self, encrypted1: &Ciphertext, encrypted2: &Ciphertext) -> Result<Ciphertext> {
        let mut destination = encrypted1.clone();
        self.sub_inplace(&mut destination, encrypted2)?;
        Ok(destination)
    }

    /// Tensor product of two size-2 ciphertexts at `context_data`'s level.
    fn tensor_inplace(encrypted1: &mut Ciphertext, encrypted2: &Ciphertext, context_data: &ContextData) {
        let coeff_count = context_data.poly_modulus_degree();
        let coeff_modulus = context_data.parms().coeff_modulus();
        let d = coeff_count * coeff_modulus.len();
        let scale = encrypted1.scale() * encrypted2.scale();
        let mut temp = vec![0; 3 * d];
        {
            let (c0, rest) = temp.split_at_mut(d);
            let (c1, c2) = rest.split_at_mut(d);
            polymod::dyadic_product_p(encrypted1.poly(0), encrypted2.poly(0), coeff_count, coeff_modulus, c0);
            polymod::dyadic_product_p(encrypted1.poly(0), encrypted2.poly(1), coeff_count, coeff_modulus, c1);
            polymod::dyadic_product_accumulate_p(encrypted1.poly(1), encrypted2.poly(0), coeff_count, coeff_modulus, c1);
            polymod::dyadic_product_p(encrypted1.poly(1), encrypted2.poly(1), coeff_count, coeff_modulus, c2);
        }
        encrypted1.reset_level(context_data, 3, temp);
        encrypted1.set_scale(scale);
    }

    /// Multiplies two ciphertexts of size 2 into one of size 3 whose scale is
    /// the product of both scales. Relinearize the result before any further
    /// operation but decryption, unless the policy does it.
    #[instrument(skip_all, level = "debug", fields(level = encrypted1.level(), scale = encrypted1.scale()))]
    pub fn multiply_inplace(&self, encrypted1: &mut Ciphertext, encrypted2: &Ciphertext) -> Result<()> {
        let (context_data, encrypted2) = self.check_pair(encrypted1, encrypted2, "multiply")?;
        let base_scale = encrypted1.scale();
        Self::check_scale_bound(base_scale * encrypted2.scale(), &context_data)?;
        let follow_up = self.plan_follow_up(&context_data, HE_CIPHERTEXT_SIZE_MAX)?;

        Self::lower_inplace(encrypted1, &context_data);
        Self::tensor_inplace(encrypted1, &encrypted2, &context_data);
        self.apply_follow_up(encrypted1, &context_data, follow_up, base_scale);
        Ok(())
    }

    /// Same as [Evaluator::multiply_inplace], returning a new ciphertext.
    pub fn multiply(&self, encrypted1: &Ciphertext, encrypted2: &Ciphertext) -> Result<Ciphertext> {
        let mut destination = encrypted1.clone();
        self.multiply_inplace(&mut destination, encrypted2)?;
        Ok(destination)
    }

    /// Squares a ciphertext, yielding size 3.
    pub fn square_inplace(&self, encrypted: &mut Ciphertext) -> Result<()> {
        let context_data = self.context_data_of(encrypted, "ciphertext")?;
        Self::check_size(encrypted, "square")?;
        let base_scale = encrypted.scale();
        Self::check_scale_bound(base_scale * base_scale, &context_data)?;
        let follow_up = self.plan_follow_up(&context_data, HE_CIPHERTEXT_SIZE_MAX)?;

        let coeff_count = context_data.poly_modulus_degree();
        let coeff_modulus = context_data.parms().coeff_modulus();
        let d = coeff_count * coeff_modulus.len();
        let mut temp = vec![0; 3 * d];
        {
            let (c0, rest) = temp.split_at_mut(d);
            let (c1, c2) = rest.split_at_mut(d);
            polymod::dyadic_product_p(encrypted.poly(0), encrypted.poly(0), coeff_count, coeff_modulus, c0);
            polymod::dyadic_product_p(encrypted.poly(0), encrypted.poly(1), coeff_count, coeff_modulus, c1);
            let cross = c1.to_vec();
            polymod::add_inplace_p(c1, &cross, coeff_count, coeff_modulus);
            polymod::dyadic_product_p(encrypted.poly(1), encrypted.poly(1), coeff_count, coeff_modulus, c2);
        }
        encrypted.reset_level(&context_data, 3, temp);
        encrypted.set_scale(base_scale * base_scale);
        self.apply_follow_up(encrypted, &context_data, follow_up, base_scale);
        Ok(())
    }

    pub fn square(&self, encrypted: &Ciphertext) -> Result<Ciphertext> {
        let mut destination = encrypted.clone();
        self.square_inplace(&mut destination)?;
        Ok(destination)
    }

    /// Adds a plaintext to the first polynomial of the ciphertext.
    pub fn add_plain_inplace(&self, encrypted: &mut Ciphertext, plain: &Plaintext) -> Result<()> {
        let (context_data, plain) = self.check_plain(encrypted, plain, "add_plain")?;
        Self::match_scale(encrypted.scale(), plain.scale())?;
        Self::lower_inplace(encrypted, &context_data);
        let coeff_count = context_data.poly_modulus_degree();
        let coeff_modulus = context_data.parms().coeff_modulus();
        polymod::add_inplace_p(encrypted.poly_mut(0), plain.data(), coeff_count, coeff_modulus);
        Ok(())
    }

    pub fn add_plain(&self, encrypted: &Ciphertext, plain: &Plaintext) -> Result<Ciphertext> {
        let mut destination = encrypted.clone();
        self.add_plain_inplace(&mut destination, plain)?;
        Ok(destination)
    }

    /// Subtracts a plaintext from the first polynomial of the ciphertext.
    pub fn sub_plain_inplace(&self, encrypted: &mut Ciphertext, plain: &Plaintext) -> Result<()> {
        let (context_data, plain) = self.check_plain(encrypted, plain, "sub_plain")?;
        Self::match_scale(encrypted.scale(), plain.scale())?;
        Self::lower_inplace(encrypted, &context_data);
        let coeff_count = context_data.poly_modulus_degree();
        let coeff_modulus = context_data.parms().coeff_modulus();
        polymod::sub_inplace_p(encrypted.poly_mut(0), plain.data(), coeff_count, coeff_modulus);
        Ok(())
    }

    pub fn sub_plain(&self, encrypted: &Ciphertext, plain: &Plaintext) -> Result<Ciphertext> {
        let mut destination = encrypted.clone();
        self.sub_plain_inplace(&mut destination, plain)?;
        Ok(destination)
    }

    /// Multiplies both polynomials by a plaintext; the scales multiply.
    pub fn multiply_plain_inplace(&self, encrypted: &mut Ciphertext, plain: &Plaintext) -> Result<()> {
        let (context_data, plain) = self.check_plain(encrypted, plain, "multiply_plain")?;
        let base_scale = encrypted.scale();
        Self::check_scale_bound(base_scale * plain.scale(), &context_data)?;
        let follow_up = self.plan_follow_up(&context_data, HE_CIPHERTEXT_SIZE_MIN)?;

        Self::lower_inplace(encrypted, &context_data);
        let coeff_count = context_data.poly_modulus_degree();
        let coeff_modulus = context_data.parms().coeff_modulus();
        for i in 0..encrypted.size() {
            polymod::dyadic_product_inplace_p(encrypted.poly_mut(i), plain.data(), coeff_count, coeff_modulus);
        }
        encrypted.set_scale(base_scale * plain.scale());
        self.apply_follow_up(encrypted, &context_data, follow_up, base_scale);
        Ok(())
    }

    pub fn multiply_plain(&self, encrypted: &Ciphertext, plain: &Plaintext) -> Result<Ciphertext> {
        let mut destination = encrypted.clone();
        self.multiply_plain_inplace(&mut destination, plain)?;
        Ok(destination)
    }

    fn add_scalar_unchecked(&self, encrypted: &mut Ciphertext, value: f64, context_data: &ContextData) -> Result<()> {
        let residues = Self::scalar_residues(value, encrypted.scale(), context_data)?;
        let coeff_count = context_data.poly_modulus_degree();
        let coeff_modulus = context_data.parms().coeff_modulus();
        polymod::add_scalars_inplace_p(encrypted.poly_mut(0), &residues, coeff_count, coeff_modulus);
        Ok(())
    }

    /// Adds `value` to every slot, encoded at the ciphertext's scale.
    pub fn add_plain_scalar_inplace(&self, encrypted: &mut Ciphertext, value: f64) -> Result<()> {
        let context_data = self.context_data_of(encrypted, "ciphertext")?;
        Self::check_size(encrypted, "add_plain_scalar")?;
        self.add_scalar_unchecked(encrypted, value, &context_data)
    }

    pub fn add_plain_scalar(&self, encrypted: &Ciphertext, value: f64) -> Result<Ciphertext> {
        let mut destination = encrypted.clone();
        self.add_plain_scalar_inplace(&mut destination, value)?;
        Ok(destination)
    }

    /// Subtracts `value` from every slot.
    pub fn sub_plain_scalar_inplace(&self, encrypted: &mut Ciphertext, value: f64) -> Result<()> {
        let context_data = self.context_data_of(encrypted, "ciphertext")?;
        Self::check_size(encrypted, "sub_plain_scalar")?;
        self.add_scalar_unchecked(encrypted, -value, &context_data)
    }

    pub fn sub_plain_scalar(&self, encrypted: &Ciphertext, value: f64) -> Result<Ciphertext> {
        let mut destination = encrypted.clone();
        self.sub_plain_scalar_inplace(&mut destination, value)?;
        Ok(destination)
    }

    /// Multiplies every polynomial by `round(value * scale)`; the ciphertext
    /// scale is multiplied by `scale`.
    fn multiply_scalar_unchecked(&self, encrypted: &mut Ciphertext, value: f64, scale: f64, context_data: &ContextData) -> Result<()> {
        let coeff_count = context_data.poly_modulus_degree();
        let coeff_modulus = context_data.parms().coeff_modulus();
        let operands: Vec<MultiplyU64ModOperand> = Self::scalar_residues(value, scale, context_data)?
            .into_iter()
            .zip(coeff_modulus)
            .map(|(r, m)| MultiplyU64ModOperand::new(r, m))
            .collect();
        for i in 0..encrypted.size() {
            polymod::multiply_operands_inplace_p(encrypted.poly_mut(i), &operands, coeff_count, coeff_modulus);
        }
        encrypted.set_scale(encrypted.scale() * scale);
        Ok(())
    }

    /**
    Multiplies every slot by `value`.

    The constant is encoded at the scale of the level's last prime, so a
    following rescale brings the ciphertext back to its own scale. Fails with
    [CkksError::InvalidParameters] at level 0, where no prime is left to
    absorb that scale.
    */
    pub fn multiply_plain_scalar_inplace(&self, encrypted: &mut Ciphertext, value: f64) -> Result<()> {
        let context_data = self.context_data_of(encrypted, "ciphertext")?;
        Self::check_size(encrypted, "multiply_plain_scalar")?;
        let coeff_modulus = context_data.parms().coeff_modulus();
        let plain_scale = coeff_modulus[coeff_modulus.len() - 1].value() as f64;
        let base_scale = encrypted.scale();
        Self::check_scale_bound(base_scale * plain_scale, &context_data)?;
        // Validates the constant before the operand is touched.
        Self::scalar_residues(value, plain_scale, &context_data)?;
        let follow_up = self.plan_follow_up(&context_data, HE_CIPHERTEXT_SIZE_MIN)?;

        self.multiply_scalar_unchecked(encrypted, value, plain_scale, &context_data)?;
        self.apply_follow_up(encrypted, &context_data, follow_up, base_scale);
        Ok(())
    }

    pub fn multiply_plain_scalar(&self, encrypted: &Ciphertext, value: f64) -> Result<Ciphertext> {
        let mut destination = encrypted.clone();
        self.multiply_plain_scalar_inplace(&mut destination, value)?;
        Ok(destination)
    }

    /**
    Adds target * s' to the ciphertext, re-encrypted under s, where s' is the
    key `kswitch_keys` switches from. `target` is a polynomial in NTT form at
    the ciphertext's level.

    The target is split into one digit per prime of the level. Each digit is
    multiplied with its key over the level's primes plus the special prime P,
    and the sum is divided by P with rounding, which removes the factor P the
    keys carry.
    */
    fn switch_key_inplace(
        &self,
        encrypted: &mut Ciphertext,
        key_context_data: &ContextData,
        target: &[u64],
        kswitch_keys: &KSwitchKeys,
    ) {
        let coeff_count = key_context_data.poly_modulus_degree();
        let key_modulus = key_context_data.parms().coeff_modulus();
        let key_modulus_size = key_modulus.len();
        let key_ntt_tables = key_context_data.small_ntt_tables();
        let modswitch_factors = key_context_data.rns_tool().inv_q_last_mod_q();
        let decomp_modulus_size = encrypted.coeff_modulus_size();
        let rns_modulus_size = decomp_modulus_size + 1;

        let mut target_copied = target.to_vec();
        polymod::intt_inplace_p(&mut target_copied, coeff_count, &key_ntt_tables[..decomp_modulus_size]);

        // poly_prod[i][k]: component k of the key products over output limb i.
        let poly_prod: Vec<[Vec<u64>; 2]> = (0..rns_modulus_size).into_par_iter()
            .map(|i| {
                let key_index = if i == decomp_modulus_size {key_modulus_size - 1} else {i};
                let modulus = &key_modulus[key_index];
                // Products are below 2^120, so up to 256 of them fit in 128 bits.
                let mut accumulator = [vec![0u128; coeff_count], vec![0u128; coeff_count]];
                let mut temp_ntt = vec![0; coeff_count];
                for j in 0..decomp_modulus_size {
                    let operand: &[u64] = if i == j {
                        &target[j * coeff_count..(j + 1) * coeff_count]
                    } else {
                        temp_ntt.iter_mut()
                            .zip(&target_copied[j * coeff_count..(j + 1) * coeff_count])
                            .for_each(|(t, &x)| *t = modulus.reduce(x));
                        key_ntt_tables[key_index].ntt_negacyclic_harvey(&mut temp_ntt);
                        &temp_ntt
                    };
                    for (k, acc) in accumulator.iter_mut().enumerate() {
                        let key = kswitch_keys[j].as_ciphertext().poly_component(k, key_index);
                        for (a, &x, &y) in izip!(acc.iter_mut(), operand, key) {
                            *a += x as u128 * y as u128;
                        }
                    }
                }
                accumulator.map(|acc| acc.into_iter().map(|x| util::barrett_reduce_u128(x, modulus)).collect())
            })
            .collect();

        let special = &key_modulus[key_modulus_size - 1];
        let special_half = special.value() >> 1;
        for k in 0..HE_CIPHERTEXT_SIZE_MIN {
            // Centered representative of the P-limb, in coefficient form.
            let mut t_last = poly_prod[decomp_modulus_size][k].clone();
            key_ntt_tables[key_modulus_size - 1].inverse_ntt_negacyclic_harvey(&mut t_last);
            t_last.iter_mut().for_each(|x| *x = special.reduce(*x + special_half));

            encrypted.poly_mut(k).par_chunks_mut(coeff_count).enumerate()
                .for_each(|(j, destination)| {
                    let modulus = &key_modulus[j];
                    let fix = modulus.reduce(special_half);
                    let mut temp: Vec<u64> = t_last.iter()
                        .map(|&x| util::sub_u64_mod(modulus.reduce(x), fix, modulus))
                        .collect();
                    key_ntt_tables[j].ntt_negacyclic_harvey(&mut temp);
                    for (d, &p, &t) in izip!(destination.iter_mut(), &poly_prod[j][k], &temp) {
                        let scaled = util::multiply_u64operand_mod(util::sub_u64_mod(p, t, modulus), &modswitch_factors[j], modulus);
                        *d = util::add_u64_mod(*d, scaled, modulus);
                    }
                });
        }
    }

    /// Brings a size-3 ciphertext back to size 2 with the relinearization
    /// key. Ciphertexts already of size 2 are left as they are.
    ///
    /// Fails with [CkksError::MissingKey] if `relin_keys` holds no key.
    #[instrument(skip_all, level = "debug", fields(level = encrypted.level(), scale = encrypted.scale()))]
    pub fn relinearize_inplace(&self, encrypted: &mut Ciphertext, relin_keys: &RelinKeys) -> Result<()> {
        let context_data = self.context_data_of(encrypted, "ciphertext")?;
        match encrypted.size() {
            2 => return Ok(()),
            3 => {}
            size => return Err(reject(CkksError::InvalidCiphertextDegree { operation: "relinearize", size })),
        }
        let keys = relin_keys.as_kswitch_keys();
        if keys.is_empty() {
            return Err(reject(CkksError::MissingKey("no relinearization key supplied".into())));
        }
        self.check_kswitch_keys(keys, &context_data, "relinearization key")?;
        let key_context_data = self.context.key_context_data()?;

        let target = encrypted.poly(2).to_vec();
        encrypted.truncate(2);
        self.switch_key_inplace(encrypted, &key_context_data, &target, keys);
        Ok(())
    }

    /// Same as [Evaluator::relinearize_inplace], returning a new ciphertext.
    pub fn relinearize(&self, encrypted: &Ciphertext, relin_keys: &RelinKeys) -> Result<Ciphertext> {
        let mut destination = encrypted.clone();
        self.relinearize_inplace(&mut destination, relin_keys)?;
        Ok(destination)
    }

    /// Next level down from `context_data`, or [CkksError::LevelExhausted] at level 0.
    fn next_context_data(&self, context_data: &ContextData) -> Result<Arc<ContextData>> {
        if context_data.chain_index() == 0 {
            return Err(reject(CkksError::LevelExhausted));
        }
        context_data.next_parms_id()
            .and_then(|parms_id| self.context.get_context_data(parms_id))
            .ok_or(CkksError::LevelExhausted)
    }

    /// Keeps the first `limbs` limbs of every polynomial.
    fn drop_limbs(encrypted: &Ciphertext, limbs: usize) -> Vec<u64> {
        let coeff_count = encrypted.poly_modulus_degree();
        (0..encrypted.size())
            .flat_map(|i| encrypted.poly(i)[..limbs * coeff_count].iter().copied())
            .collect()
    }

    fn rescale_to_next_unchecked(&self, encrypted: &mut Ciphertext, context_data: &ContextData, next: &ContextData) {
        let rns_tool = context_data.rns_tool();
        let ntt_tables = context_data.small_ntt_tables();
        let q_last = context_data.parms().coeff_modulus()[context_data.coeff_modulus_size() - 1].value();
        for i in 0..encrypted.size() {
            rns_tool.divide_and_round_q_last_ntt_inplace(encrypted.poly_mut(i), ntt_tables);
        }
        let data = Self::drop_limbs(encrypted, next.coeff_modulus_size());
        let size = encrypted.size();
        let scale = encrypted.scale() / q_last as f64;
        encrypted.reset_level(next, size, data);
        encrypted.set_scale(scale);
    }

    /// Divides by the last prime of the level, with rounding. The level
    /// drops by one and the scale is divided by that prime.
    ///
    /// Fails with [CkksError::LevelExhausted] at level 0.
    #[instrument(skip_all, level = "debug", fields(level = encrypted.level(), scale = encrypted.scale()))]
    pub fn rescale_inplace(&self, encrypted: &mut Ciphertext) -> Result<()> {
        let context_data = self.context_data_of(encrypted, "ciphertext")?;
        Self::check_size(encrypted, "rescale")?;
        let next = self.next_context_data(&context_data)?;
        self.rescale_to_next_unchecked(encrypted, &context_data, &next);
        debug!(level = encrypted.level(), scale = encrypted.scale(), "rescaled");
        Ok(())
    }

    /// Same as [Evaluator::rescale_inplace], returning a new ciphertext.
    pub fn rescale(&self, encrypted: &Ciphertext) -> Result<Ciphertext> {
        let mut destination = encrypted.clone();
        self.rescale_inplace(&mut destination)?;
        Ok(destination)
    }

    /// Level a fingerprint denotes, which must not lie above `current`.
    fn target_level(&self, parms_id: &ParmsID, current: usize) -> Result<usize> {
        let target = self.context.level_of(parms_id)
            .ok_or_else(|| reject(CkksError::ParameterMismatch { operand: "target fingerprint" }))?;
        if target > current {
            return Err(reject(CkksError::LevelMismatch { expected: target, actual: current }));
        }
        Ok(target)
    }

    /// Rescales repeatedly down to the level of `parms_id`.
    pub fn rescale_to_inplace(&self, encrypted: &mut Ciphertext, parms_id: &ParmsID) -> Result<()> {
        self.context_data_of(encrypted, "ciphertext")?;
        Self::check_size(encrypted, "rescale")?;
        let target = self.target_level(parms_id, encrypted.level())?;
        while encrypted.level() > target {
            let context_data = self.context_data_of(encrypted, "ciphertext")?;
            let next = self.next_context_data(&context_data)?;
            self.rescale_to_next_unchecked(encrypted, &context_data, &next);
        }
        Ok(())
    }

    pub fn rescale_to(&self, encrypted: &Ciphertext, parms_id: &ParmsID) -> Result<Ciphertext> {
        let mut destination = encrypted.clone();
        self.rescale_to_inplace(&mut destination, parms_id)?;
        Ok(destination)
    }

    /// Drops the last prime of the level without dividing, keeping the scale.
    /// Used to bring a ciphertext down to the level of another operand.
    pub fn mod_switch_to_next_inplace(&self, encrypted: &mut Ciphertext) -> Result<()> {
        let context_data = self.context_data_of(encrypted, "ciphertext")?;
        Self::check_size(encrypted, "mod_switch_to_next")?;
        let next = self.next_context_data(&context_data)?;
        let data = Self::drop_limbs(encrypted, next.coeff_modulus_size());
        let size = encrypted.size();
        encrypted.reset_level(&next, size, data);
        Ok(())
    }

    pub fn mod_switch_to_next(&self, encrypted: &Ciphertext) -> Result<Ciphertext> {
        let mut destination = encrypted.clone();
        self.mod_switch_to_next_inplace(&mut destination)?;
        Ok(destination)
    }

    /// Drops primes until the ciphertext sits at the level of `parms_id`.
    pub fn mod_switch_to_inplace(&self, encrypted: &mut Ciphertext, parms_id: &ParmsID) -> Result<()> {
        self.context_data_of(encrypted, "ciphertext")?;
        Self::check_size(encrypted, "mod_switch_to")?;
        let target = self.target_level(parms_id, encrypted.level())?;
        if target == encrypted.level() {
            return Ok(());
        }
        let target_context_data = self.context.context_data_at(target)?;
        let data = Self::drop_limbs(encrypted, target_context_data.coeff_modulus_size());
        let size = encrypted.size();
        encrypted.reset_level(&target_context_data, size, data);
        Ok(())
    }

    pub fn mod_switch_to(&self, encrypted: &Ciphertext, parms_id: &ParmsID) -> Result<Ciphertext> {
        let mut destination = encrypted.clone();
        self.mod_switch_to_inplace(&mut destination, parms_id)?;
        Ok(destination)
    }

    /// Applies X -> X^galois_elt and switches the result back under s.
    fn apply_galois_inplace(&self, encrypted: &mut Ciphertext, context_data: &ContextData, galois_elt: usize, galois_keys: &GaloisKeys) -> Result<()> {
        let keys = galois_keys.key(galois_elt)
            .ok_or_else(|| reject(CkksError::MissingKey(format!("no Galois key for element {}", galois_elt))))?;
        if galois_keys.parms_id() != self.context.key_parms_id() {
            return Err(reject(CkksError::ParameterMismatch { operand: "galois keys" }));
        }
        self.check_kswitch_keys(keys, context_data, "galois keys")?;
        let key_context_data = self.context.key_context_data()?;

        let galois_tool = self.context.galois_tool();
        let d = context_data.coeff_modulus_size() * context_data.poly_modulus_degree();
        let mut c0 = vec![0; d];
        galois_tool.apply_ntt_p(encrypted.poly(0), galois_elt, &mut c0);
        let mut target = vec![0; d];
        galois_tool.apply_ntt_p(encrypted.poly(1), galois_elt, &mut target);

        encrypted.poly_mut(0).copy_from_slice(&c0);
        encrypted.poly_mut(1).fill(0);
        self.switch_key_inplace(encrypted, &key_context_data, &target, keys);
        Ok(())
    }

    /// Rotates the slots cyclically: slot `i` of the result holds slot
    /// `i + step` of the input, so positive steps rotate left and negative
    /// steps right. Step 0 leaves the ciphertext unchanged.
    ///
    /// Fails with [CkksError::InvalidRotation] if `|step| > N/2 - 1` and with
    /// [CkksError::MissingKey] if `galois_keys` has no key for the step.
    #[instrument(skip_all, level = "debug", fields(level = encrypted.level(), step = step))]
    pub fn rotate_inplace(&self, encrypted: &mut Ciphertext, step: i64, galois_keys: &GaloisKeys) -> Result<()> {
        let context_data = self.context_data_of(encrypted, "ciphertext")?;
        Self::check_size(encrypted, "rotate")?;
        let galois_elt = self.context.galois_tool().get_elt_from_step(step).map_err(reject)?;
        if galois_elt == 1 {
            return Ok(());
        }
        self.apply_galois_inplace(encrypted, &context_data, galois_elt, galois_keys)
    }

    /// Same as [Evaluator::rotate_inplace], returning a new ciphertext.
    pub fn rotate(&self, encrypted: &Ciphertext, step: i64, galois_keys: &GaloisKeys) -> Result<Ciphertext> {
        let mut destination = encrypted.clone();
        self.rotate_inplace(&mut destination, step, galois_keys)?;
        Ok(destination)
    }

    /// Conjugates every slot, using the Galois element 2N - 1.
    pub fn conjugate_inplace(&self, encrypted: &mut Ciphertext, galois_keys: &GaloisKeys) -> Result<()> {
        let context_data = self.context_data_of(encrypted, "ciphertext")?;
        Self::check_size(encrypted, "conjugate")?;
        let galois_elt = self.context.galois_tool().conjugation_elt();
        self.apply_galois_inplace(encrypted, &context_data, galois_elt, galois_keys)
    }

    pub fn conjugate(&self, encrypted: &Ciphertext, galois_keys: &GaloisKeys) -> Result<Ciphertext> {
        let mut destination = encrypted.clone();
        self.conjugate_inplace(&mut destination, galois_keys)?;
        Ok(destination)
    }

    /// Rotate-and-add reduction: afterwards slot `i` holds the sum of slots
    /// `i..i + count` of the input (cyclically), so slot 0 holds the sum of
    /// the first `count` slots. `count` must be a power of two no larger
    /// than the slot count, and keys for the steps 1, 2, 4, .., count / 2
    /// must be present.
    pub fn sum_slots_inplace(&self, encrypted: &mut Ciphertext, count: usize, galois_keys: &GaloisKeys) -> Result<()> {
        self.context_data_of(encrypted, "ciphertext")?;
        Self::check_size(encrypted, "sum_slots")?;
        if !count.is_power_of_two() || count > self.context.slot_count() {
            return Err(reject(CkksError::InvalidParameters(format!(
                "slot count {} must be a power of two of at most {}", count, self.context.slot_count()
            ))));
        }
        let steps: Vec<i64> = (0..count.trailing_zeros()).map(|i| 1i64 << i).collect();
        let galois_tool = self.context.galois_tool();
        for &step in &steps {
            let galois_elt = galois_tool.get_elt_from_step(step).map_err(reject)?;
            if !galois_keys.has_key(galois_elt) {
                return Err(reject(CkksError::MissingKey(format!("no Galois key for rotation by {}", step))));
            }
        }
        for step in steps {
            let rotated = self.rotate(encrypted, step, galois_keys)?;
            self.add_inplace(encrypted, &rotated)?;
        }
        Ok(())
    }

    pub fn sum_slots(&self, encrypted: &Ciphertext, count: usize, galois_keys: &GaloisKeys) -> Result<Ciphertext> {
        let mut destination = encrypted.clone();
        self.sum_slots_inplace(&mut destination, count, galois_keys)?;
        Ok(destination)
    }

    /// Product of two size-2 ciphertexts, relinearized and rescaled, after
    /// bringing the higher one down to the other's level. Ignores the policy.
    fn multiply_relin_rescale(&self, encrypted1: &Ciphertext, encrypted2: &Ciphertext, relin_keys: &RelinKeys) -> Result<Ciphertext> {
        let (low, high) = if encrypted1.level() <= encrypted2.level() {
            (encrypted1, encrypted2)
        } else {
            (encrypted2, encrypted1)
        };
        let context_data = self.context_data_of(low, "ciphertext")?;
        Self::check_scale_bound(low.scale() * high.scale(), &context_data)?;
        let high = Self::lowered(high, &context_data);
        let mut product = low.clone();
        Self::tensor_inplace(&mut product, &high, &context_data);
        self.relinearize_inplace(&mut product, relin_keys)?;
        self.rescale_inplace(&mut product)?;
        Ok(product)
    }

    /// `[x, x^2, x^4, .., x^(2^max_log)]`, each square relinearized and rescaled.
    fn square_table(&self, encrypted: &Ciphertext, max_log: usize, relin_keys: &RelinKeys) -> Result<Vec<Ciphertext>> {
        let mut table = Vec::with_capacity(max_log + 1);
        table.push(encrypted.clone());
        for k in 1..=max_log {
            let square = self.multiply_relin_rescale(&table[k - 1], &table[k - 1], relin_keys)?;
            table.push(square);
        }
        Ok(table)
    }

    /// Multiplies the table entries for the set bits of `exponent`, lowest
    /// first. The depth stays at `ceil(log2(exponent))`.
    fn power_from_table(&self, table: &[Ciphertext], exponent: u64, relin_keys: &RelinKeys) -> Result<Ciphertext> {
        let mut result: Option<Ciphertext> = None;
        for (_, entry) in table.iter().enumerate().filter(|&(k, _)| (exponent >> k) & 1 == 1) {
            result = Some(match result {
                None => entry.clone(),
                Some(partial) => self.multiply_relin_rescale(&partial, entry, relin_keys)?,
            });
        }
        result.ok_or_else(|| CkksError::InvalidParameters("exponent must be at least 1".into()))
    }

    fn check_depth(encrypted: &Ciphertext, depth: usize) -> Result<()> {
        if depth > encrypted.level() {
            return Err(reject(CkksError::LevelExhausted));
        }
        Ok(())
    }

    /**
    Raises every slot to `exponent` by repeated squaring.

    Each product is relinearized with `relin_keys` and rescaled, whatever the
    policy says, so the result is a size-2 ciphertext `ceil(log2(exponent))`
    levels down. Fails with [CkksError::InvalidParameters] for exponent 0 and
    with [CkksError::LevelExhausted] if the ciphertext has fewer levels left.
    */
    #[instrument(skip_all, level = "debug", fields(level = encrypted.level(), exponent = exponent))]
    pub fn power(&self, encrypted: &Ciphertext, exponent: u32, relin_keys: &RelinKeys) -> Result<Ciphertext> {
        self.context_data_of(encrypted, "ciphertext")?;
        Self::check_size(encrypted, "power")?;
        if exponent == 0 {
            return Err(reject(CkksError::InvalidParameters("exponent must be at least 1".into())));
        }
        let exponent = exponent as u64;
        Self::check_depth(encrypted, power_depth(exponent))?;
        let table = self.square_table(encrypted, exponent.ilog2() as usize, relin_keys)?;
        self.power_from_table(&table, exponent, relin_keys)
    }

    pub fn power_inplace(&self, encrypted: &mut Ciphertext, exponent: u32, relin_keys: &RelinKeys) -> Result<()> {
        *encrypted = self.power(encrypted, exponent, relin_keys)?;
        Ok(())
    }

    /**
    Evaluates the polynomial `coefficients[0] + coefficients[1] x + ..` on
    every slot.

    Powers of x come from one table of repeated squares. Each term `c_i x^i`
    multiplies by a constant whose scale is picked so that after its rescale
    the term lands exactly on the input's scale; the terms are then brought
    to the lowest level among them and summed. This uses
    `ceil(log2(degree)) + 1` levels, where trailing zero coefficients do not
    count toward the degree.

    A constant polynomial needs no levels. Its result is computed as
    `x - x + c`, which carries no encryption noise and reveals nothing but
    the constant.
    */
    #[instrument(skip_all, level = "debug", fields(level = encrypted.level(), terms = coefficients.len()))]
    pub fn polyval(&self, encrypted: &Ciphertext, coefficients: &[f64], relin_keys: &RelinKeys) -> Result<Ciphertext> {
        self.context_data_of(encrypted, "ciphertext")?;
        Self::check_size(encrypted, "polyval")?;
        if coefficients.is_empty() {
            return Err(reject(CkksError::InvalidParameters("a polynomial needs at least one coefficient".into())));
        }
        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(reject(CkksError::InvalidParameters("coefficients must be finite".into())));
        }
        let degree = coefficients.iter().rposition(|&c| c != 0.0).unwrap_or(0);
        if degree == 0 {
            let mut constant = self.sub(encrypted, encrypted)?;
            self.add_plain_scalar_inplace(&mut constant, coefficients[0])?;
            return Ok(constant);
        }
        let degree = degree as u64;
        Self::check_depth(encrypted, power_depth(degree) + 1)?;

        let target_scale = encrypted.scale();
        let table = self.square_table(encrypted, degree.ilog2() as usize, relin_keys)?;
        let mut terms = Vec::new();
        for (i, &coefficient) in coefficients.iter().enumerate().skip(1).filter(|&(_, &c)| c != 0.0) {
            let mut term = self.power_from_table(&table, i as u64, relin_keys)?;
            let context_data = self.context_data_of(&term, "ciphertext")?;
            let coeff_modulus = context_data.parms().coeff_modulus();
            let q_last = coeff_modulus[coeff_modulus.len() - 1].value() as f64;
            let plain_scale = target_scale * q_last / term.scale();
            Self::check_scale_bound(term.scale() * plain_scale, &context_data)?;
            self.multiply_scalar_unchecked(&mut term, coefficient, plain_scale, &context_data)?;
            self.rescale_inplace(&mut term)?;
            term.set_scale(target_scale);
            terms.push(term);
        }

        let lowest = terms.iter().map(|t| t.level()).min().unwrap_or(0);
        let context_data = self.context.context_data_at(lowest)?;
        let mut terms = terms.into_iter();
        let mut result = terms.next()
            .ok_or_else(|| CkksError::InvalidParameters("polynomial has no terms".into()))?;
        Self::lower_inplace(&mut result, &context_data);
        for term in terms {
            let term = Self::lowered(&term, &context_data);
            let coeff_count = context_data.poly_modulus_degree();
            polymod::add_inplace_ps(result.data_mut(), term.data(), HE_CIPHERTEXT_SIZE_MIN, coeff_count, context_data.parms().coeff_modulus());
        }
        if coefficients[0] != 0.0 {
            self.add_scalar_unchecked(&mut result, coefficients[0], &context_data)?;
        }
        debug!(level = result.level(), "polynomial evaluated");
        Ok(result)
    }

    pub fn polyval_inplace(&self, encrypted: &mut Ciphertext, coefficients: &[f64], relin_keys: &RelinKeys) -> Result<()> {
        *encrypted = self.polyval(encrypted, coefficients, relin_keys)?;
        Ok(())
    }

}
