//! Raw coefficient interchange.
//!
//! Ciphertexts and key-switching keys can be taken apart into their RNS
//! coefficients and rebuilt from coefficients supplied by another
//! implementation of the same scheme and parameter set. The interchange
//! tuple is the flat coefficient array together with the fingerprint of the
//! level it lives at, the scale (ciphertexts only) and the shape.
//!
//! Secret keys have no raw form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    context::ContextData,
    error::{CkksError, Result},
    util,
    valcheck::ValCheck,
    Ciphertext, GaloisKeys, HeContext, KSwitchKeys, ParmsID, PublicKey, RelinKeys,
};

/// Shape of a flat coefficient array, outermost axis first:
/// `[digit][polynomial][limb][coefficient]`. Ciphertexts have one digit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawShape {
    pub digits: usize,
    pub polynomials: usize,
    pub limbs: usize,
    pub degree: usize,
}

impl RawShape {

    /// Number of words an array of this shape holds.
    pub fn len(&self) -> usize {
        self.digits * self.polynomials * self.limbs * self.degree
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_len(&self, values: &[u64]) -> Result<()> {
        if values.len() != self.len() {
            return Err(malformed(format!(
                "expected {} coefficients for shape {}x{}x{}x{}, got {}",
                self.len(), self.digits, self.polynomials, self.limbs, self.degree, values.len()
            )));
        }
        Ok(())
    }

}

/// Raw coefficients of one exportable object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RawData {
    Ciphertext {
        fingerprint: ParmsID,
        scale: f64,
        shape: RawShape,
        values: Vec<u64>,
    },
    RelinKey {
        fingerprint: ParmsID,
        shape: RawShape,
        values: Vec<u64>,
    },
    /// One flat array per Galois element, all of the same shape.
    GaloisKey {
        fingerprint: ParmsID,
        shape: RawShape,
        keys: BTreeMap<usize, Vec<u64>>,
    },
}

impl RawData {

    pub fn fingerprint(&self) -> &ParmsID {
        match self {
            RawData::Ciphertext { fingerprint, .. }
            | RawData::RelinKey { fingerprint, .. }
            | RawData::GaloisKey { fingerprint, .. } => fingerprint,
        }
    }

    pub fn shape(&self) -> &RawShape {
        match self {
            RawData::Ciphertext { shape, .. }
            | RawData::RelinKey { shape, .. }
            | RawData::GaloisKey { shape, .. } => shape,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            RawData::Ciphertext { .. } => "ciphertext coefficients",
            RawData::RelinKey { .. } => "relinearization key coefficients",
            RawData::GaloisKey { .. } => "Galois key coefficients",
        }
    }

}

/// Conversion between engine objects and [RawData].
///
/// Implemented for [Ciphertext], [RelinKeys] and [GaloisKeys].
/// `T::from_raw(context, &x.to_raw())` rebuilds `x` bit for bit.
pub trait Marshal: Sized {
    fn to_raw(&self) -> RawData;
    fn from_raw(context: &HeContext, raw: &RawData) -> Result<Self>;
}

fn malformed(message: String) -> CkksError {
    warn!(%message, "raw data rejected");
    CkksError::MalformedRawData(message)
}

fn wrong_kind(expected: &'static str, raw: &RawData) -> CkksError {
    malformed(format!("expected {}, found {}", expected, raw.kind()))
}

/// Context data of a fingerprint, which must be somewhere on the chain.
fn context_data_for(context: &HeContext, fingerprint: &ParmsID) -> Result<std::sync::Arc<ContextData>> {
    context.get_context_data(fingerprint).ok_or_else(|| {
        warn!(?fingerprint, "unknown fingerprint");
        CkksError::UnknownFingerprint(*fingerprint)
    })
}

/// Coefficients of a ciphertext, shaped `[polynomial][limb][coefficient]`.
/// Every value lies below the prime of its limb.
pub fn export_ciphertext_coefficients(encrypted: &Ciphertext) -> Vec<Vec<Vec<u64>>> {
    (0..encrypted.size())
        .map(|p| {
            (0..encrypted.coeff_modulus_size())
                .map(|l| encrypted.poly_component(p, l).to_vec())
                .collect()
        })
        .collect()
}

/// Rebuilds a ciphertext from flat coefficients laid out as
/// `[polynomial][limb][coefficient]` at the level named by `fingerprint`.
///
/// Fails with [CkksError::UnknownFingerprint] if no level of the context has
/// that fingerprint, and with [CkksError::MalformedRawData] if the length is
/// not `polynomial_count * limbs * degree`, the polynomial count is not 2 or
/// 3, the scale is not positive, or a coefficient is out of range.
pub fn import_ciphertext(
    context: &HeContext,
    flat_values: &[u64],
    fingerprint: &ParmsID,
    scale: f64,
    polynomial_count: usize,
) -> Result<Ciphertext> {
    let context_data = context_data_for(context, fingerprint)?;
    if context.level_of(fingerprint).is_none() {
        return Err(malformed("ciphertexts cannot live at the key level".into()));
    }
    if !(util::HE_CIPHERTEXT_SIZE_MIN..=util::HE_CIPHERTEXT_SIZE_MAX).contains(&polynomial_count) {
        return Err(malformed(format!("a ciphertext has 2 or 3 polynomials, not {}", polynomial_count)));
    }
    if !scale.is_finite() || scale <= 0.0 {
        return Err(malformed(format!("invalid scale {}", scale)));
    }
    let shape = RawShape {
        digits: 1,
        polynomials: polynomial_count,
        limbs: context_data.coeff_modulus_size(),
        degree: context_data.poly_modulus_degree(),
    };
    shape.check_len(flat_values)?;
    let encrypted = Ciphertext::from_members(&context_data, polynomial_count, flat_values.to_vec(), scale);
    if !encrypted.is_valid_for(context) {
        return Err(malformed("coefficient out of range for its limb".into()));
    }
    Ok(encrypted)
}

fn kswitch_shape(context: &HeContext) -> Result<RawShape> {
    let key_context_data = context.key_context_data()?;
    Ok(RawShape {
        digits: context.top_level() + 1,
        polynomials: util::HE_CIPHERTEXT_SIZE_MIN,
        limbs: key_context_data.coeff_modulus_size(),
        degree: key_context_data.poly_modulus_degree(),
    })
}

fn export_kswitch_keys(keys: &KSwitchKeys) -> Vec<Vec<Vec<Vec<u64>>>> {
    keys.data().iter()
        .map(|key| export_ciphertext_coefficients(key.as_ciphertext()))
        .collect()
}

fn import_kswitch_keys(context: &HeContext, flat_values: &[u64], fingerprint: &ParmsID) -> Result<KSwitchKeys> {
    let key_context_data = context_data_for(context, fingerprint)?;
    if fingerprint != context.key_parms_id() {
        return Err(malformed("key material must live at the key level".into()));
    }
    let shape = kswitch_shape(context)?;
    shape.check_len(flat_values)?;
    let digit_len = shape.polynomials * shape.limbs * shape.degree;
    let keys = flat_values.chunks(digit_len)
        .map(|digit| {
            PublicKey::new(Ciphertext::from_members(&key_context_data, shape.polynomials, digit.to_vec(), 1.0))
        })
        .collect();
    let keys = KSwitchKeys::from_members(*fingerprint, keys);
    if !keys.is_valid_for(context) {
        return Err(malformed("coefficient out of range for its limb".into()));
    }
    Ok(keys)
}

/// Coefficients of a relinearization key, shaped
/// `[digit][polynomial][limb][coefficient]` over the primes of the key level.
pub fn export_relin_key_coefficients(relin_keys: &RelinKeys) -> Vec<Vec<Vec<Vec<u64>>>> {
    export_kswitch_keys(relin_keys.as_kswitch_keys())
}

/// Rebuilds a relinearization key from flat coefficients laid out as
/// `[digit][polynomial][limb][coefficient]`. `fingerprint` must be the key
/// level's.
pub fn import_relin_keys(context: &HeContext, flat_values: &[u64], fingerprint: &ParmsID) -> Result<RelinKeys> {
    import_kswitch_keys(context, flat_values, fingerprint).map(RelinKeys::from_kswitch_keys)
}

/// Coefficients of every Galois key, by Galois element, each shaped
/// `[digit][polynomial][limb][coefficient]`.
pub fn export_galois_key_coefficients(galois_keys: &GaloisKeys) -> BTreeMap<usize, Vec<Vec<Vec<Vec<u64>>>>> {
    galois_keys.iter()
        .map(|(&elt, keys)| (elt, export_kswitch_keys(keys)))
        .collect()
}

/// Rebuilds Galois keys from flat coefficients per Galois element.
pub fn import_galois_keys(
    context: &HeContext,
    flat_keys: &BTreeMap<usize, Vec<u64>>,
    fingerprint: &ParmsID,
) -> Result<GaloisKeys> {
    context_data_for(context, fingerprint)?;
    if fingerprint != context.key_parms_id() {
        return Err(malformed("key material must live at the key level".into()));
    }
    let galois_tool = context.galois_tool();
    let mut keys = BTreeMap::new();
    for (&elt, flat_values) in flat_keys {
        if !galois_tool.is_valid_elt(elt) {
            return Err(malformed(format!("{} is not a Galois element", elt)));
        }
        keys.insert(elt, import_kswitch_keys(context, flat_values, fingerprint)?);
    }
    Ok(GaloisKeys::from_members(*fingerprint, keys))
}

fn flatten(encrypted: &Ciphertext) -> Vec<u64> {
    encrypted.data().to_vec()
}

fn flatten_kswitch_keys(keys: &KSwitchKeys) -> Vec<u64> {
    keys.data().iter().flat_map(|key| key.data().iter().copied()).collect()
}

fn kswitch_shape_of(keys: &KSwitchKeys) -> RawShape {
    let first = keys.data().first().map(|k| k.as_ciphertext());
    RawShape {
        digits: keys.len(),
        polynomials: first.map_or(0, |c| c.size()),
        limbs: first.map_or(0, |c| c.coeff_modulus_size()),
        degree: first.map_or(0, |c| c.poly_modulus_degree()),
    }
}

impl Marshal for Ciphertext {

    fn to_raw(&self) -> RawData {
        RawData::Ciphertext {
            fingerprint: *self.parms_id(),
            scale: self.scale(),
            shape: RawShape {
                digits: 1,
                polynomials: self.size(),
                limbs: self.coeff_modulus_size(),
                degree: self.poly_modulus_degree(),
            },
            values: flatten(self),
        }
    }

    fn from_raw(context: &HeContext, raw: &RawData) -> Result<Self> {
        match raw {
            RawData::Ciphertext { fingerprint, scale, shape, values } => {
                shape.check_len(values)?;
                let encrypted = import_ciphertext(context, values, fingerprint, *scale, shape.polynomials)?;
                if encrypted.coeff_modulus_size() != shape.limbs || shape.digits != 1 {
                    return Err(malformed("shape does not match the level of the fingerprint".into()));
                }
                Ok(encrypted)
            }
            other => Err(wrong_kind("ciphertext coefficients", other)),
        }
    }

}

impl Marshal for RelinKeys {

    fn to_raw(&self) -> RawData {
        RawData::RelinKey {
            fingerprint: *self.parms_id(),
            shape: kswitch_shape_of(self.as_kswitch_keys()),
            values: flatten_kswitch_keys(self.as_kswitch_keys()),
        }
    }

    fn from_raw(context: &HeContext, raw: &RawData) -> Result<Self> {
        match raw {
            RawData::RelinKey { fingerprint, shape, values } => {
                shape.check_len(values)?;
                if *shape != kswitch_shape(context)? {
                    return Err(malformed("shape does not match the key level".into()));
                }
                import_relin_keys(context, values, fingerprint)
            }
            other => Err(wrong_kind("relinearization key coefficients", other)),
        }
    }

}

impl Marshal for GaloisKeys {

    fn to_raw(&self) -> RawData {
        let shape = self.iter().next()
            .map_or(RawShape { digits: 0, polynomials: 0, limbs: 0, degree: 0 }, |(_, keys)| kswitch_shape_of(keys));
        RawData::GaloisKey {
            fingerprint: *self.parms_id(),
            shape,
            keys: self.iter().map(|(&elt, keys)| (elt, flatten_kswitch_keys(keys))).collect(),
        }
    }

    fn from_raw(context: &HeContext, raw: &RawData) -> Result<Self> {
        match raw {
            RawData::GaloisKey { fingerprint, shape, keys } => {
                if !keys.is_empty() && *shape != kswitch_shape(context)? {
                    return Err(malformed("shape does not match the key level".into()));
                }
                import_galois_keys(context, keys, fingerprint)
            }
            other => Err(wrong_kind("Galois key coefficients", other)),
        }
    }

}
