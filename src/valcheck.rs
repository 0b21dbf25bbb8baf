
use crate::{
    Plaintext, Ciphertext, PublicKey, RelinKeys, GaloisKeys, KSwitchKeys,
    HeContext, Modulus, util,
};

/// Provide methods for checking the validity of HE objects against a context.
pub trait ValCheck {
    /// Check whether the metadata is valid.
    fn is_metadata_valid_for(&self, context: &HeContext, allow_key_level: bool) -> bool;
    /// Check whether the buffer is valid.
    fn is_buffer_valid(&self) -> bool;
    /// Check whether the data is valid.
    fn is_data_valid_for(&self, context: &HeContext) -> bool;
    /// Check whether the object is valid.
    /// Shortcut for [ValCheck::is_data_valid_for] plus [ValCheck::is_buffer_valid].
    fn is_valid_for(&self, context: &HeContext) -> bool {
        self.is_data_valid_for(context) && self.is_buffer_valid()
    }
}

/// Every coefficient of every limb lies below its prime. `data` holds
/// whole polynomials over `coeff_modulus`, limb after limb.
fn limbs_in_range(data: &[u64], coeff_modulus: &[Modulus], poly_modulus_degree: usize) -> bool {
    data.chunks(poly_modulus_degree)
        .zip(coeff_modulus.iter().cycle())
        .all(|(limb, modulus)| limb.iter().all(|&x| x < modulus.value()))
}

impl ValCheck for Plaintext {

    fn is_metadata_valid_for(&self, context: &HeContext, allow_key_level: bool) -> bool {
        let context_data = match context.get_context_data(self.parms_id()) {
            Some(c) => c,
            None => return false,
        };
        if !allow_key_level && context.level_of(self.parms_id()).is_none() {return false;}
        self.coeff_modulus_size() == context_data.coeff_modulus_size()
            && self.poly_modulus_degree() == context_data.poly_modulus_degree()
            && self.level() == context_data.chain_index()
            && self.scale().is_finite() && self.scale() > 0.0
    }

    fn is_buffer_valid(&self) -> bool {
        self.data().len() == self.coeff_modulus_size() * self.poly_modulus_degree()
    }

    fn is_data_valid_for(&self, context: &HeContext) -> bool {
        if !self.is_metadata_valid_for(context, false) || !self.is_buffer_valid() {return false;}
        match context.get_context_data(self.parms_id()) {
            Some(c) => limbs_in_range(self.data(), c.parms().coeff_modulus(), c.poly_modulus_degree()),
            None => false,
        }
    }

}

impl ValCheck for Ciphertext {

    fn is_metadata_valid_for(&self, context: &HeContext, allow_key_level: bool) -> bool {
        let context_data = match context.get_context_data(self.parms_id()) {
            Some(c) => c,
            None => return false,
        };
        if !allow_key_level && context.level_of(self.parms_id()).is_none() {return false;}

        if self.coeff_modulus_size() != context_data.coeff_modulus_size() {return false;}
        if self.poly_modulus_degree() != context_data.poly_modulus_degree() {return false;}
        if self.level() != context_data.chain_index() {return false;}

        // Check that size is within right bounds
        if self.size() < util::HE_CIPHERTEXT_SIZE_MIN || self.size() > util::HE_CIPHERTEXT_SIZE_MAX {return false;}

        self.scale().is_finite() && self.scale() > 0.0
    }

    fn is_buffer_valid(&self) -> bool {
        self.data().len() == self.coeff_modulus_size() * self.size() * self.poly_modulus_degree()
    }

    fn is_data_valid_for(&self, context: &HeContext) -> bool {
        if !self.is_metadata_valid_for(context, false) || !self.is_buffer_valid() {return false;}
        match context.get_context_data(self.parms_id()) {
            Some(c) => limbs_in_range(self.data(), c.parms().coeff_modulus(), c.poly_modulus_degree()),
            None => false,
        }
    }

}

impl ValCheck for PublicKey {

    fn is_metadata_valid_for(&self, context: &HeContext, _allow_key_level: bool) -> bool {
        self.parms_id() == context.key_parms_id()
            && self.as_ciphertext().is_metadata_valid_for(context, true)
            && self.as_ciphertext().size() == util::HE_CIPHERTEXT_SIZE_MIN
    }

    fn is_buffer_valid(&self) -> bool {
        self.as_ciphertext().is_buffer_valid()
    }

    fn is_data_valid_for(&self, context: &HeContext) -> bool {
        if !self.is_metadata_valid_for(context, true) || !self.is_buffer_valid() {return false;}
        let ciphertext = self.as_ciphertext();
        match context.get_context_data(ciphertext.parms_id()) {
            Some(c) => limbs_in_range(ciphertext.data(), c.parms().coeff_modulus(), c.poly_modulus_degree()),
            None => false,
        }
    }

}

impl ValCheck for KSwitchKeys {

    fn is_metadata_valid_for(&self, context: &HeContext, _allow_key_level: bool) -> bool {
        // One digit per data prime.
        self.parms_id() == context.key_parms_id()
            && self.len() == context.top_level() + 1
            && self.data().iter().all(|key| key.is_metadata_valid_for(context, true))
    }

    fn is_buffer_valid(&self) -> bool {
        self.data().iter().all(|key| key.is_buffer_valid())
    }

    fn is_data_valid_for(&self, context: &HeContext) -> bool {
        self.is_metadata_valid_for(context, true)
            && self.data().iter().all(|key| key.is_data_valid_for(context))
    }

}

impl ValCheck for RelinKeys {

    fn is_metadata_valid_for(&self, context: &HeContext, allow_key_level: bool) -> bool {
        self.as_kswitch_keys().is_metadata_valid_for(context, allow_key_level)
    }

    fn is_buffer_valid(&self) -> bool {
        self.as_kswitch_keys().is_buffer_valid()
    }

    fn is_data_valid_for(&self, context: &HeContext) -> bool {
        self.as_kswitch_keys().is_data_valid_for(context)
    }

}

impl ValCheck for GaloisKeys {

    fn is_metadata_valid_for(&self, context: &HeContext, allow_key_level: bool) -> bool {
        let galois_tool = context.galois_tool();
        self.parms_id() == context.key_parms_id()
            && self.iter().all(|(&elt, keys)| {
                galois_tool.is_valid_elt(elt) && keys.is_metadata_valid_for(context, allow_key_level)
            })
    }

    fn is_buffer_valid(&self) -> bool {
        self.iter().all(|(_, keys)| keys.is_buffer_valid())
    }

    fn is_data_valid_for(&self, context: &HeContext) -> bool {
        self.is_metadata_valid_for(context, true)
            && self.iter().all(|(_, keys)| keys.is_data_valid_for(context))
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CKKSEncoder, Encryptor, KeyGenerator, SecurityLevel};

    #[test]
    fn test_valcheck() {
        let context = HeContext::create_with_security(1024, &[30, 30, 30], SecurityLevel::None).unwrap();
        let keygen = KeyGenerator::new(context.clone()).unwrap();
        let encoder = CKKSEncoder::new(context.clone());
        let encryptor = Encryptor::new(context.clone())
            .set_secret_key(keygen.secret_key().clone());

        let plain = encoder.encode(&[1.0, 2.0], Some(2f64.powi(20)), None).unwrap();
        assert!(plain.is_valid_for(&context));
        let encrypted = encryptor.encrypt_symmetric(&plain).unwrap();
        assert!(encrypted.is_valid_for(&context));

        // Key-level material is only valid as a key.
        let public_key = keygen.public_key().unwrap();
        assert!(public_key.is_valid_for(&context));
        assert!(!public_key.as_ciphertext().is_valid_for(&context));
        assert!(public_key.as_ciphertext().is_metadata_valid_for(&context, true));

        assert!(keygen.relinearization_key().unwrap().is_valid_for(&context));
        assert!(keygen.galois_keys(&[1]).unwrap().is_valid_for(&context));
        assert!(!RelinKeys::default().is_valid_for(&context));

        let mut corrupted = encrypted.clone();
        corrupted.data_mut()[5] = u64::MAX;
        assert!(corrupted.is_metadata_valid_for(&context, false));
        assert!(!corrupted.is_valid_for(&context));

        let other = HeContext::create_with_security(1024, &[30, 30, 31], SecurityLevel::None).unwrap();
        assert!(!encrypted.is_valid_for(&other));
    }
}
