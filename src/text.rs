use crate::{context::ContextData, util, ParmsID, PARMS_ID_ZERO};

/// An encoded vector: one polynomial in NTT form over the primes of a data
/// level, with the scale it was encoded at.
///
/// The backing array holds `coeff_modulus_size * poly_modulus_degree` words,
/// limb after limb. A plaintext carries the fingerprint and level of the
/// parameters it was encoded for.
///
/// See [Ciphertext] for the class that stores ciphertexts.
#[derive(Clone, Debug, PartialEq)]
pub struct Plaintext {
    coeff_modulus_size: usize,
    poly_modulus_degree: usize,
    data: Vec<u64>,
    parms_id: ParmsID,
    level: usize,
    scale: f64,
}

impl Default for Plaintext {
    fn default() -> Self {
        Plaintext {
            coeff_modulus_size: 0,
            poly_modulus_degree: 0,
            data: vec![],
            parms_id: PARMS_ID_ZERO,
            level: 0,
            scale: 1.0,
        }
    }
}

impl Plaintext {

    /// Creates an empty plaintext.
    pub fn new() -> Self {
        Plaintext::default()
    }

    pub(crate) fn from_context_data(context_data: &ContextData, scale: f64) -> Self {
        let coeff_modulus_size = context_data.coeff_modulus_size();
        let poly_modulus_degree = context_data.poly_modulus_degree();
        Plaintext {
            coeff_modulus_size,
            poly_modulus_degree,
            data: vec![0; coeff_modulus_size * poly_modulus_degree],
            parms_id: *context_data.parms_id(),
            level: context_data.chain_index(),
            scale,
        }
    }

    /// The [ParmsID] of the plaintext.
    pub fn parms_id(&self) -> &ParmsID {
        &self.parms_id
    }

    /// Same as [Plaintext::parms_id], by value.
    pub fn fingerprint(&self) -> ParmsID {
        self.parms_id
    }

    /// Index of the data level the plaintext was encoded at.
    pub fn level(&self) -> usize {
        self.level
    }

    /// The scale the values were multiplied by before rounding.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Sets the scale of the plaintext.
    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }

    /// The number of primes the polynomial is represented over.
    pub fn coeff_modulus_size(&self) -> usize {
        self.coeff_modulus_size
    }

    pub fn poly_modulus_degree(&self) -> usize {
        self.poly_modulus_degree
    }

    /// Returns a reference to the underlying data.
    pub fn data(&self) -> &[u64] {
        &self.data
    }

    /// Returns a mutable reference to the underlying data.
    pub fn data_mut(&mut self) -> &mut [u64] {
        &mut self.data
    }

    /// Return a reference to RNS component at the specified index in the plaintext polynomial.
    pub fn component(&self, index: usize) -> &[u64] {
        &self.data[index * self.poly_modulus_degree..(index + 1) * self.poly_modulus_degree]
    }

}

/// Struct to store a ciphertext element.
///
/// The data for a ciphertext consists of two polynomials (three right after
/// a multiplication), each stored in NTT form as its residues modulo the
/// primes of the ciphertext's level. If the size of the ciphertext is T,
/// the poly_modulus_degree is N, and the level keeps K primes, the backing
/// array holds exactly N*K*T words, polynomial after polynomial and limb
/// after limb within each polynomial.
///
/// A ciphertext also carries the fingerprint and level of its parameters,
/// which every homomorphic operation and decryption checks, and the scale of
/// the encrypted values.
///
/// See [Plaintext] for the class that stores plaintexts.
#[derive(Clone, Debug, PartialEq)]
pub struct Ciphertext {
    size: usize,
    coeff_modulus_size: usize,
    poly_modulus_degree: usize,
    data: Vec<u64>,
    parms_id: ParmsID,
    level: usize,
    scale: f64,
}

impl Default for Ciphertext {
    fn default() -> Self {
        Ciphertext {
            size: 0,
            coeff_modulus_size: 0,
            poly_modulus_degree: 0,
            data: vec![],
            parms_id: PARMS_ID_ZERO,
            level: 0,
            scale: 1.0,
        }
    }
}

impl Ciphertext {

    /// Creates an empty ciphertext.
    pub fn new() -> Self {Self::default()}

    /// A zero ciphertext of `size` polynomials at the level of `context_data`.
    pub(crate) fn from_context_data(context_data: &ContextData, size: usize) -> Self {
        let coeff_modulus_size = context_data.coeff_modulus_size();
        let poly_modulus_degree = context_data.poly_modulus_degree();
        Ciphertext {
            size,
            coeff_modulus_size,
            poly_modulus_degree,
            data: vec![0; size * coeff_modulus_size * poly_modulus_degree],
            parms_id: *context_data.parms_id(),
            level: context_data.chain_index(),
            scale: 1.0,
        }
    }

    /// Assembles a ciphertext from raw members. The caller guarantees that
    /// `data` has `size * coeff_modulus_size * poly_modulus_degree` words.
    pub(crate) fn from_members(
        context_data: &ContextData,
        size: usize,
        data: Vec<u64>,
        scale: f64,
    ) -> Ciphertext {
        Ciphertext {
            size,
            coeff_modulus_size: context_data.coeff_modulus_size(),
            poly_modulus_degree: context_data.poly_modulus_degree(),
            data,
            parms_id: *context_data.parms_id(),
            level: context_data.chain_index(),
            scale,
        }
    }

    /// The [ParmsID] of the ciphertext.
    pub fn parms_id(&self) -> &ParmsID {
        &self.parms_id
    }

    /// Same as [Ciphertext::parms_id], by value.
    pub fn fingerprint(&self) -> ParmsID {
        self.parms_id
    }

    /// Index of the data level: the number of primes left minus one.
    pub fn level(&self) -> usize {
        self.level
    }

    /// The scale of the encrypted values.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Overrides the recorded scale. The encrypted values are not touched, so
    /// this only reinterprets them; use it to align scales that differ by
    /// rounding before an addition.
    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }

    /// The number of coeff modulus in the polynomials.
    pub fn coeff_modulus_size(&self) -> usize {
        self.coeff_modulus_size
    }

    /// The number of polynomials in the ciphertext,
    /// not the total count of coefficients in the polynomials.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The degree of the polynomial modulus.
    pub fn poly_modulus_degree(&self) -> usize {
        self.poly_modulus_degree
    }

    /// Returns a reference to the underlying data.
    pub fn data(&self) -> &[u64] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u64] {
        &mut self.data
    }

    /// Moves the ciphertext to another level, keeping `size` polynomials of
    /// `data`, which must already be laid out for that level.
    pub(crate) fn reset_level(&mut self, context_data: &ContextData, size: usize, data: Vec<u64>) {
        self.size = size;
        self.coeff_modulus_size = context_data.coeff_modulus_size();
        self.poly_modulus_degree = context_data.poly_modulus_degree();
        self.data = data;
        self.parms_id = *context_data.parms_id();
        self.level = context_data.chain_index();
    }

    /// Drops the polynomials past `size`.
    pub(crate) fn truncate(&mut self, size: usize) {
        self.data.truncate(size * self.poly_modulus_degree * self.coeff_modulus_size);
        self.size = size;
    }

    /// Returns a reference to the polynomial at the given index.
    pub fn poly(&self, id: usize) -> &[u64] {
        let d = self.poly_modulus_degree * self.coeff_modulus_size;
        &self.data[id * d..(id + 1) * d]
    }

    pub(crate) fn poly_mut(&mut self, id: usize) -> &mut [u64] {
        let d = self.poly_modulus_degree * self.coeff_modulus_size;
        &mut self.data[id * d..(id + 1) * d]
    }

    /// Returns a reference to the polynomials in the range [id_lower, id_upper).
    pub fn polys(&self, id_lower: usize, id_upper: usize) -> &[u64] {
        let d = self.poly_modulus_degree * self.coeff_modulus_size;
        &self.data[id_lower * d..id_upper * d]
    }

    /// Returns a reference to the component of the polynomial at the given index.
    pub fn poly_component(&self, poly_id: usize, component_id: usize) -> &[u64] {
        let offset = self.poly_modulus_degree * (poly_id * self.coeff_modulus_size + component_id);
        &self.data[offset .. offset + self.poly_modulus_degree]
    }

    pub(crate) fn poly_component_mut(&mut self, poly_id: usize, component_id: usize) -> &mut [u64] {
        let offset = self.poly_modulus_degree * (poly_id * self.coeff_modulus_size + component_id);
        &mut self.data[offset .. offset + self.poly_modulus_degree]
    }

    /// Is the ciphertext zero?
    /// Transparent ciphertexts could leak information about the secret key.
    pub fn is_transparent(&self) -> bool {
        if self.data.is_empty() || self.size < util::HE_CIPHERTEXT_SIZE_MIN {
            true
        } else {
            self.polys(1, self.size).iter().all(|&x| x == 0)
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HeContext, SecurityLevel};

    #[test]
    fn test_ciphertext_layout() {
        let context = HeContext::create_with_security(1024, &[30, 30, 30], SecurityLevel::None).unwrap();
        let context_data = context.context_data_at(1).unwrap();
        let mut ciphertext = Ciphertext::from_context_data(&context_data, 2);
        assert_eq!(ciphertext.size(), 2);
        assert_eq!(ciphertext.level(), 1);
        assert_eq!(ciphertext.coeff_modulus_size(), 2);
        assert_eq!(ciphertext.data().len(), 2 * 2 * 1024);
        assert_eq!(ciphertext.fingerprint(), context.fingerprint_at(1).unwrap());
        assert!(ciphertext.is_transparent());

        ciphertext.poly_component_mut(1, 1)[3] = 7;
        assert_eq!(ciphertext.data()[3 * 1024 + 3], 7);
        assert_eq!(ciphertext.poly(1)[1024 + 3], 7);
        assert!(!ciphertext.is_transparent());

        ciphertext.truncate(1);
        assert_eq!(ciphertext.size(), 1);
        assert_eq!(ciphertext.data().len(), 2 * 1024);

        ciphertext.set_scale(2f64.powi(30));
        assert_eq!(ciphertext.scale(), 2f64.powi(30));
    }

    #[test]
    fn test_plaintext_layout() {
        let context = HeContext::create_with_security(1024, &[30, 30, 30], SecurityLevel::None).unwrap();
        let context_data = context.context_data_at(0).unwrap();
        let plaintext = Plaintext::from_context_data(&context_data, 8.0);
        assert_eq!(plaintext.level(), 0);
        assert_eq!(plaintext.scale(), 8.0);
        assert_eq!(plaintext.component(0).len(), 1024);
        assert_eq!(plaintext.parms_id(), context.last_parms_id());
        assert_eq!(Plaintext::new().fingerprint(), PARMS_ID_ZERO);
    }
}
