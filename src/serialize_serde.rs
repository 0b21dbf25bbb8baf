use serde::{Serialize, Deserialize, Deserializer, Serializer, de::{self, Visitor}, ser::SerializeStruct};
use crate::{
    Modulus, EncryptionParameters, SchemeType,
};

impl Serialize for Modulus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where S: Serializer
    {
        serializer.serialize_u64(self.value())
    }
}

impl<'de> Deserialize<'de> for Modulus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where D: Deserializer<'de>
    {
        struct U64Visitor;
        impl<'de> Visitor<'de> for U64Visitor {
            type Value = u64;
            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("u64")
            }
            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where E: de::Error, {
                Ok(v)
            }
        }
        let value = deserializer.deserialize_u64(U64Visitor)?;
        Modulus::new(value).map_err(de::Error::custom)
    }
}

impl Serialize for EncryptionParameters {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where S: Serializer
    {
        let mut s = serializer.serialize_struct("EncryptionParameters", 3)?;
        s.serialize_field("scheme", &self.scheme())?;
        s.serialize_field("poly_modulus_degree", &self.poly_modulus_degree())?;
        s.serialize_field("coeff_modulus", self.coeff_modulus())?;
        s.end()
    }
}

impl<'de> Deserialize<'de> for EncryptionParameters {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where D: Deserializer<'de>
    {
        struct EncryptionParametersVisitor;
        impl<'de> Visitor<'de> for EncryptionParametersVisitor {
            type Value = EncryptionParameters;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("struct EncryptionParameters")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where A: de::SeqAccess<'de>,
            {
                let scheme = seq.next_element::<SchemeType>()?.ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let poly_modulus_degree = seq.next_element::<usize>()?.ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let coeff_modulus = seq.next_element::<Vec<Modulus>>()?.ok_or_else(|| de::Error::invalid_length(2, &self))?;
                Ok(
                    EncryptionParameters::new(scheme)
                        .set_poly_modulus_degree(poly_modulus_degree)
                        .set_coeff_modulus(&coeff_modulus)
                )
            }

        }
        deserializer.deserialize_struct(
            "EncryptionParameters",
            &["scheme", "poly_modulus_degree", "coeff_modulus"],
            EncryptionParametersVisitor
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CoeffModulus, HeContext, SecurityLevel};

    fn serialize<T: Serialize>(obj: &T) -> Vec<u8> {
        bincode::serialize(obj).unwrap()
    }

    fn deserialize<T: for<'a> Deserialize<'a>>(bytes: &[u8]) -> T {
        bincode::deserialize(bytes).unwrap()
    }

    #[test]
    fn test_modulus() {
        let modulus = Modulus::new(1152921504606584833).unwrap();
        let bytes = serialize(&modulus);
        let recovered: Modulus = deserialize(&bytes);
        assert_eq!(modulus, recovered);
        assert!(recovered.is_prime());

        // One is not a modulus.
        let bytes = serialize(&1u64);
        assert!(bincode::deserialize::<Modulus>(&bytes).is_err());
    }

    #[test]
    fn test_encryption_parameters() {
        let ep = EncryptionParameters::new(SchemeType::CKKS)
            .set_poly_modulus_degree(1024)
            .set_coeff_modulus(&CoeffModulus::create(1024, &[30, 20, 30]).unwrap());
        let bytes = serialize(&ep);
        let recovered: EncryptionParameters = deserialize(&bytes);
        assert_eq!(ep.poly_modulus_degree(), recovered.poly_modulus_degree());
        assert_eq!(ep.coeff_modulus(), recovered.coeff_modulus());
        assert_eq!(ep.scheme(), recovered.scheme());
        assert_eq!(ep.parms_id(), recovered.parms_id());

        let context = HeContext::new(ep.clone(), SecurityLevel::None).unwrap();
        let restored = HeContext::new(recovered, SecurityLevel::None).unwrap();
        assert_eq!(context.fingerprint_at(0).unwrap(), restored.fingerprint_at(0).unwrap());
    }
}
