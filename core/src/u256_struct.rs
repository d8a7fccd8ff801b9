/// Declares a 32 byte value type (hashes, accounts, links...) with the
/// conversions and formatting every one of them needs.
#[macro_export]
macro_rules! u256_struct {
    ($name:ident) => {
        #[derive(PartialEq, Eq, Clone, Copy, Hash, Default, PartialOrd, Ord)]
        pub struct $name([u8; 32]);

        #[allow(dead_code)]
        impl $name {
            pub const MAX: Self = Self([0xFF; 32]);

            pub const fn zero() -> Self {
                Self([0; 32])
            }

            pub fn is_zero(&self) -> bool {
                self.0 == [0; 32]
            }

            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                match bytes.try_into() {
                    Ok(value) => Some(Self(value)),
                    Err(_) => None,
                }
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn random() -> Self {
                Self::from_bytes(rand::random())
            }

            pub fn encode_hex(&self) -> String {
                hex::encode_upper(self.0)
            }

            pub fn decode_hex(s: impl AsRef<str>) -> anyhow::Result<Self> {
                let mut bytes = [0u8; 32];
                hex::decode_to_slice(s.as_ref(), &mut bytes)?;
                Ok(Self::from_bytes(bytes))
            }

            pub const fn serialized_size() -> usize {
                32
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                let mut bytes = [0; 32];
                bytes[24..].copy_from_slice(&value.to_be_bytes());
                Self(bytes)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                $crate::write_hex_bytes(&self.0, f)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                $crate::write_hex_bytes(&self.0, f)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.encode_hex())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let value = String::deserialize(deserializer)?;
                Self::decode_hex(&value).map_err(serde::de::Error::custom)
            }
        }
    };
}
