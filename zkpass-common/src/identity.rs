//! 20-byte identifiers for events and organizers.

use std::{fmt, str::FromStr};

use halo2curves_axiom::bn256::Fr;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{reduce_be_bytes_to_fr, CommonError};

const EVENT_DOMAIN: &[u8] = b"zkpass:event";

macro_rules! hex_id {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; 20]);

        impl $name {
            pub const LEN: usize = 20;

            pub fn as_bytes(&self) -> &[u8; 20] {
                &self.0
            }

            pub fn from_slice(bytes: &[u8]) -> Result<Self, CommonError> {
                let raw: [u8; 20] = bytes.try_into().map_err(|_| {
                    CommonError::Hex(format!("expected 20 bytes, got {}", bytes.len()))
                })?;
                Ok(Self(raw))
            }

            /// Field image used as a public input: the bytes read as a
            /// big-endian integer.
            pub fn to_fr(&self) -> Fr {
                reduce_be_bytes_to_fr(&self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = CommonError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let hex_str = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(hex_str).map_err(|err| CommonError::Hex(err.to_string()))?;
                Self::from_slice(&bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(de::Error::custom)
            }
        }
    };
}

hex_id!(EventId);
hex_id!(Organizer);

impl EventId {
    /// Derive the identifier of the `seq`-th event created by the registry.
    ///
    /// The organizer is mixed in so two registries replaying the same
    /// sequence for different organizers never collide.
    pub fn derive(organizer: &Organizer, seq: u64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(EVENT_DOMAIN);
        hasher.update(organizer.as_bytes());
        hasher.update(&seq.to_be_bytes());
        let digest = hasher.finalize();
        let mut id = [0u8; 20];
        id.copy_from_slice(&digest.as_bytes()[..20]);
        EventId(id)
    }
}
