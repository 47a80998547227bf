//! Packing short strings into single field elements.
//!
//! Up to 31 UTF-8 bytes are read as a big-endian integer, which always lies
//! below the BN256 scalar modulus.

use halo2curves_axiom::bn256::Fr;

use crate::{fr_to_be_bytes, reduce_be_bytes_to_fr, CommonError};

pub const MAX_ATTRIBUTE_BYTES: usize = 31;

pub fn encode_str(value: &str) -> Result<Fr, CommonError> {
    let bytes = value.as_bytes();
    if bytes.len() > MAX_ATTRIBUTE_BYTES {
        return Err(CommonError::AttributeTooLong(bytes.len()));
    }
    Ok(reduce_be_bytes_to_fr(bytes))
}

/// Inverse of [`encode_str`]. Leading zero bytes are padding and dropped.
pub fn decode_str(value: &Fr) -> Result<String, CommonError> {
    let bytes = fr_to_be_bytes(value);
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    String::from_utf8(bytes[start..].to_vec()).map_err(|_| CommonError::AttributeNotUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_and_unpacks_names() {
        for name in ["", "Alice", "Zoë Ångström", "0123456789012345678901234567890"] {
            let packed = encode_str(name).unwrap();
            assert_eq!(decode_str(&packed).unwrap(), name);
        }
    }

    #[test]
    fn rejects_strings_longer_than_a_field() {
        let long = "a".repeat(32);
        assert_eq!(encode_str(&long), Err(CommonError::AttributeTooLong(32)));
    }

    #[test]
    fn short_ascii_matches_integer_value() {
        assert_eq!(encode_str("A").unwrap(), Fr::from(0x41u64));
        assert_eq!(encode_str("AB").unwrap(), Fr::from(0x4142u64));
    }

    #[test]
    fn non_utf8_is_reported() {
        assert_eq!(
            decode_str(&Fr::from(0xffu64)),
            Err(CommonError::AttributeNotUtf8)
        );
    }
}
