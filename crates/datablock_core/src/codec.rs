//! Record codec between typed sections and ledger bytes.
//!
//! Records are stored as JSON so that every peer, client and audit tool can
//! read the ledger state without this crate.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Encode/decode failure tagged with the record key.
#[derive(Debug)]
pub enum CodecError {
    Encode {
        key: String,
        source: serde_json::Error,
    },
    Decode {
        key: String,
        source: serde_json::Error,
    },
}

impl Display for CodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode { key, source } => {
                write!(f, "failed to encode record `{key}`: {source}")
            }
            Self::Decode { key, source } => {
                write!(f, "failed to decode record `{key}`: {source}")
            }
        }
    }
}

impl Error for CodecError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Encode { source, .. } | Self::Decode { source, .. } => Some(source),
        }
    }
}

/// Serializes one record for storage under `key`.
pub fn encode<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(|source| CodecError::Encode {
        key: key.to_string(),
        source,
    })
}

/// Deserializes one record read from `key`.
pub fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(bytes).map_err(|source| CodecError::Decode {
        key: key.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::{decode, encode, CodecError};
    use crate::model::data_block::PrivateSection;

    #[test]
    fn decode_reports_key_on_malformed_bytes() {
        let err = decode::<PrivateSection>("data7", b"{not json").unwrap_err();
        assert!(matches!(err, CodecError::Decode { ref key, .. } if key == "data7"));
        assert!(err.to_string().contains("data7"));
    }

    #[test]
    fn encoded_section_is_plain_json() {
        let section = PrivateSection {
            content: "s3://bucket/object".to_string(),
        };
        let bytes = encode("data1", &section).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, r#"{"content":"s3://bucket/object"}"#);
    }
}
