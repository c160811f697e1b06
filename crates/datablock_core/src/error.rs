//! Engine-wide error taxonomy.
//!
//! # Responsibility
//! - Define the single error type returned by every entrypoint.
//! - Attach partition/key context so failures can be diagnosed from logs.
//!
//! # Invariants
//! - Every variant maps to one stable `code()` string used in error payloads.
//! - Storage failures keep the original ledger error as `source()`.

use crate::codec::CodecError;
use crate::ledger::LedgerError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type DataBlockResult<T> = Result<T, DataBlockError>;

/// Error returned by the partitioned-ledger engine.
#[derive(Debug)]
pub enum DataBlockError {
    /// Key is absent from a partition that must contain it.
    NotFound { partition: String, key: String },
    /// Key is present in a partition that must not contain it.
    AlreadyExists { partition: String, key: String },
    /// Caller is not allowed to perform the operation.
    Authorization(String),
    /// Caller credential is missing or malformed.
    Identity(String),
    /// Request input (arguments, transient entries, encodings) is invalid.
    InvalidInput(String),
    /// Underlying ledger failed; not retried by this layer.
    Storage {
        operation: &'static str,
        partition: String,
        key: String,
        source: LedgerError,
    },
}

impl DataBlockError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::AlreadyExists { .. } => "already_exists",
            Self::Authorization(_) => "authorization",
            Self::Identity(_) => "identity",
            Self::InvalidInput(_) => "invalid_input",
            Self::Storage { .. } => "storage",
        }
    }

    pub(crate) fn not_found(partition: &str, key: &str) -> Self {
        Self::NotFound {
            partition: partition.to_string(),
            key: key.to_string(),
        }
    }

    pub(crate) fn already_exists(partition: &str, key: &str) -> Self {
        Self::AlreadyExists {
            partition: partition.to_string(),
            key: key.to_string(),
        }
    }

    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub(crate) fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization(message.into())
    }
}

impl Display for DataBlockError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { partition, key } => write!(
                f,
                "data block does not exist in {}: {key}",
                partition_label(partition)
            ),
            Self::AlreadyExists { partition, key } => write!(
                f,
                "data block already exists in {}: {key}",
                partition_label(partition)
            ),
            Self::Authorization(message) => write!(f, "not authorized: {message}"),
            Self::Identity(message) => write!(f, "invalid caller identity: {message}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::Storage {
                operation: "commit",
                source,
                ..
            } => write!(f, "ledger commit failed: {source}"),
            Self::Storage {
                operation,
                partition,
                key,
                source,
            } => write!(
                f,
                "ledger {operation} failed in {} for `{key}`: {source}",
                partition_label(partition)
            ),
        }
    }
}

impl Error for DataBlockError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<CodecError> for DataBlockError {
    fn from(value: CodecError) -> Self {
        Self::InvalidInput(value.to_string())
    }
}

/// Commit failures carry no single partition/key.
impl From<LedgerError> for DataBlockError {
    fn from(value: LedgerError) -> Self {
        Self::Storage {
            operation: "commit",
            partition: String::new(),
            key: String::new(),
            source: value,
        }
    }
}

fn partition_label(partition: &str) -> String {
    if partition.is_empty() {
        "public partition".to_string()
    } else {
        format!("partition `{partition}`")
    }
}

#[cfg(test)]
mod tests {
    use super::DataBlockError;
    use crate::ledger::LedgerError;

    #[test]
    fn display_names_public_partition_for_empty_name() {
        let err = DataBlockError::not_found("", "data1");
        assert_eq!(
            err.to_string(),
            "data block does not exist in public partition: data1"
        );
    }

    #[test]
    fn display_keeps_private_partition_name() {
        let err = DataBlockError::already_exists("_implicit_org_Org1MSP", "data1");
        assert!(err.to_string().contains("`_implicit_org_Org1MSP`"));
        assert_eq!(err.code(), "already_exists");
    }

    #[test]
    fn storage_error_exposes_ledger_source() {
        let err = DataBlockError::Storage {
            operation: "get",
            partition: "shared".to_string(),
            key: "data1".to_string(),
            source: LedgerError::Unavailable("peer offline".to_string()),
        };
        assert_eq!(err.code(), "storage");
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("peer offline"));
    }
}
