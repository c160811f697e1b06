//! Engine configuration.
//!
//! # Responsibility
//! - Name the public partition and derive per-organization private
//!   partition names.
//! - Bound range query page sizes.
//!
//! # Invariants
//! - The private prefix is non-empty and the public partition never carries
//!   it, so the two partition classes cannot collide.
//! - `0 < default_page_size <= max_page_size`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const DEFAULT_PUBLIC_PARTITION: &str = "";
pub const DEFAULT_PRIVATE_PARTITION_PREFIX: &str = "_implicit_org_";
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 200;

/// Partition naming and paging settings passed to the entity manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    pub public_partition: String,
    pub private_partition_prefix: String,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            public_partition: DEFAULT_PUBLIC_PARTITION.to_string(),
            private_partition_prefix: DEFAULT_PRIVATE_PARTITION_PREFIX.to_string(),
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }
}

impl LedgerConfig {
    /// Parses and validates a JSON configuration document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.private_partition_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "private_partition_prefix must not be empty".to_string(),
            ));
        }
        if self
            .public_partition
            .starts_with(self.private_partition_prefix.as_str())
        {
            return Err(ConfigError::Invalid(format!(
                "public_partition `{}` must not start with private prefix `{}`",
                self.public_partition, self.private_partition_prefix
            )));
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(ConfigError::Invalid(format!(
                "page sizes must satisfy 0 < default_page_size ({}) <= max_page_size ({})",
                self.default_page_size, self.max_page_size
            )));
        }
        Ok(())
    }

    /// Private partition name for one organization.
    pub fn private_partition(&self, organization: &str) -> String {
        format!("{}{organization}", self.private_partition_prefix)
    }

    /// Organization owning `partition`, when it is a private partition.
    pub fn organization_of<'p>(&self, partition: &'p str) -> Option<&'p str> {
        partition.strip_prefix(self.private_partition_prefix.as_str())
    }

    /// Applies the page cap to a caller-requested page size.
    pub fn clamp_page_size(&self, requested: u32) -> u32 {
        requested.min(self.max_page_size)
    }
}

/// Configuration load/validation errors.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, LedgerConfig};

    #[test]
    fn default_naming_matches_implicit_collections() {
        let config = LedgerConfig::default();
        assert_eq!(config.public_partition, "");
        assert_eq!(config.private_partition("Org1MSP"), "_implicit_org_Org1MSP");
        assert_eq!(
            config.organization_of("_implicit_org_Org1MSP"),
            Some("Org1MSP")
        );
        assert_eq!(config.organization_of("shared"), None);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = LedgerConfig::from_json_str(r#"{"max_page_size": 50}"#).unwrap();
        assert_eq!(config.max_page_size, 50);
        assert_eq!(config.default_page_size, 20);
        assert_eq!(config.clamp_page_size(80), 50);
        assert_eq!(config.clamp_page_size(5), 5);
    }

    #[test]
    fn rejects_colliding_partition_names() {
        let err = LedgerConfig::from_json_str(
            r#"{"public_partition": "_implicit_org_public"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_keys_and_bad_page_sizes() {
        assert!(matches!(
            LedgerConfig::from_json_str(r#"{"page": 1}"#),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            LedgerConfig::from_json_str(r#"{"default_page_size": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn from_path_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = LedgerConfig::from_path(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
