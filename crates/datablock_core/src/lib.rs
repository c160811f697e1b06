//! Partitioned-ledger engine for data blocks.
//!
//! Data blocks keep a public record in shared partitions and their private
//! payload in the owning organization's private partition. Every request
//! runs through the identity gate and commits as one ledger transaction.

pub mod codec;
pub mod config;
pub mod context;
pub mod contract;
pub mod error;
pub mod gate;
pub mod guard;
pub mod identity;
pub mod ledger;
pub mod logging;
pub mod manager;
pub mod model;
pub mod policy;
pub mod store;

pub use config::{ConfigError, LedgerConfig};
pub use context::{Proposal, TransientMap, TxContext, TRANSIENT_COLLECTIONS, TRANSIENT_PRIVATE};
pub use contract::{ContractCall, ContractResponse, DataBlockContract, ErrorPayload};
pub use error::{DataBlockError, DataBlockResult};
pub use gate::{require_same_organization, AccessGate, ReadMode};
pub use guard::ExistenceGuard;
pub use identity::{
    credential, CallerIdentity, CredentialIdentityProvider, IdentityProvider, SerializedIdentity,
};
pub use ledger::{
    execute, Ledger, LedgerBackend, LedgerError, LedgerResult, LedgerTransaction, MemoryLedger,
    SqliteLedger,
};
pub use logging::{default_log_level, init_logging, logging_status, LogSettings, LoggingError};
pub use manager::{DataBlockManager, RangePage};
pub use model::data_block::{
    DataBlock, DataBlockInput, DataBlockValidationError, PreservedSection, PrivateRecord,
    PrivateSection, PublicRecord, PublicSection,
};
pub use policy::{AllowAll, AuthorizationPolicy, OrganizationClearance};
pub use store::{PartitionStore, ScanPage};

/// Minimal health-check API.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
