//! Existence preconditions for create/update/delete.
//!
//! These are read-then-branch checks, not compare-and-swap. They stay
//! correct only because requests against one ledger commit in a serial order
//! (see `ledger::execute`); a concurrent writer between the check and the
//! write would not be detected here.

use crate::error::{DataBlockError, DataBlockResult};
use crate::store::PartitionStore;

/// Existence checks layered on a partition store.
pub trait ExistenceGuard {
    /// Fails with `AlreadyExists` when `key` is present in `partition`.
    fn require_absent(&self, partition: &str, key: &str) -> DataBlockResult<()>;
    /// Returns the stored bytes, or fails with `NotFound`.
    fn require_exists(&self, partition: &str, key: &str) -> DataBlockResult<Vec<u8>>;
}

impl ExistenceGuard for PartitionStore<'_> {
    fn require_absent(&self, partition: &str, key: &str) -> DataBlockResult<()> {
        match self.get(partition, key)? {
            Some(_) => Err(DataBlockError::already_exists(partition, key)),
            None => Ok(()),
        }
    }

    fn require_exists(&self, partition: &str, key: &str) -> DataBlockResult<Vec<u8>> {
        self.get(partition, key)?
            .ok_or_else(|| DataBlockError::not_found(partition, key))
    }
}

#[cfg(test)]
mod tests {
    use super::ExistenceGuard;
    use crate::error::DataBlockError;
    use crate::ledger::{LedgerTransaction, MemoryLedger};
    use crate::store::PartitionStore;

    #[test]
    fn absent_key_passes_create_check_and_fails_update_check() {
        let ledger = MemoryLedger::new();
        let mut tx = LedgerTransaction::begin(&ledger);
        let store = PartitionStore::new(&mut tx);

        store.require_absent("", "data1").unwrap();
        let err = store.require_exists("", "data1").unwrap_err();
        assert!(matches!(err, DataBlockError::NotFound { ref key, .. } if key == "data1"));
    }

    #[test]
    fn present_key_fails_create_check_and_returns_bytes() {
        let ledger = MemoryLedger::new();
        let mut tx = LedgerTransaction::begin(&ledger);
        let mut store = PartitionStore::new(&mut tx);
        store.set("org", "data1", b"stored".to_vec()).unwrap();

        let err = store.require_absent("org", "data1").unwrap_err();
        assert!(matches!(err, DataBlockError::AlreadyExists { ref partition, .. } if partition == "org"));
        assert_eq!(store.require_exists("org", "data1").unwrap(), b"stored".to_vec());
        assert!(store.require_exists("", "data1").is_err());
    }
}
