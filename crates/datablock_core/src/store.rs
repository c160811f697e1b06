//! Partition-scoped key/value primitives.
//!
//! # Responsibility
//! - Wrap the `Ledger` capability with get/set/delete/scan scoped by
//!   partition.
//! - Tag every ledger failure with operation, partition and key.
//!
//! # Invariants
//! - `scan` never returns more than `limit` entries.
//! - `scan` drops its cursor on every exit path (completion, error, cutoff).

use crate::error::{DataBlockError, DataBlockResult};
use crate::ledger::{Ledger, LedgerError, StateEntry};
use log::debug;

/// One bounded page produced by `PartitionStore::scan`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Entries in ascending key order.
    pub entries: Vec<StateEntry>,
    /// First key past this page, when the range holds more entries.
    pub next_key: Option<String>,
}

/// Partition store over one transaction's ledger view.
pub struct PartitionStore<'s> {
    ledger: &'s mut dyn Ledger,
}

impl<'s> PartitionStore<'s> {
    pub fn new(ledger: &'s mut dyn Ledger) -> Self {
        Self { ledger }
    }

    pub fn get(&self, partition: &str, key: &str) -> DataBlockResult<Option<Vec<u8>>> {
        self.ledger
            .get_state(partition, key)
            .map_err(|source| storage_error("get", partition, key, source))
    }

    pub fn set(&mut self, partition: &str, key: &str, value: Vec<u8>) -> DataBlockResult<()> {
        self.ledger
            .put_state(partition, key, value)
            .map_err(|source| storage_error("set", partition, key, source))
    }

    pub fn delete(&mut self, partition: &str, key: &str) -> DataBlockResult<()> {
        self.ledger
            .delete_state(partition, key)
            .map_err(|source| storage_error("delete", partition, key, source))
    }

    /// Reads at most `limit` entries with keys in `[start, end)`.
    ///
    /// Empty `start`/`end` leave that side of the range open.
    pub fn scan(
        &self,
        partition: &str,
        start: &str,
        end: &str,
        limit: usize,
    ) -> DataBlockResult<ScanPage> {
        let range = format!("{start}..{end}");
        let fail = |source| storage_error("scan", partition, &range, source);

        let mut cursor = self.ledger.scan_state(partition, start, end).map_err(fail)?;
        let mut entries = Vec::with_capacity(limit.min(64));
        while entries.len() < limit {
            match cursor.next() {
                Some(Ok(entry)) => entries.push(entry),
                Some(Err(source)) => return Err(fail(source)),
                None => {
                    debug!(
                        "event=state_scan module=store status=ok count={} truncated=false",
                        entries.len()
                    );
                    return Ok(ScanPage {
                        entries,
                        next_key: None,
                    });
                }
            }
        }

        let next_key = match cursor.next() {
            Some(Ok(entry)) => Some(entry.key),
            Some(Err(source)) => return Err(fail(source)),
            None => None,
        };
        debug!(
            "event=state_scan module=store status=ok count={} truncated={}",
            entries.len(),
            next_key.is_some()
        );
        Ok(ScanPage { entries, next_key })
    }
}

fn storage_error(
    operation: &'static str,
    partition: &str,
    key: &str,
    source: LedgerError,
) -> DataBlockError {
    DataBlockError::Storage {
        operation,
        partition: partition.to_string(),
        key: key.to_string(),
        source,
    }
}
