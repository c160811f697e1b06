//! Transaction context handed to every entrypoint.
//!
//! # Responsibility
//! - Carry the submitted proposal: tx id, tx time, caller credential and the
//!   transient input channel.
//! - Expose the transaction's ledger view through the partition store.
//!
//! # Invariants
//! - Transient entries are never written to the ledger by this module.
//! - The tx timestamp is the single time source for preserved sections.

use crate::codec::decode;
use crate::error::{DataBlockError, DataBlockResult};
use crate::ledger::Ledger;
use crate::model::data_block::PrivateSection;
use crate::store::PartitionStore;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Transient entry carrying private sections keyed by data block id.
pub const TRANSIENT_PRIVATE: &str = "private";
/// Transient entry carrying the shared collections to write public records to.
pub const TRANSIENT_COLLECTIONS: &str = "collections";

/// Ephemeral named byte blobs supplied next to a proposal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransientMap {
    entries: BTreeMap<String, Vec<u8>>,
}

impl TransientMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.entries.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// Returns a required entry or `InvalidInput` naming it.
    pub fn require(&self, name: &str) -> DataBlockResult<&[u8]> {
        self.get(name).ok_or_else(|| {
            DataBlockError::invalid_input(format!("transient entry `{name}` is required"))
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decodes the `private` entry: `{"<id>": {"content": "..."}}`.
    pub fn private_sections(&self) -> DataBlockResult<Option<BTreeMap<String, PrivateSection>>> {
        self.get(TRANSIENT_PRIVATE)
            .map(|bytes| decode(TRANSIENT_PRIVATE, bytes).map_err(DataBlockError::from))
            .transpose()
    }

    /// Decodes the `collections` entry: a JSON array of partition names.
    pub fn collections(&self) -> DataBlockResult<Option<Vec<String>>> {
        self.get(TRANSIENT_COLLECTIONS)
            .map(|bytes| decode(TRANSIENT_COLLECTIONS, bytes).map_err(DataBlockError::from))
            .transpose()
    }
}

/// One submitted transaction proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub tx_id: String,
    /// Transaction time, epoch milliseconds.
    pub timestamp_ms: i64,
    /// Serialized caller credential, if any was attached.
    pub creator: Option<Vec<u8>>,
    pub transient: TransientMap,
}

impl Proposal {
    /// Creates an anonymous proposal with a fresh tx id and the current time.
    pub fn new() -> Self {
        Self {
            tx_id: Uuid::new_v4().to_string(),
            timestamp_ms: now_epoch_ms(),
            creator: None,
            transient: TransientMap::new(),
        }
    }

    pub fn with_tx_id(mut self, tx_id: impl Into<String>) -> Self {
        self.tx_id = tx_id.into();
        self
    }

    pub fn with_timestamp_ms(mut self, timestamp_ms: i64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    pub fn with_creator(mut self, creator: impl Into<Vec<u8>>) -> Self {
        self.creator = Some(creator.into());
        self
    }

    pub fn with_transient(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.transient.insert(name, value);
        self
    }
}

impl Default for Proposal {
    fn default() -> Self {
        Self::new()
    }
}

/// Proposal plus the transaction's ledger view.
pub struct TxContext<'a> {
    proposal: &'a Proposal,
    ledger: &'a mut dyn Ledger,
}

impl<'a> TxContext<'a> {
    pub fn new(proposal: &'a Proposal, ledger: &'a mut dyn Ledger) -> Self {
        Self { proposal, ledger }
    }

    pub fn tx_id(&self) -> &str {
        self.proposal.tx_id.as_str()
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.proposal.timestamp_ms
    }

    pub fn creator(&self) -> Option<&[u8]> {
        self.proposal.creator.as_deref()
    }

    pub fn transient(&self) -> &TransientMap {
        &self.proposal.transient
    }

    /// Partition store over this transaction's ledger view.
    pub fn store(&mut self) -> PartitionStore<'_> {
        PartitionStore::new(&mut *self.ledger)
    }
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::{Proposal, TransientMap, TRANSIENT_COLLECTIONS, TRANSIENT_PRIVATE};
    use crate::error::DataBlockError;

    #[test]
    fn require_names_missing_entry() {
        let transient = TransientMap::new();
        let err = transient.require(TRANSIENT_PRIVATE).unwrap_err();
        assert!(matches!(err, DataBlockError::InvalidInput(ref message) if message.contains("private")));
    }

    #[test]
    fn private_sections_decode_by_id() {
        let mut transient = TransientMap::new();
        transient.insert(TRANSIENT_PRIVATE, r#"{"data1":{"content":"C1"}}"#);

        let sections = transient.private_sections().unwrap().unwrap();
        assert_eq!(sections["data1"].content, "C1");
    }

    #[test]
    fn malformed_collections_are_invalid_input() {
        let mut transient = TransientMap::new();
        transient.insert(TRANSIENT_COLLECTIONS, "not-a-list");

        let err = transient.collections().unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn absent_optional_entries_decode_to_none() {
        let transient = TransientMap::new();
        assert!(transient.private_sections().unwrap().is_none());
        assert!(transient.collections().unwrap().is_none());
    }

    #[test]
    fn proposal_builder_sets_fields() {
        let proposal = Proposal::new()
            .with_tx_id("tx-9")
            .with_timestamp_ms(42)
            .with_creator(b"cred".to_vec())
            .with_transient(TRANSIENT_PRIVATE, "{}");

        assert_eq!(proposal.tx_id, "tx-9");
        assert_eq!(proposal.timestamp_ms, 42);
        assert_eq!(proposal.creator.as_deref(), Some(&b"cred"[..]));
        assert_eq!(proposal.transient.len(), 1);
    }
}
