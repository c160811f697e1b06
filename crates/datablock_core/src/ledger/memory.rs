//! In-memory committed-state backend.
//!
//! Ordered maps per partition; used by tests and ephemeral nodes. Open range
//! cursors are counted so callers can assert that scans release them.

use super::{key_in_range, LedgerBackend, LedgerResult, StateCursor, StateEntry, StateWrite};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Committed partitions held in process memory.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    partitions: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    committed: Vec<String>,
    open_cursors: Arc<AtomicUsize>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transaction ids committed so far, oldest first.
    pub fn committed_tx_ids(&self) -> &[String] {
        &self.committed
    }

    /// Number of range cursors handed out and not yet dropped.
    pub fn open_cursor_count(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    /// Number of keys stored in one partition.
    pub fn partition_len(&self, partition: &str) -> usize {
        self.partitions.get(partition).map_or(0, BTreeMap::len)
    }
}

impl LedgerBackend for MemoryLedger {
    fn read_state(&self, partition: &str, key: &str) -> LedgerResult<Option<Vec<u8>>> {
        Ok(self
            .partitions
            .get(partition)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn range_state<'a>(
        &'a self,
        partition: &str,
        start: &str,
        end: &str,
    ) -> LedgerResult<StateCursor<'a>> {
        let entries = self
            .partitions
            .get(partition)
            .map(|entries| {
                entries
                    .range(start.to_string()..)
                    .take_while(|(key, _)| key_in_range(key, start, end))
                    .map(|(key, value)| (key.as_str(), value.as_slice()))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        self.open_cursors.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryCursor {
            entries: entries.into_iter(),
            open_cursors: Arc::clone(&self.open_cursors),
        }))
    }

    fn commit(&mut self, tx_id: &str, writes: Vec<StateWrite>) -> LedgerResult<()> {
        for write in writes {
            match write.value {
                Some(value) => {
                    self.partitions
                        .entry(write.partition)
                        .or_default()
                        .insert(write.key, value);
                }
                None => {
                    if let Some(entries) = self.partitions.get_mut(&write.partition) {
                        entries.remove(&write.key);
                    }
                }
            }
        }
        self.committed.push(tx_id.to_string());
        Ok(())
    }
}

struct MemoryCursor<'a> {
    entries: std::vec::IntoIter<(&'a str, &'a [u8])>,
    open_cursors: Arc<AtomicUsize>,
}

impl Iterator for MemoryCursor<'_> {
    type Item = LedgerResult<StateEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next().map(|(key, value)| {
            Ok(StateEntry {
                key: key.to_string(),
                value: value.to_vec(),
            })
        })
    }
}

impl Drop for MemoryCursor<'_> {
    fn drop(&mut self) {
        self.open_cursors.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryLedger;
    use crate::ledger::{LedgerBackend, StateWrite};

    fn put(partition: &str, key: &str, value: &str) -> StateWrite {
        StateWrite {
            partition: partition.to_string(),
            key: key.to_string(),
            value: Some(value.as_bytes().to_vec()),
        }
    }

    #[test]
    fn partitions_have_independent_key_spaces() {
        let mut ledger = MemoryLedger::new();
        ledger
            .commit("tx-1", vec![put("", "data1", "pub"), put("org", "data1", "priv")])
            .unwrap();

        assert_eq!(ledger.read_state("", "data1").unwrap(), Some(b"pub".to_vec()));
        assert_eq!(
            ledger.read_state("org", "data1").unwrap(),
            Some(b"priv".to_vec())
        );
        assert_eq!(ledger.read_state("other", "data1").unwrap(), None);
    }

    #[test]
    fn range_is_ordered_half_open_and_releases_cursor() {
        let mut ledger = MemoryLedger::new();
        ledger
            .commit(
                "tx-1",
                vec![put("", "c", "3"), put("", "a", "1"), put("", "b", "2")],
            )
            .unwrap();

        {
            let cursor = ledger.range_state("", "a", "c").unwrap();
            assert_eq!(ledger.open_cursor_count(), 1);
            let keys: Vec<String> = cursor.map(|entry| entry.unwrap().key).collect();
            assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
        }
        assert_eq!(ledger.open_cursor_count(), 0);
    }

    #[test]
    fn delete_write_removes_key() {
        let mut ledger = MemoryLedger::new();
        ledger.commit("tx-1", vec![put("", "a", "1")]).unwrap();
        ledger
            .commit(
                "tx-2",
                vec![StateWrite {
                    partition: String::new(),
                    key: "a".to_string(),
                    value: None,
                }],
            )
            .unwrap();

        assert_eq!(ledger.read_state("", "a").unwrap(), None);
        assert_eq!(ledger.partition_len(""), 0);
    }
}
