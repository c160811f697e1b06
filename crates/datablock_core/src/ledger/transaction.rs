//! Staged per-request transaction over a committed backend.
//!
//! # Invariants
//! - Reads observe the transaction's own staged writes (read-your-writes),
//!   including range scans.
//! - Nothing reaches the backend until `into_writes()` output is committed.

use super::{
    key_in_range, Ledger, LedgerBackend, LedgerResult, StateCursor, StateEntry, StateWrite,
};
use std::collections::BTreeMap;
use std::iter::Peekable;

type StagedKey = (String, String);

/// Write buffer layered over a borrowed backend.
pub struct LedgerTransaction<'b, B: LedgerBackend + ?Sized> {
    base: &'b B,
    staged: BTreeMap<StagedKey, Option<Vec<u8>>>,
}

impl<'b, B: LedgerBackend + ?Sized> LedgerTransaction<'b, B> {
    pub fn begin(base: &'b B) -> Self {
        Self {
            base,
            staged: BTreeMap::new(),
        }
    }

    /// Consumes the transaction into its write set, ordered by partition/key.
    pub fn into_writes(self) -> Vec<StateWrite> {
        self.staged
            .into_iter()
            .map(|((partition, key), value)| StateWrite {
                partition,
                key,
                value,
            })
            .collect()
    }
}

impl<B: LedgerBackend + ?Sized> Ledger for LedgerTransaction<'_, B> {
    fn get_state(&self, partition: &str, key: &str) -> LedgerResult<Option<Vec<u8>>> {
        match self.staged.get(&(partition.to_string(), key.to_string())) {
            Some(staged) => Ok(staged.clone()),
            None => self.base.read_state(partition, key),
        }
    }

    fn put_state(&mut self, partition: &str, key: &str, value: Vec<u8>) -> LedgerResult<()> {
        self.staged
            .insert((partition.to_string(), key.to_string()), Some(value));
        Ok(())
    }

    fn delete_state(&mut self, partition: &str, key: &str) -> LedgerResult<()> {
        self.staged
            .insert((partition.to_string(), key.to_string()), None);
        Ok(())
    }

    fn scan_state<'a>(
        &'a self,
        partition: &str,
        start: &str,
        end: &str,
    ) -> LedgerResult<StateCursor<'a>> {
        let staged = self
            .staged
            .range((partition.to_string(), start.to_string())..)
            .take_while(|((staged_partition, key), _)| {
                staged_partition == partition && key_in_range(key, start, end)
            })
            .map(|((_, key), value)| (key.clone(), value.clone()))
            .collect::<Vec<_>>();

        let base = self.base.range_state(partition, start, end)?;
        Ok(Box::new(OverlayCursor {
            base: base.peekable(),
            staged: staged.into_iter().peekable(),
        }))
    }
}

/// Merges committed entries with staged writes in key order.
struct OverlayCursor<'a> {
    base: Peekable<StateCursor<'a>>,
    staged: Peekable<std::vec::IntoIter<(String, Option<Vec<u8>>)>>,
}

enum NextSource {
    Base,
    Staged { shadows_base: bool },
    Done,
}

impl OverlayCursor<'_> {
    fn next_source(&mut self) -> NextSource {
        match (self.base.peek(), self.staged.peek()) {
            (None, None) => NextSource::Done,
            (Some(_), None) | (Some(Err(_)), Some(_)) => NextSource::Base,
            (None, Some(_)) => NextSource::Staged {
                shadows_base: false,
            },
            (Some(Ok(committed)), Some((staged_key, _))) => {
                if committed.key < *staged_key {
                    NextSource::Base
                } else {
                    NextSource::Staged {
                        shadows_base: committed.key == *staged_key,
                    }
                }
            }
        }
    }
}

impl Iterator for OverlayCursor<'_> {
    type Item = LedgerResult<StateEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.next_source() {
                NextSource::Done => return None,
                NextSource::Base => return self.base.next(),
                NextSource::Staged { shadows_base } => {
                    if shadows_base {
                        self.base.next();
                    }
                    match self.staged.next() {
                        Some((key, Some(value))) => return Some(Ok(StateEntry { key, value })),
                        // Staged delete hides the committed entry.
                        Some((_, None)) => continue,
                        None => return None,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::LedgerTransaction;
    use crate::ledger::{Ledger, LedgerBackend, MemoryLedger, StateWrite};

    fn seeded() -> MemoryLedger {
        let mut ledger = MemoryLedger::new();
        let writes = ["a", "c", "e"]
            .iter()
            .map(|key| StateWrite {
                partition: String::new(),
                key: key.to_string(),
                value: Some(format!("committed-{key}").into_bytes()),
            })
            .collect();
        ledger.commit("seed", writes).unwrap();
        ledger
    }

    #[test]
    fn reads_observe_own_writes_and_deletes() {
        let ledger = seeded();
        let mut tx = LedgerTransaction::begin(&ledger);

        tx.put_state("", "b", b"staged-b".to_vec()).unwrap();
        tx.delete_state("", "c").unwrap();

        assert_eq!(tx.get_state("", "b").unwrap(), Some(b"staged-b".to_vec()));
        assert_eq!(tx.get_state("", "c").unwrap(), None);
        assert_eq!(
            ledger.read_state("", "c").unwrap(),
            Some(b"committed-c".to_vec())
        );
    }

    #[test]
    fn scan_merges_staged_writes_in_key_order() {
        let ledger = seeded();
        let mut tx = LedgerTransaction::begin(&ledger);
        tx.put_state("", "b", b"staged-b".to_vec()).unwrap();
        tx.put_state("", "e", b"staged-e".to_vec()).unwrap();
        tx.delete_state("", "c").unwrap();
        tx.put_state("other", "d", b"elsewhere".to_vec()).unwrap();

        let entries: Vec<(String, Vec<u8>)> = tx
            .scan_state("", "", "")
            .unwrap()
            .map(|entry| {
                let entry = entry.unwrap();
                (entry.key, entry.value)
            })
            .collect();

        assert_eq!(
            entries,
            vec![
                ("a".to_string(), b"committed-a".to_vec()),
                ("b".to_string(), b"staged-b".to_vec()),
                ("e".to_string(), b"staged-e".to_vec()),
            ]
        );
        assert_eq!(ledger.open_cursor_count(), 0);
    }

    #[test]
    fn into_writes_returns_deletes_as_none() {
        let ledger = seeded();
        let mut tx = LedgerTransaction::begin(&ledger);
        tx.delete_state("", "a").unwrap();
        tx.put_state("p", "k", b"v".to_vec()).unwrap();
        let writes = tx.into_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].key, "a");
        assert_eq!(writes[0].value, None);
        assert_eq!(writes[1].partition, "p");
    }
}
