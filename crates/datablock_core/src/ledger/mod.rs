//! Ledger capability and local state backends.
//!
//! # Responsibility
//! - Define the `Ledger` capability the partition store calls into.
//! - Provide committed-state backends (`MemoryLedger`, `SqliteLedger`).
//! - Run each request as one staged transaction via [`execute`].
//!
//! # Invariants
//! - Writes of a request become visible to other requests only after the
//!   request succeeds and its staged writes are committed as one batch.
//! - `execute` borrows the backend exclusively, so requests against one
//!   backend are serialized. Existence checks in the engine are race-free
//!   only under this ordering; a backend shared across processes must offer
//!   the same serializable commit order.
//! - Range cursors yield keys in ascending byte order and release their
//!   resources on drop.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod memory;
pub mod migrations;
mod sqlite;
mod transaction;

pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;
pub use transaction::LedgerTransaction;

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Failure raised by a ledger backend.
#[derive(Debug)]
pub enum LedgerError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// Backend-specific failure without a richer error type.
    Unavailable(String),
}

impl Display for LedgerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "ledger schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::Unavailable(message) => write!(f, "ledger unavailable: {message}"),
        }
    }
}

impl Error for LedgerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } | Self::Unavailable(_) => None,
        }
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// One key/value pair yielded by a range scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateEntry {
    pub key: String,
    pub value: Vec<u8>,
}

/// One staged mutation. `value = None` deletes the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateWrite {
    pub partition: String,
    pub key: String,
    pub value: Option<Vec<u8>>,
}

/// Ordered, finite, non-restartable range cursor.
///
/// Dropping the cursor releases whatever the backend holds for it.
pub type StateCursor<'a> = Box<dyn Iterator<Item = LedgerResult<StateEntry>> + 'a>;

/// Key/value capability scoped by partition, as seen by one transaction.
///
/// An empty `end` in `scan_state` means "no upper bound".
pub trait Ledger {
    fn get_state(&self, partition: &str, key: &str) -> LedgerResult<Option<Vec<u8>>>;
    fn put_state(&mut self, partition: &str, key: &str, value: Vec<u8>) -> LedgerResult<()>;
    fn delete_state(&mut self, partition: &str, key: &str) -> LedgerResult<()>;
    fn scan_state<'a>(
        &'a self,
        partition: &str,
        start: &str,
        end: &str,
    ) -> LedgerResult<StateCursor<'a>>;
}

/// Committed state store that staged transactions read from and commit to.
pub trait LedgerBackend {
    fn read_state(&self, partition: &str, key: &str) -> LedgerResult<Option<Vec<u8>>>;
    fn range_state<'a>(
        &'a self,
        partition: &str,
        start: &str,
        end: &str,
    ) -> LedgerResult<StateCursor<'a>>;
    /// Applies all writes atomically under `tx_id`.
    fn commit(&mut self, tx_id: &str, writes: Vec<StateWrite>) -> LedgerResult<()>;
}

/// Runs `run` against a fresh staged transaction and commits on success.
///
/// On `Err` the staged writes are dropped and the backend is untouched.
pub fn execute<B, T, E, F>(backend: &mut B, tx_id: &str, run: F) -> Result<T, E>
where
    B: LedgerBackend,
    E: From<LedgerError>,
    F: FnOnce(&mut LedgerTransaction<'_, B>) -> Result<T, E>,
{
    let (result, writes) = {
        let mut tx = LedgerTransaction::begin(&*backend);
        let result = run(&mut tx);
        (result, tx.into_writes())
    };

    let value = result?;
    backend.commit(tx_id, writes)?;
    Ok(value)
}

/// Returns whether `key` is inside `[start, end)` with empty bounds open.
pub(crate) fn key_in_range(key: &str, start: &str, end: &str) -> bool {
    key >= start && (end.is_empty() || key < end)
}
