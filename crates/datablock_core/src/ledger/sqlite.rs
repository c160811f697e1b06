//! SQLite committed-state backend.
//!
//! # Responsibility
//! - Open file or in-memory ledger databases and apply schema migrations.
//! - Commit staged write sets atomically and record each commit.
//! - Serve range scans through a paged keyset cursor.
//!
//! # Invariants
//! - Returned ledgers have migrations fully applied.
//! - One `commit` is one SQLite transaction; a failure leaves no rows behind.
//! - A transaction id can be committed at most once.

use super::migrations::{apply_migrations, current_user_version};
use super::{LedgerBackend, LedgerResult, StateCursor, StateEntry, StateWrite};
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::VecDeque;
use std::path::Path;
use std::time::{Duration, Instant};

const SCAN_PAGE_ROWS: usize = 64;

/// Ledger state persisted in a SQLite database.
pub struct SqliteLedger {
    conn: Connection,
}

impl SqliteLedger {
    /// Opens a ledger file and applies all pending migrations.
    ///
    /// # Side effects
    /// - Emits `ledger_open` logging events with duration and status.
    pub fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        Self::open_with("file", || Connection::open(path))
    }

    /// Opens an in-memory ledger and applies all pending migrations.
    pub fn open_in_memory() -> LedgerResult<Self> {
        Self::open_with("memory", Connection::open_in_memory)
    }

    fn open_with(
        mode: &'static str,
        connect: impl FnOnce() -> rusqlite::Result<Connection>,
    ) -> LedgerResult<Self> {
        let started_at = Instant::now();
        info!("event=ledger_open module=ledger status=start mode={mode}");

        let mut conn = match connect() {
            Ok(conn) => conn,
            Err(err) => {
                error!(
                    "event=ledger_open module=ledger status=error mode={mode} duration_ms={} error_code=ledger_open_failed error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err.into());
            }
        };

        match bootstrap_connection(&mut conn) {
            Ok(()) => {
                info!(
                    "event=ledger_open module=ledger status=ok mode={mode} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(Self { conn })
            }
            Err(err) => {
                error!(
                    "event=ledger_open module=ledger status=error mode={mode} duration_ms={} error_code=ledger_bootstrap_failed error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Schema version recorded in the ledger file.
    pub fn schema_version(&self) -> LedgerResult<u32> {
        current_user_version(&self.conn)
    }

    /// Number of committed transactions.
    pub fn commit_count(&self) -> LedgerResult<u64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM ledger_commits;", [], |row| {
                row.get::<_, i64>(0)
            })?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Returns the write count recorded for `tx_id`, if it was committed.
    pub fn committed_write_count(&self, tx_id: &str) -> LedgerResult<Option<u64>> {
        let count = self
            .conn
            .query_row(
                "SELECT write_count FROM ledger_commits WHERE tx_id = ?1;",
                [tx_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(count.map(|value| u64::try_from(value).unwrap_or(0)))
    }
}

impl LedgerBackend for SqliteLedger {
    fn read_state(&self, partition: &str, key: &str) -> LedgerResult<Option<Vec<u8>>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM ledger_state WHERE partition = ?1 AND key = ?2;",
                params![partition, key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn range_state<'a>(
        &'a self,
        partition: &str,
        start: &str,
        end: &str,
    ) -> LedgerResult<StateCursor<'a>> {
        Ok(Box::new(SqliteCursor {
            conn: &self.conn,
            partition: partition.to_string(),
            end: end.to_string(),
            resume: Resume::From(start.to_string()),
            buffer: VecDeque::new(),
            exhausted: false,
        }))
    }

    fn commit(&mut self, tx_id: &str, writes: Vec<StateWrite>) -> LedgerResult<()> {
        let started_at = Instant::now();
        let write_count = writes.len();

        let result = commit_writes(&mut self.conn, tx_id, &writes);
        match &result {
            Ok(()) => info!(
                "event=ledger_commit module=ledger status=ok tx_id={tx_id} writes={write_count} duration_ms={}",
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=ledger_commit module=ledger status=error tx_id={tx_id} writes={write_count} duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }
}

fn bootstrap_connection(conn: &mut Connection) -> LedgerResult<()> {
    conn.busy_timeout(Duration::from_secs(5))?;
    apply_migrations(conn)?;
    Ok(())
}

fn commit_writes(conn: &mut Connection, tx_id: &str, writes: &[StateWrite]) -> LedgerResult<()> {
    let tx = conn.transaction()?;
    {
        let mut upsert = tx.prepare_cached(
            "INSERT INTO ledger_state (partition, key, value)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(partition, key) DO UPDATE SET
                value = excluded.value,
                updated_at = (strftime('%s', 'now') * 1000);",
        )?;
        let mut delete =
            tx.prepare_cached("DELETE FROM ledger_state WHERE partition = ?1 AND key = ?2;")?;

        for write in writes {
            match &write.value {
                Some(value) => upsert.execute(params![write.partition, write.key, value])?,
                None => delete.execute(params![write.partition, write.key])?,
            };
        }
    }
    tx.execute(
        "INSERT INTO ledger_commits (tx_id, write_count) VALUES (?1, ?2);",
        params![tx_id, i64::try_from(writes.len()).unwrap_or(i64::MAX)],
    )?;
    tx.commit()?;
    Ok(())
}

enum Resume {
    /// First page: start key is inclusive.
    From(String),
    /// Later pages: continue strictly after the last yielded key.
    After(String),
}

/// Keyset-paged cursor; holds no statement between pages.
struct SqliteCursor<'c> {
    conn: &'c Connection,
    partition: String,
    end: String,
    resume: Resume,
    buffer: VecDeque<StateEntry>,
    exhausted: bool,
}

impl SqliteCursor<'_> {
    fn fill(&mut self) -> LedgerResult<()> {
        let (inclusive, bound) = match &self.resume {
            Resume::From(key) => (1_i64, key.as_str()),
            Resume::After(key) => (0_i64, key.as_str()),
        };

        let mut stmt = self.conn.prepare_cached(
            "SELECT key, value
             FROM ledger_state
             WHERE partition = ?1
               AND ((?2 = 1 AND key >= ?3) OR (?2 = 0 AND key > ?3))
               AND (?4 = '' OR key < ?4)
             ORDER BY key ASC
             LIMIT ?5;",
        )?;
        let rows = stmt.query_map(
            params![
                self.partition,
                inclusive,
                bound,
                self.end,
                i64::try_from(SCAN_PAGE_ROWS).unwrap_or(i64::MAX)
            ],
            |row| {
                Ok(StateEntry {
                    key: row.get(0)?,
                    value: row.get(1)?,
                })
            },
        )?;

        let mut fetched = 0_usize;
        for row in rows {
            self.buffer.push_back(row?);
            fetched += 1;
        }

        if fetched < SCAN_PAGE_ROWS {
            self.exhausted = true;
        }
        if let Some(last) = self.buffer.back() {
            self.resume = Resume::After(last.key.clone());
        }
        Ok(())
    }
}

impl Iterator for SqliteCursor<'_> {
    type Item = LedgerResult<StateEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(err) = self.fill() {
                self.exhausted = true;
                return Some(Err(err));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}
