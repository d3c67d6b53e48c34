use duckdb::{Connection, ToSql};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, Result};
use crate::schema::{CanonicalRecord, Metric};

/// Plain SQL identifier: ASCII letter or `_`, then letters, digits, `_`.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn checked(table: &str) -> Result<&str> {
    if is_valid_identifier(table) {
        Ok(table)
    } else {
        Err(ErrorKind::Persist(format!("invalid table name {table:?}")))
    }
}

/// Outcome of one batch write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    pub attempted: u64,
    /// Rows actually added. `None` when the engine cannot say.
    pub inserted: Option<u64>,
}

/// Owned handle to the analytical store.
pub struct Store {
    conn: Connection,
}

/// Drops the staging relation on every exit path, including unwinding.
struct StagingGuard<'a> {
    conn: &'a Connection,
    name: String,
}

impl Drop for StagingGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self
            .conn
            .execute_batch(&format!("DROP TABLE IF EXISTS \"{}\";", self.name))
        {
            debug!(staging = %self.name, error = %e, "staging drop failed");
        }
    }
}

fn metric_columns(prefix: &str) -> String {
    Metric::ALL
        .iter()
        .map(|m| format!("{prefix}\"{}\"", m.column()))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Store {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                ErrorKind::Persist(format!("creating {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "opened store");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Create the canonical table if it does not exist yet.
    pub fn ensure_table(&self, table: &str) -> Result<()> {
        let table = checked(table)?;
        let metrics = Metric::ALL
            .iter()
            .map(|m| format!("    \"{}\" DOUBLE NOT NULL DEFAULT 0", m.column()))
            .collect::<Vec<_>>()
            .join(",\n");
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (
    master_key VARCHAR PRIMARY KEY,
    \"date\" VARCHAR NOT NULL,
    slot INTEGER NOT NULL,
{metrics},
    source_tag VARCHAR NOT NULL,
    ingested_at TIMESTAMP DEFAULT current_timestamp,
    UNIQUE (\"date\", slot, source_tag)
);"
        );
        self.conn.execute_batch(&ddl)?;
        Ok(())
    }

    pub fn row_count(&self, table: &str) -> Result<u64> {
        let table = checked(table)?;
        let n: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM \"{table}\";"), [], |r| {
                r.get(0)
            })?;
        Ok(n.max(0) as u64)
    }

    /// Insert `records` into `table`, skipping rows whose master key or
    /// `(date, slot, source_tag)` is already present.
    ///
    /// The batch goes through a TEMP staging relation and one
    /// `INSERT … SELECT … WHERE NOT EXISTS` inside a single transaction.
    /// Any SQL failure rolls the whole batch back.
    #[tracing::instrument(level = "info", skip(self, records), fields(rows = records.len()))]
    pub fn ingest(&mut self, table: &str, records: &[CanonicalRecord]) -> Result<WriteReport> {
        let table = checked(table)?;
        let attempted = records.len() as u64;
        if records.is_empty() {
            return Ok(WriteReport {
                attempted,
                inserted: Some(0),
            });
        }
        self.ensure_table(table)?;

        let start = Instant::now();
        let staging = format!("_ingest_{table}");
        let tx = self.conn.transaction()?;

        let inserted = {
            // ─── 1) staging relation ───
            let metric_ddl = Metric::ALL
                .iter()
                .map(|m| format!("\"{}\" DOUBLE", m.column()))
                .collect::<Vec<_>>()
                .join(", ");
            tx.execute_batch(&format!(
                "CREATE TEMP TABLE \"{staging}\" (master_key VARCHAR, \"date\" VARCHAR, slot INTEGER, {metric_ddl}, source_tag VARCHAR);"
            ))?;
            let _guard = StagingGuard {
                conn: &tx,
                name: staging.clone(),
            };

            // ─── 2) load batch ───
            let placeholders = vec!["?"; Metric::COUNT + 4].join(", ");
            let mut stmt =
                tx.prepare(&format!("INSERT INTO \"{staging}\" VALUES ({placeholders});"))?;
            for r in records {
                let slot = i32::from(r.slot);
                let mut params: Vec<&dyn ToSql> = Vec::with_capacity(Metric::COUNT + 4);
                params.push(&r.master_key);
                params.push(&r.date);
                params.push(&slot);
                for v in &r.metrics {
                    params.push(v);
                }
                params.push(&r.source_tag);
                stmt.execute(params.as_slice())?;
            }
            drop(stmt);

            // ─── 3) set-based merge ───
            let cols = metric_columns("");
            let src_cols = metric_columns("s.");
            let sql = format!(
                "INSERT INTO \"{table}\" (master_key, \"date\", slot, {cols}, source_tag)
                 SELECT DISTINCT ON (s.master_key) s.master_key, s.\"date\", s.slot, {src_cols}, s.source_tag
                 FROM \"{staging}\" s
                 WHERE NOT EXISTS (
                     SELECT 1 FROM \"{table}\" t
                     WHERE t.master_key = s.master_key
                        OR (t.\"date\" = s.\"date\" AND t.slot = s.slot AND t.source_tag = s.source_tag)
                 );"
            );
            tx.execute(&sql, [])?
        };

        tx.commit()?;
        let inserted = inserted as u64;
        if inserted < attempted {
            debug!(
                conflicted = attempted - inserted,
                "existing master keys left untouched"
            );
        }
        info!(
            attempted,
            inserted,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "batch committed"
        );
        Ok(WriteReport {
            attempted,
            inserted: Some(inserted),
        })
    }

    /// Close the connection, surfacing any error on shutdown.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| {
            warn!(error = %e, "closing store failed");
            ErrorKind::from(e)
        })
    }
}
