//! Run history backed by redb.
//!
//! # Table design
//!
//! A single `RUNS` table keyed by a 24-byte composite:
//! ```text
//! [ started_at_ms: u64 big-endian (8 bytes) | run_id: 16 bytes ]
//! ```
//!
//! Big-endian timestamps sort bytewise in time order, so a reverse scan
//! lists the newest runs first without decoding values.

use crate::error::{AcgenError, Result};
use crate::pipeline::PipelineRun;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use uuid::Uuid;

/// Sink for finished runs. The pipeline writes to it and never reads back.
pub trait RunHistory: Send + Sync {
    fn record(&self, run: &PipelineRun) -> Result<()>;

    /// Newest first.
    fn recent(&self, limit: usize) -> Result<Vec<PipelineRun>>;
}

/// Key: started_at ms ++ run id. Value: JSON-encoded `PipelineRun`.
const RUNS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("runs");

fn run_key(started_at: DateTime<Utc>, id: Uuid) -> [u8; 24] {
    let mut key = [0u8; 24];
    let ms = started_at.timestamp_millis().max(0) as u64;
    key[..8].copy_from_slice(&ms.to_be_bytes());
    key[8..].copy_from_slice(id.as_bytes());
    key
}

fn db_err(e: impl std::fmt::Display) -> AcgenError {
    AcgenError::History(e.to_string())
}

pub struct RedbHistory {
    db: Database,
}

impl RedbHistory {
    /// Open or create the store at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        crate::io::ensure_parent(path)?;
        let db = Database::create(path).map_err(db_err)?;
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(RUNS).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        tracing::debug!(path = %path.display(), "run history opened");
        Ok(Self { db })
    }
}

impl RunHistory for RedbHistory {
    fn record(&self, run: &PipelineRun) -> Result<()> {
        let key = run_key(run.started_at(), run.run_id());
        let value = serde_json::to_vec(run)?;
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(RUNS).map_err(db_err)?;
            table
                .insert(key.as_slice(), value.as_slice())
                .map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<PipelineRun>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(RUNS).map_err(db_err)?;
        let mut runs = Vec::new();
        for entry in table.iter().map_err(db_err)?.rev().take(limit) {
            let (_, v) = entry.map_err(db_err)?;
            runs.push(serde_json::from_slice(v.value())?);
        }
        Ok(runs)
    }
}
