//! Experiment run history stored in SQLite.
//!
//! Every evaluated (dataset, model) pair becomes one row, so results from
//! separate invocations can be compared later.

use crate::error::Result;
use crate::metrics::Evaluation;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;

/// The outcome of evaluating one model on one dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub dataset: String,
    pub model: String,
    pub samples: usize,
    pub malicious: usize,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub auc: Option<f64>,
    pub loss: f64,
}

impl RunRecord {
    pub fn from_evaluation(dataset: &str, model: &str, malicious: usize, eval: &Evaluation) -> Self {
        Self {
            dataset: dataset.to_string(),
            model: model.to_string(),
            samples: eval.samples,
            malicious,
            accuracy: eval.metrics.accuracy,
            precision: eval.metrics.precision,
            recall: eval.metrics.recall,
            f1: eval.metrics.f1,
            auc: eval.auc,
            loss: eval.loss,
        }
    }
}

/// A run as read back from the store.
#[derive(Debug, Clone, Serialize)]
pub struct StoredRun {
    pub id: i64,
    pub timestamp: String,
    #[serde(flatten)]
    pub record: RunRecord,
}

const SELECT_RUNS: &str = "SELECT id, timestamp, dataset, model, samples, malicious,
        accuracy, precision, recall, f1, auc, loss FROM runs";

fn stored_run(row: &Row<'_>) -> rusqlite::Result<StoredRun> {
    Ok(StoredRun {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        record: RunRecord {
            dataset: row.get(2)?,
            model: row.get(3)?,
            samples: row.get::<_, i64>(4)? as usize,
            malicious: row.get::<_, i64>(5)? as usize,
            accuracy: row.get(6)?,
            precision: row.get(7)?,
            recall: row.get(8)?,
            f1: row.get(9)?,
            auc: row.get(10)?,
            loss: row.get(11)?,
        },
    })
}

pub struct RunStore {
    conn: Connection,
}

impl RunStore {
    /// Open or create the store at `db_path`.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                dataset TEXT NOT NULL,
                model TEXT NOT NULL,
                samples INTEGER NOT NULL,
                malicious INTEGER NOT NULL,
                accuracy REAL NOT NULL,
                precision REAL NOT NULL,
                recall REAL NOT NULL,
                f1 REAL NOT NULL,
                auc REAL,
                loss REAL NOT NULL
            )",
            [],
        )?;
        Ok(Self { conn })
    }

    pub fn record(&self, run: &RunRecord) -> Result<i64> {
        let timestamp = chrono::Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (timestamp, dataset, model, samples, malicious,
                accuracy, precision, recall, f1, auc, loss)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                timestamp,
                run.dataset,
                run.model,
                run.samples as i64,
                run.malicious as i64,
                run.accuracy,
                run.precision,
                run.recall,
                run.f1,
                run.auc,
                run.loss
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::debug!("Recorded run {} ({} on {})", id, run.model, run.dataset);
        Ok(id)
    }

    /// The last `limit` runs, oldest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<StoredRun>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_RUNS} ORDER BY id DESC LIMIT ?1"))?;
        let mut runs = stmt
            .query_map([limit as i64], stored_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        runs.reverse();
        Ok(runs)
    }

    pub fn for_dataset(&self, dataset: &str) -> Result<Vec<StoredRun>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_RUNS} WHERE dataset = ?1 ORDER BY id"))?;
        let runs = stmt
            .query_map([dataset], stored_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }

    /// Highest-F1 run on `dataset`; the earliest wins ties.
    pub fn best_by_f1(&self, dataset: &str) -> Result<Option<StoredRun>> {
        let run = self
            .conn
            .query_row(
                &format!("{SELECT_RUNS} WHERE dataset = ?1 ORDER BY f1 DESC, id ASC LIMIT 1"),
                [dataset],
                stored_run,
            )
            .optional()?;
        Ok(run)
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn clear(&self) -> Result<usize> {
        let removed = self.conn.execute("DELETE FROM runs", [])?;
        tracing::info!("Cleared {} runs from history", removed);
        Ok(removed)
    }

    pub fn stats(&self) -> Result<HistoryStats> {
        let (total_runs, datasets, models): (i64, i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT dataset), COUNT(DISTINCT model) FROM runs",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let mean_f1: Option<f64> = self
            .conn
            .query_row("SELECT AVG(f1) FROM runs", [], |row| row.get(0))?;

        let db_size_bytes = self
            .conn
            .path()
            .filter(|p| !p.is_empty())
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(HistoryStats {
            total_runs: total_runs as usize,
            datasets: datasets as usize,
            models: models as usize,
            mean_f1,
            db_size_bytes,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryStats {
    pub total_runs: usize,
    pub datasets: usize,
    pub models: usize,
    pub mean_f1: Option<f64>,
    pub db_size_bytes: u64,
}
