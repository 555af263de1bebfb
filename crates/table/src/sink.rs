//! Checkpointed sink: appends a source's micro-batches to its bronze table
//! with exactly-once effect across restarts.
//!
//! Commit protocol for one batch:
//! 1. drop units the checkpoint has already recorded as committed
//! 2. write the plan (`offsets/<batch_id>.json`)
//! 3. append the rows as transaction `(lineage_id, batch_id)`, retrying
//! 4. advance the checkpoint past `batch_id`
//!
//! A crash between 3 and 4 is repaired on the next [`CheckpointedSink::open`]:
//! the table already holds the transaction, so the checkpoint is advanced
//! without re-appending. A crash before 3 leaves a plan with no matching
//! commit; the plan is discarded and its units are read again.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use bronze_core::config::SinkConfig;
use bronze_core::Record;
use tracing::{info, warn};

use crate::checkpoint::CheckpointStore;
use crate::error::TableError;
use crate::log::{CommitEntry, Transaction};
use crate::table::{AppendOnlyTable, BronzeTable};

/// Records read from one raw unit.
#[derive(Debug, Clone, Default)]
pub struct UnitBatch {
    pub unit_id: String,
    pub records: Vec<Record>,
}

impl UnitBatch {
    pub fn new(unit_id: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            unit_id: unit_id.into(),
            records,
        }
    }
}

/// Outcome of one [`CheckpointedSink::append`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    /// `None` when every unit had already been committed.
    pub batch_id: Option<u64>,
    pub version: Option<u64>,
    pub units: Vec<String>,
    pub rows: u64,
}

impl CommitResult {
    pub fn is_skipped(&self) -> bool {
        self.batch_id.is_none()
    }
}

/// Bounded exponential backoff for table appends.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_millis(2000),
            factor: 1.5,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &SinkConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            ..Self::default()
        }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            factor: 1.0,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32) as i32;
        let ms = self.initial_backoff.as_millis() as f64 * self.factor.powi(exp);
        Duration::from_millis(ms as u64).min(self.max_backoff)
    }
}

pub struct CheckpointedSink<T: AppendOnlyTable = BronzeTable> {
    source: String,
    table: T,
    checkpoint: CheckpointStore,
    retry: RetryPolicy,
}

impl<T: AppendOnlyTable> CheckpointedSink<T> {
    /// Attach `table` to the checkpoint in `checkpoint_dir`, repairing any
    /// batch left half-committed by a previous run.
    pub fn open(
        source: impl Into<String>,
        table: T,
        checkpoint_dir: impl Into<PathBuf>,
        retry: RetryPolicy,
    ) -> Result<Self, TableError> {
        let mut sink = Self {
            source: source.into(),
            table,
            checkpoint: CheckpointStore::open(checkpoint_dir)?,
            retry,
        };
        sink.recover()?;
        Ok(sink)
    }

    fn recover(&mut self) -> Result<(), TableError> {
        let Some(planned) = self.checkpoint.pending_plan()? else {
            return Ok(());
        };

        let committed = self
            .table
            .find_transaction(self.checkpoint.lineage_id(), planned.batch_id);
        match committed {
            Some(entry) => {
                info!(
                    source = %self.source,
                    batch_id = planned.batch_id,
                    version = entry.version,
                    units = planned.units.len(),
                    "Recovered committed batch, advancing checkpoint"
                );
                self.checkpoint.advance(&planned.units)?;
            }
            None => {
                warn!(
                    source = %self.source,
                    batch_id = planned.batch_id,
                    units = planned.units.len(),
                    "Discarding uncommitted batch plan"
                );
                self.checkpoint.discard_plan()?;
            }
        }
        Ok(())
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    pub fn checkpoint(&self) -> &CheckpointStore {
        &self.checkpoint
    }

    pub fn is_committed(&self, unit_id: &str) -> bool {
        self.checkpoint.is_committed(unit_id)
    }

    /// Commit the records of `batches` as one table transaction. Rows keep
    /// the order of `batches`, then the order within each unit.
    pub fn append(&mut self, batches: Vec<UnitBatch>) -> Result<CommitResult, TableError> {
        let pending: Vec<UnitBatch> = batches
            .into_iter()
            .filter(|b| !self.checkpoint.is_committed(&b.unit_id))
            .collect();

        if pending.is_empty() {
            return Ok(CommitResult {
                batch_id: None,
                version: None,
                units: Vec::new(),
                rows: 0,
            });
        }

        let units: Vec<String> = pending.iter().map(|b| b.unit_id.clone()).collect();
        let rows: Vec<Record> = pending.into_iter().flat_map(|b| b.records).collect();

        let planned = self.checkpoint.plan(&units)?;
        let txn = Transaction {
            writer_id: self.checkpoint.lineage_id().to_string(),
            batch_id: planned.batch_id,
            units: units.clone(),
        };

        let entry = self.append_with_retry(&txn, &rows)?;
        self.checkpoint.advance(&units)?;

        Ok(CommitResult {
            batch_id: Some(txn.batch_id),
            version: Some(entry.version),
            units,
            rows: entry.row_count,
        })
    }

    fn append_with_retry(
        &mut self,
        txn: &Transaction,
        rows: &[Record],
    ) -> Result<CommitEntry, TableError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.table.append(txn, rows) {
                Ok(entry) => return Ok(entry),
                Err(e) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff_for(attempt);
                    warn!(
                        source = %self.source,
                        table = %self.table.name(),
                        batch_id = txn.batch_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Append failed, retrying"
                    );
                    thread::sleep(delay);
                }
                Err(e) => {
                    return Err(TableError::CommitFailed {
                        table: self.table.name().to_string(),
                        batch_id: txn.batch_id,
                        units: txn.units.clone(),
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}
