//! Per-source checkpoint: which raw units have been committed, and the
//! write-ahead record of the batch currently being committed.
//!
//! ```text
//! <checkpoint_dir>/
//!   checkpoint.json          <- lineage id, next batch id, committed units
//!   offsets/<batch_id>.json  <- units planned for a batch, written before commit
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::TableError;
use crate::fs_util::{read_json, write_json_atomic};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Identifies this checkpoint lineage. Deleting the checkpoint starts a
    /// new lineage, and with it a fresh already-seen set.
    pub lineage_id: String,
    pub next_batch_id: u64,
    /// Committed unit identifiers in commit order.
    pub committed_units: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// Units planned for one batch, recorded before the table commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedBatch {
    pub batch_id: u64,
    pub units: Vec<String>,
}

/// Durable checkpoint owned by exactly one source's sink.
pub struct CheckpointStore {
    dir: PathBuf,
    state: Checkpoint,
    seen: HashSet<String>,
}

impl CheckpointStore {
    /// Load the checkpoint in `dir`, starting a new lineage when none exists.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, TableError> {
        let dir = dir.into();
        fs::create_dir_all(dir.join("offsets"))?;

        let path = dir.join("checkpoint.json");
        let state = match read_json::<Checkpoint>(&path)? {
            Some(state) => state,
            None => {
                let state = Checkpoint {
                    lineage_id: Uuid::new_v4().to_string(),
                    next_batch_id: 0,
                    committed_units: Vec::new(),
                    updated_at: Utc::now(),
                };
                write_json_atomic(&path, &state)?;
                info!(dir = %dir.display(), lineage = %state.lineage_id, "Started new checkpoint lineage");
                state
            }
        };

        let seen = state.committed_units.iter().cloned().collect();
        Ok(Self { dir, state, seen })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn lineage_id(&self) -> &str {
        &self.state.lineage_id
    }

    pub fn next_batch_id(&self) -> u64 {
        self.state.next_batch_id
    }

    pub fn state(&self) -> &Checkpoint {
        &self.state
    }

    pub fn is_committed(&self, unit: &str) -> bool {
        self.seen.contains(unit)
    }

    pub fn committed_units(&self) -> &[String] {
        &self.state.committed_units
    }

    fn offsets_path(&self, batch_id: u64) -> PathBuf {
        self.dir.join("offsets").join(format!("{batch_id}.json"))
    }

    /// Record the units about to be committed as batch `next_batch_id`.
    pub fn plan(&self, units: &[String]) -> Result<PlannedBatch, TableError> {
        let planned = PlannedBatch {
            batch_id: self.state.next_batch_id,
            units: units.to_vec(),
        };
        write_json_atomic(&self.offsets_path(planned.batch_id), &planned)?;
        Ok(planned)
    }

    /// The plan for `next_batch_id`, if one was written but never completed.
    pub fn pending_plan(&self) -> Result<Option<PlannedBatch>, TableError> {
        read_json(&self.offsets_path(self.state.next_batch_id))
    }

    /// Drop an uncompleted plan so its units are discovered again.
    pub fn discard_plan(&self) -> Result<(), TableError> {
        match fs::remove_file(self.offsets_path(self.state.next_batch_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Move past batch `next_batch_id`, marking `units` committed.
    pub fn advance(&mut self, units: &[String]) -> Result<(), TableError> {
        let mut next = self.state.clone();
        for unit in units {
            if !self.seen.contains(unit) {
                next.committed_units.push(unit.clone());
            }
        }
        next.next_batch_id += 1;
        next.updated_at = Utc::now();

        write_json_atomic(&self.dir.join("checkpoint.json"), &next)?;
        self.seen.extend(units.iter().cloned());
        self.state = next;
        Ok(())
    }
}
