//! Commit log entries. A batch is committed exactly when its entry file
//! exists under `_commits/`; segment files without an entry are ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of an idempotent append: a writer lineage plus a batch number
/// that only ever increases within that lineage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub writer_id: String,
    pub batch_id: u64,
    /// Provenance identifiers of the raw units whose records the batch holds.
    pub units: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitEntry {
    pub version: u64,
    pub writer_id: String,
    pub batch_id: u64,
    pub units: Vec<String>,
    pub row_count: u64,
    /// Segment file name under `data/`; `None` for batches with no rows.
    pub data_file: Option<String>,
    pub committed_at: DateTime<Utc>,
}

impl CommitEntry {
    pub fn matches(&self, writer_id: &str, batch_id: u64) -> bool {
        self.writer_id == writer_id && self.batch_id == batch_id
    }
}

pub(crate) fn commit_file_name(version: u64) -> String {
    format!("{version:020}.json")
}

pub(crate) fn data_file_name(version: u64) -> String {
    format!("part-{version:020}.dat")
}

/// Parse a version out of a commit file name, ignoring temp files.
pub(crate) fn parse_commit_file_name(name: &str) -> Option<u64> {
    name.strip_suffix(".json")?.parse().ok()
}
