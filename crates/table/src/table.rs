use std::fs;
use std::path::{Path, PathBuf};

use bronze_core::{Config, Record};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::TableError;
use crate::filter::RowFilter;
use crate::fs_util::{read_json, write_json_atomic};
use crate::log::{
    commit_file_name, data_file_name, parse_commit_file_name, CommitEntry, Transaction,
};
use crate::segment::{SegmentReader, SegmentWriter};

/// Append-only transactional sink. Implementations must make each
/// `append` atomic and must treat a repeated transaction as a no-op.
pub trait AppendOnlyTable: Send {
    /// Fully qualified table name, used in logs and errors.
    fn name(&self) -> &str;

    /// The committed entry for `(writer_id, batch_id)`, if any.
    fn find_transaction(&self, writer_id: &str, batch_id: u64) -> Option<CommitEntry>;

    /// Durably persist `rows` as one commit tagged with `txn`.
    fn append(&mut self, txn: &Transaction, rows: &[Record]) -> Result<CommitEntry, TableError>;
}

/// Overall statistics for a table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableStats {
    pub commit_count: usize,
    pub row_count: u64,
    pub unit_count: usize,
}

/// Local-filesystem bronze table.
///
/// ```text
/// <table_dir>/
///   _commits/00000000000000000000.json   <- one entry per committed batch
///   data/part-00000000000000000000.dat   <- zstd/msgpack rows for that batch
/// ```
pub struct BronzeTable {
    name: String,
    dir: PathBuf,
    commits: Vec<CommitEntry>,
}

impl BronzeTable {
    /// Open (creating if needed) the table rooted at `dir`, loading its
    /// commit log.
    pub fn open(name: impl Into<String>, dir: impl Into<PathBuf>) -> Result<Self, TableError> {
        let name = name.into();
        let dir = dir.into();
        fs::create_dir_all(dir.join("_commits"))?;
        fs::create_dir_all(dir.join("data"))?;

        let commits = load_commits(&dir)?;
        debug!(table = %name, commits = commits.len(), "Opened table");
        Ok(Self { name, dir, commits })
    }

    /// Open an existing table without creating it.
    pub fn open_existing(
        name: impl Into<String>,
        dir: impl Into<PathBuf>,
    ) -> Result<Self, TableError> {
        let name = name.into();
        let dir = dir.into();
        if !dir.join("_commits").is_dir() {
            return Err(TableError::TableNotFound(name));
        }
        Self::open(name, dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Re-read the commit log from disk.
    pub fn refresh(&mut self) -> Result<(), TableError> {
        self.commits = load_commits(&self.dir)?;
        Ok(())
    }

    pub fn commits(&self) -> &[CommitEntry] {
        &self.commits
    }

    pub fn stats(&self) -> TableStats {
        TableStats {
            commit_count: self.commits.len(),
            row_count: self.commits.iter().map(|c| c.row_count).sum(),
            unit_count: self.commits.iter().map(|c| c.units.len()).sum(),
        }
    }

    /// Visit committed rows in commit order, then write order.
    pub fn for_each_row(
        &self,
        mut visit: impl FnMut(Record),
    ) -> Result<(), TableError> {
        for entry in &self.commits {
            let Some(data_file) = &entry.data_file else {
                continue;
            };
            let reader = SegmentReader::open(&self.dir.join("data").join(data_file))?;
            for row in reader.iter() {
                visit(row?);
            }
        }
        Ok(())
    }

    /// Committed rows matching `filter`, in commit order.
    pub fn scan(&self, filter: &RowFilter) -> Result<Vec<Record>, TableError> {
        let mut rows = Vec::new();
        self.for_each_row(|row| {
            if filter.matches(&row) {
                rows.push(row);
            }
        })?;
        Ok(rows)
    }

    /// Number of committed rows matching `filter`. An always-true filter is
    /// answered from the commit log alone.
    pub fn count(&self, filter: &RowFilter) -> Result<u64, TableError> {
        if filter.is_all() {
            return Ok(self.stats().row_count);
        }
        let mut count = 0u64;
        self.for_each_row(|row| {
            if filter.matches(&row) {
                count += 1;
            }
        })?;
        Ok(count)
    }

    fn next_version(&self) -> u64 {
        self.commits.last().map(|c| c.version + 1).unwrap_or(0)
    }
}

impl AppendOnlyTable for BronzeTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn find_transaction(&self, writer_id: &str, batch_id: u64) -> Option<CommitEntry> {
        self.commits
            .iter()
            .rev()
            .find(|c| c.matches(writer_id, batch_id))
            .cloned()
    }

    fn append(&mut self, txn: &Transaction, rows: &[Record]) -> Result<CommitEntry, TableError> {
        if let Some(existing) = self.find_transaction(&txn.writer_id, txn.batch_id) {
            debug!(
                table = %self.name,
                batch_id = txn.batch_id,
                version = existing.version,
                "Transaction already committed"
            );
            return Ok(existing);
        }

        let version = self.next_version();
        let commit_path = self.dir.join("_commits").join(commit_file_name(version));
        if commit_path.exists() {
            return Err(TableError::Other(format!(
                "concurrent writer detected on {}: version {} already exists",
                self.name, version
            )));
        }

        let data_file = if rows.is_empty() {
            None
        } else {
            let name = data_file_name(version);
            let mut writer = SegmentWriter::create(&self.dir.join("data").join(&name))?;
            for row in rows {
                writer.append(row)?;
            }
            writer.finalize()?;
            Some(name)
        };

        let entry = CommitEntry {
            version,
            writer_id: txn.writer_id.clone(),
            batch_id: txn.batch_id,
            units: txn.units.clone(),
            row_count: rows.len() as u64,
            data_file,
            committed_at: Utc::now(),
        };
        write_json_atomic(&commit_path, &entry)?;
        self.commits.push(entry.clone());

        info!(
            table = %self.name,
            version,
            batch_id = txn.batch_id,
            rows = entry.row_count,
            units = txn.units.len(),
            "Committed batch"
        );
        Ok(entry)
    }
}

fn load_commits(dir: &Path) -> Result<Vec<CommitEntry>, TableError> {
    let commits_dir = dir.join("_commits");
    let mut versions = Vec::new();
    for entry in fs::read_dir(&commits_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        match name.to_str().and_then(parse_commit_file_name) {
            Some(version) => versions.push(version),
            None => {
                if name.to_string_lossy().ends_with(".tmp") {
                    warn!(file = %name.to_string_lossy(), "Ignoring incomplete commit file");
                }
            }
        }
    }
    versions.sort_unstable();

    let mut commits = Vec::with_capacity(versions.len());
    for version in versions {
        let path = commits_dir.join(commit_file_name(version));
        if let Some(entry) = read_json::<CommitEntry>(&path)? {
            commits.push(entry);
        }
    }
    Ok(commits)
}

/// Root of all bronze tables for one catalog/database.
#[derive(Debug, Clone)]
pub struct Warehouse {
    root: PathBuf,
    catalog: String,
    database: String,
}

impl Warehouse {
    pub fn new(
        root: impl Into<PathBuf>,
        catalog: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            catalog: catalog.into(),
            database: database.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.paths.warehouse_dir,
            &config.catalog.catalog,
            &config.catalog.database,
        )
    }

    /// `catalog.database.table`
    pub fn qualified_name(&self, table: &str) -> String {
        format!("{}.{}.{}", self.catalog, self.database, table)
    }

    pub fn table_dir(&self, table: &str) -> PathBuf {
        self.root.join(&self.catalog).join(&self.database).join(table)
    }

    /// Open a table for writing, creating it on first use.
    pub fn open_table(&self, table: &str) -> Result<BronzeTable, TableError> {
        BronzeTable::open(self.qualified_name(table), self.table_dir(table))
    }

    /// Open a table for reading; fails if it was never created.
    pub fn read_table(&self, table: &str) -> Result<BronzeTable, TableError> {
        BronzeTable::open_existing(self.qualified_name(table), self.table_dir(table))
    }
}
