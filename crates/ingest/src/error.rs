use std::path::PathBuf;

use bronze_core::{BronzeError, SchedulerPool, SchemaCastError};
use bronze_table::TableError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Core(#[from] BronzeError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid date lookup {path}: {message}")]
    DateLookup { path: PathBuf, message: String },

    #[error("failed to read unit {unit}: {message}")]
    UnitRead { unit: String, message: String },

    #[error(
        "Expected {} records, found {} in {table} where {filter}",
        format_count(.expected),
        format_count(.actual)
    )]
    CountMismatch {
        table: String,
        filter: String,
        expected: u64,
        actual: u64,
    },

    #[error("data set multiplier must be at least 1, got {0}")]
    InvalidMultiplier(u32),

    #[error("scheduler pool {0} is closed")]
    SchedulerClosed(SchedulerPool),

    #[error("pipeline task failed: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for IngestError {
    fn from(err: tokio::task::JoinError) -> Self {
        IngestError::Join(err.to_string())
    }
}

/// Why a single input record was rejected. Only [`RecordError::Io`] is
/// fatal to the unit; every other variant drops the record and moves on.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error(transparent)]
    Cast(#[from] SchemaCastError),

    #[error("line {line}: expected {expected} fields, found {found}")]
    FieldCount {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: malformed record: {message}")]
    Malformed { line: u64, message: String },

    #[error("read error: {0}")]
    Io(String),
}

impl RecordError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, RecordError::Io(_))
    }
}

/// `253801` -> `253,801`
pub fn format_count(n: &u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
