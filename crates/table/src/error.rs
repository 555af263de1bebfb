use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("corrupt file {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("invalid filter '{expr}': {message}")]
    InvalidFilter { expr: String, message: String },

    #[error(
        "commit of batch {batch_id} to {table} failed after {attempts} attempts (units: {}): {message}",
        .units.join(", ")
    )]
    CommitFailed {
        table: String,
        batch_id: u64,
        units: Vec<String>,
        attempts: u32,
        message: String,
    },

    #[error("{0}")]
    Other(String),
}

impl TableError {
    pub(crate) fn serialize(err: impl std::fmt::Display) -> Self {
        TableError::Serialize(err.to_string())
    }
}
