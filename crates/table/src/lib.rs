pub mod checkpoint;
pub mod error;
pub mod filter;
pub mod fs_util;
pub mod log;
pub mod segment;
pub mod sink;
pub mod table;

// Re-export key types
pub use checkpoint::{Checkpoint, CheckpointStore, PlannedBatch};
pub use error::TableError;
pub use filter::{FieldPredicate, RowFilter};
pub use log::{CommitEntry, Transaction};
pub use sink::{CheckpointedSink, CommitResult, RetryPolicy, UnitBatch};
pub use table::{AppendOnlyTable, BronzeTable, TableStats, Warehouse};
