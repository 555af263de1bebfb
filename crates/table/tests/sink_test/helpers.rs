use std::path::Path;

use bronze_core::{FieldValue, Record};
use bronze_table::{
    AppendOnlyTable, BronzeTable, CheckpointedSink, CommitEntry, RetryPolicy, TableError,
    Transaction, UnitBatch,
};

/// Rows tagged with their unit and position.
pub fn unit_batch(unit: &str, rows: i64) -> UnitBatch {
    let records = (0..rows)
        .map(|i| {
            let mut r = Record::new();
            r.insert("unit", FieldValue::Text(unit.to_string()));
            r.insert("row", FieldValue::Integer(i));
            r
        })
        .collect();
    UnitBatch::new(unit, records)
}

pub fn open_table(root: &Path) -> BronzeTable {
    BronzeTable::open("dev.sbit_db.gym_logins_bz", root.join("table")).unwrap()
}

pub fn open_sink(root: &Path) -> CheckpointedSink {
    CheckpointedSink::open(
        "gym_logins",
        open_table(root),
        root.join("checkpoint"),
        RetryPolicy::none(),
    )
    .unwrap()
}

/// Retry policy with no waiting between attempts.
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        ..RetryPolicy::none()
    }
}

/// Table wrapper that fails the first `failures` appends.
pub struct FlakyTable {
    pub inner: BronzeTable,
    pub failures: u32,
    pub calls: u32,
}

impl FlakyTable {
    pub fn new(inner: BronzeTable, failures: u32) -> Self {
        Self {
            inner,
            failures,
            calls: 0,
        }
    }
}

impl AppendOnlyTable for FlakyTable {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn find_transaction(&self, writer_id: &str, batch_id: u64) -> Option<CommitEntry> {
        self.inner.find_transaction(writer_id, batch_id)
    }

    fn append(&mut self, txn: &Transaction, rows: &[Record]) -> Result<CommitEntry, TableError> {
        self.calls += 1;
        if self.calls <= self.failures {
            return Err(TableError::Other(format!("injected failure {}", self.calls)));
        }
        self.inner.append(txn, rows)
    }
}
