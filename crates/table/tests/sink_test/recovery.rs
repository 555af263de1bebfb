use std::fs;

use bronze_table::{AppendOnlyTable, CheckpointStore, RowFilter, Transaction};

use crate::helpers::{open_sink, open_table, unit_batch};

#[test]
fn test_crash_after_commit_before_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    // Simulate a run that planned and committed batch 0 but died before
    // advancing the checkpoint.
    let lineage = {
        let store = CheckpointStore::open(root.join("checkpoint")).unwrap();
        store.plan(&["a.csv".to_string()]).unwrap();
        let mut table = open_table(root);
        let txn = Transaction {
            writer_id: store.lineage_id().to_string(),
            batch_id: 0,
            units: vec!["a.csv".to_string()],
        };
        table.append(&txn, &unit_batch("a.csv", 4).records).unwrap();
        store.lineage_id().to_string()
    };

    let mut sink = open_sink(root);
    assert_eq!(sink.checkpoint().lineage_id(), lineage);
    assert!(sink.is_committed("a.csv"), "recovery should advance past the committed batch");
    assert_eq!(sink.checkpoint().next_batch_id(), 1);

    // Re-delivery of the same unit must not duplicate rows.
    let result = sink.append(vec![unit_batch("a.csv", 4)]).unwrap();
    assert!(result.is_skipped());
    assert_eq!(sink.table().count(&RowFilter::all()).unwrap(), 4);
}

#[test]
fn test_crash_before_commit_discards_plan() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    {
        let store = CheckpointStore::open(root.join("checkpoint")).unwrap();
        store.plan(&["a.csv".to_string()]).unwrap();
    }

    let mut sink = open_sink(root);
    assert!(!sink.is_committed("a.csv"));
    assert_eq!(sink.checkpoint().pending_plan().unwrap(), None);

    let result = sink.append(vec![unit_batch("a.csv", 2)]).unwrap();
    assert_eq!(result.batch_id, Some(0));
    assert_eq!(sink.table().count(&RowFilter::all()).unwrap(), 2);
}

#[test]
fn test_deleted_checkpoint_starts_new_lineage() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    let first_lineage = {
        let mut sink = open_sink(root);
        sink.append(vec![unit_batch("a.csv", 3)]).unwrap();
        sink.checkpoint().lineage_id().to_string()
    };

    fs::remove_dir_all(root.join("checkpoint")).unwrap();

    let mut sink = open_sink(root);
    assert_ne!(sink.checkpoint().lineage_id(), first_lineage);
    assert!(!sink.is_committed("a.csv"));

    // A fresh lineage re-ingests history; the table keeps both copies.
    let result = sink.append(vec![unit_batch("a.csv", 3)]).unwrap();
    assert_eq!(result.batch_id, Some(0));
    assert_eq!(sink.table().count(&RowFilter::all()).unwrap(), 6);
    assert_eq!(sink.table().stats().commit_count, 2);
}

#[test]
fn test_batch_preserves_unit_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = open_sink(dir.path());

    sink.append(vec![unit_batch("b.csv", 2), unit_batch("a.csv", 1)])
        .unwrap();

    let units: Vec<String> = sink
        .table()
        .scan(&RowFilter::all())
        .unwrap()
        .iter()
        .map(|r| r.get("unit").unwrap().to_string())
        .collect();
    assert_eq!(units, vec!["b.csv", "b.csv", "a.csv"]);
    assert_eq!(
        sink.table().commits()[0].units,
        vec!["b.csv".to_string(), "a.csv".to_string()]
    );
}
