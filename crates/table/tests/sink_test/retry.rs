use bronze_table::{CheckpointedSink, RowFilter, TableError};

use crate::helpers::{fast_retry, open_table, unit_batch, FlakyTable};

#[test]
fn test_transient_failure_is_retried() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let table = FlakyTable::new(open_table(root), 2);
    let mut sink =
        CheckpointedSink::open("gym_logins", table, root.join("checkpoint"), fast_retry(3))
            .unwrap();

    let result = sink.append(vec![unit_batch("a.csv", 5)]).unwrap();
    assert_eq!(result.rows, 5);
    assert_eq!(sink.table().calls, 3);
    assert!(sink.is_committed("a.csv"));
    assert_eq!(sink.table().inner.count(&RowFilter::all()).unwrap(), 5);
}

#[test]
fn test_exhausted_retries_leave_unit_uncommitted() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let table = FlakyTable::new(open_table(root), 10);
    let mut sink =
        CheckpointedSink::open("gym_logins", table, root.join("checkpoint"), fast_retry(3))
            .unwrap();

    let err = sink.append(vec![unit_batch("a.csv", 5)]).unwrap_err();
    match err {
        TableError::CommitFailed {
            batch_id,
            units,
            attempts,
            ..
        } => {
            assert_eq!(batch_id, 0);
            assert_eq!(units, vec!["a.csv".to_string()]);
            assert_eq!(attempts, 3);
        }
        other => panic!("expected CommitFailed, got {other:?}"),
    }
    assert!(!sink.is_committed("a.csv"));
    assert_eq!(sink.checkpoint().next_batch_id(), 0);
    drop(sink);

    // The next run discards the plan and commits the unit.
    let table = FlakyTable::new(open_table(root), 0);
    let mut sink =
        CheckpointedSink::open("gym_logins", table, root.join("checkpoint"), fast_retry(3))
            .unwrap();
    let result = sink.append(vec![unit_batch("a.csv", 5)]).unwrap();
    assert_eq!(result.batch_id, Some(0));
    assert_eq!(sink.table().inner.count(&RowFilter::all()).unwrap(), 5);
}
