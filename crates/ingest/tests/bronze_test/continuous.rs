use std::time::Duration;

use bronze_core::{GYM_LOGINS, REGISTERED_USERS};
use bronze_ingest::{IngestError, PipelineState, RunMode};
use bronze_table::{RowFilter, TableError, Warehouse};

use crate::helpers::{bronze, corrupt_checkpoint, land_gym_logins, land_registered_users, test_config};

async fn wait_for_rows(warehouse: &Warehouse, table: &str, expected: u64) {
    for _ in 0..200 {
        let committed = warehouse
            .read_table(table)
            .and_then(|t| t.count(&RowFilter::all()))
            .unwrap_or(0);
        if committed == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("{table} never reached {expected} rows");
}

#[tokio::test]
async fn test_continuous_run_picks_up_new_units_until_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let warehouse = Warehouse::from_config(&config);
    land_registered_users(&config, 1);

    let run = bronze(&config)
        .consume(RunMode::Continuous, Duration::from_millis(50))
        .await
        .unwrap();
    assert!(run.report().is_none());

    wait_for_rows(&warehouse, REGISTERED_USERS, 5).await;

    // Units landed after start are picked up on a later interval.
    land_gym_logins(&config, 1);
    land_registered_users(&config, 2);
    wait_for_rows(&warehouse, GYM_LOGINS, 8).await;
    wait_for_rows(&warehouse, REGISTERED_USERS, 10).await;

    let report = run.stop().await.unwrap();
    assert_eq!(report.mode, RunMode::Continuous);
    assert!(report
        .pipelines
        .iter()
        .all(|p| p.state == PipelineState::Stopped));
    assert_eq!(report.pipeline(REGISTERED_USERS).unwrap().stats.records_committed, 10);
}

#[tokio::test]
async fn test_unopened_source_is_failed_while_others_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let warehouse = Warehouse::from_config(&config);
    corrupt_checkpoint(&config, GYM_LOGINS);
    land_registered_users(&config, 1);

    let run = bronze(&config)
        .consume(RunMode::Continuous, Duration::from_millis(50))
        .await
        .unwrap();
    let states = run.states();
    assert_eq!(states.len(), 3);
    assert!(states.contains(&(GYM_LOGINS.to_string(), PipelineState::Failed)));

    wait_for_rows(&warehouse, REGISTERED_USERS, 5).await;

    let err = run.stop().await.err().expect("stop surfaces the open failure");
    assert!(matches!(err, IngestError::Table(TableError::Corrupt { .. })));
}
