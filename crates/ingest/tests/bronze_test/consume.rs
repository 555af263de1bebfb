use std::time::Duration;

use bronze_core::{FieldValue, GYM_LOGINS, KAFKA_MULTIPLEX, REGISTERED_USERS, SOURCE_FILE};
use bronze_ingest::{Bronze, IngestError, PipelineState, RunMode};
use bronze_table::{RowFilter, TableError};

use crate::helpers::{
    bronze, corrupt_checkpoint, count, land_data_set, land_file, land_gym_logins,
    land_kafka_multiplex, land_registered_users, landing_dir, read_table, test_config, MONDAY_MS,
    SUNDAY_MS,
};

const INTERVAL: Duration = Duration::from_millis(50);

#[tokio::test]
async fn test_finite_run_commits_every_source() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    land_data_set(&config, 1, 30);

    let run = bronze(&config).consume(RunMode::Finite, INTERVAL).await.unwrap();
    let report = run.report().expect("finite run reports on return");

    assert_eq!(report.pipelines.len(), 3);
    assert!(run
        .states()
        .iter()
        .all(|(_, state)| *state == PipelineState::Quiescent));
    assert_eq!(report.pipeline(REGISTERED_USERS).unwrap().stats.records_committed, 5);
    assert_eq!(report.pipeline(GYM_LOGINS).unwrap().stats.records_committed, 8);
    let kafka = report.pipeline(KAFKA_MULTIPLEX).unwrap();
    assert_eq!(kafka.stats.records_committed, 7 + 16 + 30);
    // One unit per append by default.
    assert_eq!(kafka.stats.batches, 4);
    assert_eq!(report.records_rejected(), 0);

    assert_eq!(count(&config, KAFKA_MULTIPLEX, "topic='user_info'"), 7);
    assert_eq!(count(&config, KAFKA_MULTIPLEX, "topic='workout'"), 16);
    assert_eq!(count(&config, KAFKA_MULTIPLEX, "topic='bpm'"), 30);
}

#[tokio::test]
async fn test_repeated_run_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    land_data_set(&config, 1, 10);

    bronze(&config).consume(RunMode::Finite, INTERVAL).await.unwrap();
    let again = bronze(&config).consume(RunMode::Finite, INTERVAL).await.unwrap();

    assert_eq!(again.report().unwrap().records_committed(), 0);
    assert_eq!(count(&config, REGISTERED_USERS, "true"), 5);
    assert_eq!(count(&config, GYM_LOGINS, "true"), 8);
    assert_eq!(read_table(&config, GYM_LOGINS).stats().commit_count, 2);
}

#[tokio::test]
async fn test_second_data_set_is_incremental() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    land_data_set(&config, 1, 3);
    bronze(&config).consume(RunMode::Finite, INTERVAL).await.unwrap();

    land_data_set(&config, 2, 3);
    let run = bronze(&config).consume(RunMode::Finite, INTERVAL).await.unwrap();
    let report = run.report().unwrap();
    assert_eq!(report.pipeline(REGISTERED_USERS).unwrap().stats.records_committed, 5);

    assert_eq!(count(&config, REGISTERED_USERS, "true"), 10);
    assert_eq!(count(&config, GYM_LOGINS, "true"), 16);
    assert_eq!(count(&config, KAFKA_MULTIPLEX, "topic='user_info'"), 13);
    assert_eq!(count(&config, KAFKA_MULTIPLEX, "topic='workout'"), 32);
}

#[tokio::test]
async fn test_units_commit_in_provenance_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    land_gym_logins(&config, 1);

    bronze(&config).consume(RunMode::Finite, INTERVAL).await.unwrap();

    let table = read_table(&config, GYM_LOGINS);
    let files: Vec<String> = table
        .scan(&RowFilter::all())
        .unwrap()
        .iter()
        .map(|r| r.get(SOURCE_FILE).unwrap().to_string())
        .collect();
    assert_eq!(files.len(), 8);
    assert!(files[..4].iter().all(|f| f.ends_with("gym_logins_1_0.csv")));
    assert!(files[4..].iter().all(|f| f.ends_with("gym_logins_1_1.csv")));

    let logins: Vec<f64> = table
        .scan(&RowFilter::all())
        .unwrap()
        .iter()
        .map(|r| match r.get("login") {
            Some(FieldValue::Float(v)) => *v,
            other => panic!("unexpected login {other:?}"),
        })
        .collect();
    let mut sorted = logins.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(logins, sorted, "rows keep input order within and across units");
}

#[tokio::test]
async fn test_uncastable_records_are_dropped_and_counted() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    land_file(
        &config,
        GYM_LOGINS,
        "mixed.csv",
        "mac_address,gym,login,logout\n\
         aa,1,10,20\n\
         bb,two,10,20\n\
         cc,3,10\n\
         dd,4,,\n",
    );

    let run = bronze(&config).consume(RunMode::Finite, INTERVAL).await.unwrap();
    let stats = run.report().unwrap().pipeline(GYM_LOGINS).unwrap().stats;
    assert_eq!(stats.records_committed, 2);
    assert_eq!(stats.records_rejected, 2);
    assert_eq!(count(&config, GYM_LOGINS, "logout IS NULL"), 1);
}

#[tokio::test]
async fn test_multiplexed_records_are_enriched_with_left_join() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    land_file(
        &config,
        KAFKA_MULTIPLEX,
        "events.json",
        &format!(
            "{}\n{}\n{}\n{}\n",
            format!(r#"{{"topic":"bpm","offset":1,"timestamp":{SUNDAY_MS}}}"#),
            format!(r#"{{"topic":"bpm","offset":2,"timestamp":{MONDAY_MS}}}"#),
            r#"{"topic":"bpm","offset":3,"timestamp":0}"#,
            r#"{"topic":"bpm","offset":4}"#,
        ),
    );

    bronze(&config).consume(RunMode::Finite, INTERVAL).await.unwrap();

    let rows = read_table(&config, KAFKA_MULTIPLEX)
        .scan(&RowFilter::all())
        .unwrap();
    assert_eq!(rows.len(), 4, "left join keeps unmatched records");

    let week_parts: Vec<String> = rows
        .iter()
        .map(|r| r.get("week_part").unwrap().to_string())
        .collect();
    assert_eq!(week_parts, vec!["weekend", "weekday", "null", "null"]);
    assert_eq!(rows[0].get("date").unwrap().to_string(), "2020-09-13");
    assert_eq!(rows[2].get("date"), Some(&FieldValue::Null));

    let columns: Vec<&str> = rows[0].column_names().collect();
    assert_eq!(
        columns,
        vec![
            "key", "value", "topic", "partition", "offset", "timestamp", "load_time",
            "source_file", "date", "week_part"
        ]
    );
}

#[tokio::test]
async fn test_missing_date_lookup_fails_before_starting() {
    let dir = tempfile::tempdir().unwrap();
    let config = bronze_core::Config::rooted_at(dir.path());

    let err = Bronze::new(config.clone())
        .unwrap()
        .consume(RunMode::Finite, INTERVAL)
        .await
        .err()
        .expect("consume must fail without a date lookup");
    assert!(matches!(err, IngestError::DateLookup { .. }));
}

#[tokio::test]
async fn test_source_that_fails_to_open_does_not_stop_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    corrupt_checkpoint(&config, GYM_LOGINS);
    land_registered_users(&config, 1);
    land_gym_logins(&config, 1);
    land_kafka_multiplex(&config, 1, 6);

    let err = bronze(&config)
        .consume(RunMode::Finite, INTERVAL)
        .await
        .err()
        .expect("the broken source's error is surfaced");
    assert!(matches!(err, IngestError::Table(TableError::Corrupt { .. })));

    assert_eq!(count(&config, REGISTERED_USERS, "true"), 5);
    assert_eq!(count(&config, KAFKA_MULTIPLEX, "topic='user_info'"), 7);
    assert_eq!(count(&config, KAFKA_MULTIPLEX, "topic='bpm'"), 6);
    assert_eq!(count(&config, GYM_LOGINS, "true"), 0);
}

/// A unit that fails with an I/O error mid-read stops its own pipeline
/// only. Units committed before it stay committed.
#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_unreadable_unit_fails_only_its_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    land_data_set(&config, 1, 9);
    // Reads of /proc/self/mem at offset 0 fail with EIO, even for root.
    std::os::unix::fs::symlink(
        "/proc/self/mem",
        landing_dir(&config, KAFKA_MULTIPLEX).join("kafka_1_9.json"),
    )
    .unwrap();

    let err = bronze(&config)
        .consume(RunMode::Finite, INTERVAL)
        .await
        .err()
        .expect("the unreadable unit fails the run");
    match err {
        IngestError::UnitRead { unit, .. } => assert!(unit.ends_with("kafka_1_9.json")),
        other => panic!("unexpected error {other:?}"),
    }

    assert_eq!(count(&config, REGISTERED_USERS, "true"), 5);
    assert_eq!(count(&config, GYM_LOGINS, "true"), 8);
    assert_eq!(count(&config, KAFKA_MULTIPLEX, "topic='user_info'"), 7);
    assert_eq!(count(&config, KAFKA_MULTIPLEX, "topic='bpm'"), 9);
}
