use std::time::Duration;

use bronze_core::REGISTERED_USERS;
use bronze_ingest::{IngestError, RunMode};

use crate::helpers::{bronze, land_data_set, test_config};

#[tokio::test]
async fn test_full_data_set_validates() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    land_data_set(&config, 1, 253_801);

    let bronze = bronze(&config);
    bronze
        .consume(RunMode::Finite, Duration::from_secs(1))
        .await
        .unwrap();

    let checks = bronze.validate(1).await.unwrap();
    assert_eq!(checks.len(), 5);
    assert_eq!(checks[4].filter, "topic='bpm'");
    assert_eq!(checks[4].actual, 253_801);

    match bronze.validate(2).await {
        Err(IngestError::CountMismatch {
            table,
            filter,
            expected,
            actual,
        }) => {
            assert_eq!(table, REGISTERED_USERS);
            assert_eq!(filter, "true");
            assert_eq!(expected, 10);
            assert_eq!(actual, 5);
        }
        other => panic!("expected a count mismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn test_validate_rejects_zero_sets() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    assert!(matches!(
        bronze(&config).validate(0).await,
        Err(IngestError::InvalidMultiplier(0))
    ));
}
