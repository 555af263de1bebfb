use std::time::Instant;

use bronze_core::{GYM_LOGINS, KAFKA_MULTIPLEX, REGISTERED_USERS};
use bronze_table::{RowFilter, Warehouse};
use tracing::info;

use crate::error::{format_count, IngestError};

/// Expected row count as a function of how many data sets were landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedCount {
    /// `per_set * sets`
    Scaled(u64),
    /// `first + per_additional * (sets - 1)`
    Stepped { first: u64, per_additional: u64 },
}

impl ExpectedCount {
    pub fn for_sets(&self, sets: u32) -> u64 {
        let sets = u64::from(sets);
        match *self {
            ExpectedCount::Scaled(per_set) => per_set * sets,
            ExpectedCount::Stepped {
                first,
                per_additional,
            } => first + per_additional * sets.saturating_sub(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationExpectation {
    pub table: String,
    pub filter: RowFilter,
    pub expected: ExpectedCount,
}

impl ValidationExpectation {
    pub fn new(table: &str, filter: RowFilter, expected: ExpectedCount) -> Self {
        Self {
            table: table.to_string(),
            filter,
            expected,
        }
    }

    /// Fixed battery for the bronze layer. Later data sets repeat the users
    /// and logins, but only 6 of the 7 `user_info` events.
    pub fn bronze() -> Vec<Self> {
        vec![
            Self::new(REGISTERED_USERS, RowFilter::all(), ExpectedCount::Scaled(5)),
            Self::new(GYM_LOGINS, RowFilter::all(), ExpectedCount::Scaled(8)),
            Self::new(
                KAFKA_MULTIPLEX,
                RowFilter::eq("topic", "user_info"),
                ExpectedCount::Stepped {
                    first: 7,
                    per_additional: 6,
                },
            ),
            Self::new(
                KAFKA_MULTIPLEX,
                RowFilter::eq("topic", "workout"),
                ExpectedCount::Scaled(16),
            ),
            Self::new(
                KAFKA_MULTIPLEX,
                RowFilter::eq("topic", "bpm"),
                ExpectedCount::Scaled(253_801),
            ),
        ]
    }
}

/// Result of one passing count assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountCheck {
    pub table: String,
    pub filter: String,
    pub expected: u64,
    pub actual: u64,
}

pub struct Validator {
    warehouse: Warehouse,
}

impl Validator {
    pub fn new(warehouse: Warehouse) -> Self {
        Self { warehouse }
    }

    /// Count committed rows of `table` matching `filter` and fail unless the
    /// count equals `expected`.
    pub fn assert_count(
        &self,
        table: &str,
        expected: u64,
        filter: &RowFilter,
    ) -> Result<CountCheck, IngestError> {
        info!(table, %filter, "Validating record counts");
        let actual = self.warehouse.read_table(table)?.count(filter)?;

        if actual != expected {
            return Err(IngestError::CountMismatch {
                table: table.to_string(),
                filter: filter.to_string(),
                expected,
                actual,
            });
        }

        info!(
            "Found {} / Expected {} records where {}: Success",
            format_count(&actual),
            format_count(&expected),
            filter
        );
        Ok(CountCheck {
            table: table.to_string(),
            filter: filter.to_string(),
            expected,
            actual,
        })
    }

    /// Run the bronze battery for `sets` landed data sets, stopping at the
    /// first mismatch.
    pub fn validate(&self, sets: u32) -> Result<Vec<CountCheck>, IngestError> {
        if sets == 0 {
            return Err(IngestError::InvalidMultiplier(sets));
        }

        let started = Instant::now();
        info!(sets, "Validating bronze layer records");
        let checks = ValidationExpectation::bronze()
            .iter()
            .map(|e| self.assert_count(&e.table, e.expected.for_sets(sets), &e.filter))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "Bronze layer validation completed in {} seconds",
            started.elapsed().as_secs()
        );
        Ok(checks)
    }
}
