//! Date enrichment for the multiplexed topic: a left join of each record
//! against the `date_lookup` reference snapshot on the event's UTC day.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use bronze_core::{FieldValue, Record, DATE, WEEK_PART};
use chrono::{DateTime, NaiveDate};
use tracing::info;

use crate::error::IngestError;

/// Materialized `date -> week_part` snapshot, loaded once per run.
#[derive(Debug, Clone, Default)]
pub struct DateLookup {
    entries: HashMap<NaiveDate, String>,
}

impl DateLookup {
    pub fn from_entries(entries: impl IntoIterator<Item = (NaiveDate, String)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Load a CSV snapshot with at least `date` (`YYYY-MM-DD`) and
    /// `week_part` header columns. Other columns are ignored.
    pub fn load_csv(path: &Path) -> Result<Self, IngestError> {
        let invalid = |message: String| IngestError::DateLookup {
            path: path.to_path_buf(),
            message,
        };

        let mut reader = ::csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .map_err(|e| invalid(e.to_string()))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| invalid(e.to_string()))?
            .iter()
            .map(|h| h.trim().to_ascii_lowercase())
            .collect();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| invalid(format!("missing '{name}' column")))
        };
        let date_idx = column(DATE)?;
        let week_part_idx = column(WEEK_PART)?;

        let mut entries = HashMap::new();
        for row in reader.records() {
            let row = row.map_err(|e| invalid(e.to_string()))?;
            let (Some(date), Some(week_part)) = (row.get(date_idx), row.get(week_part_idx)) else {
                return Err(invalid(format!("short row: {:?}", row)));
            };
            let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
                .map_err(|e| invalid(format!("bad date '{date}': {e}")))?;
            entries.insert(date, week_part.trim().to_string());
        }

        info!(path = %path.display(), days = entries.len(), "Loaded date lookup");
        Ok(Self { entries })
    }

    pub fn week_part(&self, date: &NaiveDate) -> Option<&str> {
        self.entries.get(date).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// UTC calendar day of an epoch-milliseconds timestamp.
pub fn floor_to_day(timestamp_ms: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(timestamp_ms).map(|ts| ts.date_naive())
}

/// Appends `date` and `week_part` to records of the multiplexed topic.
#[derive(Debug, Clone)]
pub struct Enricher {
    lookup: Arc<DateLookup>,
    timestamp_column: String,
}

impl Enricher {
    pub fn new(lookup: Arc<DateLookup>) -> Self {
        Self {
            lookup,
            timestamp_column: "timestamp".to_string(),
        }
    }

    /// Left join: unmatched or untimestamped records are kept with both
    /// columns null.
    pub fn enrich(&self, mut record: Record) -> Record {
        let day = match record.get(&self.timestamp_column) {
            Some(FieldValue::Integer(ms)) => floor_to_day(*ms),
            Some(FieldValue::Float(ms)) if ms.is_finite() => floor_to_day(ms.floor() as i64),
            _ => None,
        };
        let joined = day.and_then(|d| self.lookup.week_part(&d).map(|wp| (d, wp.to_string())));

        match joined {
            Some((date, week_part)) => {
                record.insert(DATE, FieldValue::Date(date));
                record.insert(WEEK_PART, FieldValue::Text(week_part));
            }
            None => {
                record.insert(DATE, FieldValue::Null);
                record.insert(WEEK_PART, FieldValue::Null);
            }
        }
        record
    }
}
