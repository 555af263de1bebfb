//! Source readers: turn the raw units in a landing directory into typed
//! records, one unit at a time.

mod delimited;
pub mod discovery;
mod json_lines;

use std::collections::HashSet;
use std::path::PathBuf;

use bronze_core::{FieldList, FieldValue, Record, SourceSpec, UnitFormat, LOAD_TIME, SOURCE_FILE};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{IngestError, RecordError};
use delimited::CsvRows;
use json_lines::JsonRows;

pub use discovery::{DirectoryDiscovery, UnitDiscovery};

/// One discrete input object, identified by its provenance string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawUnit {
    pub id: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Per-source adapter over a [`UnitDiscovery`].
///
/// `poll` hands out each unit at most once per reader; units stay excluded
/// after `acknowledge` moves them into the committed set.
pub struct SourceReader {
    name: String,
    schema: FieldList,
    format: UnitFormat,
    discovery: Box<dyn UnitDiscovery>,
    committed: HashSet<String>,
    handed_out: HashSet<String>,
}

impl SourceReader {
    pub fn new(spec: &SourceSpec, discovery: Box<dyn UnitDiscovery>) -> Self {
        Self {
            name: spec.name.clone(),
            schema: spec.schema.clone(),
            format: spec.format,
            discovery,
            committed: HashSet::new(),
            handed_out: HashSet::new(),
        }
    }

    /// Reader over the source's landing directory.
    pub fn for_spec(spec: &SourceSpec) -> Self {
        let discovery = DirectoryDiscovery::new(&spec.input_dir, spec.format.extension());
        Self::new(spec, Box::new(discovery))
    }

    /// Seed the already-committed set, normally from the sink's checkpoint.
    pub fn with_committed(mut self, units: impl IntoIterator<Item = String>) -> Self {
        self.committed.extend(units);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Units not yet committed or handed out, sorted by provenance id.
    pub fn poll(&mut self) -> Result<Vec<RawUnit>, IngestError> {
        let mut units: Vec<RawUnit> = self
            .discovery
            .list()?
            .into_iter()
            .filter(|u| !self.committed.contains(&u.id) && !self.handed_out.contains(&u.id))
            .collect();
        units.sort_by(|a, b| a.id.cmp(&b.id));
        units.dedup_by(|a, b| a.id == b.id);

        self.handed_out.extend(units.iter().map(|u| u.id.clone()));
        if !units.is_empty() {
            debug!(source = %self.name, units = units.len(), "Discovered new units");
        }
        Ok(units)
    }

    /// Lazily read `unit`. All records share one `load_time`.
    pub fn read(&self, unit: &RawUnit) -> Result<UnitRecords, IngestError> {
        let rows = match self.format {
            UnitFormat::Csv => Rows::Csv(CsvRows::open(&unit.path, self.schema.clone())?),
            UnitFormat::JsonLines => Rows::Json(JsonRows::open(&unit.path, self.schema.clone())?),
        };
        Ok(UnitRecords {
            unit_id: unit.id.clone(),
            load_time: Utc::now(),
            rows,
        })
    }

    /// Mark units as committed so they are never polled again.
    pub fn acknowledge(&mut self, unit_ids: &[String]) {
        for id in unit_ids {
            self.handed_out.remove(id);
            self.committed.insert(id.clone());
        }
    }

    pub fn is_committed(&self, unit_id: &str) -> bool {
        self.committed.contains(unit_id)
    }
}

enum Rows {
    Csv(CsvRows),
    Json(JsonRows),
}

/// Single-pass iterator over one unit's records, in input order.
pub struct UnitRecords {
    unit_id: String,
    load_time: DateTime<Utc>,
    rows: Rows,
}

impl UnitRecords {
    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }

    pub fn load_time(&self) -> DateTime<Utc> {
        self.load_time
    }
}

impl Iterator for UnitRecords {
    type Item = Result<Record, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = match &mut self.rows {
            Rows::Csv(rows) => rows.next()?,
            Rows::Json(rows) => rows.next()?,
        };
        Some(item.map(|mut record| {
            record.insert(LOAD_TIME, FieldValue::Timestamp(self.load_time));
            record.insert(SOURCE_FILE, FieldValue::Text(self.unit_id.clone()));
            record
        }))
    }
}
