//! CSV units: a header row, then one record per row. Columns are matched
//! to the schema by position; the header text is not interpreted.

use std::fs::File;
use std::path::Path;

use bronze_core::{FieldList, Record};

use crate::error::{IngestError, RecordError};

pub(crate) struct CsvRows {
    records: ::csv::StringRecordsIntoIter<File>,
    schema: FieldList,
}

impl CsvRows {
    pub(crate) fn open(path: &Path, schema: FieldList) -> Result<Self, IngestError> {
        let reader = ::csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(|e| IngestError::UnitRead {
                unit: path.display().to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            records: reader.into_records(),
            schema,
        })
    }
}

impl Iterator for CsvRows {
    type Item = Result<Record, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = match self.records.next()? {
            Ok(row) => row,
            Err(e) if e.is_io_error() => return Some(Err(RecordError::Io(e.to_string()))),
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                return Some(Err(RecordError::Malformed {
                    line,
                    message: e.to_string(),
                }));
            }
        };

        if row.len() != self.schema.len() {
            return Some(Err(RecordError::FieldCount {
                line: row.position().map(|p| p.line()).unwrap_or(0),
                expected: self.schema.len(),
                found: row.len(),
            }));
        }

        let mut record = Record::with_capacity(self.schema.len() + 2);
        for (field, raw) in self.schema.iter().zip(row.iter()) {
            match field.field_type.cast_str(&field.name, raw) {
                Ok(value) => record.insert(field.name.clone(), value),
                Err(e) => return Some(Err(e.into())),
            }
        }
        Some(Ok(record))
    }
}
