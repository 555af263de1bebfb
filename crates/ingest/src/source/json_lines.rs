//! JSON-lines units: one object per line, fields looked up by name.
//! Keys outside the schema are ignored; missing keys become null.

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Lines};
use std::path::Path;

use bronze_core::{FieldList, Record};
use serde_json::Value;

use crate::error::{IngestError, RecordError};

pub(crate) struct JsonRows {
    lines: Lines<BufReader<File>>,
    schema: FieldList,
    line: u64,
}

impl JsonRows {
    pub(crate) fn open(path: &Path, schema: FieldList) -> Result<Self, IngestError> {
        let file = File::open(path).map_err(|e| IngestError::UnitRead {
            unit: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            schema,
            line: 0,
        })
    }

    fn parse(&self, text: &str) -> Result<Record, RecordError> {
        let malformed = |message: String| RecordError::Malformed {
            line: self.line,
            message,
        };
        let value: Value = serde_json::from_str(text).map_err(|e| malformed(e.to_string()))?;
        let Value::Object(object) = value else {
            return Err(malformed("expected a JSON object".to_string()));
        };

        let mut record = Record::with_capacity(self.schema.len() + 4);
        for field in self.schema.iter() {
            let raw = object.get(&field.name).unwrap_or(&Value::Null);
            record.insert(field.name.clone(), field.field_type.cast_json(&field.name, raw)?);
        }
        Ok(record)
    }
}

impl Iterator for JsonRows {
    type Item = Result<Record, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line += 1;
            match line {
                Ok(text) if text.trim().is_empty() => continue,
                Ok(text) => return Some(self.parse(&text)),
                Err(e) if e.kind() == ErrorKind::InvalidData => {
                    return Some(Err(RecordError::Malformed {
                        line: self.line,
                        message: e.to_string(),
                    }))
                }
                Err(e) => return Some(Err(RecordError::Io(e.to_string()))),
            }
        }
    }
}
