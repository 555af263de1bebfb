//! Static schema registry: source name → ordered field list.
//!
//! Field lists are declared with the same DDL-style strings the sources are
//! documented with (`"user_id long, mac_address string"`), parsed once at
//! startup, and used to cast every raw field before a record is kept.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::BronzeError;
use crate::record::FieldValue;

pub const REGISTERED_USERS: &str = "registered_users_bz";
pub const GYM_LOGINS: &str = "gym_logins_bz";
pub const KAFKA_MULTIPLEX: &str = "kafka_multiplex_bz";

pub const REGISTERED_USERS_SCHEMA: &str =
    "user_id long, device_id long, mac_address string, registration_timestamp double";
pub const GYM_LOGINS_SCHEMA: &str = "mac_address string, gym bigint, login double, logout double";
pub const KAFKA_MULTIPLEX_SCHEMA: &str =
    "key string, value string, topic string, partition bigint, offset bigint, timestamp bigint";

/// Closed set of column types a raw field can be cast to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Int64,
    Float64,
    String,
    Timestamp,
    Boolean,
}

impl FromStr for FieldType {
    type Err = BronzeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" | "bigint" | "int" | "integer" | "int64" => Ok(FieldType::Int64),
            "double" | "float" | "float64" => Ok(FieldType::Float64),
            "string" => Ok(FieldType::String),
            "timestamp" => Ok(FieldType::Timestamp),
            "boolean" | "bool" => Ok(FieldType::Boolean),
            other => Err(BronzeError::InvalidSchema(format!("unsupported type '{other}'"))),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int64 => write!(f, "int64"),
            FieldType::Float64 => write!(f, "float64"),
            FieldType::String => write!(f, "string"),
            FieldType::Timestamp => write!(f, "timestamp"),
            FieldType::Boolean => write!(f, "boolean"),
        }
    }
}

/// A single raw field that could not be cast to its declared type.
/// Recovered per record: the record is dropped, the batch continues.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("cannot cast field '{field}' value '{value}' to {expected}")]
pub struct SchemaCastError {
    pub field: String,
    pub expected: FieldType,
    pub value: String,
}

impl FieldType {
    /// Cast a raw text cell. Empty cells become `Null`.
    pub fn cast_str(&self, field: &str, raw: &str) -> Result<FieldValue, SchemaCastError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(FieldValue::Null);
        }
        let fail = || SchemaCastError {
            field: field.to_string(),
            expected: *self,
            value: raw.to_string(),
        };
        match self {
            FieldType::Int64 => trimmed.parse().map(FieldValue::Integer).map_err(|_| fail()),
            FieldType::Float64 => trimmed.parse().map(FieldValue::Float).map_err(|_| fail()),
            FieldType::String => Ok(FieldValue::Text(raw.to_string())),
            FieldType::Timestamp => parse_timestamp(trimmed)
                .map(FieldValue::Timestamp)
                .ok_or_else(fail),
            FieldType::Boolean => {
                if trimmed.eq_ignore_ascii_case("true") {
                    Ok(FieldValue::Boolean(true))
                } else if trimmed.eq_ignore_ascii_case("false") {
                    Ok(FieldValue::Boolean(false))
                } else {
                    Err(fail())
                }
            }
        }
    }

    /// Cast a JSON value. Missing keys and `null` become `Null`; string
    /// columns keep non-string JSON as its serialized text.
    pub fn cast_json(
        &self,
        field: &str,
        raw: &serde_json::Value,
    ) -> Result<FieldValue, SchemaCastError> {
        use serde_json::Value;

        let fail = || SchemaCastError {
            field: field.to_string(),
            expected: *self,
            value: raw.to_string(),
        };
        match (self, raw) {
            (_, Value::Null) => Ok(FieldValue::Null),
            (FieldType::Int64, Value::Number(n)) => {
                n.as_i64().map(FieldValue::Integer).ok_or_else(fail)
            }
            (FieldType::Float64, Value::Number(n)) => {
                n.as_f64().map(FieldValue::Float).ok_or_else(fail)
            }
            (FieldType::String, Value::String(s)) => Ok(FieldValue::Text(s.clone())),
            (FieldType::String, other) => Ok(FieldValue::Text(other.to_string())),
            (FieldType::Timestamp, Value::String(s)) => parse_timestamp(s.trim())
                .map(FieldValue::Timestamp)
                .ok_or_else(fail),
            (FieldType::Timestamp, Value::Number(n)) => n
                .as_f64()
                .and_then(epoch_seconds)
                .map(FieldValue::Timestamp)
                .ok_or_else(fail),
            (FieldType::Boolean, Value::Bool(b)) => Ok(FieldValue::Boolean(*b)),
            _ => Err(fail()),
        }
    }
}

/// RFC 3339 text or fractional epoch seconds.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = raw.parse::<DateTime<Utc>>() {
        return Some(ts);
    }
    raw.parse::<f64>().ok().and_then(epoch_seconds)
}

fn epoch_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round() as u32;
    DateTime::<Utc>::from_timestamp(whole as i64, nanos.min(999_999_999))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
}

/// Ordered `(name, type)` sequence describing one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldList {
    fields: Vec<Field>,
}

impl FieldList {
    pub fn new(fields: Vec<Field>) -> Result<Self, BronzeError> {
        if fields.is_empty() {
            return Err(BronzeError::InvalidSchema("schema has no fields".into()));
        }
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(BronzeError::InvalidSchema(format!(
                    "duplicate field '{}'",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }

    /// Parse a `"name type, name type"` declaration.
    pub fn parse(ddl: &str) -> Result<Self, BronzeError> {
        let fields = ddl
            .split(',')
            .map(|part| {
                let mut tokens = part.split_whitespace();
                match (tokens.next(), tokens.next(), tokens.next()) {
                    (Some(name), Some(ty), None) => Ok(Field {
                        name: name.to_string(),
                        field_type: ty.parse()?,
                    }),
                    _ => Err(BronzeError::InvalidSchema(format!(
                        "expected '<name> <type>', got '{}'",
                        part.trim()
                    ))),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(fields)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Field> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

impl fmt::Display for FieldList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", field.name, field.field_type)?;
        }
        Ok(())
    }
}

/// Static mapping from source name to its field list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, FieldList>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The three bronze sources with their declared schemas.
    pub fn bronze() -> Result<Self, BronzeError> {
        let mut registry = Self::new();
        registry.register(REGISTERED_USERS, FieldList::parse(REGISTERED_USERS_SCHEMA)?);
        registry.register(GYM_LOGINS, FieldList::parse(GYM_LOGINS_SCHEMA)?);
        registry.register(KAFKA_MULTIPLEX, FieldList::parse(KAFKA_MULTIPLEX_SCHEMA)?);
        Ok(registry)
    }

    pub fn register(&mut self, source: impl Into<String>, fields: FieldList) {
        self.schemas.insert(source.into(), fields);
    }

    pub fn schema_for(&self, source: &str) -> Result<&FieldList, BronzeError> {
        self.schemas
            .get(source)
            .ok_or_else(|| BronzeError::UnknownSource(source.to_string()))
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }
}
