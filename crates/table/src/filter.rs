use std::fmt;

use bronze_core::{FieldValue, Record};

use crate::error::TableError;

/// Column-level predicate for filtering committed rows.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldPredicate {
    /// Column equals the literal (compared in the column's type).
    Eq(String),
    /// Column is non-null and differs from the literal.
    NotEq(String),
    /// Column is greater than the numeric literal.
    Gt(f64),
    /// Column is less than the numeric literal.
    Lt(f64),
    IsNull,
    IsNotNull,
}

impl FieldPredicate {
    /// Test a column value against this predicate. A missing column is
    /// treated as null.
    pub fn matches(&self, value: Option<&FieldValue>) -> bool {
        let value = value.unwrap_or(&FieldValue::Null);
        match self {
            FieldPredicate::Eq(expected) => equals(value, expected),
            FieldPredicate::NotEq(expected) => !value.is_null() && !equals(value, expected),
            FieldPredicate::Gt(threshold) => numeric(value).is_some_and(|v| v > *threshold),
            FieldPredicate::Lt(threshold) => numeric(value).is_some_and(|v| v < *threshold),
            FieldPredicate::IsNull => value.is_null(),
            FieldPredicate::IsNotNull => !value.is_null(),
        }
    }
}

fn equals(value: &FieldValue, expected: &str) -> bool {
    match value {
        FieldValue::Text(s) => s == expected,
        FieldValue::Integer(i) => expected.parse::<i64>().ok() == Some(*i),
        FieldValue::Float(f) => expected.parse::<f64>().ok() == Some(*f),
        FieldValue::Boolean(b) => {
            expected.eq_ignore_ascii_case("true") && *b
                || expected.eq_ignore_ascii_case("false") && !*b
        }
        FieldValue::Timestamp(ts) => expected
            .parse::<chrono::DateTime<chrono::Utc>>()
            .is_ok_and(|e| e == *ts),
        FieldValue::Date(_) => value.to_string() == expected,
        FieldValue::Null => false,
    }
}

fn numeric(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::Integer(i) => Some(*i as f64),
        FieldValue::Float(f) => Some(*f),
        _ => None,
    }
}

/// Conjunction of column predicates, parsed from a small SQL-like
/// expression: `true`, `topic='bpm'`, `gym = 3 AND logout IS NOT NULL`.
#[derive(Debug, Clone, PartialEq)]
pub struct RowFilter {
    clauses: Vec<(String, FieldPredicate)>,
    expr: String,
}

impl RowFilter {
    /// Filter that matches every row.
    pub fn all() -> Self {
        Self {
            clauses: Vec::new(),
            expr: "true".to_string(),
        }
    }

    /// Single equality clause, rendered as `column='value'`.
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        let column = column.into();
        let value = value.into();
        let expr = format!("{}='{}'", column, value.replace('\'', "''"));
        Self {
            clauses: vec![(column, FieldPredicate::Eq(value))],
            expr,
        }
    }

    pub fn parse(expr: &str) -> Result<Self, TableError> {
        let invalid = |message: &str| TableError::InvalidFilter {
            expr: expr.to_string(),
            message: message.to_string(),
        };

        let trimmed = expr.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty expression"));
        }

        let mut clauses = Vec::new();
        for clause in split_and(trimmed) {
            let clause = clause.trim();
            if clause.eq_ignore_ascii_case("true") {
                continue;
            }
            clauses.push(parse_clause(clause).map_err(|m| invalid(&m))?);
        }

        Ok(Self {
            clauses,
            expr: trimmed.to_string(),
        })
    }

    pub fn is_all(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[(String, FieldPredicate)] {
        &self.clauses
    }

    /// Test if a record matches every clause.
    pub fn matches(&self, record: &Record) -> bool {
        self.clauses
            .iter()
            .all(|(column, predicate)| predicate.matches(record.get(column)))
    }
}

impl Default for RowFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Display for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

/// Split on case-insensitive `AND` keywords that are outside quotes.
fn split_and(expr: &str) -> Vec<&str> {
    let bytes = expr.as_bytes();
    let mut parts = Vec::new();
    let mut in_quote = false;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' => in_quote = !in_quote,
            b' ' | b'\t' if !in_quote => {
                let rest = &expr[i + 1..];
                if rest.len() > 4
                    && rest.get(..3).is_some_and(|w| w.eq_ignore_ascii_case("and"))
                    && rest.as_bytes()[3].is_ascii_whitespace()
                {
                    parts.push(&expr[start..i]);
                    i += 4;
                    start = i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&expr[start..]);
    parts
}

fn parse_clause(clause: &str) -> Result<(String, FieldPredicate), String> {
    let lower = clause.to_ascii_lowercase();
    if let Some(column) = lower.strip_suffix("is not null") {
        return Ok((column_name(&clause[..column.len()])?, FieldPredicate::IsNotNull));
    }
    if let Some(column) = lower.strip_suffix("is null") {
        return Ok((column_name(&clause[..column.len()])?, FieldPredicate::IsNull));
    }

    let (pos, op) = find_operator(clause).ok_or_else(|| format!("no operator in '{clause}'"))?;
    let column = column_name(&clause[..pos])?;
    let literal = parse_literal(&clause[pos + op.len()..])?;

    let predicate = match op {
        "=" => FieldPredicate::Eq(literal),
        "!=" | "<>" => FieldPredicate::NotEq(literal),
        ">" | "<" => {
            let n: f64 = literal
                .parse()
                .map_err(|_| format!("'{literal}' is not numeric"))?;
            if op == ">" {
                FieldPredicate::Gt(n)
            } else {
                FieldPredicate::Lt(n)
            }
        }
        _ => unreachable!("find_operator only returns known operators"),
    };
    Ok((column, predicate))
}

fn find_operator(clause: &str) -> Option<(usize, &'static str)> {
    let bytes = clause.as_bytes();
    let mut in_quote = false;
    for i in 0..bytes.len() {
        match bytes[i] {
            b'\'' => in_quote = !in_quote,
            _ if in_quote => {}
            b'!' if bytes.get(i + 1) == Some(&b'=') => return Some((i, "!=")),
            b'<' if bytes.get(i + 1) == Some(&b'>') => return Some((i, "<>")),
            b'=' => return Some((i, "=")),
            b'>' => return Some((i, ">")),
            b'<' => return Some((i, "<")),
            _ => {}
        }
    }
    None
}

fn column_name(raw: &str) -> Result<String, String> {
    let name = raw.trim().trim_matches('`');
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(name.to_string())
    } else {
        Err(format!("invalid column name '{}'", raw.trim()))
    }
}

fn parse_literal(raw: &str) -> Result<String, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("missing literal".to_string());
    }
    match raw.strip_prefix('\'') {
        Some(rest) => rest
            .strip_suffix('\'')
            .map(|inner| inner.replace("''", "'"))
            .ok_or_else(|| format!("unterminated string {raw}")),
        None => Ok(raw.to_string()),
    }
}
