//! Field value types and kinds

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

use crate::core::error::ValidationError;

/// Column type of a resource field
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Integer,
    Text,
    Boolean,
    Timestamp,
}

impl FieldKind {
    /// Parse a raw query-string value into a typed value for this kind
    pub fn parse_value(&self, field: &str, raw: &str) -> Result<FieldValue, ValidationError> {
        let invalid = |message: &str| ValidationError::InvalidValue {
            field: field.to_string(),
            value: raw.to_string(),
            message: message.to_string(),
        };

        match self {
            FieldKind::Integer => raw
                .trim()
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|_| invalid("expected an integer")),
            FieldKind::Text => Ok(FieldValue::Text(raw.to_string())),
            FieldKind::Boolean => match raw.trim() {
                "true" | "1" => Ok(FieldValue::Boolean(true)),
                "false" | "0" => Ok(FieldValue::Boolean(false)),
                _ => Err(invalid("expected true or false")),
            },
            FieldKind::Timestamp => parse_timestamp(raw.trim())
                .map(FieldValue::Timestamp)
                .ok_or_else(|| invalid("expected an RFC 3339 timestamp or a date")),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Integer => "integer",
            FieldKind::Text => "text",
            FieldKind::Boolean => "boolean",
            FieldKind::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(ts.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}

/// A polymorphic field value that can hold different types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Text(String),
    Null,
}

impl FieldValue {
    /// Get the value as a string if possible
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as an integer if possible
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Render the value as a single CSV cell (unquoted)
    pub fn to_csv_cell(&self) -> Cow<'_, str> {
        match self {
            FieldValue::Integer(i) => Cow::Owned(i.to_string()),
            FieldValue::Boolean(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
            FieldValue::Timestamp(ts) => Cow::Owned(ts.to_rfc3339()),
            FieldValue::Text(s) => Cow::Borrowed(s),
            FieldValue::Null => Cow::Borrowed(""),
        }
    }

    /// Ordering used by the in-memory store
    ///
    /// Nulls compare greater than any value, matching PostgreSQL's default
    /// (`NULLS LAST` ascending, `NULLS FIRST` descending). Values of
    /// different kinds fall back to their textual form.
    pub fn sort_cmp(&self, other: &FieldValue) -> Ordering {
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => Ordering::Equal,
            (FieldValue::Null, _) => Ordering::Greater,
            (_, FieldValue::Null) => Ordering::Less,
            (FieldValue::Integer(a), FieldValue::Integer(b)) => a.cmp(b),
            (FieldValue::Boolean(a), FieldValue::Boolean(b)) => a.cmp(b),
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => a.cmp(b),
            (FieldValue::Text(a), FieldValue::Text(b)) => a.cmp(b),
            (a, b) => a.to_csv_cell().cmp(&b.to_csv_cell()),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Integer(i64::from(value))
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}
