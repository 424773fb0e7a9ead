/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! # Record slot values.
//!
//! Every slot of a [`Record`](crate::Record) holds a [`Value`]: either a
//! typed payload, or one of three sentinels that the synchronization
//! protocol distinguishes from any payload:
//!
//!   * [`Value::NoChange`] - the slot is not being asserted at all. A record
//!     carrying `NoChange` in a slot is a partial update that leaves the
//!     corresponding attribute alone.
//!   * [`Value::Inherit`] - the slot asks the receiver to reset the
//!     attribute to its declared initial value.
//!   * [`Value::Absent`] - the missing-value marker returned by lookups.
//!
//! Sentinels pass through every converter untouched; payloads dispatch on
//! their [`ValueKind`]. All payload representations are `Eq + Hash` so that
//! records themselves stay hashable.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

/// A single record slot: a typed payload or a protocol sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// "This slot is not being asserted."
    NoChange,
    /// "Reset this attribute to its declared initial value."
    Inherit,
    /// Missing-value marker returned by lookups.
    Absent,
    Bytes(Vec<u8>),
    Text(String),
    Int(i64),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Decimal(Decimal),
    Blob(Vec<u8>),
    Clob(String),
}

impl Value {
    /// The runtime kind used for converter dispatch, or `None` for the
    /// three sentinels (which every converter passes through unchanged).
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::NoChange | Value::Inherit | Value::Absent => None,
            Value::Bytes(_) => Some(ValueKind::Bytes),
            Value::Text(_) => Some(ValueKind::Text),
            Value::Int(_) => Some(ValueKind::Int),
            Value::Date(_) => Some(ValueKind::Date),
            Value::Timestamp(_) => Some(ValueKind::Timestamp),
            Value::Decimal(_) => Some(ValueKind::Decimal),
            Value::Blob(_) => Some(ValueKind::Blob),
            Value::Clob(_) => Some(ValueKind::Clob),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.kind().is_none()
    }

    pub fn is_no_change(&self) -> bool {
        matches!(self, Value::NoChange)
    }

    pub fn is_inherit(&self) -> bool {
        matches!(self, Value::Inherit)
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// Convenience constructor for text payloads.
    pub fn text(s: impl Into<String>) -> Value {
        Value::Text(s.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::Text(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Value {
        Value::Decimal(v)
    }
}

/// Default formatting, used by `Record::explain` when a field declares no
/// formatter of its own.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::NoChange => f.write_str("NoChange"),
            Value::Inherit => f.write_str("Inherit"),
            Value::Absent => f.write_str("Absent"),
            Value::Bytes(b) | Value::Blob(b) => {
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Value::Text(s) | Value::Clob(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{i}"),
            Value::Date(d) => write!(f, "{d}"),
            Value::Timestamp(t) => write!(f, "{t}"),
            Value::Decimal(d) => write!(f, "{d}"),
        }
    }
}

/// Discriminant of the payload variants of [`Value`], used as the inner key
/// of the converter tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bytes,
    Text,
    Int,
    Date,
    Timestamp,
    Decimal,
    Blob,
    Clob,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Bytes => "bytes",
            ValueKind::Text => "text",
            ValueKind::Int => "int",
            ValueKind::Date => "date",
            ValueKind::Timestamp => "timestamp",
            ValueKind::Decimal => "decimal",
            ValueKind::Blob => "blob",
            ValueKind::Clob => "clob",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sentinels_have_no_kind() {
        assert!(Value::NoChange.kind().is_none());
        assert!(Value::Inherit.kind().is_none());
        assert!(Value::Absent.kind().is_none());
        assert_eq!(Value::Int(3).kind(), Some(ValueKind::Int));
    }

    #[test]
    fn sentinels_are_distinct() {
        assert_ne!(Value::NoChange, Value::Inherit);
        assert_ne!(Value::Inherit, Value::Absent);
        assert_ne!(Value::NoChange, Value::Absent);
    }

    #[test]
    fn display_is_bare() {
        assert_eq!(Value::text("hello").to_string(), "hello");
        assert_eq!(Value::Int(-7).to_string(), "-7");
        assert_eq!(Value::Bytes(vec![0xde, 0xad]).to_string(), "dead");
        assert_eq!(Value::NoChange.to_string(), "NoChange");
    }

    #[test]
    fn temporal_payloads_are_values() {
        let date = NaiveDate::from_ymd_opt(2008, 1, 1).expect("valid date");
        assert_eq!(Value::Date(date).kind(), Some(ValueKind::Date));
        assert_eq!(Value::Date(date).to_string(), "2008-01-01");
        assert_eq!(Value::Date(date), Value::Date(date));
    }
}
