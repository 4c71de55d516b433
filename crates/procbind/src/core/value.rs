//! SQL value types shared by parameters, result tables and the row mapper.
//!
//! [`SqlValue`] is the single tagged union for every cell that comes back from
//! a data source and every native value bound to a command.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use crate::error::{DataAccessError, Result};

/// Declared kind of a column or a typed NULL.
///
/// Drivers need the kind of a NULL to pick the right wire type, and result
/// tables keep it per column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    String,
    Bytes,
    Uuid,
    Decimal,
    DateTime,
    DateTimeOffset,
    Date,
    Time,
}

/// SQL value enum for type-safe cell and parameter handling.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL with type hint.
    Null(SqlType),

    /// Boolean value (bit).
    Bool(bool),

    /// 16-bit signed integer (smallint, tinyint).
    I16(i16),

    /// 32-bit signed integer (int).
    I32(i32),

    /// 64-bit signed integer (bigint).
    I64(i64),

    /// 32-bit floating point (real).
    F32(f32),

    /// 64-bit floating point (float/double precision).
    F64(f64),

    /// Text/string data.
    Text(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// UUID/GUID value.
    Uuid(Uuid),

    /// Decimal value with arbitrary precision.
    Decimal(Decimal),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Timestamp with timezone offset.
    DateTimeOffset(DateTime<FixedOffset>),

    /// Date without time component.
    Date(NaiveDate),

    /// Time without date component.
    Time(NaiveTime),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    /// Get the SqlType for this value.
    #[must_use]
    pub fn sql_type(&self) -> SqlType {
        match self {
            SqlValue::Null(t) => *t,
            SqlValue::Bool(_) => SqlType::Bool,
            SqlValue::I16(_) => SqlType::I16,
            SqlValue::I32(_) => SqlType::I32,
            SqlValue::I64(_) => SqlType::I64,
            SqlValue::F32(_) => SqlType::F32,
            SqlValue::F64(_) => SqlType::F64,
            SqlValue::Text(_) => SqlType::String,
            SqlValue::Bytes(_) => SqlType::Bytes,
            SqlValue::Uuid(_) => SqlType::Uuid,
            SqlValue::Decimal(_) => SqlType::Decimal,
            SqlValue::DateTime(_) => SqlType::DateTime,
            SqlValue::DateTimeOffset(_) => SqlType::DateTimeOffset,
            SqlValue::Date(_) => SqlType::Date,
            SqlValue::Time(_) => SqlType::Time,
        }
    }

    /// True for values carrying a calendar date.
    #[must_use]
    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            SqlValue::DateTime(_) | SqlValue::DateTimeOffset(_) | SqlValue::Date(_)
        )
    }

    /// Timestamp view of a temporal value; `None` for anything else.
    #[must_use]
    pub fn as_naive_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            SqlValue::DateTime(v) => Some(*v),
            SqlValue::DateTimeOffset(v) => Some(v.naive_local()),
            SqlValue::Date(v) => v.and_hms_opt(0, 0, 0),
            _ => None,
        }
    }

    /// Integer form of the value, rounding fractional numbers half-to-even.
    pub fn to_i64(&self) -> Result<i64> {
        match self {
            SqlValue::Bool(b) => Ok(i64::from(*b)),
            SqlValue::I16(v) => Ok(i64::from(*v)),
            SqlValue::I32(v) => Ok(i64::from(*v)),
            SqlValue::I64(v) => Ok(*v),
            SqlValue::F32(v) => float_to_i64(f64::from(*v)),
            SqlValue::F64(v) => float_to_i64(*v),
            SqlValue::Decimal(d) => d
                .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
                .to_i64()
                .ok_or_else(|| overflow(self, "i64")),
            SqlValue::Text(s) => {
                let trimmed = s.trim();
                trimmed
                    .parse::<i64>()
                    .or_else(|_| {
                        trimmed
                            .parse::<Decimal>()
                            .map_err(|_| not_convertible(self, "i64"))
                            .and_then(|d| SqlValue::Decimal(d).to_i64())
                    })
            }
            _ => Err(not_convertible(self, "i64")),
        }
    }

    /// Floating point form of the value.
    pub fn to_f64(&self) -> Result<f64> {
        match self {
            SqlValue::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            SqlValue::I16(v) => Ok(f64::from(*v)),
            SqlValue::I32(v) => Ok(f64::from(*v)),
            SqlValue::I64(v) => Ok(*v as f64),
            SqlValue::F32(v) => Ok(f64::from(*v)),
            SqlValue::F64(v) => Ok(*v),
            SqlValue::Decimal(d) => d.to_f64().ok_or_else(|| overflow(self, "f64")),
            SqlValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| not_convertible(self, "f64")),
            _ => Err(not_convertible(self, "f64")),
        }
    }

    /// Decimal form of the value.
    pub fn to_decimal(&self) -> Result<Decimal> {
        match self {
            SqlValue::Bool(b) => Ok(Decimal::from(u8::from(*b))),
            SqlValue::I16(v) => Ok(Decimal::from(*v)),
            SqlValue::I32(v) => Ok(Decimal::from(*v)),
            SqlValue::I64(v) => Ok(Decimal::from(*v)),
            SqlValue::F32(v) => Decimal::from_f32(*v).ok_or_else(|| overflow(self, "decimal")),
            SqlValue::F64(v) => Decimal::from_f64(*v).ok_or_else(|| overflow(self, "decimal")),
            SqlValue::Decimal(d) => Ok(*d),
            SqlValue::Text(s) => {
                let trimmed = s.trim();
                trimmed
                    .parse::<Decimal>()
                    .or_else(|_| Decimal::from_scientific(trimmed))
                    .map_err(|_| not_convertible(self, "decimal"))
            }
            _ => Err(not_convertible(self, "decimal")),
        }
    }

    /// Boolean form of the value (non-zero numbers are true).
    pub fn to_bool(&self) -> Result<bool> {
        match self {
            SqlValue::Bool(b) => Ok(*b),
            SqlValue::I16(v) => Ok(*v != 0),
            SqlValue::I32(v) => Ok(*v != 0),
            SqlValue::I64(v) => Ok(*v != 0),
            SqlValue::F32(v) => Ok(*v != 0.0),
            SqlValue::F64(v) => Ok(*v != 0.0),
            SqlValue::Decimal(d) => Ok(!d.is_zero()),
            SqlValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                _ => Err(not_convertible(self, "bool")),
            },
            _ => Err(not_convertible(self, "bool")),
        }
    }

    /// Timestamp form of the value, parsing text in the common ISO layouts.
    pub fn to_naive_datetime(&self) -> Result<NaiveDateTime> {
        if let Some(dt) = self.as_naive_datetime() {
            return Ok(dt);
        }
        match self {
            SqlValue::Text(s) => parse_datetime(s.trim()).ok_or_else(|| not_convertible(self, "datetime")),
            _ => Err(not_convertible(self, "datetime")),
        }
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
];

/// Parse a timestamp from text; a bare date parses as midnight.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    ["%Y-%m-%d", "%m/%d/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn float_to_i64(v: f64) -> Result<i64> {
    let rounded = v.round_ties_even();
    if rounded.is_finite() && rounded >= i64::MIN as f64 && rounded < i64::MAX as f64 {
        Ok(rounded as i64)
    } else {
        Err(DataAccessError::conversion(format!(
            "value {} is outside the range of i64",
            v
        )))
    }
}

fn not_convertible(value: &SqlValue, target: &str) -> DataAccessError {
    DataAccessError::conversion(format!(
        "cannot convert {:?} value '{}' to {}",
        value.sql_type(),
        value,
        target
    ))
}

fn overflow(value: &SqlValue, target: &str) -> DataAccessError {
    DataAccessError::conversion(format!("value '{}' is outside the range of {}", value, target))
}

/// Canonical string form, used by the JSON probe and by text conversions.
impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null(_) => Ok(()),
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::I16(v) => write!(f, "{}", v),
            SqlValue::I32(v) => write!(f, "{}", v),
            SqlValue::I64(v) => write!(f, "{}", v),
            SqlValue::F32(v) => write!(f, "{}", v),
            SqlValue::F64(v) => write!(f, "{}", v),
            SqlValue::Text(v) => f.write_str(v),
            SqlValue::Bytes(v) => f.write_str(&hex::encode_upper(v)),
            SqlValue::Uuid(v) => write!(f, "{}", v),
            SqlValue::Decimal(v) => write!(f, "{}", v),
            SqlValue::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f")),
            SqlValue::DateTimeOffset(v) => write!(f, "{}", v.to_rfc3339()),
            SqlValue::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            SqlValue::Time(v) => write!(f, "{}", v.format("%H:%M:%S%.f")),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i16> for SqlValue {
    fn from(v: i16) -> Self {
        SqlValue::I16(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f32> for SqlValue {
    fn from(v: f32) -> Self {
        SqlValue::F32(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<&[u8]> for SqlValue {
    fn from(v: &[u8]) -> Self {
        SqlValue::Bytes(v.to_vec())
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<DateTime<FixedOffset>> for SqlValue {
    fn from(v: DateTime<FixedOffset>) -> Self {
        SqlValue::DateTimeOffset(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<NaiveTime> for SqlValue {
    fn from(v: NaiveTime) -> Self {
        SqlValue::Time(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_value_is_null() {
        assert!(SqlValue::Null(SqlType::String).is_null());
        assert!(!SqlValue::I32(42).is_null());
        assert_eq!(SqlValue::Null(SqlType::Date).sql_type(), SqlType::Date);
    }

    #[test]
    fn test_display_bytes_is_upper_hex() {
        assert_eq!(SqlValue::Bytes(vec![0x0A, 0xFF]).to_string(), "0AFF");
    }

    #[test]
    fn test_to_i64_rounds_half_to_even() {
        assert_eq!(SqlValue::F64(2.5).to_i64().unwrap(), 2);
        assert_eq!(SqlValue::F64(3.5).to_i64().unwrap(), 4);
        assert_eq!(
            SqlValue::Decimal(Decimal::new(155, 1)).to_i64().unwrap(),
            16
        );
        assert_eq!(SqlValue::Text(" 42 ".into()).to_i64().unwrap(), 42);
        assert!(SqlValue::Text("forty".into()).to_i64().is_err());
    }

    #[test]
    fn test_to_i64_rejects_floats_past_the_range() {
        // 2^63 rounds to i64::MAX as f64 but does not fit.
        assert!(SqlValue::F64(9_223_372_036_854_775_808.0).to_i64().is_err());
        assert!(SqlValue::F64(f64::NAN).to_i64().is_err());
        assert_eq!(
            SqlValue::F64(-9_223_372_036_854_775_808.0).to_i64().unwrap(),
            i64::MIN
        );
        assert_eq!(SqlValue::F64(1e18).to_i64().unwrap(), 1_000_000_000_000_000_000);
    }

    #[test]
    fn test_to_bool_accepts_words_and_digits() {
        assert!(SqlValue::Text("True".into()).to_bool().unwrap());
        assert!(!SqlValue::Text("0".into()).to_bool().unwrap());
        assert!(SqlValue::I32(7).to_bool().unwrap());
        assert!(SqlValue::Text("maybe".into()).to_bool().is_err());
    }

    #[test]
    fn test_parse_datetime_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        assert_eq!(parse_datetime("2024-03-09 14:30:00"), Some(expected));
        assert_eq!(parse_datetime("2024-03-09T14:30:00"), Some(expected));
        assert_eq!(parse_datetime("03/09/2024 14:30:00"), Some(expected));
        assert_eq!(
            parse_datetime("2024-03-09"),
            NaiveDate::from_ymd_opt(2024, 3, 9).unwrap().and_hms_opt(0, 0, 0)
        );
        assert_eq!(parse_datetime("yesterday"), None);
    }

    #[test]
    fn test_date_is_temporal() {
        let d = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
        assert!(SqlValue::Date(d).is_temporal());
        assert!(!SqlValue::Time(NaiveTime::from_hms_opt(1, 2, 3).unwrap()).is_temporal());
        assert_eq!(
            SqlValue::Date(d).as_naive_datetime(),
            d.and_hms_opt(0, 0, 0)
        );
    }
}
