//! Conversions from raw cell values into struct field types.
//!
//! [`FieldValue`] describes how one field type absorbs a cell. The row mapper
//! decides which entry point to call (null, date, JSON or generic conversion);
//! implementations only describe what each entry point means for their type.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::core::SqlValue;
use crate::error::{DataAccessError, Result};

/// A struct field type the row mapper can assign.
pub trait FieldValue: Sized {
    /// Textual fields receive byte cells as upper-case hex.
    const TEXTUAL: bool = false;

    /// Value assigned for a NULL cell.
    fn null_value() -> Self;

    /// Generic conversion of a raw cell value.
    fn convert(raw: &SqlValue) -> Result<Self>;

    /// Deserialize JSON-shaped cell text. `None` means the text does not
    /// deserialize into this type.
    fn from_json(_json: &str) -> Option<Self> {
        None
    }

    /// Conversion of a value produced by the row source's date accessor.
    fn from_date(date: Option<SqlValue>) -> Result<Self> {
        match date {
            Some(value) => Self::convert(&value),
            None => Ok(Self::null_value()),
        }
    }
}

fn unsupported(raw: &SqlValue, target: &str) -> DataAccessError {
    DataAccessError::conversion(format!(
        "cannot convert {:?} value '{}' to {}",
        raw.sql_type(),
        raw,
        target
    ))
}

impl FieldValue for String {
    const TEXTUAL: bool = true;

    fn null_value() -> Self {
        String::new()
    }

    fn convert(raw: &SqlValue) -> Result<Self> {
        Ok(raw.to_string())
    }
}

macro_rules! integer_field {
    ($($ty:ty),*) => {
        $(
            impl FieldValue for $ty {
                fn null_value() -> Self {
                    0
                }

                fn convert(raw: &SqlValue) -> Result<Self> {
                    let wide = raw.to_i64()?;
                    <$ty>::try_from(wide).map_err(|_| {
                        DataAccessError::conversion(format!(
                            "value {} is outside the range of {}",
                            wide,
                            stringify!($ty)
                        ))
                    })
                }
            }
        )*
    };
}

integer_field!(u8, i16, u16, i32, u32, i64);

impl FieldValue for f32 {
    fn null_value() -> Self {
        0.0
    }

    fn convert(raw: &SqlValue) -> Result<Self> {
        let wide = raw.to_f64()?;
        if wide.is_finite() && wide.abs() > f64::from(f32::MAX) {
            return Err(DataAccessError::conversion(format!(
                "value {} is outside the range of f32",
                wide
            )));
        }
        Ok(wide as f32)
    }
}

impl FieldValue for f64 {
    fn null_value() -> Self {
        0.0
    }

    fn convert(raw: &SqlValue) -> Result<Self> {
        raw.to_f64()
    }
}

impl FieldValue for bool {
    fn null_value() -> Self {
        false
    }

    fn convert(raw: &SqlValue) -> Result<Self> {
        raw.to_bool()
    }
}

impl FieldValue for Decimal {
    fn null_value() -> Self {
        Decimal::ZERO
    }

    fn convert(raw: &SqlValue) -> Result<Self> {
        raw.to_decimal()
    }
}

impl FieldValue for NaiveDateTime {
    fn null_value() -> Self {
        NaiveDateTime::default()
    }

    fn convert(raw: &SqlValue) -> Result<Self> {
        raw.to_naive_datetime()
    }
}

impl FieldValue for NaiveDate {
    fn null_value() -> Self {
        NaiveDate::default()
    }

    fn convert(raw: &SqlValue) -> Result<Self> {
        match raw {
            SqlValue::Date(d) => Ok(*d),
            other => Ok(other.to_naive_datetime()?.date()),
        }
    }
}

impl FieldValue for NaiveTime {
    fn null_value() -> Self {
        NaiveTime::default()
    }

    fn convert(raw: &SqlValue) -> Result<Self> {
        match raw {
            SqlValue::Time(t) => Ok(*t),
            SqlValue::Text(s) => {
                let s = s.trim();
                NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
                    .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
                    .map_err(|_| unsupported(raw, "time"))
            }
            other => Ok(other.to_naive_datetime()?.time()),
        }
    }
}

impl FieldValue for DateTime<Utc> {
    fn null_value() -> Self {
        DateTime::<Utc>::default()
    }

    fn convert(raw: &SqlValue) -> Result<Self> {
        match raw {
            SqlValue::DateTimeOffset(v) => Ok(v.with_timezone(&Utc)),
            other => Ok(other.to_naive_datetime()?.and_utc()),
        }
    }
}

impl FieldValue for DateTime<FixedOffset> {
    fn null_value() -> Self {
        DateTime::<FixedOffset>::default()
    }

    fn convert(raw: &SqlValue) -> Result<Self> {
        match raw {
            SqlValue::DateTimeOffset(v) => Ok(*v),
            SqlValue::Text(s) => match DateTime::parse_from_rfc3339(s.trim()) {
                Ok(v) => Ok(v),
                Err(_) => Ok(raw.to_naive_datetime()?.and_utc().fixed_offset()),
            },
            other => Ok(other.to_naive_datetime()?.and_utc().fixed_offset()),
        }
    }
}

impl FieldValue for Uuid {
    fn null_value() -> Self {
        Uuid::nil()
    }

    fn convert(raw: &SqlValue) -> Result<Self> {
        match raw {
            SqlValue::Uuid(u) => Ok(*u),
            SqlValue::Text(s) => Uuid::parse_str(s.trim()).map_err(|_| unsupported(raw, "uuid")),
            SqlValue::Bytes(b) => Uuid::from_slice(b).map_err(|_| unsupported(raw, "uuid")),
            _ => Err(unsupported(raw, "uuid")),
        }
    }
}

impl FieldValue for Vec<u8> {
    fn null_value() -> Self {
        Vec::new()
    }

    fn convert(raw: &SqlValue) -> Result<Self> {
        match raw {
            SqlValue::Bytes(b) => Ok(b.clone()),
            SqlValue::Uuid(u) => Ok(u.as_bytes().to_vec()),
            _ => Err(unsupported(raw, "bytes")),
        }
    }
}

impl FieldValue for JsonValue {
    fn null_value() -> Self {
        JsonValue::Null
    }

    fn convert(raw: &SqlValue) -> Result<Self> {
        Ok(match raw {
            SqlValue::Null(_) => JsonValue::Null,
            SqlValue::Bool(b) => JsonValue::Bool(*b),
            SqlValue::I16(v) => JsonValue::from(*v),
            SqlValue::I32(v) => JsonValue::from(*v),
            SqlValue::I64(v) => JsonValue::from(*v),
            SqlValue::F32(v) => JsonValue::from(f64::from(*v)),
            SqlValue::F64(v) => JsonValue::from(*v),
            other => JsonValue::String(other.to_string()),
        })
    }

    fn from_json(json: &str) -> Option<Self> {
        serde_json::from_str(json).ok()
    }
}

/// A field holding a JSON document deserialized into `T`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> std::ops::Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: DeserializeOwned + Default> FieldValue for Json<T> {
    fn null_value() -> Self {
        Json(T::default())
    }

    fn convert(raw: &SqlValue) -> Result<Self> {
        match raw {
            SqlValue::Text(s) => Ok(Json(serde_json::from_str(s)?)),
            _ => Err(unsupported(raw, std::any::type_name::<T>())),
        }
    }

    fn from_json(json: &str) -> Option<Self> {
        serde_json::from_str(json).ok().map(Json)
    }
}

impl<V: FieldValue> FieldValue for Option<V> {
    const TEXTUAL: bool = V::TEXTUAL;

    fn null_value() -> Self {
        None
    }

    fn convert(raw: &SqlValue) -> Result<Self> {
        if raw.is_null() {
            return Ok(None);
        }
        V::convert(raw).map(Some)
    }

    fn from_json(json: &str) -> Option<Self> {
        V::from_json(json).map(Some)
    }

    fn from_date(date: Option<SqlValue>) -> Result<Self> {
        match date {
            Some(value) => V::from_date(Some(value)).map(Some),
            None => Ok(None),
        }
    }
}

/// An enumeration stored as a name or an ordinal.
///
/// Implemented by [`db_enum!`](crate::db_enum).
pub trait DbEnum: Copy + 'static {
    /// All variants in declaration order.
    const VARIANTS: &'static [Self];

    fn name(&self) -> &'static str;

    fn ordinal(&self) -> i64;

    /// Parse a variant name; numeric text is treated as an ordinal.
    fn from_name(text: &str) -> Result<Self> {
        let text = text.trim();
        if let Some(found) = Self::VARIANTS.iter().find(|v| v.name() == text) {
            return Ok(*found);
        }
        match text.parse::<i64>() {
            Ok(ordinal) => Self::from_ordinal(ordinal),
            Err(_) => Err(DataAccessError::conversion(format!(
                "'{}' is not a member of {}",
                text,
                std::any::type_name::<Self>()
            ))),
        }
    }

    fn from_ordinal(ordinal: i64) -> Result<Self> {
        Self::VARIANTS
            .iter()
            .find(|v| v.ordinal() == ordinal)
            .copied()
            .ok_or_else(|| {
                DataAccessError::conversion(format!(
                    "{} is not an ordinal of {}",
                    ordinal,
                    std::any::type_name::<Self>()
                ))
            })
    }

    /// Text cells by name, everything else by integer form.
    fn from_cell(raw: &SqlValue) -> Result<Self> {
        match raw {
            SqlValue::Text(s) => Self::from_name(s),
            other => Self::from_ordinal(other.to_i64()?),
        }
    }
}

/// Declare a field-mappable enumeration.
///
/// The first variant is the default.
///
/// ```
/// procbind::db_enum! {
///     pub enum Status {
///         Pending = 0,
///         Active = 1,
///         Closed = 5,
///     }
/// }
///
/// use procbind::mapping::DbEnum;
/// assert_eq!(Status::from_ordinal(5).unwrap(), Status::Closed);
/// assert_eq!(Status::default(), Status::Pending);
/// ```
#[macro_export]
macro_rules! db_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident $(= $value:expr)?),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant $(= $value)?),+
        }

        impl $crate::mapping::DbEnum for $name {
            const VARIANTS: &'static [Self] = &[$($name::$variant),+];

            fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => ::std::stringify!($variant)),+
                }
            }

            fn ordinal(&self) -> i64 {
                *self as i64
            }
        }

        impl ::std::default::Default for $name {
            fn default() -> Self {
                <Self as $crate::mapping::DbEnum>::VARIANTS[0]
            }
        }

        impl $crate::mapping::FieldValue for $name {
            fn null_value() -> Self {
                ::std::default::Default::default()
            }

            fn convert(raw: &$crate::core::SqlValue) -> $crate::Result<Self> {
                <Self as $crate::mapping::DbEnum>::from_cell(raw)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlType;

    crate::db_enum! {
        enum Color {
            Red = 1,
            Green = 2,
            Blue = 4,
        }
    }

    #[derive(Debug, Default, PartialEq, Deserialize)]
    struct Address {
        city: String,
    }

    #[test]
    fn test_enum_by_name_and_ordinal() {
        assert_eq!(Color::convert(&SqlValue::from("Green")).unwrap(), Color::Green);
        assert_eq!(Color::convert(&SqlValue::from("4")).unwrap(), Color::Blue);
        assert_eq!(Color::convert(&SqlValue::I32(1)).unwrap(), Color::Red);
        assert!(Color::convert(&SqlValue::I32(3)).is_err());
        assert!(Color::convert(&SqlValue::from("Purple")).is_err());
        assert_eq!(Color::default(), Color::Red);
    }

    #[test]
    fn test_integer_range_checked() {
        assert_eq!(u8::convert(&SqlValue::I32(255)).unwrap(), 255);
        assert!(u8::convert(&SqlValue::I32(256)).is_err());
        assert_eq!(i32::convert(&SqlValue::from("17")).unwrap(), 17);
    }

    #[test]
    fn test_f32_range_checked() {
        assert_eq!(f32::convert(&SqlValue::F64(1.5)).unwrap(), 1.5);
        assert!(f32::convert(&SqlValue::F64(1e39)).is_err());
        assert!(f32::convert(&SqlValue::F64(-1e39)).is_err());
    }

    #[test]
    fn test_option_wraps_inner_conversion() {
        assert_eq!(
            Option::<i32>::convert(&SqlValue::Null(SqlType::I32)).unwrap(),
            None
        );
        assert_eq!(Option::<i32>::convert(&SqlValue::I16(3)).unwrap(), Some(3));
        assert!(<Option<String> as FieldValue>::TEXTUAL);
    }

    #[test]
    fn test_json_field_deserializes() {
        let parsed = Json::<Address>::from_json(r#"{"city":"Oslo"}"#).unwrap();
        assert_eq!(parsed.city, "Oslo");
        assert!(Json::<Address>::from_json("[1,2]").is_none());
        assert!(String::from_json(r#"{"city":"Oslo"}"#).is_none());
    }

    #[test]
    fn test_date_field_from_text() {
        let date = NaiveDate::convert(&SqlValue::from("2022-02-14")).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2022, 2, 14).unwrap());
        let time = NaiveTime::convert(&SqlValue::from("07:45")).unwrap();
        assert_eq!(time, NaiveTime::from_hms_opt(7, 45, 0).unwrap());
    }
}
