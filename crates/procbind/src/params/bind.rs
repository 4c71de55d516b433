//! Outbound binding: call parameters into native values.

use uuid::Uuid;

use crate::core::{BoundParam, SqlType, SqlValue};
use crate::error::{DataAccessError, Result};

use super::{DbType, ParamValue, Parameter};

/// Bind one parameter.
///
/// Every type follows the same fallback: a non-blank string value parsed
/// into the type's native kind, else the object value coerced to it, else a
/// typed NULL. An explicit NULL marker always binds NULL.
pub fn bind(parameter: &Parameter) -> Result<BoundParam> {
    let null = SqlValue::Null(native_type(&parameter.db_type));

    let value = match (&parameter.value, &parameter.object_value) {
        (_, Some(ParamValue::Null)) => Ok(null),
        (Some(text), _) if !text.trim().is_empty() => {
            coerce(&parameter.db_type, &SqlValue::Text(text.clone()))
        }
        (_, Some(ParamValue::Scalar(v))) if !v.is_null() => coerce(&parameter.db_type, v),
        (_, Some(ParamValue::Structured(table))) => match parameter.db_type {
            DbType::Structured => Ok(SqlValue::Text(table.to_json().to_string())),
            _ => Err(DataAccessError::conversion(format!(
                "a table value requires a structured parameter, not {}",
                parameter.db_type
            ))),
        },
        _ => Ok(null),
    }
    .map_err(|e| DataAccessError::conversion(format!("parameter {}: {}", parameter.name, e)))?;

    Ok(BoundParam {
        name: parameter.name.clone(),
        db_type: parameter.db_type.clone(),
        size: parameter.size,
        precision: parameter.precision,
        value,
        type_name: parameter.type_name.clone(),
    })
}

/// Bind a prepared parameter list, preserving order.
pub fn bind_all(parameters: &[Parameter]) -> Result<Vec<BoundParam>> {
    parameters.iter().map(bind).collect()
}

/// Native value kind sent for a declared type.
pub(crate) fn native_type(db_type: &DbType) -> SqlType {
    match db_type {
        DbType::VarChar | DbType::NVarChar | DbType::Char | DbType::Text => SqlType::String,
        DbType::Decimal => SqlType::Decimal,
        DbType::TinyInt | DbType::SmallInt => SqlType::I16,
        DbType::Int => SqlType::I32,
        DbType::BigInt => SqlType::I64,
        DbType::Float => SqlType::F64,
        DbType::DateTime => SqlType::DateTime,
        DbType::Date => SqlType::Date,
        DbType::Bit => SqlType::Bool,
        DbType::VarBinary => SqlType::Bytes,
        DbType::UniqueIdentifier => SqlType::Uuid,
        DbType::Structured | DbType::Other(_) => SqlType::String,
    }
}

fn coerce(db_type: &DbType, value: &SqlValue) -> Result<SqlValue> {
    Ok(match db_type {
        DbType::VarChar | DbType::NVarChar | DbType::Char | DbType::Text => match value {
            SqlValue::Text(_) => value.clone(),
            other => SqlValue::Text(other.to_string()),
        },
        DbType::Decimal => SqlValue::Decimal(value.to_decimal()?),
        DbType::TinyInt => SqlValue::I16(ranged(value, 0, 255, "tinyint")? as i16),
        DbType::SmallInt => SqlValue::I16(ranged(
            value,
            i64::from(i16::MIN),
            i64::from(i16::MAX),
            "smallint",
        )? as i16),
        DbType::Int => SqlValue::I32(ranged(
            value,
            i64::from(i32::MIN),
            i64::from(i32::MAX),
            "int",
        )? as i32),
        DbType::BigInt => SqlValue::I64(value.to_i64()?),
        DbType::Float => SqlValue::F64(value.to_f64()?),
        DbType::DateTime => match value {
            SqlValue::DateTimeOffset(_) => value.clone(),
            other => SqlValue::DateTime(other.to_naive_datetime()?),
        },
        DbType::Date => match value {
            SqlValue::Date(_) => value.clone(),
            other => SqlValue::Date(other.to_naive_datetime()?.date()),
        },
        DbType::Bit => SqlValue::Bool(value.to_bool()?),
        DbType::VarBinary => match value {
            SqlValue::Bytes(_) => value.clone(),
            SqlValue::Text(s) => SqlValue::Bytes(decode_hex(s)?),
            other => {
                return Err(DataAccessError::conversion(format!(
                    "cannot send {:?} as varbinary",
                    other.sql_type()
                )))
            }
        },
        DbType::UniqueIdentifier => match value {
            SqlValue::Uuid(_) => value.clone(),
            SqlValue::Text(s) => SqlValue::Uuid(Uuid::parse_str(s.trim()).map_err(|e| {
                DataAccessError::conversion(format!("'{}' is not a uniqueidentifier: {}", s, e))
            })?),
            other => {
                return Err(DataAccessError::conversion(format!(
                    "cannot send {:?} as uniqueidentifier",
                    other.sql_type()
                )))
            }
        },
        DbType::Structured | DbType::Other(_) => value.clone(),
    })
}

fn ranged(value: &SqlValue, min: i64, max: i64, target: &str) -> Result<i64> {
    let v = value.to_i64()?;
    if v < min || v > max {
        return Err(DataAccessError::conversion(format!(
            "value {} is outside the range of {}",
            v, target
        )));
    }
    Ok(v)
}

fn decode_hex(text: &str) -> Result<Vec<u8>> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex::decode(digits)
        .map_err(|e| DataAccessError::conversion(format!("'{}' is not a hex byte string: {}", text, e)))
}
