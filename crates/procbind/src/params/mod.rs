//! Call parameters for stored procedure dispatch.
//!
//! - [`Parameter`]: one named, typed value (string form or object form)
//! - [`ParameterContainer`]: ordered collection built by the `add*` family
//! - [`NullPolicy`]: what happens to parameters that carry no value
//! - [`bind`]: conversion of a parameter into the native value sent to the
//!   connection

mod bind;

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::core::{DataTable, SqlValue};
use crate::error::{DataAccessError, Result};

pub use bind::{bind, bind_all};

/// Declared database type of a call parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DbType {
    VarChar,
    NVarChar,
    Char,
    Text,
    Decimal,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    DateTime,
    Date,
    Bit,
    VarBinary,
    UniqueIdentifier,
    /// Table-valued parameter; the parameter's type name names the table type.
    Structured,
    /// Any other engine type, passed through by name.
    Other(String),
}

impl DbType {
    /// Type name as written in SQL.
    pub fn name(&self) -> &str {
        match self {
            DbType::VarChar => "varchar",
            DbType::NVarChar => "nvarchar",
            DbType::Char => "char",
            DbType::Text => "text",
            DbType::Decimal => "decimal",
            DbType::TinyInt => "tinyint",
            DbType::SmallInt => "smallint",
            DbType::Int => "int",
            DbType::BigInt => "bigint",
            DbType::Float => "float",
            DbType::DateTime => "datetime",
            DbType::Date => "date",
            DbType::Bit => "bit",
            DbType::VarBinary => "varbinary",
            DbType::UniqueIdentifier => "uniqueidentifier",
            DbType::Structured => "structured",
            DbType::Other(name) => name,
        }
    }

    /// Whether values of this type travel as text.
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            DbType::VarChar | DbType::NVarChar | DbType::Char | DbType::Text
        )
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DbType {
    type Err = DataAccessError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(DataAccessError::Config("empty parameter type".to_string()));
        }
        Ok(match trimmed.to_lowercase().as_str() {
            "varchar" => DbType::VarChar,
            "nvarchar" => DbType::NVarChar,
            "char" | "nchar" => DbType::Char,
            "text" | "ntext" => DbType::Text,
            "decimal" | "numeric" | "money" => DbType::Decimal,
            "tinyint" => DbType::TinyInt,
            "smallint" => DbType::SmallInt,
            "int" | "integer" => DbType::Int,
            "bigint" => DbType::BigInt,
            "float" | "real" | "double" => DbType::Float,
            "datetime" | "datetime2" | "smalldatetime" | "timestamp" => DbType::DateTime,
            "date" => DbType::Date,
            "bit" | "bool" | "boolean" => DbType::Bit,
            "varbinary" | "binary" | "image" | "bytea" => DbType::VarBinary,
            "uniqueidentifier" | "uuid" => DbType::UniqueIdentifier,
            "structured" => DbType::Structured,
            _ => DbType::Other(trimmed.to_string()),
        })
    }
}

/// Object form of a parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Explicit NULL marker; always bound as a typed NULL.
    Null,
    /// A single native value.
    Scalar(SqlValue),
    /// Table-valued payload.
    Structured(DataTable),
}

impl From<SqlValue> for ParamValue {
    fn from(v: SqlValue) -> Self {
        ParamValue::Scalar(v)
    }
}

impl From<DataTable> for ParamValue {
    fn from(v: DataTable) -> Self {
        ParamValue::Structured(v)
    }
}

macro_rules! scalar_param {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for ParamValue {
                fn from(v: $ty) -> Self {
                    ParamValue::Scalar(SqlValue::from(v))
                }
            }
        )*
    };
}

scalar_param!(
    bool,
    i16,
    i32,
    i64,
    f32,
    f64,
    String,
    &str,
    Vec<u8>,
    &[u8],
    Uuid,
    Decimal,
    NaiveDateTime,
    NaiveDate,
    NaiveTime
);

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(ParamValue::Null, Into::into)
    }
}

/// One named, typed call parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub db_type: DbType,
    pub size: u32,
    pub precision: u8,
    /// String form of the value.
    pub value: Option<String>,
    /// Object form of the value.
    pub object_value: Option<ParamValue>,
    /// Structured type name (table-valued parameters).
    pub type_name: Option<String>,
}

impl Parameter {
    /// Parameter carrying a string value.
    pub fn value(name: impl Into<String>, db_type: DbType, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            db_type,
            size: 0,
            precision: 0,
            value: Some(value.into()),
            object_value: None,
            type_name: None,
        }
    }

    /// Parameter carrying an object value.
    pub fn object(name: impl Into<String>, db_type: DbType, value: impl Into<ParamValue>) -> Self {
        Self {
            name: name.into(),
            db_type,
            size: 0,
            precision: 0,
            value: None,
            object_value: Some(value.into()),
            type_name: None,
        }
    }

    /// Explicit NULL marker with the same name and type.
    pub fn null_marker(name: impl Into<String>, db_type: DbType) -> Self {
        Self::object(name, db_type, ParamValue::Null)
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    pub fn with_precision(mut self, precision: u8) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    /// A parameter is sent when its string value is non-empty or it carries
    /// an object value (including the NULL marker).
    pub fn has_value(&self) -> bool {
        self.value.as_deref().is_some_and(|v| !v.is_empty()) || self.object_value.is_some()
    }

    /// Printable form of the value for logs.
    pub fn display_value(&self) -> String {
        if let Some(v) = self.value.as_deref().filter(|v| !v.is_empty()) {
            return v.to_string();
        }
        match &self.object_value {
            None | Some(ParamValue::Null) => "NULL".to_string(),
            Some(ParamValue::Scalar(v)) => v.to_string(),
            Some(ParamValue::Structured(t)) => format!("<table {} rows>", t.row_count()),
        }
    }
}

/// What to do with parameters that carry no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullPolicy {
    /// Leave them out of the call.
    #[default]
    Omit,
    /// Send an explicit NULL marker in their place.
    KeepAsNull,
}

/// Apply the null policy to a parameter list, preserving order.
pub fn prepare(parameters: &[Parameter], policy: NullPolicy) -> Vec<Parameter> {
    parameters
        .iter()
        .filter_map(|p| {
            if p.has_value() {
                Some(p.clone())
            } else {
                match policy {
                    NullPolicy::Omit => None,
                    NullPolicy::KeepAsNull => {
                        Some(Parameter::null_marker(p.name.clone(), p.db_type.clone()))
                    }
                }
            }
        })
        .collect()
}

/// Ordered collection of call parameters. Duplicate names are not detected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterContainer {
    parameters: Vec<Parameter>,
}

impl ParameterContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, parameter: Parameter) -> &mut Self {
        self.parameters.push(parameter);
        self
    }

    pub fn add_value(&mut self, name: &str, db_type: DbType, value: &str) -> &mut Self {
        self.add(Parameter::value(name, db_type, value))
    }

    pub fn add_object(
        &mut self,
        name: &str,
        db_type: DbType,
        value: impl Into<ParamValue>,
    ) -> &mut Self {
        self.add(Parameter::object(name, db_type, value))
    }

    /// Table-valued parameter with its structured type name.
    pub fn add_structured(&mut self, name: &str, type_name: &str, table: DataTable) -> &mut Self {
        self.add(Parameter::object(name, DbType::Structured, table).with_type_name(type_name))
    }

    pub fn add_sized_value(&mut self, name: &str, db_type: DbType, size: u32, value: &str) -> &mut Self {
        self.add(Parameter::value(name, db_type, value).with_size(size))
    }

    pub fn add_sized_object(
        &mut self,
        name: &str,
        db_type: DbType,
        size: u32,
        value: impl Into<ParamValue>,
    ) -> &mut Self {
        self.add(Parameter::object(name, db_type, value).with_size(size))
    }

    pub fn add_precise_value(
        &mut self,
        name: &str,
        db_type: DbType,
        size: u32,
        precision: u8,
        value: &str,
    ) -> &mut Self {
        self.add(
            Parameter::value(name, db_type, value)
                .with_size(size)
                .with_precision(precision),
        )
    }

    pub fn add_precise_object(
        &mut self,
        name: &str,
        db_type: DbType,
        size: u32,
        precision: u8,
        value: impl Into<ParamValue>,
    ) -> &mut Self {
        self.add(
            Parameter::object(name, db_type, value)
                .with_size(size)
                .with_precision(precision),
        )
    }

    pub fn clear(&mut self) {
        self.parameters.clear();
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Parameters after applying the null policy.
    pub fn prepared(&self, policy: NullPolicy) -> Vec<Parameter> {
        prepare(&self.parameters, policy)
    }
}

impl From<Vec<Parameter>> for ParameterContainer {
    fn from(parameters: Vec<Parameter>) -> Self {
        Self { parameters }
    }
}

impl FromIterator<Parameter> for ParameterContainer {
    fn from_iter<I: IntoIterator<Item = Parameter>>(iter: I) -> Self {
        Self {
            parameters: iter.into_iter().collect(),
        }
    }
}
