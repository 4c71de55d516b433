//! Row mapping: cells into bound fields, rows into objects, tables into lists.

use std::any::type_name;
use std::sync::Arc;

use serde::de::IgnoredAny;
use tracing::trace;

use crate::core::{DataTable, SqlValue};
use crate::error::{DataAccessError, Result};

use super::binding::DataBound;
use super::field::FieldValue;
use super::property_map::PropertyMap;
use super::row_source::{DataTableSource, RowSource};

/// One cell of a row source, addressed for a specific bound field.
pub struct Cell<'a> {
    source: &'a dyn RowSource,
    row: usize,
    column: usize,
    column_name: &'a str,
    property: &'a str,
}

impl<'a> Cell<'a> {
    pub fn new(
        source: &'a dyn RowSource,
        row: usize,
        column: usize,
        column_name: &'a str,
        property: &'a str,
    ) -> Self {
        Self {
            source,
            row,
            column,
            column_name,
            property,
        }
    }

    pub fn column_name(&self) -> &str {
        self.column_name
    }

    /// Convert the cell into the field type.
    ///
    /// Priority: NULL, then dates through the source's date accessor, then
    /// bytes as upper-case hex for textual fields, then JSON-shaped text
    /// (falling back to the plain text when it does not deserialize), then
    /// the field type's generic conversion.
    pub fn convert<V: FieldValue>(&self) -> Result<V> {
        self.convert_inner()
            .map_err(|e| DataAccessError::Mapping {
                column: self.column_name.to_string(),
                property: self.property.to_string(),
                message: e.to_string(),
            })
    }

    fn convert_inner<V: FieldValue>(&self) -> Result<V> {
        if self.source.is_null(self.row, self.column)? {
            return Ok(V::null_value());
        }

        let raw = self.source.value(self.row, self.column)?;
        if raw.is_temporal() {
            return V::from_date(self.source.date(self.row, self.column)?);
        }

        if let SqlValue::Bytes(bytes) = raw {
            if V::TEXTUAL {
                return V::convert(&SqlValue::Text(hex::encode_upper(bytes)));
            }
        }

        let text = raw.to_string();
        if is_json_document(&text) {
            return match V::from_json(&text) {
                Some(value) => Ok(value),
                None => {
                    trace!(column = self.column_name, "JSON cell did not deserialize; using text");
                    V::convert(&SqlValue::Text(text))
                }
            };
        }

        V::convert(raw)
    }
}

/// True when the trimmed text is bracketed like a JSON object or array and
/// parses as JSON.
pub fn is_json_document(text: &str) -> bool {
    let trimmed = text.trim();
    let bracketed = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    bracketed && serde_json::from_str::<IgnoredAny>(trimmed).is_ok()
}

/// Populates objects of one type from rows of a [`RowSource`].
pub struct RowMapper<T> {
    map: Arc<PropertyMap<T>>,
}

impl<T: DataBound> RowMapper<T> {
    /// Mapper using the shared property map for `T`.
    pub fn new() -> Self {
        Self::with_map(PropertyMap::shared())
    }

    pub fn with_map(map: Arc<PropertyMap<T>>) -> Self {
        Self { map }
    }

    pub fn property_map(&self) -> &PropertyMap<T> {
        &self.map
    }

    /// Assign every bound field whose column exists in the source.
    ///
    /// Columns without a binding are ignored; bound fields without a column
    /// keep their current value.
    pub fn map_row(&self, source: &dyn RowSource, row: usize, target: &mut T) -> Result<()> {
        let count = source.row_count();
        if row >= count {
            return Err(DataAccessError::RowOutOfRange { row, count });
        }

        for (name, column) in source.ordered_columns() {
            let column = *column;
            if let Some(binding) = self.map.get(name) {
                let cell = Cell::new(source, row, column, name, binding.property());
                binding.assign(target, &cell)?;
            }
        }
        Ok(())
    }

    /// Map every row into a fresh `T`, preserving row order.
    pub fn map_all(&self, source: &dyn RowSource) -> Result<Vec<T>> {
        let mut out = Vec::with_capacity(source.row_count());
        for row in 0..source.row_count() {
            let mut item = T::default();
            self.map_row(source, row, &mut item)?;
            out.push(item);
        }
        Ok(out)
    }
}

impl<T: DataBound> Default for RowMapper<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Table-level mapping entry points.
#[derive(Debug, Clone, Copy, Default)]
pub struct MappingService;

impl MappingService {
    /// Map every row of the table; an absent or empty table yields an empty
    /// list.
    pub fn map_table<T: DataBound>(table: Option<&DataTable>) -> Result<Vec<T>> {
        let Some(table) = table else {
            return Ok(Vec::new());
        };
        trace!(
            target_type = type_name::<T>(),
            rows = table.row_count(),
            "mapping table"
        );
        let source = DataTableSource::new(table);
        RowMapper::<T>::new().map_all(&source)
    }

    /// Map row zero, or return `T::default()` when there are no rows.
    pub fn map_first_row<T: DataBound>(table: Option<&DataTable>) -> Result<T> {
        let mut item = T::default();
        if let Some(table) = table.filter(|t| !t.is_empty()) {
            let source = DataTableSource::new(table);
            RowMapper::<T>::new().map_row(&source, 0, &mut item)?;
        }
        Ok(item)
    }
}
