//! In-memory tabular results.
//!
//! Drivers materialize every result set into a [`DataTable`]; a command that
//! returns several result sets produces a [`DataSet`].

use serde_json::{Map, Value as JsonValue};

use super::value::{SqlType, SqlValue};

/// Column metadata for a result table.
#[derive(Debug, Clone, PartialEq)]
pub struct DataColumn {
    /// Column name as reported by the data source.
    pub name: String,

    /// Declared kind of the column.
    pub sql_type: SqlType,
}

impl DataColumn {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
        }
    }
}

/// One result set: ordered columns and ordered rows of cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    /// Table name (empty for anonymous result sets).
    pub name: String,

    /// Column metadata in result order.
    pub columns: Vec<DataColumn>,

    /// Rows; each row has exactly one cell per column.
    pub rows: Vec<Vec<SqlValue>>,
}

impl DataTable {
    /// Create an empty table with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder-style column declaration.
    pub fn with_column(mut self, name: impl Into<String>, sql_type: SqlType) -> Self {
        self.columns.push(DataColumn::new(name, sql_type));
        self
    }

    /// Builder-style row append; see [`DataTable::push_row`].
    pub fn with_row(mut self, row: Vec<SqlValue>) -> Self {
        self.push_row(row);
        self
    }

    /// Append a row, padding missing cells with typed NULLs and dropping
    /// surplus cells so the row always matches the column count.
    pub fn push_row(&mut self, mut row: Vec<SqlValue>) {
        if row.len() > self.columns.len() {
            row.truncate(self.columns.len());
        }
        for column in &self.columns[row.len()..] {
            row.push(SqlValue::Null(column.sql_type));
        }
        self.rows.push(row);
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, compared case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Cell at (row, column).
    pub fn cell(&self, row: usize, column: usize) -> Option<&SqlValue> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    /// Encode the rows as a JSON array of objects keyed by column name.
    ///
    /// Used to ship table-valued parameters to engines without a native
    /// table type.
    pub fn to_json(&self) -> JsonValue {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut obj = Map::with_capacity(self.columns.len());
                for (column, cell) in self.columns.iter().zip(row) {
                    obj.insert(column.name.clone(), cell_to_json(cell));
                }
                JsonValue::Object(obj)
            })
            .collect();
        JsonValue::Array(rows)
    }
}

fn cell_to_json(value: &SqlValue) -> JsonValue {
    match value {
        SqlValue::Null(_) => JsonValue::Null,
        SqlValue::Bool(b) => JsonValue::Bool(*b),
        SqlValue::I16(v) => JsonValue::from(*v),
        SqlValue::I32(v) => JsonValue::from(*v),
        SqlValue::I64(v) => JsonValue::from(*v),
        SqlValue::F32(v) => JsonValue::from(f64::from(*v)),
        SqlValue::F64(v) => JsonValue::from(*v),
        other => JsonValue::String(other.to_string()),
    }
}

/// Ordered collection of result tables from one command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSet {
    pub tables: Vec<DataTable>,
}

impl DataSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a single table.
    pub fn single(table: DataTable) -> Self {
        Self {
            tables: vec![table],
        }
    }

    pub fn push(&mut self, table: DataTable) {
        self.tables.push(table);
    }

    /// First table, if any result set was returned.
    pub fn first(&self) -> Option<&DataTable> {
        self.tables.first()
    }

    pub fn table(&self, index: usize) -> Option<&DataTable> {
        self.tables.get(index)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
