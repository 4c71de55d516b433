//! Row sources: indexed cell access over one tabular result.

use std::collections::HashMap;

use crate::core::{DataTable, SqlValue};
use crate::error::{DataAccessError, Result};

/// Column lookup and cell access over one tabular result.
pub trait RowSource {
    /// Upper-cased column name to zero-based column index.
    fn column_map(&self) -> &HashMap<String, usize>;

    /// The entries of [`column_map`](RowSource::column_map) in column order.
    fn ordered_columns(&self) -> &[(String, usize)];

    fn row_count(&self) -> usize;

    /// Whether the cell at (row, column) is NULL.
    fn is_null(&self, row: usize, column: usize) -> Result<bool>;

    /// Raw cell value.
    fn value(&self, row: usize, column: usize) -> Result<&SqlValue>;

    /// Best-effort date extraction: the temporal cell value, or `None` when
    /// the cell does not hold a date.
    fn date(&self, row: usize, column: usize) -> Result<Option<SqlValue>>;
}

/// [`RowSource`] over an in-memory [`DataTable`].
#[derive(Debug)]
pub struct DataTableSource<'a> {
    table: &'a DataTable,
    columns: HashMap<String, usize>,
    ordered: Vec<(String, usize)>,
}

impl<'a> DataTableSource<'a> {
    /// Wrap a table, building its column map.
    ///
    /// When two columns normalize to the same name the first one is kept.
    pub fn new(table: &'a DataTable) -> Self {
        let mut columns = HashMap::with_capacity(table.columns.len());
        let mut ordered = Vec::with_capacity(table.columns.len());
        for (index, column) in table.columns.iter().enumerate() {
            let name = column.name.to_uppercase();
            if !columns.contains_key(&name) {
                columns.insert(name.clone(), index);
                ordered.push((name, index));
            }
        }
        Self {
            table,
            columns,
            ordered,
        }
    }

    pub fn table(&self) -> &'a DataTable {
        self.table
    }

    fn cell(&self, row: usize, column: usize) -> Result<&'a SqlValue> {
        let cells = self.table.rows.get(row).ok_or(DataAccessError::RowOutOfRange {
            row,
            count: self.table.rows.len(),
        })?;
        cells.get(column).ok_or(DataAccessError::ColumnOutOfRange {
            column,
            count: self.table.columns.len(),
        })
    }
}

impl RowSource for DataTableSource<'_> {
    fn column_map(&self) -> &HashMap<String, usize> {
        &self.columns
    }

    fn ordered_columns(&self) -> &[(String, usize)] {
        &self.ordered
    }

    fn row_count(&self) -> usize {
        self.table.rows.len()
    }

    fn is_null(&self, row: usize, column: usize) -> Result<bool> {
        Ok(self.cell(row, column)?.is_null())
    }

    fn value(&self, row: usize, column: usize) -> Result<&SqlValue> {
        self.cell(row, column)
    }

    fn date(&self, row: usize, column: usize) -> Result<Option<SqlValue>> {
        let value = self.cell(row, column)?;
        Ok(value.is_temporal().then(|| value.clone()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::core::SqlType;

    fn table() -> DataTable {
        let created = NaiveDate::from_ymd_opt(2021, 6, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        DataTable::new("t")
            .with_column("Name", SqlType::String)
            .with_column("NAME", SqlType::String)
            .with_column("Created", SqlType::DateTime)
            .with_row(vec![
                SqlValue::from("first"),
                SqlValue::Null(SqlType::String),
                SqlValue::DateTime(created),
            ])
    }

    #[test]
    fn test_column_map_is_upper_cased_first_wins() {
        let table = table();
        let source = DataTableSource::new(&table);
        assert_eq!(source.column_map().get("NAME"), Some(&0));
        assert_eq!(source.column_map().get("CREATED"), Some(&2));
        assert_eq!(source.column_map().len(), 2);
        assert_eq!(
            source.ordered_columns(),
            &[("NAME".to_string(), 0), ("CREATED".to_string(), 2)]
        );
    }

    #[test]
    fn test_out_of_range_access_is_an_error() {
        let table = table();
        let source = DataTableSource::new(&table);
        assert!(matches!(
            source.value(1, 0),
            Err(DataAccessError::RowOutOfRange { row: 1, count: 1 })
        ));
        assert!(matches!(
            source.is_null(0, 9),
            Err(DataAccessError::ColumnOutOfRange { column: 9, count: 3 })
        ));
    }

    #[test]
    fn test_date_only_for_temporal_cells() {
        let table = table();
        let source = DataTableSource::new(&table);
        assert!(source.is_null(0, 1).unwrap());
        assert!(source.date(0, 0).unwrap().is_none());
        assert!(matches!(source.date(0, 2).unwrap(), Some(SqlValue::DateTime(_))));
    }
}
