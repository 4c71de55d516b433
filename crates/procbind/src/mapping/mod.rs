//! Object mapping: rows of a tabular result into typed structs.
//!
//! A type declares its bindings once with [`data_bindings!`](crate::data_bindings).
//! The declarations become a [`PropertyMap`] (cached per type), a
//! [`RowSource`] exposes the cells, and the [`RowMapper`] converts each cell
//! into its field through [`FieldValue`].
//!
//! ```
//! use procbind::core::{DataTable, SqlType, SqlValue};
//! use procbind::data_bindings;
//! use procbind::mapping::MappingService;
//!
//! #[derive(Debug, Default)]
//! struct Person {
//!     name: String,
//!     age: Option<i32>,
//! }
//!
//! data_bindings!(Person { name => "Name", age => "Age" });
//!
//! let table = DataTable::new("people")
//!     .with_column("name", SqlType::String)
//!     .with_column("age", SqlType::I32)
//!     .with_row(vec![SqlValue::from("Ada"), SqlValue::Null(SqlType::I32)]);
//!
//! let people: Vec<Person> = MappingService::map_table(Some(&table)).unwrap();
//! assert_eq!(people[0].name, "Ada");
//! assert_eq!(people[0].age, None);
//! ```

pub mod binding;
pub mod field;
pub mod mapper;
pub mod property_map;
pub mod row_source;

pub use binding::{AssignFn, Binding, DataBound};
pub use field::{DbEnum, FieldValue, Json};
pub use mapper::{is_json_document, Cell, MappingService, RowMapper};
pub use property_map::PropertyMap;
pub use row_source::{DataTableSource, RowSource};
