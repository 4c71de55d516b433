//! Core abstractions shared by the mapper, the dispatcher and the drivers.
//!
//! - [`value`]: SQL value representation and scalar coercions
//! - [`table`]: materialized result tables and table sets
//! - [`traits`]: the [`Connection`] and [`Dialect`] capabilities and the
//!   [`Command`] they execute

pub mod table;
pub mod traits;
pub mod value;

// Re-export commonly used types for convenience
pub use table::{DataColumn, DataSet, DataTable};
pub use traits::{
    check_param_name, BoundParam, Command, CommandKind, Connection, Dialect,
    DEFAULT_COMMAND_TIMEOUT_SECS,
};
pub use value::{SqlType, SqlValue};
