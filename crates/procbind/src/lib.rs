//! # procbind
//!
//! Stored-procedure data access for SQL Server, PostgreSQL and MySQL.
//!
//! This library provides:
//!
//! - **Object mapping** from tabular results into typed structs, driven by
//!   per-type field bindings with JSON fallback for text columns
//! - **Parameter containers** that bind loosely typed call parameters into
//!   native values under an explicit null policy
//! - **A dispatcher** that opens, runs and closes per call, with optional
//!   transactions and row-count-checked raw SQL
//! - **Security-token gating** for modifying calls
//!
//! ## Example
//!
//! ```rust,no_run
//! use procbind::{data_bindings, Config, DataAccess};
//! use procbind::params::{DbType, Parameter};
//!
//! #[derive(Debug, Default)]
//! struct User {
//!     id: i32,
//!     name: String,
//! }
//!
//! data_bindings!(User { id => "Id", name => "Name" });
//!
//! fn main() -> procbind::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let mut access = DataAccess::from_config(&config)?;
//!
//!     let result = access.get_data("dbo.GetUsers", &[Parameter::value("@Active", DbType::Bit, "1")]);
//!     let users: Vec<User> = result.map_first_table()?;
//!     println!("{} users", users.len());
//!     Ok(())
//! }
//! ```

pub mod access;
pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod logging;
pub mod mapping;
pub mod params;
pub mod security;

// Re-exports for convenience
pub use access::{DataAccess, DataSetResult, ModifyResult, Session};
pub use config::{AccessConfig, Config, ConnectionConfig, SecurityConfig};
pub use crate::core::{DataSet, DataTable, SqlType, SqlValue};
pub use drivers::{connect, ConnectionImpl};
pub use error::{DataAccessError, Result};
pub use logging::{init_logging, Logger};
pub use mapping::{DataBound, Json, MappingService};
pub use params::{DbType, NullPolicy, Parameter, ParameterContainer};
pub use security::{DailyTokenValidator, TokenValidator};
