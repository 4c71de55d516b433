//! Microsoft SQL Server driver.
//!
//! - [`MssqlDialect`]: `EXEC` call text and identifier quoting
//! - [`MssqlConnection`]: synchronous connection over tiberius

mod connection;
mod dialect;

pub use connection::MssqlConnection;
pub use dialect::MssqlDialect;
