//! MySQL/MariaDB driver.
//!
//! - [`MysqlDialect`]: `CALL` text with positional parameters
//! - [`MysqlConnection`]: synchronous connection over mysql_async
//!
//! # Feature Flag
//!
//! This module is only available when the `mysql` feature is enabled:
//!
//! ```toml
//! [dependencies]
//! procbind = { version = "0.3", features = ["mysql"] }
//! ```

mod connection;
mod dialect;

pub use connection::MysqlConnection;
pub use dialect::MysqlDialect;
