//! PostgreSQL driver.
//!
//! - [`PostgresDialect`]: function call text and identifier quoting
//! - [`PostgresConnection`]: synchronous connection over tokio-postgres

mod connection;
mod dialect;

pub use connection::PostgresConnection;
pub use dialect::PostgresDialect;
