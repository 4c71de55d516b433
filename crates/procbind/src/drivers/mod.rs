//! Database driver implementations.
//!
//! This module provides database-specific implementations of the core traits:
//!
//! - [`mssql`]: Microsoft SQL Server driver
//! - [`postgres`]: PostgreSQL driver
//! - [`mysql`]: MySQL/MariaDB driver (feature `mysql`)
//! - [`memory`]: scripted in-memory driver
//! - [`common`]: Shared utilities (TLS, blocking runtime, name parsing)
//!
//! # Architecture
//!
//! Each network driver module implements:
//! - `Dialect`: how a procedure call is spelled for the engine
//! - `Connection`: a synchronous connection that owns its own runtime
//!
//! [`ConnectionImpl`] wraps the concrete connections in an enum so the
//! dispatcher can be generic over one type chosen at configuration time.

pub mod common;
pub mod memory;
pub mod mssql;
#[cfg(feature = "mysql")]
pub mod mysql;
pub mod postgres;

pub use common::{SslMode, TlsBuilder};
pub use memory::{MemoryConnection, MemoryHandle};
pub use mssql::{MssqlConnection, MssqlDialect};
#[cfg(feature = "mysql")]
pub use mysql::{MysqlConnection, MysqlDialect};
pub use postgres::{PostgresConnection, PostgresDialect};

use tracing::debug;

use crate::config::{ConnectionConfig, DriverKind};
use crate::core::traits::{Command, Connection};
use crate::core::{DataSet, SqlValue};
use crate::error::Result;

/// Enum-based static dispatch over the supported connections.
///
/// Note: We use a manual impl instead of a trait object so the dispatcher
/// stays `Sized` and match arms can be feature-gated.
pub enum ConnectionImpl {
    Mssql(MssqlConnection),
    Postgres(PostgresConnection),
    #[cfg(feature = "mysql")]
    Mysql(MysqlConnection),
    Memory(MemoryConnection),
}

macro_rules! dispatch {
    ($self:expr, $conn:ident => $body:expr) => {
        match $self {
            ConnectionImpl::Mssql($conn) => $body,
            ConnectionImpl::Postgres($conn) => $body,
            #[cfg(feature = "mysql")]
            ConnectionImpl::Mysql($conn) => $body,
            ConnectionImpl::Memory($conn) => $body,
        }
    };
}

impl Connection for ConnectionImpl {
    fn db_type(&self) -> &str {
        dispatch!(self, c => c.db_type())
    }

    fn is_open(&self) -> bool {
        dispatch!(self, c => c.is_open())
    }

    fn open(&mut self) -> Result<()> {
        dispatch!(self, c => c.open())
    }

    fn close(&mut self) -> Result<()> {
        dispatch!(self, c => c.close())
    }

    fn fill(&mut self, command: &Command) -> Result<DataSet> {
        dispatch!(self, c => c.fill(command))
    }

    fn execute_non_query(&mut self, command: &Command) -> Result<u64> {
        dispatch!(self, c => c.execute_non_query(command))
    }

    fn execute_return_value(&mut self, command: &Command) -> Result<i64> {
        dispatch!(self, c => c.execute_return_value(command))
    }

    fn execute_scalar(&mut self, command: &Command) -> Result<Option<SqlValue>> {
        dispatch!(self, c => c.execute_scalar(command))
    }

    fn begin_transaction(&mut self) -> Result<()> {
        dispatch!(self, c => c.begin_transaction())
    }

    fn commit(&mut self) -> Result<()> {
        dispatch!(self, c => c.commit())
    }

    fn rollback(&mut self) -> Result<()> {
        dispatch!(self, c => c.rollback())
    }

    fn identity_query(&self) -> &'static str {
        dispatch!(self, c => c.identity_query())
    }

    fn execute_identity(&mut self, command: &Command) -> Result<Option<SqlValue>> {
        dispatch!(self, c => c.execute_identity(command))
    }
}

impl ConnectionImpl {
    /// Scripting handle when this is the in-memory driver.
    pub fn memory_handle(&self) -> Option<MemoryHandle> {
        match self {
            ConnectionImpl::Memory(c) => Some(c.handle()),
            _ => None,
        }
    }
}

/// Build a closed connection for `config`.
pub fn connect(config: &ConnectionConfig) -> Result<ConnectionImpl> {
    let kind = config.kind()?;
    debug!(driver = ?kind, host = %config.host, "creating connection");
    match kind {
        DriverKind::Mssql => Ok(ConnectionImpl::Mssql(MssqlConnection::new(config.clone())?)),
        DriverKind::Postgres => Ok(ConnectionImpl::Postgres(PostgresConnection::new(
            config.clone(),
        )?)),
        #[cfg(feature = "mysql")]
        DriverKind::Mysql => Ok(ConnectionImpl::Mysql(MysqlConnection::new(config.clone())?)),
        #[cfg(not(feature = "mysql"))]
        DriverKind::Mysql => Err(crate::error::DataAccessError::Config(
            "MySQL support requires the 'mysql' feature".to_string(),
        )),
        DriverKind::Memory => Ok(ConnectionImpl::Memory(MemoryConnection::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DataAccessError;

    #[test]
    fn test_connect_memory() {
        let conn = connect(&ConnectionConfig::memory()).unwrap();
        assert_eq!(conn.db_type(), "memory");
        assert!(!conn.is_open());
        assert!(conn.memory_handle().is_some());
    }

    #[test]
    fn test_connect_builds_closed_network_connections() {
        let mut config = ConnectionConfig::memory();
        config.r#type = "postgres".into();
        config.host = "localhost".into();
        let conn = connect(&config).unwrap();
        assert_eq!(conn.db_type(), "postgres");
        assert!(!conn.is_open());
        assert_eq!(conn.identity_query(), "SELECT lastval()");

        config.r#type = "mssql".into();
        let conn = connect(&config).unwrap();
        assert_eq!(conn.identity_query(), "SELECT SCOPE_IDENTITY()");
    }

    #[test]
    fn test_connect_rejects_unknown_driver() {
        let mut config = ConnectionConfig::memory();
        config.r#type = "oracle".into();
        assert!(connect(&config).is_err());
    }

    #[cfg(not(feature = "mysql"))]
    #[test]
    fn test_mysql_requires_feature() {
        let mut config = ConnectionConfig::memory();
        config.r#type = "mysql".into();
        assert!(matches!(connect(&config), Err(DataAccessError::Config(_))));
    }
}
