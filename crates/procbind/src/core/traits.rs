//! Core traits for database-agnostic command dispatch.
//!
//! This module defines the capabilities every driver implements:
//!
//! - [`Dialect`]: how a procedure call is spelled for the engine
//! - [`Connection`]: open/close, execute a [`Command`], fill a [`DataSet`],
//!   and drive a single transaction
//!
//! Commands carry their parameters already bound to native values (see
//! [`crate::params::bind`]), so drivers only translate [`SqlValue`]s to their
//! wire types.

use std::time::Duration;

use crate::drivers::common::split_qualified;
use crate::error::{DataAccessError, Result};
use crate::params::DbType;

use super::table::DataSet;
use super::value::SqlValue;

/// Default command timeout in seconds.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// What the command text names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Text is a stored procedure name; parameters are passed by name.
    StoredProcedure,
    /// Text is raw SQL sent as-is.
    Text,
}

/// A parameter after outbound binding.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParam {
    /// Parameter name including any leading `@`.
    pub name: String,
    /// Declared database type.
    pub db_type: DbType,
    /// Declared size (0 when unspecified).
    pub size: u32,
    /// Declared precision (0 when unspecified).
    pub precision: u8,
    /// Native value to send; typed NULL when nothing was supplied.
    pub value: SqlValue,
    /// Structured type name for table-valued parameters.
    pub type_name: Option<String>,
}

impl BoundParam {
    /// Name without the leading `@` marker.
    pub fn bare_name(&self) -> &str {
        self.name.trim_start_matches('@')
    }
}

/// One unit of work sent to a connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub kind: CommandKind,
    pub text: String,
    pub params: Vec<BoundParam>,
    pub timeout: Duration,
}

impl Command {
    /// Stored procedure call with bound parameters.
    pub fn procedure(name: impl Into<String>, params: Vec<BoundParam>) -> Self {
        Self {
            kind: CommandKind::StoredProcedure,
            text: name.into(),
            params,
            timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
        }
    }

    /// Raw SQL text without parameters.
    pub fn text(sql: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::Text,
            text: sql.into(),
            params: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
        }
    }

    /// Builder-style timeout override.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_procedure(&self) -> bool {
        self.kind == CommandKind::StoredProcedure
    }
}

/// SQL text strategy for calling stored procedures on one engine.
pub trait Dialect: Send + Sync {
    /// Get the dialect name (e.g., "mssql", "postgres").
    fn name(&self) -> &str;

    /// Quote a single identifier part.
    fn quote_ident(&self, name: &str) -> String;

    /// Placeholder for the 1-based parameter `index`.
    fn param_placeholder(&self, index: usize) -> String;

    /// Quote a possibly qualified procedure name.
    fn qualify(&self, procedure: &str) -> Result<String> {
        let parts = split_qualified(procedure);
        if parts.is_empty() {
            return Err(DataAccessError::command(
                "procedure name is empty",
                "building procedure call",
            ));
        }
        Ok(parts
            .iter()
            .map(|p| self.quote_ident(p))
            .collect::<Vec<_>>()
            .join("."))
    }

    /// Statement returning the procedure's result sets.
    fn build_call(&self, procedure: &str, params: &[BoundParam]) -> Result<String>;

    /// Statement whose single result cell is the procedure's return value.
    fn build_return_value_call(&self, procedure: &str, params: &[BoundParam]) -> Result<String>;

    /// Statement executing the procedure for its side effects.
    fn build_execute(&self, procedure: &str, params: &[BoundParam]) -> Result<String> {
        self.build_call(procedure, params)
    }

    /// Statement that reads back the identity generated by the last insert.
    fn identity_query(&self) -> &'static str;
}

/// Reject parameter names that cannot be spliced into call text.
pub fn check_param_name(param: &BoundParam) -> Result<&str> {
    let name = param.bare_name();
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(name)
    } else {
        Err(DataAccessError::command(
            format!("invalid parameter name '{}'", param.name),
            "building procedure call",
        ))
    }
}

/// A synchronous relational connection.
///
/// One connection carries at most one open transaction. Implementations
/// must leave the connection usable after a failed command; the caller
/// decides whether to roll back or close.
pub trait Connection: Send {
    /// Get the database type identifier (e.g., "mssql", "postgres").
    fn db_type(&self) -> &str;

    /// Whether `open` has succeeded and `close` has not been called since.
    fn is_open(&self) -> bool;

    /// Open the connection. Opening an open connection is a no-op.
    fn open(&mut self) -> Result<()>;

    /// Close the connection. Closing a closed connection is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Execute the command and collect every result set.
    fn fill(&mut self, command: &Command) -> Result<DataSet>;

    /// Execute the command and return the number of affected rows.
    fn execute_non_query(&mut self, command: &Command) -> Result<u64>;

    /// Execute a stored procedure and return its integer return value.
    fn execute_return_value(&mut self, command: &Command) -> Result<i64>;

    /// Execute the command and return the first cell of the first result.
    fn execute_scalar(&mut self, command: &Command) -> Result<Option<SqlValue>> {
        let set = self.fill(command)?;
        Ok(set
            .tables
            .into_iter()
            .next()
            .and_then(|t| t.rows.into_iter().next())
            .and_then(|r| r.into_iter().next()))
    }

    /// Begin a transaction on the open connection.
    fn begin_transaction(&mut self) -> Result<()>;

    /// Commit the open transaction.
    fn commit(&mut self) -> Result<()>;

    /// Roll back the open transaction.
    fn rollback(&mut self) -> Result<()>;

    /// Statement that reads back the identity generated by the last insert.
    fn identity_query(&self) -> &'static str;

    /// Run an insert and read back the generated identity.
    ///
    /// The default issues the insert and then [`Connection::identity_query`]
    /// on the same connection. Drivers whose identity function is scoped to
    /// a batch send both in one round trip instead.
    fn execute_identity(&mut self, command: &Command) -> Result<Option<SqlValue>> {
        self.execute_non_query(command)?;
        let identity = Command::text(self.identity_query()).with_timeout(command.timeout);
        self.execute_scalar(&identity)
    }
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn db_type(&self) -> &str {
        (**self).db_type()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn fill(&mut self, command: &Command) -> Result<DataSet> {
        (**self).fill(command)
    }

    fn execute_non_query(&mut self, command: &Command) -> Result<u64> {
        (**self).execute_non_query(command)
    }

    fn execute_return_value(&mut self, command: &Command) -> Result<i64> {
        (**self).execute_return_value(command)
    }

    fn execute_scalar(&mut self, command: &Command) -> Result<Option<SqlValue>> {
        (**self).execute_scalar(command)
    }

    fn begin_transaction(&mut self) -> Result<()> {
        (**self).begin_transaction()
    }

    fn commit(&mut self) -> Result<()> {
        (**self).commit()
    }

    fn rollback(&mut self) -> Result<()> {
        (**self).rollback()
    }

    fn identity_query(&self) -> &'static str {
        (**self).identity_query()
    }

    fn execute_identity(&mut self, command: &Command) -> Result<Option<SqlValue>> {
        (**self).execute_identity(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_defaults_to_thirty_seconds() {
        let cmd = Command::procedure("dbo.GetUsers", Vec::new());
        assert!(cmd.is_procedure());
        assert_eq!(cmd.timeout, Duration::from_secs(30));

        let cmd = Command::text("select 1").with_timeout(Duration::from_secs(5));
        assert_eq!(cmd.kind, CommandKind::Text);
        assert_eq!(cmd.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_bare_name_strips_marker() {
        let param = BoundParam {
            name: "@UserId".to_string(),
            db_type: DbType::Int,
            size: 0,
            precision: 0,
            value: SqlValue::I32(4),
            type_name: None,
        };
        assert_eq!(param.bare_name(), "UserId");
        assert_eq!(check_param_name(&param).unwrap(), "UserId");
    }

    #[test]
    fn test_check_param_name_rejects_injection() {
        let mut param = BoundParam {
            name: "@x; DROP TABLE t".to_string(),
            db_type: DbType::Int,
            size: 0,
            precision: 0,
            value: SqlValue::Null(crate::core::SqlType::I32),
            type_name: None,
        };
        assert!(check_param_name(&param).is_err());
        param.name = "@1abc".to_string();
        assert!(check_param_name(&param).is_err());
        param.name = "@".to_string();
        assert!(check_param_name(&param).is_err());
    }
}
