//! Connection and transaction owner.

use std::time::Duration;

use tracing::{debug, warn};

use crate::core::traits::{Command, Connection, DEFAULT_COMMAND_TIMEOUT_SECS};
use crate::core::DataSet;
use crate::error::{DataAccessError, Result};
use crate::logging::Logger;
use crate::params::{bind_all, ParameterContainer};

/// Owns one connection and at most one open transaction.
///
/// Every operation opens the connection on demand and closes it again
/// afterwards, unless a transaction is open. A failure inside an open
/// transaction rolls it back before the error is returned.
///
/// Not meant to be shared across threads; give each worker its own session.
pub struct Session<C: Connection> {
    conn: C,
    in_transaction: bool,
    command_timeout: Duration,
    logger: Logger,
}

impl<C: Connection> Session<C> {
    /// Session over `conn` logging to the current dispatcher.
    pub fn new(conn: C) -> Self {
        Self::with_logger(conn, Logger::current())
    }

    pub fn with_logger(conn: C, logger: Logger) -> Self {
        Self {
            conn,
            in_transaction: false,
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            logger,
        }
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn set_logger(&mut self, logger: Logger) {
        self.logger = logger;
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Set the per-command timeout; values below one second reset it to the
    /// default of 30 seconds.
    pub fn set_command_timeout(&mut self, secs: i64) {
        let secs = match u64::try_from(secs) {
            Ok(s) if s >= 1 => s,
            _ => DEFAULT_COMMAND_TIMEOUT_SECS,
        };
        self.command_timeout = Duration::from_secs(secs);
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Run a stored procedure and collect its result sets.
    pub fn get_data(&mut self, procedure: &str, container: &ParameterContainer) -> Result<DataSet> {
        self.run(|s| {
            let command = s.procedure(procedure, container)?;
            s.conn.fill(&command)
        })
    }

    /// Run raw SQL and collect its result sets.
    pub fn get_data_text(&mut self, sql: &str) -> Result<DataSet> {
        self.run(|s| {
            let command = s.text(sql);
            s.conn.fill(&command)
        })
    }

    /// Run a stored procedure and return its integer return value.
    pub fn update_data(&mut self, procedure: &str, container: &ParameterContainer) -> Result<i64> {
        self.run(|s| {
            let command = s.procedure(procedure, container)?;
            s.conn.execute_return_value(&command)
        })
    }

    /// Run an insert and return the identity it generated, or 0 when there
    /// is none.
    pub fn insert_raw_sql(&mut self, sql: &str) -> Result<i64> {
        self.run(|s| {
            let command = s.text(sql);
            match s.conn.execute_identity(&command)? {
                None => Ok(0),
                Some(v) if v.is_null() || v.to_string().trim().is_empty() => Ok(0),
                Some(v) => v.to_i64(),
            }
        })
    }

    /// Run raw SQL and return the number of affected rows.
    pub fn modify_raw_sql(&mut self, sql: &str) -> Result<u64> {
        self.run(|s| {
            let command = s.text(sql);
            s.conn.execute_non_query(&command)
        })
    }

    /// Run raw SQL that must affect exactly `expected` rows.
    ///
    /// The statement runs in its own transaction, which is rolled back when
    /// the count differs. Inside an already open transaction the statement
    /// joins it instead and a mismatch rolls the whole transaction back.
    pub fn modify_raw_sql_checked(&mut self, sql: &str, expected: u64) -> Result<u64> {
        if expected == 0 && !self.in_transaction {
            return Err(DataAccessError::InvalidExpectedCount);
        }
        self.run(|s| {
            if expected == 0 {
                return Err(DataAccessError::InvalidExpectedCount);
            }
            let owns_transaction = !s.in_transaction;
            if owns_transaction {
                s.conn.begin_transaction()?;
                s.in_transaction = true;
            }

            let command = s.text(sql);
            let actual = s.conn.execute_non_query(&command)?;
            if actual != expected {
                return Err(DataAccessError::RowCountMismatch { actual, expected });
            }

            if owns_transaction {
                s.conn.commit()?;
                s.in_transaction = false;
            }
            Ok(actual)
        })
    }

    /// Open the connection and begin a transaction. Starting while a
    /// transaction is open is a no-op.
    pub fn start_transaction(&mut self) -> Result<()> {
        let logger = self.logger.clone();
        logger.in_scope(|| {
            if self.in_transaction {
                return Ok(());
            }
            let result = self
                .conn
                .open()
                .and_then(|()| self.conn.begin_transaction());
            match result {
                Ok(()) => {
                    self.in_transaction = true;
                    debug!("transaction started");
                    Ok(())
                }
                Err(e) => {
                    self.close_quietly();
                    Err(e)
                }
            }
        })
    }

    /// Commit the open transaction and close the connection.
    pub fn end_transaction(&mut self) -> Result<()> {
        let logger = self.logger.clone();
        logger.in_scope(|| {
            if !self.in_transaction {
                return Ok(());
            }
            let result = self.conn.commit();
            self.in_transaction = false;
            match &result {
                Ok(()) => debug!("transaction committed"),
                Err(e) => warn!("commit failed: {}", e),
            }
            self.close_quietly();
            result
        })
    }

    /// Roll back the open transaction and close the connection.
    pub fn rollback_transaction(&mut self) -> Result<()> {
        let logger = self.logger.clone();
        logger.in_scope(|| {
            if !self.in_transaction {
                return Ok(());
            }
            let result = self.conn.rollback();
            self.in_transaction = false;
            debug!("transaction rolled back");
            self.close_quietly();
            result
        })
    }

    pub fn open_connection(&mut self) -> Result<()> {
        let logger = self.logger.clone();
        logger.in_scope(|| self.conn.open())
    }

    /// Close the connection. Returns `false` without closing while a
    /// transaction is open.
    pub fn close_connection(&mut self) -> Result<bool> {
        if self.in_transaction {
            return Ok(false);
        }
        let logger = self.logger.clone();
        logger.in_scope(|| self.conn.close())?;
        Ok(true)
    }

    fn procedure(&self, name: &str, container: &ParameterContainer) -> Result<Command> {
        let params = bind_all(container.parameters())?;
        debug!(procedure = name, parameters = params.len(), "calling stored procedure");
        Ok(Command::procedure(name, params).with_timeout(self.command_timeout))
    }

    fn text(&self, sql: &str) -> Command {
        debug!(sql, "running raw sql");
        Command::text(sql).with_timeout(self.command_timeout)
    }

    /// Open, run `op`, roll back on failure inside a transaction, and close
    /// unless a transaction remains open.
    fn run<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let logger = self.logger.clone();
        logger.in_scope(|| {
            let result = self.conn.open().and_then(|()| op(self));
            if result.is_err() && self.in_transaction {
                self.abort_transaction();
            }
            if !self.in_transaction {
                self.close_quietly();
            }
            result
        })
    }

    fn abort_transaction(&mut self) {
        if let Err(e) = self.conn.rollback() {
            warn!("rollback failed: {}", e);
        } else {
            debug!("transaction rolled back after failure");
        }
        self.in_transaction = false;
    }

    fn close_quietly(&mut self) {
        if let Err(e) = self.conn.close() {
            warn!("closing connection failed: {}", e);
        }
    }
}

impl<C: Connection> std::fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("db_type", &self.conn.db_type())
            .field("in_transaction", &self.in_transaction)
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DataTable, SqlType, SqlValue};
    use crate::drivers::memory::{Event, MemoryConnection, MemoryHandle, Response};
    use crate::params::DbType;

    fn session() -> (Session<MemoryConnection>, MemoryHandle) {
        let conn = MemoryConnection::new();
        let handle = conn.handle();
        (Session::with_logger(conn, Logger::disabled()), handle)
    }

    #[test]
    fn test_set_command_timeout_resets_small_values() {
        let (mut s, _) = session();
        s.set_command_timeout(5);
        assert_eq!(s.command_timeout(), Duration::from_secs(5));
        s.set_command_timeout(0);
        assert_eq!(s.command_timeout(), Duration::from_secs(30));
        s.set_command_timeout(-4);
        assert_eq!(s.command_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_get_data_closes_connection() {
        let (mut s, handle) = session();
        handle.push(Response::Data(DataSet::single(
            DataTable::new("Table")
                .with_column("Id", SqlType::I32)
                .with_row(vec![SqlValue::I32(1)]),
        )));
        let mut container = ParameterContainer::new();
        container.add_value("@Id", DbType::Int, "1");

        let set = s.get_data("dbo.GetUser", &container).unwrap();
        assert_eq!(set.first().unwrap().row_count(), 1);
        assert!(!handle.is_open());

        let commands = handle.commands();
        assert_eq!(commands[0].params[0].value, SqlValue::I32(1));
        assert_eq!(commands[0].timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_transaction_keeps_connection_open() {
        let (mut s, handle) = session();
        s.start_transaction().unwrap();
        handle.push(Response::ReturnValue(5));
        assert_eq!(s.update_data("dbo.Save", &ParameterContainer::new()).unwrap(), 5);
        assert!(handle.is_open());
        assert!(!s.close_connection().unwrap());
        assert!(handle.is_open());

        s.end_transaction().unwrap();
        assert!(!handle.is_open());
        assert_eq!(handle.count(&Event::Commit), 1);
    }

    #[test]
    fn test_failure_inside_transaction_rolls_back() {
        let (mut s, handle) = session();
        s.start_transaction().unwrap();
        handle.push(Response::Fail("constraint violation".into()));
        let err = s.modify_raw_sql("delete from t").unwrap_err();
        assert_eq!(err.to_string(), "constraint violation");
        assert!(!s.in_transaction());
        assert_eq!(handle.count(&Event::Rollback), 1);
        assert!(!handle.is_open());
    }

    #[test]
    fn test_checked_modify_commits_on_match() {
        let (mut s, handle) = session();
        handle.push(Response::Affected(2));
        assert_eq!(s.modify_raw_sql_checked("update t set x = 1", 2).unwrap(), 2);
        assert_eq!(
            handle.events().into_iter().filter(|e| !matches!(e, Event::Execute(_))).collect::<Vec<_>>(),
            vec![Event::Open, Event::Begin, Event::Commit, Event::Close]
        );
    }

    #[test]
    fn test_checked_modify_rolls_back_on_mismatch() {
        let (mut s, handle) = session();
        handle.push(Response::Affected(3));
        let err = s.modify_raw_sql_checked("update t set x = 1", 1).unwrap_err();
        assert_eq!(
            err.to_string(),
            "The number of records to be updated is: 3, but the desired number of records to modify was: 1.  Transaction is rolled back."
        );
        assert_eq!(handle.count(&Event::Rollback), 1);
        assert!(!handle.is_open());
    }

    #[test]
    fn test_checked_modify_rejects_zero_expected() {
        let (mut s, handle) = session();
        assert!(matches!(
            s.modify_raw_sql_checked("update t set x = 1", 0),
            Err(DataAccessError::InvalidExpectedCount)
        ));
        assert!(handle.events().is_empty());
    }

    #[test]
    fn test_insert_raw_sql_reads_identity() {
        let (mut s, handle) = session();
        handle
            .push(Response::Affected(1))
            .push(Response::Scalar(Some(SqlValue::Decimal(rust_decimal::Decimal::from(17)))));
        assert_eq!(s.insert_raw_sql("insert into t values (1)").unwrap(), 17);

        handle
            .push(Response::Affected(1))
            .push(Response::Scalar(Some(SqlValue::Null(SqlType::Decimal))));
        assert_eq!(s.insert_raw_sql("insert into t values (2)").unwrap(), 0);
    }

    #[test]
    fn test_open_failure_is_reported() {
        let (mut s, handle) = session();
        handle.fail_open("login failed");
        let err = s.get_data_text("select 1").unwrap_err();
        assert_eq!(err.to_string(), "Unable to open the connection: login failed");
        assert!(handle.commands().is_empty());
    }
}
