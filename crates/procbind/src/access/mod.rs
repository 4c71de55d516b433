//! Data-access facade.
//!
//! [`DataAccess`] is what callers use: it prepares parameters under a
//! [`NullPolicy`], gates modifying calls behind the security token, and
//! never returns an error directly. Outcomes come back in envelopes,
//! [`DataSetResult`] for reads and [`ModifyResult`] for writes, whose
//! `error` text is empty on success.
//!
//! ```
//! use procbind::access::DataAccess;
//! use procbind::drivers::memory::{MemoryConnection, Response};
//! use procbind::params::{DbType, Parameter};
//!
//! let conn = MemoryConnection::new();
//! conn.handle().push(Response::ReturnValue(1));
//!
//! let mut access = DataAccess::new(conn);
//! let params = [Parameter::value("@Id", DbType::Int, "7")];
//! let result = access.modify_data("dbo.TouchUser", &params);
//! assert_eq!(result.result, 1);
//! assert!(result.is_ok());
//! ```

mod session;

pub use session::Session;

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::core::traits::Connection;
use crate::core::{DataSet, DataTable};
use crate::drivers::{self, ConnectionImpl};
use crate::error::{DataAccessError, Result};
use crate::logging::Logger;
use crate::mapping::{DataBound, MappingService};
use crate::params::{NullPolicy, Parameter, ParameterContainer};
use crate::security::{DailyTokenValidator, DenyAll, TokenValidator};

/// Outcome of a read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSetResult {
    /// Result sets; `None` whenever `error` is set.
    pub data: Option<DataSet>,
    /// Failure text, empty on success.
    pub error: String,
}

impl DataSetResult {
    pub fn success(data: DataSet) -> Self {
        Self {
            data: Some(data),
            error: String::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            data: None,
            error: error.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_empty()
    }

    pub fn first_table(&self) -> Option<&DataTable> {
        self.data.as_ref().and_then(DataSet::first)
    }

    /// Map every row of the first table.
    pub fn map_first_table<T: DataBound>(&self) -> Result<Vec<T>> {
        MappingService::map_table(self.first_table())
    }

    /// Map the first row of the first table, or `T::default()` when empty.
    pub fn map_first_row<T: DataBound>(&self) -> Result<T> {
        MappingService::map_first_row(self.first_table())
    }
}

/// Outcome of a modifying call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifyResult {
    /// Return value, affected rows or generated identity; never positive
    /// when `error` is set.
    pub result: i64,
    /// Failure text, empty on success.
    pub error: String,
}

impl ModifyResult {
    pub fn success(result: i64) -> Self {
        Self {
            result,
            error: String::new(),
        }
    }

    pub fn failure(result: i64, error: impl Into<String>) -> Self {
        Self {
            result: result.min(0),
            error: error.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_empty()
    }
}

/// Stored-procedure dispatcher over one [`Session`].
pub struct DataAccess<C: Connection = ConnectionImpl> {
    session: Session<C>,
    logger: Logger,
    validator: Arc<dyn TokenValidator>,
}

impl DataAccess<ConnectionImpl> {
    /// Build a dispatcher from configuration.
    ///
    /// Without a `security` section every secured call is rejected.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let conn = drivers::connect(&config.connection)?;
        let validator: Arc<dyn TokenValidator> = match &config.security {
            Some(security) => Arc::new(DailyTokenValidator::from_config(security)?),
            None => Arc::new(DenyAll),
        };
        let logger = Logger::current().with_parameter_values(config.access.log_parameter_values);

        let mut access = Self::with_logger(conn, logger);
        access.validator = validator;
        access.set_command_timeout(
            i64::try_from(config.access.command_timeout_secs).unwrap_or(i64::MAX),
        );
        info!(
            driver = access.session.connection().db_type(),
            timeout_secs = access.command_timeout_secs(),
            "data access ready"
        );
        Ok(access)
    }
}

impl<C: Connection> DataAccess<C> {
    /// Dispatcher logging to the current dispatcher. Secured calls are
    /// rejected until a validator is installed.
    pub fn new(conn: C) -> Self {
        Self::with_logger(conn, Logger::current())
    }

    pub fn with_logger(conn: C, logger: Logger) -> Self {
        Self {
            session: Session::with_logger(conn, logger.clone()),
            logger,
            validator: Arc::new(DenyAll),
        }
    }

    /// Replace the security token validator.
    pub fn with_validator(mut self, validator: impl TokenValidator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn session(&self) -> &Session<C> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session<C> {
        &mut self.session
    }

    pub fn command_timeout_secs(&self) -> u64 {
        self.session.command_timeout().as_secs()
    }

    /// Values below one second reset the timeout to 30 seconds.
    pub fn set_command_timeout(&mut self, secs: i64) {
        self.session.set_command_timeout(secs);
    }

    // ===== Reads =====

    /// Call a stored procedure, leaving out parameters without a value.
    pub fn get_data(&mut self, procedure: &str, parameters: &[Parameter]) -> DataSetResult {
        self.read(procedure, parameters, NullPolicy::Omit)
    }

    /// Call a stored procedure, sending NULL for parameters without a value.
    pub fn get_data_keep_nulls(&mut self, procedure: &str, parameters: &[Parameter]) -> DataSetResult {
        self.read(procedure, parameters, NullPolicy::KeepAsNull)
    }

    /// Run raw SQL and return its result sets.
    pub fn get_data_text(&mut self, sql: &str) -> DataSetResult {
        match self.session.get_data_text(sql) {
            Ok(set) => DataSetResult::success(set),
            Err(e) => {
                self.logger.call_failed(sql, &[], &e);
                DataSetResult::failure(e.to_string())
            }
        }
    }

    // ===== Modifying calls =====

    /// Call a stored procedure and return its return value.
    ///
    /// A failure yields result 0 with the error text set.
    pub fn modify_data(&mut self, procedure: &str, parameters: &[Parameter]) -> ModifyResult {
        self.modify(procedure, parameters, NullPolicy::Omit)
    }

    pub fn modify_data_keep_nulls(&mut self, procedure: &str, parameters: &[Parameter]) -> ModifyResult {
        self.modify(procedure, parameters, NullPolicy::KeepAsNull)
    }

    /// [`modify_data`](Self::modify_data) behind the security token.
    pub fn modify_data_secured(
        &mut self,
        procedure: &str,
        parameters: &[Parameter],
        encrypted: &str,
        unencrypted: &str,
    ) -> ModifyResult {
        if let Err(e) = self.check_token(procedure, encrypted, unencrypted) {
            return ModifyResult::failure(0, e.to_string());
        }
        self.modify(procedure, parameters, NullPolicy::Omit)
    }

    pub fn modify_data_secured_keep_nulls(
        &mut self,
        procedure: &str,
        parameters: &[Parameter],
        encrypted: &str,
        unencrypted: &str,
    ) -> ModifyResult {
        if let Err(e) = self.check_token(procedure, encrypted, unencrypted) {
            return ModifyResult::failure(0, e.to_string());
        }
        self.modify(procedure, parameters, NullPolicy::KeepAsNull)
    }

    /// Modifying call that returns result sets, behind the security token.
    pub fn modify_data_return_table(
        &mut self,
        procedure: &str,
        parameters: &[Parameter],
        encrypted: &str,
        unencrypted: &str,
    ) -> DataSetResult {
        if let Err(e) = self.check_token(procedure, encrypted, unencrypted) {
            return DataSetResult::failure(e.to_string());
        }
        self.read(procedure, parameters, NullPolicy::Omit)
    }

    pub fn modify_data_return_table_keep_nulls(
        &mut self,
        procedure: &str,
        parameters: &[Parameter],
        encrypted: &str,
        unencrypted: &str,
    ) -> DataSetResult {
        if let Err(e) = self.check_token(procedure, encrypted, unencrypted) {
            return DataSetResult::failure(e.to_string());
        }
        self.read(procedure, parameters, NullPolicy::KeepAsNull)
    }

    pub fn insert_data(&mut self, procedure: &str, parameters: &[Parameter]) -> ModifyResult {
        self.modify_data(procedure, parameters)
    }

    pub fn update_data(&mut self, procedure: &str, parameters: &[Parameter]) -> ModifyResult {
        self.modify_data(procedure, parameters)
    }

    pub fn delete_data(&mut self, procedure: &str, parameters: &[Parameter]) -> ModifyResult {
        self.modify_data(procedure, parameters)
    }

    pub fn insert_data_secured(
        &mut self,
        procedure: &str,
        parameters: &[Parameter],
        encrypted: &str,
        unencrypted: &str,
    ) -> ModifyResult {
        self.modify_data_secured(procedure, parameters, encrypted, unencrypted)
    }

    pub fn update_data_secured(
        &mut self,
        procedure: &str,
        parameters: &[Parameter],
        encrypted: &str,
        unencrypted: &str,
    ) -> ModifyResult {
        self.modify_data_secured(procedure, parameters, encrypted, unencrypted)
    }

    pub fn delete_data_secured(
        &mut self,
        procedure: &str,
        parameters: &[Parameter],
        encrypted: &str,
        unencrypted: &str,
    ) -> ModifyResult {
        self.modify_data_secured(procedure, parameters, encrypted, unencrypted)
    }

    // ===== Raw SQL =====

    /// Run an insert and return the generated identity.
    ///
    /// 0 when the connection could not be opened or nothing was generated,
    /// -1 on any other failure.
    pub fn insert_raw_sql(&mut self, sql: &str) -> ModifyResult {
        if sql.trim().is_empty() {
            return ModifyResult::success(0);
        }
        let outcome = self.session.insert_raw_sql(sql);
        self.raw_outcome(sql, outcome)
    }

    /// Run raw SQL and return the affected row count; -1 on failure.
    pub fn modify_raw_sql(&mut self, sql: &str) -> ModifyResult {
        let outcome = self.session.modify_raw_sql(sql).and_then(rows_to_i64);
        self.raw_outcome(sql, outcome)
    }

    /// Run raw SQL that must affect exactly `expected` rows; -1 when the
    /// count differs, after the work is rolled back.
    pub fn modify_raw_sql_checked(&mut self, sql: &str, expected: u64) -> ModifyResult {
        let outcome = self
            .session
            .modify_raw_sql_checked(sql, expected)
            .and_then(rows_to_i64);
        self.raw_outcome(sql, outcome)
    }

    // ===== Transactions =====

    pub fn start_transaction(&mut self) -> Result<()> {
        self.session.start_transaction()
    }

    pub fn end_transaction(&mut self) -> Result<()> {
        self.session.end_transaction()
    }

    pub fn rollback_transaction(&mut self) -> Result<()> {
        self.session.rollback_transaction()
    }

    pub fn in_transaction(&self) -> bool {
        self.session.in_transaction()
    }

    // ===== Helpers =====

    fn read(&mut self, procedure: &str, parameters: &[Parameter], policy: NullPolicy) -> DataSetResult {
        let container = ParameterContainer::from(crate::params::prepare(parameters, policy));
        match self.session.get_data(procedure, &container) {
            Ok(set) => DataSetResult::success(set),
            Err(e) => {
                self.logger.call_failed(procedure, container.parameters(), &e);
                DataSetResult::failure(e.to_string())
            }
        }
    }

    fn modify(&mut self, procedure: &str, parameters: &[Parameter], policy: NullPolicy) -> ModifyResult {
        let container = ParameterContainer::from(crate::params::prepare(parameters, policy));
        match self.session.update_data(procedure, &container) {
            Ok(value) => ModifyResult::success(value),
            Err(e) => {
                self.logger.call_failed(procedure, container.parameters(), &e);
                ModifyResult::failure(0, e.to_string())
            }
        }
    }

    fn raw_outcome(&self, sql: &str, outcome: Result<i64>) -> ModifyResult {
        match outcome {
            Ok(value) => ModifyResult::success(value),
            Err(e) => {
                self.logger.call_failed(sql, &[], &e);
                let code = match e {
                    DataAccessError::ConnectionOpen(_) => 0,
                    _ => -1,
                };
                ModifyResult::failure(code, e.to_string())
            }
        }
    }

    fn check_token(&self, procedure: &str, encrypted: &str, unencrypted: &str) -> Result<()> {
        if self.validator.validate(encrypted, unencrypted) {
            return Ok(());
        }
        self.logger.in_scope(|| warn!(procedure, "security token rejected"));
        Err(DataAccessError::TokenRejected)
    }
}

impl<C: Connection> std::fmt::Debug for DataAccess<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataAccess")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

fn rows_to_i64(rows: u64) -> Result<i64> {
    i64::try_from(rows)
        .map_err(|_| DataAccessError::conversion(format!("affected row count {} overflows i64", rows)))
}
