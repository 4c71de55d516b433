//! PostgreSQL connection over tokio-postgres.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use tokio_postgres::types::{FromSql, ToSql, Type};
use tokio_postgres::{Client, Config as PgConfig, NoTls, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ConnectionConfig;
use crate::core::traits::{Command, CommandKind, Connection, Dialect, DEFAULT_COMMAND_TIMEOUT_SECS};
use crate::core::{DataColumn, DataSet, DataTable, SqlType, SqlValue};
use crate::drivers::common::{BlockingRuntime, TlsBuilder};
use crate::error::{DataAccessError, Result};

use super::PostgresDialect;

type PgParam = Box<dyn ToSql + Sync>;

/// Synchronous PostgreSQL connection.
pub struct PostgresConnection {
    config: ConnectionConfig,
    dialect: PostgresDialect,
    tls: TlsBuilder,
    runtime: BlockingRuntime,
    client: Option<Client>,
}

impl PostgresConnection {
    /// Create a closed connection for `config`.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        let tls = TlsBuilder::parse(&config.ssl_mode)?;
        Ok(Self {
            config,
            dialect: PostgresDialect::new(),
            tls,
            runtime: BlockingRuntime::new()?,
            client: None,
        })
    }

    fn pg_config(&self) -> PgConfig {
        let mut pg_config = PgConfig::new();
        pg_config.host(&self.config.host);
        pg_config.port(self.config.effective_port());
        pg_config.dbname(&self.config.database);
        pg_config.user(&self.config.user);
        pg_config.password(&self.config.password);
        pg_config.application_name("procbind");
        pg_config.connect_timeout(Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS));
        pg_config
    }

    fn statement(&self, command: &Command, for_side_effects: bool) -> Result<String> {
        match command.kind {
            CommandKind::Text => Ok(command.text.clone()),
            CommandKind::StoredProcedure if for_side_effects => {
                self.dialect.build_execute(&command.text, &command.params)
            }
            CommandKind::StoredProcedure => {
                self.dialect.build_call(&command.text, &command.params)
            }
        }
    }

    /// Prepare `sql`, bind the command's values to the server's declared
    /// parameter types and collect the rows.
    fn query(&mut self, sql: String, command: &Command) -> Result<DataSet> {
        let values: Vec<SqlValue> = command.params.iter().map(|p| p.value.clone()).collect();
        let context = format!("executing {}", command.text);
        let client = self.client.as_ref().ok_or_else(|| not_open(command))?;

        self.runtime.run_checked(command.timeout, async move {
            let stmt = client
                .prepare(&sql)
                .await
                .map_err(|e| DataAccessError::command(e, &context))?;
            let params = bind_params(stmt.params(), &values)?;
            let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p.as_ref()).collect();
            let rows = client
                .query(&stmt, &refs)
                .await
                .map_err(|e| DataAccessError::command(e, &context))?;

            let mut table = DataTable::new("Table");
            table.columns = stmt
                .columns()
                .iter()
                .map(|c| DataColumn::new(c.name(), sql_type_of(c.type_())))
                .collect();
            for row in &rows {
                table.push_row(convert_row(row));
            }
            Ok(DataSet::single(table))
        })
    }

    fn simple(&mut self, sql: &'static str) -> Result<()> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| DataAccessError::Transaction("connection is not open".into()))?;
        self.runtime.run(
            Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            sql,
            client.batch_execute(sql),
        )
    }
}

impl Connection for PostgresConnection {
    fn db_type(&self) -> &str {
        "postgres"
    }

    fn is_open(&self) -> bool {
        self.client.as_ref().is_some_and(|c| !c.is_closed())
    }

    fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        let pg_config = self.pg_config();
        let tls = self.tls.postgres_connector()?;
        let timeout = Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS);
        let open_error = |e: tokio_postgres::Error| DataAccessError::ConnectionOpen(e.to_string());

        let client = self
            .runtime
            .run_checked(timeout, async move {
                match tls {
                    Some(tls) => {
                        let (client, connection) = pg_config.connect(tls).await.map_err(open_error)?;
                        tokio::spawn(async move {
                            if let Err(e) = connection.await {
                                warn!("PostgreSQL connection error: {}", e);
                            }
                        });
                        Ok(client)
                    }
                    None => {
                        let (client, connection) =
                            pg_config.connect(NoTls).await.map_err(open_error)?;
                        tokio::spawn(async move {
                            if let Err(e) = connection.await {
                                warn!("PostgreSQL connection error: {}", e);
                            }
                        });
                        Ok(client)
                    }
                }
            })
            .map_err(|e| match e {
                DataAccessError::Timeout(secs) => {
                    DataAccessError::ConnectionOpen(format!("timed out after {}s", secs))
                }
                other => other,
            })?;

        info!(
            host = %self.config.host,
            database = %self.config.database,
            ssl_mode = ?self.tls.ssl_mode(),
            "opened PostgreSQL connection"
        );
        self.client = Some(client);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the client ends the spawned connection task.
        if self.client.take().is_some() {
            debug!("closed PostgreSQL connection");
        }
        Ok(())
    }

    fn fill(&mut self, command: &Command) -> Result<DataSet> {
        let sql = self.statement(command, false)?;
        self.query(sql, command)
    }

    fn execute_non_query(&mut self, command: &Command) -> Result<u64> {
        let sql = self.statement(command, true)?;
        let values: Vec<SqlValue> = command.params.iter().map(|p| p.value.clone()).collect();
        let context = format!("executing {}", command.text);
        let client = self.client.as_ref().ok_or_else(|| not_open(command))?;

        self.runtime.run_checked(command.timeout, async move {
            let stmt = client
                .prepare(&sql)
                .await
                .map_err(|e| DataAccessError::command(e, &context))?;
            let params = bind_params(stmt.params(), &values)?;
            let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p.as_ref()).collect();
            client
                .execute(&stmt, &refs)
                .await
                .map_err(|e| DataAccessError::command(e, &context))
        })
    }

    fn execute_return_value(&mut self, command: &Command) -> Result<i64> {
        let sql = match command.kind {
            CommandKind::StoredProcedure => self
                .dialect
                .build_return_value_call(&command.text, &command.params)?,
            CommandKind::Text => command.text.clone(),
        };
        let set = self.query(sql, command)?;
        match set.first().and_then(|t| t.cell(0, 0)) {
            Some(v) if !v.is_null() => v.to_i64(),
            _ => Ok(0),
        }
    }

    fn begin_transaction(&mut self) -> Result<()> {
        self.simple("BEGIN")
    }

    fn commit(&mut self) -> Result<()> {
        self.simple("COMMIT")
    }

    fn rollback(&mut self) -> Result<()> {
        self.simple("ROLLBACK")
    }

    fn identity_query(&self) -> &'static str {
        self.dialect.identity_query()
    }
}

fn not_open(command: &Command) -> DataAccessError {
    DataAccessError::command(
        "connection is not open",
        format!("executing {}", command.text),
    )
}

/// Coerce each value to the type the server declared for its placeholder.
fn bind_params(types: &[Type], values: &[SqlValue]) -> Result<Vec<PgParam>> {
    if types.len() != values.len() {
        return Err(DataAccessError::command(
            format!(
                "statement expects {} parameters, {} supplied",
                types.len(),
                values.len()
            ),
            "binding parameters",
        ));
    }
    types
        .iter()
        .zip(values)
        .map(|(ty, value)| to_pg_param(value, ty))
        .collect()
}

fn optional<T>(value: &SqlValue, f: impl FnOnce(&SqlValue) -> Result<T>) -> Result<Option<T>> {
    if value.is_null() {
        Ok(None)
    } else {
        f(value).map(Some)
    }
}

fn to_pg_param(value: &SqlValue, ty: &Type) -> Result<PgParam> {
    let param: PgParam = match ty.name() {
        "bool" => Box::new(optional(value, |v| v.to_bool())?),
        "int2" => Box::new(optional(value, |v| narrow::<i16>(v))?),
        "int4" => Box::new(optional(value, |v| narrow::<i32>(v))?),
        "int8" => Box::new(optional(value, |v| v.to_i64())?),
        "float4" => Box::new(optional(value, |v| v.to_f64().map(|f| f as f32))?),
        "float8" => Box::new(optional(value, |v| v.to_f64())?),
        "numeric" => Box::new(optional(value, |v| v.to_decimal())?),
        "timestamp" => Box::new(optional(value, |v| v.to_naive_datetime())?),
        "timestamptz" => Box::new(optional(value, |v| match v {
            SqlValue::DateTimeOffset(dto) => Ok(dto.with_timezone(&Utc)),
            other => other.to_naive_datetime().map(|dt| dt.and_utc()),
        })?),
        "date" => Box::new(optional(value, |v| match v {
            SqlValue::Date(d) => Ok(*d),
            other => other.to_naive_datetime().map(|dt| dt.date()),
        })?),
        "time" => Box::new(optional(value, to_time)?),
        "uuid" => Box::new(optional(value, to_uuid)?),
        "bytea" => Box::new(optional(value, |v| match v {
            SqlValue::Bytes(b) => Ok(b.clone()),
            other => Ok(other.to_string().into_bytes()),
        })?),
        "json" | "jsonb" => Box::new(optional(value, |v| match v {
            SqlValue::Text(s) => serde_json::from_str::<serde_json::Value>(s)
                .map_err(|e| DataAccessError::conversion(format!("invalid JSON: {}", e))),
            other => Ok(serde_json::Value::String(other.to_string())),
        })?),
        _ => Box::new(optional(value, |v| Ok(v.to_string()))?),
    };
    Ok(param)
}

fn narrow<T: TryFrom<i64>>(value: &SqlValue) -> Result<T> {
    let wide = value.to_i64()?;
    T::try_from(wide).map_err(|_| {
        DataAccessError::conversion(format!("{} is out of range for the parameter", wide))
    })
}

fn to_time(value: &SqlValue) -> Result<NaiveTime> {
    match value {
        SqlValue::Time(t) => Ok(*t),
        SqlValue::Text(s) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")
            .map_err(|e| DataAccessError::conversion(format!("invalid time '{}': {}", s, e))),
        other => other.to_naive_datetime().map(|dt| dt.time()),
    }
}

fn to_uuid(value: &SqlValue) -> Result<Uuid> {
    match value {
        SqlValue::Uuid(u) => Ok(*u),
        other => Uuid::parse_str(other.to_string().trim())
            .map_err(|e| DataAccessError::conversion(format!("invalid uuid: {}", e))),
    }
}

fn sql_type_of(ty: &Type) -> SqlType {
    match ty.name() {
        "bool" => SqlType::Bool,
        "int2" => SqlType::I16,
        "int4" => SqlType::I32,
        "int8" => SqlType::I64,
        "float4" => SqlType::F32,
        "float8" => SqlType::F64,
        "numeric" => SqlType::Decimal,
        "uuid" => SqlType::Uuid,
        "timestamp" => SqlType::DateTime,
        "timestamptz" => SqlType::DateTimeOffset,
        "date" => SqlType::Date,
        "time" => SqlType::Time,
        "bytea" => SqlType::Bytes,
        _ => SqlType::String,
    }
}

fn convert_row(row: &Row) -> Vec<SqlValue> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| convert_cell(row, idx, col.type_()))
        .collect()
}

fn cell<'a, T>(row: &'a Row, idx: usize, wrap: impl FnOnce(T) -> SqlValue, null: SqlType) -> SqlValue
where
    T: FromSql<'a>,
{
    match row.try_get::<_, Option<T>>(idx) {
        Ok(Some(v)) => wrap(v),
        Ok(None) => SqlValue::Null(null),
        Err(e) => {
            warn!("unreadable column {}: {}", idx, e);
            SqlValue::Null(null)
        }
    }
}

fn convert_cell(row: &Row, idx: usize, ty: &Type) -> SqlValue {
    match ty.name() {
        "bool" => cell::<bool>(row, idx, SqlValue::Bool, SqlType::Bool),
        "int2" => cell::<i16>(row, idx, SqlValue::I16, SqlType::I16),
        "int4" => cell::<i32>(row, idx, SqlValue::I32, SqlType::I32),
        "int8" => cell::<i64>(row, idx, SqlValue::I64, SqlType::I64),
        "float4" => cell::<f32>(row, idx, SqlValue::F32, SqlType::F32),
        "float8" => cell::<f64>(row, idx, SqlValue::F64, SqlType::F64),
        "numeric" => cell::<Decimal>(row, idx, SqlValue::Decimal, SqlType::Decimal),
        "uuid" => cell::<Uuid>(row, idx, SqlValue::Uuid, SqlType::Uuid),
        "timestamp" => cell::<NaiveDateTime>(row, idx, SqlValue::DateTime, SqlType::DateTime),
        "timestamptz" => cell::<DateTime<FixedOffset>>(
            row,
            idx,
            SqlValue::DateTimeOffset,
            SqlType::DateTimeOffset,
        ),
        "date" => cell::<NaiveDate>(row, idx, SqlValue::Date, SqlType::Date),
        "time" => cell::<NaiveTime>(row, idx, SqlValue::Time, SqlType::Time),
        "bytea" => cell::<Vec<u8>>(row, idx, SqlValue::Bytes, SqlType::Bytes),
        "json" | "jsonb" => cell::<serde_json::Value>(
            row,
            idx,
            |v| SqlValue::Text(v.to_string()),
            SqlType::String,
        ),
        _ => cell::<String>(row, idx, SqlValue::Text, SqlType::String),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_pg_param_coerces_to_declared_type() {
        let param = to_pg_param(&SqlValue::Text("42".into()), &Type::INT4).unwrap();
        assert_eq!(format!("{:?}", param), "Some(42)");

        let param = to_pg_param(&SqlValue::Null(SqlType::String), &Type::INT8).unwrap();
        assert_eq!(format!("{:?}", param), "None");

        let param = to_pg_param(&SqlValue::I32(7), &Type::TEXT).unwrap();
        assert_eq!(format!("{:?}", param), "Some(\"7\")");
    }

    #[test]
    fn test_to_pg_param_rejects_out_of_range() {
        assert!(to_pg_param(&SqlValue::I64(70_000), &Type::INT2).is_err());
        assert!(to_pg_param(&SqlValue::Text("abc".into()), &Type::UUID).is_err());
    }

    #[test]
    fn test_bind_params_checks_arity() {
        assert!(bind_params(&[Type::INT4], &[]).is_err());
        assert_eq!(
            bind_params(&[Type::TEXT], &[SqlValue::I32(1)]).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_sql_type_of() {
        assert_eq!(sql_type_of(&Type::TIMESTAMPTZ), SqlType::DateTimeOffset);
        assert_eq!(sql_type_of(&Type::VARCHAR), SqlType::String);
    }
}
