//! MySQL connection over mysql_async.

use std::time::Duration;

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use mysql_async::consts::ColumnType;
use mysql_async::prelude::Queryable;
use mysql_async::{Column, Conn, OptsBuilder, Params, Row, SslOpts, Value};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::core::traits::{Command, CommandKind, Connection, Dialect, DEFAULT_COMMAND_TIMEOUT_SECS};
use crate::core::value::parse_datetime;
use crate::core::{DataColumn, DataSet, DataTable, SqlType, SqlValue};
use crate::drivers::common::{BlockingRuntime, SslMode};
use crate::error::{DataAccessError, Result};

use super::MysqlDialect;

/// Character set id MySQL reports for binary columns.
const BINARY_CHARSET: u16 = 63;

/// Synchronous MySQL connection.
pub struct MysqlConnection {
    config: ConnectionConfig,
    dialect: MysqlDialect,
    ssl_mode: SslMode,
    runtime: BlockingRuntime,
    conn: Option<Conn>,
}

impl MysqlConnection {
    /// Create a closed connection for `config`.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        let ssl_mode = SslMode::parse(&config.ssl_mode)?;
        Ok(Self {
            config,
            dialect: MysqlDialect::new(),
            ssl_mode,
            runtime: BlockingRuntime::new()?,
            conn: None,
        })
    }

    fn opts(&self) -> OptsBuilder {
        let ssl_opts = match self.ssl_mode {
            SslMode::Disable => None,
            SslMode::Require => Some(SslOpts::default().with_danger_accept_invalid_certs(true)),
            SslMode::VerifyCa => {
                Some(SslOpts::default().with_danger_skip_domain_validation(true))
            }
            SslMode::VerifyFull => Some(SslOpts::default()),
        };

        OptsBuilder::default()
            .ip_or_hostname(self.config.host.clone())
            .tcp_port(self.config.effective_port())
            .db_name(Some(self.config.database.clone()))
            .user(Some(self.config.user.clone()))
            .pass(Some(self.config.password.clone()))
            .ssl_opts(ssl_opts)
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

    fn query(&mut self, sql: String, command: &Command) -> Result<DataSet> {
        let params = to_params(command);
        let context = format!("executing {}", command.text);
        let conn = self.conn.as_mut().ok_or_else(|| not_open(command))?;

        self.runtime.run(command.timeout, &context, async move {
            let mut result = conn.exec_iter(sql, params).await?;
            let mut set = DataSet::new();
            while !result.is_empty() {
                let columns = result.columns();
                let rows: Vec<Row> = result.collect().await?;
                let Some(columns) = columns.filter(|c| !c.is_empty()) else {
                    continue;
                };
                let name = match set.len() {
                    0 => "Table".to_string(),
                    n => format!("Table{}", n),
                };
                let mut table = DataTable::new(name);
                table.columns = columns
                    .iter()
                    .map(|c| DataColumn::new(c.name_str(), sql_type_of(c)))
                    .collect();
                for mut row in rows {
                    let cells = columns
                        .iter()
                        .enumerate()
                        .map(|(i, c)| {
                            let value = row.take::<Value, usize>(i).unwrap_or(Value::NULL);
                            convert_value(value, c)
                        })
                        .collect();
                    table.push_row(cells);
                }
                set.push(table);
            }
            Ok::<_, mysql_async::Error>(set)
        })
    }

    fn simple(&mut self, sql: &'static str) -> Result<()> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| DataAccessError::Transaction("connection is not open".into()))?;
        self.runtime.run(
            Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            sql,
            conn.query_drop(sql),
        )
    }
}

impl Connection for MysqlConnection {
    fn db_type(&self) -> &str {
        "mysql"
    }

    fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    fn open(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let opts = self.opts();
        let conn = self
            .runtime
            .run(
                Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
                "opening connection",
                Conn::new(opts),
            )
            .map_err(|e| match e {
                DataAccessError::Command { message, .. } => DataAccessError::ConnectionOpen(message),
                DataAccessError::Timeout(secs) => {
                    DataAccessError::ConnectionOpen(format!("timed out after {}s", secs))
                }
                other => other,
            })?;

        info!(
            host = %self.config.host,
            database = %self.config.database,
            ssl_mode = ?self.ssl_mode,
            "opened MySQL connection"
        );
        self.conn = Some(conn);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            self.runtime.run(
                Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
                "closing connection",
                conn.disconnect(),
            )?;
            debug!("closed MySQL connection");
        }
        Ok(())
    }

    fn fill(&mut self, command: &Command) -> Result<DataSet> {
        let sql = self.statement(command, false)?;
        self.query(sql, command)
    }

    fn execute_non_query(&mut self, command: &Command) -> Result<u64> {
        let sql = self.statement(command, true)?;
        let params = to_params(command);
        let context = format!("executing {}", command.text);
        let conn = self.conn.as_mut().ok_or_else(|| not_open(command))?;

        self.runtime.run(command.timeout, &context, async move {
            let result = conn.exec_iter(sql, params).await?;
            let affected = result.affected_rows();
            result.drop_result().await?;
            Ok::<_, mysql_async::Error>(affected)
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
        self.simple("START TRANSACTION")
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

fn to_params(command: &Command) -> Params {
    if command.params.is_empty() {
        Params::Empty
    } else {
        Params::Positional(command.params.iter().map(|p| to_value(&p.value)).collect())
    }
}

fn to_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null(_) => Value::NULL,
        SqlValue::Bool(b) => Value::Int(i64::from(*b)),
        SqlValue::I16(v) => Value::Int(i64::from(*v)),
        SqlValue::I32(v) => Value::Int(i64::from(*v)),
        SqlValue::I64(v) => Value::Int(*v),
        SqlValue::F32(v) => Value::Float(*v),
        SqlValue::F64(v) => Value::Double(*v),
        SqlValue::Text(s) => Value::Bytes(s.clone().into_bytes()),
        SqlValue::Bytes(b) => Value::Bytes(b.clone()),
        SqlValue::Uuid(u) => Value::Bytes(u.to_string().into_bytes()),
        SqlValue::Decimal(d) => Value::Bytes(d.to_string().into_bytes()),
        SqlValue::DateTime(dt) => date_value(dt.date(), dt.time()),
        SqlValue::DateTimeOffset(dto) => {
            let local = dto.naive_local();
            date_value(local.date(), local.time())
        }
        SqlValue::Date(d) => date_value(*d, NaiveTime::MIN),
        SqlValue::Time(t) => Value::Time(
            false,
            0,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            t.nanosecond() / 1_000,
        ),
    }
}

fn date_value(date: NaiveDate, time: NaiveTime) -> Value {
    Value::Date(
        date.year() as u16,
        date.month() as u8,
        date.day() as u8,
        time.hour() as u8,
        time.minute() as u8,
        time.second() as u8,
        time.nanosecond() / 1_000,
    )
}

fn sql_type_of(column: &Column) -> SqlType {
    match column.column_type() {
        ColumnType::MYSQL_TYPE_TINY if column.column_length() == 1 => SqlType::Bool,
        ColumnType::MYSQL_TYPE_TINY | ColumnType::MYSQL_TYPE_SHORT | ColumnType::MYSQL_TYPE_YEAR => {
            SqlType::I16
        }
        ColumnType::MYSQL_TYPE_LONG | ColumnType::MYSQL_TYPE_INT24 => SqlType::I32,
        ColumnType::MYSQL_TYPE_LONGLONG => SqlType::I64,
        ColumnType::MYSQL_TYPE_FLOAT => SqlType::F32,
        ColumnType::MYSQL_TYPE_DOUBLE => SqlType::F64,
        ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => SqlType::Decimal,
        ColumnType::MYSQL_TYPE_DATE => SqlType::Date,
        ColumnType::MYSQL_TYPE_DATETIME | ColumnType::MYSQL_TYPE_TIMESTAMP => SqlType::DateTime,
        ColumnType::MYSQL_TYPE_TIME => SqlType::Time,
        ColumnType::MYSQL_TYPE_BIT => SqlType::Bytes,
        ColumnType::MYSQL_TYPE_TINY_BLOB
        | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
        | ColumnType::MYSQL_TYPE_LONG_BLOB
        | ColumnType::MYSQL_TYPE_BLOB
        | ColumnType::MYSQL_TYPE_VAR_STRING
        | ColumnType::MYSQL_TYPE_VARCHAR
        | ColumnType::MYSQL_TYPE_STRING
            if column.character_set() == BINARY_CHARSET =>
        {
            SqlType::Bytes
        }
        _ => SqlType::String,
    }
}

fn convert_value(value: Value, column: &Column) -> SqlValue {
    let sql_type = sql_type_of(column);
    match value {
        Value::NULL => SqlValue::Null(sql_type),
        Value::Int(v) => integer(v, sql_type),
        Value::UInt(v) => match i64::try_from(v) {
            Ok(v) => integer(v, sql_type),
            Err(_) => SqlValue::Decimal(Decimal::from(v)),
        },
        Value::Float(v) => SqlValue::F32(v),
        Value::Double(v) => SqlValue::F64(v),
        Value::Bytes(bytes) => from_bytes(bytes, sql_type),
        Value::Date(y, mo, d, h, mi, s, us) => {
            let date = NaiveDate::from_ymd_opt(i32::from(y), u32::from(mo), u32::from(d));
            let time = NaiveTime::from_hms_micro_opt(u32::from(h), u32::from(mi), u32::from(s), us);
            match (date, time, sql_type) {
                (Some(date), _, SqlType::Date) => SqlValue::Date(date),
                (Some(date), Some(time), _) => SqlValue::DateTime(date.and_time(time)),
                // Zero dates have no calendar equivalent.
                _ => SqlValue::Null(sql_type),
            }
        }
        Value::Time(negative, days, h, mi, s, us) => {
            match NaiveTime::from_hms_micro_opt(u32::from(h), u32::from(mi), u32::from(s), us) {
                Some(t) if !negative && days == 0 => SqlValue::Time(t),
                _ => SqlValue::Text(format!(
                    "{}{}.{:02}:{:02}:{:02}.{:06}",
                    if negative { "-" } else { "" },
                    days,
                    h,
                    mi,
                    s,
                    us
                )),
            }
        }
    }
}

fn integer(v: i64, sql_type: SqlType) -> SqlValue {
    match sql_type {
        SqlType::Bool => SqlValue::Bool(v != 0),
        SqlType::I16 => i16::try_from(v).map_or(SqlValue::I64(v), SqlValue::I16),
        SqlType::I32 => i32::try_from(v).map_or(SqlValue::I64(v), SqlValue::I32),
        _ => SqlValue::I64(v),
    }
}

/// Text-protocol and string values arrive as raw bytes.
fn from_bytes(bytes: Vec<u8>, sql_type: SqlType) -> SqlValue {
    if sql_type == SqlType::Bytes {
        return SqlValue::Bytes(bytes);
    }
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => return SqlValue::Bytes(e.into_bytes()),
    };
    let parsed = match sql_type {
        SqlType::Bool | SqlType::I16 | SqlType::I32 | SqlType::I64 => text
            .trim()
            .parse::<i64>()
            .ok()
            .map(|v| integer(v, sql_type)),
        SqlType::F32 => text.trim().parse::<f32>().ok().map(SqlValue::F32),
        SqlType::F64 => text.trim().parse::<f64>().ok().map(SqlValue::F64),
        SqlType::Decimal => text.trim().parse::<Decimal>().ok().map(SqlValue::Decimal),
        SqlType::Date => NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
            .ok()
            .map(SqlValue::Date),
        SqlType::DateTime => parse_datetime(&text).map(SqlValue::DateTime),
        SqlType::Time => NaiveTime::parse_from_str(text.trim(), "%H:%M:%S%.f")
            .ok()
            .map(SqlValue::Time),
        _ => None,
    };
    parsed.unwrap_or(SqlValue::Text(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_value_encodes_temporal_parts() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_micro_opt(13, 4, 5, 600)
            .unwrap();
        assert_eq!(
            to_value(&SqlValue::DateTime(dt)),
            Value::Date(2024, 3, 9, 13, 4, 5, 600)
        );
        assert_eq!(to_value(&SqlValue::Bool(true)), Value::Int(1));
        assert_eq!(to_value(&SqlValue::Null(SqlType::I32)), Value::NULL);
    }

    #[test]
    fn test_from_bytes_parses_text_protocol_values() {
        assert_eq!(from_bytes(b"42".to_vec(), SqlType::I32), SqlValue::I32(42));
        assert_eq!(
            from_bytes(b"12.50".to_vec(), SqlType::Decimal),
            SqlValue::Decimal(Decimal::new(1250, 2))
        );
        assert_eq!(
            from_bytes(b"2024-01-02".to_vec(), SqlType::Date),
            SqlValue::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
        );
        assert_eq!(
            from_bytes(b"hello".to_vec(), SqlType::String),
            SqlValue::Text("hello".into())
        );
        assert_eq!(from_bytes(vec![0xff, 0x00], SqlType::Bytes), SqlValue::Bytes(vec![0xff, 0x00]));
    }

    #[test]
    fn test_integer_narrows_by_column_type() {
        assert_eq!(integer(1, SqlType::Bool), SqlValue::Bool(true));
        assert_eq!(integer(300, SqlType::I16), SqlValue::I16(300));
        assert_eq!(integer(70_000, SqlType::I16), SqlValue::I64(70_000));
    }

    #[test]
    fn test_to_params_empty_uses_no_params() {
        let command = Command::procedure("p", Vec::new());
        assert!(matches!(to_params(&command), Params::Empty));
    }
}
