//! MSSQL connection over tiberius.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use futures::TryStreamExt;
use rust_decimal::Decimal;
use tiberius::{
    AuthMethod, Client, ColumnData, ColumnType, Config, EncryptionLevel, FromSql, QueryItem,
    QueryStream, ToSql,
};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ConnectionConfig;
use crate::core::traits::{Command, CommandKind, Connection, Dialect, DEFAULT_COMMAND_TIMEOUT_SECS};
use crate::core::{DataColumn, DataSet, DataTable, SqlType, SqlValue};
use crate::drivers::common::BlockingRuntime;
use crate::error::{DataAccessError, Result};

use super::MssqlDialect;

type TdsClient = Client<Compat<TcpStream>>;

/// Synchronous SQL Server connection.
pub struct MssqlConnection {
    config: ConnectionConfig,
    dialect: MssqlDialect,
    runtime: BlockingRuntime,
    client: Option<TdsClient>,
}

impl MssqlConnection {
    /// Create a closed connection for `config`.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        let dialect = MssqlDialect::new(config.schema.clone());
        Ok(Self {
            config,
            dialect,
            runtime: BlockingRuntime::new()?,
            client: None,
        })
    }

    pub fn dialect(&self) -> &MssqlDialect {
        &self.dialect
    }

    fn tiberius_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.effective_port());
        config.database(&self.config.database);
        config.authentication(AuthMethod::sql_server(
            &self.config.user,
            &self.config.password,
        ));
        config.application_name("procbind");

        if self.config.encrypt {
            if self.config.trust_server_cert {
                config.trust_cert();
            }
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }
        config
    }

    /// SQL text for a command. Stored procedures become `EXEC` batches.
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

    /// Run `sql` with the command's parameters and read every result set.
    fn query(&mut self, sql: String, command: &Command) -> Result<DataSet> {
        let params = to_params(command);
        let client = self.client.as_mut().ok_or_else(|| not_open(command))?;
        let context = format!("executing {}", command.text);

        self.runtime.run(command.timeout, &context, async move {
            let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
            let stream = client.query(sql, &refs).await?;
            read_data_set(stream).await
        })
    }

    fn simple(&mut self, sql: &'static str) -> Result<()> {
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| DataAccessError::Transaction("connection is not open".into()))?;
        self.runtime.run(
            Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            sql,
            async move { client.execute(sql, &[]).await.map(|_| ()) },
        )
    }
}

impl Connection for MssqlConnection {
    fn db_type(&self) -> &str {
        "mssql"
    }

    fn is_open(&self) -> bool {
        self.client.is_some()
    }

    fn open(&mut self) -> Result<()> {
        if self.client.is_some() {
            return Ok(());
        }
        let config = self.tiberius_config();
        let timeout = Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS);

        let client = self
            .runtime
            .run_checked(timeout, async move {
                let tcp = TcpStream::connect(config.get_addr())
                    .await
                    .map_err(|e| DataAccessError::ConnectionOpen(e.to_string()))?;
                tcp.set_nodelay(true)
                    .map_err(|e| DataAccessError::ConnectionOpen(e.to_string()))?;
                Client::connect(config, tcp.compat_write())
                    .await
                    .map_err(|e| DataAccessError::ConnectionOpen(e.to_string()))
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
            "opened MSSQL connection"
        );
        self.client = Some(client);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            self.runtime.run(
                Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
                "closing connection",
                client.close(),
            )?;
            debug!("closed MSSQL connection");
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
        let client = self.client.as_mut().ok_or_else(|| not_open(command))?;
        let context = format!("executing {}", command.text);

        self.runtime.run(command.timeout, &context, async move {
            let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
            let result = client.execute(sql, &refs).await?;
            Ok::<_, tiberius::error::Error>(result.total())
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
        last_scalar(set).map_or(Ok(0), |v| if v.is_null() { Ok(0) } else { v.to_i64() })
    }

    fn begin_transaction(&mut self) -> Result<()> {
        self.simple("BEGIN TRANSACTION")
    }

    fn commit(&mut self) -> Result<()> {
        self.simple("COMMIT TRANSACTION")
    }

    fn rollback(&mut self) -> Result<()> {
        self.simple("ROLLBACK TRANSACTION")
    }

    fn identity_query(&self) -> &'static str {
        self.dialect.identity_query()
    }

    // SCOPE_IDENTITY() only sees inserts from its own batch.
    fn execute_identity(&mut self, command: &Command) -> Result<Option<SqlValue>> {
        let sql = format!(
            "{}; {}",
            self.statement(command, true)?,
            self.dialect.identity_query()
        );
        let set = self.query(sql, command)?;
        Ok(last_scalar(set))
    }
}

fn not_open(command: &Command) -> DataAccessError {
    DataAccessError::command(
        "connection is not open",
        format!("executing {}", command.text),
    )
}

/// First cell of the last result set.
fn last_scalar(set: DataSet) -> Option<SqlValue> {
    set.tables
        .into_iter()
        .last()
        .and_then(|t| t.rows.into_iter().next())
        .and_then(|r| r.into_iter().next())
}

fn to_params(command: &Command) -> Vec<Box<dyn ToSql>> {
    command.params.iter().map(|p| to_param(&p.value)).collect()
}

fn to_param(value: &SqlValue) -> Box<dyn ToSql> {
    match value {
        SqlValue::Null(ty) => match ty {
            SqlType::Bool => Box::new(Option::<bool>::None),
            SqlType::I16 => Box::new(Option::<i16>::None),
            SqlType::I32 => Box::new(Option::<i32>::None),
            SqlType::I64 => Box::new(Option::<i64>::None),
            SqlType::F32 => Box::new(Option::<f32>::None),
            SqlType::F64 => Box::new(Option::<f64>::None),
            SqlType::String => Box::new(Option::<String>::None),
            SqlType::Bytes => Box::new(Option::<Vec<u8>>::None),
            SqlType::Uuid => Box::new(Option::<Uuid>::None),
            SqlType::Decimal => Box::new(Option::<Decimal>::None),
            SqlType::DateTime => Box::new(Option::<NaiveDateTime>::None),
            SqlType::DateTimeOffset => Box::new(Option::<DateTime<FixedOffset>>::None),
            SqlType::Date => Box::new(Option::<NaiveDate>::None),
            SqlType::Time => Box::new(Option::<NaiveTime>::None),
        },
        SqlValue::Bool(b) => Box::new(*b),
        SqlValue::I16(i) => Box::new(*i),
        SqlValue::I32(i) => Box::new(*i),
        SqlValue::I64(i) => Box::new(*i),
        SqlValue::F32(f) => Box::new(*f),
        SqlValue::F64(f) => Box::new(*f),
        SqlValue::Text(s) => Box::new(s.clone()),
        SqlValue::Bytes(b) => Box::new(b.clone()),
        SqlValue::Uuid(u) => Box::new(*u),
        SqlValue::Decimal(d) => Box::new(*d),
        SqlValue::DateTime(dt) => Box::new(*dt),
        SqlValue::DateTimeOffset(dto) => Box::new(*dto),
        SqlValue::Date(d) => Box::new(*d),
        SqlValue::Time(t) => Box::new(*t),
    }
}

/// Drain a query stream into one table per result set.
async fn read_data_set(mut stream: QueryStream<'_>) -> tiberius::Result<DataSet> {
    let mut set = DataSet::new();
    while let Some(item) = stream.try_next().await? {
        match item {
            QueryItem::Metadata(meta) => {
                let name = match set.len() {
                    0 => "Table".to_string(),
                    n => format!("Table{}", n),
                };
                let mut table = DataTable::new(name);
                table.columns = meta
                    .columns()
                    .iter()
                    .map(|c| DataColumn::new(c.name(), sql_type_of(c.column_type())))
                    .collect();
                set.push(table);
            }
            QueryItem::Row(row) => {
                if let Some(table) = set.tables.last_mut() {
                    let cells = row.into_iter().map(convert_cell).collect();
                    table.push_row(cells);
                }
            }
        }
    }
    Ok(set)
}

fn sql_type_of(column_type: ColumnType) -> SqlType {
    match column_type {
        ColumnType::Bit | ColumnType::Bitn => SqlType::Bool,
        ColumnType::Int1 | ColumnType::Int2 => SqlType::I16,
        ColumnType::Int4 | ColumnType::Intn => SqlType::I32,
        ColumnType::Int8 => SqlType::I64,
        ColumnType::Float4 => SqlType::F32,
        ColumnType::Float8 | ColumnType::Floatn => SqlType::F64,
        ColumnType::Guid => SqlType::Uuid,
        ColumnType::Decimaln
        | ColumnType::Numericn
        | ColumnType::Money
        | ColumnType::Money4 => SqlType::Decimal,
        ColumnType::Datetime
        | ColumnType::Datetime4
        | ColumnType::Datetimen
        | ColumnType::Datetime2 => SqlType::DateTime,
        ColumnType::Daten => SqlType::Date,
        ColumnType::Timen => SqlType::Time,
        ColumnType::DatetimeOffsetn => SqlType::DateTimeOffset,
        ColumnType::BigVarBin | ColumnType::BigBinary | ColumnType::Image => SqlType::Bytes,
        _ => SqlType::String,
    }
}

fn convert_cell(data: ColumnData<'static>) -> SqlValue {
    match data {
        ColumnData::U8(v) => v.map_or(SqlValue::Null(SqlType::I16), |v| {
            SqlValue::I16(i16::from(v))
        }),
        ColumnData::I16(v) => v.map_or(SqlValue::Null(SqlType::I16), SqlValue::I16),
        ColumnData::I32(v) => v.map_or(SqlValue::Null(SqlType::I32), SqlValue::I32),
        ColumnData::I64(v) => v.map_or(SqlValue::Null(SqlType::I64), SqlValue::I64),
        ColumnData::F32(v) => v.map_or(SqlValue::Null(SqlType::F32), SqlValue::F32),
        ColumnData::F64(v) => v.map_or(SqlValue::Null(SqlType::F64), SqlValue::F64),
        ColumnData::Bit(v) => v.map_or(SqlValue::Null(SqlType::Bool), SqlValue::Bool),
        ColumnData::String(v) => v.map_or(SqlValue::Null(SqlType::String), |s| {
            SqlValue::Text(s.into_owned())
        }),
        ColumnData::Guid(v) => v.map_or(SqlValue::Null(SqlType::Uuid), SqlValue::Uuid),
        ColumnData::Binary(v) => v.map_or(SqlValue::Null(SqlType::Bytes), |b| {
            SqlValue::Bytes(b.into_owned())
        }),
        ColumnData::Numeric(v) => match v {
            Some(n) => Decimal::try_from_i128_with_scale(n.value(), u32::from(n.scale()))
                .map(SqlValue::Decimal)
                .unwrap_or_else(|_| SqlValue::Text(n.to_string())),
            None => SqlValue::Null(SqlType::Decimal),
        },
        ColumnData::Xml(v) => v.map_or(SqlValue::Null(SqlType::String), |x| {
            SqlValue::Text(x.to_string())
        }),
        ColumnData::Date(_) => temporal(&data, SqlValue::Date, SqlType::Date),
        ColumnData::Time(_) => temporal(&data, SqlValue::Time, SqlType::Time),
        ColumnData::DateTimeOffset(_) => {
            temporal(&data, SqlValue::DateTimeOffset, SqlType::DateTimeOffset)
        }
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            temporal(&data, SqlValue::DateTime, SqlType::DateTime)
        }
    }
}

fn temporal<T>(data: &ColumnData<'static>, wrap: fn(T) -> SqlValue, null: SqlType) -> SqlValue
where
    T: for<'a> FromSql<'a>,
{
    match T::from_sql(data) {
        Ok(Some(v)) => wrap(v),
        Ok(None) => SqlValue::Null(null),
        Err(e) => {
            warn!("unreadable {:?} value: {}", null, e);
            SqlValue::Null(null)
        }
    }
}
