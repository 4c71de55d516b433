//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DataAccessError, Result};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database connection.
    pub connection: ConnectionConfig,

    /// Dispatcher behavior.
    #[serde(default)]
    pub access: AccessConfig,

    /// Security token gate. Without it, secured calls are always rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityConfig>,
}

/// Supported connection drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    Mssql,
    Postgres,
    Mysql,
    Memory,
}

impl DriverKind {
    /// Parse a driver name.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mssql" | "sqlserver" => Ok(DriverKind::Mssql),
            "postgres" | "postgresql" | "pg" => Ok(DriverKind::Postgres),
            "mysql" | "mariadb" => Ok(DriverKind::Mysql),
            "memory" => Ok(DriverKind::Memory),
            other => Err(DataAccessError::Config(format!(
                "connection.type must be one of mssql, postgres, mysql, memory; got '{}'",
                other
            ))),
        }
    }

    /// Default port for network drivers.
    pub fn default_port(&self) -> u16 {
        match self {
            DriverKind::Mssql => 1433,
            DriverKind::Postgres => 5432,
            DriverKind::Mysql => 3306,
            DriverKind::Memory => 0,
        }
    }

    pub fn is_network(&self) -> bool {
        !matches!(self, DriverKind::Memory)
    }
}

/// Database connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Driver: mssql, postgres, mysql or memory (default: mssql).
    #[serde(default = "default_mssql")]
    pub r#type: String,

    /// Database host.
    #[serde(default)]
    pub host: String,

    /// Database port (default depends on the driver).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Database name.
    #[serde(default)]
    pub database: String,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Schema used for procedure names without one (MSSQL, default: "dbo").
    #[serde(default = "default_dbo_schema")]
    pub schema: String,

    /// Encrypt connection (MSSQL, default: true).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Trust server certificate (MSSQL, default: false).
    #[serde(default)]
    pub trust_server_cert: bool,

    /// TLS mode for PostgreSQL and MySQL: disable, require, verify-ca,
    /// verify-full (default: require).
    #[serde(default = "default_require")]
    pub ssl_mode: String,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

impl ConnectionConfig {
    /// Configuration for the in-memory driver.
    pub fn memory() -> Self {
        Self {
            r#type: "memory".to_string(),
            host: String::new(),
            port: None,
            database: String::new(),
            user: String::new(),
            password: String::new(),
            schema: default_dbo_schema(),
            encrypt: false,
            trust_server_cert: false,
            ssl_mode: "disable".to_string(),
        }
    }

    pub fn kind(&self) -> Result<DriverKind> {
        DriverKind::parse(&self.r#type)
    }

    /// Configured port or the driver default.
    pub fn effective_port(&self) -> u16 {
        match (self.port, self.kind()) {
            (Some(port), _) => port,
            (None, Ok(kind)) => kind.default_port(),
            (None, Err(_)) => 0,
        }
    }

    /// ADO-style connection string for tiberius.
    pub fn mssql_connection_string(&self) -> String {
        format!(
            "Server=tcp:{},{};Database={};User Id={};Password={};Encrypt={};TrustServerCertificate={}",
            self.host,
            self.effective_port(),
            self.database,
            self.user,
            self.password,
            self.encrypt,
            self.trust_server_cert
        )
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Per-command timeout in seconds (default: 30).
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Include parameter values in call-failure logs (default: true).
    #[serde(default = "default_true")]
    pub log_parameter_values: bool,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout(),
            log_parameter_values: true,
        }
    }
}

/// Security token gate configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// HMAC key for generated tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_secret: Option<String>,

    /// Whether tokens are HMAC-signed (default: true). When false the token
    /// is the plain date-stamped value.
    #[serde(default = "default_true")]
    pub encryption_used: bool,
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("token_secret", &self.token_secret.as_ref().map(|_| "[REDACTED]"))
            .field("encryption_used", &self.encryption_used)
            .finish()
    }
}

fn default_mssql() -> String {
    "mssql".to_string()
}

fn default_dbo_schema() -> String {
    "dbo".to_string()
}

fn default_require() -> String {
    "require".to_string()
}

fn default_true() -> bool {
    true
}

fn default_command_timeout() -> u64 {
    crate::core::DEFAULT_COMMAND_TIMEOUT_SECS
}
