//! Configuration validation.

use super::{Config, DriverKind};
use crate::drivers::common::SslMode;
use crate::error::{DataAccessError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let connection = &config.connection;
    let kind = connection.kind()?;

    if kind.is_network() {
        if connection.host.is_empty() {
            return Err(DataAccessError::Config("connection.host is required".into()));
        }
        if connection.database.is_empty() {
            return Err(DataAccessError::Config(
                "connection.database is required".into(),
            ));
        }
        if connection.user.is_empty() {
            return Err(DataAccessError::Config("connection.user is required".into()));
        }
        if let Some(0) = connection.port {
            return Err(DataAccessError::Config(
                "connection.port must be at least 1".into(),
            ));
        }
    }

    if matches!(kind, DriverKind::Postgres | DriverKind::Mysql) {
        SslMode::parse(&connection.ssl_mode)?;
    }

    if config.access.command_timeout_secs < 1 {
        return Err(DataAccessError::Config(
            "access.command_timeout_secs must be at least 1".into(),
        ));
    }

    if let Some(security) = &config.security {
        let missing_secret = security
            .token_secret
            .as_deref()
            .map_or(true, str::is_empty);
        if security.encryption_used && missing_secret {
            return Err(DataAccessError::Config(
                "security.token_secret is required when encryption_used is true".into(),
            ));
        }
    }

    Ok(())
}
