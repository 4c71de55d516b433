//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_yaml_applies_defaults() {
        let config = Config::from_yaml(
            r#"
connection:
  type: mssql
  host: db.internal
  database: app
  user: app
  password: secret
"#,
        )
        .unwrap();

        assert_eq!(config.connection.effective_port(), 1433);
        assert_eq!(config.connection.schema, "dbo");
        assert!(config.connection.encrypt);
        assert_eq!(config.access.command_timeout_secs, 30);
        assert!(config.access.log_parameter_values);
        assert!(config.security.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
connection:
  type: postgres
  host: localhost
  port: 6543
  database: app
  user: app
  ssl_mode: verify-full
access:
  command_timeout_secs: 5
  log_parameter_values: false
security:
  token_secret: abc
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.connection.effective_port(), 6543);
        assert_eq!(config.access.command_timeout_secs, 5);
        assert!(!config.access.log_parameter_values);
        let security = config.security.unwrap();
        assert!(security.encryption_used);
        assert_eq!(security.token_secret.as_deref(), Some("abc"));
    }

    #[test]
    fn test_invalid_yaml_is_rejected() {
        assert!(Config::from_yaml("connection: [").is_err());
        assert!(Config::from_yaml("connection:\n  type: postgres\n").is_err());
    }

    #[test]
    fn test_mssql_connection_string() {
        let config = Config::from_yaml(
            "connection:\n  host: sql1\n  database: app\n  user: sa\n  password: pw\n  trust_server_cert: true\n",
        )
        .unwrap();
        assert_eq!(
            config.connection.mssql_connection_string(),
            "Server=tcp:sql1,1433;Database=app;User Id=sa;Password=pw;Encrypt=true;TrustServerCertificate=true"
        );
    }
}
