//! MSSQL procedure call syntax.

use crate::core::traits::{check_param_name, BoundParam, Dialect};
use crate::drivers::common::split_qualified;
use crate::error::{DataAccessError, Result};

/// MSSQL dialect: `EXEC [schema].[proc] @Name = @P1, ...`.
#[derive(Debug, Clone)]
pub struct MssqlDialect {
    default_schema: String,
}

impl MssqlDialect {
    /// Dialect that qualifies bare procedure names with `default_schema`.
    pub fn new(default_schema: impl Into<String>) -> Self {
        Self {
            default_schema: default_schema.into(),
        }
    }

    fn arguments(&self, params: &[BoundParam]) -> Result<String> {
        let mut args = Vec::with_capacity(params.len());
        for (i, param) in params.iter().enumerate() {
            let name = check_param_name(param)?;
            args.push(format!("@{} = {}", name, self.param_placeholder(i + 1)));
        }
        Ok(args.join(", "))
    }
}

impl Default for MssqlDialect {
    fn default() -> Self {
        Self::new("dbo")
    }
}

impl Dialect for MssqlDialect {
    fn name(&self) -> &str {
        "mssql"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("@P{}", index)
    }

    fn qualify(&self, procedure: &str) -> Result<String> {
        let parts = split_qualified(procedure);
        if parts.len() == 1 && !self.default_schema.is_empty() {
            return Ok(format!(
                "{}.{}",
                self.quote_ident(&self.default_schema),
                self.quote_ident(&parts[0])
            ));
        }
        let quoted: Vec<String> = parts.iter().map(|p| self.quote_ident(p)).collect();
        if quoted.is_empty() {
            return Err(DataAccessError::command(
                "procedure name is empty",
                "building procedure call",
            ));
        }
        Ok(quoted.join("."))
    }

    fn build_call(&self, procedure: &str, params: &[BoundParam]) -> Result<String> {
        let target = self.qualify(procedure)?;
        let args = self.arguments(params)?;
        if args.is_empty() {
            Ok(format!("EXEC {}", target))
        } else {
            Ok(format!("EXEC {} {}", target, args))
        }
    }

    fn build_return_value_call(&self, procedure: &str, params: &[BoundParam]) -> Result<String> {
        let target = self.qualify(procedure)?;
        let args = self.arguments(params)?;
        let exec = if args.is_empty() {
            format!("EXEC @RETURN_VALUE = {}", target)
        } else {
            format!("EXEC @RETURN_VALUE = {} {}", target, args)
        };
        Ok(format!(
            "DECLARE @RETURN_VALUE INT; {}; SELECT @RETURN_VALUE AS [RETURN_VALUE];",
            exec
        ))
    }

    fn identity_query(&self) -> &'static str {
        "SELECT SCOPE_IDENTITY()"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlValue;
    use crate::params::DbType;

    fn param(name: &str) -> BoundParam {
        BoundParam {
            name: name.to_string(),
            db_type: DbType::Int,
            size: 0,
            precision: 0,
            value: SqlValue::I32(1),
            type_name: None,
        }
    }

    #[test]
    fn test_quote_ident() {
        let dialect = MssqlDialect::default();
        assert_eq!(dialect.quote_ident("Users"), "[Users]");
        assert_eq!(dialect.quote_ident("table]name"), "[table]]name]");
    }

    #[test]
    fn test_qualify_adds_default_schema() {
        let dialect = MssqlDialect::new("app");
        assert_eq!(dialect.qualify("GetUsers").unwrap(), "[app].[GetUsers]");
        assert_eq!(dialect.qualify("dbo.GetUsers").unwrap(), "[dbo].[GetUsers]");
        assert!(dialect.qualify("  ").is_err());
    }

    #[test]
    fn test_build_call() {
        let dialect = MssqlDialect::default();
        assert_eq!(
            dialect
                .build_call("dbo.SaveUser", &[param("@Id"), param("Name")])
                .unwrap(),
            "EXEC [dbo].[SaveUser] @Id = @P1, @Name = @P2"
        );
        assert_eq!(dialect.build_call("Ping", &[]).unwrap(), "EXEC [dbo].[Ping]");
    }

    #[test]
    fn test_build_return_value_call() {
        let dialect = MssqlDialect::default();
        assert_eq!(
            dialect
                .build_return_value_call("UpdateUser", &[param("@Id")])
                .unwrap(),
            "DECLARE @RETURN_VALUE INT; EXEC @RETURN_VALUE = [dbo].[UpdateUser] @Id = @P1; \
             SELECT @RETURN_VALUE AS [RETURN_VALUE];"
        );
    }

    #[test]
    fn test_build_call_rejects_bad_names() {
        let dialect = MssqlDialect::default();
        assert!(dialect.build_call("Save", &[param("@a=1;--")]).is_err());
    }
}
