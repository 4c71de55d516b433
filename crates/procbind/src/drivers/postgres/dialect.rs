//! PostgreSQL function and procedure call syntax.
//!
//! Result sets come from set-returning functions (`SELECT * FROM fn(...)`);
//! arguments use named notation so their order does not matter.

use crate::core::traits::{check_param_name, BoundParam, Dialect};
use crate::error::Result;

/// PostgreSQL dialect.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    pub fn new() -> Self {
        Self
    }

    fn arguments(&self, params: &[BoundParam]) -> Result<String> {
        let mut args = Vec::with_capacity(params.len());
        for (i, param) in params.iter().enumerate() {
            let name = check_param_name(param)?;
            args.push(format!("{} => {}", name, self.param_placeholder(i + 1)));
        }
        Ok(args.join(", "))
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn build_call(&self, procedure: &str, params: &[BoundParam]) -> Result<String> {
        Ok(format!(
            "SELECT * FROM {}({})",
            self.qualify(procedure)?,
            self.arguments(params)?
        ))
    }

    fn build_return_value_call(&self, procedure: &str, params: &[BoundParam]) -> Result<String> {
        Ok(format!(
            "SELECT {}({})",
            self.qualify(procedure)?,
            self.arguments(params)?
        ))
    }

    fn build_execute(&self, procedure: &str, params: &[BoundParam]) -> Result<String> {
        Ok(format!(
            "CALL {}({})",
            self.qualify(procedure)?,
            self.arguments(params)?
        ))
    }

    fn identity_query(&self) -> &'static str {
        "SELECT lastval()"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{SqlType, SqlValue};
    use crate::params::DbType;

    fn param(name: &str) -> BoundParam {
        BoundParam {
            name: name.to_string(),
            db_type: DbType::VarChar,
            size: 0,
            precision: 0,
            value: SqlValue::Null(SqlType::String),
            type_name: None,
        }
    }

    #[test]
    fn test_quote_ident() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.quote_ident("users"), "\"users\"");
        assert_eq!(dialect.quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_build_call_uses_named_notation() {
        let dialect = PostgresDialect::new();
        assert_eq!(
            dialect
                .build_call("public.get_users", &[param("@Status"), param("@Region")])
                .unwrap(),
            "SELECT * FROM \"public\".\"get_users\"(Status => $1, Region => $2)"
        );
    }

    #[test]
    fn test_return_value_and_execute_shapes() {
        let dialect = PostgresDialect::new();
        assert_eq!(
            dialect.build_return_value_call("save_user", &[param("@Id")]).unwrap(),
            "SELECT \"save_user\"(Id => $1)"
        );
        assert_eq!(
            dialect.build_execute("purge", &[]).unwrap(),
            "CALL \"purge\"()"
        );
    }
}
