//! MySQL procedure call syntax.
//!
//! MySQL has no named arguments, so parameters are passed positionally in
//! declaration order.

use crate::core::traits::{check_param_name, BoundParam, Dialect};
use crate::error::Result;

/// MySQL dialect.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    pub fn new() -> Self {
        Self
    }

    fn placeholders(&self, params: &[BoundParam]) -> Result<String> {
        let mut args = Vec::with_capacity(params.len());
        for (i, param) in params.iter().enumerate() {
            check_param_name(param)?;
            args.push(self.param_placeholder(i + 1));
        }
        Ok(args.join(", "))
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn param_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn build_call(&self, procedure: &str, params: &[BoundParam]) -> Result<String> {
        Ok(format!(
            "CALL {}({})",
            self.qualify(procedure)?,
            self.placeholders(params)?
        ))
    }

    fn build_return_value_call(&self, procedure: &str, params: &[BoundParam]) -> Result<String> {
        Ok(format!(
            "SELECT {}({})",
            self.qualify(procedure)?,
            self.placeholders(params)?
        ))
    }

    fn identity_query(&self) -> &'static str {
        "SELECT LAST_INSERT_ID()"
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
        let dialect = MysqlDialect::new();
        assert_eq!(dialect.quote_ident("users"), "`users`");
        assert_eq!(dialect.quote_ident("a`b"), "`a``b`");
    }

    #[test]
    fn test_call_shapes() {
        let dialect = MysqlDialect::new();
        assert_eq!(
            dialect
                .build_call("shop.get_orders", &[param("@Id"), param("@Status")])
                .unwrap(),
            "CALL `shop`.`get_orders`(?, ?)"
        );
        assert_eq!(
            dialect.build_return_value_call("next_id", &[]).unwrap(),
            "SELECT `next_id`()"
        );
        assert_eq!(
            dialect.build_execute("purge", &[param("@Days")]).unwrap(),
            "CALL `purge`(?)"
        );
    }
}
