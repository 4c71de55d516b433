//! Utilities shared by the network drivers.
//!
//! - [`runtime`]: blocking bridge over the async clients
//! - [`tls`]: TLS configuration for PostgreSQL and MySQL
//! - procedure name parsing

pub mod runtime;
pub mod tls;

pub use runtime::BlockingRuntime;
pub use tls::{SslMode, TlsBuilder};

/// Split a possibly qualified object name (`schema.proc`, `[dbo].[proc]`,
/// `"public"."fn"`) into its unquoted parts.
pub fn split_qualified(name: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut closing: Option<char> = None;

    let mut chars = name.trim().chars().peekable();
    while let Some(c) = chars.next() {
        match closing {
            Some(close) if c == close => {
                if chars.peek() == Some(&close) {
                    current.push(close);
                    chars.next();
                } else {
                    closing = None;
                }
            }
            Some(_) => current.push(c),
            None => match c {
                '[' => closing = Some(']'),
                '"' => closing = Some('"'),
                '`' => closing = Some('`'),
                '.' => parts.push(std::mem::take(&mut current)),
                c if c.is_whitespace() => {}
                c => current.push(c),
            },
        }
    }
    parts.push(current);
    parts.retain(|p| !p.is_empty());
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_qualified() {
        assert_eq!(split_qualified("dbo.GetUsers"), vec!["dbo", "GetUsers"]);
        assert_eq!(split_qualified("[my schema].[Get.Users]"), vec!["my schema", "Get.Users"]);
        assert_eq!(split_qualified("\"a\"\"b\".fn"), vec!["a\"b", "fn"]);
        assert_eq!(split_qualified("GetUsers"), vec!["GetUsers"]);
    }
}
