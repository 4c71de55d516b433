//! Security token gate for modifying calls.
//!
//! A client sends an encrypted token together with the unencrypted value it
//! was derived from. The gate regenerates the token from the unencrypted
//! value and today's date and lets the call through only on a match.

use chrono::{Datelike, Days, Local, NaiveDate, Weekday};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use crate::config::SecurityConfig;
use crate::error::{DataAccessError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Decides whether an encrypted/unencrypted token pair is valid.
pub trait TokenValidator: Send + Sync {
    fn validate(&self, encrypted: &str, unencrypted: &str) -> bool;
}

/// Accepts every token pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl TokenValidator for AllowAll {
    fn validate(&self, _encrypted: &str, _unencrypted: &str) -> bool {
        true
    }
}

/// Rejects every token pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

impl TokenValidator for DenyAll {
    fn validate(&self, _encrypted: &str, _unencrypted: &str) -> bool {
        false
    }
}

/// Date-bound tokens: `hex(HMAC-SHA256(secret, value || day-of-year || year
/// || weekday two days ahead))`.
///
/// Tokens therefore roll over at local midnight. With `encryption_used`
/// off the token is the plain concatenation.
#[derive(Clone)]
pub struct DailyTokenValidator {
    secret: Vec<u8>,
    encryption_used: bool,
    today: fn() -> NaiveDate,
}

impl DailyTokenValidator {
    pub fn new(secret: impl Into<Vec<u8>>, encryption_used: bool) -> Self {
        Self {
            secret: secret.into(),
            encryption_used,
            today: local_today,
        }
    }

    /// Build from the `security` configuration section.
    pub fn from_config(config: &SecurityConfig) -> Result<Self> {
        let secret = config.token_secret.as_deref().unwrap_or_default();
        if config.encryption_used && secret.is_empty() {
            return Err(DataAccessError::Config(
                "security.token_secret is required when encryption_used is true".to_string(),
            ));
        }
        Ok(Self::new(secret.as_bytes(), config.encryption_used))
    }

    /// Override the date source.
    pub fn with_clock(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Token for `unencrypted` as of today.
    pub fn generate(&self, unencrypted: &str) -> Result<String> {
        self.generate_on(unencrypted, (self.today)())
    }

    /// Token for `unencrypted` as of `date`.
    pub fn generate_on(&self, unencrypted: &str, date: NaiveDate) -> Result<String> {
        let plain = token_plaintext(unencrypted, date);
        if !self.encryption_used {
            return Ok(plain);
        }
        let mac = self.mac(&plain)?;
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn mac(&self, plain: &str) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| DataAccessError::Config(format!("Failed to create HMAC: {}", e)))?;
        mac.update(plain.as_bytes());
        Ok(mac)
    }
}

impl TokenValidator for DailyTokenValidator {
    fn validate(&self, encrypted: &str, unencrypted: &str) -> bool {
        let plain = token_plaintext(unencrypted, (self.today)());
        let valid = if self.encryption_used {
            match (hex::decode(encrypted.trim()), self.mac(&plain)) {
                (Ok(tag), Ok(mac)) => mac.verify_slice(&tag).is_ok(),
                _ => false,
            }
        } else {
            encrypted == plain
        };
        debug!(valid, "security token checked");
        valid
    }
}

impl std::fmt::Debug for DailyTokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DailyTokenValidator")
            .field("encryption_used", &self.encryption_used)
            .finish_non_exhaustive()
    }
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

fn token_plaintext(unencrypted: &str, date: NaiveDate) -> String {
    let ahead = date.checked_add_days(Days::new(2)).unwrap_or(date);
    format!(
        "{}{}{}{}",
        unencrypted,
        date.ordinal(),
        date.year(),
        weekday_name(ahead.weekday())
    )
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 10).unwrap()
    }

    #[test]
    fn test_plaintext_layout() {
        // 2024-02-10 is day 41; two days later is a Monday.
        assert_eq!(token_plaintext("client", fixed_day()), "client412024Monday");
    }

    #[test]
    fn test_unencrypted_tokens_compare_plainly() {
        let validator = DailyTokenValidator::new("", false).with_clock(fixed_day);
        assert!(validator.validate("client412024Monday", "client"));
        assert!(!validator.validate("client412024Tuesday", "client"));
    }

    #[test]
    fn test_hmac_tokens_round_trip() {
        let validator = DailyTokenValidator::new("s3cret", true).with_clock(fixed_day);
        let token = validator.generate("client").unwrap();
        assert_eq!(token.len(), 64);
        assert!(validator.validate(&token, "client"));
        assert!(!validator.validate(&token, "other"));
        assert!(!validator.validate("not hex", "client"));
    }

    #[test]
    fn test_token_changes_with_date() {
        let validator = DailyTokenValidator::new("s3cret", true);
        let a = validator.generate_on("client", fixed_day()).unwrap();
        let b = validator
            .generate_on("client", NaiveDate::from_ymd_opt(2024, 2, 11).unwrap())
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_from_config_requires_secret() {
        let config = SecurityConfig {
            token_secret: None,
            encryption_used: true,
        };
        assert!(DailyTokenValidator::from_config(&config).is_err());
    }
}
