//! Environment configuration.

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::domain::services::checkout::CheckoutConfig;
use crate::domain::value_objects::{Money, Percentage};

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    pub nats_subject: String,
    pub currency: String,
    pub checkout: CheckoutConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl Config {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match var("PORT") {
            Some(raw) => raw.parse().map_err(|e: std::num::ParseIntError| invalid("PORT", e))?,
            None => 8083,
        };
        let tax_rate = match var("TAX_RATE_PERCENT") {
            Some(raw) => {
                let value = Decimal::from_str(&raw).map_err(|e| invalid("TAX_RATE_PERCENT", e))?;
                Percentage::new(value).map_err(|e| invalid("TAX_RATE_PERCENT", e))?
            }
            None => Percentage::ZERO,
        };
        let flat_shipping = match var("FLAT_SHIPPING") {
            Some(raw) => {
                let value = Decimal::from_str(&raw).map_err(|e| invalid("FLAT_SHIPPING", e))?;
                if value.is_sign_negative() {
                    return Err(invalid("FLAT_SHIPPING", "must not be negative"));
                }
                Money::new(value).round()
            }
            None => Money::ZERO,
        };
        let defaults = CheckoutConfig::default();

        Ok(Self {
            port,
            database_url: var("DATABASE_URL"),
            nats_url: var("NATS_URL"),
            nats_subject: var("NATS_SUBJECT").unwrap_or_else(|| "marketplace.orders.status".into()),
            currency: var("CURRENCY").unwrap_or_else(|| "USD".into()).to_ascii_uppercase(),
            checkout: CheckoutConfig {
                success_url: var("CHECKOUT_SUCCESS_URL").unwrap_or(defaults.success_url),
                cancel_url: var("CHECKOUT_CANCEL_URL").unwrap_or(defaults.cancel_url),
                tax_rate,
                flat_shipping,
            },
        })
    }
}

fn invalid(var: &'static str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid { var, reason: reason.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from(&[]).unwrap();
        assert_eq!(config.port, 8083);
        assert!(config.database_url.is_none());
        assert_eq!(config.nats_subject, "marketplace.orders.status");
        assert_eq!(config.currency, "USD");
        assert!(config.checkout.tax_rate.is_zero());
    }

    #[test]
    fn test_overrides() {
        let config = from(&[("PORT", "9000"), ("TAX_RATE_PERCENT", "7.5"), ("FLAT_SHIPPING", "4.99"), ("CURRENCY", "krw")]).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.checkout.tax_rate.value(), dec!(7.5));
        assert_eq!(config.checkout.flat_shipping, Money::new(dec!(4.99)));
        assert_eq!(config.currency, "KRW");
    }

    #[test]
    fn test_invalid_values_name_the_variable() {
        let err = from(&[("TAX_RATE_PERCENT", "120")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "TAX_RATE_PERCENT", .. }));
        let err = from(&[("PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().starts_with("PORT is invalid"));
        assert!(from(&[("FLAT_SHIPPING", "-1")]).is_err());
    }
}
