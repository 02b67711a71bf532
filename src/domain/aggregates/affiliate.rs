//! Affiliate discount codes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use crate::domain::value_objects::Percentage;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffiliateCode {
    pub id: String,
    pub code: String,
    #[serde(default)]
    pub affiliate_id: Option<String>,
    pub discount_percent: Percentage,
    #[serde(default)]
    pub max_usage: Option<u32>,
    #[serde(default)]
    pub usage_count: u32,
    pub active: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection { Unknown, Inactive, Expired, UsageExhausted }

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unknown => "unknown code",
            Self::Inactive => "code is disabled",
            Self::Expired => "code has expired",
            Self::UsageExhausted => "code has reached its usage limit",
        })
    }
}

impl AffiliateCode {
    /// Checked on every use, including codes already attached to a cart.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), Rejection> {
        if !self.active {
            return Err(Rejection::Inactive);
        }
        if self.expires_at.is_some_and(|at| at <= now) {
            return Err(Rejection::Expired);
        }
        if self.max_usage.is_some_and(|max| self.usage_count >= max) {
            return Err(Rejection::UsageExhausted);
        }
        Ok(())
    }

    pub fn matches(&self, code: &str) -> bool { self.code.eq_ignore_ascii_case(code.trim()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn demo10() -> AffiliateCode {
        AffiliateCode {
            id: "aff-1".into(), code: "DEMO10".into(), affiliate_id: None,
            discount_percent: Percentage::from_whole(10).unwrap(),
            max_usage: Some(100), usage_count: 15, active: true, expires_at: None,
        }
    }

    #[test]
    fn test_valid_code() {
        assert!(demo10().validate(Utc::now()).is_ok());
        assert!(demo10().matches(" demo10 "));
    }

    #[test]
    fn test_rejections() {
        let now = Utc::now();
        let mut code = demo10();
        code.active = false;
        assert_eq!(code.validate(now), Err(Rejection::Inactive));

        let mut code = demo10();
        code.expires_at = Some(now - Duration::minutes(1));
        assert_eq!(code.validate(now), Err(Rejection::Expired));

        let mut code = demo10();
        code.usage_count = 100;
        assert_eq!(code.validate(now), Err(Rejection::UsageExhausted));
    }
}
