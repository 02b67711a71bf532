//! Value Objects for the order engine

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};
use uuid::Uuid;

/// Monetary amount in the storefront currency.
///
/// Arithmetic is exact; `round` settles a value to cents, half away from zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self { Self(amount) }
    pub fn from_cents(cents: i64) -> Self { Self(Decimal::new(cents, 2)) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_zero(&self) -> bool { self.0.is_zero() }
    pub fn is_positive(&self) -> bool { self.0 > Decimal::ZERO }

    pub fn round(self) -> Self {
        Self(self.0.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }

    pub fn times(self, qty: u32) -> Self { Self(self.0 * Decimal::from(qty)) }

    pub fn saturating_sub(self, other: Money) -> Self {
        if other.0 >= self.0 { Self::ZERO } else { Self(self.0 - other.0) }
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money { Money(self.0 + rhs.0) }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money { Money(self.0 - rhs.0) }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self { iter.fold(Money::ZERO, |acc, m| acc + m) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2}", self.0) }
}

/// A discount or tax rate between 0 and 100 inclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Percentage(Decimal);

impl Percentage {
    pub const ZERO: Percentage = Percentage(Decimal::ZERO);

    /// Rejects anything outside `[0, 100]`; out-of-range rates are corrupt data, not input to clamp.
    pub fn new(value: Decimal) -> Result<Self, ValueError> {
        if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
            return Err(ValueError::InvalidPercentage(value));
        }
        Ok(Self(value.normalize()))
    }

    pub fn from_whole(value: u32) -> Result<Self, ValueError> { Self::new(Decimal::from(value)) }
    pub fn value(&self) -> Decimal { self.0 }
    pub fn is_zero(&self) -> bool { self.0.is_zero() }

    /// `price × (1 − p/100)`, rounded to cents.
    pub fn apply_to(&self, price: Money) -> Money {
        Money::new(price.amount() * (Decimal::ONE_HUNDRED - self.0) / Decimal::ONE_HUNDRED).round()
    }

    /// The share of `amount` this rate represents, rounded to cents.
    pub fn portion_of(&self, amount: Money) -> Money {
        Money::new(amount.amount() * self.0 / Decimal::ONE_HUNDRED).round()
    }
}

impl TryFrom<Decimal> for Percentage {
    type Error = ValueError;
    fn try_from(value: Decimal) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Percentage> for Decimal {
    fn from(p: Percentage) -> Decimal { p.0 }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}%", self.0) }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueError {
    #[error("percentage {0} is outside 0..=100")]
    InvalidPercentage(Decimal),
}

/// Sales channel partition of price and inventory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Wholesale to business buyers.
    B2b,
    /// Retail to individual consumers.
    B2c,
}

impl Channel {
    pub fn opposite(self) -> Self {
        match self { Self::B2b => Self::B2c, Self::B2c => Self::B2b }
    }
    pub fn as_str(&self) -> &'static str {
        match self { Self::B2b => "b2b", Self::B2c => "b2c" }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl std::str::FromStr for Channel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "b2b" => Ok(Self::B2b),
            "b2c" => Ok(Self::B2c),
            other => Err(format!("unknown channel {other}")),
        }
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }
            pub fn as_str(&self) -> &str { &self.0 }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self { Self(value.to_string()) }
        }
    };
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn generate() -> Self { Self(Uuid::now_v7()) }
            pub fn from_uuid(id: Uuid) -> Self { Self(id) }
            pub fn as_uuid(&self) -> Uuid { self.0 }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;
            fn from_str(s: &str) -> Result<Self, Self::Err> { Uuid::parse_str(s).map(Self) }
        }
    };
}

string_id!(ProductId);
string_id!(VariantId);
string_id!(CampaignId);
string_id!(CustomerId);
string_id!(BrandId);
string_id!(
    /// Regular-cart row key; see `LineId::for_selection`.
    LineId
);
uuid_id!(OrderId);
uuid_id!(PreorderId);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuyerKind {
    /// A registered business buying wholesale.
    Retailer,
    Consumer,
}

/// The ordering party.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: CustomerId,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    pub kind: BuyerKind,
}

impl Customer {
    pub fn channel(&self) -> Channel {
        match self.kind { BuyerKind::Retailer => Channel::B2b, BuyerKind::Consumer => Channel::B2c }
    }
}

/// Shipping destination frozen onto orders.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    pub street1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street2: Option<String>,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub zip: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_discount_scenario() {
        let p = Percentage::from_whole(15).unwrap();
        assert_eq!(p.apply_to(Money::new(dec!(58.00))), Money::new(dec!(49.30)));
    }

    #[test]
    fn test_zero_percent_is_identity() {
        let price = Money::new(dec!(12.34));
        assert_eq!(Percentage::ZERO.apply_to(price), price);
    }

    #[test]
    fn test_out_of_range_percentage_rejected() {
        assert!(Percentage::new(dec!(100.01)).is_err());
        assert!(Percentage::new(dec!(-1)).is_err());
        assert!(Percentage::new(dec!(100)).is_ok());
        assert!(serde_json::from_str::<Percentage>("\"150\"").is_err());
    }

    #[test]
    fn test_discount_never_exceeds_price() {
        let price = Money::new(dec!(19.99));
        for whole in 0..=100 {
            let p = Percentage::from_whole(whole).unwrap();
            let discounted = p.apply_to(price);
            assert!(discounted <= price);
            assert!(discounted >= Money::ZERO);
        }
    }

    #[test]
    fn test_money_rounding() {
        assert_eq!(Money::new(dec!(1.005)).round(), Money::new(dec!(1.01)));
        assert_eq!(Money::new(dec!(10)).saturating_sub(Money::new(dec!(12))), Money::ZERO);
    }

    #[test]
    fn test_channel_opposite() {
        assert_eq!(Channel::B2b.opposite(), Channel::B2c);
        assert_eq!("b2c".parse::<Channel>().unwrap(), Channel::B2c);
    }
}
