use std::fmt;
use std::str::FromStr;

use bigdecimal::{BigDecimal, RoundingMode};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// ISO 4217 style currency code, always three uppercase ASCII letters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Currency {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        if code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase()) {
            Ok(Self(code))
        } else {
            Err(AppError::validation(
                "currency",
                format!("'{}' is not a three-letter currency code", s),
            ))
        }
    }
}

impl TryFrom<String> for Currency {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An amount in a given currency.
///
/// Amounts are exact decimals and serialize as decimal strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub amount: BigDecimal,
    pub currency: Currency,
}

impl Price {
    pub fn new(amount: BigDecimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Same price expressed in another currency at the given rate.
    pub fn convert(&self, rate: &BigDecimal, target: &Currency) -> Price {
        Price::new(&self.amount * rate, target.clone())
    }

    pub fn rounded(&self) -> Price {
        Price::new(round_cents(&self.amount), self.currency.clone())
    }
}

/// Rejects exchange rates that are zero or negative.
pub fn ensure_positive_rate(rate: &BigDecimal) -> AppResult<()> {
    if *rate > BigDecimal::from(0) {
        Ok(())
    } else {
        Err(AppError::validation("rate", "must be a positive number"))
    }
}

/// Rounds half away from zero to two decimals.
pub fn round_cents(amount: &BigDecimal) -> BigDecimal {
    amount.with_scale_round(2, RoundingMode::HalfUp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_normalizes_case() {
        let c: Currency = "eur".parse().unwrap();
        assert_eq!(c.as_str(), "EUR");
        assert!("EURO".parse::<Currency>().is_err());
        assert!("E1R".parse::<Currency>().is_err());
    }

    #[test]
    fn test_currency_deserialization_validates() {
        let ok: Currency = serde_json::from_str("\"usd\"").unwrap();
        assert_eq!(ok, Currency::usd());
        assert!(serde_json::from_str::<Currency>("\"dollars\"").is_err());
    }

    fn dec(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_round_cents_half_away_from_zero() {
        assert_eq!(round_cents(&dec("1.005")), dec("1.01"));
        assert_eq!(round_cents(&dec("-1.005")), dec("-1.01"));
        assert_eq!(round_cents(&dec("0.005")), dec("0.01"));
        assert_eq!(round_cents(&dec("11.104999")), dec("11.1"));
        assert_eq!(round_cents(&dec("133.2")), dec("133.20"));
    }

    #[test]
    fn test_convert_is_exact() {
        let price = Price::new(dec("0.1"), Currency::usd());
        let eur: Currency = "EUR".parse().unwrap();
        let converted = price.convert(&dec("3"), &eur);
        assert_eq!(converted.amount, dec("0.3"));
        assert_eq!(converted.currency, eur);
    }

    #[test]
    fn test_price_serializes_amount_as_decimal_string() {
        let price = Price::new(dec("9.99"), Currency::usd());
        let json = serde_json::to_value(&price).unwrap();
        assert_eq!(json["amount"], "9.99");

        let parsed: Price = serde_json::from_str(r#"{"amount": "9.99", "currency": "usd"}"#).unwrap();
        assert_eq!(parsed, price);
        let whole: Price = serde_json::from_str(r#"{"amount": 10, "currency": "USD"}"#).unwrap();
        assert_eq!(whole.amount, dec("10"));
    }
}
