//! Exchange rate resolution.

use std::sync::Arc;

use bigdecimal::BigDecimal;
use jiff::Timestamp;

use crate::error::AppResult;
use crate::models::{Currency, Price};
use crate::repositories::CurrencyRepository;

/// Resolves rates from stored pairs: direct pair first, then the reverse pair
/// (`1 / rate`), then a cross rate through the pivot currency.
#[derive(Clone)]
pub struct CurrencyConverter {
    rates: Arc<dyn CurrencyRepository>,
    pivot: Currency,
}

impl CurrencyConverter {
    pub fn new(rates: Arc<dyn CurrencyRepository>, pivot: Currency) -> Self {
        Self { rates, pivot }
    }

    /// Rate turning one unit of `from` into `to` at instant `at`, or `None`
    /// when no combination of stored pairs covers it.
    pub async fn rate(
        &self,
        from: &Currency,
        to: &Currency,
        at: Timestamp,
    ) -> AppResult<Option<BigDecimal>> {
        if from == to {
            return Ok(Some(BigDecimal::from(1)));
        }
        if let Some(rate) = self.pair(from, to, at).await? {
            return Ok(Some(rate));
        }
        if from == &self.pivot || to == &self.pivot {
            return Ok(None);
        }

        let Some(to_pivot) = self.pair(from, &self.pivot, at).await? else {
            return Ok(None);
        };
        let Some(from_pivot) = self.pair(&self.pivot, to, at).await? else {
            return Ok(None);
        };
        Ok(Some(to_pivot * from_pivot))
    }

    pub async fn convert(&self, price: &Price, to: &Currency, at: Timestamp) -> AppResult<Option<Price>> {
        Ok(self
            .rate(&price.currency, to, at)
            .await?
            .map(|rate| price.convert(&rate, to)))
    }

    async fn pair(
        &self,
        from: &Currency,
        to: &Currency,
        at: Timestamp,
    ) -> AppResult<Option<BigDecimal>> {
        if let Some(rate) = self.rates.get_rate_at(from, to, at).await? {
            return Ok(Some(rate));
        }
        Ok(self
            .rates
            .get_rate_at(to, from, at)
            .await?
            .filter(|rate| *rate != BigDecimal::from(0))
            .map(|rate| rate.inverse()))
    }
}
