//! Exchange rates keyed by pair and effective instant.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use jiff::Timestamp;
use jiff_diesel::ToDiesel;

use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult};
use crate::models::{Currency, ensure_positive_rate};
use crate::repositories::CurrencyRepository;
use crate::schema::currency_rates;

#[derive(Clone)]
pub struct PgCurrencyRepository {
    pool: AsyncDbPool,
}

impl PgCurrencyRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CurrencyRepository for PgCurrencyRepository {
    async fn get_rate_at(
        &self,
        from: &Currency,
        to: &Currency,
        at: Timestamp,
    ) -> AppResult<Option<BigDecimal>> {
        let mut conn = self.pool.get().await?;

        currency_rates::table
            .filter(currency_rates::from_currency.eq(from.as_str()))
            .filter(currency_rates::to_currency.eq(to.as_str()))
            .filter(currency_rates::effective_at.le(at.to_diesel()))
            .order(currency_rates::effective_at.desc())
            .select(currency_rates::rate)
            .first::<BigDecimal>(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)
    }

    async fn save_rate(
        &self,
        from: &Currency,
        to: &Currency,
        rate: BigDecimal,
        effective_at: Timestamp,
    ) -> AppResult<()> {
        ensure_positive_rate(&rate)?;
        let mut conn = self.pool.get().await?;

        diesel::insert_into(currency_rates::table)
            .values((
                currency_rates::from_currency.eq(from.as_str()),
                currency_rates::to_currency.eq(to.as_str()),
                currency_rates::rate.eq(rate.clone()),
                currency_rates::effective_at.eq(effective_at.to_diesel()),
            ))
            .on_conflict((
                currency_rates::from_currency,
                currency_rates::to_currency,
                currency_rates::effective_at,
            ))
            .do_update()
            .set(currency_rates::rate.eq(rate))
            .execute(&mut conn)
            .await?;
        Ok(())
    }
}
