//! Account repository: the `users` table seen as accounts and preferences.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use jiff_diesel::ToDiesel;

use super::rows::{UserChangeset, UserRow};
use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult, EntityKind};
use crate::models::{Account, Currency, UserId};
use crate::repositories::{AccountRepository, UserRepository};
use crate::schema::users;

/// Account repository holding an async connection pool.
///
/// Since `AsyncDbPool` (bb8::Pool) internally uses `Arc`, cloning is cheap.
#[derive(Clone)]
pub struct PgAccountRepository {
    pool: AsyncDbPool,
}

impl PgAccountRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

/// Inserts the account or overwrites the stored one on `conn`, so callers
/// holding a transaction can include it.
pub(super) async fn upsert_account(conn: &mut AsyncPgConnection, account: &Account) -> QueryResult<usize> {
    let changes = UserChangeset::from_account(account);

    diesel::insert_into(users::table)
        .values(&changes)
        .on_conflict(users::id)
        .do_update()
        .set((
            users::plan_id.eq(excluded(users::plan_id)),
            users::role.eq(excluded(users::role)),
            users::family_id.eq(excluded(users::family_id)),
            users::preferred_currency.eq(excluded(users::preferred_currency)),
            users::updated_at.eq(excluded(users::updated_at)),
        ))
        .execute(conn)
        .await
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn get_by_id(&self, user: &UserId) -> AppResult<Option<Account>> {
        let mut conn = self.pool.get().await?;

        users::table
            .find(user.as_str())
            .select(UserRow::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .map(UserRow::into_account)
            .transpose()
    }

    async fn exists(&self, user: &UserId) -> AppResult<bool> {
        let mut conn = self.pool.get().await?;

        diesel::select(diesel::dsl::exists(users::table.find(user.as_str())))
            .get_result(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn save(&self, account: &Account) -> AppResult<()> {
        let mut conn = self.pool.get().await?;
        upsert_account(&mut conn, account).await?;
        Ok(())
    }

    async fn delete(&self, user: &UserId) -> AppResult<bool> {
        let mut conn = self.pool.get().await?;

        let deleted = diesel::delete(users::table.find(user.as_str()))
            .execute(&mut conn)
            .await?;
        Ok(deleted > 0)
    }
}

#[async_trait]
impl UserRepository for PgAccountRepository {
    async fn get_preferred_currency(&self, user: &UserId) -> AppResult<Option<Currency>> {
        let mut conn = self.pool.get().await?;

        let stored = users::table
            .find(user.as_str())
            .select(users::preferred_currency)
            .first::<Option<String>>(&mut conn)
            .await
            .optional()?
            .flatten();
        stored.map(|code| code.parse()).transpose()
    }

    async fn set_preferred_currency(&self, user: &UserId, currency: &Currency) -> AppResult<()> {
        let mut conn = self.pool.get().await?;

        let updated = diesel::update(users::table.find(user.as_str()))
            .set((
                users::preferred_currency.eq(currency.as_str()),
                users::updated_at.eq(jiff::Timestamp::now().to_diesel()),
            ))
            .execute(&mut conn)
            .await?;
        if updated == 0 {
            return Err(AppError::not_found(EntityKind::Account, user));
        }
        Ok(())
    }
}
