//! Provider repository for async database operations.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use super::group_pairs;
use super::rows::ProviderRow;
use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult, EntityKind};
use crate::models::{Aggregate, Provider, ProviderId, UserId};
use crate::repositories::scope::visible_to;
use crate::repositories::{Paginated, Pagination, ProviderRepository};
use crate::schema::{provider_labels, providers};

/// Provider repository holding an async connection pool.
#[derive(Clone)]
pub struct PgProviderRepository {
    pool: AsyncDbPool,
}

impl PgProviderRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }

    /// Attaches label ids to already loaded provider rows.
    async fn hydrate(conn: &mut AsyncPgConnection, rows: Vec<ProviderRow>) -> AppResult<Vec<Provider>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let pairs = provider_labels::table
            .filter(provider_labels::provider_id.eq_any(&ids))
            .select((provider_labels::provider_id, provider_labels::label_id))
            .order(provider_labels::label_id.asc())
            .load::<(Uuid, Uuid)>(conn)
            .await?;
        let mut labels = group_pairs(pairs);

        rows.into_iter()
            .map(|row| {
                let attached = labels.remove(&row.id).unwrap_or_default();
                row.into_provider(attached)
            })
            .collect()
    }
}

#[async_trait]
impl ProviderRepository for PgProviderRepository {
    async fn get_by_id(&self, id: ProviderId) -> AppResult<Option<Provider>> {
        let mut conn = self.pool.get().await?;

        let row = providers::table
            .find(id.into_uuid())
            .select(ProviderRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        match row {
            Some(row) => Ok(Self::hydrate(&mut conn, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn get_by_id_for_user(
        &self,
        user: &UserId,
        id: ProviderId,
    ) -> AppResult<Option<Provider>> {
        let mut conn = self.pool.get().await?;

        let row = providers::table
            .filter(providers::id.eq(id.into_uuid()))
            .filter(visible_to!(providers, user.as_str()))
            .select(ProviderRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        match row {
            Some(row) => Ok(Self::hydrate(&mut conn, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn get_all_for_user(
        &self,
        user: &UserId,
        page: Pagination,
    ) -> AppResult<Paginated<Provider>> {
        let mut conn = self.pool.get().await?;

        let total = providers::table
            .filter(visible_to!(providers, user.as_str()))
            .count()
            .get_result::<i64>(&mut conn)
            .await?;

        let rows = providers::table
            .filter(visible_to!(providers, user.as_str()))
            .order(providers::id.asc())
            .limit(page.limit)
            .offset(page.offset)
            .select(ProviderRow::as_select())
            .load(&mut conn)
            .await?;

        Ok(Paginated {
            items: Self::hydrate(&mut conn, rows).await?,
            total,
        })
    }

    async fn exists(&self, id: ProviderId) -> AppResult<bool> {
        let mut conn = self.pool.get().await?;

        diesel::select(diesel::dsl::exists(providers::table.find(id.into_uuid())))
            .get_result(&mut conn)
            .await
            .map_err(AppError::from)
    }

    /// Persists the provider row and the label links that changed, in one
    /// transaction.
    ///
    /// # Errors
    /// `AppError::StaleEntity` when the stored etag moved since loading
    async fn save(&self, provider: &mut Provider) -> AppResult<()> {
        if !provider.has_changes() {
            return Ok(());
        }
        let mut conn = self.pool.get().await?;

        let row = ProviderRow::from_provider(provider);
        let loaded = provider.loaded_etag().map(str::to_string);
        let added: Vec<Uuid> = provider.labels().added().map(|l| l.into_uuid()).collect();
        let removed: Vec<Uuid> = provider.labels().removed().map(|l| l.into_uuid()).collect();

        let saved = conn
            .transaction::<_, AppError, _>(|conn| {
                async move {
                    let written = match loaded {
                        None => {
                            diesel::insert_into(providers::table)
                                .values(&row)
                                .on_conflict_do_nothing()
                                .execute(conn)
                                .await?
                        }
                        Some(etag) => {
                            diesel::update(
                                providers::table
                                    .filter(providers::id.eq(row.id))
                                    .filter(providers::etag.eq(etag)),
                            )
                            .set(&row)
                            .execute(conn)
                            .await?
                        }
                    };
                    if written == 0 {
                        return Ok(false);
                    }

                    if !removed.is_empty() {
                        diesel::delete(
                            provider_labels::table
                                .filter(provider_labels::provider_id.eq(row.id))
                                .filter(provider_labels::label_id.eq_any(&removed)),
                        )
                        .execute(conn)
                        .await?;
                    }
                    if !added.is_empty() {
                        let links: Vec<_> = added
                            .iter()
                            .map(|label| {
                                (
                                    provider_labels::provider_id.eq(row.id),
                                    provider_labels::label_id.eq(*label),
                                )
                            })
                            .collect();
                        diesel::insert_into(provider_labels::table)
                            .values(links)
                            .on_conflict_do_nothing()
                            .execute(conn)
                            .await?;
                    }
                    Ok(true)
                }
                .scope_boxed()
            })
            .await?;

        if !saved {
            tracing::debug!(provider_id = %provider.id(), "Rejected stale provider save");
            return Err(AppError::stale(EntityKind::Provider, provider.id()));
        }
        provider.clean();
        Ok(())
    }

    /// Deletes the provider; its subscriptions and label links cascade.
    async fn delete(&self, id: ProviderId) -> AppResult<bool> {
        let mut conn = self.pool.get().await?;

        let deleted = diesel::delete(providers::table.find(id.into_uuid()))
            .execute(&mut conn)
            .await?;
        Ok(deleted > 0)
    }
}
