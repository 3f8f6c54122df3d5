//! Subscription repository for async database operations.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use super::group_pairs;
use super::rows::{SubscriptionChildren, SubscriptionRow};
use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult, EntityKind};
use crate::models::{Aggregate, Subscription, SubscriptionId, UserId};
use crate::repositories::scope::visible_to;
use crate::repositories::{Paginated, Pagination, SubscriptionRepository};
use crate::schema::{subscription_family_users, subscription_labels, subscriptions};

/// Subscription repository holding an async connection pool.
#[derive(Clone)]
pub struct PgSubscriptionRepository {
    pool: AsyncDbPool,
}

impl PgSubscriptionRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }

    /// Loads label and family-user links for a page of rows.
    async fn hydrate(
        conn: &mut AsyncPgConnection,
        rows: Vec<SubscriptionRow>,
    ) -> AppResult<Vec<Subscription>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

        let labels = subscription_labels::table
            .filter(subscription_labels::subscription_id.eq_any(&ids))
            .select((subscription_labels::subscription_id, subscription_labels::label_id))
            .order(subscription_labels::label_id.asc())
            .load::<(Uuid, Uuid)>(conn)
            .await?;
        let users = subscription_family_users::table
            .filter(subscription_family_users::subscription_id.eq_any(&ids))
            .select((
                subscription_family_users::subscription_id,
                subscription_family_users::family_member_id,
            ))
            .order(subscription_family_users::family_member_id.asc())
            .load::<(Uuid, Uuid)>(conn)
            .await?;

        let mut labels = group_pairs(labels);
        let mut users = group_pairs(users);
        rows.into_iter()
            .map(|row| {
                let children = SubscriptionChildren {
                    labels: labels.remove(&row.id).unwrap_or_default(),
                    family_users: users.remove(&row.id).unwrap_or_default(),
                };
                row.into_subscription(children)
            })
            .collect()
    }
}

#[async_trait]
impl SubscriptionRepository for PgSubscriptionRepository {
    async fn get_by_id(&self, id: SubscriptionId) -> AppResult<Option<Subscription>> {
        let mut conn = self.pool.get().await?;

        let row = subscriptions::table
            .find(id.into_uuid())
            .select(SubscriptionRow::as_select())
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
        id: SubscriptionId,
    ) -> AppResult<Option<Subscription>> {
        let mut conn = self.pool.get().await?;

        let row = subscriptions::table
            .filter(subscriptions::id.eq(id.into_uuid()))
            .filter(visible_to!(subscriptions, user.as_str()))
            .select(SubscriptionRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        match row {
            Some(row) => Ok(Self::hydrate(&mut conn, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    /// Lists subscriptions visible to `user`, ordered by id.
    ///
    /// # Arguments
    /// * `user` - Principal whose scope applies
    /// * `page` - Offset and limit
    ///
    /// # Returns
    /// The requested page and the total number of visible subscriptions
    async fn get_all_for_user(
        &self,
        user: &UserId,
        page: Pagination,
    ) -> AppResult<Paginated<Subscription>> {
        let mut conn = self.pool.get().await?;

        let total = subscriptions::table
            .filter(visible_to!(subscriptions, user.as_str()))
            .count()
            .get_result::<i64>(&mut conn)
            .await?;

        let rows = subscriptions::table
            .filter(visible_to!(subscriptions, user.as_str()))
            .order(subscriptions::id.asc())
            .limit(page.limit)
            .offset(page.offset)
            .select(SubscriptionRow::as_select())
            .load(&mut conn)
            .await?;

        Ok(Paginated {
            items: Self::hydrate(&mut conn, rows).await?,
            total,
        })
    }

    async fn exists(&self, id: SubscriptionId) -> AppResult<bool> {
        let mut conn = self.pool.get().await?;

        diesel::select(diesel::dsl::exists(subscriptions::table.find(id.into_uuid())))
            .get_result(&mut conn)
            .await
            .map_err(AppError::from)
    }

    /// Persists the subscription row plus changed label and family-user
    /// links, in one transaction.
    ///
    /// # Errors
    /// `AppError::StaleEntity` when the stored etag moved since loading
    async fn save(&self, subscription: &mut Subscription) -> AppResult<()> {
        if !subscription.has_changes() {
            return Ok(());
        }
        let mut conn = self.pool.get().await?;

        let row = SubscriptionRow::from_subscription(subscription)?;
        let loaded = subscription.loaded_etag().map(str::to_string);
        let labels = subscription.labels();
        let added_labels: Vec<Uuid> = labels.added().map(|l| l.into_uuid()).collect();
        let removed_labels: Vec<Uuid> = labels.removed().map(|l| l.into_uuid()).collect();
        let users = subscription.family_users();
        let added_users: Vec<Uuid> = users.added().map(|m| m.into_uuid()).collect();
        let removed_users: Vec<Uuid> = users.removed().map(|m| m.into_uuid()).collect();

        let saved = conn
            .transaction::<_, AppError, _>(|conn| {
                async move {
                    let written = match loaded {
                        None => {
                            diesel::insert_into(subscriptions::table)
                                .values(&row)
                                .on_conflict_do_nothing()
                                .execute(conn)
                                .await?
                        }
                        Some(etag) => {
                            diesel::update(
                                subscriptions::table
                                    .filter(subscriptions::id.eq(row.id))
                                    .filter(subscriptions::etag.eq(etag)),
                            )
                            .set(&row)
                            .execute(conn)
                            .await?
                        }
                    };
                    if written == 0 {
                        return Ok(false);
                    }

                    if !removed_labels.is_empty() {
                        diesel::delete(
                            subscription_labels::table
                                .filter(subscription_labels::subscription_id.eq(row.id))
                                .filter(subscription_labels::label_id.eq_any(&removed_labels)),
                        )
                        .execute(conn)
                        .await?;
                    }
                    if !added_labels.is_empty() {
                        let links: Vec<_> = added_labels
                            .iter()
                            .map(|label| {
                                (
                                    subscription_labels::subscription_id.eq(row.id),
                                    subscription_labels::label_id.eq(*label),
                                )
                            })
                            .collect();
                        diesel::insert_into(subscription_labels::table)
                            .values(links)
                            .on_conflict_do_nothing()
                            .execute(conn)
                            .await?;
                    }

                    if !removed_users.is_empty() {
                        diesel::delete(
                            subscription_family_users::table
                                .filter(subscription_family_users::subscription_id.eq(row.id))
                                .filter(
                                    subscription_family_users::family_member_id
                                        .eq_any(&removed_users),
                                ),
                        )
                        .execute(conn)
                        .await?;
                    }
                    if !added_users.is_empty() {
                        let links: Vec<_> = added_users
                            .iter()
                            .map(|member| {
                                (
                                    subscription_family_users::subscription_id.eq(row.id),
                                    subscription_family_users::family_member_id.eq(*member),
                                )
                            })
                            .collect();
                        diesel::insert_into(subscription_family_users::table)
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
            tracing::debug!(subscription_id = %subscription.id(), "Rejected stale subscription save");
            return Err(AppError::stale(EntityKind::Subscription, subscription.id()));
        }
        subscription.clean();
        Ok(())
    }

    async fn delete(&self, id: SubscriptionId) -> AppResult<bool> {
        let mut conn = self.pool.get().await?;

        let deleted = diesel::delete(subscriptions::table.find(id.into_uuid()))
            .execute(&mut conn)
            .await?;
        Ok(deleted > 0)
    }
}
