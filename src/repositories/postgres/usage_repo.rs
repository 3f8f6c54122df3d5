//! Usage counters derived from stored rows.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use jiff::Timestamp;
use jiff_diesel::ToDiesel;
use uuid::Uuid;

use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult};
use crate::models::{Feature, OwnerType, UserId};
use crate::repositories::UsageRepository;
use crate::repositories::scope::visible_to;
use crate::schema::{family_members, labels, providers, subscriptions};

#[derive(Clone)]
pub struct PgUsageRepository {
    pool: AsyncDbPool,
}

impl PgUsageRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageRepository for PgUsageRepository {
    /// Counts rows the user owns, personally or through their family, that
    /// the feature limits. System rows never count.
    async fn count(&self, user: &UserId, feature: Feature, now: Timestamp) -> AppResult<i64> {
        let mut conn = self.pool.get().await?;
        let user = user.as_str();

        let count = match feature {
            Feature::ActiveSubscriptionsCount => {
                subscriptions::table
                    .filter(visible_to!(subscriptions, user))
                    .filter(subscriptions::owner_type.ne(OwnerType::System))
                    .filter(subscriptions::start_date.le(now.to_diesel()))
                    .filter(
                        subscriptions::end_date
                            .is_null()
                            .or(subscriptions::end_date.ge(now.to_diesel())),
                    )
                    .count()
                    .get_result::<i64>(&mut conn)
                    .await?
            }
            Feature::CustomProvidersCount => {
                providers::table
                    .filter(visible_to!(providers, user))
                    .filter(providers::owner_type.ne(OwnerType::System))
                    .count()
                    .get_result::<i64>(&mut conn)
                    .await?
            }
            Feature::CustomLabelsCount => {
                labels::table
                    .filter(visible_to!(labels, user))
                    .filter(labels::owner_type.ne(OwnerType::System))
                    .count()
                    .get_result::<i64>(&mut conn)
                    .await?
            }
            Feature::FamilyMembersCount => {
                let family_id = family_members::table
                    .filter(family_members::user_id.eq(user))
                    .select(family_members::family_id)
                    .first::<Uuid>(&mut conn)
                    .await
                    .optional()?;
                match family_id {
                    Some(family_id) => {
                        family_members::table
                            .filter(family_members::family_id.eq(family_id))
                            .count()
                            .get_result::<i64>(&mut conn)
                            .await?
                    }
                    None => 0,
                }
            }
            Feature::MayExport => return Err(AppError::CannotGetQuotaOnFeature { feature }),
        };
        Ok(count)
    }
}
