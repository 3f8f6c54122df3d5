//! Label repository for async database operations.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use super::rows::LabelRow;
use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult, EntityKind};
use crate::models::{Aggregate, Label, LabelId, UserId};
use crate::repositories::scope::visible_to;
use crate::repositories::{LabelRepository, Paginated, Pagination};
use crate::schema::labels;

/// Label repository holding an async connection pool.
#[derive(Clone)]
pub struct PgLabelRepository {
    pool: AsyncDbPool,
}

impl PgLabelRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LabelRepository for PgLabelRepository {
    async fn get_by_id(&self, id: LabelId) -> AppResult<Option<Label>> {
        let mut conn = self.pool.get().await?;

        labels::table
            .find(id.into_uuid())
            .select(LabelRow::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .map(LabelRow::into_label)
            .transpose()
    }

    async fn get_by_id_for_user(&self, user: &UserId, id: LabelId) -> AppResult<Option<Label>> {
        let mut conn = self.pool.get().await?;

        labels::table
            .filter(labels::id.eq(id.into_uuid()))
            .filter(visible_to!(labels, user.as_str()))
            .select(LabelRow::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .map(LabelRow::into_label)
            .transpose()
    }

    /// Lists labels visible to `user`, ordered by id.
    ///
    /// # Arguments
    /// * `user` - Principal whose scope applies
    /// * `page` - Offset and limit
    ///
    /// # Returns
    /// The requested page and the total number of visible labels
    async fn get_all_for_user(
        &self,
        user: &UserId,
        page: Pagination,
    ) -> AppResult<Paginated<Label>> {
        let mut conn = self.pool.get().await?;

        let total = labels::table
            .filter(visible_to!(labels, user.as_str()))
            .count()
            .get_result::<i64>(&mut conn)
            .await?;

        let rows = labels::table
            .filter(visible_to!(labels, user.as_str()))
            .order(labels::id.asc())
            .limit(page.limit)
            .offset(page.offset)
            .select(LabelRow::as_select())
            .load(&mut conn)
            .await?;

        Ok(Paginated {
            items: rows
                .into_iter()
                .map(LabelRow::into_label)
                .collect::<AppResult<_>>()?,
            total,
        })
    }

    async fn exists(&self, id: LabelId) -> AppResult<bool> {
        let mut conn = self.pool.get().await?;

        diesel::select(diesel::dsl::exists(labels::table.find(id.into_uuid())))
            .get_result(&mut conn)
            .await
            .map_err(AppError::from)
    }

    /// Inserts a new label or updates a dirty one guarded by its loaded etag.
    ///
    /// # Errors
    /// `AppError::StaleEntity` when the stored etag moved since loading
    async fn save(&self, label: &mut Label) -> AppResult<()> {
        if !label.has_changes() {
            return Ok(());
        }
        let mut conn = self.pool.get().await?;
        let row = LabelRow::from_label(label);

        let written = match label.loaded_etag() {
            None => {
                diesel::insert_into(labels::table)
                    .values(&row)
                    .on_conflict_do_nothing()
                    .execute(&mut conn)
                    .await?
            }
            Some(loaded) => {
                diesel::update(
                    labels::table
                        .filter(labels::id.eq(row.id))
                        .filter(labels::etag.eq(loaded)),
                )
                .set(&row)
                .execute(&mut conn)
                .await?
            }
        };
        if written == 0 {
            tracing::debug!(label_id = %label.id(), "Rejected stale label save");
            return Err(AppError::stale(EntityKind::Label, label.id()));
        }

        label.clean();
        Ok(())
    }

    async fn delete(&self, id: LabelId) -> AppResult<bool> {
        let mut conn = self.pool.get().await?;
        let id: Uuid = id.into_uuid();

        let deleted = diesel::delete(labels::table.find(id))
            .execute(&mut conn)
            .await?;
        Ok(deleted > 0)
    }
}
