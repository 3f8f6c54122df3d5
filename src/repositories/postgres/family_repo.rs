//! Family repository for async database operations.
//!
//! Members live in their own table and are written per tracked partition:
//! added members are inserted, updated ones rewritten, removed ones deleted.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use super::account_repo::upsert_account;
use super::rows::{FamilyRow, MemberRow};
use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult, EntityKind};
use crate::models::{Account, Aggregate, Family, FamilyId, MemberType, UserId};
use crate::repositories::FamilyRepository;
use crate::schema::{families, family_members};

/// Family repository holding an async connection pool.
#[derive(Clone)]
pub struct PgFamilyRepository {
    pool: AsyncDbPool,
}

impl PgFamilyRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }

    async fn load(conn: &mut AsyncPgConnection, id: Uuid) -> AppResult<Option<Family>> {
        let Some(row) = families::table
            .find(id)
            .select(FamilyRow::as_select())
            .first(conn)
            .await
            .optional()?
        else {
            return Ok(None);
        };

        let members = family_members::table
            .filter(family_members::family_id.eq(id))
            .order(family_members::created_at.asc())
            .select(MemberRow::as_select())
            .load(conn)
            .await?;
        Ok(Some(row.into_family(members)))
    }
}

#[async_trait]
impl FamilyRepository for PgFamilyRepository {
    async fn get_by_id(&self, id: FamilyId) -> AppResult<Option<Family>> {
        let mut conn = self.pool.get().await?;
        Self::load(&mut conn, id.into_uuid()).await
    }

    async fn get_by_id_for_user(&self, user: &UserId, id: FamilyId) -> AppResult<Option<Family>> {
        if self.member_type_of(id, user).await?.is_none() {
            return Ok(None);
        }
        self.get_by_id(id).await
    }

    async fn get_for_user(&self, user: &UserId) -> AppResult<Option<Family>> {
        let mut conn = self.pool.get().await?;

        let family_id = family_members::table
            .filter(family_members::user_id.eq(user.as_str()))
            .select(family_members::family_id)
            .first::<Uuid>(&mut conn)
            .await
            .optional()?;
        match family_id {
            Some(id) => Self::load(&mut conn, id).await,
            None => Ok(None),
        }
    }

    async fn member_type_of(&self, id: FamilyId, user: &UserId) -> AppResult<Option<MemberType>> {
        let mut conn = self.pool.get().await?;

        family_members::table
            .filter(family_members::family_id.eq(id.into_uuid()))
            .filter(family_members::user_id.eq(user.as_str()))
            .select(family_members::member_type)
            .first(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)
    }

    async fn exists(&self, id: FamilyId) -> AppResult<bool> {
        let mut conn = self.pool.get().await?;

        diesel::select(diesel::dsl::exists(families::table.find(id.into_uuid())))
            .get_result(&mut conn)
            .await
            .map_err(AppError::from)
    }

    /// Persists the family row, its changed members and `accounts` in one
    /// transaction. Removed members take their payer and family-user links
    /// with them through the schema.
    ///
    /// # Errors
    /// `AppError::StaleEntity` when the stored etag moved since loading
    async fn save_with_accounts(&self, family: &mut Family, accounts: &[Account]) -> AppResult<()> {
        if !family.has_changes() && accounts.is_empty() {
            return Ok(());
        }
        let mut conn = self.pool.get().await?;

        let row = family.has_changes().then(|| FamilyRow::from_family(family));
        let loaded = family.loaded_etag().map(str::to_string);
        let added: Vec<MemberRow> = family.members().added().map(MemberRow::from_member).collect();
        let updated: Vec<MemberRow> = family.members().updated().map(MemberRow::from_member).collect();
        let removed: Vec<Uuid> = family.members().removed().map(|m| m.into_uuid()).collect();

        let saved = conn
            .transaction::<_, AppError, _>(|conn| {
                async move {
                    if let Some(row) = row {
                        let written = match loaded {
                            None => {
                                diesel::insert_into(families::table)
                                    .values(&row)
                                    .on_conflict_do_nothing()
                                    .execute(conn)
                                    .await?
                            }
                            Some(etag) => {
                                diesel::update(
                                    families::table
                                        .filter(families::id.eq(row.id))
                                        .filter(families::etag.eq(etag)),
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
                                family_members::table
                                    .filter(family_members::family_id.eq(row.id))
                                    .filter(family_members::id.eq_any(&removed)),
                            )
                            .execute(conn)
                            .await?;
                        }
                        for member in &updated {
                            diesel::update(family_members::table.find(member.id))
                                .set(member)
                                .execute(conn)
                                .await?;
                        }
                        if !added.is_empty() {
                            diesel::insert_into(family_members::table)
                                .values(&added)
                                .execute(conn)
                                .await?;
                        }
                    }
                    for account in accounts {
                        upsert_account(conn, account).await?;
                    }
                    Ok(true)
                }
                .scope_boxed()
            })
            .await?;

        if !saved {
            tracing::debug!(family_id = %family.id(), "Rejected stale family save");
            return Err(AppError::stale(EntityKind::Family, family.id()));
        }
        family.clean();
        Ok(())
    }

    /// Deletes the family. Members and family-owned entities cascade and
    /// accounts pointing at it are detached by the schema.
    async fn delete(&self, id: FamilyId) -> AppResult<bool> {
        let mut conn = self.pool.get().await?;

        let deleted = diesel::delete(families::table.find(id.into_uuid()))
            .execute(&mut conn)
            .await?;
        Ok(deleted > 0)
    }
}
