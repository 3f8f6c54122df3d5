//! Label commands and queries.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::context::{Authentication, RequestContext};
use crate::error::{AppError, AppResult, EntityKind};
use crate::handlers::{CommandHandler, QueryHandler};
use crate::models::{Aggregate, Feature, Label, LabelId, Owner};
use crate::repositories::{LabelRepository, Paginated, Pagination, Repositories};
use crate::services::{AuthorizationService, EntitlementResolver, Permission, Services};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLabel {
    pub id: Option<LabelId>,
    pub owner: Owner,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateLabel {
    pub id: LabelId,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteLabel {
    pub id: LabelId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabelGetById {
    pub id: LabelId,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabelGetAll {
    #[serde(default)]
    pub page: Pagination,
}

#[derive(Clone)]
pub struct LabelHandler {
    labels: Arc<dyn LabelRepository>,
    authorization: AuthorizationService,
    entitlements: EntitlementResolver,
}

impl LabelHandler {
    pub fn new(repos: &Repositories, services: &Services) -> Self {
        Self {
            labels: repos.labels.clone(),
            authorization: services.authorization.clone(),
            entitlements: services.entitlements.clone(),
        }
    }

    async fn save(&self, ctx: &RequestContext, label: &mut Label) -> AppResult<()> {
        if let Some(errors) = label.validation_errors() {
            return Err(errors.into());
        }
        ctx.run(self.labels.save(label)).await
    }

    async fn load(&self, ctx: &RequestContext, id: LabelId) -> AppResult<Label> {
        ctx.run(self.labels.get_by_id(id))
            .await?
            .ok_or_else(|| AppError::label_not_found(id))
    }
}

#[async_trait]
impl CommandHandler<CreateLabel> for LabelHandler {
    type Output = Label;

    async fn handle(&self, ctx: &RequestContext, command: CreateLabel) -> AppResult<Label> {
        ctx.ensure_active()?;
        self.authorization
            .can(ctx, Permission::Write)
            .on_owner(&command.owner, EntityKind::Label)
            .await?;
        self.entitlements
            .ensure_quota(ctx, Feature::CustomLabelsCount, 1)
            .await?;

        let mut label = Label::create(command.owner, command.name, &command.color);
        if let Some(id) = command.id {
            label = label.with_id(id);
        }
        self.save(ctx, &mut label).await?;
        tracing::info!(
            user_id = %ctx.must_get_connected_account().user_id(),
            label_id = %label.id(),
            "Label created"
        );
        Ok(label)
    }
}

#[async_trait]
impl CommandHandler<UpdateLabel> for LabelHandler {
    type Output = Label;

    async fn handle(&self, ctx: &RequestContext, command: UpdateLabel) -> AppResult<Label> {
        ctx.ensure_active()?;
        let mut label = self.load(ctx, command.id).await?;
        self.authorization
            .can(ctx, Permission::Write)
            .on(&label)
            .await?;

        label.rename(command.name);
        label.recolor(&command.color);
        self.save(ctx, &mut label).await?;
        tracing::info!(label_id = %label.id(), "Label updated");
        Ok(label)
    }
}

#[async_trait]
impl CommandHandler<DeleteLabel> for LabelHandler {
    type Output = ();

    async fn handle(&self, ctx: &RequestContext, command: DeleteLabel) -> AppResult<()> {
        ctx.ensure_active()?;
        let label = self.load(ctx, command.id).await?;
        self.authorization
            .can(ctx, Permission::Delete)
            .on(&label)
            .await?;

        ctx.run(self.labels.delete(label.id())).await?;
        tracing::info!(label_id = %label.id(), "Label deleted");
        Ok(())
    }
}

#[async_trait]
impl QueryHandler<LabelGetById> for LabelHandler {
    type Output = Label;

    async fn query(&self, ctx: &RequestContext, query: LabelGetById) -> AppResult<Label> {
        ctx.ensure_active()?;
        let user = ctx.must_get_connected_account().user_id();
        ctx.run(self.labels.get_by_id_for_user(user, query.id))
            .await?
            .ok_or_else(|| AppError::label_not_found(query.id))
    }
}

#[async_trait]
impl QueryHandler<LabelGetAll> for LabelHandler {
    type Output = Paginated<Label>;

    async fn query(&self, ctx: &RequestContext, query: LabelGetAll) -> AppResult<Paginated<Label>> {
        ctx.ensure_active()?;
        let user = ctx.must_get_connected_account().user_id();
        ctx.run(self.labels.get_all_for_user(user, query.page)).await
    }
}
