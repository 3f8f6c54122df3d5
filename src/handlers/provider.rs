//! Provider commands and queries.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::context::{Authentication, RequestContext};
use crate::error::{AppError, AppResult, EntityKind};
use crate::handlers::{CommandHandler, QueryHandler, ensure_visible_labels};
use crate::models::{Aggregate, Feature, LabelId, Owner, Provider, ProviderDetails, ProviderId};
use crate::repositories::{LabelRepository, Paginated, Pagination, ProviderRepository, Repositories};
use crate::services::{AuthorizationService, EntitlementResolver, Permission, Services};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProvider {
    pub id: Option<ProviderId>,
    pub owner: Owner,
    pub name: String,
    #[serde(default, flatten)]
    pub details: ProviderDetails,
    #[serde(default)]
    pub labels: Vec<LabelId>,
}

/// Replaces every mutable attribute of a provider.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProvider {
    pub id: ProviderId,
    pub name: String,
    #[serde(default, flatten)]
    pub details: ProviderDetails,
    #[serde(default)]
    pub labels: Vec<LabelId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteProvider {
    pub id: ProviderId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderGetById {
    pub id: ProviderId,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderGetAll {
    #[serde(default)]
    pub page: Pagination,
}

#[derive(Clone)]
pub struct ProviderHandler {
    providers: Arc<dyn ProviderRepository>,
    labels: Arc<dyn LabelRepository>,
    authorization: AuthorizationService,
    entitlements: EntitlementResolver,
}

impl ProviderHandler {
    pub fn new(repos: &Repositories, services: &Services) -> Self {
        Self {
            providers: repos.providers.clone(),
            labels: repos.labels.clone(),
            authorization: services.authorization.clone(),
            entitlements: services.entitlements.clone(),
        }
    }

    async fn load(&self, ctx: &RequestContext, id: ProviderId) -> AppResult<Provider> {
        ctx.run(self.providers.get_by_id(id))
            .await?
            .ok_or_else(|| AppError::provider_not_found(id))
    }

    async fn save(&self, ctx: &RequestContext, provider: &mut Provider) -> AppResult<()> {
        if let Some(errors) = provider.validation_errors() {
            return Err(errors.into());
        }
        ctx.run(self.providers.save(provider)).await
    }
}

#[async_trait]
impl CommandHandler<CreateProvider> for ProviderHandler {
    type Output = Provider;

    async fn handle(&self, ctx: &RequestContext, command: CreateProvider) -> AppResult<Provider> {
        ctx.ensure_active()?;
        self.authorization
            .can(ctx, Permission::Write)
            .on_owner(&command.owner, EntityKind::Provider)
            .await?;
        self.entitlements
            .ensure_quota(ctx, Feature::CustomProvidersCount, 1)
            .await?;
        ensure_visible_labels(ctx, self.labels.as_ref(), &command.labels).await?;

        let mut provider = Provider::create(command.owner, command.name, command.details);
        if let Some(id) = command.id {
            provider = provider.with_id(id);
        }
        provider.set_labels(command.labels);
        self.save(ctx, &mut provider).await?;
        tracing::info!(
            user_id = %ctx.must_get_connected_account().user_id(),
            provider_id = %provider.id(),
            "Provider created"
        );
        Ok(provider)
    }
}

#[async_trait]
impl CommandHandler<UpdateProvider> for ProviderHandler {
    type Output = Provider;

    async fn handle(&self, ctx: &RequestContext, command: UpdateProvider) -> AppResult<Provider> {
        ctx.ensure_active()?;
        let mut provider = self.load(ctx, command.id).await?;
        self.authorization
            .can(ctx, Permission::Write)
            .on(&provider)
            .await?;
        ensure_visible_labels(ctx, self.labels.as_ref(), &command.labels).await?;

        provider.rename(command.name);
        provider.set_details(command.details);
        provider.set_labels(command.labels);
        self.save(ctx, &mut provider).await?;
        tracing::info!(provider_id = %provider.id(), "Provider updated");
        Ok(provider)
    }
}

#[async_trait]
impl CommandHandler<DeleteProvider> for ProviderHandler {
    type Output = ();

    async fn handle(&self, ctx: &RequestContext, command: DeleteProvider) -> AppResult<()> {
        ctx.ensure_active()?;
        let provider = self.load(ctx, command.id).await?;
        self.authorization
            .can(ctx, Permission::Delete)
            .on(&provider)
            .await?;

        ctx.run(self.providers.delete(provider.id())).await?;
        tracing::info!(provider_id = %provider.id(), "Provider deleted");
        Ok(())
    }
}

#[async_trait]
impl QueryHandler<ProviderGetById> for ProviderHandler {
    type Output = Provider;

    async fn query(&self, ctx: &RequestContext, query: ProviderGetById) -> AppResult<Provider> {
        ctx.ensure_active()?;
        let user = ctx.must_get_connected_account().user_id();
        ctx.run(self.providers.get_by_id_for_user(user, query.id))
            .await?
            .ok_or_else(|| AppError::provider_not_found(query.id))
    }
}

#[async_trait]
impl QueryHandler<ProviderGetAll> for ProviderHandler {
    type Output = Paginated<Provider>;

    async fn query(
        &self,
        ctx: &RequestContext,
        query: ProviderGetAll,
    ) -> AppResult<Paginated<Provider>> {
        ctx.ensure_active()?;
        let user = ctx.must_get_connected_account().user_id();
        ctx.run(self.providers.get_all_for_user(user, query.page)).await
    }
}
