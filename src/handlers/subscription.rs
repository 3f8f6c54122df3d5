//! Subscription commands and queries.

use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use serde::Deserialize;

use crate::context::{Authentication, RequestContext, SharedClock};
use crate::error::{AppError, AppResult, EntityKind};
use crate::handlers::{CommandHandler, QueryHandler, ensure_visible_labels};
use crate::models::{
    Aggregate, FamilyMemberId, Feature, FreeTrial, LabelId, Owned, Owner, Payer, Price,
    ProviderId, Recurrency, Subscription, SubscriptionId,
};
use crate::repositories::{
    FamilyRepository, LabelRepository, Paginated, Pagination, ProviderRepository, Repositories,
    SubscriptionRepository,
};
use crate::services::{AuthorizationService, EntitlementResolver, Permission, Services};

/// Attributes shared by create and full-replacement update.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionFields {
    pub owner: Owner,
    pub provider_id: ProviderId,
    pub friendly_name: Option<String>,
    pub free_trial: Option<FreeTrial>,
    pub price: Price,
    pub payer: Option<Payer>,
    #[serde(default)]
    pub family_users: Vec<FamilyMemberId>,
    #[serde(default)]
    pub labels: Vec<LabelId>,
    pub start_date: Timestamp,
    pub end_date: Option<Timestamp>,
    pub recurrency: Recurrency,
    pub custom_recurrency: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubscription {
    pub id: Option<SubscriptionId>,
    #[serde(flatten)]
    pub fields: SubscriptionFields,
}

/// Replaces every mutable attribute. The owner must stay the same.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSubscription {
    pub id: SubscriptionId,
    #[serde(flatten)]
    pub fields: SubscriptionFields,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteSubscription {
    pub id: SubscriptionId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionGetById {
    pub id: SubscriptionId,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionGetAll {
    #[serde(default)]
    pub page: Pagination,
}

#[derive(Clone)]
pub struct SubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    providers: Arc<dyn ProviderRepository>,
    labels: Arc<dyn LabelRepository>,
    families: Arc<dyn FamilyRepository>,
    authorization: AuthorizationService,
    entitlements: EntitlementResolver,
    clock: SharedClock,
}

impl SubscriptionHandler {
    pub fn new(repos: &Repositories, services: &Services) -> Self {
        Self {
            subscriptions: repos.subscriptions.clone(),
            providers: repos.providers.clone(),
            labels: repos.labels.clone(),
            families: repos.families.clone(),
            authorization: services.authorization.clone(),
            entitlements: services.entitlements.clone(),
            clock: services.clock.clone(),
        }
    }

    async fn load(&self, ctx: &RequestContext, id: SubscriptionId) -> AppResult<Subscription> {
        ctx.run(self.subscriptions.get_by_id(id))
            .await?
            .ok_or_else(|| AppError::subscription_not_found(id))
    }

    /// Provider and labels must be visible to the principal.
    async fn ensure_references(
        &self,
        ctx: &RequestContext,
        fields: &SubscriptionFields,
    ) -> AppResult<()> {
        let user = ctx.must_get_connected_account().user_id();
        if ctx
            .run(self.providers.get_by_id_for_user(user, fields.provider_id))
            .await?
            .is_none()
        {
            return Err(AppError::provider_not_found(fields.provider_id));
        }
        ensure_visible_labels(ctx, self.labels.as_ref(), &fields.labels).await
    }

    /// Runs local validation, then the payer and family user checks against
    /// the owning family.
    async fn save(&self, ctx: &RequestContext, subscription: &mut Subscription) -> AppResult<()> {
        if let Some(errors) = subscription.validation_errors() {
            return Err(errors.into());
        }
        if let Some(family_id) = subscription.owner().family_id() {
            let family = ctx
                .run(self.families.get_by_id(family_id))
                .await?
                .ok_or_else(|| AppError::family_not_found(family_id))?;
            if let Some(errors) = subscription.family_validation_errors(&family) {
                return Err(errors.into());
            }
        }
        ctx.run(self.subscriptions.save(subscription)).await
    }
}

fn apply(subscription: &mut Subscription, fields: SubscriptionFields) {
    subscription.set_provider(fields.provider_id);
    subscription.set_friendly_name(fields.friendly_name);
    subscription.set_free_trial(fields.free_trial);
    subscription.set_price(fields.price);
    subscription.set_payer(fields.payer);
    subscription.set_family_users(fields.family_users);
    subscription.set_labels(fields.labels);
    subscription.set_dates(fields.start_date, fields.end_date);
    subscription.set_recurrency(fields.recurrency, fields.custom_recurrency);
}

#[async_trait]
impl CommandHandler<CreateSubscription> for SubscriptionHandler {
    type Output = Subscription;

    async fn handle(
        &self,
        ctx: &RequestContext,
        command: CreateSubscription,
    ) -> AppResult<Subscription> {
        ctx.ensure_active()?;
        let fields = command.fields;
        self.authorization
            .can(ctx, Permission::Write)
            .on_owner(&fields.owner, EntityKind::Subscription)
            .await?;

        let now = self.clock.now();
        let active = fields.start_date <= now && fields.end_date.is_none_or(|end| now <= end);
        if active {
            self.entitlements
                .ensure_quota(ctx, Feature::ActiveSubscriptionsCount, 1)
                .await?;
        }
        self.ensure_references(ctx, &fields).await?;

        let mut subscription = Subscription::create(
            fields.owner.clone(),
            fields.provider_id,
            fields.price.clone(),
            fields.recurrency,
            fields.custom_recurrency,
            fields.start_date,
        );
        if let Some(id) = command.id {
            subscription = subscription.with_id(id);
        }
        apply(&mut subscription, fields);
        self.save(ctx, &mut subscription).await?;

        tracing::info!(
            user_id = %ctx.must_get_connected_account().user_id(),
            subscription_id = %subscription.id(),
            "Subscription created"
        );
        Ok(subscription)
    }
}

#[async_trait]
impl CommandHandler<UpdateSubscription> for SubscriptionHandler {
    type Output = Subscription;

    async fn handle(
        &self,
        ctx: &RequestContext,
        command: UpdateSubscription,
    ) -> AppResult<Subscription> {
        ctx.ensure_active()?;
        let mut subscription = self.load(ctx, command.id).await?;
        self.authorization
            .can(ctx, Permission::Write)
            .on(&subscription)
            .await?;
        let fields = command.fields;
        subscription.change_owner(fields.owner.clone())?;

        let now = self.clock.now();
        let reactivated = !subscription.is_active(now)
            && fields.start_date <= now
            && fields.end_date.is_none_or(|end| now <= end);
        if reactivated {
            self.entitlements
                .ensure_quota(ctx, Feature::ActiveSubscriptionsCount, 1)
                .await?;
        }
        self.ensure_references(ctx, &fields).await?;

        apply(&mut subscription, fields);
        self.save(ctx, &mut subscription).await?;
        tracing::info!(subscription_id = %subscription.id(), "Subscription updated");
        Ok(subscription)
    }
}

#[async_trait]
impl CommandHandler<DeleteSubscription> for SubscriptionHandler {
    type Output = ();

    async fn handle(&self, ctx: &RequestContext, command: DeleteSubscription) -> AppResult<()> {
        ctx.ensure_active()?;
        let subscription = self.load(ctx, command.id).await?;
        self.authorization
            .can(ctx, Permission::Delete)
            .on(&subscription)
            .await?;

        ctx.run(self.subscriptions.delete(subscription.id())).await?;
        tracing::info!(subscription_id = %subscription.id(), "Subscription deleted");
        Ok(())
    }
}

#[async_trait]
impl QueryHandler<SubscriptionGetById> for SubscriptionHandler {
    type Output = Subscription;

    /// Subscriptions outside the principal's scope are reported as missing.
    async fn query(
        &self,
        ctx: &RequestContext,
        query: SubscriptionGetById,
    ) -> AppResult<Subscription> {
        ctx.ensure_active()?;
        let user = ctx.must_get_connected_account().user_id();
        ctx.run(self.subscriptions.get_by_id_for_user(user, query.id))
            .await?
            .ok_or_else(|| AppError::subscription_not_found(query.id))
    }
}

#[async_trait]
impl QueryHandler<SubscriptionGetAll> for SubscriptionHandler {
    type Output = Paginated<Subscription>;

    async fn query(
        &self,
        ctx: &RequestContext,
        query: SubscriptionGetAll,
    ) -> AppResult<Paginated<Subscription>> {
        ctx.ensure_active()?;
        let user = ctx.must_get_connected_account().user_id();
        ctx.run(self.subscriptions.get_all_for_user(user, query.page))
            .await
    }
}
