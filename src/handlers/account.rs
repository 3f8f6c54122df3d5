//! Per-user commands and queries: preferences, plan, summary and export.

use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use serde::Deserialize;

use crate::context::{Authentication, RequestContext, SharedClock};
use crate::error::AppResult;
use crate::handlers::{CommandHandler, QueryHandler, principal_account};
use crate::models::{Currency, Feature, Subscription, UserPreferences};
use crate::repositories::{AccountRepository, Repositories, SubscriptionRepository, UserRepository};
use crate::services::{
    EffectiveEntitlement, EntitlementResolver, Services, SummaryQuery, SummaryResponse,
    SummaryService,
};

#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePreferredCurrency {
    pub currency: Currency,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetPreferences;

/// Summary of everything the principal can see. Amounts are expressed in
/// `currency`, or in the preferred currency when absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummaryRequest {
    #[serde(flatten)]
    pub query: SummaryQuery,
    pub currency: Option<Currency>,
}

/// Effective plan features of the principal.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntitlementsQuery;

/// Every subscription visible to the principal, for the export encoders.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportSubscriptions;

#[derive(Clone)]
pub struct AccountHandler {
    accounts: Arc<dyn AccountRepository>,
    users: Arc<dyn UserRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    entitlements: EntitlementResolver,
    summary: SummaryService,
    clock: SharedClock,
    default_currency: Currency,
}

impl AccountHandler {
    pub fn new(repos: &Repositories, services: &Services, default_currency: Currency) -> Self {
        Self {
            accounts: repos.accounts.clone(),
            users: repos.users.clone(),
            subscriptions: repos.subscriptions.clone(),
            entitlements: services.entitlements.clone(),
            summary: services.summary.clone(),
            clock: services.clock.clone(),
            default_currency,
        }
    }

    async fn preferred_currency(&self, ctx: &RequestContext) -> AppResult<Currency> {
        let user = ctx.must_get_connected_account().user_id();
        let preferred = ctx.run(self.users.get_preferred_currency(user)).await?;
        Ok(preferred.unwrap_or_else(|| self.default_currency.clone()))
    }
}

#[async_trait]
impl CommandHandler<UpdatePreferredCurrency> for AccountHandler {
    type Output = UserPreferences;

    async fn handle(
        &self,
        ctx: &RequestContext,
        command: UpdatePreferredCurrency,
    ) -> AppResult<UserPreferences> {
        ctx.ensure_active()?;
        let account = principal_account(ctx, self.accounts.as_ref()).await?;
        ctx.run(
            self.users
                .set_preferred_currency(&account.user_id, &command.currency),
        )
        .await?;
        tracing::info!(user_id = %account.user_id, currency = %command.currency, "Preferred currency updated");
        Ok(UserPreferences {
            currency: command.currency,
        })
    }
}

#[async_trait]
impl QueryHandler<GetPreferences> for AccountHandler {
    type Output = UserPreferences;

    async fn query(&self, ctx: &RequestContext, _query: GetPreferences) -> AppResult<UserPreferences> {
        ctx.ensure_active()?;
        Ok(UserPreferences {
            currency: self.preferred_currency(ctx).await?,
        })
    }
}

#[async_trait]
impl QueryHandler<SummaryRequest> for AccountHandler {
    type Output = SummaryResponse;

    async fn query(&self, ctx: &RequestContext, query: SummaryRequest) -> AppResult<SummaryResponse> {
        ctx.ensure_active()?;
        let currency = match query.currency {
            Some(currency) => currency,
            None => self.preferred_currency(ctx).await?,
        };
        self.summary
            .summarize(ctx, &query.query, &currency, self.clock.now())
            .await
    }
}

#[async_trait]
impl QueryHandler<EntitlementsQuery> for AccountHandler {
    type Output = Vec<EffectiveEntitlement>;

    async fn query(
        &self,
        ctx: &RequestContext,
        _query: EntitlementsQuery,
    ) -> AppResult<Vec<EffectiveEntitlement>> {
        ctx.ensure_active()?;
        self.entitlements.effective_entitlements(ctx).await
    }
}

#[async_trait]
impl QueryHandler<ExportSubscriptions> for AccountHandler {
    type Output = Vec<Subscription>;

    async fn query(
        &self,
        ctx: &RequestContext,
        _query: ExportSubscriptions,
    ) -> AppResult<Vec<Subscription>> {
        ctx.ensure_active()?;
        self.entitlements
            .ensure_capability(ctx, Feature::MayExport)
            .await?;

        let user = ctx.must_get_connected_account().user_id();
        let stream = self
            .subscriptions
            .get_all_it(user, self.summary.batch_size());
        let subscriptions: Vec<Subscription> = ctx.run(stream.try_collect()).await?;
        tracing::info!(user_id = %user, count = subscriptions.len(), "Subscriptions exported");
        Ok(subscriptions)
    }
}
