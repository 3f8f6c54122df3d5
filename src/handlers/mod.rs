//! Command and query handlers.
//!
//! Every use case is a plain command or query struct handled by one of the
//! handler groups below. Commands follow the same sequence: load, authorize,
//! check quotas, mutate, validate, save. Handlers never touch storage once the
//! request context has been canceled.

mod account;
mod family;
mod label;
mod provider;
mod subscription;


pub use account::{
    AccountHandler, EntitlementsQuery, ExportSubscriptions, GetPreferences, SummaryRequest,
    UpdatePreferredCurrency,
};
pub use family::{
    AcceptInvitation, CreateFamily, CreateFamilyMember, DeclineInvitation, DeleteFamily,
    DeleteFamilyMember, FamilyGet, FamilyHandler, Invitation, InviteFamilyMember, UpdateFamily,
    UpdateFamilyMember,
};
pub use label::{CreateLabel, DeleteLabel, LabelGetAll, LabelGetById, LabelHandler, UpdateLabel};
pub use provider::{
    CreateProvider, DeleteProvider, ProviderGetAll, ProviderGetById, ProviderHandler,
    UpdateProvider,
};
pub use subscription::{
    CreateSubscription, DeleteSubscription, SubscriptionFields, SubscriptionGetAll,
    SubscriptionGetById, SubscriptionHandler, UpdateSubscription,
};

use async_trait::async_trait;

use crate::context::{Authentication, RequestContext};
use crate::error::{AppError, AppResult};
use crate::models::{Account, Currency, FamilyId, LabelId, UserId};
use crate::repositories::{AccountRepository, LabelRepository, Repositories};
use crate::services::Services;

/// Handles a state-changing command `C`.
#[async_trait]
pub trait CommandHandler<C: Send + 'static>: Send + Sync {
    type Output: Send;

    async fn handle(&self, ctx: &RequestContext, command: C) -> AppResult<Self::Output>;
}

/// Handles a read-only query `Q`.
#[async_trait]
pub trait QueryHandler<Q: Send + 'static>: Send + Sync {
    type Output: Send;

    async fn query(&self, ctx: &RequestContext, query: Q) -> AppResult<Self::Output>;
}

/// All handler groups, built once per process.
///
/// Cloning is cheap since every handler only holds `Arc`s.
#[derive(Clone)]
pub struct Handlers {
    pub families: FamilyHandler,
    pub subscriptions: SubscriptionHandler,
    pub providers: ProviderHandler,
    pub labels: LabelHandler,
    pub accounts: AccountHandler,
}

impl Handlers {
    /// Creates every handler group.
    ///
    /// # Arguments
    /// * `repos` - Storage the handlers load from and save to
    /// * `services` - Authorization, entitlements and summaries
    /// * `default_currency` - Currency used when a user has no preference
    pub fn new(repos: &Repositories, services: &Services, default_currency: Currency) -> Self {
        Self {
            families: FamilyHandler::new(repos, services),
            subscriptions: SubscriptionHandler::new(repos, services),
            providers: ProviderHandler::new(repos, services),
            labels: LabelHandler::new(repos, services),
            accounts: AccountHandler::new(repos, services, default_currency),
        }
    }
}

/// Stored account of the principal, created from its claims on first use.
async fn principal_account(
    ctx: &RequestContext,
    accounts: &dyn AccountRepository,
) -> AppResult<Account> {
    let (account, stored) = principal_account_draft(ctx, accounts).await?;
    if !stored {
        ctx.run(accounts.save(&account)).await?;
        tracing::info!(user_id = %account.user_id, "Account registered");
    }
    Ok(account)
}

/// The principal's stored account, or the account its claims describe
/// (flagged `false`) when none is stored yet. Nothing is written.
async fn principal_account_draft(
    ctx: &RequestContext,
    accounts: &dyn AccountRepository,
) -> AppResult<(Account, bool)> {
    let claims = ctx.must_get_connected_account();
    if let Some(account) = ctx.run(accounts.get_by_id(claims.user_id())).await? {
        return Ok((account, true));
    }
    let account = Account {
        user_id: claims.user_id().clone(),
        plan_id: claims.plan_id().to_string(),
        role: claims.role(),
        family_id: claims.family_id(),
        preferred_currency: None,
    };
    Ok((account, false))
}

/// `user`'s account pointed at `family_id`, or `None` when it needs no
/// write. Unknown users are skipped since their account is created on their
/// first request.
async fn relinked_account(
    ctx: &RequestContext,
    accounts: &dyn AccountRepository,
    user: &UserId,
    family_id: Option<FamilyId>,
) -> AppResult<Option<Account>> {
    let Some(mut account) = ctx.run(accounts.get_by_id(user)).await? else {
        return Ok(None);
    };
    if account.family_id == family_id {
        return Ok(None);
    }
    account.family_id = family_id;
    Ok(Some(account))
}

/// Fails with `NotFound` for the first label the principal cannot see.
async fn ensure_visible_labels(
    ctx: &RequestContext,
    labels: &dyn LabelRepository,
    ids: &[LabelId],
) -> AppResult<()> {
    let user = ctx.must_get_connected_account().user_id();
    for id in ids {
        if ctx.run(labels.get_by_id_for_user(user, *id)).await?.is_none() {
            return Err(AppError::label_not_found(id));
        }
    }
    Ok(())
}
