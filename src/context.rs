//! Request principal and the context every handler receives.

use std::future::Future;
use std::sync::Arc;

use jiff::Timestamp;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};
use crate::models::{FamilyId, Role, UserId};

/// Authenticated caller of a request, produced by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedAccount {
    user_id: UserId,
    plan_id: String,
    role: Role,
    family_id: Option<FamilyId>,
}

impl ConnectedAccount {
    pub fn new(user_id: impl Into<UserId>, plan_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            plan_id: plan_id.into(),
            role,
            family_id: None,
        }
    }

    pub fn with_family(mut self, family_id: Option<FamilyId>) -> Self {
        self.family_id = family_id;
        self
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Family the account belonged to when the claims were issued. May be stale.
    pub fn family_id(&self) -> Option<FamilyId> {
        self.family_id
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Principal plus cancellation for one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    account: ConnectedAccount,
    cancellation: CancellationToken,
}

impl RequestContext {
    pub fn new(account: ConnectedAccount) -> Self {
        Self {
            account,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(account: ConnectedAccount, cancellation: CancellationToken) -> Self {
        Self {
            account,
            cancellation,
        }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_canceled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Fails with [`AppError::Canceled`] once the request has been canceled.
    pub fn ensure_active(&self) -> AppResult<()> {
        if self.cancellation.is_cancelled() {
            return Err(AppError::Canceled);
        }
        Ok(())
    }

    /// Runs `fut` unless the request is canceled first.
    pub async fn run<F, T>(&self, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(AppError::Canceled),
            result = fut => result,
        }
    }
}

/// Access to the authenticated principal of a request.
pub trait Authentication {
    fn must_get_connected_account(&self) -> &ConnectedAccount;
}

impl Authentication for RequestContext {
    fn must_get_connected_account(&self) -> &ConnectedAccount {
        &self.account
    }
}

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Clock frozen at a given instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Timestamp);

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}

pub type SharedClock = Arc<dyn Clock>;
