//! Service layer for business logic operations.
//!
//! Services encapsulate the cross-cutting rules (authorization, entitlements,
//! currency conversion, summaries) and coordinate between repositories and
//! command/query handlers.

mod authorization;
mod currency;
mod entitlements;
mod summary;

pub use authorization::{AuthorizationService, Permission, PermissionCheck};
pub use currency::CurrencyConverter;
pub use entitlements::{EffectiveEntitlement, EntitlementResolver, QuotaCheck};
pub use summary::{
    LabelSpending, PeriodTotals, ProviderSpending, SummaryQuery, SummaryResponse, SummaryService,
    SummaryWarning, UpcomingRenewal,
};

use std::sync::Arc;

use crate::context::SharedClock;
use crate::models::{Currency, PlanCatalog};
use crate::repositories::Repositories;

/// Aggregates all services for convenient access.
///
/// Cloning is cheap since every service only holds `Arc`s.
#[derive(Clone)]
pub struct Services {
    pub authorization: AuthorizationService,
    pub entitlements: EntitlementResolver,
    pub currency: CurrencyConverter,
    pub summary: SummaryService,
    pub clock: SharedClock,
}

impl Services {
    /// Creates a new Services instance from Repositories.
    ///
    /// # Arguments
    /// * `repos` - Storage the services read from
    /// * `catalog` - Plans available to accounts
    /// * `clock` - Source of "now" for usage counters and summaries
    /// * `pivot` - Currency used for cross rates
    /// * `batch_size` - Page size used when streaming subscriptions
    pub fn new(
        repos: &Repositories,
        catalog: Arc<PlanCatalog>,
        clock: SharedClock,
        pivot: Currency,
        batch_size: i64,
    ) -> Self {
        let currency = CurrencyConverter::new(repos.currencies.clone(), pivot);
        Self {
            authorization: AuthorizationService::new(repos.families.clone()),
            entitlements: EntitlementResolver::new(catalog, repos.usage.clone(), clock.clone()),
            summary: SummaryService::new(
                repos.subscriptions.clone(),
                repos.providers.clone(),
                currency.clone(),
                batch_size,
            ),
            currency,
            clock,
        }
    }
}
