//! PostgreSQL adapters built on diesel_async over the shared bb8 pool.
//!
//! Reads serving a user filter through [`visible_to!`](crate::repositories::scope)
//! and saves run in one transaction guarded by the aggregate's loaded etag.

mod account_repo;
mod currency_repo;
mod family_repo;
mod label_repo;
mod provider_repo;
mod rows;
mod subscription_repo;
mod usage_repo;

pub use account_repo::PgAccountRepository;
pub use currency_repo::PgCurrencyRepository;
pub use family_repo::PgFamilyRepository;
pub use label_repo::PgLabelRepository;
pub use provider_repo::PgProviderRepository;
pub use subscription_repo::PgSubscriptionRepository;
pub use usage_repo::PgUsageRepository;

use std::collections::HashMap;

use uuid::Uuid;

/// Groups `(parent, child)` link rows by parent, keeping child order.
fn group_pairs(pairs: Vec<(Uuid, Uuid)>) -> HashMap<Uuid, Vec<Uuid>> {
    let mut grouped: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (parent, child) in pairs {
        grouped.entry(parent).or_default().push(child);
    }
    grouped
}
