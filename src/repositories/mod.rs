//! Repository layer for data access operations.
//!
//! Every repository is a trait so handlers can run against either storage
//! backend: [`postgres`] (diesel_async over a bb8 pool) or [`memory`]. Reads
//! that serve a user go through the visibility scope defined in [`scope`].

pub mod memory;
pub mod postgres;
pub mod scope;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult};
use crate::models::{
    Account, Currency, Family, FamilyId, Feature, Label, LabelId, MemberType, Provider, ProviderId,
    Subscription, SubscriptionId, UserId,
};

pub use memory::MemoryDatabase;
pub use scope::VisibilityScope;

/// Page size used by scan-oriented iterators.
pub const DEFAULT_ITERATOR_BATCH_SIZE: i64 = 10;

const MAX_PAGE_SIZE: i64 = 100;

/// Offset based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: i64,
    pub limit: i64,
}

impl Pagination {
    pub fn new(offset: i64, limit: i64) -> Self {
        Self {
            offset: offset.max(0),
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(0, 20)
    }
}

/// One page of results along with the total number of matching rows.
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
}

impl<T> Paginated<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

/// Turns a page fetcher into a lazy stream that requests `batch_size` rows at
/// a time and stops after the first short page.
pub fn batched<'a, T, F, Fut>(batch_size: i64, mut fetch: F) -> BoxStream<'a, AppResult<T>>
where
    T: Send + 'a,
    F: FnMut(Pagination) -> Fut + Send + 'a,
    Fut: Future<Output = AppResult<Paginated<T>>> + Send + 'a,
{
    let batch_size = batch_size.max(1);
    stream::try_unfold((0i64, false), move |(offset, exhausted)| {
        let next = (!exhausted).then(|| {
            fetch(Pagination {
                offset,
                limit: batch_size,
            })
        });
        async move {
            let Some(page) = next else {
                return Ok::<_, AppError>(None);
            };
            let items = page.await?.items;
            if items.is_empty() {
                return Ok(None);
            }
            let fetched = items.len() as i64;
            let state = (offset + fetched, fetched < batch_size);
            Ok(Some((stream::iter(items.into_iter().map(Ok::<T, AppError>)), state)))
        }
    })
    .try_flatten()
    .boxed()
}

#[async_trait]
pub trait FamilyRepository: Send + Sync {
    async fn get_by_id(&self, id: FamilyId) -> AppResult<Option<Family>>;

    /// Family `id` if `user` is one of its members.
    async fn get_by_id_for_user(&self, user: &UserId, id: FamilyId) -> AppResult<Option<Family>>;

    /// The family `user` is a linked member of.
    async fn get_for_user(&self, user: &UserId) -> AppResult<Option<Family>>;

    async fn member_type_of(&self, id: FamilyId, user: &UserId) -> AppResult<Option<MemberType>>;

    async fn exists(&self, id: FamilyId) -> AppResult<bool>;

    async fn save(&self, family: &mut Family) -> AppResult<()> {
        self.save_with_accounts(family, &[]).await
    }

    /// Saves `family` and upserts `accounts` as one unit of work: either
    /// everything is stored or nothing is. Used when membership changes move
    /// account family links.
    async fn save_with_accounts(&self, family: &mut Family, accounts: &[Account]) -> AppResult<()>;

    /// Deletes the family and everything it owns, detaching linked accounts.
    async fn delete(&self, id: FamilyId) -> AppResult<bool>;
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn get_by_id(&self, id: SubscriptionId) -> AppResult<Option<Subscription>>;

    async fn get_by_id_for_user(
        &self,
        user: &UserId,
        id: SubscriptionId,
    ) -> AppResult<Option<Subscription>>;

    async fn get_all_for_user(
        &self,
        user: &UserId,
        page: Pagination,
    ) -> AppResult<Paginated<Subscription>>;

    async fn exists(&self, id: SubscriptionId) -> AppResult<bool>;

    async fn save(&self, subscription: &mut Subscription) -> AppResult<()>;

    async fn delete(&self, id: SubscriptionId) -> AppResult<bool>;

    /// Lazily walks every subscription visible to `user`. Each call starts a
    /// fresh scan.
    fn get_all_it<'a>(
        &'a self,
        user: &'a UserId,
        batch_size: i64,
    ) -> BoxStream<'a, AppResult<Subscription>> {
        batched(batch_size, move |page| self.get_all_for_user(user, page))
    }
}

#[async_trait]
pub trait ProviderRepository: Send + Sync {
    async fn get_by_id(&self, id: ProviderId) -> AppResult<Option<Provider>>;

    async fn get_by_id_for_user(&self, user: &UserId, id: ProviderId)
    -> AppResult<Option<Provider>>;

    async fn get_all_for_user(
        &self,
        user: &UserId,
        page: Pagination,
    ) -> AppResult<Paginated<Provider>>;

    async fn exists(&self, id: ProviderId) -> AppResult<bool>;

    async fn save(&self, provider: &mut Provider) -> AppResult<()>;

    async fn delete(&self, id: ProviderId) -> AppResult<bool>;
}

#[async_trait]
pub trait LabelRepository: Send + Sync {
    async fn get_by_id(&self, id: LabelId) -> AppResult<Option<Label>>;

    async fn get_by_id_for_user(&self, user: &UserId, id: LabelId) -> AppResult<Option<Label>>;

    async fn get_all_for_user(&self, user: &UserId, page: Pagination)
    -> AppResult<Paginated<Label>>;

    async fn exists(&self, id: LabelId) -> AppResult<bool>;

    async fn save(&self, label: &mut Label) -> AppResult<()>;

    async fn delete(&self, id: LabelId) -> AppResult<bool>;
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn get_by_id(&self, user: &UserId) -> AppResult<Option<Account>>;

    async fn exists(&self, user: &UserId) -> AppResult<bool>;

    /// Inserts or replaces the account row.
    async fn save(&self, account: &Account) -> AppResult<()>;

    async fn delete(&self, user: &UserId) -> AppResult<bool>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_preferred_currency(&self, user: &UserId) -> AppResult<Option<Currency>>;

    async fn set_preferred_currency(&self, user: &UserId, currency: &Currency) -> AppResult<()>;
}

/// Derived usage counters backing plan quotas.
#[async_trait]
pub trait UsageRepository: Send + Sync {
    async fn count(&self, user: &UserId, feature: Feature, now: Timestamp) -> AppResult<i64>;
}

#[async_trait]
pub trait CurrencyRepository: Send + Sync {
    /// Most recent rate for `from -> to` effective at `at`.
    async fn get_rate_at(
        &self,
        from: &Currency,
        to: &Currency,
        at: Timestamp,
    ) -> AppResult<Option<BigDecimal>>;

    /// Stores a rate, replacing any rate already recorded for the same pair
    /// and instant. Non-positive rates are rejected.
    async fn save_rate(
        &self,
        from: &Currency,
        to: &Currency,
        rate: BigDecimal,
        effective_at: Timestamp,
    ) -> AppResult<()>;
}

/// Aggregates all repositories for convenient access.
///
/// Cloning is cheap: every member is an `Arc`.
#[derive(Clone)]
pub struct Repositories {
    pub families: Arc<dyn FamilyRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub providers: Arc<dyn ProviderRepository>,
    pub labels: Arc<dyn LabelRepository>,
    pub accounts: Arc<dyn AccountRepository>,
    pub users: Arc<dyn UserRepository>,
    pub usage: Arc<dyn UsageRepository>,
    pub currencies: Arc<dyn CurrencyRepository>,
}

impl Repositories {
    /// Repositories backed by PostgreSQL.
    pub fn postgres(pool: AsyncDbPool) -> Self {
        Self {
            families: Arc::new(postgres::PgFamilyRepository::new(pool.clone())),
            subscriptions: Arc::new(postgres::PgSubscriptionRepository::new(pool.clone())),
            providers: Arc::new(postgres::PgProviderRepository::new(pool.clone())),
            labels: Arc::new(postgres::PgLabelRepository::new(pool.clone())),
            accounts: Arc::new(postgres::PgAccountRepository::new(pool.clone())),
            users: Arc::new(postgres::PgAccountRepository::new(pool.clone())),
            usage: Arc::new(postgres::PgUsageRepository::new(pool.clone())),
            currencies: Arc::new(postgres::PgCurrencyRepository::new(pool)),
        }
    }

    /// Every repository backed by the same in-memory store.
    pub fn in_memory(db: Arc<MemoryDatabase>) -> Self {
        Self {
            families: db.clone(),
            subscriptions: db.clone(),
            providers: db.clone(),
            labels: db.clone(),
            accounts: db.clone(),
            users: db.clone(),
            usage: db.clone(),
            currencies: db,
        }
    }
}
