//! In-memory implementation of every repository trait.
//!
//! Stores clean copies of aggregates behind a single `RwLock`. Saves follow
//! the same contract as the Postgres backend (etag check, dirty rows only,
//! `clean()` afterwards) and count the rows they would have written.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use jiff::Timestamp;
use tokio::sync::RwLock;

use crate::error::{AppError, AppResult, EntityKind};
use crate::models::{
    Account, Aggregate, Currency, Family, FamilyId, FamilyMemberId, Feature, Label, LabelId,
    MemberType, Owned, Provider, ProviderId, Subscription, SubscriptionId, UserId,
    ensure_positive_rate,
};
use crate::repositories::{
    AccountRepository, CurrencyRepository, FamilyRepository, LabelRepository, Paginated,
    Pagination, ProviderRepository, SubscriptionRepository, UsageRepository, UserRepository,
    VisibilityScope,
};

#[derive(Debug, Clone)]
struct RateRow {
    from: Currency,
    to: Currency,
    rate: BigDecimal,
    effective_at: Timestamp,
}

#[derive(Debug, Default)]
struct MemoryState {
    families: BTreeMap<FamilyId, Family>,
    subscriptions: BTreeMap<SubscriptionId, Subscription>,
    providers: BTreeMap<ProviderId, Provider>,
    labels: BTreeMap<LabelId, Label>,
    accounts: BTreeMap<UserId, Account>,
    rates: Vec<RateRow>,
}

impl MemoryState {
    fn scope_for(&self, user: &UserId) -> VisibilityScope {
        let families = self
            .families
            .values()
            .filter(|f| f.member_by_user(user).is_some())
            .map(|f| f.id());
        VisibilityScope::new(user.clone(), families)
    }
}

#[derive(Debug, Default)]
pub struct MemoryDatabase {
    state: RwLock<MemoryState>,
    writes: AtomicUsize,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows written by saves and deletes since creation or the last reset.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reset_writes(&self) {
        self.writes.store(0, Ordering::SeqCst);
    }

    fn record_writes(&self, rows: usize) {
        self.writes.fetch_add(rows, Ordering::SeqCst);
    }
}

/// Stores a copy of `aggregate` after checking its loaded etag against the
/// stored one. Returns the number of rows written.
fn save_into<A>(
    table: &mut BTreeMap<A::Id, A>,
    aggregate: &mut A,
    entity: EntityKind,
) -> AppResult<usize>
where
    A: Aggregate + Clone,
{
    if !aggregate.has_changes() {
        return Ok(0);
    }
    let stored = table.get(&aggregate.id()).map(|a| a.etag().to_string());
    if stored.as_deref() != aggregate.loaded_etag() {
        tracing::debug!(entity = %entity, id = %aggregate.id(), "Rejected stale save");
        return Err(AppError::stale(entity, aggregate.id()));
    }

    let rows = 1 + aggregate.pending_child_writes();
    aggregate.clean();
    table.insert(aggregate.id(), aggregate.clone());
    Ok(rows)
}

/// Drops references to removed members the way the schema's `ON DELETE`
/// rules do: payers lose their member and family-user links go away. Etags
/// are left untouched. Returns the number of rows changed.
fn detach_members(
    subscriptions: &mut BTreeMap<SubscriptionId, Subscription>,
    removed: &[FamilyMemberId],
) -> usize {
    if removed.is_empty() {
        return 0;
    }
    let mut rows = 0;
    for subscription in subscriptions.values_mut() {
        if let Some(payer) = subscription.payer.as_mut() {
            if payer.member_id.is_some_and(|id| removed.contains(&id)) {
                payer.member_id = None;
                rows += 1;
            }
        }
        for id in removed {
            if subscription.family_users.remove(id).is_some() {
                rows += 1;
            }
        }
        subscription.family_users.clear_changes();
    }
    rows
}

fn page_visible<A>(
    table: &BTreeMap<A::Id, A>,
    scope: &VisibilityScope,
    page: Pagination,
) -> Paginated<A>
where
    A: Aggregate + Owned + Clone,
{
    let visible: Vec<&A> = table.values().filter(|a| scope.admits(a.owner())).collect();
    Paginated {
        total: visible.len() as i64,
        items: visible
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect(),
    }
}

fn get_visible<A>(table: &BTreeMap<A::Id, A>, scope: &VisibilityScope, id: A::Id) -> Option<A>
where
    A: Aggregate + Owned + Clone,
{
    table
        .get(&id)
        .filter(|a| scope.admits(a.owner()))
        .cloned()
}

#[async_trait]
impl FamilyRepository for MemoryDatabase {
    async fn get_by_id(&self, id: FamilyId) -> AppResult<Option<Family>> {
        Ok(self.state.read().await.families.get(&id).cloned())
    }

    async fn get_by_id_for_user(&self, user: &UserId, id: FamilyId) -> AppResult<Option<Family>> {
        let state = self.state.read().await;
        Ok(state
            .families
            .get(&id)
            .filter(|f| f.member_by_user(user).is_some())
            .cloned())
    }

    async fn get_for_user(&self, user: &UserId) -> AppResult<Option<Family>> {
        let state = self.state.read().await;
        Ok(state
            .families
            .values()
            .find(|f| f.member_by_user(user).is_some())
            .cloned())
    }

    async fn member_type_of(&self, id: FamilyId, user: &UserId) -> AppResult<Option<MemberType>> {
        let state = self.state.read().await;
        Ok(state.families.get(&id).and_then(|f| f.member_type_of(user)))
    }

    async fn exists(&self, id: FamilyId) -> AppResult<bool> {
        Ok(self.state.read().await.families.contains_key(&id))
    }

    /// Applies the family save, the link cleanup for removed members and
    /// the account writes under one write lock.
    async fn save_with_accounts(&self, family: &mut Family, accounts: &[Account]) -> AppResult<()> {
        let removed: Vec<FamilyMemberId> = family.members().removed().copied().collect();
        let mut state = self.state.write().await;
        let mut rows = save_into(&mut state.families, family, EntityKind::Family)?;
        rows += detach_members(&mut state.subscriptions, &removed);
        for account in accounts {
            state.accounts.insert(account.user_id.clone(), account.clone());
        }
        self.record_writes(rows + accounts.len());
        Ok(())
    }

    /// Deletes the family with its members and every entity it owns.
    async fn delete(&self, id: FamilyId) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let Some(family) = state.families.remove(&id) else {
            return Ok(false);
        };
        let owned_by_family = |owner: &crate::models::Owner| owner.family_id() == Some(id);
        state.subscriptions.retain(|_, s| !owned_by_family(s.owner()));
        state.providers.retain(|_, p| !owned_by_family(p.owner()));
        state.labels.retain(|_, l| !owned_by_family(l.owner()));
        for account in state.accounts.values_mut() {
            if account.family_id == Some(id) {
                account.family_id = None;
            }
        }
        self.record_writes(1 + family.members().len());
        Ok(true)
    }
}

#[async_trait]
impl SubscriptionRepository for MemoryDatabase {
    async fn get_by_id(&self, id: SubscriptionId) -> AppResult<Option<Subscription>> {
        Ok(self.state.read().await.subscriptions.get(&id).cloned())
    }

    async fn get_by_id_for_user(
        &self,
        user: &UserId,
        id: SubscriptionId,
    ) -> AppResult<Option<Subscription>> {
        let state = self.state.read().await;
        Ok(get_visible(&state.subscriptions, &state.scope_for(user), id))
    }

    async fn get_all_for_user(
        &self,
        user: &UserId,
        page: Pagination,
    ) -> AppResult<Paginated<Subscription>> {
        let state = self.state.read().await;
        Ok(page_visible(&state.subscriptions, &state.scope_for(user), page))
    }

    async fn exists(&self, id: SubscriptionId) -> AppResult<bool> {
        Ok(self.state.read().await.subscriptions.contains_key(&id))
    }

    async fn save(&self, subscription: &mut Subscription) -> AppResult<()> {
        let mut state = self.state.write().await;
        let rows = save_into(&mut state.subscriptions, subscription, EntityKind::Subscription)?;
        self.record_writes(rows);
        Ok(())
    }

    async fn delete(&self, id: SubscriptionId) -> AppResult<bool> {
        let removed = self.state.write().await.subscriptions.remove(&id).is_some();
        if removed {
            self.record_writes(1);
        }
        Ok(removed)
    }
}

#[async_trait]
impl ProviderRepository for MemoryDatabase {
    async fn get_by_id(&self, id: ProviderId) -> AppResult<Option<Provider>> {
        Ok(self.state.read().await.providers.get(&id).cloned())
    }

    async fn get_by_id_for_user(
        &self,
        user: &UserId,
        id: ProviderId,
    ) -> AppResult<Option<Provider>> {
        let state = self.state.read().await;
        Ok(get_visible(&state.providers, &state.scope_for(user), id))
    }

    async fn get_all_for_user(
        &self,
        user: &UserId,
        page: Pagination,
    ) -> AppResult<Paginated<Provider>> {
        let state = self.state.read().await;
        Ok(page_visible(&state.providers, &state.scope_for(user), page))
    }

    async fn exists(&self, id: ProviderId) -> AppResult<bool> {
        Ok(self.state.read().await.providers.contains_key(&id))
    }

    async fn save(&self, provider: &mut Provider) -> AppResult<()> {
        let mut state = self.state.write().await;
        let rows = save_into(&mut state.providers, provider, EntityKind::Provider)?;
        self.record_writes(rows);
        Ok(())
    }

    async fn delete(&self, id: ProviderId) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let removed = state.providers.remove(&id).is_some();
        if removed {
            state.subscriptions.retain(|_, s| s.provider_id() != id);
            self.record_writes(1);
        }
        Ok(removed)
    }
}

#[async_trait]
impl LabelRepository for MemoryDatabase {
    async fn get_by_id(&self, id: LabelId) -> AppResult<Option<Label>> {
        Ok(self.state.read().await.labels.get(&id).cloned())
    }

    async fn get_by_id_for_user(&self, user: &UserId, id: LabelId) -> AppResult<Option<Label>> {
        let state = self.state.read().await;
        Ok(get_visible(&state.labels, &state.scope_for(user), id))
    }

    async fn get_all_for_user(
        &self,
        user: &UserId,
        page: Pagination,
    ) -> AppResult<Paginated<Label>> {
        let state = self.state.read().await;
        Ok(page_visible(&state.labels, &state.scope_for(user), page))
    }

    async fn exists(&self, id: LabelId) -> AppResult<bool> {
        Ok(self.state.read().await.labels.contains_key(&id))
    }

    async fn save(&self, label: &mut Label) -> AppResult<()> {
        let mut state = self.state.write().await;
        let rows = save_into(&mut state.labels, label, EntityKind::Label)?;
        self.record_writes(rows);
        Ok(())
    }

    /// Deletes the label and detaches it from providers and subscriptions.
    async fn delete(&self, id: LabelId) -> AppResult<bool> {
        let mut state = self.state.write().await;
        if state.labels.remove(&id).is_none() {
            return Ok(false);
        }
        for provider in state.providers.values_mut() {
            if provider.labels.remove(&id).is_some() {
                provider.labels.clear_changes();
            }
        }
        for subscription in state.subscriptions.values_mut() {
            if subscription.labels.remove(&id).is_some() {
                subscription.labels.clear_changes();
            }
        }
        self.record_writes(1);
        Ok(true)
    }
}

#[async_trait]
impl AccountRepository for MemoryDatabase {
    async fn get_by_id(&self, user: &UserId) -> AppResult<Option<Account>> {
        Ok(self.state.read().await.accounts.get(user).cloned())
    }

    async fn exists(&self, user: &UserId) -> AppResult<bool> {
        Ok(self.state.read().await.accounts.contains_key(user))
    }

    async fn save(&self, account: &Account) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.accounts.insert(account.user_id.clone(), account.clone());
        self.record_writes(1);
        Ok(())
    }

    async fn delete(&self, user: &UserId) -> AppResult<bool> {
        let removed = self.state.write().await.accounts.remove(user).is_some();
        if removed {
            self.record_writes(1);
        }
        Ok(removed)
    }
}

#[async_trait]
impl UserRepository for MemoryDatabase {
    async fn get_preferred_currency(&self, user: &UserId) -> AppResult<Option<Currency>> {
        let state = self.state.read().await;
        Ok(state
            .accounts
            .get(user)
            .and_then(|a| a.preferred_currency.clone()))
    }

    async fn set_preferred_currency(&self, user: &UserId, currency: &Currency) -> AppResult<()> {
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .get_mut(user)
            .ok_or_else(|| AppError::not_found(EntityKind::Account, user))?;
        if account.preferred_currency.as_ref() != Some(currency) {
            account.preferred_currency = Some(currency.clone());
            self.record_writes(1);
        }
        Ok(())
    }
}

#[async_trait]
impl UsageRepository for MemoryDatabase {
    async fn count(&self, user: &UserId, feature: Feature, now: Timestamp) -> AppResult<i64> {
        let state = self.state.read().await;
        let scope = state.scope_for(user);
        let count = match feature {
            Feature::ActiveSubscriptionsCount => state
                .subscriptions
                .values()
                .filter(|s| scope.owns(s.owner()) && s.is_active(now))
                .count(),
            Feature::CustomProvidersCount => state
                .providers
                .values()
                .filter(|p| scope.owns(p.owner()))
                .count(),
            Feature::CustomLabelsCount => state
                .labels
                .values()
                .filter(|l| scope.owns(l.owner()))
                .count(),
            Feature::FamilyMembersCount => state
                .families
                .values()
                .find(|f| f.member_by_user(user).is_some())
                .map(|f| f.members().len())
                .unwrap_or(0),
            Feature::MayExport => return Err(AppError::CannotGetQuotaOnFeature { feature }),
        };
        Ok(count as i64)
    }
}

#[async_trait]
impl CurrencyRepository for MemoryDatabase {
    async fn get_rate_at(
        &self,
        from: &Currency,
        to: &Currency,
        at: Timestamp,
    ) -> AppResult<Option<BigDecimal>> {
        let state = self.state.read().await;
        Ok(state
            .rates
            .iter()
            .filter(|r| &r.from == from && &r.to == to && r.effective_at <= at)
            .max_by_key(|r| r.effective_at)
            .map(|r| r.rate.clone()))
    }

    async fn save_rate(
        &self,
        from: &Currency,
        to: &Currency,
        rate: BigDecimal,
        effective_at: Timestamp,
    ) -> AppResult<()> {
        ensure_positive_rate(&rate)?;
        let mut state = self.state.write().await;
        state
            .rates
            .retain(|r| !(&r.from == from && &r.to == to && r.effective_at == effective_at));
        state.rates.push(RateRow {
            from: from.clone(),
            to: to.clone(),
            rate,
            effective_at,
        });
        self.record_writes(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Member, Owner, TrackingState};
    use futures::TryStreamExt;
    use jiff::SignedDuration;

    fn label(owner: Owner, name: &str) -> Label {
        Label::create(owner, name, "#123456")
    }

    #[tokio::test]
    async fn test_save_cleans_and_counts_rows() {
        let db = MemoryDatabase::new();
        let mut family = Family::create("Doe", UserId::new("u1"), "Alice");
        FamilyRepository::save(&db, &mut family).await.unwrap();
        assert_eq!(family.tracking_state(), TrackingState::Clean);
        assert_eq!(db.writes(), 2);

        db.reset_writes();
        FamilyRepository::save(&db, &mut family).await.unwrap();
        assert_eq!(db.writes(), 0);

        family.add_member(Member::new(family.id(), "Bob", MemberType::Adult));
        FamilyRepository::save(&db, &mut family).await.unwrap();
        assert_eq!(db.writes(), 2);
    }

    #[tokio::test]
    async fn test_second_concurrent_save_is_stale() {
        let db = MemoryDatabase::new();
        let mut original = label(Owner::personal("u1"), "Music");
        LabelRepository::save(&db, &mut original).await.unwrap();

        let mut first = LabelRepository::get_by_id(&db, original.id()).await.unwrap().unwrap();
        let mut second = first.clone();
        let loaded_etag = first.etag().to_string();

        first.rename("Podcasts");
        second.rename("Audio");
        LabelRepository::save(&db, &mut first).await.unwrap();
        assert_ne!(first.etag(), loaded_etag);

        let err = LabelRepository::save(&db, &mut second).await.unwrap_err();
        assert!(matches!(err, AppError::StaleEntity { entity: EntityKind::Label, .. }));
        let stored = LabelRepository::get_by_id(&db, original.id()).await.unwrap().unwrap();
        assert_eq!(stored.name(), "Podcasts");
    }

    #[tokio::test]
    async fn test_scoped_reads_follow_membership() {
        let db = MemoryDatabase::new();
        let mut family = Family::create("Doe", UserId::new("u1"), "Alice");
        FamilyRepository::save(&db, &mut family).await.unwrap();

        for mut l in [
            label(Owner::System, "Video"),
            label(Owner::personal("u1"), "Mine"),
            label(Owner::personal("u2"), "Theirs"),
            label(Owner::family(family.id()), "Ours"),
            label(Owner::family(FamilyId::new()), "Elsewhere"),
        ] {
            LabelRepository::save(&db, &mut l).await.unwrap();
        }

        let page = LabelRepository::get_all_for_user(&db, &UserId::new("u1"), Pagination::default())
            .await
            .unwrap();
        let mut names: Vec<&str> = page.items.iter().map(|l| l.name()).collect();
        names.sort();
        assert_eq!(page.total, 3);
        assert_eq!(names, vec!["Mine", "Ours", "Video"]);

        let page = LabelRepository::get_all_for_user(&db, &UserId::new("u2"), Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn test_get_all_it_restarts_per_call() {
        let db = MemoryDatabase::new();
        let start = Timestamp::now() - SignedDuration::from_hours(24);
        for _ in 0..13 {
            let mut sub = Subscription::create(
                Owner::personal("u1"),
                ProviderId::new(),
                crate::models::Price::new(BigDecimal::from(1), Currency::usd()),
                crate::models::Recurrency::Monthly,
                None,
                start,
            );
            SubscriptionRepository::save(&db, &mut sub).await.unwrap();
        }
        let user = UserId::new("u1");
        let first: Vec<Subscription> = db.get_all_it(&user, 10).try_collect().await.unwrap();
        let second: Vec<Subscription> = db.get_all_it(&user, 10).try_collect().await.unwrap();
        assert_eq!(first.len(), 13);
        assert_eq!(second.len(), 13);
    }

    #[tokio::test]
    async fn test_rate_lookup_uses_most_recent_effective_rate() {
        let db = MemoryDatabase::new();
        let eur: Currency = "EUR".parse().unwrap();
        let usd = Currency::usd();
        let now = Timestamp::now();
        let day = SignedDuration::from_hours(24);

        let rate = |s: &str| s.parse::<BigDecimal>().unwrap();

        db.save_rate(&eur, &usd, rate("1.05"), now - day * 10).await.unwrap();
        db.save_rate(&eur, &usd, rate("1.10"), now - day * 2).await.unwrap();

        assert_eq!(db.get_rate_at(&eur, &usd, now).await.unwrap(), Some(rate("1.1")));
        assert_eq!(db.get_rate_at(&eur, &usd, now - day * 5).await.unwrap(), Some(rate("1.05")));
        assert_eq!(db.get_rate_at(&eur, &usd, now - day * 20).await.unwrap(), None);
        assert_eq!(db.get_rate_at(&usd, &eur, now).await.unwrap(), None);

        let rejected = db.save_rate(&eur, &usd, rate("0"), now).await;
        assert!(matches!(rejected, Err(AppError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_usage_counts_exclude_system_rows() {
        let db = MemoryDatabase::new();
        for mut l in [label(Owner::System, "Video"), label(Owner::personal("u1"), "Mine")] {
            LabelRepository::save(&db, &mut l).await.unwrap();
        }
        let user = UserId::new("u1");
        let now = Timestamp::now();
        assert_eq!(db.count(&user, Feature::CustomLabelsCount, now).await.unwrap(), 1);
        assert_eq!(db.count(&user, Feature::FamilyMembersCount, now).await.unwrap(), 0);
        assert!(db.count(&user, Feature::MayExport, now).await.is_err());
    }
}
