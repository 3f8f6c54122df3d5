//! Summary aggregation over the caller's subscriptions.
//!
//! Subscriptions are streamed from the scoped view, projected onto four
//! sampling windows (current and previous 30 days, current and previous 365
//! days), converted into the preferred currency at each window's midpoint and
//! accumulated into totals, rankings and upcoming renewals. A subscription
//! whose conversion is impossible is skipped with a warning instead of
//! failing the whole summary.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use bigdecimal::BigDecimal;
use futures::TryStreamExt;
use jiff::tz::TimeZone;
use jiff::{SignedDuration, Span, Timestamp, Unit};
use serde::{Deserialize, Serialize};

use crate::context::{Authentication, RequestContext};
use crate::error::AppResult;
use crate::models::{
    Aggregate, Currency, LabelId, Owned, Price, ProviderId, Subscription, SubscriptionId,
    round_cents,
};
use crate::repositories::{ProviderRepository, SubscriptionRepository};
use crate::services::CurrencyConverter;

const DAY: SignedDuration = SignedDuration::from_hours(24);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryQuery {
    #[serde(default)]
    pub top_providers: u8,
    #[serde(default)]
    pub top_labels: u8,
    #[serde(default)]
    pub upcoming_renewals: u8,
    #[serde(default)]
    pub total_monthly: bool,
    #[serde(default)]
    pub total_yearly: bool,
}

/// Amounts are rounded to cents only once accumulation is over.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PeriodTotals {
    pub total: BigDecimal,
    pub personal: BigDecimal,
    pub family: BigDecimal,
}

impl PeriodTotals {
    fn add(&mut self, amount: &BigDecimal, family: bool) {
        self.total += amount;
        if family {
            self.family += amount;
        } else {
            self.personal += amount;
        }
    }

    fn rounded(&self) -> Self {
        Self {
            total: round_cents(&self.total),
            personal: round_cents(&self.personal),
            family: round_cents(&self.family),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderSpending {
    pub provider_id: ProviderId,
    pub total: BigDecimal,
    /// Billed time observed in the yearly window
    pub duration: SignedDuration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelSpending {
    pub label_id: LabelId,
    pub total: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpcomingRenewal {
    pub subscription_id: SubscriptionId,
    pub provider_id: ProviderId,
    pub at: Timestamp,
    pub total: BigDecimal,
    /// Price in its original currency when it differs from the summary currency
    pub source: Option<Price>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryWarning {
    pub subscription_id: SubscriptionId,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryResponse {
    pub currency: Currency,
    pub active: i64,
    pub active_personal: i64,
    pub active_family: i64,
    pub total_monthly: Option<PeriodTotals>,
    pub total_last_month: Option<PeriodTotals>,
    pub total_yearly: Option<PeriodTotals>,
    pub total_last_year: Option<PeriodTotals>,
    pub top_providers: Vec<ProviderSpending>,
    pub top_labels: Vec<LabelSpending>,
    pub upcoming_renewals: Vec<UpcomingRenewal>,
    pub warnings: Vec<SummaryWarning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum WindowKind {
    Month,
    LastMonth,
    Year,
    LastYear,
}

impl WindowKind {
    const ALL: [WindowKind; 4] = [
        WindowKind::Month,
        WindowKind::LastMonth,
        WindowKind::Year,
        WindowKind::LastYear,
    ];

    fn is_yearly(self) -> bool {
        matches!(self, WindowKind::Year | WindowKind::LastYear)
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    kind: WindowKind,
    start: Timestamp,
    end: Timestamp,
}

impl Window {
    fn at(kind: WindowKind, now: Timestamp) -> Self {
        let (from, to) = match kind {
            WindowKind::Month => (30, 0),
            WindowKind::LastMonth => (60, 30),
            WindowKind::Year => (365, 0),
            WindowKind::LastYear => (730, 365),
        };
        Self {
            kind,
            start: now - DAY * from,
            end: now - DAY * to,
        }
    }

    fn len(&self) -> SignedDuration {
        self.end.duration_since(self.start)
    }

    fn midpoint(&self) -> Timestamp {
        self.start + self.len() / 2
    }
}

fn overlap(
    a: (Timestamp, Timestamp),
    b: (Timestamp, Timestamp),
) -> Option<(Timestamp, Timestamp)> {
    let start = a.0.max(b.0);
    let end = a.1.min(b.1);
    (end > start).then_some((start, end))
}

fn length(interval: Option<(Timestamp, Timestamp)>) -> SignedDuration {
    interval.map_or(SignedDuration::ZERO, |(s, e)| e.duration_since(s))
}

/// Time of `window` during which `subscription` was running and not in a
/// free trial.
fn billed_in(subscription: &Subscription, window: &Window) -> SignedDuration {
    let running = (
        subscription.start_date(),
        subscription.end_date().unwrap_or(window.end),
    );
    let billable = overlap((window.start, window.end), running);
    let trial = subscription
        .free_trial()
        .and_then(|t| billable.and_then(|b| overlap(b, (t.start_date, t.end_date))));
    length(billable) - length(trial)
}

/// Amount billed over `window` in the subscription's own currency, prorated
/// by the billed seconds of the window.
fn window_amount(
    subscription: &Subscription,
    months: i32,
    window: &Window,
) -> (BigDecimal, SignedDuration) {
    let billed = billed_in(subscription, window);
    if billed <= SignedDuration::ZERO || months <= 0 {
        return (BigDecimal::from(0), SignedDuration::ZERO);
    }
    let months_per_window: i64 = if window.kind.is_yearly() { 12 } else { 1 };
    let base = &subscription.price().amount * BigDecimal::from(months_per_window)
        / BigDecimal::from(months);
    let amount =
        base * BigDecimal::from(billed.as_secs()) / BigDecimal::from(window.len().as_secs());
    (amount, billed)
}

/// First renewal strictly after `now`, i.e. the smallest `start + k * period`
/// (k >= 0) later than `now` that does not pass the end date.
fn next_renewal(subscription: &Subscription, months: i32, now: Timestamp) -> Option<Timestamp> {
    let start = subscription.start_date().to_zoned(TimeZone::UTC);
    let now_zoned = now.to_zoned(TimeZone::UTC);
    let elapsed = if start.timestamp() < now {
        start.until((Unit::Month, &now_zoned)).ok()?.get_months()
    } else {
        0
    };

    let mut k = i64::from(elapsed / months);
    let renewal = loop {
        let span = Span::new().try_months(k * i64::from(months)).ok()?;
        let at = start.checked_add(span).ok()?.timestamp();
        if at > now {
            break at;
        }
        k += 1;
    };
    match subscription.end_date() {
        Some(end) if renewal > end => None,
        _ => Some(renewal),
    }
}

/// Per-subscription figures in the summary currency, ready to accumulate.
#[derive(Debug, Clone)]
struct Contribution {
    subscription_id: SubscriptionId,
    provider_id: ProviderId,
    family: bool,
    labels: BTreeSet<LabelId>,
    windows: BTreeMap<WindowKind, (BigDecimal, SignedDuration)>,
    renewal: Option<UpcomingRenewal>,
}

#[derive(Debug, Default)]
struct Accumulator {
    active: i64,
    active_personal: i64,
    active_family: i64,
    totals: BTreeMap<WindowKind, PeriodTotals>,
    providers: BTreeMap<ProviderId, (BigDecimal, SignedDuration)>,
    labels: BTreeMap<LabelId, BigDecimal>,
    renewals: Vec<UpcomingRenewal>,
    warnings: Vec<SummaryWarning>,
}

impl Accumulator {
    fn count_active(&mut self, family: bool) {
        self.active += 1;
        if family {
            self.active_family += 1;
        } else {
            self.active_personal += 1;
        }
    }

    fn warn(&mut self, subscription_id: SubscriptionId, message: String) {
        tracing::warn!(%subscription_id, %message, "Subscription skipped in summary");
        self.warnings.push(SummaryWarning {
            subscription_id,
            message,
        });
    }

    fn add(&mut self, contribution: Contribution) {
        for (kind, (amount, _)) in &contribution.windows {
            self.totals
                .entry(*kind)
                .or_default()
                .add(amount, contribution.family);
        }
        if let Some((amount, billed)) = contribution.windows.get(&WindowKind::Year) {
            if *amount > BigDecimal::from(0) {
                let entry = self
                    .providers
                    .entry(contribution.provider_id)
                    .or_insert_with(|| (BigDecimal::from(0), SignedDuration::ZERO));
                entry.0 += amount;
                entry.1 += *billed;
                for label in &contribution.labels {
                    *self.labels.entry(*label).or_default() += amount;
                }
            }
        }
        if let Some(renewal) = contribution.renewal {
            self.renewals.push(renewal);
        }
    }

    fn finish(self, query: &SummaryQuery, currency: Currency) -> SummaryResponse {
        let totals = |kind: WindowKind, enabled: bool| {
            enabled.then(|| {
                self.totals
                    .get(&kind)
                    .map(PeriodTotals::rounded)
                    .unwrap_or_default()
            })
        };

        let mut providers: Vec<ProviderSpending> = self
            .providers
            .iter()
            .map(|(id, (total, duration))| ProviderSpending {
                provider_id: *id,
                total: total.clone(),
                duration: *duration,
            })
            .collect();
        providers.sort_by(|a, b| {
            b.total
                .cmp(&a.total)
                .then(a.provider_id.cmp(&b.provider_id))
        });
        providers.truncate(usize::from(query.top_providers));
        for p in &mut providers {
            p.total = round_cents(&p.total);
        }

        let mut labels: Vec<LabelSpending> = self
            .labels
            .iter()
            .map(|(id, total)| LabelSpending {
                label_id: *id,
                total: total.clone(),
            })
            .collect();
        labels.sort_by(|a, b| b.total.cmp(&a.total).then(a.label_id.cmp(&b.label_id)));
        labels.truncate(usize::from(query.top_labels));
        for l in &mut labels {
            l.total = round_cents(&l.total);
        }

        let mut renewals = self.renewals;
        renewals.sort_by(|a, b| {
            a.at.cmp(&b.at)
                .then(a.subscription_id.cmp(&b.subscription_id))
        });
        renewals.truncate(usize::from(query.upcoming_renewals));

        SummaryResponse {
            total_monthly: totals(WindowKind::Month, query.total_monthly),
            total_last_month: totals(WindowKind::LastMonth, query.total_monthly),
            total_yearly: totals(WindowKind::Year, query.total_yearly),
            total_last_year: totals(WindowKind::LastYear, query.total_yearly),
            currency,
            active: self.active,
            active_personal: self.active_personal,
            active_family: self.active_family,
            top_providers: providers,
            top_labels: labels,
            upcoming_renewals: renewals,
            warnings: self.warnings,
        }
    }
}

/// Streams the caller's subscriptions and builds the summary.
#[derive(Clone)]
pub struct SummaryService {
    subscriptions: Arc<dyn SubscriptionRepository>,
    providers: Arc<dyn ProviderRepository>,
    converter: CurrencyConverter,
    batch_size: i64,
}

impl SummaryService {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        providers: Arc<dyn ProviderRepository>,
        converter: CurrencyConverter,
        batch_size: i64,
    ) -> Self {
        Self {
            subscriptions,
            providers,
            converter,
            batch_size,
        }
    }

    /// Page size used when streaming subscriptions.
    pub fn batch_size(&self) -> i64 {
        self.batch_size
    }

    /// Builds the summary of every subscription visible to the principal.
    ///
    /// # Arguments
    /// * `ctx` - Request context carrying the principal and cancellation
    /// * `query` - Which rankings and totals to include
    /// * `currency` - Currency all amounts are converted into
    /// * `now` - Reference instant for windows, activity and renewals
    ///
    /// # Errors
    /// Only storage failures and cancellation; conversion gaps become warnings.
    pub async fn summarize(
        &self,
        ctx: &RequestContext,
        query: &SummaryQuery,
        currency: &Currency,
        now: Timestamp,
    ) -> AppResult<SummaryResponse> {
        ctx.ensure_active()?;
        let user = ctx.must_get_connected_account().user_id();
        let mut provider_labels: HashMap<ProviderId, BTreeSet<LabelId>> = HashMap::new();
        let mut acc = Accumulator::default();

        let mut stream = self.subscriptions.get_all_it(user, self.batch_size);
        while let Some(subscription) = ctx.run(stream.try_next()).await? {
            let family = subscription.owner().is_family();
            if subscription.is_active(now) {
                acc.count_active(family);
            }

            let Some(months) = subscription.period_months() else {
                acc.warn(
                    subscription.id(),
                    format!("recurrency {:?} has no billing period", subscription.recurrency()),
                );
                continue;
            };

            let provider_id = subscription.provider_id();
            if !provider_labels.contains_key(&provider_id) {
                let labels = ctx
                    .run(self.providers.get_by_id(provider_id))
                    .await?
                    .map(|p| p.labels().ids().copied().collect())
                    .unwrap_or_default();
                provider_labels.insert(provider_id, labels);
            }
            let mut labels: BTreeSet<LabelId> = subscription.labels().ids().copied().collect();
            if let Some(extra) = provider_labels.get(&provider_id) {
                labels.extend(extra.iter().copied());
            }

            match self
                .contribution(ctx, &subscription, months, labels, currency, now)
                .await?
            {
                Ok(contribution) => acc.add(contribution),
                Err(message) => acc.warn(subscription.id(), message),
            }
        }

        let response = acc.finish(query, currency.clone());
        tracing::debug!(
            user_id = %user,
            active = response.active,
            warnings = response.warnings.len(),
            "Summary computed"
        );
        Ok(response)
    }

    /// Converts one subscription; the inner `Err` carries the reason it has
    /// to be skipped.
    async fn contribution(
        &self,
        ctx: &RequestContext,
        subscription: &Subscription,
        months: i32,
        labels: BTreeSet<LabelId>,
        currency: &Currency,
        now: Timestamp,
    ) -> AppResult<Result<Contribution, String>> {
        let source = subscription.price();
        let mut windows = BTreeMap::new();

        for kind in WindowKind::ALL {
            let window = Window::at(kind, now);
            let (amount, billed) = window_amount(subscription, months, &window);
            if amount <= BigDecimal::from(0) {
                windows.insert(kind, (amount, SignedDuration::ZERO));
                continue;
            }
            let at = window.midpoint();
            match ctx
                .run(self.converter.rate(&source.currency, currency, at))
                .await?
            {
                Some(rate) => {
                    windows.insert(kind, (amount * rate, billed));
                }
                None => return Ok(Err(missing_rate(&source.currency, currency, at))),
            }
        }

        let renewal = match next_renewal(subscription, months, now) {
            None => None,
            Some(at) => {
                let Some(rate) = ctx
                    .run(self.converter.rate(&source.currency, currency, now))
                    .await?
                else {
                    return Ok(Err(missing_rate(&source.currency, currency, now)));
                };
                Some(UpcomingRenewal {
                    subscription_id: subscription.id(),
                    provider_id: subscription.provider_id(),
                    at,
                    total: round_cents(&(&source.amount * rate)),
                    source: (&source.currency != currency).then(|| source.clone()),
                })
            }
        };

        Ok(Ok(Contribution {
            subscription_id: subscription.id(),
            provider_id: subscription.provider_id(),
            family: subscription.owner().is_family(),
            labels,
            windows,
            renewal,
        }))
    }
}

fn missing_rate(from: &Currency, to: &Currency, at: Timestamp) -> String {
    format!("no exchange rate from {from} to {to} at {at}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ConnectedAccount;
    use crate::models::{FamilyId, FreeTrial, Owner, Recurrency, Role};
    use crate::repositories::{CurrencyRepository, MemoryDatabase};
    use proptest::prelude::*;

    fn now() -> Timestamp {
        "2026-06-15T12:00:00Z".parse().unwrap()
    }

    fn usd() -> Currency {
        Currency::usd()
    }

    fn eur() -> Currency {
        "EUR".parse().unwrap()
    }

    fn dec(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    fn subscription(owner: Owner, amount: BigDecimal, currency: Currency, recurrency: Recurrency, start: Timestamp) -> Subscription {
        let custom = (recurrency == Recurrency::Custom).then_some(6);
        Subscription::create(owner, ProviderId::new(), Price::new(amount, currency), recurrency, custom, start)
    }

    fn all() -> SummaryQuery {
        SummaryQuery {
            top_providers: 5,
            top_labels: 5,
            upcoming_renewals: 5,
            total_monthly: true,
            total_yearly: true,
        }
    }

    async fn summarize(db: Arc<MemoryDatabase>, subs: Vec<Subscription>, query: SummaryQuery) -> SummaryResponse {
        for mut s in subs {
            SubscriptionRepository::save(db.as_ref(), &mut s).await.unwrap();
        }
        let service = SummaryService::new(db.clone(), db.clone(), CurrencyConverter::new(db, usd()), 10);
        let ctx = RequestContext::new(ConnectedAccount::new("u1", "free", Role::User));
        service.summarize(&ctx, &query, &usd(), now()).await.unwrap()
    }

    #[tokio::test]
    async fn test_currency_conversion_at_window_midpoint() {
        let db = Arc::new(MemoryDatabase::new());
        db.save_rate(&eur(), &usd(), dec("1.1"), now() - DAY * 800).await.unwrap();
        let start = now() - DAY * 800;
        let subs = vec![
            subscription(Owner::personal("u1"), dec("12"), eur(), Recurrency::Yearly, start),
            subscription(Owner::personal("u1"), dec("10"), usd(), Recurrency::Monthly, start),
        ];

        let summary = summarize(db, subs, all()).await;
        assert_eq!(summary.total_monthly.unwrap().total, dec("11.1"));
        assert_eq!(summary.total_yearly.unwrap().total, dec("133.2"));
        assert_eq!(summary.active, 2);
        assert!(summary.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_converted_renewal_rounds_half_away_from_zero() {
        let db = Arc::new(MemoryDatabase::new());
        db.save_rate(&eur(), &usd(), dec("1.1"), now() - DAY * 800).await.unwrap();
        let subs = vec![subscription(Owner::personal("u1"), dec("10.05"), eur(), Recurrency::Monthly, now() - DAY * 10)];

        let summary = summarize(db, subs, all()).await;
        let renewal = &summary.upcoming_renewals[0];
        assert_eq!(renewal.total, dec("11.06"));
        assert_eq!(renewal.source.as_ref().unwrap().amount, dec("10.05"));

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["upcoming_renewals"][0]["total"], "11.06");
    }

    #[tokio::test]
    async fn test_free_trial_days_are_not_billed() {
        let db = Arc::new(MemoryDatabase::new());
        let mut sub = subscription(Owner::personal("u1"), dec("30"), usd(), Recurrency::Monthly, now() - DAY * 60);
        sub.set_free_trial(Some(FreeTrial {
            start_date: now() - DAY * 30,
            end_date: now() - DAY * 15,
        }));

        let summary = summarize(db, vec![sub], all()).await;
        assert_eq!(summary.total_monthly.unwrap().total, dec("15"));
        assert_eq!(summary.total_last_month.unwrap().total, dec("30"));
    }

    #[tokio::test]
    async fn test_end_date_prorates_window() {
        let db = Arc::new(MemoryDatabase::new());
        let mut sub = subscription(Owner::personal("u1"), dec("30"), usd(), Recurrency::Monthly, now() - DAY * 90);
        sub.set_dates(now() - DAY * 90, Some(now() - DAY * 10));

        let summary = summarize(db, vec![sub], all()).await;
        assert_eq!(summary.total_monthly.unwrap().total, dec("20"));
        assert_eq!(summary.active, 0);
        assert!(summary.upcoming_renewals.is_empty());
    }

    #[tokio::test]
    async fn test_missing_rate_skips_subscription_with_warning() {
        let db = Arc::new(MemoryDatabase::new());
        let subs = vec![
            subscription(Owner::personal("u1"), dec("10"), "CHF".parse().unwrap(), Recurrency::Monthly, now() - DAY * 40),
            subscription(Owner::personal("u1"), dec("5"), usd(), Recurrency::Monthly, now() - DAY * 40),
        ];

        let summary = summarize(db, subs, all()).await;
        assert_eq!(summary.total_monthly.unwrap().total, dec("5"));
        assert_eq!(summary.warnings.len(), 1);
        assert_eq!(summary.active, 2);
    }

    #[tokio::test]
    async fn test_unknown_recurrency_is_reported() {
        let db = Arc::new(MemoryDatabase::new());
        let subs = vec![subscription(Owner::personal("u1"), dec("10"), usd(), Recurrency::Unknown, now() - DAY * 40)];
        let summary = summarize(db, subs, all()).await;
        assert_eq!(summary.warnings.len(), 1);
        assert_eq!(summary.total_monthly.unwrap().total, dec("0"));
    }

    #[tokio::test]
    async fn test_flags_select_totals() {
        let db = Arc::new(MemoryDatabase::new());
        let subs = vec![subscription(Owner::personal("u1"), dec("10"), usd(), Recurrency::Monthly, now() - DAY * 40)];
        let summary = summarize(db, subs, SummaryQuery::default()).await;
        assert!(summary.total_monthly.is_none());
        assert!(summary.total_yearly.is_none());
        assert!(summary.top_providers.is_empty());
        assert!(summary.upcoming_renewals.is_empty());
    }

    #[tokio::test]
    async fn test_renewals_follow_recurrency_in_order() {
        let db = Arc::new(MemoryDatabase::new());
        let start: Timestamp = "2026-01-20T12:00:00Z".parse().unwrap();
        let monthly = subscription(Owner::personal("u1"), dec("10"), usd(), Recurrency::Monthly, start);
        let quarterly = subscription(Owner::personal("u1"), dec("30"), usd(), Recurrency::Quarterly, start);
        let yearly = subscription(Owner::personal("u1"), dec("120"), usd(), Recurrency::Yearly, start);

        let summary = summarize(db, vec![yearly, quarterly, monthly], all()).await;
        let dates: Vec<String> = summary
            .upcoming_renewals
            .iter()
            .map(|r| r.at.to_string())
            .collect();
        assert_eq!(
            dates,
            vec![
                "2026-06-20T12:00:00Z",
                "2026-07-20T12:00:00Z",
                "2027-01-20T12:00:00Z"
            ]
        );
        assert!(summary.upcoming_renewals.iter().all(|r| r.source.is_none()));
    }

    #[tokio::test]
    async fn test_top_providers_rank_by_yearly_spend_then_id() {
        let db = Arc::new(MemoryDatabase::new());
        let start = now() - DAY * 400;
        let subs = vec![
            subscription(Owner::personal("u1"), dec("10"), usd(), Recurrency::Monthly, start),
            subscription(Owner::personal("u1"), dec("10"), usd(), Recurrency::Monthly, start),
            subscription(Owner::personal("u1"), dec("50"), usd(), Recurrency::Monthly, start),
        ];
        let mut tied: Vec<ProviderId> = subs[..2].iter().map(|s| s.provider_id()).collect();
        tied.sort();
        let top = subs[2].provider_id();

        let summary = summarize(db, subs, all()).await;
        let ranked: Vec<ProviderId> = summary.top_providers.iter().map(|p| p.provider_id).collect();
        assert_eq!(ranked, vec![top, tied[0], tied[1]]);
        assert_eq!(summary.top_providers[0].total, dec("600"));
        assert_eq!(summary.top_providers[0].duration, DAY * 365);
    }

    fn arb_subscription() -> impl Strategy<Value = Subscription> {
        (
            any::<bool>(),
            1u32..500,
            0i32..900,
            prop_oneof![
                Just(Recurrency::Monthly),
                Just(Recurrency::Quarterly),
                Just(Recurrency::Yearly),
                Just(Recurrency::Custom),
            ],
        )
            .prop_map(|(family, cents, age, recurrency)| {
                let owner = if family {
                    Owner::family(FamilyId::new())
                } else {
                    Owner::personal("u1")
                };
                let amount = BigDecimal::from(cents) / BigDecimal::from(10);
                subscription(owner, amount, Currency::usd(), recurrency, now() - DAY * age)
            })
    }

    fn accumulate(subs: &[Subscription]) -> SummaryResponse {
        let mut acc = Accumulator::default();
        for sub in subs {
            if sub.is_active(now()) {
                acc.count_active(sub.owner().is_family());
            }
            let months = sub.period_months().unwrap();
            let windows = WindowKind::ALL
                .iter()
                .map(|kind| (*kind, window_amount(sub, months, &Window::at(*kind, now()))))
                .collect();
            acc.add(Contribution {
                subscription_id: sub.id(),
                provider_id: sub.provider_id(),
                family: sub.owner().is_family(),
                labels: BTreeSet::new(),
                windows,
                renewal: None,
            });
        }
        acc.finish(&all(), Currency::usd())
    }

    proptest! {
        #[test]
        fn prop_totals_split_into_personal_and_family(subs in prop::collection::vec(arb_subscription(), 0..12)) {
            let summary = accumulate(&subs);
            prop_assert_eq!(summary.active, summary.active_personal + summary.active_family);
            for totals in [summary.total_monthly, summary.total_last_month, summary.total_yearly, summary.total_last_year] {
                let t = totals.unwrap();
                let drift = (&t.total - (&t.personal + &t.family)).abs();
                prop_assert!(drift <= dec("0.01"));
            }
        }

        #[test]
        fn prop_summary_is_deterministic(subs in prop::collection::vec(arb_subscription(), 0..12)) {
            let first = serde_json::to_string(&accumulate(&subs)).unwrap();
            let second = serde_json::to_string(&accumulate(&subs)).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
