use bigdecimal::BigDecimal;
use diesel_derive_enum::DbEnum;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::{AppError, AppResult, EntityKind};
use crate::models::tracking::{Aggregate, TrackedSet, Tracking, content_etag};
use crate::models::{
    Family, FamilyId, FamilyMemberId, LabelId, Owned, Owner, Price, ProviderId, SubscriptionId,
    round_cents,
};

/// Exclusive upper bound of a price, the range of a `NUMERIC(12, 2)` column.
const MAX_PRICE: i64 = 10_000_000_000;

/// Billing period of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, DbEnum)]
#[db_enum(existing_type_path = "crate::schema::sql_types::Recurrency")]
#[serde(rename_all = "lowercase")]
pub enum Recurrency {
    Monthly,
    Quarterly,
    Yearly,
    /// Every `custom_recurrency` months
    Custom,
    Unknown,
}

impl Recurrency {
    /// Length of one billing period in months, `None` when it cannot be known.
    pub fn months(&self, custom: Option<i32>) -> Option<i32> {
        match self {
            Recurrency::Monthly => Some(1),
            Recurrency::Quarterly => Some(3),
            Recurrency::Yearly => Some(12),
            Recurrency::Custom => custom.filter(|m| *m > 0),
            Recurrency::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeTrial {
    pub start_date: Timestamp,
    pub end_date: Timestamp,
}

/// Family member paying for a family subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payer {
    pub family_id: FamilyId,
    pub member_id: Option<FamilyMemberId>,
}

#[derive(Debug, Clone, Serialize, Validate)]
pub struct Subscription {
    pub(crate) id: SubscriptionId,
    pub(crate) owner: Owner,
    pub(crate) provider_id: ProviderId,
    #[validate(length(max = 100, message = "Friendly name must be at most 100 characters"))]
    pub(crate) friendly_name: Option<String>,
    pub(crate) free_trial: Option<FreeTrial>,
    pub(crate) price: Price,
    pub(crate) payer: Option<Payer>,
    pub(crate) family_users: TrackedSet<FamilyMemberId>,
    pub(crate) labels: TrackedSet<LabelId>,
    pub(crate) start_date: Timestamp,
    pub(crate) end_date: Option<Timestamp>,
    pub(crate) recurrency: Recurrency,
    pub(crate) custom_recurrency: Option<i32>,
    pub(crate) created_at: Timestamp,
    pub(crate) updated_at: Timestamp,
    #[serde(skip)]
    pub(crate) tracking: Tracking,
}

impl Subscription {
    pub fn create(
        owner: Owner,
        provider_id: ProviderId,
        price: Price,
        recurrency: Recurrency,
        custom_recurrency: Option<i32>,
        start_date: Timestamp,
    ) -> Self {
        let now = Timestamp::now();
        let mut subscription = Self {
            id: SubscriptionId::new(),
            owner,
            provider_id,
            friendly_name: None,
            free_trial: None,
            price,
            payer: None,
            family_users: TrackedSet::new(),
            labels: TrackedSet::new(),
            start_date,
            end_date: None,
            recurrency,
            custom_recurrency,
            created_at: now,
            updated_at: now,
            tracking: Tracking::new_entity(),
        };
        subscription.refresh_etag();
        subscription
    }

    pub fn with_id(mut self, id: SubscriptionId) -> Self {
        self.id = id;
        self.refresh_etag();
        self
    }

    pub fn provider_id(&self) -> ProviderId {
        self.provider_id
    }

    pub fn friendly_name(&self) -> Option<&str> {
        self.friendly_name.as_deref()
    }

    pub fn free_trial(&self) -> Option<&FreeTrial> {
        self.free_trial.as_ref()
    }

    pub fn price(&self) -> &Price {
        &self.price
    }

    pub fn payer(&self) -> Option<&Payer> {
        self.payer.as_ref()
    }

    pub fn family_users(&self) -> &TrackedSet<FamilyMemberId> {
        &self.family_users
    }

    pub fn labels(&self) -> &TrackedSet<LabelId> {
        &self.labels
    }

    pub fn start_date(&self) -> Timestamp {
        self.start_date
    }

    pub fn end_date(&self) -> Option<Timestamp> {
        self.end_date
    }

    pub fn recurrency(&self) -> Recurrency {
        self.recurrency
    }

    pub fn custom_recurrency(&self) -> Option<i32> {
        self.custom_recurrency
    }

    pub fn period_months(&self) -> Option<i32> {
        self.recurrency.months(self.custom_recurrency)
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    pub fn is_active(&self, now: Timestamp) -> bool {
        self.start_date <= now && self.end_date.is_none_or(|end| now <= end)
    }

    pub fn set_friendly_name(&mut self, name: Option<String>) {
        if self.friendly_name != name {
            self.friendly_name = name;
            self.touch();
        }
    }

    pub fn set_provider(&mut self, provider_id: ProviderId) {
        if self.provider_id != provider_id {
            self.provider_id = provider_id;
            self.touch();
        }
    }

    pub fn set_free_trial(&mut self, free_trial: Option<FreeTrial>) {
        if self.free_trial != free_trial {
            self.free_trial = free_trial;
            self.touch();
        }
    }

    pub fn set_price(&mut self, price: Price) {
        if self.price != price {
            self.price = price;
            self.touch();
        }
    }

    pub fn set_payer(&mut self, payer: Option<Payer>) {
        if self.payer != payer {
            self.payer = payer;
            self.touch();
        }
    }

    pub fn set_dates(&mut self, start_date: Timestamp, end_date: Option<Timestamp>) {
        if self.start_date != start_date || self.end_date != end_date {
            self.start_date = start_date;
            self.end_date = end_date;
            self.touch();
        }
    }

    pub fn set_recurrency(&mut self, recurrency: Recurrency, custom_recurrency: Option<i32>) {
        if self.recurrency != recurrency || self.custom_recurrency != custom_recurrency {
            self.recurrency = recurrency;
            self.custom_recurrency = custom_recurrency;
            self.touch();
        }
    }

    pub fn set_family_users(&mut self, members: impl IntoIterator<Item = FamilyMemberId>) {
        if self.family_users.replace_all(members) {
            self.touch();
        }
    }

    pub fn set_labels(&mut self, labels: impl IntoIterator<Item = LabelId>) {
        if self.labels.replace_all(labels) {
            self.touch();
        }
    }

    /// Owners are fixed at creation; only re-asserting the current owner is accepted.
    pub fn change_owner(&mut self, owner: Owner) -> AppResult<()> {
        if self.owner == owner {
            return Ok(());
        }
        Err(AppError::validation(
            "owner",
            format!(
                "cannot move a {} subscription to a {} owner",
                self.owner.owner_type().as_str(),
                owner.owner_type().as_str()
            ),
        ))
    }

    pub fn validation_errors(&self) -> Option<ValidationErrors> {
        let mut errors = self.validate().err().unwrap_or_else(ValidationErrors::new);

        if self.end_date.is_some_and(|end| end < self.start_date) {
            errors.add("end_date", invalid("date_order", "End date must not precede start date"));
        }
        if self
            .free_trial
            .is_some_and(|trial| trial.end_date < trial.start_date)
        {
            errors.add("free_trial", invalid("date_order", "Free trial must end after it starts"));
        }
        if self.price.amount < BigDecimal::from(0)
            || round_cents(&self.price.amount) >= BigDecimal::from(MAX_PRICE)
        {
            errors.add("price", invalid("amount", "Price must be between 0 and 9999999999.99"));
        }
        match (self.recurrency, self.custom_recurrency) {
            (Recurrency::Custom, Some(months)) if months > 0 => {}
            (Recurrency::Custom, _) => errors.add(
                "custom_recurrency",
                invalid("required", "Custom recurrency requires a positive number of months"),
            ),
            (_, Some(_)) => errors.add(
                "custom_recurrency",
                invalid("unexpected", "Only custom recurrency carries a number of months"),
            ),
            (_, None) => {}
        }

        match self.owner.family_id() {
            Some(family_id) => {
                if self.payer.is_some_and(|p| p.family_id != family_id) {
                    errors.add("payer", invalid("family", "Payer must belong to the owning family"));
                }
            }
            None => {
                if self.payer.is_some() {
                    errors.add("payer", invalid("owner", "Only family subscriptions have a payer"));
                }
                if !self.family_users.is_empty() {
                    errors.add(
                        "family_users",
                        invalid("owner", "Only family subscriptions have family users"),
                    );
                }
            }
        }

        (!errors.is_empty()).then_some(errors)
    }

    /// Cross-aggregate checks against the owning family, done at command time.
    pub fn family_validation_errors(&self, family: &Family) -> Option<ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(member_id) = self.payer.and_then(|p| p.member_id) {
            if !family.has_member(member_id) {
                errors.add("payer", invalid("member", "Payer is not a member of the family"));
            }
        }
        if self.family_users.iter().any(|m| !family.has_member(*m)) {
            errors.add(
                "family_users",
                invalid("member", "Every family user must be a member of the family"),
            );
        }
        (!errors.is_empty()).then_some(errors)
    }

    fn touch(&mut self) {
        self.updated_at = Timestamp::now();
        self.refresh_etag();
    }

    fn refresh_etag(&mut self) {
        let etag = content_etag(self);
        self.tracking.mark_changed(etag);
    }
}

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(message.into())
}

impl Owned for Subscription {
    fn owner(&self) -> &Owner {
        &self.owner
    }

    fn entity_kind(&self) -> EntityKind {
        EntityKind::Subscription
    }
}

impl Aggregate for Subscription {
    type Id = SubscriptionId;

    fn id(&self) -> SubscriptionId {
        self.id
    }

    fn tracking(&self) -> &Tracking {
        &self.tracking
    }

    fn pending_child_writes(&self) -> usize {
        self.family_users.pending_writes() + self.labels.pending_writes()
    }

    fn clean(&mut self) {
        self.family_users.clear_changes();
        self.labels.clear_changes();
        self.tracking.mark_clean();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Currency, Member, MemberType, TrackingState, UserId};
    use jiff::SignedDuration;

    const HOUR: SignedDuration = SignedDuration::from_hours(1);

    fn monthly(owner: Owner) -> Subscription {
        let start = Timestamp::now() - HOUR * 240;
        Subscription::create(
            owner,
            ProviderId::new(),
            Price::new("9.99".parse().unwrap(), Currency::usd()),
            Recurrency::Monthly,
            None,
            start,
        )
    }

    #[test]
    fn test_active_predicate() {
        let now = Timestamp::now();
        let mut sub = monthly(Owner::personal("u1"));
        assert!(sub.is_active(now));
        sub.set_dates(sub.start_date(), Some(now - HOUR));
        assert!(!sub.is_active(now));
        sub.set_dates(now + HOUR, None);
        assert!(!sub.is_active(now));
    }

    #[test]
    fn test_custom_recurrency_must_match() {
        let mut sub = monthly(Owner::personal("u1"));
        sub.set_recurrency(Recurrency::Custom, None);
        assert!(sub.validation_errors().unwrap().field_errors().contains_key("custom_recurrency"));
        sub.set_recurrency(Recurrency::Custom, Some(6));
        assert!(sub.validation_errors().is_none());
        assert_eq!(sub.period_months(), Some(6));
        sub.set_recurrency(Recurrency::Yearly, Some(6));
        assert!(sub.validation_errors().is_some());
    }

    #[test]
    fn test_price_must_fit_storage_range() {
        let mut sub = monthly(Owner::personal("u1"));
        sub.set_price(Price::new("-0.01".parse().unwrap(), Currency::usd()));
        assert!(sub.validation_errors().unwrap().field_errors().contains_key("price"));

        sub.set_price(Price::new("10000000000".parse().unwrap(), Currency::usd()));
        assert!(sub.validation_errors().unwrap().field_errors().contains_key("price"));

        sub.set_price(Price::new("9999999999.99".parse().unwrap(), Currency::usd()));
        assert!(sub.validation_errors().is_none());
    }

    #[test]
    fn test_end_before_start_is_invalid() {
        let mut sub = monthly(Owner::personal("u1"));
        sub.set_dates(sub.start_date(), Some(sub.start_date() - HOUR));
        assert!(sub.validation_errors().unwrap().field_errors().contains_key("end_date"));
    }

    #[test]
    fn test_personal_subscription_has_no_payer() {
        let mut sub = monthly(Owner::personal("u1"));
        sub.set_payer(Some(Payer {
            family_id: FamilyId::new(),
            member_id: None,
        }));
        sub.set_family_users([FamilyMemberId::new()]);
        let errors = sub.validation_errors().unwrap();
        let fields = errors.field_errors();
        assert!(fields.contains_key("payer"));
        assert!(fields.contains_key("family_users"));
    }

    #[test]
    fn test_family_users_must_be_members() {
        let mut family = Family::create("Doe", UserId::new("u1"), "Alice");
        let bob = Member::new(family.id(), "Bob", MemberType::Adult);
        let bob_id = bob.id();
        family.add_member(bob);

        let mut sub = monthly(Owner::family(family.id()));
        sub.set_family_users([bob_id]);
        sub.set_payer(Some(Payer {
            family_id: family.id(),
            member_id: Some(bob_id),
        }));
        assert!(sub.validation_errors().is_none());
        assert!(sub.family_validation_errors(&family).is_none());

        sub.set_family_users([bob_id, FamilyMemberId::new()]);
        assert!(sub.family_validation_errors(&family).is_some());
    }

    #[test]
    fn test_owner_variant_cannot_change() {
        let mut sub = monthly(Owner::personal("u1"));
        assert!(sub.change_owner(Owner::personal("u1")).is_ok());
        assert!(sub.change_owner(Owner::family(FamilyId::new())).is_err());
        assert!(sub.change_owner(Owner::System).is_err());
        assert_eq!(sub.owner(), &Owner::personal("u1"));
    }

    #[test]
    fn test_label_changes_are_tracked() {
        let mut sub = monthly(Owner::personal("u1"));
        sub.clean();
        let label = LabelId::new();
        sub.set_labels([label]);
        assert_eq!(sub.tracking_state(), TrackingState::Dirty);
        assert_eq!(sub.labels().added().copied().collect::<Vec<_>>(), vec![label]);

        sub.clean();
        sub.set_labels([label]);
        assert_eq!(sub.tracking_state(), TrackingState::Clean);
    }
}
