//! Row types and their mapping to aggregates.
//!
//! Rows are the only place aware of the column layout. Loading a row yields a
//! clean aggregate whose tracking remembers the stored etag.

use bigdecimal::BigDecimal;
use diesel::prelude::*;
use jiff_diesel::ToDiesel;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::tracking::{Aggregate, TrackedSet, Tracking};
use crate::models::{
    Account, Currency, Family, FamilyId, FamilyMemberId, FreeTrial, Label, LabelId, Member,
    MemberType, Owner, OwnerRecord, OwnerType, Payer, Price, Provider, ProviderDetails, ProviderId,
    Recurrency, Role, Subscription, SubscriptionId, UserId, round_cents,
};
use crate::schema::{families, family_members, labels, providers, subscriptions, users};

fn owner_of(
    owner_type: OwnerType,
    owner_user_id: Option<String>,
    owner_family_id: Option<Uuid>,
) -> AppResult<Owner> {
    Owner::from_record(OwnerRecord::new(owner_type, owner_user_id, owner_family_id))
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = families)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct FamilyRow {
    pub id: Uuid,
    pub name: String,
    pub owner_user_id: String,
    pub etag: String,
    pub created_at: jiff_diesel::Timestamp,
    pub updated_at: jiff_diesel::Timestamp,
}

impl FamilyRow {
    pub fn from_family(family: &Family) -> Self {
        Self {
            id: family.id.into_uuid(),
            name: family.name.clone(),
            owner_user_id: family.owner_user_id.as_str().to_string(),
            etag: family.etag().to_string(),
            created_at: family.created_at.to_diesel(),
            updated_at: family.updated_at.to_diesel(),
        }
    }

    pub fn into_family(self, members: Vec<MemberRow>) -> Family {
        Family {
            id: FamilyId::from_uuid(self.id),
            name: self.name,
            owner_user_id: UserId::new(self.owner_user_id),
            members: TrackedSet::from_loaded(members.into_iter().map(MemberRow::into_member)),
            created_at: self.created_at.to_jiff(),
            updated_at: self.updated_at.to_jiff(),
            tracking: Tracking::loaded(self.etag),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = family_members)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct MemberRow {
    pub id: Uuid,
    pub family_id: Uuid,
    pub name: String,
    pub member_type: MemberType,
    pub user_id: Option<String>,
    pub invitation_code: Option<String>,
    pub etag: String,
    pub created_at: jiff_diesel::Timestamp,
    pub updated_at: jiff_diesel::Timestamp,
}

impl MemberRow {
    pub fn from_member(member: &Member) -> Self {
        Self {
            id: member.id.into_uuid(),
            family_id: member.family_id.into_uuid(),
            name: member.name.clone(),
            member_type: member.member_type,
            user_id: member.user_id.as_ref().map(|u| u.as_str().to_string()),
            invitation_code: member.invitation_code.clone(),
            etag: member.etag.clone(),
            created_at: member.created_at.to_diesel(),
            updated_at: member.updated_at.to_diesel(),
        }
    }

    pub fn into_member(self) -> Member {
        Member {
            id: FamilyMemberId::from_uuid(self.id),
            family_id: FamilyId::from_uuid(self.family_id),
            name: self.name,
            member_type: self.member_type,
            user_id: self.user_id.map(UserId::new),
            invitation_code: self.invitation_code,
            created_at: self.created_at.to_jiff(),
            updated_at: self.updated_at.to_jiff(),
            etag: self.etag,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = labels)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct LabelRow {
    pub id: Uuid,
    pub owner_type: OwnerType,
    pub owner_user_id: Option<String>,
    pub owner_family_id: Option<Uuid>,
    pub name: String,
    pub color: String,
    pub key: Option<String>,
    pub etag: String,
    pub created_at: jiff_diesel::Timestamp,
    pub updated_at: jiff_diesel::Timestamp,
}

impl LabelRow {
    pub fn from_label(label: &Label) -> Self {
        let owner = label.owner.to_record();
        Self {
            id: label.id.into_uuid(),
            owner_type: owner.owner_type,
            owner_user_id: owner.owner_user_id,
            owner_family_id: owner.owner_family_id,
            name: label.name.clone(),
            color: label.color.clone(),
            key: label.key.clone(),
            etag: label.etag().to_string(),
            created_at: label.created_at.to_diesel(),
            updated_at: label.updated_at.to_diesel(),
        }
    }

    pub fn into_label(self) -> AppResult<Label> {
        Ok(Label {
            id: LabelId::from_uuid(self.id),
            owner: owner_of(self.owner_type, self.owner_user_id, self.owner_family_id)?,
            name: self.name,
            color: self.color,
            key: self.key,
            created_at: self.created_at.to_jiff(),
            updated_at: self.updated_at.to_jiff(),
            tracking: Tracking::loaded(self.etag),
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = providers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct ProviderRow {
    pub id: Uuid,
    pub owner_type: OwnerType,
    pub owner_user_id: Option<String>,
    pub owner_family_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub icon_url: Option<String>,
    pub url: Option<String>,
    pub pricing_page_url: Option<String>,
    pub etag: String,
    pub created_at: jiff_diesel::Timestamp,
    pub updated_at: jiff_diesel::Timestamp,
}

impl ProviderRow {
    pub fn from_provider(provider: &Provider) -> Self {
        let owner = provider.owner.to_record();
        let details = &provider.details;
        Self {
            id: provider.id.into_uuid(),
            owner_type: owner.owner_type,
            owner_user_id: owner.owner_user_id,
            owner_family_id: owner.owner_family_id,
            name: provider.name.clone(),
            description: details.description.clone(),
            icon_url: details.icon_url.clone(),
            url: details.url.clone(),
            pricing_page_url: details.pricing_page_url.clone(),
            etag: provider.etag().to_string(),
            created_at: provider.created_at.to_diesel(),
            updated_at: provider.updated_at.to_diesel(),
        }
    }

    pub fn into_provider(self, labels: Vec<Uuid>) -> AppResult<Provider> {
        Ok(Provider {
            id: ProviderId::from_uuid(self.id),
            owner: owner_of(self.owner_type, self.owner_user_id, self.owner_family_id)?,
            name: self.name,
            details: ProviderDetails {
                description: self.description,
                icon_url: self.icon_url,
                url: self.url,
                pricing_page_url: self.pricing_page_url,
            },
            labels: TrackedSet::from_loaded(labels.into_iter().map(LabelId::from_uuid)),
            created_at: self.created_at.to_jiff(),
            updated_at: self.updated_at.to_jiff(),
            tracking: Tracking::loaded(self.etag),
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = subscriptions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct SubscriptionRow {
    pub id: Uuid,
    pub owner_type: OwnerType,
    pub owner_user_id: Option<String>,
    pub owner_family_id: Option<Uuid>,
    pub provider_id: Uuid,
    pub friendly_name: Option<String>,
    pub free_trial_start_date: Option<jiff_diesel::Timestamp>,
    pub free_trial_end_date: Option<jiff_diesel::Timestamp>,
    pub price: BigDecimal,
    pub currency: String,
    pub payer_family_id: Option<Uuid>,
    pub payer_member_id: Option<Uuid>,
    pub start_date: jiff_diesel::Timestamp,
    pub end_date: Option<jiff_diesel::Timestamp>,
    pub recurrency: Recurrency,
    pub custom_recurrency: Option<i32>,
    pub etag: String,
    pub created_at: jiff_diesel::Timestamp,
    pub updated_at: jiff_diesel::Timestamp,
}

/// Child identifiers of one subscription.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionChildren {
    pub labels: Vec<Uuid>,
    pub family_users: Vec<Uuid>,
}

impl SubscriptionRow {
    pub fn from_subscription(subscription: &Subscription) -> AppResult<Self> {
        let owner = subscription.owner.to_record();
        let price = round_cents(&subscription.price.amount);
        Ok(Self {
            id: subscription.id.into_uuid(),
            owner_type: owner.owner_type,
            owner_user_id: owner.owner_user_id,
            owner_family_id: owner.owner_family_id,
            provider_id: subscription.provider_id.into_uuid(),
            friendly_name: subscription.friendly_name.clone(),
            free_trial_start_date: subscription.free_trial.map(|t| t.start_date.to_diesel()),
            free_trial_end_date: subscription.free_trial.map(|t| t.end_date.to_diesel()),
            price,
            currency: subscription.price.currency.as_str().to_string(),
            payer_family_id: subscription.payer.map(|p| p.family_id.into_uuid()),
            payer_member_id: subscription
                .payer
                .and_then(|p| p.member_id)
                .map(FamilyMemberId::into_uuid),
            start_date: subscription.start_date.to_diesel(),
            end_date: subscription.end_date.map(|d| d.to_diesel()),
            recurrency: subscription.recurrency,
            custom_recurrency: subscription.custom_recurrency,
            etag: subscription.etag().to_string(),
            created_at: subscription.created_at.to_diesel(),
            updated_at: subscription.updated_at.to_diesel(),
        })
    }

    pub fn into_subscription(self, children: SubscriptionChildren) -> AppResult<Subscription> {
        let free_trial = match (self.free_trial_start_date, self.free_trial_end_date) {
            (Some(start), Some(end)) => Some(FreeTrial {
                start_date: start.to_jiff(),
                end_date: end.to_jiff(),
            }),
            _ => None,
        };
        // A payer whose member row was deleted keeps its family with no member.
        let payer = self.payer_family_id.map(|family_id| Payer {
            family_id: FamilyId::from_uuid(family_id),
            member_id: self.payer_member_id.map(FamilyMemberId::from_uuid),
        });

        Ok(Subscription {
            id: SubscriptionId::from_uuid(self.id),
            owner: owner_of(self.owner_type, self.owner_user_id, self.owner_family_id)?,
            provider_id: ProviderId::from_uuid(self.provider_id),
            friendly_name: self.friendly_name,
            free_trial,
            price: Price::new(self.price, self.currency.parse::<Currency>()?),
            payer,
            family_users: TrackedSet::from_loaded(
                children.family_users.into_iter().map(FamilyMemberId::from_uuid),
            ),
            labels: TrackedSet::from_loaded(children.labels.into_iter().map(LabelId::from_uuid)),
            start_date: self.start_date.to_jiff(),
            end_date: self.end_date.map(|d| d.to_jiff()),
            recurrency: self.recurrency,
            custom_recurrency: self.custom_recurrency,
            created_at: self.created_at.to_jiff(),
            updated_at: self.updated_at.to_jiff(),
            tracking: Tracking::loaded(self.etag),
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserRow {
    pub id: String,
    pub plan_id: String,
    pub role: Role,
    pub family_id: Option<Uuid>,
    pub preferred_currency: Option<String>,
}

impl UserRow {
    pub fn into_account(self) -> AppResult<Account> {
        Ok(Account {
            user_id: UserId::new(self.id),
            plan_id: self.plan_id,
            role: self.role,
            family_id: self.family_id.map(FamilyId::from_uuid),
            preferred_currency: self
                .preferred_currency
                .map(|c| c.parse::<Currency>())
                .transpose()?,
        })
    }
}

#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = users)]
#[diesel(treat_none_as_null = true)]
pub struct UserChangeset {
    pub id: String,
    pub plan_id: String,
    pub role: Role,
    pub family_id: Option<Uuid>,
    pub preferred_currency: Option<String>,
    pub updated_at: jiff_diesel::Timestamp,
}

impl UserChangeset {
    pub fn from_account(account: &Account) -> Self {
        Self {
            id: account.user_id.as_str().to_string(),
            plan_id: account.plan_id.clone(),
            role: account.role,
            family_id: account.family_id.map(FamilyId::into_uuid),
            preferred_currency: account
                .preferred_currency
                .as_ref()
                .map(|c| c.as_str().to_string()),
            updated_at: jiff::Timestamp::now().to_diesel(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::TrackingState;
    use jiff::Timestamp;

    #[test]
    fn test_subscription_round_trips_through_row() {
        let family = FamilyId::new();
        let mut subscription = Subscription::create(
            Owner::family(family),
            ProviderId::new(),
            Price::new("9.99".parse().unwrap(), Currency::usd()),
            Recurrency::Custom,
            Some(2),
            Timestamp::now(),
        );
        subscription.set_payer(Some(Payer {
            family_id: family,
            member_id: None,
        }));
        subscription.set_labels([LabelId::new()]);

        let row = SubscriptionRow::from_subscription(&subscription).unwrap();
        assert_eq!(row.owner_type, OwnerType::Family);
        assert_eq!(row.owner_user_id, None);
        assert_eq!(row.price.to_string(), "9.99");

        let children = SubscriptionChildren {
            labels: subscription.labels().ids().map(|l| l.into_uuid()).collect(),
            family_users: Vec::new(),
        };
        let loaded = row.into_subscription(children).unwrap();
        assert_eq!(loaded.tracking_state(), TrackingState::Clean);
        assert_eq!(loaded.loaded_etag(), Some(subscription.etag()));
        assert_eq!(loaded.price().amount, "9.99".parse::<BigDecimal>().unwrap());
        assert_eq!(loaded.labels().len(), 1);
        assert_eq!(loaded.payer(), subscription.payer());
    }

    #[test]
    fn test_inconsistent_owner_columns_are_rejected() {
        let mut row = LabelRow::from_label(&Label::create(Owner::personal("u1"), "Mine", "#000000"));
        row.owner_family_id = Some(Uuid::new_v4());
        assert!(matches!(row.into_label(), Err(AppError::Validation { .. })));
    }
}
