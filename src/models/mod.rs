mod account;
mod family;
mod ids;
mod label;
mod money;
mod owner;
mod provider;
mod subscription;
pub mod tracking;

pub use account::{
    Account, Feature, FeatureKind, FeatureLimit, Plan, PlanCatalog, Role, UserPreferences,
};
pub use family::{Family, Member, MemberChanges, MemberType};
pub use ids::{FamilyId, FamilyMemberId, LabelId, ProviderId, SubscriptionId, UserId};
pub use label::{Label, normalize_color};
pub use money::{Currency, Price, ensure_positive_rate, round_cents};
pub use owner::{Owned, Owner, OwnerRecord, OwnerType};
pub use provider::{Provider, ProviderDetails};
pub use subscription::{FreeTrial, Payer, Recurrency, Subscription};
pub use tracking::{Aggregate, Identified, TrackedSet, TrackingState};
