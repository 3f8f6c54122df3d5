//! Accounts, plans and the feature inventory plans are made of.

use std::collections::BTreeMap;
use std::fmt;

use diesel_derive_enum::DbEnum;
use serde::{Deserialize, Serialize};

use crate::models::{Currency, FamilyId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, DbEnum)]
#[db_enum(existing_type_path = "crate::schema::sql_types::UserRole")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// Stored account of a user. The account id is the identity provider's user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub user_id: UserId,
    pub plan_id: String,
    pub role: Role,
    pub family_id: Option<FamilyId>,
    pub preferred_currency: Option<Currency>,
}

/// Resolved per-user preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserPreferences {
    pub currency: Currency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Quota,
    Capability,
}

/// Closed set of plan features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    ActiveSubscriptionsCount,
    CustomProvidersCount,
    CustomLabelsCount,
    FamilyMembersCount,
    MayExport,
}

impl Feature {
    pub const ALL: [Feature; 5] = [
        Feature::ActiveSubscriptionsCount,
        Feature::CustomProvidersCount,
        Feature::CustomLabelsCount,
        Feature::FamilyMembersCount,
        Feature::MayExport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::ActiveSubscriptionsCount => "active_subscriptions_count",
            Feature::CustomProvidersCount => "custom_providers_count",
            Feature::CustomLabelsCount => "custom_labels_count",
            Feature::FamilyMembersCount => "family_members_count",
            Feature::MayExport => "may_export",
        }
    }

    pub fn kind(&self) -> FeatureKind {
        match self {
            Feature::MayExport => FeatureKind::Capability,
            _ => FeatureKind::Quota,
        }
    }

    pub fn is_quota(&self) -> bool {
        self.kind() == FeatureKind::Quota
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limit a plan attaches to a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureLimit {
    /// `None` is unlimited
    Quota { limit: Option<i64> },
    Capability { enabled: bool },
}

/// A named bundle of feature limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub id: String,
    limits: BTreeMap<Feature, FeatureLimit>,
}

impl Plan {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            limits: BTreeMap::new(),
        }
    }

    pub fn with_quota(mut self, feature: Feature, limit: Option<i64>) -> Self {
        self.limits.insert(feature, FeatureLimit::Quota { limit });
        self
    }

    pub fn with_capability(mut self, feature: Feature, enabled: bool) -> Self {
        self.limits
            .insert(feature, FeatureLimit::Capability { enabled });
        self
    }

    /// Limit for `feature`. Features the plan does not mention are denied:
    /// quotas get a zero limit and capabilities are disabled.
    pub fn limit(&self, feature: Feature) -> FeatureLimit {
        match self.limits.get(&feature) {
            Some(limit) => *limit,
            None => match feature.kind() {
                FeatureKind::Quota => FeatureLimit::Quota { limit: Some(0) },
                FeatureKind::Capability => FeatureLimit::Capability { enabled: false },
            },
        }
    }
}

/// All plans known to the service, keyed by plan id.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: BTreeMap<String, Plan>,
    default_plan: String,
}

impl PlanCatalog {
    pub fn new(plans: impl IntoIterator<Item = Plan>, default_plan: impl Into<String>) -> Self {
        Self {
            plans: plans.into_iter().map(|p| (p.id.clone(), p)).collect(),
            default_plan: default_plan.into(),
        }
    }

    pub fn get(&self, plan_id: &str) -> Option<&Plan> {
        self.plans.get(plan_id)
    }

    pub fn default_plan(&self) -> Option<&Plan> {
        self.plans.get(&self.default_plan)
    }

    pub fn plan_ids(&self) -> impl Iterator<Item = &str> {
        self.plans.keys().map(String::as_str)
    }

    /// Resolves a plan id, falling back to the default plan for unknown ids.
    pub fn resolve(&self, plan_id: &str) -> Option<&Plan> {
        self.get(plan_id).or_else(|| {
            tracing::warn!(plan_id, default_plan = %self.default_plan, "Unknown plan, using default");
            self.default_plan()
        })
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        let free = Plan::new("free")
            .with_quota(Feature::ActiveSubscriptionsCount, Some(10))
            .with_quota(Feature::CustomProvidersCount, Some(5))
            .with_quota(Feature::CustomLabelsCount, Some(10))
            .with_quota(Feature::FamilyMembersCount, Some(3))
            .with_capability(Feature::MayExport, false);
        let premium = Plan::new("premium")
            .with_quota(Feature::ActiveSubscriptionsCount, None)
            .with_quota(Feature::CustomProvidersCount, None)
            .with_quota(Feature::CustomLabelsCount, None)
            .with_quota(Feature::FamilyMembersCount, Some(10))
            .with_capability(Feature::MayExport, true);
        Self::new([free, premium], "free")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_kinds() {
        assert!(Feature::FamilyMembersCount.is_quota());
        assert_eq!(Feature::MayExport.kind(), FeatureKind::Capability);
        assert_eq!(
            serde_json::to_string(&Feature::CustomLabelsCount).unwrap(),
            "\"custom_labels_count\""
        );
    }

    #[test]
    fn test_missing_features_are_denied() {
        let plan = Plan::new("empty");
        assert_eq!(
            plan.limit(Feature::CustomProvidersCount),
            FeatureLimit::Quota { limit: Some(0) }
        );
        assert_eq!(
            plan.limit(Feature::MayExport),
            FeatureLimit::Capability { enabled: false }
        );
    }

    #[test]
    fn test_catalog_falls_back_to_default_plan() {
        let catalog = PlanCatalog::default();
        assert_eq!(catalog.resolve("premium").unwrap().id, "premium");
        assert_eq!(catalog.resolve("legacy-gold").unwrap().id, "free");
    }
}
