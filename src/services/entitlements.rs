//! Entitlement resolver.
//!
//! Maps the principal's plan to feature limits and compares quota limits
//! against usage counters derived from storage.

use std::sync::Arc;

use serde::Serialize;

use crate::context::{Authentication, RequestContext, SharedClock};
use crate::error::{AppError, AppResult};
use crate::models::{Feature, FeatureLimit, Plan, PlanCatalog};
use crate::repositories::UsageRepository;

/// A feature limit together with current usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveEntitlement {
    pub feature: Feature,
    pub plan_id: String,
    pub limit: FeatureLimit,
    /// Current usage; absent for capabilities
    pub used: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaCheck {
    pub allowed: bool,
    pub effective: EffectiveEntitlement,
}

#[derive(Clone)]
pub struct EntitlementResolver {
    catalog: Arc<PlanCatalog>,
    usage: Arc<dyn UsageRepository>,
    clock: SharedClock,
}

impl EntitlementResolver {
    pub fn new(catalog: Arc<PlanCatalog>, usage: Arc<dyn UsageRepository>, clock: SharedClock) -> Self {
        Self {
            catalog,
            usage,
            clock,
        }
    }

    /// Evaluates `feature` for the principal, as if `delta` more units were used.
    ///
    /// Capabilities ignore `delta` and reflect the plan flag. Unlimited quotas
    /// are always allowed.
    pub async fn check(&self, ctx: &RequestContext, feature: Feature, delta: i64) -> AppResult<QuotaCheck> {
        ctx.ensure_active()?;
        let plan = self.plan_for(ctx)?;
        let limit = plan.limit(feature);

        let (allowed, used) = match limit {
            FeatureLimit::Capability { enabled } => (enabled, None),
            FeatureLimit::Quota { limit } => {
                let user = ctx.must_get_connected_account().user_id();
                let used = ctx
                    .run(self.usage.count(user, feature, self.clock.now()))
                    .await?;
                let allowed = limit.is_none_or(|max| used + delta <= max);
                (allowed, Some(used))
            }
        };

        Ok(QuotaCheck {
            allowed,
            effective: EffectiveEntitlement {
                feature,
                plan_id: plan.id.clone(),
                limit,
                used,
            },
        })
    }

    /// Like [`check`](Self::check), refusing capability features.
    pub async fn check_quota(&self, ctx: &RequestContext, feature: Feature, delta: i64) -> AppResult<QuotaCheck> {
        if !feature.is_quota() {
            return Err(AppError::CannotGetQuotaOnFeature { feature });
        }
        self.check(ctx, feature, delta).await
    }

    /// Fails with [`AppError::LimitReached`] unless `delta` more units fit the quota.
    pub async fn ensure_quota(&self, ctx: &RequestContext, feature: Feature, delta: i64) -> AppResult<()> {
        let check = self.check_quota(ctx, feature, delta).await?;
        if check.allowed {
            return Ok(());
        }
        let limit = match check.effective.limit {
            FeatureLimit::Quota { limit } => limit.unwrap_or_default(),
            FeatureLimit::Capability { .. } => 0,
        };
        tracing::debug!(
            user_id = %ctx.must_get_connected_account().user_id(),
            %feature,
            limit,
            used = ?check.effective.used,
            "Quota exhausted"
        );
        Err(AppError::LimitReached { feature, limit })
    }

    /// Fails with [`AppError::Forbidden`] unless the plan enables the capability.
    pub async fn ensure_capability(&self, ctx: &RequestContext, feature: Feature) -> AppResult<()> {
        let check = self.check(ctx, feature, 0).await?;
        if check.allowed {
            Ok(())
        } else {
            Err(AppError::forbidden(format!(
                "plan {} does not include {}",
                check.effective.plan_id, feature
            )))
        }
    }

    /// Every feature of the principal's plan with current usage.
    pub async fn effective_entitlements(&self, ctx: &RequestContext) -> AppResult<Vec<EffectiveEntitlement>> {
        let mut entitlements = Vec::with_capacity(Feature::ALL.len());
        for feature in Feature::ALL {
            entitlements.push(self.check(ctx, feature, 0).await?.effective);
        }
        Ok(entitlements)
    }

    fn plan_for(&self, ctx: &RequestContext) -> AppResult<&Plan> {
        let plan_id = ctx.must_get_connected_account().plan_id();
        self.catalog
            .resolve(plan_id)
            .ok_or_else(|| AppError::internal(format!("no plan configured for '{plan_id}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ConnectedAccount, SystemClock};
    use crate::models::{Aggregate, Family, Label, Member, MemberType, Owner, Role, UserId};
    use crate::repositories::{FamilyRepository, LabelRepository, MemoryDatabase};

    fn catalog() -> Arc<PlanCatalog> {
        let tight = Plan::new("tight")
            .with_quota(Feature::FamilyMembersCount, Some(2))
            .with_quota(Feature::CustomLabelsCount, Some(1))
            .with_quota(Feature::ActiveSubscriptionsCount, None)
            .with_capability(Feature::MayExport, false);
        let open = Plan::new("open").with_capability(Feature::MayExport, true);
        Arc::new(PlanCatalog::new([tight, open], "tight"))
    }

    fn resolver(db: Arc<MemoryDatabase>) -> EntitlementResolver {
        EntitlementResolver::new(catalog(), db, Arc::new(SystemClock))
    }

    fn ctx(plan: &str) -> RequestContext {
        RequestContext::new(ConnectedAccount::new("u1", plan, Role::User))
    }

    #[tokio::test]
    async fn test_quota_compares_usage_plus_delta() {
        let db = Arc::new(MemoryDatabase::new());
        let mut family = Family::create("Doe", UserId::new("u1"), "Alice");
        FamilyRepository::save(db.as_ref(), &mut family).await.unwrap();
        let resolver = resolver(db.clone());

        let check = resolver.check_quota(&ctx("tight"), Feature::FamilyMembersCount, 1).await.unwrap();
        assert!(check.allowed);
        assert_eq!(check.effective.used, Some(1));

        family.add_member(Member::new(family.id(), "Bob", MemberType::Adult));
        FamilyRepository::save(db.as_ref(), &mut family).await.unwrap();

        let check = resolver.check_quota(&ctx("tight"), Feature::FamilyMembersCount, 1).await.unwrap();
        assert!(!check.allowed);
        let err = resolver.ensure_quota(&ctx("tight"), Feature::FamilyMembersCount, 1).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::LimitReached { feature: Feature::FamilyMembersCount, limit: 2 }
        ));
    }

    #[tokio::test]
    async fn test_unlimited_and_missing_quotas() {
        let db = Arc::new(MemoryDatabase::new());
        let resolver = resolver(db);
        assert!(resolver.check(&ctx("tight"), Feature::ActiveSubscriptionsCount, 1000).await.unwrap().allowed);
        // "open" does not list custom labels at all
        assert!(!resolver.check(&ctx("open"), Feature::CustomLabelsCount, 1).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_capabilities_ignore_delta_and_refuse_quota_checks() {
        let db = Arc::new(MemoryDatabase::new());
        let resolver = resolver(db);

        let check = resolver.check(&ctx("open"), Feature::MayExport, 99).await.unwrap();
        assert!(check.allowed);
        assert_eq!(check.effective.used, None);

        assert!(matches!(
            resolver.check_quota(&ctx("open"), Feature::MayExport, 1).await,
            Err(AppError::CannotGetQuotaOnFeature { feature: Feature::MayExport })
        ));
        assert!(matches!(
            resolver.ensure_capability(&ctx("tight"), Feature::MayExport).await,
            Err(AppError::Forbidden { .. })
        ));
    }

    #[tokio::test]
    async fn test_effective_entitlements_cover_every_feature() {
        let db = Arc::new(MemoryDatabase::new());
        let mut label = Label::create(Owner::personal("u1"), "Mine", "#FFFFFF");
        LabelRepository::save(db.as_ref(), &mut label).await.unwrap();
        let resolver = resolver(db);

        let all = resolver.effective_entitlements(&ctx("tight")).await.unwrap();
        assert_eq!(all.len(), Feature::ALL.len());
        let labels = all.iter().find(|e| e.feature == Feature::CustomLabelsCount).unwrap();
        assert_eq!(labels.used, Some(1));
        assert_eq!(labels.limit, FeatureLimit::Quota { limit: Some(1) });
    }

    #[tokio::test]
    async fn test_unknown_plan_uses_default() {
        let db = Arc::new(MemoryDatabase::new());
        let resolver = resolver(db);
        let check = resolver.check(&ctx("gold"), Feature::MayExport, 0).await.unwrap();
        assert_eq!(check.effective.plan_id, "tight");
    }
}
