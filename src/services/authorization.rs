//! Authorization service.
//!
//! Decides whether the principal of a request may perform a [`Permission`]
//! on an owned entity or on a family itself. Denials are returned as typed
//! errors and never panic.

use std::sync::Arc;

use crate::context::{Authentication, RequestContext};
use crate::error::{AppError, AppResult, EntityKind};
use crate::models::{Family, FamilyId, MemberType, Owned, Owner};
use crate::repositories::FamilyRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    Write,
    Delete,
    Admin,
}

/// Authorization service holding the membership lookup it needs.
///
/// Cloning is cheap since the repository is behind an `Arc`.
#[derive(Clone)]
pub struct AuthorizationService {
    families: Arc<dyn FamilyRepository>,
}

impl AuthorizationService {
    /// Creates a new AuthorizationService.
    ///
    /// # Arguments
    /// * `families` - Repository used to resolve family membership
    pub fn new(families: Arc<dyn FamilyRepository>) -> Self {
        Self { families }
    }

    /// Starts a permission check for the principal of `ctx`.
    ///
    /// # Example
    /// ```ignore
    /// authz.can(&ctx, Permission::Write).on(&label).await?;
    /// ```
    pub fn can<'a>(&'a self, ctx: &'a RequestContext, permission: Permission) -> PermissionCheck<'a> {
        PermissionCheck {
            service: self,
            ctx,
            permission,
        }
    }
}

/// A pending `(principal, permission)` pair awaiting its subject.
pub struct PermissionCheck<'a> {
    service: &'a AuthorizationService,
    ctx: &'a RequestContext,
    permission: Permission,
}

impl PermissionCheck<'_> {
    /// Checks the permission against an owned entity.
    pub async fn on<S: Owned + ?Sized>(&self, subject: &S) -> AppResult<()> {
        self.on_owner(subject.owner(), subject.entity_kind()).await
    }

    /// Checks the permission against an owner directly, e.g. before creating
    /// an entity under that owner.
    pub async fn on_owner(&self, owner: &Owner, entity: EntityKind) -> AppResult<()> {
        self.ctx.ensure_active()?;
        let account = self.ctx.must_get_connected_account();

        if self.permission == Permission::Admin {
            return self.require_admin();
        }

        let user_id = account.user_id();
        match owner {
            Owner::System if self.permission == Permission::Read => Ok(()),
            Owner::System => {
                tracing::debug!(user_id = %user_id, %entity, "Denied mutation of system entity");
                Err(AppError::SystemImmutable { entity })
            }
            _ if account.is_admin() => Ok(()),
            Owner::Personal { user_id: owner_id } => {
                if owner_id == user_id {
                    Ok(())
                } else {
                    tracing::debug!(user_id = %user_id, %entity, "Denied access to personal entity");
                    Err(AppError::forbidden(format!("{entity} belongs to another user")))
                }
            }
            Owner::Family { family_id } => self.check_family_owned(*family_id, entity).await,
        }
    }

    /// Checks structural operations on a family: reading it, renaming it,
    /// managing its members, deleting it.
    pub async fn on_family(&self, family: &Family) -> AppResult<()> {
        self.ctx.ensure_active()?;
        let account = self.ctx.must_get_connected_account();

        if self.permission == Permission::Admin {
            return self.require_admin();
        }
        if account.is_admin() {
            return Ok(());
        }

        match (self.permission, family.member_type_of(account.user_id())) {
            (_, None) => {
                tracing::debug!(user_id = %account.user_id(), family_id = %family.id, "Denied access to foreign family");
                Err(AppError::forbidden("not a member of this family"))
            }
            (Permission::Read, Some(_)) => Ok(()),
            (_, Some(MemberType::Owner)) => Ok(()),
            (_, Some(_)) => Err(AppError::OnlyOwnerCanEditFamily),
        }
    }

    async fn check_family_owned(&self, family_id: FamilyId, entity: EntityKind) -> AppResult<()> {
        let account = self.ctx.must_get_connected_account();

        // Claims may be stale, so only reads trust them.
        if self.permission == Permission::Read && account.family_id() == Some(family_id) {
            return Ok(());
        }

        let member_type = self
            .ctx
            .run(self.service.families.member_type_of(family_id, account.user_id()))
            .await?;

        let allowed = match (self.permission, member_type) {
            (_, None) => false,
            (Permission::Read, Some(_)) => true,
            (Permission::Write, Some(t)) => t != MemberType::Kid,
            (Permission::Delete, Some(t)) => t == MemberType::Owner,
            (Permission::Admin, Some(_)) => false,
        };
        if allowed {
            return Ok(());
        }

        tracing::debug!(
            user_id = %account.user_id(),
            %family_id,
            %entity,
            permission = ?self.permission,
            member_type = ?member_type,
            "Denied access to family entity"
        );
        Err(AppError::forbidden(match member_type {
            None => format!("{entity} belongs to another family"),
            Some(MemberType::Kid) => "kids have read-only access".to_string(),
            Some(_) => format!("only the family owner can delete this {entity}"),
        }))
    }

    fn require_admin(&self) -> AppResult<()> {
        if self.ctx.must_get_connected_account().is_admin() {
            Ok(())
        } else {
            Err(AppError::forbidden("administrator role required"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ConnectedAccount;
    use crate::models::{Aggregate, Label, Member, Role, UserId};
    use crate::repositories::MemoryDatabase;

    struct Fixture {
        authz: AuthorizationService,
        family: Family,
    }

    async fn fixture() -> Fixture {
        let db = Arc::new(MemoryDatabase::new());
        let mut family = Family::create("Doe", UserId::new("owner"), "Olive");
        family.add_member(Member::new(family.id(), "Adam", MemberType::Adult).with_user(UserId::new("adult")));
        family.add_member(Member::new(family.id(), "Kim", MemberType::Kid).with_user(UserId::new("kid")));
        FamilyRepository::save(db.as_ref(), &mut family).await.unwrap();
        Fixture {
            authz: AuthorizationService::new(db),
            family,
        }
    }

    fn ctx(user: &str) -> RequestContext {
        RequestContext::new(ConnectedAccount::new(user, "free", Role::User))
    }

    fn admin() -> RequestContext {
        RequestContext::new(ConnectedAccount::new("root", "free", Role::Admin))
    }

    #[tokio::test]
    async fn test_system_entities_are_read_only_for_everyone() {
        let f = fixture().await;
        let label = Label::system("video", "Video", "#000000");
        for ctx in [ctx("owner"), admin()] {
            assert!(f.authz.can(&ctx, Permission::Read).on(&label).await.is_ok());
            for p in [Permission::Write, Permission::Delete] {
                let err = f.authz.can(&ctx, p).on(&label).await.unwrap_err();
                assert!(matches!(err, AppError::SystemImmutable { entity: EntityKind::Label }));
            }
        }
    }

    #[tokio::test]
    async fn test_personal_entities_belong_to_their_user() {
        let f = fixture().await;
        let label = Label::create(Owner::personal("u1"), "Mine", "#000000");
        assert!(f.authz.can(&ctx("u1"), Permission::Delete).on(&label).await.is_ok());
        assert!(matches!(
            f.authz.can(&ctx("u2"), Permission::Read).on(&label).await,
            Err(AppError::Forbidden { .. })
        ));
        assert!(f.authz.can(&admin(), Permission::Write).on(&label).await.is_ok());
    }

    #[tokio::test]
    async fn test_family_roles_gate_mutations() {
        let f = fixture().await;
        let label = Label::create(Owner::family(f.family.id()), "Ours", "#000000");

        for user in ["owner", "adult", "kid"] {
            assert!(f.authz.can(&ctx(user), Permission::Read).on(&label).await.is_ok());
        }
        assert!(f.authz.can(&ctx("adult"), Permission::Write).on(&label).await.is_ok());
        assert!(f.authz.can(&ctx("kid"), Permission::Write).on(&label).await.is_err());
        assert!(f.authz.can(&ctx("owner"), Permission::Delete).on(&label).await.is_ok());
        assert!(f.authz.can(&ctx("adult"), Permission::Delete).on(&label).await.is_err());
        assert!(f.authz.can(&ctx("stranger"), Permission::Read).on(&label).await.is_err());
    }

    #[tokio::test]
    async fn test_stale_family_claim_only_short_circuits_reads() {
        let f = fixture().await;
        let label = Label::create(Owner::family(f.family.id()), "Ours", "#000000");
        let claims = ConnectedAccount::new("former", "free", Role::User).with_family(Some(f.family.id()));
        let ctx = RequestContext::new(claims);
        assert!(f.authz.can(&ctx, Permission::Read).on(&label).await.is_ok());
        assert!(f.authz.can(&ctx, Permission::Write).on(&label).await.is_err());
    }

    #[tokio::test]
    async fn test_structural_family_operations_need_owner_member() {
        let f = fixture().await;
        assert!(f.authz.can(&ctx("kid"), Permission::Read).on_family(&f.family).await.is_ok());
        assert!(f.authz.can(&ctx("owner"), Permission::Write).on_family(&f.family).await.is_ok());
        assert!(matches!(
            f.authz.can(&ctx("adult"), Permission::Write).on_family(&f.family).await,
            Err(AppError::OnlyOwnerCanEditFamily)
        ));
        assert!(matches!(
            f.authz.can(&ctx("stranger"), Permission::Read).on_family(&f.family).await,
            Err(AppError::Forbidden { .. })
        ));
    }

    #[tokio::test]
    async fn test_admin_permission_requires_admin_role() {
        let f = fixture().await;
        assert!(f.authz.can(&admin(), Permission::Admin).on_owner(&Owner::System, EntityKind::Label).await.is_ok());
        assert!(f.authz.can(&ctx("owner"), Permission::Admin).on_family(&f.family).await.is_err());
    }

    #[tokio::test]
    async fn test_canceled_context_short_circuits() {
        let f = fixture().await;
        let ctx = ctx("owner");
        ctx.cancellation().cancel();
        let err = f.authz.can(&ctx, Permission::Read).on_family(&f.family).await.unwrap_err();
        assert!(matches!(err, AppError::Canceled));
    }
}
