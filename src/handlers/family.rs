//! Family and family member commands.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::{Authentication, RequestContext};
use crate::error::{AppError, AppResult};
use crate::handlers::{CommandHandler, QueryHandler, principal_account_draft, relinked_account};
use crate::models::{
    Account, Aggregate, Family, FamilyId, FamilyMemberId, Feature, Member, MemberChanges,
    MemberType, UserId,
};
use crate::repositories::{AccountRepository, FamilyRepository, Repositories};
use crate::services::{AuthorizationService, EntitlementResolver, Permission, Services};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateFamily {
    pub name: String,
    /// Display name of the creator's own member row
    pub creator_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateFamily {
    pub id: FamilyId,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteFamily {
    pub id: FamilyId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateFamilyMember {
    pub family_id: FamilyId,
    /// Generated when absent; an id already in the family is ignored
    pub id: Option<FamilyMemberId>,
    pub name: String,
    pub member_type: MemberType,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateFamilyMember {
    pub family_id: FamilyId,
    pub id: FamilyMemberId,
    pub name: Option<String>,
    pub member_type: Option<MemberType>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteFamilyMember {
    pub family_id: FamilyId,
    pub id: FamilyMemberId,
}

/// Invites an existing unlinked member, or creates one named `name` first.
#[derive(Debug, Clone, Deserialize)]
pub struct InviteFamilyMember {
    pub family_id: FamilyId,
    pub member_id: Option<FamilyMemberId>,
    pub name: Option<String>,
    #[serde(default = "default_member_type")]
    pub member_type: MemberType,
}

fn default_member_type() -> MemberType {
    MemberType::Adult
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcceptInvitation {
    pub family_id: FamilyId,
    pub member_id: FamilyMemberId,
    pub code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeclineInvitation {
    pub family_id: FamilyId,
    pub member_id: FamilyMemberId,
    pub code: String,
}

/// The principal's own family.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FamilyGet;

/// Code handed to the invitee out of band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invitation {
    pub family_id: FamilyId,
    pub member_id: FamilyMemberId,
    pub code: String,
}

#[derive(Clone)]
pub struct FamilyHandler {
    families: Arc<dyn FamilyRepository>,
    accounts: Arc<dyn AccountRepository>,
    authorization: AuthorizationService,
    entitlements: EntitlementResolver,
}

impl FamilyHandler {
    pub fn new(repos: &Repositories, services: &Services) -> Self {
        Self {
            families: repos.families.clone(),
            accounts: repos.accounts.clone(),
            authorization: services.authorization.clone(),
            entitlements: services.entitlements.clone(),
        }
    }

    async fn load(&self, ctx: &RequestContext, id: FamilyId) -> AppResult<Family> {
        ctx.run(self.families.get_by_id(id))
            .await?
            .ok_or_else(|| AppError::family_not_found(id))
    }

    /// Validates then persists; the repository cleans the aggregate.
    async fn save(&self, ctx: &RequestContext, family: &mut Family) -> AppResult<()> {
        self.save_with_accounts(ctx, family, &[]).await
    }

    /// Validates then persists the family together with `accounts` in a
    /// single repository call, so a canceled command leaves no half write.
    async fn save_with_accounts(
        &self,
        ctx: &RequestContext,
        family: &mut Family,
        accounts: &[Account],
    ) -> AppResult<()> {
        if let Some(errors) = family.validation_errors() {
            return Err(errors.into());
        }
        ctx.run(self.families.save_with_accounts(family, accounts)).await
    }

    /// The principal's account pointed at `family_id`, when that needs a write.
    async fn principal_link(
        &self,
        ctx: &RequestContext,
        family_id: FamilyId,
    ) -> AppResult<Option<Account>> {
        let (mut account, stored) = principal_account_draft(ctx, self.accounts.as_ref()).await?;
        if stored && account.family_id == Some(family_id) {
            return Ok(None);
        }
        account.family_id = Some(family_id);
        Ok(Some(account))
    }

    /// One family per user: joining or creating another one is refused.
    async fn ensure_no_other_family(
        &self,
        ctx: &RequestContext,
        user: &UserId,
        except: Option<FamilyId>,
    ) -> AppResult<()> {
        match ctx.run(self.families.get_for_user(user)).await? {
            Some(family) if Some(family.id()) != except => Err(AppError::FamilyAlreadyExists),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl CommandHandler<CreateFamily> for FamilyHandler {
    type Output = Family;

    async fn handle(&self, ctx: &RequestContext, command: CreateFamily) -> AppResult<Family> {
        ctx.ensure_active()?;
        let user = ctx.must_get_connected_account().user_id().clone();
        self.ensure_no_other_family(ctx, &user, None).await?;

        let mut family = Family::create(command.name, user.clone(), command.creator_name);
        let link = self.principal_link(ctx, family.id()).await?;
        self.save_with_accounts(ctx, &mut family, link.as_slice()).await?;

        tracing::info!(user_id = %user, family_id = %family.id(), "Family created");
        Ok(family)
    }
}

#[async_trait]
impl CommandHandler<UpdateFamily> for FamilyHandler {
    type Output = Family;

    async fn handle(&self, ctx: &RequestContext, command: UpdateFamily) -> AppResult<Family> {
        ctx.ensure_active()?;
        let mut family = self.load(ctx, command.id).await?;
        self.authorization
            .can(ctx, Permission::Write)
            .on_family(&family)
            .await?;

        family.rename(command.name);
        self.save(ctx, &mut family).await?;
        tracing::info!(family_id = %family.id(), "Family updated");
        Ok(family)
    }
}

#[async_trait]
impl CommandHandler<DeleteFamily> for FamilyHandler {
    type Output = ();

    /// Deleting a family also deletes everything it owns; the repository
    /// detaches member accounts in the same operation.
    async fn handle(&self, ctx: &RequestContext, command: DeleteFamily) -> AppResult<()> {
        ctx.ensure_active()?;
        let family = self.load(ctx, command.id).await?;
        self.authorization
            .can(ctx, Permission::Delete)
            .on_family(&family)
            .await?;

        if !ctx.run(self.families.delete(family.id())).await? {
            return Err(AppError::family_not_found(family.id()));
        }
        tracing::info!(family_id = %family.id(), "Family deleted");
        Ok(())
    }
}

#[async_trait]
impl CommandHandler<CreateFamilyMember> for FamilyHandler {
    type Output = Member;

    async fn handle(&self, ctx: &RequestContext, command: CreateFamilyMember) -> AppResult<Member> {
        ctx.ensure_active()?;
        let mut family = self.load(ctx, command.family_id).await?;
        self.authorization
            .can(ctx, Permission::Write)
            .on_family(&family)
            .await?;
        self.entitlements
            .ensure_quota(ctx, Feature::FamilyMembersCount, 1)
            .await?;

        let mut member = Member::new(family.id(), command.name, command.member_type);
        if let Some(id) = command.id {
            member = member.with_id(id);
        }
        let member_id = member.id();
        family.add_member(member);
        self.save(ctx, &mut family).await?;

        let member = family
            .member(member_id)
            .cloned()
            .ok_or_else(|| AppError::family_member_not_found(member_id))?;
        tracing::info!(family_id = %family.id(), member_id = %member_id, "Family member created");
        Ok(member)
    }
}

#[async_trait]
impl CommandHandler<UpdateFamilyMember> for FamilyHandler {
    type Output = Member;

    async fn handle(&self, ctx: &RequestContext, command: UpdateFamilyMember) -> AppResult<Member> {
        ctx.ensure_active()?;
        let mut family = self.load(ctx, command.family_id).await?;
        self.authorization
            .can(ctx, Permission::Write)
            .on_family(&family)
            .await?;

        family.update_member(
            command.id,
            MemberChanges {
                name: command.name,
                member_type: command.member_type,
            },
        )?;
        self.save(ctx, &mut family).await?;

        let member = family
            .member(command.id)
            .cloned()
            .ok_or_else(|| AppError::family_member_not_found(command.id))?;
        tracing::info!(family_id = %family.id(), member_id = %command.id, "Family member updated");
        Ok(member)
    }
}

#[async_trait]
impl CommandHandler<DeleteFamilyMember> for FamilyHandler {
    type Output = ();

    async fn handle(&self, ctx: &RequestContext, command: DeleteFamilyMember) -> AppResult<()> {
        ctx.ensure_active()?;
        let mut family = self.load(ctx, command.family_id).await?;
        self.authorization
            .can(ctx, Permission::Write)
            .on_family(&family)
            .await?;

        let removed = family.remove_member(command.id)?;
        let unlinked = match removed.user_id() {
            Some(user) => relinked_account(ctx, self.accounts.as_ref(), user, None).await?,
            None => None,
        };
        self.save_with_accounts(ctx, &mut family, unlinked.as_slice()).await?;
        tracing::info!(family_id = %family.id(), member_id = %command.id, "Family member removed");
        Ok(())
    }
}

#[async_trait]
impl CommandHandler<InviteFamilyMember> for FamilyHandler {
    type Output = Invitation;

    async fn handle(&self, ctx: &RequestContext, command: InviteFamilyMember) -> AppResult<Invitation> {
        ctx.ensure_active()?;
        let mut family = self.load(ctx, command.family_id).await?;
        self.authorization
            .can(ctx, Permission::Write)
            .on_family(&family)
            .await?;

        let member_id = match (command.member_id, command.name) {
            (Some(id), _) => id,
            (None, Some(name)) => {
                self.entitlements
                    .ensure_quota(ctx, Feature::FamilyMembersCount, 1)
                    .await?;
                let member = Member::new(family.id(), name, command.member_type);
                let id = member.id();
                family.add_member(member);
                id
            }
            (None, None) => {
                return Err(AppError::CannotInviteUser {
                    reason: "either a member id or a name is required".to_string(),
                });
            }
        };

        let code = family.invite_member(member_id)?;
        self.save(ctx, &mut family).await?;
        tracing::info!(family_id = %family.id(), member_id = %member_id, "Family member invited");
        Ok(Invitation {
            family_id: family.id(),
            member_id,
            code,
        })
    }
}

#[async_trait]
impl CommandHandler<AcceptInvitation> for FamilyHandler {
    type Output = Family;

    /// The invitee is not a member yet, so the code stands in for authorization.
    async fn handle(&self, ctx: &RequestContext, command: AcceptInvitation) -> AppResult<Family> {
        ctx.ensure_active()?;
        let user = ctx.must_get_connected_account().user_id().clone();
        let mut family = self.load(ctx, command.family_id).await?;
        self.ensure_no_other_family(ctx, &user, Some(family.id())).await?;

        family.accept_invitation(command.member_id, user.clone(), &command.code)?;
        let link = self.principal_link(ctx, family.id()).await?;
        self.save_with_accounts(ctx, &mut family, link.as_slice()).await?;

        tracing::info!(user_id = %user, family_id = %family.id(), member_id = %command.member_id, "Invitation accepted");
        Ok(family)
    }
}

#[async_trait]
impl CommandHandler<DeclineInvitation> for FamilyHandler {
    type Output = ();

    async fn handle(&self, ctx: &RequestContext, command: DeclineInvitation) -> AppResult<()> {
        ctx.ensure_active()?;
        let mut family = self.load(ctx, command.family_id).await?;
        family.decline_invitation(command.member_id, &command.code)?;
        self.save(ctx, &mut family).await?;
        tracing::info!(family_id = %family.id(), member_id = %command.member_id, "Invitation declined");
        Ok(())
    }
}

#[async_trait]
impl QueryHandler<FamilyGet> for FamilyHandler {
    type Output = Family;

    async fn query(&self, ctx: &RequestContext, _query: FamilyGet) -> AppResult<Family> {
        ctx.ensure_active()?;
        let user = ctx.must_get_connected_account().user_id();
        let family = ctx
            .run(self.families.get_for_user(user))
            .await?
            .ok_or_else(|| AppError::family_not_found(user))?;
        self.authorization
            .can(ctx, Permission::Read)
            .on_family(&family)
            .await?;
        Ok(family)
    }
}
