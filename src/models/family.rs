//! Family aggregate and its members.
//!
//! A family always holds exactly one [`MemberType::Owner`] member: the user
//! who created it. Other members start as plain names and become linked to a
//! user through the invitation flow (`invite_member` then `accept_invitation`).

use diesel_derive_enum::DbEnum;
use jiff::Timestamp;
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::{AppError, AppResult};
use crate::models::tracking::{Aggregate, Identified, TrackedSet, Tracking, content_etag};
use crate::models::{FamilyId, FamilyMemberId, UserId};

const INVITATION_CODE_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, DbEnum)]
#[db_enum(existing_type_path = "crate::schema::sql_types::MemberType")]
#[serde(rename_all = "lowercase")]
pub enum MemberType {
    Owner,
    Adult,
    Kid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Validate)]
pub struct Member {
    pub(crate) id: FamilyMemberId,
    pub(crate) family_id: FamilyId,
    #[validate(length(min = 1, max = 100))]
    pub(crate) name: String,
    pub(crate) member_type: MemberType,
    pub(crate) user_id: Option<UserId>,
    pub(crate) invitation_code: Option<String>,
    pub(crate) created_at: Timestamp,
    pub(crate) updated_at: Timestamp,
    #[serde(skip)]
    pub(crate) etag: String,
}

impl Member {
    pub fn new(family_id: FamilyId, name: impl Into<String>, member_type: MemberType) -> Self {
        let now = Timestamp::now();
        let mut member = Self {
            id: FamilyMemberId::new(),
            family_id,
            name: name.into(),
            member_type,
            user_id: None,
            invitation_code: None,
            created_at: now,
            updated_at: now,
            etag: String::new(),
        };
        member.etag = content_etag(&member);
        member
    }

    pub fn with_id(mut self, id: FamilyMemberId) -> Self {
        self.id = id;
        self.etag = content_etag(&self);
        self
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self.etag = content_etag(&self);
        self
    }

    pub fn id(&self) -> FamilyMemberId {
        self.id
    }

    pub fn family_id(&self) -> FamilyId {
        self.family_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn member_type(&self) -> MemberType {
        self.member_type
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    pub fn invitation_code(&self) -> Option<&str> {
        self.invitation_code.as_deref()
    }

    pub fn etag(&self) -> &str {
        &self.etag
    }

    pub fn is_owner(&self) -> bool {
        self.member_type == MemberType::Owner
    }

    fn touch(&mut self) {
        self.updated_at = Timestamp::now();
        self.etag = content_etag(self);
    }
}

impl Identified for Member {
    type Id = FamilyMemberId;

    fn identity(&self) -> FamilyMemberId {
        self.id
    }
}

/// Partial update of a member; `None` leaves the attribute untouched.
#[derive(Debug, Clone, Default)]
pub struct MemberChanges {
    pub name: Option<String>,
    pub member_type: Option<MemberType>,
}

#[derive(Debug, Clone, Serialize, Validate)]
pub struct Family {
    pub(crate) id: FamilyId,
    #[validate(length(min = 3, max = 100, message = "Family name must be between 3 and 100 characters"))]
    pub(crate) name: String,
    pub(crate) owner_user_id: UserId,
    pub(crate) members: TrackedSet<Member>,
    pub(crate) created_at: Timestamp,
    pub(crate) updated_at: Timestamp,
    #[serde(skip)]
    pub(crate) tracking: Tracking,
}

impl Family {
    /// New family whose only member is the creator, as owner.
    pub fn create(name: impl Into<String>, owner: UserId, creator_name: impl Into<String>) -> Self {
        let id = FamilyId::new();
        let now = Timestamp::now();
        let creator = Member::new(id, creator_name, MemberType::Owner).with_user(owner.clone());
        let mut members = TrackedSet::new();
        members.add(creator);

        let mut family = Self {
            id,
            name: name.into(),
            owner_user_id: owner,
            members,
            created_at: now,
            updated_at: now,
            tracking: Tracking::new_entity(),
        };
        family.refresh_etag();
        family
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner_user_id(&self) -> &UserId {
        &self.owner_user_id
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    pub fn members(&self) -> &TrackedSet<Member> {
        &self.members
    }

    pub fn member(&self, id: FamilyMemberId) -> Option<&Member> {
        self.members.get(&id)
    }

    pub fn member_by_user(&self, user_id: &UserId) -> Option<&Member> {
        self.members
            .iter()
            .find(|m| m.user_id.as_ref() == Some(user_id))
    }

    pub fn member_type_of(&self, user_id: &UserId) -> Option<MemberType> {
        self.member_by_user(user_id).map(|m| m.member_type)
    }

    pub fn has_member(&self, id: FamilyMemberId) -> bool {
        self.members.contains(&id)
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        let name = name.into();
        if self.name != name {
            self.name = name;
            self.touch();
        }
    }

    /// Adds a member. A member whose id is already present is ignored and
    /// `false` is returned.
    pub fn add_member(&mut self, mut member: Member) -> bool {
        if member.family_id != self.id {
            member.family_id = self.id;
            member.etag = content_etag(&member);
        }
        let added = self.members.add(member);
        if added {
            self.touch();
        }
        added
    }

    pub fn update_member(&mut self, id: FamilyMemberId, changes: MemberChanges) -> AppResult<()> {
        let mut member = self
            .members
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::family_member_not_found(id))?;

        let mut changed = false;
        if let Some(name) = changes.name.filter(|n| *n != member.name) {
            member.name = name;
            changed = true;
        }
        if let Some(member_type) = changes.member_type.filter(|t| *t != member.member_type) {
            member.member_type = member_type;
            changed = true;
        }
        if changed {
            member.touch();
            self.members.update(member);
            self.touch();
        }
        Ok(())
    }

    /// Removes a non-owner member.
    pub fn remove_member(&mut self, id: FamilyMemberId) -> AppResult<Member> {
        let member = self
            .members
            .get(&id)
            .ok_or_else(|| AppError::family_member_not_found(id))?;
        if member.is_owner() {
            return Err(AppError::validation(
                "members",
                "the owner member cannot be removed, delete the family instead",
            ));
        }
        let removed = self
            .members
            .remove(&id)
            .ok_or_else(|| AppError::family_member_not_found(id))?;
        self.touch();
        Ok(removed)
    }

    /// Issues a fresh invitation code for a member not yet linked to a user.
    pub fn invite_member(&mut self, id: FamilyMemberId) -> AppResult<String> {
        let mut member = self
            .members
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::family_member_not_found(id))?;
        if member.user_id.is_some() {
            return Err(AppError::CannotInviteUser {
                reason: "member is already linked to a user".to_string(),
            });
        }

        let code = generate_invitation_code();
        member.invitation_code = Some(code.clone());
        member.touch();
        self.members.update(member);
        self.touch();
        Ok(code)
    }

    /// Links `user_id` to the invited member when `code` matches.
    pub fn accept_invitation(
        &mut self,
        id: FamilyMemberId,
        user_id: UserId,
        code: &str,
    ) -> AppResult<()> {
        let mut member = self.invited_member(id, code)?;
        if self.member_by_user(&user_id).is_some() {
            return Err(AppError::CannotInviteUser {
                reason: "user is already a member of this family".to_string(),
            });
        }
        member.user_id = Some(user_id);
        member.invitation_code = None;
        member.touch();
        self.members.update(member);
        self.touch();
        Ok(())
    }

    /// Withdraws a pending invitation; the member stays, unlinked.
    pub fn decline_invitation(&mut self, id: FamilyMemberId, code: &str) -> AppResult<()> {
        let mut member = self.invited_member(id, code)?;
        member.invitation_code = None;
        member.touch();
        self.members.update(member);
        self.touch();
        Ok(())
    }

    fn invited_member(&self, id: FamilyMemberId, code: &str) -> AppResult<Member> {
        let member = self
            .members
            .get(&id)
            .ok_or_else(|| AppError::family_member_not_found(id))?;
        match member.invitation_code.as_deref() {
            Some(expected) if expected == code => Ok(member.clone()),
            _ => Err(AppError::BadInvitationCode),
        }
    }

    pub fn validation_errors(&self) -> Option<ValidationErrors> {
        let mut errors = self.validate().err().unwrap_or_else(ValidationErrors::new);

        let owners = self.members.iter().filter(|m| m.is_owner()).count();
        if owners != 1 {
            errors.add(
                "members",
                ValidationError::new("owner_count")
                    .with_message(format!("family must have exactly one owner member, found {owners}").into()),
            );
        }
        for member in self.members.iter() {
            if member.name.trim().is_empty() || member.validate().is_err() {
                errors.add(
                    "members",
                    ValidationError::new("member_name")
                        .with_message("member name must be between 1 and 100 characters".into()),
                );
            }
            if member.user_id.is_some() && member.invitation_code.is_some() {
                errors.add(
                    "members",
                    ValidationError::new("pending_invitation")
                        .with_message("a linked member cannot have a pending invitation".into()),
                );
            }
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

impl Aggregate for Family {
    type Id = FamilyId;

    fn id(&self) -> FamilyId {
        self.id
    }

    fn tracking(&self) -> &Tracking {
        &self.tracking
    }

    fn pending_child_writes(&self) -> usize {
        self.members.pending_writes()
    }

    fn clean(&mut self) {
        self.members.clear_changes();
        self.tracking.mark_clean();
    }
}

fn generate_invitation_code() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(INVITATION_CODE_LEN)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect()
}
