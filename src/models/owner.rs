//! Ownership of domain entities.
//!
//! Every non-child entity carries an [`Owner`]. Storage flattens it into the
//! `(owner_type, owner_user_id, owner_family_id)` triple; [`OwnerRecord`] is
//! the only codec between the two shapes.

use diesel_derive_enum::DbEnum;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult, EntityKind};
use crate::models::{FamilyId, UserId};

/// Who owns an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Owner {
    Personal { user_id: UserId },
    Family { family_id: FamilyId },
    /// Built-in rows, readable by everyone and mutable by no one
    System,
}

/// Discriminant of [`Owner`] as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, DbEnum)]
#[db_enum(existing_type_path = "crate::schema::sql_types::OwnerType")]
#[serde(rename_all = "lowercase")]
pub enum OwnerType {
    Personal,
    Family,
    System,
}

impl OwnerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerType::Personal => "personal",
            OwnerType::Family => "family",
            OwnerType::System => "system",
        }
    }
}

/// Persistence triple for an [`Owner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerRecord {
    pub owner_type: OwnerType,
    pub owner_user_id: Option<String>,
    pub owner_family_id: Option<Uuid>,
}

impl Owner {
    pub fn personal(user_id: impl Into<UserId>) -> Self {
        Owner::Personal {
            user_id: user_id.into(),
        }
    }

    pub fn family(family_id: FamilyId) -> Self {
        Owner::Family { family_id }
    }

    pub fn owner_type(&self) -> OwnerType {
        match self {
            Owner::Personal { .. } => OwnerType::Personal,
            Owner::Family { .. } => OwnerType::Family,
            Owner::System => OwnerType::System,
        }
    }

    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Owner::Personal { user_id } => Some(user_id),
            _ => None,
        }
    }

    pub fn family_id(&self) -> Option<FamilyId> {
        match self {
            Owner::Family { family_id } => Some(*family_id),
            _ => None,
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Owner::System)
    }

    pub fn is_family(&self) -> bool {
        matches!(self, Owner::Family { .. })
    }

    pub fn to_record(&self) -> OwnerRecord {
        match self {
            Owner::Personal { user_id } => OwnerRecord {
                owner_type: OwnerType::Personal,
                owner_user_id: Some(user_id.as_str().to_string()),
                owner_family_id: None,
            },
            Owner::Family { family_id } => OwnerRecord {
                owner_type: OwnerType::Family,
                owner_user_id: None,
                owner_family_id: Some(family_id.into_uuid()),
            },
            Owner::System => OwnerRecord {
                owner_type: OwnerType::System,
                owner_user_id: None,
                owner_family_id: None,
            },
        }
    }

    /// Rebuilds an owner from its triple, rejecting rows where any column
    /// outside the variant is populated.
    pub fn from_record(record: OwnerRecord) -> AppResult<Owner> {
        match (record.owner_type, record.owner_user_id, record.owner_family_id) {
            (OwnerType::Personal, Some(user_id), None) => Ok(Owner::personal(user_id)),
            (OwnerType::Family, None, Some(family_id)) => {
                Ok(Owner::family(FamilyId::from_uuid(family_id)))
            }
            (OwnerType::System, None, None) => Ok(Owner::System),
            (owner_type, _, _) => Err(AppError::validation(
                "owner",
                format!("inconsistent columns for {} owner", owner_type.as_str()),
            )),
        }
    }
}

impl OwnerRecord {
    pub fn new(
        owner_type: OwnerType,
        owner_user_id: Option<String>,
        owner_family_id: Option<Uuid>,
    ) -> Self {
        Self {
            owner_type,
            owner_user_id,
            owner_family_id,
        }
    }
}

/// Entities that carry an owner and therefore take part in authorization.
pub trait Owned {
    fn owner(&self) -> &Owner;

    fn entity_kind(&self) -> EntityKind;
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_owner() -> impl Strategy<Value = Owner> {
        prop_oneof![
            "[a-z0-9|]{1,24}".prop_map(|s: String| Owner::personal(s)),
            any::<u128>().prop_map(|n| Owner::family(FamilyId::from_uuid(Uuid::from_u128(n)))),
            Just(Owner::System),
        ]
    }

    proptest! {
        #[test]
        fn prop_record_populates_exactly_the_variant_columns(owner in arb_owner()) {
            let record = owner.to_record();
            match owner.owner_type() {
                OwnerType::Personal => {
                    prop_assert!(record.owner_user_id.is_some());
                    prop_assert!(record.owner_family_id.is_none());
                }
                OwnerType::Family => {
                    prop_assert!(record.owner_user_id.is_none());
                    prop_assert!(record.owner_family_id.is_some());
                }
                OwnerType::System => {
                    prop_assert!(record.owner_user_id.is_none());
                    prop_assert!(record.owner_family_id.is_none());
                }
            }
            prop_assert_eq!(Owner::from_record(record).unwrap(), owner);
        }
    }

    #[test]
    fn test_from_record_rejects_mixed_columns() {
        let record = OwnerRecord::new(
            OwnerType::Personal,
            Some("u1".to_string()),
            Some(Uuid::nil()),
        );
        assert!(Owner::from_record(record).is_err());

        let record = OwnerRecord::new(OwnerType::System, Some("u1".to_string()), None);
        assert!(Owner::from_record(record).is_err());

        let record = OwnerRecord::new(OwnerType::Family, None, None);
        assert!(Owner::from_record(record).is_err());
    }

    #[test]
    fn test_owner_serializes_as_tagged_variant() {
        let json = serde_json::to_value(Owner::personal("u1")).unwrap();
        assert_eq!(json["type"], "personal");
        assert_eq!(json["user_id"], "u1");
        let json = serde_json::to_value(Owner::System).unwrap();
        assert_eq!(json["type"], "system");
    }
}
