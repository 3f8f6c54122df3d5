//! Strongly-typed identifiers used across the domain.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            pub fn into_uuid(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::from_str(s)
                    .map(Self)
                    .map_err(|e| AppError::validation($label, e.to_string()))
            }
        }
    };
}

uuid_id!(
    /// Identifier of a family aggregate.
    FamilyId,
    "family_id"
);
uuid_id!(
    /// Identifier of a member inside a family.
    FamilyMemberId,
    "family_member_id"
);
uuid_id!(SubscriptionId, "subscription_id");
uuid_id!(ProviderId, "provider_id");
uuid_id!(LabelId, "label_id");

/// Identity issued by the external identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_parse_and_display() {
        let id = LabelId::new();
        let parsed: LabelId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_invalid_id_is_validation_error() {
        let err = "not-a-uuid".parse::<FamilyId>().unwrap_err();
        match err {
            AppError::Validation { field, .. } => assert_eq!(field, "family_id"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let uuid = Uuid::nil();
        let json = serde_json::to_string(&ProviderId::from_uuid(uuid)).unwrap();
        assert_eq!(json, format!("\"{}\"", uuid));
        let user = serde_json::to_string(&UserId::new("auth0|42")).unwrap();
        assert_eq!(user, "\"auth0|42\"");
    }
}
