//! The one place that decides which owned rows a user may see.
//!
//! A user sees the union of system rows, rows they own personally and rows
//! owned by any family in which they are a linked member. The in-memory
//! backend evaluates [`VisibilityScope::admits`]; the Postgres backend
//! expands [`visible_to!`] into the equivalent SQL predicate.

use std::collections::BTreeSet;

use crate::models::{FamilyId, Owner, UserId};

/// Families resolved for one user at query time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityScope {
    pub user_id: UserId,
    pub family_ids: BTreeSet<FamilyId>,
}

impl VisibilityScope {
    pub fn new(user_id: UserId, family_ids: impl IntoIterator<Item = FamilyId>) -> Self {
        Self {
            user_id,
            family_ids: family_ids.into_iter().collect(),
        }
    }

    pub fn admits(&self, owner: &Owner) -> bool {
        match owner {
            Owner::System => true,
            Owner::Personal { user_id } => *user_id == self.user_id,
            Owner::Family { family_id } => self.family_ids.contains(family_id),
        }
    }

    /// Like [`admits`](Self::admits) but excluding system rows, for usage counters.
    pub fn owns(&self, owner: &Owner) -> bool {
        !owner.is_system() && self.admits(owner)
    }
}

/// Diesel predicate selecting the rows of `$table` visible to `$user` (a `&str`).
///
/// `$table` must carry the `owner_type`, `owner_user_id` and `owner_family_id`
/// columns.
macro_rules! visible_to {
    ($table:ident, $user:expr) => {{
        use crate::models::OwnerType;
        use crate::schema::family_members;

        let user: &str = $user;
        $table::owner_type
            .eq(OwnerType::System)
            .or($table::owner_type
                .eq(OwnerType::Personal)
                .and($table::owner_user_id.assume_not_null().eq(user)))
            .or($table::owner_type.eq(OwnerType::Family).and(
                $table::owner_family_id.assume_not_null().eq_any(
                    family_members::table
                        .filter(family_members::user_id.assume_not_null().eq(user))
                        .select(family_members::family_id),
                ),
            ))
    }};
}

pub(crate) use visible_to;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn arb_owner() -> impl Strategy<Value = Owner> {
        prop_oneof![
            prop::sample::select(vec!["u1", "u2", "u3"]).prop_map(|u| Owner::personal(u)),
            (0u128..4).prop_map(|n| Owner::family(FamilyId::from_uuid(Uuid::from_u128(n)))),
            Just(Owner::System),
        ]
    }

    proptest! {
        #[test]
        fn prop_scope_is_exactly_the_union(
            owner in arb_owner(),
            families in prop::collection::btree_set(0u128..4, 0..3),
        ) {
            let scope = VisibilityScope::new(
                UserId::new("u1"),
                families.iter().map(|n| FamilyId::from_uuid(Uuid::from_u128(*n))),
            );
            let expected = match &owner {
                Owner::System => true,
                Owner::Personal { user_id } => user_id.as_str() == "u1",
                Owner::Family { family_id } => families.contains(&family_id.as_uuid().as_u128()),
            };
            prop_assert_eq!(scope.admits(&owner), expected);
            prop_assert_eq!(scope.owns(&owner), expected && !owner.is_system());
        }
    }

    #[test]
    fn test_family_rows_require_membership() {
        let family = FamilyId::new();
        let outsider = VisibilityScope::new(UserId::new("u2"), []);
        let member = VisibilityScope::new(UserId::new("u2"), [family]);
        assert!(!outsider.admits(&Owner::family(family)));
        assert!(member.admits(&Owner::family(family)));
        assert!(outsider.admits(&Owner::System));
    }
}
