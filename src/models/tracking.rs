//! Change tracking for aggregates and their child collections.
//!
//! Repositories persist only what the tracker reports: the root row when the
//! aggregate is [`TrackingState::New`] or [`TrackingState::Dirty`], and the
//! added/updated/removed partitions of every [`TrackedSet`]. After a
//! successful save the repository calls [`Aggregate::clean`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{FamilyMemberId, LabelId};

/// Observable persistence state of an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingState {
    /// Matches what was loaded or last saved
    Clean,
    /// Loaded from storage and mutated since
    Dirty,
    /// Never persisted
    New,
}

/// Items stored in a [`TrackedSet`] expose a stable identity.
pub trait Identified {
    type Id: Clone + Ord + fmt::Debug + Send + Sync;

    fn identity(&self) -> Self::Id;
}

impl Identified for LabelId {
    type Id = LabelId;

    fn identity(&self) -> LabelId {
        *self
    }
}

impl Identified for FamilyMemberId {
    type Id = FamilyMemberId;

    fn identity(&self) -> FamilyMemberId {
        *self
    }
}

/// A set of child entities that remembers what changed since the last clean point.
///
/// The three partitions are disjoint. Adding an item that was removed in the
/// same session turns into an update; removing an item added in the same
/// session forgets it entirely.
#[derive(Debug, Clone)]
pub struct TrackedSet<T: Identified> {
    items: BTreeMap<T::Id, T>,
    added: BTreeSet<T::Id>,
    updated: BTreeSet<T::Id>,
    removed: BTreeSet<T::Id>,
}

impl<T: Identified> Default for TrackedSet<T> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
            added: BTreeSet::new(),
            updated: BTreeSet::new(),
            removed: BTreeSet::new(),
        }
    }
}

impl<T: Identified + Clone + PartialEq> TrackedSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a clean set from items read back from storage.
    pub fn from_loaded(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: items.into_iter().map(|i| (i.identity(), i)).collect(),
            ..Self::default()
        }
    }

    /// Adds an item. Duplicate identities are ignored and return `false`.
    pub fn add(&mut self, item: T) -> bool {
        let id = item.identity();
        if self.items.contains_key(&id) {
            return false;
        }
        if self.removed.remove(&id) {
            self.updated.insert(id.clone());
        } else {
            self.added.insert(id.clone());
        }
        self.items.insert(id, item);
        true
    }

    /// Replaces an existing item. Returns `false` when the identity is unknown
    /// or the item is unchanged.
    pub fn update(&mut self, item: T) -> bool {
        let id = item.identity();
        match self.items.get(&id) {
            None => false,
            Some(current) if *current == item => false,
            Some(_) => {
                if !self.added.contains(&id) {
                    self.updated.insert(id.clone());
                }
                self.items.insert(id, item);
                true
            }
        }
    }

    pub fn remove(&mut self, id: &T::Id) -> Option<T> {
        let item = self.items.remove(id)?;
        if !self.added.remove(id) {
            self.updated.remove(id);
            self.removed.insert(id.clone());
        }
        Some(item)
    }

    /// Makes the set equal to `items`, recording the difference as changes.
    /// Returns `true` when anything changed.
    pub fn replace_all(&mut self, items: impl IntoIterator<Item = T>) -> bool {
        let wanted: BTreeMap<T::Id, T> = items.into_iter().map(|i| (i.identity(), i)).collect();
        let stale: Vec<T::Id> = self
            .items
            .keys()
            .filter(|id| !wanted.contains_key(*id))
            .cloned()
            .collect();

        let mut changed = false;
        for id in stale {
            changed |= self.remove(&id).is_some();
        }
        for (_, item) in wanted {
            if self.items.contains_key(&item.identity()) {
                changed |= self.update(item);
            } else {
                changed |= self.add(item);
            }
        }
        changed
    }

    pub fn get(&self, id: &T::Id) -> Option<&T> {
        self.items.get(id)
    }

    pub fn contains(&self, id: &T::Id) -> bool {
        self.items.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &T::Id> {
        self.items.keys()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn added(&self) -> impl Iterator<Item = &T> {
        self.added.iter().filter_map(|id| self.items.get(id))
    }

    pub fn updated(&self) -> impl Iterator<Item = &T> {
        self.updated.iter().filter_map(|id| self.items.get(id))
    }

    pub fn removed(&self) -> impl Iterator<Item = &T::Id> {
        self.removed.iter()
    }

    pub fn has_changes(&self) -> bool {
        !(self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty())
    }

    /// Number of child rows a save of the current partitions writes.
    pub fn pending_writes(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }

    pub fn clear_changes(&mut self) {
        self.added.clear();
        self.updated.clear();
        self.removed.clear();
    }
}

impl<T: Identified + PartialEq> PartialEq for TrackedSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl<T: Identified + Serialize> Serialize for TrackedSet<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.items.values())
    }
}

/// Content-derived entity tag.
///
/// A value that fails to serialize gets a random tag instead, so it can never
/// share a tag with another entity and any etag-guarded save of it is stale.
pub fn content_etag<T: Serialize + ?Sized>(value: &T) -> String {
    match serde_json::to_vec(value) {
        Ok(bytes) => format!("{:x}", Sha256::digest(&bytes)),
        Err(error) => {
            tracing::error!(%error, "Entity content is not serializable, using a random etag");
            format!("{:x}", Sha256::digest(Uuid::new_v4().as_bytes()))
        }
    }
}

/// Root-level tracking metadata embedded in every aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tracking {
    state: TrackingState,
    etag: String,
    loaded_etag: Option<String>,
}

impl Tracking {
    pub fn new_entity() -> Self {
        Self {
            state: TrackingState::New,
            etag: String::new(),
            loaded_etag: None,
        }
    }

    pub fn loaded(etag: String) -> Self {
        Self {
            state: TrackingState::Clean,
            loaded_etag: Some(etag.clone()),
            etag,
        }
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn etag(&self) -> &str {
        &self.etag
    }

    /// Etag the storage row is expected to hold; `None` for new aggregates.
    pub fn loaded_etag(&self) -> Option<&str> {
        self.loaded_etag.as_deref()
    }

    pub fn mark_changed(&mut self, etag: String) {
        if self.state != TrackingState::New {
            self.state = TrackingState::Dirty;
        }
        self.etag = etag;
    }

    pub fn mark_clean(&mut self) {
        self.state = TrackingState::Clean;
        self.loaded_etag = Some(self.etag.clone());
    }
}

/// Common surface of tracked aggregates.
pub trait Aggregate {
    type Id: Copy + Ord + fmt::Display;

    fn id(&self) -> Self::Id;

    fn tracking(&self) -> &Tracking;

    /// Child rows the next save has to write.
    fn pending_child_writes(&self) -> usize {
        0
    }

    /// Resets the root and every child set to the clean state.
    fn clean(&mut self);

    fn tracking_state(&self) -> TrackingState {
        self.tracking().state()
    }

    fn etag(&self) -> &str {
        self.tracking().etag()
    }

    fn loaded_etag(&self) -> Option<&str> {
        self.tracking().loaded_etag()
    }

    fn has_changes(&self) -> bool {
        self.tracking_state() != TrackingState::Clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct Child {
        id: u32,
        name: &'static str,
    }

    impl Identified for Child {
        type Id = u32;

        fn identity(&self) -> u32 {
            self.id
        }
    }

    fn child(id: u32, name: &'static str) -> Child {
        Child { id, name }
    }

    #[test]
    fn test_loaded_set_is_clean() {
        let set = TrackedSet::from_loaded(vec![child(1, "a"), child(2, "b")]);
        assert!(!set.has_changes());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_partitions_are_disjoint() {
        let mut set = TrackedSet::from_loaded(vec![child(1, "a"), child(2, "b")]);
        assert!(set.add(child(3, "c")));
        assert!(set.update(child(1, "A")));
        assert!(set.remove(&2).is_some());

        assert_eq!(set.added().map(|c| c.id).collect::<Vec<_>>(), vec![3]);
        assert_eq!(set.updated().map(|c| c.id).collect::<Vec<_>>(), vec![1]);
        assert_eq!(set.removed().copied().collect::<Vec<_>>(), vec![2]);
        assert_eq!(set.pending_writes(), 3);

        set.clear_changes();
        assert!(!set.has_changes());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_duplicate_add_is_a_noop() {
        let mut set = TrackedSet::from_loaded(vec![child(1, "a")]);
        assert!(!set.add(child(1, "other")));
        assert!(!set.has_changes());
        assert_eq!(set.get(&1).unwrap().name, "a");
    }

    #[test]
    fn test_add_then_remove_forgets_the_item() {
        let mut set: TrackedSet<Child> = TrackedSet::new();
        set.add(child(7, "x"));
        set.remove(&7);
        assert!(!set.has_changes());
    }

    #[test]
    fn test_remove_then_add_becomes_update() {
        let mut set = TrackedSet::from_loaded(vec![child(1, "a")]);
        set.remove(&1);
        set.add(child(1, "b"));
        assert_eq!(set.updated().count(), 1);
        assert_eq!(set.removed().count(), 0);
        assert_eq!(set.added().count(), 0);
    }

    #[test]
    fn test_update_with_same_value_is_not_a_change() {
        let mut set = TrackedSet::from_loaded(vec![child(1, "a")]);
        assert!(!set.update(child(1, "a")));
        assert!(!set.update(child(9, "missing")));
        assert!(!set.has_changes());
    }

    #[test]
    fn test_replace_all_records_difference() {
        let mut set = TrackedSet::from_loaded(vec![LabelId::new(), LabelId::new()]);
        let keep = *set.ids().next().unwrap();
        let fresh = LabelId::new();

        assert!(set.replace_all(vec![keep, fresh]));
        assert_eq!(set.added().copied().collect::<Vec<_>>(), vec![fresh]);
        assert_eq!(set.removed().count(), 1);
        assert!(!set.replace_all(vec![keep, fresh]));
        assert_eq!(set.pending_writes(), 2);
    }

    #[test]
    fn test_etag_tracks_content() {
        let a = content_etag(&child(1, "a"));
        assert_eq!(a, content_etag(&child(1, "a")));
        assert_ne!(a, content_etag(&child(1, "b")));
        assert_eq!(a.len(), 64);
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("not serializable"))
        }
    }

    #[test]
    fn test_etag_of_unserializable_value_is_unique() {
        let first = content_etag(&Unserializable);
        let second = content_etag(&Unserializable);
        assert_ne!(first, second);
        assert_eq!(first.len(), 64);
        assert_ne!(first, content_etag(&child(1, "a")));
    }

    #[test]
    fn test_tracking_state_transitions() {
        let mut tracking = Tracking::loaded("e1".to_string());
        assert_eq!(tracking.state(), TrackingState::Clean);
        tracking.mark_changed("e2".to_string());
        assert_eq!(tracking.state(), TrackingState::Dirty);
        assert_eq!(tracking.loaded_etag(), Some("e1"));
        tracking.mark_clean();
        assert_eq!(tracking.loaded_etag(), Some("e2"));

        let mut fresh = Tracking::new_entity();
        fresh.mark_changed("e".to_string());
        assert_eq!(fresh.state(), TrackingState::New);
    }
}
