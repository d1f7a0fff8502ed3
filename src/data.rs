//! Immutable, structurally-shared subject snapshot.
//!
//! A `SubjectData` maps each `ContextSet` to a segment of permissions,
//! parents, and options. Instances are never mutated after construction:
//! every transformation returns a new instance that shares every untouched
//! segment with the original (segments sit behind `Arc`). No-op changes
//! return a clone sharing all substructure.

use std::sync::Arc;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::types::{ContextSet, SubjectRef};

/// Entries for one context set. Cloned copy-on-write when that context set
/// is transformed; shared untouched otherwise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Segment {
    #[serde(default)]
    pub(crate) permissions: AHashMap<String, i32>,
    #[serde(default)]
    pub(crate) parents: Vec<SubjectRef>,
    #[serde(default)]
    pub(crate) options: AHashMap<String, String>,
}

impl Segment {
    fn is_empty(&self) -> bool {
        self.permissions.is_empty() && self.parents.is_empty() && self.options.is_empty()
    }
}

/// One subject's permissions, parents, and options, indexed by context set.
///
/// Lookups are exact-match only — fallback to the global scope is resolution
/// policy and lives in the resolver, not here.
#[derive(Debug, Clone, Default)]
pub struct SubjectData {
    segments: AHashMap<ContextSet, Arc<Segment>>,
}

impl SubjectData {
    /// Permission weights at exactly `contexts`. Empty if the context set is
    /// unknown.
    pub fn permissions(&self, contexts: &ContextSet) -> AHashMap<String, i32> {
        self.segments
            .get(contexts)
            .map(|s| s.permissions.clone())
            .unwrap_or_default()
    }

    /// Weight of one permission at exactly `contexts`; 0 when unset.
    pub fn permission(&self, contexts: &ContextSet, name: &str) -> i32 {
        self.segments
            .get(contexts)
            .and_then(|s| s.permissions.get(name).copied())
            .unwrap_or(0)
    }

    /// Set or clear a permission weight. Weight 0 removes the entry; a
    /// removal that empties the segment drops the segment.
    pub fn set_permission(&self, contexts: &ContextSet, name: &str, weight: i32) -> Self {
        let current = self.segments.get(contexts);
        if weight == 0 {
            match current {
                Some(segment) if segment.permissions.contains_key(name) => {
                    let mut updated = (**segment).clone();
                    updated.permissions.remove(name);
                    self.replace_segment(contexts, updated)
                }
                _ => self.clone(),
            }
        } else {
            if let Some(segment) = current {
                if segment.permissions.get(name) == Some(&weight) {
                    return self.clone();
                }
            }
            let mut updated = current.map(|s| (**s).clone()).unwrap_or_default();
            updated.permissions.insert(name.to_string(), weight);
            self.replace_segment(contexts, updated)
        }
    }

    /// Parents declared at exactly `contexts`, in declared order.
    pub fn parents(&self, contexts: &ContextSet) -> Vec<SubjectRef> {
        self.segments
            .get(contexts)
            .map(|s| s.parents.clone())
            .unwrap_or_default()
    }

    /// Append a parent if not already present in that context's list.
    pub fn add_parent(&self, contexts: &ContextSet, subject_type: &str, identifier: &str) -> Self {
        let parent = SubjectRef::new(subject_type, identifier);
        let current = self.segments.get(contexts);
        if current.is_some_and(|s| s.parents.contains(&parent)) {
            return self.clone();
        }
        let mut updated = current.map(|s| (**s).clone()).unwrap_or_default();
        updated.parents.push(parent);
        self.replace_segment(contexts, updated)
    }

    /// Remove a parent if present; no-op otherwise.
    pub fn remove_parent(
        &self,
        contexts: &ContextSet,
        subject_type: &str,
        identifier: &str,
    ) -> Self {
        let parent = SubjectRef::new(subject_type, identifier);
        match self.segments.get(contexts) {
            Some(segment) if segment.parents.contains(&parent) => {
                let mut updated = (**segment).clone();
                updated.parents.retain(|p| p != &parent);
                self.replace_segment(contexts, updated)
            }
            _ => self.clone(),
        }
    }

    /// Options at exactly `contexts`. Empty if the context set is unknown.
    pub fn options(&self, contexts: &ContextSet) -> AHashMap<String, String> {
        self.segments
            .get(contexts)
            .map(|s| s.options.clone())
            .unwrap_or_default()
    }

    /// One option value at exactly `contexts`.
    pub fn option(&self, contexts: &ContextSet, key: &str) -> Option<String> {
        self.segments
            .get(contexts)
            .and_then(|s| s.options.get(key).cloned())
    }

    /// Set an option value, overwriting any existing value.
    pub fn set_option(&self, contexts: &ContextSet, key: &str, value: &str) -> Self {
        let current = self.segments.get(contexts);
        if let Some(segment) = current {
            if segment.options.get(key).map(String::as_str) == Some(value) {
                return self.clone();
            }
        }
        let mut updated = current.map(|s| (**s).clone()).unwrap_or_default();
        updated.options.insert(key.to_string(), value.to_string());
        self.replace_segment(contexts, updated)
    }

    /// Remove an option; no-op if absent.
    pub fn unset_option(&self, contexts: &ContextSet, key: &str) -> Self {
        match self.segments.get(contexts) {
            Some(segment) if segment.options.contains_key(key) => {
                let mut updated = (**segment).clone();
                updated.options.remove(key);
                self.replace_segment(contexts, updated)
            }
            _ => self.clone(),
        }
    }

    /// Context sets that currently carry any entries.
    pub fn active_contexts(&self) -> Vec<ContextSet> {
        self.segments.keys().cloned().collect()
    }

    /// True when no context set carries any entries.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// New instance with one segment replaced (or dropped when it emptied);
    /// all other segments are shared with `self`.
    fn replace_segment(&self, contexts: &ContextSet, updated: Segment) -> Self {
        let mut segments = self.segments.clone();
        if updated.is_empty() {
            segments.remove(contexts);
        } else {
            segments.insert(contexts.clone(), Arc::new(updated));
        }
        SubjectData { segments }
    }

    pub(crate) fn segments(&self) -> &AHashMap<ContextSet, Arc<Segment>> {
        &self.segments
    }

    pub(crate) fn from_segments(segments: AHashMap<ContextSet, Arc<Segment>>) -> Self {
        SubjectData { segments }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::types::ContextSet;

    fn world(name: &str) -> ContextSet {
        ContextSet::single("world", name)
    }

    #[test]
    fn unset_permission_is_zero() {
        let data = SubjectData::default();
        assert_eq!(data.permission(&ContextSet::global(), "anything"), 0);
        assert!(data.permissions(&world("nether")).is_empty());
    }

    #[test]
    fn set_then_get_round_trip() {
        let ctx = world("nether");
        let data = SubjectData::default().set_permission(&ctx, "fly", 1);
        assert_eq!(data.permission(&ctx, "fly"), 1);
        // exact-match only: no fallback at the data layer
        assert_eq!(data.permission(&ContextSet::global(), "fly"), 0);
    }

    #[test]
    fn weight_zero_clears_entry_and_empty_segment() {
        let ctx = world("end");
        let data = SubjectData::default().set_permission(&ctx, "fly", 3);
        let cleared = data.set_permission(&ctx, "fly", 0);
        assert_eq!(cleared.permission(&ctx, "fly"), 0);
        assert!(cleared.is_empty());
    }

    #[test]
    fn negative_weight_is_stored() {
        let ctx = ContextSet::global();
        let data = SubjectData::default().set_permission(&ctx, "build", -1);
        assert_eq!(data.permission(&ctx, "build"), -1);
    }

    #[test]
    fn noop_transformations_share_all_segments() {
        let ctx = world("nether");
        let data = SubjectData::default()
            .set_permission(&ctx, "fly", 1)
            .add_parent(&ctx, "group", "admin");

        // Removing an absent parent, clearing an unset permission, and
        // re-setting an identical weight are all no-ops.
        for same in [
            data.remove_parent(&ctx, "group", "missing"),
            data.set_permission(&ctx, "other", 0),
            data.set_permission(&ctx, "fly", 1),
        ] {
            assert!(Arc::ptr_eq(
                data.segments().get(&ctx).unwrap(),
                same.segments().get(&ctx).unwrap()
            ));
        }
    }

    #[test]
    fn transforming_one_context_shares_the_others() {
        let nether = world("nether");
        let end = world("end");
        let data = SubjectData::default()
            .set_permission(&nether, "fly", 1)
            .set_permission(&end, "fly", 1);
        let changed = data.set_permission(&end, "dig", 1);
        assert!(Arc::ptr_eq(
            data.segments().get(&nether).unwrap(),
            changed.segments().get(&nether).unwrap()
        ));
        assert!(!Arc::ptr_eq(
            data.segments().get(&end).unwrap(),
            changed.segments().get(&end).unwrap()
        ));
    }

    #[test]
    fn add_then_remove_parent_is_query_equivalent() {
        let ctx = ContextSet::global();
        let original = SubjectData::default().add_parent(&ctx, "group", "default");
        let round_trip = original
            .add_parent(&ctx, "group", "admin")
            .remove_parent(&ctx, "group", "admin");
        assert_eq!(original.parents(&ctx), round_trip.parents(&ctx));
    }

    #[test]
    fn duplicate_parent_is_not_appended() {
        let ctx = ContextSet::global();
        let data = SubjectData::default()
            .add_parent(&ctx, "group", "admin")
            .add_parent(&ctx, "group", "mod")
            .add_parent(&ctx, "group", "admin");
        assert_eq!(
            data.parents(&ctx),
            vec![
                SubjectRef::new("group", "admin"),
                SubjectRef::new("group", "mod")
            ]
        );
    }

    #[test]
    fn parent_order_is_preserved() {
        let ctx = ContextSet::global();
        let data = SubjectData::default()
            .add_parent(&ctx, "group", "b")
            .add_parent(&ctx, "group", "a")
            .add_parent(&ctx, "group", "c")
            .remove_parent(&ctx, "group", "a");
        assert_eq!(
            data.parents(&ctx),
            vec![SubjectRef::new("group", "b"), SubjectRef::new("group", "c")]
        );
    }

    #[test]
    fn options_round_trip() {
        let ctx = world("nether");
        let data = SubjectData::default().set_option(&ctx, "prefix", "[admin]");
        assert_eq!(data.option(&ctx, "prefix").as_deref(), Some("[admin]"));
        let cleared = data.unset_option(&ctx, "prefix");
        assert_eq!(cleared.option(&ctx, "prefix"), None);
        assert!(cleared.is_empty());
    }

    #[test]
    fn active_contexts_tracks_populated_segments() {
        let data = SubjectData::default()
            .set_permission(&world("nether"), "fly", 1)
            .set_option(&ContextSet::global(), "prefix", "x");
        let mut contexts = data.active_contexts();
        contexts.sort();
        assert_eq!(contexts, vec![ContextSet::global(), world("nether")]);
    }

    proptest! {
        /// A sequence of set_permission calls behaves like a plain map with
        /// zero-means-remove semantics.
        #[test]
        fn set_permission_matches_model(ops in proptest::collection::vec(
            ("[ab]", "perm\\.[a-d]", -2i32..3), 0..40,
        )) {
            let mut model: std::collections::HashMap<(String, String), i32> =
                std::collections::HashMap::new();
            let mut data = SubjectData::default();
            for (w, name, weight) in &ops {
                let ctx = world(w);
                data = data.set_permission(&ctx, name, *weight);
                if *weight == 0 {
                    model.remove(&(w.clone(), name.clone()));
                } else {
                    model.insert((w.clone(), name.clone()), *weight);
                }
            }
            for (w, name, _) in &ops {
                let expected = model.get(&(w.clone(), name.clone())).copied().unwrap_or(0);
                prop_assert_eq!(data.permission(&world(w), name), expected);
            }
        }
    }
}
