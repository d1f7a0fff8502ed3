//! Live, queryable subject bound to a `SubjectRef`.
//!
//! # Concurrency model
//!
//! Each subject holds two snapshot slots behind `ArcSwap`: the persistent
//! snapshot (mirror of store state) and a transient, session-only overlay.
//! Queries load whichever snapshot pointers are currently installed and
//! read fully immutable data — arbitrarily many readers proceed without
//! coordination and never observe a partially-updated snapshot.
//!
//! Mutations run a compare-and-swap retry loop per slot: load, apply the
//! transformer, run the registry's update guards, then swap. Losing a race
//! against a concurrent update retries against the fresh snapshot, so the
//! transformer must be a pure function of the old snapshot. A committed
//! persistent update queues a fire-and-forget save; the caller never waits
//! on the store.

use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use tracing::warn;

use crate::data::SubjectData;
use crate::registry::RegistryCore;
use crate::resolver;
use crate::types::{ContextSet, SubjectRef, UpdateOutcome};

#[derive(Debug)]
pub struct CalculatedSubject {
    reference: SubjectRef,
    persistent: ArcSwap<SubjectData>,
    transient: ArcSwap<SubjectData>,
    /// Weak so cached subjects don't keep a disposed manager alive.
    owner: Weak<RegistryCore>,
    max_depth: u32,
}

impl CalculatedSubject {
    pub(crate) fn new(
        reference: SubjectRef,
        persistent: SubjectData,
        owner: Weak<RegistryCore>,
        max_depth: u32,
    ) -> Self {
        CalculatedSubject {
            reference,
            persistent: ArcSwap::from_pointee(persistent),
            transient: ArcSwap::from_pointee(SubjectData::default()),
            owner,
            max_depth,
        }
    }

    pub fn reference(&self) -> &SubjectRef {
        &self.reference
    }

    /// Current persistent snapshot.
    pub fn persistent_data(&self) -> Arc<SubjectData> {
        self.persistent.load_full()
    }

    /// Current transient (session-only) snapshot.
    pub fn transient_data(&self) -> Arc<SubjectData> {
        self.transient.load_full()
    }

    /// Effective weight of `name` at `contexts`, resolved through the
    /// inheritance graph. 0 when unset everywhere.
    pub fn permission(&self, contexts: &ContextSet, name: &str) -> i32 {
        resolver::resolve_permission(self, contexts, name, self.max_depth)
    }

    /// True when the effective weight is positive.
    pub fn has_permission(&self, contexts: &ContextSet, name: &str) -> bool {
        self.permission(contexts, name) > 0
    }

    /// Effective value of option `key` at `contexts`, resolved through the
    /// inheritance graph.
    pub fn option(&self, contexts: &ContextSet, key: &str) -> Option<String> {
        resolver::resolve_option(self, contexts, key, self.max_depth)
    }

    /// This subject's own parents at `contexts`: transient-exact,
    /// transient-global, persistent-exact, persistent-global, deduplicated
    /// keeping first occurrence. Not recursive.
    pub fn parents(&self, contexts: &ContextSet) -> Vec<SubjectRef> {
        resolver::parent_order(&self.transient_data(), &self.persistent_data(), contexts)
    }

    /// Apply a pure transformation to the persistent snapshot. On commit the
    /// new snapshot is installed atomically and queued for asynchronous
    /// persistence; a guard veto leaves state untouched.
    pub fn update<F>(&self, transform: F) -> UpdateOutcome
    where
        F: Fn(&SubjectData) -> SubjectData,
    {
        self.run_update(&self.persistent, transform, true)
    }

    /// Apply a pure transformation to the transient snapshot. Same
    /// cancellation protocol and atomic swap; never persisted.
    pub fn update_transient<F>(&self, transform: F) -> UpdateOutcome
    where
        F: Fn(&SubjectData) -> SubjectData,
    {
        self.run_update(&self.transient, transform, false)
    }

    fn run_update<F>(&self, slot: &ArcSwap<SubjectData>, transform: F, persist: bool) -> UpdateOutcome
    where
        F: Fn(&SubjectData) -> SubjectData,
    {
        loop {
            let old = slot.load_full();
            let candidate = Arc::new(transform(&old));
            if let Some(core) = self.owner.upgrade() {
                if core.vetoed(&self.reference, &old, &candidate) {
                    return UpdateOutcome::cancelled();
                }
            }
            let previous = slot.compare_and_swap(&old, Arc::clone(&candidate));
            if Arc::ptr_eq(&previous, &old) {
                if persist {
                    match self.owner.upgrade() {
                        Some(core) => core.schedule_save(self.reference.clone(), candidate),
                        None => warn!(
                            subject = %self.reference,
                            "registry dropped; committed snapshot will not be persisted"
                        ),
                    }
                }
                return UpdateOutcome::committed();
            }
            // Lost the race; retry against the fresh snapshot.
        }
    }

    /// Look up another subject through the owning registry, for the
    /// inheritance walk. Load failures are logged and treated as absent —
    /// queries are infallible.
    pub(crate) fn fetch(&self, reference: &SubjectRef) -> Option<Arc<CalculatedSubject>> {
        let core = self.owner.upgrade()?;
        match RegistryCore::subject(&core, reference) {
            Ok(subject) => Some(subject),
            Err(error) => {
                warn!(
                    subject = %self.reference,
                    parent = %reference,
                    %error,
                    "skipping unloadable parent during resolution"
                );
                None
            }
        }
    }
}
