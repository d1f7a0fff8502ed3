//! Process-wide subject registry.
//!
//! Owns the subject cache (lazy creation, explicit eviction), the store,
//! the update guards, and the background save worker. Subjects keep only a
//! `Weak` back-reference, so dropping the registry disposes the manager:
//! the cache is cleared and the save worker drains its queue and exits.

use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::data::SubjectData;
use crate::error::{PermError, Result};
use crate::store::SubjectDataStore;
use crate::subject::CalculatedSubject;
use crate::types::SubjectRef;

/// Registry tuning knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Depth cap for the inheritance walk.
    pub max_depth: u32,
    /// Bound on the save queue; jobs past the bound are dropped with a
    /// warning (persistence is best-effort).
    pub save_queue_bound: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            max_depth: 50,
            save_queue_bound: 1024,
        }
    }
}

/// Verdict from an update guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDecision {
    Allow,
    Cancel,
}

/// Synchronous veto hook over a proposed snapshot transition. Runs in the
/// updating caller's thread before the swap; must not mutate subject state.
pub trait UpdateGuard: Send + Sync {
    fn review(
        &self,
        subject: &SubjectRef,
        old: &SubjectData,
        candidate: &SubjectData,
    ) -> UpdateDecision;
}

struct SaveJob {
    reference: SubjectRef,
    data: Arc<SubjectData>,
}

pub(crate) struct RegistryCore {
    subjects: DashMap<SubjectRef, Arc<CalculatedSubject>>,
    store: Arc<dyn SubjectDataStore>,
    guards: RwLock<Vec<Arc<dyn UpdateGuard>>>,
    /// `None` once the registry is shutting down.
    saver: Mutex<Option<SyncSender<SaveJob>>>,
    config: RegistryConfig,
}

impl RegistryCore {
    /// Cached subject, or lazily created from the store. A store error at
    /// load time is a hard loading fault — permission checks are
    /// security-sensitive, so there is no silent empty fallback.
    pub(crate) fn subject(
        self: &Arc<Self>,
        reference: &SubjectRef,
    ) -> Result<Arc<CalculatedSubject>> {
        if let Some(existing) = self.subjects.get(reference) {
            return Ok(Arc::clone(&existing));
        }

        // Load outside the map shard lock; a lost insert race just discards
        // this copy.
        let persistent = match self.store.load(reference) {
            Ok(Some(data)) => data,
            Ok(None) => SubjectData::default(),
            Err(e) => {
                return Err(PermError::Loading {
                    subject: reference.clone(),
                    message: e.to_string(),
                })
            }
        };

        let owner = Arc::downgrade(self);
        let max_depth = self.config.max_depth;
        let entry = self
            .subjects
            .entry(reference.clone())
            .or_insert_with(|| {
                Arc::new(CalculatedSubject::new(
                    reference.clone(),
                    persistent,
                    owner,
                    max_depth,
                ))
            });
        Ok(Arc::clone(&entry))
    }

    /// True when any registered guard vetoes the transition.
    pub(crate) fn vetoed(
        &self,
        subject: &SubjectRef,
        old: &SubjectData,
        candidate: &SubjectData,
    ) -> bool {
        for guard in self.guards.read().iter() {
            if guard.review(subject, old, candidate) == UpdateDecision::Cancel {
                debug!(%subject, "update cancelled by guard");
                return true;
            }
        }
        false
    }

    /// Queue a committed persistent snapshot for background save.
    pub(crate) fn schedule_save(&self, reference: SubjectRef, data: Arc<SubjectData>) {
        let saver = self.saver.lock();
        let Some(tx) = saver.as_ref() else {
            warn!(subject = %reference, "save worker stopped; snapshot not persisted");
            return;
        };
        match tx.try_send(SaveJob { reference, data }) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                warn!(subject = %job.reference, "save queue full; snapshot not persisted");
            }
            Err(TrySendError::Disconnected(job)) => {
                warn!(subject = %job.reference, "save worker gone; snapshot not persisted");
            }
        }
    }
}

/// The owning manager: subject cache + store + guards + save worker.
pub struct SubjectRegistry {
    core: Arc<RegistryCore>,
    save_worker: Option<JoinHandle<()>>,
}

impl SubjectRegistry {
    pub fn new(store: Arc<dyn SubjectDataStore>) -> Self {
        Self::with_config(store, RegistryConfig::default())
    }

    pub fn with_config(store: Arc<dyn SubjectDataStore>, config: RegistryConfig) -> Self {
        let (tx, rx) = mpsc::sync_channel::<SaveJob>(config.save_queue_bound);
        let worker_store = Arc::clone(&store);
        let save_worker = std::thread::Builder::new()
            .name("perm-save".to_string())
            .spawn(move || {
                // Exits once every sender is dropped and the queue drains.
                while let Ok(job) = rx.recv() {
                    match worker_store.save(&job.reference, &job.data) {
                        Ok(()) => debug!(subject = %job.reference, "persisted subject data"),
                        Err(error) => {
                            warn!(subject = %job.reference, %error, "failed to persist subject data");
                        }
                    }
                }
            })
            .expect("spawn save worker");

        SubjectRegistry {
            core: Arc::new(RegistryCore {
                subjects: DashMap::new(),
                store,
                guards: RwLock::new(Vec::new()),
                saver: Mutex::new(Some(tx)),
                config,
            }),
            save_worker: Some(save_worker),
        }
    }

    /// Cached subject for (type, identifier), created lazily from the store.
    pub fn subject(&self, subject_type: &str, identifier: &str) -> Result<Arc<CalculatedSubject>> {
        self.subject_by_ref(&SubjectRef::new(subject_type, identifier))
    }

    pub fn subject_by_ref(&self, reference: &SubjectRef) -> Result<Arc<CalculatedSubject>> {
        RegistryCore::subject(&self.core, reference)
    }

    /// Register a synchronous update guard; any guard may veto any update.
    pub fn add_guard(&self, guard: Arc<dyn UpdateGuard>) {
        self.core.guards.write().push(guard);
    }

    /// Drop one subject from the cache. Its transient data is gone; the
    /// next lookup reloads persistent data from the store.
    pub fn evict(&self, reference: &SubjectRef) -> bool {
        self.core.subjects.remove(reference).is_some()
    }

    /// Drop every cached subject.
    pub fn clear(&self) {
        self.core.subjects.clear();
    }

    /// Number of currently cached subjects.
    pub fn cached(&self) -> usize {
        self.core.subjects.len()
    }

    /// Identifiers of cached subjects of one type.
    pub fn identifiers(&self, subject_type: &str) -> Vec<String> {
        self.core
            .subjects
            .iter()
            .filter(|entry| entry.key().subject_type == subject_type)
            .map(|entry| entry.key().identifier.clone())
            .collect()
    }
}

impl Drop for SubjectRegistry {
    /// Manager disposal: clear the cache, then stop the save worker. The
    /// worker drains queued saves before exiting, so dropping the registry
    /// flushes pending best-effort writes.
    fn drop(&mut self) {
        self.core.subjects.clear();
        self.core.saver.lock().take();
        if let Some(worker) = self.save_worker.take() {
            let _ = worker.join();
        }
    }
}
