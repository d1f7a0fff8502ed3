//! `perm_core` — context-scoped subject-permission engine.
//!
//! Subjects (users, groups) hold permissions, parents, and options, each
//! scoped by a set of key/value contexts (e.g. a world name). Snapshots are
//! immutable and structurally shared; readers are lock-free (`ArcSwap` load
//! + immutable data reads) while updates go through a compare-and-swap
//! retry loop with a synchronous cancellation check.
//!
//! Modules:
//! - `types`    — domain value types (Context, ContextSet, SubjectRef)
//! - `data`     — immutable per-subject snapshot (SubjectData)
//! - `resolver` — inheritance-walking resolution
//! - `subject`  — live queryable subject + atomic update protocol
//! - `store`    — persistence boundary (trait + memory/JSON file stores)
//! - `registry` — process-wide subject cache, guards, save worker
//! - `facade`   — legacy world-scoped permission API

pub mod data;
pub mod error;
pub mod facade;
pub mod registry;
mod resolver;
pub mod store;
pub mod subject;
pub mod types;

pub use data::SubjectData;
pub use error::{PermError, Result};
pub use facade::PermissionFacade;
pub use registry::{RegistryConfig, SubjectRegistry, UpdateDecision, UpdateGuard};
pub use store::{JsonFileStore, MemoryStore, SubjectDataStore};
pub use subject::CalculatedSubject;
pub use types::{Context, ContextSet, SubjectRef, UpdateOutcome};
