//! Domain value types shared across perm_core modules.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single scoping key/value pair, e.g. `("world", "nether")`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Context {
    pub key: String,
    pub value: String,
}

impl Context {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Context {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// An unordered set of contexts qualifying where an entry applies.
///
/// The empty set is the global scope. Backed by a `BTreeSet` so equality and
/// hashing are order-independent and iteration is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContextSet(BTreeSet<Context>);

impl ContextSet {
    /// The empty (global) scope.
    pub fn global() -> Self {
        ContextSet(BTreeSet::new())
    }

    /// A scope with a single context pair.
    pub fn single(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut set = BTreeSet::new();
        set.insert(Context::new(key, value));
        ContextSet(set)
    }

    pub fn is_global(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, context: &Context) -> bool {
        self.0.contains(context)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Context> {
        self.0.iter()
    }
}

impl FromIterator<Context> for ContextSet {
    fn from_iter<I: IntoIterator<Item = Context>>(iter: I) -> Self {
        ContextSet(iter.into_iter().collect())
    }
}

/// A (type, identifier) pair identifying a subject, e.g. `user:alice` or
/// `group:admin`. Equality is exact value match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectRef {
    pub subject_type: String,
    pub identifier: String,
}

impl SubjectRef {
    pub fn new(subject_type: impl Into<String>, identifier: impl Into<String>) -> Self {
        SubjectRef {
            subject_type: subject_type.into(),
            identifier: identifier.into(),
        }
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.subject_type, self.identifier)
    }
}

/// Outcome of an update attempt. Cancellation is a normal, expected result
/// (an external veto), not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub cancelled: bool,
}

impl UpdateOutcome {
    pub fn committed() -> Self {
        UpdateOutcome { cancelled: false }
    }

    pub fn cancelled() -> Self {
        UpdateOutcome { cancelled: true }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_set_equality_is_order_independent() {
        let a: ContextSet = [Context::new("world", "nether"), Context::new("mode", "hard")]
            .into_iter()
            .collect();
        let b: ContextSet = [Context::new("mode", "hard"), Context::new("world", "nether")]
            .into_iter()
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn context_set_deduplicates_pairs() {
        let set: ContextSet = [Context::new("world", "end"), Context::new("world", "end")]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn global_scope_is_empty() {
        assert!(ContextSet::global().is_global());
        assert!(!ContextSet::single("world", "nether").is_global());
    }

    #[test]
    fn subject_ref_display() {
        assert_eq!(SubjectRef::new("group", "admin").to_string(), "group:admin");
    }
}
