//! Inheritance-walking resolution.
//!
//! Depth-first search over the subject graph with a fixed precedence:
//! own transient data at the exact contexts, own persistent data, the same
//! two at the global scope, then parents (transient-exact, transient-global,
//! persistent-exact, persistent-global, deduplicated keeping first
//! occurrence) recursively. The first nonzero weight (or first set option
//! value) terminates the search; a visited set of subject references guards
//! against cycles, and a depth cap bounds pathological graphs.

use ahash::AHashSet;
use tracing::warn;

use crate::data::SubjectData;
use crate::subject::CalculatedSubject;
use crate::types::{ContextSet, SubjectRef};

/// Effective weight of `name` for `root` at `contexts`; 0 when nothing in
/// the walk defines it.
pub(crate) fn resolve_permission(
    root: &CalculatedSubject,
    contexts: &ContextSet,
    name: &str,
    max_depth: u32,
) -> i32 {
    let mut visited = AHashSet::new();
    walk(root, contexts, &mut visited, 0, max_depth, &mut |data, ctx| {
        match data.permission(ctx, name) {
            0 => None,
            weight => Some(weight),
        }
    })
    .unwrap_or(0)
}

/// Effective value of option `key` for `root` at `contexts`.
pub(crate) fn resolve_option(
    root: &CalculatedSubject,
    contexts: &ContextSet,
    key: &str,
    max_depth: u32,
) -> Option<String> {
    let mut visited = AHashSet::new();
    walk(root, contexts, &mut visited, 0, max_depth, &mut |data, ctx| {
        data.option(ctx, key)
    })
}

/// Parent lists for one subject in precedence order, deduplicated keeping
/// the first occurrence.
pub(crate) fn parent_order(
    transient: &SubjectData,
    persistent: &SubjectData,
    contexts: &ContextSet,
) -> Vec<SubjectRef> {
    let global = ContextSet::global();
    let mut seen = AHashSet::new();
    let mut ordered = Vec::new();
    for data in [transient, persistent] {
        for ctx in scope_order(contexts, &global) {
            for parent in data.parents(ctx) {
                if seen.insert(parent.clone()) {
                    ordered.push(parent);
                }
            }
        }
    }
    ordered
}

/// The exact contexts, then the global scope when they differ.
fn scope_order<'a>(contexts: &'a ContextSet, global: &'a ContextSet) -> Vec<&'a ContextSet> {
    if contexts.is_global() {
        vec![contexts]
    } else {
        vec![contexts, global]
    }
}

fn walk<T>(
    subject: &CalculatedSubject,
    contexts: &ContextSet,
    visited: &mut AHashSet<SubjectRef>,
    depth: u32,
    max_depth: u32,
    extract: &mut impl FnMut(&SubjectData, &ContextSet) -> Option<T>,
) -> Option<T> {
    if depth > max_depth {
        warn!(
            subject = %subject.reference(),
            max_depth,
            "inheritance walk exceeded depth cap; treating branch as unset"
        );
        return None;
    }
    if !visited.insert(subject.reference().clone()) {
        return None;
    }

    let transient = subject.transient_data();
    let persistent = subject.persistent_data();
    let global = ContextSet::global();

    for ctx in scope_order(contexts, &global) {
        for data in [&transient, &persistent] {
            if let Some(found) = extract(data, ctx) {
                return Some(found);
            }
        }
    }

    for parent_ref in parent_order(&transient, &persistent, contexts) {
        if visited.contains(&parent_ref) {
            continue;
        }
        let Some(parent) = subject.fetch(&parent_ref) else {
            continue;
        };
        if let Some(found) = walk(&parent, contexts, visited, depth + 1, max_depth, extract) {
            return Some(found);
        }
    }
    None
}
