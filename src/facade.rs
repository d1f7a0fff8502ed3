//! Legacy world-scoped permission API over the registry.
//!
//! The historical surface speaks (world, subject, permission) triples with
//! a nullable world. Here an absent world maps to the explicit global
//! context set, never a sentinel. Add/remove return `Ok(true)` when the
//! update committed (was not vetoed).

use std::sync::Arc;

use crate::error::Result;
use crate::registry::SubjectRegistry;
use crate::subject::CalculatedSubject;
use crate::types::{ContextSet, SubjectRef};

pub const SUBJECTS_USER: &str = "user";
pub const SUBJECTS_GROUP: &str = "group";

pub struct PermissionFacade {
    registry: Arc<SubjectRegistry>,
}

impl PermissionFacade {
    pub fn new(registry: Arc<SubjectRegistry>) -> Self {
        PermissionFacade { registry }
    }

    fn scope(world: Option<&str>) -> ContextSet {
        match world {
            Some(world) => ContextSet::single("world", world),
            None => ContextSet::global(),
        }
    }

    fn group(&self, name: &str) -> Result<Arc<CalculatedSubject>> {
        self.registry.subject(SUBJECTS_GROUP, name)
    }

    fn user(&self, identifier: &str) -> Result<Arc<CalculatedSubject>> {
        self.registry.subject(SUBJECTS_USER, identifier)
    }

    pub fn group_has(&self, world: Option<&str>, group: &str, permission: &str) -> Result<bool> {
        Ok(self.group(group)?.has_permission(&Self::scope(world), permission))
    }

    pub fn group_add(&self, world: Option<&str>, group: &str, permission: &str) -> Result<bool> {
        let ctx = Self::scope(world);
        let outcome = self
            .group(group)?
            .update(|data| data.set_permission(&ctx, permission, 1));
        Ok(!outcome.is_cancelled())
    }

    pub fn group_remove(&self, world: Option<&str>, group: &str, permission: &str) -> Result<bool> {
        let ctx = Self::scope(world);
        let outcome = self
            .group(group)?
            .update(|data| data.set_permission(&ctx, permission, 0));
        Ok(!outcome.is_cancelled())
    }

    pub fn user_has(&self, world: Option<&str>, user: &str, permission: &str) -> Result<bool> {
        Ok(self.user(user)?.has_permission(&Self::scope(world), permission))
    }

    pub fn user_add(&self, world: Option<&str>, user: &str, permission: &str) -> Result<bool> {
        let ctx = Self::scope(world);
        let outcome = self
            .user(user)?
            .update(|data| data.set_permission(&ctx, permission, 1));
        Ok(!outcome.is_cancelled())
    }

    pub fn user_remove(&self, world: Option<&str>, user: &str, permission: &str) -> Result<bool> {
        let ctx = Self::scope(world);
        let outcome = self
            .user(user)?
            .update(|data| data.set_permission(&ctx, permission, 0));
        Ok(!outcome.is_cancelled())
    }

    /// Session-only grant; never persisted.
    pub fn user_add_transient(
        &self,
        world: Option<&str>,
        user: &str,
        permission: &str,
    ) -> Result<bool> {
        let ctx = Self::scope(world);
        let outcome = self
            .user(user)?
            .update_transient(|data| data.set_permission(&ctx, permission, 1));
        Ok(!outcome.is_cancelled())
    }

    pub fn user_remove_transient(
        &self,
        world: Option<&str>,
        user: &str,
        permission: &str,
    ) -> Result<bool> {
        let ctx = Self::scope(world);
        let outcome = self
            .user(user)?
            .update_transient(|data| data.set_permission(&ctx, permission, 0));
        Ok(!outcome.is_cancelled())
    }

    pub fn user_in_group(&self, world: Option<&str>, user: &str, group: &str) -> Result<bool> {
        let wanted = SubjectRef::new(SUBJECTS_GROUP, group);
        Ok(self
            .user(user)?
            .parents(&Self::scope(world))
            .contains(&wanted))
    }

    pub fn user_add_group(&self, world: Option<&str>, user: &str, group: &str) -> Result<bool> {
        let ctx = Self::scope(world);
        let outcome = self
            .user(user)?
            .update(|data| data.add_parent(&ctx, SUBJECTS_GROUP, group));
        Ok(!outcome.is_cancelled())
    }

    pub fn user_remove_group(&self, world: Option<&str>, user: &str, group: &str) -> Result<bool> {
        let ctx = Self::scope(world);
        let outcome = self
            .user(user)?
            .update(|data| data.remove_parent(&ctx, SUBJECTS_GROUP, group));
        Ok(!outcome.is_cancelled())
    }

    /// Group identifiers among the user's direct parents, declared order.
    pub fn user_groups(&self, world: Option<&str>, user: &str) -> Result<Vec<String>> {
        Ok(self
            .user(user)?
            .parents(&Self::scope(world))
            .into_iter()
            .filter(|p| p.subject_type == SUBJECTS_GROUP)
            .map(|p| p.identifier)
            .collect())
    }

    /// First group parent, if any.
    pub fn primary_group(&self, world: Option<&str>, user: &str) -> Result<Option<String>> {
        Ok(self.user_groups(world, user)?.into_iter().next())
    }

    /// Identifiers of every group the registry currently has cached.
    pub fn groups(&self) -> Vec<String> {
        self.registry.identifiers(SUBJECTS_GROUP)
    }
}
