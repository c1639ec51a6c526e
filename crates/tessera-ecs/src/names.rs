//! Entity names, paths, and the current scope.
//!
//! Names are unique among the children of one parent. The index keeps a
//! reverse map per parent slot so `(parent, name)` lookups are one hash read;
//! slot 0 stands for the root namespace since it is never issued.

use std::{fmt::Write, mem};

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;
use tracing::warn;

use crate::{World, entity::Entity};

const ROOT: u32 = 0;

#[derive(Default)]
pub(crate) struct NameIndex {
    names: HashMap<u32, Box<str>, FxBuildHasher>,
    by_parent: HashMap<u32, HashMap<Box<str>, Entity, FxBuildHasher>, FxBuildHasher>,
}

impl NameIndex {
    /// Name `entity` within the namespace of `parent`, replacing its
    /// previous name. Returns `false` if another entity holds the name.
    pub(crate) fn insert(&mut self, entity: Entity, parent: Option<u32>, name: &str) -> bool {
        let namespace = parent.unwrap_or(ROOT);
        if let Some(&holder) = self.by_parent.get(&namespace).and_then(|names| names.get(name)) {
            return holder == entity;
        }
        self.remove(entity, parent);
        self.by_parent
            .entry(namespace)
            .or_default()
            .insert(name.into(), entity);
        self.names.insert(entity.index(), name.into());
        true
    }

    pub(crate) fn remove(&mut self, entity: Entity, parent: Option<u32>) -> Option<Box<str>> {
        let name = self.names.remove(&entity.index())?;
        let namespace = parent.unwrap_or(ROOT);
        if let Some(names) = self.by_parent.get_mut(&namespace) {
            names.remove(&name);
            if names.is_empty() {
                self.by_parent.remove(&namespace);
            }
        }
        Some(name)
    }

    /// Carry a name into the namespace of a new parent. A name already used
    /// there is dropped.
    pub(crate) fn reparent(&mut self, entity: Entity, old: Option<u32>, new: Option<u32>) {
        let Some(name) = self.remove(entity, old) else {
            return;
        };
        if !self.insert(entity, new, &name) {
            warn!(?entity, %name, "name already used under the new parent; dropping it");
        }
    }

    pub(crate) fn get(&self, entity: Entity) -> Option<&str> {
        self.names.get(&entity.index()).map(AsRef::as_ref)
    }

    pub(crate) fn child(&self, parent: Option<u32>, name: &str) -> Option<Entity> {
        self.by_parent
            .get(&parent.unwrap_or(ROOT))?
            .get(name)
            .copied()
    }
}

impl World {
    /// Name an entity. Fails if a sibling already has the name.
    pub fn set_name(&mut self, entity: Entity, name: &str) -> bool {
        if self.is_deferred() {
            self.stage.set_name(entity, name);
            return true;
        }
        if !self.is_alive(entity) {
            return false;
        }
        let parent = self.parent(entity).map(Entity::index);
        self.names.insert(entity, parent, name)
    }

    #[must_use]
    pub fn name(&self, entity: Entity) -> Option<&str> {
        if !self.is_alive(entity) {
            return None;
        }
        self.names.get(entity)
    }

    #[must_use]
    pub fn has_name(&self, entity: Entity) -> bool {
        self.name(entity).is_some()
    }

    /// Child of `parent` (or of the root, for [`Entity::NULL`]) with the
    /// given name. A numeric name addresses the live entity at that slot.
    #[must_use]
    pub fn lookup_child(&self, parent: Entity, name: &str) -> Option<Entity> {
        if let Ok(index) = name.parse::<u32>() {
            return self.entity_at(index);
        }
        let namespace = if parent.is_null() {
            None
        } else {
            if !self.is_alive(parent) {
                return None;
            }
            Some(parent.index())
        };
        self.names.child(namespace, name)
    }

    /// Resolve a separator-delimited path below `parent`.
    #[must_use]
    pub fn lookup_path(&self, parent: Entity, path: &str) -> Option<Entity> {
        let separator = self.config().name_separator.as_str();
        path.split(separator)
            .try_fold(parent, |current, segment| self.lookup_child(current, segment))
            .filter(|found| !found.is_null())
    }

    /// Resolve a name or path relative to the current scope.
    ///
    /// Unqualified names are also tried in the scope's ancestors and then
    /// at the root.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<Entity> {
        let scope = self.live_scope();
        if scope.is_null() {
            return self.lookup_path(Entity::NULL, path);
        }

        if path.contains(self.config().name_separator.as_str()) {
            return self.lookup_path(scope, path);
        }

        let mut current = Some(scope);
        while let Some(namespace) = current {
            if let Some(found) = self.lookup_child(namespace, path) {
                return Some(found);
            }
            current = self.parent(namespace);
        }
        self.lookup_child(Entity::NULL, path)
    }

    /// Full path from the root. Unnamed entities appear as their slot index.
    #[must_use]
    pub fn path(&self, entity: Entity) -> Option<String> {
        self.path_from(Entity::NULL, entity)
    }

    /// Path of `entity` relative to `parent`.
    #[must_use]
    pub fn path_from(&self, parent: Entity, entity: Entity) -> Option<String> {
        if !self.is_alive(entity) {
            return None;
        }

        let mut segments = Vec::new();
        let mut current = Some(entity);
        while let Some(e) = current {
            if e == parent {
                break;
            }
            segments.push(e);
            current = self.parent(e);
        }

        let separator = self.config().name_separator.as_str();
        let mut path = String::new();
        for (i, e) in segments.iter().rev().enumerate() {
            if i > 0 {
                path.push_str(separator);
            }
            match self.names.get(*e) {
                Some(name) => path.push_str(name),
                None => {
                    let _ = write!(path, "{}", e.index());
                }
            }
        }
        Some(path)
    }

    /// Look up a path below the scope, creating each missing segment.
    pub fn entity_named(&mut self, path: &str) -> Entity {
        let separator = self.config().name_separator.clone();
        let mut parent = self.live_scope();

        for segment in path.split(separator.as_str()).filter(|s| !s.is_empty()) {
            parent = match self.lookup_child(parent, segment) {
                Some(existing) => existing,
                None => {
                    let created = self.spawn_with(parent);
                    self.set_name(created, segment);
                    created
                }
            };
        }
        parent
    }

    /// Set the parent for unparented creations, returning the previous one.
    pub fn set_scope(&mut self, scope: Entity) -> Entity {
        mem::replace(&mut self.scope, scope)
    }

    #[must_use]
    pub const fn scope(&self) -> Entity {
        self.scope
    }

    /// Run `f` with `scope` set, then restore the previous scope.
    pub fn with_scope<R>(&mut self, scope: Entity, f: impl FnOnce(&mut World) -> R) -> R {
        let previous = self.set_scope(scope);
        let result = f(self);
        self.set_scope(previous);
        result
    }

    pub(crate) fn live_scope(&self) -> Entity {
        if self.is_alive(self.scope) {
            self.scope
        } else {
            Entity::NULL
        }
    }
}
