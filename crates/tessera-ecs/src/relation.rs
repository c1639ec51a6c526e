//! Relationship pairs, the `ChildOf` hierarchy, and cascading deletes.
//!
//! Every table caches the slot index of its `(ChildOf, target)` pair, so
//! parent lookups are a table read and the children of an entity are the
//! rows of the tables indexed under `(ChildOf, parent)`.

use hashbrown::HashSet;
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::{
    World,
    archetype::{Archetype, ArchetypeId},
    component::Component,
    entity::{Entity, EntityFlags},
    id::Id,
};

/// Built-in hierarchy relation. An entity has at most one `ChildOf` pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChildOf;

/// Narrows child iteration to tables holding every `include` id and none
/// of the `exclude` ids.
#[derive(Clone, Debug, Default)]
pub struct ScopeFilter {
    pub include: SmallVec<[Id; 4]>,
    pub exclude: SmallVec<[Id; 4]>,
}

impl ScopeFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn include(mut self, id: Id) -> Self {
        self.include.push(id);
        self
    }

    #[must_use]
    pub fn exclude(mut self, id: Id) -> Self {
        self.exclude.push(id);
        self
    }

    fn accepts(&self, table: &Archetype) -> bool {
        self.include.iter().all(|id| table.contains(*id))
            && !self.exclude.iter().any(|id| table.contains(*id))
    }
}

/// Forward iterator over the non-empty child tables of one parent, in
/// table creation order. Each item is one batch of rows.
pub struct Children<'w> {
    world: &'w World,
    tables: &'w [ArchetypeId],
    filter: Option<ScopeFilter>,
}

impl<'w> Iterator for Children<'w> {
    type Item = &'w Archetype;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((&id, rest)) = self.tables.split_first() {
            self.tables = rest;
            let Some(table) = self.world.archetypes.get(id) else {
                continue;
            };
            if table.is_empty() {
                continue;
            }
            if self.filter.as_ref().is_some_and(|filter| !filter.accepts(table)) {
                continue;
            }
            return Some(table);
        }
        None
    }
}

impl World {
    /// Relation entity for a type, registering the type if needed.
    fn relation<R: Component>(&mut self) -> Entity {
        // Component ids are always plain entity ids
        Entity::from_bits(self.component::<R>().to_bits())
    }

    /// Add the pair `(R, target)`. Returns `false` if `target` is null or
    /// no longer alive.
    pub fn add_pair<R: Component>(&mut self, entity: Entity, target: Entity) -> bool {
        let relation = self.relation::<R>();
        self.add_pair_id(entity, relation, target)
    }

    /// Deferred pairs keep the full target handle and are checked again at
    /// replay, after earlier deletes in the same merge.
    fn add_pair_id(&mut self, entity: Entity, relation: Entity, target: Entity) -> bool {
        if self.is_deferred() {
            return self.stage.add_pair_id(entity, relation, target);
        }
        if let Err(error) = self.check_target(target) {
            warn!(?entity, ?target, %error, "not adding pair");
            return false;
        }
        self.add_id(entity, Id::pair(relation, target))
    }

    pub fn remove_pair<R: Component>(&mut self, entity: Entity, target: Entity) -> bool {
        let Some(relation) = self.component_id::<R>().and_then(Id::as_entity) else {
            return false;
        };
        self.remove_id(entity, Id::pair(relation, target))
    }

    #[must_use]
    pub fn has_pair<R: Component>(&self, entity: Entity, target: Entity) -> bool {
        self.component_id::<R>()
            .and_then(Id::as_entity)
            .is_some_and(|relation| self.has_id(entity, Id::pair(relation, target)))
    }

    /// Live target of the first `(R, *)` pair.
    #[must_use]
    pub fn target<R: Component>(&self, entity: Entity) -> Option<Entity> {
        let relation = self.component_id::<R>()?.as_entity()?;
        let pair = self.type_of(entity)?.pairs_of(relation.index()).next()?;
        self.entities.current(pair.target_index()?)
    }

    /// Parent through `ChildOf`.
    #[must_use]
    pub fn parent(&self, entity: Entity) -> Option<Entity> {
        let location = self.entities.location(entity)?;
        let index = self.archetypes.get(location.archetype)?.parent_index()?;
        self.entities.current(index)
    }

    /// Move an entity under `parent`, replacing any previous parent.
    pub fn set_parent(&mut self, entity: Entity, parent: Entity) -> bool {
        self.add_pair_id(entity, self.child_of(), parent)
    }

    /// Create an entity as a child of `parent`. An explicit parent takes
    /// precedence over the scope; a deleted one leaves the entity at the
    /// root.
    pub fn spawn_in(&mut self, parent: Entity) -> Entity {
        if parent.is_null() {
            return self.spawn_empty();
        }
        self.spawn_with(parent)
    }

    /// Number of direct children.
    #[must_use]
    pub fn child_count(&self, parent: Entity) -> usize {
        self.children(parent).map(Archetype::len).sum()
    }

    /// One batch per non-empty child table of `parent`.
    #[must_use]
    pub fn children(&self, parent: Entity) -> Children<'_> {
        self.children_inner(parent, None)
    }

    #[must_use]
    pub fn children_filtered(&self, parent: Entity, filter: ScopeFilter) -> Children<'_> {
        self.children_inner(parent, Some(filter))
    }

    fn children_inner(&self, parent: Entity, filter: Option<ScopeFilter>) -> Children<'_> {
        let tables = if self.entities.is_alive(parent) {
            self.archetypes.with_id(Id::pair(self.child_of(), parent))
        } else {
            &[]
        };
        Children {
            world: self,
            tables,
            filter,
        }
    }

    /// Delete an entity and, transitively, every entity that is its child.
    ///
    /// Deleted handles keep `exists` but lose `is_alive`. Pairs that target
    /// a deleted entity are stripped from surviving holders, and tables
    /// naming a deleted target are destroyed.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        if self.is_deferred() {
            self.stage.despawn(entity);
            return true;
        }
        if !self.entities.is_alive(entity) {
            return false;
        }
        let doomed = self.descendants(entity, true);
        self.delete_all(&doomed);
        true
    }

    /// Delete every descendant of `parent`, keeping the parent.
    pub fn despawn_children(&mut self, parent: Entity) {
        if self.is_deferred() {
            self.stage.despawn_children(parent);
            return;
        }
        if !self.entities.is_alive(parent) {
            return;
        }
        let doomed = self.descendants(parent, false);
        self.delete_all(&doomed);
    }

    /// Snapshot the cascade before anything is mutated.
    fn descendants(&self, root: Entity, include_root: bool) -> Vec<Entity> {
        let mut seen: HashSet<Entity, FxBuildHasher> = HashSet::default();
        let mut queue = vec![root];
        seen.insert(root);

        let mut cursor = 0;
        while let Some(&current) = queue.get(cursor) {
            cursor += 1;
            for &table_id in self.archetypes.with_id(Id::pair(self.child_of(), current)) {
                let Some(table) = self.archetypes.get(table_id) else {
                    continue;
                };
                for &child in table.entities() {
                    if seen.insert(child) {
                        queue.push(child);
                    }
                }
            }
        }

        if !include_root {
            queue.remove(0);
        }
        queue
    }

    fn delete_all(&mut self, doomed: &[Entity]) {
        if doomed.is_empty() {
            return;
        }
        self.check_mutable();
        debug!(root = ?doomed[0], count = doomed.len(), "deleting entities");

        for &entity in doomed {
            self.delete_one(entity);
        }
        for &entity in doomed {
            self.release_references(entity);
        }
    }

    fn delete_one(&mut self, entity: Entity) {
        let Some(location) = self.entities.location(entity) else {
            return;
        };
        let Some(table) = self.archetypes.get_mut(location.archetype) else {
            return;
        };
        let parent = table.parent_index();
        // SAFETY: the location row is in bounds
        let swapped = unsafe { table.remove_row(location.row) };
        if let Some(swapped) = swapped {
            self.entities.set_row(swapped, location.row);
        }

        self.names.remove(entity, parent);
        if self.entities.flags(entity).intersects(EntityFlags::WATCHED) {
            self.rematch_pending = true;
        }
        self.entities.free(entity);

        if let Some(info) = self.components.forget(Id::entity(entity)) {
            debug!(component = info.name(), "component entity deleted");
        }
    }

    /// Strip ids naming a deleted entity from survivors, then drop the
    /// tables that target it.
    fn release_references(&mut self, entity: Entity) {
        let index = entity.index();

        let mut holders: Vec<Entity> = Vec::new();
        let mut tables: Vec<ArchetypeId> = self.archetypes.targeting(index).to_vec();
        tables.extend_from_slice(self.archetypes.with_id(Id::entity(entity)));
        for &table_id in &tables {
            if let Some(table) = self.archetypes.get(table_id) {
                holders.extend_from_slice(table.entities());
            }
        }

        for holder in holders {
            let Some(signature) = self.type_of(holder) else {
                continue;
            };
            let kept = signature
                .iter()
                .filter(|id| id.target_index() != Some(index) && *id != Id::entity(entity))
                .collect();
            self.move_entity(holder, kept, None);
        }

        for table_id in self.archetypes.targeting(index).to_vec() {
            if self.archetypes.get(table_id).is_some_and(Archetype::is_empty) {
                self.archetypes.destroy(table_id);
                self.on_table_destroyed(table_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    struct Likes;

    #[test]
    fn test_parent_and_children() {
        let mut world = World::new();
        let parent = world.spawn_empty();
        let a = world.spawn_in(parent);
        let b = world.spawn_in(parent);

        assert_eq!(world.parent(a), Some(parent));
        assert_eq!(world.parent(parent), None);
        assert_eq!(world.child_count(parent), 2);

        let batches: Vec<&[Entity]> = world.children(parent).map(Archetype::entities).collect();
        assert_eq!(batches, vec![&[a, b][..]]);
    }

    #[test]
    fn test_child_of_is_exclusive() {
        let mut world = World::new();
        let first = world.spawn_empty();
        let second = world.spawn_empty();
        let child = world.spawn_in(first);

        world.set_parent(child, second);

        assert_eq!(world.parent(child), Some(second));
        assert!(!world.has_id(child, Id::pair(world.child_of(), first)));
        assert_eq!(world.child_count(first), 0);
        let child_of = world.child_of().index();
        assert_eq!(world.type_of(child).unwrap().pairs_of(child_of).count(), 1);
    }

    #[test]
    fn test_custom_relation_and_wildcard() {
        let mut world = World::new();
        let alice = world.spawn_empty();
        let bob = world.spawn_empty();
        let carol = world.spawn_empty();

        world.add_pair::<Likes>(alice, bob);
        world.add_pair::<Likes>(alice, carol);

        let likes = world.component_id::<Likes>().unwrap().as_entity().unwrap();
        assert!(world.has_pair::<Likes>(alice, bob));
        assert!(world.has_id(alice, Id::pair_wildcard(likes)));
        assert_eq!(world.target::<Likes>(alice), Some(bob));

        world.remove_id(alice, Id::pair_wildcard(likes));
        assert!(!world.has_id(alice, Id::pair_wildcard(likes)));
    }

    #[test]
    fn test_despawn_cascades() {
        let mut world = World::new();
        let root = world.spawn_empty();
        let child = world.spawn_in(root);
        let grandchild = world.spawn_in(child);
        let unrelated = world.spawn_empty();

        assert!(world.despawn(root));

        for e in [root, child, grandchild] {
            assert!(world.exists(e));
            assert!(!world.is_alive(e));
        }
        assert!(world.is_alive(unrelated));
        assert!(!world.despawn(root));
    }

    #[test]
    fn test_despawn_strips_pairs_from_survivors() {
        let mut world = World::new();
        let target = world.spawn_empty();
        let fan = world.spawn(Position { x: 1.0, y: 1.0 });
        world.add_pair::<Likes>(fan, target);

        world.despawn(target);

        assert!(world.is_alive(fan));
        assert!(!world.has_pair::<Likes>(fan, target));
        assert_eq!(world.get::<Position>(fan), Some(Position { x: 1.0, y: 1.0 }));
        assert!(world.archetypes.targeting(target.index()).is_empty());
    }

    #[test]
    fn test_despawn_children_keeps_parent() {
        let mut world = World::new();
        let parent = world.spawn_empty();
        let child = world.spawn_in(parent);
        let grandchild = world.spawn_in(child);

        world.despawn_children(parent);

        assert!(world.is_alive(parent));
        assert!(!world.is_alive(child));
        assert!(!world.is_alive(grandchild));
        assert_eq!(world.child_count(parent), 0);
    }

    #[test]
    fn test_children_filter() {
        let mut world = World::new();
        let parent = world.spawn_empty();
        let plain = world.spawn_in(parent);
        let placed = world.spawn_in(parent);
        world.insert(placed, Position { x: 0.0, y: 0.0 });
        let position = world.component_id::<Position>().unwrap();

        let with: Vec<Entity> = world
            .children_filtered(parent, ScopeFilter::new().include(position))
            .flat_map(|table| table.entities().to_vec())
            .collect();
        let without: Vec<Entity> = world
            .children_filtered(parent, ScopeFilter::new().exclude(position))
            .flat_map(|table| table.entities().to_vec())
            .collect();

        assert_eq!(with, vec![placed]);
        assert_eq!(without, vec![plain]);
    }

    #[test]
    fn test_spawn_in_deleted_parent_is_not_its_own_parent() {
        let mut world = World::new();
        let parent = world.spawn_empty();
        world.despawn(parent);

        // Reuses the parent's slot
        let child = world.spawn_in(parent);
        assert_eq!(child.index(), parent.index());

        assert!(world.is_alive(child));
        assert_eq!(world.parent(child), None);
        assert_eq!(world.child_count(child), 0);
    }

    #[test]
    fn test_pairs_reject_null_and_stale_targets() {
        let mut world = World::new();
        let holder = world.spawn_empty();
        let gone = world.spawn_empty();
        world.despawn(gone);
        let recycled = world.spawn_empty();
        assert_eq!(recycled.index(), gone.index());

        assert!(!world.add_pair::<Likes>(holder, Entity::NULL));
        assert!(!world.add_pair::<Likes>(holder, gone));
        assert!(!world.set_parent(holder, gone));
        assert!(!world.set_parent(holder, Entity::NULL));

        assert_eq!(world.parent(holder), None);
        assert_eq!(world.target::<Likes>(holder), None);
        assert_eq!(world.child_count(recycled), 0);
    }

    #[test]
    fn test_raw_pair_to_freed_slot_is_rejected() {
        let mut world = World::new();
        let holder = world.spawn_empty();
        let gone = world.spawn_empty();
        world.despawn(gone);

        let pair = Id::pair(world.child_of(), gone);
        assert!(!world.add_id(holder, pair));
        assert!(!world.add_id(holder, Id::pair(world.child_of(), Entity::NULL)));
        assert!(!world.has_id(holder, pair));
    }

    #[test]
    fn test_dead_parent_has_no_children() {
        let mut world = World::new();
        let parent = world.spawn_empty();
        world.spawn_in(parent);
        world.despawn(parent);

        assert_eq!(world.children(parent).count(), 0);
    }
}
