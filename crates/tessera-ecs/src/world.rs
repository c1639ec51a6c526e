//! The World - central container for all ECS data.
//!
//! All state lives here: the entity index, the component registry, the
//! archetype tables, registered queries, and the name side tables.
//!
//! Structural calls apply immediately unless the world is deferred, in
//! which case they are recorded into the world's own [`Stage`] and replayed
//! by the outermost `defer_end`.

use std::{
    fmt,
    mem::{self, ManuallyDrop},
    ptr,
};

use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::{
    archetype::{Archetype, ArchetypeId, ArchetypeStorage},
    component::{Component, ComponentInfo, ComponentRegistry},
    config::WorldConfig,
    entity::{Entity, EntityFlags, EntityIndex, EntityLocation},
    error::{EcsError, EcsResult},
    id::Id,
    names::NameIndex,
    query::QueryState,
    relation::ChildOf,
    signature::Signature,
    stage::Stage,
};

/// The ECS world containing all entities and components.
pub struct World {
    config: WorldConfig,
    pub(crate) entities: EntityIndex,
    pub(crate) components: ComponentRegistry,
    pub(crate) archetypes: ArchetypeStorage,
    pub(crate) queries: Vec<QueryState>,
    pub(crate) names: NameIndex,
    /// Parent given to unparented creations.
    pub(crate) scope: Entity,
    pub(crate) defer_depth: u32,
    /// Buffer for `defer_begin`/`defer_end` on the owning thread.
    pub(crate) stage: Stage,
    /// A watched entity changed table since queries were last refreshed.
    pub(crate) rematch_pending: bool,
    workers_running: usize,
    child_of: Entity,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Create a new empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    #[must_use]
    pub fn with_config(config: WorldConfig) -> Self {
        let mut entities = EntityIndex::with_capacity(config.entity_capacity);
        let child_of = entities.allocate();

        let mut world = Self {
            config,
            entities,
            components: ComponentRegistry::new(),
            archetypes: ArchetypeStorage::new(child_of),
            queries: Vec::new(),
            names: NameIndex::default(),
            scope: Entity::NULL,
            defer_depth: 0,
            stage: Stage::new(),
            rematch_pending: false,
            workers_running: 0,
            child_of,
        };

        world.place_in_root(child_of);
        world
            .components
            .insert(ComponentInfo::of::<ChildOf>(Id::entity(child_of)));
        world.names.insert(child_of, None, "ChildOf");
        world
    }

    #[must_use]
    pub const fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// The built-in hierarchy relation.
    #[must_use]
    pub const fn child_of(&self) -> Entity {
        self.child_of
    }

    // ==================== Components ====================

    /// Register a component type, returning its id. Registration is
    /// idempotent and always immediate.
    ///
    /// The component entity is named after the type, so expressions can
    /// refer to it.
    pub fn component<T: Component>(&mut self) -> Id {
        if let Some(id) = self.components.get_id::<T>() {
            return id;
        }

        let entity = self.entities.allocate();
        self.place_in_root(entity);

        let id = Id::entity(entity);
        let info = ComponentInfo::of::<T>(id);
        let name = info.short_name();
        self.components.insert(info);
        if !self.names.insert(entity, None, name) {
            debug!(component = name, "component name already taken");
        }

        debug!(component = name, ?id, "registered component");
        id
    }

    /// Register a component type that can be added without a value.
    pub fn component_with_default<T: Component + Default>(&mut self) -> Id {
        let id = self.component::<T>();
        self.components.enable_default::<T>();
        id
    }

    /// Get the id of a registered component type.
    #[must_use]
    pub fn component_id<T: Component>(&self) -> Option<Id> {
        self.components.get_id::<T>()
    }

    #[must_use]
    pub fn component_info(&self, id: Id) -> Option<&ComponentInfo> {
        self.components.get_info(id)
    }

    // ==================== Entities ====================

    /// Create an entity with no components. Under an active scope it is
    /// created as a child of the scope.
    pub fn spawn_empty(&mut self) -> Entity {
        let scope = self.live_scope();
        self.spawn_with(scope)
    }

    /// Create an entity holding `value`.
    pub fn spawn<T: Component>(&mut self, value: T) -> Entity {
        let entity = self.spawn_empty();
        self.insert(entity, value);
        entity
    }

    /// Create an entity, as a child of `parent` unless it is null.
    pub(crate) fn spawn_with(&mut self, parent: Entity) -> Entity {
        let entity = self.entities.allocate();
        if self.is_deferred() {
            self.stage.push_new(entity, parent);
            return entity;
        }

        self.check_mutable();
        self.place_in_root(entity);
        if !parent.is_null() {
            self.adopt(entity, parent);
        }
        entity
    }

    /// The slot of this handle was issued at some point, whether or not the
    /// entity is still alive.
    #[must_use]
    pub fn exists(&self, entity: Entity) -> bool {
        self.entities.exists(entity)
    }

    /// The handle refers to a live entity.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// The live handle currently occupying a slot index.
    #[must_use]
    pub fn entity_at(&self, index: u32) -> Option<Entity> {
        self.entities.current(index)
    }

    /// Signature of a live entity.
    #[must_use]
    pub fn type_of(&self, entity: Entity) -> Option<&Signature> {
        let location = self.entities.location(entity)?;
        Some(self.archetypes.get(location.archetype)?.signature())
    }

    /// Number of live entities, including component entities.
    #[must_use]
    pub const fn entity_count(&self) -> usize {
        self.entities.alive_count()
    }

    /// Number of tables, including empty ones.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.archetypes.len()
    }

    #[must_use]
    pub fn table(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id)
    }

    // ==================== Structural operations ====================

    /// Add an id (tag, component, or pair) to an entity.
    ///
    /// A handle that was never issued is created on the spot. Returns
    /// `false` for a stale handle, a wildcard id, or a sized component with
    /// no default.
    pub fn add_id(&mut self, entity: Entity, id: Id) -> bool {
        if self.is_deferred() {
            self.stage.add_id(entity, id);
            return true;
        }
        self.check_mutable();
        if !self.ensure_alive(entity) {
            return false;
        }
        self.add_id_now(entity, id)
    }

    /// Remove an id. A wildcard pair removes every matching pair.
    pub fn remove_id(&mut self, entity: Entity, id: Id) -> bool {
        if self.is_deferred() {
            self.stage.remove_id(entity, id);
            return true;
        }
        self.check_mutable();

        let Some(signature) = self.type_of(entity) else {
            return false;
        };
        let target = if id.is_wildcard() {
            signature.iter().filter(|held| !id.matches(*held)).collect()
        } else {
            signature.without(id)
        };
        if &target == signature {
            return true;
        }
        self.move_entity(entity, target, None)
    }

    /// Set a component value, adding the component if needed.
    pub fn insert<T: Component>(&mut self, entity: Entity, value: T) -> bool {
        let id = self.component::<T>();
        if self.is_deferred() {
            self.stage.push_set(entity, id, value, true);
            return true;
        }
        self.check_mutable();
        if !self.ensure_alive(entity) {
            return false;
        }
        if mem::size_of::<T>() == 0 {
            return self.add_id_now(entity, id);
        }

        let value = ManuallyDrop::new(value);
        // SAFETY: `value` is a live T and the registered type of `id` is T
        let taken = unsafe { self.set_raw_now(entity, id, ptr::from_ref(&*value).cast(), true) };
        if !taken {
            drop(ManuallyDrop::into_inner(value));
        }
        taken
    }

    /// Add `T` with its default value. An existing value is kept.
    pub fn add<T: Component + Default>(&mut self, entity: Entity) -> bool {
        let id = self.component_with_default::<T>();
        if self.is_deferred() {
            self.stage.push_set(entity, id, T::default(), false);
            return true;
        }
        self.add_id(entity, id)
    }

    pub fn remove<T: Component>(&mut self, entity: Entity) -> bool {
        let Some(id) = self.component_id::<T>() else {
            return false;
        };
        self.remove_id(entity, id)
    }

    // ==================== Reads ====================

    /// Get a copy of a component.
    #[must_use]
    pub fn get<T: Component + Clone>(&self, entity: Entity) -> Option<T> {
        self.get_ref(entity).cloned()
    }

    #[must_use]
    pub fn get_ref<T: Component>(&self, entity: Entity) -> Option<&T> {
        let id = self.component_id::<T>()?;
        let location = self.entities.location(entity)?;
        let column = self.archetypes.get(location.archetype)?.column(id)?;
        // SAFETY: the location row is in bounds and the column holds T
        Some(unsafe { column.get_unchecked::<T>(location.row) })
    }

    #[must_use]
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        let id = self.component_id::<T>()?;
        let location = self.entities.location(entity)?;
        let column = self.archetypes.get_mut(location.archetype)?.column_mut(id)?;
        // SAFETY: the location row is in bounds and the column holds T
        Some(unsafe { column.get_unchecked_mut::<T>(location.row) })
    }

    #[must_use]
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.component_id::<T>()
            .is_some_and(|id| self.has_id(entity, id))
    }

    /// Check for an id. Wildcard pairs match any target.
    #[must_use]
    pub fn has_id(&self, entity: Entity, id: Id) -> bool {
        self.type_of(entity)
            .is_some_and(|signature| signature.contains(id))
    }

    // ==================== Frames ====================

    /// Mark `workers` threads as iterating the world. Immediate structural
    /// calls panic until [`World::end_frame`].
    pub fn begin_frame(&mut self, workers: usize) {
        self.workers_running = workers;
    }

    pub fn end_frame(&mut self) {
        self.workers_running = 0;
    }

    #[must_use]
    pub const fn workers_running(&self) -> usize {
        self.workers_running
    }

    pub(crate) fn check_mutable(&self) {
        assert!(
            self.workers_running == 0,
            "{}",
            EcsError::ConcurrencyMisuse(self.workers_running)
        );
    }

    // ==================== Internals ====================

    fn place_in_root(&mut self, entity: Entity) {
        let root = self
            .archetypes
            .get_mut(ArchetypeId::ROOT)
            .expect("root table exists");
        let row = root.allocate(entity);
        self.entities.place(entity, EntityLocation {
            archetype: ArchetypeId::ROOT,
            row,
        });
    }

    /// Make sure a handle has storage: live handles pass, unplaced ones are
    /// placed, never-issued ones are claimed. Stale handles fail.
    pub(crate) fn ensure_alive(&mut self, entity: Entity) -> bool {
        if self.entities.is_alive(entity) {
            return true;
        }
        if self.entities.is_unplaced(entity) || self.entities.claim(entity) {
            self.place_in_root(entity);
            return true;
        }
        warn!(?entity, "ignoring operation on a deleted entity");
        false
    }

    /// A pair may only name the live (or not yet placed) handle of its
    /// target slot.
    pub(crate) fn check_target(&self, target: Entity) -> EcsResult<()> {
        if target.is_null() {
            return Err(EcsError::NullEntity);
        }
        if self.entities.is_alive(target) || self.entities.is_unplaced(target) {
            Ok(())
        } else {
            Err(EcsError::StaleEntity(target))
        }
    }

    /// Give a placed entity its `ChildOf` pair. A stale parent leaves the
    /// entity where it is.
    pub(crate) fn adopt(&mut self, entity: Entity, parent: Entity) -> bool {
        if let Err(error) = self.check_target(parent) {
            warn!(?entity, ?parent, %error, "not adding parent");
            return false;
        }
        let pair = Id::pair(self.child_of, parent);
        self.add_ids_now(entity, &[pair])
    }

    pub(crate) fn add_id_now(&mut self, entity: Entity, id: Id) -> bool {
        self.add_ids_now(entity, &[id])
    }

    /// Add several ids with a single table move.
    pub(crate) fn add_ids_now(&mut self, entity: Entity, ids: &[Id]) -> bool {
        let Some(signature) = self.type_of(entity) else {
            return false;
        };
        let child_of = self.child_of.index();

        let mut target = signature.clone();
        for &id in ids {
            if id.is_wildcard() {
                warn!(?entity, ?id, "cannot add a wildcard pair");
                return false;
            }
            if let Some(index) = id.target_index() {
                if self.entities.issued_handle(index).is_none() {
                    warn!(?entity, error = %EcsError::InvalidTarget(id), "not adding pair");
                    return false;
                }
            }
            if target.contains(id) {
                continue;
            }
            if id.relation_index() == Some(child_of) {
                let held: SmallVec<[Id; 2]> = target.pairs_of(child_of).collect();
                for previous in held {
                    target = target.without(previous);
                }
            }
            target = target.with(id);
        }

        if &target == signature {
            return true;
        }

        for index in ids.iter().filter_map(|id| id.target_index()) {
            self.entities.insert_flags(index, EntityFlags::IS_TARGET);
        }
        self.move_entity(entity, target, None)
    }

    /// Write a sized value for `id`, moving the entity if the component is
    /// new. Returns whether ownership of the bytes at `value` was taken.
    ///
    /// # Safety
    ///
    /// `value` must point to an initialized value of the type registered for
    /// `id`. When this returns `true` the caller must not drop it.
    pub(crate) unsafe fn set_raw_now(
        &mut self,
        entity: Entity,
        id: Id,
        value: *const u8,
        overwrite: bool,
    ) -> bool {
        if self.components.get_info(id).is_none_or(ComponentInfo::is_tag) {
            self.add_id_now(entity, id);
            return false;
        }
        let Some(location) = self.entities.location(entity) else {
            return false;
        };
        let Some(table) = self.archetypes.get_mut(location.archetype) else {
            return false;
        };

        if let Some(column) = table.column_mut(id) {
            if overwrite {
                // SAFETY: the row is in bounds and the value matches the column
                unsafe { column.replace_raw(location.row, value) };
            }
            return overwrite;
        }

        let target = table.signature().with(id);
        self.move_entity(entity, target, Some((id, value)))
    }

    /// Move an entity into the table for `target`, carrying shared columns,
    /// filling a gained column from `payload` or its default.
    ///
    /// Returns `false` without moving when a gained component has neither.
    pub(crate) fn move_entity(
        &mut self,
        entity: Entity,
        target: Signature,
        payload: Option<(Id, *const u8)>,
    ) -> bool {
        let Some(source) = self.entities.location(entity) else {
            return false;
        };

        let (dst, created) = self.archetypes.get_or_create(target, &self.components);
        if created {
            self.on_table_created(dst);
        }
        if dst == source.archetype {
            return payload.is_none();
        }

        let row = source.row;
        let (src_table, dst_table) = self.archetypes.get_two_mut(source.archetype, dst);

        for column in dst_table.columns() {
            let id = column.info().id();
            let provided = src_table.column_index(id).is_some()
                || payload.is_some_and(|(payload_id, _)| payload_id == id)
                || self
                    .components
                    .get_info(id)
                    .is_some_and(ComponentInfo::has_default);
            if !provided {
                warn!(?entity, ?id, "component has no default; set a value instead");
                return false;
            }
        }

        let new_row = dst_table.allocate(entity);
        for column in dst_table.columns_mut() {
            let id = column.info().id();
            if let Some(src_column) = src_table.column(id) {
                // SAFETY: row is in bounds for the source table; the bytes
                // are forgotten there below
                unsafe { column.push_raw(src_column.get_unchecked_raw(row)) };
            } else if let Some((_, value)) = payload.filter(|(payload_id, _)| *payload_id == id) {
                // SAFETY: the caller guarantees the payload's type
                unsafe { column.push_raw(value) };
            } else if let Some(info) = self.components.get_info(id) {
                column.push_default_from(info);
            }
        }

        for column in src_table.columns_mut() {
            let id = column.info().id();
            // SAFETY: row is in bounds for every column of the source table
            unsafe {
                if dst_table.column_index(id).is_some() {
                    column.swap_remove_forget(row);
                } else {
                    column.swap_remove_drop(row);
                }
            }
        }
        // SAFETY: every column dropped the row above
        let swapped = unsafe { src_table.deallocate(row) };
        let old_parent = src_table.parent_index();
        let new_parent = dst_table.parent_index();

        if let Some(swapped) = swapped {
            self.entities.set_row(swapped, row);
        }
        self.entities.place(entity, EntityLocation {
            archetype: dst,
            row: new_row,
        });

        if old_parent != new_parent {
            self.names.reparent(entity, old_parent, new_parent);
        }
        if self.entities.flags(entity).intersects(EntityFlags::WATCHED) {
            self.rematch_pending = true;
        }
        true
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.entities)
            .field("tables", &self.archetypes.len())
            .field("components", &self.components.len())
            .field("queries", &self.queries.len())
            .finish()
    }
}
