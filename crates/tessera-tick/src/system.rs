//! What a system callback sees while it runs.

use std::ops::Deref;

use tessera_ecs::{Component, Entity, Id, Query, Rows, Signature, Stage, World};

/// Callback run once per job.
pub type SystemFn = dyn Fn(&mut SystemIter<'_, '_>) + Send + Sync;

pub(crate) struct System {
    pub(crate) entity: Entity,
    pub(crate) query: Query,
    pub(crate) callback: Box<SystemFn>,
    pub(crate) enabled: bool,
    /// Seconds between runs. Zero runs every frame.
    pub(crate) interval: f32,
    pub(crate) elapsed: f32,
}

impl System {
    /// Advance the system's clock and return the delta to run with, if due.
    pub(crate) fn tick(&mut self, delta_time: f32) -> Option<f32> {
        if !self.enabled {
            return None;
        }
        if self.interval <= 0.0 {
            return Some(delta_time);
        }
        self.elapsed += delta_time;
        if self.elapsed < self.interval {
            return None;
        }
        Some(std::mem::take(&mut self.elapsed))
    }
}

/// One job's rows plus the calling worker's stage.
///
/// Dereferences to [`Rows`] for column access. Structural changes go
/// through the stage and become visible after the scheduler merges.
pub struct SystemIter<'w, 's> {
    rows: Rows<'w>,
    stage: &'s mut Stage,
    world: &'w World,
    delta_time: f32,
    system: Entity,
}

impl<'w, 's> SystemIter<'w, 's> {
    pub(crate) fn new(
        rows: Rows<'w>,
        stage: &'s mut Stage,
        world: &'w World,
        delta_time: f32,
        system: Entity,
    ) -> Self {
        Self {
            rows,
            stage,
            world,
            delta_time,
            system,
        }
    }

    /// Seconds since this system last ran.
    #[must_use]
    pub const fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// The system's own entity.
    #[must_use]
    pub const fn system(&self) -> Entity {
        self.system
    }

    #[must_use]
    pub const fn world(&self) -> WorldView<'w> {
        WorldView(self.world)
    }

    pub fn stage(&mut self) -> &mut Stage {
        self.stage
    }

    pub fn spawn(&mut self) -> Entity {
        self.stage.spawn(self.world)
    }

    pub fn spawn_in(&mut self, parent: Entity) -> Entity {
        self.stage.spawn_in(self.world, parent)
    }

    pub fn insert<T: Component>(&mut self, entity: Entity, value: T) -> bool {
        self.stage.insert(self.world, entity, value)
    }

    pub fn add<T: Component + Default>(&mut self, entity: Entity) -> bool {
        self.stage.add::<T>(self.world, entity)
    }

    pub fn add_id(&mut self, entity: Entity, id: Id) {
        self.stage.add_id(entity, id);
    }

    pub fn add_pair<R: Component>(&mut self, entity: Entity, target: Entity) -> bool {
        self.stage.add_pair::<R>(self.world, entity, target)
    }

    pub fn remove<T: Component>(&mut self, entity: Entity) -> bool {
        self.stage.remove::<T>(self.world, entity)
    }

    pub fn remove_id(&mut self, entity: Entity, id: Id) {
        self.stage.remove_id(entity, id);
    }

    pub fn despawn(&mut self, entity: Entity) {
        self.stage.despawn(entity);
    }

    pub fn despawn_children(&mut self, parent: Entity) {
        self.stage.despawn_children(parent);
    }

    pub fn set_name(&mut self, entity: Entity, name: &str) {
        self.stage.set_name(entity, name);
    }
}

impl<'w> Deref for SystemIter<'w, '_> {
    type Target = Rows<'w>;

    fn deref(&self) -> &Rows<'w> {
        &self.rows
    }
}

/// Read access to world structure during a frame.
///
/// Component values are not reachable here: other workers may be writing
/// them. Read them through the system's own query terms instead.
#[derive(Clone, Copy)]
pub struct WorldView<'w>(&'w World);

impl<'w> WorldView<'w> {
    #[must_use]
    pub fn exists(self, entity: Entity) -> bool {
        self.0.exists(entity)
    }

    #[must_use]
    pub fn is_alive(self, entity: Entity) -> bool {
        self.0.is_alive(entity)
    }

    #[must_use]
    pub fn has<T: Component>(self, entity: Entity) -> bool {
        self.0.has::<T>(entity)
    }

    #[must_use]
    pub fn has_id(self, entity: Entity, id: Id) -> bool {
        self.0.has_id(entity, id)
    }

    #[must_use]
    pub fn type_of(self, entity: Entity) -> Option<&'w Signature> {
        self.0.type_of(entity)
    }

    #[must_use]
    pub fn parent(self, entity: Entity) -> Option<Entity> {
        self.0.parent(entity)
    }

    #[must_use]
    pub fn child_count(self, parent: Entity) -> usize {
        self.0.child_count(parent)
    }

    #[must_use]
    pub fn name(self, entity: Entity) -> Option<&'w str> {
        self.0.name(entity)
    }

    #[must_use]
    pub fn lookup(self, path: &str) -> Option<Entity> {
        self.0.lookup(path)
    }

    #[must_use]
    pub fn component_id<T: Component>(self) -> Option<Id> {
        self.0.component_id::<T>()
    }
}
