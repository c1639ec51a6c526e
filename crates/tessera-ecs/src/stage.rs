//! Deferred structural mutation.
//!
//! A [`Stage`] is an append-only log of structural operations. The world
//! owns one for `defer_begin`/`defer_end` on the calling thread, and every
//! scheduler worker owns another. Nothing in a stage is visible until the
//! world replays it through [`World::merge`], which applies entries in FIFO
//! order with the immediate-mode operations; conflicting entries on one
//! entity simply resolve in replay order.

use std::{alloc::Layout, fmt, mem, ptr::NonNull};

use bumpalo::Bump;
use tracing::{debug, debug_span, trace, warn};

use crate::{
    World,
    component::Component,
    entity::Entity,
    error::{EcsError, EcsResult},
    id::Id,
};

/// One recorded operation.
enum StagedOp {
    /// A handle issued while staging, and its parent if it has one.
    New {
        entity: Entity,
        parent: Entity,
    },
    /// `target` is the full handle behind a pair id, or null.
    Add {
        entity: Entity,
        id: Id,
        target: Entity,
    },
    Remove {
        entity: Entity,
        id: Id,
    },
    /// Value bytes live in the stage arena until replay moves them out.
    Set {
        entity: Entity,
        id: Id,
        value: NonNull<u8>,
        drop_fn: Option<unsafe fn(*mut u8)>,
        overwrite: bool,
    },
    Delete {
        entity: Entity,
    },
    /// Children are collected at replay, so ones created earlier in the
    /// same stage are included.
    DeleteChildren {
        parent: Entity,
    },
    Name {
        entity: Entity,
        name: Box<str>,
    },
}

impl StagedOp {
    /// Release a payload that replay did not take ownership of.
    fn discard(self) {
        if let StagedOp::Set {
            value,
            drop_fn: Some(drop_fn),
            ..
        } = self
        {
            // SAFETY: the payload was written by `push_set` and not moved out
            unsafe { drop_fn(value.as_ptr()) };
        }
    }
}

/// Per-thread mutation buffer.
pub struct Stage {
    ops: Vec<StagedOp>,
    arena: Bump,
    scope: Entity,
}

// SAFETY: payloads are `Component` values, which are Send + Sync, and the
// arena is only allocated from through `&mut Stage`.
unsafe impl Send for Stage {}
unsafe impl Sync for Stage {}

impl Default for Stage {
    fn default() -> Self {
        Self {
            ops: Vec::new(),
            arena: Bump::new(),
            scope: Entity::NULL,
        }
    }
}

impl Stage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Parent given to entities spawned through this stage.
    #[must_use]
    pub const fn scope(&self) -> Entity {
        self.scope
    }

    /// Set the stage's scope, returning the previous one.
    pub fn set_scope(&mut self, scope: Entity) -> Entity {
        mem::replace(&mut self.scope, scope)
    }

    /// Issue a handle now and create the entity at merge, under the
    /// stage's scope if that is still alive then.
    pub fn spawn(&mut self, world: &World) -> Entity {
        let entity = world.entities.reserve();
        self.push_new(entity, self.scope);
        entity
    }

    /// Issue a handle now and create it as a child of `parent` at merge.
    /// A parent deleted before the merge reaches this entry is not added.
    pub fn spawn_in(&mut self, world: &World, parent: Entity) -> Entity {
        let entity = world.entities.reserve();
        let parent = if parent.is_null() { self.scope } else { parent };
        self.push_new(entity, parent);
        entity
    }

    /// Stage `value` for `entity`, replacing any existing value.
    ///
    /// Returns `false` if `T` was never registered with the world.
    pub fn insert<T: Component>(&mut self, world: &World, entity: Entity, value: T) -> bool {
        let Some(id) = world.component_id::<T>() else {
            warn!(
                component = std::any::type_name::<T>(),
                "cannot stage an unregistered component"
            );
            return false;
        };
        self.push_set(entity, id, value, true);
        true
    }

    /// Stage `T::default()` for `entity` unless it already has `T` at merge.
    pub fn add<T: Component + Default>(&mut self, world: &World, entity: Entity) -> bool {
        let Some(id) = world.component_id::<T>() else {
            warn!(
                component = std::any::type_name::<T>(),
                "cannot stage an unregistered component"
            );
            return false;
        };
        self.push_set(entity, id, T::default(), false);
        true
    }

    pub fn add_id(&mut self, entity: Entity, id: Id) {
        self.ops.push(StagedOp::Add {
            entity,
            id,
            target: Entity::NULL,
        });
    }

    /// Stage `(R, target)`. Returns `false` for an unregistered relation or
    /// a null target.
    pub fn add_pair<R: Component>(&mut self, world: &World, entity: Entity, target: Entity) -> bool {
        let Some(relation) = world.component_id::<R>().and_then(Id::as_entity) else {
            return false;
        };
        self.add_pair_id(entity, relation, target)
    }

    pub(crate) fn add_pair_id(&mut self, entity: Entity, relation: Entity, target: Entity) -> bool {
        if target.is_null() {
            warn!(?entity, error = %EcsError::NullEntity, "cannot stage a pair");
            return false;
        }
        self.ops.push(StagedOp::Add {
            entity,
            id: Id::pair(relation, target),
            target,
        });
        true
    }

    pub fn remove<T: Component>(&mut self, world: &World, entity: Entity) -> bool {
        let Some(id) = world.component_id::<T>() else {
            return false;
        };
        self.remove_id(entity, id);
        true
    }

    pub fn remove_id(&mut self, entity: Entity, id: Id) {
        self.ops.push(StagedOp::Remove { entity, id });
    }

    /// Stage a cascading delete.
    pub fn despawn(&mut self, entity: Entity) {
        self.ops.push(StagedOp::Delete { entity });
    }

    /// Stage deletion of every descendant of `parent`.
    pub fn despawn_children(&mut self, parent: Entity) {
        self.ops.push(StagedOp::DeleteChildren { parent });
    }

    pub fn set_name(&mut self, entity: Entity, name: &str) {
        self.ops.push(StagedOp::Name {
            entity,
            name: name.into(),
        });
    }

    pub(crate) fn push_new(&mut self, entity: Entity, parent: Entity) {
        self.ops.push(StagedOp::New { entity, parent });
    }

    pub(crate) fn push_set<T: Component>(
        &mut self,
        entity: Entity,
        id: Id,
        value: T,
        overwrite: bool,
    ) {
        let value_ptr = self.arena.alloc_layout(Layout::new::<T>());
        // SAFETY: the arena returned memory sized and aligned for T
        unsafe { value_ptr.as_ptr().cast::<T>().write(value) };

        let drop_fn: Option<unsafe fn(*mut u8)> = if mem::needs_drop::<T>() {
            Some(|ptr| unsafe { std::ptr::drop_in_place(ptr.cast::<T>()) })
        } else {
            None
        };

        self.ops.push(StagedOp::Set {
            entity,
            id,
            value: value_ptr,
            drop_fn,
            overwrite,
        });
    }

    /// Drop every recorded operation without applying it.
    pub fn clear(&mut self) {
        for op in self.ops.drain(..) {
            op.discard();
        }
        self.arena.reset();
    }
}

impl Drop for Stage {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("ops", &self.ops.len())
            .field("scope", &self.scope)
            .finish()
    }
}

impl World {
    /// Start recording structural operations instead of applying them.
    /// Calls nest; only the outermost [`World::defer_end`] flushes.
    pub fn defer_begin(&mut self) {
        self.defer_depth += 1;
    }

    /// Close one [`World::defer_begin`]. The outermost call replays every
    /// recorded operation in order.
    pub fn defer_end(&mut self) -> EcsResult<()> {
        if self.defer_depth == 0 {
            return Err(EcsError::UnbalancedDefer);
        }
        self.defer_depth -= 1;
        if self.defer_depth == 0 {
            let mut stage = mem::take(&mut self.stage);
            self.merge(&mut stage);
            // Keep the arena's allocation for the next batch
            self.stage = stage;
        }
        Ok(())
    }

    #[must_use]
    pub const fn is_deferred(&self) -> bool {
        self.defer_depth > 0
    }

    /// Replay a stage into the world and leave it empty.
    pub fn merge(&mut self, stage: &mut Stage) {
        self.merge_all(std::iter::once(stage));
    }

    /// Replay stages in order. Handles reserved by any of them become
    /// valid first, so cross-stage references resolve.
    pub fn merge_all<'a>(&mut self, stages: impl IntoIterator<Item = &'a mut Stage>) {
        let span = debug_span!("merge");
        let _enter = span.enter();

        let depth = mem::take(&mut self.defer_depth);
        self.entities.flush_reserved();

        for (index, stage) in stages.into_iter().enumerate() {
            if stage.ops.is_empty() {
                continue;
            }
            debug!(stage = index, ops = stage.ops.len(), "replaying stage");
            for op in mem::take(&mut stage.ops) {
                self.replay(op);
            }
            stage.arena.reset();
        }

        self.defer_depth = depth;
    }

    fn replay(&mut self, op: StagedOp) {
        match op {
            StagedOp::New { entity, parent } => {
                trace!(?entity, ?parent, "replay new");
                if self.ensure_alive(entity) && !parent.is_null() {
                    self.adopt(entity, parent);
                }
            }
            StagedOp::Add { entity, id, target } => {
                trace!(?entity, ?id, "replay add");
                if !target.is_null() {
                    if let Err(error) = self.check_target(target) {
                        warn!(?entity, ?target, %error, "not adding staged pair");
                        return;
                    }
                }
                self.add_id(entity, id);
            }
            StagedOp::Remove { entity, id } => {
                trace!(?entity, ?id, "replay remove");
                self.remove_id(entity, id);
            }
            StagedOp::Set {
                entity,
                id,
                value,
                drop_fn,
                overwrite,
            } => {
                trace!(?entity, ?id, "replay set");
                // SAFETY: the payload is an initialized value of the type
                // registered for `id`, owned by this op
                let taken = self.ensure_alive(entity)
                    && unsafe { self.set_raw_now(entity, id, value.as_ptr(), overwrite) };
                if !taken {
                    if let Some(drop_fn) = drop_fn {
                        // SAFETY: ownership was not transferred
                        unsafe { drop_fn(value.as_ptr()) };
                    }
                }
            }
            StagedOp::Delete { entity } => {
                trace!(?entity, "replay delete");
                self.despawn(entity);
            }
            StagedOp::DeleteChildren { parent } => {
                trace!(?parent, "replay delete children");
                self.despawn_children(parent);
            }
            StagedOp::Name { entity, name } => {
                self.set_name(entity, &name);
            }
        }
    }
}
