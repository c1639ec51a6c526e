// Allow unsafe code in ECS - necessary for type-erased column storage
#![allow(unsafe_code)]
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_safety_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::ptr_as_ptr)]
#![allow(clippy::ref_as_ptr)]
#![allow(clippy::cast_ptr_alignment)]
#![allow(clippy::float_cmp)]

//! Tessera ECS - archetype-based entity component store
//!
//! Entities are grouped into tables by the exact set of ids they carry.
//! Queries match tables, not entities, and iterate them one batch at a
//! time.
//!
//! # Key Concepts
//!
//! - **Entity**: a recycle-safe handle (slot index + generation)
//! - **Id**: anything a signature can hold: a component, a tag, or a
//!   `(relation, target)` pair
//! - **Component**: a registered type; every component is itself an entity
//! - **Archetype**: the table holding every entity with one signature
//! - **ChildOf**: the built-in hierarchy relation; deleting a parent deletes
//!   its children
//! - **Stage**: a buffer of structural operations replayed by a merge
//!
//! # Example
//!
//! ```
//! use tessera_ecs::prelude::*;
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Health(u32);
//!
//! let mut world = World::new();
//! let parent = world.spawn(Health(10));
//! let child = world.spawn_in(parent);
//!
//! assert_eq!(world.parent(child), Some(parent));
//! world.despawn(parent);
//! assert!(world.exists(child));
//! assert!(!world.is_alive(child));
//! ```

mod archetype;
mod component;
mod config;
mod entity;
mod error;
mod id;
mod names;
mod query;
mod relation;
mod signature;
mod stage;
mod storage;
mod world;

pub use archetype::{Archetype, ArchetypeId};
pub use component::{Component, ComponentInfo, ComponentRegistry};
pub use config::WorldConfig;
pub use entity::{Entity, EntityFlags, EntityLocation, Generation};
pub use error::{EcsError, EcsResult};
pub use id::Id;
pub use query::{Field, FieldMut, Oper, Query, QueryBuilder, QueryIter, Rows, Source, Term};
pub use relation::{ChildOf, Children, ScopeFilter};
pub use signature::Signature;
pub use stage::Stage;
pub use storage::Column;
pub use world::World;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{ChildOf, Component, Entity, Id, Query, Rows, Stage, World};
}
