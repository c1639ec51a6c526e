// Jobs hand disjoint row ranges of a shared world to worker threads
#![allow(unsafe_code)]
#![allow(clippy::float_cmp)]

//! Frame scheduler for tessera systems.
//!
//! # Frame Execution Model
//!
//! ```text
//! progress(world, delta):
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Phase 1: Resolve pending query rematches                   │
//! │  Phase 2: For each due system:                              │
//! │             split matched rows into per-worker jobs         │
//! │             signal workers, run jobs into worker stages     │
//! │             barrier: wait until every worker reports        │
//! │             run overflow jobs on the dispatcher stage       │
//! │  Phase 3: Merge stages in worker order (auto-merge only)    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Systems never receive `&mut World`. Structural changes made while a
//! frame runs are recorded in the calling worker's [`Stage`] and applied
//! by [`Scheduler::merge`].
//!
//! # Example
//!
//! ```
//! use tessera_ecs::World;
//! use tessera_tick::{Scheduler, SchedulerConfig};
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Health(u32);
//!
//! let mut world = World::new();
//! let e = world.spawn(Health(3));
//! let query = world.query().with::<Health>().build().unwrap();
//!
//! let mut scheduler = Scheduler::new(SchedulerConfig::with_workers(2));
//! scheduler.system(&mut world, "Regen", query, |it| {
//!     let mut health = it.field_mut::<Health>(0).unwrap();
//!     for h in health.iter_mut() {
//!         h.0 += 1;
//!     }
//! });
//!
//! scheduler.progress(&mut world, 1.0);
//! assert_eq!(world.get::<Health>(e), Some(Health(4)));
//! ```
//!
//! [`Stage`]: tessera_ecs::Stage

mod config;
mod job;
mod pool;
mod scheduler;
mod system;

pub use config::SchedulerConfig;
pub use job::{Job, JobPlan, plan};
pub use pool::WorkerPool;
pub use scheduler::Scheduler;
pub use system::{SystemFn, SystemIter, WorldView};
