//! Frame execution: run each due system across the pool, then merge.

use crossbeam::utils::CachePadded;
use parking_lot::Mutex;
use tessera_ecs::{EcsResult, Entity, Query, Stage, World};
use tracing::{debug, debug_span, warn};

use crate::{
    config::SchedulerConfig,
    job::{self, Job},
    pool::WorkerPool,
    system::{System, SystemIter},
};

/// Runs systems over a [`World`] one frame at a time.
///
/// Every worker owns a stage, and the dispatcher owns one more for jobs
/// that overflow the per-worker cap. Stages are merged in worker order,
/// dispatcher last.
pub struct Scheduler {
    config: SchedulerConfig,
    pool: WorkerPool,
    stages: Box<[CachePadded<Mutex<Stage>>]>,
    systems: Vec<System>,
    frames: u64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl Scheduler {
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        let pool = WorkerPool::new(config.workers);
        let stages = (0..=config.workers)
            .map(|_| CachePadded::new(Mutex::new(Stage::new())))
            .collect();
        Self {
            config,
            pool,
            stages,
            systems: Vec::new(),
            frames: 0,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.pool.len()
    }

    /// Frames completed by [`Scheduler::progress`].
    #[must_use]
    pub const fn frame_count(&self) -> u64 {
        self.frames
    }

    #[must_use]
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Register a system running `callback` over `query`.
    ///
    /// The system is an entity named `name` (under the world's scope), so
    /// `SYSTEM` terms in its query read from it.
    pub fn system<F>(&mut self, world: &mut World, name: &str, query: Query, callback: F) -> Entity
    where
        F: Fn(&mut SystemIter<'_, '_>) + Send + Sync + 'static,
    {
        let entity = world.entity_named(name);
        world.bind_system(query, entity);
        debug!(system = name, ?entity, "registered system");
        self.systems.push(System {
            entity,
            query,
            callback: Box::new(callback),
            enabled: true,
            interval: 0.0,
            elapsed: 0.0,
        });
        entity
    }

    /// Register a system from a query expression.
    ///
    /// # Errors
    ///
    /// Fails if the expression does not parse or names something unknown.
    pub fn system_expr<F>(
        &mut self,
        world: &mut World,
        name: &str,
        expr: &str,
        callback: F,
    ) -> EcsResult<Entity>
    where
        F: Fn(&mut SystemIter<'_, '_>) + Send + Sync + 'static,
    {
        let query = world.query_expr(expr)?;
        Ok(self.system(world, name, query, callback))
    }

    /// Enable or disable a system. Returns `false` for an unknown system.
    pub fn set_enabled(&mut self, system: Entity, enabled: bool) -> bool {
        self.find_mut(system).map(|s| s.enabled = enabled).is_some()
    }

    #[must_use]
    pub fn is_enabled(&self, system: Entity) -> bool {
        self.systems
            .iter()
            .any(|s| s.entity == system && s.enabled)
    }

    /// Run a system at most once every `seconds`. Zero runs it every frame.
    pub fn set_interval(&mut self, system: Entity, seconds: f32) -> bool {
        self.find_mut(system)
            .map(|s| {
                s.interval = seconds.max(0.0);
                s.elapsed = 0.0;
            })
            .is_some()
    }

    /// The query a system iterates.
    #[must_use]
    pub fn query_of(&self, system: Entity) -> Option<Query> {
        self.systems
            .iter()
            .find(|s| s.entity == system)
            .map(|s| s.query)
    }

    fn find_mut(&mut self, system: Entity) -> Option<&mut System> {
        self.systems.iter_mut().find(|s| s.entity == system)
    }

    /// Run one frame: every due system in registration order, each followed
    /// by a barrier. Merges at the end when auto-merge is on.
    pub fn progress(&mut self, world: &mut World, delta_time: f32) {
        let span = debug_span!("progress", frame = self.frames);
        let _enter = span.enter();

        world.refresh_queries();
        let scope = world.scope();
        for stage in self.stages.iter_mut() {
            stage.get_mut().set_scope(scope);
        }

        let due: Vec<(usize, f32)> = self
            .systems
            .iter_mut()
            .enumerate()
            .filter_map(|(index, system)| system.tick(delta_time).map(|delta| (index, delta)))
            .collect();

        world.begin_frame(self.pool.len());
        for (index, delta) in due {
            self.run_system(world, &self.systems[index], delta);
        }
        world.end_frame();

        if self.config.auto_merge {
            self.merge(world);
        }
        self.frames += 1;
    }

    /// Replay every staged mutation into the world.
    pub fn merge(&mut self, world: &mut World) {
        if world.workers_running() > 0 {
            warn!("merge requested while workers are running; skipping");
            return;
        }
        world.merge_all(self.stages.iter_mut().map(|stage| stage.get_mut()));
    }

    /// Staged operations waiting for a merge.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.stages.iter().map(|stage| stage.lock().len()).sum()
    }

    fn run_system(&self, world: &World, system: &System, delta_time: f32) {
        let tables = system.query.tables(world);
        let plan = job::plan(
            &tables,
            self.pool.len(),
            self.config.max_jobs_per_worker,
        );
        if plan.is_empty() {
            return;
        }
        debug!(
            system = ?system.entity,
            jobs = plan.len(),
            overflow = plan.overflow.len(),
            "dispatching system"
        );

        let stages = &self.stages;
        self.pool.run(&|worker| {
            let mut stage = stages[worker].lock();
            for job in &plan.per_worker[worker] {
                run_job(world, system, *job, &mut stage, delta_time);
            }
        });

        let mut stage = stages[self.pool.len()].lock();
        for job in &plan.overflow {
            run_job(world, system, *job, &mut stage, delta_time);
        }
    }
}

fn run_job(world: &World, system: &System, job: Job, stage: &mut Stage, delta_time: f32) {
    // SAFETY: the plan hands out disjoint row ranges, and the world is not
    // mutated until every job of the frame has returned
    let Some(rows) = (unsafe { world.job_rows(system.query, job.table, job.start, job.count) })
    else {
        return;
    };
    let mut iter = SystemIter::new(rows, stage, world, delta_time, system.entity);
    (system.callback)(&mut iter);
}
