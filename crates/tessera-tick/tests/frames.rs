//! Frames driven through the scheduler: staging, merge order, and
//! relationship-sourced columns under worker threads.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use tessera_ecs::{Entity, World};
use tessera_tick::{Scheduler, SchedulerConfig};

// ============================================================================
// Test Components
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
struct Position(f32);

#[derive(Clone, Debug, PartialEq)]
struct Velocity(f32);

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Marked;

#[derive(Clone, Debug, PartialEq)]
struct Timer(f32);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn manual(workers: usize) -> SchedulerConfig {
    SchedulerConfig {
        workers,
        max_jobs_per_worker: 16,
        auto_merge: false,
    }
}

fn positions(world: &mut World, count: usize) -> Vec<Entity> {
    (0..count).map(|i| world.spawn(Position(i as f32))).collect()
}

// ============================================================================
// Staging and merge
// ============================================================================

#[test]
fn test_structural_changes_wait_for_merge() {
    init_tracing();
    let mut world = World::new();
    world.component::<Marked>();
    let entities = positions(&mut world, 64);
    let query = world.query().with::<Position>().build().unwrap();

    let mut scheduler = Scheduler::new(manual(4));
    scheduler.system(&mut world, "Mark", query, |it| {
        for &e in it.entities() {
            it.add::<Marked>(e);
        }
    });

    scheduler.progress(&mut world, 1.0);
    assert!(entities.iter().all(|&e| !world.has::<Marked>(e)));
    assert_eq!(scheduler.pending(), 64);

    scheduler.merge(&mut world);
    assert!(entities.iter().all(|&e| world.has::<Marked>(e)));
    assert_eq!(scheduler.pending(), 0);
}

#[test]
fn test_auto_merge_applies_at_frame_end() {
    let mut world = World::new();
    world.component::<Velocity>();
    let entities = positions(&mut world, 32);
    let query = world.query().with::<Position>().build().unwrap();

    let mut scheduler = Scheduler::new(SchedulerConfig::with_workers(3));
    scheduler.system(&mut world, "Accelerate", query, |it| {
        for &e in it.entities() {
            it.insert(e, Velocity(2.0));
        }
    });

    scheduler.progress(&mut world, 1.0);

    for e in entities {
        assert_eq!(world.get::<Velocity>(e), Some(Velocity(2.0)));
    }
}

#[test]
fn test_later_systems_see_the_frame_start_state() {
    let mut world = World::new();
    world.component::<Marked>();
    positions(&mut world, 16);
    let position = world.query().with::<Position>().build().unwrap();
    let marked = world.query().with::<Marked>().build().unwrap();

    let mut scheduler = Scheduler::new(SchedulerConfig::with_workers(2));
    scheduler.system(&mut world, "Mark", position, |it| {
        for &e in it.entities() {
            it.add::<Marked>(e);
        }
    });
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    scheduler.system(&mut world, "Observe", marked, move |it| {
        counter.fetch_add(it.count(), Ordering::Relaxed);
    });

    scheduler.progress(&mut world, 1.0);
    assert_eq!(seen.load(Ordering::Relaxed), 0);

    scheduler.progress(&mut world, 1.0);
    assert_eq!(seen.load(Ordering::Relaxed), 16);
}

#[test]
fn test_workers_spawn_into_the_same_new_table() {
    let mut world = World::new();
    world.component::<Velocity>();
    world.component::<Marked>();
    positions(&mut world, 100);
    let query = world.query().with::<Position>().build().unwrap();
    let tables_before = world.table_count();

    let mut scheduler = Scheduler::new(SchedulerConfig::with_workers(4));
    scheduler.system(&mut world, "Spawner", query, |it| {
        for _ in 0..it.count() {
            let e = it.spawn();
            it.insert(e, Velocity(0.0));
            it.add::<Marked>(e);
        }
    });

    scheduler.progress(&mut world, 1.0);

    let spawned = world
        .query()
        .with::<Velocity>()
        .with::<Marked>()
        .build()
        .unwrap();
    assert_eq!(spawned.count(&world), 100);
    assert_eq!(spawned.table_count(&world), 1);
    assert!(world.table_count() > tables_before);
}

#[test]
fn test_worker_despawn_cascades_at_merge() {
    let mut world = World::new();
    let parents = positions(&mut world, 8);
    let children: Vec<Entity> = parents.iter().map(|&p| world.spawn_in(p)).collect();
    let query = world.query().with::<Position>().build().unwrap();

    let mut scheduler = Scheduler::new(SchedulerConfig::with_workers(2));
    scheduler.system(&mut world, "Cull", query, |it| {
        for &e in it.entities() {
            it.despawn(e);
        }
    });

    scheduler.progress(&mut world, 1.0);

    for (parent, child) in parents.into_iter().zip(children) {
        assert!(!world.is_alive(parent));
        assert!(world.exists(child));
        assert!(!world.is_alive(child));
    }
}

#[test]
fn test_worker_spawns_inherit_the_world_scope() {
    let mut world = World::new();
    positions(&mut world, 4);
    let query = world.query().with::<Position>().build().unwrap();
    let scope = world.entity_named("Spawned");

    let mut scheduler = Scheduler::new(SchedulerConfig::with_workers(2));
    scheduler.system(&mut world, "Spawner", query, |it| {
        for _ in 0..it.count() {
            it.spawn();
        }
    });

    world.set_scope(scope);
    scheduler.progress(&mut world, 1.0);
    world.set_scope(Entity::NULL);

    assert_eq!(world.child_count(scope), 4);
}

// ============================================================================
// Sources under worker threads
// ============================================================================

#[test]
fn test_parent_column_is_shared_across_workers() {
    let mut world = World::new();
    let parent = world.spawn(Position(10.0));
    let children: Vec<Entity> = (0..50)
        .map(|_| {
            let child = world.spawn_in(parent);
            world.insert(child, Velocity(1.0));
            child
        })
        .collect();
    let query = world
        .query()
        .with::<Velocity>()
        .parent::<Position>()
        .build()
        .unwrap();

    let mut scheduler = Scheduler::new(SchedulerConfig::with_workers(4));
    scheduler.system(&mut world, "Inherit", query, |it| {
        let base = it.shared::<Position>(1).map_or(0.0, |p| p.0);
        assert!(it.field_mut::<Position>(1).is_none());
        let mut velocity = it.field_mut::<Velocity>(0).unwrap();
        for v in velocity.iter_mut() {
            v.0 += base;
        }
    });

    scheduler.progress(&mut world, 1.0);

    for child in children {
        assert_eq!(world.get::<Velocity>(child), Some(Velocity(11.0)));
    }
}

#[test]
fn test_system_source_reads_the_system_entity() {
    let mut world = World::new();
    world.component::<Timer>();
    positions(&mut world, 10);
    let mut scheduler = Scheduler::new(SchedulerConfig::with_workers(2));
    let system = scheduler
        .system_expr(&mut world, "Tick", "Position, SYSTEM:Timer", |it| {
            let step = it.shared::<Timer>(1).map_or(0.0, |t| t.0) * it.delta_time();
            assert_eq!(it.source(1), Some(it.system()));
            let mut position = it.field_mut::<Position>(0).unwrap();
            for p in position.iter_mut() {
                p.0 += step;
            }
        })
        .unwrap();

    world.insert(system, Timer(2.0));
    scheduler.progress(&mut world, 0.5);

    let query = scheduler.query_of(system).unwrap();
    let mut total = 0.0;
    for rows in query.iter(&world) {
        total += rows.field::<Position>(0).unwrap().iter().map(|p| p.0).sum::<f32>();
    }
    assert_eq!(total, (0..10).sum::<i32>() as f32 + 10.0);
}
