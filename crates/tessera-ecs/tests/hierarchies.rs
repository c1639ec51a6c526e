//! Hierarchy, scope, and cascade behaviour through the public API.

use tessera_ecs::{Archetype, Entity, Id, ScopeFilter, prelude::*};

// ============================================================================
// Test Components
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Clone, Debug, PartialEq)]
struct Velocity {
    x: f32,
    y: f32,
}

#[derive(Clone, Copy, Debug, Default)]
struct Tag;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn batches(world: &World, parent: Entity) -> Vec<Vec<Entity>> {
    world
        .children(parent)
        .map(|table| table.entities().to_vec())
        .collect()
}

// ============================================================================
// Deletion
// ============================================================================

#[test]
fn test_delete_children() {
    init_tracing();
    let mut world = World::new();
    let parent = world.spawn_empty();
    let children: Vec<Entity> = (0..3).map(|_| world.spawn_in(parent)).collect();

    world.despawn(parent);

    for child in children {
        assert!(world.exists(child));
        assert!(!world.is_alive(child));
    }
}

#[test]
fn test_delete_tree_2_levels() {
    let mut world = World::new();
    let root = world.spawn_empty();
    let child = world.spawn_in(root);

    world.despawn(root);

    assert!(!world.is_alive(root));
    assert!(!world.is_alive(child));
}

#[test]
fn test_delete_tree_3_levels() {
    let mut world = World::new();
    let root = world.spawn_empty();
    let child = world.spawn_in(root);
    let grandchild = world.spawn_in(child);
    let sibling = world.spawn_in(root);

    world.despawn(root);

    for e in [root, child, grandchild, sibling] {
        assert!(world.exists(e));
        assert!(!world.is_alive(e));
    }
}

#[test]
fn test_delete_tree_count_tables() {
    init_tracing();
    let mut world = World::new();
    let root = world.spawn(Position { x: 0.0, y: 0.0 });
    let child = world.spawn_in(root);
    world.insert(child, Position { x: 1.0, y: 0.0 });
    let grandchild = world.spawn_in(child);
    world.insert(grandchild, Position { x: 2.0, y: 0.0 });

    let query = world.query().with::<Position>().build().unwrap();
    assert_eq!(query.table_count(&world), 3);
    let inactive_before = query.inactive_table_count(&world);

    world.despawn(root);

    assert_eq!(query.table_count(&world), 0);
    assert_eq!(query.inactive_table_count(&world), inactive_before + 1);
}

#[test]
fn test_delete_tree_staged() {
    let mut world = World::new();
    let root = world.spawn_empty();
    let child = world.spawn_in(root);

    world.defer_begin();
    world.despawn(root);
    assert!(world.is_alive(root));
    assert!(world.is_alive(child));
    world.defer_end().unwrap();

    assert!(!world.is_alive(root));
    assert!(!world.is_alive(child));
}

#[test]
fn test_delete_children_keeps_parent() {
    let mut world = World::new();
    let parent = world.spawn_empty();
    let a = world.spawn_in(parent);
    let b = world.spawn_in(a);

    world.despawn_children(parent);

    assert!(world.is_alive(parent));
    assert!(!world.is_alive(a));
    assert!(!world.is_alive(b));
    assert!(batches(&world, parent).is_empty());
}

#[test]
fn test_delete_tree_recreate() {
    let mut world = World::new();
    let parent = world.spawn_empty();
    let child = world.spawn_in(parent);
    assert!(world.has_pair::<ChildOf>(child, parent));

    world.despawn_children(parent);
    world.spawn(Position { x: 0.0, y: 0.0 });

    let child_2 = world.spawn_in(parent);
    assert!(world.has_pair::<ChildOf>(child_2, parent));
    assert_eq!(batches(&world, parent), vec![vec![child_2]]);
}

#[test]
fn test_add_child_after_delete_tree() {
    let mut world = World::new();
    let parent = world.spawn_empty();
    world.spawn_in(parent);

    world.despawn_children(parent);
    let child = world.spawn_in(parent);

    assert_eq!(world.parent(child), Some(parent));
    assert_eq!(world.child_count(parent), 1);
}

#[test]
fn test_add_child_after_delete_parent() {
    init_tracing();
    let mut world = World::new();
    let parent = world.spawn_empty();
    let old_child = world.spawn_in(parent);
    world.despawn(parent);

    let child = world.spawn_in(parent);
    let other = world.spawn_empty();
    let slots = [child.index(), other.index()];
    assert!(slots.contains(&parent.index()));
    assert!(slots.contains(&old_child.index()));

    assert!(world.is_alive(child));
    assert_eq!(world.parent(child), None);
    assert_eq!(world.parent(other), None);
    assert_eq!(world.child_count(child), 0);
    assert_eq!(world.child_count(other), 0);
}

#[test]
fn test_add_child_after_delete_parent_staged() {
    let mut world = World::new();
    let parent = world.spawn_empty();

    world.defer_begin();
    world.despawn(parent);
    let child = world.spawn_in(parent);
    world.defer_end().unwrap();

    let recycled = world.spawn_empty();
    assert!(world.is_alive(child));
    assert_eq!(world.parent(child), None);
    assert_eq!(world.child_count(recycled), 0);
}

#[test]
fn test_scope_iter_after_delete_tree() {
    let mut world = World::new();
    let parent = world.spawn_empty();
    let child = world.spawn_in(parent);
    assert!(world.has_pair::<ChildOf>(child, parent));

    world.despawn_children(parent);

    assert!(world.children(parent).next().is_none());
}

#[test]
fn test_delete_children_staged_after_new_children() {
    let mut world = World::new();
    let parent = world.spawn(Position { x: 1.0, y: 1.0 });

    world.defer_begin();
    let children: Vec<Entity> = (0..3).map(|_| world.spawn_in(parent)).collect();
    world.despawn_children(parent);
    world.defer_end().unwrap();

    assert!(world.is_alive(parent));
    assert!(children.iter().all(|&c| !world.is_alive(c)));
    assert!(batches(&world, parent).is_empty());
}

// ============================================================================
// Child iteration
// ============================================================================

#[test]
fn test_tree_iter_1_table() {
    let mut world = World::new();
    let parent = world.spawn_empty();
    let children: Vec<Entity> = (0..3).map(|_| world.spawn_in(parent)).collect();

    assert_eq!(batches(&world, parent), vec![children]);
}

#[test]
fn test_tree_iter_2_tables() {
    let mut world = World::new();
    let parent = world.spawn_empty();
    let first: Vec<Entity> = (0..3).map(|_| world.spawn_in(parent)).collect();
    let fourth = world.spawn_in(parent);
    world.insert(fourth, Velocity { x: 0.0, y: 0.0 });

    assert_eq!(batches(&world, parent), vec![first, vec![fourth]]);
    assert_eq!(world.child_count(parent), 4);
}

#[test]
fn test_tree_iter_filter() {
    let mut world = World::new();
    let parent = world.spawn_empty();
    let plain = world.spawn_in(parent);
    let moving = world.spawn_in(parent);
    world.insert(moving, Velocity { x: 1.0, y: 0.0 });
    let velocity = world.component_id::<Velocity>().unwrap();

    let filtered: Vec<&Archetype> = world
        .children_filtered(parent, ScopeFilter::new().include(velocity))
        .collect();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].entities(), &[moving]);

    let rest: Vec<Entity> = world
        .children_filtered(parent, ScopeFilter::new().exclude(velocity))
        .flat_map(|table| table.entities().to_vec())
        .collect();
    assert_eq!(rest, vec![plain]);
}

#[test]
fn test_get_child_count() {
    let mut world = World::new();
    let parent = world.spawn_empty();
    assert_eq!(world.child_count(parent), 0);

    for _ in 0..5 {
        world.spawn_in(parent);
    }
    let other = world.spawn_in(parent);
    world.insert(other, Position { x: 0.0, y: 0.0 });

    assert_eq!(world.child_count(parent), 6);
}

// ============================================================================
// Scope
// ============================================================================

#[test]
fn test_scope_set_and_restore() {
    let mut world = World::new();
    let scope = world.spawn_empty();

    let previous = world.set_scope(scope);
    assert_eq!(previous, Entity::NULL);
    let scoped = world.spawn_empty();
    assert_eq!(world.parent(scoped), Some(scope));

    assert_eq!(world.set_scope(previous), scope);
    let unscoped = world.spawn_empty();
    assert_eq!(world.parent(unscoped), None);
}

#[test]
fn test_scope_set_with_new_staged() {
    let mut world = World::new();
    let scope = world.spawn_empty();
    world.set_scope(scope);

    world.defer_begin();
    let e = world.spawn_empty();
    assert!(!world.is_alive(e));
    world.defer_end().unwrap();

    assert!(world.is_alive(e));
    assert_eq!(world.parent(e), Some(scope));
    assert!(world.has_id(e, Id::pair(world.child_of(), scope)));
}

#[test]
fn test_explicit_parent_overrides_scope() {
    let mut world = World::new();
    let scope = world.spawn_empty();
    let other = world.spawn_empty();

    world.with_scope(scope, |world| {
        let child = world.spawn_in(other);
        assert_eq!(world.parent(child), Some(other));
    });
    assert_eq!(world.scope(), Entity::NULL);
}

#[test]
fn test_new_under_scope_replaces_parent() {
    let mut world = World::new();
    let scope = world.spawn_empty();
    let other = world.spawn_empty();

    world.set_scope(scope);
    let e = world.spawn_empty();
    world.set_parent(e, other);

    assert_eq!(world.parent(e), Some(other));
    assert_eq!(world.child_count(scope), 0);
}

#[test]
fn test_lookup_in_scope_falls_back_to_root() {
    let mut world = World::new();
    let global = world.entity_named("Global");
    let scope = world.entity_named("Scope");
    let local = world.entity_named("Scope.Local");

    world.set_scope(scope);
    assert_eq!(world.lookup("Local"), Some(local));
    assert_eq!(world.lookup("Global"), Some(global));

    world.set_scope(Entity::NULL);
    assert_eq!(world.lookup("Local"), None);
    assert_eq!(world.lookup("Scope.Local"), Some(local));
}

#[test]
fn test_dead_scope_adds_no_parent() {
    let mut world = World::new();
    let scope = world.spawn_empty();
    world.set_scope(scope);
    world.spawn_empty();
    world.set_scope(Entity::NULL);

    world.despawn(scope);

    assert_eq!(world.child_count(scope), 0);
    world.set_scope(scope);
    let orphan = world.spawn_empty();
    assert_eq!(world.parent(orphan), None);
}

// ============================================================================
// Recycled parents
// ============================================================================

fn recycled_parent(world: &mut World) -> (Entity, Entity) {
    let stale = world.spawn_empty();
    world.despawn(stale);
    let parent = world.spawn_empty();
    assert_eq!(parent.index(), stale.index());
    assert_ne!(parent.generation(), stale.generation());
    (stale, parent)
}

#[test]
fn test_recycled_parent_keeps_children_apart() {
    let mut world = World::new();
    let (stale, parent) = recycled_parent(&mut world);

    let child = world.spawn_in(parent);

    assert_eq!(world.parent(child), Some(parent));
    assert_eq!(world.child_count(parent), 1);
    assert_eq!(world.child_count(stale), 0);
}

#[test]
fn test_rematch_after_add_to_recycled_parent() {
    let mut world = World::new();
    let (_, parent) = recycled_parent(&mut world);
    let child = world.spawn_in(parent);
    world.add::<Tag>(child);

    let query = world
        .query()
        .with::<Tag>()
        .parent::<Position>()
        .build()
        .unwrap();
    assert_eq!(query.count(&world), 0);

    world.insert(parent, Position { x: 3.0, y: 4.0 });
    world.refresh_queries();

    let mut seen = Vec::new();
    for rows in query.iter(&world) {
        assert_eq!(rows.source(1), Some(parent));
        assert_eq!(rows.shared::<Position>(1), Some(&Position { x: 3.0, y: 4.0 }));
        seen.extend_from_slice(rows.entities());
    }
    assert_eq!(seen, vec![child]);
}

#[test]
fn test_cascade_after_recycled_parent_change() {
    let mut world = World::new();
    let (_, parent) = recycled_parent(&mut world);
    let child = world.spawn_in(parent);
    world.add::<Tag>(child);
    let grandchild = world.spawn_in(child);
    world.add::<Tag>(grandchild);

    let query = world
        .query()
        .with::<Tag>()
        .cascade::<Position>()
        .build()
        .unwrap();

    let source_of = |world: &World, e: Entity| {
        query
            .iter(world)
            .find(|rows| rows.entities().contains(&e))
            .and_then(|rows| rows.source(1))
    };

    assert_eq!(source_of(&world, grandchild), None);

    world.insert(parent, Position { x: 0.0, y: 0.0 });
    world.refresh_queries();
    assert_eq!(source_of(&world, grandchild), Some(parent));

    world.insert(child, Position { x: 1.0, y: 1.0 });
    world.refresh_queries();
    assert_eq!(source_of(&world, grandchild), Some(child));
    assert_eq!(source_of(&world, child), Some(parent));
}

#[test]
fn test_cascade_resolves_to_nearest_owner() {
    let mut world = World::new();
    let parent = world.spawn(Position { x: 9.0, y: 9.0 });
    world.add::<Tag>(parent);
    let child = world.spawn_in(parent);
    world.add::<Tag>(child);
    let grandchild = world.spawn_in(child);
    world.add::<Tag>(grandchild);

    let query = world
        .query()
        .with::<Tag>()
        .cascade::<Position>()
        .build()
        .unwrap();

    let mut depth_order = Vec::new();
    for rows in query.iter(&world) {
        for &e in rows.entities() {
            if e == grandchild {
                assert_eq!(rows.source(1), Some(parent));
            }
            depth_order.push(e);
        }
    }
    assert_eq!(depth_order, vec![parent, child, grandchild]);
}
