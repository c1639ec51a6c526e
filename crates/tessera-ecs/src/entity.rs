//! Entity handles and the entity index.
//!
//! Entities use a generational index pattern to safely reuse slots
//! while detecting stale handles. The index maps every live handle to
//! the archetype table and row that currently hold its data.

use std::{
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};

use bitflags::bitflags;

use crate::{archetype::ArchetypeId, error::EcsError};

/// Generation counter to detect stale entity references.
/// Incremented each time an entity slot is recycled.
///
/// Only the low 31 bits are used so that the top bit of a packed handle
/// stays free for pair ids.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Generation(u32);

impl Generation {
    const MASK: u32 = 0x7FFF_FFFF;

    /// Create a new generation (starts at 0).
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    /// Increment the generation counter, wrapping within 31 bits. Zero is
    /// skipped on wrap, so a recycled handle never equals its bare index.
    #[must_use]
    pub const fn next(self) -> Self {
        let next = self.0.wrapping_add(1) & Self::MASK;
        if next == 0 { Self(1) } else { Self(next) }
    }

    /// Get the raw generation value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen{}", self.0)
    }
}

/// A unique identifier for an entity in the world.
///
/// Packs into 64 bits as `generation << 32 | index`. The all-zero value is
/// [`Entity::NULL`] and is never issued.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    /// Slot in the entity index.
    index: u32,
    /// Generation counter for this slot.
    generation: Generation,
}

impl Entity {
    /// "No entity".
    pub const NULL: Entity = Entity {
        index: 0,
        generation: Generation(0),
    };

    /// Create an entity handle from its parts.
    #[must_use]
    pub const fn new(index: u32, generation: Generation) -> Self {
        Self {
            index,
            generation: Generation(generation.0 & Generation::MASK),
        }
    }

    /// Get the entity's slot index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Get the entity's generation.
    #[must_use]
    pub const fn generation(self) -> Generation {
        self.generation
    }

    #[must_use]
    pub const fn is_null(self) -> bool {
        self.index == 0 && self.generation.0 == 0
    }

    /// Pack entity into a single u64.
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        ((self.generation.0 as u64) << 32) | (self.index as u64)
    }

    /// Unpack entity from a u64. The top bit is ignored.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: Generation((bits >> 32) as u32 & Generation::MASK),
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Entity(null)")
        } else {
            write!(f, "Entity({}v{})", self.index, self.generation.0)
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation.0)
    }
}

/// Location of an entity within archetype storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityLocation {
    /// Which archetype table the entity is in.
    pub archetype: ArchetypeId,
    /// Row index within the table.
    pub row: usize,
}

bitflags! {
    /// Per-slot markers that make table moves of an entity visible to
    /// queries whose matches depend on it.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct EntityFlags: u8 {
        /// Some signature holds a pair whose target is this entity.
        const IS_TARGET = 1;
        /// Some query reads a term from this entity.
        const IS_SOURCE = 1 << 1;
    }
}

impl EntityFlags {
    pub const WATCHED: Self = Self::IS_TARGET.union(Self::IS_SOURCE);
}

#[derive(Clone, Copy, Debug, Default)]
struct Slot {
    generation: Generation,
    location: Option<EntityLocation>,
    flags: EntityFlags,
    /// Set once the slot has been handed out; never cleared.
    issued: bool,
    /// On the free list, waiting to be recycled.
    free: bool,
}

/// Maps entity handles to their storage location and recycles freed slots.
///
/// Slot 0 is never issued so that [`Entity::NULL`] can't collide with a
/// real handle.
pub struct EntityIndex {
    slots: Vec<Slot>,
    /// Freed slots, already carrying their next generation.
    free_list: Vec<u32>,
    /// Fresh indices handed out through `&self` that have no slot yet.
    reserved: AtomicU32,
    alive_count: usize,
}

impl Default for EntityIndex {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl EntityIndex {
    /// Create an index with room for `capacity` entities.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity + 1);
        slots.push(Slot::default());
        Self {
            slots,
            free_list: Vec::new(),
            reserved: AtomicU32::new(0),
            alive_count: 0,
        }
    }

    /// Issue a handle. Recycled slots come back with a bumped generation.
    ///
    /// The new handle has no location until [`EntityIndex::place`] is called.
    ///
    /// # Panics
    ///
    /// Panics when the identifier space is exhausted.
    pub fn allocate(&mut self) -> Entity {
        self.flush_reserved();

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.free = false;
            return Entity::new(index, slot.generation);
        }

        let index = self.next_fresh_index(0);
        self.slots.push(Slot {
            issued: true,
            ..Slot::default()
        });
        Entity::new(index, Generation::new())
    }

    /// Issue a fresh handle without exclusive access.
    ///
    /// Workers use this while the world is shared. The slot itself is
    /// created by [`EntityIndex::flush_reserved`] at merge time.
    ///
    /// # Panics
    ///
    /// Panics when the identifier space is exhausted.
    pub fn reserve(&self) -> Entity {
        let offset = self.reserved.fetch_add(1, Ordering::Relaxed);
        Entity::new(self.next_fresh_index(offset), Generation::new())
    }

    fn next_fresh_index(&self, offset: u32) -> u32 {
        u32::try_from(self.slots.len())
            .ok()
            .and_then(|len| len.checked_add(offset))
            .filter(|&index| index < u32::MAX)
            .unwrap_or_else(|| panic!("{}", EcsError::Exhausted))
    }

    /// Create slots for every handle handed out by [`EntityIndex::reserve`].
    pub fn flush_reserved(&mut self) {
        let pending = std::mem::take(self.reserved.get_mut());
        if pending == 0 {
            return;
        }
        let slot = Slot {
            issued: true,
            ..Slot::default()
        };
        self.slots
            .extend(std::iter::repeat_n(slot, pending as usize));
    }

    /// Claim the slot for a handle that was never issued, so writes to it
    /// can upsert. Returns `false` if the slot is already in use.
    pub fn claim(&mut self, entity: Entity) -> bool {
        if entity.is_null() || entity.index == u32::MAX {
            return false;
        }
        self.flush_reserved();

        let index = entity.index as usize;
        if index >= self.slots.len() {
            self.slots.resize(index + 1, Slot::default());
        }

        let slot = &mut self.slots[index];
        if slot.issued {
            return false;
        }
        *slot = Slot {
            generation: entity.generation,
            issued: true,
            ..Slot::default()
        };
        true
    }

    /// Record where an entity lives. Placing an unplaced handle makes it alive.
    pub fn place(&mut self, entity: Entity, location: EntityLocation) {
        let slot = &mut self.slots[entity.index as usize];
        debug_assert_eq!(slot.generation, entity.generation);
        if slot.location.is_none() {
            self.alive_count += 1;
        }
        slot.location = Some(location);
    }

    /// Update the row of an entity that was moved by a swap-remove.
    pub fn set_row(&mut self, entity: Entity, row: usize) {
        if let Some(location) = &mut self.slots[entity.index as usize].location {
            location.row = row;
        }
    }

    /// Release a slot, bumping its generation. Returns the old location.
    pub fn free(&mut self, entity: Entity) -> Option<EntityLocation> {
        if !self.is_alive(entity) {
            return None;
        }
        let slot = &mut self.slots[entity.index as usize];
        let location = slot.location.take();
        slot.generation = slot.generation.next();
        slot.flags = EntityFlags::empty();
        slot.free = true;
        self.free_list.push(entity.index);
        self.alive_count -= 1;
        location
    }

    /// The slot of this handle was issued at some point. Stays true after
    /// the entity is deleted.
    #[must_use]
    pub fn exists(&self, entity: Entity) -> bool {
        !entity.is_null()
            && self
                .slots
                .get(entity.index as usize)
                .is_some_and(|slot| slot.issued)
    }

    /// The handle's generation matches its slot and the entity has storage.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.slots.get(entity.index as usize).is_some_and(|slot| {
            slot.issued && slot.generation == entity.generation && slot.location.is_some()
        })
    }

    /// The handle was issued but has no storage yet: allocated or reserved
    /// while deferred, waiting for its creation to be replayed.
    #[must_use]
    pub fn is_unplaced(&self, entity: Entity) -> bool {
        self.slots.get(entity.index as usize).is_some_and(|slot| {
            slot.issued
                && !slot.free
                && slot.generation == entity.generation
                && slot.location.is_none()
        })
    }

    /// The handle issued for `index` that is alive or waiting to be
    /// placed. `None` for null, freed, and never-issued slots.
    #[must_use]
    pub fn issued_handle(&self, index: u32) -> Option<Entity> {
        if index == 0 {
            return None;
        }
        let slot = self.slots.get(index as usize)?;
        (slot.issued && !slot.free).then_some(Entity::new(index, slot.generation))
    }

    /// Location of a live entity.
    #[must_use]
    pub fn location(&self, entity: Entity) -> Option<EntityLocation> {
        let slot = self.slots.get(entity.index as usize)?;
        if slot.generation == entity.generation {
            slot.location
        } else {
            None
        }
    }

    /// The live handle currently occupying `index`, if any.
    #[must_use]
    pub fn current(&self, index: u32) -> Option<Entity> {
        let slot = self.slots.get(index as usize)?;
        slot.location?;
        Some(Entity::new(index, slot.generation))
    }

    #[must_use]
    pub fn flags(&self, entity: Entity) -> EntityFlags {
        self.slots
            .get(entity.index as usize)
            .map_or(EntityFlags::empty(), |slot| slot.flags)
    }

    /// Mark a slot. Flags survive until the slot is freed.
    pub fn insert_flags(&mut self, index: u32, flags: EntityFlags) {
        if let Some(slot) = self.slots.get_mut(index as usize) {
            slot.flags.insert(flags);
        }
    }

    /// Number of currently alive entities.
    #[must_use]
    pub const fn alive_count(&self) -> usize {
        self.alive_count
    }
}

impl fmt::Debug for EntityIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityIndex")
            .field("slots", &self.slots.len())
            .field("free", &self.free_list.len())
            .field("alive", &self.alive_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(row: usize) -> EntityLocation {
        EntityLocation {
            archetype: ArchetypeId::ROOT,
            row,
        }
    }

    #[test]
    fn test_entity_allocation() {
        let mut index = EntityIndex::default();

        let e1 = index.allocate();
        let e2 = index.allocate();

        assert_ne!(e1, e2);
        assert_eq!(e1.index(), 1);
        assert_eq!(e2.index(), 2);
        assert!(index.exists(e1));
        assert!(!index.is_alive(e1));

        index.place(e1, location(0));
        assert!(index.is_alive(e1));
        assert_eq!(index.alive_count(), 1);
    }

    #[test]
    fn test_recycled_handle_has_new_generation() {
        let mut index = EntityIndex::default();

        let e1 = index.allocate();
        index.place(e1, location(0));
        assert_eq!(index.free(e1), Some(location(0)));

        assert!(index.exists(e1));
        assert!(!index.is_alive(e1));

        let e2 = index.allocate();
        assert_eq!(e2.index(), e1.index());
        assert_ne!(e2.generation(), e1.generation());
        assert_ne!(e2.to_bits(), u64::from(e2.index()));
    }

    #[test]
    fn test_null_is_never_issued() {
        let mut index = EntityIndex::default();
        assert!(!index.exists(Entity::NULL));
        assert!(Entity::NULL.is_null());
        for _ in 0..4 {
            assert!(!index.allocate().is_null());
        }
    }

    #[test]
    fn test_entity_bits_roundtrip() {
        let entity = Entity::new(12345, Generation::new().next().next());
        assert_eq!(Entity::from_bits(entity.to_bits()), entity);
        assert_eq!(entity.to_bits(), (2 << 32) | 12345);
    }

    #[test]
    fn test_generation_stays_in_31_bits() {
        let last = Generation(Generation::MASK);
        assert_eq!(last.next(), Generation(1));
        assert_ne!(last.next(), Generation::new());
    }

    #[test]
    fn test_issued_handle_skips_freed_slots() {
        let mut index = EntityIndex::default();
        let e = index.allocate();
        assert_eq!(index.issued_handle(e.index()), Some(e));

        index.place(e, location(0));
        assert_eq!(index.issued_handle(e.index()), Some(e));

        index.free(e);
        assert_eq!(index.issued_handle(e.index()), None);
        assert!(!index.is_unplaced(Entity::new(e.index(), e.generation().next())));

        let recycled = index.allocate();
        assert_eq!(index.issued_handle(e.index()), Some(recycled));
        assert!(index.is_unplaced(recycled));
        assert_eq!(index.issued_handle(0), None);
        assert_eq!(index.issued_handle(9999), None);
    }

    #[test]
    fn test_reserve_then_flush() {
        let mut index = EntityIndex::default();
        let a = index.allocate();

        let r1 = index.reserve();
        let r2 = index.reserve();
        assert_eq!(r1.index(), a.index() + 1);
        assert_eq!(r2.index(), a.index() + 2);
        assert!(!index.exists(r1));

        let b = index.allocate();
        assert_eq!(b.index(), a.index() + 3);
        assert!(index.exists(r1));
        assert!(index.exists(r2));
    }

    #[test]
    fn test_claim_never_issued_slot() {
        let mut index = EntityIndex::default();
        let far = Entity::new(1000, Generation::new());

        assert!(index.claim(far));
        assert!(!index.claim(far));
        index.place(far, location(0));
        assert!(index.is_alive(far));

        // Gap slots stay unissued
        assert!(!index.exists(Entity::new(500, Generation::new())));
        // Fresh allocation continues after the claimed slot
        assert_eq!(index.allocate().index(), 1001);
    }

    #[test]
    fn test_current_resolves_live_handle() {
        let mut index = EntityIndex::default();
        let e = index.allocate();
        assert_eq!(index.current(e.index()), None);
        index.place(e, location(3));
        assert_eq!(index.current(e.index()), Some(e));
        index.free(e);
        assert_eq!(index.current(e.index()), None);
    }
}
