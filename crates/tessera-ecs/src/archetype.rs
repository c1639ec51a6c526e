//! Archetype storage - tables of entities with identical signatures.
//!
//! An archetype represents a unique combination of ids. All entities with
//! the same signature are stored together for cache-efficient iteration.
//! Tables are created lazily by the registry and kept when they empty out,
//! so cached query matches stay valid; only tables whose signature names a
//! deleted relationship target are ever destroyed.

use std::fmt;

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;
use tracing::debug;

use crate::{
    component::ComponentRegistry, entity::Entity, id::Id, signature::Signature, storage::Column,
};

/// Unique identifier for an archetype table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchetypeId(u32);

impl ArchetypeId {
    /// The root table (empty signature).
    pub const ROOT: Self = Self(0);

    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArchetypeId({})", self.0)
    }
}

/// An archetype - a table storing entities with the same signature.
pub struct Archetype {
    id: ArchetypeId,
    signature: Signature,
    /// One column per sized component, in signature order.
    columns: Vec<Column>,
    /// Map from id to column index.
    column_indices: HashMap<Id, usize, FxBuildHasher>,
    /// Entities stored in this archetype, one per row.
    entities: Vec<Entity>,
    /// Slot index of the `(ChildOf, target)` target, shared by every row.
    parent: Option<u32>,
}

impl Archetype {
    fn new(
        id: ArchetypeId,
        signature: Signature,
        registry: &ComponentRegistry,
        child_of: Id,
    ) -> Self {
        let mut column_indices = HashMap::default();
        let mut columns = Vec::new();

        for component in signature.iter() {
            let Some(info) = registry.get_info(component) else {
                continue;
            };
            if info.is_tag() {
                continue;
            }
            column_indices.insert(component, columns.len());
            columns.push(Column::new(info.clone()));
        }

        let parent = signature.find(child_of).and_then(Id::target_index);

        Self {
            id,
            signature,
            columns,
            column_indices,
            entities: Vec::new(),
            parent,
        }
    }

    #[must_use]
    pub const fn id(&self) -> ArchetypeId {
        self.id
    }

    #[must_use]
    pub const fn signature(&self) -> &Signature {
        &self.signature
    }

    #[must_use]
    pub fn contains(&self, id: Id) -> bool {
        self.signature.contains(id)
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Slot index of the parent every row shares, if the signature has a
    /// `ChildOf` pair.
    #[must_use]
    pub const fn parent_index(&self) -> Option<u32> {
        self.parent
    }

    #[must_use]
    pub fn column_index(&self, id: Id) -> Option<usize> {
        self.column_indices.get(&id).copied()
    }

    #[must_use]
    pub fn column(&self, id: Id) -> Option<&Column> {
        self.column_index(id).map(|idx| &self.columns[idx])
    }

    #[must_use]
    pub fn column_mut(&mut self, id: Id) -> Option<&mut Column> {
        self.column_index(id).map(|idx| &mut self.columns[idx])
    }

    pub(crate) fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    pub(crate) fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Append an entity and return its row index.
    ///
    /// Does NOT initialize component data - the caller pushes one value
    /// onto every column.
    pub fn allocate(&mut self, entity: Entity) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        row
    }

    /// Remove the entity at `row` using swap-remove.
    ///
    /// Returns the entity that was moved into this row (if any).
    ///
    /// # Safety
    ///
    /// - `row` must be a valid row index.
    /// - Caller must have already removed component data from columns.
    pub unsafe fn deallocate(&mut self, row: usize) -> Option<Entity> {
        debug_assert!(row < self.entities.len());

        let last_row = self.entities.len() - 1;
        self.entities.swap_remove(row);

        if row < last_row {
            Some(self.entities[row])
        } else {
            None
        }
    }

    /// Drop every value in the row and remove it.
    ///
    /// Returns the entity that was moved into this row (if any).
    ///
    /// # Safety
    ///
    /// `row` must be a valid row index.
    pub unsafe fn remove_row(&mut self, row: usize) -> Option<Entity> {
        for column in &mut self.columns {
            // SAFETY: row is valid for every column of this table
            unsafe { column.swap_remove_drop(row) };
        }
        // SAFETY: columns were updated above
        unsafe { self.deallocate(row) }
    }
}

impl fmt::Debug for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archetype")
            .field("id", &self.id)
            .field("signature", &self.signature)
            .field("entity_count", &self.entities.len())
            .finish()
    }
}

/// Storage for all archetype tables in a world.
pub struct ArchetypeStorage {
    /// Table slots; destroyed tables leave `None` so ids are never reused.
    archetypes: Vec<Option<Archetype>>,
    /// Map from canonical signature to table.
    archetype_map: HashMap<Signature, ArchetypeId, FxBuildHasher>,
    /// Tables containing each id, in creation order.
    id_index: HashMap<Id, SmallVec<[ArchetypeId; 4]>, FxBuildHasher>,
    /// Tables holding any pair whose target is the keyed slot index.
    target_index: HashMap<u32, SmallVec<[ArchetypeId; 4]>, FxBuildHasher>,
    /// `(ChildOf, *)`, used to cache each table's parent.
    child_of: Id,
}

impl ArchetypeStorage {
    /// Create storage holding only the root table.
    #[must_use]
    pub fn new(child_of: Entity) -> Self {
        let mut storage = Self {
            archetypes: Vec::new(),
            archetype_map: HashMap::default(),
            id_index: HashMap::default(),
            target_index: HashMap::default(),
            child_of: Id::pair_wildcard(child_of),
        };

        let registry = ComponentRegistry::new();
        storage.get_or_create(Signature::new(), &registry);

        storage
    }

    /// Get or create the table for a signature. The flag is `true` when the
    /// table was created by this call.
    pub fn get_or_create(
        &mut self,
        signature: Signature,
        registry: &ComponentRegistry,
    ) -> (ArchetypeId, bool) {
        if let Some(&id) = self.archetype_map.get(&signature) {
            return (id, false);
        }

        let id = ArchetypeId(self.archetypes.len() as u32);

        for component in signature.iter() {
            self.id_index.entry(component).or_default().push(id);
            if let Some(target) = component.target_index() {
                let tables = self.target_index.entry(target).or_default();
                if tables.last() != Some(&id) {
                    tables.push(id);
                }
            }
        }

        debug!(?id, ?signature, "created table");

        let archetype = Archetype::new(id, signature.clone(), registry, self.child_of);
        self.archetypes.push(Some(archetype));
        self.archetype_map.insert(signature, id);

        (id, true)
    }

    #[must_use]
    pub fn get(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.0 as usize)?.as_ref()
    }

    #[must_use]
    pub fn get_mut(&mut self, id: ArchetypeId) -> Option<&mut Archetype> {
        self.archetypes.get_mut(id.0 as usize)?.as_mut()
    }

    /// Borrow two distinct tables mutably.
    ///
    /// # Panics
    ///
    /// Panics if `a == b` or either table does not exist.
    pub fn get_two_mut(
        &mut self,
        a: ArchetypeId,
        b: ArchetypeId,
    ) -> (&mut Archetype, &mut Archetype) {
        assert_ne!(a, b, "cannot borrow a table twice");
        let (low, high, swapped) = if a.0 < b.0 {
            (a.0 as usize, b.0 as usize, false)
        } else {
            (b.0 as usize, a.0 as usize, true)
        };
        let (head, tail) = self.archetypes.split_at_mut(high);
        let first = head[low].as_mut().expect("table exists");
        let second = tail[0].as_mut().expect("table exists");
        if swapped {
            (second, first)
        } else {
            (first, second)
        }
    }

    /// Tables whose signature holds exactly `id`, in creation order.
    #[must_use]
    pub fn with_id(&self, id: Id) -> &[ArchetypeId] {
        self.id_index.get(&id).map_or(&[], |tables| tables.as_slice())
    }

    /// Tables whose signature holds a pair targeting the slot `index`.
    #[must_use]
    pub fn targeting(&self, index: u32) -> &[ArchetypeId] {
        self.target_index
            .get(&index)
            .map_or(&[], |tables| tables.as_slice())
    }

    /// Remove a table from the registry. Its rows must already be gone.
    pub fn destroy(&mut self, id: ArchetypeId) -> Option<Archetype> {
        if id == ArchetypeId::ROOT {
            return None;
        }
        let archetype = self.archetypes.get_mut(id.0 as usize)?.take()?;
        debug_assert!(archetype.is_empty(), "destroying a table with rows");

        self.archetype_map.remove(&archetype.signature);
        for component in archetype.signature.iter() {
            if let Some(tables) = self.id_index.get_mut(&component) {
                tables.retain(|t| *t != id);
                if tables.is_empty() {
                    self.id_index.remove(&component);
                }
            }
            if let Some(target) = component.target_index() {
                if let Some(tables) = self.target_index.get_mut(&target) {
                    tables.retain(|t| *t != id);
                    if tables.is_empty() {
                        self.target_index.remove(&target);
                    }
                }
            }
        }

        debug!(?id, signature = ?archetype.signature, "destroyed table");
        Some(archetype)
    }

    /// Number of live tables, including the root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.archetype_map.len()
    }

    /// Always false: the root table exists for the world's lifetime.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.archetype_map.is_empty()
    }

    /// Iterate over live tables in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter().flatten()
    }
}

impl fmt::Debug for ArchetypeStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchetypeStorage")
            .field("tables", &self.len())
            .finish()
    }
}
