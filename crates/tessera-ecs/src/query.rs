//! Queries: ordered term lists matched against table signatures.
//!
//! A query is registered once and keeps the list of tables it matches.
//! New tables are tested as they are created; destroyed tables are dropped
//! from every list. Terms sourced from other entities (a fixed entity,
//! `PARENT`, `CASCADE`, or the running system) make a query *dynamic*: its
//! matches also depend on where those entities live, so moving one of them
//! marks the world for a rematch that [`World::refresh_queries`] resolves.
//!
//! # Basic Usage
//!
//! ```
//! use tessera_ecs::World;
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Position(f32);
//!
//! let mut world = World::new();
//! world.spawn(Position(1.0));
//! world.spawn(Position(2.0));
//!
//! let query = world.query().with::<Position>().build().unwrap();
//! let mut sum = 0.0;
//! for rows in query.iter(&world) {
//!     let positions = rows.field::<Position>(0).unwrap();
//!     sum += positions.iter().map(|p| p.0).sum::<f32>();
//! }
//! assert_eq!(sum, 3.0);
//! ```

use std::{
    borrow::Cow,
    cell::Cell,
    fmt,
    ops::{Deref, DerefMut},
    slice,
};

use smallvec::SmallVec;
use tessera_dsl::{ElemKind, Identifier, Operator};
use tracing::debug;

use crate::{
    World,
    archetype::{Archetype, ArchetypeId},
    component::Component,
    entity::{Entity, EntityFlags},
    error::{EcsError, EcsResult},
    id::Id,
};

/// Ancestor hops a `CASCADE` term walks before giving up.
const MAX_CASCADE_DEPTH: usize = 256;

// ============================================================================
// Terms
// ============================================================================

/// Where a term reads its id from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Source {
    /// The matched entity itself.
    #[default]
    This,
    /// The matched entity's `ChildOf` target.
    Parent,
    /// The nearest ancestor holding the id. Never excludes a table unless
    /// negated.
    Cascade,
    /// A fixed entity, shared by every row.
    Entity(Entity),
    /// The entity of the system running the query. Unbound until the
    /// query is attached to a system.
    System,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Oper {
    #[default]
    And,
    /// At least one id of the term's family must match.
    Or,
    Not,
    Optional,
}

/// One query column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Term {
    /// The id, or every member of an `Or` family.
    pub ids: SmallVec<[Id; 2]>,
    pub source: Source,
    pub oper: Oper,
}

impl Term {
    #[must_use]
    pub fn new(id: Id) -> Self {
        Self {
            ids: SmallVec::from_elem(id, 1),
            source: Source::This,
            oper: Oper::And,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }

    #[must_use]
    pub fn with_oper(mut self, oper: Oper) -> Self {
        self.oper = oper;
        self
    }
}

/// A table matched by a query, with each term resolved.
#[derive(Clone, Debug)]
pub(crate) struct TableMatch {
    table: ArchetypeId,
    /// Concrete id per term; `None` when the term is absent or negated.
    ids: SmallVec<[Option<Id>; 4]>,
    /// Entity each term was read from; `None` for the table itself.
    sources: SmallVec<[Option<Entity>; 4]>,
    /// Number of ancestors of the table, for `CASCADE` ordering.
    depth: usize,
}

// ============================================================================
// QueryState
// ============================================================================

pub(crate) struct QueryState {
    terms: SmallVec<[Term; 4]>,
    matches: Vec<TableMatch>,
    dynamic: bool,
    cascade: bool,
    /// Ids read through another entity; never handed out mutably.
    shared_ids: SmallVec<[Id; 4]>,
}

impl QueryState {
    fn new(terms: SmallVec<[Term; 4]>) -> Self {
        let mut state = Self {
            terms,
            matches: Vec::new(),
            dynamic: false,
            cascade: false,
            shared_ids: SmallVec::new(),
        };
        state.classify();
        state
    }

    fn classify(&mut self) {
        self.dynamic = self.terms.iter().any(|t| t.source != Source::This);
        self.cascade = self.terms.iter().any(|t| t.source == Source::Cascade);
        self.shared_ids = self
            .terms
            .iter()
            .filter(|t| t.source != Source::This)
            .flat_map(|t| t.ids.iter().copied())
            .collect();
    }

    /// First id of the term's family held by `entity`.
    fn find_on(world: &World, entity: Entity, term: &Term) -> Option<(Id, Option<Entity>)> {
        let signature = world.type_of(entity)?;
        term.ids
            .iter()
            .find_map(|id| signature.find(*id))
            .map(|found| (found, Some(entity)))
    }

    fn resolve(world: &World, table: &Archetype, term: &Term) -> Option<(Id, Option<Entity>)> {
        match term.source {
            Source::This => term
                .ids
                .iter()
                .find_map(|id| table.signature().find(*id))
                .map(|found| (found, None)),
            Source::Parent => {
                let parent = world.entities.current(table.parent_index()?)?;
                Self::find_on(world, parent, term)
            }
            Source::Cascade => {
                let mut current = table
                    .parent_index()
                    .and_then(|index| world.entities.current(index));
                let mut hops = 0;
                while let Some(ancestor) = current {
                    if hops == MAX_CASCADE_DEPTH {
                        break;
                    }
                    if let Some(found) = Self::find_on(world, ancestor, term) {
                        return Some(found);
                    }
                    current = world.parent(ancestor);
                    hops += 1;
                }
                None
            }
            Source::Entity(entity) => Self::find_on(world, entity, term),
            Source::System => None,
        }
    }

    fn match_table(&self, world: &World, table: &Archetype) -> Option<TableMatch> {
        let mut matched = TableMatch {
            table: table.id(),
            ids: SmallVec::with_capacity(self.terms.len()),
            sources: SmallVec::with_capacity(self.terms.len()),
            depth: 0,
        };

        for term in &self.terms {
            let found = Self::resolve(world, table, term);
            let (id, source) = match (term.oper, found) {
                (Oper::And | Oper::Or, Some(found)) => (Some(found.0), found.1),
                (Oper::And | Oper::Or, None) if term.source == Source::Cascade => (None, None),
                (Oper::And | Oper::Or, None) => return None,
                (Oper::Not, Some(_)) => return None,
                (Oper::Not, None) => (None, None),
                (Oper::Optional, found) => (found.map(|f| f.0), found.and_then(|f| f.1)),
            };
            matched.ids.push(id);
            matched.sources.push(source);
        }

        if self.cascade {
            matched.depth = Self::depth(world, table);
        }
        Some(matched)
    }

    fn depth(world: &World, table: &Archetype) -> usize {
        let mut depth = 0;
        let mut current = table
            .parent_index()
            .and_then(|index| world.entities.current(index));
        while let Some(ancestor) = current {
            if depth == MAX_CASCADE_DEPTH {
                break;
            }
            depth += 1;
            current = world.parent(ancestor);
        }
        depth
    }

    fn compute_matches(&self, world: &World) -> Vec<TableMatch> {
        let mut matches: Vec<TableMatch> = world
            .archetypes
            .iter()
            .filter_map(|table| self.match_table(world, table))
            .collect();
        if self.cascade {
            matches.sort_by_key(|m| m.depth);
        }
        matches
    }

    fn insert_match(&mut self, matched: TableMatch) {
        if self.cascade {
            let pos = self.matches.partition_point(|m| m.depth <= matched.depth);
            self.matches.insert(pos, matched);
        } else {
            self.matches.push(matched);
        }
    }
}

// ============================================================================
// QueryBuilder
// ============================================================================

/// Builder for registering a query. Typed methods register the component
/// if needed.
pub struct QueryBuilder<'w> {
    world: &'w mut World,
    terms: SmallVec<[Term; 4]>,
}

impl<'w> QueryBuilder<'w> {
    fn push<T: Component>(mut self, source: Source, oper: Oper) -> Self {
        let id = self.world.component::<T>();
        self.terms
            .push(Term::new(id).with_source(source).with_oper(oper));
        self
    }

    #[must_use]
    pub fn with<T: Component>(self) -> Self {
        self.push::<T>(Source::This, Oper::And)
    }

    #[must_use]
    pub fn without<T: Component>(self) -> Self {
        self.push::<T>(Source::This, Oper::Not)
    }

    #[must_use]
    pub fn optional<T: Component>(self) -> Self {
        self.push::<T>(Source::This, Oper::Optional)
    }

    /// Join `T` to the previous term's family.
    #[must_use]
    pub fn or<T: Component>(self) -> Self {
        let id = self.world.component::<T>();
        self.or_id(id)
    }

    #[must_use]
    pub fn or_id(mut self, id: Id) -> Self {
        match self.terms.last_mut() {
            Some(last) => {
                last.ids.push(id);
                last.oper = Oper::Or;
            }
            None => self.terms.push(Term::new(id)),
        }
        self
    }

    /// Read `T` from the parent.
    #[must_use]
    pub fn parent<T: Component>(self) -> Self {
        self.push::<T>(Source::Parent, Oper::And)
    }

    /// Read `T` from the nearest ancestor that has it.
    #[must_use]
    pub fn cascade<T: Component>(self) -> Self {
        self.push::<T>(Source::Cascade, Oper::And)
    }

    /// Read `T` from a fixed entity.
    #[must_use]
    pub fn source<T: Component>(self, entity: Entity) -> Self {
        self.push::<T>(Source::Entity(entity), Oper::And)
    }

    /// Read `T` from the system entity running the query.
    #[must_use]
    pub fn system<T: Component>(self) -> Self {
        self.push::<T>(Source::System, Oper::And)
    }

    #[must_use]
    pub fn with_id(self, id: Id) -> Self {
        self.term(Term::new(id))
    }

    #[must_use]
    pub fn without_id(self, id: Id) -> Self {
        self.term(Term::new(id).with_oper(Oper::Not))
    }

    #[must_use]
    pub fn term(mut self, term: Term) -> Self {
        self.terms.push(term);
        self
    }

    /// Register the query.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EmptyQuery`] if no terms were added.
    pub fn build(self) -> EcsResult<Query> {
        self.world.register_query(self.terms)
    }
}

// ============================================================================
// Query
// ============================================================================

/// Handle to a query registered in a [`World`].
///
/// Methods taking a world panic if the handle came from another world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Query(u32);

impl Query {
    /// Iterate matched tables read-only.
    #[must_use]
    pub fn iter(self, world: &World) -> QueryIter<'_> {
        QueryIter::new(world, self, false)
    }

    /// Iterate matched tables with [`Rows::field_mut`] available.
    pub fn iter_mut(self, world: &mut World) -> QueryIter<'_> {
        world.refresh_queries();
        QueryIter::new(world, self, true)
    }

    #[must_use]
    pub fn terms(self, world: &World) -> &[Term] {
        &world.queries[self.0 as usize].terms
    }

    /// Non-empty matched tables with their row counts, in iteration order.
    #[must_use]
    pub fn tables(self, world: &World) -> Vec<(ArchetypeId, usize)> {
        self.iter(world)
            .map(|rows| (rows.table().id(), rows.count()))
            .collect()
    }

    /// Total matched rows.
    #[must_use]
    pub fn count(self, world: &World) -> usize {
        self.iter(world).map(|rows| rows.count()).sum()
    }

    #[must_use]
    pub fn table_count(self, world: &World) -> usize {
        self.iter(world).table_count()
    }

    #[must_use]
    pub fn inactive_table_count(self, world: &World) -> usize {
        self.iter(world).inactive_table_count()
    }
}

impl World {
    /// Start building a query.
    pub fn query(&mut self) -> QueryBuilder<'_> {
        QueryBuilder {
            world: self,
            terms: SmallVec::new(),
        }
    }

    /// Register a query from an expression such as
    /// `"Position, !Velocity, PARENT:Position"`. Names resolve through
    /// [`World::lookup`].
    ///
    /// # Errors
    ///
    /// Fails on a malformed expression, an unknown name, or no terms.
    pub fn query_expr(&mut self, expr: &str) -> EcsResult<Query> {
        let mut terms: SmallVec<[Term; 4]> = SmallVec::new();

        tessera_dsl::visit_expr(expr, |kind, operator, identifier| -> EcsResult<()> {
            let id = self.resolve_identifier(identifier)?;
            let source = match kind {
                ElemKind::This => Source::This,
                ElemKind::Parent => Source::Parent,
                ElemKind::Cascade => Source::Cascade,
                ElemKind::System => Source::System,
                ElemKind::Entity(name) => Source::Entity(
                    self.lookup(name)
                        .ok_or_else(|| EcsError::UnknownIdentifier(name.to_string()))?,
                ),
            };
            let oper = match operator {
                Operator::And => Oper::And,
                Operator::Not => Oper::Not,
                Operator::Optional => Oper::Optional,
                Operator::Or => {
                    if let Some(last) = terms.last_mut() {
                        last.ids.push(id);
                        last.oper = Oper::Or;
                        return Ok(());
                    }
                    Oper::And
                }
            };
            terms.push(Term::new(id).with_source(source).with_oper(oper));
            Ok(())
        })?;

        self.register_query(terms)
    }

    fn resolve_identifier(&self, identifier: Identifier<'_>) -> EcsResult<Id> {
        let named = |name: &str| {
            self.lookup(name)
                .ok_or_else(|| EcsError::UnknownIdentifier(name.to_string()))
        };
        match identifier {
            Identifier::Name(name) => named(name).map(Id::entity),
            Identifier::Pair { relation, target } => {
                let relation = named(relation)?;
                if target == "*" {
                    Ok(Id::pair_wildcard(relation))
                } else {
                    Ok(Id::pair(relation, named(target)?))
                }
            }
        }
    }

    fn register_query(&mut self, terms: SmallVec<[Term; 4]>) -> EcsResult<Query> {
        if terms.is_empty() {
            return Err(EcsError::EmptyQuery);
        }
        self.refresh_queries();

        for term in &terms {
            if let Source::Entity(entity) = term.source {
                self.entities
                    .insert_flags(entity.index(), EntityFlags::IS_SOURCE);
            }
        }

        let mut state = QueryState::new(terms);
        state.matches = state.compute_matches(self);
        debug!(
            terms = state.terms.len(),
            tables = state.matches.len(),
            "registered query"
        );

        let query = Query(self.queries.len() as u32);
        self.queries.push(state);
        Ok(query)
    }

    /// Bind a query's `SYSTEM` terms to `system`. Required tags and
    /// defaultable components are added to the system entity.
    pub fn bind_system(&mut self, query: Query, system: Entity) {
        let Some(state) = self.queries.get_mut(query.0 as usize) else {
            return;
        };

        let mut required: SmallVec<[Id; 4]> = SmallVec::new();
        for term in &mut state.terms {
            if term.source != Source::System {
                continue;
            }
            term.source = Source::Entity(system);
            if term.oper == Oper::And {
                required.extend(term.ids.first().copied());
            }
        }
        state.classify();

        self.entities
            .insert_flags(system.index(), EntityFlags::IS_SOURCE);
        for id in required {
            if !self.has_id(system, id) {
                self.add_id(system, id);
            }
        }

        let state = &self.queries[query.0 as usize];
        let matches = state.compute_matches(self);
        self.queries[query.0 as usize].matches = matches;
    }

    /// Rematch dynamic queries if an entity they depend on changed table.
    pub fn refresh_queries(&mut self) {
        if !self.rematch_pending {
            return;
        }
        self.rematch_pending = false;

        let mut refreshed = 0;
        for index in 0..self.queries.len() {
            if !self.queries[index].dynamic {
                continue;
            }
            let matches = self.queries[index].compute_matches(self);
            self.queries[index].matches = matches;
            refreshed += 1;
        }
        debug!(queries = refreshed, "rematched queries");
    }

    pub(crate) fn on_table_created(&mut self, table: ArchetypeId) {
        for index in 0..self.queries.len() {
            let Some(archetype) = self.archetypes.get(table) else {
                return;
            };
            if let Some(matched) = self.queries[index].match_table(self, archetype) {
                self.queries[index].insert_match(matched);
            }
        }
    }

    pub(crate) fn on_table_destroyed(&mut self, table: ArchetypeId) {
        for state in &mut self.queries {
            state.matches.retain(|m| m.table != table);
        }
    }

    /// Rows `start..start + count` of one matched table, writable.
    ///
    /// Returns `None` if the query does not match the table or the range is
    /// out of bounds.
    ///
    /// # Safety
    ///
    /// No other live [`Rows`] may overlap this range of this table, and no
    /// structural change may happen while the result is alive.
    #[must_use]
    pub unsafe fn job_rows(
        &self,
        query: Query,
        table: ArchetypeId,
        start: usize,
        count: usize,
    ) -> Option<Rows<'_>> {
        let state = &self.queries[query.0 as usize];
        let matched = state.matches.iter().find(|m| m.table == table)?;
        let archetype = self.archetypes.get(table)?;
        if start.checked_add(count)? > archetype.len() {
            return None;
        }
        Some(Rows::new(self, state, archetype, matched.clone(), start, count, true))
    }
}

// ============================================================================
// Iteration
// ============================================================================

/// Iterator over the non-empty tables matched by a query. Each item is one
/// batch holding every row of the table.
pub struct QueryIter<'w> {
    world: &'w World,
    state: &'w QueryState,
    matches: Cow<'w, [TableMatch]>,
    position: usize,
    writable: bool,
}

impl<'w> QueryIter<'w> {
    fn new(world: &'w World, query: Query, writable: bool) -> Self {
        let state = &world.queries[query.0 as usize];
        // A pending rematch is resolved on the fly for read-only access
        let matches = if world.rematch_pending && state.dynamic {
            Cow::Owned(state.compute_matches(world))
        } else {
            Cow::Borrowed(state.matches.as_slice())
        };
        Self {
            world,
            state,
            matches,
            position: 0,
            writable,
        }
    }

    fn table_len(&self, matched: &TableMatch) -> usize {
        self.world
            .archetypes
            .get(matched.table)
            .map_or(0, Archetype::len)
    }

    /// Matched tables that currently have rows.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.matches
            .iter()
            .filter(|m| self.table_len(m) > 0)
            .count()
    }

    /// Matched tables that are currently empty.
    #[must_use]
    pub fn inactive_table_count(&self) -> usize {
        self.matches
            .iter()
            .filter(|m| self.table_len(m) == 0)
            .count()
    }
}

impl<'w> Iterator for QueryIter<'w> {
    type Item = Rows<'w>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(matched) = self.matches.get(self.position) {
            self.position += 1;
            let Some(table) = self.world.archetypes.get(matched.table) else {
                continue;
            };
            if table.is_empty() {
                continue;
            }
            return Some(Rows::new(
                self.world,
                self.state,
                table,
                matched.clone(),
                0,
                table.len(),
                self.writable,
            ));
        }
        None
    }
}

/// A batch of rows from one matched table.
///
/// Columns are addressed by term index.
pub struct Rows<'w> {
    world: &'w World,
    table: &'w Archetype,
    matched: TableMatch,
    shared_ids: &'w [Id],
    start: usize,
    count: usize,
    writable: bool,
    /// Per table column: readers (> 0) or a writer (-1).
    borrows: SmallVec<[Cell<isize>; 8]>,
}

impl<'w> Rows<'w> {
    fn new(
        world: &'w World,
        state: &'w QueryState,
        table: &'w Archetype,
        matched: TableMatch,
        start: usize,
        count: usize,
        writable: bool,
    ) -> Self {
        Self {
            world,
            table,
            matched,
            shared_ids: &state.shared_ids,
            start,
            count,
            writable,
            borrows: (0..table.columns().len()).map(|_| Cell::new(0)).collect(),
        }
    }

    #[must_use]
    pub fn entities(&self) -> &'w [Entity] {
        &self.table.entities()[self.start..self.start + self.count]
    }

    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    #[must_use]
    pub const fn table(&self) -> &'w Archetype {
        self.table
    }

    /// The term resolved to an id for this table.
    #[must_use]
    pub fn is_set(&self, col: usize) -> bool {
        self.column_id(col).is_some()
    }

    /// Concrete id a term resolved to, e.g. the matched member of an `Or`
    /// family or the target of a wildcard pair.
    #[must_use]
    pub fn column_id(&self, col: usize) -> Option<Id> {
        self.matched.ids.get(col).copied().flatten()
    }

    /// Entity a term is read from, or `None` for the rows themselves.
    #[must_use]
    pub fn source(&self, col: usize) -> Option<Entity> {
        self.matched.sources.get(col).copied().flatten()
    }

    fn column_slot(&self, col: usize) -> Option<(Id, usize)> {
        if self.source(col).is_some() {
            return None;
        }
        let id = self.column_id(col)?;
        Some((id, self.table.column_index(id)?))
    }

    fn base_ptr<T: Component>(&self, id: Id, index: usize) -> *mut T {
        let column = &self.table.columns()[index];
        assert!(column.info().is::<T>(), "{}", EcsError::TypeMismatch(id));
        // SAFETY: start is within the column's rows
        unsafe { column.as_ptr().cast::<T>().add(self.start) }
    }

    /// Values of a self-sourced term. `None` for absent, tag, or shared
    /// terms.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not the term's type or the column is borrowed
    /// mutably.
    #[must_use]
    pub fn field<T: Component>(&self, col: usize) -> Option<Field<'_, T>> {
        let (id, index) = self.column_slot(col)?;
        let borrow = &self.borrows[index];
        assert!(borrow.get() >= 0, "column {id:?} is already borrowed mutably");
        borrow.set(borrow.get() + 1);

        let values = if self.count == 0 {
            &[][..]
        } else {
            // SAFETY: the range is in bounds and no writer is active
            unsafe { slice::from_raw_parts(self.base_ptr::<T>(id, index), self.count) }
        };
        Some(Field { values, borrow })
    }

    /// Mutable values of a self-sourced term. `None` on read-only
    /// iteration, for absent terms, and for ids the query also reads from
    /// other entities.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not the term's type or the column is already
    /// borrowed.
    #[must_use]
    pub fn field_mut<T: Component>(&self, col: usize) -> Option<FieldMut<'_, T>> {
        if !self.writable {
            return None;
        }
        let (id, index) = self.column_slot(col)?;
        if self.shared_ids.contains(&id) {
            return None;
        }
        let borrow = &self.borrows[index];
        assert!(borrow.get() == 0, "column {id:?} is already borrowed");
        borrow.set(-1);

        let values = if self.count == 0 {
            &mut [][..]
        } else {
            // SAFETY: writable rows have exclusive access to this range and
            // the borrow flag rules out aliasing within the batch
            unsafe { slice::from_raw_parts_mut(self.base_ptr::<T>(id, index), self.count) }
        };
        Some(FieldMut { values, borrow })
    }

    /// Value of a term read from another entity.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not the term's type.
    #[must_use]
    pub fn shared<T: Component>(&self, col: usize) -> Option<&'w T> {
        let source = self.source(col)?;
        let id = self.column_id(col)?;
        let location = self.world.entities.location(source)?;
        let column = self.world.archetypes.get(location.archetype)?.column(id)?;
        assert!(column.info().is::<T>(), "{}", EcsError::TypeMismatch(id));
        // SAFETY: the source's row is in bounds and shared ids are never
        // handed out mutably by this query
        Some(unsafe { column.get_unchecked::<T>(location.row) })
    }
}

impl fmt::Debug for Rows<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rows")
            .field("table", &self.table.id())
            .field("start", &self.start)
            .field("count", &self.count)
            .finish()
    }
}

/// Shared borrow of a column slice.
pub struct Field<'r, T> {
    values: &'r [T],
    borrow: &'r Cell<isize>,
}

impl<T> Deref for Field<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.values
    }
}

impl<T> Drop for Field<'_, T> {
    fn drop(&mut self) {
        self.borrow.set(self.borrow.get() - 1);
    }
}

/// Exclusive borrow of a column slice.
pub struct FieldMut<'r, T> {
    values: &'r mut [T],
    borrow: &'r Cell<isize>,
}

impl<T> Deref for FieldMut<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.values
    }
}

impl<T> DerefMut for FieldMut<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.values
    }
}

impl<T> Drop for FieldMut<'_, T> {
    fn drop(&mut self) {
        self.borrow.set(0);
    }
}
