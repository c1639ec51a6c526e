//! Canonical id sets.

use std::fmt;

use smallvec::SmallVec;

use crate::id::Id;

/// The sorted, deduplicated set of ids an entity carries.
///
/// Two signatures with the same ids compare and hash equal regardless of
/// the order the ids were added in, so the registry keys tables by them
/// directly.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Signature(SmallVec<[Id; 8]>);

impl Signature {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a canonical signature from ids in any order.
    #[must_use]
    pub fn from_ids(ids: impl IntoIterator<Item = Id>) -> Self {
        let mut ids: SmallVec<[Id; 8]> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        Self(ids)
    }

    /// Copy of this signature with `id` inserted. Adding a present id
    /// returns an identical signature.
    #[must_use]
    pub fn with(&self, id: Id) -> Self {
        let mut ids = self.0.clone();
        if let Err(pos) = ids.binary_search(&id) {
            ids.insert(pos, id);
        }
        Self(ids)
    }

    /// Copy of this signature with `id` removed. Removing an absent id
    /// returns an identical signature.
    #[must_use]
    pub fn without(&self, id: Id) -> Self {
        let mut ids = self.0.clone();
        if let Ok(pos) = ids.binary_search(&id) {
            ids.remove(pos);
        }
        Self(ids)
    }

    /// First id in the signature matched by `id`, which may be a wildcard
    /// pair.
    #[must_use]
    pub fn find(&self, id: Id) -> Option<Id> {
        if id.is_wildcard() {
            let relation = id.relation_index()?;
            let start = self
                .0
                .partition_point(|held| *held < Id::pair_range_start(relation));
            self.0
                .get(start)
                .copied()
                .filter(|candidate| id.matches(*candidate))
        } else {
            self.0.binary_search(&id).ok().map(|pos| self.0[pos])
        }
    }

    #[must_use]
    pub fn contains(&self, id: Id) -> bool {
        self.find(id).is_some()
    }

    /// All pairs of one relation.
    pub fn pairs_of(&self, relation_index: u32) -> impl Iterator<Item = Id> + '_ {
        let start = self
            .0
            .partition_point(|held| *held < Id::pair_range_start(relation_index));
        self.0[start..]
            .iter()
            .copied()
            .take_while(move |id| id.relation_index() == Some(relation_index))
    }

    #[must_use]
    pub fn ids(&self) -> &[Id] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = Id> + '_ {
        self.0.iter().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

impl FromIterator<Id> for Signature {
    fn from_iter<I: IntoIterator<Item = Id>>(iter: I) -> Self {
        Self::from_ids(iter)
    }
}
