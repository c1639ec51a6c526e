//! Signature element ids.
//!
//! Everything a signature can hold is an [`Id`]: a component or tag (an
//! entity handle) or a relationship pair. Pairs set the top bit and pack the
//! relation's slot index above the target's slot index:
//!
//! ```text
//! plain: 0 | generation:31 | index:32
//! pair:  1 | relation:31   | target:32
//! ```
//!
//! Because pairs store slot indices, a pair naming a recycled target slot
//! addresses whichever entity currently lives there.

use std::fmt;

use crate::entity::{Entity, Generation};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(u64);

impl Id {
    const PAIR_FLAG: u64 = 1 << 63;
    const RELATION_MASK: u64 = 0x7FFF_FFFF;

    /// Target index that matches any target.
    pub const WILDCARD: u32 = u32::MAX;

    /// Id of a component or tag entity.
    #[must_use]
    pub const fn entity(entity: Entity) -> Self {
        Self(entity.to_bits())
    }

    /// Id of the pair `(relation, target)`.
    #[must_use]
    pub const fn pair(relation: Entity, target: Entity) -> Self {
        Self::pair_raw(relation.index(), target.index())
    }

    /// Pair matching `(relation, *)`.
    #[must_use]
    pub const fn pair_wildcard(relation: Entity) -> Self {
        Self::pair_raw(relation.index(), Self::WILDCARD)
    }

    #[must_use]
    pub const fn pair_raw(relation_index: u32, target_index: u32) -> Self {
        Self(
            Self::PAIR_FLAG
                | ((relation_index as u64 & Self::RELATION_MASK) << 32)
                | target_index as u64,
        )
    }

    #[must_use]
    pub const fn is_pair(self) -> bool {
        self.0 & Self::PAIR_FLAG != 0
    }

    #[must_use]
    pub const fn is_wildcard(self) -> bool {
        self.is_pair() && self.0 as u32 == Self::WILDCARD
    }

    /// Slot index of the relation, for pairs.
    #[must_use]
    pub const fn relation_index(self) -> Option<u32> {
        if self.is_pair() {
            Some(((self.0 >> 32) & Self::RELATION_MASK) as u32)
        } else {
            None
        }
    }

    /// Slot index of the target, for pairs.
    #[must_use]
    pub const fn target_index(self) -> Option<u32> {
        if self.is_pair() {
            Some(self.0 as u32)
        } else {
            None
        }
    }

    /// The component or tag entity, for non-pair ids.
    #[must_use]
    pub const fn as_entity(self) -> Option<Entity> {
        if self.is_pair() {
            None
        } else {
            Some(Entity::from_bits(self.0))
        }
    }

    /// Check if this id matches a concrete id, treating a wildcard target as
    /// "any target of the same relation".
    #[must_use]
    pub const fn matches(self, concrete: Id) -> bool {
        if self.0 == concrete.0 {
            return true;
        }
        if !self.is_wildcard() || !concrete.is_pair() {
            return false;
        }
        (self.0 >> 32) == (concrete.0 >> 32)
    }

    /// Lowest possible pair id for a relation, used for range scans.
    pub(crate) const fn pair_range_start(relation_index: u32) -> Self {
        Self::pair_raw(relation_index, 0)
    }

    #[must_use]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }
}

impl From<Entity> for Id {
    fn from(entity: Entity) -> Self {
        Self::entity(entity)
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.relation_index(), self.target_index()) {
            (Some(relation), Some(Self::WILDCARD)) => write!(f, "Id({relation}, *)"),
            (Some(relation), Some(target)) => write!(f, "Id({relation}, {target})"),
            _ => {
                let entity = Entity::from_bits(self.0);
                if entity.generation() == Generation::new() {
                    write!(f, "Id({})", entity.index())
                } else {
                    write!(f, "Id({entity})")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(index: u32) -> Entity {
        Entity::new(index, Generation::new())
    }

    #[test]
    fn test_pair_parts() {
        let id = Id::pair(e(7), e(42));
        assert!(id.is_pair());
        assert!(!id.is_wildcard());
        assert_eq!(id.relation_index(), Some(7));
        assert_eq!(id.target_index(), Some(42));
        assert_eq!(id.as_entity(), None);
    }

    #[test]
    fn test_plain_id_keeps_generation() {
        let recycled = Entity::new(5, Generation::new().next());
        let id = Id::entity(recycled);
        assert!(!id.is_pair());
        assert_eq!(id.as_entity(), Some(recycled));
        assert_ne!(id, Id::entity(e(5)));
    }

    #[test]
    fn test_pairs_sort_after_plain_ids_and_group_by_relation() {
        let plain = Id::entity(Entity::new(u32::MAX - 1, Generation::new().next()));
        let a = Id::pair(e(3), e(100));
        let b = Id::pair(e(4), e(1));
        assert!(plain < a);
        assert!(a < b);
        assert!(Id::pair_range_start(3) <= a);
    }

    #[test]
    fn test_wildcard_matching() {
        let wildcard = Id::pair_wildcard(e(3));
        assert!(wildcard.is_wildcard());
        assert!(wildcard.matches(Id::pair(e(3), e(9))));
        assert!(!wildcard.matches(Id::pair(e(4), e(9))));
        assert!(!wildcard.matches(Id::entity(e(3))));
        assert!(!Id::pair(e(3), e(9)).matches(Id::pair(e(3), e(10))));
    }
}
