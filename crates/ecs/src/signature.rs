use serde::{Deserialize, Serialize};

use crate::component::ComponentKind;

/// Set of component kinds, one bit per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Signature(u64);

impl Signature {
    pub const EMPTY: Signature = Signature(0);

    pub fn of(kinds: &[ComponentKind]) -> Self {
        let mut signature = Self::EMPTY;
        for &kind in kinds {
            signature.insert(kind);
        }
        signature
    }

    pub fn insert(&mut self, kind: ComponentKind) {
        self.0 |= 1 << kind.index();
    }

    pub fn remove(&mut self, kind: ComponentKind) {
        self.0 &= !(1 << kind.index());
    }

    pub fn contains(self, kind: ComponentKind) -> bool {
        self.0 & (1 << kind.index()) != 0
    }

    /// Every kind in `other` is also in `self`.
    pub fn contains_all(self, other: Signature) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Signature) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn kinds(self) -> impl Iterator<Item = ComponentKind> {
        ComponentKind::ALL
            .into_iter()
            .filter(move |&kind| self.contains(kind))
    }
}

/// Membership predicate of a system, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SystemFilter {
    required: Signature,
    required_any: Signature,
    excluded: Signature,
}

impl SystemFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The entity must have all of `kinds`.
    pub fn requires(mut self, kinds: &[ComponentKind]) -> Self {
        for &kind in kinds {
            self.required.insert(kind);
        }
        self
    }

    /// The entity must have at least one of `kinds`.
    pub fn requires_any(mut self, kinds: &[ComponentKind]) -> Self {
        for &kind in kinds {
            self.required_any.insert(kind);
        }
        self
    }

    /// The entity must have none of `kinds`.
    pub fn excludes(mut self, kinds: &[ComponentKind]) -> Self {
        for &kind in kinds {
            self.excluded.insert(kind);
        }
        self
    }

    pub fn matches(&self, signature: Signature) -> bool {
        signature.contains_all(self.required)
            && (self.required_any.is_empty() || signature.intersects(self.required_any))
            && !signature.intersects(self.excluded)
    }
}
