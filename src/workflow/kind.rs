//! Entity kind tokens.
//!
//! An [`EntityKind`] names one class of constructed entity and carries, at the type
//! level, the entity type it builds and the identifier type the store generates for it.
//! The name ([`KindId`]) is what keys the built-entity registry, the relation graph and
//! the persistence bindings; the type parameters keep every typed access to those
//! registries honest.

use std::{fmt, marker::PhantomData};

use serde::Serialize;

/// Stable, hashable name of an entity kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct KindId(&'static str);

impl KindId {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for KindId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Typed token for an entity kind.
///
/// - `T`: the in-memory entity built for this kind (e.g. a sea-orm `ActiveModel`)
/// - `I`: the identifier the store generates for it on persistence
///
/// Tokens are usually declared once as constants:
///
/// ```ignore
/// const COUNTRY: EntityKind<country::ActiveModel, i32> = EntityKind::new("country");
/// ```
pub struct EntityKind<T, I = i64> {
    id: KindId,
    _marker: PhantomData<fn() -> (T, I)>,
}

impl<T, I> EntityKind<T, I> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            id: KindId::new(name),
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> KindId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.id.name()
    }
}

// Manual impls: derives would wrongly require `T: Clone` / `I: Clone`.
impl<T, I> Clone for EntityKind<T, I> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, I> Copy for EntityKind<T, I> {}

impl<T, I> fmt::Debug for EntityKind<T, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntityKind").field(&self.id.name()).finish()
    }
}

impl<T, I> From<EntityKind<T, I>> for KindId {
    fn from(kind: EntityKind<T, I>) -> Self {
        kind.id
    }
}
