//! Run-scoped workflow state.
//!
//! A [`WorkflowContext`] is created fresh for every run and holds:
//! - the source records, shared and immutable for the whole run
//! - lookup tables populated by pre-fetch steps, read-only afterwards
//! - the built-entity registry: per entity kind, an insertion-ordered map from source
//!   key to the entity built for it
//!
//! Registry and lookup storage is type-erased so that one context can hold any number of
//! entity types. Typed access always goes through an [`EntityKind`] token, which makes the
//! downcast a checked formality; the only way for it to fail is declaring two entity types
//! under one kind name, which is reported as [`Error::KindConflict`]. Lookup tables are
//! typed by whoever reads them, and a read with the wrong types is reported as
//! [`Error::LookupConflict`].
//!
//! The context is `Send + Sync`. Readers may share `&WorkflowContext` freely across threads,
//! while insertion requires `&mut WorkflowContext`, so concurrent population is serialized
//! by the borrow checker rather than by locks.

use std::{
    any::Any,
    collections::{hash_map, HashMap},
    hash::Hash,
    marker::PhantomData,
    sync::Arc,
};

use crate::{
    error::Error,
    workflow::kind::{EntityKind, KindId},
};

/// Insertion-ordered map from source key to built entity.
///
/// Holds at most one entity per key; the first insert for a key wins.
#[derive(Debug, Clone)]
pub struct BuiltEntities<K, T> {
    index: HashMap<K, usize>,
    keys: Vec<K>,
    entities: Vec<T>,
}

impl<K, T> Default for BuiltEntities<K, T> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            keys: Vec::new(),
            entities: Vec::new(),
        }
    }
}

impl<K, T> BuiltEntities<K, T>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &K) -> Option<&T> {
        self.index.get(key).map(|&i| &self.entities[i])
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut T> {
        match self.index.get(key) {
            Some(&i) => Some(&mut self.entities[i]),
            None => None,
        }
    }

    /// Insert an entity for `key` unless one already exists.
    ///
    /// Returns `false` and drops `entity` if the key is already present.
    pub fn insert(&mut self, key: K, entity: T) -> bool {
        match self.index.entry(key) {
            hash_map::Entry::Occupied(_) => false,
            hash_map::Entry::Vacant(entry) => {
                self.keys.push(entry.key().clone());
                entry.insert(self.entities.len());
                self.entities.push(entity);
                true
            }
        }
    }

    /// Keys in insertion order
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Entities in insertion order
    pub fn entities(&self) -> &[T] {
        &self.entities
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &T)> {
        self.keys.iter().zip(self.entities.iter())
    }

    pub fn into_entities(self) -> Vec<T> {
        self.entities
    }

    /// Move the entities out for persistence, leaving the key index in place.
    pub(crate) fn take_entities(&mut self) -> Vec<T> {
        std::mem::take(&mut self.entities)
    }

    /// Put back entities returned by persistence. The caller guarantees they line up
    /// one-to-one with the keys taken out by [`Self::take_entities`].
    pub(crate) fn restore_entities(&mut self, entities: Vec<T>) {
        debug_assert_eq!(entities.len(), self.keys.len());
        self.entities = entities;
    }
}

/// Read-only view of a lookup table.
///
/// A table that was never populated and a table that was populated with no entries look
/// identical through this view.
#[derive(Debug)]
pub struct Lookup<'a, LK, T> {
    table: Option<&'a HashMap<LK, T>>,
}

impl<'a, LK, T> Clone for Lookup<'a, LK, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, LK, T> Copy for Lookup<'a, LK, T> {}

impl<'a, LK, T> Lookup<'a, LK, T>
where
    LK: Eq + Hash,
{
    pub fn get(&self, key: &LK) -> Option<&'a T> {
        self.table.and_then(|table| table.get(key))
    }

    pub fn contains_key(&self, key: &LK) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.table.map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a LK, &'a T)> {
        self.table.into_iter().flat_map(|table| table.iter())
    }
}

/// Object-safe handle on a registry slot, so the context can report sizes without
/// knowing entity types.
trait Slot: Send + Sync {
    fn len(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<K, T> Slot for BuiltEntities<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    fn len(&self) -> usize {
        BuiltEntities::len(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// State shared by every step of one workflow run.
pub struct WorkflowContext<S, K> {
    records: Arc<[S]>,
    lookups: HashMap<String, Box<dyn Any + Send + Sync>>,
    registry: HashMap<KindId, Box<dyn Slot>>,
    _key: PhantomData<fn() -> K>,
}

impl<S, K> WorkflowContext<S, K>
where
    S: Send + Sync + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn new(records: impl Into<Arc<[S]>>) -> Self {
        Self {
            records: records.into(),
            lookups: HashMap::new(),
            registry: HashMap::new(),
            _key: PhantomData,
        }
    }

    /// Source records in their original order
    pub fn records(&self) -> &[S] {
        &self.records
    }

    pub(crate) fn shared_records(&self) -> Arc<[S]> {
        Arc::clone(&self.records)
    }

    /// Get the lookup table named `name`.
    ///
    /// Returns an empty view if the table was never populated. Reading a populated table
    /// with key or entity types other than those it was populated with fails with
    /// [`Error::LookupConflict`], since treating it as empty would make builders recreate
    /// entities the store already holds.
    pub fn lookup<LK, T>(&self, name: &str) -> Result<Lookup<'_, LK, T>, Error>
    where
        LK: Eq + Hash + 'static,
        T: 'static,
    {
        let table = match self.lookups.get(name) {
            None => None,
            Some(table) => Some(table.downcast_ref::<HashMap<LK, T>>().ok_or_else(|| {
                Error::LookupConflict {
                    name: name.to_string(),
                }
            })?),
        };

        Ok(Lookup { table })
    }

    /// Whether a lookup table named `name` was populated during pre-fetch
    pub fn has_lookup(&self, name: &str) -> bool {
        self.lookups.contains_key(name)
    }

    pub(crate) fn insert_lookup<LK, T>(&mut self, name: &str, table: HashMap<LK, T>)
    where
        LK: Eq + Hash + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.lookups.insert(name.to_string(), Box::new(table));
    }

    /// Entities built for `kind`, or `None` if no build step for it has run.
    pub fn built<T, I>(&self, kind: EntityKind<T, I>) -> Option<&BuiltEntities<K, T>>
    where
        T: Send + Sync + 'static,
    {
        self.slot(kind.id()).ok().flatten()
    }

    /// Entity built for `kind` from records carrying source key `key`
    pub fn entity<T, I>(&self, kind: EntityKind<T, I>, key: &K) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.built(kind).and_then(|built| built.get(key))
    }

    /// Number of entities built for `kind`
    pub fn built_count(&self, kind: impl Into<KindId>) -> usize {
        self.registry.get(&kind.into()).map_or(0, |slot| slot.len())
    }

    /// Kinds that have a registry slot, in no particular order
    pub fn built_kinds(&self) -> impl Iterator<Item = KindId> + '_ {
        self.registry.keys().copied()
    }

    /// Take ownership of the entities built for `kind`, in build order.
    pub fn take_built<T, I>(&mut self, kind: EntityKind<T, I>) -> Option<BuiltEntities<K, T>>
    where
        T: Send + Sync + 'static,
    {
        if !matches!(self.slot::<T>(kind.id()), Ok(Some(_))) {
            return None;
        }

        let slot = self.registry.remove(&kind.id())?;
        slot.into_any()
            .downcast::<BuiltEntities<K, T>>()
            .ok()
            .map(|built| *built)
    }

    pub(crate) fn slot<T>(&self, kind: KindId) -> Result<Option<&BuiltEntities<K, T>>, Error>
    where
        T: Send + Sync + 'static,
    {
        match self.registry.get(&kind) {
            None => Ok(None),
            Some(slot) => slot
                .as_any()
                .downcast_ref::<BuiltEntities<K, T>>()
                .map(Some)
                .ok_or(Error::KindConflict { kind }),
        }
    }

    pub(crate) fn slot_mut<T>(
        &mut self,
        kind: KindId,
    ) -> Result<Option<&mut BuiltEntities<K, T>>, Error>
    where
        T: Send + Sync + 'static,
    {
        match self.registry.get_mut(&kind) {
            None => Ok(None),
            Some(slot) => slot
                .as_any_mut()
                .downcast_mut::<BuiltEntities<K, T>>()
                .map(Some)
                .ok_or(Error::KindConflict { kind }),
        }
    }

    pub(crate) fn slot_or_insert<T>(
        &mut self,
        kind: KindId,
    ) -> Result<&mut BuiltEntities<K, T>, Error>
    where
        T: Send + Sync + 'static,
    {
        self.registry
            .entry(kind)
            .or_insert_with(|| Box::new(BuiltEntities::<K, T>::new()))
            .as_any_mut()
            .downcast_mut::<BuiltEntities<K, T>>()
            .ok_or(Error::KindConflict { kind })
    }
}
