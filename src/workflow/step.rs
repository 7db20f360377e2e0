//! Typed workflow steps behind object-safe traits.
//!
//! The engine keeps heterogeneous steps in plain vectors, so every step type erases its
//! entity and key types behind one of three traits: [`Prefetch`], [`Build`] and [`Persist`].
//! Store-facing steps return boxed futures borrowing the step, the transaction and the
//! context for the duration of the call.

use std::{
    any::Any,
    collections::{hash_map, HashMap, HashSet},
    fmt::Debug,
    hash::Hash,
    sync::Arc,
};

use dioxus_logger::tracing;
use futures::future::BoxFuture;
use sea_orm::{DatabaseTransaction, DbErr};

use crate::{
    config::DuplicateKeyPolicy,
    error::{BoxError, Error},
    workflow::{
        context::WorkflowContext,
        kind::KindId,
        report::{LookupSummary, Phase},
    },
};

pub(crate) type SourceKeyFn<S, K> = Arc<dyn Fn(&S) -> Option<K> + Send + Sync>;

type KeysFn<S, LK> = Box<dyn Fn(&[S]) -> HashSet<LK> + Send + Sync>;
type FetchFn<LK, T> = Box<
    dyn for<'c> Fn(&'c DatabaseTransaction, HashSet<LK>) -> BoxFuture<'c, Result<Vec<T>, DbErr>>
        + Send
        + Sync,
>;
type EntityKeyFn<LK, T> = Box<dyn Fn(&T) -> LK + Send + Sync>;
type BuilderFn<S, K, T> =
    Box<dyn Fn(&S, &WorkflowContext<S, K>) -> Result<Option<T>, BoxError> + Send + Sync>;
type SaveManyFn<T> = Box<
    dyn for<'c> Fn(&'c DatabaseTransaction, Vec<T>) -> BoxFuture<'c, Result<Vec<T>, DbErr>>
        + Send
        + Sync,
>;
type GeneratedIdFn<T, I> = Box<dyn Fn(&T) -> Option<I> + Send + Sync>;

pub(crate) trait Prefetch<S, K>: Send + Sync {
    fn name(&self) -> &str;

    /// Populate one lookup table. Returns `None` when no keys were requested, in which
    /// case the fetcher was not called and no table was created.
    fn run<'a>(
        &'a self,
        txn: &'a DatabaseTransaction,
        ctx: &'a mut WorkflowContext<S, K>,
        duplicates: DuplicateKeyPolicy,
    ) -> BoxFuture<'a, Result<Option<LookupSummary>, Error>>;
}

pub(crate) trait Build<S, K>: Send + Sync {
    fn kind(&self) -> KindId;

    /// Build entities for every record in order, returning how many were inserted.
    fn run(&self, ctx: &mut WorkflowContext<S, K>) -> Result<usize, Error>;
}

pub(crate) trait Persist<S, K>: Send + Sync {
    fn kind(&self) -> KindId;

    /// The concrete binding, so relation edges can recover the typed id getter.
    fn as_any(&self) -> &dyn Any;

    /// Save every entity built for this kind, returning how many were saved.
    fn run<'a>(
        &'a self,
        txn: &'a DatabaseTransaction,
        ctx: &'a mut WorkflowContext<S, K>,
    ) -> BoxFuture<'a, Result<usize, Error>>;
}

/// Batched find for one named lookup table.
pub(crate) struct LookupStep<S, LK, T> {
    name: String,
    keys: KeysFn<S, LK>,
    fetcher: FetchFn<LK, T>,
    entity_key: EntityKeyFn<LK, T>,
}

impl<S, LK, T> LookupStep<S, LK, T> {
    pub(crate) fn new(
        name: String,
        keys: impl Fn(&[S]) -> HashSet<LK> + Send + Sync + 'static,
        fetcher: impl for<'c> Fn(
                &'c DatabaseTransaction,
                HashSet<LK>,
            ) -> BoxFuture<'c, Result<Vec<T>, DbErr>>
            + Send
            + Sync
            + 'static,
        entity_key: impl Fn(&T) -> LK + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            keys: Box::new(keys),
            fetcher: Box::new(fetcher),
            entity_key: Box::new(entity_key),
        }
    }
}

impl<S, K, LK, T> Prefetch<S, K> for LookupStep<S, LK, T>
where
    S: Send + Sync + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    LK: Eq + Hash + Debug + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run<'a>(
        &'a self,
        txn: &'a DatabaseTransaction,
        ctx: &'a mut WorkflowContext<S, K>,
        duplicates: DuplicateKeyPolicy,
    ) -> BoxFuture<'a, Result<Option<LookupSummary>, Error>> {
        Box::pin(async move {
            let keys = (self.keys)(ctx.records());
            if keys.is_empty() {
                tracing::debug!("Lookup '{}' requested no keys, skipping fetch", self.name);
                return Ok(None);
            }

            let requested_keys = keys.len();
            let fetched = (self.fetcher)(txn, keys)
                .await
                .map_err(|e| {
                    Error::execution_failed(Phase::PreFetching, self.name.as_str(), e)
                })?;

            let mut table: HashMap<LK, T> = HashMap::with_capacity(fetched.len());
            for entity in fetched {
                match table.entry((self.entity_key)(&entity)) {
                    hash_map::Entry::Vacant(entry) => {
                        entry.insert(entity);
                    }
                    hash_map::Entry::Occupied(entry) => match duplicates {
                        DuplicateKeyPolicy::FirstWins => {
                            tracing::trace!(
                                "Lookup '{}' discarded a later entity for key {:?}",
                                self.name,
                                entry.key()
                            );
                        }
                        DuplicateKeyPolicy::Fail => {
                            return Err(Error::DuplicateKey {
                                step: self.name.clone(),
                                key: format!("{:?}", entry.key()),
                            });
                        }
                    },
                }
            }

            let entries = table.len();
            ctx.insert_lookup(&self.name, table);

            tracing::debug!(
                "Lookup '{}' fetched {} entities for {} keys",
                self.name,
                entries,
                requested_keys
            );

            Ok(Some(LookupSummary {
                name: self.name.clone(),
                requested_keys,
                entries,
            }))
        })
    }
}

/// In-memory construction of one entity kind from source records.
pub(crate) struct BuildStep<S, K, T> {
    kind: KindId,
    source_key: SourceKeyFn<S, K>,
    builder: BuilderFn<S, K, T>,
}

impl<S, K, T> BuildStep<S, K, T> {
    pub(crate) fn new(
        kind: KindId,
        source_key: SourceKeyFn<S, K>,
        builder: impl Fn(&S, &WorkflowContext<S, K>) -> Result<Option<T>, BoxError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            kind,
            source_key,
            builder: Box::new(builder),
        }
    }
}

impl<S, K, T> Build<S, K> for BuildStep<S, K, T>
where
    S: Send + Sync + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    fn kind(&self) -> KindId {
        self.kind
    }

    fn run(&self, ctx: &mut WorkflowContext<S, K>) -> Result<usize, Error> {
        // Created up front so a kind conflict surfaces even when nothing gets built
        ctx.slot_or_insert::<T>(self.kind)?;

        let records = ctx.shared_records();
        let mut inserted = 0;

        for record in records.iter() {
            let Some(key) = (self.source_key)(record) else {
                continue;
            };

            if ctx
                .slot::<T>(self.kind)?
                .is_some_and(|built| built.contains_key(&key))
            {
                continue;
            }

            let built = (self.builder)(record, &*ctx)
                .map_err(|e| Error::execution_failed(Phase::Building, self.kind.name(), e))?;

            // `None` means a pre-fetched entity already covers this record
            let Some(entity) = built else {
                continue;
            };

            if ctx.slot_or_insert::<T>(self.kind)?.insert(key, entity) {
                inserted += 1;
            }
        }

        tracing::debug!("Built {} {} entities", inserted, self.kind);

        Ok(inserted)
    }
}

/// Persistence binding for one entity kind.
pub(crate) struct PersistStep<T, I> {
    kind: KindId,
    save_many: SaveManyFn<T>,
    generated_id: GeneratedIdFn<T, I>,
}

impl<T, I> PersistStep<T, I> {
    pub(crate) fn new(
        kind: KindId,
        save_many: impl for<'c> Fn(
                &'c DatabaseTransaction,
                Vec<T>,
            ) -> BoxFuture<'c, Result<Vec<T>, DbErr>>
            + Send
            + Sync
            + 'static,
        generated_id: impl Fn(&T) -> Option<I> + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            save_many: Box::new(save_many),
            generated_id: Box::new(generated_id),
        }
    }

    /// Identifier the store generated for `entity`, if it has one
    pub(crate) fn generated_id(&self, entity: &T) -> Option<I> {
        (self.generated_id)(entity)
    }
}

impl<S, K, T, I> Persist<S, K> for PersistStep<T, I>
where
    S: Send + Sync + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
    I: Send + Sync + 'static,
{
    fn kind(&self) -> KindId {
        self.kind
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn run<'a>(
        &'a self,
        txn: &'a DatabaseTransaction,
        ctx: &'a mut WorkflowContext<S, K>,
    ) -> BoxFuture<'a, Result<usize, Error>> {
        Box::pin(async move {
            let entities = match ctx.slot_mut::<T>(self.kind)? {
                Some(built) if !built.is_empty() => built.take_entities(),
                _ => {
                    tracing::debug!("No {} entities to persist, skipping save", self.kind);
                    return Ok(0);
                }
            };

            let expected = entities.len();
            tracing::debug!("Persisting {} entities of type {}", expected, self.kind);

            let persisted = (self.save_many)(txn, entities)
                .await
                .map_err(|e| {
                    Error::execution_failed(Phase::Persisting(self.kind), self.kind.name(), e)
                })?;

            if persisted.len() != expected {
                return Err(Error::PersistedCountMismatch {
                    kind: self.kind,
                    expected,
                    actual: persisted.len(),
                });
            }

            if let Some(built) = ctx.slot_mut::<T>(self.kind)? {
                built.restore_entities(persisted);
            }

            tracing::debug!("Persisted {} entities of type {}", expected, self.kind);

            Ok(expected)
        })
    }
}
