//! Workflow declaration surface and staged execution.
//!
//! A [`Workflow`] is declared once by chaining `lookup`, `build`, `relate` and `persist`,
//! then run with one of the two terminal operations. Every run goes through the same
//! stages:
//!
//! 1. **Ordering**: the persisted kinds are sorted by their relations and relation
//!    children are checked for a source key extractor. Nothing has touched the store yet,
//!    so a cyclic or mis-declared workflow fails without side effects.
//! 2. **Pre-fetching**: lookup steps run in declaration order, one batched fetch each.
//! 3. **Building**: build steps run in declaration order over the source records.
//! 4. **Persisting**: for each kind in persist order, parent identifiers are backfilled
//!    into its entities, then the kind is saved.
//!
//! # Example
//!
//! ```ignore
//! const COUNTRY: EntityKind<country::ActiveModel, i32> = EntityKind::new("country");
//! const RECEIVER: EntityKind<receiver::ActiveModel, i32> = EntityKind::new("receiver");
//!
//! let outcome = Workflow::new(records)
//!     .build(COUNTRY, |r: &StationRecord| Some(r.country.clone()), |r, _| {
//!         Ok(Some(country::ActiveModel { name: Set(r.country.clone()), ..Default::default() }))
//!     })
//!     .build(RECEIVER, |r| Some(r.receiver.clone()), |r, _| {
//!         Ok(Some(receiver::ActiveModel { code: Set(r.receiver.clone()), ..Default::default() }))
//!     })
//!     .relate(RECEIVER, |m, id| m.country_id = Set(Some(id)), COUNTRY, |r| Some(r.country.clone()), "receiver_country")
//!     .persist(
//!         COUNTRY,
//!         |txn, models| Box::pin(async move { CountryRepository::new(txn).insert_many(models).await }),
//!         |m| m.id.try_as_ref().copied(),
//!     )
//!     .persist(
//!         RECEIVER,
//!         |txn, models| Box::pin(async move { ReceiverRepository::new(txn).insert_many(models).await }),
//!         |m| m.id.try_as_ref().copied(),
//!     )
//!     .execute(&db)
//!     .await?;
//! ```

use std::{
    collections::{HashMap, HashSet},
    fmt::Debug,
    hash::Hash,
    sync::Arc,
};

use chrono::Utc;
use dioxus_logger::tracing;
use futures::future::BoxFuture;
use sea_orm::{DatabaseTransaction, DbErr, TransactionTrait};

use crate::{
    config::{DuplicateKeyPolicy, UnresolvedParentPolicy, WorkflowConfig},
    error::{BoxError, Error},
    workflow::{
        context::WorkflowContext,
        graph,
        kind::{EntityKind, KindId},
        relation::RelationEdge,
        report::{BuildSummary, Phase, PersistSummary, WorkflowReport},
        scope::{Scope, StepTxn},
        step::{Build, BuildStep, LookupStep, Persist, PersistStep, Prefetch, SourceKeyFn},
    },
};

/// Result of a successful run.
pub struct WorkflowOutcome<S, K = String> {
    pub report: WorkflowReport,
    /// Final run state; the registry holds the entities as returned by persistence.
    pub context: WorkflowContext<S, K>,
}

/// Declared workflow over source records of type `S`, deduplicated by source keys of
/// type `K`.
pub struct Workflow<S, K = String> {
    records: Arc<[S]>,
    config: WorkflowConfig,
    prefetches: Vec<Box<dyn Prefetch<S, K>>>,
    builds: Vec<Box<dyn Build<S, K>>>,
    source_keys: HashMap<KindId, SourceKeyFn<S, K>>,
    relations: Vec<RelationEdge<S, K>>,
    bindings: Vec<Box<dyn Persist<S, K>>>,
}

impl<S, K> Workflow<S, K>
where
    S: Send + Sync + 'static,
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    pub fn new(records: impl Into<Arc<[S]>>) -> Self {
        Self {
            records: records.into(),
            config: WorkflowConfig::default(),
            prefetches: Vec::new(),
            builds: Vec::new(),
            source_keys: HashMap::new(),
            relations: Vec::new(),
            bindings: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn records(&self) -> &[S] {
        &self.records
    }

    /// Declare a pre-fetch step populating the lookup table `name`.
    ///
    /// At run time `keys` collects the distinct keys needed by all records. If it yields
    /// none, `fetcher` is not called and no table is created. Otherwise `fetcher` is
    /// called once with every key and its results are indexed by `entity_key`.
    ///
    /// Builders read the table through [`WorkflowContext::lookup`] with the same `LK` and
    /// `T`; reading it with other types fails the run with [`Error::LookupConflict`].
    pub fn lookup<LK, T>(
        mut self,
        name: impl Into<String>,
        keys: impl Fn(&[S]) -> HashSet<LK> + Send + Sync + 'static,
        fetcher: impl for<'c> Fn(
                &'c DatabaseTransaction,
                HashSet<LK>,
            ) -> BoxFuture<'c, Result<Vec<T>, DbErr>>
            + Send
            + Sync
            + 'static,
        entity_key: impl Fn(&T) -> LK + Send + Sync + 'static,
    ) -> Self
    where
        LK: Eq + Hash + Debug + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.prefetches.push(Box::new(LookupStep::new(
            name.into(),
            keys,
            fetcher,
            entity_key,
        )));
        self
    }

    /// Declare a build step for `kind`.
    ///
    /// `source_key` becomes the kind's canonical key function, replacing any registered
    /// by an earlier build step for the same kind. Records with no key, or whose key
    /// already has an entity of this kind, are skipped. `builder` returning `Ok(None)`
    /// registers nothing for that key.
    pub fn build<T, I>(
        mut self,
        kind: EntityKind<T, I>,
        source_key: impl Fn(&S) -> Option<K> + Send + Sync + 'static,
        builder: impl Fn(&S, &WorkflowContext<S, K>) -> Result<Option<T>, BoxError>
            + Send
            + Sync
            + 'static,
    ) -> Self
    where
        T: Send + Sync + 'static,
    {
        let source_key: SourceKeyFn<S, K> = Arc::new(source_key);
        self.source_keys.insert(kind.id(), Arc::clone(&source_key));
        self.builds
            .push(Box::new(BuildStep::new(kind.id(), source_key, builder)));
        self
    }

    /// Declare that entities of `child` need the identifier generated for `parent`.
    ///
    /// `parent_key` extracts the parent's source key from the record that produced a
    /// child entity; `id_setter` writes the parent's identifier into that child.
    pub fn relate<C, CI, P, I>(
        mut self,
        child: EntityKind<C, CI>,
        id_setter: impl Fn(&mut C, I) + Send + Sync + 'static,
        parent: EntityKind<P, I>,
        parent_key: impl Fn(&S) -> Option<K> + Send + Sync + 'static,
        name: impl Into<String>,
    ) -> Self
    where
        C: Send + Sync + 'static,
        P: Send + Sync + 'static,
        I: Send + Sync + 'static,
    {
        self.relations.push(RelationEdge::new(
            child, id_setter, parent, parent_key, name,
        ));
        self
    }

    /// Declare how `kind` is saved and how its generated identifier is read back.
    ///
    /// Only kinds declared here are ordered and persisted. `save_many` receives every
    /// entity built for the kind in build order and must return the saved entities in the
    /// same order. Declaring a kind twice replaces the earlier binding.
    pub fn persist<T, I>(
        mut self,
        kind: EntityKind<T, I>,
        save_many: impl for<'c> Fn(
                &'c DatabaseTransaction,
                Vec<T>,
            ) -> BoxFuture<'c, Result<Vec<T>, DbErr>>
            + Send
            + Sync
            + 'static,
        generated_id: impl Fn(&T) -> Option<I> + Send + Sync + 'static,
    ) -> Self
    where
        T: Send + Sync + 'static,
        I: Send + Sync + 'static,
    {
        let binding: Box<dyn Persist<S, K>> =
            Box::new(PersistStep::new(kind.id(), save_many, generated_id));

        match self.bindings.iter().position(|b| b.kind() == kind.id()) {
            Some(index) => self.bindings[index] = binding,
            None => self.bindings.push(binding),
        }
        self
    }

    pub fn relations(&self) -> &[RelationEdge<S, K>] {
        &self.relations
    }

    /// Order in which the persisted kinds will be saved.
    ///
    /// Also checks that every relation child has a source key extractor, so a workflow
    /// that passes this check can only fail at run time through its callables or
    /// policies.
    pub fn persist_order(&self) -> Result<Vec<KindId>, Error> {
        let bound: Vec<KindId> = self.bindings.iter().map(|b| b.kind()).collect();
        let order = graph::sort(&bound, &self.relations)?;

        if let Some(relation) = self
            .relations
            .iter()
            .find(|r| !self.source_keys.contains_key(&r.child()))
        {
            return Err(Error::MissingSourceKeyExtractor {
                kind: relation.child(),
                relation: relation.name().to_string(),
            });
        }

        Ok(order)
    }

    /// Run the workflow inside one transaction begun on `db`.
    ///
    /// The transaction is committed when every stage succeeds and rolled back otherwise,
    /// so a failed run leaves no writes behind.
    ///
    /// `db` is usually a `DatabaseConnection`. Passing an enclosing `DatabaseTransaction`
    /// nests the run inside the caller's scope: the run commits into it, and rolling the
    /// outer transaction back undoes the run.
    pub async fn execute<D>(&self, db: &D) -> Result<WorkflowOutcome<S, K>, Error>
    where
        D: TransactionTrait<Transaction = DatabaseTransaction>,
    {
        let order = self.plan()?;

        tracing::info!(
            "Executing workflow within a transaction for {} records",
            self.records.len()
        );

        let txn = match db.begin().await {
            Ok(txn) => txn,
            Err(e) => {
                let err = Error::execution_failed(Phase::Opening, "begin transaction", e);
                tracing::error!("{}", err);
                return Err(err);
            }
        };

        let result = self.run(Scope::<D>::Shared(&txn), order, true).await;
        let result = StepTxn::Owned(txn)
            .finish(result, Phase::Committing, "commit transaction")
            .await;

        self.complete(result)
    }

    /// Run the workflow with every store step in its own transaction.
    ///
    /// Each pre-fetch and each kind's persistence commits as soon as it succeeds. If a
    /// later kind fails, kinds persisted before it stay committed.
    pub async fn execute_without_transaction<D>(
        &self,
        db: &D,
    ) -> Result<WorkflowOutcome<S, K>, Error>
    where
        D: TransactionTrait<Transaction = DatabaseTransaction>,
    {
        let order = self.plan()?;

        tracing::info!(
            "Executing workflow without a transaction for {} records",
            self.records.len()
        );

        let result = self.run(Scope::PerStep(db), order, false).await;

        self.complete(result)
    }

    fn plan(&self) -> Result<Vec<KindId>, Error> {
        self.persist_order().inspect_err(|e| {
            tracing::error!("Workflow failed while {}: {}", Phase::Ordering, e);
        })
    }

    fn complete(
        &self,
        result: Result<WorkflowOutcome<S, K>, Error>,
    ) -> Result<WorkflowOutcome<S, K>, Error> {
        match result {
            Ok(mut outcome) => {
                outcome.report.finished_at = Utc::now();
                tracing::info!(
                    "Workflow finished: persisted {} entities across {:?}, backfilled {} ids",
                    outcome.report.total_persisted(),
                    outcome
                        .report
                        .persist_order
                        .iter()
                        .map(KindId::name)
                        .collect::<Vec<_>>(),
                    outcome.report.total_backfilled()
                );
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!("Workflow failed: {}", e);
                Err(e)
            }
        }
    }

    async fn run<D>(
        &self,
        scope: Scope<'_, D>,
        order: Vec<KindId>,
        transactional: bool,
    ) -> Result<WorkflowOutcome<S, K>, Error>
    where
        D: TransactionTrait<Transaction = DatabaseTransaction>,
    {
        let mut ctx = WorkflowContext::new(Arc::clone(&self.records));
        let mut report = WorkflowReport::new(transactional, order.clone());

        tracing::debug!("Running {} pre-fetch steps", self.prefetches.len());
        for step in &self.prefetches {
            let txn = scope.begin(Phase::PreFetching, step.name()).await?;
            let result = step
                .run(txn.as_ref(), &mut ctx, self.config.duplicate_keys)
                .await;
            let summary = txn.finish(result, Phase::PreFetching, step.name()).await?;
            report.lookups.extend(summary);
        }

        tracing::debug!("Running {} build steps", self.builds.len());
        for step in &self.builds {
            step.run(&mut ctx)?;
        }
        for step in &self.builds {
            let kind = step.kind();
            if report.builds.iter().all(|b| b.kind != kind) {
                report.builds.push(BuildSummary {
                    kind,
                    built: ctx.built_count(kind),
                });
            }
        }

        tracing::debug!(
            "Executing persistence steps in order: {:?}",
            order.iter().map(KindId::name).collect::<Vec<_>>()
        );
        let mut persisted: Vec<KindId> = Vec::with_capacity(order.len());
        for kind in order {
            let Some(binding) = self.binding(kind) else {
                continue;
            };
            let phase = Phase::Persisting(kind);

            let backfilled = self.backfill(kind, &mut ctx, &persisted)?;

            let txn = scope.begin(phase, kind.name()).await?;
            let result = binding.run(txn.as_ref(), &mut ctx).await;
            let count = txn.finish(result, phase, kind.name()).await?;

            persisted.push(kind);
            report.persisted.push(PersistSummary {
                kind,
                backfilled,
                persisted: count,
            });
        }

        Ok(WorkflowOutcome {
            report,
            context: ctx,
        })
    }

    fn binding(&self, kind: KindId) -> Option<&dyn Persist<S, K>> {
        self.bindings
            .iter()
            .find(|b| b.kind() == kind)
            .map(|b| b.as_ref())
    }

    /// Write parent identifiers into the entities of `kind` for every relation naming it
    /// as the child. `persisted` lists the kinds already saved in this run.
    fn backfill(
        &self,
        kind: KindId,
        ctx: &mut WorkflowContext<S, K>,
        persisted: &[KindId],
    ) -> Result<usize, Error> {
        let relations: Vec<&RelationEdge<S, K>> =
            self.relations.iter().filter(|r| r.child() == kind).collect();
        if relations.is_empty() || ctx.built_count(kind) == 0 {
            return Ok(0);
        }

        let Some(source_key) = self.source_keys.get(&kind) else {
            return Err(Error::MissingSourceKeyExtractor {
                kind,
                relation: relations[0].name().to_string(),
            });
        };

        let records = ctx.shared_records();
        let by_key = self.records_by_key(kind, source_key, &records, &relations)?;

        let mut backfilled = 0;
        for relation in relations {
            let parent = relation.parent();
            let binding = match self.binding(parent) {
                Some(binding) if persisted.contains(&parent) => binding,
                _ => match self.config.unresolved_parents {
                    UnresolvedParentPolicy::Skip => {
                        tracing::debug!(
                            "Skipping relation '{}': {} is not persisted before {}",
                            relation.name(),
                            parent,
                            kind
                        );
                        continue;
                    }
                    UnresolvedParentPolicy::Fail => {
                        return Err(Error::UnresolvedParent {
                            relation: relation.name().to_string(),
                            child: kind,
                            parent,
                        });
                    }
                },
            };

            backfilled += relation.backfill(ctx, binding.as_any(), &by_key)?;
        }

        tracing::debug!("Backfilled {} parent ids into {} entities", backfilled, kind);

        Ok(backfilled)
    }

    /// Map each source key of `kind` to the first record carrying it.
    ///
    /// Records sharing a key normally describe the same entity. Under
    /// `DuplicateKeyPolicy::Fail`, records sharing a key but referencing different
    /// parents through any of `relations` are rejected instead of resolved to the first.
    fn records_by_key<'r>(
        &self,
        kind: KindId,
        source_key: &SourceKeyFn<S, K>,
        records: &'r [S],
        relations: &[&RelationEdge<S, K>],
    ) -> Result<HashMap<K, &'r S>, Error> {
        let mut by_key: HashMap<K, &'r S> = HashMap::with_capacity(records.len());

        for record in records {
            let Some(key) = source_key(record) else {
                continue;
            };

            let Some(first) = by_key.get(&key).copied() else {
                by_key.insert(key, record);
                continue;
            };

            if self.config.duplicate_keys == DuplicateKeyPolicy::Fail {
                if let Some(relation) = relations
                    .iter()
                    .find(|r| r.parent_key(first) != r.parent_key(record))
                {
                    return Err(Error::DuplicateKey {
                        step: format!("{} via relation '{}'", kind, relation.name()),
                        key: format!("{:?}", key),
                    });
                }
            }
        }

        Ok(by_key)
    }
}
