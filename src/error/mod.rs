//! Error types for the workflow engine.
//!
//! A single [`Error`] enum covers everything a run can fail with. Failures raised by
//! caller-supplied callables (fetchers, builders, savers) and by the backing store's
//! transaction handling are wrapped in [`Error::ExecutionFailed`], which keeps the
//! original cause reachable through [`std::error::Error::source`]. The remaining variants
//! describe problems with the workflow declaration itself or with a configured policy.

pub mod config;

use thiserror::Error;

use crate::{
    error::config::ConfigError,
    workflow::{kind::KindId, report::Phase},
};

/// Boxed error produced by caller-supplied callables.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Every way a workflow declaration or run can fail.
///
/// Callers normally match on the variant to tell a broken declaration apart from a failure
/// in the store or in their own callables; the latter always arrives as `ExecutionFailed`
/// with the original cause attached.
///
/// # Error Categories
/// - Configuration errors (invalid policy environment variables)
/// - Declaration errors (cyclic relations, relation child without a build step, one kind
///   or lookup name used with two types)
/// - Execution errors (fetcher, builder, saver or transaction failures)
/// - Policy errors (duplicate keys, unresolved parents, savers dropping entities)
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (invalid environment variable value).
    #[error(transparent)]
    ConfigError(#[from] ConfigError),
    /// The persisted kinds cannot be ordered; `unresolved` lists the kinds left over
    /// once every orderable kind was removed.
    #[error("Cyclic dependency detected between entity kinds: {}", join_kinds(.unresolved))]
    CyclicDependency { unresolved: Vec<KindId> },
    /// A relation names a child kind that was never declared with `build()`, so there is
    /// no way to correlate its entities with their source records.
    #[error(
        "No source key extractor registered for entity kind {kind}, required by relation '{relation}'. \
        Declare the kind with build() before relating it as a child"
    )]
    MissingSourceKeyExtractor { kind: KindId, relation: String },
    /// A caller-supplied callable or a transaction operation failed during a run.
    #[error("Workflow execution failed while {phase} ({step}): {source}")]
    ExecutionFailed {
        phase: Phase,
        step: String,
        #[source]
        source: BoxError,
    },
    /// Two entries share a key under `DuplicateKeyPolicy::Fail`.
    #[error("Duplicate key {key} in {step}")]
    DuplicateKey { step: String, key: String },
    /// A relation's parent kind cannot supply identifiers under
    /// `UnresolvedParentPolicy::Fail`.
    #[error(
        "Relation '{relation}' cannot backfill {child}: parent kind {parent} is not persisted before it"
    )]
    UnresolvedParent {
        relation: String,
        child: KindId,
        parent: KindId,
    },
    /// A persistence binding returned a different number of entities than it was given.
    #[error("Persistence of {kind} returned {actual} entities for {expected} inputs")]
    PersistedCountMismatch {
        kind: KindId,
        expected: usize,
        actual: usize,
    },
    /// One kind name was declared with two different entity or identifier types.
    #[error("Entity kind {kind} is declared with conflicting entity types")]
    KindConflict { kind: KindId },
    /// A lookup table was read with key or entity types other than those it was
    /// populated with.
    #[error("Lookup '{name}' was read with types that differ from the ones it was populated with")]
    LookupConflict { name: String },
}

impl Error {
    pub(crate) fn execution_failed(
        phase: Phase,
        step: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::ExecutionFailed {
            phase,
            step: step.into(),
            source: source.into(),
        }
    }
}

fn join_kinds(kinds: &[KindId]) -> String {
    kinds
        .iter()
        .map(KindId::name)
        .collect::<Vec<_>>()
        .join(", ")
}
