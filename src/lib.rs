//! Dependency-ordered persistence of entity graphs built from flat input records.
//!
//! Declare a [`Workflow`] over a batch of source records: batched lookups of existing
//! entities, build steps turning records into entities (one per distinct source key),
//! relations stating which kinds need which parent's generated identifier, and a
//! persistence binding per stored kind. Running the workflow persists kinds parent-first
//! and backfills each parent's generated identifier into its children before the
//! children are saved.

pub mod config;
pub mod error;
pub mod workflow;

pub use config::{DuplicateKeyPolicy, UnresolvedParentPolicy, WorkflowConfig};
pub use error::{BoxError, Error};
pub use workflow::{
    BuiltEntities, EntityKind, KindId, Lookup, Phase, Workflow, WorkflowContext, WorkflowOutcome,
    WorkflowReport,
};
