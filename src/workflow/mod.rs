//! Dependency-ordered entity persistence.
//!
//! This module contains the workflow engine and its building blocks: entity kind tokens,
//! relation edges and their ordering, the run-scoped context holding lookups and built
//! entities, the typed steps the engine drives, and the report produced by a run.

pub mod context;
pub mod engine;
pub mod graph;
pub mod kind;
pub mod relation;
pub mod report;

mod scope;
mod step;


pub use context::{BuiltEntities, Lookup, WorkflowContext};
pub use engine::{Workflow, WorkflowOutcome};
pub use kind::{EntityKind, KindId};
pub use relation::RelationEdge;
pub use report::{BuildSummary, LookupSummary, PersistSummary, Phase, WorkflowReport};
