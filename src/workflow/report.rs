use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::workflow::kind::KindId;

/// Stage of a workflow run, as carried by [`Error::ExecutionFailed`](crate::Error).
///
/// Runs move strictly forward through these stages. `Opening` and `Committing` only
/// occur in transactional mode, around the run's single transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Ordering,
    Opening,
    PreFetching,
    Building,
    Persisting(KindId),
    Committing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ordering => f.write_str("ordering"),
            Self::Opening => f.write_str("opening the transaction"),
            Self::PreFetching => f.write_str("pre-fetching"),
            Self::Building => f.write_str("building"),
            Self::Persisting(kind) => write!(f, "persisting {}", kind),
            Self::Committing => f.write_str("committing the transaction"),
        }
    }
}

/// Size of one populated lookup table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupSummary {
    pub name: String,
    pub requested_keys: usize,
    pub entries: usize,
}

/// Number of entities built for one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildSummary {
    pub kind: KindId,
    pub built: usize,
}

/// Outcome of persisting one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistSummary {
    pub kind: KindId,
    /// Identifiers written into entities of this kind before it was saved
    pub backfilled: usize,
    pub persisted: usize,
}

/// Summary of a completed workflow run
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    pub transactional: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub persist_order: Vec<KindId>,
    pub lookups: Vec<LookupSummary>,
    pub builds: Vec<BuildSummary>,
    pub persisted: Vec<PersistSummary>,
}

impl WorkflowReport {
    pub(crate) fn new(transactional: bool, persist_order: Vec<KindId>) -> Self {
        let now = Utc::now();

        Self {
            transactional,
            started_at: now,
            finished_at: now,
            persist_order,
            lookups: Vec::new(),
            builds: Vec::new(),
            persisted: Vec::new(),
        }
    }

    /// Total number of entities saved across every kind
    pub fn total_persisted(&self) -> usize {
        self.persisted.iter().map(|p| p.persisted).sum()
    }

    /// Total number of foreign identifiers backfilled across every kind
    pub fn total_backfilled(&self) -> usize {
        self.persisted.iter().map(|p| p.backfilled).sum()
    }

    pub fn persisted_for(&self, kind: impl Into<KindId>) -> Option<&PersistSummary> {
        let kind = kind.into();
        self.persisted.iter().find(|p| p.kind == kind)
    }

    pub fn built_for(&self, kind: impl Into<KindId>) -> Option<usize> {
        let kind = kind.into();
        self.builds.iter().find(|b| b.kind == kind).map(|b| b.built)
    }
}
