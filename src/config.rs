use std::str::FromStr;

use serde::Serialize;

use crate::error::config::ConfigError;

const DUPLICATE_KEYS_VAR: &str = "CASCADE_DUPLICATE_KEYS";
const UNRESOLVED_PARENTS_VAR: &str = "CASCADE_UNRESOLVED_PARENTS";

/// How repeated keys are handled when indexing pre-fetched entities and when mapping
/// source keys back to their records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKeyPolicy {
    /// Keep the first entry for a key and discard later ones.
    #[default]
    FirstWins,
    /// Abort the run with `Error::DuplicateKey`.
    Fail,
}

impl FromStr for DuplicateKeyPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "first_wins" => Ok(Self::FirstWins),
            "fail" => Ok(Self::Fail),
            other => Err(format!("expected `first_wins` or `fail`, got `{}`", other)),
        }
    }
}

/// What backfill does with a relation whose parent kind cannot supply identifiers,
/// either because it has no persistence binding or because it is persisted after
/// the child.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedParentPolicy {
    /// Leave the foreign identifier unset and carry on.
    #[default]
    Skip,
    /// Abort the run with `Error::UnresolvedParent`.
    Fail,
}

impl FromStr for UnresolvedParentPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "fail" => Ok(Self::Fail),
            other => Err(format!("expected `skip` or `fail`, got `{}`", other)),
        }
    }
}

/// Policies applied by a workflow run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkflowConfig {
    /// Applies to lookup indexing and to the source key to record mapping used by
    /// backfill.
    pub duplicate_keys: DuplicateKeyPolicy,
    /// Applies to relations whose parent kind is not persisted before the child.
    pub unresolved_parents: UnresolvedParentPolicy,
}

impl WorkflowConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn duplicate_keys(mut self, policy: DuplicateKeyPolicy) -> Self {
        self.duplicate_keys = policy;
        self
    }

    pub fn unresolved_parents(mut self, policy: UnresolvedParentPolicy) -> Self {
        self.unresolved_parents = policy;
        self
    }

    /// Read policies from `CASCADE_DUPLICATE_KEYS` and `CASCADE_UNRESOLVED_PARENTS`.
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            duplicate_keys: policy_from_env(DUPLICATE_KEYS_VAR)?.unwrap_or_default(),
            unresolved_parents: policy_from_env(UNRESOLVED_PARENTS_VAR)?.unwrap_or_default(),
        })
    }
}

fn policy_from_env<P>(var: &str) -> Result<Option<P>, ConfigError>
where
    P: FromStr<Err = String>,
{
    let Ok(value) = std::env::var(var) else {
        return Ok(None);
    };

    value
        .parse()
        .map(Some)
        .map_err(|reason| ConfigError::InvalidEnvValue {
            var: var.to_string(),
            reason,
        })
}
