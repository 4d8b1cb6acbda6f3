use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::index::ColumnIdentity;
use crate::error::MinerError;

/// Every value of `dependent` also occurs in `referenced`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InclusionDependency {
    pub dependent: ColumnIdentity,
    pub referenced: ColumnIdentity,
}

impl InclusionDependency {
    pub fn new(dependent: ColumnIdentity, referenced: ColumnIdentity) -> Self {
        Self {
            dependent,
            referenced,
        }
    }
}

impl fmt::Display for InclusionDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ⊆ {}", self.dependent, self.referenced)
    }
}

/// Collects confirmed dependencies in arrival order until finalization.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    found: Vec<InclusionDependency>,
    seen: HashSet<InclusionDependency>,
    finalized: bool,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `ind` unless it was already recorded. Returns whether it was new.
    pub fn record(&mut self, ind: InclusionDependency) -> Result<bool, MinerError> {
        if self.finalized {
            return Err(MinerError::AlreadyFinalized);
        }
        if !self.seen.insert(ind.clone()) {
            return Ok(false);
        }
        self.found.push(ind);
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.found.len()
    }

    pub fn is_empty(&self) -> bool {
        self.found.is_empty()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Emits the full sequence. Only the first call succeeds.
    pub fn finalize(&mut self) -> Result<Vec<InclusionDependency>, MinerError> {
        if self.finalized {
            return Err(MinerError::AlreadyFinalized);
        }
        self.finalized = true;
        self.seen.clear();
        Ok(std::mem::take(&mut self.found))
    }
}
