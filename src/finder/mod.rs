pub mod dfs;

pub use dfs::DfsFinder;

use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::error::EvalError;
use crate::model::{Batch, Calc, VarId};

/// Why a required set could not be computed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FindError {
    #[error("variable {0:?} has no defining command")]
    Undefined(VarId),
    /// Cycle members, starting from the variable that was re-entered.
    #[error("dependency cycle through {0:?}")]
    Cycle(Vec<VarId>),
}

impl FindError {
    /// Attach names from the batch the ids belong to.
    pub fn into_eval_error(self, batch: &Batch) -> EvalError {
        match self {
            FindError::Undefined(id) => EvalError::UndefinedVariable {
                name: batch.name(id).to_string(),
            },
            FindError::Cycle(ids) => EvalError::CycleDetected {
                cycle: ids.into_iter().map(|id| batch.name(id).to_string()).collect(),
            },
        }
    }
}

/// Decides which variables must be computed to resolve `targets`.
pub trait Finder: Send + Sync {
    fn find(
        &self,
        defining: &HashMap<VarId, Calc>,
        targets: &[VarId],
    ) -> Result<HashSet<VarId>, FindError>;
}
