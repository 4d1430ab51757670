pub mod dataflow;
pub mod layered;

pub use dataflow::DataflowExecutor;
pub use layered::LayeredExecutor;

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::EvalError;
use crate::finder::Finder;
use crate::model::{Batch, Calc, Command, VarId, VarValue, Variable, VariableArena};
use crate::sentence::Sentence;

/// What to do when two calc commands in one batch define the same variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedefinitionPolicy {
    /// Fail the batch with [`EvalError::DoubleAssignment`].
    #[default]
    Reject,
    /// The later definition replaces the earlier one.
    LastWins,
}

#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    pub redefinition: RedefinitionPolicy,
}

/// Runs a batch and hands back its print targets.
/// The transports only know this trait.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Compute every variable the print targets need. On success each target
    /// in the returned [`Evaluation`] is bound.
    async fn execute(
        &self,
        token: &CancellationToken,
        batch: &Batch,
    ) -> Result<Evaluation, EvalError>;

    /// [`execute`](Executor::execute), then read every print target in order.
    async fn run(
        &self,
        token: &CancellationToken,
        batch: &Batch,
    ) -> Result<Vec<VarValue>, EvalError> {
        let evaluation = self.execute(token, batch).await?;
        evaluation.values(token).await
    }
}

/// The print targets of an executed batch, in request order (duplicates kept).
#[derive(Debug)]
pub struct Evaluation {
    vars: Arc<VariableArena>,
    targets: Vec<VarId>,
}

impl Evaluation {
    pub fn targets(&self) -> impl Iterator<Item = &Variable> {
        self.targets.iter().map(|id| self.vars.get(*id))
    }

    pub async fn values(&self, token: &CancellationToken) -> Result<Vec<VarValue>, EvalError> {
        let mut values = Vec::with_capacity(self.targets.len());
        for var in self.targets() {
            values.push(VarValue {
                var: var.name().to_string(),
                value: var.get(token).await?,
            });
        }
        Ok(values)
    }
}

/// Calc commands keyed by the variable they define, plus print targets in order.
#[derive(Debug, Default)]
pub struct Plan {
    pub defining: HashMap<VarId, Calc>,
    pub targets: Vec<VarId>,
}

pub fn partition(batch: &Batch, policy: RedefinitionPolicy) -> Result<Plan, EvalError> {
    let mut plan = Plan::default();
    for command in batch.commands() {
        match command {
            Command::Print(var) => plan.targets.push(*var),
            Command::Calc(calc) => {
                let previous = plan.defining.insert(calc.var, *calc);
                if previous.is_some() && policy == RedefinitionPolicy::Reject {
                    return Err(EvalError::DoubleAssignment {
                        name: batch.name(calc.var).to_string(),
                    });
                }
            }
        }
    }
    Ok(plan)
}

/// A batch that passed partitioning and the finder, ready to launch.
struct Prepared {
    plan: Plan,
    required: HashSet<VarId>,
    vars: Arc<VariableArena>,
}

impl Prepared {
    fn new(
        batch: &Batch,
        finder: &dyn Finder,
        config: &OrchestratorConfig,
    ) -> Result<Self, EvalError> {
        let plan = partition(batch, config.redefinition)?;
        let required = finder
            .find(&plan.defining, &plan.targets)
            .map_err(|e| e.into_eval_error(batch))?;
        Ok(Self {
            plan,
            required,
            vars: Arc::new(VariableArena::for_batch(batch)),
        })
    }

    /// `None` for ids without a definition; a checking finder never requires those.
    fn sentence(&self, id: VarId) -> Option<Sentence> {
        self.plan
            .defining
            .get(&id)
            .map(|calc| Sentence::new(*calc, Arc::clone(&self.vars)))
    }

    fn into_evaluation(self) -> Evaluation {
        Evaluation {
            vars: self.vars,
            targets: self.plan.targets,
        }
    }

    /// Error for a caller that stopped waiting, naming the first unbound
    /// target. `None` once every target is bound: nothing was lost.
    fn cancelled(&self) -> Option<EvalError> {
        self.plan
            .targets
            .iter()
            .map(|id| self.vars.get(*id))
            .find(|var| !var.is_set())
            .map(|var| EvalError::Cancelled {
                name: var.name().to_string(),
            })
    }
}
