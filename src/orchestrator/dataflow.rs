use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Evaluation, Executor, OrchestratorConfig, Prepared};
use crate::error::EvalError;
use crate::finder::Finder;
use crate::model::Batch;

/// One task per required variable, launched all at once in no particular
/// order. Ordering falls out of the variables themselves: a sentence reading
/// an unbound variable suspends until its producer writes it.
pub struct DataflowExecutor {
    finder: Arc<dyn Finder>,
    config: OrchestratorConfig,
}

impl DataflowExecutor {
    pub fn new(finder: Arc<dyn Finder>, config: OrchestratorConfig) -> Self {
        Self { finder, config }
    }
}

#[async_trait]
impl Executor for DataflowExecutor {
    async fn execute(
        &self,
        token: &CancellationToken,
        batch: &Batch,
    ) -> Result<Evaluation, EvalError> {
        let prepared = Prepared::new(batch, self.finder.as_ref(), &self.config)?;
        debug!(
            commands = batch.commands().len(),
            required = prepared.required.len(),
            targets = prepared.plan.targets.len(),
            "batch prepared"
        );

        // Cancelled when this call returns, releasing any task still waiting.
        let scope = token.child_token();
        let _scope_guard = scope.clone().drop_guard();

        let mut tasks = JoinSet::new();
        for id in &prepared.required {
            let Some(sentence) = prepared.sentence(*id) else {
                continue;
            };
            debug!(var = batch.name(*id), "launching sentence");
            let scope = scope.clone();
            tasks.spawn(async move { sentence.calc(&scope).await });
        }

        loop {
            let joined = tokio::select! {
                biased;
                () = token.cancelled() => match prepared.cancelled() {
                    Some(err) => {
                        warn!(error = %err, "batch abandoned");
                        return Err(err);
                    }
                    None => break,
                },
                joined = tasks.join_next() => joined,
            };
            match joined {
                None => break,
                Some(Ok(Ok(_))) => {}
                Some(Ok(Err(err))) => {
                    warn!(error = %err, "batch failed");
                    return Err(err);
                }
                Some(Err(join_err)) => {
                    warn!(error = %join_err, "sentence task died");
                    return Err(EvalError::TaskFailed(join_err.to_string()));
                }
            }
        }

        Ok(prepared.into_evaluation())
    }
}
