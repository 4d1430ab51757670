use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Evaluation, Executor, OrchestratorConfig, Prepared};
use crate::error::EvalError;
use crate::finder::Finder;
use crate::model::{Batch, VarId};

/// Topologically ordered evaluation with at most `workers` sentences in
/// flight. Suited to large batches where one task per variable is too many.
///
/// Every dependency precedes its dependents in launch order, so the oldest
/// in-flight sentence can always make progress and the pool cannot stall.
pub struct LayeredExecutor {
    finder: Arc<dyn Finder>,
    config: OrchestratorConfig,
    workers: usize,
}

impl LayeredExecutor {
    pub fn new(finder: Arc<dyn Finder>, config: OrchestratorConfig, workers: usize) -> Self {
        Self {
            finder,
            config,
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

/// Kahn's algorithm over the required set. Ties break by id, so the order
/// is stable for a given batch.
fn topological_order(prepared: &Prepared) -> Vec<VarId> {
    let mut pending: HashMap<VarId, usize> = HashMap::new();
    let mut dependents: HashMap<VarId, Vec<VarId>> = HashMap::new();

    for id in &prepared.required {
        let deps: Vec<VarId> = prepared
            .plan
            .defining
            .get(id)
            .map(|calc| calc.dependencies().collect())
            .unwrap_or_default();
        pending.insert(*id, deps.len());
        for dep in deps {
            dependents.entry(dep).or_default().push(*id);
        }
    }

    let mut ready: Vec<VarId> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| *id)
        .collect();
    ready.sort();
    let mut queue = VecDeque::from(ready);

    let mut order = Vec::with_capacity(pending.len());
    while let Some(id) = queue.pop_front() {
        order.push(id);
        let Some(next) = dependents.get(&id) else {
            continue;
        };
        let mut unlocked = Vec::new();
        for dependent in next {
            if let Some(count) = pending.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    unlocked.push(*dependent);
                }
            }
        }
        unlocked.sort();
        queue.extend(unlocked);
    }
    order
}

#[async_trait]
impl Executor for LayeredExecutor {
    async fn execute(
        &self,
        token: &CancellationToken,
        batch: &Batch,
    ) -> Result<Evaluation, EvalError> {
        let prepared = Prepared::new(batch, self.finder.as_ref(), &self.config)?;
        let order = topological_order(&prepared);
        debug!(
            commands = batch.commands().len(),
            required = order.len(),
            workers = self.workers,
            "scheduling sentences"
        );

        let scope = token.child_token();
        let _scope_guard = scope.clone().drop_guard();

        let sentences: Vec<_> = order
            .iter()
            .filter_map(|id| prepared.sentence(*id))
            .collect();
        let mut running = stream::iter(sentences)
            .map(|sentence| {
                debug!(var = batch.name(sentence.calc_command().var), "launching sentence");
                let scope = scope.clone();
                tokio::spawn(async move { sentence.calc(&scope).await })
            })
            .buffer_unordered(self.workers);

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
                joined = running.next() => joined,
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
