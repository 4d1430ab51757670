//! One-shot variable cells.
//!
//! A [`Variable`] starts unset, is written exactly once by the sentence that
//! defines it, and can be awaited by any number of readers. Waiting is
//! cancellable through a [`CancellationToken`], so a reader never outlives
//! the batch that spawned it.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::{Batch, VarId};
use crate::error::EvalError;

/// Single-writer, multi-reader future holding one `i64`.
#[derive(Debug)]
pub struct Variable {
    name: String,
    cell: watch::Sender<Option<i64>>,
}

impl Variable {
    pub fn new(name: impl Into<String>) -> Self {
        let (cell, _) = watch::channel(None);
        Self {
            name: name.into(),
            cell,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bind the value. A second call fails and leaves the first value intact.
    pub fn set(&self, value: i64) -> Result<(), EvalError> {
        let bound = self.cell.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(value);
            true
        });
        if bound {
            Ok(())
        } else {
            Err(EvalError::DoubleAssignment {
                name: self.name.clone(),
            })
        }
    }

    /// Wait until the value is bound or `token` is cancelled.
    pub async fn get(&self, token: &CancellationToken) -> Result<i64, EvalError> {
        if let Some(value) = self.try_get() {
            return Ok(value);
        }
        let mut rx = self.cell.subscribe();
        tokio::select! {
            slot = rx.wait_for(Option::is_some) => match slot {
                Ok(slot) => Ok((*slot).unwrap_or_default()),
                // The sender lives in `self`, so this only happens if it is gone.
                Err(_) => Err(EvalError::TaskFailed(format!(
                    "variable `{}` dropped while awaited",
                    self.name
                ))),
            },
            () = token.cancelled() => Err(EvalError::Cancelled {
                name: self.name.clone(),
            }),
        }
    }

    /// Current value without waiting.
    pub fn try_get(&self) -> Option<i64> {
        *self.cell.borrow()
    }

    pub fn is_set(&self) -> bool {
        self.try_get().is_some()
    }
}

/// Every variable of one batch, indexed by [`VarId`].
#[derive(Debug, Default)]
pub struct VariableArena {
    vars: Vec<Variable>,
}

impl VariableArena {
    pub fn for_batch(batch: &Batch) -> Self {
        Self {
            vars: batch.names().iter().map(Variable::new).collect(),
        }
    }

    pub fn get(&self, id: VarId) -> &Variable {
        &self.vars[id.index()]
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.vars.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn name_is_available_before_set() {
        let var = Variable::new("x");
        assert_eq!(var.name(), "x");
        assert!(!var.is_set());
        assert_eq!(var.try_get(), None);
    }

    #[tokio::test]
    async fn set_then_get() {
        let var = Variable::new("x");
        var.set(42).unwrap();
        assert!(var.is_set());
        assert_eq!(var.get(&CancellationToken::new()).await.unwrap(), 42);
    }

    #[test]
    fn second_set_is_rejected() {
        let var = Variable::new("x");
        var.set(1).unwrap();
        let err = var.set(2).unwrap_err();
        assert_eq!(err, EvalError::DoubleAssignment { name: "x".into() });
        assert_eq!(var.try_get(), Some(1));
    }

    #[tokio::test]
    async fn readers_wait_for_writer() {
        let var = Arc::new(Variable::new("x"));
        let token = CancellationToken::new();

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let var = Arc::clone(&var);
                let token = token.clone();
                tokio::spawn(async move { var.get(&token).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        var.set(7).unwrap();

        for value in futures::future::join_all(readers).await {
            assert_eq!(value.unwrap().unwrap(), 7);
        }
    }

    #[tokio::test]
    async fn cancellation_releases_waiter() {
        let var = Variable::new("never");
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(1), var.get(&token))
            .await
            .expect("get should return once cancelled");
        assert_eq!(
            result.unwrap_err(),
            EvalError::Cancelled {
                name: "never".into()
            }
        );
    }

    #[tokio::test]
    async fn set_value_wins_over_cancelled_token() {
        let var = Variable::new("x");
        var.set(3).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(var.get(&token).await.unwrap(), 3);
    }

    #[test]
    fn arena_follows_batch_ids() {
        let batch = Batch::builder()
            .calc("a", crate::model::Operation::Plus, 1, "b")
            .print("a")
            .build();
        let arena = VariableArena::for_batch(&batch);
        assert_eq!(arena.len(), 2);
        let b = batch.lookup("b").unwrap();
        assert_eq!(arena.get(b).name(), "b");
    }
}
