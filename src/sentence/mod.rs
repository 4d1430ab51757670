//! The unit of evaluation work: `var = left op right`.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::EvalError;
use crate::model::{Argument, Calc, VariableArena};

/// Binds one variable to the result of its calc command.
///
/// Reading a variable argument suspends until that variable's own sentence
/// has written it, so sentences can be launched in any order.
#[derive(Debug, Clone)]
pub struct Sentence {
    calc: Calc,
    vars: Arc<VariableArena>,
}

impl Sentence {
    pub fn new(calc: Calc, vars: Arc<VariableArena>) -> Self {
        Self { calc, vars }
    }

    pub fn calc_command(&self) -> &Calc {
        &self.calc
    }

    /// Read both arguments, apply the operation, bind the target.
    /// Returns the bound value.
    pub async fn calc(&self, token: &CancellationToken) -> Result<i64, EvalError> {
        let left = self.resolve(self.calc.left, token).await?;
        let right = self.resolve(self.calc.right, token).await?;
        let value = self.calc.op.apply(left, right);

        let target = self.vars.get(self.calc.var);
        target.set(value)?;
        trace!(
            var = target.name(),
            value,
            "{left} {} {right}",
            self.calc.op
        );
        Ok(value)
    }

    async fn resolve(&self, arg: Argument, token: &CancellationToken) -> Result<i64, EvalError> {
        match arg {
            Argument::Number(n) => Ok(n),
            Argument::Variable(id) => self.vars.get(id).get(token).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Batch, Command, Operation};
    use std::time::Duration;

    fn setup(batch: &Batch) -> (Arc<VariableArena>, Vec<Sentence>) {
        let vars = Arc::new(VariableArena::for_batch(batch));
        let sentences = batch
            .commands()
            .iter()
            .filter_map(|cmd| match cmd {
                Command::Calc(calc) => Some(Sentence::new(*calc, Arc::clone(&vars))),
                Command::Print(_) => None,
            })
            .collect();
        (vars, sentences)
    }

    #[tokio::test]
    async fn literals_only() {
        let batch = Batch::builder().calc("x", Operation::Minus, 10, 3).build();
        let (vars, sentences) = setup(&batch);

        let value = sentences[0].calc(&CancellationToken::new()).await.unwrap();
        assert_eq!(value, 7);
        assert_eq!(vars.get(batch.lookup("x").unwrap()).try_get(), Some(7));
    }

    #[tokio::test]
    async fn waits_for_dependency() {
        let batch = Batch::builder()
            .calc("a", Operation::Plus, 1, 2)
            .calc("b", Operation::Multiply, "a", 3)
            .build();
        let (vars, sentences) = setup(&batch);
        let token = CancellationToken::new();

        let dependent = {
            let sentence = sentences[1].clone();
            let token = token.clone();
            tokio::spawn(async move { sentence.calc(&token).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!vars.get(batch.lookup("b").unwrap()).is_set());

        sentences[0].calc(&token).await.unwrap();
        assert_eq!(dependent.await.unwrap().unwrap(), 9);
    }

    #[tokio::test]
    async fn cancelled_while_waiting() {
        let batch = Batch::builder().calc("b", Operation::Plus, "a", 1).build();
        let (_vars, sentences) = setup(&batch);
        let token = CancellationToken::new();
        token.cancel();

        let err = sentences[0].calc(&token).await.unwrap_err();
        assert_eq!(err, EvalError::Cancelled { name: "a".into() });
    }

    #[tokio::test]
    async fn running_twice_is_double_assignment() {
        let batch = Batch::builder().calc("x", Operation::Plus, 1, 1).build();
        let (_vars, sentences) = setup(&batch);
        let token = CancellationToken::new();

        sentences[0].calc(&token).await.unwrap();
        let err = sentences[0].calc(&token).await.unwrap_err();
        assert_eq!(err, EvalError::DoubleAssignment { name: "x".into() });
    }
}
