//! Failure kinds for batch evaluation and boundary validation.
//!
//! [`EvalError`] covers everything that can go wrong once a well-formed
//! batch reaches the core. [`ValidationError`] is raised by
//! [`protocol::parse_batch`](crate::protocol::parse_batch) before that.

use thiserror::Error;

/// A core failure. Any of these fails the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// A print target or dependency has no defining calc command.
    #[error("variable `{name}` is never defined")]
    UndefinedVariable { name: String },

    /// Calc commands depend on each other in a loop.
    #[error("dependency cycle: {}", format_cycle(.cycle))]
    CycleDetected { cycle: Vec<String> },

    /// A variable was assigned more than once.
    #[error("variable `{name}` is assigned more than once")]
    DoubleAssignment { name: String },

    /// The caller gave up while `name` was still being waited on.
    #[error("evaluation cancelled while waiting for `{name}`")]
    Cancelled { name: String },

    /// An evaluator task died without reporting a result.
    #[error("evaluation task failed: {0}")]
    TaskFailed(String),
}

impl EvalError {
    /// Stable identifier used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            EvalError::UndefinedVariable { .. } => "undefined_variable",
            EvalError::CycleDetected { .. } => "cycle_detected",
            EvalError::DoubleAssignment { .. } => "double_assignment",
            EvalError::Cancelled { .. } => "cancelled",
            EvalError::TaskFailed(_) => "task_failed",
        }
    }
}

fn format_cycle(cycle: &[String]) -> String {
    let mut out = cycle.join(" -> ");
    if let Some(first) = cycle.first() {
        out.push_str(" -> ");
        out.push_str(first);
    }
    out
}

/// A malformed batch, rejected before evaluation starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("command {index}: variable name is empty")]
    EmptyName { index: usize },

    #[error("command {index}: unknown operation `{symbol}`")]
    UnknownOperation { index: usize, symbol: String },

    #[error("command {index}: `{name}` is not declared in this batch")]
    UndeclaredVariable { index: usize, name: String },
}
