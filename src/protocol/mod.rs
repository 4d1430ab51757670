//! Wire format shared by the HTTP endpoint and the `eval` subcommand.
//!
//! A request is a JSON array of commands:
//!
//! ```json
//! [
//!   {"type": "calc", "op": "+", "var": "x", "left": 1, "right": 2},
//!   {"type": "print", "var": "x"}
//! ]
//! ```
//!
//! and a successful response is `{"items": [{"var": "x", "value": 3}]}`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{EvalError, ValidationError};
use crate::model::{Batch, Operand, Operation, VarValue};

/// A command as submitted by a client, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RawCommand {
    Print {
        var: String,
    },
    Calc {
        op: String,
        var: String,
        left: Operand,
        right: Operand,
    },
}

impl RawCommand {
    pub fn var(&self) -> &str {
        match self {
            RawCommand::Print { var } | RawCommand::Calc { var, .. } => var,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub items: Vec<VarValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable kind, e.g. `cycle_detected`.
    pub error: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

impl From<&EvalError> for ErrorBody {
    fn from(err: &EvalError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<&ValidationError> for ErrorBody {
    fn from(err: &ValidationError) -> Self {
        Self::new("invalid_request", err.to_string())
    }
}

/// Validate raw commands and intern their names into a [`Batch`].
///
/// A name counts as declared when it is the `var` of any command in the
/// batch, wherever that command appears. Operands may only reference
/// declared names. Whether a declared name is ever defined is left to the
/// evaluator.
pub fn parse_batch(commands: &[RawCommand]) -> Result<Batch, ValidationError> {
    let mut builder = Batch::builder();

    for (index, command) in commands.iter().enumerate() {
        if command.var().is_empty() {
            return Err(ValidationError::EmptyName { index });
        }
        builder.intern(command.var());
    }

    for (index, command) in commands.iter().enumerate() {
        match command {
            RawCommand::Print { var } => {
                builder.print(var);
            }
            RawCommand::Calc {
                op,
                var,
                left,
                right,
            } => {
                let op = Operation::from_symbol(op).ok_or_else(|| {
                    ValidationError::UnknownOperation {
                        index,
                        symbol: op.clone(),
                    }
                })?;
                for operand in [left, right] {
                    let Operand::Var(name) = operand else {
                        continue;
                    };
                    if !builder.is_declared(name) {
                        return Err(ValidationError::UndeclaredVariable {
                            index,
                            name: name.clone(),
                        });
                    }
                }
                builder.calc(var, op, left.clone(), right.clone());
            }
        }
    }

    Ok(builder.build())
}

/// Read a JSON command array.
pub fn read_commands(reader: impl Read) -> Result<Vec<RawCommand>> {
    serde_json::from_reader(reader).context("invalid command batch")
}

/// Read a JSON command array from a file.
pub fn load_commands(path: &Path) -> Result<Vec<RawCommand>> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    read_commands(BufReader::new(file))
}
