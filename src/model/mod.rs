//! Commands, operations and the per-batch variable namespace.

pub mod variable;

pub use variable::{Variable, VariableArena};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Dense per-batch identifier of a variable. Indexes a [`VariableArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// The three binary operations a calc command may apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Plus,
    Minus,
    Multiply,
}

impl Operation {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(Operation::Plus),
            "-" => Some(Operation::Minus),
            "*" => Some(Operation::Multiply),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Operation::Plus => "+",
            Operation::Minus => "-",
            Operation::Multiply => "*",
        }
    }

    /// Fixed-width signed arithmetic. Overflow wraps.
    pub fn apply(self, left: i64, right: i64) -> i64 {
        match self {
            Operation::Plus => left.wrapping_add(right),
            Operation::Minus => left.wrapping_sub(right),
            Operation::Multiply => left.wrapping_mul(right),
        }
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::from_symbol(s).ok_or_else(|| format!("unknown operation: {s}"))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A value source for a calc command: a literal or another variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Argument {
    Number(i64),
    Variable(VarId),
}

impl Argument {
    pub fn has_dependency(&self) -> bool {
        matches!(self, Argument::Variable(_))
    }

    /// The variable this argument reads, if any.
    pub fn dependency(&self) -> Option<VarId> {
        match self {
            Argument::Number(_) => None,
            Argument::Variable(id) => Some(*id),
        }
    }
}

/// An operand as written by a client, before names are interned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Number(i64),
    Var(String),
}

impl From<i64> for Operand {
    fn from(n: i64) -> Self {
        Operand::Number(n)
    }
}

impl From<i32> for Operand {
    fn from(n: i32) -> Self {
        Operand::Number(n.into())
    }
}

impl From<&str> for Operand {
    fn from(name: &str) -> Self {
        Operand::Var(name.to_string())
    }
}

/// `var = left op right`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calc {
    pub var: VarId,
    pub op: Operation,
    pub left: Argument,
    pub right: Argument,
}

impl Calc {
    /// Variables this calc reads, left first.
    pub fn dependencies(&self) -> impl Iterator<Item = VarId> {
        [self.left, self.right]
            .into_iter()
            .filter_map(|arg| arg.dependency())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Emit the value of a variable.
    Print(VarId),
    /// Define a variable.
    Calc(Calc),
}

impl Command {
    pub fn var(&self) -> VarId {
        match self {
            Command::Print(var) => *var,
            Command::Calc(calc) => calc.var,
        }
    }

    pub fn is_print(&self) -> bool {
        matches!(self, Command::Print(_))
    }

    pub fn is_calc(&self) -> bool {
        matches!(self, Command::Calc(_))
    }
}

/// An ordered command list plus the names of every variable it mentions.
/// Each batch is its own namespace.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    names: Vec<String>,
    commands: Vec<Command>,
}

impl Batch {
    pub fn builder() -> BatchBuilder {
        BatchBuilder::default()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn name(&self, id: VarId) -> &str {
        &self.names[id.index()]
    }

    pub fn lookup(&self, name: &str) -> Option<VarId> {
        self.names.iter().position(|n| n == name).map(VarId)
    }

    pub fn variable_count(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Builds a [`Batch`], giving every distinct name exactly one [`VarId`].
#[derive(Debug, Default)]
pub struct BatchBuilder {
    ids: HashMap<String, VarId>,
    names: Vec<String>,
    commands: Vec<Command>,
}

impl BatchBuilder {
    /// Id for `name`, allocating one the first time it is seen.
    pub fn intern(&mut self, name: &str) -> VarId {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let id = VarId(self.names.len());
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.ids.contains_key(name)
    }

    pub fn print(&mut self, var: &str) -> &mut Self {
        let var = self.intern(var);
        self.commands.push(Command::Print(var));
        self
    }

    pub fn calc(
        &mut self,
        var: &str,
        op: Operation,
        left: impl Into<Operand>,
        right: impl Into<Operand>,
    ) -> &mut Self {
        let var = self.intern(var);
        let left = self.argument(left.into());
        let right = self.argument(right.into());
        self.commands.push(Command::Calc(Calc {
            var,
            op,
            left,
            right,
        }));
        self
    }

    fn argument(&mut self, operand: Operand) -> Argument {
        match operand {
            Operand::Number(n) => Argument::Number(n),
            Operand::Var(name) => Argument::Variable(self.intern(&name)),
        }
    }

    pub fn build(&mut self) -> Batch {
        self.ids.clear();
        Batch {
            names: std::mem::take(&mut self.names),
            commands: std::mem::take(&mut self.commands),
        }
    }
}

/// A resolved print target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarValue {
    pub var: String,
    pub value: i64,
}
