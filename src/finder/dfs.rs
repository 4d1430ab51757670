use std::collections::{HashMap, HashSet};

use super::{FindError, Finder};
use crate::model::{Calc, VarId};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    /// On the current DFS path.
    Open,
    /// Fully explored.
    Done,
}

/// Depth-first reachability from the print targets.
///
/// Rejects cycles and variables without a definition instead of returning a
/// set that could never be evaluated. Uses an explicit stack, so long
/// dependency chains do not grow the call stack.
#[derive(Debug, Default, Clone, Copy)]
pub struct DfsFinder;

impl DfsFinder {
    pub fn new() -> Self {
        Self
    }
}

impl Finder for DfsFinder {
    fn find(
        &self,
        defining: &HashMap<VarId, Calc>,
        targets: &[VarId],
    ) -> Result<HashSet<VarId>, FindError> {
        let mut marks: HashMap<VarId, Mark> = HashMap::new();
        // (variable, its dependencies, index of the next one to visit)
        let mut stack: Vec<(VarId, Vec<VarId>, usize)> = Vec::new();

        for &target in targets {
            if marks.contains_key(&target) {
                continue;
            }
            let calc = defining.get(&target).ok_or(FindError::Undefined(target))?;
            marks.insert(target, Mark::Open);
            stack.push((target, calc.dependencies().collect(), 0));

            while let Some((var, deps, next)) = stack.last_mut() {
                let Some(&dep) = deps.get(*next) else {
                    marks.insert(*var, Mark::Done);
                    stack.pop();
                    continue;
                };
                *next += 1;

                match marks.get(&dep) {
                    Some(Mark::Done) => {}
                    Some(Mark::Open) => {
                        let start = stack
                            .iter()
                            .position(|(v, _, _)| *v == dep)
                            .unwrap_or_default();
                        return Err(FindError::Cycle(
                            stack[start..].iter().map(|(v, _, _)| *v).collect(),
                        ));
                    }
                    None => {
                        let calc = defining.get(&dep).ok_or(FindError::Undefined(dep))?;
                        marks.insert(dep, Mark::Open);
                        stack.push((dep, calc.dependencies().collect(), 0));
                    }
                }
            }
        }

        Ok(marks.into_keys().collect())
    }
}
