use hashbrown::HashMap;

use super::partial_solution::PartialSolution;
use crate::problem::ModuleId;
use crate::Delay;

/// Per-module solutions of one propagation round.
pub type ModulesSolutions = HashMap<ModuleId, PartialSolution>;

/// A converged global schedule: one local solution per module.
#[derive(Clone, Debug, Default)]
pub struct ProductionLineSolution {
    solutions: ModulesSolutions,
}

impl ProductionLineSolution {
    pub fn new(solutions: ModulesSolutions) -> Self {
        ProductionLineSolution { solutions }
    }

    pub fn module_solution(&self, id: ModuleId) -> Option<&PartialSolution> {
        self.solutions.get(&id)
    }

    pub fn modules(&self) -> impl Iterator<Item = (&ModuleId, &PartialSolution)> {
        self.solutions.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.solutions.is_empty()
    }

    /// Makespan of the line: the largest local makespan.
    pub fn makespan(&self) -> Delay {
        self.solutions
            .values()
            .map(|s| s.makespan())
            .max()
            .unwrap_or(-1)
    }
}
