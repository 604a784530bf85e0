//! Optional recording of the modular propagation: per-round bounds and
//! per-module solutions, surfaced in the result object when requested.

use serde_json::{json, Value};

use super::partial_solution::PartialSolution;
use super::production_line_solution::ModulesSolutions;
use super::sequence;
use crate::problem::{GlobalBounds, IntervalSpec, ModuleBounds, ModuleId};

#[derive(Default)]
pub struct DistributedSchedulerHistory {
    store_bounds: bool,
    store_sequence: bool,
    solutions: Vec<ModulesSolutions>,
    bounds: Vec<GlobalBounds>,
}

impl DistributedSchedulerHistory {
    pub fn new(store_bounds: bool, store_sequence: bool) -> Self {
        let mut history = DistributedSchedulerHistory {
            store_bounds,
            store_sequence,
            solutions: Vec::new(),
            bounds: Vec::new(),
        };
        history.add_empty();
        history
    }

    /// Opens a new round.
    pub fn add_empty(&mut self) {
        if self.store_sequence {
            self.solutions.push(ModulesSolutions::default());
        }
        if self.store_bounds {
            self.bounds.push(GlobalBounds::default());
        }
    }

    /// Records one module's result within the current round.
    pub fn add_module(
        &mut self,
        module_id: ModuleId,
        bounds: &ModuleBounds,
        solution: &PartialSolution,
    ) {
        if self.store_sequence {
            if let Some(round) = self.solutions.last_mut() {
                round.insert(module_id, solution.clone());
            }
        }
        if self.store_bounds {
            if let Some(round) = self.bounds.last_mut() {
                round.insert(module_id, bounds.clone());
            }
        }
    }

    pub fn bounds_json(&self) -> Value {
        Value::Array(self.bounds.iter().map(global_bounds_to_json).collect())
    }

    pub fn sequences_json(&self) -> Value {
        Value::Array(
            self.solutions
                .iter()
                .map(|round| {
                    let mut object = serde_json::Map::new();
                    for (module_id, solution) in round {
                        object.insert(
                            module_id.to_string(),
                            sequence::save_machine_sequences(solution.chosen_sequences()),
                        );
                    }
                    Value::Object(object)
                })
                .collect(),
        )
    }

    pub fn store_bounds(&self) -> bool {
        self.store_bounds
    }

    pub fn store_sequence(&self) -> bool {
        self.store_sequence
    }
}

fn interval_spec_to_json(spec: &IntervalSpec) -> Value {
    let mut result = serde_json::Map::new();
    for (job_from, by_to) in spec {
        let mut inner = serde_json::Map::new();
        for (job_to, interval) in by_to {
            let min = interval.min.map(Value::from).unwrap_or(Value::Null);
            let max = interval.max.map(Value::from).unwrap_or(Value::Null);
            inner.insert(job_to.to_string(), json!([min, max]));
        }
        result.insert(job_from.to_string(), Value::Object(inner));
    }
    Value::Object(result)
}

fn global_bounds_to_json(bounds: &GlobalBounds) -> Value {
    let mut result = serde_json::Map::new();
    for (module_id, module_bounds) in bounds {
        result.insert(
            module_id.to_string(),
            json!({
                "in": interval_spec_to_json(&module_bounds.input),
                "out": interval_spec_to_json(&module_bounds.output),
            }),
        );
    }
    Value::Object(result)
}
