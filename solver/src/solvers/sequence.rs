//! Given-sequence solver and the sequence-file format.
//!
//! A sequence file pins the machine sequences (optionally per module, and
//! optionally keyed by iteration for multi-iteration sweeps); the solver
//! replays it and computes the resulting schedule.

use hashbrown::HashMap;
use serde_json::{json, Value};

use super::partial_solution::{MachinesSequences, PartialSolution, Sequence};
use super::{ProductionLineSolution, Solutions};
use crate::algorithms::paths;
use crate::cli::CliArgs;
use crate::problem::{Instance, JobId, MachineId, Module, Operation, ProductionLine};
use crate::solvers::utils;
use crate::{Result, SchedulerError};

pub const KEY_SEQUENCE: &str = "sequence";
pub const KEY_MACHINE_SEQUENCES: &str = "machineSequences";
pub const KEY_MODULES: &str = "modules";

/// Replays the sequence file against a shop instance.
pub fn solve(
    problem: &mut Instance,
    args: &CliArgs,
    iteration: u64,
) -> Result<(Solutions, Value)> {
    let file = std::fs::read_to_string(&args.sequence_file)?;
    let value: Value = serde_json::from_str(&file)
        .map_err(|e| SchedulerError::Parse(format!("sequence file: {e}")))?;
    let sequences = load_all_machines_sequences(&value, problem, iteration)?;
    solve_with_sequences(problem, sequences)
}

/// Replays the sequence file entry of one module.
pub fn solve_module(
    module: &mut Module,
    args: &CliArgs,
    iteration: u64,
) -> Result<(Solutions, Value)> {
    let file = std::fs::read_to_string(&args.sequence_file)?;
    let value: Value = serde_json::from_str(&file)
        .map_err(|e| SchedulerError::Parse(format!("sequence file: {e}")))?;

    let module_key = module.module_id().to_string();
    let modules = value
        .get(KEY_SEQUENCE)
        .and_then(|s| s.get(KEY_MODULES))
        .ok_or_else(|| SchedulerError::Parse("sequence file has no modules".into()))?;
    let module_value = modules.get(&module_key).ok_or_else(|| {
        SchedulerError::Parse(format!("sequence file has no module {module_key}"))
    })?;

    let wrapped = json!({ KEY_SEQUENCE: module_value });
    let sequences = load_all_machines_sequences(&wrapped, module, iteration)?;
    solve_with_sequences(module.instance_mut(), sequences)
}

fn solve_with_sequences(
    problem: &mut Instance,
    sequences: MachinesSequences,
) -> Result<(Solutions, Value)> {
    let _ = utils::init_problem_graph(problem)?;
    let mut dg = problem.delay_graph().clone();

    let mut solution = PartialSolution::new(sequences, vec![]);
    let edges = solution.all_and_inferred_edges(problem)?;
    let result = paths::compute_asapst_fresh_with_edges(&mut dg, &edges);
    if result.has_positive_cycle() {
        return Err(SchedulerError::Infeasible(
            "the given sequence is infeasible".into(),
        ));
    }
    solution.set_asapst(result.times);
    solution.add_inferred_input_sequence(problem);

    Ok((vec![solution], json!({})))
}

/// Parses one machine sequence: an array of `[jobId, opId]` pairs.
pub fn load_machine_sequence(
    value: &Value,
    machine: MachineId,
    problem: &Instance,
) -> Result<Sequence> {
    let entries = value
        .as_array()
        .ok_or_else(|| SchedulerError::Parse("machine sequence is not an array".into()))?;

    let mut sequence = Sequence::with_capacity(entries.len());
    for entry in entries {
        let pair = entry
            .as_array()
            .filter(|p| p.len() == 2)
            .ok_or_else(|| SchedulerError::Parse("sequence entry is not a pair".into()))?;
        let job = pair[0]
            .as_u64()
            .ok_or_else(|| SchedulerError::Parse("job id is not an integer".into()))?;
        let op_id = pair[1]
            .as_u64()
            .ok_or_else(|| SchedulerError::Parse("operation id is not an integer".into()))?;

        let op = Operation::new(JobId(job as u32), op_id as u32);
        if !problem.contains_op(&op) {
            return Err(SchedulerError::Parse(format!(
                "sequence names unknown operation {op}"
            )));
        }
        if problem.machine(&op) != machine {
            return Err(SchedulerError::Parse(format!(
                "operation {op} is not processed on machine {machine}"
            )));
        }
        sequence.push(op);
    }
    Ok(sequence)
}

/// Parses all machine sequences of a shop-level sequence file, resolving
/// per-iteration sub-objects when present.
pub fn load_all_machines_sequences(
    value: &Value,
    problem: &Instance,
    iteration: u64,
) -> Result<MachinesSequences> {
    let machines = value
        .get(KEY_SEQUENCE)
        .and_then(|s| s.get(KEY_MACHINE_SEQUENCES))
        .and_then(|m| m.as_object())
        .ok_or_else(|| SchedulerError::Parse("sequence file has no machineSequences".into()))?;

    let mut sequences: MachinesSequences = HashMap::new();
    for (machine_key, entry) in machines {
        let machine = MachineId(machine_key.parse::<u32>().map_err(|_| {
            SchedulerError::Parse(format!("invalid machine id '{machine_key}'"))
        })?);

        let sequence_value = match entry {
            Value::Object(by_iteration) => {
                // per-iteration sweep: pick `iteration % count`
                let keys: Vec<&String> = by_iteration.keys().collect();
                if keys.is_empty() {
                    return Err(SchedulerError::Parse("empty iteration object".into()));
                }
                let key = keys[(iteration % keys.len() as u64) as usize];
                &by_iteration[key]
            }
            other => other,
        };

        sequences.insert(
            machine,
            load_machine_sequence(sequence_value, machine, problem)?,
        );
    }
    Ok(sequences)
}

/// Serializes machine sequences into the result-file layout.
pub fn save_machine_sequences(sequences: &MachinesSequences) -> Value {
    let mut machines = serde_json::Map::new();
    for (machine, sequence) in sequences {
        let entries: Vec<Value> = sequence
            .iter()
            .map(|op| json!([op.job.value(), op.op_id]))
            .collect();
        machines.insert(machine.to_string(), Value::Array(entries));
    }
    json!({ KEY_SEQUENCE: { KEY_MACHINE_SEQUENCES: machines } })
}

/// Serializes the per-module sequences of a production-line solution.
pub fn save_production_line_sequences(
    solution: &ProductionLineSolution,
    line: &ProductionLine,
) -> Value {
    let mut modules = serde_json::Map::new();
    for &module_id in line.module_ids() {
        let Some(module_solution) = solution.module_solution(module_id) else {
            continue;
        };
        let inner = save_machine_sequences(module_solution.chosen_sequences());
        modules.insert(module_id.to_string(), inner[KEY_SEQUENCE].clone());
    }
    json!({ KEY_SEQUENCE: { KEY_MODULES: modules } })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::test_instances;

    #[test]
    fn sequences_round_trip_through_json() {
        let mut problem = test_instances::re_entrant(1, 1, 1, 1, 1, 1, 2);
        let _ = utils::init_problem_graph(&mut problem).unwrap();
        let machine = problem.re_entrant_machines()[0];

        let mut sequences: MachinesSequences = HashMap::new();
        sequences.insert(
            machine,
            vec![
                Operation::new(JobId(0), 1),
                Operation::new(JobId(0), 2),
                Operation::new(JobId(1), 1),
                Operation::new(JobId(1), 2),
            ],
        );

        let value = save_machine_sequences(&sequences);
        let loaded = load_all_machines_sequences(&value, &problem, 0).unwrap();
        assert_eq!(loaded[&machine], sequences[&machine]);
    }
}
