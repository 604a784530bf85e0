//! Result-object assembly and serialization (JSON or CBOR). The output file
//! is always written: an unsolved run is a result too.

use serde_json::{json, Map, Value};

use crate::cli::{CliArgs, OutputFormat};
use crate::problem::{Instance, ProductionLine};
use crate::solvers::{sequence, PartialSolution, ProductionLineSolution};
use crate::Result;

/// The base result object every run starts from.
pub fn initialize_data(args: &CliArgs) -> Value {
    json!({
        "solved": false,
        "timeout": false,
        "productivity": args.productivity_weight,
        "flexibility": args.flexibility_weight,
        "timeOutValue": args.time_out.as_millis() as u64,
        "version": crate::scheduler::VERSION,
    })
}

/// Nested `jobId -> opId -> startTime` table plus the machine sequences.
pub fn save_solution(
    data: &mut Value,
    solution: &PartialSolution,
    problem: &Instance,
) -> Result<()> {
    let dg = problem.delay_graph();
    let mut schedule = Map::new();

    for (&job, ops) in problem.jobs() {
        let mut by_op = Map::new();
        for op in ops {
            let v = dg.vertex_id(op)?;
            by_op.insert(op.op_id.to_string(), Value::from(solution.asapst()[v]));
        }
        schedule.insert(job.to_string(), Value::Object(by_op));
    }
    data["schedule"] = Value::Object(schedule);

    let sequences = sequence::save_machine_sequences(solution.chosen_sequences());
    merge(data, &sequences);
    Ok(())
}

/// Modular variant: `moduleId -> jobId -> opId -> startTime` plus the
/// per-module sequences.
pub fn save_production_line_solution(
    data: &mut Value,
    solution: &ProductionLineSolution,
    line: &ProductionLine,
) -> Result<()> {
    let mut by_module = Map::new();
    for &module_id in line.module_ids() {
        let module = line.module(module_id);
        let Some(module_solution) = solution.module_solution(module_id) else {
            continue;
        };
        let dg = module.delay_graph();

        let mut by_job = Map::new();
        for (&job, ops) in module.jobs() {
            let mut by_op = Map::new();
            for op in ops {
                let v = dg.vertex_id(op)?;
                by_op.insert(
                    op.op_id.to_string(),
                    Value::from(module_solution.asapst()[v]),
                );
            }
            by_job.insert(job.to_string(), Value::Object(by_op));
        }
        by_module.insert(module_id.to_string(), Value::Object(by_job));
    }
    data["solution"] = Value::Object(by_module);

    let sequences = sequence::save_production_line_sequences(solution, line);
    merge(data, &sequences);
    Ok(())
}

/// Shallow-merges `extra`'s top-level keys into `data`.
pub fn merge(data: &mut Value, extra: &Value) {
    if let (Value::Object(target), Value::Object(source)) = (data, extra) {
        for (key, value) in source {
            target.insert(key.clone(), value.clone());
        }
    }
}

/// Writes the result file next to the requested output path, suffixed by
/// the chosen format.
pub fn write_output(data: &Value, args: &CliArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Json => {
            let path = format!("{}.fms.json", args.output_file);
            let rendered = serde_json::to_string_pretty(data)
                .map_err(|e| crate::SchedulerError::Solver(format!("serializing output: {e}")))?;
            std::fs::write(path, rendered)?;
        }
        OutputFormat::Cbor => {
            let path = format!("{}.fms.cbor", args.output_file);
            let file = std::fs::File::create(path)?;
            ciborium::ser::into_writer(data, file)
                .map_err(|e| crate::SchedulerError::Solver(format!("serializing output: {e}")))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_overwrites_top_level_keys() {
        let mut data = json!({"solved": false, "keep": 1});
        merge(&mut data, &json!({"solved": true, "extra": 2}));
        assert_eq!(data["solved"], true);
        assert_eq!(data["keep"], 1);
        assert_eq!(data["extra"], 2);
    }
}
