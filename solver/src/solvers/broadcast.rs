//! Broadcast propagation over a modular production line: every round, each
//! module schedules locally with its current boundary bounds, the resulting
//! bounds travel across every boundary in both directions, and the line
//! converges when what each module receives matches what it already sent.

use serde_json::{json, Value};

use super::history::DistributedSchedulerHistory;
use super::partial_solution::PartialSolution;
use super::production_line_solution::{ModulesSolutions, ProductionLineSolution};
use super::solver_data::SolverData;
use crate::cg::Builder;
use crate::cli::CliArgs;
use crate::problem::{
    GlobalBounds, IntervalSpec, Module, ModuleBounds, ProductionLine, TimeInterval,
};
use crate::scheduler;
use crate::utils::StaticTimer;
use crate::Result;

pub const ERROR_NO_CONVERGENCE: &str = "no-convergence";
pub const ERROR_LOCAL_SCHEDULER: &str = "local-scheduler";
pub const ERROR_TIME_OUT: &str = "time-out";

/// Which boundary of a module a bound extraction covers.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum BoundsSide {
    Input,
    Output,
    Both,
}

/// Per-module solver state kept across propagation rounds.
pub type SolverStore = hashbrown::HashMap<crate::problem::ModuleId, SolverData>;

pub fn solve(
    line: &mut ProductionLine,
    args: &CliArgs,
) -> Result<(Vec<ProductionLineSolution>, Value)> {
    init_module_graphs(line)?;

    let options = &args.modular_options;
    let timer = StaticTimer::new(options.time_out);
    let mut history =
        DistributedSchedulerHistory::new(options.store_bounds, options.store_sequence);
    let mut store = SolverStore::default();

    let module_ids = line.module_ids().to_vec();
    let mut iterations: u64 = 0;
    let mut error: Option<&'static str> = None;

    while iterations < options.max_iterations && timer.is_running() {
        let mut round_bounds = GlobalBounds::default();
        let mut module_results = ModulesSolutions::default();

        // Run every local scheduler with the bounds known so far.
        for &id in &module_ids {
            line.module_mut(id).set_iteration(&iterations.to_string());
            match scheduler::run_module_algorithm(line, id, args, iterations, &mut store) {
                Ok(result) => {
                    let bounds =
                        get_bounds(line.module(id), &result, false, BoundsSide::Both)?;
                    history.add_module(id, &bounds, &result);
                    round_bounds.insert(id, bounds);
                    module_results.insert(id, result);
                }
                Err(e) => {
                    tracing::error!("broadcast: local scheduler failed: {e}");
                    error = Some(ERROR_LOCAL_SCHEDULER);
                    break;
                }
            }
        }
        if error.is_some() {
            break;
        }
        history.add_empty();

        // Propagate across every boundary, in both directions, and check
        // whether anything changed.
        let mut converged = true;
        for pair in module_ids.windows(2) {
            let (left, right) = (pair[0], pair[1]);

            let to_input = line.to_input_bounds(right, &round_bounds[&left].output);
            converged &= is_converged(&to_input, &round_bounds[&right].input);
            line.module_mut(right).add_input_bounds(&to_input);

            let to_output = line.to_output_bounds(left, &round_bounds[&right].input);
            converged &= is_converged(&to_output, &round_bounds[&left].output);
            line.module_mut(left).add_output_bounds(&to_output);
        }

        if !options.no_self_bounds {
            for &id in &module_ids {
                let bounds = round_bounds[&id].clone();
                let module = line.module_mut(id);
                module.add_input_bounds(&bounds.input);
                module.add_output_bounds(&bounds.output);
            }
        }

        if converged {
            let merged = merge_solutions(line, module_results);
            let data = base_result_data(&history, line, iterations);
            return Ok((vec![merged], data));
        }

        iterations += 1;
    }

    let mut data = base_result_data(&history, line, iterations);
    data["timeout"] = Value::Bool(timer.is_time_up());
    data["error"] = Value::String(
        error
            .unwrap_or(if timer.is_time_up() {
                ERROR_TIME_OUT
            } else {
                ERROR_NO_CONVERGENCE
            })
            .to_string(),
    );
    Ok((Vec::new(), data))
}

/// Builds the constraint graph of every module once, up front.
pub fn init_module_graphs(line: &mut ProductionLine) -> Result<()> {
    let ids = line.module_ids().to_vec();
    for id in ids {
        let module = line.module_mut(id);
        if !module.is_graph_initialized() {
            let dg = Builder::build(module.instance())?;
            module.update_delay_graph(dg);
        }
    }
    Ok(())
}

/// Separation intervals between consecutive jobs at the module's
/// boundaries, read off the local schedule. The minimum separation is what
/// the schedule achieves; the maximum is only published when upper-bound
/// propagation is enabled.
pub fn get_bounds(
    module: &Module,
    solution: &PartialSolution,
    upper_bound: bool,
    side: BoundsSide,
) -> Result<ModuleBounds> {
    let mut bounds = ModuleBounds::default();

    if side != BoundsSide::Output {
        bounds.input = boundary_intervals(module, solution, upper_bound, true)?;
    }
    if side != BoundsSide::Input {
        bounds.output = boundary_intervals(module, solution, upper_bound, false)?;
    }
    Ok(bounds)
}

fn boundary_intervals(
    module: &Module,
    solution: &PartialSolution,
    upper_bound: bool,
    input: bool,
) -> Result<IntervalSpec> {
    let dg = module.delay_graph();
    let asapst = solution.asapst();
    let mut spec = IntervalSpec::default();

    let jobs = module.jobs_output();
    for pair in jobs.windows(2) {
        let op_of = |job| {
            let ops = module.job_ops(job);
            if input {
                ops[0]
            } else {
                *ops.last().expect("non-empty job")
            }
        };
        let first = dg.vertex_id(&op_of(pair[0]))?;
        let second = dg.vertex_id(&op_of(pair[1]))?;
        if first >= asapst.len() || second >= asapst.len() {
            continue;
        }
        let separation = asapst[second] - asapst[first];

        let interval = TimeInterval::new(
            Some(separation),
            if upper_bound { Some(separation) } else { None },
        );
        spec.entry(pair[0]).or_default().insert(pair[1], interval);
    }
    Ok(spec)
}

/// Bounds are converged when receiving them changes nothing: every incoming
/// bound is already implied by the bound the module holds. A bound that is
/// unspecified on either side counts as converged (transfer due dates may
/// not exist, so some translated bounds are legitimately absent).
pub fn is_converged(incoming: &IntervalSpec, held: &IntervalSpec) -> bool {
    for (job_fst, incoming_by_to) in incoming {
        let Some(held_by_to) = held.get(job_fst) else {
            continue;
        };
        for (job_snd, received) in incoming_by_to {
            let Some(current) = held_by_to.get(job_snd) else {
                continue;
            };
            // a tighter minimum separation still needs to be applied
            if let (Some(r), Some(c)) = (received.min, current.min) {
                if r > c {
                    return false;
                }
            }
            // a tighter maximum separation still needs to be applied
            if let (Some(r), Some(c)) = (received.max, current.max) {
                if r < c {
                    return false;
                }
            }
        }
    }
    true
}

/// Wraps the per-module solutions of a converged round.
pub fn merge_solutions(
    _line: &ProductionLine,
    solutions: ModulesSolutions,
) -> ProductionLineSolution {
    ProductionLineSolution::new(solutions)
}

pub fn base_result_data(
    history: &DistributedSchedulerHistory,
    line: &ProductionLine,
    iterations: u64,
) -> Value {
    let mut data = json!({
        "modules": line.number_of_modules(),
        "iterations": iterations,
    });
    if history.store_bounds() {
        data["bounds"] = history.bounds_json();
    }
    if history.store_sequence() {
        data["sequencesHistory"] = history.sequences_json();
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::TimeInterval;

    #[test]
    fn implied_bounds_count_as_converged() {
        let job0 = crate::problem::JobId(0);
        let job1 = crate::problem::JobId(1);

        let mut incoming = IntervalSpec::default();
        let mut held = IntervalSpec::default();
        held.entry(job0)
            .or_default()
            .insert(job1, TimeInterval::new(Some(5), Some(9)));

        // weaker or absent incoming bounds change nothing
        incoming
            .entry(job0)
            .or_default()
            .insert(job1, TimeInterval::new(Some(3), None));
        assert!(is_converged(&incoming, &held));

        // a tighter minimum still needs applying
        incoming
            .entry(job0)
            .or_default()
            .insert(job1, TimeInterval::new(Some(6), None));
        assert!(!is_converged(&incoming, &held));

        // a tighter maximum still needs applying
        incoming
            .entry(job0)
            .or_default()
            .insert(job1, TimeInterval::new(Some(3), Some(8)));
        assert!(!is_converged(&incoming, &held));
    }
}
