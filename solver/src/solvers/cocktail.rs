//! Cocktail propagation: alternating forward and backward sweeps through
//! the modules. Each sweep reschedules every module once, handing bounds to
//! the neighbour it moves towards. Upper-bound propagation switches on once
//! the lower bounds have converged; resumable local solvers keep their
//! state in a per-module store between sweeps.

use serde_json::Value;

use super::broadcast::{
    self, base_result_data, get_bounds, is_converged, merge_solutions, BoundsSide, SolverStore,
    ERROR_LOCAL_SCHEDULER, ERROR_NO_CONVERGENCE, ERROR_TIME_OUT,
};
use super::history::DistributedSchedulerHistory;
use super::production_line_solution::{ModulesSolutions, ProductionLineSolution};
use crate::cli::CliArgs;
use crate::problem::{ModuleBounds, ProductionLine};
use crate::scheduler;
use crate::utils::StaticTimer;
use crate::Result;

struct SingleIterationResult {
    module_results: ModulesSolutions,
    converged: bool,
    error: Option<&'static str>,
}

pub fn solve(
    line: &mut ProductionLine,
    args: &CliArgs,
) -> Result<(Vec<ProductionLineSolution>, Value)> {
    broadcast::init_module_graphs(line)?;

    let options = &args.modular_options;
    let timer = StaticTimer::new(options.time_out);
    let mut history =
        DistributedSchedulerHistory::new(options.store_bounds, options.store_sequence);
    let mut store = SolverStore::default();

    let mut iterations: u64 = 0;
    let mut converged_lower_bound = false;
    let mut error: Option<&'static str> = None;

    while iterations < options.max_iterations && timer.is_running() {
        let result = single_iteration(
            line,
            args,
            iterations,
            converged_lower_bound,
            &timer,
            &mut history,
            &mut store,
        )?;

        if let Some(e) = result.error {
            error = Some(e);
            break;
        }

        if result.converged && converged_lower_bound {
            let merged = merge_solutions(line, result.module_results);
            let data = base_result_data(&history, line, iterations);
            return Ok((vec![merged], data));
        }

        // the upper bounds start travelling once the lower bounds settled
        converged_lower_bound |= result.converged;
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

/// One forward sweep followed by one backward sweep.
#[allow(clippy::too_many_arguments)]
fn single_iteration(
    line: &mut ProductionLine,
    args: &CliArgs,
    iteration: u64,
    converged_lower_bound: bool,
    timer: &StaticTimer,
    history: &mut DistributedSchedulerHistory,
    store: &mut SolverStore,
) -> Result<SingleIterationResult> {
    let upper_bound = converged_lower_bound;
    let mut module_results = ModulesSolutions::default();
    let mut bounds = ModuleBounds::default();

    let mut module_id = line.first_module_id();
    let mut first = true;
    let mut can_continue = true;

    // forward sweep: output bounds travel to the next module's input
    while can_continue && timer.is_running() {
        let current = module_id;
        line.module_mut(current)
            .set_iteration(&format!("{iteration}F"));
        can_continue = line.has_next_module(current);

        if !first {
            let translated = line.to_input_bounds(current, &bounds.output);
            line.module_mut(current).add_input_bounds(&translated);
        }
        first = false;

        let side = if can_continue {
            BoundsSide::Output
        } else {
            BoundsSide::Input
        };

        match scheduler::run_module_algorithm(line, current, args, 2 * iteration, store) {
            Ok(result) => {
                bounds = get_bounds(line.module(current), &result, upper_bound, side)?;
                apply_self_bounds(line, args, current, &bounds);
                history.add_module(current, &bounds, &result);
                if !can_continue {
                    module_results.insert(current, result);
                }
            }
            Err(e) => {
                tracing::error!("cocktail: exception while running algorithm: {e}");
                return Ok(SingleIterationResult {
                    module_results: ModulesSolutions::default(),
                    converged: false,
                    error: Some(ERROR_LOCAL_SCHEDULER),
                });
            }
        }

        if can_continue {
            module_id = line.next_module_id(current);
        }
    }
    history.add_empty();

    // backward sweep: input bounds travel to the previous module's output
    let mut first = true;
    let mut can_continue = true;
    let mut converged = true;

    while can_continue && timer.is_running() {
        let current = module_id;
        line.module_mut(current)
            .set_iteration(&format!("{iteration}B"));
        can_continue = line.has_prev_module(current);
        if can_continue {
            module_id = line.prev_module_id(current);
        }

        if first {
            // the last forward module already ran this round
            first = false;
            continue;
        }

        let translated = line.to_output_bounds(current, &bounds.input);
        line.module_mut(current).add_output_bounds(&translated);

        match scheduler::run_module_algorithm(line, current, args, 2 * iteration + 1, store) {
            Ok(result) => {
                // one side propagates, the other checks convergence
                bounds = get_bounds(line.module(current), &result, upper_bound, BoundsSide::Both)?;
                apply_self_bounds(line, args, current, &bounds);
                history.add_module(current, &bounds, &result);

                converged &= is_converged(&translated, &bounds.output);
                module_results.insert(current, result);
            }
            Err(e) => {
                tracing::error!("cocktail: exception while running algorithm: {e}");
                return Ok(SingleIterationResult {
                    module_results: ModulesSolutions::default(),
                    converged: false,
                    error: Some(ERROR_LOCAL_SCHEDULER),
                });
            }
        }
    }
    history.add_empty();

    if timer.is_time_up() {
        tracing::warn!("cocktail: time limit reached");
        return Ok(SingleIterationResult {
            module_results: ModulesSolutions::default(),
            converged: false,
            error: Some(ERROR_TIME_OUT),
        });
    }

    Ok(SingleIterationResult {
        module_results,
        converged,
        error: None,
    })
}

fn apply_self_bounds(
    line: &mut ProductionLine,
    args: &CliArgs,
    module_id: crate::problem::ModuleId,
    bounds: &ModuleBounds,
) {
    if args.modular_options.no_self_bounds {
        return;
    }
    let module = line.module_mut(module_id);
    module.add_input_bounds(&bounds.input);
    module.add_output_bounds(&bounds.output);
}
