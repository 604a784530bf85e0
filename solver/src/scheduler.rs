//! Top-level dispatch: load the instance, run the selected algorithm(s),
//! assemble the result object and write the output file. The output file is
//! written on every run; an absent solution is reported inside it, not by a
//! missing file.

use rand::Rng;
use serde_json::{json, Value};

use crate::algorithms::paths;
use crate::cli::{AlgorithmType, CliArgs, ModularAlgorithmType};
use crate::io::xml::{self, ParsedInput};
use crate::io::output;
use crate::problem::{Instance, ModuleId, ProductionLine};
use crate::solvers::broadcast::SolverStore;
use crate::solvers::{
    asap_backtrack, anytime, branch_bound, broadcast, cocktail, dd, forward, mneh, pareto,
    sequence, simple, solver_data::SolverData, PartialSolution, Solutions,
};
use crate::{Result, SchedulerError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Entry point of the command line: parse, solve, write.
pub fn compute(args: &CliArgs) -> Result<()> {
    match xml::parse_file(&args.input_file, args.shop_type)? {
        ParsedInput::Shop(mut instance) => compute_shop(&mut instance, args),
        ParsedInput::Modular(mut line) => compute_modular(&mut line, args),
    }
}

fn compute_shop(instance: &mut Instance, args: &CliArgs) -> Result<()> {
    if !args.maint_policy_file.is_empty() {
        xml::load_maintenance_policy(instance, &args.maint_policy_file)?;
    }

    tracing::info!(">> {} selected <<", args.algorithm.description());
    tracing::info!("solving {}", instance.name());

    let start = std::time::Instant::now();
    let mut data = output::initialize_data(args);
    data["jobs"] = Value::from(instance.number_of_jobs());
    data["machines"] = Value::from(instance.number_of_machines());

    match run_algorithm(instance, args, 0) {
        Ok((solutions, extra)) if !solutions.is_empty() => {
            output::merge(&mut data, &extra);
            let best = solutions
                .iter()
                .min_by_key(|s| s.makespan())
                .expect("non-empty solutions");
            data["solved"] = Value::Bool(true);
            data["minMakespan"] = Value::from(best.makespan());
            data["bestSolution"] = Value::from(best.id());
            output::save_solution(&mut data, best, instance)?;
        }
        Ok((_, extra)) => {
            output::merge(&mut data, &extra);
            if data.get("error").is_none() {
                data["error"] = Value::from("no-solution");
            }
        }
        Err(e) => {
            tracing::error!("scheduler failed: {e}");
            data["error"] = Value::from("scheduler");
        }
    }

    if data.get("termination") == Some(&Value::from("time-out")) {
        data["timeout"] = Value::Bool(true);
    }

    data["totalTime"] = Value::from(start.elapsed().as_secs_f64());
    output::write_output(&data, args)
}

fn compute_modular(line: &mut ProductionLine, args: &CliArgs) -> Result<()> {
    tracing::info!(">> {} selected <<", args.modular_algorithm.short_name());

    let start = std::time::Instant::now();
    let mut data = output::initialize_data(args);
    data["jobs"] = Value::from(line.number_of_jobs());
    data["machines"] = Value::from(line.number_of_machines());

    let outcome = match args.modular_algorithm {
        ModularAlgorithmType::Broadcast => broadcast::solve(line, args),
        ModularAlgorithmType::Cocktail => cocktail::solve(line, args),
    };

    match outcome {
        Ok((solutions, extra)) if !solutions.is_empty() => {
            output::merge(&mut data, &extra);
            let best = &solutions[0];
            data["solved"] = Value::Bool(true);
            data["minMakespan"] = Value::from(best.makespan());
            output::save_production_line_solution(&mut data, best, line)?;
        }
        Ok((_, extra)) => {
            output::merge(&mut data, &extra);
            if data.get("error").is_none() {
                data["error"] = Value::from("no-convergence");
            }
        }
        Err(e) => {
            tracing::error!("modular scheduler failed: {e}");
            data["error"] = Value::from("scheduler");
        }
    }

    data["totalTime"] = Value::from(start.elapsed().as_secs_f64());
    output::write_output(&data, args)
}

/// Runs one algorithm against a shop instance.
pub fn run_algorithm(
    problem: &mut Instance,
    args: &CliArgs,
    iteration: u64,
) -> Result<(Solutions, Value)> {
    let data = json!({ "algorithm": args.algorithm.short_name() });

    let with_data = |solutions: Solutions| (solutions, data.clone());

    match args.algorithm {
        AlgorithmType::Asap
        | AlgorithmType::Bhcs
        | AlgorithmType::Mibhcs
        | AlgorithmType::Misim
        | AlgorithmType::Miasap
        | AlgorithmType::Miasapsim => Ok(with_data(vec![forward::solve(problem, args)?])),
        AlgorithmType::AsapBacktrack => Ok(with_data(vec![asap_backtrack::solve(problem, args)?])),
        AlgorithmType::Mdbhcs => Ok(with_data(pareto::solve(problem, args)?)),
        AlgorithmType::BranchBound => Ok(with_data(vec![branch_bound::solve(problem, args)?])),
        AlgorithmType::Anytime => Ok(with_data(vec![anytime::solve(problem, args)?])),
        AlgorithmType::Mneh
        | AlgorithmType::MnehAsap
        | AlgorithmType::MnehAsapBacktrack
        | AlgorithmType::MnehBhcsCombi
        | AlgorithmType::MnehBhcsFlexible
        | AlgorithmType::Mineh
        | AlgorithmType::Minehsim => Ok(with_data(vec![mneh::solve(problem, args)?])),
        AlgorithmType::Dd | AlgorithmType::DdSeed => {
            let (solutions, mut extra) = dd::solve(problem, args)?;
            output::merge(&mut extra, &data);
            Ok((solutions, extra))
        }
        AlgorithmType::GivenSequence => {
            let (solutions, mut extra) = sequence::solve(problem, args, iteration)?;
            output::merge(&mut extra, &data);
            Ok((solutions, extra))
        }
        AlgorithmType::Simple => {
            let (solutions, mut extra) = simple::solve(problem, args)?;
            output::merge(&mut extra, &data);
            Ok((solutions, extra))
        }
    }
}

/// Runs the algorithm assigned to one module of a production line. The
/// propagators call this once per module per sweep; resumable solvers keep
/// their state in `store`.
pub fn run_module_algorithm(
    line: &mut ProductionLine,
    module_id: ModuleId,
    args: &CliArgs,
    iteration: u64,
    store: &mut SolverStore,
) -> Result<PartialSolution> {
    let algorithm = select_algorithm(module_id, line.number_of_modules(), args);
    let mut module_args = args.clone();
    module_args.algorithm = algorithm;

    let solutions = match algorithm {
        AlgorithmType::GivenSequence => {
            // modules resolve their own entry of the sequence file
            let module = line.module_mut(module_id);
            let (solutions, _) = sequence::solve_module(module, &module_args, iteration)?;
            solutions
        }
        AlgorithmType::Dd | AlgorithmType::DdSeed => {
            let old_data = store.remove(&module_id).map(|d| *d.into_dd());
            let module = line.module_mut(module_id);
            let (solutions, _, new_data) =
                dd::solve_resumable(module.instance_mut(), &module_args, old_data)?;
            store.insert(module_id, SolverData::Dd(Box::new(new_data)));
            solutions
        }
        _ => {
            let module = line.module_mut(module_id);
            let (solutions, _) = run_algorithm(module.instance_mut(), &module_args, iteration)?;
            solutions
        }
    };

    solutions
        .into_iter()
        .min_by_key(|s| s.makespan())
        .ok_or_else(|| SchedulerError::Solver("local scheduler produced no solution".into()))
}

/// Picks the algorithm for a module when several were requested.
pub fn select_algorithm(module_id: ModuleId, num_modules: usize, args: &CliArgs) -> AlgorithmType {
    use crate::cli::MultiAlgorithmBehaviour as B;

    let algorithms = if args.algorithms.is_empty() {
        std::slice::from_ref(&args.algorithm)
    } else {
        &args.algorithms[..]
    };
    let num_algorithms = algorithms.len();

    match args.multi_algorithm_behaviour {
        B::First => algorithms[0],
        B::Last => algorithms[num_algorithms - 1],
        B::Interleave => algorithms[module_id.value() as usize % num_algorithms],
        B::Random => algorithms[rand::rng().random_range(0..num_algorithms)],
        B::Divide => {
            // split the modules into contiguous groups, one per algorithm
            let group_count = num_algorithms.min(num_modules.max(1));
            let base_group_size = num_modules.max(1) / group_count;
            let remainder = num_modules.max(1) % group_count;
            let index = module_id.value() as usize;

            let algorithm_index = if index < remainder * (base_group_size + 1) {
                index / (base_group_size + 1)
            } else {
                remainder + (index - remainder * (base_group_size + 1)) / base_group_size
            };
            algorithms[algorithm_index.min(num_algorithms - 1)]
        }
    }
}

/// Sanity check of a parsed instance: local deadline windows must admit the
/// local setup times, and the base graph must be positive-cycle free.
pub fn check_consistency(instance: &Instance) -> Result<(bool, paths::PathTimes)> {
    let mut consistent = true;
    let dg = instance.delay_graph();

    for ops in instance.jobs().values() {
        for pair in ops.windows(2) {
            let (prev, op) = (pair[0], pair[1]);
            let (Ok(prev_v), Ok(op_v)) = (dg.vertex_id(&prev), dg.vertex_id(&op)) else {
                continue;
            };
            if !dg.has_edge(op_v, prev_v) {
                continue;
            }
            let minimum_setup = dg.weight(prev_v, op_v)?;
            let deadline = dg.weight(op_v, prev_v)?;
            if minimum_setup + deadline > 0 {
                consistent = false;
                tracing::warn!(
                    "deadline between {prev} and {op} cannot be satisfied ({minimum_setup} > {})",
                    -deadline
                );
            }
        }
    }

    let result = paths::compute_asapst_fresh(dg);
    Ok((consistent && !result.has_positive_cycle(), result.times))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::MultiAlgorithmBehaviour;

    #[test]
    fn divide_assigns_contiguous_groups() {
        let mut args = CliArgs::default();
        args.algorithms = vec![AlgorithmType::Bhcs, AlgorithmType::Asap];
        args.multi_algorithm_behaviour = MultiAlgorithmBehaviour::Divide;

        // 4 modules over 2 algorithms: two modules each
        assert_eq!(select_algorithm(ModuleId(0), 4, &args), AlgorithmType::Bhcs);
        assert_eq!(select_algorithm(ModuleId(1), 4, &args), AlgorithmType::Bhcs);
        assert_eq!(select_algorithm(ModuleId(2), 4, &args), AlgorithmType::Asap);
        assert_eq!(select_algorithm(ModuleId(3), 4, &args), AlgorithmType::Asap);
    }

    #[test]
    fn interleave_cycles_through_algorithms() {
        let mut args = CliArgs::default();
        args.algorithms = vec![AlgorithmType::Bhcs, AlgorithmType::Asap];
        args.multi_algorithm_behaviour = MultiAlgorithmBehaviour::Interleave;
        assert_eq!(select_algorithm(ModuleId(0), 3, &args), AlgorithmType::Bhcs);
        assert_eq!(select_algorithm(ModuleId(1), 3, &args), AlgorithmType::Asap);
        assert_eq!(select_algorithm(ModuleId(2), 3, &args), AlgorithmType::Bhcs);
    }
}
