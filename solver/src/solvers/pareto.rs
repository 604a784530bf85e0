//! Multi-dimensional BHCS: instead of committing one option per eligible
//! operation, up to `max_partial_solutions` Pareto-nondominated partial
//! solutions are carried from generation to generation.

use hashbrown::HashMap;

use super::forward;
use super::partial_solution::PartialSolution;
use super::pareto_cull::simple_cull;
use super::selection::{EnvironmentalSelectionOperator, GeometricSelectionOperator};
use super::utils;
use crate::algorithms::paths;
use crate::cg::ConstraintGraph;
use crate::cli::{CliArgs, SelectionOperatorType};
use crate::io::dot;
use crate::problem::{Instance, JobId, Operation};
use crate::{Result, SchedulerError};

pub fn solve(problem: &mut Instance, args: &CliArgs) -> Result<Vec<PartialSolution>> {
    tracing::info!("computation of the schedule started");

    let asapst = utils::init_problem_graph(problem)?;
    let mut dg = problem.delay_graph().clone();
    tracing::info!("number of vertices in the delay graph is {}", dg.num_vertices());

    let machine = forward::re_entrant_machine(problem)?;
    let initial = forward::create_initial_sequence(problem, machine)?;
    let mut sequences = HashMap::new();
    sequences.insert(machine, initial);
    let solution = PartialSolution::new(sequences, asapst);

    let mut solutions = vec![solution];

    let jobs = problem.jobs_output().to_vec();
    for &job in jobs.iter().take(jobs.len().saturating_sub(1)) {
        let job_ops = problem.job_operations_on_machine(job, machine).to_vec();
        for op in job_ops.into_iter().skip(1) {
            solutions = schedule_one_operation(&mut dg, problem, solutions, op, args)?;
        }
    }

    for s in &mut solutions {
        s.add_inferred_input_sequence(problem);
    }
    Ok(solutions)
}

/// Expands every frontier member with every feasible option for `eligible`,
/// then culls the union back to a Pareto set.
pub fn schedule_one_operation(
    dg: &mut ConstraintGraph,
    problem: &Instance,
    current_solutions: Vec<PartialSolution>,
    eligible: Operation,
    args: &CliArgs,
) -> Result<Vec<PartialSolution>> {
    let machine = problem.machine(&eligible);

    // keep the generation bounded before expanding it
    let current_generation = match args.selection_operator {
        SelectionOperatorType::Environmental => {
            EnvironmentalSelectionOperator::new(args.max_partial_solutions)
                .reduce(current_solutions)
        }
        SelectionOperatorType::Geometric => {
            GeometricSelectionOperator::new(args.max_partial_solutions).reduce(current_solutions)
        }
    };
    if current_generation.is_empty() {
        return Err(SchedulerError::Solver("no solutions to continue with".into()));
    }

    let mut new_generation: Vec<PartialSolution> = Vec::new();

    for solution in &current_generation {
        tracing::debug!("starting from current solution {solution}");

        let (last_reached, options) =
            forward::create_options(problem, dg, solution, eligible, machine)?;
        if options.is_empty() {
            if tracing::enabled!(tracing::Level::DEBUG) {
                let _ = dot::save_as_dot(dg, "no_options_left.dot", &[]);
            }
            return Err(SchedulerError::Solver(format!(
                "unable to create any option for {eligible}"
            )));
        }

        let job_start = eligible.job;
        let mut asap_times = solution.asapst().clone();
        let prev_job = if job_start > JobId(1) { job_start - 1 } else { JobId(0) };
        let sources = dg.vertices_of_job(prev_job).to_vec();
        let window = dg.vertices_in_range(job_start, last_reached.job);
        paths::compute_asapst_windowed(dg, &mut asap_times, &sources, &window);

        let feasible = forward::evaluate_option_feasibility(
            dg, problem, solution, &options, &asap_times, machine,
        )?;
        new_generation.extend(feasible.into_iter().map(|(s, _)| s));
    }

    if new_generation.is_empty() {
        return Err(SchedulerError::NoFeasibleOption(eligible));
    }

    tracing::debug!(
        "generation of {} became {}",
        current_generation.len(),
        new_generation.len()
    );

    Ok(simple_cull(new_generation, PartialSolution::dominates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::test_instances;

    #[test]
    fn frontier_contains_optimum_with_wide_cap() {
        let mut problem = test_instances::re_entrant(1, 10, 10, 1, 100, 150, 14);
        let mut args = CliArgs::default();
        args.max_partial_solutions = 100;
        let solutions = solve(&mut problem, &args).unwrap();
        assert!(!solutions.is_empty());
        let best = solutions.iter().map(|s| s.makespan()).min().unwrap();
        assert_eq!(best, 281);
    }

    #[test]
    fn tight_buffer_frontier_collapses() {
        let mut problem = test_instances::re_entrant(1, 1, 1, 1, 1, 1, 5);
        let args = CliArgs::default();
        let solutions = solve(&mut problem, &args).unwrap();
        assert!(solutions.iter().all(|s| s.makespan() == 11));
    }

    #[test]
    fn geometric_selection_reaches_the_same_optimum() {
        let mut problem = test_instances::re_entrant(1, 10, 10, 1, 100, 150, 14);
        let mut args = CliArgs::default();
        args.selection_operator = SelectionOperatorType::Geometric;
        args.max_partial_solutions = 100;
        let solutions = solve(&mut problem, &args).unwrap();
        assert!(!solutions.is_empty());
        let best = solutions.iter().map(|s| s.makespan()).min().unwrap();
        assert_eq!(best, 281);
    }
}
