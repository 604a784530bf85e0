//! Baseline scheduler: one job at a time through the re-entrant loop, no
//! interleaving. Cheap, always feasible, and a seed for the exact solvers.

use serde_json::json;

use super::partial_solution::PartialSolution;
use super::{utils, Solutions};
use crate::algorithms::paths;
use crate::cli::CliArgs;
use crate::problem::Instance;
use crate::{Result, SchedulerError};

pub fn solve(
    problem: &mut Instance,
    _args: &CliArgs,
) -> Result<(Solutions, serde_json::Value)> {
    let _ = utils::init_problem_graph(problem)?;

    let mut solution = utils::create_trivial_solution(problem);
    let edges = solution.all_and_inferred_edges(problem)?;

    let mut dg = problem.delay_graph().clone();
    let result = paths::compute_asapst_fresh_with_edges(&mut dg, &edges);
    if result.has_positive_cycle() {
        return Err(SchedulerError::Infeasible(
            "the trivial schedule is infeasible".into(),
        ));
    }
    solution.set_asapst(result.times);
    solution.add_inferred_input_sequence(problem);

    Ok((vec![solution], json!({})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::test_instances;

    #[test]
    fn trivial_schedule_matches_serial_makespan() {
        let mut problem = test_instances::re_entrant(1, 1, 1, 1, 1, 1, 50);
        let (solutions, _) = solve(&mut problem, &CliArgs::default()).unwrap();
        assert_eq!(solutions[0].makespan(), 101);
    }
}
