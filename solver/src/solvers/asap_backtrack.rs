//! ASAP insertion with backtracking: each higher pass keeps a stack of
//! last-tried insertion points; when an operation has no feasible position
//! left, the previous one is pulled out and retried one slot further.

use hashbrown::HashMap;

use super::forward;
use super::partial_solution::{PartialSolution, Sequence};
use super::utils;
use crate::algorithms::paths;
use crate::cg::ConstraintGraph;
use crate::cli::CliArgs;
use crate::problem::{Instance, MachineId, Operation};
use crate::utils::StaticTimer;
use crate::{Result, SchedulerError};

pub fn solve(problem: &mut Instance, args: &CliArgs) -> Result<PartialSolution> {
    tracing::info!("computation of the schedule started");

    let mut asapst = utils::init_problem_graph(problem)?;
    let mut dg = problem.delay_graph().clone();

    let machine = forward::re_entrant_machine(problem)?;
    let mut sequence = forward::create_initial_sequence(problem, machine)?;

    let jobs = problem.jobs_output().to_vec();
    let mut to_schedule: Vec<Operation> = Vec::new();
    for &job in jobs.iter().take(jobs.len().saturating_sub(1)) {
        let job_ops = problem.job_operations_on_machine(job, machine);
        to_schedule.extend_from_slice(&job_ops[1..]);
    }

    let total_ops = to_schedule.len() + sequence.len();
    let mut current = 0usize;
    let mut last_insertion_points = vec![0usize; to_schedule.len()];

    let timer = StaticTimer::new(args.time_out * jobs.len() as u32);

    while current < to_schedule.len() && timer.is_running() {
        let op = to_schedule[current];

        match schedule_one_operation(
            &mut dg,
            problem,
            op,
            &mut sequence,
            last_insertion_points[current],
            &mut asapst,
        )? {
            Some(position) => {
                last_insertion_points[current] = position;
                current += 1;
                if current < to_schedule.len() {
                    last_insertion_points[current] = position + 1;
                }
            }
            None => {
                if current == 0 {
                    return Err(SchedulerError::Solver("no solution found".into()));
                }
                // Backtrack: pull the previous operation out and retry it
                // one position later.
                current -= 1;
                sequence.remove(last_insertion_points[current]);
                last_insertion_points[current] += 1;
            }
        }
    }

    let mut sequences: HashMap<MachineId, Sequence> = HashMap::new();
    sequences.insert(machine, sequence.clone());
    let test_edges = utils::all_edges_plus_inferred(problem, &sequences)?;
    let result = paths::compute_asapst_fresh_with_edges(&mut dg, &test_edges);
    if result.has_positive_cycle() || sequence.len() != total_ops {
        return Err(SchedulerError::Infeasible("infeasible solution found".into()));
    }

    let mut solution = PartialSolution::new(sequences, result.times);
    solution.add_inferred_input_sequence(problem);
    Ok(solution)
}

/// First feasible position for `op` at or after `last_insertion_point`,
/// inserting it into `sequence` on success.
pub fn schedule_one_operation(
    dg: &mut ConstraintGraph,
    problem: &Instance,
    op: Operation,
    sequence: &mut Sequence,
    last_insertion_point: usize,
    asapst: &mut paths::PathTimes,
) -> Result<Option<usize>> {
    let machine = problem.machine(&op);
    let start = find_insertion_point(problem, sequence, &op, last_insertion_point);

    for i in start..sequence.len() {
        sequence.insert(i, op);
        let mut sequences: HashMap<MachineId, Sequence> = HashMap::new();
        sequences.insert(machine, sequence.clone());
        let test_edges = utils::all_edges_plus_inferred(problem, &sequences)?;

        paths::initialize_asapst_into(dg, asapst, &[], true);
        let result = paths::compute_asapst_with_edges(dg, asapst, &test_edges);
        if !result.has_positive_cycle() {
            return Ok(Some(i));
        }
        sequence.remove(i);
    }

    Ok(None)
}

/// Earliest position where inserting `op` keeps job order plausible.
fn find_insertion_point(
    problem: &Instance,
    sequence: &[Operation],
    op: &Operation,
    last_insertion_point: usize,
) -> usize {
    let first_job = problem.jobs_output()[0];

    for (i, current) in sequence.iter().enumerate().skip(last_insertion_point) {
        if current.job == first_job && op.job == first_job {
            return i + 1;
        }
        if current.job > op.job {
            return i;
        }
    }
    sequence.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::test_instances;

    #[test]
    fn tight_buffer_schedule() {
        let mut problem = test_instances::re_entrant(1, 1, 1, 1, 1, 1, 4);
        let args = CliArgs::default();
        let solution = solve(&mut problem, &args).unwrap();
        assert_eq!(solution.makespan(), 9);
    }
}
