//! Offline schedule repair after a maintenance insertion made the chosen
//! sequence infeasible: the missing second passes between the last committed
//! second pass and the offending job are pulled forward, their later
//! duplicates removed, and the repair recurses while infeasibility remains.

use super::maintenance;
use super::partial_solution::PartialSolution;
use super::scheduling_option::SchedulingOption;
use crate::algorithms::paths::{self, PathTimes};
use crate::cg::ConstraintGraph;
use crate::problem::{plexity, Instance, JobId, MachineId, Operation, OperationId};
use crate::{Result, SchedulerError};

pub fn repair_schedule_offline(
    problem: &Instance,
    dg: &mut ConstraintGraph,
    solution: PartialSolution,
    eligible: Operation,
    asapst: &mut PathTimes,
) -> Result<PartialSolution> {
    let machine = problem.machine(&eligible);
    let first_re_op = problem.machine_operations(machine)[0];
    let second_re_op = first_re_op + 1;

    let latest = solution.last_inserted_index(machine);
    tracing::info!(
        "schedule became infeasible around position {latest} of machine {machine}"
    );

    let (last_first_pass, start) =
        find_second_to_last_first_pass(&solution, machine, first_re_op, latest);

    // the repair window opens after the last committed second pass
    let last_committed_second_pass =
        find_last_committed_second_pass(&solution, machine, second_re_op, start);

    if start == 0 {
        return Err(SchedulerError::Solver(
            "no repair strategy can be applied".into(),
        ));
    }

    tracing::info!(
        "last first pass {last_first_pass}, repair start {start}, last committed second pass {:?}",
        last_committed_second_pass
    );

    // insert the missing second passes in job order
    let mut insertions: Vec<Operation> = Vec::new();
    let from = last_committed_second_pass.map(|j| j + 1).unwrap_or(JobId(0));
    let mut job = from;
    while job <= eligible.job {
        if job <= last_first_pass
            && problem.re_entrancies_of(&Operation::new(job, first_re_op)) == plexity::DUPLEX
        {
            insertions.push(Operation::new(job, second_re_op));
        }
        job = job + 1;
    }

    let mut solution = insert_repair(&solution, machine, asapst, &insertions, start);

    // remove the now-duplicated later instances (and stray maintenance)
    let mut removals = insertions;
    for &v in dg.maint_vertices() {
        removals.push(dg.operation(v));
    }

    let remove_start = solution.last_inserted_index(machine) + 1;
    let remove_end = solution.machine_sequence(machine).len();
    solution = remove_repair(&solution, machine, asapst, &removals, remove_start, remove_end);

    // verify the repair over the whole graph
    let mut new_asapst = paths::initialize_asapst(dg, &[], true);
    let result = maintenance::recompute_schedule(
        problem,
        &mut solution,
        dg,
        machine,
        &mut new_asapst,
        &[],
        &[],
    )?;
    if result.has_positive_cycle() {
        tracing::info!("infeasible schedule generated after repair; repairing again");
        solution = repair_schedule_offline(problem, dg, solution, eligible, &mut new_asapst)?;
    }

    // future insertions resume after the operation that caused the repair
    let sequence = solution.machine_sequence(machine).to_vec();
    for (i, op) in sequence.iter().enumerate() {
        if *op == eligible {
            solution.set_first_feasible_index(machine, i + 1);
            break;
        }
    }
    solution.set_asapst(new_asapst);
    solution.incr_repair_count();
    Ok(solution)
}

/// Walks back from `start` to the second-to-last first pass. Returns the
/// job of that pass and the position right after it.
fn find_second_to_last_first_pass(
    solution: &PartialSolution,
    machine: MachineId,
    first_re_op: OperationId,
    start: usize,
) -> (JobId, usize) {
    let sequence = solution.machine_sequence(machine);
    let mut last_first_pass = JobId::MAX;
    let mut nr_first = 0;

    let mut i = start.min(sequence.len().saturating_sub(1));
    while i > 0 {
        let op = &sequence[i];
        if op.op_id == first_re_op && !op.is_maintenance() {
            nr_first += 1;
            last_first_pass = op.job;
            if nr_first == 2 {
                return (last_first_pass, i + 1);
            }
        }
        i -= 1;
    }
    (last_first_pass, 0)
}

/// Job of the last second pass committed before `start`, if any.
fn find_last_committed_second_pass(
    solution: &PartialSolution,
    machine: MachineId,
    second_re_op: OperationId,
    start: usize,
) -> Option<JobId> {
    let sequence = solution.machine_sequence(machine);
    let mut i = start.saturating_sub(1);
    while i > 0 {
        if sequence[i].op_id == second_re_op && !sequence[i].is_maintenance() {
            return Some(sequence[i].job);
        }
        i -= 1;
    }
    None
}

/// Inserts the missing second passes one after another starting at `start`.
fn insert_repair(
    solution: &PartialSolution,
    machine: MachineId,
    asapst: &PathTimes,
    ops: &[Operation],
    start: usize,
) -> PartialSolution {
    let mut solution = solution.clone();
    let mut position = start;

    for &op in ops {
        let sequence = solution.machine_sequence(machine);
        let prev = sequence[position - 1];
        let next = sequence[position];
        tracing::info!("adding {op} between {prev} and {next}");

        let option = SchedulingOption::new(prev, op, next, position);
        solution = solution.add(machine, &option, asapst);
        position = solution.last_inserted_index(machine);
    }
    solution
}

/// Removes every operation from `ops` found in positions `[start, end)`.
fn remove_repair(
    solution: &PartialSolution,
    machine: MachineId,
    asapst: &PathTimes,
    ops: &[Operation],
    start: usize,
    end: usize,
) -> PartialSolution {
    let mut solution = solution.clone();
    let mut i = start;
    let mut j = start;

    while j < end {
        let sequence = solution.machine_sequence(machine);
        if i >= 1 && i < sequence.len() && ops.contains(&sequence[i - 1]) {
            let prev = sequence[i - 2];
            let cur = sequence[i - 1];
            let next = sequence[i];
            tracing::info!("removing duplicated {cur} before {next} (after {prev})");

            let option = SchedulingOption::new(prev, cur, next, i - 1);
            let was_maintenance = cur.is_maintenance();
            solution = solution.remove(machine, &option, asapst, true);
            if was_maintenance {
                solution.set_maint_count(solution.maint_count().saturating_sub(1));
            }
        } else {
            i += 1;
        }
        j += 1;
    }
    solution
}
