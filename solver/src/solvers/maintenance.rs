//! Maintenance insertion over idle intervals of the re-entrant machine.
//!
//! Maintenance and setup cannot overlap: a maintenance operation extends the
//! gap it is spliced into, and a negative back edge keeps the successor out
//! of the maintenance interval. Insertions that make the schedule
//! infeasible hand over to the offline repair routine.

use super::partial_solution::PartialSolution;
use super::repair;
use super::scheduling_option::SchedulingOption;
use super::utils;
use crate::algorithms::paths::{self, LongestPathResult, PathTimes, ASAP_START_VALUE};
use crate::cg::{ConstraintGraph, VertexId};
use crate::cli::CliArgs;
use crate::problem::{Instance, JobId, MachineId, MaintType, MaintenancePolicy, Operation};
use crate::{Delay, Result, SchedulerError};

/// Hard trigger fraction of the max-idle heuristic: close enough to a
/// threshold counts as reaching it.
const MAX_IDLE_FACTOR: f64 = 0.9;

/// Scans the complete sequence once scheduling is done (the `*sim` variants
/// and the closing pass of the others).
pub fn trigger_maintenance_at_end(
    dg: ConstraintGraph,
    problem: &mut Instance,
    machine: MachineId,
    solution: &PartialSolution,
    args: &CliArgs,
) -> Result<(PartialSolution, ConstraintGraph)> {
    let sequence = solution.machine_sequence(machine);
    let Some(&last) = sequence.last() else {
        return Ok((solution.clone(), dg));
    };
    trigger_maintenance(dg, problem, solution, last, last, args)
}

/// Evaluates the sequence right after an insertion was committed.
pub fn trigger_maintenance_after_option(
    dg: ConstraintGraph,
    problem: &mut Instance,
    solution: &PartialSolution,
    option: &SchedulingOption,
    args: &CliArgs,
) -> Result<(PartialSolution, ConstraintGraph)> {
    trigger_maintenance(dg, problem, solution, option.cur, option.next, args)
}

/// Re-evaluates the schedule until no further maintenance is inserted.
pub fn trigger_maintenance(
    dg: ConstraintGraph,
    problem: &mut Instance,
    solution: &PartialSolution,
    eligible: Operation,
    next: Operation,
    args: &CliArgs,
) -> Result<(PartialSolution, ConstraintGraph)> {
    let machine = problem.machine(&eligible);

    let mut old_solution = solution.clone();
    let (mut updated, mut updated_dg) =
        evaluate_schedule(problem, dg, &old_solution, eligible, next, args)?;

    while updated.machine_sequence(machine) != old_solution.machine_sequence(machine) {
        old_solution = updated;
        let (next_solution, next_dg) =
            evaluate_schedule(problem, updated_dg, &old_solution, eligible, next, args)?;
        updated = next_solution;
        updated_dg = next_dg;
    }
    Ok((updated, updated_dg))
}

/// One scan over the sequence: compute running idle times per size class
/// and splice a maintenance operation into the first interval that triggers
/// the policy. Returns the unchanged schedule when nothing triggers.
pub fn evaluate_schedule(
    problem: &mut Instance,
    mut dg: ConstraintGraph,
    schedule: &PartialSolution,
    eligible: Operation,
    next: Operation,
    args: &CliArgs,
) -> Result<(PartialSolution, ConstraintGraph)> {
    let machine = problem.machine(&eligible);
    let second_pass = problem.machine_operations(machine)[1];
    let policy = problem.maintenance_policy().clone();

    let mut asapst = schedule.asapst().clone();
    let total_sizes = problem.maximum_sheet_size() as usize;
    let mut tlu: Vec<Delay> = vec![0; total_sizes + 1];

    let sequence = schedule.machine_sequence(machine).to_vec();
    let mut last_committed_second_pass: Option<JobId> = None;
    let mut prev_op: Option<Operation> = None;

    let mut i = schedule.first_maint_index(machine);
    while i < sequence.len() && prev_op != Some(eligible) {
        let idle = fetch_idle(problem, &dg, &sequence, &asapst, &mut tlu, i)?;

        if let Some(prev) = prev_op {
            if prev.op_id == second_pass {
                last_committed_second_pass = Some(prev.job);
            }
        }

        if i > 0 {
            if let Some(action) = check_interval(idle, &policy, args)? {
                return insert_and_repair(
                    problem,
                    dg,
                    schedule,
                    eligible,
                    next,
                    machine,
                    asapst,
                    last_committed_second_pass,
                    i,
                    action,
                );
            }
        }

        prev_op = Some(sequence[i]);
        i += 1;
    }
    Ok((schedule.clone(), dg))
}

/// Splices the triggered maintenance, recomputes the window, and repairs on
/// residual infeasibility.
#[allow(clippy::too_many_arguments)]
fn insert_and_repair(
    problem: &mut Instance,
    mut dg: ConstraintGraph,
    schedule: &PartialSolution,
    eligible: Operation,
    next: Operation,
    machine: MachineId,
    mut asapst: PathTimes,
    last_committed_second_pass: Option<JobId>,
    i: usize,
    action: MaintType,
) -> Result<(PartialSolution, ConstraintGraph)> {
    tracing::info!(
        "maintenance triggered after op {}",
        schedule.machine_sequence(machine)[i]
    );

    let mut new_solution =
        insert_maintenance(problem, machine, &mut dg, schedule, &asapst, i, action)?;
    new_solution.incr_maint_count();
    asapst.push(ASAP_START_VALUE);

    let sources: Vec<VertexId> = match last_committed_second_pass {
        Some(job) => dg.vertices_of_job(job).to_vec(),
        None => vec![dg.vertex_id(&Operation::new(JobId(0), 0))?],
    };
    let window_start = last_committed_second_pass.unwrap_or(JobId(0));
    let mut window = dg.vertices_in_range(window_start + 1, next.job);
    window.extend_from_slice(dg.maint_vertices());

    let result = recompute_schedule(
        problem,
        &mut new_solution,
        &mut dg,
        machine,
        &mut asapst,
        &sources,
        &window,
    )?;

    if result.has_positive_cycle() {
        tracing::info!("schedule repair triggered");
        let repaired =
            repair::repair_schedule_offline(problem, &mut dg, new_solution, eligible, &mut asapst)?;
        return Ok((repaired, dg));
    }
    Ok((new_solution, dg))
}

/// Splices a freshly minted maintenance operation before position `i`.
pub fn insert_maintenance(
    problem: &mut Instance,
    machine: MachineId,
    dg: &mut ConstraintGraph,
    schedule: &PartialSolution,
    asapst: &PathTimes,
    i: usize,
    action: MaintType,
) -> Result<PartialSolution> {
    let sequence = schedule.machine_sequence(machine);

    let op = problem.add_maintenance_operation(action);
    dg.add_vertex(op)?;

    let prev = sequence[i - 1];
    let next = sequence[i];
    let option = SchedulingOption::maintenance(prev, op, next, i);
    Ok(schedule.add(machine, &option, asapst))
}

/// Idle time accounting for position `i`: the per-size "time since last
/// use" counters are reset by maintenance and by any sheet at least as
/// large. Returns `(idle_for_this_size, max_idle_any_size)`.
pub fn fetch_idle(
    problem: &Instance,
    dg: &ConstraintGraph,
    sequence: &[Operation],
    asapst: &PathTimes,
    tlu: &mut [Delay],
    i: usize,
) -> Result<(Delay, Delay)> {
    let policy = problem.maintenance_policy();
    let total_sizes = problem.maximum_sheet_size() as usize;
    let curr = &sequence[i];
    let curr_v = dg.vertex_id(curr)?;

    if i == 0 {
        tlu.fill(0);
    } else {
        let prev = &sequence[i - 1];
        let prev_v = dg.vertex_id(prev)?;

        if curr.is_maintenance() {
            // maintenance resets every counter
            tlu.fill(0);
        } else if prev.is_maintenance() {
            let maint_id = prev.maint_id.expect("maintenance operation");
            let new_tlu = asapst[curr_v] - asapst[prev_v] - policy.maint_duration(maint_id);
            tlu.fill(new_tlu);
        } else {
            // the previous sheet resets its own size and every smaller one;
            // larger sizes keep accumulating
            let prev_size = problem.sheet_size(prev) as usize;
            let gap = asapst[curr_v] - asapst[prev_v];
            let new_tlu = gap - problem.processing_time(prev);
            for slot in tlu.iter_mut().take(prev_size + 1) {
                *slot = new_tlu;
            }
            for slot in tlu.iter_mut().skip(prev_size + 1) {
                *slot += gap;
            }
        }
    }

    let mut idle = 0;
    let mut max_idle = 0;
    if curr.is_maintenance() {
        idle = tlu[0];
    } else {
        let unique_sizes = problem.unique_sheet_sizes(0);
        for size in 0..=total_sizes {
            if unique_sizes.contains(&(size as u32)) && tlu[size] > max_idle {
                max_idle = tlu[size];
            }
        }
        idle = tlu[problem.sheet_size(curr) as usize];
    }

    Ok((idle, max_idle))
}

/// Returns the first maintenance type whose idle window contains the
/// interval. The non-simulated variants also trigger when the max-idle
/// counter is within [`MAX_IDLE_FACTOR`] of a threshold.
pub fn check_interval(
    idle: (Delay, Delay),
    policy: &MaintenancePolicy,
    args: &CliArgs,
) -> Result<Option<MaintType>> {
    let (interval, max_interval) = idle;

    if !args.algorithm.is_maintenance_aware() {
        return Err(SchedulerError::Solver(
            "algorithm not recognised for maintenance insertion".into(),
        ));
    }

    for id in 0..policy.number_of_types() {
        let (min_v, max_v) = policy.thresholds(id);
        let in_window = interval >= min_v && interval < max_v;

        let triggered = if args.algorithm.is_maintenance_simulated() {
            in_window
        } else {
            in_window
                || (max_interval as f64 >= MAX_IDLE_FACTOR * max_v as f64
                    && max_interval < max_v)
        };
        if triggered {
            return Ok(Some(id));
        }
    }
    Ok(None)
}

/// Rebuilds the sequence edges in the working graph and recomputes the
/// start times over the given window (or the whole graph when the window is
/// empty). The graph is restored before returning.
pub fn recompute_schedule(
    problem: &Instance,
    schedule: &mut PartialSolution,
    dg: &mut ConstraintGraph,
    machine: MachineId,
    asapst: &mut PathTimes,
    sources: &[VertexId],
    window: &[VertexId],
) -> Result<LongestPathResult> {
    let sequence = schedule.machine_sequence(machine).to_vec();
    let edges = utils::edges_from_sequence(problem, dg, &sequence, machine)?;
    let added = dg.add_edges(&edges);

    let result = if window.is_empty() {
        paths::compute_asapst(dg, asapst)
    } else {
        paths::compute_asapst_windowed(dg, asapst, sources, window)
    };
    schedule.set_asapst(asapst.clone());

    dg.remove_edges(&added);
    Ok(result)
}
