//! Ranked forward-insertion heuristic (BHCS) and its ASAP ranking mode.
//!
//! Higher passes of the re-entrant machine are inserted one at a time into
//! the committed sequence: enumerate the insertion points that are still
//! open, check each for feasibility with a windowed longest-path run, rank
//! the survivors, and commit the best one.

use hashbrown::HashMap;

use super::partial_solution::{PartialSolution, Sequence};
use super::scheduling_option::SchedulingOption;
use super::{maintenance, utils};
use crate::algorithms::paths::{self, LongestPathResult, PathTimes};
use crate::cg::{ConstraintGraph, Edge, VertexId};
use crate::cli::{AlgorithmType, CliArgs};
use crate::io::dot;
use crate::problem::{plexity, Instance, JobId, MachineId, Operation};
use crate::{Delay, Result, SchedulerError};

/// A feasible insertion with its resulting solution and, for the
/// maintenance-aware variants, the graph that insertion produced.
pub struct EvaluatedOption {
    pub solution: PartialSolution,
    pub option: SchedulingOption,
    pub graph: Option<ConstraintGraph>,
}

/// Runs the forward heuristic over every eligible operation of the
/// instance's (single) re-entrant machine.
pub fn solve(problem: &mut Instance, args: &CliArgs) -> Result<PartialSolution> {
    tracing::info!("computation of the schedule started");

    let asapst = utils::init_problem_graph(problem)?;
    let mut dg = problem.delay_graph().clone();
    tracing::info!("number of vertices in the delay graph is {}", dg.num_vertices());

    let machine = re_entrant_machine(problem)?;
    let initial = create_initial_sequence(problem, machine)?;
    let mut sequences = HashMap::new();
    sequences.insert(machine, initial);
    let mut solution = PartialSolution::new(sequences, asapst);

    let jobs = problem.jobs_output().to_vec();
    for &job in jobs.iter().take(jobs.len().saturating_sub(1)) {
        let job_ops = problem.job_operations_on_machine(job, machine).to_vec();
        // The first pass is already part of the initial sequence.
        for op in job_ops.into_iter().skip(1) {
            solution = schedule_one_operation(&mut dg, problem, &solution, op, args)?;
        }
    }

    if args.algorithm.is_maintenance_aware() {
        let (updated, new_dg) =
            maintenance::trigger_maintenance_at_end(dg, problem, machine, &solution, args)?;
        solution = updated;
        problem.update_delay_graph(new_dg);
    }

    solution.add_inferred_input_sequence(problem);
    Ok(solution)
}

/// The single re-entrant machine this solver family supports.
pub fn re_entrant_machine(problem: &Instance) -> Result<MachineId> {
    let machine = *problem
        .re_entrant_machines()
        .first()
        .ok_or_else(|| SchedulerError::Solver("no re-entrant machine in the instance".into()))?;
    if problem.machine_operations(machine).len() > 2 {
        return Err(SchedulerError::Solver(
            "multiple re-entrancies not implemented yet".into(),
        ));
    }
    Ok(machine)
}

/// All first passes of the duplex jobs, closed by the remaining passes of
/// the last duplex job.
pub fn create_initial_sequence(problem: &Instance, machine: MachineId) -> Result<Sequence> {
    let re_entrant_id = problem
        .machine_re_entrant_id(machine)
        .ok_or_else(|| SchedulerError::Solver(format!("machine {machine} is not re-entrant")))?;

    let mut sequence = Sequence::new();
    let mut last_duplex: Option<JobId> = None;

    for &job in problem.jobs_output() {
        if problem.re_entrancies(job, re_entrant_id) == plexity::DUPLEX {
            let job_ops = problem.job_operations_on_machine(job, machine);
            sequence.push(job_ops[0]);
            last_duplex = Some(job);
        }
    }

    let last_duplex = last_duplex.ok_or_else(|| {
        SchedulerError::Solver("nothing to schedule; only simplex sheets".into())
    })?;
    let job_ops = problem.job_operations_on_machine(last_duplex, machine);
    sequence.extend_from_slice(&job_ops[1..]);

    Ok(sequence)
}

/// The tightest outgoing deadline of a vertex; insertion scans stop once the
/// accumulated separation exceeds it.
pub fn determine_smallest_deadline(dg: &ConstraintGraph, v: VertexId) -> Delay {
    let mut deadline = Delay::MAX;
    for &weight in dg[v].outgoing().values() {
        if weight < 0 {
            deadline = deadline.min(-weight);
        }
    }
    deadline
}

/// Enumerates the insertion points for `eligible` that are still open.
/// Returns the last sequence operation the scan reached and the options.
pub fn create_options(
    problem: &Instance,
    dg: &ConstraintGraph,
    solution: &PartialSolution,
    eligible: Operation,
    machine: MachineId,
) -> Result<(Operation, Vec<SchedulingOption>)> {
    let sequence = solution.machine_sequence(machine);
    let mut last_reached = *sequence
        .last()
        .ok_or_else(|| SchedulerError::Solver("empty machine sequence".into()))?;

    let deadline = determine_smallest_deadline(dg, dg.vertex_id(&eligible)?);
    let mut options = Vec::new();
    let mut total_time: Delay = 0;

    for position in solution.first_possible_index(machine)..sequence.len() {
        if position == 0 {
            // Inserting before the first operation would schedule a higher
            // pass before the first pass.
            continue;
        }

        last_reached = sequence[position];
        let prev = sequence[position - 1];
        let next = sequence[position];
        let prev_next_weight = problem.query(&prev, &next);

        // No option right before an operation of the same job (no
        // self-flush).
        if eligible.job != next.job {
            let prev_cur = problem.query(&prev, &eligible);
            let cur_next = problem.query(&eligible, &next);
            if prev.job != next.job && prev_next_weight > prev_cur + cur_next {
                tracing::warn!(
                    "triangle inequality violated: {prev} -> {next} = {prev_next_weight} > \
                     {prev} -> {eligible} -> {next} = {}",
                    prev_cur + cur_next
                );
            }
            options.push(SchedulingOption::new(prev, eligible, next, position));
        }

        if total_time > deadline {
            // The deadline would already have expired here; any later
            // insertion point is infeasible too.
            break;
        }
        total_time += prev_next_weight;
    }

    Ok((last_reached, options))
}

/// Temporarily applies `input_edges` and runs the (windowed) longest-path
/// check. The graph is restored before returning.
pub fn validate_interleaving(
    dg: &mut ConstraintGraph,
    input_edges: &[Edge],
    asapst: &mut PathTimes,
    sources: &[VertexId],
    window: &[VertexId],
) -> LongestPathResult {
    let added = dg.add_edges(input_edges);
    let result = if window.is_empty() {
        paths::compute_asapst(dg, asapst)
    } else {
        paths::compute_asapst_windowed(dg, asapst, sources, window)
    };
    dg.remove_edges(&added);
    result
}

/// Number of operations committed between the just-inserted operation and
/// its first pass (the operations still inside the re-entrant loop).
pub fn count_ops_in_buffer(ps: &PartialSolution, machine: MachineId) -> Result<u32> {
    let sequence = ps.machine_sequence(machine);
    let first_possible = ps.first_possible_index(machine);
    if first_possible < 2 {
        return Err(SchedulerError::Solver(
            "at least three operations should be scheduled".into(),
        ));
    }

    let cur = sequence[first_possible - 1];
    let predecessor = Operation::new(cur.job, cur.op_id.wrapping_sub(1));

    let mut nr_ops = 1;
    for i in (0..first_possible - 1).rev() {
        if sequence[i] == predecessor {
            break;
        }
        nr_ops += 1;
    }
    Ok(nr_ops)
}

/// Buffer time consumed by the committed loop operations, and their count.
pub fn compute_future_avg_productivity(
    dg: &ConstraintGraph,
    asapst: &PathTimes,
    ps: &PartialSolution,
    machine: MachineId,
) -> Result<(Delay, u32)> {
    let sequence = ps.machine_sequence(machine);
    let first_possible = ps.first_possible_index(machine);
    let next_o = sequence[first_possible];
    let cur_o = sequence[first_possible - 1];

    let nr_ops = count_ops_in_buffer(ps, machine)?;

    let op1 = Operation::new(next_o.job, cur_o.op_id);
    let op2 = Operation::new(cur_o.job, cur_o.op_id.wrapping_sub(1));
    let mut used_buffer_time = 0;
    if dg.has_vertex(&op1) && dg.has_vertex(&op2) {
        used_buffer_time = asapst[dg.vertex_id(&op1)?] - asapst[dg.vertex_id(&op2)?];
    }

    Ok((used_buffer_time, nr_ops))
}

/// Checks each option with a windowed longest-path run and keeps the
/// feasible ones, annotated with the ranking scalars.
pub fn evaluate_option_feasibility(
    dg: &mut ConstraintGraph,
    problem: &Instance,
    solution: &PartialSolution,
    options: &[SchedulingOption],
    asap_times: &PathTimes,
    machine: MachineId,
) -> Result<Vec<(PartialSolution, SchedulingOption)>> {
    let first_job = problem.jobs_output()[0];
    let first_op = problem.job_ops(first_job)[0];

    let mut feasible = Vec::new();
    let mut nr_infeasible = 0usize;

    for option in options {
        let mut asapst = asap_times.clone();
        let candidate = solution.add(machine, option, asap_times);
        let final_sequence = candidate.all_and_inferred_edges(problem)?;

        let cur_v = dg.vertex_id(&option.cur)?;
        let next_v = dg.vertex_id(&option.next)?;
        let job_start = option.cur.job;

        tracing::debug!(
            "checking feasibility of interleaving {} between {} and {}",
            option.cur,
            option.prev,
            option.next
        );

        let sources: Vec<VertexId> = if job_start == first_op.job {
            vec![dg.vertex_id(&first_op)?]
        } else {
            let prev_job = if job_start > JobId(1) { job_start - 1 } else { JobId(0) };
            dg.vertices_of_job(prev_job).to_vec()
        };
        let mut window = dg.vertices_in_range(job_start, option.next.job);
        window.extend_from_slice(dg.maint_vertices());

        let result = validate_interleaving(dg, &final_sequence, &mut asapst, &sources, &window);

        if result.has_positive_cycle() {
            nr_infeasible += 1;
            continue;
        }

        let interleaved_start = asapst[cur_v];
        let earliest_future = asapst[next_v];
        let mut p_sol = solution.add(machine, option, &asapst);
        p_sol.set_makespan_last_scheduled_job(interleaved_start);

        let (used_buffer, nr_jobs) =
            compute_future_avg_productivity(dg, &asapst, &p_sol, machine)?;
        p_sol.set_average_productivity(used_buffer / Delay::from(nr_jobs.max(1)));
        p_sol.set_nr_ops_in_loop(nr_jobs);
        p_sol.set_earliest_start_future_operation(earliest_future);

        feasible.push((p_sol, *option));
    }

    tracing::debug!("infeasible options: {nr_infeasible}");
    Ok(feasible)
}

/// Ranks by the normalized weighted sum of push, downstream push and loop
/// population. Smallest rank wins; ties go to the earlier option.
pub fn rank_solutions(
    solutions: &mut [EvaluatedOption],
    dg: &ConstraintGraph,
    asap_times: &PathTimes,
    machine: MachineId,
    args: &CliArgs,
) -> Result<Option<usize>> {
    let mut min_push = Delay::MAX;
    let mut max_push = Delay::MIN;
    let mut min_push_next = Delay::MAX;
    let mut max_push_next = Delay::MIN;
    let mut min_ops = u32::MAX;
    let mut max_ops = u32::MIN;

    for entry in solutions.iter_mut() {
        let graph = entry.graph.as_ref().unwrap_or(dg);
        let cur_v = graph.vertex_id(&entry.option.cur)?;
        let next_v = graph.vertex_id(&entry.option.next)?;
        let cur_start = entry.solution.asapst()[cur_v];
        let push = cur_start - asap_times[cur_v];
        let push_next = entry.solution.asapst()[next_v] - asap_times[next_v];

        let nr_ops = count_ops_in_buffer(&entry.solution, machine)?;
        entry.solution.set_nr_ops_in_loop(nr_ops);
        entry.solution.set_makespan_last_scheduled_job(cur_start);
        entry.solution.set_earliest_start_future_operation(push);

        min_push = min_push.min(push);
        max_push = max_push.max(push);
        min_push_next = min_push_next.min(push_next);
        max_push_next = max_push_next.max(push_next);
        min_ops = min_ops.min(nr_ops);
        max_ops = max_ops.max(nr_ops);
    }

    let push_range = if max_push != min_push { (max_push - min_push) as f64 } else { 1.0 };
    let push_next_range = if max_push_next != min_push_next {
        (max_push_next - min_push_next) as f64
    } else {
        1.0
    };
    let ops_range = if max_ops != min_ops { (max_ops - min_ops) as f64 } else { 1.0 };

    let mut min_rank = f64::MAX;
    let mut min_rank_id = None;

    for (i, entry) in solutions.iter_mut().enumerate() {
        let graph = entry.graph.as_ref().unwrap_or(dg);
        let cur_v = graph.vertex_id(&entry.option.cur)?;
        let next_v = graph.vertex_id(&entry.option.next)?;
        let push = entry.solution.asapst()[cur_v] - asap_times[cur_v];
        let push_next = entry.solution.asapst()[next_v] - asap_times[next_v];

        let push_norm = (push - min_push) as f64 / push_range;
        let push_next_norm = (push_next - min_push_next) as f64 / push_next_range;
        let ops_norm = (entry.solution.nr_ops_in_loop() - min_ops) as f64 / ops_range;

        // minimize the effort of this decision, minimize the effort pushed
        // onto committed work, maximize the committed loop population
        let rank = args.flexibility_weight * push_norm
            + args.productivity_weight * push_next_norm
            + args.tie_weight * ops_norm;
        entry.solution.set_ranking(rank);

        if rank < min_rank {
            min_rank = rank;
            min_rank_id = Some(i);
        }
    }

    Ok(min_rank_id)
}

/// ASAP ranking mode: the option whose operation starts earliest wins.
pub fn rank_solutions_asap(
    solutions: &[EvaluatedOption],
    dg: &ConstraintGraph,
) -> Result<Option<usize>> {
    let mut min_start = Delay::MAX;
    let mut min_id = None;
    for (i, entry) in solutions.iter().enumerate() {
        let graph = entry.graph.as_ref().unwrap_or(dg);
        let cur_v = graph.vertex_id(&entry.option.cur)?;
        let start = entry.solution.asapst()[cur_v];
        if start <= min_start {
            min_start = start;
            min_id = Some(i);
        }
    }
    Ok(min_id)
}

/// Generates, validates and ranks the options for one eligible operation.
pub fn get_feasible_options(
    dg: &mut ConstraintGraph,
    problem: &mut Instance,
    eligible: Operation,
    solution: &PartialSolution,
    args: &CliArgs,
) -> Result<(Vec<EvaluatedOption>, Option<usize>)> {
    let machine = problem.machine(&eligible);

    let (last_reached, options) = create_options(problem, dg, solution, eligible, machine)?;

    // Refresh the baseline times over the window the options live in, so
    // the ranking has valid pre-insertion values to push against.
    let job_start = eligible.job;
    let mut asap_times = solution.asapst().clone();
    let prev_job = if job_start > JobId(1) { job_start - 1 } else { JobId(0) };
    let sources = dg.vertices_of_job(prev_job).to_vec();
    let window = dg.vertices_in_range(job_start, last_reached.job);
    paths::compute_asapst_windowed(dg, &mut asap_times, &sources, &window);

    let pairs =
        evaluate_option_feasibility(dg, problem, solution, &options, &asap_times, machine)?;

    let insert_maintenance = matches!(
        args.algorithm,
        AlgorithmType::Mibhcs | AlgorithmType::Miasap
    );

    let mut evaluated = Vec::with_capacity(pairs.len());
    for (sol, opt) in pairs {
        if insert_maintenance {
            let (maint_sol, maint_dg) =
                maintenance::trigger_maintenance_after_option(dg.clone(), problem, &sol, &opt, args)?;
            evaluated.push(EvaluatedOption {
                solution: maint_sol,
                option: opt,
                graph: Some(maint_dg),
            });
        } else {
            evaluated.push(EvaluatedOption {
                solution: sol,
                option: opt,
                graph: None,
            });
        }
    }

    let min_rank_id = if args.algorithm.uses_asap_ranking() {
        rank_solutions_asap(&evaluated, dg)?
    } else {
        rank_solutions(&mut evaluated, dg, &asap_times, machine, args)?
    };

    Ok((evaluated, min_rank_id))
}

/// Commits the best-ranked feasible option for one eligible operation.
pub fn schedule_one_operation(
    dg: &mut ConstraintGraph,
    problem: &mut Instance,
    solution: &PartialSolution,
    eligible: Operation,
    args: &CliArgs,
) -> Result<PartialSolution> {
    tracing::debug!("starting from current solution: {solution}");

    let (mut evaluated, min_rank_id) =
        get_feasible_options(dg, problem, eligible, solution, args)?;

    tracing::debug!("*** nr options: {}", evaluated.len());

    let Some(best) = min_rank_id else {
        let all_edges = solution.all_chosen_edges(problem)?;
        let cycle = paths::find_positive_cycle_with_edges(dg, &all_edges);
        if tracing::enabled!(tracing::Level::DEBUG) {
            let name = format!("infeasible_{}.dot", problem.name());
            let _ = dot::save_as_dot(dg, &name, &cycle);
        }
        return Err(SchedulerError::NoFeasibleOption(eligible));
    };

    let entry = evaluated.swap_remove(best);
    if let Some(new_dg) = entry.graph {
        *dg = new_dg;
        problem.update_delay_graph(dg.clone());
    }

    Ok(entry.solution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::test_instances;

    #[test]
    fn initial_sequence_has_all_first_passes_and_last_job_tail() {
        let mut problem = test_instances::re_entrant(1, 1, 1, 1, 1, 1, 5);
        let _ = utils::init_problem_graph(&mut problem).unwrap();
        let machine = problem.re_entrant_machines()[0];
        let sequence = create_initial_sequence(&problem, machine).unwrap();
        // 5 first passes plus the second pass of the last job
        assert_eq!(sequence.len(), 6);
        assert_eq!(sequence[4], Operation::new(JobId(4), 1));
        assert_eq!(sequence[5], Operation::new(JobId(4), 2));
    }

    #[test]
    fn tight_buffer_forces_no_interleaving() {
        let mut problem = test_instances::re_entrant(1, 1, 1, 1, 1, 1, 5);
        let args = CliArgs::default();
        let solution = solve(&mut problem, &args).unwrap();
        assert_eq!(solution.makespan(), 11);
    }

    #[test]
    fn loose_buffer_yields_feasible_schedule() {
        let mut problem = test_instances::re_entrant(1, 10, 10, 1, 100, 150, 14);
        let args = CliArgs::default();
        let solution = solve(&mut problem, &args).unwrap();
        // 281 is the optimum; the heuristic must stay feasible and above it
        assert!(solution.makespan() >= 281);

        let edges = solution.all_and_inferred_edges(&problem).unwrap();
        let mut dg = problem.delay_graph().clone();
        let result = paths::compute_asapst_fresh_with_edges(&mut dg, &edges);
        assert!(!result.has_positive_cycle());
    }
}
