//! Branch-and-bound over the insertion options of the re-entrant machine.
//!
//! Nodes are expanded LIFO; children are the feasible insertion points of
//! the next unscheduled second pass, pushed worst-ranked first so the most
//! promising child is popped next. The incumbent is seeded with the
//! trivial, BHCS and MD-BHCS schedules. The lower-bound floor never
//! decreases; a decrease reveals a broken bound and aborts the run.

use hashbrown::HashMap;

use super::forward;
use super::partial_solution::PartialSolution;
use super::{pareto, utils};
use crate::algorithms::paths::{self, PathTimes};
use crate::cg::{Builder, ConstraintGraph};
use crate::cli::CliArgs;
use crate::problem::{plexity, Instance, JobId, MachineId, Operation};
use crate::utils::StaticTimer;
use crate::{Delay, Result, SchedulerError};

/// One node of the search tree.
#[derive(Clone)]
pub struct BranchBoundNode {
    solution: PartialSolution,
    lowerbound: Delay,
    makespan: Delay,
    last_inserted_operation: Option<Operation>,
}

impl BranchBoundNode {
    /// Builds a node, recomputing the earliest start times of its partial
    /// solution. Infeasible partials cannot become nodes.
    pub fn new(
        problem: &Instance,
        dg: &mut ConstraintGraph,
        solution: PartialSolution,
        trivial_lower_bound: Delay,
    ) -> Result<Self> {
        let mut solution = solution;
        solution.clear_asapst();
        let asapst = Self::compute_asapst(problem, dg, &solution)?;

        let machine = problem.re_entrant_machines()[0];
        let sequence = solution.machine_sequence(machine);
        let last_inserted_operation = sequence
            .get(solution.first_possible_index(machine))
            .copied();

        let makespan = *asapst.last().expect("non-empty graph");
        let lowerbound = makespan.max(trivial_lower_bound);

        solution.set_asapst(asapst);
        Ok(BranchBoundNode {
            solution,
            lowerbound,
            makespan,
            last_inserted_operation,
        })
    }

    fn compute_asapst(
        problem: &Instance,
        dg: &mut ConstraintGraph,
        solution: &PartialSolution,
    ) -> Result<PathTimes> {
        let edges = solution.all_and_inferred_edges(problem)?;
        let result = paths::compute_asapst_fresh_with_edges(dg, &edges);
        if result.has_positive_cycle() {
            return Err(SchedulerError::Infeasible(
                "positive cycle encountered while determining the lower bound of a partial \
                 solution"
                    .into(),
            ));
        }
        Ok(result.times)
    }

    pub fn lowerbound(&self) -> Delay {
        self.lowerbound
    }

    pub fn makespan(&self) -> Delay {
        self.makespan
    }

    pub fn solution(&self) -> &PartialSolution {
        &self.solution
    }

    pub fn last_inserted_operation(&self) -> Option<Operation> {
        self.last_inserted_operation
    }
}

pub fn solve(problem: &mut Instance, args: &CliArgs) -> Result<PartialSolution> {
    tracing::info!("started branch and bound");

    if !problem.is_graph_initialized() {
        problem.update_delay_graph(Builder::build(problem)?);
    }
    let mut dg = problem.delay_graph().clone();

    let root_result = paths::compute_asapst_fresh(&dg);
    if root_result.has_positive_cycle() {
        return Err(SchedulerError::Infeasible(
            "the input graph is infeasible; aborting".into(),
        ));
    }

    let machine = forward::re_entrant_machine(problem)?;
    let initial_sequence = forward::create_initial_sequence(problem, machine)?;
    let trivial_lower_bound = trivial_completion_lower_bound(problem)?;

    let mut sequences = HashMap::new();
    sequences.insert(machine, initial_sequence);
    let root = BranchBoundNode::new(
        problem,
        &mut dg,
        PartialSolution::new(sequences, root_result.times),
        trivial_lower_bound,
    )?;

    // LIFO stack: continue with the most recently added node first.
    let mut open_nodes = vec![root];

    // Seed the incumbent with the simple, BHCS and MD-BHCS schedules.
    let simple_node = create_simple_schedule(problem, &mut dg, machine, trivial_lower_bound)?;

    let bhcs_solution = forward::solve(problem, args)?;
    let bhcs_node = BranchBoundNode::new(problem, &mut dg, bhcs_solution, trivial_lower_bound)?;
    tracing::info!("seed with BHCS completed with makespan of {}", bhcs_node.makespan());

    let mut pareto_args = args.clone();
    pareto_args.max_partial_solutions = 20;
    let frontier = pareto::solve(problem, &pareto_args)?;
    let best_of_frontier = frontier
        .into_iter()
        .min_by_key(|s| s.makespan())
        .expect("non-empty frontier");
    let mdbhcs_node =
        BranchBoundNode::new(problem, &mut dg, best_of_frontier, trivial_lower_bound)?;
    tracing::info!("seed with MD-BHCS completed with makespan of {}", mdbhcs_node.makespan());

    let mut best_found = mdbhcs_node;
    for candidate in [bhcs_node, simple_node] {
        if candidate.makespan() < best_found.makespan() {
            best_found = candidate;
        }
    }

    if best_found.makespan() < open_nodes[0].lowerbound() {
        return Err(SchedulerError::Solver(format!(
            "either the initial lower bound or the initial solution is incorrect: found a \
             solution of {} below the lower bound {}",
            best_found.makespan(),
            open_nodes[0].lowerbound()
        )));
    }
    tracing::info!("finished initial scheduling with makespan {}", best_found.makespan());

    let timer = StaticTimer::new(args.time_out);
    let mut previous_lowerbound: Delay = 0;
    let mut iteration: u64 = 0;
    let mut retired: u64 = 0;

    while let Some(node) = open_nodes.pop() {
        let mut lowerbound = best_found.makespan();
        for n in &open_nodes {
            lowerbound = lowerbound.min(n.lowerbound());
        }
        lowerbound = lowerbound.min(node.lowerbound());

        // Exploring further may only tighten the bound.
        if previous_lowerbound > lowerbound {
            return Err(SchedulerError::Solver(format!(
                "lower bound decreased ({previous_lowerbound} > {lowerbound}); this cannot \
                 happen with a proper lower bound"
            )));
        }
        if previous_lowerbound != lowerbound && !args.output_file.is_empty() {
            let _ = std::fs::write(
                format!("{}.lb", args.output_file),
                lowerbound.min(best_found.makespan()).to_string(),
            );
        }
        previous_lowerbound = lowerbound;

        if lowerbound >= best_found.makespan() {
            tracing::info!("optimal solution found");
            return finish(problem, &mut dg, best_found);
        }

        iteration += 1;
        if iteration % 40 == 0 {
            tracing::info!(
                "iteration {iteration}: lb {lowerbound}, best {}, open {}, retired {retired}",
                best_found.makespan(),
                open_nodes.len()
            );
            if timer.is_time_up() {
                tracing::warn!("time limit exceeded");
                return finish(problem, &mut dg, best_found);
            }
        }

        if best_found.makespan() <= node.lowerbound() {
            // this branch can never beat the incumbent
            retired += 1;
            continue;
        }

        let solution = {
            // Recompute the times instead of storing them in every node;
            // feasible sequences are cheap to re-evaluate.
            let mut s = node.solution().clone();
            s.set_asapst(BranchBoundNode::compute_asapst(problem, &mut dg, &s)?);
            s
        };

        let Some(eligible) = next_eligible_operation(problem, &solution, machine) else {
            // fully scheduled; the node construction already recorded it
            continue;
        };

        let children = scheduled_children(&mut dg, problem, &solution, eligible)?;
        let complete = problem
            .job_output_position(eligible.job)
            .saturating_add(2)
            == problem.number_of_jobs();

        for child in children {
            let child_node = BranchBoundNode::new(problem, &mut dg, child, trivial_lower_bound)?;

            if complete {
                if child_node.makespan() < best_found.makespan() {
                    tracing::debug!(
                        "found a better solution: {} below {}",
                        child_node.makespan(),
                        best_found.makespan()
                    );
                    best_found = child_node;
                }
                continue;
            }

            if child_node.lowerbound() < node.lowerbound() {
                return Err(SchedulerError::Solver(
                    "lower bound decreased by making a scheduling decision; this cannot \
                     happen with a proper lower bound"
                        .into(),
                ));
            }

            if child_node.lowerbound() < best_found.makespan() {
                open_nodes.push(child_node);
            } else {
                retired += 1;
            }
        }
    }

    tracing::info!("optimal solution found (no more branches left to explore)");
    if !args.output_file.is_empty() {
        let _ = std::fs::write(
            format!("{}.lb", args.output_file),
            best_found.makespan().to_string(),
        );
    }
    finish(problem, &mut dg, best_found)
}

fn finish(
    problem: &Instance,
    dg: &mut ConstraintGraph,
    node: BranchBoundNode,
) -> Result<PartialSolution> {
    let mut solution = node.solution().clone();
    solution.set_asapst(BranchBoundNode::compute_asapst(problem, dg, &solution)?);
    solution.add_inferred_input_sequence(problem);
    Ok(solution)
}

/// The first output job whose higher pass is not committed yet; `None` once
/// everything up to the last job is scheduled.
fn next_eligible_operation(
    problem: &Instance,
    solution: &PartialSolution,
    machine: MachineId,
) -> Option<Operation> {
    let sequence = solution.machine_sequence(machine);
    let jobs = problem.jobs_output();
    for &job in jobs.iter().take(jobs.len().saturating_sub(1)) {
        for op in problem.job_operations_on_machine(job, machine).iter().skip(1) {
            if !sequence.contains(op) {
                return Some(*op);
            }
        }
    }
    None
}

/// All feasible children for one eligible operation, ordered so the most
/// promising one ends up on top of the stack.
fn scheduled_children(
    dg: &mut ConstraintGraph,
    problem: &Instance,
    solution: &PartialSolution,
    eligible: Operation,
) -> Result<Vec<PartialSolution>> {
    let machine = problem.machine(&eligible);

    let (last_reached, options) =
        forward::create_options(problem, dg, solution, eligible, machine)?;
    if options.is_empty() {
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

    let feasible =
        forward::evaluate_option_feasibility(dg, problem, solution, &options, &asap_times, machine)?;
    if feasible.is_empty() {
        return Err(SchedulerError::NoFeasibleOption(eligible));
    }

    ranked(dg, feasible, &asap_times, machine)
}

/// Ranks children and returns them least-promising first, so a LIFO pop
/// takes the most promising one.
fn ranked(
    dg: &ConstraintGraph,
    generation: Vec<(PartialSolution, super::SchedulingOption)>,
    asap_times: &PathTimes,
    machine: MachineId,
) -> Result<Vec<PartialSolution>> {
    let mut min_push = Delay::MAX;
    let mut max_push = Delay::MIN;
    let mut min_push_next = Delay::MAX;
    let mut max_push_next = Delay::MIN;
    let mut min_ops = u32::MAX;
    let mut max_ops = u32::MIN;

    let mut measured = Vec::with_capacity(generation.len());
    for (sol, opt) in generation {
        let cur_v = dg.vertex_id(&opt.cur)?;
        let next_v = dg.vertex_id(&opt.next)?;
        let push = sol.asapst()[cur_v] - asap_times[cur_v];
        let push_next = sol.asapst()[next_v] - asap_times[next_v];
        let nr_ops = forward::count_ops_in_buffer(&sol, machine)?;

        min_push = min_push.min(push);
        max_push = max_push.max(push);
        min_push_next = min_push_next.min(push_next);
        max_push_next = max_push_next.max(push_next);
        min_ops = min_ops.min(nr_ops);
        max_ops = max_ops.max(nr_ops);

        measured.push((sol, push, push_next, nr_ops));
    }

    let push_range = if max_push != min_push { (max_push - min_push) as f64 } else { 1.0 };
    let push_next_range = if max_push_next != min_push_next {
        (max_push_next - min_push_next) as f64
    } else {
        1.0
    };
    let ops_range = if max_ops != min_ops { (max_ops - min_ops) as f64 } else { 1.0 };

    let mut ranked: Vec<(PartialSolution, f64)> = measured
        .into_iter()
        .map(|(sol, push, push_next, nr_ops)| {
            let rank = 0.75 * ((push - min_push) as f64 / push_range)
                + 0.0 * ((push_next - min_push_next) as f64 / push_next_range)
                + 0.25 * ((nr_ops - min_ops) as f64 / ops_range);
            (sol, rank)
        })
        .collect();

    // highest rank (least promising) first
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    Ok(ranked.into_iter().map(|(sol, _)| sol).collect())
}

/// One job at a time through the loop: the seed that always exists.
fn create_simple_schedule(
    problem: &Instance,
    dg: &mut ConstraintGraph,
    machine: MachineId,
    trivial_lower_bound: Delay,
) -> Result<BranchBoundNode> {
    let sequence = utils::create_machine_trivial_sequence(problem, machine);
    let mut last_inserted = HashMap::new();
    last_inserted.insert(machine, sequence.len().saturating_sub(1));

    let mut sequences = HashMap::new();
    sequences.insert(machine, sequence);
    let solution = PartialSolution::with_cursors(
        sequences,
        PathTimes::new(),
        last_inserted,
        HashMap::new(),
        HashMap::new(),
    );
    BranchBoundNode::new(problem, dg, solution, trivial_lower_bound)
}

/// Trivial completion bound: the first duplex job's first-pass start plus
/// every remaining first and second pass plus the final unload setup.
pub fn trivial_completion_lower_bound(problem: &Instance) -> Result<Delay> {
    let dg = problem.delay_graph();

    let mut first_pass_time: Delay = 0;
    let mut second_pass_time: Delay = 0;
    let mut first_duplex: Option<JobId> = None;

    for &job in problem.jobs_output() {
        if first_duplex.is_none() && problem.re_entrancies_of(&Operation::new(job, 1)) == plexity::DUPLEX
        {
            first_duplex = Some(job);
        }
        if first_duplex.is_some() {
            let first_pass = Operation::new(job, 1);
            if dg.has_vertex(&first_pass) {
                first_pass_time += problem.processing_time(&first_pass);
            }
            second_pass_time += problem.processing_time(&Operation::new(job, 2));
        }
    }

    let result = paths::compute_asapst_fresh(dg);

    let first_duplex_start = match first_duplex {
        Some(job) => result.times[dg.vertex_id(&Operation::new(job, 1))?],
        None => result.times[dg.source(problem.machines()[1])?],
    };

    let last_job = *problem.jobs_output().last().expect("non-empty instance");
    let last_unload = problem.setup_time(
        &Operation::new(last_job, 2),
        &Operation::new(last_job, 3),
    );

    let lowerbound = first_duplex_start + first_pass_time + second_pass_time + last_unload;
    Ok(lowerbound.max(*result.times.last().expect("non-empty graph")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::test_instances;

    fn solve_instance(
        load: Delay,
        p1: Delay,
        p2: Delay,
        unload: Delay,
        bmin: Delay,
        bmax: Delay,
        n: u32,
    ) -> (Delay, Delay) {
        let mut problem = test_instances::re_entrant(load, p1, p2, unload, bmin, bmax, n);
        let mut args = CliArgs::default();
        args.time_out = std::time::Duration::from_secs(n as u64);
        let lb = {
            let mut p = problem.clone();
            let _ = utils::init_problem_graph(&mut p).unwrap();
            trivial_completion_lower_bound(&p).unwrap()
        };
        let solution = solve(&mut problem, &args).unwrap();
        (solution.makespan(), lb)
    }

    #[test]
    fn no_interleaving_possible() {
        let (makespan, lb) = solve_instance(1, 1, 1, 1, 1, 1, 5);
        assert_eq!(makespan, 11);
        assert!(lb <= makespan);
    }

    #[test]
    fn all_first_passes_precede_second_passes() {
        let (makespan, lb) = solve_instance(1, 10, 10, 1, 100, 150, 14);
        assert_eq!(makespan, 281);
        assert!(lb <= makespan);
    }

    #[test]
    fn fully_interleaved_optimum() {
        let (makespan, lb) = solve_instance(1, 10, 10, 1, 100, 150, 52);
        assert_eq!(makespan, 1041);
        assert!(lb <= makespan);
    }
}
