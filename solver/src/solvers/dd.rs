//! Decision-diagram solver: explicit expansion of the schedule abstraction
//! graph with dominance pruning and anytime bounds.
//!
//! Each search vertex is one prefix of scheduling decisions: per-machine
//! sequences, the earliest (and latest) start times they imply, and the
//! per-job completion counters that identify equivalent prefixes. Children
//! append one ready operation; a child whose edges close a positive cycle
//! or that is dominated by an already-queued vertex with the same
//! completion signature is discarded.

use std::collections::VecDeque;

use hashbrown::HashMap;
use serde_json::{json, Value};

use super::partial_solution::{MachinesSequences, PartialSolution};
use super::{forward, sequence as sequence_solver, utils, Solutions};
use crate::algorithms::paths::{self, PathTimes, ALAP_START_VALUE};
use crate::cg::{ConstraintGraph, Edge, Edges, VertexId};
use crate::cli::{AlgorithmType, CliArgs, DdExplorationType};
use crate::problem::{Instance, JobId, MachineId, Operation, ShopType};
use crate::utils::StaticTimer;
use crate::{Delay, Result, SchedulerError};

pub const TERMINATION_TIME_OUT: &str = "time-out";
pub const TERMINATION_NO_SOLUTION: &str = "no-solution";
pub const TERMINATION_OPTIMAL: &str = "optimal";

/// One vertex of the schedule abstraction graph.
#[derive(Clone, Debug)]
pub struct DdVertex {
    pub id: u64,
    pub parent: u64,
    pub sequences: MachinesSequences,
    pub asapst: PathTimes,
    pub alapst: PathTimes,
    /// Index of the next operation to schedule for each output job.
    pub jobs_completion: Vec<usize>,
    /// Jobs in the order their first operation was scheduled.
    pub job_order: Vec<JobId>,
    /// Last scheduled vertex on each machine.
    pub last_operation: HashMap<MachineId, VertexId>,
    pub scheduled_ops: Vec<VertexId>,
    /// Union of scheduled operations across merged prefixes; equal to
    /// `scheduled_ops` while merging stays disabled.
    pub encountered_ops: Vec<VertexId>,
    pub depth: u64,
    pub terminal: bool,
}

impl DdVertex {
    /// Lower bound of any completion reachable from this prefix.
    pub fn lower_bound(&self) -> Delay {
        self.asapst.last().copied().unwrap_or(0)
    }

    /// The next schedulable operation of each job, honouring the
    /// no-overtaking rules of the shop type.
    pub fn ready_operations(&self, problem: &Instance) -> Vec<Operation> {
        let jobs_output = problem.jobs_output();
        let mut ready = Vec::new();

        for (i, &job) in jobs_output.iter().enumerate() {
            let op_idx = self.jobs_completion[i];
            let job_ops = problem.job_ops(job);
            if op_idx >= job_ops.len() {
                continue;
            }

            // In a fixed-order shop the previous output job must be at
            // least as far along.
            if problem.shop_type() == ShopType::FixedOrder
                && i > 0
                && self.jobs_completion[i - 1] <= op_idx
            {
                continue;
            }

            // In a free-order flow shop, overtaking is forbidden relative
            // to the order the jobs started in.
            if problem.shop_type() == ShopType::Flow && op_idx > 0 {
                if let Some(pos) = self.job_order.iter().position(|&j| j == job) {
                    if pos > 0 {
                        let prev_pos = problem.job_output_position(self.job_order[pos - 1]);
                        if self.jobs_completion[prev_pos] < op_idx {
                            continue;
                        }
                    }
                }
            }

            ready.push(job_ops[op_idx]);
        }
        ready
    }
}

/// Bounds and incumbent of a DD run.
#[derive(Clone, Debug)]
pub struct DdSolution {
    pub best_upper_bound: Delay,
    pub lower_bound: Delay,
    pub best_sequences: Option<MachinesSequences>,
    /// `(seconds, bound)` whenever the incumbent improved.
    pub anytime_solutions: Vec<(f64, Delay)>,
    /// `(seconds, bound)` whenever the proven lower bound moved.
    pub anytime_bounds: Vec<(f64, Delay)>,
}

impl Default for DdSolution {
    fn default() -> Self {
        DdSolution {
            best_upper_bound: Delay::MAX,
            lower_bound: 0,
            best_sequences: None,
            anytime_solutions: Vec::new(),
            anytime_bounds: Vec::new(),
        }
    }
}

/// Resumable state of the solver.
pub struct DdSolverData {
    pub queue: VecDeque<u64>,
    pub arena: HashMap<u64, DdVertex>,
    pub next_vertex_id: u64,
    pub solution: DdSolution,
    pub dg: ConstraintGraph,
    pub exploration: DdExplorationType,
    /// Vertices still queued, indexed by completion signature for the
    /// dominance check.
    pub active: HashMap<Vec<usize>, Vec<u64>>,
}

impl DdSolverData {
    fn push(&mut self, vertex: DdVertex) {
        let id = vertex.id;
        self.active
            .entry(vertex.jobs_completion.clone())
            .or_default()
            .push(id);
        self.arena.insert(id, vertex);
        self.queue.push_back(id);
    }

    fn remove_active(&mut self, vertex: &DdVertex) {
        if let Some(ids) = self.active.get_mut(&vertex.jobs_completion) {
            ids.retain(|&i| i != vertex.id);
            if ids.is_empty() {
                self.active.remove(&vertex.jobs_completion);
            }
        }
    }

    /// Pops the next vertex according to the exploration strategy.
    fn pop(&mut self) -> Option<DdVertex> {
        if self.queue.is_empty() {
            return None;
        }

        let index = match self.exploration {
            DdExplorationType::Breadth => 0,
            DdExplorationType::Depth => self.queue.len() - 1,
            DdExplorationType::Best => self.index_of_best(),
            DdExplorationType::Static => self.index_of_deepest(),
            DdExplorationType::Adaptive => {
                // depth-first until an incumbent exists, then best-first
                if self.solution.best_sequences.is_none() {
                    self.queue.len() - 1
                } else {
                    self.index_of_best()
                }
            }
        };

        let id = self.queue.remove(index)?;
        let vertex = self.arena.remove(&id)?;
        self.remove_active(&vertex);
        Some(vertex)
    }

    fn index_of_best(&self) -> usize {
        self.queue
            .iter()
            .enumerate()
            .min_by_key(|(_, id)| self.arena[*id].lower_bound())
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    fn index_of_deepest(&self) -> usize {
        self.queue
            .iter()
            .enumerate()
            .max_by_key(|(_, id)| (self.arena[*id].depth, -self.arena[*id].lower_bound()))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    /// Tightest bound still provable: the incumbent against the open
    /// prefixes.
    fn global_lower_bound(&self) -> Delay {
        let open = self
            .queue
            .iter()
            .map(|id| self.arena[id].lower_bound())
            .min();
        match open {
            Some(lb) => lb.min(self.solution.best_upper_bound),
            None => self.solution.best_upper_bound,
        }
    }
}

/// Solves the instance with the decision-diagram expansion; returns the
/// solution pool and the run's result data.
pub fn solve(problem: &mut Instance, args: &CliArgs) -> Result<(Solutions, Value)> {
    let data = initialize(problem, args)?;
    run(problem, args, data)
}

/// Continues a previous run against an updated instance. The search itself
/// restarts (updated boundary bounds invalidate the cached start times of
/// queued prefixes), but the anytime logs carry across rounds.
pub fn solve_resumable(
    problem: &mut Instance,
    args: &CliArgs,
    old_data: Option<DdSolverData>,
) -> Result<(Solutions, Value, DdSolverData)> {
    let mut data = initialize(problem, args)?;
    if let Some(old) = old_data {
        data.solution.anytime_solutions = old.solution.anytime_solutions;
        data.solution.anytime_bounds = old.solution.anytime_bounds;
    }
    run_with_data(problem, args, data)
}

fn initialize(problem: &mut Instance, args: &CliArgs) -> Result<DdSolverData> {
    let base_asapst = utils::init_problem_graph(problem)?;
    let dg = problem.delay_graph().clone();

    let mut data = DdSolverData {
        queue: VecDeque::new(),
        arena: HashMap::new(),
        next_vertex_id: 0,
        solution: DdSolution::default(),
        dg,
        exploration: args.exploration_type,
        active: HashMap::new(),
    };

    let root = DdVertex {
        id: next_id(&mut data.next_vertex_id),
        parent: 0,
        sequences: MachinesSequences::default(),
        asapst: base_asapst,
        alapst: vec![ALAP_START_VALUE; data.dg.num_vertices()],
        jobs_completion: vec![0; problem.number_of_jobs()],
        job_order: Vec::new(),
        last_operation: HashMap::new(),
        scheduled_ops: Vec::new(),
        encountered_ops: Vec::new(),
        depth: 0,
        terminal: false,
    };
    data.push(root);

    if args.algorithm == AlgorithmType::DdSeed {
        seed_queue(problem, args, &mut data)?;
    }

    Ok(data)
}

fn next_id(counter: &mut u64) -> u64 {
    let id = *counter;
    *counter += 1;
    id
}

/// Plays a seed schedule back through the expansion, queueing every prefix
/// along the way so the search can branch off the seed path.
fn seed_queue(problem: &mut Instance, args: &CliArgs, data: &mut DdSolverData) -> Result<()> {
    let seed = seed_solution(problem, args)?;

    // global replay order: all scheduled operations by their start time
    let dg = problem.delay_graph().clone();
    let mut ordered: Vec<(Delay, Operation)> = Vec::new();
    for (_, sequence) in seed.chosen_sequences() {
        for op in sequence {
            if op.is_maintenance() {
                continue;
            }
            let v = dg.vertex_id(op)?;
            ordered.push((seed.asapst().get(v).copied().unwrap_or(0), *op));
        }
    }
    ordered.sort();

    let mut current = data.arena[&data.queue[0]].clone();
    for (_, op) in ordered {
        let ready = current.ready_operations(problem);
        if !ready.contains(&op) {
            break;
        }
        let Some(child) = expand_one(data, &current, problem, op)? else {
            break;
        };
        data.push(child.clone());
        current = child;
    }
    Ok(())
}

fn seed_solution(problem: &mut Instance, args: &CliArgs) -> Result<PartialSolution> {
    if !args.sequence_file.is_empty() {
        let (mut solutions, _) = sequence_solver::solve(problem, args, 0)?;
        return solutions
            .pop()
            .ok_or_else(|| SchedulerError::Solver("empty seed sequence file".into()));
    }
    let mut seed_args = args.clone();
    seed_args.algorithm = AlgorithmType::Bhcs;
    forward::solve(problem, &seed_args)
}

fn run(
    problem: &mut Instance,
    args: &CliArgs,
    data: DdSolverData,
) -> Result<(Solutions, Value)> {
    let (solutions, value, _) = run_with_data(problem, args, data)?;
    Ok((solutions, value))
}

fn run_with_data(
    problem: &mut Instance,
    args: &CliArgs,
    mut data: DdSolverData,
) -> Result<(Solutions, Value, DdSolverData)> {
    let timer = StaticTimer::new(args.time_out);
    let mut iterations: u64 = 0;
    let mut timed_out = false;

    while let Some(vertex) = {
        if iterations >= args.max_iterations || timer.is_time_up() {
            timed_out = timer.is_time_up();
            None
        } else if data.solution.best_sequences.is_some()
            && data.global_lower_bound() >= data.solution.best_upper_bound
        {
            None
        } else {
            data.pop()
        }
    } {
        iterations += 1;
        single_iteration(&mut data, &vertex, problem, &timer)?;
    }

    // final lower bound over whatever remains open
    let lower_bound = data.global_lower_bound();
    if data
        .solution
        .anytime_bounds
        .last()
        .map(|&(_, b)| b != lower_bound)
        .unwrap_or(true)
    {
        data.solution
            .anytime_bounds
            .push((timer.elapsed().as_secs_f64(), lower_bound));
    }
    data.solution.lower_bound = lower_bound;

    let termination = if data.solution.best_sequences.is_none() {
        if timed_out {
            TERMINATION_TIME_OUT
        } else {
            TERMINATION_NO_SOLUTION
        }
    } else if data.queue.is_empty() || lower_bound >= data.solution.best_upper_bound {
        TERMINATION_OPTIMAL
    } else {
        TERMINATION_TIME_OUT
    };

    let result_data = json!({
        "anytime-solutions": data.solution.anytime_solutions,
        "anytime-bounds": data.solution.anytime_bounds,
        "lowerBound": data.solution.lower_bound,
        "termination": termination,
    });

    let solutions = match &data.solution.best_sequences {
        Some(sequences) => {
            let mut solution = PartialSolution::new(sequences.clone(), vec![]);
            let edges = solution.all_chosen_edges(problem)?;
            let mut dg = problem.delay_graph().clone();
            let result = paths::compute_asapst_fresh_with_edges(&mut dg, &edges);
            if result.has_positive_cycle() {
                return Err(SchedulerError::Infeasible(
                    "incumbent schedule became infeasible".into(),
                ));
            }
            solution.set_asapst(result.times);
            vec![solution]
        }
        None => Vec::new(),
    };

    Ok((solutions, result_data, data))
}

fn single_iteration(
    data: &mut DdSolverData,
    vertex: &DdVertex,
    problem: &Instance,
    timer: &StaticTimer,
) -> Result<()> {
    if vertex.terminal {
        let makespan = vertex.lower_bound();
        if makespan < data.solution.best_upper_bound {
            data.solution.best_upper_bound = makespan;
            data.solution.best_sequences = Some(vertex.sequences.clone());
            data.solution
                .anytime_solutions
                .push((timer.elapsed().as_secs_f64(), makespan));
        }
        return Ok(());
    }

    // prune against the incumbent
    if vertex.lower_bound() >= data.solution.best_upper_bound {
        return Ok(());
    }

    for op in vertex.ready_operations(problem) {
        let Some(child) = expand_one(data, vertex, problem, op)? else {
            continue;
        };

        if child.lower_bound() >= data.solution.best_upper_bound {
            continue;
        }
        if is_dominated(data, &child) {
            continue;
        }
        data.push(child);
    }
    Ok(())
}

/// Creates the child that appends `op`, or `None` when the new sequencing
/// edges close a positive cycle.
fn expand_one(
    data: &mut DdSolverData,
    vertex: &DdVertex,
    problem: &Instance,
    op: Operation,
) -> Result<Option<DdVertex>> {
    let machine = problem.machine(&op);
    let dg = &data.dg;
    let v = dg.vertex_id(&op)?;

    let mut edges = Edges::new();
    if let Some(&last) = vertex.last_operation.get(&machine) {
        let last_op = dg.operation(last);
        edges.push(Edge::new(last, v, problem.query(&last_op, &op)));
    }
    if op.op_id > 0 {
        let pred = Operation::new(op.job, op.op_id - 1);
        if dg.has_vertex(&pred) {
            let pred_v = dg.vertex_id(&pred)?;
            edges.push(Edge::new(pred_v, v, problem.query(&pred, &op)));
        }
    }

    let mut asapst = vertex.asapst.clone();
    if paths::add_edges_incremental_asapst(&mut data.dg, &edges, &mut asapst) {
        return Ok(None);
    }

    let mut sequences = vertex.sequences.clone();
    sequences.entry(machine).or_default().push(op);

    let mut jobs_completion = vertex.jobs_completion.clone();
    let position = problem.job_output_position(op.job);
    jobs_completion[position] += 1;

    let mut job_order = vertex.job_order.clone();
    if op.op_id == problem.job_ops(op.job)[0].op_id {
        job_order.push(op.job);
    }

    let mut last_operation = vertex.last_operation.clone();
    last_operation.insert(machine, v);

    let mut scheduled_ops = vertex.scheduled_ops.clone();
    scheduled_ops.push(v);
    let mut encountered_ops = vertex.encountered_ops.clone();
    encountered_ops.push(v);

    let terminal = jobs_completion
        .iter()
        .enumerate()
        .all(|(i, &done)| done >= problem.job_ops(problem.jobs_output()[i]).len());

    let alapst = update_vertex_alapst(&mut data.dg, &sequences, problem, &data.solution)?;

    Ok(Some(DdVertex {
        id: next_id(&mut data.next_vertex_id),
        parent: vertex.id,
        sequences,
        asapst,
        alapst,
        jobs_completion,
        job_order,
        last_operation,
        scheduled_ops,
        encountered_ops,
        depth: vertex.depth + 1,
        terminal,
    }))
}

/// Latest start times consistent with the incumbent upper bound: reverse
/// relaxation rooted at the last graph vertex.
fn update_vertex_alapst(
    dg: &mut ConstraintGraph,
    sequences: &MachinesSequences,
    problem: &Instance,
    solution: &DdSolution,
) -> Result<PathTimes> {
    let mut alapst = vec![ALAP_START_VALUE; dg.num_vertices()];
    if solution.best_upper_bound == Delay::MAX {
        return Ok(alapst);
    }

    let root = dg.num_vertices() - 1;
    alapst[root] = solution.best_upper_bound;

    let edges = utils::edges_from_sequences(problem, sequences)?;
    let added = dg.add_edges(&edges);
    let _ = paths::compute_alapst(dg, &mut alapst, &[root]);
    dg.remove_edges(&added);
    Ok(alapst)
}

/// A child is dominated by a queued vertex with the same completion
/// signature whose scheduled operations all start no later.
fn is_dominated(data: &DdSolverData, child: &DdVertex) -> bool {
    let Some(candidates) = data.active.get(&child.jobs_completion) else {
        return false;
    };
    for id in candidates {
        let old = &data.arena[id];
        let dominated = child
            .scheduled_ops
            .iter()
            .all(|&v| child.asapst[v] >= old.asapst[v]);
        if dominated {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::test_instances;

    fn dd_makespan(
        instance: (Delay, Delay, Delay, Delay, Delay, Delay, u32),
        exploration: DdExplorationType,
    ) -> Delay {
        let (load, p1, p2, unload, bmin, bmax, n) = instance;
        let mut problem = test_instances::re_entrant(load, p1, p2, unload, bmin, bmax, n);
        let mut args = CliArgs::default();
        args.algorithm = AlgorithmType::Dd;
        args.exploration_type = exploration;
        args.time_out = std::time::Duration::from_secs(30);
        let (solutions, data) = solve(&mut problem, &args).unwrap();
        assert!(!solutions.is_empty(), "no solution found: {data}");
        solutions[0].makespan()
    }

    #[test]
    fn tight_buffer_is_solved_optimally() {
        assert_eq!(dd_makespan((1, 1, 1, 1, 1, 1, 5), DdExplorationType::Static), 11);
    }

    #[test]
    fn exploration_strategies_agree_on_optimum() {
        for exploration in [
            DdExplorationType::Breadth,
            DdExplorationType::Depth,
            DdExplorationType::Best,
            DdExplorationType::Adaptive,
        ] {
            assert_eq!(dd_makespan((1, 1, 1, 1, 1, 1, 3), exploration), 7);
        }
    }

    #[test]
    fn termination_is_reported() {
        let mut problem = test_instances::re_entrant(1, 1, 1, 1, 1, 1, 3);
        let mut args = CliArgs::default();
        args.algorithm = AlgorithmType::Dd;
        let (_, data) = solve(&mut problem, &args).unwrap();
        assert_eq!(data["termination"], TERMINATION_OPTIMAL);
        assert!(data["lowerBound"].as_i64().unwrap() <= 7);
    }
}
