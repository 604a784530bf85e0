//! Anytime variant of the forward heuristic: option evaluation stops when
//! the per-operation wall-clock budget expires, keeping the best-ranked
//! option seen so far. Normalization extrema are maintained incrementally
//! while options stream in.

use hashbrown::HashMap;

use super::forward;
use super::partial_solution::PartialSolution;
use super::scheduling_option::SchedulingOption;
use super::utils;
use crate::algorithms::paths::PathTimes;
use crate::cg::{ConstraintGraph, VertexId};
use crate::cli::CliArgs;
use crate::problem::{Instance, JobId, MachineId, Operation};
use crate::utils::StaticTimer;
use crate::{Delay, Result, SchedulerError};

/// Running extrema used to normalize ranks while options stream in.
#[derive(Clone, Copy)]
struct RunningNorms {
    min_push: Delay,
    max_push: Delay,
    min_push_next: Delay,
    max_push_next: Delay,
    min_ops: u32,
    max_ops: u32,
}

impl RunningNorms {
    fn new() -> Self {
        RunningNorms {
            min_push: Delay::MAX,
            max_push: Delay::MIN,
            min_push_next: Delay::MAX,
            max_push_next: Delay::MIN,
            min_ops: u32::MAX,
            max_ops: u32::MIN,
        }
    }

    fn update(&mut self, push: Delay, push_next: Delay, nr_ops: u32) {
        self.min_push = self.min_push.min(push);
        self.max_push = self.max_push.max(push);
        self.min_push_next = self.min_push_next.min(push_next);
        self.max_push_next = self.max_push_next.max(push_next);
        self.min_ops = self.min_ops.min(nr_ops);
        self.max_ops = self.max_ops.max(nr_ops);
    }

    fn rank(&self, push: Delay, push_next: Delay, nr_ops: u32, args: &CliArgs) -> f64 {
        let push_range = if self.max_push != self.min_push {
            (self.max_push - self.min_push) as f64
        } else {
            1.0
        };
        let push_next_range = if self.max_push_next != self.min_push_next {
            (self.max_push_next - self.min_push_next) as f64
        } else {
            1.0
        };
        let ops_range = if self.max_ops != self.min_ops {
            (self.max_ops - self.min_ops) as f64
        } else {
            1.0
        };

        args.flexibility_weight * ((push - self.min_push) as f64 / push_range)
            + args.productivity_weight * ((push_next - self.min_push_next) as f64 / push_next_range)
            + args.tie_weight * ((nr_ops - self.min_ops) as f64 / ops_range)
    }
}

/// The incumbent option: the solution plus the raw values its rank is
/// recomputed from whenever the extrema move.
struct Incumbent {
    solution: PartialSolution,
    push: Delay,
    push_next: Delay,
    nr_ops: u32,
}

pub fn solve(problem: &mut Instance, args: &CliArgs) -> Result<PartialSolution> {
    tracing::info!("computation of the schedule started");

    let asapst = utils::init_problem_graph(problem)?;
    let mut dg = problem.delay_graph().clone();

    let machine = forward::re_entrant_machine(problem)?;
    let initial = forward::create_initial_sequence(problem, machine)?;
    let mut sequences = HashMap::new();
    sequences.insert(machine, initial);
    let mut solution = PartialSolution::new(sequences, asapst);

    let jobs = problem.jobs_output().to_vec();
    for &job in jobs.iter().take(jobs.len().saturating_sub(1)) {
        let job_ops = problem.job_operations_on_machine(job, machine).to_vec();
        for op in job_ops.into_iter().skip(1) {
            solution = schedule_one_operation(&mut dg, problem, &solution, op, args)?;
        }
    }

    solution.add_inferred_input_sequence(problem);
    Ok(solution)
}

fn schedule_one_operation(
    dg: &mut ConstraintGraph,
    problem: &Instance,
    solution: &PartialSolution,
    eligible: Operation,
    args: &CliArgs,
) -> Result<PartialSolution> {
    let machine = problem.machine(&eligible);
    let timer = StaticTimer::new(args.time_out);

    let (last_reached, options) =
        forward::create_options(problem, dg, solution, eligible, machine)?;
    if options.is_empty() {
        return Err(SchedulerError::NoFeasibleOption(eligible));
    }

    let job_start = eligible.job;
    let mut asap_times = solution.asapst().clone();
    let prev_job = if job_start > JobId(1) { job_start - 1 } else { JobId(0) };
    let sources = dg.vertices_of_job(prev_job).to_vec();
    let window = dg.vertices_in_range(job_start, last_reached.job);
    crate::algorithms::paths::compute_asapst_windowed(dg, &mut asap_times, &sources, &window);

    let mut norms = RunningNorms::new();
    let mut incumbent: Option<Incumbent> = None;

    // The first option must be evaluated whatever the clock says; an
    // anytime answer needs at least one candidate.
    evaluate_option(
        dg, problem, solution, &options[0], &asap_times, machine, args, &mut norms,
        &mut incumbent,
    )?;
    if incumbent.is_none() {
        return Err(SchedulerError::Solver(format!(
            "first option tried is infeasible in the anytime approach for {eligible}"
        )));
    }

    for option in options.iter().skip(1) {
        if timer.is_time_up() {
            break;
        }
        evaluate_option(
            dg, problem, solution, option, &asap_times, machine, args, &mut norms,
            &mut incumbent,
        )?;
    }

    let best = incumbent.expect("at least the first option survived");
    Ok(best.solution)
}

/// Evaluates one option; a feasible option replaces the incumbent when its
/// rank under the current extrema is better.
#[allow(clippy::too_many_arguments)]
fn evaluate_option(
    dg: &mut ConstraintGraph,
    problem: &Instance,
    solution: &PartialSolution,
    option: &SchedulingOption,
    asap_times: &PathTimes,
    machine: MachineId,
    args: &CliArgs,
    norms: &mut RunningNorms,
    incumbent: &mut Option<Incumbent>,
) -> Result<()> {
    let evaluated = forward::evaluate_option_feasibility(
        dg,
        problem,
        solution,
        std::slice::from_ref(option),
        asap_times,
        machine,
    )?;
    let Some((candidate, opt)) = evaluated.into_iter().next() else {
        return Ok(());
    };

    let cur_v: VertexId = dg.vertex_id(&opt.cur)?;
    let next_v: VertexId = dg.vertex_id(&opt.next)?;
    let push = candidate.asapst()[cur_v] - asap_times[cur_v];
    let push_next = candidate.asapst()[next_v] - asap_times[next_v];
    let nr_ops = candidate.nr_ops_in_loop();

    norms.update(push, push_next, nr_ops);

    let replace = match incumbent {
        None => true,
        Some(best) => {
            let best_rank = norms.rank(best.push, best.push_next, best.nr_ops, args);
            let cand_rank = norms.rank(push, push_next, nr_ops, args);
            cand_rank < best_rank
        }
    };
    if replace {
        *incumbent = Some(Incumbent {
            solution: candidate,
            push,
            push_next,
            nr_ops,
        });
    }
    Ok(())
}
