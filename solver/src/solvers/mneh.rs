//! MNEH sequence rebuild: re-insert the operations of a seed sequence one
//! by one at their best position, iterating while the makespan improves.

use hashbrown::{HashMap, HashSet};

use super::partial_solution::{PartialSolution, Sequence};
use super::{asap_backtrack, forward, maintenance, utils};
use crate::algorithms::paths;
use crate::cg::ConstraintGraph;
use crate::cli::{AlgorithmType, CliArgs};
use crate::problem::{Instance, JobId, MachineId};
use crate::{Result, SchedulerError};

pub fn solve(problem: &mut Instance, args: &CliArgs) -> Result<PartialSolution> {
    tracing::info!("computation of the schedule started");
    let _ = utils::init_problem_graph(problem)?;

    let machine = forward::re_entrant_machine(problem)?;
    let mut dg = problem.delay_graph().clone();

    let seed_sequence = obtain_initial_sequence(problem, machine, args)?;
    let chosen_sequence = improve_sequence(problem, machine, &seed_sequence, &mut dg, args)?;

    let mut sequences = HashMap::new();
    sequences.insert(machine, chosen_sequence);
    let mut solution = PartialSolution::new(sequences, vec![]);

    let edges = solution.all_and_inferred_edges(problem)?;
    let result = paths::compute_asapst_fresh_with_edges(&mut dg, &edges);
    if result.has_positive_cycle() {
        return Err(SchedulerError::Infeasible("chosen sequence is infeasible".into()));
    }
    solution.set_asapst(result.times);

    if matches!(args.algorithm, AlgorithmType::Mineh | AlgorithmType::Minehsim) {
        let (updated, new_dg) =
            maintenance::trigger_maintenance_at_end(dg, problem, machine, &solution, args)?;
        solution = updated;
        problem.update_delay_graph(new_dg);
    }

    solution.add_inferred_input_sequence(problem);
    Ok(solution)
}

fn obtain_initial_sequence(
    problem: &mut Instance,
    machine: MachineId,
    args: &CliArgs,
) -> Result<Sequence> {
    match args.algorithm {
        AlgorithmType::MnehBhcsCombi | AlgorithmType::MnehBhcsFlexible => {
            let mut seed_args = args.clone();
            seed_args.algorithm = AlgorithmType::Bhcs;
            if args.algorithm == AlgorithmType::MnehBhcsFlexible {
                // Only flexibility matters when the result merely seeds the
                // rebuild: minimize the start-time increase of the inserted
                // operation itself.
                seed_args.flexibility_weight = 1.0;
                seed_args.productivity_weight = 0.0;
                seed_args.tie_weight = 0.0;
            } else {
                // allow more options downstream
                seed_args.flexibility_weight = 2.0;
            }
            let result = forward::solve(problem, &seed_args)?;
            Ok(result.machine_sequence(machine).to_vec())
        }
        AlgorithmType::MnehAsap => {
            let mut seed_args = args.clone();
            seed_args.algorithm = AlgorithmType::Asap;
            let result = forward::solve(problem, &seed_args)?;
            Ok(result.machine_sequence(machine).to_vec())
        }
        AlgorithmType::MnehAsapBacktrack => {
            let mut seed_args = args.clone();
            seed_args.algorithm = AlgorithmType::AsapBacktrack;
            seed_args.time_out = std::time::Duration::from_millis(1000);
            let result = asap_backtrack::solve(problem, &seed_args)?;
            Ok(result.machine_sequence(machine).to_vec())
        }
        _ => {
            let trivial = utils::create_trivial_solution(problem);
            Ok(trivial.machine_sequence(machine).to_vec())
        }
    }
}

/// Repeats the rebuild while the makespan improves, up to the iteration cap.
pub fn improve_sequence(
    problem: &mut Instance,
    machine: MachineId,
    seed_sequence: &Sequence,
    dg: &mut ConstraintGraph,
    args: &CliArgs,
) -> Result<Sequence> {
    let mut seed_solution = solution_for(problem, machine, seed_sequence.clone(), dg)?
        .ok_or_else(|| SchedulerError::Infeasible("seed sequence infeasible".into()))?;

    let (mut built_sequence, mut built_solution) =
        update_sequence(problem, machine, seed_sequence, dg)?;

    if args.algorithm == AlgorithmType::Mineh {
        let (updated, new_dg) = maintenance::trigger_maintenance_at_end(
            dg.clone(),
            problem,
            machine,
            &built_solution,
            args,
        )?;
        built_solution = updated;
        let (seed_updated, _) = maintenance::trigger_maintenance_at_end(
            new_dg,
            problem,
            machine,
            &seed_solution,
            args,
        )?;
        seed_solution = seed_updated;
    }

    let mut current_makespan = seed_solution.real_makespan(problem)?;
    let mut best_sequence = built_sequence.clone();
    let mut iteration: u64 = 0;

    while built_solution.real_makespan(problem)? < current_makespan
        && iteration < args.max_iterations
    {
        current_makespan = built_solution.real_makespan(problem)?;
        best_sequence = built_sequence.clone();

        let (next_sequence, next_solution) =
            update_sequence(problem, machine, &built_sequence, dg)?;
        built_sequence = next_sequence;
        built_solution = next_solution;

        if args.algorithm == AlgorithmType::Mineh {
            let (updated, _) = maintenance::trigger_maintenance_at_end(
                dg.clone(),
                problem,
                machine,
                &built_solution,
                args,
            )?;
            built_solution = updated;
        }

        iteration += 1;
    }
    Ok(best_sequence)
}

/// One rebuild pass: take the seed's operations in order and place each at
/// the position that minimizes the makespan of (partial rebuild + seed
/// remainder). The rebuild is makespan-greedy; the ranking weights play no
/// part here.
pub fn update_sequence(
    problem: &Instance,
    machine: MachineId,
    seed_sequence: &Sequence,
    dg: &mut ConstraintGraph,
) -> Result<(Sequence, PartialSolution)> {
    let mut built_sequence: Sequence = vec![seed_sequence[0]];

    let seed_solution = solution_for(problem, machine, seed_sequence.clone(), dg)?
        .ok_or_else(|| SchedulerError::Infeasible("seed sequence infeasible".into()))?;
    let mut min_makespan = seed_solution.real_makespan(problem)?;

    for j in 1..seed_sequence.len() {
        let cur = seed_sequence[j];
        let mut best_sequence: Option<Sequence> = None;

        for i in 0..=built_sequence.len() {
            let mut test_sequence = built_sequence.clone();
            test_sequence.insert(i.min(test_sequence.len()), cur);

            // mend the connection with the unprocessed seed remainder
            let mut evaluate_sequence = test_sequence.clone();
            evaluate_sequence.extend_from_slice(&seed_sequence[j + 1..]);

            if !validate_sequence(problem, &evaluate_sequence, machine) {
                continue;
            }

            if let Some(solution) = solution_for(problem, machine, evaluate_sequence, dg)? {
                let new_makespan = solution.real_makespan(problem)?;
                if new_makespan < min_makespan {
                    best_sequence = Some(test_sequence);
                    min_makespan = new_makespan;
                }
            }
        }

        match best_sequence {
            Some(sequence) => built_sequence = sequence,
            None => built_sequence.push(cur),
        }
    }

    let built_solution = solution_for(problem, machine, built_sequence.clone(), dg)?
        .ok_or_else(|| SchedulerError::Infeasible("rebuilt sequence infeasible".into()))?;
    Ok((built_sequence, built_solution))
}

/// Quick structural check before the expensive longest-path validation:
/// first passes in job order, second passes in job order, and no second
/// pass before its own first pass.
pub fn validate_sequence(problem: &Instance, sequence: &[crate::problem::Operation], machine: MachineId) -> bool {
    let ops = problem.machine_operations(machine);

    let mut last_first_pass: Option<JobId> = None;
    let mut last_second_pass: Option<JobId> = None;
    let mut done_first_pass: HashSet<JobId> = HashSet::new();

    for op in sequence {
        if op.op_id == ops[0] {
            if matches!(last_first_pass, Some(last) if op.job <= last) {
                return false;
            }
            last_first_pass = Some(op.job);
            done_first_pass.insert(op.job);
        }

        if op.op_id == ops[1] {
            if !done_first_pass.contains(&op.job) {
                return false;
            }
            if matches!(last_second_pass, Some(last) if op.job <= last) {
                return false;
            }
            last_second_pass = Some(op.job);
        }
    }
    true
}

/// Realizes a sequence into a solution with computed start times; `None`
/// when it carries a positive cycle.
fn solution_for(
    problem: &Instance,
    machine: MachineId,
    sequence: Sequence,
    dg: &mut ConstraintGraph,
) -> Result<Option<PartialSolution>> {
    let mut sequences = HashMap::new();
    sequences.insert(machine, sequence);
    let mut solution = PartialSolution::new(sequences, vec![]);

    let edges = solution.all_and_inferred_edges(problem)?;
    let result = paths::compute_asapst_fresh_with_edges(dg, &edges);
    if result.has_positive_cycle() {
        return Ok(None);
    }
    solution.set_asapst(result.times);
    Ok(Some(solution))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::test_instances;
    use crate::problem::Operation;

    #[test]
    fn validates_pass_order() {
        let problem = test_instances::re_entrant(1, 1, 1, 1, 1, 1, 3);
        let machine = problem.re_entrant_machines()[0];

        let good = vec![
            Operation::new(JobId(0), 1),
            Operation::new(JobId(0), 2),
            Operation::new(JobId(1), 1),
            Operation::new(JobId(1), 2),
        ];
        assert!(validate_sequence(&problem, &good, machine));

        // second pass before its first pass
        let bad = vec![Operation::new(JobId(0), 2), Operation::new(JobId(0), 1)];
        assert!(!validate_sequence(&problem, &bad, machine));

        // first passes out of order
        let bad = vec![Operation::new(JobId(1), 1), Operation::new(JobId(0), 1)];
        assert!(!validate_sequence(&problem, &bad, machine));
    }

    #[test]
    fn rebuild_keeps_tight_instance_optimal() {
        let mut problem = test_instances::re_entrant(1, 1, 1, 1, 1, 1, 4);
        let args = CliArgs::default();
        let solution = solve(&mut problem, &args).unwrap();
        assert_eq!(solution.makespan(), 9);
    }
}
