//! Shared helpers of the solver family: realizing machine sequences into
//! constraint edges, inferring the input-machine sequence from the
//! re-entrant machine's choices, and preparing the initial graph.

use super::partial_solution::{MachinesSequences, PartialSolution, Sequence};
use crate::algorithms::paths::{self, PathTimes};
use crate::cg::{Builder, Edge, Edges};
use crate::io::dot;
use crate::problem::{Instance, MachineId};
use crate::{Result, SchedulerError};

/// Realizes an ordered machine sequence into constraint edges, anchored at
/// the machine's source vertex.
///
/// A maintenance operation extends the gap between its neighbours: the edge
/// into it carries the full processing-plus-setup of the pair it interrupts,
/// the edge out of it carries the maintenance duration (through `query`),
/// and a negative back edge forbids the successor from starting during the
/// maintenance interval.
pub fn edges_from_sequence(
    problem: &Instance,
    dg: &crate::cg::ConstraintGraph,
    sequence: &[crate::problem::Operation],
    machine: MachineId,
) -> Result<Edges> {
    let policy = problem.maintenance_policy();
    let mut edges = Edges::new();

    let mut prev = dg.source(machine)?;
    let mut prev_op = dg.operation(prev);

    for (i, op) in sequence.iter().enumerate() {
        let v = dg.vertex_id(op)?;

        let weight = if op.is_maintenance() {
            match sequence.get(i + 1) {
                Some(next) => problem.query(&prev_op, next),
                None => problem.query(&prev_op, op),
            }
        } else {
            problem.query(&prev_op, op)
        };
        edges.push(Edge::new(prev, v, weight));

        if prev_op.is_maintenance() {
            let due = policy.operation_duration(&prev_op) + policy.minimum_idle() - 1;
            edges.push(Edge::new(v, prev, -due));
        }

        prev = v;
        prev_op = *op;
    }

    Ok(edges)
}

/// Concatenated edges of every chosen machine sequence.
pub fn edges_from_sequences(problem: &Instance, sequences: &MachinesSequences) -> Result<Edges> {
    let mut edges = Edges::new();
    for (&machine, sequence) in sequences {
        edges.extend(edges_from_sequence(
            problem,
            problem.delay_graph(),
            sequence,
            machine,
        )?);
    }
    Ok(edges)
}

/// Projects the first re-entrant machine's sequence onto the input machine:
/// each first pass pins the job's first operation, in the same order.
pub fn inferred_input_sequence(problem: &Instance, sequences: &MachinesSequences) -> Sequence {
    let Some(&re_machine) = problem.re_entrant_machines().first() else {
        return Sequence::new();
    };
    let input_machine = problem.machines()[0];
    if input_machine == re_machine {
        return Sequence::new();
    }
    let Some(sequence) = sequences.get(&re_machine) else {
        return Sequence::new();
    };

    let mut inferred = Sequence::new();
    for op in sequence {
        if op.is_maintenance() {
            continue;
        }
        let on_machine = problem.job_operations_on_machine(op.job, re_machine);
        if on_machine.first() == Some(op) {
            inferred.push(problem.job_ops(op.job)[0]);
        }
    }
    inferred
}

/// Edges of the inferred input sequence.
pub fn inferred_edges(problem: &Instance, sequences: &MachinesSequences) -> Result<Edges> {
    let inferred = inferred_input_sequence(problem, sequences);
    if inferred.is_empty() {
        return Ok(Edges::new());
    }
    edges_from_sequence(
        problem,
        problem.delay_graph(),
        &inferred,
        problem.machines()[0],
    )
}

/// Chosen edges of all machines plus the inferred input edges; the edge set
/// solvers hand to the longest-path kernel.
pub fn all_edges_plus_inferred(
    problem: &Instance,
    sequences: &MachinesSequences,
) -> Result<Edges> {
    let mut edges = edges_from_sequences(problem, sequences)?;
    edges.extend(inferred_edges(problem, sequences)?);
    Ok(edges)
}

/// One job at a time through the re-entrant loop.
pub fn create_machine_trivial_sequence(problem: &Instance, machine: MachineId) -> Sequence {
    let mut sequence = Sequence::new();
    for &job in problem.jobs_output() {
        sequence.extend_from_slice(problem.job_operations_on_machine(job, machine));
    }
    sequence
}

/// Trivial solution scheduling every re-entrant machine one job at a time.
pub fn create_trivial_solution(problem: &Instance) -> PartialSolution {
    let mut sequences = MachinesSequences::default();
    for &machine in problem.re_entrant_machines() {
        sequences.insert(machine, create_machine_trivial_sequence(problem, machine));
    }
    PartialSolution::new(sequences, PathTimes::new())
}

/// Builds the instance's constraint graph when missing and computes the
/// initial earliest start times. An infeasible input graph is fatal; a DOT
/// dump is written when debug logging is enabled.
pub fn init_problem_graph(problem: &mut Instance) -> Result<PathTimes> {
    if !problem.is_graph_initialized() {
        problem.update_delay_graph(Builder::build(problem)?);
    }

    let result = paths::compute_asapst_fresh(problem.delay_graph());
    if result.has_positive_cycle() {
        if tracing::enabled!(tracing::Level::DEBUG) {
            let name = format!("input_infeasible_{}.dot", problem.name());
            let _ = dot::save_as_dot(problem.delay_graph(), &name, &result.positive_cycle);
        }
        return Err(SchedulerError::Infeasible(
            "the input graph is infeasible".to_string(),
        ));
    }
    Ok(result.times)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::test_instances;
    use crate::problem::{JobId, Operation};

    #[test]
    fn inferred_sequence_follows_first_passes() {
        let mut problem = test_instances::re_entrant(1, 1, 1, 1, 1, 1, 3);
        let _ = init_problem_graph(&mut problem).unwrap();
        let machine = problem.re_entrant_machines()[0];

        let mut sequences = MachinesSequences::default();
        // first passes of jobs 0..2 with job 2's second pass interleaved
        sequences.insert(
            machine,
            vec![
                Operation::new(JobId(0), 1),
                Operation::new(JobId(0), 2),
                Operation::new(JobId(1), 1),
                Operation::new(JobId(1), 2),
                Operation::new(JobId(2), 1),
                Operation::new(JobId(2), 2),
            ],
        );
        let inferred = inferred_input_sequence(&problem, &sequences);
        assert_eq!(
            inferred,
            vec![
                Operation::new(JobId(0), 0),
                Operation::new(JobId(1), 0),
                Operation::new(JobId(2), 0),
            ]
        );
    }

    #[test]
    fn trivial_solution_is_feasible() {
        let mut problem = test_instances::re_entrant(1, 1, 1, 1, 1, 1, 4);
        let _ = init_problem_graph(&mut problem).unwrap();
        let solution = create_trivial_solution(&problem);
        let edges = solution.all_and_inferred_edges(&problem).unwrap();

        let mut dg = problem.delay_graph().clone();
        let result = paths::compute_asapst_fresh_with_edges(&mut dg, &edges);
        assert!(!result.has_positive_cycle());
        // one job at a time: load + 2 passes per job
        assert_eq!(*result.times.last().unwrap(), 1 + 4 * 2);
    }
}
