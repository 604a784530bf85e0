use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;

use super::scheduling_option::SchedulingOption;
use super::utils;
use crate::algorithms::paths::PathTimes;
use crate::cg::Edges;
use crate::problem::{Instance, MachineId, Operation};
use crate::{Delay, Result};

/// An ordered sequence of operations on one machine.
pub type Sequence = Vec<Operation>;

/// The chosen sequence of every machine that has one.
pub type MachinesSequences = HashMap<MachineId, Sequence>;

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// The operations committed so far, per machine, with the cached earliest
/// start times and the ranking scalars of the forward heuristics.
///
/// Three cursors are kept per machine: the position right after the most
/// recent insertion (`last_inserted`), the earliest position future
/// insertions may use (`first_feasible`; maintenance insertions only shift
/// it to keep indices valid), and the position the maintenance scanner
/// resumes from (`first_maint`).
#[derive(Clone, Debug)]
pub struct PartialSolution {
    chosen_sequences: MachinesSequences,
    last_inserted: HashMap<MachineId, usize>,
    first_feasible: HashMap<MachineId, usize>,
    first_maint: HashMap<MachineId, usize>,
    asapst: PathTimes,

    ranking: f64,
    avg_productivity: Delay,
    makespan_last_scheduled_job: Delay,
    earliest_start_future_operation: Delay,
    nr_ops_in_loop: u32,

    id: u64,
    prev_id: Option<u64>,
    maint_count: u32,
    repair_count: u32,
    reprint_count: u32,
}

impl PartialSolution {
    pub fn new(chosen_sequences: MachinesSequences, asapst: PathTimes) -> Self {
        Self::with_cursors(
            chosen_sequences,
            asapst,
            HashMap::new(),
            HashMap::new(),
            HashMap::new(),
        )
    }

    pub fn with_cursors(
        chosen_sequences: MachinesSequences,
        asapst: PathTimes,
        last_inserted: HashMap<MachineId, usize>,
        first_feasible: HashMap<MachineId, usize>,
        first_maint: HashMap<MachineId, usize>,
    ) -> Self {
        PartialSolution {
            chosen_sequences,
            last_inserted,
            first_feasible,
            first_maint,
            asapst,
            ranking: -1.0,
            avg_productivity: -1,
            makespan_last_scheduled_job: -1,
            earliest_start_future_operation: -1,
            nr_ops_in_loop: 0,
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            prev_id: None,
            maint_count: 0,
            repair_count: 0,
            reprint_count: 0,
        }
    }

    pub fn machine_sequence(&self, machine: MachineId) -> &[Operation] {
        self.chosen_sequences
            .get(&machine)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn set_machine_sequence(&mut self, machine: MachineId, sequence: Sequence) {
        self.chosen_sequences.insert(machine, sequence);
    }

    pub fn chosen_sequences(&self) -> &MachinesSequences {
        &self.chosen_sequences
    }

    /// Index of the first position future insertions may use.
    pub fn first_possible_index(&self, machine: MachineId) -> usize {
        self.first_feasible.get(&machine).copied().unwrap_or(0)
    }

    /// Index of the position the maintenance scanner resumes from.
    pub fn first_maint_index(&self, machine: MachineId) -> usize {
        self.first_maint.get(&machine).copied().unwrap_or(0)
    }

    /// Index right after the most recent insertion.
    pub fn last_inserted_index(&self, machine: MachineId) -> usize {
        self.last_inserted.get(&machine).copied().unwrap_or(0)
    }

    pub fn set_first_feasible_index(&mut self, machine: MachineId, value: usize) {
        self.first_feasible.insert(machine, value);
    }

    pub fn set_first_maint_index(&mut self, machine: MachineId, value: usize) {
        self.first_maint.insert(machine, value);
    }

    /// Returns a copy with `option.cur` inserted at `option.position`. The
    /// insertion advances `last_inserted`; a regular insertion also commits
    /// everything up to and including the new position, while a maintenance
    /// insertion merely shifts `first_feasible` to keep its index valid.
    pub fn add(
        &self,
        machine: MachineId,
        option: &SchedulingOption,
        asapst: &PathTimes,
    ) -> PartialSolution {
        let mut sequences = self.chosen_sequences.clone();
        sequences
            .entry(machine)
            .or_default()
            .insert(option.position, option.cur);

        let mut last_inserted = self.last_inserted.clone();
        last_inserted.insert(machine, option.position + 1);

        let mut first_feasible = self.first_feasible.clone();
        let feasible = first_feasible.entry(machine).or_insert(0);
        *feasible = if option.is_maint {
            *feasible + 1
        } else {
            option.position + 1
        };

        let mut child = PartialSolution::with_cursors(
            sequences,
            asapst.clone(),
            last_inserted,
            first_feasible,
            self.first_maint.clone(),
        );
        child.prev_id = Some(self.id);
        child.maint_count = self.maint_count;
        child.repair_count = self.repair_count;
        child.reprint_count = self.reprint_count;
        child
    }

    /// Returns a copy with the operation at `option.position` removed.
    /// `after` means the removal happens after the last commit; repair
    /// passes `false` to rewind `last_inserted` past the removal.
    pub fn remove(
        &self,
        machine: MachineId,
        option: &SchedulingOption,
        asapst: &PathTimes,
        after: bool,
    ) -> PartialSolution {
        let mut sequences = self.chosen_sequences.clone();
        sequences
            .entry(machine)
            .or_default()
            .remove(option.position);

        let mut last_inserted = self.last_inserted.clone();
        if !after {
            let last = last_inserted.entry(machine).or_insert(0);
            *last = last.saturating_sub(1);
        }

        let mut first_feasible = self.first_feasible.clone();
        let feasible = first_feasible.entry(machine).or_insert(0);
        *feasible = feasible.saturating_sub(1);

        let mut child = PartialSolution::with_cursors(
            sequences,
            asapst.clone(),
            last_inserted,
            first_feasible,
            self.first_maint.clone(),
        );
        child.prev_id = Some(self.id);
        child.maint_count = self.maint_count;
        child.repair_count = self.repair_count;
        child.reprint_count = self.reprint_count;
        child
    }

    /// Realizes the chosen sequence of one machine into constraint edges.
    pub fn chosen_edges(&self, machine: MachineId, problem: &Instance) -> Result<Edges> {
        utils::edges_from_sequence(
            problem,
            problem.delay_graph(),
            self.machine_sequence(machine),
            machine,
        )
    }

    /// Edges of every chosen machine sequence.
    pub fn all_chosen_edges(&self, problem: &Instance) -> Result<Edges> {
        utils::edges_from_sequences(problem, &self.chosen_sequences)
    }

    /// Projects the re-entrant machine's first passes onto the input
    /// machine.
    pub fn inferred_input_sequence(&self, problem: &Instance) -> Sequence {
        utils::inferred_input_sequence(problem, &self.chosen_sequences)
    }

    /// Stores the inferred input sequence as the input machine's sequence.
    pub fn add_inferred_input_sequence(&mut self, problem: &Instance) {
        let inferred = self.inferred_input_sequence(problem);
        self.set_machine_sequence(problem.machines()[0], inferred);
    }

    /// Edges of every chosen sequence plus the inferred input sequence;
    /// this is what the solvers feed to the longest-path kernel.
    pub fn all_and_inferred_edges(&self, problem: &Instance) -> Result<Edges> {
        utils::all_edges_plus_inferred(problem, &self.chosen_sequences)
    }

    /// Makespan as the start time of the last graph vertex.
    pub fn makespan(&self) -> Delay {
        self.asapst.last().copied().unwrap_or(-1)
    }

    /// Start of the last operation of the last output job plus its
    /// processing time.
    pub fn real_makespan(&self, problem: &Instance) -> Result<Delay> {
        let last_job = *problem.jobs_output().last().expect("non-empty instance");
        let last_op = *problem.job_ops(last_job).last().expect("non-empty job");
        let v = problem.delay_graph().vertex_id(&last_op)?;
        Ok(self.asapst[v] + problem.processing_time(&last_op))
    }

    pub fn asapst(&self) -> &PathTimes {
        &self.asapst
    }

    pub fn set_asapst(&mut self, asapst: PathTimes) {
        self.asapst = asapst;
    }

    pub fn clear_asapst(&mut self) {
        self.asapst.clear();
    }

    /// Domination: not worse on the makespan of the last scheduled job and
    /// the earliest future start, and at least as many operations committed
    /// in the loop.
    pub fn dominates(&self, other: &PartialSolution) -> bool {
        self.makespan_last_scheduled_job <= other.makespan_last_scheduled_job
            && self.earliest_start_future_operation <= other.earliest_start_future_operation
            && self.nr_ops_in_loop >= other.nr_ops_in_loop
    }

    pub fn ranking(&self) -> f64 {
        self.ranking
    }

    pub fn set_ranking(&mut self, value: f64) {
        self.ranking = value;
    }

    pub fn average_productivity(&self) -> Delay {
        self.avg_productivity
    }

    pub fn set_average_productivity(&mut self, value: Delay) {
        self.avg_productivity = value;
    }

    pub fn makespan_last_scheduled_job(&self) -> Delay {
        self.makespan_last_scheduled_job
    }

    pub fn set_makespan_last_scheduled_job(&mut self, value: Delay) {
        self.makespan_last_scheduled_job = value;
    }

    pub fn earliest_start_future_operation(&self) -> Delay {
        self.earliest_start_future_operation
    }

    pub fn set_earliest_start_future_operation(&mut self, value: Delay) {
        self.earliest_start_future_operation = value;
    }

    pub fn nr_ops_in_loop(&self) -> u32 {
        self.nr_ops_in_loop
    }

    pub fn set_nr_ops_in_loop(&mut self, value: u32) {
        self.nr_ops_in_loop = value;
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn prev_id(&self) -> Option<u64> {
        self.prev_id
    }

    pub fn maint_count(&self) -> u32 {
        self.maint_count
    }

    pub fn repair_count(&self) -> u32 {
        self.repair_count
    }

    pub fn reprint_count(&self) -> u32 {
        self.reprint_count
    }

    pub fn set_maint_count(&mut self, value: u32) {
        self.maint_count = value;
    }

    pub fn incr_maint_count(&mut self) {
        self.maint_count += 1;
    }

    pub fn incr_repair_count(&mut self) {
        self.repair_count += 1;
    }

    pub fn incr_reprint_count(&mut self) {
        self.reprint_count += 1;
    }
}

impl std::fmt::Display for PartialSolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<makespan last job={}, makespan={}, earliest future={}, ops in loop={}, id={}, prev={:?}>",
            self.makespan_last_scheduled_job,
            self.makespan(),
            self.earliest_start_future_operation,
            self.nr_ops_in_loop,
            self.id,
            self.prev_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::JobId;

    fn op(job: u32, op_id: u32) -> Operation {
        Operation::new(JobId(job), op_id)
    }

    #[test]
    fn add_advances_cursors() {
        let machine = MachineId(1);
        let mut sequences = MachinesSequences::default();
        sequences.insert(machine, vec![op(0, 1), op(1, 1), op(0, 2)]);
        let solution = PartialSolution::new(sequences, vec![]);

        let option = SchedulingOption::new(op(0, 1), op(0, 2), op(1, 1), 1);
        let child = solution.add(machine, &option, &vec![]);
        assert_eq!(child.machine_sequence(machine).len(), 4);
        assert_eq!(child.machine_sequence(machine)[1], op(0, 2));
        assert_eq!(child.first_possible_index(machine), 2);
        assert_eq!(child.last_inserted_index(machine), 2);
        assert_eq!(child.prev_id(), Some(solution.id()));
    }

    #[test]
    fn maintenance_add_keeps_first_feasible_position() {
        let machine = MachineId(1);
        let mut sequences = MachinesSequences::default();
        sequences.insert(machine, vec![op(0, 1), op(1, 1)]);
        let mut solution = PartialSolution::new(sequences, vec![]);
        solution.set_first_feasible_index(machine, 1);

        let maint = Operation::maintenance(JobId(u32::MAX - 6), 0, 0);
        let option = SchedulingOption::maintenance(op(0, 1), maint, op(1, 1), 1);
        let child = solution.add(machine, &option, &vec![]);
        // the index only shifts to account for the inserted element
        assert_eq!(child.first_possible_index(machine), 2);
        assert_eq!(child.last_inserted_index(machine), 2);
    }

    #[test]
    fn domination_is_partial() {
        let mut a = PartialSolution::new(MachinesSequences::default(), vec![]);
        let mut b = PartialSolution::new(MachinesSequences::default(), vec![]);
        a.set_makespan_last_scheduled_job(10);
        a.set_earliest_start_future_operation(5);
        a.set_nr_ops_in_loop(3);
        b.set_makespan_last_scheduled_job(12);
        b.set_earliest_start_future_operation(6);
        b.set_nr_ops_in_loop(2);
        assert!(a.dominates(&b));
        assert!(!b.dominates(&a));
    }
}
