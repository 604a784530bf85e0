use hashbrown::{HashMap, HashSet};

use super::{
    plexity, DefaultOperationsTime, DefaultTimeBetweenOps, JobId, JobOperations, JobsTime,
    MachineId, MaintType, MaintenancePolicy, Operation, OperationId, OperationMachineMap,
    OperationSizes, PlexityTable, ReEntrancies, ReEntrantId, TimeBetweenOps,
};
use crate::cg::ConstraintGraph;
use crate::Delay;

/// The kind of shop being scheduled.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum ShopType {
    Flow,
    Job,
    #[default]
    FixedOrder,
}

/// A fixed-order permutation flow-shop scheduling problem with
/// sequence-dependent setup times (and its job-shop / free-order variants).
///
/// The instance is immutable after construction except for the dynamically
/// added setup times and due dates and the freshly minted maintenance
/// operations. Derived views (flow vector, per-machine operation lists,
/// re-entrancy table) are cached on construction.
#[derive(Clone, Debug)]
pub struct Instance {
    name: String,
    jobs: JobOperations,
    machine_mapping: OperationMachineMap,
    processing_times: DefaultOperationsTime,
    setup_times: DefaultTimeBetweenOps,
    setup_times_indep: TimeBetweenOps,
    due_dates: TimeBetweenOps,
    due_dates_indep: TimeBetweenOps,
    absolute_due_dates: JobsTime,
    sheet_sizes: OperationSizes,
    maximum_sheet_size: u32,
    shop_type: ShopType,
    out_of_order: bool,
    maint_policy: MaintenancePolicy,

    /// Dynamically added setup times; insertions take the max.
    extra_setup_times: TimeBetweenOps,
    /// Dynamically added due dates; insertions take the min.
    extra_due_dates: TimeBetweenOps,

    /// Constraint-graph model of the problem; set by the graph builder.
    dg: Option<ConstraintGraph>,

    // Derived views.
    jobs_output: Vec<JobId>,
    job_output_position: HashMap<JobId, usize>,
    flow_vector: Vec<OperationId>,
    machines: Vec<MachineId>,
    operations_per_machine: HashMap<MachineId, Vec<OperationId>>,
    operation_to_machine: HashMap<OperationId, MachineId>,
    re_entrant_machines: Vec<MachineId>,
    re_entrant_machine_to_id: HashMap<MachineId, ReEntrantId>,
    job_plexity: PlexityTable,
    job_machine_ops: HashMap<JobId, HashMap<MachineId, Vec<Operation>>>,

    next_maintenance_op_id: OperationId,
}

impl Instance {
    /// Job id under which maintenance operations are minted.
    pub const MAINT_ID: JobId = JobId(JobId::NEXT_RESERVED.0 - 3);

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        jobs: JobOperations,
        machine_mapping: OperationMachineMap,
        processing_times: DefaultOperationsTime,
        setup_times: DefaultTimeBetweenOps,
        setup_times_indep: TimeBetweenOps,
        due_dates: TimeBetweenOps,
        due_dates_indep: TimeBetweenOps,
        absolute_due_dates: JobsTime,
        sheet_sizes: OperationSizes,
        maximum_sheet_size: u32,
        shop_type: ShopType,
        out_of_order: bool,
    ) -> Self {
        let mut instance = Instance {
            name,
            jobs,
            machine_mapping,
            processing_times,
            setup_times,
            setup_times_indep,
            due_dates,
            due_dates_indep,
            absolute_due_dates,
            sheet_sizes,
            maximum_sheet_size,
            shop_type,
            out_of_order,
            maint_policy: MaintenancePolicy::default(),
            extra_setup_times: TimeBetweenOps::new(),
            extra_due_dates: TimeBetweenOps::new(),
            dg: None,
            jobs_output: Vec::new(),
            job_output_position: HashMap::new(),
            flow_vector: Vec::new(),
            machines: Vec::new(),
            operations_per_machine: HashMap::new(),
            operation_to_machine: HashMap::new(),
            re_entrant_machines: Vec::new(),
            re_entrant_machine_to_id: HashMap::new(),
            job_plexity: PlexityTable::default(),
            job_machine_ops: HashMap::new(),
            next_maintenance_op_id: 0,
        };

        for (&job, ops) in &instance.jobs {
            for op in ops {
                let machine = instance.machine_mapping[op];
                instance
                    .job_machine_ops
                    .entry(job)
                    .or_default()
                    .entry(machine)
                    .or_default()
                    .push(*op);
            }
        }

        instance.compute_jobs_output();
        instance.compute_flow_vector();
        instance
    }

    fn compute_jobs_output(&mut self) {
        // BTreeMap keys come out sorted, which is the fixed output order.
        self.jobs_output = self.jobs.keys().copied().collect();
        self.job_output_position = self
            .jobs_output
            .iter()
            .enumerate()
            .map(|(i, &job)| (job, i))
            .collect();
    }

    fn compute_flow_vector(&mut self) {
        let mut seen: HashSet<MachineId> = HashSet::new();
        let mut ops_on_machine: HashMap<MachineId, HashSet<OperationId>> = HashMap::new();

        for ops in self.jobs.values() {
            for op in ops {
                let machine = self.machine_mapping[op];
                ops_on_machine.entry(machine).or_default().insert(op.op_id);
                if seen.insert(machine) {
                    self.machines.push(machine);
                }
            }
        }

        for &machine in &self.machines {
            let mut machine_ops: Vec<OperationId> =
                ops_on_machine[&machine].iter().copied().collect();
            machine_ops.sort_unstable();

            self.flow_vector.extend_from_slice(&machine_ops);
            for &op in &machine_ops {
                self.operation_to_machine.insert(op, machine);
            }

            if machine_ops.len() > 1 {
                let id = ReEntrantId(self.re_entrant_machine_to_id.len() as u32);
                self.re_entrant_machine_to_id.insert(machine, id);
                self.re_entrant_machines.push(machine);
            }
            self.operations_per_machine.insert(machine, machine_ops);
        }

        // With the re-entrant machines known, derive the plexity of each job.
        for (&job, ops) in &self.jobs {
            let mut re_entrancies = vec![ReEntrancies(0); self.re_entrant_machines.len()];
            for op in ops {
                let machine = self.machine_mapping[op];
                if let Some(&id) = self.re_entrant_machine_to_id.get(&machine) {
                    re_entrancies[id.value() as usize].0 += 1;
                }
            }
            if !re_entrancies.is_empty() {
                self.job_plexity.insert(job, re_entrancies);
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn jobs(&self) -> &JobOperations {
        &self.jobs
    }

    /// Operations of `job` in intra-job precedence order.
    pub fn job_ops(&self, job: JobId) -> &[Operation] {
        &self.jobs[&job]
    }

    pub fn number_of_jobs(&self) -> usize {
        self.jobs.len()
    }

    pub fn jobs_output(&self) -> &[JobId] {
        &self.jobs_output
    }

    pub fn job_at_output_position(&self, position: usize) -> JobId {
        self.jobs_output[position]
    }

    pub fn job_output_position(&self, job: JobId) -> usize {
        self.job_output_position[&job]
    }

    pub fn machines(&self) -> &[MachineId] {
        &self.machines
    }

    pub fn number_of_machines(&self) -> usize {
        self.machines.len()
    }

    pub fn shop_type(&self) -> ShopType {
        self.shop_type
    }

    pub fn is_out_of_order(&self) -> bool {
        self.out_of_order
    }

    pub fn set_out_of_order(&mut self, out_of_order: bool) {
        self.out_of_order = out_of_order;
    }

    pub fn flow_vector(&self) -> &[OperationId] {
        &self.flow_vector
    }

    pub fn operations_per_job(&self) -> usize {
        self.flow_vector.len()
    }

    /// Operation ids of the flow vector mapped onto `machine`; more than one
    /// entry means the machine is re-entrant.
    pub fn machine_operations(&self, machine: MachineId) -> &[OperationId] {
        &self.operations_per_machine[&machine]
    }

    pub fn machine_max_re_entrancies(&self, machine: MachineId) -> ReEntrancies {
        ReEntrancies(self.operations_per_machine[&machine].len() as u8)
    }

    pub fn contains_op(&self, op: &Operation) -> bool {
        self.machine_mapping.contains_key(op)
    }

    /// Machine processing `op`. Precondition: the operation belongs to the
    /// instance (`contains_op`), or is a maintenance operation of the
    /// re-entrant machine.
    pub fn machine(&self, op: &Operation) -> MachineId {
        if let Some(&m) = self.machine_mapping.get(op) {
            return m;
        }
        self.operation_to_machine[&op.op_id]
    }

    pub fn machine_of_op_id(&self, op_id: OperationId) -> MachineId {
        self.operation_to_machine[&op_id]
    }

    pub fn total_ops(&self) -> usize {
        self.machine_mapping.len()
    }

    pub fn re_entrant_machines(&self) -> &[MachineId] {
        &self.re_entrant_machines
    }

    pub fn is_re_entrant_machine(&self, machine: MachineId) -> bool {
        self.re_entrant_machine_to_id.contains_key(&machine)
    }

    pub fn is_re_entrant_op(&self, op: &Operation) -> bool {
        self.is_re_entrant_machine(self.machine(op))
    }

    pub fn re_entrant_machine_id(&self, id: ReEntrantId) -> MachineId {
        self.re_entrant_machines[id.value() as usize]
    }

    pub fn machine_re_entrant_id(&self, machine: MachineId) -> Option<ReEntrantId> {
        self.re_entrant_machine_to_id.get(&machine).copied()
    }

    pub fn first_re_entrant_id(&self) -> Option<ReEntrantId> {
        self.re_entrant_machines
            .first()
            .and_then(|m| self.machine_re_entrant_id(*m))
    }

    pub fn plexity_table(&self) -> &PlexityTable {
        &self.job_plexity
    }

    /// Number of visits of `job` to the re-entrant machine `re_entrancy`.
    /// Jobs absent from the plexity table default to the machine's full
    /// re-entrancy count.
    pub fn re_entrancies(&self, job: JobId, re_entrancy: ReEntrantId) -> ReEntrancies {
        if let Some(values) = self.job_plexity.get(&job) {
            return values[re_entrancy.value() as usize];
        }
        let machine = self.re_entrant_machine_id(re_entrancy);
        self.machine_max_re_entrancies(machine)
    }

    /// Re-entrancies of the machine processing `op`; 1 when the machine is
    /// not re-entrant.
    pub fn re_entrancies_of(&self, op: &Operation) -> ReEntrancies {
        match self.machine_re_entrant_id(self.machine(op)) {
            Some(id) => self.re_entrancies(op.job, id),
            None => plexity::SIMPLEX,
        }
    }

    /// Operations that `job` performs on `machine`, in order.
    pub fn job_operations_on_machine(&self, job: JobId, machine: MachineId) -> &[Operation] {
        self.job_machine_ops
            .get(&job)
            .and_then(|by_machine| by_machine.get(&machine))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn processing_time(&self, op: &Operation) -> Delay {
        self.processing_times.get(op)
    }

    pub fn processing_times(&self) -> &DefaultOperationsTime {
        &self.processing_times
    }

    pub fn setup_times_indep(&self) -> &TimeBetweenOps {
        &self.setup_times_indep
    }

    pub fn due_dates_indep(&self) -> &TimeBetweenOps {
        &self.due_dates_indep
    }

    pub fn absolute_due_dates(&self) -> &JobsTime {
        &self.absolute_due_dates
    }

    pub fn sheet_size(&self, op: &Operation) -> u32 {
        self.sheet_sizes.get(op)
    }

    pub fn maximum_sheet_size(&self) -> u32 {
        self.maximum_sheet_size
    }

    /// The distinct sheet sizes of jobs at output positions `start_job..`.
    pub fn unique_sheet_sizes(&self, start_job: usize) -> HashSet<u32> {
        self.jobs_output[start_job..]
            .iter()
            .map(|&job| self.sheet_size(&Operation::new(job, 0)))
            .collect()
    }

    pub fn maintenance_policy(&self) -> &MaintenancePolicy {
        &self.maint_policy
    }

    pub fn set_maintenance_policy(&mut self, policy: MaintenancePolicy) {
        self.maint_policy = policy;
    }

    /// Sequence-dependent setup time between two operations: the
    /// same-machine table when applicable, strengthened (max) by the
    /// sequence-independent and dynamically added tables.
    pub fn setup_time(&self, from: &Operation, to: &Operation) -> Delay {
        let mut setup = 0;
        if self.contains_op(from) && self.contains_op(to) && self.machine(from) == self.machine(to)
        {
            setup = self.setup_times.get(from, to);
        }
        if let Some(&indep) = self.setup_times_indep.get(from, to) {
            setup = setup.max(indep);
        }
        if let Some(&extra) = self.extra_setup_times.get(from, to) {
            setup = setup.max(extra);
        }
        setup
    }

    /// Minimum separation `start(dst) - start(src)`: the maintenance
    /// duration for a maintenance source, 0 for pseudo-operations, otherwise
    /// processing plus setup.
    pub fn query(&self, src: &Operation, dst: &Operation) -> Delay {
        if src.is_maintenance() {
            return self.maint_policy.operation_duration(src);
        }
        if src.job.is_pseudo() {
            // Machine sources and the terminus are virtual events without
            // processing or setup of their own.
            return 0;
        }
        self.processing_time(src) + self.setup_time(src, dst)
    }

    /// Due date `start(dst) - start(src) <= result`, the minimum over the
    /// sequence-dependent, sequence-independent and dynamically added
    /// tables; `None` means no deadline.
    pub fn query_due_date(&self, src: &Operation, dst: &Operation) -> Option<Delay> {
        [
            self.due_dates.get(src, dst),
            self.due_dates_indep.get(src, dst),
            self.extra_due_dates.get(src, dst),
        ]
        .into_iter()
        .flatten()
        .copied()
        .min()
    }

    /// Adds a runtime setup time, taking the max with any existing one, and
    /// updates the corresponding graph edge.
    pub fn add_extra_setup_time(&mut self, src: Operation, dst: Operation, value: Delay) {
        self.extra_setup_times.insert_max(src, dst, value);
        let weight = self.query(&src, &dst);
        if let Some(dg) = self.dg.as_mut() {
            let _ = dg.add_edge_ops(&src, &dst, weight);
        }
    }

    /// Adds a runtime due date, taking the min with any existing one, and
    /// updates the graph edge `dst -> src` to the (negated) tightest value.
    pub fn add_extra_due_date(&mut self, src: Operation, dst: Operation, value: Delay) {
        self.extra_due_dates.insert_min(src, dst, value);
        let mut tightest = value;
        if let Some(dg) = self.dg.as_mut() {
            if let (Ok(s), Ok(d)) = (dg.vertex_id(&dst), dg.vertex_id(&src)) {
                if let Ok(weight) = dg.weight(s, d) {
                    tightest = tightest.min(-weight);
                }
                dg.add_edge(s, d, -tightest);
            }
        }
    }

    /// Mints a fresh maintenance operation; ids are unique per instance and
    /// the operation is not added to the jobs table.
    pub fn add_maintenance_operation(&mut self, maint_id: MaintType) -> Operation {
        let op_id = self.next_maintenance_op_id;
        self.next_maintenance_op_id += 1;
        Operation::maintenance(Self::MAINT_ID, op_id, maint_id)
    }

    pub fn is_graph_initialized(&self) -> bool {
        self.dg.is_some()
    }

    /// The constraint graph of the problem. Panics when no graph was built
    /// yet; callers initialize through the builder first.
    pub fn delay_graph(&self) -> &ConstraintGraph {
        self.dg.as_ref().expect("delay graph not initialized")
    }

    pub fn update_delay_graph(&mut self, dg: ConstraintGraph) {
        self.dg = Some(dg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::{DefaultMap, DefaultTwoKeyMap, TwoKeyMap};

    /// Two jobs over machines 0 (load), 1 (re-entrant, ops 1+2), 2 (unload).
    fn small_instance() -> Instance {
        let mut jobs = JobOperations::new();
        let mut mapping = OperationMachineMap::default();
        for j in 0..2u32 {
            let job = JobId(j);
            let ops: Vec<Operation> = (0..4).map(|o| Operation::new(job, o)).collect();
            mapping.insert(ops[0], MachineId(0));
            mapping.insert(ops[1], MachineId(1));
            mapping.insert(ops[2], MachineId(1));
            mapping.insert(ops[3], MachineId(2));
            jobs.insert(job, ops);
        }
        Instance::new(
            "small".to_string(),
            jobs,
            mapping,
            DefaultMap::with_entries([], 3),
            DefaultTwoKeyMap::new(1),
            TwoKeyMap::new(),
            TwoKeyMap::new(),
            TwoKeyMap::new(),
            JobsTime::default(),
            DefaultMap::new(0),
            0,
            ShopType::FixedOrder,
            false,
        )
    }

    #[test]
    fn derived_views() {
        let instance = small_instance();
        assert_eq!(instance.machines(), &[MachineId(0), MachineId(1), MachineId(2)]);
        assert_eq!(instance.re_entrant_machines(), &[MachineId(1)]);
        assert_eq!(instance.flow_vector(), &[0, 1, 2, 3]);
        assert_eq!(instance.machine_operations(MachineId(1)), &[1, 2]);
        assert_eq!(
            instance.re_entrancies(JobId(0), ReEntrantId(0)),
            plexity::DUPLEX
        );
        assert_eq!(
            instance.re_entrancies_of(&Operation::new(JobId(1), 0)),
            plexity::SIMPLEX
        );
    }

    #[test]
    fn query_is_processing_plus_setup() {
        let instance = small_instance();
        let a = Operation::new(JobId(0), 1);
        let b = Operation::new(JobId(1), 1);
        // same machine: default processing 3 + default setup 1
        assert_eq!(instance.query(&a, &b), 4);
        // different machines: setup table does not apply
        let load = Operation::new(JobId(0), 0);
        assert_eq!(instance.query(&load, &a), 3);
    }

    #[test]
    fn extra_setup_takes_max_extra_due_date_takes_min() {
        let mut instance = small_instance();
        let a = Operation::new(JobId(0), 1);
        let b = Operation::new(JobId(1), 1);

        instance.add_extra_setup_time(a, b, 10);
        instance.add_extra_setup_time(a, b, 4);
        assert_eq!(instance.setup_time(&a, &b), 10);

        instance.add_extra_due_date(a, b, 100);
        instance.add_extra_due_date(a, b, 120);
        assert_eq!(instance.query_due_date(&a, &b), Some(100));
    }

    #[test]
    fn maintenance_ids_are_unique() {
        let mut instance = small_instance();
        let m1 = instance.add_maintenance_operation(0);
        let m2 = instance.add_maintenance_operation(0);
        assert_ne!(m1, m2);
        assert!(m1.is_maintenance());
        assert_eq!(m1.job, Instance::MAINT_ID);
    }
}
