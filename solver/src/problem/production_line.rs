use hashbrown::HashMap;

use super::bounds::{IntervalSpec, TimeInterval};
use super::indices::{JobId, ModuleId};
use super::instance::Instance;
use super::module::Module;
use crate::collections::{DefaultMap, TwoKeyMap};
use crate::{Delay, Result, SchedulerError};

/// Transfer constraints between two adjacent modules.
///
/// The setup time of a job is the minimum time between the start of its last
/// operation in the previous module and the start of its first operation in
/// the next one; the due date is the corresponding maximum. Both are
/// normalized against the processing time of the last operation when the
/// line is assembled (input files count from the end of that operation).
#[derive(Clone, Debug)]
pub struct TransferPoint {
    pub setup_time: DefaultMap<JobId, Delay>,
    pub due_date: HashMap<JobId, Delay>,
}

pub type ModulesTransferConstraints = TwoKeyMap<ModuleId, TransferPoint>;

/// Transfer window of a pair of jobs crossing one module boundary, used to
/// translate separation intervals from one side of the boundary to the
/// other.
#[derive(Copy, Clone, Debug)]
pub struct Boundary {
    /// Transfer window lower bound of the earlier job.
    pub first_setup: Delay,
    /// Transfer window lower bound of the later job.
    pub second_setup: Delay,
    /// Transfer window upper bound of the earlier job, when it has one.
    pub first_due: Option<Delay>,
    /// Transfer window upper bound of the later job, when it has one.
    pub second_due: Option<Delay>,
}

impl Boundary {
    /// Translates an output-side separation interval into the input side of
    /// the next module. A missing transfer due date leaves the affected
    /// bound unbounded.
    pub fn translate_to_destination(&self, interval: &TimeInterval) -> TimeInterval {
        let min = match (interval.min, self.first_due) {
            (Some(lo), Some(due1)) => Some(lo + self.second_setup - due1),
            _ => None,
        };
        let max = match (interval.max, self.second_due) {
            (Some(hi), Some(due2)) => Some(hi + due2 - self.first_setup),
            _ => None,
        };
        TimeInterval::new(min, max)
    }

    /// Translates an input-side separation interval back into the output
    /// side of the previous module.
    pub fn translate_to_source(&self, interval: &TimeInterval) -> TimeInterval {
        let min = match (interval.min, self.second_due) {
            (Some(lo), Some(due2)) => Some(lo + self.first_setup - due2),
            _ => None,
        };
        let max = match (interval.max, self.first_due) {
            (Some(hi), Some(due1)) => Some(hi + due1 - self.second_setup),
            _ => None,
        };
        TimeInterval::new(min, max)
    }
}

type BoundariesTable = HashMap<ModuleId, HashMap<JobId, HashMap<JobId, Boundary>>>;

/// A totally ordered sequence of modules with transfer constraints between
/// adjacent ones.
#[derive(Clone, Debug)]
pub struct ProductionLine {
    name: String,
    modules: HashMap<ModuleId, Module>,
    module_ids: Vec<ModuleId>,
    transfer_constraints: ModulesTransferConstraints,
    boundaries: BoundariesTable,
}

impl ProductionLine {
    /// Assembles a production line out of per-module flow-shop instances and
    /// the transfer constraints between consecutive module ids.
    pub fn from_flow_shops(
        name: String,
        mut instances: HashMap<ModuleId, Instance>,
        transfer_constraints: ModulesTransferConstraints,
    ) -> Result<Self> {
        let mut module_ids: Vec<ModuleId> = instances.keys().copied().collect();
        module_ids.sort_unstable();

        for pair in module_ids.windows(2) {
            if pair[1] != pair[0] + 1 {
                return Err(SchedulerError::Parse(
                    "module ids are not consecutive".to_string(),
                ));
            }
            if transfer_constraints.get(&pair[0], &pair[1]).is_none() {
                return Err(SchedulerError::Parse(format!(
                    "no transfer constraints from module {} to module {}",
                    pair[0], pair[1]
                )));
            }
        }

        let mut modules = HashMap::new();
        for (i, &id) in module_ids.iter().enumerate() {
            let previous = (i > 0).then(|| module_ids[i - 1]);
            let next = (i + 1 < module_ids.len()).then(|| module_ids[i + 1]);
            let instance = instances.remove(&id).expect("instance for module id");
            // Only the first module receives jobs in arbitrary order.
            modules.insert(id, Module::new(id, previous, next, i == 0, instance));
        }

        // Pre-compute the per-job-pair boundary windows of every transfer
        // point, normalizing setup/due against the processing time of the
        // job's last operation in the source module.
        let mut boundaries: BoundariesTable = HashMap::new();
        for pair in module_ids.windows(2) {
            let module = &modules[&pair[0]];
            let transfer = transfer_constraints
                .get(&pair[0], &pair[1])
                .expect("checked above");
            let bound_module = boundaries.entry(pair[0]).or_default();

            let jobs_output = module.jobs_output().to_vec();
            for (i, &job_from) in jobs_output.iter().enumerate() {
                let op_from = *module.job_ops(job_from).last().expect("non-empty job");
                let proc_from = module.processing_time(&op_from);
                let from_setup = transfer.setup_time.get(&job_from) + proc_from;
                let from_due = transfer.due_date.get(&job_from).copied();

                if let Some(due) = from_due {
                    if due < from_setup {
                        return Err(SchedulerError::Parse(format!(
                            "transfer due date {due} is smaller than setup time {from_setup} for job {job_from}"
                        )));
                    }
                }

                let bound_job = bound_module.entry(job_from).or_default();
                for &job_to in &jobs_output[i + 1..] {
                    let op_to = *module.job_ops(job_to).last().expect("non-empty job");
                    let proc_to = module.processing_time(&op_to);
                    let to_setup = transfer.setup_time.get(&job_to) + proc_to;
                    let to_due = transfer.due_date.get(&job_to).copied();

                    bound_job.insert(
                        job_to,
                        Boundary {
                            first_setup: from_setup,
                            second_setup: to_setup,
                            first_due: from_due,
                            second_due: to_due,
                        },
                    );
                }
            }
        }

        Ok(ProductionLine {
            name,
            modules,
            module_ids,
            transfer_constraints,
            boundaries,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn modules(&self) -> &HashMap<ModuleId, Module> {
        &self.modules
    }

    pub fn modules_mut(&mut self) -> &mut HashMap<ModuleId, Module> {
        &mut self.modules
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[&id]
    }

    pub fn module_mut(&mut self, id: ModuleId) -> &mut Module {
        self.modules.get_mut(&id).expect("module id")
    }

    pub fn module_ids(&self) -> &[ModuleId] {
        &self.module_ids
    }

    pub fn number_of_modules(&self) -> usize {
        self.module_ids.len()
    }

    pub fn number_of_jobs(&self) -> usize {
        self.modules[&self.module_ids[0]].number_of_jobs()
    }

    pub fn number_of_machines(&self) -> usize {
        self.modules.values().map(|m| m.number_of_machines()).sum()
    }

    pub fn first_module_id(&self) -> ModuleId {
        self.module_ids[0]
    }

    pub fn last_module_id(&self) -> ModuleId {
        *self.module_ids.last().expect("non-empty line")
    }

    pub fn has_next_module(&self, id: ModuleId) -> bool {
        self.modules[&id].next_module_id().is_some()
    }

    pub fn has_prev_module(&self, id: ModuleId) -> bool {
        self.modules[&id].prev_module_id().is_some()
    }

    pub fn next_module_id(&self, id: ModuleId) -> ModuleId {
        self.modules[&id].next_module_id().expect("next module")
    }

    pub fn prev_module_id(&self, id: ModuleId) -> ModuleId {
        self.modules[&id].prev_module_id().expect("previous module")
    }

    /// Transfer setup of `job` when leaving module `from`.
    pub fn transfer_setup(&self, from: ModuleId, job: JobId) -> Delay {
        let to = from + 1;
        self.transfer_constraints
            .get(&from, &to)
            .map(|t| t.setup_time.get(&job))
            .unwrap_or(0)
    }

    pub fn transfer_due_date(&self, from: ModuleId, job: JobId) -> Option<Delay> {
        let to = from + 1;
        self.transfer_constraints
            .get(&from, &to)
            .and_then(|t| t.due_date.get(&job).copied())
    }

    /// Minimum time between the start of the job's last operation in `from`
    /// and the start of its first operation in the next module.
    pub fn query(&self, from: ModuleId, job: JobId) -> Delay {
        let module = &self.modules[&from];
        let last = module.job_ops(job).last().expect("non-empty job");
        module.processing_time(last) + self.transfer_setup(from, job)
    }

    /// Translates output intervals of the module before `module` into input
    /// intervals of `module`.
    pub fn to_input_bounds(&self, module: ModuleId, intervals: &IntervalSpec) -> IntervalSpec {
        let boundary_module = self.prev_module_id(module);
        self.translate_intervals(boundary_module, intervals, Boundary::translate_to_destination)
    }

    /// Translates input intervals of the module after `module` into output
    /// intervals of `module`.
    pub fn to_output_bounds(&self, module: ModuleId, intervals: &IntervalSpec) -> IntervalSpec {
        self.translate_intervals(module, intervals, Boundary::translate_to_source)
    }

    fn translate_intervals(
        &self,
        boundary_module: ModuleId,
        intervals: &IntervalSpec,
        translate: impl Fn(&Boundary, &TimeInterval) -> TimeInterval,
    ) -> IntervalSpec {
        let mut result = IntervalSpec::default();
        let Some(bound_module) = self.boundaries.get(&boundary_module) else {
            return result;
        };

        for (&job_fst, job_intervals) in intervals {
            let Some(bound_job) = bound_module.get(&job_fst) else {
                continue;
            };
            for (&job_snd, interval) in job_intervals {
                if let Some(boundary) = bound_job.get(&job_snd) {
                    result
                        .entry(job_fst)
                        .or_default()
                        .insert(job_snd, translate(boundary, interval));
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_translation_roundtrip() {
        let boundary = Boundary {
            first_setup: 5,
            second_setup: 5,
            first_due: Some(8),
            second_due: Some(8),
        };
        let interval = TimeInterval::new(Some(10), Some(20));
        let there = boundary.translate_to_destination(&interval);
        // lo + setup2 - due1 = 10 + 5 - 8, hi + due2 - setup1 = 20 + 8 - 5
        assert_eq!(there, TimeInterval::new(Some(7), Some(23)));
        let back = boundary.translate_to_source(&there);
        // translation widens: the round trip contains the original interval
        assert!(back.min.unwrap() <= interval.min.unwrap());
        assert!(back.max.unwrap() >= interval.max.unwrap());
    }

    #[test]
    fn missing_due_date_unbounds_translation() {
        let boundary = Boundary {
            first_setup: 5,
            second_setup: 5,
            first_due: None,
            second_due: Some(8),
        };
        let interval = TimeInterval::new(Some(10), Some(20));
        let there = boundary.translate_to_destination(&interval);
        assert_eq!(there.min, None);
        assert_eq!(there.max, Some(23));
    }
}
