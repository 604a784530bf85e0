use std::ops::{Deref, DerefMut};

use super::bounds::{IntervalSpec, TimeInterval};
use super::indices::ModuleId;
use super::instance::Instance;
use super::operation::Operation;

/// One module of a production line: a flow-shop instance plus its position
/// in the line. Derefs to [`Instance`] so the local solvers can treat a
/// module as the problem they schedule.
#[derive(Clone, Debug)]
pub struct Module {
    instance: Instance,
    id: ModuleId,
    previous: Option<ModuleId>,
    next: Option<ModuleId>,
    original_name: String,
}

impl Module {
    pub fn new(
        id: ModuleId,
        previous: Option<ModuleId>,
        next: Option<ModuleId>,
        out_of_order: bool,
        mut instance: Instance,
    ) -> Self {
        let original_name = format!("{}_{}", instance.name(), id);
        instance.set_name(original_name.clone());
        instance.set_out_of_order(out_of_order);
        Module {
            instance,
            id,
            previous,
            next,
            original_name,
        }
    }

    pub fn module_id(&self) -> ModuleId {
        self.id
    }

    pub fn has_prev_module(&self) -> bool {
        self.previous.is_some()
    }

    pub fn has_next_module(&self) -> bool {
        self.next.is_some()
    }

    pub fn prev_module_id(&self) -> Option<ModuleId> {
        self.previous
    }

    pub fn next_module_id(&self) -> Option<ModuleId> {
        self.next
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn instance_mut(&mut self) -> &mut Instance {
        &mut self.instance
    }

    /// Applies separation intervals between the first operations of job
    /// pairs (the input boundary).
    pub fn add_input_bounds(&mut self, intervals: &IntervalSpec) {
        for (&job_fst, job_intervals) in intervals {
            for (&job_snd, interval) in job_intervals {
                let from = self.instance.job_ops(job_fst)[0];
                let to = self.instance.job_ops(job_snd)[0];
                self.add_interval(from, to, interval);
            }
        }
    }

    /// Applies separation intervals between the last operations of job
    /// pairs (the output boundary).
    pub fn add_output_bounds(&mut self, intervals: &IntervalSpec) {
        for (&job_fst, job_intervals) in intervals {
            for (&job_snd, interval) in job_intervals {
                let from = *self.instance.job_ops(job_fst).last().expect("non-empty job");
                let to = *self.instance.job_ops(job_snd).last().expect("non-empty job");
                self.add_interval(from, to, interval);
            }
        }
    }

    /// Applies one separation interval between two operations: the minimum
    /// becomes a setup time (minus the processing time that the setup query
    /// re-adds), the maximum a due date.
    pub fn add_interval(&mut self, from: Operation, to: Operation, interval: &TimeInterval) {
        if let Some(min) = interval.min {
            let processing = self.instance.processing_time(&from);
            self.instance.add_extra_setup_time(from, to, min - processing);
        }
        if let Some(max) = interval.max {
            self.instance.add_extra_due_date(from, to, max);
        }
    }

    /// Tags the problem name with the propagation iteration, so diagnostics
    /// name the round they came from.
    pub fn set_iteration(&mut self, iteration: &str) {
        let name = format!("{}_{}", self.original_name, iteration);
        self.instance.set_name(name);
    }
}

impl Deref for Module {
    type Target = Instance;

    fn deref(&self) -> &Instance {
        &self.instance
    }
}

impl DerefMut for Module {
    fn deref_mut(&mut self) -> &mut Instance {
        &mut self.instance
    }
}
