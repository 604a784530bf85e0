//! Problem model: jobs, operations, machines, re-entrancy, setup and
//! due-date tables, maintenance policy, and the modular production line.

mod bounds;
mod indices;
mod instance;
mod maintenance_policy;
mod module;
mod operation;
mod production_line;
pub mod test_instances;

pub use bounds::{GlobalBounds, IntervalSpec, ModuleBounds, TimeInterval};
pub use indices::{plexity, JobId, MachineId, ModuleId, OperationId, ReEntrancies, ReEntrantId};
pub use instance::{Instance, ShopType};
pub use maintenance_policy::MaintenancePolicy;
pub use module::Module;
pub use operation::{MaintType, Operation};
pub use production_line::{Boundary, ModulesTransferConstraints, ProductionLine, TransferPoint};

use crate::collections::{DefaultMap, DefaultTwoKeyMap, TwoKeyMap};
use crate::Delay;

/// Operations of each job, keyed in job order. The per-job vector order is
/// the intra-job precedence.
pub type JobOperations = std::collections::BTreeMap<JobId, Vec<Operation>>;

/// Maps each operation to the machine where it is processed.
pub type OperationMachineMap = hashbrown::HashMap<Operation, MachineId>;

/// Per-operation time table with a default.
pub type DefaultOperationsTime = DefaultMap<Operation, Delay>;

/// Per-operation size class table with a default.
pub type OperationSizes = DefaultMap<Operation, u32>;

/// Per-job time table.
pub type JobsTime = hashbrown::HashMap<JobId, Delay>;

/// Pairwise time table with a default (sequence-dependent setup times).
pub type DefaultTimeBetweenOps = DefaultTwoKeyMap<Operation, Delay>;

/// Pairwise time table without a default (independent setups, due dates).
pub type TimeBetweenOps = TwoKeyMap<Operation, Delay>;

/// Number of re-entrancies of each job on each re-entrant machine.
pub type PlexityTable = hashbrown::HashMap<JobId, Vec<ReEntrancies>>;
