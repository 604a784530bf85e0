//! Factories for small literal instances, used by the test suites.

use hashbrown::HashMap;

use super::{
    DefaultOperationsTime, DefaultTimeBetweenOps, Instance, JobId, JobOperations, JobsTime,
    MachineId, ModuleId, ModulesTransferConstraints, Operation, OperationMachineMap,
    OperationSizes, ProductionLine, ShopType, TimeBetweenOps, TransferPoint,
};
use crate::collections::DefaultMap;
use crate::Delay;

/// A homogeneous duplex re-entrant flow-shop: a loader (operation 0), a
/// re-entrant machine carrying the first and second pass (operations 1 and
/// 2), and an unloader (operation 3).
///
/// `buffer_min`/`buffer_max` bound the separation between a job's first and
/// second pass: the loop transit is encoded as a sequence-independent setup
/// between the passes and the buffer capacity as a relative due date.
#[allow(clippy::too_many_arguments)]
pub fn re_entrant(
    load: Delay,
    p1: Delay,
    p2: Delay,
    unload: Delay,
    buffer_min: Delay,
    buffer_max: Delay,
    n_jobs: u32,
) -> Instance {
    let mut jobs = JobOperations::new();
    let mut mapping = OperationMachineMap::default();
    let mut processing = DefaultOperationsTime::new(0);
    let mut setup_indep = TimeBetweenOps::new();
    let mut due_dates_indep = TimeBetweenOps::new();

    for j in 0..n_jobs {
        let job = JobId(j);
        let ops: Vec<Operation> = (0..4).map(|o| Operation::new(job, o)).collect();

        mapping.insert(ops[0], MachineId(0));
        mapping.insert(ops[1], MachineId(1));
        mapping.insert(ops[2], MachineId(1));
        mapping.insert(ops[3], MachineId(2));

        processing.insert(ops[0], load);
        processing.insert(ops[1], p1);
        processing.insert(ops[2], p2);
        processing.insert(ops[3], unload);

        // Minimum loop transit: start(op2) >= start(op1) + buffer_min.
        setup_indep.insert(ops[1], ops[2], buffer_min - p1);
        // Buffer capacity: start(op2) - start(op1) <= buffer_max.
        due_dates_indep.insert(ops[2], ops[1], buffer_max);

        jobs.insert(job, ops);
    }

    Instance::new(
        format!("re_entrant_{n_jobs}"),
        jobs,
        mapping,
        processing,
        DefaultTimeBetweenOps::new(0),
        setup_indep,
        TimeBetweenOps::new(),
        due_dates_indep,
        JobsTime::default(),
        OperationSizes::new(0),
        0,
        ShopType::FixedOrder,
        false,
    )
}

/// A production line of identical re-entrant modules chained by transfer
/// points with setup time `transfer_setup` and, when positive, transfer due
/// date `transfer_due`.
pub fn modular_line(
    n_jobs: u32,
    n_modules: u32,
    transfer_setup: Delay,
    transfer_due: Delay,
) -> ProductionLine {
    let mut modules = HashMap::new();
    for m in 0..n_modules {
        modules.insert(ModuleId(m), re_entrant(1, 1, 1, 1, 1, 1, n_jobs));
    }

    let mut transfer = ModulesTransferConstraints::new();
    for m in 0..n_modules.saturating_sub(1) {
        let mut due_date = HashMap::new();
        if transfer_due > 0 {
            for j in 0..n_jobs {
                due_date.insert(JobId(j), transfer_due);
            }
        }
        transfer.insert(
            ModuleId(m),
            ModuleId(m + 1),
            TransferPoint {
                setup_time: DefaultMap::new(transfer_setup),
                due_date,
            },
        );
    }

    ProductionLine::from_flow_shops("modular_test".to_string(), modules, transfer)
        .expect("consistent test line")
}
