use hashbrown::HashMap;

use super::operation::{MaintType, Operation};
use crate::Delay;

/// Policy describing when idle time on the re-entrant machine must be
/// converted into a maintenance action: per-type durations and `[min, max)`
/// idle-time windows.
#[derive(Clone, Debug, Default)]
pub struct MaintenancePolicy {
    number_of_types: u32,
    minimum_idle: Delay,
    maint_duration: HashMap<MaintType, Delay>,
    default_maint_duration: Delay,
    thresholds: HashMap<MaintType, (Delay, Delay)>,
    default_threshold: Delay,
}

impl MaintenancePolicy {
    pub fn new(
        number_of_types: u32,
        minimum_idle: Delay,
        maint_duration: HashMap<MaintType, Delay>,
        default_maint_duration: Delay,
        thresholds: HashMap<MaintType, (Delay, Delay)>,
        default_threshold: Delay,
    ) -> Self {
        MaintenancePolicy {
            number_of_types,
            minimum_idle,
            maint_duration,
            default_maint_duration,
            thresholds,
            default_threshold,
        }
    }

    pub fn number_of_types(&self) -> u32 {
        self.number_of_types
    }

    pub fn minimum_idle(&self) -> Delay {
        self.minimum_idle
    }

    pub fn maint_duration(&self, id: MaintType) -> Delay {
        self.maint_duration
            .get(&id)
            .copied()
            .unwrap_or(self.default_maint_duration)
    }

    /// Duration of a maintenance operation. Panics when called on a regular
    /// operation; callers check `is_maintenance` first.
    pub fn operation_duration(&self, op: &Operation) -> Delay {
        let id = op.maint_id.expect("operation is not a maintenance action");
        self.maint_duration(id)
    }

    /// The `[min, max)` idle window that triggers maintenance type `id`.
    pub fn thresholds(&self, id: MaintType) -> (Delay, Delay) {
        self.thresholds
            .get(&id)
            .copied()
            .unwrap_or((self.default_threshold, Delay::MAX))
    }
}
