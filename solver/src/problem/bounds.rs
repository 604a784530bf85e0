use hashbrown::HashMap;

use super::indices::{JobId, ModuleId};
use crate::Delay;

/// A (possibly half-open) interval on the separation between two start
/// times. `None` on a side means unbounded.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct TimeInterval {
    pub min: Option<Delay>,
    pub max: Option<Delay>,
}

impl TimeInterval {
    pub const fn new(min: Option<Delay>, max: Option<Delay>) -> Self {
        TimeInterval { min, max }
    }
}

/// Earliest/latest separations between pairs of jobs at a module boundary.
pub type IntervalSpec = HashMap<JobId, HashMap<JobId, TimeInterval>>;

/// The temporal bounds of one module: intervals at its input boundary and at
/// its output boundary.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModuleBounds {
    pub input: IntervalSpec,
    pub output: IntervalSpec,
}

/// Bounds of every module of a production line.
pub type GlobalBounds = HashMap<ModuleId, ModuleBounds>;
