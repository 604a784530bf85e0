use crate::problem::Operation;

/// A candidate insertion (or removal) point: place `cur` between `prev` and
/// `next` at `position` in a machine sequence.
#[derive(Copy, Clone, Debug)]
pub struct SchedulingOption {
    pub prev: Operation,
    pub cur: Operation,
    pub next: Operation,
    pub position: usize,
    pub is_maint: bool,
}

impl SchedulingOption {
    pub fn new(prev: Operation, cur: Operation, next: Operation, position: usize) -> Self {
        SchedulingOption {
            prev,
            cur,
            next,
            position,
            is_maint: false,
        }
    }

    pub fn maintenance(prev: Operation, cur: Operation, next: Operation, position: usize) -> Self {
        SchedulingOption {
            prev,
            cur,
            next,
            position,
            is_maint: true,
        }
    }
}
