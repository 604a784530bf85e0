use std::fmt;

/// Generates a strongly-typed integer index. Mixing two index types is a
/// compile error; the raw value stays reachable through `.value()`.
macro_rules! index_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
        pub struct $name(pub u32);

        impl $name {
            pub const MAX: $name = $name(u32::MAX);

            pub const fn value(self) -> u32 {
                self.0
            }
        }

        impl From<u32> for $name {
            fn from(v: u32) -> Self {
                $name(v)
            }
        }

        impl From<$name> for u32 {
            fn from(v: $name) -> Self {
                v.0
            }
        }

        impl From<$name> for usize {
            fn from(v: $name) -> Self {
                v.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

index_type!(
    /// Index of a job.
    JobId
);
index_type!(
    /// Index of a machine.
    MachineId
);
index_type!(
    /// Index of a module in a production line.
    ModuleId
);
index_type!(
    /// Index of a re-entrant machine (counting only re-entrant machines).
    ReEntrantId
);

/// Index of an operation within a job.
pub type OperationId = u32;

impl JobId {
    /// Reserved id carried by machine-source pseudo-operations.
    pub const SOURCE: JobId = JobId(u32::MAX - 1);

    /// Reserved id carried by the terminal pseudo-operation.
    pub const TERMINAL: JobId = JobId(u32::MAX - 2);

    /// First id free for further reserved uses.
    pub const NEXT_RESERVED: JobId = JobId(u32::MAX - 3);

    /// True for ids that denote graph pseudo-operations rather than jobs.
    pub fn is_pseudo(self) -> bool {
        self.0 >= Self::TERMINAL.0
    }
}

impl std::ops::Add<u32> for JobId {
    type Output = JobId;

    fn add(self, rhs: u32) -> JobId {
        JobId(self.0 + rhs)
    }
}

impl std::ops::Sub<u32> for JobId {
    type Output = JobId;

    fn sub(self, rhs: u32) -> JobId {
        JobId(self.0 - rhs)
    }
}

impl std::ops::Add<u32> for ModuleId {
    type Output = ModuleId;

    fn add(self, rhs: u32) -> ModuleId {
        ModuleId(self.0 + rhs)
    }
}

/// Number of times a job visits a re-entrant machine.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ReEntrancies(pub u8);

impl ReEntrancies {
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for ReEntrancies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod plexity {
    use super::ReEntrancies;

    pub const SIMPLEX: ReEntrancies = ReEntrancies(1);
    pub const DUPLEX: ReEntrancies = ReEntrancies(2);
}
