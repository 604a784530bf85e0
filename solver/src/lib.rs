//! Scheduling engine for re-entrant flow-shops with sequence-dependent setup
//! times, relative due dates, maintenance insertion and modular production
//! lines.
//!
//! The engine is built around a constraint graph over operations whose edge
//! weights encode minimum start-time separations (`start(dst) >= start(src) +
//! weight`, negative weights encoding due dates), a longest-path kernel that
//! computes earliest start times and decides feasibility, and a family of
//! solvers that insert the higher passes of a re-entrant machine into a
//! partial sequence.

pub mod algorithms;
pub mod cg;
pub mod cli;
pub mod collections;
pub mod io;
pub mod problem;
pub mod scheduler;
pub mod solvers;
pub mod utils;

/// Constraints are defined in terms of 'delay': fixed-precision amounts of
/// time represented by 64-bit integers.
pub type Delay = i64;

/// Error raised by the scheduling engine.
///
/// Solvers convert positive cycles into local retries where they can; the
/// variants below are what surfaces when no retry is possible or when an
/// invariant of the engine is broken.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("vertex id {0} out of range; 0 <= {0} < {1}")]
    VertexOutOfRange(cg::VertexId, usize),

    #[error("unable to find a vertex for operation {0} in the graph")]
    VertexNotFound(problem::Operation),

    #[error("unable to retrieve the edge from {0} to {1}")]
    EdgeNotFound(cg::VertexId, cg::VertexId),

    #[error("operation {0} is already present in the graph")]
    DuplicateVertex(problem::Operation),

    #[error("infeasible: {0}")]
    Infeasible(String),

    #[error("no feasible option has been detected for operation {0}")]
    NoFeasibleOption(problem::Operation),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    Solver(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
