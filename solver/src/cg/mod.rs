//! Constraint graph over operations.
//!
//! Vertices are operations (plus one source per machine and an optional
//! terminus); a directed edge `u -> v` with weight `w` asserts
//! `start(v) >= start(u) + w`. Due dates are encoded as negative-weight
//! edges in the opposite direction.

mod builder;
mod edge;
mod graph;
mod vertex;

pub use builder::Builder;
pub use edge::{Edge, Edges};
pub use graph::ConstraintGraph;
pub use vertex::Vertex;

/// Dense index into the vertex vector of a [`ConstraintGraph`]. Ids are never
/// reused; vertices cannot be removed.
pub type VertexId = usize;
