use std::fmt;

use hashbrown::HashMap;

use super::{Edge, VertexId};
use crate::problem::Operation;
use crate::{Delay, Result, SchedulerError};

/// A vertex of the constraint graph: an operation together with its adjacency
/// maps. Both directions are kept so that forward (ASAP) and backward (ALAP)
/// relaxations are O(deg).
#[derive(Clone, Debug)]
pub struct Vertex {
    pub id: VertexId,
    pub operation: Operation,
    pub(super) outgoing: HashMap<VertexId, Delay>,
    pub(super) incoming: HashMap<VertexId, Delay>,
}

impl Vertex {
    pub(super) fn new(id: VertexId, operation: Operation) -> Self {
        Vertex {
            id,
            operation,
            outgoing: HashMap::new(),
            incoming: HashMap::new(),
        }
    }

    /// Outgoing adjacency: destination vertex to edge weight.
    pub fn outgoing(&self) -> &HashMap<VertexId, Delay> {
        &self.outgoing
    }

    /// Incoming adjacency: source vertex to edge weight.
    pub fn incoming(&self) -> &HashMap<VertexId, Delay> {
        &self.incoming
    }

    pub fn has_outgoing(&self, dst: VertexId) -> bool {
        self.outgoing.contains_key(&dst)
    }

    pub fn weight_to(&self, dst: VertexId) -> Option<Delay> {
        self.outgoing.get(&dst).copied()
    }

    pub fn outgoing_edge(&self, dst: VertexId) -> Result<Edge> {
        self.weight_to(dst)
            .map(|w| Edge::new(self.id, dst, w))
            .ok_or(SchedulerError::EdgeNotFound(self.id, dst))
    }
}

impl PartialEq for Vertex {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Vertex {}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[vertex {}, op={}]", self.id, self.operation)
    }
}
