use std::ops::Index;

use hashbrown::HashMap;

use super::{Edge, Edges, Vertex, VertexId};
use crate::problem::{JobId, MachineId, Operation};
use crate::{Delay, Result, SchedulerError};

/// Adjacency-map digraph over operations.
///
/// The graph is sparse and solvers add and remove edges constantly, so each
/// vertex keeps a map from neighbour id to weight on both sides. Vertices
/// cannot be removed and there are no parallel edges: re-adding an edge
/// overwrites its weight.
#[derive(Clone, Debug, Default)]
pub struct ConstraintGraph {
    vertices: Vec<Vertex>,
    op_to_vertex: HashMap<Operation, VertexId>,
    job_vertices: HashMap<JobId, Vec<VertexId>>,
    sources: Vec<VertexId>,
    maint: Vec<VertexId>,
    terminus: Option<VertexId>,
}

impl ConstraintGraph {
    /// Job id reserved for machine source pseudo-operations.
    pub const SOURCE_ID: JobId = JobId::SOURCE;

    /// Job id reserved for the terminal pseudo-operation.
    pub const TERMINAL_ID: JobId = JobId::TERMINAL;

    /// First job id free for other reserved uses.
    pub const NEXT_ID: JobId = JobId::NEXT_RESERVED;

    /// The terminal pseudo-operation.
    pub const OP_TERMINAL: Operation = Operation::new(Self::TERMINAL_ID, 0);

    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a vertex for `operation` and registers it in the per-job index.
    pub fn add_vertex(&mut self, operation: Operation) -> Result<VertexId> {
        if self.op_to_vertex.contains_key(&operation) {
            return Err(SchedulerError::DuplicateVertex(operation));
        }
        let id = self.vertices.len();
        self.vertices.push(Vertex::new(id, operation));
        self.op_to_vertex.insert(operation, id);
        self.job_vertices.entry(operation.job).or_default().push(id);
        if operation.is_maintenance() {
            self.maint.push(id);
        }
        Ok(id)
    }

    /// Adds the source vertex for a machine. Sources are pinned at time 0 by
    /// the longest-path kernel.
    pub fn add_source(&mut self, machine: MachineId) -> Result<VertexId> {
        let id = self.add_vertex(Operation::new(Self::SOURCE_ID, machine.value()))?;
        self.sources.push(id);
        Ok(id)
    }

    /// Adds the unique terminal vertex.
    pub fn add_terminus(&mut self) -> Result<VertexId> {
        let id = self.add_vertex(Self::OP_TERMINAL)?;
        self.terminus = Some(id);
        Ok(id)
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn vertex(&self, id: VertexId) -> Result<&Vertex> {
        self.vertices
            .get(id)
            .ok_or(SchedulerError::VertexOutOfRange(id, self.vertices.len()))
    }

    pub fn vertex_id(&self, operation: &Operation) -> Result<VertexId> {
        self.op_to_vertex
            .get(operation)
            .copied()
            .ok_or(SchedulerError::VertexNotFound(*operation))
    }

    pub fn has_vertex(&self, operation: &Operation) -> bool {
        self.op_to_vertex.contains_key(operation)
    }

    pub fn operation(&self, id: VertexId) -> Operation {
        self.vertices[id].operation
    }

    /// Inserts or overwrites the edge `src -> dst`, keeping both adjacency
    /// sides consistent.
    pub fn add_edge(&mut self, src: VertexId, dst: VertexId, weight: Delay) -> Edge {
        self.vertices[src].outgoing.insert(dst, weight);
        self.vertices[dst].incoming.insert(src, weight);
        Edge::new(src, dst, weight)
    }

    /// [`add_edge`](Self::add_edge) addressed by operations.
    pub fn add_edge_ops(&mut self, src: &Operation, dst: &Operation, weight: Delay) -> Result<Edge> {
        let s = self.vertex_id(src)?;
        let d = self.vertex_id(dst)?;
        Ok(self.add_edge(s, d, weight))
    }

    /// Adds the edges that are not present yet and returns exactly those, so
    /// that a later [`remove_edges`](Self::remove_edges) restores the graph.
    pub fn add_edges(&mut self, edges: &[Edge]) -> Edges {
        let mut added = Edges::new();
        for e in edges {
            if !self.has_edge(e.src, e.dst) {
                self.add_edge(e.src, e.dst, e.weight);
                added.push(*e);
            }
        }
        added
    }

    /// Removes the edge if it is there; absent edges are ignored.
    pub fn remove_edge(&mut self, src: VertexId, dst: VertexId) {
        self.vertices[src].outgoing.remove(&dst);
        self.vertices[dst].incoming.remove(&src);
    }

    pub fn remove_edges(&mut self, edges: &[Edge]) {
        for e in edges {
            self.remove_edge(e.src, e.dst);
        }
    }

    pub fn has_edge(&self, src: VertexId, dst: VertexId) -> bool {
        self.vertices[src].outgoing.contains_key(&dst)
    }

    pub fn weight(&self, src: VertexId, dst: VertexId) -> Result<Delay> {
        self.vertices[src]
            .weight_to(dst)
            .ok_or(SchedulerError::EdgeNotFound(src, dst))
    }

    /// Vertex ids of the operations of `job`, in insertion order.
    pub fn vertices_of_job(&self, job: JobId) -> &[VertexId] {
        self.job_vertices.get(&job).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Vertex ids of all jobs in the inclusive range `[start, end]`.
    pub fn vertices_in_range(&self, start: JobId, end: JobId) -> Vec<VertexId> {
        let mut result = Vec::new();
        let mut job = start;
        while job <= end {
            result.extend_from_slice(self.vertices_of_job(job));
            job = job + 1;
        }
        result
    }

    pub fn sources(&self) -> &[VertexId] {
        &self.sources
    }

    pub fn maint_vertices(&self) -> &[VertexId] {
        &self.maint
    }

    pub fn source(&self, machine: MachineId) -> Result<VertexId> {
        self.vertex_id(&Operation::new(Self::SOURCE_ID, machine.value()))
    }

    pub fn terminus(&self) -> Option<VertexId> {
        self.terminus
    }

    pub fn is_source(&self, id: VertexId) -> bool {
        self.vertices[id].operation.job == Self::SOURCE_ID
    }

    pub fn is_terminus(&self, id: VertexId) -> bool {
        self.vertices[id].operation.job == Self::TERMINAL_ID
    }

    /// Machine behind a source vertex.
    pub fn source_machine(&self, id: VertexId) -> Result<MachineId> {
        let v = self.vertex(id)?;
        if v.operation.job != Self::SOURCE_ID {
            return Err(SchedulerError::Solver(format!(
                "vertex {id} is not a source vertex"
            )));
        }
        Ok(MachineId(v.operation.op_id))
    }

    /// True for vertices that represent real job operations (not sources,
    /// terminals or maintenance).
    pub fn is_visible(&self, id: VertexId) -> bool {
        let op = &self.vertices[id].operation;
        op.job != Self::SOURCE_ID && op.job != Self::TERMINAL_ID && !op.is_maintenance()
    }
}

impl Index<VertexId> for ConstraintGraph {
    type Output = Vertex;

    fn index(&self, id: VertexId) -> &Vertex {
        &self.vertices[id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(job: u32, op_id: u32) -> Operation {
        Operation::new(JobId(job), op_id)
    }

    #[test]
    fn add_and_remove_edges_restores_graph() {
        let mut g = ConstraintGraph::new();
        let a = g.add_vertex(op(0, 0)).unwrap();
        let b = g.add_vertex(op(0, 1)).unwrap();
        let c = g.add_vertex(op(1, 0)).unwrap();
        g.add_edge(a, b, 5);

        let added = g.add_edges(&[Edge::new(a, b, 9), Edge::new(b, c, 2)]);
        // the a->b edge already existed so only b->c counts as added
        assert_eq!(added, vec![Edge::new(b, c, 2)]);
        assert_eq!(g.weight(a, b).unwrap(), 5);

        g.remove_edges(&added);
        assert!(!g.has_edge(b, c));
        assert!(g.has_edge(a, b));
    }

    #[test]
    fn duplicate_vertex_is_rejected() {
        let mut g = ConstraintGraph::new();
        g.add_vertex(op(0, 0)).unwrap();
        assert!(g.add_vertex(op(0, 0)).is_err());
    }

    #[test]
    fn re_adding_edge_overwrites_weight() {
        let mut g = ConstraintGraph::new();
        let a = g.add_vertex(op(0, 0)).unwrap();
        let b = g.add_vertex(op(0, 1)).unwrap();
        g.add_edge(a, b, 5);
        g.add_edge(a, b, 7);
        assert_eq!(g.weight(a, b).unwrap(), 7);
        assert_eq!(g[b].incoming().get(&a), Some(&7));
    }

    #[test]
    fn job_ranges() {
        let mut g = ConstraintGraph::new();
        g.add_source(MachineId(0)).unwrap();
        for j in 0..3 {
            g.add_vertex(op(j, 0)).unwrap();
            g.add_vertex(op(j, 1)).unwrap();
        }
        assert_eq!(g.vertices_of_job(JobId(1)).len(), 2);
        assert_eq!(g.vertices_in_range(JobId(0), JobId(1)).len(), 4);
        assert_eq!(g.sources().len(), 1);
    }
}
