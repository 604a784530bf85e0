//! DOT export of constraint graphs, used to diagnose infeasible inputs and
//! dead-end insertions.

use std::fmt::Write as _;
use std::path::Path;

use crate::cg::{ConstraintGraph, Edge};
use crate::Result;

/// Renders the graph in DOT syntax. Edges listed in `highlight` (typically a
/// positive cycle) are drawn red.
pub fn to_dot(dg: &ConstraintGraph, highlight: &[Edge]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph constraints {{");
    let _ = writeln!(out, "  rankdir=LR;");

    for v in dg.vertices() {
        let shape = if dg.is_source(v.id) || dg.is_terminus(v.id) {
            "box"
        } else if v.operation.is_maintenance() {
            "diamond"
        } else {
            "ellipse"
        };
        let _ = writeln!(
            out,
            "  v{} [label=\"{}\" shape={}];",
            v.id, v.operation, shape
        );
    }

    for v in dg.vertices() {
        for (&dst, &weight) in v.outgoing() {
            let marked = highlight
                .iter()
                .any(|e| e.src == v.id && e.dst == dst);
            let attrs = if marked {
                format!("label=\"{weight}\" color=red penwidth=2")
            } else {
                format!("label=\"{weight}\"")
            };
            let _ = writeln!(out, "  v{} -> v{} [{}];", v.id, dst, attrs);
        }
    }

    let _ = writeln!(out, "}}");
    out
}

pub fn save_as_dot(dg: &ConstraintGraph, path: impl AsRef<Path>, highlight: &[Edge]) -> Result<()> {
    std::fs::write(path.as_ref(), to_dot(dg, highlight))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{JobId, MachineId, Operation};

    #[test]
    fn renders_vertices_and_edges() {
        let mut g = ConstraintGraph::new();
        let s = g.add_source(MachineId(0)).unwrap();
        let a = g.add_vertex(Operation::new(JobId(0), 0)).unwrap();
        g.add_edge(s, a, 3);
        let dot = to_dot(&g, &[Edge::new(s, a, 3)]);
        assert!(dot.contains("digraph"));
        assert!(dot.contains("color=red"));
    }
}
