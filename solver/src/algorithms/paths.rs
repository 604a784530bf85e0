//! Longest-path kernel of the scheduler.
//!
//! Computes earliest (ASAP) and latest (ALAP) start times over the constraint
//! graph with the Bellman-Ford-Moore algorithm and decides feasibility: a
//! positive cycle means the constraints cannot be satisfied. The kernel never
//! mutates the graph (except for the documented add-compute-remove wrappers);
//! it only mutates the caller-owned path-times buffer so that buffers can be
//! reused across calls.

use std::collections::BinaryHeap;

use crate::cg::{ConstraintGraph, Edge, Edges, VertexId};
use crate::problem::JobId;
use crate::Delay;

/// Start times indexed by [`VertexId`].
pub type PathTimes = Vec<Delay>;

/// Starting value of the ASAP computation, equivalent to minus infinity.
/// Marks vertices not (yet) reached from a source.
pub const ASAP_START_VALUE: Delay = Delay::MIN;

/// Starting value of the ALAP computation, equivalent to plus infinity.
pub const ALAP_START_VALUE: Delay = Delay::MAX;

/// Outcome of a longest-path run. The computation is infeasible iff
/// `positive_cycle` is non-empty; the edges are a witness.
#[derive(Clone, Debug, Default)]
pub struct LongestPathResult {
    pub positive_cycle: Edges,
}

impl LongestPathResult {
    pub fn feasible() -> Self {
        Self::default()
    }

    pub fn has_positive_cycle(&self) -> bool {
        !self.positive_cycle.is_empty()
    }
}

/// [`LongestPathResult`] together with the computed times.
#[derive(Clone, Debug)]
pub struct LongestPathResultWithTimes {
    pub positive_cycle: Edges,
    pub times: PathTimes,
}

impl LongestPathResultWithTimes {
    pub fn has_positive_cycle(&self) -> bool {
        !self.positive_cycle.is_empty()
    }
}

/// Initializes ASAP times: 0 for the graph sources (when `graph_sources`)
/// and for the explicitly given `sources`, minus infinity everywhere else.
pub fn initialize_asapst(
    dg: &ConstraintGraph,
    sources: &[VertexId],
    graph_sources: bool,
) -> PathTimes {
    let mut times = vec![ASAP_START_VALUE; dg.num_vertices()];
    initialize_asapst_into(dg, &mut times, sources, graph_sources);
    times
}

/// In-place variant of [`initialize_asapst`] that reuses the caller's buffer.
pub fn initialize_asapst_into(
    dg: &ConstraintGraph,
    times: &mut PathTimes,
    sources: &[VertexId],
    graph_sources: bool,
) {
    times.resize(dg.num_vertices(), ASAP_START_VALUE);
    for (i, t) in times.iter_mut().enumerate() {
        *t = if graph_sources && dg.is_source(i) {
            0
        } else {
            ASAP_START_VALUE
        };
    }
    for &s in sources {
        times[s] = 0;
    }
}

/// Initializes ALAP times: 0 for the graph sources, plus infinity elsewhere.
pub fn initialize_alapst(dg: &ConstraintGraph, graph_sources: bool) -> PathTimes {
    (0..dg.num_vertices())
        .map(|i| {
            if graph_sources && dg.is_source(i) {
                0
            } else {
                ALAP_START_VALUE
            }
        })
        .collect()
}

/// Full Bellman-Ford-Moore over the whole graph. `times` must have been
/// initialized with [`initialize_asapst`]. O(V*E).
pub fn compute_asapst(dg: &ConstraintGraph, times: &mut PathTimes) -> LongestPathResult {
    for _ in 1..dg.num_vertices().max(1) {
        if !relax_all_asapst(dg, times) {
            return LongestPathResult::feasible();
        }
    }

    // The nth pass must not relax anything anymore; an edge that still
    // relaxes witnesses a positive cycle.
    let mut infeasible = Edges::new();
    for v in dg.vertices() {
        for (&dst, &weight) in v.outgoing() {
            if times[v.id] != ASAP_START_VALUE && times[v.id] + weight > times[dst] {
                infeasible.push(Edge::new(v.id, dst, weight));
                break;
            }
        }
    }
    LongestPathResult {
        positive_cycle: infeasible,
    }
}

/// Adds `extra` edges, computes ASAP times, and removes the edges it actually
/// added again, leaving the graph as found.
pub fn compute_asapst_with_edges(
    dg: &mut ConstraintGraph,
    times: &mut PathTimes,
    extra: &[Edge],
) -> LongestPathResult {
    let added = dg.add_edges(extra);
    let result = compute_asapst(dg, times);
    dg.remove_edges(&added);
    result
}

/// Computes ASAP times from a fresh initialization and returns them together
/// with the feasibility result.
pub fn compute_asapst_fresh(dg: &ConstraintGraph) -> LongestPathResultWithTimes {
    let mut times = initialize_asapst(dg, &[], true);
    let result = compute_asapst(dg, &mut times);
    LongestPathResultWithTimes {
        positive_cycle: result.positive_cycle,
        times,
    }
}

/// Like [`compute_asapst_fresh`] but with `extra` edges temporarily added.
pub fn compute_asapst_fresh_with_edges(
    dg: &mut ConstraintGraph,
    extra: &[Edge],
) -> LongestPathResultWithTimes {
    let mut times = initialize_asapst(dg, &[], true);
    let result = compute_asapst_with_edges(dg, &mut times, extra);
    LongestPathResultWithTimes {
        positive_cycle: result.positive_cycle,
        times,
    }
}

/// Windowed Bellman-Ford-Moore: only `sources`, the graph sources and
/// `window` participate in relaxation. Relaxing a vertex that belongs to a
/// job before the window's minimum job would re-time an already-committed
/// operation and is reported as infeasible.
pub fn compute_asapst_windowed(
    dg: &ConstraintGraph,
    times: &mut PathTimes,
    sources: &[VertexId],
    window: &[VertexId],
) -> LongestPathResult {
    let first_job = window
        .iter()
        .map(|&v| dg[v].operation.job)
        .min()
        .unwrap_or(JobId::MAX);

    let mut active: Vec<VertexId> = Vec::with_capacity(sources.len() + window.len() + dg.sources().len());
    active.extend_from_slice(sources);
    active.extend_from_slice(dg.sources());
    active.extend_from_slice(window);

    let mut infeasible = Edges::new();
    for _ in 1..active.len().max(1) {
        let (relaxed, offending) = relax_vertices_asapst(dg, &active, first_job, times);
        if let Some(e) = offending {
            infeasible.push(e);
            break;
        }
        if !relaxed {
            break;
        }
    }

    for &vid in &active {
        let v = &dg[vid];
        for (&dst, &weight) in v.outgoing() {
            if times[vid] != ASAP_START_VALUE && times[vid] + weight > times[dst] {
                infeasible.push(Edge::new(vid, dst, weight));
                break;
            }
        }
    }

    LongestPathResult {
        positive_cycle: infeasible,
    }
}

/// One relaxation pass over `active`. Returns whether any edge relaxed and,
/// if a vertex of a job before `first_job` would have been re-timed, the
/// offending edge.
fn relax_vertices_asapst(
    dg: &ConstraintGraph,
    active: &[VertexId],
    first_job: JobId,
    times: &mut PathTimes,
) -> (bool, Option<Edge>) {
    let mut relaxed = false;
    for &vid in active {
        if times[vid] == ASAP_START_VALUE {
            continue;
        }
        for (&dst, &weight) in dg[vid].outgoing() {
            let value = times[vid] + weight;
            if value > times[dst] {
                if dg[dst].operation.job < first_job {
                    return (relaxed, Some(Edge::new(vid, dst, weight)));
                }
                times[dst] = value;
                relaxed = true;
            }
        }
    }
    (relaxed, None)
}

/// One relaxation pass over every vertex.
fn relax_all_asapst(dg: &ConstraintGraph, times: &mut PathTimes) -> bool {
    let mut relaxed = false;
    for v in dg.vertices() {
        if times[v.id] == ASAP_START_VALUE {
            continue;
        }
        for (&dst, &weight) in v.outgoing() {
            let value = times[v.id] + weight;
            if value > times[dst] {
                times[dst] = value;
                relaxed = true;
            }
        }
    }
    relaxed
}

/// Relaxes one edge. Returns the amount the destination moved (0 when the
/// edge did not relax).
pub fn relax_one_edge_asapst(e: &Edge, times: &mut PathTimes) -> Delay {
    if times[e.src] == ASAP_START_VALUE {
        return 0;
    }
    let value = times[e.src] + e.weight;
    if value > times[e.dst] {
        let amount = if times[e.dst] == ASAP_START_VALUE {
            Delay::MAX
        } else {
            value - times[e.dst]
        };
        times[e.dst] = value;
        return amount;
    }
    0
}

/// Incremental check for a single edge insertion: propagates the relaxation
/// caused by `e` through a max-amount priority queue. Returns `true` iff
/// adding `e` would create a positive cycle, witnessed by the relaxation
/// wave reaching back to `e.src` such that `e` relaxes again.
pub fn add_one_edge_incremental_asapst(
    dg: &ConstraintGraph,
    e: &Edge,
    times: &mut PathTimes,
) -> bool {
    let mut queue: BinaryHeap<(Delay, VertexId)> = BinaryHeap::new();

    let amount = relax_one_edge_asapst(e, times);
    if amount > 0 {
        queue.push((amount, e.dst));
    }

    while let Some((_, v)) = queue.pop() {
        for (&dst, &weight) in dg[v].outgoing() {
            let amount = relax_one_edge_asapst(&Edge::new(v, dst, weight), times);
            if amount > 0 {
                queue.push((amount, dst));
            }
        }

        if v == e.src && relax_one_edge_asapst(e, times) > 0 {
            return true;
        }
    }
    false
}

/// Batch version of [`add_one_edge_incremental_asapst`]. Edges are added one
/// by one so that later checks see the earlier edges; the graph is restored
/// before returning, whether or not a cycle was found.
pub fn add_edges_incremental_asapst(
    dg: &mut ConstraintGraph,
    edges: &[Edge],
    times: &mut PathTimes,
) -> bool {
    let mut added = Edges::new();

    for e in edges {
        if add_one_edge_incremental_asapst(dg, e, times) {
            dg.remove_edges(&added);
            return true;
        }
        if !dg.has_edge(e.src, e.dst) {
            dg.add_edge(e.src, e.dst, e.weight);
            added.push(*e);
        }
    }

    dg.remove_edges(&added);
    false
}

/// Reverse relaxation computing latest start times. `sources` are pinned and
/// must not be retimed; retiming one means the deadline structure is
/// infeasible.
pub fn compute_alapst(
    dg: &ConstraintGraph,
    times: &mut PathTimes,
    sources: &[VertexId],
) -> LongestPathResult {
    let mut infeasible = Edges::new();

    for _ in 1..dg.num_vertices().max(1) {
        let mut relaxed = false;
        for v in dg.vertices() {
            if times[v.id] == ALAP_START_VALUE {
                continue;
            }
            for (&src, &weight) in v.incoming() {
                let value = times[v.id] - weight;
                if value < times[src] {
                    if sources.contains(&src) {
                        infeasible.push(Edge::new(src, v.id, weight));
                        return LongestPathResult {
                            positive_cycle: infeasible,
                        };
                    }
                    times[src] = value;
                    relaxed = true;
                }
            }
        }
        if !relaxed {
            break;
        }
    }

    for v in dg.vertices() {
        for (&src, &weight) in v.incoming() {
            if times[v.id] != ALAP_START_VALUE && times[v.id] - weight < times[src] {
                infeasible.push(Edge::new(src, v.id, weight));
                break;
            }
        }
    }

    LongestPathResult {
        positive_cycle: infeasible,
    }
}

/// Extracts a positive cycle from the graph, or an empty vector when none
/// exists. Runs a full Bellman-Ford with parent pointers; after |V|
/// iterations any vertex still being modified lies on (or downstream of) a
/// cycle, so walking the parent chain |V| times lands inside the cycle.
pub fn find_positive_cycle(dg: &ConstraintGraph) -> Edges {
    let n = dg.num_vertices();
    let mut times = initialize_asapst(dg, &[], true);
    let mut previous: Vec<Option<VertexId>> = vec![None; n];
    let mut last_modified: Option<VertexId> = None;

    for _ in 0..n {
        last_modified = None;
        for v in dg.vertices() {
            if times[v.id] == ASAP_START_VALUE {
                continue;
            }
            for (&dst, &weight) in v.outgoing() {
                let value = times[v.id] + weight;
                if value > times[dst] {
                    times[dst] = value;
                    previous[dst] = Some(v.id);
                    last_modified = Some(dst);
                }
            }
        }
    }

    for _ in 0..n {
        match last_modified {
            Some(v) => last_modified = previous[v],
            None => return Edges::new(),
        }
    }

    let Some(start) = last_modified else {
        return Edges::new();
    };

    let mut cycle = Edges::new();
    let mut v = start;
    loop {
        if v == start && cycle.len() > 1 {
            break;
        }
        let src = previous[v].expect("vertex on a cycle has a parent");
        cycle.push(Edge::new(src, v, dg[src].weight_to(v).unwrap_or(0)));
        v = src;
    }
    cycle
}

/// [`find_positive_cycle`] with extra edges temporarily in place.
pub fn find_positive_cycle_with_edges(dg: &mut ConstraintGraph, edges: &[Edge]) -> Edges {
    let added = dg.add_edges(edges);
    let result = find_positive_cycle(dg);
    dg.remove_edges(&added);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{MachineId, Operation};

    fn chain_graph() -> (ConstraintGraph, Vec<VertexId>) {
        // source -> a -> b -> c with weights 2, 3, 4
        let mut g = ConstraintGraph::new();
        let s = g.add_source(MachineId(0)).unwrap();
        let a = g.add_vertex(Operation::new(JobId(0), 0)).unwrap();
        let b = g.add_vertex(Operation::new(JobId(0), 1)).unwrap();
        let c = g.add_vertex(Operation::new(JobId(1), 0)).unwrap();
        g.add_edge(s, a, 2);
        g.add_edge(a, b, 3);
        g.add_edge(b, c, 4);
        (g, vec![s, a, b, c])
    }

    #[test]
    fn asapst_on_chain() {
        let (g, v) = chain_graph();
        let mut times = initialize_asapst(&g, &[], true);
        let result = compute_asapst(&g, &mut times);
        assert!(!result.has_positive_cycle());
        assert_eq!(times[v[0]], 0);
        assert_eq!(times[v[1]], 2);
        assert_eq!(times[v[2]], 5);
        assert_eq!(times[v[3]], 9);
    }

    #[test]
    fn due_date_edge_is_respected() {
        // b must start within 10 of a: edge b->a with weight -10
        let (mut g, v) = chain_graph();
        g.add_edge(v[2], v[1], -10);
        let mut times = initialize_asapst(&g, &[], true);
        assert!(!compute_asapst(&g, &mut times).has_positive_cycle());

        // tightening the deadline below the minimal separation of 3 creates a
        // positive cycle
        g.add_edge(v[2], v[1], -2);
        let mut times = initialize_asapst(&g, &[], true);
        let result = compute_asapst(&g, &mut times);
        assert!(result.has_positive_cycle());
    }

    #[test]
    fn windowed_matches_full_when_window_covers_graph() {
        let (g, v) = chain_graph();
        let mut full = initialize_asapst(&g, &[], true);
        compute_asapst(&g, &mut full);

        let mut windowed = initialize_asapst(&g, &[], true);
        let window: Vec<VertexId> = v.iter().copied().filter(|&x| !g.is_source(x)).collect();
        let result = compute_asapst_windowed(&g, &mut windowed, &[], &window);
        assert!(!result.has_positive_cycle());
        assert_eq!(full, windowed);
    }

    #[test]
    fn windowed_rejects_retiming_before_window() {
        let (mut g, v) = chain_graph();
        // an edge pushing job 0 later, discovered while the window starts at job 1
        g.add_edge(v[3], v[1], 1);
        let mut times = initialize_asapst(&g, &[], true);
        compute_asapst(&g, &mut times);
        // ignore the feasibility of the full run; the windowed run must flag
        // the attempt to retime job 0
        let window = g.vertices_of_job(JobId(1)).to_vec();
        let result = compute_asapst_windowed(&g, &mut times, &[], &window);
        assert!(result.has_positive_cycle());
    }

    #[test]
    fn incremental_detects_cycle() {
        let (mut g, v) = chain_graph();
        let mut times = initialize_asapst(&g, &[], true);
        compute_asapst(&g, &mut times);

        // a harmless edge first
        assert!(!add_one_edge_incremental_asapst(
            &g,
            &Edge::new(v[1], v[3], 1),
            &mut times
        ));

        // b -> a with +1 forms a positive cycle with a -> b (+3)
        let mut times2 = times.clone();
        assert!(add_one_edge_incremental_asapst(
            &g,
            &Edge::new(v[2], v[1], 1),
            &mut times2
        ));

        // batch variant must leave the graph unchanged
        let before: usize = g.vertices().iter().map(|x| x.outgoing().len()).sum();
        let mut times3 = times.clone();
        assert!(add_edges_incremental_asapst(
            &mut g,
            &[Edge::new(v[1], v[3], 1), Edge::new(v[2], v[1], 1)],
            &mut times3
        ));
        let after: usize = g.vertices().iter().map(|x| x.outgoing().len()).sum();
        assert_eq!(before, after);
    }

    #[test]
    fn positive_cycle_extraction() {
        let (mut g, v) = chain_graph();
        g.add_edge(v[2], v[1], 1);
        let cycle = find_positive_cycle(&g);
        assert!(!cycle.is_empty());
        let total: Delay = cycle.iter().map(|e| e.weight).sum();
        assert!(total > 0);
    }

    #[test]
    fn alapst_reverse_relaxation() {
        let (g, v) = chain_graph();
        // pin the last vertex at 9 and relax backwards
        let mut times = vec![ALAP_START_VALUE; g.num_vertices()];
        times[v[3]] = 9;
        let result = compute_alapst(&g, &mut times, &[v[3]]);
        assert!(!result.has_positive_cycle());
        assert_eq!(times[v[2]], 5);
        assert_eq!(times[v[1]], 2);
    }
}
