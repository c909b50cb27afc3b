//! Shortest-path voting on the lattice graph
//!
//! Arc weights come from the vesselness at both ends,
//! `cost(u, v) = exp(-(v_u + v_v)) + 0.5`, so paths prefer bright tubes and
//! every arc costs at least 0.5. A single-source Dijkstra search then gives
//! the path to every target; each voxel on a path gets one vote.

use std::collections::BTreeSet;

use log::{debug, info};

use crate::error::{Result, VesselError};
use crate::graph::lattice::{LatticeGraph, NodeId};
use crate::priority_queue::MinQueue;
use crate::volume::{ensure_same_dims, Volume, VoteMap};

/// Constant floor added to every arc cost
pub const COST_FLOOR: f64 = 0.5;

#[inline]
pub fn arc_cost(v_u: f64, v_v: f64) -> f64 {
    (-(v_u + v_v)).exp() + COST_FLOOR
}

/// Per-arc weights, indexed like the graph's arcs
#[derive(Clone, Debug)]
pub struct CostMap {
    costs: Vec<f64>,
}

impl CostMap {
    /// Weights from a vesselness field; non-finite or negative vesselness counts as 0
    pub fn from_vesselness(graph: &LatticeGraph, vesselness: &Volume<f64>) -> Result<Self> {
        ensure_same_dims("vesselness", vesselness.dims, "graph mask", graph.dims())?;
        let v = |node: NodeId| {
            let x = vesselness[graph.coords(node)];
            if x.is_finite() { x.max(0.0) } else { 0.0 }
        };
        let costs = graph.arcs().map(|(u, w)| arc_cost(v(u), v(w))).collect();
        Ok(CostMap { costs })
    }

    #[inline]
    pub fn cost(&self, arc: usize) -> f64 {
        self.costs[arc]
    }

    pub fn len(&self) -> usize {
        self.costs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }
}

/// Single-source shortest-path tree
#[derive(Clone, Debug)]
pub struct ShortestPaths {
    pub source: NodeId,
    /// Accumulated cost; `f64::INFINITY` for unreached nodes
    pub dist: Vec<f64>,
    pub pred: Vec<Option<NodeId>>,
}

impl ShortestPaths {
    pub fn is_reached(&self, node: NodeId) -> bool {
        self.dist[node].is_finite()
    }

    /// Nodes from the source to `target`, both included; `None` if unreached
    pub fn path_to(&self, target: NodeId) -> Option<Vec<NodeId>> {
        if !self.is_reached(target) {
            return None;
        }
        let mut path = vec![target];
        let mut node = target;
        while let Some(p) = self.pred[node] {
            path.push(p);
            node = p;
        }
        path.reverse();
        Some(path)
    }

    /// Path length in arcs
    pub fn steps_to(&self, target: NodeId) -> Option<usize> {
        self.path_to(target).map(|p| p.len() - 1)
    }
}

/// Dijkstra from `source` with lazy deletion; equal keys settle in insertion order
pub fn shortest_paths(graph: &LatticeGraph, costs: &CostMap, source: NodeId) -> ShortestPaths {
    let n = graph.node_count();
    let mut dist = vec![f64::INFINITY; n];
    let mut pred = vec![None; n];
    let mut settled = vec![false; n];

    let mut queue = MinQueue::with_capacity(n);
    dist[source] = 0.0;
    queue.push(0.0, source);

    let mut n_settled = 0usize;
    while let Some((d, u)) = queue.pop() {
        if settled[u] {
            continue;
        }
        settled[u] = true;
        n_settled += 1;

        for arc in graph.out_arcs(u) {
            let v = graph.arc_target(arc);
            if settled[v] {
                continue;
            }
            let nd = d + costs.cost(arc);
            if nd < dist[v] {
                dist[v] = nd;
                pred[v] = Some(u);
                queue.push(nd, v);
            }
        }
    }

    debug!("dijkstra: settled {} of {} nodes from source {}", n_settled, n, source);
    ShortestPaths { source, dist, pred }
}

/// Vote along the path to each target. Returns (reached, unreached) counts.
pub fn vote_paths(graph: &LatticeGraph, paths: &ShortestPaths, targets: &[NodeId], votes: &mut VoteMap) -> (usize, usize) {
    let mut reached = 0;
    let mut unreached = 0;
    for &t in targets {
        match paths.path_to(t) {
            Some(path) => {
                for node in path {
                    votes.vote(graph.coords(node));
                }
                reached += 1;
            }
            None => unreached += 1,
        }
    }
    (reached, unreached)
}

/// Outputs of a voting run
#[derive(Clone, Debug)]
pub struct PathVotes {
    pub paths: ShortestPaths,
    pub votes: VoteMap,
    /// Accumulated cost per voxel; 0 off the graph and at unreached nodes
    pub cost_volume: Volume<f64>,
    pub reached: usize,
    pub unreached: usize,
}

/// Cost-weighted shortest paths from `source` to each target voxel, with votes.
///
/// Targets off the graph are ignored; duplicates count once.
pub fn vote_shortest_paths(
    graph: &LatticeGraph,
    vesselness: &Volume<f64>,
    source: [usize; 3],
    targets: &[[usize; 3]],
) -> Result<PathVotes> {
    let costs = CostMap::from_vesselness(graph, vesselness)?;
    let source_node = graph.node_at(source).ok_or_else(|| {
        VesselError::config(format!("source voxel {:?} is not in the graph mask", source))
    })?;

    let target_nodes: Vec<NodeId> = targets
        .iter()
        .filter_map(|&ijk| graph.node_at(ijk))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let paths = shortest_paths(graph, &costs, source_node);

    let mut votes: VoteMap = vesselness.like(0);
    let (reached, unreached) = vote_paths(graph, &paths, &target_nodes, &mut votes);

    let mut cost_volume = vesselness.like(0.0);
    for (node, &d) in paths.dist.iter().enumerate() {
        if d.is_finite() {
            cost_volume[graph.coords(node)] = d;
        }
    }

    info!("dijkstra voting: {} targets reached, {} unreached", reached, unreached);
    Ok(PathVotes { paths, votes, cost_volume, reached, unreached })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::lattice::{boundary_voxels, Connectivity};
    use crate::utils::mask::{create_box_mask, mask_from_coords};
    use crate::volume::{Mask, VolumeMeta};
    use float_eq::assert_float_eq;
    use rstest::rstest;

    fn uniform(dims: (usize, usize, usize), v: f64) -> Volume<f64> {
        Volume::new(dims, VolumeMeta::default(), v)
    }

    #[test]
    fn test_arc_cost_bounds() {
        assert_float_eq!(arc_cost(0.0, 0.0), 1.5, abs <= 1e-15);
        assert_float_eq!(arc_cost(1.0, 1.0), (-2.0f64).exp() + 0.5, abs <= 1e-15);
        assert!(arc_cost(1e3, 1e3) >= COST_FLOOR);
    }

    #[test]
    fn test_corridor_distance() {
        let len = 7;
        let mask = create_box_mask((len, 1, 1), VolumeMeta::default(), [0, 0, 0], [len - 1, 0, 0]);
        let g = LatticeGraph::build(&mask, Connectivity::Six);
        let out = vote_shortest_paths(&g, &uniform((len, 1, 1), 1.0), [0, 0, 0], &[[len - 1, 0, 0]]).unwrap();

        let target = g.node_at([len - 1, 0, 0]).unwrap();
        assert_float_eq!(out.paths.dist[target], (len - 1) as f64 * arc_cost(1.0, 1.0), rmax <= 1e-12);
        assert_eq!(out.reached, 1);
        assert!(out.votes.data.iter().all(|&v| v == 1));
        assert_float_eq!(out.cost_volume[[3, 0, 0]], 3.0 * arc_cost(1.0, 1.0), rmax <= 1e-12);
    }

    fn manhattan(a: [usize; 3], b: [usize; 3]) -> usize {
        (0..3).map(|i| a[i].abs_diff(b[i])).sum()
    }

    fn chebyshev(a: [usize; 3], b: [usize; 3]) -> usize {
        (0..3).map(|i| a[i].abs_diff(b[i])).max().unwrap_or(0)
    }

    #[rstest(/**/ conn, target,
             case(Connectivity::Six, [4, 3, 2]),
             case(Connectivity::Six, [0, 4, 1]),
             case(Connectivity::Eighteen, [4, 3, 2]),
             case(Connectivity::Eighteen, [4, 4, 4]),
             case(Connectivity::Eighteen, [3, 1, 0]),
             case(Connectivity::TwentySix, [4, 3, 2]),
             case(Connectivity::TwentySix, [4, 4, 4]),
    )]
    fn uniform_field_steps_match_grid_metric(conn: Connectivity, target: [usize; 3]) {
        let dims = (5, 5, 5);
        let mask: Mask = Volume::new(dims, VolumeMeta::default(), 1);
        let g = LatticeGraph::build(&mask, conn);
        let out = vote_shortest_paths(&g, &uniform(dims, 0.3), [0, 0, 0], &[target]).unwrap();

        let node = g.node_at(target).unwrap();
        let steps = out.paths.steps_to(node).unwrap();
        let origin = [0, 0, 0];
        let expected = match conn {
            Connectivity::Six => manhattan(origin, target),
            Connectivity::TwentySix => chebyshev(origin, target),
            // an edge step changes two coordinates by one
            Connectivity::Eighteen => chebyshev(origin, target).max((manhattan(origin, target) + 1) / 2),
        };
        assert_eq!(steps, expected);
        assert_float_eq!(out.paths.dist[node], steps as f64 * arc_cost(0.3, 0.3), rmax <= 1e-12);
    }

    #[test]
    fn test_prefers_bright_route() {
        // Two routes around a wall; the longer one is bright
        let dims = (5, 3, 1);
        let mask = mask_from_coords(dims, VolumeMeta::default(), &[
            [0, 1, 0], [1, 1, 0], [2, 1, 0], [3, 1, 0], [4, 1, 0],
            [0, 0, 0], [1, 0, 0], [2, 0, 0], [3, 0, 0], [4, 0, 0],
        ]);
        let mut v = uniform(dims, 0.0);
        for i in 0..5 {
            v[[i, 0, 0]] = 5.0;
        }
        let g = LatticeGraph::build(&mask, Connectivity::Six);
        let out = vote_shortest_paths(&g, &v, [0, 1, 0], &[[4, 1, 0]]).unwrap();
        // detour: up, 4 bright steps, down
        assert_eq!(out.votes[[2, 0, 0]], 1);
        assert_eq!(out.votes[[2, 1, 0]], 0);
    }

    #[test]
    fn test_votes_monotone_in_target_set() {
        let dims = (6, 6, 1);
        let mask: Mask = Volume::new(dims, VolumeMeta::default(), 1);
        let g = LatticeGraph::build(&mask, Connectivity::Eighteen);
        let v = uniform(dims, 0.5);
        let targets = boundary_voxels(&mask, Connectivity::Six);

        let mut previous: Option<VoteMap> = None;
        for n in [1, 3, 7, targets.len()] {
            let out = vote_shortest_paths(&g, &v, [2, 3, 0], &targets[..n]).unwrap();
            if let Some(prev) = previous {
                for (a, b) in prev.data.iter().zip(out.votes.data.iter()) {
                    assert!(b >= a);
                }
            }
            assert_eq!(out.votes[[2, 3, 0]] as usize, n);
            previous = Some(out.votes);
        }
    }

    #[test]
    fn test_disconnected_target_is_skipped() {
        let dims = (7, 1, 1);
        let mask = mask_from_coords(dims, VolumeMeta::default(), &[[0, 0, 0], [1, 0, 0], [2, 0, 0], [5, 0, 0], [6, 0, 0]]);
        let g = LatticeGraph::build(&mask, Connectivity::TwentySix);
        let out = vote_shortest_paths(&g, &uniform(dims, 1.0), [0, 0, 0], &[[2, 0, 0], [6, 0, 0]]).unwrap();
        assert_eq!(out.reached, 1);
        assert_eq!(out.unreached, 1);
        let far = g.node_at([6, 0, 0]).unwrap();
        assert!(out.paths.dist[far].is_infinite());
        assert_eq!(out.paths.path_to(far), None);
        assert_eq!(out.votes[[6, 0, 0]], 0);
        assert_eq!(out.cost_volume[[6, 0, 0]], 0.0);
    }

    #[test]
    fn test_source_outside_graph_is_config_error() {
        let dims = (3, 3, 1);
        let mask = create_box_mask(dims, VolumeMeta::default(), [0, 0, 0], [1, 1, 0]);
        let g = LatticeGraph::build(&mask, Connectivity::Six);
        let err = vote_shortest_paths(&g, &uniform(dims, 0.0), [2, 2, 0], &[]).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_source_is_own_target() {
        let dims = (3, 3, 1);
        let mask: Mask = Volume::new(dims, VolumeMeta::default(), 1);
        let g = LatticeGraph::build(&mask, Connectivity::Six);
        let out = vote_shortest_paths(&g, &uniform(dims, 0.0), [1, 1, 0], &[[1, 1, 0], [1, 1, 0]]).unwrap();
        assert_eq!(out.reached, 1);
        assert_eq!(out.votes.total_votes(), 1);
    }
}
