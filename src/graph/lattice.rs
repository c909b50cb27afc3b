//! Voxel-lattice graph over a binary mask
//!
//! Nodes are the mask's foreground voxels, numbered densely in flat scan
//! order (x fastest). Every node has one outgoing arc per foreground
//! neighbour under the chosen connectivity, so each adjacent voxel pair is
//! joined by two opposing arcs. Arcs are stored in compressed sparse rows:
//! the arcs of node `n` are `arc_target[arc_start[n]..arc_start[n + 1]]`.

use std::ops::Range;

use crate::error::{Result, VesselError};
use crate::volume::{offset_index, Mask};

pub type NodeId = usize;

/// Neighbour offsets: 6 faces, then 12 edges, then 8 corners. Each
/// connectivity uses a prefix of this table.
pub const NEIGHBOR_OFFSETS: [[isize; 3]; 26] = [
    // faces
    [0, 0, -1], [0, -1, 0], [-1, 0, 0], [1, 0, 0], [0, 1, 0], [0, 0, 1],
    // edges
    [0, -1, -1], [-1, 0, -1], [1, 0, -1], [0, 1, -1],
    [-1, -1, 0], [1, -1, 0], [-1, 1, 0], [1, 1, 0],
    [0, -1, 1], [-1, 0, 1], [1, 0, 1], [0, 1, 1],
    // corners
    [-1, -1, -1], [1, -1, -1], [-1, 1, -1], [1, 1, -1],
    [-1, -1, 1], [1, -1, 1], [-1, 1, 1], [1, 1, 1],
];

/// Mask value used for off-grid neighbours during boundary detection
const OUTSIDE: i16 = -1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Connectivity {
    Six,
    Eighteen,
    TwentySix,
}

impl Connectivity {
    pub fn count(self) -> usize {
        match self {
            Connectivity::Six => 6,
            Connectivity::Eighteen => 18,
            Connectivity::TwentySix => 26,
        }
    }

    pub fn offsets(self) -> &'static [[isize; 3]] {
        &NEIGHBOR_OFFSETS[..self.count()]
    }
}

impl TryFrom<u32> for Connectivity {
    type Error = VesselError;

    fn try_from(n: u32) -> Result<Self> {
        match n {
            6 => Ok(Connectivity::Six),
            18 => Ok(Connectivity::Eighteen),
            26 => Ok(Connectivity::TwentySix),
            other => Err(VesselError::InvalidConnectivity(other)),
        }
    }
}

impl From<Connectivity> for u32 {
    fn from(c: Connectivity) -> u32 {
        c.count() as u32
    }
}

#[derive(Clone, Debug)]
pub struct LatticeGraph {
    dims: (usize, usize, usize),
    connectivity: Connectivity,
    coords: Vec<[usize; 3]>,
    node_of_voxel: Vec<Option<NodeId>>,
    arc_start: Vec<usize>,
    arc_target: Vec<NodeId>,
}

impl LatticeGraph {
    /// Build the graph in two passes: number the foreground voxels, then emit
    /// one arc per (voxel, foreground neighbour) pair.
    pub fn build(mask: &Mask, connectivity: Connectivity) -> Self {
        let mut coords = Vec::with_capacity(mask.foreground_count());
        let mut node_of_voxel = vec![None; mask.len()];
        for (idx, slot) in node_of_voxel.iter_mut().enumerate() {
            if mask.is_foreground(idx) {
                *slot = Some(coords.len());
                coords.push(mask.coords(idx));
            }
        }

        let mut arc_start = Vec::with_capacity(coords.len() + 1);
        let mut arc_target = Vec::new();
        arc_start.push(0);
        for &ijk in coords.iter() {
            for &off in connectivity.offsets() {
                if let Some(n) = offset_index(mask.dims, ijk, off).and_then(|idx| node_of_voxel[idx]) {
                    arc_target.push(n);
                }
            }
            arc_start.push(arc_target.len());
        }

        log::debug!(
            "lattice graph: {} nodes, {} arcs ({}-connectivity)",
            coords.len(),
            arc_target.len(),
            connectivity.count()
        );

        LatticeGraph { dims: mask.dims, connectivity, coords, node_of_voxel, arc_start, arc_target }
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        self.dims
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    pub fn node_count(&self) -> usize {
        self.coords.len()
    }

    pub fn arc_count(&self) -> usize {
        self.arc_target.len()
    }

    /// Node at a voxel, `None` for background or off-grid voxels
    pub fn node_at(&self, [i, j, k]: [usize; 3]) -> Option<NodeId> {
        let (nx, ny, nz) = self.dims;
        if i >= nx || j >= ny || k >= nz {
            return None;
        }
        self.node_of_voxel[i + j * nx + k * nx * ny]
    }

    pub fn coords(&self, node: NodeId) -> [usize; 3] {
        self.coords[node]
    }

    /// Arc ids leaving `node`
    pub fn out_arcs(&self, node: NodeId) -> Range<usize> {
        self.arc_start[node]..self.arc_start[node + 1]
    }

    pub fn arc_target(&self, arc: usize) -> NodeId {
        self.arc_target[arc]
    }

    pub fn neighbors(&self, node: NodeId) -> &[NodeId] {
        &self.arc_target[self.out_arcs(node)]
    }

    /// (source, target) of every arc, in arc id order
    pub fn arcs(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        (0..self.node_count()).flat_map(move |u| self.neighbors(u).iter().map(move |&v| (u, v)))
    }
}

/// Foreground voxels with at least one configured neighbour outside the mask
/// or off the grid, in scan order.
///
/// A grid with a singleton axis makes every voxel a boundary voxel under
/// any connectivity, because the face neighbours along that axis are
/// off-grid.
pub fn boundary_voxels(mask: &Mask, connectivity: Connectivity) -> Vec<[usize; 3]> {
    let value_at = |ijk: [usize; 3], off: [isize; 3]| -> i16 {
        match offset_index(mask.dims, ijk, off) {
            Some(idx) => i16::from(mask[idx]),
            None => OUTSIDE,
        }
    };

    mask.iter_coords()
        .filter(|&ijk| mask[ijk] > 0)
        .filter(|&ijk| connectivity.offsets().iter().any(|&off| value_at(ijk, off) <= 0))
        .collect()
}

/// Boundary voxels of `target_mask` that are nodes of `graph`
pub fn boundary_nodes(graph: &LatticeGraph, target_mask: &Mask, connectivity: Connectivity) -> Vec<NodeId> {
    boundary_voxels(target_mask, connectivity)
        .into_iter()
        .filter_map(|ijk| graph.node_at(ijk))
        .collect()
}
