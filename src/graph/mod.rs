//! Discrete shortest-path voting
//!
//! - `lattice`: mask voxels as graph nodes, 6/18/26 connectivity, boundary detection
//! - `dijkstra`: vesselness-weighted arc costs, single-source search, path votes

pub mod lattice;
pub mod dijkstra;

pub use lattice::{boundary_nodes, boundary_voxels, Connectivity, LatticeGraph, NodeId, NEIGHBOR_OFFSETS};
pub use dijkstra::{arc_cost, shortest_paths, vote_paths, vote_shortest_paths, CostMap, PathVotes, ShortestPaths};
