//! # `voro_surge`
//!
//! Incremental 2D Voronoi diagrams for **point and line-segment sites**,
//! built by topological surgery on a half-edge graph — no global
//! recomputation when a site is added.
//!
//! ## What is this?
//!
//! A Voronoi diagram partitions the plane into faces, one per site, each
//! covering the region closer to its site than to any other. This crate
//! maintains that partition *incrementally*: every insertion finds the
//! region the new site steals from its neighbors, carves it out by local
//! edge rewiring, and leaves every planar-graph invariant intact. Line
//! segments get two faces (one per offset side), and their endpoints get
//! degenerate *null-faces* that mediate the topology where several
//! segments meet.
//!
//! ## Quick Start
//!
//! ```rust
//! use glam::DVec2;
//! use voro_surge::VoronoiDiagram;
//!
//! let mut vd = VoronoiDiagram::new(100.0, 10);
//!
//! // Point sites first; the handles anchor segments.
//! let a = vd.insert_point_site(DVec2::new(-10.0, 0.0)).unwrap();
//! let b = vd.insert_point_site(DVec2::new(10.0, 0.0)).unwrap();
//! vd.insert_point_site(DVec2::new(0.0, 15.0)).unwrap();
//!
//! // Then the segment between two inserted points.
//! vd.insert_line_site(a, b).unwrap();
//!
//! assert_eq!(vd.num_line_sites(), 1);
//! assert!(vd.check());
//! ```
//!
//! ## Key Features
//!
//! - **Incremental insertion**: one site at a time, cost proportional to
//!   the region the site claims, not to the diagram size
//! - **Segment sites**: two offset faces per segment, null-faces and
//!   separator edges at endpoints, shared endpoints supported
//! - **Topology validation**: `check()` verifies the twin involution,
//!   face-cycle closure, status cleanliness and null-face winding
//! - **Spatial indexing**: grid-accelerated nearest-face lookup seeds
//!   each insertion
//!
//! ## When NOT to Use
//!
//! - Segments that cross each other (split them at intersections first)
//! - Inserting point sites after segments that reach into their region
//!   (insert all points first, then segments)
//! - Exact arithmetic requirements (f64 with an in-circle tolerance)
//!
//! ## Algorithm
//!
//! Point insertion follows the incremental scheme of Sugihara & Iri: a
//! seed vertex whose clearance disk the new site violates is grown into
//! a deletion tree under two topological guards (no cycles, per-face
//! connectedness), NEW vertices are positioned on the tree's boundary
//! edges, and each incident face is split by a NEW-NEW edge. Segment
//! insertion extends this with separator edges out of the endpoint
//! null-faces and transient SPLIT vertices that keep the deletion tree
//! acyclic across elongated faces.

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::module_name_repetitions)]

mod bisector;
mod checker;
mod diagram;
mod face_grid;
mod graph;
pub mod numeric;
mod positioner;
mod site;

pub use bisector::Bisector;
pub use checker::{TopologyError, check_edge, face_ok, is_valid};
pub use diagram::{Error, PointHandle, VoronoiDiagram};
pub use face_grid::FaceGrid;
pub use graph::{
    EdgeIdx, EdgeType, FaceIdx, FaceStatus, HalfEdgeGraph, VertexIdx, VertexStatus, VertexType,
    VoronoiEdge, VoronoiFace, VoronoiVertex,
};
pub use positioner::{POSITION_TOLERANCE, Solution, dist_error, offset_sign, position};
pub use site::{LineSite, PointSite, Site};

/// Re-export glam types for convenience
pub mod math {
    pub use glam::DVec2;
}
