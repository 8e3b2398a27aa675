//! Incremental Voronoi diagram construction.
//!
//! Sites are inserted one at a time; each insertion grafts the new site's
//! face(s) into the existing half-edge graph by local surgery, never by
//! global recomputation. Point sites follow the classic four-phase
//! incremental scheme: find a seed vertex whose clearance disk the new
//! site violates, grow a tree of IN vertices under topological guards,
//! place NEW vertices on every IN-OUT edge, then split each incident
//! face with a NEW-NEW edge and delete the IN tree. Line-segment sites
//! extend the scheme with degenerate null-faces at their endpoints,
//! separator edges out of those null-faces, and transient SPLIT vertices
//! that keep the growing tree acyclic across elongated faces.
//!
//! The insertion order contract: all point sites first, then segments
//! between previously inserted points. Segments may share endpoints.

use glam::DVec2;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::collections::BinaryHeap;
use tracing::{debug, trace, warn};

use crate::bisector::Bisector;
use crate::checker;
use crate::face_grid::FaceGrid;
use crate::graph::{
    EdgeIdx, EdgeType, FaceIdx, FaceStatus, HalfEdgeGraph, VertexIdx, VertexStatus, VertexType,
    VoronoiVertex,
};
use crate::numeric::{diangle_bracket, diangle_mid, diangle_v, is_right};
use crate::positioner::{self, POSITION_TOLERANCE};
use crate::site::{LineSite, PointSite, Site};

/// Stable handle to an inserted point site, used to anchor segments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointHandle(pub usize);

/// Errors surfaced by the insertion API.
///
/// The first three are input errors and leave the diagram untouched. The
/// rest are abort-class: the insertion stopped mid-surgery and the
/// diagram must not be relied on until [`VoronoiDiagram::check`] passes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Point outside the working radius.
    #[error("point ({x}, {y}) lies outside the working radius {far_radius}")]
    InputOutOfRange { x: f64, y: f64, far_radius: f64 },
    /// Segment endpoint handle was never returned by a point insertion.
    #[error("unknown point-site handle {0}")]
    UnknownHandle(usize),
    /// Segment endpoints coincide.
    #[error("segment endpoints coincide")]
    CoincidentEndpoints,
    /// No vertex with a negative clearance violation on the seed face.
    #[error("no seed vertex found for the new site")]
    SeedNotFound,
    /// The vertex positioner could not bracket a solution.
    #[error("vertex positioner could not bracket a solution")]
    PositionFailed,
    /// An internal planar-graph invariant was violated.
    #[error("topology violation: {0}")]
    TopologyViolation(&'static str),
}

/// Entry of the growth queue: max-heap on `|h|` so the most reliable
/// in-circle verdicts are decided first; ties pop in enqueue order.
#[derive(Clone, Copy, Debug)]
struct QueuedVertex {
    vertex: VertexIdx,
    h: f64,
    seq: u64,
}

impl PartialEq for QueuedVertex {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for QueuedVertex {}

impl PartialOrd for QueuedVertex {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedVertex {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.h
            .abs()
            .total_cmp(&other.h.abs())
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// OUT-NEW-IN / IN-NEW-OUT triple located on a face, the attachment point
/// for a separator.
#[derive(Clone, Copy, Debug)]
struct SepTarget {
    prev: EdgeIdx,
    target: VertexIdx,
    next: EdgeIdx,
    out_new_in: bool,
}

/// The `OUT-NEW(v1)-IN-...-IN-NEW(v2)-OUT` pattern on a face, with the
/// edges flanking both NEW vertices.
#[derive(Clone, Copy, Debug)]
struct EdgeData {
    f: FaceIdx,
    v1: VertexIdx,
    v1_prv: EdgeIdx,
    v1_nxt: EdgeIdx,
    v2: VertexIdx,
    v2_prv: EdgeIdx,
    v2_nxt: EdgeIdx,
}

/// Result of resolving one segment endpoint: its ENDPOINT vertex, the
/// (new or augmented) null-face, and the separator points to install, if
/// any.
struct NullFaceData {
    seg: VertexIdx,
    null_face: FaceIdx,
    pos_sep: Option<VertexIdx>,
    neg_sep: Option<VertexIdx>,
}

/// Per-insertion scratch state, reset (not reallocated) between
/// insertions.
#[derive(Debug, Default)]
struct InsertionScratch {
    /// The IN tree (deletion set).
    v0: Vec<VertexIdx>,
    incident_faces: Vec<FaceIdx>,
    modified_vertices: FxHashSet<VertexIdx>,
    queue: BinaryHeap<QueuedVertex>,
    seq: u64,
    segment_start: Option<VertexIdx>,
    segment_end: Option<VertexIdx>,
    null_face1: Option<FaceIdx>,
    null_face2: Option<FaceIdx>,
    /// Point-site face contracted away by a collinear segment sharing an
    /// endpoint with an existing one.
    zero_point_face: Option<FaceIdx>,
}

impl InsertionScratch {
    fn reset(&mut self) {
        self.v0.clear();
        self.incident_faces.clear();
        self.modified_vertices.clear();
        self.queue.clear();
        self.segment_start = None;
        self.segment_end = None;
        self.null_face1 = None;
        self.null_face2 = None;
        self.zero_point_face = None;
    }
}

/// An incrementally constructed 2D Voronoi diagram of points and line
/// segments.
pub struct VoronoiDiagram {
    g: HalfEdgeGraph,
    grid: FaceGrid,
    far_radius: f64,
    num_psites: usize,
    num_lsites: usize,
    /// Stable vertex `index` → arena slot, for resolving segment
    /// endpoints.
    vertex_map: FxHashMap<usize, VertexIdx>,
    scratch: InsertionScratch,
}

impl VoronoiDiagram {
    /// Empty diagram accepting sites within `far_radius` of the origin,
    /// with an `n_bins`-per-axis face grid.
    #[must_use]
    pub fn new(far_radius: f64, n_bins: usize) -> Self {
        let mut d = Self {
            g: HalfEdgeGraph::new(),
            grid: FaceGrid::new(far_radius, n_bins),
            far_radius,
            num_psites: 0,
            num_lsites: 0,
            vertex_map: FxHashMap::default(),
            scratch: InsertionScratch::default(),
        };
        d.initialize();
        d.num_psites = 3;
        debug_assert!(checker::is_valid(&d).is_ok());
        d
    }

    // INITIALIZATION - far triangle enclosing all admissible inputs

    /// Three far-away generators whose diagram encloses the working disk:
    /// one vertex at the origin, three OUT vertices far outside, and an
    /// apex vertex on each of the three bisectors. Growth always
    /// terminates on the OUT boundary because no admissible site can
    /// violate an outer vertex's clearance disk.
    fn initialize(&mut self) {
        let far = self.far_radius;
        let sqrt3 = 3.0_f64.sqrt();
        let far_multiplier = 6.0;

        let gen1 = DVec2::new(0.0, 3.0 * far);
        let gen2 = DVec2::new(-3.0 * sqrt3 * far / 2.0, -3.0 * far / 2.0);
        let gen3 = DVec2::new(3.0 * sqrt3 * far / 2.0, -3.0 * far / 2.0);

        let vd1 = DVec2::new(0.0, -3.0 * far * far_multiplier);
        let vd2 = DVec2::new(
            3.0 * sqrt3 * far * far_multiplier / 2.0,
            3.0 * far * far_multiplier / 2.0,
        );
        let vd3 = DVec2::new(
            -3.0 * sqrt3 * far * far_multiplier / 2.0,
            3.0 * far * far_multiplier / 2.0,
        );

        let v00 = self.g.add_vertex(VoronoiVertex::with_dist(
            DVec2::ZERO,
            VertexStatus::Undecided,
            VertexType::Normal,
            gen1,
        ));
        let v01 = self.g.add_vertex(VoronoiVertex::with_dist(
            vd1,
            VertexStatus::Out,
            VertexType::Outer,
            gen3,
        ));
        let v02 = self.g.add_vertex(VoronoiVertex::with_dist(
            vd2,
            VertexStatus::Out,
            VertexType::Outer,
            gen1,
        ));
        let v03 = self.g.add_vertex(VoronoiVertex::with_dist(
            vd3,
            VertexStatus::Out,
            VertexType::Outer,
            gen2,
        ));

        // Marker vertices for the initial generators; they take no part
        // in the graph structure.
        for generator in [gen1, gen2, gen3] {
            self.g.add_vertex(VoronoiVertex::new(
                generator,
                VertexStatus::Out,
                VertexType::Pointsite,
            ));
        }

        let a1 = self.g.add_vertex(VoronoiVertex::with_dist(
            gen2.midpoint(gen3),
            VertexStatus::Undecided,
            VertexType::Apex,
            gen2,
        ));
        let a2 = self.g.add_vertex(VoronoiVertex::with_dist(
            gen1.midpoint(gen3),
            VertexStatus::Undecided,
            VertexType::Apex,
            gen3,
        ));
        let a3 = self.g.add_vertex(VoronoiVertex::with_dist(
            gen1.midpoint(gen2),
            VertexStatus::Undecided,
            VertexType::Apex,
            gen1,
        ));

        let s1 = Site::Point(PointSite::new(gen3));
        let s2 = Site::Point(PointSite::new(gen1));
        let s3 = Site::Point(PointSite::new(gen2));

        // Face 1: v00-a1-v01-v02-a2, enclosing gen3.
        let e1_1 = self.g.add_edge(v00, a1);
        let e1_2 = self.g.add_edge(a1, v01);
        let e2 = self.g.add_edge(v01, v02);
        let e3_1 = self.g.add_edge(v02, a2);
        let e3_2 = self.g.add_edge(a2, v00);
        let f1 = self.add_face(s1);
        self.g.set_next_cycle(&[e1_1, e1_2, e2, e3_1, e3_2], f1, 1);

        // Face 2: v00-a2-v02-v03-a3, enclosing gen1.
        let e4_1 = self.g.add_edge(v00, a2);
        let e4_2 = self.g.add_edge(a2, v02);
        let e5 = self.g.add_edge(v02, v03);
        let e6_1 = self.g.add_edge(v03, a3);
        let e6_2 = self.g.add_edge(a3, v00);
        let f2 = self.add_face(s2);
        self.g.set_next_cycle(&[e4_1, e4_2, e5, e6_1, e6_2], f2, 1);

        // Face 3: v00-a3-v03-v01-a1, enclosing gen2.
        let e7_1 = self.g.add_edge(v00, a3);
        let e7_2 = self.g.add_edge(a3, v03);
        let e8 = self.g.add_edge(v03, v01);
        let e9_1 = self.g.add_edge(v01, a1);
        let e9_2 = self.g.add_edge(a1, v00);
        let f3 = self.add_face(s3);
        self.g.set_next_cycle(&[e7_1, e7_2, e8, e9_1, e9_2], f3, 1);

        for (e, sa, sb, sign) in [
            (e1_1, &s1, &s3, false),
            (e1_2, &s1, &s3, true),
            (e3_1, &s2, &s1, true),
            (e3_2, &s2, &s1, false),
            (e4_1, &s2, &s1, false),
            (e4_2, &s2, &s1, true),
            (e6_1, &s2, &s3, false),
            (e6_2, &s2, &s3, true),
            (e7_1, &s2, &s3, true),
            (e7_2, &s2, &s3, false),
            (e9_1, &s1, &s3, true),
            (e9_2, &s1, &s3, false),
        ] {
            self.g[e].kind = EdgeType::Line;
            self.g[e].bisector = Some(Bisector::new(sa, sb, sign));
        }
        // The outermost boundary edges carry no twin.
        for e in [e2, e5, e8] {
            self.g[e].kind = EdgeType::Outedge;
        }

        self.g.twin_edges(e1_1, e9_2);
        self.g.twin_edges(e1_2, e9_1);
        self.g.twin_edges(e3_1, e4_2);
        self.g.twin_edges(e3_2, e4_1);
        self.g.twin_edges(e6_1, e7_2);
        self.g.twin_edges(e6_2, e7_1);
    }

    // PUBLIC API

    /// Insert a point site; `p` must lie strictly inside the working
    /// radius. The returned handle anchors later segment insertions.
    pub fn insert_point_site(&mut self, p: DVec2) -> Result<PointHandle, Error> {
        self.insert_point_site_stepped(p, u32::MAX).map(|h| {
            h.expect("unstepped insertion cannot halt early")
        })
    }

    /// Debugging variant of [`Self::insert_point_site`]: halt after
    /// `step` internal phases and return `None`, leaving the diagram
    /// mid-surgery for inspection.
    pub fn insert_point_site_stepped(
        &mut self,
        p: DVec2,
        step: u32,
    ) -> Result<Option<PointHandle>, Error> {
        if p.length() >= self.far_radius {
            return Err(Error::InputOutOfRange {
                x: p.x,
                y: p.y,
                far_radius: self.far_radius,
            });
        }
        self.scratch.reset();
        self.num_psites += 1;
        let mut current_step = 1;

        let new_vert = self
            .g
            .add_vertex(VoronoiVertex::new(p, VertexStatus::Out, VertexType::Pointsite));
        let handle = self.g[new_vert].index;
        self.vertex_map.insert(handle, new_vert);
        let new_site = Site::Point(PointSite::new(p));
        debug!(handle, x = p.x, y = p.y, "insert_point_site");

        let closest = self
            .grid
            .grid_find_closest_face(p)
            .ok_or(Error::TopologyViolation("face grid is empty"))?;
        let v_seed = self.find_seed_vertex(closest, &new_site)?;
        self.mark_vertex(v_seed, &new_site);
        if step == current_step {
            return Ok(None);
        }
        current_step += 1;

        self.augment_vertex_set(&new_site);
        if step == current_step {
            return Ok(None);
        }
        current_step += 1;

        self.add_vertices(&new_site)?;
        if step == current_step {
            return Ok(None);
        }
        current_step += 1;

        let newface = self.add_face(new_site);
        self.g[new_vert].face = Some(newface);
        for f in self.scratch.incident_faces.clone() {
            self.add_edges(newface, f, None)?;
        }
        if step == current_step {
            return Ok(None);
        }
        current_step += 1;

        self.repair_face(newface)?;
        self.remove_vertex_set();
        if step == current_step {
            return Ok(None);
        }

        self.reset_status();
        debug_assert!(checker::face_ok(&self.g, newface).is_ok());
        debug_assert!(checker::is_valid(self).is_ok());
        Ok(Some(PointHandle(handle)))
    }

    /// Insert the line segment between two previously inserted point
    /// sites. Segments must not cross each other; sharing endpoints is
    /// fine.
    pub fn insert_line_site(&mut self, a: PointHandle, b: PointHandle) -> Result<(), Error> {
        self.insert_line_site_stepped(a, b, u32::MAX).map(|done| {
            debug_assert!(done, "unstepped insertion cannot halt early");
        })
    }

    /// Debugging variant of [`Self::insert_line_site`]: halt after
    /// `step` internal phases and return `false`, leaving the diagram
    /// mid-surgery for inspection.
    #[allow(clippy::too_many_lines)]
    pub fn insert_line_site_stepped(
        &mut self,
        a: PointHandle,
        b: PointHandle,
        step: u32,
    ) -> Result<bool, Error> {
        let (start, end) = self.find_endpoints(a, b)?;
        self.scratch.reset();
        self.num_lsites += 1;
        let mut current_step = 1;

        debug!(
            start = self.g[start].index,
            end = self.g[end].index,
            "insert_line_site"
        );

        // A point left of src → trg decides which offset side becomes
        // the k=+1 face.
        let src_se = self.g[start].position;
        let trg_se = self.g[end].position;
        let left = src_se.midpoint(trg_se) + (trg_se - src_se).perp();
        let linesite_k_sign = is_right(left, src_se, trg_se);

        self.g[start].status = VertexStatus::Out;
        self.g[end].status = VertexStatus::Out;
        self.g[start].zero_dist();
        self.g[end].zero_dist();

        let nf_start = self.find_null_face(start, end, left)?;
        let nf_end = self.find_null_face(end, start, left)?;

        // Consumed by repair_face to keep it off null-face cycles.
        self.scratch.null_face1 = Some(nf_start.null_face);
        self.scratch.null_face2 = Some(nf_end.null_face);
        self.scratch.segment_start = Some(nf_start.seg);
        self.scratch.segment_end = Some(nf_end.seg);

        let start_null_edge = self.g[nf_start.null_face]
            .edge
            .ok_or(Error::TopologyViolation("null face has no edge"))?;
        let end_null_edge = self.g[nf_end.null_face]
            .edge
            .ok_or(Error::TopologyViolation("null face has no edge"))?;
        if step == current_step {
            return Ok(false);
        }
        current_step += 1;

        let (pos_face, neg_face) =
            self.add_linesite_edges(nf_start.seg, nf_end.seg, linesite_k_sign);

        // The faces where separators land; they belong to the point
        // sites at the endpoints.
        let start_face = self.find_pointsite_face(start_null_edge);
        let end_face = self.find_pointsite_face(end_null_edge);
        if step == current_step {
            return Ok(false);
        }
        current_step += 1;

        let pos_site = self.g[pos_face]
            .site
            .ok_or(Error::TopologyViolation("line-site face without site"))?;
        let v_seed = self.find_seed_vertex(start_face, &pos_site)?;
        trace!(seed = self.g[v_seed].index, "segment seed");
        self.mark_vertex(v_seed, &pos_site);

        // Now safe to point the contracted face into the null-face
        // cycle; doing it earlier would derail find_seed_vertex.
        if let Some(zf) = self.scratch.zero_point_face {
            self.g[zf].edge = Some(start_null_edge);
        }
        if step == current_step {
            return Ok(false);
        }
        current_step += 1;

        self.augment_vertex_set(&pos_site);
        if step == current_step {
            return Ok(false);
        }
        current_step += 1;

        self.add_vertices(&pos_site)?;
        if step == current_step {
            return Ok(false);
        }
        current_step += 1;

        // Find both start-side targets before installing either
        // separator; installing rewires the face under the search.
        let pos_start_target = self.find_separator_target(start_face, nf_start.pos_sep)?;
        let neg_start_target = self.find_separator_target(start_face, nf_start.neg_sep)?;

        self.add_separator(
            start_face,
            nf_start.null_face,
            pos_start_target,
            nf_start.pos_sep,
            pos_face,
            neg_face,
        )?;
        if step == current_step {
            return Ok(false);
        }
        current_step += 1;

        self.add_separator(
            start_face,
            nf_start.null_face,
            neg_start_target,
            nf_start.neg_sep,
            pos_face,
            neg_face,
        )?;
        self.g[start_face].status = FaceStatus::Nonincident;
        debug_assert!(checker::face_ok(&self.g, start_face).is_ok());
        if step == current_step {
            return Ok(false);
        }
        current_step += 1;

        let pos_end_target = self.find_separator_target(end_face, nf_end.pos_sep)?;
        let neg_end_target = self.find_separator_target(end_face, nf_end.neg_sep)?;
        self.add_separator(
            end_face,
            nf_end.null_face,
            pos_end_target,
            nf_end.pos_sep,
            pos_face,
            neg_face,
        )?;
        if step == current_step {
            return Ok(false);
        }
        current_step += 1;

        self.add_separator(
            end_face,
            nf_end.null_face,
            neg_end_target,
            nf_end.neg_sep,
            pos_face,
            neg_face,
        )?;
        self.g[end_face].status = FaceStatus::Nonincident;
        debug_assert!(checker::face_ok(&self.g, end_face).is_ok());
        if step == current_step {
            return Ok(false);
        }
        current_step += 1;

        // Endpoint faces are done; every other incident face is split in
        // two by a NEW-NEW edge.
        for f in self.scratch.incident_faces.clone() {
            if self.g[f].status == FaceStatus::Incident {
                self.add_edges(pos_face, f, Some(neg_face))?;
            }
        }
        if step == current_step {
            return Ok(false);
        }
        current_step += 1;

        self.remove_vertex_set();
        self.repair_face(pos_face)?;
        debug_assert!(checker::face_ok(&self.g, pos_face).is_ok());
        self.repair_face(neg_face)?;
        debug_assert!(checker::face_ok(&self.g, neg_face).is_ok());
        if step == current_step {
            return Ok(false);
        }

        for f in self.scratch.incident_faces.clone() {
            self.remove_split_vertex(f)?;
        }

        // A contracted point-site face must stop answering nearest-face
        // queries; its region now belongs to the segment.
        if let Some(zf) = self.scratch.zero_point_face
            && let Some(site) = self.g[zf].site
            && site.is_point()
        {
            self.grid.remove_face(zf, site.position());
        }

        self.reset_status();
        debug_assert!(checker::face_ok(&self.g, nf_start.null_face).is_ok());
        debug_assert!(checker::face_ok(&self.g, nf_end.null_face).is_ok());
        debug_assert!(checker::is_valid(self).is_ok());
        Ok(true)
    }

    /// Validate the full diagram; pure, callable any number of times.
    #[must_use]
    pub fn check(&self) -> bool {
        match checker::is_valid(self) {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "diagram check failed");
                false
            }
        }
    }

    // Statistics

    #[must_use]
    pub fn num_vertices(&self) -> usize {
        self.g.num_vertices()
    }

    #[must_use]
    pub fn num_edges(&self) -> usize {
        self.g.num_edges()
    }

    #[must_use]
    pub fn num_faces(&self) -> usize {
        self.g.num_faces()
    }

    /// Point sites, including the three initial far generators.
    #[must_use]
    pub const fn num_point_sites(&self) -> usize {
        self.num_psites
    }

    #[must_use]
    pub const fn num_line_sites(&self) -> usize {
        self.num_lsites
    }

    /// Transient SPLIT vertices currently in the graph; zero between
    /// insertions.
    #[must_use]
    pub fn num_split_vertices(&self) -> usize {
        self.g
            .vertices()
            .filter(|(_, v)| v.kind == VertexType::Split)
            .count()
    }

    /// Read-only access to the underlying half-edge graph.
    #[must_use]
    pub const fn graph(&self) -> &HalfEdgeGraph {
        &self.g
    }

    #[must_use]
    pub const fn far_radius(&self) -> f64 {
        self.far_radius
    }

    /// Resolve a point handle to its graph vertex.
    #[must_use]
    pub fn vertex_of(&self, h: PointHandle) -> Option<VertexIdx> {
        self.vertex_map.get(&h.0).copied()
    }

    // SEED SELECTION AND GROWTH

    /// On face `f`, the NORMAL non-OUT vertex with the most negative
    /// clearance violation against the new site.
    fn find_seed_vertex(&self, f: FaceIdx, site: &Site) -> Result<VertexIdx, Error> {
        let mut min_pred = 0.0;
        let mut minimal: Option<VertexIdx> = None;
        let mut first = true;
        for e in self.g.face_edges(f) {
            let q = self.g[e].target;
            let vq = &self.g[q];
            if vq.status != VertexStatus::Out && vq.kind == VertexType::Normal {
                let h = vq.in_circle(site.apex_point(vq.position));
                if first || (h < min_pred && site.in_region(vq.position)) {
                    min_pred = h;
                    minimal = Some(q);
                    first = false;
                }
            }
        }
        if min_pred < 0.0 {
            Ok(minimal.expect("negative predicate implies a candidate"))
        } else {
            Err(Error::SeedNotFound)
        }
    }

    /// Mark `v` IN, mark its faces incident, and enqueue its UNDECIDED
    /// neighbors weighted by their in-circle violation.
    fn mark_vertex(&mut self, v: VertexIdx, site: &Site) {
        self.g[v].status = VertexStatus::In;
        self.scratch.v0.push(v);
        self.scratch.modified_vertices.insert(v);

        if site.is_point() {
            self.mark_adjacent_faces_p(v);
        } else {
            self.mark_adjacent_faces(v, site);
        }

        for e in self.g.out_edges(v) {
            let w = self.g[e].target;
            if self.g[w].status == VertexStatus::Undecided && !self.g[w].in_queue {
                let h = self.g[w].in_circle(site.apex_point(self.g[w].position));
                self.scratch.seq += 1;
                self.scratch.queue.push(QueuedVertex {
                    vertex: w,
                    h,
                    seq: self.scratch.seq,
                });
                self.g[w].in_queue = true;
                trace!(vertex = self.g[w].index, h, "queued");
            }
        }
    }

    /// Point-site variant: the faces of the out-edges.
    fn mark_adjacent_faces_p(&mut self, v: VertexIdx) {
        for e in self.g.out_edges(v) {
            if let Some(f) = self.g[e].face
                && self.g[f].status != FaceStatus::Incident
            {
                self.g[f].status = FaceStatus::Incident;
                self.scratch.incident_faces.push(f);
            }
        }
    }

    /// Line-site variant: each newly incident face first receives SPLIT
    /// vertices so the growing tree cannot close a loop through it.
    fn mark_adjacent_faces(&mut self, v: VertexIdx, site: &Site) {
        let adjacent = self.g.adjacent_faces(v);
        debug_assert!(
            match self.g[v].kind {
                VertexType::Apex | VertexType::Split => adjacent.len() == 2,
                _ => adjacent.len() == 3,
            },
            "unexpected face count around IN vertex"
        );
        for f in adjacent {
            if self.g[f].status != FaceStatus::Incident {
                if site.is_line() {
                    self.add_split_vertex(f, site);
                }
                self.g[f].status = FaceStatus::Incident;
                self.scratch.incident_faces.push(f);
            }
        }
    }

    /// Grow the IN tree by weighted breadth-first search. A popped vertex
    /// with `h < 0` joins the tree unless C4 (two IN neighbors would
    /// close a cycle), C5 (per-face connectedness) or the site's region
    /// test vetoes it.
    fn augment_vertex_set(&mut self, site: &Site) {
        while let Some(qv) = self.scratch.queue.pop() {
            let v = qv.vertex;
            debug_assert_eq!(self.g[v].status, VertexStatus::Undecided);
            if qv.h < 0.0 {
                if self.predicate_c4(v)
                    || !self.predicate_c5(v)
                    || !site.in_region(self.g[v].position)
                {
                    self.g[v].status = VertexStatus::Out;
                    trace!(vertex = self.g[v].index, h = qv.h, "marked OUT (topology)");
                } else {
                    self.mark_vertex(v, site);
                    trace!(vertex = self.g[v].index, h = qv.h, "marked IN");
                }
            } else {
                self.g[v].status = VertexStatus::Out;
                trace!(vertex = self.g[v].index, h = qv.h, "marked OUT (in_circle)");
            }
            self.scratch.modified_vertices.insert(v);
        }
    }

    /// C4: would marking `v` IN give it two or more IN neighbors?
    fn predicate_c4(&self, v: VertexIdx) -> bool {
        let mut in_count = 0;
        for e in self.g.out_edges(v) {
            if self.g[self.g[e].target].status == VertexStatus::In {
                in_count += 1;
                if in_count >= 2 {
                    return true;
                }
            }
        }
        false
    }

    /// C5: on every incident face adjacent to `v`, `v` must neighbor an
    /// IN vertex of that face, or an ENDPOINT/APEX/SPLIT vertex.
    fn predicate_c5(&self, v: VertexIdx) -> bool {
        if matches!(self.g[v].kind, VertexType::Apex | VertexType::Split) {
            return true;
        }
        let mut adjacent_incident: SmallVec<[FaceIdx; 4]> = SmallVec::new();
        for e in self.g.out_edges(v) {
            if let Some(f) = self.g[e].face
                && self.g[f].status == FaceStatus::Incident
                && !adjacent_incident.contains(&f)
            {
                adjacent_incident.push(f);
            }
        }
        debug_assert!(!adjacent_incident.is_empty());

        for f in adjacent_incident {
            let mut face_ok = false;
            for e in self.g.face_edges(f) {
                let w = self.g[e].target;
                if w == v {
                    continue;
                }
                if self.g[w].status == VertexStatus::In && self.g.has_edge(w, v) {
                    face_ok = true;
                    break;
                }
                if matches!(
                    self.g[w].kind,
                    VertexType::Endpoint | VertexType::Apex | VertexType::Split
                ) {
                    face_ok = true;
                    break;
                }
            }
            if !face_ok {
                return false;
            }
        }
        true
    }

    // NEW VERTEX GENERATION

    /// All edges from an IN vertex to an OUT vertex.
    fn find_in_out_edges(&self) -> Vec<EdgeIdx> {
        debug_assert!(!self.scratch.v0.is_empty());
        let mut out = Vec::new();
        for &v in &self.scratch.v0 {
            debug_assert_eq!(self.g[v].status, VertexStatus::In);
            for e in self.g.out_edges(v) {
                if self.g[self.g[e].target].status == VertexStatus::Out {
                    out.push(e);
                }
            }
        }
        debug_assert!(!out.is_empty());
        out
    }

    /// Place a NEW vertex on every IN-OUT edge, positioned against the
    /// new site.
    fn add_vertices(&mut self, new_site: &Site) -> Result<(), Error> {
        for e in self.find_in_out_edges() {
            let sol =
                positioner::position(&self.g, e, new_site).ok_or(Error::PositionFailed)?;
            let err = positioner::dist_error(&sol, new_site);
            if err > POSITION_TOLERANCE {
                warn!(
                    src = self.g[self.g[e].source].index,
                    trg = self.g[self.g[e].target].index,
                    residual = err,
                    "positioner residual above tolerance"
                );
            }
            let q = self.g.add_vertex(VoronoiVertex::with_dist(
                sol.p,
                VertexStatus::New,
                VertexType::Normal,
                new_site.apex_point(sol.p),
            ));
            self.g[q].k3 = sol.k3;
            self.scratch.modified_vertices.insert(q);
            self.g.add_vertex_in_edge(q, e);
            trace!(vertex = self.g[q].index, t = sol.t, k3 = sol.k3, "NEW vertex");
        }
        Ok(())
    }

    /// Allocate the face dual to a new site; point-site faces register
    /// with the grid.
    fn add_face(&mut self, mut site: Site) -> FaceIdx {
        let newface = self.g.add_face();
        site.set_face(newface);
        if site.is_point() {
            self.grid.add_face(newface, site.position());
        }
        self.g[newface].site = Some(site);
        self.g[newface].status = FaceStatus::Nonincident;
        newface
    }

    // NEW-NEW EDGE INSTALLATION - splitting incident faces

    /// NEW vertices on `f` that are not separator points; always even,
    /// one NEW-NEW edge per pair.
    fn num_new_vertices(&self, f: FaceIdx) -> usize {
        self.g
            .face_edges(f)
            .iter()
            .filter(|&&e| {
                let v = &self.g[self.g[e].target];
                v.status == VertexStatus::New && v.kind != VertexType::Seppoint
            })
            .count()
    }

    /// Split face `f` into `f` and the new face(s) by adding one NEW-NEW
    /// edge per NEW pair. `newface` is the `k=+1` side; `newface2` the
    /// `k=-1` side, present only for line sites.
    fn add_edges(
        &mut self,
        newface: FaceIdx,
        f: FaceIdx,
        newface2: Option<FaceIdx>,
    ) -> Result<(), Error> {
        let new_count = self.num_new_vertices(f);
        trace!(face = f.0, new_count, "add_edges");
        debug_assert!(new_count > 0);
        debug_assert_eq!(new_count % 2, 0);
        let new_pairs = new_count / 2;
        let mut startverts: Vec<VertexIdx> = Vec::new();
        for _ in 0..new_pairs {
            let ed = self.find_edge_data(f, &startverts)?;
            startverts.push(ed.v1);
            self.add_edge(ed, newface, newface2)?;
        }
        Ok(())
    }

    /// Locate the `OUT-NEW(v1)-IN-...-IN-NEW(v2)-OUT` pattern on `f`,
    /// skipping v1 candidates already consumed by earlier pairs.
    fn find_edge_data(&self, f: FaceIdx, startverts: &[VertexIdx]) -> Result<EdgeData, Error> {
        let start_edge = self.g[f]
            .edge
            .ok_or(Error::TopologyViolation("face has no representative edge"))?;

        // v1: a NEW vertex entered from OUT territory, or flanking a
        // segment endpoint.
        let mut current_edge = start_edge;
        let mut v1_data: Option<(VertexIdx, EdgeIdx, EdgeIdx)> = None;
        loop {
            let next_edge = self.g[current_edge]
                .next
                .ok_or(Error::TopologyViolation("face cycle has unset next"))?;
            let previous_vertex = self.g[current_edge].source;
            let current_vertex = self.g[current_edge].target;
            let next_vertex = self.g[next_edge].target;

            let cv = &self.g[current_vertex];
            if cv.status == VertexStatus::New && cv.kind != VertexType::Seppoint {
                let prev_ok = matches!(
                    self.g[previous_vertex].status,
                    VertexStatus::Out | VertexStatus::Undecided
                ) && Some(previous_vertex) != self.scratch.segment_start
                    && Some(previous_vertex) != self.scratch.segment_end;
                let next_ok = self.g[next_vertex].kind == VertexType::Endpoint
                    && (Some(next_vertex) == self.scratch.segment_start
                        || Some(next_vertex) == self.scratch.segment_end);
                if (prev_ok || next_ok) && !startverts.contains(&current_vertex) {
                    v1_data = Some((current_vertex, current_edge, next_edge));
                }
            }
            current_edge = next_edge;
            if current_edge == start_edge || v1_data.is_some() {
                break;
            }
        }
        let (v1, v1_prv, v1_nxt) =
            v1_data.ok_or(Error::TopologyViolation("no OUT-NEW-IN vertex on face"))?;

        // v2: the next NEW vertex along the cycle.
        let v2_start = current_edge;
        let mut v2_data: Option<(VertexIdx, EdgeIdx, EdgeIdx)> = None;
        loop {
            let current_vertex = self.g[current_edge].target;
            let cv = &self.g[current_vertex];
            if cv.status == VertexStatus::New
                && cv.kind != VertexType::Seppoint
                && current_vertex != v1
            {
                let next_edge = self.g[current_edge]
                    .next
                    .ok_or(Error::TopologyViolation("face cycle has unset next"))?;
                v2_data = Some((current_vertex, current_edge, next_edge));
            }
            current_edge = self.g[current_edge]
                .next
                .ok_or(Error::TopologyViolation("face cycle has unset next"))?;
            if current_edge == v2_start || v2_data.is_some() {
                break;
            }
        }
        let (v2, v2_prv, v2_nxt) =
            v2_data.ok_or(Error::TopologyViolation("no IN-NEW-OUT vertex on face"))?;

        trace!(
            v1 = self.g[v1].index,
            v2 = self.g[v2].index,
            "NEW-NEW vertex pair"
        );
        Ok(EdgeData {
            f,
            v1,
            v1_prv,
            v1_nxt,
            v2,
            v2_prv,
            v2_nxt,
        })
    }

    /// Install one NEW-NEW edge, with an apex split when the two NEW
    /// vertices straddle the apex of the `(f.site, new_site)` bisector.
    #[allow(clippy::too_many_lines, clippy::similar_names)]
    fn add_edge(
        &mut self,
        ed: EdgeData,
        newface: FaceIdx,
        newface2: Option<FaceIdx>,
    ) -> Result<(), Error> {
        let new_previous = ed.v1_prv;
        let new_source = ed.v1;
        let twin_next = ed.v1_nxt;
        let twin_previous = ed.v2_prv;
        let new_target = ed.v2;
        let new_next = ed.v2_nxt;
        let f = ed.f;

        let f_site = self.g[f]
            .site
            .ok_or(Error::TopologyViolation("incident face without site"))?;
        let (new_face, new_site) = if self.g[new_source].k3 == 1 {
            (newface, self.g[newface].site)
        } else {
            let nf2 = newface2.ok_or(Error::TopologyViolation(
                "negative-offset vertex without negative face",
            ))?;
            (nf2, self.g[nf2].site)
        };
        let new_site =
            new_site.ok_or(Error::TopologyViolation("new face without site"))?;

        debug_assert_eq!(self.g[new_target].k3, self.g[new_source].k3);

        // Apex split is needed when source and target sit on opposite
        // sides of the bisector's axis.
        let src_pos = self.g[new_source].position;
        let trg_pos = self.g[new_target].position;
        let (src_sign, trg_sign) = if f_site.is_point() && new_site.is_line() {
            let pt1 = f_site.position();
            let pt2 = new_site.apex_point(pt1);
            (is_right(src_pos, pt1, pt2), is_right(trg_pos, pt1, pt2))
        } else if f_site.is_point() && new_site.is_point() {
            (
                is_right(src_pos, f_site.position(), new_site.position()),
                is_right(trg_pos, f_site.position(), new_site.position()),
            )
        } else if f_site.is_line() && new_site.is_line() {
            // Line-line bisectors have no square root, hence no apex.
            // Away from the endpoints both NEW vertices must lie on the
            // in-region side of each site.
            #[cfg(debug_assertions)]
            {
                if src_pos != trg_pos
                    && src_pos != f_site.start()
                    && src_pos != f_site.end()
                    && trg_pos != f_site.start()
                    && trg_pos != f_site.end()
                    && (src_pos - f_site.apex_point(src_pos)).length() > 1e-3
                    && (trg_pos - f_site.apex_point(trg_pos)).length() > 1e-3
                {
                    debug_assert!(!is_right(src_pos, f_site.start(), f_site.end()));
                    debug_assert!(!is_right(trg_pos, f_site.start(), f_site.end()));
                    debug_assert!(!is_right(src_pos, new_site.start(), new_site.end()));
                    debug_assert!(!is_right(trg_pos, new_site.start(), new_site.end()));
                }
            }
            (true, true)
        } else {
            // Point insertion into a line-site face is not part of the
            // supported insertion order.
            return Err(Error::TopologyViolation(
                "point site inserted into a line-site face",
            ));
        };

        if src_sign == trg_sign {
            // Single edge: new_previous -> e_new -> new_next on f, and
            // twin_previous -> e_twin -> twin_next on the new face.
            let (e_new, e_twin) = self.g.add_twin_edges(new_source, new_target);
            self.g[e_new].next = Some(new_next);
            debug_assert_eq!(self.g[new_next].k, self.g[new_previous].k);
            self.g[e_new].k = self.g[new_next].k;
            self.g[e_new].face = Some(f);
            self.g[new_previous].next = Some(e_new);
            self.g[f].edge = Some(e_new);
            self.g[e_new].bisector = Some(Bisector::new(&f_site, &new_site, !src_sign));

            self.g[twin_previous].next = Some(e_twin);
            self.g[e_twin].next = Some(twin_next);
            self.g[e_twin].k = self.g[new_source].k3;
            self.g[e_twin].bisector = Some(Bisector::new(&new_site, &f_site, src_sign));
            self.g[e_twin].face = Some(new_face);
            self.g[new_face].edge = Some(e_twin);
        } else {
            // Apex split:
            //                       f               f
            //   new_prv -> NEW -- e1 ----> APEX --e2 ---> NEW -> new_nxt
            //   twn_nxt <- NEW <- e1_tw -- APEX <-e2_tw-- NEW <- twn_prv
            let apex = self
                .g
                .add_vertex(VoronoiVertex::new(DVec2::ZERO, VertexStatus::New, VertexType::Apex));
            let (e1, e1_tw) = self.g.add_twin_edges(new_source, apex);
            let (e2, e2_tw) = self.g.add_twin_edges(apex, new_target);
            self.g[e1].bisector = Some(Bisector::new(&f_site, &new_site, !src_sign));
            self.g[e2].bisector = Some(Bisector::new(&f_site, &new_site, !trg_sign));

            debug_assert_eq!(self.g[new_previous].face, Some(f));
            debug_assert_eq!(self.g[new_next].face, Some(f));
            debug_assert_eq!(self.g[new_next].k, self.g[new_previous].k);
            let k = self.g[new_next].k;
            self.g.set_next_chain(&[new_previous, e1, e2, new_next], f, k);

            self.g[e1_tw].bisector = Some(Bisector::new(&new_site, &f_site, src_sign));
            self.g[e2_tw].bisector = Some(Bisector::new(&new_site, &f_site, trg_sign));
            debug_assert_eq!(self.g[twin_previous].k, self.g[twin_next].k);
            debug_assert_eq!(self.g[twin_previous].face, self.g[twin_next].face);
            self.g.link_chain(&[twin_previous, e2_tw, e1_tw, twin_next]);

            let k3 = self.g[new_source].k3;
            self.g[e1_tw].k = k3;
            self.g[e2_tw].k = k3;
            self.g[new_face].edge = Some(e1_tw);
            self.g[e1_tw].face = Some(new_face);
            self.g[e2_tw].face = Some(new_face);

            let min_t = self.g[e1]
                .bisector
                .as_ref()
                .expect("bisector set above")
                .minimum_t();
            let apex_pos = self.g[e1].point(min_t);
            self.g[apex].position = apex_pos;
            let apex_dist_pt = f_site.apex_point(apex_pos);
            self.g[apex].init_dist(apex_dist_pt);
            self.scratch.modified_vertices.insert(apex);
            trace!(apex = self.g[apex].index, min_t, "apex split");
        }
        Ok(())
    }

    // SEPARATORS - wiring null-faces into the surrounding faces

    /// Find the NEW vertex on `f` that the separator from `endp` must
    /// connect to: the one with matching `k3` inside an OUT-NEW-IN or
    /// IN-NEW-OUT triple.
    fn find_separator_target(
        &self,
        f: FaceIdx,
        endp: Option<VertexIdx>,
    ) -> Result<Option<SepTarget>, Error> {
        let Some(endp) = endp else {
            return Ok(None);
        };
        let start_edge = self.g[f]
            .edge
            .ok_or(Error::TopologyViolation("face has no representative edge"))?;
        let mut current_edge = start_edge;
        loop {
            let next_edge = self.g[current_edge]
                .next
                .ok_or(Error::TopologyViolation("face cycle has unset next"))?;
            let previous_vertex = self.g[current_edge].source;
            let current_vertex = self.g[current_edge].target;
            let next_vertex = self.g[next_edge].target;

            let out_new_in = self.g[previous_vertex].status == VertexStatus::Out
                && self.g[current_vertex].status == VertexStatus::New
                && self.g[next_vertex].status == VertexStatus::In;
            let in_new_out = self.g[previous_vertex].status == VertexStatus::In
                && self.g[current_vertex].status == VertexStatus::New
                && self.g[next_vertex].status == VertexStatus::Out;
            if (out_new_in || in_new_out)
                && self.g[endp].k3 == self.g[current_vertex].k3
                && endp != current_vertex
            {
                return Ok(Some(SepTarget {
                    prev: current_edge,
                    target: current_vertex,
                    next: next_edge,
                    out_new_in,
                }));
            }
            current_edge = next_edge;
            if current_edge == start_edge {
                return Err(Error::TopologyViolation("no separator target on face"));
            }
        }
    }

    /// Install the SEPARATOR twin pair from `sep_endp` to its target,
    /// splicing the null-face boundary into the point-site face `f` and
    /// the matching offset face of the new segment.
    fn add_separator(
        &mut self,
        f: FaceIdx,
        null_face: FaceIdx,
        target: Option<SepTarget>,
        sep_endp: Option<VertexIdx>,
        pos_face: FaceIdx,
        neg_face: FaceIdx,
    ) -> Result<(), Error> {
        let Some(sep_endp) = sep_endp else {
            return Ok(());
        };
        let target =
            target.ok_or(Error::TopologyViolation("separator endpoint without target"))?;
        debug_assert!(self.g[sep_endp].k3 == 1 || self.g[sep_endp].k3 == -1);

        let (endp_next_tw, endp_prev_tw) = self.find_next_prev(null_face, sep_endp)?;
        // The halves on the point-site side of the null-face boundary.
        let endp_prev = self.g[endp_next_tw]
            .twin
            .ok_or(Error::TopologyViolation("null edge without twin"))?;
        let endp_next = self.g[endp_prev_tw]
            .twin
            .ok_or(Error::TopologyViolation("null edge without twin"))?;

        let v_target = target.target;
        debug_assert_eq!(self.g[sep_endp].k3, self.g[v_target].k3);
        #[cfg(debug_assertions)]
        {
            let tp = self.g[v_target].position;
            for lf in [pos_face, neg_face] {
                if let Some(s) = self.g[lf].site {
                    debug_assert!(s.in_region(tp));
                }
            }
        }

        let (e2, e2_tw) = self.g.add_twin_edges(sep_endp, v_target);
        self.g[e2].kind = EdgeType::Separator;
        self.g[e2_tw].kind = EdgeType::Separator;

        if target.out_new_in {
            // e2 runs on the segment side, its twin on the point side.
            self.g[e2].k = self.g[v_target].k3;
            self.g[e2_tw].k = 1;
            self.g[e2_tw].face = Some(f);
            self.g[f].edge = Some(e2_tw);
            self.g[endp_prev].k = self.g[e2].k;

            let sep_face = if self.g[e2].k == -1 { neg_face } else { pos_face };
            self.g[e2].face = Some(sep_face);
            self.g[sep_face].edge = Some(e2);
            self.g[endp_prev].face = Some(sep_face);

            self.g.set_next(target.prev, e2_tw);
            self.g.set_next(e2_tw, endp_next);

            self.g[endp_next].face = Some(f);
            self.g[endp_next].k = 1;

            self.g.set_next(e2, target.next);
        } else {
            // Mirror image: e2 on the point side, its twin on the
            // segment side.
            self.g[e2].k = 1;
            self.g[e2_tw].k = self.g[v_target].k3;
            self.g[e2].face = Some(f);
            self.g[f].edge = Some(e2);
            self.g[endp_next].k = self.g[e2_tw].k;

            let sep_face = if self.g[e2_tw].k == -1 { neg_face } else { pos_face };
            self.g[e2_tw].face = Some(sep_face);
            self.g[sep_face].edge = Some(e2_tw);
            self.g[endp_next].face = Some(sep_face);

            self.g.set_next(target.prev, e2_tw);
            self.g[endp_prev].face = Some(f);
            self.g[endp_prev].k = 1;

            self.g.set_next(endp_prev, e2);
            self.g.set_next(e2, target.next);
        }

        let bis = Bisector::separator(self.g[sep_endp].position, self.g[v_target].position);
        self.g[e2].bisector = Some(bis.clone());
        self.g[e2_tw].bisector = Some(bis);
        trace!(
            endp = self.g[sep_endp].index,
            target = self.g[v_target].index,
            "separator added"
        );
        Ok(())
    }

    /// On the null-face cycle, the edge leaving `endp` and the edge
    /// arriving at it.
    fn find_next_prev(
        &self,
        null_face: FaceIdx,
        endp: VertexIdx,
    ) -> Result<(EdgeIdx, EdgeIdx), Error> {
        let mut next_edge = None;
        let mut prev_edge = None;
        for e in self.g.face_edges(null_face) {
            if self.g[e].source == endp {
                next_edge = Some(e);
            }
            if self.g[e].target == endp {
                prev_edge = Some(e);
            }
        }
        match (next_edge, prev_edge) {
            (Some(n), Some(p)) => Ok((n, p)),
            _ => Err(Error::TopologyViolation("vertex not on null face")),
        }
    }

    // NULL FACES - endpoint resolution

    fn find_endpoints(
        &self,
        a: PointHandle,
        b: PointHandle,
    ) -> Result<(VertexIdx, VertexIdx), Error> {
        let start = *self
            .vertex_map
            .get(&a.0)
            .ok_or(Error::UnknownHandle(a.0))?;
        let end = *self.vertex_map.get(&b.0).ok_or(Error::UnknownHandle(b.0))?;
        if start == end || self.g[start].position == self.g[end].position {
            return Err(Error::CoincidentEndpoints);
        }
        Ok((start, end))
    }

    /// Resolve the null-face at `start` for a segment running toward
    /// `other`: create a fresh triangular null-face on first touch, or
    /// splice the new segment endpoint into the existing one.
    fn find_null_face(
        &mut self,
        start: VertexIdx,
        other: VertexIdx,
        left: DVec2,
    ) -> Result<NullFaceData, Error> {
        let start_pos = self.g[start].position;
        let dir = self.g[other].position - start_pos;
        let alfa = diangle_v(dir);
        let k3_sign = is_right(left, start_pos, self.g[other].position);

        if let Some(null_face) = self.g[start].null_face {
            // Existing null-face: insert the new segment endpoint into
            // the edge whose alfa bracket contains the segment direction,
            // then make room toward both separator positions.
            let seg = self
                .g
                .add_vertex(VoronoiVertex::new(start_pos, VertexStatus::Out, VertexType::Endpoint));
            self.g[seg].zero_dist();
            self.g[seg].set_alfa(dir);

            let mut insert_edge = None;
            for e in self.g.face_edges(null_face) {
                let src = self.g[e].source;
                let trg = self.g[e].target;
                if diangle_bracket(self.g[src].alfa, alfa, self.g[trg].alfa) {
                    insert_edge = Some(e);
                    break;
                }
            }
            let insert_edge = insert_edge.ok_or(Error::TopologyViolation(
                "no null-face bracket for segment direction",
            ))?;
            self.g.add_vertex_in_edge(seg, insert_edge);

            let (next_edge, prev_edge) = self.find_next_prev(null_face, seg)?;
            debug_assert_eq!(self.g[prev_edge].next, Some(next_edge));
            let neg_sep = self.process_next_null(dir, next_edge, k3_sign)?;
            let pos_sep = self.process_prev_null(dir, prev_edge, k3_sign)?;
            Ok(NullFaceData {
                seg,
                null_face,
                pos_sep,
                neg_sep,
            })
        } else {
            // Fresh null-face: neg_sep -> seg -> pos_sep, three
            // coincident vertices at the endpoint with distinct alfa.
            let null_face = self.g.add_face();
            let seg = self
                .g
                .add_vertex(VoronoiVertex::new(start_pos, VertexStatus::Out, VertexType::Endpoint));
            self.g[seg].zero_dist();
            self.g[seg].set_alfa(dir);
            self.g[seg].k3 = 0;
            let pos_sep = self
                .g
                .add_vertex(VoronoiVertex::new(start_pos, VertexStatus::Out, VertexType::Seppoint));
            let neg_sep = self
                .g
                .add_vertex(VoronoiVertex::new(start_pos, VertexStatus::Out, VertexType::Seppoint));
            self.g[pos_sep].zero_dist();
            self.g[neg_sep].zero_dist();

            if k3_sign {
                self.g[pos_sep].k3 = 1;
                self.g[neg_sep].k3 = -1;
            } else {
                self.g[pos_sep].k3 = -1;
                self.g[neg_sep].k3 = 1;
            }
            self.g[pos_sep].set_alfa(dir.perp());
            self.g[neg_sep].set_alfa(-dir.perp());

            let (e1, e1_tw) = self.g.add_twin_edges(seg, pos_sep);
            let (e2, e2_tw) = self.g.add_twin_edges(pos_sep, neg_sep);
            let (e3, e3_tw) = self.g.add_twin_edges(neg_sep, seg);

            // e1 -> e2 -> e3 bound the null-face; the twin cycle sits on
            // the endpoint's point-site face until separators splice it
            // in. Re-anchoring start_face must not move its
            // representative edge off the main cycle.
            self.g.set_next_cycle(&[e1, e2, e3], null_face, 1);
            let start_face = self.g[start]
                .face
                .ok_or(Error::TopologyViolation("endpoint has no point-site face"))?;
            let start_face_edge = self.g[start_face].edge;
            self.g.set_next_cycle(&[e3_tw, e2_tw, e1_tw], start_face, 1);
            self.g[null_face].edge = Some(e1);
            self.g[start_face].edge = start_face_edge;

            for e in [e1, e2, e3, e1_tw, e2_tw, e3_tw] {
                self.g[e].kind = EdgeType::Nulledge;
            }
            self.g[start].null_face = Some(null_face);
            Ok(NullFaceData {
                seg,
                null_face,
                pos_sep: Some(pos_sep),
                neg_sep: Some(neg_sep),
            })
        }
    }

    /// Walk the null edge leaving the new segment endpoint CCW and make
    /// room for the negative-side separator: insert a SEPPOINT if its
    /// bracket allows, reuse an identical one, or push the neighbor
    /// vertex aside.
    #[allow(clippy::float_cmp)]
    fn process_next_null(
        &mut self,
        dir: DVec2,
        next_edge: EdgeIdx,
        k3_sign: bool,
    ) -> Result<Option<VertexIdx>, Error> {
        let trg = self.g[next_edge].target;
        let src = self.g[next_edge].source;
        debug_assert_eq!(self.g[src].kind, VertexType::Endpoint);

        let neg_sep_dir = dir.perp();
        let neg_sep_alfa = diangle_v(neg_sep_dir);

        if self.g[trg].kind == VertexType::Endpoint {
            // Two segment endpoints back to back never leave room for a
            // separator between them.
            if diangle_bracket(self.g[src].alfa, neg_sep_alfa, self.g[trg].alfa) {
                return Err(Error::TopologyViolation(
                    "separator room between adjacent endpoints",
                ));
            }
            let mid = diangle_mid(self.g[src].alfa, self.g[trg].alfa);
            let new_v = self.g.add_vertex(VoronoiVertex::new(
                self.g[src].position,
                VertexStatus::New,
                VertexType::Normal,
            ));
            self.g[new_v].alfa = mid;
            self.scratch.modified_vertices.insert(new_v);
            self.g.add_vertex_in_edge(new_v, next_edge);
            self.g[new_v].k3 = if k3_sign { 1 } else { -1 };
            return Ok(None);
        }

        if neg_sep_alfa == self.g[trg].alfa && self.g[trg].kind == VertexType::Seppoint {
            // Identical separator direction: reuse the existing
            // SEPPOINT. The point-site face behind the old separator is
            // contracted away.
            debug!("identical SEPPOINT, reusing separator");
            self.reuse_separator(trg)?;
            return Ok(None);
        }

        let twin = self.g[next_edge]
            .twin
            .ok_or(Error::TopologyViolation("null edge without twin"))?;
        let next_face = self.g[twin]
            .face
            .ok_or(Error::TopologyViolation("null edge twin without face"))?;
        let next_is_point = self.g[next_face].site.is_some_and(|s| s.is_point());

        if diangle_bracket(self.g[src].alfa, neg_sep_alfa, self.g[trg].alfa) && next_is_point {
            let sep = self.add_sep_point(src, next_edge, neg_sep_dir);
            self.g[sep].k3 = if k3_sign { 1 } else { -1 };
            Ok(Some(sep))
        } else {
            // No room: push the neighbor vertex along and convert it,
            // to a SEPPOINT when the midpoint clears the separator
            // position, to a plain NEW vertex otherwise.
            let next_next = self.g[next_edge]
                .next
                .ok_or(Error::TopologyViolation("null face cycle has unset next"))?;
            let next_trg = self.g[next_next].target;
            let mid = diangle_mid(self.g[src].alfa, self.g[next_trg].alfa);

            let sep = if diangle_bracket(neg_sep_alfa, mid, self.g[next_trg].alfa) {
                self.g[trg].alfa = neg_sep_alfa;
                self.g[trg].kind = VertexType::Seppoint;
                self.g[trg].status = VertexStatus::New;
                Some(trg)
            } else {
                self.g[trg].alfa = mid;
                self.g[trg].kind = VertexType::Normal;
                self.g[trg].status = VertexStatus::New;
                None
            };
            self.g[trg].k3 = if k3_sign { 1 } else { -1 };
            self.scratch.modified_vertices.insert(trg);
            Ok(sep)
        }
    }

    /// Mirror of [`Self::process_next_null`] for the edge arriving at
    /// the new segment endpoint, making room for the positive-side
    /// separator.
    #[allow(clippy::float_cmp)]
    fn process_prev_null(
        &mut self,
        dir: DVec2,
        prev_edge: EdgeIdx,
        k3_sign: bool,
    ) -> Result<Option<VertexIdx>, Error> {
        let trg = self.g[prev_edge].target;
        let src = self.g[prev_edge].source;
        debug_assert_eq!(self.g[trg].kind, VertexType::Endpoint);

        let pos_sep_dir = -dir.perp();
        let pos_sep_alfa = diangle_v(pos_sep_dir);

        if self.g[src].kind == VertexType::Endpoint {
            if diangle_bracket(self.g[src].alfa, pos_sep_alfa, self.g[trg].alfa) {
                return Err(Error::TopologyViolation(
                    "separator room between adjacent endpoints",
                ));
            }
            let mid = diangle_mid(self.g[src].alfa, self.g[trg].alfa);
            let new_v = self.g.add_vertex(VoronoiVertex::new(
                self.g[src].position,
                VertexStatus::New,
                VertexType::Normal,
            ));
            self.g[new_v].alfa = mid;
            self.scratch.modified_vertices.insert(new_v);
            self.g.add_vertex_in_edge(new_v, prev_edge);
            self.g[new_v].k3 = if k3_sign { -1 } else { 1 };
            return Ok(None);
        }

        if pos_sep_alfa == self.g[src].alfa && self.g[src].kind == VertexType::Seppoint {
            debug!("identical SEPPOINT, reusing separator");
            self.reuse_separator(src)?;
            return Ok(None);
        }

        if diangle_bracket(self.g[src].alfa, pos_sep_alfa, self.g[trg].alfa) {
            let sep = self.add_sep_point(src, prev_edge, pos_sep_dir);
            self.g[sep].k3 = if k3_sign { -1 } else { 1 };
            Ok(Some(sep))
        } else {
            let prev_prev = self.g.previous_edge(prev_edge);
            let prev_src = self.g[prev_prev].source;
            let mid = diangle_mid(self.g[prev_src].alfa, self.g[trg].alfa);

            let sep = if diangle_bracket(mid, pos_sep_alfa, self.g[trg].alfa) {
                self.g[src].alfa = pos_sep_alfa;
                self.g[src].kind = VertexType::Seppoint;
                self.g[src].status = VertexStatus::New;
                Some(src)
            } else {
                self.g[src].alfa = mid;
                self.g[src].kind = VertexType::Normal;
                self.g[src].status = VertexStatus::New;
                None
            };
            self.g[src].k3 = if k3_sign { -1 } else { 1 };
            self.scratch.modified_vertices.insert(src);
            Ok(sep)
        }
    }

    /// Reuse an existing SEPPOINT whose direction matches the new
    /// separator exactly: mark the old separator's far endpoint NEW and
    /// record the point-site face that will be contracted.
    fn reuse_separator(&mut self, seppoint: VertexIdx) -> Result<(), Error> {
        let sep_edge = self
            .g
            .out_edges(seppoint)
            .into_iter()
            .find(|&e| self.g[e].kind == EdgeType::Separator)
            .ok_or(Error::TopologyViolation("SEPPOINT without separator edge"))?;
        let sep_twin = self.g[sep_edge]
            .twin
            .ok_or(Error::TopologyViolation("separator without twin"))?;

        let mut pointsite_edge = None;
        for e in [sep_edge, sep_twin] {
            let f = self.g[e]
                .face
                .ok_or(Error::TopologyViolation("separator without face"))?;
            if self.g[f].site.is_some_and(|s| s.is_point()) {
                pointsite_edge = Some(e);
            }
        }
        let pe = pointsite_edge.ok_or(Error::TopologyViolation(
            "reused separator borders no point-site face",
        ))?;
        self.scratch.zero_point_face = self.g[pe].face;

        let sep_target = self.g[sep_edge].target;
        self.g[sep_target].status = VertexStatus::New;
        self.scratch.modified_vertices.insert(sep_target);
        Ok(())
    }

    /// Insert a SEPPOINT into a null edge, oriented along `sep_dir`.
    fn add_sep_point(&mut self, endp: VertexIdx, edge: EdgeIdx, sep_dir: DVec2) -> VertexIdx {
        let sep = self.g.add_vertex(VoronoiVertex::new(
            self.g[endp].position,
            VertexStatus::Out,
            VertexType::Seppoint,
        ));
        self.g[sep].set_alfa(sep_dir);
        self.g.add_vertex_in_edge(sep, edge);
        trace!(sep = self.g[sep].index, "separator point added");
        sep
    }

    /// Create the positive and negative line sites, their LINESITE twin
    /// pair, and the two offset faces.
    fn add_linesite_edges(
        &mut self,
        seg_start: VertexIdx,
        seg_end: VertexIdx,
        linesite_k_sign: bool,
    ) -> (FaceIdx, FaceIdx) {
        let sp = self.g[seg_start].position;
        let ep = self.g[seg_end].position;
        let (pos_site, neg_site, pos_edge, neg_edge);
        if linesite_k_sign {
            pos_site = Site::Line(LineSite::new(sp, ep, 1));
            neg_site = Site::Line(LineSite::new(ep, sp, -1));
            let (p, n) = self.g.add_twin_edges(seg_start, seg_end);
            pos_edge = p;
            neg_edge = n;
        } else {
            pos_site = Site::Line(LineSite::new(ep, sp, 1));
            neg_site = Site::Line(LineSite::new(sp, ep, -1));
            let (p, n) = self.g.add_twin_edges(seg_end, seg_start);
            pos_edge = p;
            neg_edge = n;
        }
        self.g[pos_edge].kind = EdgeType::Linesite;
        self.g[neg_edge].kind = EdgeType::Linesite;
        self.g[pos_edge].k = 1;
        self.g[neg_edge].k = -1;

        let pos_face = self.add_face(pos_site);
        let neg_face = self.add_face(neg_site);
        self.g[pos_face].edge = Some(pos_edge);
        self.g[neg_face].edge = Some(neg_edge);
        self.g[pos_edge].face = Some(pos_face);
        self.g[neg_edge].face = Some(neg_face);
        (pos_face, neg_face)
    }

    /// Walk a null-face and return the adjacent face belonging to a
    /// point site; falls back to the first twin face.
    fn find_pointsite_face(&self, start_edge: EdgeIdx) -> FaceIdx {
        let mut start_face = self.g[self.g[start_edge].twin.expect("null edge has twin")]
            .face
            .expect("null edge twin has face");
        let mut current = start_edge;
        loop {
            let twin = self.g[current].twin.expect("null edge has twin");
            if let Some(twin_face) = self.g[twin].face
                && self.g[twin_face].site.is_some_and(|s| s.is_point())
            {
                start_face = twin_face;
            }
            current = self.g[current].next.expect("null face cycle has next");
            if current == start_edge {
                break;
            }
        }
        start_face
    }

    // SPLIT VERTICES - loop prevention on elongated faces

    /// Edges of `f` whose endpoints lie on opposite sides of the
    /// `pt1 → pt2` line.
    fn find_split_edges(&self, f: FaceIdx, pt1: DVec2, pt2: DVec2) -> Vec<EdgeIdx> {
        let mut out = Vec::new();
        for e in self.g.face_edges(f) {
            let src = self.g[e].source;
            let trg = self.g[e].target;
            if !matches!(
                self.g[src].kind,
                VertexType::Normal | VertexType::Apex | VertexType::Split
            ) {
                continue;
            }
            let src_is_right = is_right(self.g[src].position, pt1, pt2);
            let trg_is_right = is_right(self.g[trg].position, pt1, pt2);
            if src_is_right != trg_is_right {
                out.push(e);
            }
        }
        out
    }

    /// Insert SPLIT vertices where the new line site's perpendicular
    /// through `f`'s point crosses the face boundary. Placed before the
    /// face is marked incident, removed again after repair.
    fn add_split_vertex(&mut self, f: FaceIdx, s: &Site) {
        if s.is_point() {
            return;
        }
        let Some(fs) = self.g[f].site else {
            return;
        };
        if fs.is_point() && (fs.position() == s.start() || fs.position() == s.end()) {
            // Endpoint faces are handled by separators, not splits.
            return;
        }
        if !(fs.is_point() && s.in_region(fs.position())) {
            return;
        }

        let pt1 = fs.position();
        let Site::Line(line) = s else { unreachable!() };
        let pt2 = pt1 - DVec2::new(line.a, line.b);
        debug_assert!((pt1 - pt2).length() > 0.0);

        for split_edge in self.find_split_edges(f, pt1, pt2) {
            if matches!(
                self.g[split_edge].kind,
                EdgeType::Separator | EdgeType::Linesite
            ) {
                return;
            }
            // The clearance interval of the edge must bracket the
            // crossing; otherwise no split is needed here.
            let Some(split_pos) = positioner::split_point(&self.g, split_edge, pt1, pt2) else {
                return;
            };
            let v = self.g.add_vertex(VoronoiVertex::with_dist(
                split_pos,
                VertexStatus::Undecided,
                VertexType::Split,
                fs.position(),
            ));
            self.g.add_vertex_in_edge(v, split_edge);
            trace!(split = self.g[v].index, face = f.0, "split vertex added");
        }
    }

    fn find_split_vertex(&self, f: FaceIdx) -> Option<VertexIdx> {
        self.g
            .face_vertices(f)
            .into_iter()
            .find(|&q| self.g[q].kind == VertexType::Split)
    }

    /// Remove every SPLIT vertex remaining on `f` after repair.
    fn remove_split_vertex(&mut self, f: FaceIdx) -> Result<(), Error> {
        while let Some(v) = self.find_split_vertex(f) {
            self.scratch.modified_vertices.remove(&v);
            if !self.g.remove_deg2_vertex(v) {
                return Err(Error::TopologyViolation("split vertex is not degree-2"));
            }
        }
        Ok(())
    }

    // FACE REPAIR AND CLEANUP

    /// Re-link the next-pointers around `f` by walking it and, at each
    /// vertex, picking the outgoing edge that continues the face: a NEW,
    /// ENDPOINT or SEPPOINT target on the same face. Null edges between
    /// endpoint-structure vertices and anything attributed to a
    /// contracted face are captured into `f` on the way.
    fn repair_face(&mut self, f: FaceIdx) -> Result<(), Error> {
        let start_edge = self.g[f]
            .edge
            .ok_or(Error::TopologyViolation("face has no representative edge"))?;
        let mut current_edge = start_edge;
        let mut steps = 0usize;
        loop {
            let current_target = self.g[current_edge].target;
            let current_source = self.g[current_edge].source;
            let mut found_next_edge = false;

            for e in self.g.out_edges(current_target) {
                let out_target = self.g[e].target;
                if out_target == current_source {
                    continue;
                }
                if !(self.g[out_target].status == VertexStatus::New
                    || self.g[out_target].kind == VertexType::Endpoint
                    || self.g[out_target].kind == VertexType::Seppoint)
                {
                    continue;
                }

                // Face re-attribution overrides: a single null edge
                // bridging the endpoint structure (but never one of the
                // current null-faces), or anything on the contracted
                // face.
                let null_override = self.g[e].kind == EdgeType::Nulledge
                    && self.g[current_edge].kind != EdgeType::Nulledge
                    && ((self.g[current_target].kind == VertexType::Seppoint
                        && self.g[out_target].kind == VertexType::Endpoint)
                        || (self.g[current_source].kind == VertexType::Endpoint
                            && self.g[current_target].kind == VertexType::Endpoint)
                        || Some(out_target) == self.scratch.segment_start
                        || Some(out_target) == self.scratch.segment_end)
                    && self.g[e].face != self.scratch.null_face1
                    && self.g[e].face != self.scratch.null_face2;
                let zero_override = self.scratch.zero_point_face.is_some()
                    && self.g[e].face == self.scratch.zero_point_face;
                if null_override || zero_override {
                    let k = self.g[current_edge].k;
                    self.g[e].face = Some(f);
                    self.g[e].k = k;
                }

                if self.g[e].face == Some(f) {
                    self.g[current_edge].next = Some(e);
                    found_next_edge = true;
                    debug_assert_eq!(self.g[current_edge].k, self.g[e].k);
                }
            }
            if !found_next_edge {
                return Err(Error::TopologyViolation("face repair found no next edge"));
            }

            current_edge = self.g[current_edge]
                .next
                .ok_or(Error::TopologyViolation("face cycle has unset next"))?;
            steps += 1;
            if steps > self.g.num_edges() + 1 {
                return Err(Error::TopologyViolation("face repair does not close"));
            }
            if current_edge == start_edge {
                break;
            }
        }
        Ok(())
    }

    /// Delete the IN tree and every edge incident to it.
    fn remove_vertex_set(&mut self) {
        let v0 = std::mem::take(&mut self.scratch.v0);
        for v in v0 {
            debug_assert_eq!(self.g[v].status, VertexStatus::In);
            self.g.delete_vertex(v);
            self.scratch.modified_vertices.remove(&v);
        }
    }

    /// Reset all touched vertices and faces so the next insertion starts
    /// clean.
    fn reset_status(&mut self) {
        for v in std::mem::take(&mut self.scratch.modified_vertices) {
            self.g[v].reset();
        }
        for f in std::mem::take(&mut self.scratch.incident_faces) {
            self.g[f].status = FaceStatus::Nonincident;
        }
        self.scratch.v0.clear();
    }
}

impl std::fmt::Display for VoronoiDiagram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "VoronoiDiagram")?;
        writeln!(f, " num_vertices    = {}", self.num_vertices())?;
        writeln!(f, " num_edges       = {}", self.num_edges())?;
        writeln!(f, " num_point_sites = {}", self.num_point_sites())?;
        writeln!(f, " num_line_sites  = {}", self.num_line_sites())
    }
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn apex_count(vd: &VoronoiDiagram) -> usize {
        vd.graph()
            .vertices()
            .filter(|(_, v)| v.kind == VertexType::Apex)
            .count()
    }

    #[test]
    fn test_initial_diagram() {
        let vd = VoronoiDiagram::new(100.0, 10);
        // Origin vertex, three outer vertices, three generator markers,
        // three apex vertices.
        assert_eq!(vd.num_vertices(), 10);
        assert_eq!(vd.num_edges(), 15);
        assert_eq!(vd.num_faces(), 3);
        assert_eq!(vd.num_point_sites(), 3);
        assert_eq!(vd.num_line_sites(), 0);
        assert!(vd.check());
    }

    #[test]
    fn test_insert_three_points() {
        let mut vd = VoronoiDiagram::new(100.0, 10);
        let h1 = vd.insert_point_site(DVec2::new(1.0, 0.0)).unwrap();
        let h2 = vd.insert_point_site(DVec2::new(-1.0, 0.0)).unwrap();
        let h3 = vd.insert_point_site(DVec2::new(0.0, 1.0)).unwrap();
        assert_ne!(h1, h2);
        assert_ne!(h2, h3);
        assert_eq!(vd.num_point_sites(), 6);
        assert!(vd.check());
        // Each inserted site owns exactly one face.
        for h in [h1, h2, h3] {
            let v = vd.vertex_of(h).unwrap();
            let f = vd.graph()[v].face.unwrap();
            assert!(vd.graph()[f].site.unwrap().is_point());
            assert!(vd.graph().face_edges(f).len() >= 3);
        }
    }

    #[test]
    fn test_point_near_bisector_of_pair() {
        let mut vd = VoronoiDiagram::new(100.0, 10);
        vd.insert_point_site(DVec2::new(0.0, 0.0)).unwrap();
        vd.insert_point_site(DVec2::new(1.0, 0.0)).unwrap();
        let h3 = vd.insert_point_site(DVec2::new(0.5, 0.01)).unwrap();
        assert!(vd.check());
        let v3 = vd.vertex_of(h3).unwrap();
        let f3 = vd.graph()[v3].face.unwrap();
        assert!(vd.graph().face_edges(f3).len() >= 3);
        // All transient state is gone.
        assert_eq!(vd.num_split_vertices(), 0);
        for (_, v) in vd.graph().vertices() {
            assert_ne!(v.status, VertexStatus::In);
            assert_ne!(v.status, VertexStatus::New);
        }
    }

    #[test]
    fn test_point_on_far_circle_rejected() {
        let mut vd = VoronoiDiagram::new(100.0, 10);
        let err = vd.insert_point_site(DVec2::new(100.0, 0.0)).unwrap_err();
        assert!(matches!(err, Error::InputOutOfRange { .. }));
        let err = vd.insert_point_site(DVec2::new(0.0, -250.0)).unwrap_err();
        assert!(matches!(err, Error::InputOutOfRange { .. }));
        // A rejected point does not disturb the diagram.
        assert!(vd.check());
    }

    #[test]
    fn test_unknown_and_coincident_handles() {
        let mut vd = VoronoiDiagram::new(100.0, 10);
        let h = vd.insert_point_site(DVec2::new(1.0, 1.0)).unwrap();
        assert!(matches!(
            vd.insert_line_site(h, PointHandle(9999)),
            Err(Error::UnknownHandle(9999))
        ));
        assert!(matches!(
            vd.insert_line_site(h, h),
            Err(Error::CoincidentEndpoints)
        ));
    }

    #[test]
    fn test_insertion_order_independence() {
        let points = [
            DVec2::new(1.0, 0.0),
            DVec2::new(-1.0, 0.0),
            DVec2::new(0.0, 1.0),
        ];
        let mut vd1 = VoronoiDiagram::new(100.0, 10);
        for p in points {
            vd1.insert_point_site(p).unwrap();
        }
        let mut vd2 = VoronoiDiagram::new(100.0, 10);
        for p in points.iter().rev() {
            vd2.insert_point_site(*p).unwrap();
        }
        assert!(vd1.check());
        assert!(vd2.check());
        assert_eq!(vd1.num_vertices(), vd2.num_vertices());
        assert_eq!(vd1.num_edges(), vd2.num_edges());
        assert_eq!(vd1.num_faces(), vd2.num_faces());
    }

    #[test]
    fn test_check_is_idempotent() {
        let mut vd = VoronoiDiagram::new(50.0, 8);
        vd.insert_point_site(DVec2::new(3.0, 4.0)).unwrap();
        let n = vd.num_vertices();
        assert!(vd.check());
        assert!(vd.check());
        // A pure predicate: the diagram is untouched.
        assert_eq!(vd.num_vertices(), n);
    }

    #[test]
    fn test_random_points() {
        let mut vd = VoronoiDiagram::new(100.0, 16);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..12 {
            let p = DVec2::new(rng.random_range(-50.0..50.0), rng.random_range(-50.0..50.0));
            vd.insert_point_site(p).unwrap();
        }
        assert_eq!(vd.num_point_sites(), 15);
        assert!(vd.check());
    }

    #[test]
    fn test_stepped_point_insertion_halts() {
        let mut vd = VoronoiDiagram::new(100.0, 10);
        // Halting after the first phase leaves the diagram mid-surgery.
        let halted = vd
            .insert_point_site_stepped(DVec2::new(2.0, 3.0), 1)
            .unwrap();
        assert!(halted.is_none());
    }

    #[test]
    fn test_single_segment() {
        let mut vd = VoronoiDiagram::new(100.0, 10);
        let a = vd.insert_point_site(DVec2::new(-10.0, 0.0)).unwrap();
        let b = vd.insert_point_site(DVec2::new(10.0, 0.0)).unwrap();
        vd.insert_line_site(a, b).unwrap();

        assert_eq!(vd.num_line_sites(), 1);
        assert_eq!(vd.num_split_vertices(), 0);
        assert!(vd.check());

        // One null-face of three NULLEDGEs per endpoint, plus the two
        // offset faces of the segment.
        let mut null_faces = 0;
        let mut line_faces = 0;
        for (f, face) in vd.graph().faces() {
            match &face.site {
                None => {
                    null_faces += 1;
                    let edges = vd.graph().face_edges(f);
                    assert_eq!(edges.len(), 3);
                    for e in edges {
                        assert_eq!(vd.graph()[e].kind, EdgeType::Nulledge);
                    }
                }
                Some(site) if site.is_line() => line_faces += 1,
                Some(_) => {}
            }
        }
        assert_eq!(null_faces, 2);
        assert_eq!(line_faces, 2);

        // Both endpoints own their null-face.
        for h in [a, b] {
            let v = vd.vertex_of(h).unwrap();
            assert!(vd.graph()[v].null_face.is_some());
        }

        // The offset faces carry k = +1 and k = -1 respectively.
        let ks: Vec<i8> = vd
            .graph()
            .faces()
            .filter(|(_, face)| face.site.is_some_and(|s| s.is_line()))
            .map(|(f, _)| {
                let e = vd.graph()[f].edge.unwrap();
                vd.graph()[e].k
            })
            .collect();
        assert!(ks.contains(&1));
        assert!(ks.contains(&-1));
    }

    #[test]
    fn test_segment_apex_split_against_point() {
        let mut vd = VoronoiDiagram::new(100.0, 10);
        let a = vd.insert_point_site(DVec2::new(-10.0, 0.0)).unwrap();
        let b = vd.insert_point_site(DVec2::new(10.0, 0.0)).unwrap();
        vd.insert_point_site(DVec2::new(0.0, 15.0)).unwrap();
        vd.insert_line_site(a, b).unwrap();

        assert!(vd.check());
        assert!(apex_count(&vd) > 0);
        // The point-line bisector between (0,15) and the segment has its
        // apex halfway between the point and the line.
        let expected = DVec2::new(0.0, 7.5);
        let found = vd.graph().vertices().any(|(_, v)| {
            v.kind == VertexType::Apex && (v.position - expected).length() < 1e-6
        });
        assert!(found, "no apex vertex at the point-line bisector minimum");
    }

    #[test]
    fn test_polyline_corner() {
        // Two perpendicular segments sharing an endpoint: the second
        // insertion augments the shared null-face instead of recreating
        // it.
        let mut vd = VoronoiDiagram::new(100.0, 10);
        let a = vd.insert_point_site(DVec2::new(-10.0, 0.0)).unwrap();
        let b = vd.insert_point_site(DVec2::new(0.0, 0.0)).unwrap();
        let c = vd.insert_point_site(DVec2::new(0.0, 10.0)).unwrap();
        vd.insert_line_site(a, b).unwrap();

        let vb = vd.vertex_of(b).unwrap();
        let nf = vd.graph()[vb].null_face.unwrap();

        vd.insert_line_site(b, c).unwrap();
        assert_eq!(vd.num_line_sites(), 2);
        assert_eq!(vd.graph()[vb].null_face, Some(nf));
        assert!(vd.graph().face_edges(nf).len() > 3);
        assert!(vd.check());
    }

    #[test]
    fn test_two_collinear_segments() {
        // Collinear segments sharing an endpoint: the shared endpoint's
        // separators are reused and its point-site face is contracted.
        let mut vd = VoronoiDiagram::new(100.0, 10);
        let a = vd.insert_point_site(DVec2::new(-10.0, 0.0)).unwrap();
        let b = vd.insert_point_site(DVec2::new(0.0, 0.0)).unwrap();
        let c = vd.insert_point_site(DVec2::new(10.0, 0.0)).unwrap();
        vd.insert_line_site(a, b).unwrap();

        let vb = vd.vertex_of(b).unwrap();
        let nf = vd.graph()[vb].null_face.unwrap();

        vd.insert_line_site(b, c).unwrap();
        assert_eq!(vd.num_line_sites(), 2);
        // Augmented, not recreated: two ENDPOINTs now share the face.
        assert_eq!(vd.graph()[vb].null_face, Some(nf));
        let endpoints = vd
            .graph()
            .face_vertices(nf)
            .iter()
            .filter(|&&v| vd.graph()[v].kind == VertexType::Endpoint)
            .count();
        assert_eq!(endpoints, 2);
        assert_eq!(vd.num_split_vertices(), 0);
    }

    #[test]
    fn test_display_summary() {
        let vd = VoronoiDiagram::new(100.0, 10);
        let s = vd.to_string();
        assert!(s.contains("num_point_sites = 3"));
        assert!(s.contains("num_vertices    = 10"));
    }
}
