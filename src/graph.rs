//! Half-edge graph: vertices, directed edges, faces.
//!
//! Storage follows the sparse-arena design: three parallel `Vec<Option<T>>`
//! arenas with free lists for O(1) slot reuse, addressed by typed indices.
//! `twin`/`next`/`face` links are indices, never owning references, so the
//! inherently cyclic planar structure stays representable.
//!
//! All mutators are local (O(degree) or O(face size)); nothing here walks
//! the whole graph. Per-vertex out-edge lists are kept exact under every
//! mutation, which is what makes `out_edges`, `adjacent_faces` and
//! `delete_vertex` cheap.

use glam::DVec2;
use smallvec::SmallVec;

use crate::bisector::Bisector;
use crate::numeric::diangle_v;
use crate::site::Site;

// TYPE-SAFE INDICES - Prevent mixing up different index types at compile time

/// Index into the vertex arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexIdx(pub usize);

/// Index into the edge arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeIdx(pub usize);

/// Index into the face arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FaceIdx(pub usize);

// ATTRIBUTE MODEL

/// Role of a vertex during one insertion cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VertexStatus {
    /// Not yet examined by the current insertion.
    Undecided,
    /// Belongs to the deletion tree of the current insertion.
    In,
    /// Survives the current insertion.
    Out,
    /// Freshly created on an IN-OUT edge during the current insertion.
    New,
}

/// Structural role of a vertex.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VertexType {
    /// Boundary vertex of the initial far triangle.
    Outer,
    /// Ordinary Voronoi vertex.
    Normal,
    /// Marker vertex at a point-site position.
    Pointsite,
    /// Segment endpoint on a null-face.
    Endpoint,
    /// Separator endpoint on a null-face.
    Seppoint,
    /// Minimum-clearance point of a bisector.
    Apex,
    /// Transient subdivision point preventing deletion loops.
    Split,
}

/// Kind of a half-edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeType {
    /// Bisector edge.
    Line,
    /// Outer boundary edge of the initial triangle (no twin).
    Outedge,
    /// Edge running along a line-segment site.
    Linesite,
    /// Zero-length transition from a null-face SEPPOINT.
    Separator,
    /// Edge of a degenerate null-face.
    Nulledge,
}

/// Whether a face touches the deletion region of the current insertion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaceStatus {
    Incident,
    Nonincident,
}

/// A Voronoi vertex.
#[derive(Clone, Debug)]
pub struct VoronoiVertex {
    pub position: DVec2,
    pub status: VertexStatus,
    pub kind: VertexType,
    /// Clearance: distance to the vertex's nearest defining site(s).
    dist: f64,
    /// Diamond angle in `[0, 8)` ordering this vertex around a null-face;
    /// negative until assigned.
    pub alfa: f64,
    /// Offset side of a line site this vertex belongs to (`0` = unset).
    pub k3: i8,
    /// Already enqueued in the current growth pass.
    pub in_queue: bool,
    /// Stable external handle, assigned at allocation.
    pub index: usize,
    /// For POINTSITE vertices: the face dual to the site.
    pub face: Option<FaceIdx>,
    /// For POINTSITE vertices touched by segments: the endpoint null-face.
    pub null_face: Option<FaceIdx>,
    out_edges: SmallVec<[EdgeIdx; 8]>,
}

impl VoronoiVertex {
    #[must_use]
    pub fn new(position: DVec2, status: VertexStatus, kind: VertexType) -> Self {
        Self {
            position,
            status,
            kind,
            dist: 0.0,
            alfa: -1.0,
            k3: 0,
            in_queue: false,
            index: usize::MAX,
            face: None,
            null_face: None,
            out_edges: SmallVec::new(),
        }
    }

    /// Vertex whose clearance is initialized as the distance to `site_pt`.
    #[must_use]
    pub fn with_dist(position: DVec2, status: VertexStatus, kind: VertexType, site_pt: DVec2) -> Self {
        let mut v = Self::new(position, status, kind);
        v.init_dist(site_pt);
        v
    }

    /// Clearance to the nearest defining site(s).
    #[inline]
    #[must_use]
    pub const fn dist(&self) -> f64 {
        self.dist
    }

    pub fn init_dist(&mut self, site_pt: DVec2) {
        self.dist = (self.position - site_pt).length();
    }

    pub const fn zero_dist(&mut self) {
        self.dist = 0.0;
    }

    /// Signed clearance-disk violation: negative when `q` lies strictly
    /// inside the disk of radius `dist` around this vertex, meaning the
    /// vertex must be removed when a site reaches `q`.
    #[inline]
    #[must_use]
    pub fn in_circle(&self, q: DVec2) -> f64 {
        (self.position - q).length() - self.dist
    }

    pub fn set_alfa(&mut self, dir: DVec2) {
        self.alfa = diangle_v(dir);
    }

    /// Back to a clean state for the next insertion.
    pub const fn reset(&mut self) {
        self.status = VertexStatus::Undecided;
        self.in_queue = false;
    }
}

/// A directed half-edge.
#[derive(Clone, Debug)]
pub struct VoronoiEdge {
    pub source: VertexIdx,
    pub target: VertexIdx,
    /// Opposite half-edge; `None` only on the three outermost boundary
    /// edges.
    pub twin: Option<EdgeIdx>,
    /// Next edge on the left face cycle.
    pub next: Option<EdgeIdx>,
    pub face: Option<FaceIdx>,
    pub kind: EdgeType,
    /// Offset side, `+1` for pure point-site bisectors.
    pub k: i8,
    /// Clearance-parametrized curve this edge runs along.
    pub bisector: Option<Bisector>,
}

impl VoronoiEdge {
    #[must_use]
    pub const fn new(source: VertexIdx, target: VertexIdx) -> Self {
        Self {
            source,
            target,
            twin: None,
            next: None,
            face: None,
            kind: EdgeType::Line,
            k: 1,
            bisector: None,
        }
    }

    /// Point on the edge's bisector at clearance `t`.
    ///
    /// # Panics
    /// Panics if the edge carries no bisector parametrization.
    #[must_use]
    pub fn point(&self, t: f64) -> DVec2 {
        self.bisector
            .as_ref()
            .expect("edge has no bisector parametrization")
            .point_at(t)
    }
}

/// A Voronoi face.
#[derive(Clone, Debug)]
pub struct VoronoiFace {
    /// Representative edge of the face cycle.
    pub edge: Option<EdgeIdx>,
    /// Dual site; `None` for null-faces.
    pub site: Option<Site>,
    pub status: FaceStatus,
}

impl VoronoiFace {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            edge: None,
            site: None,
            status: FaceStatus::Nonincident,
        }
    }
}

impl Default for VoronoiFace {
    fn default() -> Self {
        Self::new()
    }
}

// THE GRAPH

/// Planar half-edge graph backing the Voronoi diagram.
#[derive(Clone, Debug, Default)]
pub struct HalfEdgeGraph {
    vertices: Vec<Option<VoronoiVertex>>,
    edges: Vec<Option<VoronoiEdge>>,
    faces: Vec<Option<VoronoiFace>>,

    vertex_free_list: Vec<VertexIdx>,
    edge_free_list: Vec<EdgeIdx>,

    /// Running counter assigning stable `index` handles to vertices.
    vertex_index_count: usize,
}

/// Safety cap on face-cycle walks; a cycle longer than this means broken
/// next-pointers rather than a genuinely huge face.
const MAX_FACE_EDGES: usize = 100_000;

impl HalfEdgeGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Allocation

    pub fn add_vertex(&mut self, mut v: VoronoiVertex) -> VertexIdx {
        v.index = self.vertex_index_count;
        self.vertex_index_count += 1;
        if let Some(idx) = self.vertex_free_list.pop() {
            self.vertices[idx.0] = Some(v);
            idx
        } else {
            let idx = VertexIdx(self.vertices.len());
            self.vertices.push(Some(v));
            idx
        }
    }

    /// Create a single directed edge `u → v` with unset twin/next/face.
    pub fn add_edge(&mut self, u: VertexIdx, v: VertexIdx) -> EdgeIdx {
        let e = VoronoiEdge::new(u, v);
        let idx = if let Some(idx) = self.edge_free_list.pop() {
            self.edges[idx.0] = Some(e);
            idx
        } else {
            let idx = EdgeIdx(self.edges.len());
            self.edges.push(Some(e));
            idx
        };
        self[u].out_edges.push(idx);
        idx
    }

    /// Create the twin pair `u → v`, `v → u`. Face, next, k and kind are
    /// left for the caller.
    pub fn add_twin_edges(&mut self, u: VertexIdx, v: VertexIdx) -> (EdgeIdx, EdgeIdx) {
        let e = self.add_edge(u, v);
        let e_tw = self.add_edge(v, u);
        self.twin_edges(e, e_tw);
        (e, e_tw)
    }

    pub fn twin_edges(&mut self, e1: EdgeIdx, e2: EdgeIdx) {
        debug_assert_eq!(self[e1].source, self[e2].target);
        debug_assert_eq!(self[e1].target, self[e2].source);
        self[e1].twin = Some(e2);
        self[e2].twin = Some(e1);
    }

    pub fn add_face(&mut self) -> FaceIdx {
        let idx = FaceIdx(self.faces.len());
        self.faces.push(Some(VoronoiFace::new()));
        idx
    }

    // Accessors

    #[inline]
    #[must_use]
    pub fn vertex(&self, idx: VertexIdx) -> Option<&VoronoiVertex> {
        self.vertices.get(idx.0)?.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn edge(&self, idx: EdgeIdx) -> Option<&VoronoiEdge> {
        self.edges.get(idx.0)?.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn face(&self, idx: FaceIdx) -> Option<&VoronoiFace> {
        self.faces.get(idx.0)?.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn source(&self, e: EdgeIdx) -> VertexIdx {
        self[e].source
    }

    #[inline]
    #[must_use]
    pub fn target(&self, e: EdgeIdx) -> VertexIdx {
        self[e].target
    }

    // Counts over live slots

    #[must_use]
    pub fn num_vertices(&self) -> usize {
        self.vertices.iter().flatten().count()
    }

    #[must_use]
    pub fn num_edges(&self) -> usize {
        self.edges.iter().flatten().count()
    }

    #[must_use]
    pub fn num_faces(&self) -> usize {
        self.faces.iter().flatten().count()
    }

    // Iterators

    pub fn vertices(&self) -> impl Iterator<Item = (VertexIdx, &VoronoiVertex)> {
        self.vertices
            .iter()
            .enumerate()
            .filter_map(|(i, v)| Some((VertexIdx(i), v.as_ref()?)))
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeIdx, &VoronoiEdge)> {
        self.edges
            .iter()
            .enumerate()
            .filter_map(|(i, e)| Some((EdgeIdx(i), e.as_ref()?)))
    }

    pub fn faces(&self) -> impl Iterator<Item = (FaceIdx, &VoronoiFace)> {
        self.faces
            .iter()
            .enumerate()
            .filter_map(|(i, f)| Some((FaceIdx(i), f.as_ref()?)))
    }

    // Traversals

    /// Outgoing half-edges of `v`, cloned so callers may mutate the graph
    /// while iterating.
    #[must_use]
    pub fn out_edges(&self, v: VertexIdx) -> SmallVec<[EdgeIdx; 8]> {
        self[v].out_edges.clone()
    }

    #[must_use]
    pub fn degree(&self, v: VertexIdx) -> usize {
        self[v].out_edges.len()
    }

    /// Distinct faces incident to `v`.
    #[must_use]
    pub fn adjacent_faces(&self, v: VertexIdx) -> SmallVec<[FaceIdx; 4]> {
        let mut out: SmallVec<[FaceIdx; 4]> = SmallVec::new();
        for &e in &self[v].out_edges {
            if let Some(f) = self[e].face
                && !out.contains(&f)
            {
                out.push(f);
            }
        }
        out
    }

    /// Edges of the face cycle starting at `face.edge`.
    ///
    /// # Panics
    /// Panics if the cycle does not close within [`MAX_FACE_EDGES`] steps.
    #[must_use]
    pub fn face_edges(&self, f: FaceIdx) -> Vec<EdgeIdx> {
        let start = self[f].edge.expect("face has no representative edge");
        let mut out = Vec::new();
        let mut current = start;
        loop {
            out.push(current);
            assert!(out.len() <= MAX_FACE_EDGES, "face cycle does not close");
            current = self[current].next.expect("face cycle has unset next");
            if current == start {
                break;
            }
        }
        out
    }

    /// Vertices around the face, in cycle order.
    #[must_use]
    pub fn face_vertices(&self, f: FaceIdx) -> Vec<VertexIdx> {
        self.face_edges(f).iter().map(|&e| self[e].target).collect()
    }

    #[must_use]
    pub fn has_edge(&self, u: VertexIdx, v: VertexIdx) -> bool {
        self.edge_between(u, v).is_some()
    }

    #[must_use]
    pub fn edge_between(&self, u: VertexIdx, v: VertexIdx) -> Option<EdgeIdx> {
        self[u].out_edges.iter().copied().find(|&e| self[e].target == v)
    }

    /// The edge whose `next` is `e`, found by walking `e`'s face cycle.
    #[must_use]
    pub fn previous_edge(&self, e: EdgeIdx) -> EdgeIdx {
        let mut current = e;
        let mut steps = 0;
        loop {
            let next = self[current].next.expect("face cycle has unset next");
            if next == e {
                return current;
            }
            current = next;
            steps += 1;
            assert!(steps <= MAX_FACE_EDGES, "face cycle does not close");
        }
    }

    // Next-pointer wiring

    pub fn set_next(&mut self, e1: EdgeIdx, e2: EdgeIdx) {
        debug_assert_eq!(self[e1].target, self[e2].source);
        self[e1].next = Some(e2);
    }

    /// Wire `edges` into a closed cycle owned by `f` with offset `k`, and
    /// anchor `f` at the first edge.
    pub fn set_next_cycle(&mut self, edges: &[EdgeIdx], f: FaceIdx, k: i8) {
        for (i, &e) in edges.iter().enumerate() {
            let next = edges[(i + 1) % edges.len()];
            self.set_next(e, next);
            self[e].face = Some(f);
            self[e].k = k;
        }
        self[f].edge = Some(edges[0]);
    }

    /// Wire `edges` into an open chain owned by `f` with offset `k`, and
    /// anchor `f` at the first edge.
    pub fn set_next_chain(&mut self, edges: &[EdgeIdx], f: FaceIdx, k: i8) {
        for pair in edges.windows(2) {
            self.set_next(pair[0], pair[1]);
        }
        for &e in edges {
            self[e].face = Some(f);
            self[e].k = k;
        }
        self[f].edge = Some(edges[0]);
    }

    /// Wire consecutive next-pointers only; face and k are untouched.
    pub fn link_chain(&mut self, edges: &[EdgeIdx]) {
        for pair in edges.windows(2) {
            self.set_next(pair[0], pair[1]);
        }
    }

    // Structural surgery

    /// Split `e: u → v` (and its twin) at `w`, yielding `u → w → v` and
    /// `v → w → u`. Face, k, kind and bisector are preserved on every
    /// half; the original slots keep the `u → w` / `v → w` halves so face
    /// anchors stay valid. `w` ends up with degree 2 per side.
    pub fn add_vertex_in_edge(&mut self, w: VertexIdx, e: EdgeIdx) {
        let t = self[e].twin.expect("cannot split an edge without twin");
        let (u, v) = (self[e].source, self[e].target);
        debug_assert_eq!(self[t].source, v);

        // Second halves, cloned attributes included.
        let e2 = {
            let proto = self[e].clone();
            let idx = self.add_edge(w, v);
            let edge = &mut self[idx];
            edge.next = proto.next;
            edge.face = proto.face;
            edge.kind = proto.kind;
            edge.k = proto.k;
            edge.bisector = proto.bisector;
            idx
        };
        let t2 = {
            let proto = self[t].clone();
            let idx = self.add_edge(w, u);
            let edge = &mut self[idx];
            edge.next = proto.next;
            edge.face = proto.face;
            edge.kind = proto.kind;
            edge.k = proto.k;
            edge.bisector = proto.bisector;
            idx
        };

        self[e].target = w;
        self[e].next = Some(e2);
        self[t].target = w;
        self[t].next = Some(t2);

        self[e].twin = Some(t2);
        self[t2].twin = Some(e);
        self[t].twin = Some(e2);
        self[e2].twin = Some(t);
    }

    /// Remove a degree-2 vertex, merging its two half-edge pairs back into
    /// one. Inverse of [`Self::add_vertex_in_edge`]. Returns false (and
    /// leaves the graph untouched) if `w` is not degree-2.
    pub fn remove_deg2_vertex(&mut self, w: VertexIdx) -> bool {
        if self[w].out_edges.len() != 2 {
            return false;
        }
        let e_wx = self[w].out_edges[0];
        let e_wy = self[w].out_edges[1];
        let (Some(tw_xw), Some(tw_yw)) = (self[e_wx].twin, self[e_wy].twin) else {
            return false;
        };
        let x = self[e_wx].target;
        let y = self[e_wy].target;

        // One face runs y → w → x, the other x → w → y.
        debug_assert_eq!(self[tw_yw].next, Some(e_wx));
        debug_assert_eq!(self[tw_xw].next, Some(e_wy));
        debug_assert_eq!(self[tw_yw].face, self[e_wx].face);
        debug_assert_eq!(self[tw_xw].face, self[e_wy].face);

        self[tw_yw].target = x;
        self[tw_yw].next = self[e_wx].next;
        self[tw_xw].target = y;
        self[tw_xw].next = self[e_wy].next;
        self[tw_yw].twin = Some(tw_xw);
        self[tw_xw].twin = Some(tw_yw);

        // Re-anchor faces that pointed at a merged-away half.
        if let Some(f) = self[e_wx].face
            && self[f].edge == Some(e_wx)
        {
            self[f].edge = Some(tw_yw);
        }
        if let Some(f) = self[e_wy].face
            && self[f].edge == Some(e_wy)
        {
            self[f].edge = Some(tw_xw);
        }

        self.free_edge(e_wx);
        self.free_edge(e_wy);
        self.free_vertex(w);
        true
    }

    /// Remove `v` and every half-edge incident to it, on both sides.
    /// Next-pointers of surviving neighbors are left dangling; callers
    /// repair affected faces afterwards.
    pub fn delete_vertex(&mut self, v: VertexIdx) {
        let out: SmallVec<[EdgeIdx; 8]> = self[v].out_edges.clone();
        for e in out {
            if let Some(tw) = self[e].twin {
                let nbr = self[e].target;
                self[nbr].out_edges.retain(|&mut oe| oe != tw);
                self.free_edge(tw);
            }
            self.free_edge(e);
        }
        self.free_vertex(v);
    }

    fn free_edge(&mut self, e: EdgeIdx) {
        if self.edges[e.0].take().is_some() {
            self.edge_free_list.push(e);
        }
    }

    fn free_vertex(&mut self, v: VertexIdx) {
        if self.vertices[v.0].take().is_some() {
            self.vertex_free_list.push(v);
        }
    }
}

impl std::ops::Index<VertexIdx> for HalfEdgeGraph {
    type Output = VoronoiVertex;
    #[inline]
    fn index(&self, idx: VertexIdx) -> &VoronoiVertex {
        self.vertices[idx.0].as_ref().expect("tombstoned vertex slot")
    }
}

impl std::ops::IndexMut<VertexIdx> for HalfEdgeGraph {
    #[inline]
    fn index_mut(&mut self, idx: VertexIdx) -> &mut VoronoiVertex {
        self.vertices[idx.0].as_mut().expect("tombstoned vertex slot")
    }
}

impl std::ops::Index<EdgeIdx> for HalfEdgeGraph {
    type Output = VoronoiEdge;
    #[inline]
    fn index(&self, idx: EdgeIdx) -> &VoronoiEdge {
        self.edges[idx.0].as_ref().expect("tombstoned edge slot")
    }
}

impl std::ops::IndexMut<EdgeIdx> for HalfEdgeGraph {
    #[inline]
    fn index_mut(&mut self, idx: EdgeIdx) -> &mut VoronoiEdge {
        self.edges[idx.0].as_mut().expect("tombstoned edge slot")
    }
}

impl std::ops::Index<FaceIdx> for HalfEdgeGraph {
    type Output = VoronoiFace;
    #[inline]
    fn index(&self, idx: FaceIdx) -> &VoronoiFace {
        self.faces[idx.0].as_ref().expect("tombstoned face slot")
    }
}

impl std::ops::IndexMut<FaceIdx> for HalfEdgeGraph {
    #[inline]
    fn index_mut(&mut self, idx: FaceIdx) -> &mut VoronoiFace {
        self.faces[idx.0].as_mut().expect("tombstoned face slot")
    }
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;

    fn vert(g: &mut HalfEdgeGraph, x: f64, y: f64) -> VertexIdx {
        g.add_vertex(VoronoiVertex::new(
            DVec2::new(x, y),
            VertexStatus::Undecided,
            VertexType::Normal,
        ))
    }

    /// Two faces sharing a triangle boundary: a-b-c CCW inside, the twin
    /// cycle outside.
    fn triangle() -> (HalfEdgeGraph, [VertexIdx; 3], [EdgeIdx; 3], FaceIdx, FaceIdx) {
        let mut g = HalfEdgeGraph::new();
        let a = vert(&mut g, 0.0, 0.0);
        let b = vert(&mut g, 1.0, 0.0);
        let c = vert(&mut g, 0.0, 1.0);
        let (e_ab, e_ba) = g.add_twin_edges(a, b);
        let (e_bc, e_cb) = g.add_twin_edges(b, c);
        let (e_ca, e_ac) = g.add_twin_edges(c, a);
        let inner = g.add_face();
        let outer = g.add_face();
        g.set_next_cycle(&[e_ab, e_bc, e_ca], inner, 1);
        g.set_next_cycle(&[e_ac, e_cb, e_ba], outer, 1);
        (g, [a, b, c], [e_ab, e_bc, e_ca], inner, outer)
    }

    #[test]
    fn test_twin_involution() {
        let (g, _, [e_ab, ..], ..) = triangle();
        let tw = g[e_ab].twin.unwrap();
        assert_eq!(g[tw].twin, Some(e_ab));
        assert_ne!(tw, e_ab);
        assert_eq!(g[tw].source, g[e_ab].target);
        assert_eq!(g[tw].target, g[e_ab].source);
    }

    #[test]
    fn test_face_cycle_closure() {
        let (g, [a, b, c], _, inner, outer) = triangle();
        assert_eq!(g.face_edges(inner).len(), 3);
        assert_eq!(g.face_edges(outer).len(), 3);
        assert_eq!(g.face_vertices(inner), vec![b, c, a]);
        for &e in &g.face_edges(inner) {
            assert_eq!(g[e].face, Some(inner));
            assert_eq!(g[g[e].next.unwrap()].face, Some(inner));
        }
    }

    #[test]
    fn test_split_and_merge_roundtrip() {
        let (mut g, [a, b, _], [e_ab, ..], inner, outer) = triangle();
        let w = vert(&mut g, 0.5, 0.0);
        g.add_vertex_in_edge(w, e_ab);

        assert_eq!(g.face_edges(inner).len(), 4);
        assert_eq!(g.face_edges(outer).len(), 4);
        assert_eq!(g.degree(w), 2);
        // The reused slot now ends at w; twins mirror endpoints.
        assert_eq!(g[e_ab].target, w);
        let tw = g[e_ab].twin.unwrap();
        assert_eq!((g[tw].source, g[tw].target), (w, a));
        assert!(g.has_edge(w, b));

        assert!(g.remove_deg2_vertex(w));
        assert_eq!(g.face_edges(inner).len(), 3);
        assert_eq!(g.face_edges(outer).len(), 3);
        assert_eq!(g.num_vertices(), 3);
        assert_eq!(g.num_edges(), 6);
        // Twin law restored on the merged pair.
        let e = g.edge_between(a, b).unwrap();
        let tw = g[e].twin.unwrap();
        assert_eq!(g[tw].twin, Some(e));
    }

    #[test]
    fn test_remove_deg2_rejects_higher_degree() {
        let (mut g, [a, ..], ..) = triangle();
        assert_eq!(g.degree(a), 2);
        let d = vert(&mut g, 2.0, 2.0);
        g.add_twin_edges(a, d);
        assert_eq!(g.degree(a), 3);
        assert!(!g.remove_deg2_vertex(a));
        assert_eq!(g.num_vertices(), 4);
    }

    #[test]
    fn test_delete_vertex_removes_both_halves() {
        let (mut g, [a, b, c], ..) = triangle();
        g.delete_vertex(a);
        assert_eq!(g.num_vertices(), 2);
        assert_eq!(g.num_edges(), 2); // only b <-> c survives
        assert!(!g.has_edge(b, a));
        assert!(!g.has_edge(c, a));
        assert!(g.has_edge(b, c));
        assert!(g.has_edge(c, b));
        // Out-edge bookkeeping on the survivors is exact.
        assert_eq!(g.degree(b), 1);
        assert_eq!(g.degree(c), 1);
    }

    #[test]
    fn test_slot_reuse() {
        let (mut g, [a, ..], ..) = triangle();
        g.delete_vertex(a);
        let d = vert(&mut g, 5.0, 5.0);
        assert_eq!(d, a); // freed slot is reused
        // Stable handle keeps counting regardless of slot reuse.
        assert_eq!(g[d].index, 3);
    }

    #[test]
    fn test_previous_edge() {
        let (g, _, [e_ab, e_bc, e_ca], ..) = triangle();
        assert_eq!(g.previous_edge(e_ab), e_ca);
        assert_eq!(g.previous_edge(e_bc), e_ab);
    }
}
