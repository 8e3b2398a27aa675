//! Topology validation.
//!
//! These checks are the executable form of the diagram's invariants:
//! twin involution, closed face cycles with consistent face/k labels,
//! clean vertex and face statuses between insertions, one face per point
//! site, and strictly increasing diamond angles around every null-face.
//! Insertions assert the relevant subset in debug builds; `check()` runs
//! the full set on demand.

use itertools::Itertools;

use crate::diagram::VoronoiDiagram;
use crate::graph::{
    EdgeIdx, EdgeType, FaceIdx, FaceStatus, HalfEdgeGraph, VertexStatus, VertexType,
};

/// A violated diagram invariant.
///
/// Any of these after a completed insertion indicates a bug or an
/// unrepresentable input (e.g. crossing segments).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    /// `twin(twin(e)) != e`, or the twin's endpoints do not mirror.
    #[error("edge {edge:?} breaks the twin involution")]
    BrokenTwin { edge: EdgeIdx },
    /// Only the outermost boundary edges may lack a twin.
    #[error("edge {edge:?} has no twin but is not an outer boundary edge")]
    MissingTwin { edge: EdgeIdx },
    /// An edge and its twin must bound different faces.
    #[error("edge {edge:?} and its twin bound the same face")]
    TwinSameFace { edge: EdgeIdx },
    /// Edge without a successor on its face cycle.
    #[error("edge {edge:?} has no next edge")]
    MissingNext { edge: EdgeIdx },
    /// `next` must start where the edge ends.
    #[error("edge {edge:?} does not chain onto its next edge")]
    BrokenChain { edge: EdgeIdx },
    /// An edge and its successor must agree on face and offset.
    #[error("edge {edge:?} disagrees with its next edge on face or k")]
    FaceNextMismatch { edge: EdgeIdx },
    /// Face cycle failed to close within the edge count.
    #[error("face {face:?} cycle does not close")]
    UnclosedFace { face: FaceIdx },
    /// IN or NEW vertex surviving an insertion.
    #[error("vertex {index} still has transient status after insertion")]
    DirtyVertexStatus { index: usize },
    /// Queue flag surviving an insertion.
    #[error("vertex {index} is still flagged as queued")]
    DirtyQueueFlag { index: usize },
    /// Incident face surviving an insertion.
    #[error("face {face:?} is still marked incident")]
    DirtyFaceStatus { face: FaceIdx },
    /// Point-site face count must match the number of point sites.
    #[error("{faces} point-site faces for {sites} point sites")]
    PointSiteFaceCount { faces: usize, sites: usize },
    /// A site must point back at the face that owns it.
    #[error("face {face:?} site does not point back at its face")]
    SiteBackpointer { face: FaceIdx },
    /// Null-face vertices must wind in strictly increasing diamond
    /// angle.
    #[error("null face {face:?} violates alfa ordering")]
    AlfaOrdering { face: FaceIdx },
    /// Out-edge bookkeeping diverged from the edge arena.
    #[error("vertex {index} out-edge list is inconsistent")]
    OutEdgeBookkeeping { index: usize },
}

/// Validate a single edge: twin involution and forward chaining.
pub fn check_edge(g: &HalfEdgeGraph, e: EdgeIdx) -> Result<(), TopologyError> {
    let edge = &g[e];
    match edge.twin {
        None => {
            if edge.kind != EdgeType::Outedge {
                return Err(TopologyError::MissingTwin { edge: e });
            }
        }
        Some(tw) => {
            let twin = &g[tw];
            if twin.twin != Some(e)
                || tw == e
                || twin.source != edge.target
                || twin.target != edge.source
            {
                return Err(TopologyError::BrokenTwin { edge: e });
            }
            if twin.face.is_some() && twin.face == edge.face {
                return Err(TopologyError::TwinSameFace { edge: e });
            }
        }
    }
    let next = edge.next.ok_or(TopologyError::MissingNext { edge: e })?;
    if g[next].source != edge.target {
        return Err(TopologyError::BrokenChain { edge: e });
    }
    if g[next].face != edge.face || g[next].k != edge.k {
        return Err(TopologyError::FaceNextMismatch { edge: e });
    }
    Ok(())
}

/// Validate one face: its cycle must close within the total edge count.
///
/// Ownership of the traversed edges is deliberately not checked here; a
/// contracted point-site face legitimately borrows the null-face cycle
/// as its representative.
pub fn face_ok(g: &HalfEdgeGraph, f: FaceIdx) -> Result<(), TopologyError> {
    let start = g[f].edge.ok_or(TopologyError::UnclosedFace { face: f })?;
    let mut current = start;
    let mut steps = 0usize;
    loop {
        let next = g[current]
            .next
            .ok_or(TopologyError::MissingNext { edge: current })?;
        if g[next].source != g[current].target {
            return Err(TopologyError::BrokenChain { edge: current });
        }
        if g[next].k != g[current].k {
            return Err(TopologyError::FaceNextMismatch { edge: current });
        }
        current = next;
        steps += 1;
        if current == start {
            return Ok(());
        }
        if steps > g.num_edges() {
            return Err(TopologyError::UnclosedFace { face: f });
        }
    }
}

/// Validate the whole diagram.
pub fn is_valid(d: &VoronoiDiagram) -> Result<(), TopologyError> {
    let g = d.graph();

    for (e, _) in g.edges() {
        check_edge(g, e)?;
    }

    for (idx, v) in g.vertices() {
        if matches!(v.status, VertexStatus::In | VertexStatus::New) {
            return Err(TopologyError::DirtyVertexStatus { index: v.index });
        }
        if v.in_queue {
            return Err(TopologyError::DirtyQueueFlag { index: v.index });
        }
        for &e in &g.out_edges(idx) {
            if g.edge(e).is_none_or(|edge| edge.source != idx) {
                return Err(TopologyError::OutEdgeBookkeeping { index: v.index });
            }
        }
    }

    let mut point_faces = 0usize;
    for (f, face) in g.faces() {
        if face.status != FaceStatus::Nonincident {
            return Err(TopologyError::DirtyFaceStatus { face: f });
        }
        face_ok(g, f)?;
        match &face.site {
            Some(site) => {
                if site.face() != Some(f) {
                    return Err(TopologyError::SiteBackpointer { face: f });
                }
                if site.is_point() {
                    point_faces += 1;
                }
            }
            None => alfa_ordered(g, f)?,
        }
    }
    if point_faces != d.num_point_sites() {
        return Err(TopologyError::PointSiteFaceCount {
            faces: point_faces,
            sites: d.num_point_sites(),
        });
    }

    // Endpoint null-faces must carry no site.
    for (_, v) in g.vertices() {
        if v.kind == VertexType::Pointsite
            && let Some(nf) = v.null_face
            && g[nf].site.is_some()
        {
            return Err(TopologyError::SiteBackpointer { face: nf });
        }
    }
    Ok(())
}

/// Null-face winding: strictly increasing alfa, modulo one wrap.
fn alfa_ordered(g: &HalfEdgeGraph, f: FaceIdx) -> Result<(), TopologyError> {
    let alfas: Vec<f64> = g
        .face_vertices(f)
        .iter()
        .map(|&v| g[v].alfa)
        .collect();
    let descents = alfas
        .iter()
        .circular_tuple_windows()
        .filter(|(a, b)| a >= b)
        .count();
    if descents == 1 {
        Ok(())
    } else {
        Err(TopologyError::AlfaOrdering { face: f })
    }
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::VoronoiDiagram;

    #[test]
    fn test_initial_diagram_is_valid() {
        let d = VoronoiDiagram::new(100.0, 10);
        assert!(is_valid(&d).is_ok());
    }

    #[test]
    fn test_check_edge_on_initial_diagram() {
        let d = VoronoiDiagram::new(50.0, 8);
        for (e, _) in d.graph().edges() {
            assert!(check_edge(d.graph(), e).is_ok(), "edge {e:?} invalid");
        }
    }

    #[test]
    fn test_face_ok_on_initial_faces() {
        let d = VoronoiDiagram::new(50.0, 8);
        for (f, _) in d.graph().faces() {
            assert!(face_ok(d.graph(), f).is_ok(), "face {f:?} invalid");
        }
    }
}
