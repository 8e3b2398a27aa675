//! Vertex positioning on bisector edges.
//!
//! When a new site is inserted, every IN-OUT edge of the deletion tree
//! receives a NEW vertex at the point where the edge's clearance equals
//! the distance to the new site. Because edges are clearance-parametrized
//! (see [`crate::bisector`]) and each edge lies on a single monotone
//! branch, the position is the root of a one-dimensional residual
//! bracketed by the two endpoint clearances: the IN endpoint is strictly
//! inside the new site's reach (negative residual), the OUT endpoint is
//! not (non-negative).

use glam::DVec2;

use crate::graph::{EdgeIdx, HalfEdgeGraph};
use crate::numeric::bisect;
use crate::site::Site;

/// Residual below which a positioned vertex is considered sound.
pub const POSITION_TOLERANCE: f64 = 1e-9;

const BISECT_ITERS: u32 = 80;

/// A positioned new vertex.
#[derive(Clone, Copy, Debug)]
pub struct Solution {
    /// Vertex position.
    pub p: DVec2,
    /// Clearance at the position.
    pub t: f64,
    /// Offset side of the new site the vertex belongs to (`+1` for point
    /// sites).
    pub k3: i8,
}

/// Position a NEW vertex on `edge` against `new_site`.
///
/// Returns `None` when the edge has no bisector parametrization or the
/// residual does not change sign over the clearance bracket; both are
/// abort-class conditions for the caller.
#[must_use]
pub fn position(g: &HalfEdgeGraph, edge: EdgeIdx, new_site: &Site) -> Option<Solution> {
    let bis = g[edge].bisector.as_ref()?;
    let src = &g[g[edge].source];
    let trg = &g[g[edge].target];
    let t_lo = src.dist().min(trg.dist());
    let t_hi = src.dist().max(trg.dist());

    let t = bisect(t_lo, t_hi, BISECT_ITERS, |t| {
        new_site.distance(bis.point_at(t)) - t
    })?;
    let p = bis.point_at(t);
    Some(Solution {
        p,
        t,
        k3: offset_sign(new_site, p),
    })
}

/// Which offset face of `site` the point `q` belongs to.
///
/// A line site's own face lies where its signed distance is negative, so
/// `q` on that side inherits the site's `k`; the other side gets `-k`.
/// Point sites have a single face, by convention `+1`.
#[must_use]
pub fn offset_sign(site: &Site, q: DVec2) -> i8 {
    match site {
        Site::Point(_) => 1,
        Site::Line(l) => {
            if l.signed_distance(q) < 0.0 {
                l.k
            } else {
                -l.k
            }
        }
    }
}

/// Residual of a solution: how far the positioned point's distance to the
/// site deviates from its clearance.
#[must_use]
pub fn dist_error(sol: &Solution, site: &Site) -> f64 {
    (site.distance(sol.p) - sol.t).abs()
}

/// Find the point on `edge` nearest the line `pt1 → pt2`, used to place
/// SPLIT vertices. Bracketed on the endpoint clearances; requires the
/// signed distance to change sign over the edge, otherwise `None`.
#[must_use]
pub fn split_point(g: &HalfEdgeGraph, edge: EdgeIdx, pt1: DVec2, pt2: DVec2) -> Option<DVec2> {
    let bis = g[edge].bisector.as_ref()?;
    let src = &g[g[edge].source];
    let trg = &g[g[edge].target];
    let t_lo = src.dist().min(trg.dist());
    let t_hi = src.dist().max(trg.dist());
    let axis = (pt2 - pt1).normalize();

    let t = bisect(t_lo, t_hi, BISECT_ITERS, |t| {
        axis.perp_dot(bis.point_at(t) - pt1)
    })?;
    Some(bis.point_at(t))
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bisector::Bisector;
    use crate::graph::{VertexStatus, VertexType, VoronoiVertex};
    use crate::site::PointSite;
    use approx::assert_relative_eq;

    /// One bisector edge between the faces of p1 and p2, with endpoint
    /// clearances bracketing the equidistant point against a third site.
    #[test]
    fn test_position_on_point_point_edge() {
        let p1 = Site::Point(PointSite::new(DVec2::new(-1.0, 0.0)));
        let p2 = Site::Point(PointSite::new(DVec2::new(1.0, 0.0)));
        let bis = Bisector::new(&p1, &p2, true);

        let mut g = HalfEdgeGraph::new();
        // src far up the left branch (large clearance), trg at the apex.
        let src_pos = bis.point_at(10.0);
        let trg_pos = bis.point_at(1.0);
        let src = g.add_vertex(VoronoiVertex::with_dist(
            src_pos,
            VertexStatus::Undecided,
            VertexType::Normal,
            p1.position(),
        ));
        let trg = g.add_vertex(VoronoiVertex::with_dist(
            trg_pos,
            VertexStatus::Undecided,
            VertexType::Normal,
            p1.position(),
        ));
        let e = g.add_edge(src, trg);
        g[e].bisector = Some(bis);

        // New site on the bisector's branch side.
        let new_site = Site::Point(PointSite::new(DVec2::new(0.0, 4.0)));
        let sol = position(&g, e, &new_site).unwrap();
        assert!(dist_error(&sol, &new_site) < POSITION_TOLERANCE);
        // Equidistant from all three sites.
        assert_relative_eq!((sol.p - p1.position()).length(), sol.t, epsilon = 1e-9);
        assert_relative_eq!((sol.p - new_site.position()).length(), sol.t, epsilon = 1e-9);
        assert_eq!(sol.k3, 1);
    }

    #[test]
    fn test_position_requires_bracket() {
        let p1 = Site::Point(PointSite::new(DVec2::new(-1.0, 0.0)));
        let p2 = Site::Point(PointSite::new(DVec2::new(1.0, 0.0)));
        let bis = Bisector::new(&p1, &p2, true);

        let mut g = HalfEdgeGraph::new();
        let src = g.add_vertex(VoronoiVertex::with_dist(
            bis.point_at(1.2),
            VertexStatus::Undecided,
            VertexType::Normal,
            p1.position(),
        ));
        let trg = g.add_vertex(VoronoiVertex::with_dist(
            bis.point_at(1.0),
            VertexStatus::Undecided,
            VertexType::Normal,
            p1.position(),
        ));
        let e = g.add_edge(src, trg);
        g[e].bisector = Some(bis);

        // A site much too far away never reaches into the bracket.
        let far = Site::Point(PointSite::new(DVec2::new(0.0, 50.0)));
        assert!(position(&g, e, &far).is_none());
    }

    #[test]
    fn test_offset_sign_for_line_site() {
        let l = crate::site::LineSite::new(DVec2::new(0.0, 0.0), DVec2::new(4.0, 0.0), 1);
        let site = Site::Line(l);
        // Face side (negative signed distance) is above this line.
        assert_eq!(offset_sign(&site, DVec2::new(1.0, 2.0)), 1);
        assert_eq!(offset_sign(&site, DVec2::new(1.0, -2.0)), -1);
    }
}
