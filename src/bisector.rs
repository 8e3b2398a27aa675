//! Clearance-parametrized bisector curves.
//!
//! Every bisector edge of the diagram runs along a curve `q(t)` indexed by
//! *clearance*: `q(t)` is the unique point of the curve at distance `t`
//! from both defining sites (on the relevant branch). The parametrization
//! is what lets new vertices be positioned by one-dimensional root finding
//! and lets apex vertices be placed at the curve's minimum-clearance point.
//!
//! Offset convention: a line site's signed distance `a·x + b·y + c` is
//! *negative* on the side its own face occupies, so a point at clearance
//! `t` on a face boundary satisfies `d_site(q) = -t` for each adjacent
//! line site. Both offset sides of a segment carry opposite equations,
//! which keeps the convention uniform.
//!
//! Branch convention: `sign = true` selects the branch to the *left* of
//! the reference axis (`p1 → p2` for point-point, `focus → foot` for
//! point-line); swapping the construction argument order flips the
//! reference, so `new(s2, s1, !sign)` describes the same curve as
//! `new(s1, s2, sign)`.

use glam::DVec2;

use crate::site::Site;

const PARALLEL_EPS: f64 = 1e-12;

/// A bisector curve parametrized by clearance.
#[derive(Clone, Debug)]
pub enum Bisector {
    /// Straight bisector of two point sites: `q(t) = m + s·τ·√(t² − d²)`.
    PointPoint {
        mid: DVec2,
        /// Unit tangent, CCW-perp of `p1 → p2` (points left).
        tangent: DVec2,
        half_dist: f64,
        /// Branch factor `±1`.
        branch: f64,
    },
    /// Parabola between a point site and a line site's face side:
    /// `q(t) = focus + α(t)·τ + β(t)·n` with `β(t) = −t − dp` and
    /// `α(t) = branch·√(t² − β(t)²)`.
    PointLine {
        focus: DVec2,
        /// Unit line normal `(a, b)`.
        normal: DVec2,
        /// Unit tangent `(−b, a)`.
        tangent: DVec2,
        /// Signed distance of the focus from the line.
        dp: f64,
        branch: f64,
    },
    /// Straight bisector of two line-site face sides: `q(t) = q0 + t·v`.
    LineLine { origin: DVec2, velocity: DVec2 },
    /// Zero-curvature transition from a null-face separator point:
    /// `q(t) = origin + t·dir`.
    Separator { origin: DVec2, dir: DVec2 },
}

impl Bisector {
    /// Bisector between the faces of `s1` and `s2`; `sign` picks the
    /// branch for the curved cases (see module docs).
    #[must_use]
    pub fn new(s1: &Site, s2: &Site, sign: bool) -> Self {
        match (s1, s2) {
            (Site::Point(p1), Site::Point(p2)) => {
                let delta = p2.position - p1.position;
                let len = delta.length();
                debug_assert!(len > 0.0, "bisector of coincident point sites");
                Self::PointPoint {
                    mid: p1.position.midpoint(p2.position),
                    tangent: delta.perp() / len,
                    half_dist: 0.5 * len,
                    branch: if sign { 1.0 } else { -1.0 },
                }
            }
            (Site::Point(p), Site::Line(l)) | (Site::Line(l), Site::Point(p)) => {
                // The reference axis runs focus → foot. The tangent comes
                // from the line alone, so the argument order contributes
                // its flip through the branch factor; together with the
                // caller's sign flip this makes `new(s2, s1, !sign)` the
                // same curve as `new(s1, s2, sign)`.
                let swap_sign = if s1.is_line() { -1.0 } else { 1.0 };
                let normal = DVec2::new(l.a, l.b);
                let dp = l.signed_distance(p.position);
                let axis_sign = -dp.signum();
                Self::PointLine {
                    focus: p.position,
                    normal,
                    tangent: normal.perp(),
                    dp,
                    branch: swap_sign * axis_sign * if sign { 1.0 } else { -1.0 },
                }
            }
            (Site::Line(l1), Site::Line(l2)) => {
                let det = l1.a * l2.b - l2.a * l1.b;
                if det.abs() > PARALLEL_EPS {
                    // Solve a_i·x + b_i·y + c_i = -t for both lines.
                    let origin = DVec2::new(
                        (-l1.c * l2.b + l2.c * l1.b) / det,
                        (-l2.c * l1.a + l1.c * l2.a) / det,
                    );
                    let velocity =
                        DVec2::new((-l2.b + l1.b) / det, (-l1.a + l2.a) / det);
                    Self::LineLine { origin, velocity }
                } else {
                    // Collinear segments: the boundary between the two
                    // face sides is the perpendicular at the shared
                    // endpoint, advancing away from the common line.
                    let origin = shared_endpoint(l1, l2).unwrap_or_else(|| {
                        tracing::warn!(
                            "parallel line sites without shared endpoint; \
                             degenerate bisector"
                        );
                        l1.start
                    });
                    Self::LineLine {
                        origin,
                        velocity: -DVec2::new(l1.a, l1.b),
                    }
                }
            }
        }
    }

    /// Separator curve from a null-face endpoint toward `target`.
    #[must_use]
    pub fn separator(origin: DVec2, target: DVec2) -> Self {
        Self::Separator {
            origin,
            dir: (target - origin).normalize(),
        }
    }

    /// Point of the curve at clearance `t`.
    #[must_use]
    pub fn point_at(&self, t: f64) -> DVec2 {
        match self {
            Self::PointPoint {
                mid,
                tangent,
                half_dist,
                branch,
            } => {
                let discr = (t * t - half_dist * half_dist).max(0.0);
                *mid + *branch * discr.sqrt() * *tangent
            }
            Self::PointLine {
                focus,
                normal,
                tangent,
                dp,
                branch,
            } => {
                let beta = -t - dp;
                let discr = (t * t - beta * beta).max(0.0);
                *focus + *branch * discr.sqrt() * *tangent + beta * *normal
            }
            Self::LineLine { origin, velocity } => *origin + t * *velocity,
            Self::Separator { origin, dir } => *origin + t * *dir,
        }
    }

    /// Smallest clearance the curve attains.
    #[must_use]
    pub fn minimum_t(&self) -> f64 {
        match self {
            Self::PointPoint { half_dist, .. } => *half_dist,
            Self::PointLine { dp, .. } => 0.5 * dp.abs(),
            Self::LineLine { .. } | Self::Separator { .. } => 0.0,
        }
    }
}

fn shared_endpoint(l1: &crate::site::LineSite, l2: &crate::site::LineSite) -> Option<DVec2> {
    for p in [l1.start, l1.end] {
        if p == l2.start || p == l2.end {
            return Some(p);
        }
    }
    None
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::{LineSite, PointSite};
    use approx::assert_relative_eq;

    #[test]
    fn test_point_point_clearance_identity() {
        let p1 = Site::Point(PointSite::new(DVec2::new(-1.0, 0.0)));
        let p2 = Site::Point(PointSite::new(DVec2::new(1.0, 0.0)));
        let b = Bisector::new(&p1, &p2, true);
        assert_relative_eq!(b.minimum_t(), 1.0);
        for t in [1.0, 1.5, 3.0, 10.0] {
            let q = b.point_at(t);
            assert_relative_eq!((q - p1.position()).length(), t, epsilon = 1e-12);
            assert_relative_eq!((q - p2.position()).length(), t, epsilon = 1e-12);
        }
        // sign=true is the left branch of p1 → p2 (positive y here).
        assert!(b.point_at(2.0).y > 0.0);
        assert!(Bisector::new(&p1, &p2, false).point_at(2.0).y < 0.0);
        // Swapping argument order and sign describes the same branch.
        let b_sw = Bisector::new(&p2, &p1, false);
        assert_relative_eq!(b_sw.point_at(2.0).y, b.point_at(2.0).y, epsilon = 1e-12);
    }

    #[test]
    fn test_point_line_parabola_identity() {
        // Line along the x axis; the face side is where the signed
        // distance is negative, so put the focus there (above, since the
        // normal of start→end = (2,0)→... points down).
        let l = LineSite::new(DVec2::new(-5.0, 0.0), DVec2::new(5.0, 0.0), 1);
        let focus = DVec2::new(0.0, 2.0);
        assert!(l.signed_distance(focus) < 0.0);
        let site_l = Site::Line(l);
        let site_p = Site::Point(PointSite::new(focus));
        let b = Bisector::new(&site_p, &site_l, true);
        assert_relative_eq!(b.minimum_t(), 1.0);
        for t in [1.0, 1.2, 2.0, 4.0] {
            let q = b.point_at(t);
            assert_relative_eq!((q - focus).length(), t, epsilon = 1e-9);
            assert_relative_eq!(q.y.abs(), t, epsilon = 1e-9);
        }
        // Swapped construction, flipped sign: same branch.
        let q1 = Bisector::new(&site_p, &site_l, true).point_at(2.0);
        let q2 = Bisector::new(&site_l, &site_p, false).point_at(2.0);
        assert_relative_eq!(q1.x, q2.x, epsilon = 1e-12);
        assert_relative_eq!(q1.y, q2.y, epsilon = 1e-12);
    }

    #[test]
    fn test_line_line_bisector() {
        // Two perpendicular segments meeting near the origin; both faces
        // on the negative-distance sides.
        let l1 = LineSite::new(DVec2::new(0.0, 0.0), DVec2::new(4.0, 0.0), 1);
        let l2 = LineSite::new(DVec2::new(0.0, 4.0), DVec2::new(0.0, 0.0), 1);
        let b = Bisector::new(&Site::Line(l1), &Site::Line(l2), true);
        for t in [0.5, 1.0, 2.0] {
            let q = b.point_at(t);
            assert_relative_eq!(l1.signed_distance(q), -t, epsilon = 1e-12);
            assert_relative_eq!(l2.signed_distance(q), -t, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_collinear_line_line_shared_endpoint() {
        let shared = DVec2::new(1.0, 0.0);
        let l1 = LineSite::new(DVec2::new(-1.0, 0.0), shared, 1);
        let l2 = LineSite::new(shared, DVec2::new(3.0, 0.0), 1);
        // Same supporting line, same orientation: rank-deficient system.
        let b = Bisector::new(&Site::Line(l1), &Site::Line(l2), true);
        let q = b.point_at(2.0);
        assert_relative_eq!((q - shared).length(), 2.0, epsilon = 1e-12);
        assert_relative_eq!(l1.signed_distance(q), -2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_separator() {
        let b = Bisector::separator(DVec2::new(1.0, 1.0), DVec2::new(1.0, 4.0));
        let q = b.point_at(2.0);
        assert_relative_eq!(q.x, 1.0);
        assert_relative_eq!(q.y, 3.0);
        assert_relative_eq!(b.minimum_t(), 0.0);
    }
}
