//! Point and line-segment sites.
//!
//! Every Voronoi face is dual to exactly one site. A point site owns one
//! face; a line-segment site owns two (one per offset side, `k = ±1`),
//! and its endpoints each own a degenerate null-face.

use glam::DVec2;

use crate::graph::FaceIdx;

/// A point site.
#[derive(Clone, Copy, Debug)]
pub struct PointSite {
    /// Site position.
    pub position: DVec2,
    /// The face dual to this site, once allocated.
    pub face: Option<FaceIdx>,
}

impl PointSite {
    #[must_use]
    pub const fn new(position: DVec2) -> Self {
        Self {
            position,
            face: None,
        }
    }
}

/// One offset side of a line-segment site.
///
/// Stores the unit-normalized line equation `a·x + b·y + c = 0` with the
/// normal `(a, b)` pointing to the *right* of the `start → end` direction.
/// The segment pair shares geometry but runs in opposite directions, so the
/// two sides carry opposite equations.
#[derive(Clone, Copy, Debug)]
pub struct LineSite {
    pub start: DVec2,
    pub end: DVec2,
    /// Offset side this site represents, `+1` or `-1`.
    pub k: i8,
    pub a: f64,
    pub b: f64,
    pub c: f64,
    /// The face dual to this offset side, once allocated.
    pub face: Option<FaceIdx>,
}

impl LineSite {
    /// Build the `k`-side site of the segment `start → end`.
    ///
    /// # Panics
    /// Panics if the endpoints coincide.
    #[must_use]
    pub fn new(start: DVec2, end: DVec2, k: i8) -> Self {
        let dir = end - start;
        let len = dir.length();
        assert!(len > 0.0, "degenerate line site");
        // Right-perp of the direction, unit length.
        let a = dir.y / len;
        let b = -dir.x / len;
        let c = -(a * start.x + b * start.y);
        Self {
            start,
            end,
            k,
            a,
            b,
            c,
            face: None,
        }
    }

    /// Signed distance from `q` to the supporting line (positive on the
    /// right of `start → end`).
    #[inline]
    #[must_use]
    pub fn signed_distance(&self, q: DVec2) -> f64 {
        self.a * q.x + self.b * q.y + self.c
    }

    /// Projection parameter of `q` along the segment (`0` at start, `1` at
    /// end).
    #[must_use]
    pub fn t(&self, q: DVec2) -> f64 {
        let dir = self.end - self.start;
        (q - self.start).dot(dir) / dir.length_squared()
    }
}

/// A site: the generator a Voronoi face is closest to.
#[derive(Clone, Copy, Debug)]
pub enum Site {
    Point(PointSite),
    Line(LineSite),
}

impl Site {
    #[inline]
    #[must_use]
    pub const fn is_point(&self) -> bool {
        matches!(self, Self::Point(_))
    }

    #[inline]
    #[must_use]
    pub const fn is_line(&self) -> bool {
        matches!(self, Self::Line(_))
    }

    /// Position of a point site.
    ///
    /// # Panics
    /// Panics on line sites; callers branch on `is_point` first.
    #[must_use]
    pub fn position(&self) -> DVec2 {
        match self {
            Self::Point(p) => p.position,
            Self::Line(_) => panic!("position() on a line site"),
        }
    }

    /// Segment start of a line site.
    #[must_use]
    pub fn start(&self) -> DVec2 {
        match self {
            Self::Line(l) => l.start,
            Self::Point(_) => panic!("start() on a point site"),
        }
    }

    /// Segment end of a line site.
    #[must_use]
    pub fn end(&self) -> DVec2 {
        match self {
            Self::Line(l) => l.end,
            Self::Point(_) => panic!("end() on a point site"),
        }
    }

    /// The face dual to this site (the `k`-side face for line sites).
    #[must_use]
    pub const fn face(&self) -> Option<FaceIdx> {
        match self {
            Self::Point(p) => p.face,
            Self::Line(l) => l.face,
        }
    }

    pub const fn set_face(&mut self, face: FaceIdx) {
        match self {
            Self::Point(p) => p.face = Some(face),
            Self::Line(l) => l.face = Some(face),
        }
    }

    /// Closest point of the site to `q`.
    ///
    /// For point sites this is the site itself; for line sites the
    /// projection of `q` onto the supporting line, clamped to the nearer
    /// endpoint outside the segment slab.
    #[must_use]
    pub fn apex_point(&self, q: DVec2) -> DVec2 {
        match self {
            Self::Point(p) => p.position,
            Self::Line(l) => {
                let t = l.t(q);
                if t < 0.0 {
                    l.start
                } else if t > 1.0 {
                    l.end
                } else {
                    let d = l.signed_distance(q);
                    q - d * DVec2::new(l.a, l.b)
                }
            }
        }
    }

    /// Distance from `q` to the site.
    #[inline]
    #[must_use]
    pub fn distance(&self, q: DVec2) -> f64 {
        (q - self.apex_point(q)).length()
    }

    /// Region test gating IN-tree growth: always true for point sites,
    /// the perpendicular slab of the segment for line sites.
    #[must_use]
    pub fn in_region(&self, q: DVec2) -> bool {
        match self {
            Self::Point(_) => true,
            Self::Line(l) => {
                let t = l.t(q);
                (0.0..=1.0).contains(&t)
            }
        }
    }
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_line_site_equation() {
        let l = LineSite::new(DVec2::new(0.0, 0.0), DVec2::new(2.0, 0.0), 1);
        // Normal points right of start→end, i.e. toward -y.
        assert_relative_eq!(l.a, 0.0);
        assert_relative_eq!(l.b, -1.0);
        assert_relative_eq!(l.c, 0.0);
        assert!(l.signed_distance(DVec2::new(1.0, -3.0)) > 0.0);
        assert!(l.signed_distance(DVec2::new(1.0, 3.0)) < 0.0);
    }

    #[test]
    fn test_apex_point_clamping() {
        let s = Site::Line(LineSite::new(DVec2::new(0.0, 0.0), DVec2::new(2.0, 0.0), 1));
        assert_relative_eq!(
            s.apex_point(DVec2::new(1.0, 5.0)).x,
            1.0,
            epsilon = 1e-12
        );
        // Beyond the slab the nearer endpoint wins.
        assert_eq!(s.apex_point(DVec2::new(-1.0, 1.0)), DVec2::new(0.0, 0.0));
        assert_eq!(s.apex_point(DVec2::new(3.0, 1.0)), DVec2::new(2.0, 0.0));
    }

    #[test]
    fn test_in_region() {
        let s = Site::Line(LineSite::new(DVec2::new(0.0, 0.0), DVec2::new(2.0, 0.0), 1));
        assert!(s.in_region(DVec2::new(1.0, 10.0)));
        assert!(!s.in_region(DVec2::new(-0.1, 0.0)));
        let p = Site::Point(PointSite::new(DVec2::new(0.0, 0.0)));
        assert!(p.in_region(DVec2::new(100.0, 100.0)));
    }
}
