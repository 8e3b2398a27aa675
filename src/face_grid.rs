//! Grid-based spatial index over point-site faces.
//!
//! Divides the plane into square cells and maps each cell to the
//! point-site faces whose generators fall in it. Nearest-face queries
//! expand outward ring by ring from the query cell, then keep expanding
//! until no closer entry can exist, which avoids comparing against every
//! face in the diagram.

use glam::DVec2;
use hashbrown::HashMap;

use crate::graph::FaceIdx;

#[derive(Clone, Copy, Debug)]
struct GridEntry {
    face: FaceIdx,
    position: DVec2,
}

/// Spatial index answering "which point-site face is closest to p".
#[derive(Clone, Debug)]
pub struct FaceGrid {
    cells: HashMap<(i64, i64), Vec<GridEntry>>,
    cell_size: f64,
    /// Ring bound covering the initial far generators; beyond it a full
    /// scan takes over.
    max_ring: i64,
}

impl FaceGrid {
    /// Grid over the working disk of radius `far_radius`, `n_bins` cells
    /// per axis.
    #[must_use]
    pub fn new(far_radius: f64, n_bins: usize) -> Self {
        let bins = n_bins.max(1);
        let cell_size = 2.0 * far_radius / bins as f64;
        // The initial generators sit at radius 3·far, so the widest
        // useful search spans 6·far.
        #[allow(clippy::cast_possible_truncation)]
        let max_ring = (6.0 * far_radius / cell_size).ceil() as i64 + 1;
        Self {
            cells: HashMap::new(),
            cell_size,
            max_ring,
        }
    }

    #[inline]
    fn cell_coords(&self, p: DVec2) -> (i64, i64) {
        #[allow(clippy::cast_possible_truncation)]
        let discretize = |v: f64| (v / self.cell_size).floor() as i64;
        (discretize(p.x), discretize(p.y))
    }

    /// Register a point-site face under its generator position.
    pub fn add_face(&mut self, face: FaceIdx, position: DVec2) {
        self.cells
            .entry(self.cell_coords(position))
            .or_default()
            .push(GridEntry { face, position });
    }

    /// Drop a face from the index (used when a point-site face is
    /// contracted away by a collinear segment insertion).
    pub fn remove_face(&mut self, face: FaceIdx, position: DVec2) {
        if let Some(entries) = self.cells.get_mut(&self.cell_coords(position)) {
            entries.retain(|e| e.face != face);
        }
    }

    /// The registered face whose generator is closest to `p`.
    #[must_use]
    pub fn grid_find_closest_face(&self, p: DVec2) -> Option<FaceIdx> {
        let (cx, cy) = self.cell_coords(p);
        let mut best: Option<(f64, FaceIdx)> = None;

        for ring in 0..=self.max_ring {
            // Once a hit exists, stop as soon as the ring lies entirely
            // beyond the best distance.
            if let Some((best_dist, _)) = best
                && (ring - 1) as f64 * self.cell_size > best_dist
            {
                break;
            }
            self.scan_ring(p, cx, cy, ring, &mut best);
        }

        if best.is_none() {
            // Degenerate cell sizes or far-out queries: brute force.
            for entries in self.cells.values() {
                for e in entries {
                    Self::consider(p, e, &mut best);
                }
            }
        }
        best.map(|(_, face)| face)
    }

    fn scan_ring(
        &self,
        p: DVec2,
        cx: i64,
        cy: i64,
        ring: i64,
        best: &mut Option<(f64, FaceIdx)>,
    ) {
        if ring == 0 {
            self.scan_cell(p, (cx, cy), best);
            return;
        }
        for dx in -ring..=ring {
            self.scan_cell(p, (cx + dx, cy - ring), best);
            self.scan_cell(p, (cx + dx, cy + ring), best);
        }
        for dy in (-ring + 1)..ring {
            self.scan_cell(p, (cx - ring, cy + dy), best);
            self.scan_cell(p, (cx + ring, cy + dy), best);
        }
    }

    fn scan_cell(&self, p: DVec2, cell: (i64, i64), best: &mut Option<(f64, FaceIdx)>) {
        if let Some(entries) = self.cells.get(&cell) {
            for e in entries {
                Self::consider(p, e, best);
            }
        }
    }

    fn consider(p: DVec2, e: &GridEntry, best: &mut Option<(f64, FaceIdx)>) {
        let d = (e.position - p).length();
        if best.is_none_or(|(bd, _)| d < bd) {
            *best = Some((d, e.face));
        }
    }
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closest_face() {
        let mut grid = FaceGrid::new(100.0, 10);
        grid.add_face(FaceIdx(0), DVec2::new(0.0, 300.0));
        grid.add_face(FaceIdx(1), DVec2::new(-260.0, -150.0));
        grid.add_face(FaceIdx(2), DVec2::new(260.0, -150.0));

        assert_eq!(
            grid.grid_find_closest_face(DVec2::new(10.0, 80.0)),
            Some(FaceIdx(0))
        );
        assert_eq!(
            grid.grid_find_closest_face(DVec2::new(-50.0, -40.0)),
            Some(FaceIdx(1))
        );
        assert_eq!(
            grid.grid_find_closest_face(DVec2::new(90.0, -30.0)),
            Some(FaceIdx(2))
        );
    }

    #[test]
    fn test_nearby_faces_disambiguate() {
        let mut grid = FaceGrid::new(10.0, 16);
        grid.add_face(FaceIdx(0), DVec2::new(1.0, 0.0));
        grid.add_face(FaceIdx(1), DVec2::new(1.2, 0.0));
        assert_eq!(
            grid.grid_find_closest_face(DVec2::new(0.0, 0.0)),
            Some(FaceIdx(0))
        );
        assert_eq!(
            grid.grid_find_closest_face(DVec2::new(2.0, 0.0)),
            Some(FaceIdx(1))
        );
    }

    #[test]
    fn test_remove_face() {
        let mut grid = FaceGrid::new(10.0, 8);
        grid.add_face(FaceIdx(0), DVec2::new(0.0, 0.0));
        grid.add_face(FaceIdx(1), DVec2::new(5.0, 0.0));
        grid.remove_face(FaceIdx(0), DVec2::new(0.0, 0.0));
        assert_eq!(
            grid.grid_find_closest_face(DVec2::new(0.0, 0.0)),
            Some(FaceIdx(1))
        );
    }

    #[test]
    fn test_empty_grid() {
        let grid = FaceGrid::new(10.0, 8);
        assert_eq!(grid.grid_find_closest_face(DVec2::new(0.0, 0.0)), None);
    }
}
