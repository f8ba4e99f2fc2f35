use crate::SpatialBoundary;

/// Shared description of how the boundary maps onto raster cells.
///
/// Rows run along X (row 0 at `minX`), columns along Y (column 0 at `minY`).
/// Normalized image coordinates use the same axes: `u` follows the columns, `v` the rows.
/// Rasterizer, target encoder and mosaic all read this one value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterGeometry {
    boundary: SpatialBoundary,
    cell_size: f32,
    rows: usize,
    cols: usize,
}

impl RasterGeometry {
    pub fn new(boundary: SpatialBoundary, cell_size: f32) -> Self {
        let rows = (boundary.extent_x() / cell_size).round().max(1.) as usize;
        let cols = (boundary.extent_y() / cell_size).round().max(1.) as usize;
        Self {
            boundary,
            cell_size,
            rows,
            cols,
        }
    }

    pub fn boundary(&self) -> &SpatialBoundary {
        &self.boundary
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `floor((coord - min) / cell_size)` per axis. Both edges are inclusive;
    /// a coordinate on the max edge lands in the last row/column.
    pub fn cell_of(&self, x: f32, y: f32) -> Option<(usize, usize)> {
        let b = &self.boundary;
        if !(b.min_x..=b.max_x).contains(&x) || !(b.min_y..=b.max_y).contains(&y) {
            return None;
        }
        let row = ((x - b.min_x) / self.cell_size).floor() as usize;
        let col = ((y - b.min_y) / self.cell_size).floor() as usize;
        Some((row.min(self.rows - 1), col.min(self.cols - 1)))
    }

    /// World X/Y of the centre of a cell.
    pub fn cell_center(&self, row: usize, col: usize) -> (f32, f32) {
        (
            self.boundary.min_x + (row as f32 + 0.5) * self.cell_size,
            self.boundary.min_y + (col as f32 + 0.5) * self.cell_size,
        )
    }

    /// World X/Y to normalized `(u, v)`, both in `[0, 1]` inside the boundary.
    pub fn normalize_position(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (y - self.boundary.min_y) / self.boundary.extent_y(),
            (x - self.boundary.min_x) / self.boundary.extent_x(),
        )
    }

    /// Object width runs along Y, length along X.
    pub fn normalize_size(&self, width: f32, length: f32) -> (f32, f32) {
        (
            width / self.boundary.extent_y(),
            length / self.boundary.extent_x(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry_50m(step: f32) -> RasterGeometry {
        let boundary = SpatialBoundary::new((0., 50.), (-25., 25.), (-2., 4.)).unwrap();
        RasterGeometry::new(boundary, step)
    }

    #[test]
    fn tenth_meter_over_50m_is_500_cells() {
        let geometry = geometry_50m(0.1);
        assert_eq!(500, geometry.rows());
        assert_eq!(500, geometry.cols());
    }

    #[test]
    fn max_edge_maps_into_last_cell() {
        let geometry = geometry_50m(0.1);
        assert_eq!(Some((499, 499)), geometry.cell_of(50., 25.));
        assert_eq!(Some((0, 0)), geometry.cell_of(0., -25.));
    }

    #[test]
    fn outside_boundary_has_no_cell() {
        let geometry = geometry_50m(0.1);
        assert_eq!(None, geometry.cell_of(50.001, 0.));
        assert_eq!(None, geometry.cell_of(10., -25.5));
        assert_eq!(None, geometry.cell_of(-0.001, 0.));
    }

    #[test]
    fn rows_follow_x_and_cols_follow_y() {
        let geometry = geometry_50m(1.);
        assert_eq!(Some((10, 30)), geometry.cell_of(10.5, 5.5));
        assert_eq!((10.5, 5.5), geometry.cell_center(10, 30));
        assert_eq!((0.5, 0.25), geometry.normalize_position(12.5, 0.));
    }
}
