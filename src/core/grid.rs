//! The common pixel grid all bands and masks are resampled to before
//! combination. Wraps a GDAL-style affine geotransform
//! (`[origin_x, pixel_width, rot_x, origin_y, rot_y, pixel_height]`).
use geo::{Coord, Rect};

/// Target grid shared by every array combined arithmetically for one product.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelGrid {
    pub pixel_size: f64,
    pub geotransform: [f64; 6],
    pub width: usize,
    pub height: usize,
    pub epsg: u32,
}

impl PixelGrid {
    pub fn new(geotransform: [f64; 6], width: usize, height: usize, epsg: u32) -> Self {
        PixelGrid {
            pixel_size: geotransform[1].abs(),
            geotransform,
            width,
            height,
            epsg,
        }
    }

    /// Geographic coordinates of the upper-left corner of pixel (row, col).
    pub fn pixel_corner(&self, row: usize, col: usize) -> (f64, f64) {
        let gt = &self.geotransform;
        let x = gt[0] + col as f64 * gt[1] + row as f64 * gt[2];
        let y = gt[3] + col as f64 * gt[4] + row as f64 * gt[5];
        (x, y)
    }

    /// Geographic coordinates of the center of pixel (row, col).
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let gt = &self.geotransform;
        let x = gt[0] + (col as f64 + 0.5) * gt[1] + (row as f64 + 0.5) * gt[2];
        let y = gt[3] + (col as f64 + 0.5) * gt[4] + (row as f64 + 0.5) * gt[5];
        (x, y)
    }

    /// Axis-aligned cell rectangle of pixel (row, col).
    /// Assumes a north-up transform (no rotation terms), which holds for all
    /// supported products.
    pub fn pixel_rect(&self, row: usize, col: usize) -> Rect<f64> {
        let (x0, y0) = self.pixel_corner(row, col);
        let (x1, y1) = self.pixel_corner(row + 1, col + 1);
        Rect::new(Coord { x: x0, y: y0 }, Coord { x: x1, y: y1 })
    }

    /// Fractional (row, col) for a geographic coordinate.
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let gt = &self.geotransform;
        // North-up inverse; rotation terms are zero for supported products.
        let col = (x - gt[0]) / gt[1];
        let row = (y - gt[3]) / gt[5];
        (row, col)
    }

    /// Clamped pixel window covering a geographic bounding rectangle.
    /// Returns `(row0, col0, rows, cols)`; empty intersection yields zero extents.
    pub fn window_for(&self, bbox: &Rect<f64>) -> (usize, usize, usize, usize) {
        let (r0, c0) = self.geo_to_pixel(bbox.min().x, bbox.max().y);
        let (r1, c1) = self.geo_to_pixel(bbox.max().x, bbox.min().y);
        let row0 = r0.floor().max(0.0) as usize;
        let col0 = c0.floor().max(0.0) as usize;
        let row1 = (r1.ceil().max(0.0) as usize).min(self.height);
        let col1 = (c1.ceil().max(0.0) as usize).min(self.width);
        if row0 >= row1 || col0 >= col1 {
            return (row0.min(self.height), col0.min(self.width), 0, 0);
        }
        (row0, col0, row1 - row0, col1 - col0)
    }

    /// Geotransform of a sub-window anchored at pixel (row0, col0).
    pub fn window_geotransform(&self, row0: usize, col0: usize) -> [f64; 6] {
        let (x, y) = self.pixel_corner(row0, col0);
        let gt = &self.geotransform;
        [x, gt[1], gt[2], y, gt[4], gt[5]]
    }

    /// Whether two grids align closely enough to combine arrays elementwise.
    pub fn aligns_with(&self, other: &PixelGrid) -> bool {
        const EPS: f64 = 1e-6;
        self.width == other.width
            && self.height == other.height
            && self.epsg == other.epsg
            && self
                .geotransform
                .iter()
                .zip(other.geotransform.iter())
                .all(|(a, b)| (a - b).abs() < EPS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> PixelGrid {
        // 10 m pixels, origin (300000, 5000000), 100x100
        PixelGrid::new([300000.0, 10.0, 0.0, 5000000.0, 0.0, -10.0], 100, 100, 32633)
    }

    #[test]
    fn pixel_center_is_half_a_cell_in() {
        let g = grid();
        assert_eq!(g.pixel_center(0, 0), (300005.0, 4999995.0));
        assert_eq!(g.pixel_center(1, 2), (300025.0, 4999985.0));
    }

    #[test]
    fn geo_to_pixel_round_trips() {
        let g = grid();
        let (x, y) = g.pixel_center(7, 3);
        let (r, c) = g.geo_to_pixel(x, y);
        assert_eq!(r.floor() as usize, 7);
        assert_eq!(c.floor() as usize, 3);
    }

    #[test]
    fn window_clamps_to_grid() {
        let g = grid();
        let bbox = Rect::new(
            Coord { x: 299000.0, y: 4999950.0 },
            Coord { x: 300035.0, y: 5000100.0 },
        );
        let (r0, c0, rows, cols) = g.window_for(&bbox);
        assert_eq!((r0, c0), (0, 0));
        assert_eq!(rows, 5);
        assert_eq!(cols, 4);
    }

    #[test]
    fn empty_window_outside_grid() {
        let g = grid();
        let bbox = Rect::new(
            Coord { x: 400000.0, y: 4990000.0 },
            Coord { x: 400100.0, y: 4990100.0 },
        );
        let (_, _, rows, cols) = g.window_for(&bbox);
        assert_eq!((rows, cols), (0, 0));
    }

    #[test]
    fn window_geotransform_shifts_origin() {
        let g = grid();
        let gt = g.window_geotransform(2, 5);
        assert_eq!(gt[0], 300050.0);
        assert_eq!(gt[3], 4999980.0);
        assert_eq!(gt[1], 10.0);
    }
}
