use std::path::Path;

use image::{Rgb, RgbImage};

use crate::{Aggregation, BevConfig, PointCloud, RasterGeometry};

pub const BEV_CHANNELS: usize = 3;

/// Channel order of [`BevRaster`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BevChannel {
    /// Aggregated point height, `(z - minZ) / (maxZ - minZ)`.
    Height = 0,
    /// `min(1, ln(count + 1) / ln(K))`
    Density = 1,
    /// Aggregated intensity clamped to `[0, 1]`.
    Intensity = 2,
}

/// Channel-major `[channel][row][col]` raster. Row and column axes follow [`RasterGeometry`].
#[derive(Debug, Clone, PartialEq)]
pub struct BevRaster {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl BevRaster {
    pub fn filled(rows: usize, cols: usize, value: f32) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; BEV_CHANNELS * rows * cols],
        }
    }

    /// `None` unless both dimensions are non-zero and `data` holds exactly three channels.
    pub fn from_data(rows: usize, cols: usize, data: Vec<f32>) -> Option<Self> {
        (rows > 0 && cols > 0 && data.len() == BEV_CHANNELS * rows * cols)
            .then_some(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    fn index(&self, channel: usize, row: usize, col: usize) -> usize {
        (channel * self.rows + row) * self.cols + col
    }

    #[inline]
    pub fn get(&self, channel: BevChannel, row: usize, col: usize) -> f32 {
        self.data[self.index(channel as usize, row, col)]
    }

    #[inline]
    pub fn set(&mut self, channel: BevChannel, row: usize, col: usize, value: f32) {
        let idx = self.index(channel as usize, row, col);
        self.data[idx] = value;
    }

    pub fn channel(&self, channel: BevChannel) -> &[f32] {
        let len = self.rows * self.cols;
        let start = channel as usize * len;
        &self.data[start..start + len]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Copies a `rows x cols` window of `src` starting at `src_origin` to `dst_origin`.
    /// The window has to fit into both rasters.
    pub fn copy_region(
        &mut self,
        src: &BevRaster,
        (src_row, src_col): (usize, usize),
        (dst_row, dst_col): (usize, usize),
        (rows, cols): (usize, usize),
    ) {
        assert!(src_row + rows <= src.rows && src_col + cols <= src.cols);
        assert!(dst_row + rows <= self.rows && dst_col + cols <= self.cols);
        for channel in 0..BEV_CHANNELS {
            for row in 0..rows {
                let from = src.index(channel, src_row + row, src_col);
                let to = self.index(channel, dst_row + row, dst_col);
                self.data[to..to + cols].copy_from_slice(&src.data[from..from + cols]);
            }
        }
    }

    /// Bilinear resize with aligned corners: output corners sample the input corners exactly.
    pub fn resize_bilinear(&self, rows: usize, cols: usize) -> BevRaster {
        if rows == self.rows && cols == self.cols {
            return self.clone();
        }
        if self.rows == 0 || self.cols == 0 {
            return BevRaster::filled(rows, cols, 0.);
        }
        let scale = |from: usize, to: usize| {
            if to > 1 {
                (from - 1) as f32 / (to - 1) as f32
            } else {
                0.
            }
        };
        let (row_scale, col_scale) = (scale(self.rows, rows), scale(self.cols, cols));
        let mut out = BevRaster::filled(rows, cols, 0.);
        for channel in 0..BEV_CHANNELS {
            for row in 0..rows {
                let src_row = row as f32 * row_scale;
                let r0 = (src_row.floor() as usize).min(self.rows - 1);
                let r1 = (r0 + 1).min(self.rows - 1);
                let fr = src_row - r0 as f32;
                for col in 0..cols {
                    let src_col = col as f32 * col_scale;
                    let c0 = (src_col.floor() as usize).min(self.cols - 1);
                    let c1 = (c0 + 1).min(self.cols - 1);
                    let fc = src_col - c0 as f32;
                    let at = |r, c| self.data[self.index(channel, r, c)];
                    let top = at(r0, c0) * (1. - fc) + at(r0, c1) * fc;
                    let bottom = at(r1, c0) * (1. - fc) + at(r1, c1) * fc;
                    let idx = out.index(channel, row, col);
                    out.data[idx] = top * (1. - fr) + bottom * fr;
                }
            }
        }
        out
    }

    /// 8-bit preview: red = density, green = height, blue = intensity. Image row 0 is `minX`.
    pub fn to_rgb_image(&self) -> RgbImage {
        let to_u8 = |v: f32| (v.clamp(0., 1.) * 255.).round() as u8;
        RgbImage::from_fn(self.cols as u32, self.rows as u32, |x, y| {
            let (row, col) = (y as usize, x as usize);
            Rgb([
                to_u8(self.get(BevChannel::Density, row, col)),
                to_u8(self.get(BevChannel::Height, row, col)),
                to_u8(self.get(BevChannel::Intensity, row, col)),
            ])
        })
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<(), image::ImageError> {
        self.to_rgb_image()
            .save_with_format(path, image::ImageFormat::Png)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct CellStats {
    count: u32,
    height: f32,
    intensity: f32,
}

/// Discretizes normalized point clouds into [`BevRaster`]s.
#[derive(Debug, Clone)]
pub struct Rasterizer {
    geometry: RasterGeometry,
    density_saturation: f32,
    height_aggregation: Aggregation,
    intensity_aggregation: Aggregation,
}

impl Rasterizer {
    pub fn new(config: &BevConfig) -> Self {
        Self {
            geometry: config.geometry(),
            density_saturation: config.density_saturation,
            height_aggregation: config.height_aggregation,
            intensity_aggregation: config.intensity_aggregation,
        }
    }

    pub fn geometry(&self) -> &RasterGeometry {
        &self.geometry
    }

    /// Drops points outside the boundary. All edges are inclusive.
    pub fn clip(&self, cloud: &PointCloud) -> PointCloud {
        let boundary = self.geometry.boundary();
        cloud
            .iter()
            .filter(|p| boundary.contains(p[0], p[1], p[2]))
            .copied()
            .collect()
    }

    /// Clips and moves every point onto the centre of its cell, keeping height and intensity.
    pub fn discretize(&self, cloud: &PointCloud) -> PointCloud {
        let boundary = self.geometry.boundary();
        cloud
            .iter()
            .filter(|p| boundary.contains(p[0], p[1], p[2]))
            .filter_map(|&[x, y, z, intensity]| {
                let (row, col) = self.geometry.cell_of(x, y)?;
                let (x, y) = self.geometry.cell_center(row, col);
                Some([x, y, z, intensity])
            })
            .collect()
    }

    pub fn rasterize(&self, cloud: &PointCloud) -> BevRaster {
        let (rows, cols) = (self.geometry.rows(), self.geometry.cols());
        let boundary = self.geometry.boundary();
        let mut cells = vec![CellStats::default(); rows * cols];

        for &[x, y, z, intensity] in cloud.iter() {
            if !boundary.contains(x, y, z) {
                continue;
            }
            let Some((row, col)) = self.geometry.cell_of(x, y) else {
                continue;
            };
            let height = (z - boundary.min_z) / boundary.extent_z();
            let intensity = intensity.clamp(0., 1.);
            let cell = &mut cells[row * cols + col];
            cell.count += 1;
            cell.height = aggregate(self.height_aggregation, cell.count, cell.height, height);
            cell.intensity =
                aggregate(self.intensity_aggregation, cell.count, cell.intensity, intensity);
        }

        let log_saturation = self.density_saturation.ln();
        let mut raster = BevRaster::filled(rows, cols, 0.);
        for (idx, cell) in cells.iter().enumerate().filter(|(_, c)| c.count > 0) {
            let (row, col) = (idx / cols, idx % cols);
            let density = ((cell.count as f32 + 1.).ln() / log_saturation).min(1.);
            raster.set(BevChannel::Height, row, col, cell.height);
            raster.set(BevChannel::Density, row, col, density);
            raster.set(BevChannel::Intensity, row, col, cell.intensity);
        }
        raster
    }
}

/// `count` already includes `value`.
#[inline]
fn aggregate(aggregation: Aggregation, count: u32, acc: f32, value: f32) -> f32 {
    match aggregation {
        Aggregation::Max if count == 1 => value,
        Aggregation::Max => acc.max(value),
        Aggregation::Mean => acc + (value - acc) / count as f32,
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;
    use crate::SpatialBoundary;

    fn config(step: f32) -> BevConfig {
        let boundary = SpatialBoundary::new((0., 10.), (-5., 5.), (-2., 4.)).unwrap();
        BevConfig::new(boundary, step).unwrap()
    }

    #[test]
    fn raster_size_follows_geometry() {
        let boundary = SpatialBoundary::new((0., 50.), (-25., 25.), (-2., 4.)).unwrap();
        let rasterizer = Rasterizer::new(&BevConfig::new(boundary, 0.1).unwrap());
        let raster = rasterizer.rasterize(&PointCloud::default());
        assert_eq!((500, 500), (raster.rows(), raster.cols()));
        assert!(raster.as_slice().iter().all(|v| *v == 0.));
    }

    #[test]
    fn max_height_density_and_intensity() {
        let rasterizer = Rasterizer::new(&config(1.));
        let cloud = PointCloud::new(vec![
            [2.5, 0.5, 1., 0.2],
            [2.7, 0.9, -2., 0.9],
            [2.1, 0.1, 4., 0.4],
        ]);
        let raster = rasterizer.rasterize(&cloud);
        assert_eq!(1., raster.get(BevChannel::Height, 2, 5));
        assert_relative_eq!(
            4f32.ln() / 64f32.ln(),
            raster.get(BevChannel::Density, 2, 5)
        );
        assert_eq!(0.9, raster.get(BevChannel::Intensity, 2, 5));
        assert_eq!(0., raster.get(BevChannel::Height, 2, 4));
    }

    #[test]
    fn mean_aggregation() {
        let rasterizer = Rasterizer::new(
            &config(1.).with_aggregation(Aggregation::Mean, Aggregation::Mean),
        );
        let cloud = PointCloud::new(vec![[0.5, -4.5, -2., 0.2], [0.5, -4.5, 1., 0.6]]);
        let raster = rasterizer.rasterize(&cloud);
        assert_relative_eq!(0.25, raster.get(BevChannel::Height, 0, 0));
        assert_relative_eq!(0.4, raster.get(BevChannel::Intensity, 0, 0));
    }

    #[test]
    fn density_saturates_at_one() {
        let rasterizer = Rasterizer::new(&config(1.));
        let cloud = (0..200).map(|_| [5.5, 0.5, 0., 0.5]).collect::<PointCloud>();
        assert_eq!(1., rasterizer.rasterize(&cloud).get(BevChannel::Density, 5, 5));
    }

    #[test]
    fn points_outside_are_clipped() {
        let rasterizer = Rasterizer::new(&config(1.));
        let cloud = PointCloud::new(vec![
            [10.01, 0., 0., 1.],
            [5., 0., 4.5, 1.],
            [5., -5.5, 0., 1.],
            [f32::NAN, 0., 0., 1.],
            [10., 5., 4., 1.],
        ]);
        assert_eq!(1, rasterizer.clip(&cloud).len());
        let raster = rasterizer.rasterize(&cloud);
        let occupied = raster
            .channel(BevChannel::Density)
            .iter()
            .filter(|v| **v > 0.)
            .count();
        assert_eq!(1, occupied);
        // max edge lands in the last cell
        assert!(raster.get(BevChannel::Density, 9, 9) > 0.);
    }

    #[test]
    fn intensity_is_clamped() {
        let rasterizer = Rasterizer::new(&config(1.));
        let cloud = PointCloud::new(vec![[1.5, 1.5, 0., 37.]]);
        assert_eq!(1., rasterizer.rasterize(&cloud).get(BevChannel::Intensity, 1, 6));
    }

    #[test]
    fn rasterizing_discretized_points_is_idempotent() {
        let rasterizer = Rasterizer::new(&config(0.5));
        let mut rng = StdRng::seed_from_u64(3);
        let cloud = (0..500)
            .map(|_| {
                [
                    rng.random_range(-1f32..11.),
                    rng.random_range(-6f32..6.),
                    rng.random_range(-3f32..5.),
                    rng.random_range(0f32..1.),
                ]
            })
            .collect::<PointCloud>();
        let discretized = rasterizer.discretize(&cloud);
        assert_eq!(discretized, rasterizer.discretize(&discretized));
        assert_eq!(
            rasterizer.rasterize(&cloud),
            rasterizer.rasterize(&discretized)
        );
    }

    #[test]
    fn resize_keeps_corners() {
        let mut raster = BevRaster::filled(2, 2, 0.);
        raster.set(BevChannel::Height, 0, 0, 1.);
        raster.set(BevChannel::Height, 1, 1, 0.5);
        let resized = raster.resize_bilinear(3, 3);
        assert_eq!(1., resized.get(BevChannel::Height, 0, 0));
        assert_eq!(0.5, resized.get(BevChannel::Height, 2, 2));
        assert_relative_eq!(0.375, resized.get(BevChannel::Height, 1, 1));
        assert_relative_eq!(0.5, resized.get(BevChannel::Height, 0, 1));
    }

    #[test]
    fn from_data_rejects_empty_and_mismatched() {
        assert_eq!(None, BevRaster::from_data(0, 0, vec![]));
        assert_eq!(None, BevRaster::from_data(0, 4, vec![]));
        assert_eq!(None, BevRaster::from_data(2, 2, vec![0.; 11]));
        assert!(BevRaster::from_data(2, 2, vec![0.; 12]).is_some());
    }

    #[test]
    fn resize_of_empty_raster_is_blank() {
        let resized = BevRaster::filled(0, 0, 0.).resize_bilinear(4, 3);
        assert_eq!((4, 3), (resized.rows(), resized.cols()));
        assert!(resized.as_slice().iter().all(|v| *v == 0.));
    }

    #[test]
    fn copy_region_moves_all_channels() {
        let mut src = BevRaster::filled(2, 2, 0.);
        src.set(BevChannel::Intensity, 1, 1, 0.7);
        let mut dst = BevRaster::filled(4, 4, 0.5);
        dst.copy_region(&src, (1, 1), (0, 3), (1, 1));
        assert_eq!(0.7, dst.get(BevChannel::Intensity, 0, 3));
        assert_eq!(0., dst.get(BevChannel::Height, 0, 3));
        assert_eq!(0.5, dst.get(BevChannel::Height, 0, 2));
    }

    #[test]
    fn rgb_preview_channels() {
        let mut raster = BevRaster::filled(1, 2, 0.);
        raster.set(BevChannel::Density, 0, 1, 1.);
        raster.set(BevChannel::Height, 0, 1, 0.5);
        let image = raster.to_rgb_image();
        assert_eq!((2, 1), image.dimensions());
        assert_eq!(&Rgb([255, 128, 0]), image.get_pixel(1, 0));
    }
}
