use rand::Rng;

use crate::{BevRaster, Dataset, DatasetError, Sample, TargetVector};

/// Canvas value outside of the four placed rasters.
pub const MOSAIC_FILL: f32 = 0.5;

/// Composes four samples into one `2 rows x 2 cols` raster around a centre point.
///
/// Wraps a [`Dataset`] without changing it; the single-sample pipeline stays untouched.
pub struct Mosaic<'a> {
    dataset: &'a Dataset,
    random_padding: bool,
}

impl<'a> Mosaic<'a> {
    /// Without `random_padding` the centre is fixed at `(rows, cols)`.
    pub fn new(dataset: &'a Dataset, random_padding: bool) -> Self {
        Self {
            dataset,
            random_padding,
        }
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Sample `index` goes top left, three further samples are drawn from `rng`.
    /// The returned sample carries the id and image path of sample `index`.
    pub fn get<R: Rng>(&self, index: usize, rng: &mut R) -> Result<Sample, DatasetError> {
        let geometry = self.dataset.geometry();
        let (h, w) = (geometry.rows() as isize, geometry.cols() as isize);
        let (yc, xc) = if self.random_padding {
            (
                rng.random_range(h as f32 / 2.0..1.5 * h as f32) as isize,
                rng.random_range(w as f32 / 2.0..1.5 * w as f32) as isize,
            )
        } else {
            (h, w)
        };

        let len = self.dataset.len();
        if index >= len {
            return Err(DatasetError::IndexOutOfRange { index, len });
        }
        let indices = [
            index,
            rng.random_range(0..len),
            rng.random_range(0..len),
            rng.random_range(0..len),
        ];
        let samples = self.dataset.get_many(&indices)?;

        let mut canvas = BevRaster::filled(2 * h as usize, 2 * w as usize, MOSAIC_FILL);
        let mut targets = Vec::new();
        for (quadrant, sample) in samples.iter().enumerate() {
            let placement = Placement::new(quadrant, (yc, xc), (h, w));
            canvas.copy_region(
                &sample.raster,
                (placement.src_row as usize, placement.src_col as usize),
                (placement.dst_row as usize, placement.dst_col as usize),
                (placement.rows as usize, placement.cols as usize),
            );
            let pad_w = (placement.dst_col - placement.src_col) as f32;
            let pad_h = (placement.dst_row - placement.src_row) as f32;
            let (w, h) = (w as f32, h as f32);
            targets.extend(sample.targets.iter().map(|t| TargetVector {
                x: (t.x * w + pad_w) / (2. * w),
                y: (t.y * h + pad_h) / (2. * h),
                w: t.w * w / (2. * w),
                l: t.l * h / (2. * h),
                ..*t
            }));
        }
        let (max_x, max_y) = (1. - 0.5 / w as f32, 1. - 0.5 / h as f32);
        for target in targets.iter_mut() {
            target.x = target.x.clamp(0., max_x);
            target.y = target.y.clamp(0., max_y);
        }

        let first = &samples[0];
        Ok(Sample {
            sample_id: first.sample_id,
            image_path: first.image_path.clone(),
            raster: canvas,
            targets,
        })
    }
}

/// Window of a `h x w` raster copied into the `2h x 2w` canvas.
#[derive(Debug, PartialEq, Eq)]
struct Placement {
    src_row: isize,
    src_col: isize,
    dst_row: isize,
    dst_col: isize,
    rows: isize,
    cols: isize,
}

impl Placement {
    /// Quadrants: 0 top left, 1 top right, 2 bottom left, 3 bottom right of the centre.
    fn new(quadrant: usize, (yc, xc): (isize, isize), (h, w): (isize, isize)) -> Self {
        let (x1a, y1a, x2a, y2a) = match quadrant {
            0 => ((xc - w).max(0), (yc - h).max(0), xc, yc),
            1 => (xc, (yc - h).max(0), (xc + w).min(2 * w), yc),
            2 => ((xc - w).max(0), yc, xc, (yc + h).min(2 * h)),
            _ => (xc, yc, (xc + w).min(2 * w), (yc + h).min(2 * h)),
        };
        let (cols, rows) = (x2a - x1a, y2a - y1a);
        let src_col = if quadrant % 2 == 0 { w - cols } else { 0 };
        let src_row = if quadrant < 2 { h - rows } else { 0 };
        Self {
            src_row,
            src_col,
            dst_row: y1a,
            dst_col: x1a,
            rows,
            cols,
        }
    }
}
