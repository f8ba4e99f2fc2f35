use std::path::PathBuf;

use log::debug;
use rand::Rng;

use crate::{BevRaster, Sample, TargetVector};

/// A new size is drawn every this many batches.
pub const MULTISCALE_INTERVAL: usize = 10;
const MULTISCALE_STEP: usize = 32;
const MULTISCALE_SPREAD: usize = 3 * MULTISCALE_STEP;

#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub sample_ids: Vec<u32>,
    pub image_paths: Vec<PathBuf>,
    /// All rasters of a batch share one size.
    pub rasters: Vec<BevRaster>,
    /// `batch_index` refers to the position in `rasters`.
    pub targets: Vec<TargetVector>,
}

/// Stacks loaded samples into batches and, with multiscale enabled, periodically changes the
/// raster width the batches are resized to.
#[derive(Debug, Clone)]
pub struct Collator {
    base_size: usize,
    img_size: usize,
    multiscale: bool,
    batch_count: usize,
}

impl Collator {
    /// `base_size` is the raster width produced by the dataset. Multiscale is ignored for
    /// mosaic samples.
    pub fn new(base_size: usize, multiscale: bool, mosaic: bool) -> Self {
        Self {
            base_size,
            img_size: base_size,
            multiscale: multiscale && !mosaic,
            batch_count: 0,
        }
    }

    pub fn img_size(&self) -> usize {
        self.img_size
    }

    pub fn min_size(&self) -> usize {
        self.base_size.saturating_sub(MULTISCALE_SPREAD).max(MULTISCALE_STEP)
    }

    pub fn max_size(&self) -> usize {
        self.base_size + MULTISCALE_SPREAD
    }

    /// Samples have to be fully loaded; the batch index of every target is overwritten.
    pub fn collate<R: Rng>(&mut self, samples: Vec<Sample>, rng: &mut R) -> Batch {
        if self.multiscale && self.batch_count % MULTISCALE_INTERVAL == 0 {
            let choices = (self.min_size()..=self.max_size())
                .step_by(MULTISCALE_STEP)
                .count();
            self.img_size = self.min_size() + rng.random_range(0..choices) * MULTISCALE_STEP;
            debug!("Multiscale batch size changed to {}", self.img_size);
        }
        self.batch_count += 1;

        let mut batch = Batch {
            sample_ids: Vec::with_capacity(samples.len()),
            image_paths: Vec::with_capacity(samples.len()),
            rasters: Vec::with_capacity(samples.len()),
            targets: Vec::new(),
        };
        for (batch_index, sample) in samples.into_iter().enumerate() {
            batch.targets.extend(sample.targets.into_iter().map(|t| TargetVector {
                batch_index,
                ..t
            }));
            let raster = if self.img_size == self.base_size {
                sample.raster
            } else {
                let rows = (sample.raster.rows() * self.img_size + sample.raster.cols() / 2)
                    / sample.raster.cols();
                sample.raster.resize_bilinear(rows, self.img_size)
            };
            batch.sample_ids.push(sample.sample_id);
            batch.image_paths.push(sample.image_path);
            batch.rasters.push(raster);
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    fn sample(sample_id: u32, size: usize, targets: usize) -> Sample {
        let target = TargetVector {
            batch_index: 0,
            class_id: 1,
            x: 0.5,
            y: 0.5,
            w: 0.1,
            l: 0.1,
            sin_yaw: 0.,
            cos_yaw: 1.,
        };
        Sample {
            sample_id,
            image_path: PathBuf::from(format!("{sample_id:06}.png")),
            raster: BevRaster::filled(size, size, 0.25),
            targets: vec![target; targets],
        }
    }

    #[test]
    fn assigns_batch_index() {
        let mut collator = Collator::new(8, false, false);
        let batch = collator.collate(
            vec![sample(1, 8, 2), sample(2, 8, 0), sample(3, 8, 1)],
            &mut StdRng::seed_from_u64(0),
        );
        assert_eq!(vec![1, 2, 3], batch.sample_ids);
        assert_eq!(
            vec![0, 0, 2],
            batch.targets.iter().map(|t| t.batch_index).collect::<Vec<_>>()
        );
        assert!(batch.rasters.iter().all(|r| r.rows() == 8));
    }

    #[test]
    fn multiscale_sizes_are_multiples_of_step_in_range() {
        let mut collator = Collator::new(608, true, false);
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let size_before = collator.img_size();
            let count_before = collator.batch_count;
            collator.collate(Vec::new(), &mut rng);
            let size = collator.img_size();
            assert!((512..=704).contains(&size), "{size}");
            assert_eq!(0, (size - 512) % 32);
            if count_before % MULTISCALE_INTERVAL != 0 {
                assert_eq!(size_before, size);
            }
        }
    }

    #[test]
    fn resized_rasters_follow_img_size() {
        let mut collator = Collator::new(64, true, false);
        let mut rng = StdRng::seed_from_u64(5);
        let batch = collator.collate(vec![sample(1, 64, 1)], &mut rng);
        let size = collator.img_size();
        assert_eq!((size, size), (batch.rasters[0].rows(), batch.rasters[0].cols()));
        assert!(batch.rasters[0].as_slice().iter().all(|v| (v - 0.25).abs() < 1e-6));
    }

    #[test]
    fn mosaic_disables_multiscale() {
        let mut collator = Collator::new(608, true, true);
        let mut rng = StdRng::seed_from_u64(1);
        collator.collate(Vec::new(), &mut rng);
        assert_eq!(608, collator.img_size());
    }
}
