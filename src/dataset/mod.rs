use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::{
    encode_targets, normalize, read_point_cloud_as, read_raw_labels, BevConfig, BevRaster,
    Calibration, CalibrationError, ClassRegistry, CoordinateFrameConverter, DegenerateGeometry,
    EncodedTargets, IdentityConverter, LabelParseError, ObjectLabel, PointCloud, PointCloudError,
    PointCloudFormat, RasterGeometry, Rasterizer, RegistryError, TargetVector,
};

mod collate;
mod layout;
mod mosaic;

pub use collate::*;
pub use layout::*;
pub use mosaic::*;

/// Hook applied to every loaded training sample, e.g. random flips.
pub type Augmentation =
    Box<dyn Fn(BevRaster, Vec<TargetVector>) -> (BevRaster, Vec<TargetVector>) + Send + Sync>;

/// One BEV raster with its regression targets.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub sample_id: u32,
    /// Camera image of the sample. Only the path is provided, the image is never read.
    pub image_path: PathBuf,
    pub raster: BevRaster,
    /// Empty in [`Mode::Test`].
    pub targets: Vec<TargetVector>,
}

#[derive(Debug, thiserror::Error)]
pub enum SampleErrorKind {
    #[error(transparent)]
    PointCloud(#[from] PointCloudError),
    #[error(transparent)]
    Label(#[from] LabelParseError),
    #[error(transparent)]
    Geometry(#[from] DegenerateGeometry),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}

/// Processing a sample failed. Identifies the sample and the file at fault.
#[derive(Debug, thiserror::Error)]
#[error("Sample {sample_id:06} ({path:?}): {kind}")]
pub struct SampleError {
    pub sample_id: u32,
    pub path: PathBuf,
    #[source]
    pub kind: SampleErrorKind,
}

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error(transparent)]
    Split(#[from] SplitError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Sample(#[from] SampleError),
    #[error("Index {index} out of range for dataset of {len} samples")]
    IndexOutOfRange { index: usize, len: usize },
}

trait SampleContext<T> {
    fn in_sample(self, sample_id: u32, path: &Path) -> Result<T, SampleError>;
}

impl<T, E: Into<SampleErrorKind>> SampleContext<T> for Result<T, E> {
    fn in_sample(self, sample_id: u32, path: &Path) -> Result<T, SampleError> {
        self.map_err(|err| SampleError {
            sample_id,
            path: path.to_owned(),
            kind: err.into(),
        })
    }
}

pub struct DatasetBuilder {
    layout: DatasetLayout,
    config: BevConfig,
    registry: ClassRegistry,
    num_samples: Option<usize>,
    converter: Box<dyn CoordinateFrameConverter>,
    augmentation: Option<Augmentation>,
}

impl DatasetBuilder {
    pub fn mode(mut self, mode: Mode) -> Self {
        self.layout = DatasetLayout::new(
            self.layout.root().to_owned(),
            mode,
            self.layout.point_cloud_format(),
        );
        self
    }

    pub fn point_cloud_format(mut self, format: PointCloudFormat) -> Self {
        self.layout = DatasetLayout::new(self.layout.root().to_owned(), self.layout.mode(), format);
        self
    }

    /// Truncates the usable samples after filtering.
    pub fn num_samples(mut self, num_samples: usize) -> Self {
        self.num_samples = Some(num_samples);
        self
    }

    pub fn converter(mut self, converter: impl CoordinateFrameConverter + 'static) -> Self {
        self.converter = Box::new(converter);
        self
    }

    pub fn augmentation(mut self, augmentation: Augmentation) -> Self {
        self.augmentation = Some(augmentation);
        self
    }

    /// Reads the split manifest and, outside of [`Mode::Test`], runs every listed sample through
    /// the label pipeline to drop samples without usable targets. The first failing sample aborts.
    pub fn build(self) -> Result<Dataset, DatasetError> {
        let mut dataset = Dataset {
            rasterizer: Rasterizer::new(&self.config),
            layout: self.layout,
            config: self.config,
            registry: self.registry,
            converter: self.converter,
            augmentation: self.augmentation,
            sample_ids: Vec::new(),
        };
        let listed = dataset.layout.read_split()?;
        let mut sample_ids = if dataset.layout.mode() == Mode::Test {
            listed.clone()
        } else {
            let usable = listed
                .par_iter()
                .map(|&sample_id| {
                    dataset
                        .encode_sample_targets(sample_id)
                        .map(|encoded| (sample_id, !encoded.no_objects()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            usable
                .into_iter()
                .filter_map(|(sample_id, usable)| usable.then_some(sample_id))
                .collect()
        };
        if let Some(limit) = self.num_samples {
            sample_ids.truncate(limit);
        }
        info!(
            "{} dataset at {:?}: {} of {} listed samples usable",
            dataset.layout.mode(),
            dataset.layout.root(),
            sample_ids.len(),
            listed.len()
        );
        dataset.sample_ids = sample_ids;
        Ok(dataset)
    }
}

/// Per-sample pipeline: read, normalize, rasterize, encode.
///
/// Everything shared between samples is read-only after [`DatasetBuilder::build`], so samples may
/// be loaded from several threads at once.
pub struct Dataset {
    layout: DatasetLayout,
    config: BevConfig,
    rasterizer: Rasterizer,
    registry: ClassRegistry,
    converter: Box<dyn CoordinateFrameConverter>,
    augmentation: Option<Augmentation>,
    sample_ids: Vec<u32>,
}

impl Dataset {
    /// Train mode, `.bin` point clouds, labels used as annotated.
    pub fn builder(
        root: impl Into<PathBuf>,
        config: BevConfig,
        registry: ClassRegistry,
    ) -> DatasetBuilder {
        DatasetBuilder {
            layout: DatasetLayout::new(root, Mode::Train, PointCloudFormat::Bin),
            config,
            registry,
            num_samples: None,
            converter: Box::new(IdentityConverter),
            augmentation: None,
        }
    }

    /// Like [`Dataset::builder`] with the registry loaded from `<root>/classes_names.txt`.
    pub fn builder_with_registry_file(
        root: impl Into<PathBuf>,
        config: BevConfig,
    ) -> Result<DatasetBuilder, DatasetError> {
        let root = root.into();
        let registry = ClassRegistry::load(
            DatasetLayout::new(root.clone(), Mode::Train, PointCloudFormat::Bin).registry_path(),
        )?;
        Ok(Self::builder(root, config, registry))
    }

    pub fn len(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_ids.is_empty()
    }

    pub fn sample_ids(&self) -> &[u32] {
        &self.sample_ids
    }

    pub fn layout(&self) -> &DatasetLayout {
        &self.layout
    }

    pub fn config(&self) -> &BevConfig {
        &self.config
    }

    pub fn geometry(&self) -> &RasterGeometry {
        self.rasterizer.geometry()
    }

    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    pub fn get(&self, index: usize) -> Result<Sample, DatasetError> {
        let sample_id =
            *self
                .sample_ids
                .get(index)
                .ok_or(DatasetError::IndexOutOfRange {
                    index,
                    len: self.len(),
                })?;
        Ok(self.load_sample(sample_id)?)
    }

    /// Loads several samples in parallel, keeping the order of `indices`.
    pub fn get_many(&self, indices: &[usize]) -> Result<Vec<Sample>, DatasetError> {
        indices.par_iter().map(|&index| self.get(index)).collect()
    }

    pub fn load_sample(&self, sample_id: u32) -> Result<Sample, SampleError> {
        let cloud_path = self.layout.point_cloud_path(sample_id);
        let cloud = read_point_cloud_as(&cloud_path, self.layout.point_cloud_format())
            .in_sample(sample_id, &cloud_path)?;
        let (cloud, objects) = if self.layout.mode() == Mode::Test {
            let (cloud, _) =
                normalize(&cloud, &self.config.boundary).in_sample(sample_id, &cloud_path)?;
            (cloud, Vec::new())
        } else {
            self.normalize_with_objects(sample_id, &cloud, &cloud_path)?
        };

        let raster = self.rasterizer.rasterize(&cloud);
        let encoded = encode_targets(&objects, self.geometry());
        if encoded.unresolved > 0 {
            warn!(
                "Sample {sample_id:06}: {} objects with classes missing from the registry",
                encoded.unresolved
            );
        }
        let (raster, targets) = match &self.augmentation {
            Some(augment) if self.layout.mode() != Mode::Test => augment(raster, encoded.targets),
            _ => (raster, encoded.targets),
        };
        debug!(
            "Sample {sample_id:06}: {} points, {} of {} objects kept",
            cloud.len(),
            targets.len(),
            objects.len()
        );
        Ok(Sample {
            sample_id,
            image_path: self.layout.image_path(sample_id),
            raster,
            targets,
        })
    }

    /// Label half of the pipeline, without rasterization.
    pub fn encode_sample_targets(&self, sample_id: u32) -> Result<EncodedTargets, SampleError> {
        let cloud_path = self.layout.point_cloud_path(sample_id);
        let cloud = read_point_cloud_as(&cloud_path, self.layout.point_cloud_format())
            .in_sample(sample_id, &cloud_path)?;
        let (_, objects) = self.normalize_with_objects(sample_id, &cloud, &cloud_path)?;
        Ok(encode_targets(&objects, self.geometry()))
    }

    fn normalize_with_objects(
        &self,
        sample_id: u32,
        cloud: &PointCloud,
        cloud_path: &Path,
    ) -> Result<(PointCloud, Vec<ObjectLabel>), SampleError> {
        let (cloud, transform) =
            normalize(cloud, &self.config.boundary).in_sample(sample_id, cloud_path)?;

        let label_path = self.layout.label_path(sample_id);
        let raw_labels = read_raw_labels(&label_path).in_sample(sample_id, &label_path)?;

        let calibration = if self.converter.requires_calibration() {
            let calib_path = self.layout.calibration_path(sample_id);
            Some(Calibration::load(&calib_path).in_sample(sample_id, &calib_path)?)
        } else {
            None
        };

        let objects = raw_labels
            .into_iter()
            .map(|raw| {
                self.converter
                    .convert(raw, calibration.as_ref())
                    .map(|raw| raw.to_object(&transform, &self.registry))
            })
            .collect::<Result<Vec<_>, _>>()
            .in_sample(sample_id, &label_path)?;
        Ok((cloud, objects))
    }
}
