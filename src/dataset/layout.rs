use std::{
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::{PointCloudFormat, CLASS_REGISTRY_FILE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    #[default]
    Train,
    Val,
    Test,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Train => "train",
            Mode::Val => "val",
            Mode::Test => "test",
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = Box<dyn std::error::Error + Send + Sync>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Self::Train),
            "val" => Ok(Self::Val),
            "test" => Ok(Self::Test),
            s => Err(format!("Can't parse '{}' into Mode", s).into()),
        }
    }
}

/// Paths of a KITTI style dataset directory:
///
/// ```text
/// <root>/classes_names.txt
/// <root>/ImageSets/{train,val,test}.txt
/// <root>/{training,testing}/{velodyne,label_2,calib,image_2}/{id:06}.*
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetLayout {
    root: PathBuf,
    mode: Mode,
    point_cloud_format: PointCloudFormat,
}

impl DatasetLayout {
    pub fn new(root: impl Into<PathBuf>, mode: Mode, point_cloud_format: PointCloudFormat) -> Self {
        Self {
            root: root.into(),
            mode,
            point_cloud_format,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn point_cloud_format(&self) -> PointCloudFormat {
        self.point_cloud_format
    }

    fn sample_dir(&self, kind: &str) -> PathBuf {
        let split = if self.mode == Mode::Test {
            "testing"
        } else {
            "training"
        };
        self.root.join(split).join(kind)
    }

    pub fn point_cloud_path(&self, sample_id: u32) -> PathBuf {
        self.sample_dir("velodyne").join(format!(
            "{sample_id:06}.{}",
            self.point_cloud_format.extension()
        ))
    }

    pub fn label_path(&self, sample_id: u32) -> PathBuf {
        self.sample_dir("label_2")
            .join(format!("{sample_id:06}.txt"))
    }

    pub fn calibration_path(&self, sample_id: u32) -> PathBuf {
        self.sample_dir("calib").join(format!("{sample_id:06}.txt"))
    }

    pub fn image_path(&self, sample_id: u32) -> PathBuf {
        self.sample_dir("image_2")
            .join(format!("{sample_id:06}.png"))
    }

    pub fn split_path(&self) -> PathBuf {
        self.root
            .join("ImageSets")
            .join(format!("{}.txt", self.mode))
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root.join(CLASS_REGISTRY_FILE)
    }

    /// Sample ids listed in the split manifest, in file order.
    pub fn read_split(&self) -> Result<Vec<u32>, SplitError> {
        let path = self.split_path();
        let data = std::fs::read_to_string(&path).map_err(|source| SplitError::Io {
            path: path.clone(),
            source,
        })?;
        data.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                line.trim().parse().map_err(|_| SplitError::InvalidId {
                    path: path.clone(),
                    line: idx + 1,
                    value: line.trim().to_string(),
                })
            })
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SplitError {
    #[error("Can't read split manifest {path:?}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path:?} line {line}: '{value}' is not a sample id")]
    InvalidId {
        path: PathBuf,
        line: usize,
        value: String,
    },
}
