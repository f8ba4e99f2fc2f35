use std::path::Path;

mod bin;
mod pcd;
mod ply;

pub use bin::*;
pub use pcd::*;
pub use ply::*;

/// Unordered scan points as `[x, y, z, intensity]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    points: Vec<[f32; 4]>,
}

impl PointCloud {
    pub fn new(points: Vec<[f32; 4]>) -> Self {
        Self { points }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[[f32; 4]] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f32; 4]> {
        self.points.iter()
    }

    pub fn into_points(self) -> Vec<[f32; 4]> {
        self.points
    }
}

impl FromIterator<[f32; 4]> for PointCloud {
    fn from_iter<T: IntoIterator<Item = [f32; 4]>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// On-disk point cloud encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PointCloudFormat {
    /// Flat little-endian `f32` quadruples.
    #[default]
    Bin,
    Ply,
    Pcd,
}

impl PointCloudFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            PointCloudFormat::Bin => "bin",
            PointCloudFormat::Ply => "ply",
            PointCloudFormat::Pcd => "pcd",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "bin" => Some(Self::Bin),
            "ply" => Some(Self::Ply),
            "pcd" => Some(Self::Pcd),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PointCloudError {
    #[error("Failed to read point cloud")]
    Io(#[from] std::io::Error),

    #[error("File length {len} is not a multiple of the point size {point_size}")]
    InvalidLength { len: usize, point_size: usize },

    #[error("Invalid PLY: {0}")]
    Ply(String),

    #[error("Invalid PCD: {0}")]
    Pcd(String),

    #[error("Missing point property '{0}'")]
    MissingProperty(&'static str),

    #[error("Unknown point cloud format for {0:?}")]
    UnknownFormat(std::path::PathBuf),
}

/// Reads a point cloud, choosing the decoder by file extension.
pub fn read_point_cloud(path: impl AsRef<Path>) -> Result<PointCloud, PointCloudError> {
    let path = path.as_ref();
    let format = PointCloudFormat::from_path(path)
        .ok_or_else(|| PointCloudError::UnknownFormat(path.to_owned()))?;
    read_point_cloud_as(path, format)
}

pub fn read_point_cloud_as(
    path: impl AsRef<Path>,
    format: PointCloudFormat,
) -> Result<PointCloud, PointCloudError> {
    match format {
        PointCloudFormat::Bin => read_bin(path),
        PointCloudFormat::Ply => read_ply(path),
        PointCloudFormat::Pcd => read_pcd(path),
    }
}
