use std::{collections::HashMap, path::Path};

use nalgebra as na;

use crate::RawLabel;

/// KITTI style camera/LiDAR calibration.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    /// Left colour camera projection.
    pub p2: na::Matrix3x4<f32>,
    pub r0_rect: na::Matrix3<f32>,
    /// `Tr_velo_to_cam` extended to a homogeneous transform.
    pub velo_to_cam: na::Matrix4<f32>,
}

impl Calibration {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CalibrationError> {
        let data = std::fs::read_to_string(path)?;
        data.parse()
    }

    /// Rectified camera frame to LiDAR frame: `inv(Tr_velo_to_cam) * inv(R0_rect) * p`.
    pub fn camera_to_lidar(&self, point: [f32; 3]) -> Result<[f32; 3], CalibrationError> {
        let r0_inv = self
            .r0_rect
            .try_inverse()
            .ok_or(CalibrationError::Singular("R0_rect"))?;
        let cam_to_velo = self
            .velo_to_cam
            .try_inverse()
            .ok_or(CalibrationError::Singular("Tr_velo_to_cam"))?;
        let rect = na::Point3::from(r0_inv * na::Vector3::from(point));
        Ok(cam_to_velo.transform_point(&rect).coords.into())
    }
}

fn values<const N: usize>(
    entries: &HashMap<&str, Vec<f32>>,
    key: &'static str,
) -> Result<[f32; N], CalibrationError> {
    let values = entries.get(key).ok_or(CalibrationError::MissingKey(key))?;
    values
        .as_slice()
        .try_into()
        .map_err(|_| CalibrationError::WrongCount {
            key,
            expected: N,
            found: values.len(),
        })
}

impl std::str::FromStr for Calibration {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut entries = HashMap::new();
        for line in s.lines() {
            let Some((key, rest)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            let parsed = rest
                .split_whitespace()
                .map(|v| v.parse::<f32>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| CalibrationError::InvalidValue(key.to_string()))?;
            entries.insert(key, parsed);
        }
        let velo_to_cam = values::<12>(&entries, "Tr_velo_to_cam")?;
        let homogeneous: [f32; 16] = std::array::from_fn(|i| match i {
            0..=11 => velo_to_cam[i],
            15 => 1.,
            _ => 0.,
        });
        Ok(Self {
            p2: na::Matrix3x4::from_row_slice(&values::<12>(&entries, "P2")?),
            r0_rect: na::Matrix3::from_row_slice(&values::<9>(&entries, "R0_rect")?),
            velo_to_cam: na::Matrix4::from_row_slice(&homogeneous),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    #[error("Failed to read calibration")]
    Io(#[from] std::io::Error),
    #[error("Calibration is missing '{0}'")]
    MissingKey(&'static str),
    #[error("'{key}' has {found} values, expected {expected}")]
    WrongCount {
        key: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("'{0}' contains a value which is not a number")]
    InvalidValue(String),
    #[error("'{0}' is not invertible")]
    Singular(&'static str),
    #[error("Conversion requires a calibration, but none was loaded")]
    NotLoaded,
}

/// Moves raw labels from the annotation frame into the point cloud frame, before normalization.
pub trait CoordinateFrameConverter: Send + Sync {
    /// The dataset only loads `calib/{id}.txt` for converters returning `true`.
    fn requires_calibration(&self) -> bool {
        false
    }

    fn convert(
        &self,
        label: RawLabel,
        calibration: Option<&Calibration>,
    ) -> Result<RawLabel, CalibrationError>;
}

/// Labels are annotated directly in the point cloud, nothing to convert.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityConverter;

impl CoordinateFrameConverter for IdentityConverter {
    fn convert(
        &self,
        label: RawLabel,
        _calibration: Option<&Calibration>,
    ) -> Result<RawLabel, CalibrationError> {
        Ok(label)
    }
}

/// Labels annotated in the rectified camera frame with the heading around the camera Y axis.
/// The converted heading is `-ry - 90` degrees.
#[derive(Debug, Clone, Copy, Default)]
pub struct CameraToLidarConverter;

impl CoordinateFrameConverter for CameraToLidarConverter {
    fn requires_calibration(&self) -> bool {
        true
    }

    fn convert(
        &self,
        label: RawLabel,
        calibration: Option<&Calibration>,
    ) -> Result<RawLabel, CalibrationError> {
        let calibration = calibration.ok_or(CalibrationError::NotLoaded)?;
        let [rx, ry, _] = label.rotation_deg;
        Ok(RawLabel {
            centroid: calibration.camera_to_lidar(label.centroid)?,
            rotation_deg: [rx, ry, -ry - 90.],
            ..label
        })
    }
}
