use std::{ops::Deref, path::Path};

use serde::{Deserialize, Serialize};

use crate::RasterGeometry;

mod boundary;

pub use boundary::*;

/// Cell count of the default square raster.
pub const DEFAULT_BEV_SIZE: usize = 608;

/// How the points falling into one cell are reduced to a single channel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Max,
    Mean,
}

fn default_density_saturation() -> f32 {
    64.
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BevConfigRaw {
    pub boundary: SpatialBoundary,
    /// Cell edge length in boundary units.
    pub discretization: f32,
    /// Point count at which the density channel saturates at 1.
    #[serde(default = "default_density_saturation")]
    pub density_saturation: f32,
    #[serde(default)]
    pub height_aggregation: Aggregation,
    #[serde(default)]
    pub intensity_aggregation: Aggregation,
}

/// Validated rasterization settings. The X and Y extents are integral multiples of the discretization.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct BevConfig(BevConfigRaw);

impl BevConfig {
    pub fn new(boundary: SpatialBoundary, discretization: f32) -> Result<Self, InvalidConfig> {
        BevConfigRaw {
            boundary,
            discretization,
            density_saturation: default_density_saturation(),
            height_aggregation: Aggregation::default(),
            intensity_aggregation: Aggregation::default(),
        }
        .try_into()
    }

    pub fn with_aggregation(self, height: Aggregation, intensity: Aggregation) -> Self {
        Self(BevConfigRaw {
            height_aggregation: height,
            intensity_aggregation: intensity,
            ..self.0
        })
    }

    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json(&data).map_err(|source| ConfigLoadError::Json {
            path: path.to_owned(),
            source,
        })
    }

    pub fn geometry(&self) -> RasterGeometry {
        RasterGeometry::new(self.boundary, self.discretization)
    }
}

impl Default for BevConfig {
    fn default() -> Self {
        let boundary = SpatialBoundary::default();
        Self(BevConfigRaw {
            discretization: boundary.extent_x() / DEFAULT_BEV_SIZE as f32,
            boundary,
            density_saturation: default_density_saturation(),
            height_aggregation: Aggregation::default(),
            intensity_aggregation: Aggregation::default(),
        })
    }
}

impl Deref for BevConfig {
    type Target = BevConfigRaw;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<BevConfig> for BevConfigRaw {
    fn from(value: BevConfig) -> Self {
        value.0
    }
}

impl TryFrom<BevConfigRaw> for BevConfig {
    type Error = InvalidConfig;

    fn try_from(value: BevConfigRaw) -> Result<Self, Self::Error> {
        let step = value.discretization;
        if !(step.is_finite() && step > 0.) {
            return Err(InvalidConfig::new(format!(
                "Discretization has to be positive, got {step}"
            )));
        }
        for (axis, extent) in [
            ("X", value.boundary.extent_x()),
            ("Y", value.boundary.extent_y()),
        ] {
            let cells = extent / step;
            if (cells - cells.round()).abs() > 1e-3 || cells.round() < 1. {
                return Err(InvalidConfig::new(format!(
                    "Boundary {axis} extent ({extent}) is not a multiple of the discretization ({step})"
                )));
            }
        }
        if !(value.density_saturation > 1.) {
            return Err(InvalidConfig::new(format!(
                "Density saturation has to be > 1, got {}",
                value.density_saturation
            )));
        }
        Ok(Self(value))
    }
}

impl<'de> Deserialize<'de> for BevConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let inner = BevConfigRaw::deserialize(deserializer)?;
        inner
            .try_into()
            .map_err(<D::Error as serde::de::Error>::custom)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{reason}")]
pub struct InvalidConfig {
    reason: String,
}

impl InvalidConfig {
    pub(crate) fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Can't read config {path:?}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config {path:?}: {source}")]
    Json {
        path: std::path::PathBuf,
        source: serde_json::Error,
    },
}
