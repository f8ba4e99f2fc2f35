use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::InvalidConfig;

/// Field names follow the detector configuration files (`minX`, `maxX`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialBoundaryRaw {
    #[serde(rename = "minX")]
    pub min_x: f32,
    #[serde(rename = "maxX")]
    pub max_x: f32,
    #[serde(rename = "minY")]
    pub min_y: f32,
    #[serde(rename = "maxY")]
    pub max_y: f32,
    #[serde(rename = "minZ")]
    pub min_z: f32,
    #[serde(rename = "maxZ")]
    pub max_z: f32,
}

/// Physical region of interest mapped onto the raster. Every axis has `min < max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpatialBoundary(SpatialBoundaryRaw);

impl SpatialBoundary {
    pub fn new(
        (min_x, max_x): (f32, f32),
        (min_y, max_y): (f32, f32),
        (min_z, max_z): (f32, f32),
    ) -> Result<Self, InvalidConfig> {
        SpatialBoundaryRaw {
            min_x,
            max_x,
            min_y,
            max_y,
            min_z,
            max_z,
        }
        .try_into()
    }

    pub fn extent_x(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn extent_y(&self) -> f32 {
        self.max_y - self.min_y
    }

    pub fn extent_z(&self) -> f32 {
        self.max_z - self.min_z
    }

    /// Inclusive on both edges of every axis.
    pub fn contains(&self, x: f32, y: f32, z: f32) -> bool {
        (self.min_x..=self.max_x).contains(&x)
            && (self.min_y..=self.max_y).contains(&y)
            && (self.min_z..=self.max_z).contains(&z)
    }
}

impl Default for SpatialBoundary {
    fn default() -> Self {
        Self(SpatialBoundaryRaw {
            min_x: 0.,
            max_x: 50.,
            min_y: -25.,
            max_y: 25.,
            min_z: -2.73,
            max_z: 1.27,
        })
    }
}

impl Deref for SpatialBoundary {
    type Target = SpatialBoundaryRaw;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<SpatialBoundary> for SpatialBoundaryRaw {
    fn from(value: SpatialBoundary) -> Self {
        value.0
    }
}

impl TryFrom<SpatialBoundaryRaw> for SpatialBoundary {
    type Error = InvalidConfig;

    fn try_from(value: SpatialBoundaryRaw) -> Result<Self, Self::Error> {
        for (axis, min, max) in [
            ("X", value.min_x, value.max_x),
            ("Y", value.min_y, value.max_y),
            ("Z", value.min_z, value.max_z),
        ] {
            if !min.is_finite() || !max.is_finite() {
                return Err(InvalidConfig::new(format!(
                    "Boundary {axis} must be finite, got [{min}, {max}]"
                )));
            }
            if min >= max {
                return Err(InvalidConfig::new(format!(
                    "Boundary min{axis} ({min}) must be smaller than max{axis} ({max})"
                )));
            }
        }
        Ok(Self(value))
    }
}

impl<'de> Deserialize<'de> for SpatialBoundary {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = SpatialBoundaryRaw::deserialize(deserializer)?;
        raw.try_into()
            .map_err(<D::Error as serde::de::Error>::custom)
    }
}
