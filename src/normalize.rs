use log::debug;

use crate::{PointCloud, SpatialBoundary};

/// Per-scan scale and offset aligning a raw point cloud with the boundary.
///
/// X and Y are scaled by `ratio` and shifted; Z is only shifted, so physical heights survive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationTransform {
    pub ratio: f32,
    pub x_offset: f32,
    pub y_offset: f32,
    pub z_offset: f32,
    /// Boundary ranges `[[minX, maxX], [minY, maxY], [minZ, maxZ]]` the scan was fitted onto.
    /// Results that overshoot them by rounding error are snapped onto the edge.
    pub limits: Option<[[f32; 2]; 3]>,
}

impl Default for NormalizationTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl NormalizationTransform {
    pub const IDENTITY: Self = Self {
        ratio: 1.,
        x_offset: 0.,
        y_offset: 0.,
        z_offset: 0.,
        limits: None,
    };

    /// `ratio = min(boundary X/Y extent) / max(scan X/Y extent)`, then offsets so the scaled
    /// X/Y minima and the unscaled Z minimum sit on the boundary minima.
    pub fn fit(cloud: &PointCloud, boundary: &SpatialBoundary) -> Result<Self, DegenerateGeometry> {
        let Some(first) = cloud.points().first() else {
            return Err(DegenerateGeometry::Empty);
        };
        let init = ([first[0], first[1], first[2]], [first[0], first[1]]);
        let (min, max) = cloud.iter().fold(init, |(min, max), p| {
            (
                [min[0].min(p[0]), min[1].min(p[1]), min[2].min(p[2])],
                [max[0].max(p[0]), max[1].max(p[1])],
            )
        });

        let scan_extent = (max[0] - min[0]).max(max[1] - min[1]);
        if !(scan_extent > 0.) {
            return Err(DegenerateGeometry::ZeroExtent {
                points: cloud.len(),
            });
        }
        let ratio = boundary.extent_x().min(boundary.extent_y()) / scan_extent;
        let transform = Self {
            ratio,
            x_offset: boundary.min_x - ratio * min[0],
            y_offset: boundary.min_y - ratio * min[1],
            z_offset: boundary.min_z - min[2],
            limits: Some([
                [boundary.min_x, boundary.max_x],
                [boundary.min_y, boundary.max_y],
                [boundary.min_z, boundary.max_z],
            ]),
        };
        if ![ratio, transform.x_offset, transform.y_offset, transform.z_offset]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(DegenerateGeometry::NonFinite(transform));
        }
        Ok(transform)
    }

    #[inline]
    fn snap(&self, axis: usize, value: f32, offset: f32) -> f32 {
        let Some(limits) = self.limits else {
            return value;
        };
        let [lo, hi] = limits[axis];
        let magnitude = value.abs().max(offset.abs()).max(hi.abs()).max(hi - lo).max(1.);
        let tolerance = 8. * f32::EPSILON * magnitude;
        if value < lo && lo - value <= tolerance {
            lo
        } else if value > hi && value - hi <= tolerance {
            hi
        } else {
            value
        }
    }

    #[inline]
    pub fn apply_xy(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.snap(0, x * self.ratio + self.x_offset, self.x_offset),
            self.snap(1, y * self.ratio + self.y_offset, self.y_offset),
        )
    }

    #[inline]
    pub fn apply_z(&self, z: f32) -> f32 {
        self.snap(2, z + self.z_offset, self.z_offset)
    }

    pub fn invert_xy(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.x_offset) / self.ratio,
            (y - self.y_offset) / self.ratio,
        )
    }

    pub fn invert_z(&self, z: f32) -> f32 {
        z - self.z_offset
    }

    pub fn apply(&self, cloud: &PointCloud) -> PointCloud {
        cloud
            .iter()
            .map(|&[x, y, z, intensity]| {
                let (x, y) = self.apply_xy(x, y);
                [x, y, self.apply_z(z), intensity]
            })
            .collect()
    }
}

/// Fits the transform for `cloud` and returns the normalized cloud alongside it.
pub fn normalize(
    cloud: &PointCloud,
    boundary: &SpatialBoundary,
) -> Result<(PointCloud, NormalizationTransform), DegenerateGeometry> {
    let transform = NormalizationTransform::fit(cloud, boundary)?;
    let normalized = transform.apply(cloud);
    if log::log_enabled!(log::Level::Debug) {
        let range = |axis: usize| {
            normalized
                .iter()
                .fold((f32::MAX, f32::MIN), |(lo, hi), p| (lo.min(p[axis]), hi.max(p[axis])))
        };
        debug!(
            "Normalized {} points with {transform:?}: X {:?}, Y {:?}, Z {:?}",
            normalized.len(),
            range(0),
            range(1),
            range(2)
        );
    }
    Ok((normalized, transform))
}

#[derive(Debug, thiserror::Error)]
pub enum DegenerateGeometry {
    #[error("Point cloud is empty")]
    Empty,
    #[error("Point cloud of {points} points has no X/Y extent")]
    ZeroExtent { points: usize },
    #[error("Normalization produced non-finite values: {0:?}")]
    NonFinite(NormalizationTransform),
}
