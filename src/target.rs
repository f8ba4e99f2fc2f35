use log::debug;

use crate::{ObjectLabel, RasterGeometry};

/// Regression target of one object in normalized raster coordinates.
///
/// `x`/`w` follow the raster columns (world Y), `y`/`l` the rows (world X), see [`RasterGeometry`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetVector {
    /// Position of the sample inside its batch, 0 until collation.
    pub batch_index: usize,
    pub class_id: usize,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub l: f32,
    pub sin_yaw: f32,
    pub cos_yaw: f32,
}

impl TargetVector {
    /// `[batch_index, class, x, y, w, l, sin, cos]`
    pub fn to_array(&self) -> [f32; 8] {
        [
            self.batch_index as f32,
            self.class_id as f32,
            self.x,
            self.y,
            self.w,
            self.l,
            self.sin_yaw,
            self.cos_yaw,
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodedTargets {
    pub targets: Vec<TargetVector>,
    pub unresolved: usize,
    pub out_of_bounds: usize,
}

impl EncodedTargets {
    /// A sample without targets is not usable for training.
    pub fn no_objects(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Keeps objects with a resolved class whose centroid lies inside the boundary (inclusive)
/// and encodes them in input order.
pub fn encode_targets(objects: &[ObjectLabel], geometry: &RasterGeometry) -> EncodedTargets {
    let boundary = geometry.boundary();
    let mut encoded = EncodedTargets::default();
    for object in objects {
        let Some(class_id) = object.class_id else {
            debug!("Dropping object of unknown class '{}'", object.class_name);
            encoded.unresolved += 1;
            continue;
        };
        let bev = object.bev_label();
        if !boundary.contains(bev.x, bev.y, bev.z) {
            debug!(
                "Dropping '{}' outside of the boundary at ({}, {}, {})",
                object.class_name, bev.x, bev.y, bev.z
            );
            encoded.out_of_bounds += 1;
            continue;
        }
        let (x, y) = geometry.normalize_position(bev.x, bev.y);
        let (w, l) = geometry.normalize_size(bev.w, bev.l);
        let (sin_yaw, cos_yaw) = bev.rz.sin_cos();
        encoded.targets.push(TargetVector {
            batch_index: 0,
            class_id,
            x,
            y,
            w,
            l,
            sin_yaw,
            cos_yaw,
        });
    }
    encoded
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::{ClassRegistry, NormalizationTransform, RawLabel, SpatialBoundary};

    fn geometry() -> RasterGeometry {
        let boundary = SpatialBoundary::new((0., 50.), (-25., 25.), (-2., 4.)).unwrap();
        RasterGeometry::new(boundary, 0.1)
    }

    fn objects(lines: &[&str]) -> Vec<ObjectLabel> {
        let registry = ClassRegistry::from_names(["door", "stairs"]);
        lines
            .iter()
            .map(|line| {
                line.parse::<RawLabel>()
                    .unwrap()
                    .to_object(&NormalizationTransform::IDENTITY, &registry)
            })
            .collect()
    }

    #[test]
    fn encode_inside_object() {
        let encoded = encode_targets(&objects(&["stairs 12.5 5 0 10 2.5 1 0 0 30"]), &geometry());
        assert!(!encoded.no_objects());
        let target = encoded.targets[0];
        assert_eq!(1, target.class_id);
        assert_relative_eq!(0.6, target.x);
        assert_relative_eq!(0.25, target.y);
        assert_relative_eq!(0.05, target.w);
        assert_relative_eq!(0.2, target.l);
        assert_relative_eq!(0.5, target.sin_yaw, epsilon = 1e-6);
        assert_relative_eq!(
            1.,
            target.sin_yaw.powi(2) + target.cos_yaw.powi(2),
            epsilon = 1e-6
        );
    }

    #[test]
    fn unknown_class_removes_exactly_one() {
        let known = objects(&["door 1 1 0 1 1 1 0 0 0", "stairs 2 2 0 1 1 1 0 0 0"]);
        let mut mixed = known.clone();
        mixed.extend(objects(&["chair 3 3 0 1 1 1 0 0 0"]));
        let with_unknown = encode_targets(&mixed, &geometry());
        assert_eq!(
            encode_targets(&known, &geometry()).targets.len() + 1,
            mixed.len()
        );
        assert_eq!(2, with_unknown.targets.len());
        assert_eq!(1, with_unknown.unresolved);
    }

    #[test]
    fn drop_centroid_outside() {
        let encoded = encode_targets(
            &objects(&[
                "door 51 0 0 1 1 1 0 0 0",
                "door 10 -26 0 1 1 1 0 0 0",
                "door 10 0 5 1 1 1 0 0 0",
            ]),
            &geometry(),
        );
        assert!(encoded.no_objects());
        assert_eq!(3, encoded.out_of_bounds);
    }

    #[test]
    fn boundary_corners_are_inside_and_in_unit_range() {
        let encoded = encode_targets(
            &objects(&["door 0 -25 -2 1 1 1 0 0 0", "door 50 25 4 1 1 1 0 0 0"]),
            &geometry(),
        );
        assert_eq!(
            vec![(0., 0.), (1., 1.)],
            encoded
                .targets
                .iter()
                .map(|t| (t.x, t.y))
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn target_array_layout() {
        let target = TargetVector {
            batch_index: 3,
            class_id: 2,
            x: 0.1,
            y: 0.2,
            w: 0.3,
            l: 0.4,
            sin_yaw: 0.,
            cos_yaw: 1.,
        };
        assert_eq!([3., 2., 0.1, 0.2, 0.3, 0.4, 0., 1.], target.to_array());
    }
}
