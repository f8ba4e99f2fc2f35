use std::{f32::consts::PI, fs::File, io::BufRead, io::BufReader, path::Path, str::FromStr};

use crate::NormalizationTransform;

mod labelcloud;
mod registry;

pub use labelcloud::*;
pub use registry::*;

/// One label line as written by the annotation tool: `<class> x y z length width height rx ry rz`.
/// Angles are in degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLabel {
    pub class_name: String,
    pub centroid: [f32; 3],
    /// (length, width, height)
    pub dimensions: [f32; 3],
    pub rotation_deg: [f32; 3],
}

const LABEL_FIELDS: usize = 10;

impl FromStr for RawLabel {
    type Err = LabelFormatError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields = line.split_whitespace().collect::<Vec<_>>();
        if fields.len() != LABEL_FIELDS {
            return Err(LabelFormatError::FieldCount(fields.len()));
        }
        let mut values = [0f32; LABEL_FIELDS - 1];
        for (idx, (value, field)) in values.iter_mut().zip(&fields[1..]).enumerate() {
            *value = field
                .parse()
                .map_err(|_| LabelFormatError::InvalidNumber {
                    column: idx + 1,
                    value: field.to_string(),
                })?;
        }
        let [x, y, z, length, width, height, rx, ry, rz] = values;
        Ok(Self {
            class_name: fields[0].to_string(),
            centroid: [x, y, z],
            dimensions: [length, width, height],
            rotation_deg: [rx, ry, rz],
        })
    }
}

impl RawLabel {
    /// Moves the box into the normalized frame and resolves its class id.
    pub fn to_object(
        &self,
        transform: &NormalizationTransform,
        registry: &ClassRegistry,
    ) -> ObjectLabel {
        let [x, y, z] = self.centroid;
        let [length, width, height] = self.dimensions;
        let [rx, ry, rz] = self.rotation_deg;
        let (x, y) = transform.apply_xy(x, y);
        ObjectLabel {
            class_id: registry.id_of(&self.class_name),
            class_name: self.class_name.clone(),
            x,
            y,
            z: transform.apply_z(z),
            length: length * transform.ratio,
            width: width * transform.ratio,
            height,
            rx: tilt_to_radians(rx),
            ry: tilt_to_radians(ry),
            rz: rz.to_radians(),
        }
    }
}

/// Tilt conversion of the existing training data: the degree value is divided by pi before the
/// degree-to-radian conversion.
#[inline]
pub fn tilt_to_radians(deg: f32) -> f32 {
    (deg / PI).to_radians()
}

/// Box in the normalized frame. Angles in radians, `rz` is the heading.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectLabel {
    pub class_name: String,
    /// `None` when the class is missing from the registry.
    pub class_id: Option<usize>,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub length: f32,
    pub width: f32,
    pub height: f32,
    pub rx: f32,
    pub ry: f32,
    pub rz: f32,
}

impl ObjectLabel {
    pub fn bev_label(&self) -> BevLabel {
        BevLabel {
            x: self.x,
            y: self.y,
            z: self.z,
            h: self.height,
            w: self.width,
            l: self.length,
            rz: self.rz,
        }
    }
}

/// `(x, y, z, h, w, l, rz)` as consumed by the target encoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BevLabel {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub h: f32,
    pub w: f32,
    pub l: f32,
    pub rz: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum LabelFormatError {
    #[error("Expected 10 fields, got {0}")]
    FieldCount(usize),
    #[error("Column {column} is not a number: '{value}'")]
    InvalidNumber { column: usize, value: String },
}

#[derive(Debug, thiserror::Error)]
pub enum LabelParseError {
    #[error("Failed to read label file")]
    Io(#[from] std::io::Error),
    #[error("Line {line}: {source}")]
    Line {
        line: usize,
        source: LabelFormatError,
    },
}

/// Parses every non-blank line. The first malformed line aborts the whole file.
pub fn read_raw_labels(path: impl AsRef<Path>) -> Result<Vec<RawLabel>, LabelParseError> {
    let reader = BufReader::new(File::open(path)?);
    let mut labels = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        labels.push(line.parse().map_err(|source| LabelParseError::Line {
            line: idx + 1,
            source,
        })?);
    }
    Ok(labels)
}

pub fn read_label_file(
    path: impl AsRef<Path>,
    transform: &NormalizationTransform,
    registry: &ClassRegistry,
) -> Result<Vec<ObjectLabel>, LabelParseError> {
    Ok(read_raw_labels(path)?
        .iter()
        .map(|raw| raw.to_object(transform, registry))
        .collect())
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn registry() -> ClassRegistry {
        ClassRegistry::from_names(["door", "stairs", "window"])
    }

    #[test]
    fn parse_line() {
        let raw: RawLabel = "stairs 40 0 0.5 2 1.5 3 0 90 180".parse().unwrap();
        assert_eq!("stairs", raw.class_name);
        assert_eq!([40., 0., 0.5], raw.centroid);
        assert_eq!([2., 1.5, 3.], raw.dimensions);
        assert_eq!([0., 90., 180.], raw.rotation_deg);
    }

    #[test]
    fn reject_short_line() {
        let err = "door 1 2 3 4 5 6 7 8".parse::<RawLabel>().unwrap_err();
        assert!(matches!(err, LabelFormatError::FieldCount(9)), "{err}");
    }

    #[test]
    fn reject_garbage_number() {
        let err = "door 1 2 3 4 five 6 7 8 9".parse::<RawLabel>().unwrap_err();
        assert!(
            matches!(err, LabelFormatError::InvalidNumber { column: 5, .. }),
            "{err}"
        );
    }

    #[test]
    fn transform_scales_footprint_but_not_height() {
        let transform = NormalizationTransform {
            ratio: 0.5,
            x_offset: 0.,
            y_offset: -20.,
            z_offset: -2.5,
            limits: None,
        };
        let raw: RawLabel = "door 40 0 0 4 2 3 0 0 90".parse().unwrap();
        let object = raw.to_object(&transform, &registry());
        assert_eq!(Some(0), object.class_id);
        assert_eq!((20., -20., -2.5), (object.x, object.y, object.z));
        assert_eq!((2., 1., 3.), (object.length, object.width, object.height));
        assert_relative_eq!(std::f32::consts::FRAC_PI_2, object.rz);
    }

    #[test]
    fn tilt_keeps_divided_by_pi_conversion() {
        let raw: RawLabel = "window 0 0 0 1 1 1 180 90 45".parse().unwrap();
        let object = raw.to_object(&NormalizationTransform::IDENTITY, &registry());
        // 180 deg -> (180 / pi) deg -> 1 rad
        assert_relative_eq!(1., object.rx, epsilon = 1e-6);
        assert_relative_eq!(0.5, object.ry, epsilon = 1e-6);
        assert_relative_eq!(std::f32::consts::FRAC_PI_4, object.rz, epsilon = 1e-6);
    }

    #[test]
    fn unknown_class_is_unresolved() {
        let raw: RawLabel = "chair 1 1 1 1 1 1 0 0 0".parse().unwrap();
        let object = raw.to_object(&NormalizationTransform::IDENTITY, &registry());
        assert_eq!(None, object.class_id);
    }

    #[test]
    fn centroid_round_trips_through_inverse() {
        let transform = NormalizationTransform {
            ratio: 0.173,
            x_offset: 4.25,
            y_offset: -31.5,
            z_offset: 1.1,
            limits: None,
        };
        let raw: RawLabel = "door 123.4 -56.7 0.3 1 1 1 0 0 0".parse().unwrap();
        let object = raw.to_object(&transform, &registry());
        let (x, y) = transform.invert_xy(object.x, object.y);
        assert_relative_eq!(123.4, x, epsilon = 1e-3);
        assert_relative_eq!(-56.7, y, epsilon = 1e-3);
        assert_relative_eq!(0.3, transform.invert_z(object.z), epsilon = 1e-5);
    }

    #[test]
    fn file_with_bad_line_fails_with_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000001.txt");
        std::fs::write(&path, "door 1 2 3 4 5 6 7 8 9\nstairs 1 2 3\n").unwrap();
        let err = read_raw_labels(&path).unwrap_err();
        assert!(matches!(err, LabelParseError::Line { line: 2, .. }), "{err}");
    }

    #[test]
    fn file_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000001.txt");
        std::fs::write(&path, "door 1 2 3 4 5 6 7 8 9\n\nchair 1 2 3 4 5 6 7 8 9\n").unwrap();
        let objects =
            read_label_file(&path, &NormalizationTransform::IDENTITY, &registry()).unwrap();
        assert_eq!(2, objects.len());
        assert_eq!(Some(0), objects[0].class_id);
        assert_eq!(None, objects[1].class_id);
    }
}
