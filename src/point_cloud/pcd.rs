use std::path::Path;

use pcd_rs::{DynReader, Field};

use crate::{PointCloud, PointCloudError};

fn first_value(field: &Field) -> Option<f32> {
    match field {
        Field::I8(v) => v.first().map(|v| *v as f32),
        Field::I16(v) => v.first().map(|v| *v as f32),
        Field::I32(v) => v.first().map(|v| *v as f32),
        Field::U8(v) => v.first().map(|v| *v as f32),
        Field::U16(v) => v.first().map(|v| *v as f32),
        Field::U32(v) => v.first().map(|v| *v as f32),
        Field::F32(v) => v.first().copied(),
        Field::F64(v) => v.first().map(|v| *v as f32),
    }
}

/// Reads `x`, `y`, `z` and an optional `intensity` field from a PCD file.
pub fn read_pcd(path: impl AsRef<Path>) -> Result<PointCloud, PointCloudError> {
    let reader = DynReader::open(path).map_err(|err| PointCloudError::Pcd(err.to_string()))?;
    let names = reader
        .meta()
        .field_defs
        .fields
        .iter()
        .map(|def| def.name.clone())
        .collect::<Vec<_>>();
    let find = |name: &str| names.iter().position(|n| n == name);
    let required = |name: &'static str| find(name).ok_or(PointCloudError::MissingProperty(name));
    let (x, y, z) = (required("x")?, required("y")?, required("z")?);
    let intensity = find("intensity");

    reader
        .map(|record| {
            let record = record.map_err(|err| PointCloudError::Pcd(err.to_string()))?;
            let fields = &record.0;
            let value = |idx: usize| {
                fields
                    .get(idx)
                    .and_then(first_value)
                    .ok_or_else(|| PointCloudError::Pcd(format!("field {idx} has no value")))
            };
            Ok([
                value(x)?,
                value(y)?,
                value(z)?,
                intensity.map(value).transpose()?.unwrap_or(0.),
            ])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_pcd_with_intensity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000003.pcd");
        std::fs::write(
            &path,
            "# .PCD v0.7 - Point Cloud Data file format\nVERSION 0.7\nFIELDS x y z intensity\nSIZE 4 4 4 4\nTYPE F F F F\nCOUNT 1 1 1 1\nWIDTH 2\nHEIGHT 1\nVIEWPOINT 0 0 0 1 0 0 0\nPOINTS 2\nDATA ascii\n1 2 3 0.5\n4 5 6 0.25\n",
        )
        .unwrap();
        let cloud = read_pcd(&path).unwrap();
        assert_eq!(&[[1., 2., 3., 0.5], [4., 5., 6., 0.25]], cloud.points());
    }

    #[test]
    fn ascii_pcd_without_intensity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000004.pcd");
        std::fs::write(
            &path,
            "VERSION 0.7\nFIELDS x y z\nSIZE 4 4 4\nTYPE F F F\nCOUNT 1 1 1\nWIDTH 1\nHEIGHT 1\nVIEWPOINT 0 0 0 1 0 0 0\nPOINTS 1\nDATA ascii\n-1 0.5 2\n",
        )
        .unwrap();
        let cloud = read_pcd(&path).unwrap();
        assert_eq!(&[[-1., 0.5, 2., 0.]], cloud.points());
    }
}
