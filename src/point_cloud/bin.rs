use std::{
    fs::File,
    io::{Read, Write},
    path::Path,
};

use crate::{PointCloud, PointCloudError};

const POINT_SIZE: usize = std::mem::size_of::<[f32; 4]>();

/// Reads a flat array of `[x, y, z, intensity]` f32 records.
// Host byte order is assumed to be little endian, like the files written by the LiDAR tooling.
#[cfg(target_endian = "little")]
pub fn read_bin(path: impl AsRef<Path>) -> Result<PointCloud, PointCloudError> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len() as usize;
    if len % POINT_SIZE != 0 {
        return Err(PointCloudError::InvalidLength {
            len,
            point_size: POINT_SIZE,
        });
    }
    let mut points = vec![[0f32; 4]; len / POINT_SIZE];
    file.read_exact(bytemuck::cast_slice_mut(&mut points))?;
    Ok(PointCloud::new(points))
}

#[cfg(target_endian = "little")]
pub fn write_bin(path: impl AsRef<Path>, cloud: &PointCloud) -> Result<(), PointCloudError> {
    let mut file = File::create(path)?;
    file.write_all(bytemuck::cast_slice(cloud.points()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000001.bin");
        let cloud = PointCloud::new(vec![[1., 2., 3., 0.5], [-4., 5.5, -0.25, 1.]]);
        write_bin(&path, &cloud).unwrap();
        assert_eq!(cloud, read_bin(&path).unwrap());
    }

    #[test]
    fn reject_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000002.bin");
        std::fs::write(&path, [0u8; 18]).unwrap();
        let err = read_bin(&path).unwrap_err();
        assert!(
            matches!(
                err,
                PointCloudError::InvalidLength {
                    len: 18,
                    point_size: 16
                }
            ),
            "{err}"
        );
    }
}
