use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::{ClassRegistry, ClassRegistryBuilder, RegistryError, CLASS_REGISTRY_FILE};

use super::registry::sorted_files_with_extension;

/// Annotation document written by the labelCloud tool, one per scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelCloudDocument {
    /// Scan file name, e.g. `000001.ply`.
    pub filename: String,
    pub objects: Vec<LabelCloudObject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelCloudObject {
    pub name: String,
    pub centroid: Xyz,
    pub dimensions: Dimensions,
    /// Degrees.
    pub rotations: Xyz,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Xyz {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

impl LabelCloudObject {
    /// `<name> x y z length width height rx ry rz`
    pub fn to_label_line(&self) -> String {
        let Xyz { x, y, z } = self.centroid;
        let Dimensions {
            length,
            width,
            height,
        } = self.dimensions;
        let r = self.rotations;
        [x, y, z, length, width, height, r.x, r.y, r.z]
            .iter()
            .fold(self.name.clone(), |line, value| format!("{line} {value}"))
    }
}

impl LabelCloudDocument {
    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }

    /// Scan file name without its `.ply` suffix.
    pub fn sample_stem(&self) -> &str {
        self.filename
            .strip_suffix(".ply")
            .unwrap_or(&self.filename)
    }

    pub fn to_label_text(&self) -> String {
        self.objects
            .iter()
            .map(|o| o.to_label_line() + "\n")
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("Can't access {path:?}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid labelCloud document {path:?}: {source}")]
    Json {
        path: std::path::PathBuf,
        source: serde_json::Error,
    },
}

/// Converts every `*.json` document in `json_dir` (in name order) into a `<stem>.txt` label file
/// in `out_dir`, and writes the class registry of first-seen names next to them.
pub fn convert_labelcloud_dir(
    json_dir: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
) -> Result<ClassRegistry, ConversionError> {
    let out_dir = out_dir.as_ref();
    let mut builder = ClassRegistryBuilder::default();
    let files = sorted_files_with_extension(json_dir.as_ref(), "json")?;

    for path in files.iter() {
        let data = std::fs::read_to_string(path).map_err(|source| ConversionError::Io {
            path: path.to_owned(),
            source,
        })?;
        let document =
            LabelCloudDocument::from_json(&data).map_err(|source| ConversionError::Json {
                path: path.to_owned(),
                source,
            })?;
        for object in document.objects.iter() {
            builder.observe(object.name.as_str());
        }
        let target = out_dir.join(format!("{}.txt", document.sample_stem()));
        std::fs::write(&target, document.to_label_text()).map_err(|source| {
            ConversionError::Io {
                path: target.clone(),
                source,
            }
        })?;
    }

    let registry = builder.build();
    registry.save(out_dir.join(CLASS_REGISTRY_FILE))?;
    info!(
        "Converted {} labelCloud file(s), {} classes",
        files.len(),
        registry.len()
    );
    Ok(registry)
}
