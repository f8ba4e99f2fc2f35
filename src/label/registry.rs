use std::{
    fs::File,
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use log::info;

pub const CLASS_REGISTRY_FILE: &str = "classes_names.txt";

/// Ordered, duplicate free class names. The position of a name is its class id.
///
/// Only [`ClassRegistryBuilder`] and the constructors below create one; once built it is never
/// mutated, so it can be shared by every sample of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassRegistry {
    names: Box<[String]>,
}

impl ClassRegistry {
    /// Keeps the first occurrence of each name.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut builder = ClassRegistryBuilder::default();
        for name in names {
            builder.observe(name);
        }
        builder.build()
    }

    pub fn id_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn name_of(&self, id: usize) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// One class name per line, blank lines ignored.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let io_err = |source| RegistryError::Io {
            path: path.to_owned(),
            source,
        };
        let reader = BufReader::new(File::open(path).map_err(io_err)?);
        let mut builder = ClassRegistryBuilder::default();
        for line in reader.lines() {
            let line = line.map_err(io_err)?;
            let name = line.trim();
            if !name.is_empty() {
                builder.observe(name);
            }
        }
        Ok(builder.build())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RegistryError> {
        let path = path.as_ref();
        let io_err = |source| RegistryError::Io {
            path: path.to_owned(),
            source,
        };
        let mut file = File::create(path).map_err(io_err)?;
        for name in self.names() {
            writeln!(file, "{name}").map_err(io_err)?;
        }
        Ok(())
    }

    /// Builds the registry from the first token of every line of every `*.txt` label file in
    /// `dir`, visiting files in name order.
    pub fn scan_label_dir(dir: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let dir = dir.as_ref();
        let mut builder = ClassRegistryBuilder::default();
        let files = sorted_files_with_extension(dir, "txt")?;
        for path in files.iter() {
            if path.file_name().and_then(|n| n.to_str()) == Some(CLASS_REGISTRY_FILE) {
                continue;
            }
            let io_err = |source| RegistryError::Io {
                path: path.to_owned(),
                source,
            };
            let reader = BufReader::new(File::open(path).map_err(io_err)?);
            for line in reader.lines() {
                if let Some(name) = line.map_err(io_err)?.split_whitespace().next() {
                    builder.observe(name);
                }
            }
        }
        let registry = builder.build();
        info!(
            "Scanned {} label files in {dir:?}: {} classes",
            files.len(),
            registry.len()
        );
        Ok(registry)
    }
}

#[derive(Debug, Default)]
pub struct ClassRegistryBuilder {
    names: Vec<String>,
}

impl ClassRegistryBuilder {
    pub fn observe(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.names.contains(&name) {
            self.names.push(name);
        }
    }

    pub fn build(self) -> ClassRegistry {
        ClassRegistry {
            names: self.names.into_boxed_slice(),
        }
    }
}

pub(crate) fn sorted_files_with_extension(
    dir: &Path,
    extension: &str,
) -> Result<Vec<PathBuf>, RegistryError> {
    let io_err = |source| RegistryError::Io {
        path: dir.to_owned(),
        source,
    };
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(extension) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Can't access {path:?}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
