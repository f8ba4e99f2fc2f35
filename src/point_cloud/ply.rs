use std::{
    fs::File,
    io::{BufRead, BufReader, Read},
    path::Path,
};

use crate::{PointCloud, PointCloudError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlyScalar {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
    Float64,
}

impl PlyScalar {
    fn parse(name: &str) -> Result<Self, PointCloudError> {
        Ok(match name {
            "char" | "int8" => Self::Int8,
            "uchar" | "uint8" => Self::UInt8,
            "short" | "int16" => Self::Int16,
            "ushort" | "uint16" => Self::UInt16,
            "int" | "int32" => Self::Int32,
            "uint" | "uint32" => Self::UInt32,
            "float" | "float32" => Self::Float32,
            "double" | "float64" => Self::Float64,
            other => {
                return Err(PointCloudError::Ply(format!(
                    "unsupported property type '{other}'"
                )))
            }
        })
    }

    fn size_of(&self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    /// `bytes` holds exactly `size_of()` little-endian bytes.
    fn decode_le(&self, bytes: &[u8]) -> f64 {
        match self {
            Self::Int8 => bytes[0] as i8 as f64,
            Self::UInt8 => bytes[0] as f64,
            Self::Int16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f64,
            Self::UInt16 => u16::from_le_bytes([bytes[0], bytes[1]]) as f64,
            Self::Int32 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
            Self::UInt32 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
            Self::Float32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
            Self::Float64 => f64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]),
        }
    }

    /// Integer colour channels are scaled to `[0, 1]`.
    fn color_scale(&self) -> f64 {
        match self {
            Self::Int8 => i8::MAX as f64,
            Self::UInt8 => u8::MAX as f64,
            Self::Int16 => i16::MAX as f64,
            Self::UInt16 => u16::MAX as f64,
            Self::Int32 => i32::MAX as f64,
            Self::UInt32 => u32::MAX as f64,
            Self::Float32 | Self::Float64 => 1.,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlyEncoding {
    Ascii,
    BinaryLittleEndian,
}

#[derive(Debug)]
struct PlyProperty {
    name: String,
    scalar: PlyScalar,
}

#[derive(Debug)]
struct PlyHeader {
    encoding: PlyEncoding,
    vertex_count: usize,
    properties: Vec<PlyProperty>,
}

fn parse_header<R: BufRead>(reader: &mut R) -> Result<PlyHeader, PointCloudError> {
    let mut line = String::new();
    let mut encoding = None;
    let mut vertex_count = None;
    let mut in_vertex = false;
    let mut properties = Vec::new();

    reader.read_line(&mut line)?;
    if line.trim() != "ply" {
        return Err(PointCloudError::Ply("missing magic 'ply'".into()));
    }

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(PointCloudError::Ply("header without end_header".into()));
        }
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("end_header") => break,
            Some("format") => {
                encoding = Some(match parts.next() {
                    Some("ascii") => PlyEncoding::Ascii,
                    Some("binary_little_endian") => PlyEncoding::BinaryLittleEndian,
                    other => {
                        return Err(PointCloudError::Ply(format!(
                            "unsupported format {other:?}"
                        )))
                    }
                });
            }
            Some("element") => {
                let name = parts.next();
                if vertex_count.is_none() && name != Some("vertex") {
                    return Err(PointCloudError::Ply(
                        "vertex has to be the first element".into(),
                    ));
                }
                in_vertex = name == Some("vertex");
                if in_vertex {
                    vertex_count = Some(
                        parts
                            .next()
                            .and_then(|s| s.parse().ok())
                            .ok_or_else(|| PointCloudError::Ply("invalid vertex count".into()))?,
                    );
                }
            }
            Some("property") if in_vertex => match (parts.next(), parts.next()) {
                (Some("list"), _) => {
                    return Err(PointCloudError::Ply(
                        "list properties on vertices are not supported".into(),
                    ))
                }
                (Some(kind), Some(name)) => properties.push(PlyProperty {
                    name: name.to_string(),
                    scalar: PlyScalar::parse(kind)?,
                }),
                _ => return Err(PointCloudError::Ply(format!("invalid line '{}'", line.trim()))),
            },
            _ => {}
        }
    }

    Ok(PlyHeader {
        encoding: encoding.ok_or_else(|| PointCloudError::Ply("missing format".into()))?,
        vertex_count: vertex_count.ok_or_else(|| PointCloudError::Ply("missing vertex".into()))?,
        properties,
    })
}

/// Property indices used to assemble `[x, y, z, intensity]`.
struct VertexLayout {
    xyz: [usize; 3],
    intensity: Option<(usize, f64)>,
}

impl VertexLayout {
    fn from_properties(properties: &[PlyProperty]) -> Result<Self, PointCloudError> {
        let find = |name: &str| properties.iter().position(|p| p.name == name);
        let required = |name: &'static str| find(name).ok_or(PointCloudError::MissingProperty(name));
        let intensity = find("intensity")
            .map(|idx| (idx, 1.))
            .or_else(|| {
                find("red")
                    .or_else(|| find("r"))
                    .map(|idx| (idx, properties[idx].scalar.color_scale()))
            });
        Ok(Self {
            xyz: [required("x")?, required("y")?, required("z")?],
            intensity,
        })
    }

    fn assemble(&self, values: &[f64]) -> [f32; 4] {
        let [x, y, z] = self.xyz;
        let intensity = self
            .intensity
            .map(|(idx, scale)| values[idx] / scale)
            .unwrap_or(0.);
        [
            values[x] as f32,
            values[y] as f32,
            values[z] as f32,
            intensity as f32,
        ]
    }
}

/// Reads the vertex element of an ASCII or binary little-endian PLY file.
///
/// The intensity is taken from an `intensity` property, else from colour channel 0.
pub fn read_ply(path: impl AsRef<Path>) -> Result<PointCloud, PointCloudError> {
    let mut reader = BufReader::new(File::open(path)?);
    read_ply_from(&mut reader)
}

fn read_ply_from<R: BufRead>(reader: &mut R) -> Result<PointCloud, PointCloudError> {
    let header = parse_header(reader)?;
    let layout = VertexLayout::from_properties(&header.properties)?;
    let mut values = vec![0f64; header.properties.len()];
    let mut points = Vec::with_capacity(header.vertex_count);

    match header.encoding {
        PlyEncoding::BinaryLittleEndian => {
            let record_size = header.properties.iter().map(|p| p.scalar.size_of()).sum();
            let mut buffer = vec![0u8; record_size];
            for _ in 0..header.vertex_count {
                reader.read_exact(&mut buffer)?;
                let mut offset = 0;
                for (value, property) in values.iter_mut().zip(&header.properties) {
                    let size = property.scalar.size_of();
                    *value = property.scalar.decode_le(&buffer[offset..offset + size]);
                    offset += size;
                }
                points.push(layout.assemble(&values));
            }
        }
        PlyEncoding::Ascii => {
            let mut line = String::new();
            for vertex in 0..header.vertex_count {
                line.clear();
                if reader.read_line(&mut line)? == 0 {
                    return Err(PointCloudError::Ply(format!(
                        "expected {} vertices, got {vertex}",
                        header.vertex_count
                    )));
                }
                let mut fields = line.split_whitespace();
                for value in values.iter_mut() {
                    *value = fields
                        .next()
                        .and_then(|f| f.parse().ok())
                        .ok_or_else(|| {
                            PointCloudError::Ply(format!("invalid vertex line '{}'", line.trim()))
                        })?;
                }
                points.push(layout.assemble(&values));
            }
        }
    }

    Ok(PointCloud::new(points))
}
