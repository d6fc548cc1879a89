//! PLY (Polygon File Format) I/O
//!
//! PLY is a flexible format for storing 3D data with arbitrary properties.
//! Only the `vertex` element is loaded; fixed-size elements stored before it
//! are skipped and anything after it is ignored.

use crate::scalar::{ByteOrder, ScalarType};
use crate::{Error, Result};
use cv_core::point_cloud::PointCloud;
use nalgebra::{Point3, Vector3};
use std::io::{BufRead, Read, Write};

/// PLY body encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlyFormat {
    Ascii,
    BinaryLittleEndian,
    BinaryBigEndian,
}

#[derive(Debug, Clone)]
enum PlyProperty {
    Scalar { name: String, ty: ScalarType },
    List { name: String },
}

#[derive(Debug, Clone)]
struct PlyElement {
    name: String,
    count: usize,
    properties: Vec<PlyProperty>,
}

impl PlyElement {
    fn record_size(&self) -> Result<usize> {
        self.properties
            .iter()
            .map(|p| match p {
                PlyProperty::Scalar { ty, .. } => Ok(ty.size()),
                PlyProperty::List { name } => Err(Error::UnsupportedFormat(format!(
                    "list property '{}' in element '{}'",
                    name, self.name
                ))),
            })
            .sum()
    }
}

struct PlyHeader {
    format: PlyFormat,
    elements: Vec<PlyElement>,
}

fn read_header_line<R: BufRead>(reader: &mut R) -> Result<String> {
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Err(Error::Parse("Unexpected EOF in header".to_string()));
    }
    let line = String::from_utf8(buf)
        .map_err(|_| Error::Parse("PLY header is not valid UTF-8".to_string()))?;
    Ok(line.trim().to_string())
}

fn parse_header<R: BufRead>(reader: &mut R) -> Result<PlyHeader> {
    if read_header_line(reader)? != "ply" {
        return Err(Error::Parse("missing 'ply' magic".to_string()));
    }

    let mut format = None;
    let mut elements: Vec<PlyElement> = Vec::new();

    loop {
        let line = read_header_line(reader)?;
        let parts: Vec<&str> = line.split_whitespace().collect();

        match parts.first().copied() {
            Some("format") => {
                format = Some(match parts.get(1).copied() {
                    Some("ascii") => PlyFormat::Ascii,
                    Some("binary_little_endian") => PlyFormat::BinaryLittleEndian,
                    Some("binary_big_endian") => PlyFormat::BinaryBigEndian,
                    other => {
                        return Err(Error::UnsupportedFormat(format!(
                            "PLY format '{}'",
                            other.unwrap_or("")
                        )));
                    }
                });
            }
            Some("element") => {
                let name = parts
                    .get(1)
                    .ok_or_else(|| Error::Parse("Invalid element line".to_string()))?;
                let count = parts
                    .get(2)
                    .ok_or_else(|| Error::Parse("Invalid element count".to_string()))?
                    .parse()
                    .map_err(|_| Error::Parse("Invalid element count number".to_string()))?;
                elements.push(PlyElement {
                    name: name.to_string(),
                    count,
                    properties: Vec::new(),
                });
            }
            Some("property") => {
                let element = elements
                    .last_mut()
                    .ok_or_else(|| Error::Parse("property before element".to_string()))?;
                let property = if parts.get(1) == Some(&"list") {
                    let name = parts
                        .get(4)
                        .ok_or_else(|| Error::Parse("Invalid list property".to_string()))?;
                    PlyProperty::List {
                        name: name.to_string(),
                    }
                } else {
                    let (ty, name) = match (parts.get(1), parts.get(2)) {
                        (Some(ty), Some(name)) => (ScalarType::from_ply_name(ty)?, name),
                        _ => return Err(Error::Parse("Invalid property line".to_string())),
                    };
                    PlyProperty::Scalar {
                        name: name.to_string(),
                        ty,
                    }
                };
                element.properties.push(property);
            }
            Some("end_header") => break,
            // comment, obj_info and blank lines
            _ => {}
        }
    }

    let format = format.ok_or_else(|| Error::Parse("missing format line".to_string()))?;
    Ok(PlyHeader { format, elements })
}

/// Column positions of the vertex attributes we understand.
struct VertexLayout {
    types: Vec<ScalarType>,
    xyz: [usize; 3],
    normal: Option<[usize; 3]>,
    color: Option<[usize; 3]>,
}

impl VertexLayout {
    fn new(element: &PlyElement) -> Result<Self> {
        let mut types = Vec::with_capacity(element.properties.len());
        let mut names = Vec::with_capacity(element.properties.len());
        for p in &element.properties {
            match p {
                PlyProperty::Scalar { name, ty } => {
                    types.push(*ty);
                    names.push(name.as_str());
                }
                PlyProperty::List { name } => {
                    return Err(Error::UnsupportedFormat(format!(
                        "list property '{}' in vertex element",
                        name
                    )));
                }
            }
        }

        let find = |candidates: &[&str]| names.iter().position(|n| candidates.contains(n));
        let triple = |a: &[&str], b: &[&str], c: &[&str]| match (find(a), find(b), find(c)) {
            (Some(i), Some(j), Some(k)) => Some([i, j, k]),
            _ => None,
        };

        let xyz = triple(&["x"], &["y"], &["z"])
            .ok_or_else(|| Error::InvalidData("vertex element lacks x/y/z".to_string()))?;
        let normal = triple(&["nx"], &["ny"], &["nz"]);
        let color = triple(
            &["red", "diffuse_red", "r"],
            &["green", "diffuse_green", "g"],
            &["blue", "diffuse_blue", "b"],
        );

        Ok(Self {
            types,
            xyz,
            normal,
            color,
        })
    }

    fn push(&self, values: &[f64], cloud: &mut PointCloud) {
        let [x, y, z] = self.xyz;
        cloud
            .points
            .push(Point3::new(values[x] as f32, values[y] as f32, values[z] as f32));

        if let (Some([i, j, k]), Some(normals)) = (self.normal, cloud.normals.as_mut()) {
            normals.push(Vector3::new(values[i] as f32, values[j] as f32, values[k] as f32));
        }
        if let (Some([i, j, k]), Some(colors)) = (self.color, cloud.colors.as_mut()) {
            let scale = |idx: usize| (values[idx] / self.types[idx].color_scale()) as f32;
            colors.push(Point3::new(scale(i), scale(j), scale(k)));
        }
    }
}

/// Read a PLY stream (ascii or binary) into a point cloud
pub fn read_ply<R: BufRead>(mut reader: R) -> Result<PointCloud> {
    let header = parse_header(&mut reader)?;

    let vertex_pos = header
        .elements
        .iter()
        .position(|e| e.name == "vertex")
        .ok_or_else(|| Error::InvalidData("PLY has no vertex element".to_string()))?;
    let vertex = &header.elements[vertex_pos];
    let layout = VertexLayout::new(vertex)?;

    let mut cloud =
        crate::allocate_cloud(vertex.count, layout.normal.is_some(), layout.color.is_some());

    match header.format {
        PlyFormat::Ascii => {
            let mut lines = reader.lines();
            for element in &header.elements[..vertex_pos] {
                for _ in 0..element.count {
                    lines
                        .next()
                        .ok_or_else(|| Error::Parse("Unexpected EOF in data".to_string()))??;
                }
            }

            let mut values = Vec::with_capacity(layout.types.len());
            for _ in 0..vertex.count {
                let line = lines
                    .next()
                    .ok_or_else(|| Error::Parse("Unexpected EOF in data".to_string()))??;

                values.clear();
                for (token, ty) in line.split_whitespace().zip(&layout.types) {
                    values.push(ty.parse(token)?);
                }
                if values.len() < layout.types.len() {
                    return Err(Error::InvalidData(
                        "Not enough values for vertex".to_string(),
                    ));
                }
                layout.push(&values, &mut cloud);
            }
        }
        PlyFormat::BinaryLittleEndian | PlyFormat::BinaryBigEndian => {
            let order = if header.format == PlyFormat::BinaryLittleEndian {
                ByteOrder::Little
            } else {
                ByteOrder::Big
            };

            for element in &header.elements[..vertex_pos] {
                let skip = element
                    .record_size()?
                    .checked_mul(element.count)
                    .ok_or_else(|| {
                        Error::InvalidData(format!(
                            "element '{}' size overflows ({} records)",
                            element.name, element.count
                        ))
                    })? as u64;
                let skipped = std::io::copy(&mut (&mut reader).take(skip), &mut std::io::sink())?;
                if skipped != skip {
                    return Err(Error::InvalidData("truncated binary PLY".to_string()));
                }
            }

            let record_size = vertex.record_size()?;
            let mut record = vec![0u8; record_size];
            let mut values = vec![0.0f64; layout.types.len()];
            for _ in 0..vertex.count {
                reader.read_exact(&mut record).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::UnexpectedEof {
                        Error::InvalidData("truncated binary PLY".to_string())
                    } else {
                        Error::Io(e)
                    }
                })?;

                let mut offset = 0;
                for (value, ty) in values.iter_mut().zip(&layout.types) {
                    *value = ty.decode(&record[offset..], order)?;
                    offset += ty.size();
                }
                layout.push(&values, &mut cloud);
            }
        }
    }

    Ok(cloud)
}

/// Write a point cloud to PLY
///
/// Positions and normals are stored as `float`, colors as `uchar`.
pub fn write_ply<W: Write>(writer: &mut W, cloud: &PointCloud, format: PlyFormat) -> Result<()> {
    let num_points = cloud.len();
    let normals = cloud.normals.as_ref().filter(|n| n.len() == num_points);
    let colors = cloud.colors.as_ref().filter(|c| c.len() == num_points);

    // Write header
    writeln!(writer, "ply")?;
    let format_name = match format {
        PlyFormat::Ascii => "ascii",
        PlyFormat::BinaryLittleEndian => "binary_little_endian",
        PlyFormat::BinaryBigEndian => "binary_big_endian",
    };
    writeln!(writer, "format {} 1.0", format_name)?;
    writeln!(writer, "element vertex {}", num_points)?;
    writeln!(writer, "property float x")?;
    writeln!(writer, "property float y")?;
    writeln!(writer, "property float z")?;

    if normals.is_some() {
        writeln!(writer, "property float nx")?;
        writeln!(writer, "property float ny")?;
        writeln!(writer, "property float nz")?;
    }

    if colors.is_some() {
        writeln!(writer, "property uchar red")?;
        writeln!(writer, "property uchar green")?;
        writeln!(writer, "property uchar blue")?;
    }

    writeln!(writer, "end_header")?;

    let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;

    for i in 0..num_points {
        let p = cloud.points[i];
        let n = normals.map(|n| n[i]);
        let c = colors.map(|c| [to_u8(c[i].x), to_u8(c[i].y), to_u8(c[i].z)]);

        match format {
            PlyFormat::Ascii => {
                write!(writer, "{} {} {}", p.x, p.y, p.z)?;
                if let Some(n) = n {
                    write!(writer, " {} {} {}", n.x, n.y, n.z)?;
                }
                if let Some([r, g, b]) = c {
                    write!(writer, " {} {} {}", r, g, b)?;
                }
                writeln!(writer)?;
            }
            PlyFormat::BinaryLittleEndian | PlyFormat::BinaryBigEndian => {
                let little = format == PlyFormat::BinaryLittleEndian;
                let mut floats = vec![p.x, p.y, p.z];
                if let Some(n) = n {
                    floats.extend_from_slice(&[n.x, n.y, n.z]);
                }
                for v in floats {
                    let bytes = if little { v.to_le_bytes() } else { v.to_be_bytes() };
                    writer.write_all(&bytes)?;
                }
                if let Some(rgb) = c {
                    writer.write_all(&rgb)?;
                }
            }
        }
    }

    Ok(())
}
