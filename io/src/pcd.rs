//! PCD (Point Cloud Data) I/O
//!
//! PCD is the native format for Point Cloud Library (PCL).

use crate::scalar::{ByteOrder, ScalarType};
use crate::{Error, Result};
use cv_core::point_cloud::PointCloud;
use nalgebra::{Point3, Vector3};
use std::io::{BufRead, Read, Write};

/// PCD data format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcdData {
    Ascii,
    Binary,
    BinaryCompressed,
}

#[derive(Debug, Clone)]
struct PcdField {
    name: String,
    ty: ScalarType,
    count: usize,
}

/// Offsets (in values, counting every `COUNT` slot) of the fields we read.
struct PcdLayout {
    slots: Vec<ScalarType>,
    xyz: [usize; 3],
    normal: Option<[usize; 3]>,
    packed_rgb: Option<usize>,
    rgb: Option<[usize; 3]>,
}

impl PcdLayout {
    fn new(fields: &[PcdField]) -> Result<Self> {
        let mut slots = Vec::new();
        let mut offsets = Vec::with_capacity(fields.len());
        for f in fields {
            if f.count == 0 {
                return Err(Error::InvalidData(format!(
                    "PCD field '{}' has COUNT 0",
                    f.name
                )));
            }
            offsets.push(slots.len());
            slots.extend(std::iter::repeat(f.ty).take(f.count));
        }

        let find = |names: &[&str]| {
            fields
                .iter()
                .position(|f| names.contains(&f.name.as_str()))
                .map(|i| offsets[i])
        };
        let triple = |a: &[&str], b: &[&str], c: &[&str]| match (find(a), find(b), find(c)) {
            (Some(i), Some(j), Some(k)) => Some([i, j, k]),
            _ => None,
        };

        let xyz = triple(&["x"], &["y"], &["z"])
            .ok_or_else(|| Error::InvalidData("PCD lacks x/y/z fields".to_string()))?;
        let normal = triple(&["normal_x", "nx"], &["normal_y", "ny"], &["normal_z", "nz"]);
        let packed_rgb = find(&["rgb", "rgba"]);
        if let Some(i) = packed_rgb {
            let ty = slots[i];
            if ty.size() != 4 {
                return Err(Error::UnsupportedFormat(format!(
                    "packed rgb field of {} bytes, expected 4",
                    ty.size()
                )));
            }
        }
        let rgb = if packed_rgb.is_none() {
            triple(&["r"], &["g"], &["b"])
        } else {
            None
        };

        Ok(Self {
            slots,
            xyz,
            normal,
            packed_rgb,
            rgb,
        })
    }

    fn record_size(&self) -> usize {
        self.slots.iter().map(|t| t.size()).sum()
    }

    fn allocate(&self, count: usize) -> PointCloud {
        crate::allocate_cloud(
            count,
            self.normal.is_some(),
            self.packed_rgb.is_some() || self.rgb.is_some(),
        )
    }

    /// Append one record. Records whose position is not finite are skipped
    /// and `false` is returned. `packed` is the raw 32-bit pattern of the rgb
    /// slot, if any.
    fn push(&self, values: &[f64], packed: Option<u32>, cloud: &mut PointCloud) -> bool {
        let [x, y, z] = self.xyz;
        let p = Point3::new(values[x] as f32, values[y] as f32, values[z] as f32);
        if !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()) {
            return false;
        }
        cloud.points.push(p);

        if let (Some([i, j, k]), Some(normals)) = (self.normal, cloud.normals.as_mut()) {
            normals.push(Vector3::new(values[i] as f32, values[j] as f32, values[k] as f32));
        }

        if let Some(colors) = cloud.colors.as_mut() {
            if let Some(bits) = packed {
                let r = ((bits >> 16) & 0xFF) as f32 / 255.0;
                let g = ((bits >> 8) & 0xFF) as f32 / 255.0;
                let b = (bits & 0xFF) as f32 / 255.0;
                colors.push(Point3::new(r, g, b));
            } else if let Some([i, j, k]) = self.rgb {
                let scale = |idx: usize| (values[idx] / self.slots[idx].color_scale()) as f32;
                colors.push(Point3::new(scale(i), scale(j), scale(k)));
            }
        }
        true
    }
}

fn log_dropped(dropped: usize) {
    if dropped > 0 {
        tracing::warn!(dropped, "skipped PCD points with non-finite coordinates");
    }
}

/// Read a PCD file
pub fn read_pcd<R: BufRead>(mut reader: R) -> Result<PointCloud> {
    let mut names: Vec<String> = Vec::new();
    let mut sizes: Vec<usize> = Vec::new();
    let mut types: Vec<char> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();
    let mut width = 0usize;
    let mut height = 1usize;
    let mut points_count = None;
    let data_format;

    // Parse header
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(Error::Parse("Unexpected EOF in header".to_string()));
        }
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let parse_usize = |s: &str| {
            s.parse::<usize>()
                .map_err(|_| Error::Parse(format!("invalid PCD header value '{}'", s)))
        };

        match parts[0] {
            "FIELDS" => names = parts[1..].iter().map(|s| s.to_string()).collect(),
            "SIZE" => sizes = parts[1..].iter().map(|s| parse_usize(s)).collect::<Result<_>>()?,
            "TYPE" => types = parts[1..].iter().filter_map(|s| s.chars().next()).collect(),
            "COUNT" => {
                counts = parts[1..].iter().map(|s| parse_usize(s)).collect::<Result<_>>()?
            }
            "WIDTH" => width = parse_usize(parts.get(1).copied().unwrap_or(""))?,
            "HEIGHT" => height = parse_usize(parts.get(1).copied().unwrap_or(""))?,
            "POINTS" => points_count = Some(parse_usize(parts.get(1).copied().unwrap_or(""))?),
            "DATA" => {
                data_format = match parts.get(1).copied() {
                    Some("ascii") => PcdData::Ascii,
                    Some("binary") => PcdData::Binary,
                    Some("binary_compressed") => PcdData::BinaryCompressed,
                    other => {
                        return Err(Error::Parse(format!(
                            "unknown PCD DATA '{}'",
                            other.unwrap_or("")
                        )));
                    }
                };
                break;
            }
            // VERSION, VIEWPOINT
            _ => {}
        }
    }

    if counts.is_empty() {
        counts = vec![1; names.len()];
    }
    if sizes.len() != names.len() || types.len() != names.len() || counts.len() != names.len() {
        return Err(Error::Parse(
            "FIELDS, SIZE, TYPE and COUNT lengths differ".to_string(),
        ));
    }

    let fields = names
        .into_iter()
        .zip(sizes.iter().zip(types.iter()).zip(counts.iter()))
        .map(|(name, ((&size, &kind), &count))| {
            Ok(PcdField {
                name,
                ty: ScalarType::from_pcd(kind, size)?,
                count,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let count = match points_count {
        Some(n) => n,
        None => width.checked_mul(height).ok_or_else(|| {
            Error::InvalidData(format!("PCD WIDTH {} x HEIGHT {} overflows", width, height))
        })?,
    };
    let layout = PcdLayout::new(&fields)?;
    let mut cloud = layout.allocate(count);

    match data_format {
        PcdData::Ascii => parse_pcd_ascii(reader, count, &layout, &mut cloud)?,
        PcdData::Binary => parse_pcd_binary(reader, count, &layout, &mut cloud)?,
        PcdData::BinaryCompressed => {
            return Err(Error::UnsupportedFormat(
                "binary_compressed PCD data".to_string(),
            ));
        }
    }

    Ok(cloud)
}

fn parse_pcd_ascii<R: BufRead>(
    reader: R,
    count: usize,
    layout: &PcdLayout,
    cloud: &mut PointCloud,
) -> Result<()> {
    let mut values = Vec::with_capacity(layout.slots.len());
    let mut rows = 0;
    let mut dropped = 0;

    for line in reader.lines() {
        if rows >= count {
            break;
        }
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < layout.slots.len() {
            return Err(Error::InvalidData(format!(
                "expected {} values per point, got {}",
                layout.slots.len(),
                tokens.len()
            )));
        }

        values.clear();
        for (token, ty) in tokens.iter().zip(&layout.slots) {
            values.push(ty.parse(token)?);
        }

        let packed = layout.packed_rgb.map(|i| {
            if layout.slots[i].is_float() {
                tokens[i].parse::<f32>().map(f32::to_bits).unwrap_or(0)
            } else {
                tokens[i].parse::<u32>().unwrap_or(0)
            }
        });
        rows += 1;
        if !layout.push(&values, packed, cloud) {
            dropped += 1;
        }
    }

    if rows < count {
        return Err(Error::InvalidData(format!(
            "PCD declares {} points but holds {}",
            count, rows
        )));
    }
    log_dropped(dropped);
    Ok(())
}

fn parse_pcd_binary<R: Read>(
    mut reader: R,
    count: usize,
    layout: &PcdLayout,
    cloud: &mut PointCloud,
) -> Result<()> {
    let mut record = vec![0u8; layout.record_size()];
    let mut values = vec![0.0f64; layout.slots.len()];
    let mut byte_offsets = Vec::with_capacity(layout.slots.len());
    let mut offset = 0;
    for ty in &layout.slots {
        byte_offsets.push(offset);
        offset += ty.size();
    }

    let mut dropped = 0;
    for _ in 0..count {
        reader.read_exact(&mut record).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::InvalidData("truncated binary PCD".to_string())
            } else {
                Error::Io(e)
            }
        })?;

        for ((value, ty), &start) in values.iter_mut().zip(&layout.slots).zip(&byte_offsets) {
            *value = ty.decode(&record[start..], ByteOrder::Little)?;
        }
        let packed = layout.packed_rgb.map(|i| {
            let start = byte_offsets[i];
            let mut bits = [0u8; 4];
            bits.copy_from_slice(&record[start..start + 4]);
            u32::from_le_bytes(bits)
        });
        if !layout.push(&values, packed, cloud) {
            dropped += 1;
        }
    }
    log_dropped(dropped);
    Ok(())
}

/// Write point cloud to PCD format
///
/// Colors are packed into a single float `rgb` field, as PCL does.
pub fn write_pcd<W: Write>(writer: &mut W, cloud: &PointCloud, data: PcdData) -> Result<()> {
    if data == PcdData::BinaryCompressed {
        return Err(Error::UnsupportedFormat(
            "binary_compressed PCD data".to_string(),
        ));
    }

    let num_points = cloud.len();
    let normals = cloud.normals.as_ref().filter(|n| n.len() == num_points);
    let colors = cloud.colors.as_ref().filter(|c| c.len() == num_points);

    let mut fields = vec!["x", "y", "z"];
    if normals.is_some() {
        fields.extend(["normal_x", "normal_y", "normal_z"]);
    }
    if colors.is_some() {
        fields.push("rgb");
    }
    let repeat = |s: &str| vec![s; fields.len()].join(" ");

    // Write header
    writeln!(writer, "# .PCD v0.7 - Point Cloud Data file format")?;
    writeln!(writer, "VERSION 0.7")?;
    writeln!(writer, "FIELDS {}", fields.join(" "))?;
    writeln!(writer, "SIZE {}", repeat("4"))?;
    writeln!(writer, "TYPE {}", repeat("F"))?;
    writeln!(writer, "COUNT {}", repeat("1"))?;
    writeln!(writer, "WIDTH {}", num_points)?;
    writeln!(writer, "HEIGHT 1")?;
    writeln!(writer, "VIEWPOINT 0 0 0 1 0 0 0")?;
    writeln!(writer, "POINTS {}", num_points)?;
    writeln!(
        writer,
        "DATA {}",
        if data == PcdData::Ascii { "ascii" } else { "binary" }
    )?;

    let pack = |c: &Point3<f32>| {
        let r = (c.x.clamp(0.0, 1.0) * 255.0).round() as u32;
        let g = (c.y.clamp(0.0, 1.0) * 255.0).round() as u32;
        let b = (c.z.clamp(0.0, 1.0) * 255.0).round() as u32;
        (r << 16) | (g << 8) | b
    };

    // Write data
    for i in 0..num_points {
        let p = cloud.points[i];
        let mut row = vec![p.x, p.y, p.z];
        if let Some(n) = normals {
            row.extend_from_slice(&[n[i].x, n[i].y, n[i].z]);
        }
        if let Some(c) = colors {
            row.push(f32::from_bits(pack(&c[i])));
        }

        if data == PcdData::Ascii {
            let text: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            writeln!(writer, "{}", text.join(" "))?;
        } else {
            for v in row {
                writer.write_all(&v.to_le_bytes())?;
            }
        }
    }

    Ok(())
}
