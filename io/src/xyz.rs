//! Plain-text XYZ point lists.
//!
//! One point per line, whitespace separated. Blank lines and lines starting
//! with `#` are skipped.

use crate::{Error, Result};
use cv_core::point_cloud::PointCloud;
use nalgebra::{Point3, Vector3};
use std::io::{BufRead, Write};

/// Column layout of an XYZ file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XyzLayout {
    /// `x y z`
    Xyz,
    /// `x y z nx ny nz`
    XyzNormals,
    /// `x y z r g b`, colors in `[0, 1]`
    XyzRgb,
}

impl XyzLayout {
    fn columns(self) -> usize {
        match self {
            Self::Xyz => 3,
            Self::XyzNormals | Self::XyzRgb => 6,
        }
    }
}

pub fn read_xyz<R: BufRead>(reader: R, layout: XyzLayout) -> Result<PointCloud> {
    let mut points = Vec::new();
    let mut extra = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let values = line
            .split_whitespace()
            .take(layout.columns())
            .map(|t| {
                t.parse::<f32>().map_err(|_| {
                    Error::Parse(format!("line {}: invalid number '{}'", line_no + 1, t))
                })
            })
            .collect::<Result<Vec<f32>>>()?;

        if values.len() < layout.columns() {
            return Err(Error::InvalidData(format!(
                "line {}: expected {} columns, got {}",
                line_no + 1,
                layout.columns(),
                values.len()
            )));
        }

        points.push(Point3::new(values[0], values[1], values[2]));
        if layout != XyzLayout::Xyz {
            extra.push(Vector3::new(values[3], values[4], values[5]));
        }
    }

    let cloud = PointCloud::new(points);
    match layout {
        XyzLayout::Xyz => Ok(cloud),
        XyzLayout::XyzNormals => cloud.with_normals(extra),
        XyzLayout::XyzRgb => cloud.with_colors(extra.into_iter().map(Point3::from).collect()),
    }
}

/// Write `cloud` as text. Missing normals or colors are an error for the
/// layouts that need them.
pub fn write_xyz<W: Write>(writer: &mut W, cloud: &PointCloud, layout: XyzLayout) -> Result<()> {
    let extra: Option<Vec<Vector3<f32>>> = match layout {
        XyzLayout::Xyz => None,
        XyzLayout::XyzNormals => Some(
            cloud
                .normals
                .clone()
                .ok_or_else(|| Error::invalid_input("cloud has no normals"))?,
        ),
        XyzLayout::XyzRgb => Some(
            cloud
                .colors
                .as_ref()
                .ok_or_else(|| Error::invalid_input("cloud has no colors"))?
                .iter()
                .map(|c| c.coords)
                .collect(),
        ),
    };

    for (i, p) in cloud.points.iter().enumerate() {
        match extra.as_ref().and_then(|e| e.get(i)) {
            Some(e) => writeln!(writer, "{} {} {} {} {} {}", p.x, p.y, p.z, e.x, e.y, e.z)?,
            None => writeln!(writer, "{} {} {}", p.x, p.y, p.z)?,
        }
    }
    Ok(())
}
