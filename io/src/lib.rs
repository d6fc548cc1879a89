//! Point Cloud File I/O
//!
//! Supports reading and writing point clouds in:
//! - PLY (Polygon File Format), ascii and binary
//! - PCD (Point Cloud Data - PCL format), ascii and binary
//! - XYZ (plain whitespace-separated rows)

pub mod pcd;
pub mod ply;
mod scalar;
pub mod xyz;

pub use pcd::{read_pcd, write_pcd, PcdData};
pub use ply::{read_ply, write_ply, PlyFormat};
pub use scalar::{ByteOrder, ScalarType};
pub use xyz::{read_xyz, write_xyz, XyzLayout};

pub use cv_core::{Error, Result};

use cv_core::PointCloud;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Upper bound on points reserved up front from a header's declared count.
/// Larger clouds grow as records are actually read.
const MAX_PREALLOCATED_POINTS: usize = 1 << 20;

/// Empty cloud with attribute vectors sized for `declared` points.
pub(crate) fn allocate_cloud(declared: usize, normals: bool, colors: bool) -> PointCloud {
    let capacity = declared.min(MAX_PREALLOCATED_POINTS);
    let mut cloud = PointCloud::new(Vec::with_capacity(capacity));
    if normals {
        cloud.normals = Some(Vec::with_capacity(capacity));
    }
    if colors {
        cloud.colors = Some(Vec::with_capacity(capacity));
    }
    cloud
}

/// File formats recognised by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointCloudFormat {
    Ply,
    Pcd,
    Xyz(XyzLayout),
}

impl PointCloudFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "ply" => Ok(Self::Ply),
            "pcd" => Ok(Self::Pcd),
            "xyz" | "pts" | "txt" => Ok(Self::Xyz(XyzLayout::Xyz)),
            "xyzn" => Ok(Self::Xyz(XyzLayout::XyzNormals)),
            "xyzrgb" => Ok(Self::Xyz(XyzLayout::XyzRgb)),
            _ => Err(Error::UnsupportedFormat(format!(
                "cannot infer point cloud format from '{}'",
                path.display()
            ))),
        }
    }
}

/// Read a point cloud, choosing the parser from the file extension.
pub fn read_point_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let format = PointCloudFormat::from_path(path)?;
    let reader = BufReader::new(File::open(path)?);

    let cloud = match format {
        PointCloudFormat::Ply => read_ply(reader)?,
        PointCloudFormat::Pcd => read_pcd(reader)?,
        PointCloudFormat::Xyz(layout) => read_xyz(reader, layout)?,
    };

    tracing::debug!(
        path = %path.display(),
        points = cloud.len(),
        normals = cloud.has_normals(),
        colors = cloud.has_colors(),
        "loaded point cloud"
    );
    Ok(cloud)
}

/// Write a point cloud, choosing the encoder from the file extension.
///
/// `ascii` selects the text encoding for PLY and PCD; XYZ is always text.
pub fn write_point_cloud<P: AsRef<Path>>(path: P, cloud: &PointCloud, ascii: bool) -> Result<()> {
    let path = path.as_ref();
    let format = PointCloudFormat::from_path(path)?;
    let mut writer = BufWriter::new(File::create(path)?);

    match format {
        PointCloudFormat::Ply => {
            let encoding = if ascii {
                PlyFormat::Ascii
            } else {
                PlyFormat::BinaryLittleEndian
            };
            write_ply(&mut writer, cloud, encoding)?
        }
        PointCloudFormat::Pcd => {
            let encoding = if ascii { PcdData::Ascii } else { PcdData::Binary };
            write_pcd(&mut writer, cloud, encoding)?
        }
        PointCloudFormat::Xyz(layout) => write_xyz(&mut writer, cloud, layout)?,
    }
    writer.flush()?;
    Ok(())
}
