use cv_core::{PointCloud, Result};
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

type VoxelKey = (i64, i64, i64);

fn voxel_key(p: &Point3<f32>, voxel_size: f32) -> VoxelKey {
    (
        (p.x / voxel_size).floor() as i64,
        (p.y / voxel_size).floor() as i64,
        (p.z / voxel_size).floor() as i64,
    )
}

/// Running sums for one voxel. Accumulated in f64 so that the centroid of
/// points sharing a voxel stays inside that voxel after rounding back to f32.
struct VoxelAccumulator {
    point: Vector3<f64>,
    color: Vector3<f64>,
    normal: Vector3<f64>,
    count: usize,
}

impl Default for VoxelAccumulator {
    fn default() -> Self {
        Self {
            point: Vector3::zeros(),
            color: Vector3::zeros(),
            normal: Vector3::zeros(),
            count: 0,
        }
    }
}

impl VoxelAccumulator {
    fn flush(&mut self, out: &mut PointCloud) {
        if self.count == 0 {
            return;
        }
        let n = self.count as f64;
        out.points.push(Point3::from((self.point / n).cast::<f32>()));

        if let Some(nc) = &mut out.colors {
            nc.push(Point3::from((self.color / n).cast::<f32>()));
        }
        if let Some(nn) = &mut out.normals {
            let mut normal = (self.normal / n).cast::<f32>();
            if normal.norm_squared() > 1e-12 {
                normal.normalize_mut();
            }
            nn.push(normal);
        }
        *self = Self::default();
    }
}

/// Downsample a point cloud with a voxel grid.
///
/// Returns a new point cloud with one point per occupied voxel: the centroid
/// of the points that fall into it, with averaged colors and averaged,
/// renormalized normals. Voxels are keyed by `floor(p / voxel_size)` so a
/// second pass with the same size is a no-op.
pub fn voxel_down_sample(pc: &PointCloud, voxel_size: f32) -> Result<PointCloud> {
    cv_core::ensure_positive("voxel_size", voxel_size)?;

    let n = pc.len();
    let colors = pc.colors.as_ref().filter(|c| c.len() == n);
    let normals = pc.normals.as_ref().filter(|v| v.len() == n);
    let mut out = PointCloud {
        points: Vec::new(),
        colors: colors.map(|_| Vec::new()),
        normals: normals.map(|_| Vec::new()),
    };
    if n == 0 {
        return Ok(out);
    }

    // 1. Compute indices
    let mut indices: Vec<(VoxelKey, usize)> = pc
        .points
        .iter()
        .enumerate()
        .map(|(i, p)| (voxel_key(p, voxel_size), i))
        .collect();

    // 2. Sort by voxel index
    if n > 10000 {
        indices.par_sort_unstable();
    } else {
        indices.sort_unstable();
    }

    // 3. Aggregate
    let mut current = indices[0].0;
    let mut acc = VoxelAccumulator::default();

    for &(key, idx) in &indices {
        if key != current {
            acc.flush(&mut out);
            current = key;
        }
        acc.point += pc.points[idx].coords.cast::<f64>();
        if let Some(c) = colors {
            acc.color += c[idx].coords.cast::<f64>();
        }
        if let Some(v) = normals {
            acc.normal += v[idx].cast::<f64>();
        }
        acc.count += 1;
    }
    acc.flush(&mut out);

    tracing::debug!(
        input = n,
        output = out.len(),
        voxel_size,
        "voxel downsampling"
    );
    Ok(out)
}
