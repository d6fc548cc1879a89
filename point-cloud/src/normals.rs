use crate::search::{PointIndex, SearchParam};
use cv_core::{PointCloud, Result};
use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use rayon::prelude::*;

/// Estimate normals for the point cloud from each point's neighbourhood.
///
/// Uses PCA on the neighbourhood covariance: the normal is the eigenvector of
/// the smallest eigenvalue. Points with fewer than 3 neighbours get `+Z`.
///
/// Orientation: when the cloud already carries normals, each new normal is
/// flipped to agree with the old one. Otherwise normals point away from the
/// cloud centroid.
pub fn estimate_normals(pc: &mut PointCloud, param: &SearchParam) -> Result<()> {
    param.validate()?;
    if pc.is_empty() {
        pc.normals = Some(Vec::new());
        return Ok(());
    }

    let index = PointIndex::from_cloud(pc);
    let previous = pc.normals.as_ref().filter(|n| n.len() == pc.len());
    let center = pc.get_center();

    let normals: Vec<Vector3<f32>> = pc
        .points
        .par_iter()
        .enumerate()
        .map(|(i, p)| {
            let neighbors = index.search(p, param);
            if neighbors.len() < 3 {
                return Vector3::z(); // Default up
            }

            // Compute centroid
            let mut centroid = Vector3::zeros();
            for &(j, _) in &neighbors {
                centroid += pc.points[j].coords;
            }
            centroid /= neighbors.len() as f32;

            // Compute covariance matrix
            let mut cov = Matrix3::zeros();
            for &(j, _) in &neighbors {
                let d = pc.points[j].coords - centroid;
                cov += d * d.transpose();
            }
            cov /= neighbors.len() as f32;

            let eigen = SymmetricEigen::new(cov);
            let min_idx = eigen.eigenvalues.imin();
            let mut normal: Vector3<f32> = eigen.eigenvectors.column(min_idx).into_owned();

            let reference = match previous {
                Some(old) => old[i],
                None => p - center,
            };
            if normal.dot(&reference) < 0.0 {
                normal = -normal;
            }
            normal
        })
        .collect();

    tracing::debug!(
        points = pc.len(),
        reoriented = previous.is_some(),
        "estimated normals"
    );
    pc.normals = Some(normals);
    Ok(())
}
