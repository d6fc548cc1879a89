//! Fast Point Feature Histograms (Rusu et al., ICRA 2009).
//!
//! Each point gets a 33-bin descriptor: three 11-bin histograms over the
//! angular pair features (α, φ, θ) between the point and its neighbours.

use crate::search::{PointIndex, SearchParam};
use cv_core::{Error, PointCloud, Result};
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use std::f32::consts::PI;

pub const FPFH_DIMENSION: usize = 33;
const BINS: usize = 11;

/// FPFH descriptor of one point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FPFHFeature {
    pub histogram: [f32; FPFH_DIMENSION], // 33-dimensional histogram
}

impl Default for FPFHFeature {
    fn default() -> Self {
        Self {
            histogram: [0.0; FPFH_DIMENSION],
        }
    }
}

impl FPFHFeature {
    pub fn squared_distance(&self, other: &Self) -> f32 {
        self.histogram
            .iter()
            .zip(other.histogram.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }

    pub fn is_zero(&self) -> bool {
        self.histogram.iter().all(|&v| v == 0.0)
    }
}

/// Pair feature `(α, φ, θ, d)`.
///
/// The Darboux frame is anchored on whichever point's normal makes the
/// smaller angle with the connecting line, which makes the feature symmetric
/// in its two arguments.
fn compute_pair_features(
    p1: &Point3<f32>,
    n1: &Vector3<f32>,
    p2: &Point3<f32>,
    n2: &Vector3<f32>,
) -> Option<[f32; 4]> {
    let mut delta = p2 - p1;
    let dist = delta.norm();
    if dist == 0.0 {
        return None;
    }

    let angle1 = n1.dot(&delta) / dist;
    let angle2 = n2.dot(&delta) / dist;

    let (u, target, phi) = if angle1.abs().acos() > angle2.abs().acos() {
        delta = -delta;
        (n2, n1, -angle2)
    } else {
        (n1, n2, angle1)
    };

    let v = delta.cross(u);
    let v_norm = v.norm();
    if v_norm == 0.0 {
        return None;
    }
    let v = v / v_norm;
    let w = u.cross(&v);

    let theta = v.dot(target);
    let alpha = w.dot(target).atan2(u.dot(target));
    Some([alpha, theta, phi, dist])
}

fn bin(value: f32, lower: f32, upper: f32) -> usize {
    let idx = (BINS as f32 * (value - lower) / (upper - lower)).floor();
    idx.clamp(0.0, (BINS - 1) as f32) as usize
}

fn compute_spfh(
    pc: &PointCloud,
    normals: &[Vector3<f32>],
    i: usize,
    neighbors: &[(usize, f32)],
) -> [f32; FPFH_DIMENSION] {
    let mut hist = [0.0; FPFH_DIMENSION];
    let others = neighbors.iter().filter(|&&(j, _)| j != i).count();
    if others == 0 {
        return hist;
    }
    let increment = 100.0 / others as f32;

    for &(j, _) in neighbors {
        if j == i {
            continue;
        }
        let Some([alpha, theta, phi, _]) =
            compute_pair_features(&pc.points[i], &normals[i], &pc.points[j], &normals[j])
        else {
            // coincident or parallel: contributes to the zero bins
            hist[bin(0.0, -PI, PI)] += increment;
            hist[BINS + bin(0.0, -1.0, 1.0)] += increment;
            hist[2 * BINS + bin(0.0, -1.0, 1.0)] += increment;
            continue;
        };
        hist[bin(alpha, -PI, PI)] += increment;
        hist[BINS + bin(theta, -1.0, 1.0)] += increment;
        hist[2 * BINS + bin(phi, -1.0, 1.0)] += increment;
    }
    hist
}

/// Compute FPFH features.
///
/// Requires normals. Returns one feature per point, index-aligned with the
/// cloud. Points without neighbours inside `param` get an all-zero
/// histogram.
pub fn compute_fpfh_feature(pc: &PointCloud, param: &SearchParam) -> Result<Vec<FPFHFeature>> {
    param.validate()?;
    let normals = pc
        .normals
        .as_ref()
        .filter(|n| n.len() == pc.len())
        .ok_or_else(|| Error::invalid_input("FPFH requires per-point normals"))?;

    let n_points = pc.len();
    if n_points == 0 {
        return Ok(Vec::new());
    }

    let index = PointIndex::from_cloud(pc);
    let neighborhoods: Vec<Vec<(usize, f32)>> = pc
        .points
        .par_iter()
        .map(|p| index.search(p, param))
        .collect();

    // 1. Compute SPFH (Simplified Point Feature Histograms)
    let spfh: Vec<[f32; FPFH_DIMENSION]> = (0..n_points)
        .into_par_iter()
        .map(|i| compute_spfh(pc, normals, i, &neighborhoods[i]))
        .collect();

    // 2. Compute FPFH (own SPFH + distance-weighted neighbour SPFHs)
    let fpfh: Vec<FPFHFeature> = (0..n_points)
        .into_par_iter()
        .map(|i| {
            let mut weighted = [0.0f32; FPFH_DIMENSION];
            let mut block_sums = [0.0f32; 3];

            for &(j, d2) in &neighborhoods[i] {
                if j == i || d2 == 0.0 {
                    continue;
                }
                for (k, value) in spfh[j].iter().enumerate() {
                    let w = value / d2;
                    weighted[k] += w;
                    block_sums[k / BINS] += w;
                }
            }

            let mut histogram = spfh[i];
            for (k, value) in histogram.iter_mut().enumerate() {
                let sum = block_sums[k / BINS];
                if sum != 0.0 {
                    *value += weighted[k] * 100.0 / sum;
                }
            }
            FPFHFeature { histogram }
        })
        .collect();

    tracing::debug!(points = n_points, ?param, "computed FPFH features");
    Ok(fpfh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sphere(n: usize, radius: f32) -> PointCloud {
        // Fibonacci sphere, normals pointing outward
        let golden = PI * (3.0 - 5.0f32.sqrt());
        let mut points = Vec::with_capacity(n);
        let mut normals = Vec::with_capacity(n);
        for i in 0..n {
            let y = 1.0 - 2.0 * (i as f32 + 0.5) / n as f32;
            let r = (1.0 - y * y).sqrt();
            let phi = golden * i as f32;
            let dir = Vector3::new(r * phi.cos(), y, r * phi.sin());
            points.push(Point3::from(dir * radius));
            normals.push(dir);
        }
        PointCloud::new(points).with_normals(normals).unwrap()
    }

    #[test]
    fn test_pair_features_are_symmetric() {
        let p1 = Point3::new(0.0, 0.0, 0.0);
        let n1 = Vector3::new(0.0, 0.3, 1.0).normalize();
        let p2 = Point3::new(1.0, 0.2, 0.1);
        let n2 = Vector3::new(0.5, 0.0, 1.0).normalize();

        let a = compute_pair_features(&p1, &n1, &p2, &n2).unwrap();
        let b = compute_pair_features(&p2, &n2, &p1, &n1).unwrap();
        for k in 0..4 {
            assert_relative_eq!(a[k], b[k], epsilon = 1e-5);
        }
        assert_relative_eq!(a[3], (p2 - p1).norm());
    }

    #[test]
    fn test_fpfh_block_sums() {
        let pc = sphere(400, 1.0);
        let features = compute_fpfh_feature(&pc, &SearchParam::hybrid(0.5, 100)).unwrap();
        assert_eq!(features.len(), pc.len());

        for f in &features {
            // own SPFH (100 per block) + normalized neighbour sum (100 per block)
            for block in 0..3 {
                let sum: f32 = f.histogram[block * BINS..(block + 1) * BINS].iter().sum();
                assert_relative_eq!(sum, 200.0, epsilon = 1e-2);
            }
        }
    }

    #[test]
    fn test_fpfh_is_rigid_invariant() {
        let pc = sphere(300, 1.0);
        let mut t = nalgebra::Matrix4::identity();
        t.fixed_view_mut::<3, 3>(0, 0).copy_from(
            nalgebra::Rotation3::from_euler_angles(0.3, -0.2, 0.9).matrix(),
        );
        t[(0, 3)] = 4.0;
        let moved = pc.transformed(&t);

        let param = SearchParam::hybrid(0.5, 100);
        let a = compute_fpfh_feature(&pc, &param).unwrap();
        let b = compute_fpfh_feature(&moved, &param).unwrap();
        // values sitting on a bin edge may land in the neighbouring bin
        let matching = a
            .iter()
            .zip(&b)
            .filter(|(fa, fb)| fa.squared_distance(fb) < 1.0)
            .count();
        assert!(matching >= a.len() * 95 / 100, "{} of {}", matching, a.len());
    }

    #[test]
    fn test_fpfh_requires_normals_and_isolated_points_are_zero() {
        let pc_no_norm = PointCloud::new(vec![Point3::new(0.0, 0.0, 0.0)]);
        assert!(matches!(
            compute_fpfh_feature(&pc_no_norm, &SearchParam::hybrid(0.1, 10)),
            Err(Error::InvalidInput(_))
        ));

        let pc = PointCloud::new(vec![Point3::origin()])
            .with_normals(vec![Vector3::z()])
            .unwrap();
        let features = compute_fpfh_feature(&pc, &SearchParam::hybrid(0.1, 10)).unwrap();
        assert_eq!(features.len(), 1);
        assert!(features[0].is_zero());
    }
}
