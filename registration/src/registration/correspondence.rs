use cv_core::point_cloud::PointCloud;
use cv_point_cloud::FPFHFeature;
use nalgebra::Matrix4;
use rayon::prelude::*;

/// Index of the nearest feature in `candidates`, brute force.
///
/// FPFH lives in 33 dimensions where tree indices degrade to a linear scan
/// anyway, so a parallel scan over the queries is used instead.
fn nearest_features(queries: &[FPFHFeature], candidates: &[FPFHFeature]) -> Vec<Option<usize>> {
    queries
        .par_iter()
        .map(|q| {
            candidates
                .iter()
                .enumerate()
                .map(|(j, c)| (j, q.squared_distance(c)))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(j, _)| j)
        })
        .collect()
}

/// Nearest-neighbour correspondences in feature space.
///
/// Each source feature is paired with its nearest target feature. With
/// `mutual_filter` only reciprocal pairs (source's nearest target also has
/// that source as its nearest) are kept.
pub fn correspondences_from_features(
    source_features: &[FPFHFeature],
    target_features: &[FPFHFeature],
    mutual_filter: bool,
) -> Vec<(usize, usize)> {
    let forward = nearest_features(source_features, target_features);
    let pairs = forward
        .iter()
        .enumerate()
        .filter_map(|(i, j)| j.map(|j| (i, j)));

    if !mutual_filter {
        return pairs.collect();
    }

    let backward = nearest_features(target_features, source_features);
    pairs.filter(|&(i, j)| backward[j] == Some(i)).collect()
}

/// Cheap tests that prune RANSAC hypotheses.
///
/// `EdgeLength` only looks at the sample and runs before estimation;
/// `Distance` and `Normal` need the candidate transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CorrespondenceChecker {
    /// Every edge between sampled source points must be within
    /// `similarity_threshold` (ratio in `(0, 1]`) of the matching target edge.
    EdgeLength { similarity_threshold: f32 },
    /// Every transformed sampled source point must land within
    /// `distance_threshold` of its target.
    Distance { distance_threshold: f32 },
    /// Transformed source normals must be within `normal_angle_threshold`
    /// radians of the target normals. Passes when either cloud lacks normals.
    Normal { normal_angle_threshold: f32 },
}

impl CorrespondenceChecker {
    pub fn requires_transformation(&self) -> bool {
        !matches!(self, Self::EdgeLength { .. })
    }

    pub fn check(
        &self,
        source: &PointCloud,
        target: &PointCloud,
        corres: &[(usize, usize)],
        transformation: &Matrix4<f32>,
    ) -> bool {
        match *self {
            Self::EdgeLength {
                similarity_threshold,
            } => corres.iter().enumerate().all(|(a, &(si, ti))| {
                corres[a + 1..].iter().all(|&(sj, tj)| {
                    let ds = (source.points[si] - source.points[sj]).norm();
                    let dt = (target.points[ti] - target.points[tj]).norm();
                    ds >= dt * similarity_threshold && dt >= ds * similarity_threshold
                })
            }),
            Self::Distance { distance_threshold } => {
                let limit = distance_threshold * distance_threshold;
                corres.iter().all(|&(s, t)| {
                    let moved = transformation.transform_point(&source.points[s]);
                    (moved - target.points[t]).norm_squared() <= limit
                })
            }
            Self::Normal {
                normal_angle_threshold,
            } => {
                let (Some(sn), Some(tn)) = (&source.normals, &target.normals) else {
                    return true;
                };
                let cos_limit = normal_angle_threshold.cos();
                corres.iter().all(|&(s, t)| {
                    let rotated = transformation.transform_vector(&sn[s]);
                    let norm = rotated.norm() * tn[t].norm();
                    norm > 0.0 && rotated.dot(&tn[t]) / norm >= cos_limit
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point3, Vector3};

    fn feature(values: &[(usize, f32)]) -> FPFHFeature {
        let mut f = FPFHFeature::default();
        for &(k, v) in values {
            f.histogram[k] = v;
        }
        f
    }

    #[test]
    fn test_mutual_filter() {
        let source = vec![feature(&[(0, 1.0)]), feature(&[(0, 1.1)]), feature(&[(5, 3.0)])];
        let target = vec![feature(&[(0, 1.05)]), feature(&[(5, 2.9)])];

        let all = correspondences_from_features(&source, &target, false);
        assert_eq!(all, vec![(0, 0), (1, 0), (2, 1)]);

        // target 0 is nearest to both source 0 and 1 but picks only one back
        let mutual = correspondences_from_features(&source, &target, true);
        assert_eq!(mutual.len(), 2);
        assert!(mutual.contains(&(2, 1)));

        assert!(correspondences_from_features(&source, &[], true).is_empty());
    }

    #[test]
    fn test_edge_length_checker() {
        let source = PointCloud::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]);
        let stretched = PointCloud::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]);
        let corres = [(0, 0), (1, 1), (2, 2)];
        let checker = CorrespondenceChecker::EdgeLength {
            similarity_threshold: 0.9,
        };
        let id = Matrix4::identity();
        assert!(checker.check(&source, &source, &corres, &id));
        assert!(!checker.check(&source, &stretched, &corres, &id));
        assert!(!checker.requires_transformation());
    }

    #[test]
    fn test_distance_and_normal_checkers() {
        let source = PointCloud::new(vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)])
            .with_normals(vec![Vector3::z(); 2])
            .unwrap();
        let mut shift = Matrix4::identity();
        shift[(0, 3)] = 0.5;
        let target = source.transformed(&shift);
        let corres = [(0, 0), (1, 1)];

        let distance = CorrespondenceChecker::Distance {
            distance_threshold: 0.1,
        };
        assert!(distance.check(&source, &target, &corres, &shift));
        assert!(!distance.check(&source, &target, &corres, &Matrix4::identity()));

        let normal = CorrespondenceChecker::Normal {
            normal_angle_threshold: 0.2,
        };
        assert!(normal.check(&source, &target, &corres, &shift));
        let mut flip = Matrix4::identity();
        flip[(2, 2)] = -1.0;
        flip[(1, 1)] = -1.0;
        assert!(!normal.check(&source, &target, &corres, &flip));
    }
}
