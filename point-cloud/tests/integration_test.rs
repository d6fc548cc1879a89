/// Integration tests for point-cloud crate
/// Exercises the preprocessing chain on synthetic clouds.
use cv_core::PointCloud;
use cv_point_cloud::{
    compute_fpfh_feature, estimate_normals, preprocess_point_cloud, voxel_down_sample,
    PointIndex, SearchParam,
};
use nalgebra::Point3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_cloud(n: usize, seed: u64) -> PointCloud {
    let mut rng = StdRng::seed_from_u64(seed);
    let points = (0..n)
        .map(|_| {
            Point3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            )
        })
        .collect();
    PointCloud::new(points)
}

#[test]
fn test_voxel_down_sample_is_idempotent() {
    for (seed, voxel) in [(1, 0.05f32), (2, 0.1), (3, 0.37), (4, 1.0)] {
        let pc = random_cloud(5000, seed);
        let once = voxel_down_sample(&pc, voxel).unwrap();
        let twice = voxel_down_sample(&once, voxel).unwrap();
        assert!(once.len() <= pc.len());
        assert_eq!(once.len(), twice.len(), "voxel {}", voxel);
    }
}

#[test]
fn test_downsampled_points_are_one_per_voxel() {
    let pc = random_cloud(3000, 9);
    let voxel = 0.2;
    let down = voxel_down_sample(&pc, voxel).unwrap();

    let index = PointIndex::from_cloud(&pc);
    for p in &down.points {
        // every centroid has at least one source point within its voxel diagonal
        let (_, d2) = index.nearest(p).unwrap();
        assert!(d2.sqrt() <= voxel * 3.0f32.sqrt());
    }
}

#[test]
fn test_index_matches_brute_force() {
    let pc = random_cloud(500, 5);
    let index = PointIndex::from_cloud(&pc);
    let q = Point3::new(0.1, -0.2, 0.3);

    let mut brute: Vec<(usize, f32)> = pc
        .points
        .iter()
        .enumerate()
        .map(|(i, p)| (i, (p - q).norm_squared()))
        .filter(|&(_, d2)| d2 <= 0.25 * 0.25)
        .collect();
    brute.sort_by(|a, b| a.1.total_cmp(&b.1));

    let found = index.search(&q, &SearchParam::Radius { radius: 0.25 });
    assert_eq!(found.len(), brute.len());
    for (a, b) in found.iter().zip(&brute) {
        assert!((a.1 - b.1).abs() < 1e-6);
    }
}

#[test]
fn test_features_after_normals() {
    let mut pc = random_cloud(800, 11);
    estimate_normals(&mut pc, &SearchParam::hybrid(0.3, 30)).unwrap();
    let features = compute_fpfh_feature(&pc, &SearchParam::hybrid(0.5, 100)).unwrap();
    assert_eq!(features.len(), pc.len());
    assert!(features.iter().any(|f| !f.is_zero()));
}

#[test]
fn test_preprocess() {
    let pc = random_cloud(2000, 3);
    let (down, features) = preprocess_point_cloud(&pc, 0.1).unwrap();
    assert_eq!(down.len(), features.len());
    assert_eq!(down.normals.as_ref().map(Vec::len), Some(down.len()));
}
