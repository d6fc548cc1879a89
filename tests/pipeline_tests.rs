use cv_align::{
    align_clouds, align_files, prepare_dataset, write_registration_result, AlignConfig,
    GlobalMethod,
};
use cv_core::{axis_angle_rotation, rigid_transform, transform_error, Error, PointCloud};
use nalgebra::{Matrix4, Point3, Vector3};
use std::f32::consts::PI;
use tempfile::tempdir;

const SPACING: f32 = 0.025;
const VOXEL: f32 = 0.08;

fn grid(origin: Point3<f32>, u: Vector3<f32>, v: Vector3<f32>, points: &mut Vec<Point3<f32>>) {
    let nu = (u.norm() / SPACING).round() as usize;
    let nv = (v.norm() / SPACING).round() as usize;
    for i in 0..=nu {
        for j in 0..=nv {
            let a = i as f32 / nu as f32;
            let b = j as f32 / nv as f32;
            points.push(origin + u * a + v * b);
        }
    }
}

fn sphere(center: Point3<f32>, radius: f32, points: &mut Vec<Point3<f32>>) {
    let n = (4.0 * PI * radius * radius / (SPACING * SPACING)) as usize;
    let golden = PI * (3.0 - 5.0f32.sqrt());
    for i in 0..n {
        let y = 1.0 - 2.0 * (i as f32 + 0.5) / n as f32;
        let r = (1.0 - y * y).sqrt();
        let theta = golden * i as f32;
        let dir = Vector3::new(r * theta.cos(), y, r * theta.sin());
        // the lower cap is buried in the floor
        let p = center + dir * radius;
        if p.z >= 0.0 {
            points.push(p);
        }
    }
}

fn boxed(corner: Point3<f32>, size: Vector3<f32>, points: &mut Vec<Point3<f32>>) {
    let x = Vector3::new(size.x, 0.0, 0.0);
    let y = Vector3::new(0.0, size.y, 0.0);
    let z = Vector3::new(0.0, 0.0, size.z);
    grid(corner, x, z, points);
    grid(corner + y, x, z, points);
    grid(corner, y, z, points);
    grid(corner + x, y, z, points);
    grid(corner + z, x, y, points);
}

/// Floor, one wall, a half-buried sphere and a box: asymmetric enough for
/// FPFH matching to pin down a unique pose.
fn scene() -> PointCloud {
    let mut points = Vec::new();
    grid(
        Point3::origin(),
        Vector3::new(2.0, 0.0, 0.0),
        Vector3::new(0.0, 2.0, 0.0),
        &mut points,
    );
    grid(
        Point3::origin(),
        Vector3::new(0.0, 2.0, 0.0),
        Vector3::new(0.0, 0.0, 1.2),
        &mut points,
    );
    sphere(Point3::new(0.7, 0.5, 0.1), 0.3, &mut points);
    boxed(
        Point3::new(1.2, 1.1, 0.0),
        Vector3::new(0.5, 0.3, 0.4),
        &mut points,
    );
    PointCloud::new(points)
}

fn motion() -> Matrix4<f32> {
    rigid_transform(
        &axis_angle_rotation(&Vector3::new(0.2, 0.3, 1.0), 35f32.to_radians()),
        &Vector3::new(0.4, -0.3, 0.2),
    )
}

fn config(method: GlobalMethod) -> AlignConfig {
    let mut config = AlignConfig {
        voxel_size: VOXEL,
        method,
        ..Default::default()
    };
    config.icp.distance_factor = 1.0;
    config.icp.max_iteration = 100;
    config.with_seed(42)
}

fn assert_recovers(found: &Matrix4<f32>, truth: &Matrix4<f32>, diagonal: f32) {
    let (rot, trans) = transform_error(found, truth);
    assert!(rot < 1f32.to_radians(), "rotation error {} rad", rot);
    assert!(
        trans < 0.01 * diagonal,
        "translation error {} (diagonal {})",
        trans,
        diagonal
    );
}

#[test]
fn test_self_registration_is_identity() {
    let cloud = scene();
    let report = align_clouds(&cloud, &cloud, &config(GlobalMethod::Ransac)).unwrap();
    assert!(report.local.fitness > 0.99);
    assert!(report.local.inlier_rmse < 1e-3);
    assert_recovers(
        report.transformation(),
        &Matrix4::identity(),
        cloud.bounding_box_diagonal(),
    );
}

#[test]
fn test_recovers_known_transform_from_files() {
    let dir = tempdir().unwrap();
    let source_path = dir.path().join("source.ply");
    let target_path = dir.path().join("target.ply");

    let source = scene();
    let truth = motion();
    cv_io::write_point_cloud(&source_path, &source, false).unwrap();
    cv_io::write_point_cloud(&target_path, &source.transformed(&truth), false).unwrap();

    let report = align_files(&source_path, &target_path, &config(GlobalMethod::Ransac)).unwrap();
    assert!(report.global.fitness > 0.3, "global fitness {}", report.global.fitness);
    assert!(report.local.fitness > 0.95, "local fitness {}", report.local.fitness);
    assert_recovers(report.transformation(), &truth, source.bounding_box_diagonal());

    let merged_path = dir.path().join("merged.ply");
    let dataset = prepare_dataset(&source_path, &target_path, &config(GlobalMethod::Ransac)).unwrap();
    write_registration_result(&merged_path, &dataset.source, &dataset.target, report.transformation())
        .unwrap();
    let merged = cv_io::read_point_cloud(&merged_path).unwrap();
    assert_eq!(merged.len(), 2 * source.len());
    assert!(merged.has_colors());

    let report_path = dir.path().join("report.yaml");
    report.to_yaml(&report_path).unwrap();
    let text = std::fs::read_to_string(&report_path).unwrap();
    assert!(text.contains("global:") && text.contains("local:"));
}

#[test]
fn test_fgr_agrees_with_ransac() {
    let source = scene();
    let target = source.transformed(&motion());

    let ransac = align_clouds(&source, &target, &config(GlobalMethod::Ransac)).unwrap();
    let fgr = align_clouds(&source, &target, &config(GlobalMethod::Fgr)).unwrap();

    let diagonal = source.bounding_box_diagonal();
    assert_recovers(fgr.transformation(), ransac.transformation(), diagonal);
    assert!(fgr.local.fitness > 0.95);
}

#[test]
fn test_scaled_target_is_restored() {
    // a target stored at half size, rescaled back before alignment
    let source = scene();
    let truth = motion();
    let mut target = source.transformed(&truth);
    let center = target.get_center();
    target.scale(0.5, &center);

    let mut cfg = config(GlobalMethod::Ransac);
    cfg.target_scale = 2.0;
    let report = align_clouds(&source, &target, &cfg).unwrap();
    assert_recovers(report.transformation(), &truth, source.bounding_box_diagonal());
}

#[test]
fn test_invalid_voxel_size() {
    let cloud = scene();
    let cfg = AlignConfig {
        voxel_size: 0.0,
        ..Default::default()
    };
    assert!(matches!(
        align_clouds(&cloud, &cloud, &cfg),
        Err(Error::InvalidParameter(_))
    ));
}

#[test]
fn test_missing_file() {
    let dir = tempdir().unwrap();
    let present = dir.path().join("present.ply");
    cv_io::write_point_cloud(&present, &scene(), false).unwrap();

    let res = align_files(
        dir.path().join("absent.ply"),
        &present,
        &AlignConfig::default(),
    );
    assert!(matches!(res, Err(Error::Io(_))));
}
