use cv_core::point_cloud::PointCloud;
use nalgebra::{Point3, Vector3};

#[test]
fn test_point_cloud_result_handling() {
    let points = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 1.0, 1.0),
    ];
    let cloud = PointCloud::new(points);
    
    // 1. Valid colors
    let colors = vec![
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
    ];
    let cloud_with_colors = cloud.clone().with_colors(colors);
    assert!(cloud_with_colors.is_ok());
    
    // 2. Invalid colors (count mismatch)
    let bad_colors = vec![Point3::new(1.0, 0.0, 0.0)];
    let cloud_bad_colors = cloud.clone().with_colors(bad_colors);
    assert!(cloud_bad_colors.is_err());
    assert!(cloud_bad_colors.unwrap_err().to_string().contains("Color count"));
    
    // 3. Valid normals
    let normals = vec![
        Vector3::new(0.0, 0.0, 1.0),
        Vector3::new(0.0, 0.0, 1.0),
    ];
    let cloud_with_normals = cloud.clone().with_normals(normals);
    assert!(cloud_with_normals.is_ok());
    
    // 4. Invalid normals (count mismatch)
    let bad_normals = vec![Vector3::new(0.0, 0.0, 1.0)];
    let cloud_bad_normals = cloud.with_normals(bad_normals);
    assert!(cloud_bad_normals.is_err());
    assert!(cloud_bad_normals.unwrap_err().to_string().contains("Normal count"));
}

#[test]
fn test_copy_before_transform_preserves_original() {
    use cv_core::geometry::{axis_angle_rotation, inverse_rigid, rigid_transform};

    let points: Vec<Point3<f32>> = (0..20)
        .map(|i| Point3::new(i as f32 * 0.1, (i % 3) as f32, (i % 5) as f32 * 0.2))
        .collect();
    let original = PointCloud::new(points);
    let t = rigid_transform(
        &axis_angle_rotation(&Vector3::new(1.0, 1.0, 0.0), 0.4),
        &Vector3::new(0.5, -0.5, 2.0),
    );

    let mut display = original.clone();
    display.paint_uniform_color([1.0, 0.0, 0.0]);
    display.transform(&t);

    assert!(original.colors.is_none());
    assert_ne!(display.points[3], original.points[3]);

    display.transform(&inverse_rigid(&t));
    for (a, b) in display.points.iter().zip(&original.points) {
        assert!((a - b).norm() < 1e-5);
    }
}

#[test]
fn test_invalid_parameter_message() {
    let err = cv_core::ensure_positive("voxel_size", 0.0).unwrap_err();
    assert!(matches!(err, cv_core::Error::InvalidParameter(_)));
    assert!(err.to_string().contains("voxel_size"));
}
