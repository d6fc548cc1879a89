use crate::features::{compute_fpfh_feature, FPFHFeature};
use crate::filtering::voxel_down_sample;
use crate::normals::estimate_normals;
use crate::search::SearchParam;
use cv_core::{PointCloud, Result};
use serde::{Deserialize, Serialize};

/// Neighbourhoods used when describing a downsampled cloud, as multiples of
/// the voxel size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessOptions {
    pub normal_radius_factor: f32,
    pub normal_max_nn: usize,
    pub feature_radius_factor: f32,
    pub feature_max_nn: usize,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            normal_radius_factor: 2.0,
            normal_max_nn: 30,
            feature_radius_factor: 5.0,
            feature_max_nn: 100,
        }
    }
}

impl PreprocessOptions {
    pub fn normal_param(&self, voxel_size: f32) -> SearchParam {
        SearchParam::hybrid(voxel_size * self.normal_radius_factor, self.normal_max_nn)
    }

    pub fn feature_param(&self, voxel_size: f32) -> SearchParam {
        SearchParam::hybrid(voxel_size * self.feature_radius_factor, self.feature_max_nn)
    }

    pub fn validate(&self) -> Result<()> {
        cv_core::ensure_positive("normal_radius_factor", self.normal_radius_factor)?;
        cv_core::ensure_positive("feature_radius_factor", self.feature_radius_factor)?;
        self.normal_param(1.0).validate()?;
        self.feature_param(1.0).validate()
    }
}

/// Downsample `pc` and describe the result with FPFH features.
///
/// Normals use a radius of `2v` (at most 30 neighbours), features `5v` (at
/// most 100). `pc` is not modified.
pub fn preprocess_point_cloud(
    pc: &PointCloud,
    voxel_size: f32,
) -> Result<(PointCloud, Vec<FPFHFeature>)> {
    preprocess_point_cloud_with(pc, voxel_size, &PreprocessOptions::default())
}

pub fn preprocess_point_cloud_with(
    pc: &PointCloud,
    voxel_size: f32,
    options: &PreprocessOptions,
) -> Result<(PointCloud, Vec<FPFHFeature>)> {
    options.validate()?;

    let mut down = voxel_down_sample(pc, voxel_size)?;
    estimate_normals(&mut down, &options.normal_param(voxel_size))?;
    let features = compute_fpfh_feature(&down, &options.feature_param(voxel_size))?;

    tracing::info!(
        input = pc.len(),
        downsampled = down.len(),
        voxel_size,
        "preprocessed point cloud"
    );
    Ok((down, features))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    #[test]
    fn test_preprocess_leaves_input_untouched() {
        let mut points = Vec::new();
        for i in 0..20 {
            for j in 0..20 {
                let x = i as f32 * 0.05;
                let y = j as f32 * 0.05;
                points.push(Point3::new(x, y, (x * 3.0).sin() * 0.2));
            }
        }
        let pc = PointCloud::new(points);
        let before = pc.clone();

        let (down, features) = preprocess_point_cloud(&pc, 0.1).unwrap();
        assert_eq!(pc, before);
        assert!(down.len() < pc.len());
        assert_eq!(features.len(), down.len());
        assert!(down.has_normals());
    }

    #[test]
    fn test_options() {
        let opts = PreprocessOptions::default();
        assert_eq!(opts.normal_param(0.05), SearchParam::hybrid(0.1, 30));
        assert_eq!(opts.feature_param(0.05), SearchParam::hybrid(0.25, 100));

        let bad = PreprocessOptions {
            feature_max_nn: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let pc = PointCloud::new(vec![Point3::origin()]);
        assert!(preprocess_point_cloud(&pc, 0.0).is_err());
    }
}
