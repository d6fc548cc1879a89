//! Coarse-to-fine alignment driver.
//!
//! Loads two clouds, describes their downsampled copies with FPFH, aligns
//! them globally (RANSAC or FGR) and refines the result with point-to-point
//! ICP on the full-resolution clouds.

use crate::config::{AlignConfig, GlobalMethod};
use cv_core::{PointCloud, Result};
use cv_point_cloud::{preprocess_point_cloud_with, FPFHFeature};
use cv_registration::{
    registration_fgr_based_on_feature_matching, registration_icp,
    registration_ransac_based_on_feature_matching, RegistrationResult,
    TransformationEstimationPointToPoint,
};
use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;

/// Source color in the inspection cloud.
pub const SOURCE_COLOR: [f32; 3] = [1.0, 0.0, 0.0];
/// Target color in the inspection cloud.
pub const TARGET_COLOR: [f32; 3] = [0.0, 0.0, 1.0];

/// Both clouds at full and voxel resolution plus the downsampled features.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub source: PointCloud,
    pub target: PointCloud,
    pub source_down: PointCloud,
    pub target_down: PointCloud,
    pub source_fpfh: Vec<FPFHFeature>,
    pub target_fpfh: Vec<FPFHFeature>,
    pub voxel_size: f32,
}

/// Outcome of a full run. `local.transformation` maps source onto target.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentReport {
    pub global: RegistrationResult,
    pub local: RegistrationResult,
}

impl AlignmentReport {
    pub fn transformation(&self) -> &Matrix4<f32> {
        &self.local.transformation
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(&ReportDocument::from(self))
            .map_err(|e| cv_core::Error::Parse(format!("report: {}", e)))
    }

    /// Save fitness, RMSE and matrices of both stages as YAML.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_yaml_string()?)?;
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct StageDocument {
    fitness: f32,
    inlier_rmse: f32,
    correspondences: usize,
    transformation: [[f32; 4]; 4],
}

#[derive(Serialize, Deserialize)]
struct ReportDocument {
    global: StageDocument,
    local: StageDocument,
}

impl From<&RegistrationResult> for StageDocument {
    fn from(result: &RegistrationResult) -> Self {
        let t = &result.transformation;
        let mut rows = [[0.0; 4]; 4];
        for (r, row) in rows.iter_mut().enumerate() {
            for (c, v) in row.iter_mut().enumerate() {
                *v = t[(r, c)];
            }
        }
        Self {
            fitness: result.fitness,
            inlier_rmse: result.inlier_rmse,
            correspondences: result.correspondence_set.len(),
            transformation: rows,
        }
    }
}

impl From<&AlignmentReport> for ReportDocument {
    fn from(report: &AlignmentReport) -> Self {
        Self {
            global: (&report.global).into(),
            local: (&report.local).into(),
        }
    }
}

fn rescale(cloud: &mut PointCloud, factor: f32) {
    if factor != 1.0 {
        let center = cloud.get_center();
        cloud.scale(factor, &center);
    }
}

/// Load both files and preprocess them.
pub fn prepare_dataset<P: AsRef<Path>, Q: AsRef<Path>>(
    source_path: P,
    target_path: Q,
    config: &AlignConfig,
) -> Result<Dataset> {
    config.validate()?;
    let source = cv_io::read_point_cloud(source_path.as_ref())?;
    let target = cv_io::read_point_cloud(target_path.as_ref())?;
    tracing::info!(
        source = %source_path.as_ref().display(),
        target = %target_path.as_ref().display(),
        source_points = source.len(),
        target_points = target.len(),
        "loaded point clouds"
    );
    prepare_clouds(source, target, config)
}

/// Scale each cloud about its own centroid if requested, then downsample and
/// compute features for both.
pub fn prepare_clouds(
    mut source: PointCloud,
    mut target: PointCloud,
    config: &AlignConfig,
) -> Result<Dataset> {
    config.validate()?;
    rescale(&mut source, config.source_scale);
    rescale(&mut target, config.target_scale);

    let v = config.voxel_size;
    let start = Instant::now();
    let (source_down, source_fpfh) = preprocess_point_cloud_with(&source, v, &config.preprocess)?;
    let (target_down, target_fpfh) = preprocess_point_cloud_with(&target, v, &config.preprocess)?;
    tracing::info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        "preprocessing done"
    );

    Ok(Dataset {
        source,
        target,
        source_down,
        target_down,
        source_fpfh,
        target_fpfh,
        voxel_size: v,
    })
}

/// Coarse alignment of the downsampled clouds.
pub fn run_global(dataset: &Dataset, config: &AlignConfig) -> Result<RegistrationResult> {
    let start = Instant::now();
    let result = match config.method {
        GlobalMethod::Ransac => registration_ransac_based_on_feature_matching(
            &dataset.source_down,
            &dataset.target_down,
            &dataset.source_fpfh,
            &dataset.target_fpfh,
            &config.ransac_options(),
        )?,
        GlobalMethod::Fgr => registration_fgr_based_on_feature_matching(
            &dataset.source_down,
            &dataset.target_down,
            &dataset.source_fpfh,
            &dataset.target_fpfh,
            &config.fgr_options(),
        )?,
    };
    tracing::info!(
        method = ?config.method,
        elapsed_ms = start.elapsed().as_millis() as u64,
        fitness = result.fitness,
        rmse = result.inlier_rmse,
        "global registration done"
    );
    Ok(result)
}

/// ICP on the full clouds, seeded with the global transform.
pub fn run_local(
    dataset: &Dataset,
    config: &AlignConfig,
    global: &RegistrationResult,
) -> Result<RegistrationResult> {
    let start = Instant::now();
    let result = registration_icp(
        &dataset.source,
        &dataset.target,
        config.icp_threshold(),
        &global.transformation,
        &TransformationEstimationPointToPoint::default(),
        &config.icp_criteria(),
    )?;
    tracing::info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        fitness = result.fitness,
        rmse = result.inlier_rmse,
        "local refinement done"
    );
    Ok(result)
}

/// Global alignment followed by ICP on a prepared dataset.
pub fn align_dataset(dataset: &Dataset, config: &AlignConfig) -> Result<AlignmentReport> {
    let global = run_global(dataset, config)?;
    let local = run_local(dataset, config, &global)?;
    Ok(AlignmentReport { global, local })
}

/// Align the cloud stored at `source_path` onto the one at `target_path`.
pub fn align_files<P: AsRef<Path>, Q: AsRef<Path>>(
    source_path: P,
    target_path: Q,
    config: &AlignConfig,
) -> Result<AlignmentReport> {
    let dataset = prepare_dataset(source_path, target_path, config)?;
    align_dataset(&dataset, config)
}

/// Align in-memory clouds. Scaling options are applied to copies.
pub fn align_clouds(
    source: &PointCloud,
    target: &PointCloud,
    config: &AlignConfig,
) -> Result<AlignmentReport> {
    let dataset = prepare_clouds(source.clone(), target.clone(), config)?;
    align_dataset(&dataset, config)
}

/// Merge a red copy of `source` moved by `transformation` with a blue copy of
/// `target`, for inspecting an alignment in any point cloud viewer.
pub fn colored_registration_result(
    source: &PointCloud,
    target: &PointCloud,
    transformation: &Matrix4<f32>,
) -> PointCloud {
    let mut merged = source.clone();
    merged.paint_uniform_color(SOURCE_COLOR);
    merged.transform(transformation);

    let mut target = target.clone();
    target.paint_uniform_color(TARGET_COLOR);
    merged.concatenate(&target);
    merged
}

pub fn write_registration_result<P: AsRef<Path>>(
    path: P,
    source: &PointCloud,
    target: &PointCloud,
    transformation: &Matrix4<f32>,
) -> Result<()> {
    let merged = colored_registration_result(source, target, transformation);
    cv_io::write_point_cloud(path, &merged, false)
}
