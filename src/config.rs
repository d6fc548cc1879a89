//! Configuration types for the alignment pipeline.

use cv_core::{Error, Result};
use cv_point_cloud::PreprocessOptions;
use cv_registration::{
    CorrespondenceChecker, FastGlobalRegistrationOption, ICPConvergenceCriteria,
    RANSACConvergenceCriteria, RansacOptions, TransformationEstimationPointToPoint,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Coarse alignment strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GlobalMethod {
    /// RANSAC over FPFH correspondences
    #[default]
    Ransac,
    /// Fast Global Registration
    Fgr,
}

/// RANSAC global registration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RansacSection {
    #[serde(default = "default_max_iteration")]
    pub max_iteration: usize,

    #[serde(default = "default_confidence")]
    pub confidence: f64,

    /// Inlier threshold as a multiple of the voxel size
    #[serde(default = "default_ransac_distance_factor")]
    pub distance_factor: f32,

    #[serde(default = "default_edge_length_similarity")]
    pub edge_length_similarity: f32,

    #[serde(default = "default_true")]
    pub mutual_filter: bool,

    /// Estimate a similarity transform instead of a rigid one
    #[serde(default)]
    pub with_scaling: bool,

    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_max_iteration() -> usize {
    100_000
}

fn default_confidence() -> f64 {
    0.999
}

fn default_ransac_distance_factor() -> f32 {
    1.5
}

fn default_edge_length_similarity() -> f32 {
    0.9
}

fn default_true() -> bool {
    true
}

impl Default for RansacSection {
    fn default() -> Self {
        Self {
            max_iteration: default_max_iteration(),
            confidence: default_confidence(),
            distance_factor: default_ransac_distance_factor(),
            edge_length_similarity: default_edge_length_similarity(),
            mutual_filter: true,
            with_scaling: false,
            seed: None,
        }
    }
}

/// Fast Global Registration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FgrSection {
    /// Correspondence distance as a multiple of the voxel size
    pub distance_factor: f32,
    pub iteration_number: usize,
    pub tuple_scale: f64,
    pub maximum_tuple_count: usize,
    pub division_factor: f64,
    pub decrease_mu: bool,
    pub use_absolute_scale: bool,
    pub tuple_test: bool,
    pub seed: Option<u64>,
}

impl Default for FgrSection {
    fn default() -> Self {
        let option = FastGlobalRegistrationOption::default();
        Self {
            distance_factor: 0.5,
            iteration_number: option.iteration_number,
            tuple_scale: option.tuple_scale,
            maximum_tuple_count: option.maximum_tuple_count,
            division_factor: option.division_factor,
            decrease_mu: option.decrease_mu,
            use_absolute_scale: option.use_absolute_scale,
            tuple_test: option.tuple_test,
            seed: None,
        }
    }
}

/// ICP refinement settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcpSection {
    /// Correspondence distance as a multiple of the voxel size
    pub distance_factor: f32,
    pub max_iteration: usize,
    pub relative_fitness: f32,
    pub relative_rmse: f32,
}

impl Default for IcpSection {
    fn default() -> Self {
        let criteria = ICPConvergenceCriteria::default();
        Self {
            distance_factor: 0.4,
            max_iteration: criteria.max_iteration,
            relative_fitness: criteria.relative_fitness,
            relative_rmse: criteria.relative_rmse,
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignConfig {
    /// Voxel size used for downsampling; every other distance derives from it
    #[serde(default = "default_voxel_size")]
    pub voxel_size: f32,

    /// Uniform scale applied to the source about its own centroid
    #[serde(default = "default_scale")]
    pub source_scale: f32,

    /// Uniform scale applied to the target about its own centroid
    #[serde(default = "default_scale")]
    pub target_scale: f32,

    #[serde(default)]
    pub method: GlobalMethod,

    #[serde(default)]
    pub preprocess: PreprocessOptions,

    #[serde(default)]
    pub ransac: RansacSection,

    #[serde(default)]
    pub fgr: FgrSection,

    #[serde(default)]
    pub icp: IcpSection,
}

fn default_voxel_size() -> f32 {
    0.05
}

fn default_scale() -> f32 {
    1.0
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            voxel_size: default_voxel_size(),
            source_scale: default_scale(),
            target_scale: default_scale(),
            method: GlobalMethod::default(),
            preprocess: PreprocessOptions::default(),
            ransac: RansacSection::default(),
            fgr: FgrSection::default(),
            icp: IcpSection::default(),
        }
    }
}

impl AlignConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::Parse(format!("config: {}", e)))
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::Parse(format!("config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values no stage could run with.
    pub fn validate(&self) -> Result<()> {
        cv_core::ensure_positive("voxel_size", self.voxel_size)?;
        cv_core::ensure_positive("source_scale", self.source_scale)?;
        cv_core::ensure_positive("target_scale", self.target_scale)?;
        cv_core::ensure_positive("icp.distance_factor", self.icp.distance_factor)?;
        self.preprocess.validate()?;
        self.icp_criteria().validate()?;
        match self.method {
            GlobalMethod::Ransac => self.ransac_options().validate(),
            GlobalMethod::Fgr => self.fgr_options().validate(),
        }
    }

    pub fn ransac_options(&self) -> RansacOptions {
        let distance_threshold = self.voxel_size * self.ransac.distance_factor;
        RansacOptions {
            mutual_filter: self.ransac.mutual_filter,
            max_correspondence_distance: distance_threshold,
            estimation: TransformationEstimationPointToPoint::new(self.ransac.with_scaling),
            ransac_n: 3,
            checkers: vec![
                CorrespondenceChecker::EdgeLength {
                    similarity_threshold: self.ransac.edge_length_similarity,
                },
                CorrespondenceChecker::Distance { distance_threshold },
            ],
            criteria: RANSACConvergenceCriteria {
                max_iteration: self.ransac.max_iteration,
                confidence: self.ransac.confidence,
            },
            seed: self.ransac.seed,
        }
    }

    pub fn fgr_options(&self) -> FastGlobalRegistrationOption {
        FastGlobalRegistrationOption {
            division_factor: self.fgr.division_factor,
            use_absolute_scale: self.fgr.use_absolute_scale,
            decrease_mu: self.fgr.decrease_mu,
            maximum_correspondence_distance: self.voxel_size * self.fgr.distance_factor,
            iteration_number: self.fgr.iteration_number,
            tuple_scale: self.fgr.tuple_scale,
            maximum_tuple_count: self.fgr.maximum_tuple_count,
            tuple_test: self.fgr.tuple_test,
            seed: self.fgr.seed,
        }
    }

    pub fn icp_threshold(&self) -> f32 {
        self.voxel_size * self.icp.distance_factor
    }

    pub fn icp_criteria(&self) -> ICPConvergenceCriteria {
        ICPConvergenceCriteria {
            relative_fitness: self.icp.relative_fitness,
            relative_rmse: self.icp.relative_rmse,
            max_iteration: self.icp.max_iteration,
        }
    }

    /// Set both RNG seeds.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.ransac.seed = Some(seed);
        self.fgr.seed = Some(seed);
        self
    }
}
