//! Point Cloud Operations
//!
//! Everything needed to turn a raw cloud into something the registration
//! crate can match:
//!
//! - `search`: R*-tree backed nearest-neighbour queries (kNN, radius, hybrid)
//! - `filtering`: voxel-grid downsampling
//! - `normals`: PCA normal estimation
//! - `features`: Fast Point Feature Histograms
//! - `preprocess`: downsample + normals + FPFH at one voxel size

pub mod features;
pub mod filtering;
pub mod normals;
pub mod preprocess;
pub mod search;

pub use features::{compute_fpfh_feature, FPFHFeature, FPFH_DIMENSION};
pub use filtering::voxel_down_sample;
pub use normals::estimate_normals;
pub use preprocess::{preprocess_point_cloud, preprocess_point_cloud_with, PreprocessOptions};
pub use search::{PointIndex, SearchParam};
