//! Point cloud registration algorithms
//!
//! This crate provides the coarse-to-fine 3D registration chain:
//! - RANSAC over FPFH correspondences
//! - FGR (Fast Global Registration)
//! - ICP (Iterative Closest Point), point-to-point

pub mod registration;

pub use registration::{
    correspondences_from_features, evaluate_registration, registration_fgr_based_on_feature_matching,
    registration_icp, registration_ransac_based_on_feature_matching, CorrespondenceChecker,
    FastGlobalRegistrationOption, ICPConvergenceCriteria, RANSACConvergenceCriteria,
    RansacOptions, RegistrationResult, TransformationEstimationPointToPoint,
};

pub use cv_point_cloud::FPFHFeature;
