//! Coarse-to-fine point cloud alignment.
//!
//! Two clouds are downsampled on a voxel grid and described with FPFH
//! features, aligned globally by RANSAC or Fast Global Registration, then
//! refined with point-to-point ICP. The stages live in the workspace crates
//! re-exported below; this crate wires them together behind a YAML config
//! and a command-line front end.

pub mod cli;
pub mod config;
pub mod pipeline;
pub mod runtime;

pub use cv_core as core;
pub use cv_io as io;
pub use cv_point_cloud as point_cloud;
pub use cv_registration as registration;

pub use config::{AlignConfig, FgrSection, GlobalMethod, IcpSection, RansacSection};
pub use pipeline::{
    align_clouds, align_dataset, align_files, colored_registration_result, prepare_clouds,
    prepare_dataset, run_global, run_local, write_registration_result, AlignmentReport, Dataset,
};
pub use runtime::init_thread_pool;
