//! Core types shared by the alignment crates.
//!
//! - [`PointCloud`]: points with optional colors and normals
//! - [`geometry`]: rigid transform helpers on `Matrix4<f32>`
//! - [`robust`]: a generic RANSAC engine
//! - [`Error`] / [`Result`]: the error type every crate in the workspace returns

pub mod geometry;
pub mod point_cloud;
pub mod robust;

pub use geometry::*;
pub use point_cloud::{PointCloud, PointCloudf32};
pub use robust::{Ransac, RobustConfig, RobustModel, RobustResult};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Reject non-finite or non-positive values for a named parameter.
pub fn ensure_positive(name: &str, value: f32) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::invalid_parameter(format!(
            "{} must be a positive finite number, got {}",
            name, value
        )))
    }
}
