//! Error types for the viewer core

use thiserror::Error;

use crate::render::viewer::Lifecycle;

/// Main error type for viewer operations
#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("failed to load model from {source_id}: {reason}")]
    Load { source_id: String, reason: String },

    #[error("cannot {operation} while the session is {state:?}")]
    Lifecycle {
        operation: &'static str,
        state: Lifecycle,
    },

    #[error("unsupported model format: {0}")]
    UnsupportedFormat(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("fetch error: {0}")]
    Fetch(String),

    #[error("surface error: {0}")]
    Surface(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl ViewerError {
    pub(crate) fn lifecycle(operation: &'static str, state: Lifecycle) -> Self {
        ViewerError::Lifecycle { operation, state }
    }

    /// Wrap a lower-level failure as a load failure for `source_id`.
    pub(crate) fn load(source_id: impl Into<String>, err: ViewerError) -> Self {
        match err {
            err @ ViewerError::Load { .. } => err,
            other => ViewerError::Load {
                source_id: source_id.into(),
                reason: other.to_string(),
            },
        }
    }
}

impl From<gltf::Error> for ViewerError {
    fn from(e: gltf::Error) -> Self {
        ViewerError::Parse(e.to_string())
    }
}

impl From<tobj::LoadError> for ViewerError {
    fn from(e: tobj::LoadError) -> Self {
        ViewerError::Parse(e.to_string())
    }
}

impl From<wgpu::SurfaceError> for ViewerError {
    fn from(e: wgpu::SurfaceError) -> Self {
        ViewerError::Surface(e.to_string())
    }
}

/// Result type alias for viewer operations
pub type Result<T> = std::result::Result<T, ViewerError>;
