use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StageError>;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("invalid config `{param}`: {reason}")]
    Config { param: &'static str, reason: String },
    #[error("not enough training data: {0}")]
    DataInsufficient(String),
    #[error("feature config mismatch: model expects {expected}, got {actual}")]
    ConfigMismatch { expected: String, actual: String },
    #[error("refusing to overwrite existing path {0:?}")]
    ResourceExists(PathBuf),
    #[error("required path {0:?} does not exist")]
    ResourceMissing(PathBuf),
    #[error("unrecognized or corrupt data: {0}")]
    Format(String),
    #[error("frame size mismatch: {left:?} vs {right:?}")]
    DimensionMismatch { left: (u32, u32), right: (u32, u32) },
    #[error("frame source error: {0}")]
    Source(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StageError {
    pub(crate) fn config(param: &'static str, reason: impl Into<String>) -> Self {
        StageError::Config {
            param,
            reason: reason.into(),
        }
    }
}
