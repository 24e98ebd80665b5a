pub mod cancel;
pub mod classifier;
pub mod config;
pub mod cutter;
pub mod error;
pub mod video;

pub use cancel::CancelToken;
pub use config::{PipelineConfig, PreprocessConfig, RangeParams};
pub use error::{Result, StageError};
