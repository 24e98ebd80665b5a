pub mod api;
pub mod core;

pub use crate::api::{ClassifyBasis, JsonReporter, Reporter, StagePipeline};
pub use crate::core::{CancelToken, PipelineConfig, PreprocessConfig, RangeParams, Result, StageError};

/// 初始化日志，重复调用无副作用
pub fn init_logging() {
    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(log::LevelFilter::Debug)
                .with_tag("stagecut"),
        );
    }

    #[cfg(not(target_os = "android"))]
    {
        // RUST_LOG 未设置时默认 info
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .try_init();
    }
}
