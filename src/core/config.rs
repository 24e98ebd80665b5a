//! 流水线配置
//!
//! 所有参数集中在 [`PipelineConfig`]，构造一次后以引用传给 cut / train / classify。

use super::error::{Result, StageError};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

pub const DEFAULT_THRESHOLD: f64 = 0.95;
pub const DEFAULT_FRAME_COUNT: usize = 5;
pub const DEFAULT_COMPRESS_RATE: f32 = 0.2;
pub const DEFAULT_OFFSET: u64 = 3;

/// 预处理方式：按比例压缩，或缩放到固定尺寸
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PreprocessConfig {
    Compress { rate: f32 },
    Resize { width: u32, height: u32 },
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        PreprocessConfig::Compress {
            rate: DEFAULT_COMPRESS_RATE,
        }
    }
}

impl PreprocessConfig {
    /// `target_size` wins when both are given; neither falls back to the default rate.
    pub fn from_options(compress_rate: Option<f32>, target_size: Option<(u32, u32)>) -> Result<Self> {
        let config = match (compress_rate, target_size) {
            (Some(rate), Some((width, height))) => {
                warn!(
                    "⚠️ both compress_rate={} and target_size={}x{} given, using target_size",
                    rate, width, height
                );
                PreprocessConfig::Resize { width, height }
            }
            (None, Some((width, height))) => PreprocessConfig::Resize { width, height },
            (Some(rate), None) => PreprocessConfig::Compress { rate },
            (None, None) => PreprocessConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            PreprocessConfig::Compress { rate } => {
                if !(rate > 0.0 && rate <= 1.0) {
                    return Err(StageError::config(
                        "compress_rate",
                        format!("{} is outside (0, 1]", rate),
                    ));
                }
            }
            PreprocessConfig::Resize { width, height } => {
                if width == 0 || height == 0 {
                    return Err(StageError::config(
                        "target_size",
                        format!("{}x{} has a zero dimension", width, height),
                    ));
                }
            }
        }
        Ok(())
    }

    /// 输出尺寸只由输入尺寸和配置决定
    pub fn output_size(&self, width: u32, height: u32) -> (u32, u32) {
        match *self {
            PreprocessConfig::Compress { rate } => {
                let scale = |v: u32| ((v as f64 * rate as f64).round() as u32).max(1);
                (scale(width), scale(height))
            }
            PreprocessConfig::Resize { width, height } => (width, height),
        }
    }
}

impl fmt::Display for PreprocessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreprocessConfig::Compress { rate } => write!(f, "compress_rate={}", rate),
            PreprocessConfig::Resize { width, height } => {
                write!(f, "target_size={}x{}", width, height)
            }
        }
    }
}

/// 区间划分参数，cut / classify / report 必须保持一致
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeParams {
    pub threshold: f64,
    pub offset: u64,
    pub limit: u64,
}

impl Default for RangeParams {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            offset: DEFAULT_OFFSET,
            limit: 0,
        }
    }
}

impl RangeParams {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(StageError::config(
                "threshold",
                format!("{} is outside [0, 1]", self.threshold),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub threshold: f64,
    pub frame_count: usize,
    pub preprocess: PreprocessConfig,
    pub offset: u64,
    pub limit: u64,
    /// `None` 时使用 CPU 核数
    pub workers: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            frame_count: DEFAULT_FRAME_COUNT,
            preprocess: PreprocessConfig::default(),
            offset: DEFAULT_OFFSET,
            limit: 0,
            workers: None,
        }
    }
}

impl PipelineConfig {
    pub fn with_preprocess(mut self, preprocess: PreprocessConfig) -> Self {
        self.preprocess = preprocess;
        self
    }

    pub fn range_params(&self) -> RangeParams {
        RangeParams {
            threshold: self.threshold,
            offset: self.offset,
            limit: self.limit,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }

    pub fn validate(&self) -> Result<()> {
        self.range_params().validate()?;
        if self.frame_count == 0 {
            return Err(StageError::config("frame_count", "must be greater than 0"));
        }
        if self.workers == Some(0) {
            return Err(StageError::config("workers", "must be greater than 0"));
        }
        self.preprocess.validate()
    }

    /// 从 JSON5 文本读取配置，缺省字段使用默认值
    pub fn from_json5_str(text: &str) -> Result<Self> {
        let file: ConfigFile = json5::from_str(text)
            .map_err(|e| StageError::Format(format!("config file: {}", e)))?;
        file.into_config()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(StageError::ResourceMissing(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_json5_str(&text)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    threshold: Option<f64>,
    frame_count: Option<usize>,
    compress_rate: Option<f32>,
    target_size: Option<(u32, u32)>,
    offset: Option<u64>,
    limit: Option<u64>,
    workers: Option<usize>,
}

impl ConfigFile {
    fn into_config(self) -> Result<PipelineConfig> {
        let defaults = PipelineConfig::default();
        let config = PipelineConfig {
            threshold: self.threshold.unwrap_or(defaults.threshold),
            frame_count: self.frame_count.unwrap_or(defaults.frame_count),
            preprocess: PreprocessConfig::from_options(self.compress_rate, self.target_size)?,
            offset: self.offset.unwrap_or(defaults.offset),
            limit: self.limit.unwrap_or(defaults.limit),
            workers: self.workers,
        };
        config.validate()?;
        Ok(config)
    }
}
