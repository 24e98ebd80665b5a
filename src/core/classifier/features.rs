use crate::core::config::PreprocessConfig;
use crate::core::error::Result;
use crate::core::video::preprocess_gray;
use image::GrayImage;

/// 特征：按配置缩放后的灰度像素，归一化到 [0, 1]，行优先
///
/// 训练与推理必须使用同一个配置，模型里会记录该配置用于校验。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureExtractor {
    config: PreprocessConfig,
}

impl FeatureExtractor {
    pub fn new(config: PreprocessConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    pub fn feature_len(&self, width: u32, height: u32) -> usize {
        let (w, h) = self.config.output_size(width, height);
        (w * h) as usize
    }

    pub fn extract(&self, picture: &GrayImage) -> Vec<f32> {
        preprocess_gray(picture, &self.config)
            .into_raw()
            .into_iter()
            .map(|v| v as f32 / 255.0)
            .collect()
    }
}
