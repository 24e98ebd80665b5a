//! 预处理：灰度 + 压缩/缩放，检测、采样、特征提取共用同一套逻辑

use super::frame::Frame;
use crate::core::config::PreprocessConfig;
use crate::core::error::Result;
use image::imageops::{self, FilterType};
use image::GrayImage;

pub fn preprocess(frame: &Frame, config: &PreprocessConfig) -> Result<GrayImage> {
    let gray = frame.to_gray()?;
    Ok(preprocess_gray(&gray, config))
}

pub fn preprocess_gray(gray: &GrayImage, config: &PreprocessConfig) -> GrayImage {
    let (width, height) = config.output_size(gray.width(), gray.height());
    if (width, height) == gray.dimensions() {
        return gray.clone();
    }
    imageops::resize(gray, width, height, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, fill: u8) -> Frame {
        Frame::new(width, height, vec![fill; (width * height * 4) as usize], 0, 0)
    }

    #[test]
    fn test_compress() {
        let frame = solid_frame(100, 50, 200);
        let out = preprocess(&frame, &PreprocessConfig::Compress { rate: 0.2 }).unwrap();
        assert_eq!(out.dimensions(), (20, 10));
        assert!(out.pixels().all(|p| p.0[0] == 200));
    }

    #[test]
    fn test_resize_is_deterministic() {
        let mut frame = solid_frame(64, 64, 0);
        for (i, px) in frame.data.chunks_exact_mut(4).enumerate() {
            px[0] = (i % 251) as u8;
        }
        let config = PreprocessConfig::Resize {
            width: 16,
            height: 12,
        };
        let a = preprocess(&frame, &config).unwrap();
        let b = preprocess(&frame, &config).unwrap();
        assert_eq!(a.dimensions(), (16, 12));
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn test_full_rate_keeps_size() {
        let frame = solid_frame(10, 10, 30);
        let out = preprocess(&frame, &PreprocessConfig::Compress { rate: 1.0 }).unwrap();
        assert_eq!(out.dimensions(), (10, 10));
    }
}
