//! 结构相似度（SSIM）打分
//!
//! 在预处理后的灰度图上以 7x7 均值窗口滑动计算 SSIM，取均值并截断到 [0, 1]。
//! 窗口统计量用积分图求和，全部为整数运算，交换两帧结果完全相同。

use crate::core::config::PreprocessConfig;
use crate::core::error::{Result, StageError};
use crate::core::video::{preprocess, Frame};
use image::GrayImage;

const DEFAULT_WINDOW: u32 = 7;
const C1: f64 = (0.01 * 255.0) * (0.01 * 255.0);
const C2: f64 = (0.03 * 255.0) * (0.03 * 255.0);

#[derive(Debug, Clone, Copy)]
pub struct SimilarityScorer {
    window: u32,
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
        }
    }
}

impl SimilarityScorer {
    pub fn with_window(window: u32) -> Self {
        Self {
            window: window.max(1),
        }
    }

    /// 两帧各自独立预处理后再比较
    pub fn score_frames(&self, a: &Frame, b: &Frame, config: &PreprocessConfig) -> Result<f64> {
        let a = preprocess(a, config)?;
        let b = preprocess(b, config)?;
        self.score(&a, &b)
    }

    pub fn score(&self, a: &GrayImage, b: &GrayImage) -> Result<f64> {
        if a.dimensions() != b.dimensions() {
            return Err(StageError::DimensionMismatch {
                left: a.dimensions(),
                right: b.dimensions(),
            });
        }
        if a.as_raw() == b.as_raw() {
            return Ok(1.0);
        }

        let (width, height) = a.dimensions();
        // 小于窗口的图退化为单个全局窗口
        let win_w = self.window.min(width) as usize;
        let win_h = self.window.min(height) as usize;
        let w = width as usize;
        let h = height as usize;

        let sum_a = Integral::build(w, h, |i| a.as_raw()[i] as u64);
        let sum_b = Integral::build(w, h, |i| b.as_raw()[i] as u64);
        let sum_aa = Integral::build(w, h, |i| sq(a.as_raw()[i]));
        let sum_bb = Integral::build(w, h, |i| sq(b.as_raw()[i]));
        let sum_ab = Integral::build(w, h, |i| a.as_raw()[i] as u64 * b.as_raw()[i] as u64);

        let np = (win_w * win_h) as f64;
        let cov_norm = if np > 1.0 { np / (np - 1.0) } else { 1.0 };

        let mut total = 0.0;
        let mut windows = 0usize;
        for y in 0..=(h - win_h) {
            for x in 0..=(w - win_w) {
                let mu_a = sum_a.window(x, y, win_w, win_h) as f64 / np;
                let mu_b = sum_b.window(x, y, win_w, win_h) as f64 / np;
                let var_a = (sum_aa.window(x, y, win_w, win_h) as f64 / np - mu_a * mu_a) * cov_norm;
                let var_b = (sum_bb.window(x, y, win_w, win_h) as f64 / np - mu_b * mu_b) * cov_norm;
                let cov = (sum_ab.window(x, y, win_w, win_h) as f64 / np - mu_a * mu_b) * cov_norm;

                let numerator = (2.0 * mu_a * mu_b + C1) * (2.0 * cov + C2);
                let denominator = (mu_a * mu_a + mu_b * mu_b + C1) * (var_a + var_b + C2);
                total += numerator / denominator;
                windows += 1;
            }
        }

        Ok((total / windows as f64).clamp(0.0, 1.0))
    }
}

fn sq(v: u8) -> u64 {
    v as u64 * v as u64
}

/// 积分图，(w+1)*(h+1)
struct Integral {
    stride: usize,
    sums: Vec<u64>,
}

impl Integral {
    fn build(w: usize, h: usize, value: impl Fn(usize) -> u64) -> Self {
        let stride = w + 1;
        let mut sums = vec![0u64; stride * (h + 1)];
        for y in 0..h {
            let mut row = 0u64;
            for x in 0..w {
                row += value(y * w + x);
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
            }
        }
        Self { stride, sums }
    }

    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> u64 {
        let s = self.stride;
        self.sums[(y + h) * s + x + w] + self.sums[y * s + x]
            - self.sums[y * s + x + w]
            - self.sums[(y + h) * s + x]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn gradient(width: u32, height: u32, shift: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| Luma([((x * 7 + y * 3 + shift) % 256) as u8]))
    }

    #[test]
    fn test_identical_is_one() {
        let scorer = SimilarityScorer::default();
        let a = gradient(32, 24, 0);
        assert_eq!(scorer.score(&a, &a.clone()).unwrap(), 1.0);
    }

    #[test]
    fn test_solid_frames_do_not_divide_by_zero() {
        let scorer = SimilarityScorer::default();
        let black = GrayImage::from_pixel(16, 16, Luma([0]));
        let white = GrayImage::from_pixel(16, 16, Luma([255]));
        let score = scorer.score(&black, &white).unwrap();
        assert!(score.is_finite());
        assert!((0.0..0.01).contains(&score));

        let gray = GrayImage::from_pixel(16, 16, Luma([128]));
        let near = GrayImage::from_pixel(16, 16, Luma([129]));
        assert!(scorer.score(&gray, &near).unwrap() > 0.99);
    }

    #[test]
    fn test_symmetry() {
        let scorer = SimilarityScorer::default();
        for shift in [1, 17, 90, 200] {
            let a = gradient(20, 15, 0);
            let b = gradient(20, 15, shift);
            let ab = scorer.score(&a, &b).unwrap();
            let ba = scorer.score(&b, &a).unwrap();
            assert_eq!(ab, ba);
            assert!((0.0..=1.0).contains(&ab));
        }
    }

    #[test]
    fn test_more_change_scores_lower() {
        let scorer = SimilarityScorer::default();
        let base = gradient(32, 32, 0);
        let mut slight = base.clone();
        slight.put_pixel(5, 5, Luma([255]));
        let heavy = gradient(32, 32, 128);
        let s1 = scorer.score(&base, &slight).unwrap();
        let s2 = scorer.score(&base, &heavy).unwrap();
        assert!(s1 > s2);
        assert!(s1 < 1.0);
    }

    #[test]
    fn test_tiny_pictures_use_global_window() {
        let scorer = SimilarityScorer::default();
        let a = GrayImage::from_pixel(1, 1, Luma([10]));
        let b = GrayImage::from_pixel(1, 1, Luma([12]));
        let score = scorer.score(&a, &b).unwrap();
        assert!(score > 0.9 && score < 1.0);
    }

    #[test]
    fn test_size_mismatch() {
        let scorer = SimilarityScorer::default();
        let a = GrayImage::new(4, 4);
        let b = GrayImage::new(4, 5);
        assert!(matches!(
            scorer.score(&a, &b),
            Err(StageError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_score_frames_applies_config() {
        let scorer = SimilarityScorer::default();
        let a = Frame::new(40, 40, vec![90u8; 40 * 40 * 4], 0, 0);
        let b = Frame::new(40, 40, vec![90u8; 40 * 40 * 4], 33, 1);
        let config = PreprocessConfig::Resize {
            width: 8,
            height: 8,
        };
        assert_eq!(scorer.score_frames(&a, &b, &config).unwrap(), 1.0);
    }
}
