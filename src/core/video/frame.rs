use crate::core::error::{Result, StageError};
use image::{GrayImage, RgbaImage};
use std::time::Duration;

/// 帧数据结构
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>, // RGBA 格式
    pub timestamp: Duration,
    pub frame_number: u64,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        data: Vec<u8>,
        timestamp_ms: u64,
        frame_number: u64,
    ) -> Self {
        Self {
            width,
            height,
            data,
            timestamp: Duration::from_millis(timestamp_ms),
            frame_number,
        }
    }

    pub fn from_rgba_image(img: RgbaImage, timestamp_ms: u64, frame_number: u64) -> Self {
        let (width, height) = img.dimensions();
        Self::new(width, height, img.into_raw(), timestamp_ms, frame_number)
    }

    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp.as_millis() as u64
    }

    /// 转灰度（整数加权 299/587/114）
    pub fn to_gray(&self) -> Result<GrayImage> {
        if self.width == 0 || self.height == 0 {
            return Err(StageError::Source(format!(
                "frame {} has an empty {}x{} picture",
                self.frame_number, self.width, self.height
            )));
        }
        if self.data.len() != self.pixel_count() * 4 {
            return Err(StageError::Source(format!(
                "frame {} carries {} bytes, expected {} for {}x{} RGBA",
                self.frame_number,
                self.data.len(),
                self.pixel_count() * 4,
                self.width,
                self.height
            )));
        }

        let gray: Vec<u8> = self
            .data
            .chunks_exact(4)
            .map(|rgba| {
                ((rgba[0] as u32 * 299 + rgba[1] as u32 * 587 + rgba[2] as u32 * 114) / 1000) as u8
            })
            .collect();

        GrayImage::from_raw(self.width, self.height, gray)
            .ok_or_else(|| StageError::Source(format!("frame {}: bad buffer", self.frame_number)))
    }
}

/// 帧元数据（轻量级，不持有像素）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: u64,
    pub frame_number: u64,
}

impl FrameInfo {
    pub fn from_frame(frame: &Frame) -> Self {
        Self {
            width: frame.width,
            height: frame.height,
            timestamp_ms: frame.timestamp_ms(),
            frame_number: frame.frame_number,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_creation() {
        let data = vec![255u8; 100 * 100 * 4]; // 100x100 white image
        let frame = Frame::new(100, 100, data, 1000, 30);

        assert_eq!(frame.width, 100);
        assert_eq!(frame.height, 100);
        assert_eq!(frame.pixel_count(), 10000);
        assert_eq!(frame.timestamp_ms(), 1000);
        assert_eq!(frame.frame_number, 30);
    }

    #[test]
    fn test_to_gray_weights() {
        // 纯红 / 纯绿 / 纯蓝 / 白
        let data = vec![255, 0, 0, 255, 0, 255, 0, 255, 0, 0, 255, 255, 255, 255, 255, 255];
        let frame = Frame::new(2, 2, data, 0, 0);
        let gray = frame.to_gray().unwrap();
        assert_eq!(gray.as_raw(), &vec![76, 149, 29, 255]);
    }

    #[test]
    fn test_to_gray_rejects_short_buffer() {
        let frame = Frame::new(4, 4, vec![0u8; 10], 0, 7);
        assert!(matches!(frame.to_gray(), Err(StageError::Source(_))));

        let empty = Frame::new(0, 0, vec![], 0, 8);
        assert!(matches!(empty.to_gray(), Err(StageError::Source(_))));
    }

    #[test]
    fn test_frame_info() {
        let frame = Frame::new(8, 6, vec![0u8; 8 * 6 * 4], 66, 2);
        let info = FrameInfo::from_frame(&frame);
        assert_eq!(info.width, 8);
        assert_eq!(info.height, 6);
        assert_eq!(info.timestamp_ms, 66);
        assert_eq!(info.frame_number, 2);
    }
}
