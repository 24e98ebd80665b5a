//! 帧来源抽象。视频解码不在本库内，调用方实现 [`FrameSource`] 即可接入。

use super::frame::Frame;
use super::is_picture;
use crate::core::error::{Result, StageError};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

/// 按下标取帧。实现需要可以被多个线程同时读取。
pub trait FrameSource: Send + Sync {
    fn frame_count(&self) -> usize;

    fn get_frame(&self, index: usize) -> Result<Frame>;

    /// 可选的预加载，默认什么都不做
    fn load_frames(&mut self) -> Result<()> {
        Ok(())
    }
}

/// 内存中的帧序列
#[derive(Debug, Clone, Default)]
pub struct MemoryFrameSource {
    frames: Vec<Frame>,
}

impl MemoryFrameSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }
}

impl FrameSource for MemoryFrameSource {
    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn get_frame(&self, index: usize) -> Result<Frame> {
        self.frames.get(index).cloned().ok_or_else(|| {
            StageError::Source(format!(
                "frame {} out of range (0..{})",
                index,
                self.frames.len()
            ))
        })
    }
}

/// 目录中按文件名排序的图片序列（例如 ffmpeg 导出的 frame_0001.png ...）
#[derive(Debug)]
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    fps: f64,
    cache: Option<Vec<Frame>>,
}

impl ImageSequenceSource {
    pub fn open(dir: impl AsRef<Path>, fps: f64) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(StageError::ResourceMissing(dir.to_path_buf()));
        }
        if !(fps > 0.0) {
            return Err(StageError::config("fps", format!("{} must be positive", fps)));
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| is_picture(p))
            .collect();
        paths.sort_by_cached_key(|p| sequence_key(p));

        info!("🎞️ ImageSequenceSource: {} pictures in {:?}", paths.len(), dir);
        Ok(Self {
            paths,
            fps,
            cache: None,
        })
    }

    fn timestamp_ms(&self, index: usize) -> u64 {
        (index as f64 * 1000.0 / self.fps).round() as u64
    }

    fn read_frame(&self, index: usize) -> Result<Frame> {
        let path = self.paths.get(index).ok_or_else(|| {
            StageError::Source(format!(
                "frame {} out of range (0..{})",
                index,
                self.paths.len()
            ))
        })?;
        let img = image::open(path)?.to_rgba8();
        Ok(Frame::from_rgba_image(
            img,
            self.timestamp_ms(index),
            index as u64,
        ))
    }
}

/// 排序键：(前缀, 末尾数字, 文件名)，frame_2.png 排在 frame_10.png 之前
fn sequence_key(path: &Path) -> (String, Option<u64>, String) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let prefix = stem.trim_end_matches(|c: char| c.is_ascii_digit());
    let number = stem[prefix.len()..].parse().ok();
    (prefix.to_string(), number, name)
}

impl FrameSource for ImageSequenceSource {
    fn frame_count(&self) -> usize {
        self.paths.len()
    }

    fn get_frame(&self, index: usize) -> Result<Frame> {
        match &self.cache {
            Some(frames) => frames.get(index).cloned().ok_or_else(|| {
                StageError::Source(format!("frame {} out of range (0..{})", index, frames.len()))
            }),
            None => self.read_frame(index),
        }
    }

    fn load_frames(&mut self) -> Result<()> {
        if self.cache.is_some() {
            return Ok(());
        }
        let frames = (0..self.paths.len())
            .map(|i| self.read_frame(i))
            .collect::<Result<Vec<_>>>()?;
        debug!("📥 preloaded {} frames", frames.len());
        self.cache = Some(frames);
        Ok(())
    }
}
