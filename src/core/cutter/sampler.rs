//! 稳定区间抽帧
//!
//! 每个稳定区间在 [start, end] 内等距取 `frame_count` 帧，区间不足时全取；
//! 落盘路径 `<data_home>/<range_id>/<frame_id>_<timestamp_ms>.png`，同一区间同一帧总是同一个文件。
//!
//! 样本按原始分辨率的灰度图保存，不做压缩/缩放；特征配置只在提取特征时应用一次，
//! 所以训练时可以换一个与切分不同的配置。

use super::range::Range;
use crate::core::cancel::CancelToken;
use crate::core::error::{Result, StageError};
use crate::core::video::FrameSource;
use image::GrayImage;
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampledFrame {
    pub range_id: Option<usize>,
    pub frame_id: u64,
    pub timestamp_ms: u64,
    pub feature_vector: Option<Vec<f32>>,
    pub label: Option<String>,
}

/// 等距选帧，首尾必选，四舍五入到整数帧号
pub fn pick_indices(range: &Range, count: usize) -> Vec<u64> {
    let span = range.frame_span();
    if count == 0 {
        return Vec::new();
    }
    if span <= count as u64 {
        return (range.start..=range.end).collect();
    }
    if count == 1 {
        return vec![range.start + range.len() / 2];
    }

    let steps = count as u64 - 1;
    (0..count as u64)
        .map(|i| range.start + (i * range.len() + steps / 2) / steps)
        .collect()
}

pub fn artifact_path(data_home: &Path, range_id: usize, frame_id: u64, timestamp_ms: u64) -> PathBuf {
    data_home
        .join(range_id.to_string())
        .join(format!("{}_{}.png", frame_id, timestamp_ms))
}

#[derive(Debug, Clone, Copy)]
pub struct FrameSampler {
    frame_count: usize,
}

impl FrameSampler {
    pub fn new(frame_count: usize) -> Result<Self> {
        if frame_count == 0 {
            return Err(StageError::config("frame_count", "must be greater than 0"));
        }
        Ok(Self { frame_count })
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// 对每个选中帧的原始灰度图执行 `f`，结果按 (range_id, frame_id) 顺序返回，与并行完成顺序无关
    pub fn visit<T, F>(
        &self,
        stable: &[Range],
        source: &dyn FrameSource,
        cancel: &CancelToken,
        f: F,
    ) -> Result<Vec<(SampledFrame, T)>>
    where
        T: Send,
        F: Fn(&SampledFrame, &GrayImage) -> Result<T> + Sync,
    {
        let picks: Vec<(usize, u64)> = stable
            .iter()
            .enumerate()
            .flat_map(|(range_id, range)| {
                pick_indices(range, self.frame_count)
                    .into_iter()
                    .map(move |frame_id| (range_id, frame_id))
            })
            .collect();
        debug!(
            "🎯 {} frames picked from {} stable ranges",
            picks.len(),
            stable.len()
        );

        picks
            .par_iter()
            .map(|&(range_id, frame_id)| {
                cancel.check()?;
                let frame = source.get_frame(frame_id as usize)?;
                let picture = frame.to_gray()?;
                let sampled = SampledFrame {
                    range_id: Some(range_id),
                    frame_id,
                    timestamp_ms: frame.timestamp_ms(),
                    feature_vector: None,
                    label: None,
                };
                let value = f(&sampled, &picture)?;
                Ok((sampled, value))
            })
            .collect()
    }

    /// 抽帧并写入 data_home，已存在的同名文件会被重新生成
    pub fn sample(
        &self,
        stable: &[Range],
        source: &dyn FrameSource,
        cancel: &CancelToken,
        data_home: &Path,
    ) -> Result<Vec<SampledFrame>> {
        for range_id in 0..stable.len() {
            fs::create_dir_all(data_home.join(range_id.to_string()))?;
        }

        let saved = self.visit(stable, source, cancel, |sampled, picture| {
            let range_id = sampled.range_id.unwrap_or_default();
            let path = artifact_path(data_home, range_id, sampled.frame_id, sampled.timestamp_ms);
            picture.save(&path)?;
            Ok(())
        })?;

        info!("🖼️ {} sampled frames written to {:?}", saved.len(), data_home);
        Ok(saved.into_iter().map(|(sampled, _)| sampled).collect())
    }
}
