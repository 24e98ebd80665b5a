use super::range::{GapScore, Range};
use super::result::{CutResult, ScoreCache};
use super::similarity::SimilarityScorer;
use crate::core::cancel::CancelToken;
use crate::core::config::PreprocessConfig;
use crate::core::error::Result;
use crate::core::video::{preprocess, FrameInfo, FrameSource};
use image::GrayImage;
use log::{debug, info};
use rayon::prelude::*;

const DEFAULT_CHUNK_SIZE: usize = 64;

/// 逐对打分并按阈值划分区间
///
/// 帧按块读取并行预处理，块内相邻帧并行打分；块边界的最后一帧留给下一块，
/// 每帧只读取一次，内存里最多保留一个块的缩略灰度图。
#[derive(Debug, Clone)]
pub struct RangeDetector {
    scorer: SimilarityScorer,
    chunk_size: usize,
}

impl Default for RangeDetector {
    fn default() -> Self {
        Self {
            scorer: SimilarityScorer::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl RangeDetector {
    pub fn new(scorer: SimilarityScorer, chunk_size: usize) -> Self {
        Self {
            scorer,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn detect(
        &self,
        source: &dyn FrameSource,
        config: &PreprocessConfig,
        threshold: f64,
        cancel: &CancelToken,
    ) -> Result<Vec<Range>> {
        self.score_source(source, config, cancel)?
            .raw_ranges(threshold)
    }

    pub fn score_source(
        &self,
        source: &dyn FrameSource,
        config: &PreprocessConfig,
        cancel: &CancelToken,
    ) -> Result<CutResult> {
        config.validate()?;
        let total = source.frame_count();
        info!("🎬 scoring {} frames with {}", total, config);

        let mut scores = ScoreCache::default();
        let mut timestamps_ms = Vec::with_capacity(total);
        let mut carry: Option<(FrameInfo, GrayImage)> = None;

        let mut start = 0;
        while start < total {
            cancel.check()?;
            let end = (start + self.chunk_size).min(total);

            let prepared = (start..end)
                .into_par_iter()
                .map(|index| {
                    cancel.check()?;
                    let frame = source.get_frame(index)?;
                    let gray = preprocess(&frame, config)?;
                    let mut info = FrameInfo::from_frame(&frame);
                    info.frame_number = index as u64;
                    Ok((info, gray))
                })
                .collect::<Result<Vec<_>>>()?;
            timestamps_ms.extend(prepared.iter().map(|(info, _)| info.timestamp_ms));

            let mut window: Vec<(FrameInfo, GrayImage)> =
                carry.take().into_iter().chain(prepared).collect();
            let chunk_scores = window
                .par_windows(2)
                .map(|pair| {
                    let (a, a_gray) = &pair[0];
                    let (b, b_gray) = &pair[1];
                    Ok(GapScore {
                        from: a.frame_number,
                        to: b.frame_number,
                        score: self.scorer.score(a_gray, b_gray)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            for gap in chunk_scores {
                scores.insert(gap.from, gap.to, gap.score);
            }
            debug!("📊 scored frames {}..{}", start, end);

            carry = window.pop();
            start = end;
        }

        info!("✅ {} frame pairs scored", scores.len());
        Ok(CutResult {
            preprocess: *config,
            frame_count: total as u64,
            timestamps_ms,
            scores,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::StageError;
    use crate::core::video::{Frame, MemoryFrameSource};

    fn solid(fill: u8, index: u64) -> Frame {
        Frame::new(32, 32, vec![fill; 32 * 32 * 4], index * 40, index)
    }

    /// 0-4 黑，5-9 白，10-14 黑
    fn three_scenes() -> MemoryFrameSource {
        let frames = (0..15u64)
            .map(|i| solid(if (5..10).contains(&i) { 250 } else { 5 }, i))
            .collect();
        MemoryFrameSource::new(frames)
    }

    #[test]
    fn test_detect_scene_changes() {
        let detector = RangeDetector::new(SimilarityScorer::default(), 4);
        let config = PreprocessConfig::Resize {
            width: 8,
            height: 8,
        };
        let ranges = detector
            .detect(&three_scenes(), &config, 0.95, &CancelToken::new())
            .unwrap();
        assert_eq!(
            ranges,
            vec![
                Range::stable(0, 4),
                Range::unstable(4, 5),
                Range::stable(5, 9),
                Range::unstable(9, 10),
                Range::stable(10, 14),
            ]
        );
    }

    #[test]
    fn test_chunking_does_not_change_scores() {
        let config = PreprocessConfig::Compress { rate: 0.5 };
        let source = three_scenes();
        let token = CancelToken::new();
        let small = RangeDetector::new(SimilarityScorer::default(), 1)
            .score_source(&source, &config, &token)
            .unwrap();
        let large = RangeDetector::new(SimilarityScorer::default(), 100)
            .score_source(&source, &config, &token)
            .unwrap();
        assert_eq!(small, large);
        assert_eq!(small.scores.len(), 14);
        assert_eq!(small.timestamps_ms[3], 120);
    }

    #[test]
    fn test_coverage_holds_for_any_threshold() {
        let source = three_scenes();
        let result = RangeDetector::default()
            .score_source(&source, &PreprocessConfig::default(), &CancelToken::new())
            .unwrap();
        for threshold in [0.0, 0.3, 0.95, 1.0] {
            let ranges = result.raw_ranges(threshold).unwrap();
            assert_eq!(ranges[0].start, 0);
            assert_eq!(ranges.last().unwrap().end, 14);
            for pair in ranges.windows(2) {
                assert_eq!(pair[0].end, pair[1].start);
            }
        }
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancelToken::new();
        token.cancel();
        let err = RangeDetector::default()
            .score_source(&three_scenes(), &PreprocessConfig::default(), &token)
            .unwrap_err();
        assert!(matches!(err, StageError::Cancelled));
    }
}
