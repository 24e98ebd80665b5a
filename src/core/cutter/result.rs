//! 切分结果
//!
//! 只保存逐对相似度，不保存像素；换 threshold / offset / limit 重新划分时无需重新打分。

use super::merge::{merge, MergedRanges};
use super::range::{coalesce, GapScore, Range};
use crate::core::config::{PreprocessConfig, RangeParams};
use crate::core::error::{Result, StageError};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const CUT_FORMAT: &str = "stagecut-cut";
const CUT_VERSION: u32 = 1;

/// 以 (frame_a, frame_b) 为键的相似度缓存，键内部按升序存放
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<GapScore>", into = "Vec<GapScore>")]
pub struct ScoreCache {
    scores: BTreeMap<(u64, u64), f64>,
}

impl ScoreCache {
    fn key(a: u64, b: u64) -> (u64, u64) {
        (a.min(b), a.max(b))
    }

    pub fn insert(&mut self, a: u64, b: u64, score: f64) {
        self.scores.insert(Self::key(a, b), score);
    }

    pub fn get(&self, a: u64, b: u64) -> Option<f64> {
        self.scores.get(&Self::key(a, b)).copied()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// 按帧号升序
    pub fn gaps(&self) -> Vec<GapScore> {
        self.scores
            .iter()
            .map(|(&(from, to), &score)| GapScore { from, to, score })
            .collect()
    }
}

impl From<Vec<GapScore>> for ScoreCache {
    fn from(gaps: Vec<GapScore>) -> Self {
        let mut cache = ScoreCache::default();
        for gap in gaps {
            cache.insert(gap.from, gap.to, gap.score);
        }
        cache
    }
}

impl From<ScoreCache> for Vec<GapScore> {
    fn from(cache: ScoreCache) -> Self {
        cache.gaps()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutResult {
    pub preprocess: PreprocessConfig,
    pub frame_count: u64,
    pub timestamps_ms: Vec<u64>,
    pub scores: ScoreCache,
}

impl CutResult {
    /// 未经合并的原始区间，覆盖 [0, frame_count - 1]
    pub fn raw_ranges(&self, threshold: f64) -> Result<Vec<Range>> {
        match self.frame_count {
            0 => return Ok(Vec::new()),
            1 => return Ok(vec![Range::stable(0, 0)]),
            _ => {}
        }

        let ranges = coalesce(&self.scores.gaps(), threshold)?;
        let last = self.frame_count - 1;
        match (ranges.first(), ranges.last()) {
            (Some(first), Some(tail)) if first.start == 0 && tail.end == last => Ok(ranges),
            _ => Err(StageError::Format(format!(
                "scores do not cover frames 0..={}",
                last
            ))),
        }
    }

    pub fn get_range(&self, params: &RangeParams) -> Result<MergedRanges> {
        params.validate()?;
        let ranges = self.raw_ranges(params.threshold)?;
        Ok(merge(&ranges, params.offset, params.limit))
    }

    /// 低于阈值的逐对间隔数量
    pub fn unstable_gap_count(&self, threshold: f64) -> usize {
        self.scores
            .gaps()
            .iter()
            .filter(|gap| !gap.is_stable(threshold))
            .count()
    }

    pub fn timestamp_ms(&self, frame: u64) -> Option<u64> {
        self.timestamps_ms.get(frame as usize).copied()
    }

    pub fn dump(&self, path: impl AsRef<Path>, params: &RangeParams) -> Result<()> {
        let path = path.as_ref();
        let merged = self.get_range(params)?;
        let record = CutRecord {
            format: CUT_FORMAT.to_string(),
            version: CUT_VERSION,
            params: *params,
            ranges: self.raw_ranges(params.threshold)?,
            stable: merged.stable,
            unstable: merged.unstable,
            result: self.clone(),
        };
        fs::write(path, serde_json::to_vec_pretty(&record)?)?;
        info!("💾 cut result saved to {:?}", path);
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(CutRecord::load(path)?.result)
    }
}

/// 落盘的切分记录，报告生成器可以独立读取
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CutRecord {
    pub format: String,
    pub version: u32,
    pub params: RangeParams,
    pub ranges: Vec<Range>,
    pub stable: Vec<Range>,
    pub unstable: Vec<Range>,
    pub result: CutResult,
}

impl CutRecord {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(StageError::ResourceMissing(path.to_path_buf()));
        }
        let record: CutRecord = serde_json::from_slice(&fs::read(path)?)
            .map_err(|e| StageError::Format(format!("{:?}: {}", path, e)))?;
        if record.format != CUT_FORMAT || record.version != CUT_VERSION {
            return Err(StageError::Format(format!(
                "{:?}: unsupported cut record {} v{}",
                path, record.format, record.version
            )));
        }

        let inverted = record
            .ranges
            .iter()
            .chain(&record.stable)
            .chain(&record.unstable)
            .find(|r| r.start > r.end);
        if let Some(range) = inverted {
            return Err(StageError::Format(format!(
                "{:?}: range [{}, {}] starts after it ends",
                path, range.start, range.end
            )));
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cut(scores: &[f64]) -> CutResult {
        let gaps: Vec<GapScore> = scores
            .iter()
            .enumerate()
            .map(|(i, &score)| GapScore {
                from: i as u64,
                to: i as u64 + 1,
                score,
            })
            .collect();
        CutResult {
            preprocess: PreprocessConfig::default(),
            frame_count: scores.len() as u64 + 1,
            timestamps_ms: (0..=scores.len() as u64).map(|i| i * 40).collect(),
            scores: ScoreCache::from(gaps),
        }
    }

    #[test]
    fn test_cache_is_symmetric() {
        let mut cache = ScoreCache::default();
        cache.insert(5, 4, 0.7);
        assert_eq!(cache.get(4, 5), Some(0.7));
        assert_eq!(cache.get(5, 4), Some(0.7));
        assert_eq!(cache.gaps()[0].from, 4);
    }

    #[test]
    fn test_degenerate_sources() {
        let mut result = cut(&[]);
        assert_eq!(result.raw_ranges(0.9).unwrap(), vec![Range::stable(0, 0)]);
        result.frame_count = 0;
        assert!(result.raw_ranges(0.9).unwrap().is_empty());
    }

    #[test]
    fn test_rederive_with_other_params() {
        let result = cut(&[1.0, 1.0, 0.93, 0.5, 0.99, 1.0, 0.97, 1.0]);
        let loose = result
            .get_range(&RangeParams {
                threshold: 0.9,
                offset: 0,
                limit: 0,
            })
            .unwrap();
        assert_eq!(loose.stable.len(), 2);

        let strict = result
            .get_range(&RangeParams {
                threshold: 0.98,
                offset: 0,
                limit: 0,
            })
            .unwrap();
        assert_eq!(strict.stable.len(), 3);

        // 同样参数重复划分结果不变
        let again = result
            .get_range(&RangeParams {
                threshold: 0.98,
                offset: 0,
                limit: 0,
            })
            .unwrap();
        assert_eq!(strict, again);
    }

    #[test]
    fn test_monotonic_unstable_gaps() {
        let result = cut(&[0.99, 0.8, 0.95, 0.97, 0.3, 1.0, 0.96]);
        let mut last = 0;
        for step in 0..=100 {
            let count = result.unstable_gap_count(step as f64 / 100.0);
            assert!(count >= last);
            last = count;
        }
    }

    #[test]
    fn test_dump_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut_result.json");
        let result = cut(&[1.0, 0.2, 1.0]);
        let params = RangeParams::default();
        result.dump(&path, &params).unwrap();

        let record = CutRecord::load(&path).unwrap();
        assert_eq!(record.params, params);
        assert_eq!(record.ranges.len(), 3);
        assert_eq!(record.result, result);
        assert_eq!(CutResult::load(&path).unwrap(), result);
    }

    #[test]
    fn test_load_rejects_inverted_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut_result.json");
        cut(&[1.0, 0.2, 1.0])
            .dump(&path, &RangeParams::default())
            .unwrap();

        let mut record: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        record["stable"][0]["start"] = serde_json::json!(7);
        std::fs::write(&path, serde_json::to_vec(&record).unwrap()).unwrap();

        assert!(matches!(
            CutRecord::load(&path),
            Err(StageError::Format(msg)) if msg.contains("[7, 3]")
        ));
    }

    #[test]
    fn test_load_rejects_foreign_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.json");
        std::fs::write(&path, br#"{"hello": 1}"#).unwrap();
        assert!(matches!(CutRecord::load(&path), Err(StageError::Format(_))));
    }
}
