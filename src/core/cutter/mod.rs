//! 视频切分：相似度打分 → 区间检测 → 合并过滤 → 抽帧
//!
//! 核心策略：
//! 1. 相邻帧预处理后计算 SSIM，分数按帧号对缓存
//! 2. 状态机把逐对分类合并为连续的稳定 / 不稳定区间
//! 3. offset 桥接短暂抖动，limit 过滤过短的稳定区间
//! 4. 稳定区间等距抽帧落盘，作为分类数据集

pub mod detector;
pub mod merge;
pub mod range;
pub mod result;
pub mod sampler;
pub mod similarity;

pub use detector::RangeDetector;
pub use merge::{merge, MergedRanges};
pub use range::{coalesce, DetectState, GapScore, Range};
pub use result::{CutRecord, CutResult, ScoreCache};
pub use sampler::{artifact_path, pick_indices, FrameSampler, SampledFrame};
pub use similarity::SimilarityScorer;
