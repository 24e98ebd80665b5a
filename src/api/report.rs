//! 报告输出。HTML 报告由外部生成，这里只提供接口和 JSON 实现。

use super::pipeline::ClassificationResult;
use crate::core::config::RangeParams;
use crate::core::cutter::{CutResult, Range};
use crate::core::error::Result;
use log::info;
use serde::Serialize;
use std::fs;
use std::path::Path;

pub trait Reporter {
    /// `params` 与切分时保持一致，保证缩略图和分类使用同一批区间
    fn report(
        &self,
        results: &[ClassificationResult],
        cut: &CutResult,
        params: &RangeParams,
        path: &Path,
    ) -> Result<()>;
}

#[derive(Serialize)]
struct JsonReport<'a> {
    params: &'a RangeParams,
    frame_count: u64,
    stable: Vec<Range>,
    unstable: Vec<Range>,
    stages: &'a [ClassificationResult],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonReporter;

impl Reporter for JsonReporter {
    fn report(
        &self,
        results: &[ClassificationResult],
        cut: &CutResult,
        params: &RangeParams,
        path: &Path,
    ) -> Result<()> {
        let ranges = cut.get_range(params)?;
        let report = JsonReport {
            params,
            frame_count: cut.frame_count,
            stable: ranges.stable,
            unstable: ranges.unstable,
            stages: results,
        };
        fs::write(path, serde_json::to_vec_pretty(&report)?)?;
        info!("📝 report written to {:?}", path);
        Ok(())
    }
}
