//! 阶段识别流水线
//!
//! ```no_run
//! use stagecut::api::{ClassifyBasis, StagePipeline};
//! use stagecut::core::video::ImageSequenceSource;
//! use stagecut::PipelineConfig;
//! use std::path::Path;
//!
//! let pipeline = StagePipeline::new(PipelineConfig::default())?;
//! let video = ImageSequenceSource::open("frames/", 30.0)?;
//! let cut = pipeline.cut(&video, Some(Path::new("dataset/")))?;
//! // 人工把 dataset/ 下的区间目录重命名为阶段名后
//! pipeline.train(Path::new("dataset/"), Path::new("model.json"))?;
//! let stages = pipeline.classify(&video, ClassifyBasis::Model(Path::new("model.json")))?;
//! # Ok::<(), stagecut::StageError>(())
//! ```

use super::report::Reporter;
use crate::core::cancel::CancelToken;
use crate::core::classifier::{Dataset, DatasetLayout, FeatureExtractor, SvmParams, TrainedModel};
use crate::core::config::PipelineConfig;
use crate::core::cutter::{
    CutResult, FrameSampler, MergedRanges, Range, RangeDetector, SampledFrame,
};
use crate::core::error::{Result, StageError};
use crate::core::video::FrameSource;
use log::{debug, error, info};
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const CUT_RESULT_FILE_NAME: &str = "cut_result.json";
pub const REPORT_FILE_NAME: &str = "report.json";

/// 每个稳定区间一条，顺序同稳定区间
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub range: Range,
    pub start_time_ms: u64,
    pub end_time_ms: u64,
    /// 参与投票的帧
    pub frames: Vec<u64>,
    pub label: String,
    pub margin: f64,
}

#[derive(Debug, Clone)]
pub struct CutOutcome {
    pub result: CutResult,
    pub ranges: MergedRanges,
    pub data_home: PathBuf,
    pub samples: Vec<SampledFrame>,
}

#[derive(Debug, Clone)]
pub struct OneStepOutcome {
    pub cut: CutOutcome,
    pub results: Vec<ClassificationResult>,
    pub report_path: PathBuf,
}

/// 分类依据：带标签的数据集目录，或训练好的模型文件
#[derive(Debug, Clone, Copy)]
pub enum ClassifyBasis<'a> {
    Dataset(&'a Path),
    Model(&'a Path),
}

pub struct StagePipeline {
    config: PipelineConfig,
    detector: RangeDetector,
    svm: SvmParams,
    cancel: CancelToken,
    pool: ThreadPool,
}

impl StagePipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let workers = config.worker_count();
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| StageError::config("workers", e.to_string()))?;

        info!("🚀 StagePipeline: created with {} workers, {:?}", workers, config);
        Ok(Self {
            config,
            detector: RangeDetector::default(),
            svm: SvmParams::default(),
            cancel: CancelToken::new(),
            pool,
        })
    }

    pub fn with_svm_params(mut self, svm: SvmParams) -> Self {
        self.svm = svm;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 取消后正在执行的阶段会在下一帧返回 [`StageError::Cancelled`]，已写出的文件保留。
    /// 标记不会自动清除，重新执行前调用 [`CancelToken::reset`]。
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn sampler(&self) -> Result<FrameSampler> {
        FrameSampler::new(self.config.frame_count)
    }

    fn scan(&self, source: &dyn FrameSource) -> Result<(CutResult, MergedRanges)> {
        let result = self.pool.install(|| {
            self.detector
                .score_source(source, &self.config.preprocess, &self.cancel)
        })?;
        let ranges = result.get_range(&self.config.range_params())?;
        info!(
            "✂️ {} stable / {} unstable ranges (threshold={}, offset={}, limit={})",
            ranges.stable.len(),
            ranges.unstable.len(),
            self.config.threshold,
            self.config.offset,
            self.config.limit
        );
        Ok((result, ranges))
    }

    /// 切分视频，抽帧写入 data_home，并保存 cut_result.json
    pub fn cut(&self, source: &dyn FrameSource, output: Option<&Path>) -> Result<CutOutcome> {
        let data_home = match output {
            Some(dir) => dir.to_path_buf(),
            None => default_data_home(),
        };
        fs::create_dir_all(&data_home)?;

        let (result, ranges) = self.scan(source)?;
        let sampler = self.sampler()?;
        let samples = self
            .pool
            .install(|| sampler.sample(&ranges.stable, source, &self.cancel, &data_home))?;

        result.dump(data_home.join(CUT_RESULT_FILE_NAME), &self.config.range_params())?;
        info!("✅ cut finished, data home {:?}", data_home);
        Ok(CutOutcome {
            result,
            ranges,
            data_home,
            samples,
        })
    }

    fn fit(&self, data_home: &Path) -> Result<TrainedModel> {
        let layout = DatasetLayout::scan(data_home)?;
        let extractor = FeatureExtractor::new(self.config.preprocess)?;
        let dataset: Dataset = self
            .pool
            .install(|| layout.extract(&extractor, &self.cancel))?;
        self.pool
            .install(|| TrainedModel::train(&dataset, self.config.preprocess, &self.svm))
    }

    /// 用数据集训练并保存模型；save_to 已存在时在训练前就失败
    pub fn train(&self, data_home: &Path, save_to: &Path) -> Result<TrainedModel> {
        if !data_home.is_dir() {
            return Err(StageError::ResourceMissing(data_home.to_path_buf()));
        }
        if save_to.exists() {
            return Err(StageError::ResourceExists(save_to.to_path_buf()));
        }

        let model = self.fit(data_home).map_err(|e| {
            error!("❌ training on {:?} failed: {}", data_home, e);
            e
        })?;
        model.save(save_to)?;
        Ok(model)
    }

    /// 对视频重新切分，并给每个稳定区间打上阶段标签
    pub fn classify(
        &self,
        source: &dyn FrameSource,
        basis: ClassifyBasis<'_>,
    ) -> Result<Vec<ClassificationResult>> {
        let model = match basis {
            ClassifyBasis::Model(path) => {
                let model = TrainedModel::load(path)?;
                model.check_config(&self.config.preprocess)?;
                model
            }
            ClassifyBasis::Dataset(dir) => {
                if !dir.is_dir() {
                    return Err(StageError::ResourceMissing(dir.to_path_buf()));
                }
                self.fit(dir)?
            }
        };

        let (result, ranges) = self.scan(source)?;
        self.label_ranges(&model, &result, &ranges.stable, source)
    }

    fn label_ranges(
        &self,
        model: &TrainedModel,
        result: &CutResult,
        stable: &[Range],
        source: &dyn FrameSource,
    ) -> Result<Vec<ClassificationResult>> {
        let extractor = FeatureExtractor::new(*model.feature_config())?;
        let sampler = self.sampler()?;
        // picture 为原始分辨率灰度图，特征配置只在这里应用一次
        let scored = self.pool.install(|| {
            sampler.visit(stable, source, &self.cancel, |_, picture| {
                model.decision_values(&extractor.extract(picture))
            })
        })?;

        let mut results = Vec::with_capacity(stable.len());
        for (range_id, range) in stable.iter().enumerate() {
            let votes: Vec<&(SampledFrame, Vec<f64>)> = scored
                .iter()
                .filter(|(sampled, _)| sampled.range_id == Some(range_id))
                .collect();
            if votes.is_empty() {
                return Err(StageError::Source(format!(
                    "no frames sampled for range [{}, {}]",
                    range.start, range.end
                )));
            }

            let mut mean = vec![0.0f64; model.labels().len()];
            for (_, scores) in &votes {
                for (acc, s) in mean.iter_mut().zip(scores) {
                    *acc += s;
                }
            }
            for acc in mean.iter_mut() {
                *acc /= votes.len() as f64;
            }

            let prediction = model.pick(&mean)?;
            debug!(
                "🏷️ range [{}, {}] -> {} (margin {:.3})",
                range.start, range.end, prediction.label, prediction.margin
            );
            results.push(ClassificationResult {
                range: *range,
                start_time_ms: result.timestamp_ms(range.start).unwrap_or_default(),
                end_time_ms: result.timestamp_ms(range.end).unwrap_or_default(),
                frames: votes.iter().map(|(sampled, _)| sampled.frame_id).collect(),
                label: prediction.label,
                margin: prediction.margin,
            });
        }

        info!("🎯 {} stable ranges classified", results.len());
        Ok(results)
    }

    /// cut → classify → report，三步使用同一组 threshold / offset / limit
    pub fn one_step(
        &self,
        source: &dyn FrameSource,
        output: Option<&Path>,
        reporter: &dyn Reporter,
    ) -> Result<OneStepOutcome> {
        let cut = self.cut(source, output)?;
        let results = self.classify(source, ClassifyBasis::Dataset(&cut.data_home))?;

        let report_path = cut.data_home.join(REPORT_FILE_NAME);
        reporter.report(
            &results,
            &cut.result,
            &self.config.range_params(),
            &report_path,
        )?;
        Ok(OneStepOutcome {
            cut,
            results,
            report_path,
        })
    }
}

impl Drop for StagePipeline {
    fn drop(&mut self) {
        info!("🗑️ StagePipeline: released");
    }
}

fn default_data_home() -> PathBuf {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    PathBuf::from(format!("stagecut_{}", secs))
}
