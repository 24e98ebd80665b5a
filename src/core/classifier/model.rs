//! 训练好的模型
//!
//! 训练或加载后不再修改，可以在多个线程间共享只读预测。

use super::dataset::Dataset;
use super::svm::{decision, train_binary, LinearModel, SvmParams};
use crate::core::config::PreprocessConfig;
use crate::core::error::{Result, StageError};
use log::{error, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

const MODEL_FORMAT: &str = "stagecut-model";
const MODEL_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    /// 最高分与次高分之差
    pub margin: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    feature_config: PreprocessConfig,
    feature_len: usize,
    labels: Vec<String>,
    weights: Vec<Vec<f64>>,
    biases: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
struct ModelBlob {
    format: String,
    version: u32,
    model: TrainedModel,
}

impl TrainedModel {
    /// 一对多训练，每个标签一个二分类器，标签按字典序排列
    pub fn train(dataset: &Dataset, config: PreprocessConfig, params: &SvmParams) -> Result<Self> {
        let feature_len = dataset.validate()?;
        let labels = dataset.label_set();

        let mut xs: Vec<&[f32]> = Vec::with_capacity(dataset.sample_count());
        let mut owners: Vec<usize> = Vec::with_capacity(dataset.sample_count());
        for (index, samples) in dataset.labels.values().enumerate() {
            for sample in samples {
                if let Some(features) = &sample.feature_vector {
                    xs.push(features.as_slice());
                    owners.push(index);
                }
            }
        }
        info!(
            "🧠 training {} one-vs-rest classifiers on {} samples ({} features)",
            labels.len(),
            xs.len(),
            feature_len
        );

        let models: Vec<LinearModel> = (0..labels.len())
            .into_par_iter()
            .map(|k| {
                let ys: Vec<f64> = owners
                    .iter()
                    .map(|&owner| if owner == k { 1.0 } else { -1.0 })
                    .collect();
                train_binary(&xs, &ys, params)
            })
            .collect();

        let (weights, biases) = models.into_iter().map(|m| (m.weights, m.bias)).unzip();
        Ok(Self {
            feature_config: config,
            feature_len,
            labels,
            weights,
            biases,
        })
    }

    pub fn feature_config(&self) -> &PreprocessConfig {
        &self.feature_config
    }

    pub fn feature_len(&self) -> usize {
        self.feature_len
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// 推理前检查特征配置是否与训练时一致
    pub fn check_config(&self, config: &PreprocessConfig) -> Result<()> {
        if *config != self.feature_config {
            return Err(StageError::ConfigMismatch {
                expected: self.feature_config.to_string(),
                actual: config.to_string(),
            });
        }
        Ok(())
    }

    /// 每个标签的决策值，顺序同 [`labels`](Self::labels)
    pub fn decision_values(&self, features: &[f32]) -> Result<Vec<f64>> {
        if features.len() != self.feature_len {
            return Err(StageError::ConfigMismatch {
                expected: format!("{} ({} features)", self.feature_config, self.feature_len),
                actual: format!("{} features", features.len()),
            });
        }
        Ok(self
            .weights
            .iter()
            .zip(&self.biases)
            .map(|(w, &b)| decision(w, b, features))
            .collect())
    }

    pub fn predict(&self, features: &[f32]) -> Result<Prediction> {
        let scores = self.decision_values(features)?;
        self.pick(&scores)
    }

    /// 取最高分；同分时字典序靠前的标签胜出
    pub fn pick(&self, scores: &[f64]) -> Result<Prediction> {
        if scores.len() != self.labels.len() || scores.len() < 2 {
            return Err(StageError::Format(format!(
                "{} scores for {} labels",
                scores.len(),
                self.labels.len()
            )));
        }

        let mut best = 0;
        for (i, &score) in scores.iter().enumerate().skip(1) {
            if score > scores[best] {
                best = i;
            }
        }
        let runner_up = scores
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != best)
            .map(|(_, &s)| s)
            .fold(f64::NEG_INFINITY, f64::max);

        Ok(Prediction {
            label: self.labels[best].clone(),
            margin: scores[best] - runner_up,
        })
    }

    /// 写入模型文件，目标已存在时拒绝覆盖
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let blob = ModelBlob {
            format: MODEL_FORMAT.to_string(),
            version: MODEL_VERSION,
            model: self.clone(),
        };
        let bytes = serde_json::to_vec(&blob)?;

        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StageError::ResourceExists(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        if let Err(e) = file.write_all(&bytes).and_then(|_| file.sync_all()) {
            error!("❌ failed to write model {:?}: {}", path, e);
            drop(file);
            let _ = fs::remove_file(path);
            return Err(e.into());
        }

        info!("💾 model saved to {:?} ({} bytes)", path, bytes.len());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(StageError::ResourceMissing(path.to_path_buf()));
        }

        let blob: ModelBlob = serde_json::from_slice(&fs::read(path)?)
            .map_err(|e| StageError::Format(format!("{:?}: {}", path, e)))?;
        if blob.format != MODEL_FORMAT || blob.version != MODEL_VERSION {
            return Err(StageError::Format(format!(
                "{:?}: unsupported model {} v{}",
                path, blob.format, blob.version
            )));
        }

        let model = blob.model;
        let consistent = model.labels.len() >= 2
            && model.weights.len() == model.labels.len()
            && model.biases.len() == model.labels.len()
            && model.weights.iter().all(|w| w.len() == model.feature_len);
        if !consistent {
            return Err(StageError::Format(format!(
                "{:?}: weights do not match the label set",
                path
            )));
        }

        info!(
            "📦 model loaded from {:?}: labels {:?}, {}",
            path, model.labels, model.feature_config
        );
        Ok(model)
    }
}
