//! 数据集：一个标签一个子目录
//!
//! 先扫描目录结构并校验（至少两个标签、每个标签至少一张图），
//! 校验通过后才读取图片、提取特征，图片像素在提取后即释放。

use super::features::FeatureExtractor;
use crate::core::cancel::CancelToken;
use crate::core::cutter::SampledFrame;
use crate::core::error::{Result, StageError};
use crate::core::video::is_picture;
use log::{info, warn};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
struct PictureEntry {
    path: PathBuf,
    frame_id: u64,
    timestamp_ms: u64,
}

/// 解析 `<frame_id>_<timestamp_ms>.png`
fn parse_picture_name(path: &Path) -> Option<(u64, u64)> {
    let stem = path.file_stem()?.to_str()?;
    let (frame, timestamp) = stem.split_once('_')?;
    Some((frame.parse().ok()?, timestamp.parse().ok()?))
}

#[derive(Debug, Clone)]
pub struct DatasetLayout {
    root: PathBuf,
    labels: BTreeMap<String, Vec<PictureEntry>>,
}

impl DatasetLayout {
    pub fn scan(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(StageError::ResourceMissing(root.to_path_buf()));
        }

        let mut labels = BTreeMap::new();
        for entry in fs::read_dir(root)? {
            let dir = entry?.path();
            if !dir.is_dir() {
                continue;
            }
            let label = match dir.file_name().and_then(|n| n.to_str()) {
                Some(name) if !name.starts_with('.') => name.to_string(),
                _ => continue,
            };

            let mut pictures: Vec<PathBuf> = fs::read_dir(&dir)?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| is_picture(p))
                .collect();
            pictures.sort();

            let mut entries: Vec<PictureEntry> = pictures
                .into_iter()
                .enumerate()
                .map(|(ordinal, path)| {
                    let (frame_id, timestamp_ms) = parse_picture_name(&path).unwrap_or_else(|| {
                        warn!("⚠️ unexpected picture name {:?}, using ordinal {}", path, ordinal);
                        (ordinal as u64, 0)
                    });
                    PictureEntry {
                        path,
                        frame_id,
                        timestamp_ms,
                    }
                })
                .collect();
            entries.sort_by(|a, b| (a.frame_id, &a.path).cmp(&(b.frame_id, &b.path)));
            labels.insert(label, entries);
        }

        let layout = Self {
            root: root.to_path_buf(),
            labels,
        };
        layout.validate()?;
        Ok(layout)
    }

    fn validate(&self) -> Result<()> {
        if self.labels.len() < 2 {
            return Err(StageError::DataInsufficient(format!(
                "{:?} holds {} label(s), at least 2 are required",
                self.root,
                self.labels.len()
            )));
        }
        if let Some((label, _)) = self.labels.iter().find(|(_, pictures)| pictures.is_empty()) {
            return Err(StageError::DataInsufficient(format!(
                "label `{}` in {:?} has no pictures",
                label, self.root
            )));
        }
        Ok(())
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labels.keys().map(|k| k.as_str())
    }

    pub fn sample_count(&self) -> usize {
        self.labels.values().map(|v| v.len()).sum()
    }

    /// 读取图片并提取特征，结果顺序与目录顺序一致
    pub fn extract(&self, extractor: &FeatureExtractor, cancel: &CancelToken) -> Result<Dataset> {
        let jobs: Vec<(&String, &PictureEntry)> = self
            .labels
            .iter()
            .flat_map(|(label, entries)| entries.iter().map(move |e| (label, e)))
            .collect();

        let samples = jobs
            .par_iter()
            .map(|(label, entry)| {
                cancel.check()?;
                let picture = image::open(&entry.path)?.to_luma8();
                Ok(SampledFrame {
                    range_id: None,
                    frame_id: entry.frame_id,
                    timestamp_ms: entry.timestamp_ms,
                    feature_vector: Some(extractor.extract(&picture)),
                    label: Some((*label).clone()),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut labels: BTreeMap<String, Vec<SampledFrame>> = BTreeMap::new();
        for sample in samples {
            let label = sample.label.clone().unwrap_or_default();
            labels.entry(label).or_default().push(sample);
        }
        Ok(Dataset { labels })
    }
}

/// 标签 → 有序样本
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub labels: BTreeMap<String, Vec<SampledFrame>>,
}

impl Dataset {
    pub fn load(
        root: impl AsRef<Path>,
        extractor: &FeatureExtractor,
        cancel: &CancelToken,
    ) -> Result<Self> {
        let layout = DatasetLayout::scan(root)?;
        info!(
            "📂 dataset {:?}: {} labels, {} pictures",
            layout.root,
            layout.labels.len(),
            layout.sample_count()
        );
        layout.extract(extractor, cancel)
    }

    pub fn label_set(&self) -> Vec<String> {
        self.labels.keys().cloned().collect()
    }

    pub fn sample_count(&self) -> usize {
        self.labels.values().map(|v| v.len()).sum()
    }

    /// 训练前校验：标签数量、样本数量、特征长度一致
    pub fn validate(&self) -> Result<usize> {
        if self.labels.len() < 2 {
            return Err(StageError::DataInsufficient(format!(
                "{} label(s) given, at least 2 are required",
                self.labels.len()
            )));
        }

        let mut feature_len: Option<usize> = None;
        for (label, samples) in &self.labels {
            if samples.is_empty() {
                return Err(StageError::DataInsufficient(format!(
                    "label `{}` has no samples",
                    label
                )));
            }
            for sample in samples {
                let features = sample.feature_vector.as_ref().ok_or_else(|| {
                    StageError::DataInsufficient(format!(
                        "frame {} of label `{}` has no features",
                        sample.frame_id, label
                    ))
                })?;
                match feature_len {
                    None => feature_len = Some(features.len()),
                    Some(len) if len != features.len() => {
                        return Err(StageError::ConfigMismatch {
                            expected: format!("feature length {}", len),
                            actual: format!(
                                "feature length {} (frame {} of label `{}`)",
                                features.len(),
                                sample.frame_id,
                                label
                            ),
                        });
                    }
                    Some(_) => {}
                }
            }
        }

        match feature_len {
            Some(len) if len > 0 => Ok(len),
            _ => Err(StageError::DataInsufficient("empty feature vectors".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PreprocessConfig;
    use image::{GrayImage, Luma};

    fn write_picture(dir: &Path, name: &str, fill: u8) {
        fs::create_dir_all(dir).unwrap();
        GrayImage::from_pixel(16, 16, Luma([fill]))
            .save(dir.join(name))
            .unwrap();
    }

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(PreprocessConfig::Resize {
            width: 4,
            height: 4,
        })
        .unwrap()
    }

    #[test]
    fn test_load_orders_by_frame_id() {
        let root = tempfile::tempdir().unwrap();
        write_picture(&root.path().join("home"), "12_480.png", 10);
        write_picture(&root.path().join("home"), "3_120.png", 10);
        write_picture(&root.path().join("menu"), "40_1600.png", 240);
        fs::write(root.path().join("cut_result.json"), "{}").unwrap();

        let dataset = Dataset::load(root.path(), &extractor(), &CancelToken::new()).unwrap();
        assert_eq!(dataset.label_set(), vec!["home", "menu"]);
        let home: Vec<u64> = dataset.labels["home"].iter().map(|s| s.frame_id).collect();
        assert_eq!(home, vec![3, 12]);
        assert_eq!(dataset.labels["home"][0].timestamp_ms, 120);
        assert_eq!(dataset.labels["menu"][0].label.as_deref(), Some("menu"));
        assert_eq!(dataset.validate().unwrap(), 16);
    }

    #[test]
    fn test_single_label_rejected_before_extraction() {
        let root = tempfile::tempdir().unwrap();
        write_picture(&root.path().join("only"), "0_0.png", 10);
        let err = DatasetLayout::scan(root.path()).unwrap_err();
        assert!(matches!(err, StageError::DataInsufficient(_)));
    }

    #[test]
    fn test_empty_label_rejected() {
        let root = tempfile::tempdir().unwrap();
        write_picture(&root.path().join("a"), "0_0.png", 10);
        fs::create_dir_all(root.path().join("b")).unwrap();
        let err = DatasetLayout::scan(root.path()).unwrap_err();
        assert!(matches!(err, StageError::DataInsufficient(msg) if msg.contains("`b`")));
    }

    #[test]
    fn test_missing_root() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("missing");
        assert!(matches!(
            DatasetLayout::scan(&missing),
            Err(StageError::ResourceMissing(p)) if p == missing
        ));
    }

    #[test]
    fn test_mixed_feature_lengths_rejected() {
        let sample = |len: usize| SampledFrame {
            range_id: None,
            frame_id: 0,
            timestamp_ms: 0,
            feature_vector: Some(vec![0.5; len]),
            label: None,
        };
        let mut dataset = Dataset::default();
        dataset.labels.insert("a".into(), vec![sample(4)]);
        dataset.labels.insert("b".into(), vec![sample(6)]);
        assert!(matches!(
            dataset.validate(),
            Err(StageError::ConfigMismatch { .. })
        ));
    }
}
