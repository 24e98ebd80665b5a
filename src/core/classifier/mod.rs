//! 阶段分类：特征提取 + 线性 SVM

pub mod dataset;
pub mod features;
pub mod model;
pub mod svm;

pub use dataset::{Dataset, DatasetLayout};
pub use features::FeatureExtractor;
pub use model::{Prediction, TrainedModel};
pub use svm::SvmParams;
