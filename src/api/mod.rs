pub mod pipeline;
pub mod report;

pub use pipeline::{
    ClassificationResult, ClassifyBasis, CutOutcome, OneStepOutcome, StagePipeline,
    CUT_RESULT_FILE_NAME, REPORT_FILE_NAME,
};
pub use report::{JsonReporter, Reporter};
