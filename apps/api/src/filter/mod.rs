pub mod batch_runner;
pub mod classifier;
pub mod handlers;
pub mod pipeline;
pub mod prefilter;
pub mod progress;
pub mod prompts;
pub mod stage1;
pub mod stage2;

#[cfg(test)]
pub mod testing;

use thiserror::Error;

use crate::filter::classifier::ClassifyError;
use crate::models::profile::ProfileError;
use crate::store::StoreError;

pub use pipeline::FilterPipeline;

/// Why a batch, or a whole stage, did not complete.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("classifier is not configured: {0}")]
    NotConfigured(String),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error("{0}")]
    Classify(#[from] ClassifyError),

    #[error("store write failed: {0}")]
    Store(#[from] StoreError),
}

/// Batch size and in-flight cap for one classifier stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    pub batch_size: usize,
    pub concurrency: usize,
}

impl BatchSettings {
    pub const SCREENING_DEFAULT: BatchSettings = BatchSettings {
        batch_size: 50,
        concurrency: 5,
    };

    pub const REVIEW_DEFAULT: BatchSettings = BatchSettings {
        batch_size: 20,
        concurrency: 5,
    };
}
