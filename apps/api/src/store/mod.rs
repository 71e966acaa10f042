//! Job State Store: persisted evaluation state and TargetJobs.
//!
//! The store is the only shared mutable resource in the pipeline and the
//! source of truth for crash recovery. Every operation is idempotent:
//! batch effects are delivered at-least-once, never exactly-once.
//!
//! `AppState` holds an `Arc<dyn JobStore>`; production uses `PgJobStore`.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::job::{
    JobListing, NewTargetJob, PipelineStats, ReviewCandidate, TargetJobView, TargetStatus,
};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgJobStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// The per-batch Stage 1 write: TargetJob inserts plus the ids to mark
/// evaluated. Applied in one transaction, inserts first.
#[derive(Debug, Clone, Default)]
pub struct ScreeningCommit {
    pub targets: Vec<NewTargetJob>,
    pub evaluated: Vec<i64>,
}

/// Final reviewer decision for one `PendingReview` TargetJob, keyed by job id.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewDecision {
    pub job_id: i64,
    pub accept: bool,
    pub score: Option<f64>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    Accepted,
    Deleted,
    /// No `PendingReview` row for the job: already finalized or never queued.
    NotPending,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReviewCommitSummary {
    pub accepted: u64,
    pub deleted: u64,
    pub skipped: u64,
}

impl ReviewCommitSummary {
    pub fn record(&mut self, outcome: FinalizeOutcome) {
        match outcome {
            FinalizeOutcome::Accepted => self.accepted += 1,
            FinalizeOutcome::Deleted => self.deleted += 1,
            FinalizeOutcome::NotPending => self.skipped += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ResetSummary {
    pub jobs_reset: u64,
    pub targets_cleared: u64,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Jobs with `evaluated = false`, oldest first. `None` means no limit.
    async fn fetch_unevaluated(&self, limit: Option<i64>) -> Result<Vec<JobListing>, StoreError>;

    /// Every TargetJob still awaiting the expensive reviewer.
    async fn fetch_pending_review(&self) -> Result<Vec<ReviewCandidate>, StoreError>;

    /// Returns the number of jobs that flipped from unevaluated to evaluated.
    async fn mark_evaluated(&self, job_ids: &[i64]) -> Result<u64, StoreError>;

    /// Inserts the TargetJob as given. Returns `false` when the job already
    /// has a row (no-op on conflict).
    async fn insert_target_job(&self, job: &NewTargetJob) -> Result<bool, StoreError>;

    /// Inserts the TargetJob with status `PendingReview`. No-op on conflict.
    async fn insert_review_job(&self, job: &NewTargetJob) -> Result<bool, StoreError> {
        let queued = NewTargetJob {
            status: TargetStatus::PendingReview,
            ..job.clone()
        };
        self.insert_target_job(&queued).await
    }

    /// Accept promotes the row to `Pending` (optionally overwriting score and
    /// reason); reject deletes it. Only rows still `PendingReview` are touched.
    async fn finalize_review_job(
        &self,
        decision: &ReviewDecision,
    ) -> Result<FinalizeOutcome, StoreError>;

    /// Atomic Stage 1 batch write. Returns the job ids whose TargetJob was
    /// actually inserted; ids that already had a row are left out.
    async fn commit_screening(&self, commit: &ScreeningCommit) -> Result<Vec<i64>, StoreError>;

    /// Atomic Stage 2 batch write.
    async fn commit_reviews(
        &self,
        decisions: &[ReviewDecision],
    ) -> Result<ReviewCommitSummary, StoreError>;

    async fn reset_evaluated(&self) -> Result<u64, StoreError>;

    async fn clear_target_jobs(&self) -> Result<u64, StoreError>;

    async fn stats(&self) -> Result<PipelineStats, StoreError>;

    /// TargetJobs ranked by priority, then score descending.
    async fn list_targets(
        &self,
        status: Option<TargetStatus>,
    ) -> Result<Vec<TargetJobView>, StoreError>;
}
