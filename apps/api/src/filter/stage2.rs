//! Stage 2: expensive review of `PendingReview` TargetJobs.
//!
//! Decisions are keyed by job id and only touch rows that are still
//! `PendingReview`, so replaying a batch after a crash is harmless.

use std::collections::{BTreeMap, HashSet};
use std::pin::pin;
use std::sync::Arc;

use futures::StreamExt;

use crate::filter::batch_runner::{chunk_jobs, run_batches};
use crate::filter::classifier::{ClassifyError, Classifier, FinalDecision, ReviewResult};
use crate::filter::progress::{ProgressEvent, ProgressSink, Stage};
use crate::filter::{BatchSettings, StageError};
use crate::models::job::ReviewCandidate;
use crate::models::profile::CandidateProfile;
use crate::store::{JobStore, ReviewCommitSummary, ReviewDecision};

/// Union of fresh and recovered review jobs, one entry per job id.
/// Recovered rows win: they are what the store actually holds.
pub fn merge_review_queue(
    recovered: Vec<ReviewCandidate>,
    fresh: Vec<ReviewCandidate>,
) -> Vec<ReviewCandidate> {
    let mut queue: BTreeMap<i64, ReviewCandidate> = BTreeMap::new();
    for candidate in recovered {
        queue.insert(candidate.job_id, candidate);
    }
    for candidate in fresh {
        queue.entry(candidate.job_id).or_insert(candidate);
    }
    queue.into_values().collect()
}

/// Keeps the first decision per job in the batch. A score outside `[0, 1]`
/// is discarded but the decision itself stands.
pub fn decisions_for_batch(
    batch: &[ReviewCandidate],
    results: Vec<ReviewResult>,
) -> (Vec<ReviewDecision>, usize) {
    let known: HashSet<i64> = batch.iter().map(|c| c.job_id).collect();
    let mut seen = HashSet::with_capacity(results.len());
    let mut decisions = Vec::with_capacity(results.len());
    let mut dropped = 0;

    for result in results {
        if !known.contains(&result.job_id) || !seen.insert(result.job_id) {
            tracing::warn!(job_id = result.job_id, "Dropping unexpected review decision");
            dropped += 1;
            continue;
        }
        let score = result.score.filter(|s| s.is_finite() && (0.0..=1.0).contains(s));
        if result.score.is_some() && score.is_none() {
            tracing::warn!(job_id = result.job_id, "Ignoring out-of-range review score");
        }
        decisions.push(ReviewDecision {
            job_id: result.job_id,
            accept: result.decision == FinalDecision::Accept,
            score,
            reason: result.reasoning.filter(|r| !r.trim().is_empty()),
        });
    }
    (decisions, dropped)
}

async fn review_batch(
    store: &dyn JobStore,
    classifier: &dyn Classifier,
    profile: &CandidateProfile,
    batch: &[ReviewCandidate],
) -> Result<(ReviewCommitSummary, usize), StageError> {
    let results = classifier.review(batch, profile).await?;
    if results.is_empty() {
        return Err(ClassifyError::Empty(batch.len()).into());
    }
    let (decisions, dropped) = decisions_for_batch(batch, results);
    let summary = store.commit_reviews(&decisions).await?;
    Ok((summary, dropped))
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReviewReport {
    pub candidates: usize,
    pub accepted: usize,
    pub rejected: usize,
    /// Decisions for rows that were no longer `PendingReview`.
    pub stale: usize,
    pub dropped_decisions: usize,
    pub failed_batches: usize,
}

impl ReviewReport {
    pub fn unresolved(&self) -> usize {
        self.candidates
            .saturating_sub(self.accepted + self.rejected + self.stale)
    }
}

pub async fn run_review(
    store: Arc<dyn JobStore>,
    classifier: Arc<dyn Classifier>,
    profile: Arc<CandidateProfile>,
    candidates: Vec<ReviewCandidate>,
    settings: BatchSettings,
    progress: &ProgressSink,
) -> ReviewReport {
    let mut report = ReviewReport {
        candidates: candidates.len(),
        ..Default::default()
    };
    if candidates.is_empty() {
        return report;
    }

    let batches = chunk_jobs(candidates, settings.batch_size);
    progress.emit(ProgressEvent::StageStarted {
        stage: Stage::Review,
        jobs: report.candidates,
        batches: batches.len(),
    });

    let mut outcomes = pin!(run_batches(
        batches,
        settings.concurrency,
        |batch: Arc<Vec<ReviewCandidate>>| {
            let store = Arc::clone(&store);
            let classifier = Arc::clone(&classifier);
            let profile = Arc::clone(&profile);
            async move {
                review_batch(store.as_ref(), classifier.as_ref(), &profile, &batch).await
            }
        },
    ));

    while let Some(outcome) = outcomes.next().await {
        let batch_number = outcome.index + 1;
        match outcome.result {
            Ok((summary, dropped)) => {
                progress.emit(ProgressEvent::BatchCompleted {
                    stage: Stage::Review,
                    batch: batch_number,
                    jobs: outcome.batch.len(),
                    accepted: summary.accepted as usize,
                    review: 0,
                    rejected: summary.deleted as usize,
                });
                report.accepted += summary.accepted as usize;
                report.rejected += summary.deleted as usize;
                report.stale += summary.skipped as usize;
                report.dropped_decisions += dropped;
            }
            Err(e) => {
                report.failed_batches += 1;
                progress.emit(ProgressEvent::BatchFailed {
                    stage: Stage::Review,
                    batch: batch_number,
                    jobs: outcome.batch.len(),
                    error: e.to_string(),
                });
            }
        }
    }

    progress.emit(ProgressEvent::StageCompleted {
        stage: Stage::Review,
        accepted: report.accepted,
        review: 0,
        rejected: report.rejected,
        failed_batches: report.failed_batches,
    });
    report
}
