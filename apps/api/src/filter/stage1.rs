//! Stage 1: cheap screening over newly unevaluated jobs.
//!
//! Each batch worker classifies and then commits its own results in one
//! store transaction, so a failed batch leaves its jobs unevaluated and the
//! next run picks them up again.

use std::collections::{HashMap, HashSet};
use std::pin::pin;
use std::sync::Arc;

use futures::StreamExt;

use crate::filter::batch_runner::{chunk_jobs, run_batches};
use crate::filter::classifier::{
    Assessment, ClassifyError, Classifier, ScreenVerdict, ScreeningResult, Verdict,
};
use crate::filter::prefilter::ScreenedJob;
use crate::filter::progress::{ProgressEvent, ProgressSink, Stage};
use crate::filter::{BatchSettings, StageError};
use crate::models::job::{priority_for, NewTargetJob, ReviewCandidate, TargetStatus};
use crate::store::{JobStore, ScreeningCommit};

/// Verdicts for one batch, after dropping anything unusable.
#[derive(Debug, Default)]
pub struct RoutedBatch {
    pub verdicts: Vec<ScreenVerdict>,
    pub dropped: usize,
}

/// Turns raw screening results into typed verdicts.
///
/// Results for ids outside the batch, repeated ids and scores outside
/// `[0, 1]` are dropped; the affected jobs simply stay unevaluated. The
/// score decides the route; a disagreeing label is only logged.
pub fn route_batch(batch: &[ScreenedJob], results: Vec<ScreeningResult>) -> RoutedBatch {
    let known: HashSet<i64> = batch.iter().map(|s| s.job.id).collect();
    let mut seen = HashSet::with_capacity(results.len());
    let mut routed = RoutedBatch::default();

    for result in results {
        if !known.contains(&result.job_id) {
            tracing::warn!(job_id = result.job_id, "Dropping verdict for a job outside the batch");
            routed.dropped += 1;
            continue;
        }
        if !result.score.is_finite() || !(0.0..=1.0).contains(&result.score) {
            tracing::warn!(
                job_id = result.job_id,
                score = result.score,
                "Dropping verdict with out-of-range score"
            );
            routed.dropped += 1;
            continue;
        }
        if !seen.insert(result.job_id) {
            tracing::warn!(job_id = result.job_id, "Dropping repeated verdict");
            routed.dropped += 1;
            continue;
        }

        let verdict = Verdict::from_assessment(Assessment::from(&result));
        if let Some(label) = result.decision {
            if label != verdict.decision() {
                tracing::debug!(
                    job_id = result.job_id,
                    score = result.score,
                    ?label,
                    routed = ?verdict.decision(),
                    "Classifier label disagrees with its score; using the score"
                );
            }
        }
        routed.verdicts.push(ScreenVerdict {
            job_id: result.job_id,
            verdict,
        });
    }
    routed
}

fn new_target(job: &ScreenedJob, assessment: &Assessment, status: TargetStatus) -> NewTargetJob {
    NewTargetJob {
        job_id: job.job.id,
        relevance_score: assessment.score,
        match_reason: assessment.reasoning.clone(),
        status,
        priority: priority_for(job.is_foreign),
        is_intern: job.is_intern,
        experience: assessment.experience.clone(),
    }
}

fn review_candidate(job: &ScreenedJob, target: &NewTargetJob) -> ReviewCandidate {
    ReviewCandidate {
        job_id: job.job.id,
        title: job.job.title.clone(),
        company_name: job.job.company_name.clone(),
        location: job.job.location.clone(),
        description: job.job.description.clone(),
        relevance_score: target.relevance_score,
        match_reason: target.match_reason.clone(),
        priority: target.priority,
        is_intern: target.is_intern,
    }
}

/// What one committed batch contributed.
#[derive(Debug, Default)]
pub struct BatchTally {
    pub accepted: usize,
    pub rejected: usize,
    pub review: Vec<ReviewCandidate>,
    pub evaluated: Vec<i64>,
    pub dropped: usize,
}

/// Builds the atomic write for a batch and the tally it produces once committed.
pub fn plan_commit(batch: &[ScreenedJob], routed: RoutedBatch) -> (ScreeningCommit, BatchTally) {
    let by_id: HashMap<i64, &ScreenedJob> = batch.iter().map(|s| (s.job.id, s)).collect();
    let mut commit = ScreeningCommit::default();
    let mut tally = BatchTally {
        dropped: routed.dropped,
        ..Default::default()
    };

    for ScreenVerdict { job_id, verdict } in routed.verdicts {
        // route_batch only keeps ids from this batch
        let Some(job) = by_id.get(&job_id) else {
            continue;
        };
        match &verdict {
            Verdict::Accept(a) => {
                commit.targets.push(new_target(job, a, TargetStatus::Pending));
                tally.accepted += 1;
            }
            Verdict::Review(a) => {
                let target = new_target(job, a, TargetStatus::PendingReview);
                tally.review.push(review_candidate(job, &target));
                commit.targets.push(target);
            }
            Verdict::Reject(_) => tally.rejected += 1,
        }
        commit.evaluated.push(job_id);
    }
    tally.evaluated = commit.evaluated.clone();
    (commit, tally)
}

async fn screen_batch(
    store: &dyn JobStore,
    classifier: &dyn Classifier,
    batch: &[ScreenedJob],
) -> Result<BatchTally, StageError> {
    let results = classifier.screen(batch).await?;
    if results.is_empty() {
        return Err(ClassifyError::Empty(batch.len()).into());
    }
    let (commit, mut tally) = plan_commit(batch, route_batch(batch, results));
    let inserted: HashSet<i64> = store.commit_screening(&commit).await?.into_iter().collect();
    // A job that already had a TargetJob keeps it; only new rows go to review.
    tally.review.retain(|c| inserted.contains(&c.job_id));
    Ok(tally)
}

/// Totals for the whole stage.
#[derive(Debug, Default)]
pub struct ScreeningReport {
    pub accepted: usize,
    pub rejected: usize,
    pub review_queue: Vec<ReviewCandidate>,
    pub evaluated: usize,
    pub dropped_verdicts: usize,
    pub failed_batches: usize,
}

pub async fn run_screening(
    store: Arc<dyn JobStore>,
    classifier: Arc<dyn Classifier>,
    jobs: Vec<ScreenedJob>,
    settings: BatchSettings,
    progress: &ProgressSink,
) -> ScreeningReport {
    let mut report = ScreeningReport::default();
    if jobs.is_empty() {
        return report;
    }

    let total = jobs.len();
    let batches = chunk_jobs(jobs, settings.batch_size);
    progress.emit(ProgressEvent::StageStarted {
        stage: Stage::Screening,
        jobs: total,
        batches: batches.len(),
    });

    let mut outcomes = pin!(run_batches(
        batches,
        settings.concurrency,
        |batch: Arc<Vec<ScreenedJob>>| {
            let store = Arc::clone(&store);
            let classifier = Arc::clone(&classifier);
            async move { screen_batch(store.as_ref(), classifier.as_ref(), &batch).await }
        },
    ));

    while let Some(outcome) = outcomes.next().await {
        let batch_number = outcome.index + 1;
        match outcome.result {
            Ok(tally) => {
                progress.emit(ProgressEvent::BatchCompleted {
                    stage: Stage::Screening,
                    batch: batch_number,
                    jobs: outcome.batch.len(),
                    accepted: tally.accepted,
                    review: tally.review.len(),
                    rejected: tally.rejected,
                });
                report.accepted += tally.accepted;
                report.rejected += tally.rejected;
                report.evaluated += tally.evaluated.len();
                report.dropped_verdicts += tally.dropped;
                report.review_queue.extend(tally.review);
            }
            Err(e) => {
                report.failed_batches += 1;
                progress.emit(ProgressEvent::BatchFailed {
                    stage: Stage::Screening,
                    batch: batch_number,
                    jobs: outcome.batch.len(),
                    error: e.to_string(),
                });
            }
        }
    }

    progress.emit(ProgressEvent::StageCompleted {
        stage: Stage::Screening,
        accepted: report.accepted,
        review: report.review_queue.len(),
        rejected: report.rejected,
        failed_batches: report.failed_batches,
    });
    report
}
