//! The filter pipeline: Regex → Stage 1 → Stage 2, strictly in that order.
//!
//! Stage failures never fail the run. Each stage either finishes with some
//! batches failed or is aborted outright, and whatever earlier stages
//! committed stays committed. Only a failure to load the initial work set
//! returns an error, because at that point nothing has been done.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::filter::classifier::{Classifier, LlmClassifier};
use crate::filter::prefilter::partition;
use crate::filter::progress::{ProgressEvent, ProgressSink, Stage};
use crate::filter::stage1::run_screening;
use crate::filter::stage2::{merge_review_queue, run_review};
use crate::filter::{BatchSettings, StageError};
use crate::llm_client::LlmClient;
use crate::models::job::{PipelineStats, ReviewCandidate, TargetJobView, TargetStatus};
use crate::models::profile::CandidateProfile;
use crate::store::{JobStore, ResetSummary, StoreError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not load the jobs to filter: {0}")]
    Fetch(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub screening: BatchSettings,
    pub review: BatchSettings,
    pub profile_path: PathBuf,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            screening: BatchSettings {
                batch_size: config.stage1_batch_size,
                concurrency: config.stage1_concurrency,
            },
            review: BatchSettings {
                batch_size: config.stage2_batch_size,
                concurrency: config.stage2_concurrency,
            },
            profile_path: config.profile_path.clone(),
        }
    }
}

/// What one run did. `accepted`, `reviewed` and `rejected` are the totals
/// across all stages; the other counters break them down.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub review_only: bool,
    pub fetched: usize,
    pub regex_rejected: usize,
    pub screened_accepted: usize,
    pub queued_for_review: usize,
    pub screened_rejected: usize,
    pub review_candidates: usize,
    pub review_accepted: usize,
    pub review_rejected: usize,
    pub accepted: usize,
    pub reviewed: usize,
    pub rejected: usize,
    pub failed_batches: usize,
    /// Classifier results discarded for an unknown id, a repeat or a bad score.
    pub dropped_results: usize,
    pub still_unevaluated: usize,
    pub still_pending_review: usize,
    pub aborted_stages: Vec<Stage>,
}

impl RunSummary {
    fn new(run_id: Uuid, review_only: bool) -> Self {
        Self {
            run_id,
            review_only,
            ..Default::default()
        }
    }

    fn tally(&mut self) {
        self.accepted = self.screened_accepted + self.review_accepted;
        self.reviewed = self.review_accepted + self.review_rejected;
        self.rejected = self.regex_rejected + self.screened_rejected + self.review_rejected;
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "accepted={}, reviewed={}, rejected={}, failed_batches={}, unevaluated={}, pending_review={}",
            self.accepted,
            self.reviewed,
            self.rejected,
            self.failed_batches,
            self.still_unevaluated,
            self.still_pending_review
        )
    }
}

/// Dependency bundle for pipeline runs. Cheap to clone.
#[derive(Clone)]
pub struct FilterPipeline {
    store: Arc<dyn JobStore>,
    classifier: Option<Arc<dyn Classifier>>,
    settings: PipelineSettings,
}

impl FilterPipeline {
    /// `classifier` is `None` when no API key is configured; both classifier
    /// stages then abort while the regex stage still runs.
    pub fn new(
        store: Arc<dyn JobStore>,
        classifier: Option<Arc<dyn Classifier>>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            classifier,
            settings,
        }
    }

    pub fn from_config(store: Arc<dyn JobStore>, config: &Config) -> Self {
        let classifier = config.anthropic_api_key.clone().map(|key| {
            Arc::new(LlmClassifier::new(
                LlmClient::new(key),
                config.cheap_model.clone(),
                config.expensive_model.clone(),
            )) as Arc<dyn Classifier>
        });
        if classifier.is_none() {
            tracing::warn!("ANTHROPIC_API_KEY is not set; classifier stages will abort");
        }
        Self::new(store, classifier, PipelineSettings::from_config(config))
    }

    /// Full run over up to `limit` unevaluated jobs, plus every review job
    /// left over from earlier runs.
    pub async fn run(
        &self,
        limit: Option<i64>,
        progress: ProgressSink,
    ) -> Result<RunSummary, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("filter_run", %run_id, mode = "full");
        self.run_full(run_id, limit, &progress).instrument(span).await
    }

    /// Stage 2 only, over the `PendingReview` rows already in the store.
    pub async fn run_review_only(&self, progress: ProgressSink) -> Result<RunSummary, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("filter_run", %run_id, mode = "review");
        self.run_review(run_id, &progress).instrument(span).await
    }

    async fn run_full(
        &self,
        run_id: Uuid,
        limit: Option<i64>,
        progress: &ProgressSink,
    ) -> Result<RunSummary, PipelineError> {
        let mut summary = RunSummary::new(run_id, false);

        // Recovered review jobs are read before any new work is written.
        let fetched = async {
            let recovered = self.store.fetch_pending_review().await?;
            let jobs = self.store.fetch_unevaluated(limit).await?;
            Ok::<_, StoreError>((recovered, jobs))
        }
        .await;
        let (recovered, jobs) = match fetched {
            Ok(fetched) => fetched,
            Err(e) => return Err(fail(progress, e)),
        };

        summary.fetched = jobs.len();
        progress.emit(ProgressEvent::Fetched {
            unevaluated: jobs.len(),
            pending_review: recovered.len(),
        });

        let split = partition(jobs);
        summary.regex_rejected = split.regex_rejected.len();
        let mut evaluated = 0;
        if !split.regex_rejected.is_empty() {
            let ids: Vec<i64> = split.regex_rejected.iter().map(|r| r.job_id).collect();
            match self.store.mark_evaluated(&ids).await {
                Ok(_) => evaluated += ids.len(),
                Err(e) => {
                    summary.failed_batches += 1;
                    tracing::warn!(error = %e, count = ids.len(), "Failed to mark regex rejects evaluated");
                }
            }
        }
        progress.emit(ProgressEvent::RegexComplete {
            rejected: split.regex_rejected.len(),
            forwarded: split.potentially_relevant.len(),
        });

        let mut fresh_review = Vec::new();
        if !split.potentially_relevant.is_empty() {
            match &self.classifier {
                None => abort(&mut summary, progress, Stage::Screening, missing_key()),
                Some(classifier) => {
                    let report = run_screening(
                        Arc::clone(&self.store),
                        Arc::clone(classifier),
                        split.potentially_relevant,
                        self.settings.screening,
                        progress,
                    )
                    .await;
                    summary.screened_accepted = report.accepted;
                    summary.queued_for_review = report.review_queue.len();
                    summary.screened_rejected = report.rejected;
                    summary.failed_batches += report.failed_batches;
                    summary.dropped_results += report.dropped_verdicts;
                    evaluated += report.evaluated;
                    fresh_review = report.review_queue;
                }
            }
        }
        summary.still_unevaluated = summary.fetched.saturating_sub(evaluated);

        self.review_stage(recovered, fresh_review, &mut summary, progress)
            .await;
        Ok(finish(summary, progress))
    }

    async fn run_review(
        &self,
        run_id: Uuid,
        progress: &ProgressSink,
    ) -> Result<RunSummary, PipelineError> {
        let mut summary = RunSummary::new(run_id, true);
        let recovered = match self.store.fetch_pending_review().await {
            Ok(recovered) => recovered,
            Err(e) => return Err(fail(progress, e)),
        };
        progress.emit(ProgressEvent::Fetched {
            unevaluated: 0,
            pending_review: recovered.len(),
        });

        self.review_stage(recovered, Vec::new(), &mut summary, progress)
            .await;
        Ok(finish(summary, progress))
    }

    async fn review_stage(
        &self,
        recovered: Vec<ReviewCandidate>,
        fresh: Vec<ReviewCandidate>,
        summary: &mut RunSummary,
        progress: &ProgressSink,
    ) {
        let queue = merge_review_queue(recovered, fresh);
        summary.review_candidates = queue.len();
        summary.still_pending_review = queue.len();
        if queue.is_empty() {
            tracing::info!("No jobs awaiting review");
            return;
        }

        let Some(classifier) = &self.classifier else {
            abort(summary, progress, Stage::Review, missing_key());
            return;
        };
        let profile = match CandidateProfile::load(&self.settings.profile_path).await {
            Ok(profile) => Arc::new(profile),
            Err(e) => {
                abort(summary, progress, Stage::Review, StageError::from(e));
                return;
            }
        };

        let report = run_review(
            Arc::clone(&self.store),
            Arc::clone(classifier),
            profile,
            queue,
            self.settings.review,
            progress,
        )
        .await;
        summary.review_accepted = report.accepted;
        summary.review_rejected = report.rejected;
        summary.failed_batches += report.failed_batches;
        summary.dropped_results += report.dropped_decisions;
        summary.still_pending_review = report.unresolved();
    }

    /// Marks every job unevaluated and removes every TargetJob.
    pub async fn reset(&self) -> Result<ResetSummary, StoreError> {
        let targets_cleared = self.store.clear_target_jobs().await?;
        let jobs_reset = self.store.reset_evaluated().await?;
        tracing::info!(jobs_reset, targets_cleared, "Pipeline state reset");
        Ok(ResetSummary {
            jobs_reset,
            targets_cleared,
        })
    }

    pub async fn stats(&self) -> Result<PipelineStats, StoreError> {
        self.store.stats().await
    }

    pub async fn targets(
        &self,
        status: Option<TargetStatus>,
    ) -> Result<Vec<TargetJobView>, StoreError> {
        self.store.list_targets(status).await
    }
}

fn missing_key() -> StageError {
    StageError::NotConfigured("ANTHROPIC_API_KEY is not set".to_string())
}

fn abort(summary: &mut RunSummary, progress: &ProgressSink, stage: Stage, error: StageError) {
    summary.aborted_stages.push(stage);
    progress.emit(ProgressEvent::StageAborted {
        stage,
        reason: error.to_string(),
    });
}

fn fail(progress: &ProgressSink, error: StoreError) -> PipelineError {
    let error = PipelineError::from(error);
    progress.emit(ProgressEvent::Failed {
        error: error.to_string(),
    });
    error
}

fn finish(mut summary: RunSummary, progress: &ProgressSink) -> RunSummary {
    summary.tally();
    progress.emit(ProgressEvent::Finished {
        summary: summary.clone(),
    });
    summary
}
