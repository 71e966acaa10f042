//! Progress events published by a pipeline run.
//!
//! The pipeline only sends; rendering belongs to the observer (the SSE
//! handler, or nobody at all). Every event is also logged.

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::filter::pipeline::RunSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Screening,
    Review,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Screening => f.write_str("stage 1 (screening)"),
            Stage::Review => f.write_str("stage 2 (review)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Fetched {
        unevaluated: usize,
        pending_review: usize,
    },
    RegexComplete {
        rejected: usize,
        forwarded: usize,
    },
    StageStarted {
        stage: Stage,
        jobs: usize,
        batches: usize,
    },
    BatchCompleted {
        stage: Stage,
        batch: usize,
        jobs: usize,
        accepted: usize,
        review: usize,
        rejected: usize,
    },
    BatchFailed {
        stage: Stage,
        batch: usize,
        jobs: usize,
        error: String,
    },
    StageCompleted {
        stage: Stage,
        accepted: usize,
        review: usize,
        rejected: usize,
        failed_batches: usize,
    },
    StageAborted {
        stage: Stage,
        reason: String,
    },
    /// The run could not start; nothing was written.
    Failed {
        error: String,
    },
    Finished {
        summary: RunSummary,
    },
}

impl ProgressEvent {
    /// Event name, matching the serde `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::Fetched { .. } => "fetched",
            ProgressEvent::RegexComplete { .. } => "regex_complete",
            ProgressEvent::StageStarted { .. } => "stage_started",
            ProgressEvent::BatchCompleted { .. } => "batch_completed",
            ProgressEvent::BatchFailed { .. } => "batch_failed",
            ProgressEvent::StageCompleted { .. } => "stage_completed",
            ProgressEvent::StageAborted { .. } => "stage_aborted",
            ProgressEvent::Failed { .. } => "failed",
            ProgressEvent::Finished { .. } => "finished",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ProgressEvent::BatchFailed { .. }
                | ProgressEvent::StageAborted { .. }
                | ProgressEvent::Failed { .. }
        )
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::Fetched {
                unevaluated,
                pending_review,
            } => write!(
                f,
                "fetched {unevaluated} unevaluated jobs, {pending_review} awaiting review"
            ),
            ProgressEvent::RegexComplete {
                rejected,
                forwarded,
            } => write!(f, "regex complete: rejected={rejected}, forwarded={forwarded}"),
            ProgressEvent::StageStarted {
                stage,
                jobs,
                batches,
            } => write!(f, "{stage} started: {jobs} jobs in {batches} batches"),
            ProgressEvent::BatchCompleted {
                stage,
                batch,
                jobs,
                accepted,
                review,
                rejected,
            } => write!(
                f,
                "✓ {stage} batch {batch} ({jobs} jobs): accepted={accepted}, review={review}, rejected={rejected}"
            ),
            ProgressEvent::BatchFailed {
                stage,
                batch,
                jobs,
                error,
            } => write!(
                f,
                "✗ batch failed: {stage} batch {batch}, {jobs} jobs left for the next run: {error}"
            ),
            ProgressEvent::StageCompleted {
                stage,
                accepted,
                review,
                rejected,
                failed_batches,
            } => write!(
                f,
                "{stage} complete: accepted={accepted}, review={review}, rejected={rejected}, failed_batches={failed_batches}"
            ),
            ProgressEvent::StageAborted { stage, reason } => {
                write!(f, "✗ {stage} aborted: {reason}")
            }
            ProgressEvent::Failed { error } => write!(f, "✗ run failed: {error}"),
            ProgressEvent::Finished { summary } => write!(f, "finished: {summary}"),
        }
    }
}

/// Sending half handed to a pipeline run. A sink without a channel only logs.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    pub fn new(tx: UnboundedSender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn emit(&self, event: ProgressEvent) {
        if event.is_failure() {
            tracing::warn!(event = event.kind(), "{event}");
        } else {
            tracing::info!(event = event.kind(), "{event}");
        }

        if let Some(tx) = &self.tx {
            // A closed receiver means the observer went away; the run continues.
            if tx.send(event).is_err() {
                tracing::debug!("progress observer disconnected");
            }
        }
    }
}
