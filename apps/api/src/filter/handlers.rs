//! Axum route handlers for the Filter API.

use std::convert::Infallible;

use axum::{
    body::Bytes,
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::errors::AppError;
use crate::filter::progress::{ProgressEvent, ProgressSink};
use crate::models::job::{PipelineStats, TargetJobView, TargetStatus};
use crate::state::AppState;
use crate::store::ResetSummary;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct RunRequest {
    pub limit: Option<i64>,
}

impl RunRequest {
    /// An empty body means "no limit"; anything else must be a valid request.
    pub fn from_body(body: &[u8]) -> Result<Self, AppError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let request: RunRequest = serde_json::from_slice(body)
            .map_err(|e| AppError::Validation(format!("invalid run request: {e}")))?;
        if matches!(request.limit, Some(limit) if limit <= 0) {
            return Err(AppError::Validation("limit must be positive".to_string()));
        }
        Ok(request)
    }
}

#[derive(Debug, Deserialize)]
pub struct TargetsQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TargetsResponse {
    pub total: usize,
    pub targets: Vec<TargetJobView>,
}

fn to_sse(event: &ProgressEvent) -> Event {
    Event::default()
        .event(event.kind())
        .json_data(event)
        .unwrap_or_else(|_| Event::default().event(event.kind()).data(event.to_string()))
}

/// Ends when the run drops its sender.
fn event_stream(
    rx: UnboundedReceiver<ProgressEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = UnboundedReceiverStream::new(rx).map(|event| Ok(to_sse(&event)));
    Sse::new(events).keep_alive(KeepAlive::default())
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/filter/run
///
/// Starts a full run and streams its progress. The run keeps going if the
/// client disconnects.
pub async fn handle_run(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let request = RunRequest::from_body(&body)?;

    let guard = state.try_begin_run()?;
    let pipeline = state.pipeline.clone();
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let _guard = guard;
        if let Err(e) = pipeline.run(request.limit, ProgressSink::new(tx)).await {
            tracing::error!(error = %e, "Filter run failed");
        }
    });

    Ok(event_stream(rx))
}

/// POST /api/v1/filter/review
///
/// Reviews the jobs left `pending_review` by earlier runs, without
/// screening anything new.
pub async fn handle_review(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let guard = state.try_begin_run()?;
    let pipeline = state.pipeline.clone();
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let _guard = guard;
        if let Err(e) = pipeline.run_review_only(ProgressSink::new(tx)).await {
            tracing::error!(error = %e, "Review run failed");
        }
    });

    Ok(event_stream(rx))
}

/// POST /api/v1/filter/reset
pub async fn handle_reset(State(state): State<AppState>) -> Result<Json<ResetSummary>, AppError> {
    let _guard = state.try_begin_run()?;
    let summary = state.pipeline.reset().await?;
    Ok(Json(summary))
}

/// GET /api/v1/filter/stats
pub async fn handle_stats(State(state): State<AppState>) -> Result<Json<PipelineStats>, AppError> {
    Ok(Json(state.pipeline.stats().await?))
}

/// GET /api/v1/targets?status=pending|pending_review
///
/// Ranked by priority, then score.
pub async fn handle_list_targets(
    State(state): State<AppState>,
    Query(query): Query<TargetsQuery>,
) -> Result<Json<TargetsResponse>, AppError> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<TargetStatus>)
        .transpose()
        .map_err(AppError::Validation)?;

    let targets = state.pipeline.targets(status).await?;
    Ok(Json(TargetsResponse {
        total: targets.len(),
        targets,
    }))
}
