use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::errors::AppError;
use crate::filter::FilterPipeline;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: FilterPipeline,
    /// Held for the whole of a run or reset. Two overlapping runs would
    /// fetch the same unevaluated jobs.
    pub run_guard: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(pipeline: FilterPipeline) -> Self {
        Self {
            pipeline,
            run_guard: Arc::new(Mutex::new(())),
        }
    }

    pub fn try_begin_run(&self) -> Result<OwnedMutexGuard<()>, AppError> {
        Arc::clone(&self.run_guard)
            .try_lock_owned()
            .map_err(|_| AppError::Conflict("a filter run is already in progress".to_string()))
    }
}
