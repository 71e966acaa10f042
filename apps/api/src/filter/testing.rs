//! Test doubles for the classifier seam.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::filter::classifier::{
    ClassifyError, Classifier, Decision, FinalDecision, ReviewResult, ScreeningResult,
};
use crate::filter::prefilter::ScreenedJob;
use crate::llm_client::LlmError;
use crate::models::job::{JobListing, ReviewCandidate};
use crate::models::profile::CandidateProfile;

pub fn listing(id: i64, title: &str, location: Option<&str>) -> JobListing {
    JobListing {
        id,
        company_id: 1,
        company_name: "Acme".to_string(),
        title: title.to_string(),
        description: Some(format!("Description for job {id}")),
        location: location.map(String::from),
        evaluated: false,
    }
}

/// Answers from a fixed script. Jobs without a scripted answer are left out
/// of the response, the way a model sometimes skips items.
#[derive(Default)]
pub struct ScriptedClassifier {
    screen_scores: HashMap<i64, f64>,
    review_decisions: HashMap<i64, (bool, Option<f64>)>,
    failing_jobs: HashSet<i64>,
    screen_calls: AtomicUsize,
    review_calls: AtomicUsize,
    reviewed: Mutex<Vec<i64>>,
}

impl ScriptedClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn screen(mut self, job_id: i64, score: f64) -> Self {
        self.screen_scores.insert(job_id, score);
        self
    }

    pub fn review(mut self, job_id: i64, accept: bool) -> Self {
        self.review_decisions.insert(job_id, (accept, None));
        self
    }

    pub fn review_with_score(mut self, job_id: i64, accept: bool, score: f64) -> Self {
        self.review_decisions.insert(job_id, (accept, Some(score)));
        self
    }

    /// Any batch containing `job_id` fails as a whole.
    pub fn fail_batch_containing(mut self, job_id: i64) -> Self {
        self.failing_jobs.insert(job_id);
        self
    }

    /// Appended to every screening response.
    pub fn screen_calls(&self) -> usize {
        self.screen_calls.load(Ordering::SeqCst)
    }

    pub fn review_calls(&self) -> usize {
        self.review_calls.load(Ordering::SeqCst)
    }

    /// Every job id sent to the reviewer, in call order.
    pub fn reviewed_jobs(&self) -> Vec<i64> {
        self.reviewed.lock().unwrap().clone()
    }

    fn check_failure(&self, ids: impl IntoIterator<Item = i64>) -> Result<(), ClassifyError> {
        for id in ids {
            if self.failing_jobs.contains(&id) {
                return Err(ClassifyError::Llm(LlmError::Api {
                    status: 503,
                    message: format!("scripted failure for batch containing job {id}"),
                }));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn screen(&self, batch: &[ScreenedJob]) -> Result<Vec<ScreeningResult>, ClassifyError> {
        self.screen_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure(batch.iter().map(|s| s.job.id))?;

        let results: Vec<ScreeningResult> = batch
            .iter()
            .filter_map(|s| {
                let score = *self.screen_scores.get(&s.job.id)?;
                Some(ScreeningResult {
                    job_id: s.job.id,
                    decision: Some(Decision::for_score(score)),
                    score,
                    reasoning: format!("scripted score {score}"),
                    min_years: Some(0.0),
                    max_years: Some(2.0),
                    is_engineering: Some(true),
                })
            })
            .collect();
        Ok(results)
    }

    async fn review(
        &self,
        batch: &[ReviewCandidate],
        _profile: &CandidateProfile,
    ) -> Result<Vec<ReviewResult>, ClassifyError> {
        self.review_calls.fetch_add(1, Ordering::SeqCst);
        self.reviewed
            .lock()
            .unwrap()
            .extend(batch.iter().map(|c| c.job_id));
        self.check_failure(batch.iter().map(|c| c.job_id))?;

        Ok(batch
            .iter()
            .filter_map(|c| {
                let (accept, score) = *self.review_decisions.get(&c.job_id)?;
                Some(ReviewResult {
                    job_id: c.job_id,
                    decision: if accept {
                        FinalDecision::Accept
                    } else {
                        FinalDecision::Reject
                    },
                    score,
                    reasoning: Some(format!("scripted review of job {}", c.job_id)),
                })
            })
            .collect())
    }
}
