//! In-memory `JobStore` for tests. One mutex guards all state, so every
//! commit is atomic with respect to readers.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::models::job::{
    JobListing, NewTargetJob, PipelineStats, ReviewCandidate, TargetJobView, TargetStatus,
    PRIORITY_DOMESTIC,
};
use crate::store::{
    FinalizeOutcome, JobStore, ReviewCommitSummary, ReviewDecision, ScreeningCommit, StoreError,
};

/// Stored shape of one `target_jobs` row.
#[derive(Debug, Clone)]
pub struct TargetJobRow {
    pub id: i64,
    pub job_id: i64,
    pub relevance_score: f64,
    pub match_reason: String,
    pub status: String,
    pub priority: i16,
    pub is_intern: bool,
    pub experience_analysis: Option<Value>,
    pub added_at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    jobs: BTreeMap<i64, JobListing>,
    targets: BTreeMap<i64, TargetJobRow>,
    next_target_id: i64,
    poisoned: HashSet<i64>,
    reads_fail: bool,
}

impl State {
    fn check_poison(&self, job_ids: impl IntoIterator<Item = i64>) -> Result<(), StoreError> {
        for id in job_ids {
            if self.poisoned.contains(&id) {
                return Err(sqlx::Error::PoolClosed.into());
            }
        }
        Ok(())
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.reads_fail {
            return Err(sqlx::Error::PoolTimedOut.into());
        }
        Ok(())
    }

    fn insert(&mut self, job: &NewTargetJob) -> Result<bool, StoreError> {
        if self.targets.contains_key(&job.job_id) {
            return Ok(false);
        }
        self.next_target_id += 1;
        let row = TargetJobRow {
            id: self.next_target_id,
            job_id: job.job_id,
            relevance_score: job.relevance_score,
            match_reason: job.match_reason.clone(),
            status: job.status.as_str().to_string(),
            priority: job.priority,
            is_intern: job.is_intern,
            experience_analysis: Some(serde_json::to_value(&job.experience)?),
            added_at: Utc::now(),
        };
        self.targets.insert(job.job_id, row);
        Ok(true)
    }

    fn mark(&mut self, job_ids: &[i64]) -> u64 {
        let mut marked = 0;
        for id in job_ids {
            if let Some(job) = self.jobs.get_mut(id) {
                if !job.evaluated {
                    job.evaluated = true;
                    marked += 1;
                }
            }
        }
        marked
    }

    fn finalize(&mut self, decision: &ReviewDecision) -> FinalizeOutcome {
        let pending_review = TargetStatus::PendingReview.as_str();
        match self.targets.get_mut(&decision.job_id) {
            Some(row) if row.status == pending_review => {
                if decision.accept {
                    row.status = TargetStatus::Pending.as_str().to_string();
                    if let Some(score) = decision.score {
                        row.relevance_score = score;
                    }
                    if let Some(reason) = &decision.reason {
                        row.match_reason = reason.clone();
                    }
                    FinalizeOutcome::Accepted
                } else {
                    self.targets.remove(&decision.job_id);
                    FinalizeOutcome::Deleted
                }
            }
            _ => FinalizeOutcome::NotPending,
        }
    }
}

#[derive(Default)]
pub struct InMemoryJobStore {
    state: Mutex<State>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jobs(jobs: impl IntoIterator<Item = JobListing>) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.lock().unwrap();
            for job in jobs {
                state.jobs.insert(job.id, job);
            }
        }
        store
    }

    /// Any write that touches `job_id` fails from now on.
    pub fn poison_job(&self, job_id: i64) {
        self.state.lock().unwrap().poisoned.insert(job_id);
    }

    /// Every fetch fails from now on.
    pub fn fail_reads(&self) {
        self.state.lock().unwrap().reads_fail = true;
    }

    pub fn job(&self, job_id: i64) -> Option<JobListing> {
        self.state.lock().unwrap().jobs.get(&job_id).cloned()
    }

    pub fn target(&self, job_id: i64) -> Option<TargetJobRow> {
        self.state.lock().unwrap().targets.get(&job_id).cloned()
    }

    pub fn targets(&self) -> Vec<TargetJobRow> {
        self.state.lock().unwrap().targets.values().cloned().collect()
    }

    pub fn count_status(&self, status: TargetStatus) -> usize {
        self.state
            .lock()
            .unwrap()
            .targets
            .values()
            .filter(|t| t.status == status.as_str())
            .count()
    }

    pub fn evaluated_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .jobs
            .values()
            .filter(|j| j.evaluated)
            .count()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn fetch_unevaluated(&self, limit: Option<i64>) -> Result<Vec<JobListing>, StoreError> {
        let state = self.state.lock().unwrap();
        state.check_reads()?;
        let unevaluated = state.jobs.values().filter(|j| !j.evaluated).cloned();
        Ok(match limit {
            Some(limit) => unevaluated.take(limit.max(0) as usize).collect(),
            None => unevaluated.collect(),
        })
    }

    async fn fetch_pending_review(&self) -> Result<Vec<ReviewCandidate>, StoreError> {
        let state = self.state.lock().unwrap();
        state.check_reads()?;
        let pending_review = TargetStatus::PendingReview.as_str();
        let mut out = Vec::new();
        for row in state.targets.values().filter(|t| t.status == pending_review) {
            let job = state
                .jobs
                .get(&row.job_id)
                .ok_or_else(|| StoreError::Corrupt(format!("target without job {}", row.job_id)))?;
            out.push(ReviewCandidate {
                job_id: row.job_id,
                title: job.title.clone(),
                company_name: job.company_name.clone(),
                location: job.location.clone(),
                description: job.description.clone(),
                relevance_score: row.relevance_score,
                match_reason: row.match_reason.clone(),
                priority: row.priority,
                is_intern: row.is_intern,
            });
        }
        Ok(out)
    }

    async fn mark_evaluated(&self, job_ids: &[i64]) -> Result<u64, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.check_poison(job_ids.iter().copied())?;
        Ok(state.mark(job_ids))
    }

    async fn insert_target_job(&self, job: &NewTargetJob) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.check_poison([job.job_id])?;
        state.insert(job)
    }

    async fn finalize_review_job(
        &self,
        decision: &ReviewDecision,
    ) -> Result<FinalizeOutcome, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.check_poison([decision.job_id])?;
        Ok(state.finalize(decision))
    }

    async fn commit_screening(&self, commit: &ScreeningCommit) -> Result<Vec<i64>, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.check_poison(
            commit
                .targets
                .iter()
                .map(|t| t.job_id)
                .chain(commit.evaluated.iter().copied()),
        )?;
        let mut inserted = Vec::new();
        for target in &commit.targets {
            if state.insert(target)? {
                inserted.push(target.job_id);
            }
        }
        state.mark(&commit.evaluated);
        Ok(inserted)
    }

    async fn commit_reviews(
        &self,
        decisions: &[ReviewDecision],
    ) -> Result<ReviewCommitSummary, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.check_poison(decisions.iter().map(|d| d.job_id))?;
        let mut summary = ReviewCommitSummary::default();
        for decision in decisions {
            summary.record(state.finalize(decision));
        }
        Ok(summary)
    }

    async fn reset_evaluated(&self) -> Result<u64, StoreError> {
        let mut state = self.state.lock().unwrap();
        let mut reset = 0;
        for job in state.jobs.values_mut().filter(|j| j.evaluated) {
            job.evaluated = false;
            reset += 1;
        }
        Ok(reset)
    }

    async fn clear_target_jobs(&self) -> Result<u64, StoreError> {
        let mut state = self.state.lock().unwrap();
        let cleared = state.targets.len() as u64;
        state.targets.clear();
        Ok(cleared)
    }

    async fn stats(&self) -> Result<PipelineStats, StoreError> {
        let state = self.state.lock().unwrap();
        let count = |status: TargetStatus| {
            state
                .targets
                .values()
                .filter(|t| t.status == status.as_str())
                .count() as i64
        };
        let jobs_evaluated = state.jobs.values().filter(|j| j.evaluated).count() as i64;
        Ok(PipelineStats {
            jobs_total: state.jobs.len() as i64,
            jobs_evaluated,
            jobs_unevaluated: state.jobs.len() as i64 - jobs_evaluated,
            targets_total: state.targets.len() as i64,
            targets_pending: count(TargetStatus::Pending),
            targets_pending_review: count(TargetStatus::PendingReview),
            targets_high_priority: state
                .targets
                .values()
                .filter(|t| t.priority == PRIORITY_DOMESTIC)
                .count() as i64,
            targets_intern: state.targets.values().filter(|t| t.is_intern).count() as i64,
        })
    }

    async fn list_targets(
        &self,
        status: Option<TargetStatus>,
    ) -> Result<Vec<TargetJobView>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut views: Vec<TargetJobView> = state
            .targets
            .values()
            .filter(|t| status.map_or(true, |s| t.status == s.as_str()))
            .filter_map(|t| {
                state.jobs.get(&t.job_id).map(|job| TargetJobView {
                    target_id: t.id,
                    job_id: t.job_id,
                    title: job.title.clone(),
                    company_name: job.company_name.clone(),
                    location: job.location.clone(),
                    relevance_score: t.relevance_score,
                    match_reason: t.match_reason.clone(),
                    status: t.status.clone(),
                    priority: t.priority,
                    is_intern: t.is_intern,
                    added_at: t.added_at,
                })
            })
            .collect();
        views.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(b.relevance_score.total_cmp(&a.relevance_score))
                .then(a.job_id.cmp(&b.job_id))
        });
        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::ExperienceRange;

    fn listing(id: i64, title: &str) -> JobListing {
        JobListing {
            id,
            company_id: 1,
            company_name: "Acme".to_string(),
            title: title.to_string(),
            description: None,
            location: Some("Austin, TX".to_string()),
            evaluated: false,
        }
    }

    fn new_target(job_id: i64, status: TargetStatus, score: f64, priority: i16) -> NewTargetJob {
        NewTargetJob {
            job_id,
            relevance_score: score,
            match_reason: "fits".to_string(),
            status,
            priority,
            is_intern: false,
            experience: ExperienceRange::default(),
        }
    }

    #[tokio::test]
    async fn test_insert_target_job_twice_yields_one_row() {
        let store = InMemoryJobStore::with_jobs([listing(1, "Software Engineer, New Grad")]);
        let target = new_target(1, TargetStatus::Pending, 0.9, 1);

        assert!(store.insert_target_job(&target).await.unwrap());
        assert!(!store.insert_target_job(&target).await.unwrap());
        assert_eq!(store.targets().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_review_job_forces_pending_review() {
        let store = InMemoryJobStore::with_jobs([listing(1, "Junior Engineer")]);
        let target = new_target(1, TargetStatus::Pending, 0.6, 1);

        store.insert_review_job(&target).await.unwrap();
        assert_eq!(store.target(1).unwrap().status, "pending_review");
        assert_eq!(store.fetch_pending_review().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_evaluated_is_idempotent() {
        let store = InMemoryJobStore::with_jobs([listing(1, "a"), listing(2, "b")]);
        assert_eq!(store.mark_evaluated(&[1, 2]).await.unwrap(), 2);
        assert_eq!(store.mark_evaluated(&[1, 2]).await.unwrap(), 0);
        assert!(store.fetch_unevaluated(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_finalize_accept_then_reject_keeps_accepted_row() {
        let store = InMemoryJobStore::with_jobs([listing(1, "Associate Engineer")]);
        store
            .insert_review_job(&new_target(1, TargetStatus::PendingReview, 0.6, 1))
            .await
            .unwrap();

        let accept = ReviewDecision {
            job_id: 1,
            accept: true,
            score: Some(0.85),
            reason: Some("strong backend match".to_string()),
        };
        assert_eq!(
            store.finalize_review_job(&accept).await.unwrap(),
            FinalizeOutcome::Accepted
        );
        // A stale reject retried after the accept must not remove the row.
        let stale_reject = ReviewDecision {
            accept: false,
            ..accept.clone()
        };
        assert_eq!(
            store.finalize_review_job(&stale_reject).await.unwrap(),
            FinalizeOutcome::NotPending
        );
        let row = store.target(1).unwrap();
        assert_eq!(row.status, "pending");
        assert_eq!(row.relevance_score, 0.85);
        assert_eq!(row.match_reason, "strong backend match");
    }

    #[tokio::test]
    async fn test_finalize_reject_deletes_row() {
        let store = InMemoryJobStore::with_jobs([listing(1, "Associate Engineer")]);
        store
            .insert_review_job(&new_target(1, TargetStatus::PendingReview, 0.6, 1))
            .await
            .unwrap();
        let reject = ReviewDecision {
            job_id: 1,
            accept: false,
            score: None,
            reason: None,
        };
        assert_eq!(
            store.finalize_review_job(&reject).await.unwrap(),
            FinalizeOutcome::Deleted
        );
        assert!(store.target(1).is_none());
        assert_eq!(
            store.finalize_review_job(&reject).await.unwrap(),
            FinalizeOutcome::NotPending
        );
    }

    #[tokio::test]
    async fn test_poisoned_commit_writes_nothing() {
        let store = InMemoryJobStore::with_jobs([listing(1, "a"), listing(2, "b")]);
        store.poison_job(2);
        let commit = ScreeningCommit {
            targets: vec![new_target(1, TargetStatus::Pending, 0.9, 1)],
            evaluated: vec![1, 2],
        };
        assert!(store.commit_screening(&commit).await.is_err());
        assert!(store.targets().is_empty());
        assert_eq!(store.evaluated_count(), 0);
    }

    #[tokio::test]
    async fn test_commit_screening_reports_only_new_rows() {
        let store = InMemoryJobStore::with_jobs([listing(1, "a"), listing(2, "b")]);
        store
            .insert_target_job(&new_target(1, TargetStatus::Pending, 0.9, 1))
            .await
            .unwrap();
        let commit = ScreeningCommit {
            targets: vec![
                new_target(1, TargetStatus::PendingReview, 0.6, 1),
                new_target(2, TargetStatus::PendingReview, 0.6, 1),
            ],
            evaluated: vec![1, 2],
        };

        assert_eq!(store.commit_screening(&commit).await.unwrap(), vec![2]);
        assert_eq!(store.target(1).unwrap().status, "pending");
        assert!(store.target(2).unwrap().experience_analysis.is_some());
        assert_eq!(store.evaluated_count(), 2);
    }

    #[tokio::test]
    async fn test_list_targets_ranks_by_priority_then_score() {
        let store = InMemoryJobStore::with_jobs([listing(1, "a"), listing(2, "b"), listing(3, "c")]);
        store
            .insert_target_job(&new_target(1, TargetStatus::Pending, 0.95, 3))
            .await
            .unwrap();
        store
            .insert_target_job(&new_target(2, TargetStatus::Pending, 0.75, 1))
            .await
            .unwrap();
        store
            .insert_target_job(&new_target(3, TargetStatus::Pending, 0.9, 1))
            .await
            .unwrap();

        let ranked: Vec<i64> = store
            .list_targets(Some(TargetStatus::Pending))
            .await
            .unwrap()
            .iter()
            .map(|t| t.job_id)
            .collect();
        assert_eq!(ranked, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_reset_and_clear() {
        let store = InMemoryJobStore::with_jobs([listing(1, "a"), listing(2, "b")]);
        store.mark_evaluated(&[1, 2]).await.unwrap();
        store
            .insert_target_job(&new_target(1, TargetStatus::Pending, 0.9, 1))
            .await
            .unwrap();

        assert_eq!(store.reset_evaluated().await.unwrap(), 2);
        assert_eq!(store.clear_target_jobs().await.unwrap(), 1);
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.jobs_unevaluated, 2);
        assert_eq!(stats.targets_total, 0);
    }
}
