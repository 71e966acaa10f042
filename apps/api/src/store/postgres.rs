//! Postgres-backed `JobStore`.
//!
//! Expected schema (provisioned outside this service):
//!
//! ```sql
//! companies   (id BIGSERIAL PRIMARY KEY, name TEXT NOT NULL UNIQUE)
//! jobs        (id BIGSERIAL PRIMARY KEY, company_id BIGINT NOT NULL REFERENCES companies(id),
//!              job_title TEXT NOT NULL, job_description TEXT, location TEXT,
//!              evaluated BOOLEAN NOT NULL DEFAULT FALSE)
//! target_jobs (id BIGSERIAL PRIMARY KEY, job_id BIGINT NOT NULL UNIQUE REFERENCES jobs(id),
//!              relevance_score DOUBLE PRECISION NOT NULL, match_reason TEXT NOT NULL,
//!              status TEXT NOT NULL, priority SMALLINT NOT NULL DEFAULT 1,
//!              is_intern BOOLEAN NOT NULL DEFAULT FALSE, experience_analysis JSONB,
//!              added_at TIMESTAMPTZ NOT NULL DEFAULT now())
//! ```

use async_trait::async_trait;
use sqlx::{PgExecutor, PgPool};
use tracing::debug;

use crate::models::job::{
    JobListing, NewTargetJob, PipelineStats, ReviewCandidate, TargetJobView, TargetStatus,
};
use crate::store::{
    FinalizeOutcome, JobStore, ReviewCommitSummary, ReviewDecision, ScreeningCommit, StoreError,
};

#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn insert_target<'e, E: PgExecutor<'e>>(
    executor: E,
    job: &NewTargetJob,
) -> Result<bool, StoreError> {
    let experience = serde_json::to_value(&job.experience)?;
    let result = sqlx::query(
        r#"
        INSERT INTO target_jobs
            (job_id, relevance_score, match_reason, status, priority, is_intern, experience_analysis)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (job_id) DO NOTHING
        "#,
    )
    .bind(job.job_id)
    .bind(job.relevance_score)
    .bind(&job.match_reason)
    .bind(job.status.as_str())
    .bind(job.priority)
    .bind(job.is_intern)
    .bind(experience)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn mark_jobs_evaluated<'e, E: PgExecutor<'e>>(
    executor: E,
    job_ids: &[i64],
) -> Result<u64, StoreError> {
    if job_ids.is_empty() {
        return Ok(0);
    }
    let result =
        sqlx::query("UPDATE jobs SET evaluated = TRUE WHERE id = ANY($1) AND evaluated = FALSE")
            .bind(job_ids)
            .execute(executor)
            .await?;
    Ok(result.rows_affected())
}

async fn finalize<'e, E: PgExecutor<'e>>(
    executor: E,
    decision: &ReviewDecision,
) -> Result<FinalizeOutcome, StoreError> {
    if decision.accept {
        let result = sqlx::query(
            r#"
            UPDATE target_jobs
            SET status = $2,
                relevance_score = COALESCE($3, relevance_score),
                match_reason = COALESCE($4, match_reason)
            WHERE job_id = $1 AND status = $5
            "#,
        )
        .bind(decision.job_id)
        .bind(TargetStatus::Pending.as_str())
        .bind(decision.score)
        .bind(decision.reason.as_deref())
        .bind(TargetStatus::PendingReview.as_str())
        .execute(executor)
        .await?;
        Ok(if result.rows_affected() > 0 {
            FinalizeOutcome::Accepted
        } else {
            FinalizeOutcome::NotPending
        })
    } else {
        let result = sqlx::query("DELETE FROM target_jobs WHERE job_id = $1 AND status = $2")
            .bind(decision.job_id)
            .bind(TargetStatus::PendingReview.as_str())
            .execute(executor)
            .await?;
        Ok(if result.rows_affected() > 0 {
            FinalizeOutcome::Deleted
        } else {
            FinalizeOutcome::NotPending
        })
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn fetch_unevaluated(&self, limit: Option<i64>) -> Result<Vec<JobListing>, StoreError> {
        let jobs = sqlx::query_as::<_, JobListing>(
            r#"
            SELECT j.id, j.company_id, c.name AS company_name, j.job_title AS title,
                   j.job_description AS description, j.location, j.evaluated
            FROM jobs j
            JOIN companies c ON c.id = j.company_id
            WHERE j.evaluated = FALSE
            ORDER BY j.id
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn fetch_pending_review(&self) -> Result<Vec<ReviewCandidate>, StoreError> {
        let rows = sqlx::query_as::<_, ReviewCandidate>(
            r#"
            SELECT t.job_id, j.job_title AS title, c.name AS company_name, j.location,
                   j.job_description AS description, t.relevance_score, t.match_reason,
                   t.priority, t.is_intern
            FROM target_jobs t
            JOIN jobs j ON j.id = t.job_id
            JOIN companies c ON c.id = j.company_id
            WHERE t.status = $1
            ORDER BY t.job_id
            "#,
        )
        .bind(TargetStatus::PendingReview.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn mark_evaluated(&self, job_ids: &[i64]) -> Result<u64, StoreError> {
        mark_jobs_evaluated(&self.pool, job_ids).await
    }

    async fn insert_target_job(&self, job: &NewTargetJob) -> Result<bool, StoreError> {
        insert_target(&self.pool, job).await
    }

    async fn finalize_review_job(
        &self,
        decision: &ReviewDecision,
    ) -> Result<FinalizeOutcome, StoreError> {
        finalize(&self.pool, decision).await
    }

    async fn commit_screening(&self, commit: &ScreeningCommit) -> Result<Vec<i64>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(commit.targets.len());
        for target in &commit.targets {
            if insert_target(&mut *tx, target).await? {
                inserted.push(target.job_id);
            }
        }
        // Evaluated flag flips only together with the decisions above.
        let marked = mark_jobs_evaluated(&mut *tx, &commit.evaluated).await?;
        tx.commit().await?;
        debug!(inserted = inserted.len(), marked, "Committed screening batch");
        Ok(inserted)
    }

    async fn commit_reviews(
        &self,
        decisions: &[ReviewDecision],
    ) -> Result<ReviewCommitSummary, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut summary = ReviewCommitSummary::default();
        for decision in decisions {
            summary.record(finalize(&mut *tx, decision).await?);
        }
        tx.commit().await?;
        Ok(summary)
    }

    async fn reset_evaluated(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE jobs SET evaluated = FALSE WHERE evaluated = TRUE")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn clear_target_jobs(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM target_jobs")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn stats(&self) -> Result<PipelineStats, StoreError> {
        let stats = sqlx::query_as::<_, PipelineStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM jobs) AS jobs_total,
                (SELECT COUNT(*) FROM jobs WHERE evaluated) AS jobs_evaluated,
                (SELECT COUNT(*) FROM jobs WHERE NOT evaluated) AS jobs_unevaluated,
                (SELECT COUNT(*) FROM target_jobs) AS targets_total,
                (SELECT COUNT(*) FROM target_jobs WHERE status = $1) AS targets_pending,
                (SELECT COUNT(*) FROM target_jobs WHERE status = $2) AS targets_pending_review,
                (SELECT COUNT(*) FROM target_jobs WHERE priority = 1) AS targets_high_priority,
                (SELECT COUNT(*) FROM target_jobs WHERE is_intern) AS targets_intern
            "#,
        )
        .bind(TargetStatus::Pending.as_str())
        .bind(TargetStatus::PendingReview.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }

    async fn list_targets(
        &self,
        status: Option<TargetStatus>,
    ) -> Result<Vec<TargetJobView>, StoreError> {
        let rows = sqlx::query_as::<_, TargetJobView>(
            r#"
            SELECT t.id AS target_id, t.job_id, j.job_title AS title, c.name AS company_name,
                   j.location, t.relevance_score, t.match_reason, t.status, t.priority,
                   t.is_intern, t.added_at
            FROM target_jobs t
            JOIN jobs j ON j.id = t.job_id
            JOIN companies c ON c.id = j.company_id
            WHERE ($1::TEXT IS NULL OR t.status = $1)
            ORDER BY t.priority ASC, t.relevance_score DESC, t.job_id ASC
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        for row in &rows {
            row.status
                .parse::<TargetStatus>()
                .map_err(StoreError::Corrupt)?;
        }
        Ok(rows)
    }
}
