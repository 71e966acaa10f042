use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A scraped job listing joined with its company name.
/// Only `evaluated` is ever written by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobListing {
    pub id: i64,
    pub company_id: i64,
    pub company_name: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub evaluated: bool,
}

/// TargetJob lifecycle: `PendingReview` awaits the expensive reviewer,
/// `Pending` is a final accept. Rejected jobs have no row at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    PendingReview,
    Pending,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetStatus::PendingReview => "pending_review",
            TargetStatus::Pending => "pending",
        }
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_review" => Ok(TargetStatus::PendingReview),
            "pending" => Ok(TargetStatus::Pending),
            other => Err(format!("unknown target job status '{other}'")),
        }
    }
}

/// Priority 1 = domestic, 3 = foreign but still relevant.
pub const PRIORITY_DOMESTIC: i16 = 1;
pub const PRIORITY_FOREIGN: i16 = 3;

pub fn priority_for(is_foreign: bool) -> i16 {
    if is_foreign {
        PRIORITY_FOREIGN
    } else {
        PRIORITY_DOMESTIC
    }
}

/// Experience requirements extracted by the screening classifier.
/// Stored as JSON in `target_jobs.experience_analysis`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperienceRange {
    pub min_years: Option<f32>,
    pub max_years: Option<f32>,
    pub is_engineering: Option<bool>,
}

/// Insert payload for a new TargetJob (accepted or queued for review).
#[derive(Debug, Clone, PartialEq)]
pub struct NewTargetJob {
    pub job_id: i64,
    pub relevance_score: f64,
    pub match_reason: String,
    pub status: TargetStatus,
    pub priority: i16,
    pub is_intern: bool,
    pub experience: ExperienceRange,
}

/// A `PendingReview` TargetJob joined with the job fields the reviewer needs.
/// Produced either fresh by screening or recovered from the store after a crash.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReviewCandidate {
    pub job_id: i64,
    pub title: String,
    pub company_name: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub relevance_score: f64,
    pub match_reason: String,
    pub priority: i16,
    pub is_intern: bool,
}

impl ReviewCandidate {
    pub fn is_foreign(&self) -> bool {
        self.priority == PRIORITY_FOREIGN
    }
}

/// A ranked TargetJob joined with job and company, for the targets listing.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TargetJobView {
    pub target_id: i64,
    pub job_id: i64,
    pub title: String,
    pub company_name: String,
    pub location: Option<String>,
    pub relevance_score: f64,
    pub match_reason: String,
    pub status: String,
    pub priority: i16,
    pub is_intern: bool,
    pub added_at: DateTime<Utc>,
}

/// Aggregate counts for dashboards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PipelineStats {
    pub jobs_total: i64,
    pub jobs_evaluated: i64,
    pub jobs_unevaluated: i64,
    pub targets_total: i64,
    pub targets_pending: i64,
    pub targets_pending_review: i64,
    pub targets_high_priority: i64,
    pub targets_intern: i64,
}
