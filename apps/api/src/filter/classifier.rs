//! Classification Client: the remote classifier seam.
//!
//! `Classifier` is carried by the pipeline as `Arc<dyn Classifier>`;
//! `LlmClassifier` is the production backend. Stage controllers turn the
//! wire results into typed `Verdict`s, so routing never depends on strings.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filter::prefilter::ScreenedJob;
use crate::filter::prompts::{
    truncate_chars, MAX_DESCRIPTION_CHARS, REVIEW_PROMPT_TEMPLATE, REVIEW_ROLE,
    SCREENING_PROMPT_TEMPLATE, SCREENING_ROLE,
};
use crate::llm_client::prompts::{system_prompt, BATCH_ECHO_INSTRUCTION};
use crate::llm_client::{LlmClient, LlmError};
use crate::models::job::{ExperienceRange, ReviewCandidate};
use crate::models::profile::CandidateProfile;

/// Score at or above which a screening verdict is an accept.
pub const ACCEPT_THRESHOLD: f64 = 0.7;
/// Score at or above which (and below `ACCEPT_THRESHOLD`) a job goes to review.
pub const REVIEW_THRESHOLD: f64 = 0.5;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classifier call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("classifier returned no verdicts for a batch of {0} jobs")]
    Empty(usize),

    #[error("classifier output was malformed: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Cheap,
    Expensive,
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelTier::Cheap => f.write_str("cheap"),
            ModelTier::Expensive => f.write_str("expensive"),
        }
    }
}

/// Three-way screening outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Accept,
    Review,
    Reject,
}

impl Decision {
    /// Case-insensitive `ACCEPT` / `REVIEW` / `REJECT`; anything else is `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "ACCEPT" => Some(Decision::Accept),
            "REVIEW" => Some(Decision::Review),
            "REJECT" => Some(Decision::Reject),
            _ => None,
        }
    }

    /// Maps a score onto the screening bands:
    /// `>= 0.7` accept, `[0.5, 0.7)` review, `< 0.5` reject.
    pub fn for_score(score: f64) -> Self {
        if score >= ACCEPT_THRESHOLD {
            Decision::Accept
        } else if score >= REVIEW_THRESHOLD {
            Decision::Review
        } else {
            Decision::Reject
        }
    }
}

/// Binary reviewer outcome; there is no further deferral after review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinalDecision {
    #[serde(rename = "ACCEPT", alias = "accept", alias = "Accept")]
    Accept,
    #[serde(rename = "REJECT", alias = "reject", alias = "Reject")]
    Reject,
}

/// Wire shape of one screening result. The label is advisory, so an
/// unrecognised one is read as absent instead of failing the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningResult {
    pub job_id: i64,
    #[serde(default, deserialize_with = "advisory_label")]
    pub decision: Option<Decision>,
    pub score: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub min_years: Option<f32>,
    #[serde(default)]
    pub max_years: Option<f32>,
    #[serde(default)]
    pub is_engineering: Option<bool>,
}

fn advisory_label<'de, D>(deserializer: D) -> Result<Option<Decision>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(|v| v.as_str()).and_then(Decision::from_label))
}

/// Wire shape of one review result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResult {
    pub job_id: i64,
    pub decision: FinalDecision,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// Typed payload shared by every screening verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub score: f64,
    pub reasoning: String,
    pub experience: ExperienceRange,
}

/// A screening verdict, constructed once by the Stage 1 controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accept(Assessment),
    Review(Assessment),
    Reject(Assessment),
}

impl Verdict {
    /// Builds the verdict from the score bands.
    pub fn from_assessment(assessment: Assessment) -> Self {
        match Decision::for_score(assessment.score) {
            Decision::Accept => Verdict::Accept(assessment),
            Decision::Review => Verdict::Review(assessment),
            Decision::Reject => Verdict::Reject(assessment),
        }
    }

    pub fn decision(&self) -> Decision {
        match self {
            Verdict::Accept(_) => Decision::Accept,
            Verdict::Review(_) => Decision::Review,
            Verdict::Reject(_) => Decision::Reject,
        }
    }
}

/// A routed screening result for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenVerdict {
    pub job_id: i64,
    pub verdict: Verdict,
}

impl From<&ScreeningResult> for Assessment {
    fn from(result: &ScreeningResult) -> Self {
        Assessment {
            score: result.score,
            reasoning: result.reasoning.clone(),
            experience: ExperienceRange {
                min_years: result.min_years,
                max_years: result.max_years,
                is_engineering: result.is_engineering,
            },
        }
    }
}

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Cheap tier: one result per job in `batch`.
    async fn screen(&self, batch: &[ScreenedJob]) -> Result<Vec<ScreeningResult>, ClassifyError>;

    /// Expensive tier, with the candidate profile as context.
    async fn review(
        &self,
        batch: &[ReviewCandidate],
        profile: &CandidateProfile,
    ) -> Result<Vec<ReviewResult>, ClassifyError>;
}

#[derive(Serialize)]
struct ScreeningInput<'a> {
    job_id: i64,
    title: &'a str,
    company: &'a str,
    location: Option<&'a str>,
    description: Option<&'a str>,
}

#[derive(Serialize)]
struct ReviewInput<'a> {
    job_id: i64,
    title: &'a str,
    company: &'a str,
    location: Option<&'a str>,
    description: Option<&'a str>,
    screening_score: f64,
    screening_reasoning: &'a str,
    is_intern: bool,
    is_foreign: bool,
}

pub fn build_screening_prompt(batch: &[ScreenedJob]) -> Result<String, ClassifyError> {
    let inputs: Vec<ScreeningInput<'_>> = batch
        .iter()
        .map(|s| ScreeningInput {
            job_id: s.job.id,
            title: &s.job.title,
            company: &s.job.company_name,
            location: s.job.location.as_deref(),
            description: s
                .job
                .description
                .as_deref()
                .map(|d| truncate_chars(d, MAX_DESCRIPTION_CHARS)),
        })
        .collect();
    let jobs_json = serde_json::to_string_pretty(&inputs)
        .map_err(|e| ClassifyError::Malformed(format!("could not encode batch: {e}")))?;
    Ok(format!(
        "{}\n\n{BATCH_ECHO_INSTRUCTION}",
        SCREENING_PROMPT_TEMPLATE.replace("{jobs_json}", &jobs_json)
    ))
}

pub fn build_review_prompt(
    batch: &[ReviewCandidate],
    profile: &CandidateProfile,
) -> Result<String, ClassifyError> {
    let inputs: Vec<ReviewInput<'_>> = batch
        .iter()
        .map(|c| ReviewInput {
            job_id: c.job_id,
            title: &c.title,
            company: &c.company_name,
            location: c.location.as_deref(),
            description: c
                .description
                .as_deref()
                .map(|d| truncate_chars(d, MAX_DESCRIPTION_CHARS)),
            screening_score: c.relevance_score,
            screening_reasoning: &c.match_reason,
            is_intern: c.is_intern,
            is_foreign: c.is_foreign(),
        })
        .collect();
    let encode = |e: serde_json::Error| ClassifyError::Malformed(format!("could not encode batch: {e}"));
    let jobs_json = serde_json::to_string_pretty(&inputs).map_err(encode)?;
    let profile_json = serde_json::to_string_pretty(profile).map_err(encode)?;
    Ok(format!(
        "{}\n\n{BATCH_ECHO_INSTRUCTION}",
        REVIEW_PROMPT_TEMPLATE
            .replace("{profile_json}", &profile_json)
            .replace("{jobs_json}", &jobs_json)
    ))
}

/// Production classifier: both tiers go through the shared `LlmClient`.
#[derive(Clone)]
pub struct LlmClassifier {
    llm: LlmClient,
    cheap_model: String,
    expensive_model: String,
}

impl LlmClassifier {
    pub fn new(llm: LlmClient, cheap_model: String, expensive_model: String) -> Self {
        Self {
            llm,
            cheap_model,
            expensive_model,
        }
    }

    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Cheap => &self.cheap_model,
            ModelTier::Expensive => &self.expensive_model,
        }
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn screen(&self, batch: &[ScreenedJob]) -> Result<Vec<ScreeningResult>, ClassifyError> {
        let prompt = build_screening_prompt(batch)?;
        let results: Vec<ScreeningResult> = self
            .llm
            .call_json(
                self.model_for(ModelTier::Cheap),
                &prompt,
                &system_prompt(SCREENING_ROLE),
            )
            .await?;
        Ok(results)
    }

    async fn review(
        &self,
        batch: &[ReviewCandidate],
        profile: &CandidateProfile,
    ) -> Result<Vec<ReviewResult>, ClassifyError> {
        let prompt = build_review_prompt(batch, profile)?;
        let results: Vec<ReviewResult> = self
            .llm
            .call_json(
                self.model_for(ModelTier::Expensive),
                &prompt,
                &system_prompt(REVIEW_ROLE),
            )
            .await?;
        Ok(results)
    }
}
