// Prompt templates for the two classifier tiers.
// Shared fragments live in llm_client::prompts.

/// Role line for the cheap screening tier.
pub const SCREENING_ROLE: &str = "You screen job listings for a new graduate software engineer \
    looking for a first full-time role.";

/// Role line for the expensive review tier.
pub const REVIEW_ROLE: &str = "You are a careful career advisor making the final call on \
    borderline job listings for one specific candidate.";

/// Screening prompt. Replace `{jobs_json}` before sending.
pub const SCREENING_PROMPT_TEMPLATE: &str = r#"Evaluate each job below for a new graduate software engineer.

ACCEPT roles that are clearly engineering (software, backend, frontend, full stack, ML, data,
infrastructure, platform, DevOps, security, QA, mobile) and open to candidates with 0-2 years
of experience: titles with "New Grad", "Junior", "Entry Level" or "Associate", or descriptions
asking for 0-2 years.

REJECT roles requiring 3+ years, senior or leadership roles, and non-engineering roles.

Use REVIEW when the title is ambiguous (e.g. plain "Software Engineer") and the description does
not settle the experience level.

SCORING BANDS (the score decides the outcome):
- 0.7 to 1.0: ACCEPT
- 0.5 to 0.69: REVIEW
- 0.0 to 0.49: REJECT

Also extract the experience range the listing asks for.

JOBS:
{jobs_json}

Return a JSON array with one object per job, in this EXACT shape:
[
  {"job_id": 1, "decision": "ACCEPT", "score": 0.9, "reasoning": "New grad backend role",
   "min_years": 0, "max_years": 2, "is_engineering": true}
]
Use null for unknown years."#;

/// Review prompt. Replace `{profile_json}` and `{jobs_json}` before sending.
pub const REVIEW_PROMPT_TEMPLATE: &str = r#"A cheap screening pass could not decide on the jobs below.
Decide, for this candidate, whether each job is worth applying to.

CANDIDATE PROFILE:
{profile_json}

JOBS (with the screening score and reasoning):
{jobs_json}

This decision is final: answer ACCEPT or REJECT only.

Return a JSON array with one object per job, in this EXACT shape:
[
  {"job_id": 1, "decision": "ACCEPT", "score": 0.75, "reasoning": "Matches the candidate's systems background"}
]"#;

/// Descriptions are cut to keep batch prompts within budget.
pub const MAX_DESCRIPTION_CHARS: usize = 1500;

/// Truncates at a char boundary, never panicking on multi-byte UTF-8.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
