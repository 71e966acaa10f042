// Shared prompt constants and prompt-building utilities.
// Each classifier tier defines its own prompt templates in filter/prompts.rs.
// This file contains cross-cutting fragments.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON value. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Instruction appended to every batch prompt so verdicts can be matched back to jobs.
pub const BATCH_ECHO_INSTRUCTION: &str = "\
    Return exactly one verdict per input job, echoing its `job_id` unchanged. \
    Never invent job ids and never merge two jobs into one verdict.";

/// Builds a full system prompt from a role description and the JSON-only fragment.
pub fn system_prompt(role: &str) -> String {
    format!("{role} {JSON_ONLY_SYSTEM}")
}
