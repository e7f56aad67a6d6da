// Shared prompt constants and prompt-building utilities.
// Each service that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Appended to every rewrite prompt. The generator rephrases; it never supplies facts.
pub const NO_FABRICATION_INSTRUCTION: &str = "\
    CRITICAL: Use only facts already present in the section content or stated in the \
    user's answer. Do NOT invent numbers, employers, dates, tools, or outcomes. \
    If the problem cannot be fixed without new facts, return the content unchanged \
    with a confidence below 0.5.";

/// Builds a full system prompt from a role line plus the JSON-only fragment.
pub fn json_system(role: &str) -> String {
    format!("{role} {JSON_ONLY_SYSTEM}")
}
