// All LLM prompt constants for the Generation module.
// Reuses cross-cutting fragments from llm_client::prompts.

/// Role line for section rewrites; combined with the JSON-only fragment.
pub const FIX_ROLE: &str = "You are an expert resume editor fixing one specific problem \
    in one resume section.";

/// Section fix prompt template.
/// Replace: {no_fabrication}, {section}, {category}, {problem}, {content},
///          {rejected}, {answer}
pub const FIX_PROMPT_TEMPLATE: &str = r#"{no_fabrication}

SECTION: {section}

PROBLEM ({category}): {problem}

CURRENT CONTENT:
{content}

PREVIOUSLY REJECTED REWRITES (do NOT repeat any of these):
{rejected}

USER-PROVIDED FACTS (authoritative; use them verbatim where relevant):
{answer}

Rewrite the section so the problem no longer applies. Keep every other fact and the
existing bullet structure. Return a JSON object with this EXACT schema:
{
  "content": "the full rewritten section text",
  "confidence": 0.85
}

`confidence` is 0.0 – 1.0: how sure you are the rewrite fixes the problem without
inventing anything."#;

/// Role line for job description parsing.
pub const JOB_REQUIREMENTS_ROLE: &str = "You are an expert job description analyst. \
    Extract the skills and keywords an applicant tracking system would screen for.";

/// Job requirement extraction prompt. Replace `{jd_text}` before sending.
pub const JOB_REQUIREMENTS_PROMPT_TEMPLATE: &str = r#"Extract the screening keywords from the following job description.

Return a JSON object with this EXACT schema (no extra fields):
{
  "requirements": [
    {"keyword": "Rust", "weight": 0.9, "required": true},
    {"keyword": "Kafka", "weight": 0.4, "required": false}
  ]
}

Rules:
- `keyword` is a short skill, tool, or concept as it would appear on a resume (1–4 words).
- `required` is true for must-haves ("required", "must have", minimum years), false for
  nice-to-haves ("preferred", "bonus", "nice to have", "a plus").
- `weight` is 0.0 – 1.0: how central the keyword is to the role. Title and
  requirements-section keywords weigh more than company boilerplate.
- No duplicates.

JOB DESCRIPTION:
{jd_text}"#;
