//! JD Parser — extracts weighted `JobRequirement`s from a raw job description.
//!
//! The LLM path returns semantic keywords; the heuristic path reads explicit
//! "Required:" / "Nice to have:" markers and is used when no API key is set.

use std::collections::HashMap;

use serde::Deserialize;

use crate::errors::AppError;
use crate::generation::prompts::{JOB_REQUIREMENTS_PROMPT_TEMPLATE, JOB_REQUIREMENTS_ROLE};
use crate::llm_client::prompts::json_system;
use crate::llm_client::LlmClient;
use crate::models::job::{JobRequirement, RequirementLevel};

const REQUIRED_WEIGHT: f32 = 1.0;
const PREFERRED_WEIGHT: f32 = 0.5;
/// Longer fragments are prose, not keywords.
const MAX_KEYWORD_WORDS: usize = 4;

const MARKERS: &[(&str, RequirementLevel)] = &[
    ("requirements:", RequirementLevel::Required),
    ("required:", RequirementLevel::Required),
    ("must have:", RequirementLevel::Required),
    ("must-have:", RequirementLevel::Required),
    ("qualifications:", RequirementLevel::Required),
    ("preferred:", RequirementLevel::Preferred),
    ("nice to have:", RequirementLevel::Preferred),
    ("nice-to-have:", RequirementLevel::Preferred),
    ("bonus:", RequirementLevel::Preferred),
];

const TRAILING_NOISE: &[&str] = &[
    "is a plus",
    "a plus",
    "plus",
    "required",
    "preferred",
    "experience",
    "expertise",
    "knowledge",
    "skills",
];

const LEADING_NOISE: &[&str] = &[
    "and ",
    "or ",
    "experience with ",
    "experience in ",
    "knowledge of ",
    "proficiency in ",
    "familiarity with ",
];

#[derive(Debug, Deserialize)]
struct LlmRequirements {
    requirements: Vec<LlmRequirement>,
}

#[derive(Debug, Deserialize)]
struct LlmRequirement {
    keyword: String,
    weight: f32,
    #[serde(default = "default_required")]
    required: bool,
}

fn default_required() -> bool {
    true
}

/// Parses a job description with the LLM.
pub async fn parse_job_description(
    jd_text: &str,
    llm: &LlmClient,
) -> Result<Vec<JobRequirement>, AppError> {
    let prompt = JOB_REQUIREMENTS_PROMPT_TEMPLATE.replace("{jd_text}", jd_text);
    let parsed: LlmRequirements = llm
        .call_json(&prompt, &json_system(JOB_REQUIREMENTS_ROLE))
        .await
        .map_err(|e| AppError::Llm(format!("Job description parsing failed: {e}")))?;

    let requirements = parsed
        .requirements
        .into_iter()
        .filter(|r| !r.keyword.trim().is_empty())
        .map(|r| {
            let weight = r.weight.clamp(0.0, 1.0);
            if r.required {
                JobRequirement::required(r.keyword.trim(), weight)
            } else {
                JobRequirement::preferred(r.keyword.trim(), weight)
            }
        })
        .collect();
    Ok(merge_requirements(requirements))
}

/// Marker-driven extraction. A marker applies to the rest of its line and,
/// when it ends the line, to the bullet lines that follow.
pub fn extract_requirements_heuristic(jd_text: &str) -> Vec<JobRequirement> {
    let mut found = Vec::new();
    let mut carried: Option<RequirementLevel> = None;

    for raw in jd_text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let is_bullet = line.starts_with(['-', '*', '•']);
        let body = line.trim_start_matches(['-', '*', '•', '#']).trim();
        let segments = marker_segments(body);

        if segments.is_empty() {
            match carried {
                Some(level) if is_bullet => collect_items(body, level, &mut found),
                _ => carried = None,
            }
            continue;
        }

        carried = None;
        for (level, text) in segments {
            if text.trim().is_empty() {
                carried = Some(level);
            } else {
                collect_items(text, level, &mut found);
            }
        }
    }

    merge_requirements(found)
}

/// Splits a line at every marker, returning each marker's level and the text
/// up to the next marker. Text before the first marker is ignored.
fn marker_segments(line: &str) -> Vec<(RequirementLevel, &str)> {
    // ASCII lowercasing keeps byte offsets aligned with `line`.
    let lower = line.to_ascii_lowercase();
    let mut hits: Vec<(usize, usize, RequirementLevel)> = Vec::new();
    for (marker, level) in MARKERS {
        for (start, _) in lower.match_indices(marker) {
            let overlaps = hits
                .iter()
                .any(|(s, e, _)| start < *e && start + marker.len() > *s);
            if !overlaps {
                hits.push((start, start + marker.len(), *level));
            }
        }
    }
    hits.sort_by_key(|(start, _, _)| *start);

    hits.iter()
        .enumerate()
        .map(|(i, (_, end, level))| {
            let stop = hits.get(i + 1).map(|(s, _, _)| *s).unwrap_or(line.len());
            (*level, &line[*end..stop])
        })
        .collect()
}

fn collect_items(text: &str, level: RequirementLevel, out: &mut Vec<JobRequirement>) {
    for piece in text.split([',', ';']).flat_map(|p| p.split(". ")) {
        if let Some(keyword) = clean_item(piece) {
            out.push(match level {
                RequirementLevel::Required => JobRequirement::required(keyword, REQUIRED_WEIGHT),
                RequirementLevel::Preferred => JobRequirement::preferred(keyword, PREFERRED_WEIGHT),
            });
        }
    }
}

fn clean_item(piece: &str) -> Option<String> {
    let mut item = piece.trim().trim_end_matches(['.', ':']).trim().to_string();

    if let Some(rest) = strip_years_prefix(&item) {
        item = rest;
    }

    loop {
        let lower = item.to_ascii_lowercase();
        let before = item.len();
        if let Some(noise) = LEADING_NOISE.iter().find(|n| lower.starts_with(*n)) {
            item = item[noise.len()..].trim().to_string();
        }
        let lower = item.to_ascii_lowercase();
        if let Some(noise) = TRAILING_NOISE
            .iter()
            .find(|n| lower.ends_with(&format!(" {n}")) || lower == **n)
        {
            item = item[..item.len() - noise.len()].trim().to_string();
        }
        if item.len() == before {
            break;
        }
    }

    let words = item.split_whitespace().count();
    (words > 0 && words <= MAX_KEYWORD_WORDS).then_some(item)
}

/// "5+ years Rust" / "3 years of Go" → "Rust" / "Go".
fn strip_years_prefix(item: &str) -> Option<String> {
    let mut words = item.split_whitespace();
    let digits = words.next()?.trim_end_matches('+');
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let unit = words.next()?.to_ascii_lowercase();
    if unit != "years" && unit != "year" && unit != "yrs" {
        return None;
    }
    let rest: Vec<&str> = words.collect();
    let rest = match rest.first() {
        Some(w) if w.eq_ignore_ascii_case("of") => &rest[1..],
        _ => &rest[..],
    };
    Some(rest.join(" "))
}

/// Case-insensitive dedupe in first-seen order; when a keyword appears twice
/// the stronger entry (required, then higher weight) wins.
pub fn merge_requirements(requirements: Vec<JobRequirement>) -> Vec<JobRequirement> {
    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, JobRequirement> = HashMap::new();

    for req in requirements {
        let key = req.keyword.to_lowercase();
        match best.get(&key) {
            Some(existing) if !is_stronger(&req, existing) => {}
            Some(_) => {
                best.insert(key, req);
            }
            None => {
                order.push(key.clone());
                best.insert(key, req);
            }
        }
    }

    order.into_iter().filter_map(|k| best.remove(&k)).collect()
}

fn is_stronger(candidate: &JobRequirement, existing: &JobRequirement) -> bool {
    (candidate.is_required(), candidate.weight) > (existing.is_required(), existing.weight)
}

#[cfg(test)]
mod tests {
    use super::*;

    // JD fixture: Aggressive startup
    const STARTUP_JD: &str = r#"
        Senior Rust Engineer — Core Infrastructure
        We move fast and own everything end-to-end. You will architect distributed systems,
        spearhead performance initiatives, and drive reliability from zero to production.
        Requirements: 5+ years Rust required, systems programming required, distributed systems expertise required.
        Nice to have: Kubernetes, Kafka experience a plus.
        About Us: Fast-paced Series B startup disrupting fintech infrastructure.
    "#;

    // JD fixture: Collaborative enterprise
    const ENTERPRISE_JD: &str = r#"
        Software Engineer — Platform Team
        Join our collaborative team to contribute to our microservices platform.
        Required: Java, Spring Boot, SQL. Preferred: Kubernetes, CI/CD experience.
        About: Global enterprise with 50,000 employees focused on financial services.
    "#;

    // JD fixture: bulleted sections
    const BULLETED_JD: &str = r#"
        ## Must have:
        - Python
        - 3 years of PostgreSQL
        ## Bonus:
        - Terraform
        - python
        ## About
        - Remote-first team
    "#;

    fn keywords(reqs: &[JobRequirement]) -> Vec<(&str, bool)> {
        reqs.iter()
            .map(|r| (r.keyword.as_str(), r.is_required()))
            .collect()
    }

    #[test]
    fn test_startup_jd_heuristic() {
        let reqs = extract_requirements_heuristic(STARTUP_JD);
        assert_eq!(
            keywords(&reqs),
            vec![
                ("Rust", true),
                ("systems programming", true),
                ("distributed systems", true),
                ("Kubernetes", false),
                ("Kafka", false),
            ]
        );
        assert_eq!(reqs[0].weight, REQUIRED_WEIGHT);
        assert_eq!(reqs[3].weight, PREFERRED_WEIGHT);
    }

    #[test]
    fn test_enterprise_jd_two_markers_on_one_line() {
        let reqs = extract_requirements_heuristic(ENTERPRISE_JD);
        assert_eq!(
            keywords(&reqs),
            vec![
                ("Java", true),
                ("Spring Boot", true),
                ("SQL", true),
                ("Kubernetes", false),
                ("CI/CD", false),
            ]
        );
    }

    #[test]
    fn test_bulleted_jd_carries_marker_and_merges_duplicates() {
        let reqs = extract_requirements_heuristic(BULLETED_JD);
        assert_eq!(
            keywords(&reqs),
            vec![("Python", true), ("PostgreSQL", true), ("Terraform", false)]
        );
    }

    #[test]
    fn test_merge_keeps_stronger_entry() {
        let merged = merge_requirements(vec![
            JobRequirement::preferred("Go", 0.5),
            JobRequirement::required("go", 0.8),
            JobRequirement::preferred("GO", 0.9),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].keyword, "go");
        assert!(merged[0].is_required());
    }

    #[test]
    fn test_prose_without_markers_yields_nothing() {
        assert!(extract_requirements_heuristic("We are a friendly team building tools.").is_empty());
    }

    #[test]
    fn test_llm_requirements_deserialize() {
        let json = r#"{"requirements": [
            {"keyword": "Rust", "weight": 0.9, "required": true},
            {"keyword": "Kafka", "weight": 0.4}
        ]}"#;
        let parsed: LlmRequirements = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.requirements.len(), 2);
        assert!(parsed.requirements[1].required);
    }
}
