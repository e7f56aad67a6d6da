use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Knobs of the refinement engine. None of these values come from the domain;
/// they are operator choices.
#[derive(Debug, Clone)]
pub struct RefinementConfig {
    /// Automated fix attempts per problem before it is escalated.
    pub max_auto_attempts: u32,
    /// Resolution steps a section may take before it is finalized degraded.
    pub max_iterations: u32,
    /// Weighted keyword coverage a keyword-bearing section should reach.
    pub coverage_threshold: f32,
    pub generation_timeout: Duration,
    /// How long one batch of questions waits for the user.
    pub answer_timeout: Duration,
    /// Generator calls allowed in flight across all sections.
    pub max_concurrent_generations: usize,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            max_auto_attempts: 2,
            max_iterations: 24,
            coverage_threshold: 0.7,
            generation_timeout: Duration::from_secs(60),
            answer_timeout: Duration::from_secs(900),
            max_concurrent_generations: 4,
        }
    }
}

/// Application configuration loaded from environment variables.
/// Fails at startup if a variable is present but malformed.
#[derive(Debug, Clone)]
pub struct Config {
    /// When absent the rule-based generator and heuristic JD parser are used.
    pub anthropic_api_key: Option<String>,
    /// Enables run checkpoints when set.
    pub checkpoint_dir: Option<PathBuf>,
    pub port: u16,
    pub rust_log: String,
    /// How long a finished session stays pollable before it is evicted.
    pub session_retention: Duration,
    pub refinement: RefinementConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = RefinementConfig::default();
        let coverage_threshold: f32 = parse_env(
            "KEYWORD_COVERAGE_THRESHOLD",
            defaults.coverage_threshold,
        )?;
        if !(0.0..=1.0).contains(&coverage_threshold) {
            anyhow::bail!("KEYWORD_COVERAGE_THRESHOLD must be between 0.0 and 1.0");
        }

        Ok(Config {
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            checkpoint_dir: optional_env("CHECKPOINT_DIR").map(PathBuf::from),
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            session_retention: Duration::from_secs(parse_env("SESSION_RETENTION_SECS", 3600)?),
            refinement: RefinementConfig {
                max_auto_attempts: parse_env("MAX_AUTO_ATTEMPTS", defaults.max_auto_attempts)?,
                max_iterations: parse_env("MAX_ITERATIONS", defaults.max_iterations)?,
                coverage_threshold,
                generation_timeout: Duration::from_secs(parse_env(
                    "GENERATION_TIMEOUT_SECS",
                    defaults.generation_timeout.as_secs(),
                )?),
                answer_timeout: Duration::from_secs(parse_env(
                    "ANSWER_TIMEOUT_SECS",
                    defaults.answer_timeout.as_secs(),
                )?),
                max_concurrent_generations: parse_env(
                    "MAX_CONCURRENT_GENERATIONS",
                    defaults.max_concurrent_generations,
                )?
                .max(1),
            },
        })
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    parse_value(key, optional_env(key), default)
}

fn parse_value<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid value, got '{raw}'")),
        None => Ok(default),
    }
}
