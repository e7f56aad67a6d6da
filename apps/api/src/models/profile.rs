use serde::{Deserialize, Serialize};

const TARGET_LEVELS: &[&str] = &["junior", "mid", "senior", "executive"];

/// What the user is aiming for. Shapes escalation questions; never used as a
/// source of resume facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub target_position: String,
    pub years_of_experience: u32,
    #[serde(default)]
    pub target_level: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
}

impl UserProfile {
    /// Returns every validation issue; an empty list means the profile is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        let position = self.target_position.trim();
        if position.is_empty() {
            issues.push("target_position cannot be empty".to_string());
        } else if position.chars().count() > 100 {
            issues.push("target_position must be at most 100 characters".to_string());
        }

        if self.years_of_experience > 50 {
            issues.push("years_of_experience must be between 0 and 50".to_string());
        }

        if let Some(level) = &self.target_level {
            let level = level.to_lowercase();
            if !TARGET_LEVELS.contains(&level.as_str()) {
                issues.push(format!(
                    "target_level must be one of: {}",
                    TARGET_LEVELS.join(", ")
                ));
            } else if level == "junior" && self.years_of_experience > 3 {
                issues.push("junior target_level expects at most 3 years of experience".to_string());
            } else if level == "executive" && self.years_of_experience < 8 {
                issues.push("executive target_level expects at least 8 years of experience".to_string());
            }
        }

        issues
    }

    /// entry (≤2y), mid (≤7y), senior (≤15y), executive.
    pub fn experience_tier(&self) -> &'static str {
        match self.years_of_experience {
            0..=2 => "entry",
            3..=7 => "mid",
            8..=15 => "senior",
            _ => "executive",
        }
    }
}
