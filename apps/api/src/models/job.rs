use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementLevel {
    #[default]
    Required,
    Preferred,
}

/// A target-role signal extracted from a job description. Read-only input to
/// the job alignment overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequirement {
    pub keyword: String,
    /// 0.0 – 1.0
    pub weight: f32,
    #[serde(default)]
    pub level: RequirementLevel,
}

impl JobRequirement {
    pub fn required(keyword: impl Into<String>, weight: f32) -> Self {
        Self {
            keyword: keyword.into(),
            weight,
            level: RequirementLevel::Required,
        }
    }

    pub fn preferred(keyword: impl Into<String>, weight: f32) -> Self {
        Self {
            keyword: keyword.into(),
            weight,
            level: RequirementLevel::Preferred,
        }
    }

    pub fn is_required(&self) -> bool {
        self.level == RequirementLevel::Required
    }
}
