use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::RefineError;

/// Structural unit of a resume. Headings the parser does not recognise survive as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Header,
    Contact,
    Summary,
    Experience,
    Education,
    Skills,
    Projects,
    Certifications,
    Awards,
    Languages,
    Publications,
    References,
    Other(String),
}

/// Heading variations mapped to their canonical section.
const HEADING_ALIASES: &[(&str, SectionKind)] = &[
    ("header", SectionKind::Header),
    ("contact", SectionKind::Contact),
    ("contact information", SectionKind::Contact),
    ("summary", SectionKind::Summary),
    ("profile", SectionKind::Summary),
    ("objective", SectionKind::Summary),
    ("professional summary", SectionKind::Summary),
    ("experience", SectionKind::Experience),
    ("work experience", SectionKind::Experience),
    ("employment", SectionKind::Experience),
    ("professional experience", SectionKind::Experience),
    ("education", SectionKind::Education),
    ("academic background", SectionKind::Education),
    ("skills", SectionKind::Skills),
    ("technical skills", SectionKind::Skills),
    ("core competencies", SectionKind::Skills),
    ("projects", SectionKind::Projects),
    ("notable projects", SectionKind::Projects),
    ("certifications", SectionKind::Certifications),
    ("certification", SectionKind::Certifications),
    ("licenses", SectionKind::Certifications),
    ("license", SectionKind::Certifications),
    ("awards", SectionKind::Awards),
    ("award", SectionKind::Awards),
    ("achievements", SectionKind::Awards),
    ("achievement", SectionKind::Awards),
    ("honors", SectionKind::Awards),
    ("honor", SectionKind::Awards),
    ("languages", SectionKind::Languages),
    ("language", SectionKind::Languages),
    ("publications", SectionKind::Publications),
    ("publication", SectionKind::Publications),
    ("references", SectionKind::References),
    ("reference", SectionKind::References),
];

impl SectionKind {
    /// Maps a raw heading ("Work Experience", "Technical Skills:") to its canonical kind.
    pub fn from_heading(heading: &str) -> Self {
        let name = heading
            .trim()
            .trim_end_matches(':')
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        Self::lookup_alias(&name).unwrap_or(SectionKind::Other(name))
    }

    /// Like `from_heading`, but only for headings with a known alias.
    pub fn known_heading(heading: &str) -> Option<Self> {
        let name = heading
            .trim()
            .trim_end_matches(':')
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        Self::lookup_alias(&name)
    }

    fn lookup_alias(name: &str) -> Option<Self> {
        HEADING_ALIASES
            .iter()
            .find(|(alias, _)| *alias == name)
            .map(|(_, kind)| kind.clone())
    }

    /// Lowercase identifier used in logs, checkpoints and URLs.
    pub fn slug(&self) -> String {
        match self {
            SectionKind::Header => "header".to_string(),
            SectionKind::Contact => "contact".to_string(),
            SectionKind::Summary => "summary".to_string(),
            SectionKind::Experience => "experience".to_string(),
            SectionKind::Education => "education".to_string(),
            SectionKind::Skills => "skills".to_string(),
            SectionKind::Projects => "projects".to_string(),
            SectionKind::Certifications => "certifications".to_string(),
            SectionKind::Awards => "awards".to_string(),
            SectionKind::Languages => "languages".to_string(),
            SectionKind::Publications => "publications".to_string(),
            SectionKind::References => "references".to_string(),
            SectionKind::Other(name) => name.clone(),
        }
    }

    /// Human-readable heading ("Experience", "Volunteer Work").
    pub fn title(&self) -> String {
        self.slug()
            .split_whitespace()
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Sections written as prose/bullets where impact and length rules apply.
    pub fn is_narrative(&self) -> bool {
        matches!(self, SectionKind::Summary | SectionKind::Experience)
    }

    /// Sections that can reasonably carry job keywords.
    pub fn is_keyword_bearing(&self) -> bool {
        matches!(
            self,
            SectionKind::Summary
                | SectionKind::Experience
                | SectionKind::Skills
                | SectionKind::Projects
        )
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slug())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    #[default]
    Draft,
    Refining,
    Finalized,
    /// Finalized after a convergence failure; unresolved problems travel in the report.
    Degraded,
}

/// One resume segment. Values are replaced, never edited: every content change
/// yields a new `Section` with `revision + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub kind: SectionKind,
    pub content: String,
    pub keywords: BTreeSet<String>,
    pub quality_score: f32,
    pub status: SectionStatus,
    pub revision: u32,
}

impl Section {
    pub fn new(kind: SectionKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            keywords: BTreeSet::new(),
            quality_score: 0.0,
            status: SectionStatus::Draft,
            revision: 0,
        }
    }

    /// New revision carrying `content`. Fails if `base_revision` is not the
    /// revision the candidate was computed against.
    pub fn replace_content(
        &self,
        base_revision: u32,
        content: impl Into<String>,
    ) -> Result<Self, RefineError> {
        if base_revision != self.revision {
            return Err(RefineError::StaleSection {
                section: self.kind.clone(),
                expected: base_revision,
                actual: self.revision,
            });
        }
        Ok(Self {
            content: content.into(),
            status: SectionStatus::Refining,
            revision: self.revision + 1,
            ..self.clone()
        })
    }

    pub fn with_assessment(&self, quality_score: f32, keywords: BTreeSet<String>) -> Self {
        Self {
            quality_score,
            keywords,
            ..self.clone()
        }
    }

    pub fn with_status(&self, status: SectionStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    pub fn is_frozen(&self) -> bool {
        matches!(
            self.status,
            SectionStatus::Finalized | SectionStatus::Degraded
        )
    }

    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// The whole resume under construction. Every committed section replacement
/// produces a new document with `version + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeDocument {
    pub template_id: String,
    pub sections: Vec<Section>,
    pub version: u64,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ResumeDocument {
    pub fn new(template_id: impl Into<String>, sections: Vec<Section>) -> Self {
        Self {
            template_id: template_id.into(),
            sections,
            version: 0,
            metadata: BTreeMap::new(),
        }
    }

    pub fn section(&self, kind: &SectionKind) -> Option<&Section> {
        self.sections.iter().find(|s| &s.kind == kind)
    }

    /// Returns the next document version with `section` swapped in (or appended
    /// if the document has no section of that kind yet).
    pub fn with_section(&self, section: Section) -> Self {
        let mut sections = self.sections.clone();
        match sections.iter_mut().find(|s| s.kind == section.kind) {
            Some(slot) => *slot = section,
            None => sections.push(section),
        }
        Self {
            template_id: self.template_id.clone(),
            sections,
            version: self.version + 1,
            metadata: self.metadata.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.iter().all(Section::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_aliases_normalize() {
        assert_eq!(
            SectionKind::from_heading("Work Experience"),
            SectionKind::Experience
        );
        assert_eq!(
            SectionKind::from_heading("  Technical   Skills: "),
            SectionKind::Skills
        );
        assert_eq!(SectionKind::from_heading("Objective"), SectionKind::Summary);
        assert_eq!(SectionKind::from_heading("Honors"), SectionKind::Awards);
    }

    #[test]
    fn test_unknown_heading_becomes_other() {
        let kind = SectionKind::from_heading("Volunteer Work");
        assert_eq!(kind, SectionKind::Other("volunteer work".to_string()));
        assert_eq!(kind.title(), "Volunteer Work");
        assert!(SectionKind::known_heading("Volunteer Work").is_none());
    }

    #[test]
    fn test_replace_content_bumps_revision() {
        let section = Section::new(SectionKind::Summary, "Old");
        let next = section.replace_content(0, "New").unwrap();
        assert_eq!(next.revision, 1);
        assert_eq!(next.content, "New");
        assert_eq!(next.status, SectionStatus::Refining);
        // The original value is untouched.
        assert_eq!(section.content, "Old");
    }

    #[test]
    fn test_replace_content_rejects_stale_revision() {
        let section = Section::new(SectionKind::Summary, "Old")
            .replace_content(0, "Newer")
            .unwrap();
        let err = section.replace_content(0, "Stale").unwrap_err();
        assert!(matches!(err, RefineError::StaleSection { actual: 1, .. }));
    }

    #[test]
    fn test_document_with_section_increments_version_once() {
        let doc = ResumeDocument::new(
            "default",
            vec![
                Section::new(SectionKind::Summary, ""),
                Section::new(SectionKind::Experience, ""),
            ],
        );
        let next = doc.with_section(Section::new(SectionKind::Experience, "Built things"));
        assert_eq!(next.version, 1);
        assert_eq!(next.sections.len(), 2);
        assert_eq!(next.sections[1].content, "Built things");
        assert_eq!(doc.version, 0);
    }

    #[test]
    fn test_section_kind_serde_snake_case() {
        let json = serde_json::to_string(&SectionKind::Experience).unwrap();
        assert_eq!(json, "\"experience\"");
        let other: SectionKind = serde_json::from_str(r#"{"other":"volunteering"}"#).unwrap();
        assert_eq!(other, SectionKind::Other("volunteering".to_string()));
    }
}
