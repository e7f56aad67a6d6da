use serde::{Deserialize, Serialize};

use crate::models::resume::SectionKind;

pub const DEFAULT_TEMPLATE_ID: &str = "default";

/// Declares which sections a resume has and in what order they render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub section_order: Vec<SectionKind>,
    /// Sections refined even when the draft lacks them.
    #[serde(default)]
    pub required_sections: Vec<SectionKind>,
}

impl Template {
    pub fn new(id: impl Into<String>, section_order: Vec<SectionKind>) -> Self {
        Self {
            id: id.into(),
            section_order,
            required_sections: Vec::new(),
        }
    }

    pub fn with_required(mut self, required: Vec<SectionKind>) -> Self {
        self.required_sections = required;
        self
    }

    /// The sections a run refines: required sections plus those present in the
    /// draft, laid out in template order with unknown extras appended.
    pub fn expected_sections(&self, present: &[SectionKind]) -> Vec<SectionKind> {
        self.layout_with(present)
            .into_iter()
            .filter(|kind| self.required_sections.contains(kind) || present.contains(kind))
            .collect()
    }

    /// Template order followed by any `extra` kinds the template does not name,
    /// in the order they were given.
    pub fn layout_with(&self, extra: &[SectionKind]) -> Vec<SectionKind> {
        let mut order = self.section_order.clone();
        for kind in extra {
            if !order.contains(kind) {
                order.push(kind.clone());
            }
        }
        order
    }
}

impl Default for Template {
    fn default() -> Self {
        Self::new(
            DEFAULT_TEMPLATE_ID,
            vec![
                SectionKind::Header,
                SectionKind::Contact,
                SectionKind::Summary,
                SectionKind::Experience,
                SectionKind::Education,
                SectionKind::Skills,
                SectionKind::Projects,
                SectionKind::Certifications,
                SectionKind::Awards,
                SectionKind::Languages,
                SectionKind::Publications,
                SectionKind::References,
            ],
        )
        .with_required(vec![
            SectionKind::Summary,
            SectionKind::Experience,
            SectionKind::Education,
            SectionKind::Skills,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_order_starts_with_header() {
        let template = Template::default();
        assert_eq!(template.section_order[0], SectionKind::Header);
        assert_eq!(template.section_order[3], SectionKind::Experience);
    }

    #[test]
    fn test_expected_sections_merge_required_and_present() {
        let template = Template::default();
        let present = vec![
            SectionKind::Other("volunteering".into()),
            SectionKind::Contact,
            SectionKind::Experience,
        ];
        assert_eq!(
            template.expected_sections(&present),
            vec![
                SectionKind::Contact,
                SectionKind::Summary,
                SectionKind::Experience,
                SectionKind::Education,
                SectionKind::Skills,
                SectionKind::Other("volunteering".into()),
            ]
        );
    }

    #[test]
    fn test_layout_appends_unknown_sections() {
        let template = Template::new("short", vec![SectionKind::Summary, SectionKind::Skills]);
        let extra = vec![
            SectionKind::Other("volunteering".into()),
            SectionKind::Skills,
        ];
        let layout = template.layout_with(&extra);
        assert_eq!(
            layout,
            vec![
                SectionKind::Summary,
                SectionKind::Skills,
                SectionKind::Other("volunteering".into()),
            ]
        );
    }
}
