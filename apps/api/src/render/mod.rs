//! Markdown rendering of a refined document and its issue report.

use crate::models::resume::{ResumeDocument, Section, SectionKind};
use crate::refinement::orchestrator::{IssueReport, ReportedIssue, RunStatus};

pub const EMPTY_DOCUMENT: &str = "# Resume\n\n*No content available*";

/// Comma-separated skill lines wrap at about this many characters.
const SKILLS_LINE_WIDTH: usize = 60;

pub trait Renderer: Send + Sync {
    /// Sections in document order; empty sections are skipped.
    fn to_markdown(&self, document: &ResumeDocument) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownRenderer;

impl Renderer for MarkdownRenderer {
    fn to_markdown(&self, document: &ResumeDocument) -> String {
        if document.is_empty() {
            return EMPTY_DOCUMENT.to_string();
        }
        document
            .sections
            .iter()
            .filter(|s| !s.is_empty())
            .map(render_section)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn render_section(section: &Section) -> String {
    let content = section.content.trim();
    match &section.kind {
        SectionKind::Header => {
            let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());
            let name = lines.next().unwrap_or("Resume");
            let rest: Vec<&str> = lines.collect();
            if rest.is_empty() {
                format!("# {name}")
            } else {
                format!("# {name}\n\n{}", rest.join("  \n"))
            }
        }
        SectionKind::Summary => format!("## Professional Summary\n\n{content}"),
        SectionKind::Experience => format!("## Experience\n\n{}", bulletize(content)),
        SectionKind::Skills => format!("## Skills\n\n{}", group_skills(content)),
        kind => format!("## {}\n\n{content}", kind.title()),
    }
}

/// Achievement lines become bullets; titles (ending in ':' or all caps) and
/// existing bullets are left alone.
fn bulletize(content: &str) -> String {
    content
        .lines()
        .map(|line| {
            let line = line.trim();
            let is_title = line.ends_with(':')
                || (line.chars().any(char::is_alphabetic)
                    && !line.chars().any(char::is_lowercase));
            if line.is_empty() || line.starts_with(['-', '*', '#', '•']) || is_title {
                line.to_string()
            } else {
                format!("- {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// A single comma-separated line is regrouped into bullet lines of skills.
fn group_skills(content: &str) -> String {
    if content.contains('\n') || !content.contains(',') {
        return content.to_string();
    }

    let mut lines: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut width = 0;
    for skill in content.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !current.is_empty() && width + skill.len() > SKILLS_LINE_WIDTH {
            lines.push(format!("- {}", current.join(" • ")));
            current.clear();
            width = 0;
        }
        width += skill.len() + 3;
        current.push(skill);
    }
    if !current.is_empty() {
        lines.push(format!("- {}", current.join(" • ")));
    }
    lines.join("\n")
}

/// Human-readable summary of what the run could not fix.
pub fn render_report(report: &IssueReport) -> String {
    let status = match report.status {
        RunStatus::Completed => "completed",
        RunStatus::CompletedWithIssues => "completed with issues",
        RunStatus::Aborted => "aborted",
    };
    let mut out = format!(
        "# Refinement report\n\nRun {} {status} at document version {}.",
        report.run_id, report.document_version
    );

    if !report.has_issues() {
        out.push_str("\n\nNo outstanding issues.");
        return out;
    }

    push_issues(&mut out, "Abandoned problems", &report.abandoned);
    push_issues(&mut out, "Unresolved problems", &report.unresolved);

    if !report.convergence_failures.is_empty() {
        out.push_str("\n\n## Sections finalized best-effort\n");
        for kind in &report.convergence_failures {
            out.push_str(&format!("\n- {}", kind.title()));
        }
    }

    if !report.coverage_shortfalls.is_empty() {
        out.push_str("\n\n## Keyword coverage below target\n");
        for shortfall in &report.coverage_shortfalls {
            out.push_str(&format!(
                "\n- {}: {:.0}%",
                shortfall.section.title(),
                shortfall.coverage * 100.0
            ));
        }
    }
    out
}

fn push_issues(out: &mut String, heading: &str, issues: &[ReportedIssue]) {
    if issues.is_empty() {
        return;
    }
    out.push_str(&format!("\n\n## {heading}\n"));
    for issue in issues {
        let declined = if issue.declined { " (declined)" } else { "" };
        out.push_str(&format!(
            "\n- **{}** [{:?}, {:?}]: {}{declined}",
            issue.section.title(),
            issue.severity,
            issue.category,
            issue.description
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::problem::{ProblemCategory, ProblemId, Severity};
    use crate::refinement::orchestrator::CoverageShortfall;
    use uuid::Uuid;

    fn document(sections: Vec<(SectionKind, &str)>) -> ResumeDocument {
        ResumeDocument::new(
            "default",
            sections
                .into_iter()
                .map(|(kind, content)| Section::new(kind, content))
                .collect(),
        )
    }

    fn report(status: RunStatus) -> IssueReport {
        IssueReport {
            run_id: Uuid::nil(),
            status,
            document_version: 4,
            abandoned: Vec::new(),
            unresolved: Vec::new(),
            convergence_failures: Vec::new(),
            coverage_shortfalls: Vec::new(),
            sections: Vec::new(),
        }
    }

    #[test]
    fn test_empty_document_placeholder() {
        let doc = document(vec![(SectionKind::Summary, ""), (SectionKind::Skills, "  ")]);
        assert_eq!(MarkdownRenderer.to_markdown(&doc), EMPTY_DOCUMENT);
    }

    #[test]
    fn test_sections_render_in_document_order() {
        let doc = document(vec![
            (SectionKind::Header, "Jane Doe\njane@example.com"),
            (SectionKind::Summary, "Backend engineer."),
            (SectionKind::Education, ""),
            (SectionKind::Experience, "ACME CORP\nShipped billing v2\n- Cut costs by 30%"),
            (SectionKind::Other("volunteer work".into()), "Food bank"),
        ]);
        assert_eq!(
            MarkdownRenderer.to_markdown(&doc),
            "# Jane Doe\n\njane@example.com\n\n\
             ## Professional Summary\n\nBackend engineer.\n\n\
             ## Experience\n\nACME CORP\n- Shipped billing v2\n- Cut costs by 30%\n\n\
             ## Volunteer Work\n\nFood bank"
        );
    }

    #[test]
    fn test_skills_are_grouped() {
        let doc = document(vec![(
            SectionKind::Skills,
            "Rust, Go, PostgreSQL, Kubernetes, Terraform, Distributed Systems, Kafka",
        )]);
        assert_eq!(
            MarkdownRenderer.to_markdown(&doc),
            "## Skills\n\n- Rust • Go • PostgreSQL • Kubernetes • Terraform\n- Distributed Systems • Kafka"
        );
    }

    #[test]
    fn test_clean_report() {
        let text = render_report(&report(RunStatus::Completed));
        assert!(text.contains("completed at document version 4"));
        assert!(text.ends_with("No outstanding issues."));
    }

    #[test]
    fn test_report_lists_issues() {
        let mut report = report(RunStatus::CompletedWithIssues);
        report.abandoned.push(ReportedIssue {
            section: SectionKind::Experience,
            problem_id: ProblemId::new(),
            description: "No quantifiable metric".into(),
            category: ProblemCategory::Missing,
            severity: Severity::High,
            declined: true,
        });
        report.convergence_failures.push(SectionKind::Summary);
        report.coverage_shortfalls.push(CoverageShortfall {
            section: SectionKind::Skills,
            coverage: 0.5,
        });

        let text = render_report(&report);
        assert!(text.contains("- **Experience** [High, Missing]: No quantifiable metric (declined)"));
        assert!(text.contains("## Sections finalized best-effort\n\n- Summary"));
        assert!(text.contains("- Skills: 50%"));
    }
}
