//! Document parsing — turns an uploaded draft into per-section text.
//!
//! Markdown headings start sections. Plain text and extracted PDF text have no
//! heading syntax, so a short line naming a known section ("Experience",
//! "Technical Skills:") is taken as a heading instead.

use std::fmt;

use crate::errors::RefineError;
use crate::models::resume::SectionKind;

/// Section text in discovery order. A kind appears at most once.
pub type ParsedSections = Vec<(SectionKind, String)>;

/// Lines longer than this are prose even if they start with a section name.
const MAX_PLAIN_HEADING_WORDS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Markdown,
    PlainText,
    Pdf,
}

impl DocumentFormat {
    pub fn from_extension(extension: &str) -> Result<Self, RefineError> {
        match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "md" | "markdown" => Ok(DocumentFormat::Markdown),
            "txt" | "text" => Ok(DocumentFormat::PlainText),
            "pdf" => Ok(DocumentFormat::Pdf),
            other => Err(RefineError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn from_content_type(content_type: &str) -> Result<Self, RefineError> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "text/markdown" | "text/x-markdown" => Ok(DocumentFormat::Markdown),
            "text/plain" => Ok(DocumentFormat::PlainText),
            "application/pdf" => Ok(DocumentFormat::Pdf),
            _ => Err(RefineError::UnsupportedFormat(mime)),
        }
    }

    /// Extension first; the content type only breaks ties for files without one.
    pub fn detect(file_name: Option<&str>, content_type: Option<&str>) -> Result<Self, RefineError> {
        let extension = file_name
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext);
        match (extension, content_type) {
            (Some(ext), _) => Self::from_extension(ext),
            (None, Some(content_type)) => Self::from_content_type(content_type),
            (None, None) => Err(RefineError::UnsupportedFormat("unknown".into())),
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentFormat::Markdown => write!(f, "markdown"),
            DocumentFormat::PlainText => write!(f, "text"),
            DocumentFormat::Pdf => write!(f, "pdf"),
        }
    }
}

pub trait DocumentParser: Send + Sync {
    fn parse(&self, raw: &[u8], format: DocumentFormat) -> Result<ParsedSections, RefineError>;
}

/// Default parser for markdown, plain text and PDF drafts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResumeParser;

impl DocumentParser for ResumeParser {
    fn parse(&self, raw: &[u8], format: DocumentFormat) -> Result<ParsedSections, RefineError> {
        let text = match format {
            DocumentFormat::Markdown | DocumentFormat::PlainText => std::str::from_utf8(raw)
                .map_err(|e| RefineError::Parse(format!("draft is not valid UTF-8: {e}")))?
                .to_string(),
            DocumentFormat::Pdf => pdf_extract::extract_text_from_mem(raw)
                .map_err(|e| RefineError::Parse(format!("failed to extract PDF text: {e}")))?
                // pdf-extract separates pages with form feeds
                .replace('\x0c', "\n"),
        };

        if text.trim().is_empty() {
            return Err(RefineError::Parse("draft is empty".into()));
        }

        let sections = match format {
            DocumentFormat::Markdown => split_sections(&text, markdown_heading),
            DocumentFormat::PlainText | DocumentFormat::Pdf => split_sections(&text, plain_heading),
        };
        tracing::debug!(%format, sections = sections.len(), "draft parsed");
        Ok(sections)
    }
}

fn markdown_heading(line: &str) -> Option<SectionKind> {
    let trimmed = line.trim();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let name = trimmed[hashes..].trim();
    (!name.is_empty()).then(|| SectionKind::from_heading(name))
}

fn plain_heading(line: &str) -> Option<SectionKind> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.split_whitespace().count() > MAX_PLAIN_HEADING_WORDS {
        return None;
    }
    SectionKind::known_heading(trimmed)
}

/// Text before the first heading belongs to `Header`. Repeated headings of
/// the same kind are merged; sections without text are dropped.
fn split_sections(text: &str, heading: fn(&str) -> Option<SectionKind>) -> ParsedSections {
    let mut sections: ParsedSections = Vec::new();
    let mut current = SectionKind::Header;
    let mut buffer: Vec<&str> = Vec::new();

    for line in text.lines() {
        match heading(line) {
            Some(kind) => {
                flush(&mut sections, &current, &buffer);
                current = kind;
                buffer.clear();
            }
            None => buffer.push(line),
        }
    }
    flush(&mut sections, &current, &buffer);
    sections
}

fn flush(sections: &mut ParsedSections, kind: &SectionKind, lines: &[&str]) {
    let content = lines.join("\n").trim().to_string();
    if content.is_empty() {
        return;
    }
    match sections.iter_mut().find(|(k, _)| k == kind) {
        Some((_, existing)) => {
            existing.push_str("\n\n");
            existing.push_str(&content);
        }
        None => sections.push((kind.clone(), content)),
    }
}

/// Advisory issues with a parsed draft. None of them stop a run.
pub fn validate_parsed(sections: &ParsedSections) -> Vec<String> {
    let mut issues = Vec::new();

    for essential in [SectionKind::Experience, SectionKind::Education] {
        if !sections.iter().any(|(kind, _)| *kind == essential) {
            issues.push(format!("Missing essential section: {essential}"));
        }
    }

    let thin: Vec<String> = sections
        .iter()
        .filter(|(kind, content)| {
            matches!(kind, SectionKind::Experience | SectionKind::Summary)
                && content.split_whitespace().count() < 3
        })
        .map(|(kind, _)| kind.slug())
        .collect();
    if !thin.is_empty() {
        issues.push(format!("Sections may need more detail: {}", thin.join(", ")));
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKDOWN_RESUME: &str = "\
Jane Doe
jane@example.com

## Professional Summary
Backend engineer focused on payments.

## Work Experience
- Led migration of billing to Rust, cutting p99 latency by 40%

## Technical Skills:
Rust, Go, PostgreSQL

### Volunteer Work
Food bank coordinator

## Empty Section
";

    fn parse(text: &str, format: DocumentFormat) -> ParsedSections {
        ResumeParser.parse(text.as_bytes(), format).unwrap()
    }

    #[test]
    fn test_markdown_sections_are_normalized() {
        let sections = parse(MARKDOWN_RESUME, DocumentFormat::Markdown);
        let kinds: Vec<&SectionKind> = sections.iter().map(|(k, _)| k).collect();
        assert_eq!(
            kinds,
            vec![
                &SectionKind::Header,
                &SectionKind::Summary,
                &SectionKind::Experience,
                &SectionKind::Skills,
                &SectionKind::Other("volunteer work".into()),
            ]
        );
        assert_eq!(sections[0].1, "Jane Doe\njane@example.com");
        assert_eq!(sections[3].1, "Rust, Go, PostgreSQL");
    }

    #[test]
    fn test_repeated_heading_is_merged() {
        let text = "# Experience\n- Built A\n# Skills\nRust\n# Work Experience\n- Built B";
        let sections = parse(text, DocumentFormat::Markdown);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].1, "- Built A\n\n- Built B");
    }

    #[test]
    fn test_plain_text_uses_known_heading_lines() {
        let text = "Jane Doe\n\nSummary\nEngineer.\n\nExperience:\nLed the team.\nSkills are listed below\nEducation\nBSc";
        let sections = parse(text, DocumentFormat::PlainText);
        let kinds: Vec<&SectionKind> = sections.iter().map(|(k, _)| k).collect();
        assert_eq!(
            kinds,
            vec![
                &SectionKind::Header,
                &SectionKind::Summary,
                &SectionKind::Experience,
                &SectionKind::Education,
            ]
        );
        assert_eq!(sections[2].1, "Led the team.\nSkills are listed below");
    }

    #[test]
    fn test_empty_draft_is_a_parse_error() {
        let err = ResumeParser
            .parse(b"  \n\n ", DocumentFormat::Markdown)
            .unwrap_err();
        assert!(matches!(err, RefineError::Parse(_)));
    }

    #[test]
    fn test_invalid_utf8_is_a_parse_error() {
        let err = ResumeParser
            .parse(&[0xff, 0xfe, 0x00], DocumentFormat::PlainText)
            .unwrap_err();
        assert!(matches!(err, RefineError::Parse(_)));
    }

    #[test]
    fn test_garbage_pdf_is_a_parse_error() {
        let err = ResumeParser
            .parse(b"not a pdf", DocumentFormat::Pdf)
            .unwrap_err();
        assert!(matches!(err, RefineError::Parse(_)));
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            DocumentFormat::detect(Some("cv.MD"), None).unwrap(),
            DocumentFormat::Markdown
        );
        assert_eq!(
            DocumentFormat::detect(None, Some("application/pdf")).unwrap(),
            DocumentFormat::Pdf
        );
        assert!(matches!(
            DocumentFormat::detect(Some("cv.docx"), Some("text/plain")),
            Err(RefineError::UnsupportedFormat(ext)) if ext == "docx"
        ));
    }

    #[test]
    fn test_validate_flags_missing_and_thin_sections() {
        let sections = vec![
            (SectionKind::Summary, "Engineer".to_string()),
            (SectionKind::Experience, "Led the billing team for years".to_string()),
        ];
        let issues = validate_parsed(&sections);
        assert_eq!(
            issues,
            vec![
                "Missing essential section: education".to_string(),
                "Sections may need more detail: summary".to_string(),
            ]
        );
    }
}
