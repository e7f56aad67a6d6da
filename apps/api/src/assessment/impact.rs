//! Impact quantification checks shared by the heuristic assessor.

const VAGUE_VERBS: &[&str] = &[
    "improved",
    "enhanced",
    "helped",
    "worked on",
    "assisted",
    "supported",
    "participated",
    "involved",
];

const VAGUE_SCALE_WORDS: &[&str] = &[
    "significant",
    "major",
    "large",
    "huge",
    "massive",
    "substantial",
    "considerable",
    "great",
    "many",
    "numerous",
    "various",
    "several",
];

const INFORMAL_WORDS: &[&str] = &["stuff", "things", "lots", "really", "very", "awesome"];

/// Marker a user may append when no metric exists for a claim.
pub const LOW_METRICS_MARKER: &str = "[LOW_METRICS]";

/// True if the text carries any quantified outcome:
/// a digit, `%`, a currency sign, `~N`, `Nx`, or the `[LOW_METRICS]` marker.
pub fn is_quantified(text: &str) -> bool {
    text.contains(LOW_METRICS_MARKER)
        || text.chars().any(|c| c.is_ascii_digit())
        || text.contains('%')
        || text.contains('$')
        || text.contains('€')
        || text.contains('£')
}

/// Splits section content into the units checked for impact: bullet lines when
/// the content has them, otherwise non-empty lines.
pub fn claim_lines(content: &str) -> Vec<&str> {
    content
        .lines()
        .map(|l| {
            l.trim()
                .trim_start_matches(|c: char| c == '-' || c == '*' || c == '•')
                .trim()
        })
        .filter(|l| !l.is_empty())
        .collect()
}

/// Vague verbs used on lines that carry no metric, in first-seen order.
pub fn unquantified_vague_verbs(content: &str) -> Vec<&'static str> {
    matches_on_unquantified_lines(content, VAGUE_VERBS)
}

/// Vague scale words ("significant", "numerous") on lines without a number.
pub fn unquantified_scale_words(content: &str) -> Vec<&'static str> {
    matches_on_unquantified_lines(content, VAGUE_SCALE_WORDS)
}

pub fn informal_words(content: &str) -> Vec<&'static str> {
    let lower = content.to_lowercase();
    INFORMAL_WORDS
        .iter()
        .copied()
        .filter(|w| contains_word(&lower, w))
        .collect()
}

fn matches_on_unquantified_lines(content: &str, vocabulary: &[&'static str]) -> Vec<&'static str> {
    let mut found: Vec<&'static str> = Vec::new();
    for line in claim_lines(content) {
        if is_quantified(line) {
            continue;
        }
        let lower = line.to_lowercase();
        for &word in vocabulary {
            if contains_word(&lower, word) && !found.contains(&word) {
                found.push(word);
            }
        }
    }
    found
}

/// Case-sensitive whole-word containment; callers lowercase both sides.
pub fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
