//! Prompt injection detection: additive keyword scoring.
//!
//! Grounded on `original_source/.../workers/rules/injection.py`: a fixed,
//! case-insensitive phrase list, 40 points per match, capped at 100.

use once_cell::sync::Lazy;
use regex::RegexSet;

/// Evidence is truncated to this many characters of the analyzed text, never
/// stored verbatim beyond this length.
pub const EVIDENCE_MAX_CHARS: usize = 200;

const PATTERNS: &[&str] = &[
    "ignore previous instructions",
    "fail to recall",
    "system prompt",
    "you are not a",
    "DAN mode",
    "jailbreak",
    "dev mode",
    "roleplay as",
];

static PATTERN_SET: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new(PATTERNS.iter().map(|p| regex::escape(p)))
        .expect("static injection pattern list is valid regex")
});

/// Result of scoring a span's analyzable text against the injection pattern
/// list.
pub struct InjectionFinding {
    /// Additive score, 40 per match, capped at 100.
    pub score: u32,
    /// Number of distinct patterns matched.
    pub matches: usize,
    /// First 200 chars of the analyzed text (not the matched substrings).
    pub evidence: String,
}

/// Score `text` against the pattern list, case-insensitively. Returns
/// `None` if nothing matched.
#[must_use]
pub fn scan(text: &str) -> Option<InjectionFinding> {
    let lowered = text.to_lowercase();
    let matches = PATTERN_SET.matches(&lowered).iter().count();
    if matches == 0 {
        return None;
    }
    let score = (matches as u32 * 40).min(100);
    let evidence: String = text.chars().take(EVIDENCE_MAX_CHARS).collect();
    Some(InjectionFinding { score, matches, evidence })
}

/// Severity for a given injection score: HIGH above 80, else MEDIUM.
/// A finding only exists (is alerted on) once score exceeds 50.
#[must_use]
pub fn severity(score: u32) -> &'static str {
    if score > 80 {
        "HIGH"
    } else {
        "MEDIUM"
    }
}

/// Whether a score clears the alerting threshold.
#[must_use]
pub fn is_alertable(score: u32) -> bool {
    score > 50
}
