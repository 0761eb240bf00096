//! Conversational signals
//!
//! Recent history only contributes one bit to evaluation: whether it carries
//! negative emotional markers. Keeping it to a bit lets the bit join the cache
//! key without making cached verdicts depend on the full history.

use regex::Regex;
use std::sync::OnceLock;

fn negative_markers() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:angry|mad|hate[sd]?|furious|upset|annoyed|frustrated|crying|cried|sad|scared|stupid|shut\s+up)\b",
        )
        .expect("negative marker pattern is valid")
    })
}

fn hostile_markers() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:hate\s+you|shut\s+up|stupid|idiot|dumb|loser|go\s+away|i\s+will\s+(?:hit|punch|kick)|(?:hit|punch|kick)\s+(?:you|him|her|them))\b",
        )
        .expect("hostile marker pattern is valid")
    })
}

/// Whether any recent message carries a negative emotional marker
pub fn has_negative_signal<S: AsRef<str>>(history: &[S]) -> bool {
    history.iter().any(|m| negative_markers().is_match(m.as_ref()))
}

/// Whether the content itself is hostile
pub fn is_hostile(content: &str) -> bool {
    hostile_markers().is_match(content)
}
