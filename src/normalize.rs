//! Text normalization.
//!
//! [`normalize`] turns raw extracted text into cleaned text:
//!
//! 1. mojibake repair ([`crate::mojibake`])
//! 2. canonical composition (NFC)
//! 3. rule application from a [`RuleSnapshot`]
//! 4. structural cleanup: blank-line runs, soft wraps, header lines,
//!    boilerplate, repeated spaces, sentence-boundary line breaks
//!
//! All four steps repeat until the text stops changing, so that a rule which
//! only matches after cleanup (e.g. a hyphenated word split across lines)
//! still applies, mojibake halves joined by boilerplate removal are still
//! repaired, and `normalize(normalize(x)) == normalize(x)`.

use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

use crate::mojibake;
use crate::rules::RuleSnapshot;

const MAX_PASSES: usize = 4;

/// Shortest line treated as a running header.
const HEADER_MIN_CHARS: usize = 10;

static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());
static BOILERPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i:edited by|translated by|penes nos)|\bMDC[CLXVI]*\b.*|Â?©.*").unwrap()
});
static SPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").unwrap());
static LINE_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]*\n[ \t]*").unwrap());

/// Normalize `raw` against one rule snapshot. Pure: the same input and
/// snapshot always give the same output.
pub fn normalize(raw: &str, rules: &RuleSnapshot) -> String {
    let mut text = raw.to_string();
    for pass in 0..MAX_PASSES {
        let composed: String = mojibake::repair(&text).nfc().collect();
        let next = cleanup(&rules.apply(&composed));
        if next == text {
            break;
        }
        tracing::trace!(pass, before = text.len(), after = next.len(), "normalize pass");
        text = next;
    }
    text
}

/// Structural cleanup without any rule substitution.
pub fn cleanup(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = BLANK_LINES.replace_all(text.trim(), "\n");
    let text = join_soft_wraps(&text);
    let text = strip_header_lines(&text);
    let text = BOILERPLATE.replace_all(&text, "");
    let text = SPACE_RUNS.replace_all(&text, " ");
    let text = LINE_BREAK.replace_all(&text, " ");
    text.trim().to_string()
}

/// A line break not preceded by sentence punctuation and not followed by a
/// capital letter joins the two lines.
fn join_soft_wraps(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == '\n' {
            let after_stop = i > 0 && matches!(chars[i - 1], '.' | '?' | '!');
            let before_capital = chars.get(i + 1).is_some_and(|n| n.is_ascii_uppercase());
            if !after_stop && !before_capital {
                out.push(' ');
                continue;
            }
        }
        out.push(c);
    }
    out
}

fn strip_header_lines(text: &str) -> String {
    text.lines()
        .filter(|line| !is_header_line(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Running headers: all capitals with only spaces and light punctuation.
fn is_header_line(line: &str) -> bool {
    line.chars().count() >= HEADER_MIN_CHARS
        && line.chars().any(|c| c.is_ascii_uppercase())
        && line
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_whitespace() || matches!(c, '.' | '\'' | '"'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{default_rules, word_fix_pattern, RuleSet, RuleSnapshot};

    fn defaults() -> RuleSnapshot {
        RuleSnapshot::new(1, default_rules())
    }

    #[test]
    fn ligatures_and_spacing() {
        let out = normalize("The ﬁrst line.\n\nA  double   space.", &defaults());
        assert_eq!(out, "The first line. A double space.");
    }

    #[test]
    fn learned_word_fix_applies() {
        let mut rules = RuleSet::default();
        rules
            .ocr_artifacts
            .insert(word_fix_pattern("teh"), "the".to_string());
        let snapshot = RuleSnapshot::new(2, rules);
        assert_eq!(normalize("teh cat", &snapshot), "the cat");
        assert_eq!(normalize("tehran", &snapshot), "tehran");
    }

    #[test]
    fn soft_wraps_are_joined() {
        let out = normalize("This is a wrapped\nline of text.", &defaults());
        assert_eq!(out, "This is a wrapped line of text.");
    }

    #[test]
    fn rule_matching_after_cleanup_still_applies() {
        let out = normalize("A sub-\nsequent chapter.", &defaults());
        assert_eq!(out, "A subsequent chapter.");
    }

    #[test]
    fn running_headers_are_dropped() {
        let out = normalize("THE BOOK OF SHADOWS\nSome text here.", &defaults());
        assert_eq!(out, "Some text here.");
    }

    #[test]
    fn short_capital_lines_survive() {
        let out = normalize("NOTE.\nSome text here.", &defaults());
        assert_eq!(out, "NOTE. Some text here.");
    }

    #[test]
    fn boilerplate_is_removed() {
        let out = normalize("Translated by Someone. The text.\n© 1901 Old Press", &defaults());
        assert!(!out.contains("Translated by"));
        assert!(!out.contains("Old Press"));
        assert!(out.contains("The text."));
    }

    #[test]
    fn mojibake_then_punctuation() {
        let out = normalize("donâ€™t stop", &defaults());
        assert_eq!(out, "don't stop");
    }

    #[test]
    fn mojibake_joined_by_boilerplate_removal() {
        let out = normalize("Price \u{C3}Translated by\u{B1} here.", &defaults());
        assert_eq!(out, "Price \u{F1} here.");
    }

    #[test]
    fn crlf_and_blank_runs() {
        let out = normalize("One.\r\n\r\n\r\nTwo.", &defaults());
        assert_eq!(out, "One. Two.");
    }

    #[test]
    fn idempotent() {
        let rules = defaults();
        let samples = [
            "The ﬁrst line.\n\nA  double   space.",
            "A sub-\nsequent\n\n\nCHAPTER ONE HEADER\nwith “quotes” — and dashes…",
            "CafÃ© society\nmet in the medireval hall.",
            "   leading and trailing   ",
            "",
            "SHORT. TINY.\nTEXT",
            "Price \u{C3}Translated by\u{B1} here.",
        ];
        for raw in samples {
            let once = normalize(raw, &rules);
            let twice = normalize(&once, &rules);
            assert_eq!(once, twice, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn deterministic() {
        let rules = defaults();
        let raw = "Tableaz£ de l'inconstance\nby an AutJuw of note.";
        let a = normalize(raw, &rules);
        let b = normalize(raw, &rules);
        assert_eq!(a, b);
        assert_eq!(a, "Tableau de l'inconstance by an Author of note.");
    }
}
