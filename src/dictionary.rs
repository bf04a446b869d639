//! Dictionary lookups for OCR candidate detection.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use crate::error::{IngestError, Result};

const ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz";

/// A known-word oracle. Lookups are case-insensitive.
pub trait Dictionary: Send + Sync {
    fn contains(&self, word: &str) -> bool;

    /// Known words closest to `word` by edit distance: distance 1 if any
    /// exist, otherwise distance 2. Sorted, without duplicates.
    fn candidates(&self, word: &str) -> Vec<String>;
}

/// An in-memory word list.
#[derive(Debug, Clone, Default)]
pub struct WordList {
    words: HashSet<String>,
}

impl WordList {
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words
                .into_iter()
                .map(|w| w.as_ref().trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    /// One word per line. Anything after the first whitespace (a frequency
    /// column, for instance) is ignored, as are lines starting with `#`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            IngestError::Config(format!("failed to read dictionary {}: {}", path.display(), e))
        })?;
        let list = Self::from_words(
            content
                .lines()
                .filter(|line| !line.trim_start().starts_with('#'))
                .filter_map(|line| line.split_whitespace().next()),
        );
        if list.is_empty() {
            return Err(IngestError::Config(format!(
                "dictionary {} contains no words",
                path.display()
            )));
        }
        tracing::debug!(path = %path.display(), words = list.len(), "dictionary loaded");
        Ok(list)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    fn known<'a>(&self, edits: impl Iterator<Item = &'a String>) -> BTreeSet<String> {
        edits.filter(|e| self.words.contains(*e)).cloned().collect()
    }
}

impl Dictionary for WordList {
    fn contains(&self, word: &str) -> bool {
        self.words.contains(&word.to_lowercase())
    }

    fn candidates(&self, word: &str) -> Vec<String> {
        let word = word.to_lowercase();
        let first = edits1(&word);
        let near = self.known(first.iter());
        if !near.is_empty() {
            return near.into_iter().collect();
        }
        let mut far = BTreeSet::new();
        for edit in &first {
            far.extend(self.known(edits1(edit).iter()));
        }
        far.into_iter().collect()
    }
}

/// Every string one deletion, transposition, replacement, or insertion away.
fn edits1(word: &str) -> HashSet<String> {
    let chars: Vec<char> = word.chars().collect();
    let n = chars.len();
    let mut out = HashSet::with_capacity(n * 54 + 26);
    let build = |parts: &[&[char]]| -> String { parts.iter().flat_map(|p| p.iter()).collect() };

    for i in 0..=n {
        let (left, right) = chars.split_at(i);
        if !right.is_empty() {
            out.insert(build(&[left, &right[1..]]));
        }
        if right.len() > 1 {
            out.insert(build(&[left, &[right[1], right[0]], &right[2..]]));
        }
        for c in ALPHABET.chars() {
            if !right.is_empty() {
                out.insert(build(&[left, &[c], &right[1..]]));
            }
            out.insert(build(&[left, &[c], right]));
        }
    }
    out.remove(word);
    out
}
