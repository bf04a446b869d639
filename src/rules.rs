//! Normalization rule store.
//!
//! Rules live in a JSON file with exactly three maps:
//!
//! ```json
//! {
//!   "ligatures":     { "ﬁ": "fi" },
//!   "punctuation":   { "—": "-" },
//!   "ocr_artifacts": { "\\bmedireval\\b": "mediaeval" }
//! }
//! ```
//!
//! `ligatures` and `punctuation` are literal substitutions; `ocr_artifacts`
//! keys are word-boundary anchored regexes. Readers work against an immutable
//! [`RuleSnapshot`]; every mutation persists the file and swaps in a new
//! snapshot with a higher version, so a reader never observes a half-applied
//! update.

use parking_lot::{Mutex, RwLock};
use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{IngestError, Result};

/// Rule category names as they appear in the rule file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Ligatures,
    Punctuation,
    OcrArtifacts,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Ligatures => "ligatures",
            Category::Punctuation => "punctuation",
            Category::OcrArtifacts => "ocr_artifacts",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ligatures" => Ok(Category::Ligatures),
            "punctuation" => Ok(Category::Punctuation),
            "ocr_artifacts" => Ok(Category::OcrArtifacts),
            other => Err(IngestError::Rules(format!(
                "unknown rule category '{}'. Must be ligatures, punctuation, or ocr_artifacts.",
                other
            ))),
        }
    }
}

/// The persisted rule set. Maps are ordered so that application order and
/// serialized output are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSet {
    #[serde(default)]
    pub ligatures: BTreeMap<String, String>,
    #[serde(default)]
    pub punctuation: BTreeMap<String, String>,
    #[serde(default)]
    pub ocr_artifacts: BTreeMap<String, String>,
}

impl RuleSet {
    pub fn category(&self, category: Category) -> &BTreeMap<String, String> {
        match category {
            Category::Ligatures => &self.ligatures,
            Category::Punctuation => &self.punctuation,
            Category::OcrArtifacts => &self.ocr_artifacts,
        }
    }

    fn category_mut(&mut self, category: Category) -> &mut BTreeMap<String, String> {
        match category {
            Category::Ligatures => &mut self.ligatures,
            Category::Punctuation => &mut self.punctuation,
            Category::OcrArtifacts => &mut self.ocr_artifacts,
        }
    }

    pub fn len(&self) -> usize {
        self.ligatures.len() + self.punctuation.len() + self.ocr_artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The rule set shipped on first use.
pub fn default_rules() -> RuleSet {
    let pairs = |items: &[(&str, &str)]| -> BTreeMap<String, String> {
        items
            .iter()
            .map(|(bad, good)| (bad.to_string(), good.to_string()))
            .collect()
    };

    RuleSet {
        ligatures: pairs(&[
            ("\u{FB01}", "fi"),
            ("\u{FB02}", "fl"),
            ("\u{FB00}", "ff"),
            ("\u{FB03}", "ffi"),
            ("\u{FB04}", "ffl"),
        ]),
        punctuation: pairs(&[
            ("\u{2013}", "-"),
            ("\u{2014}", "-"),
            ("\u{2018}", "'"),
            ("\u{2019}", "'"),
            ("\u{201C}", "\""),
            ("\u{201D}", "\""),
            ("\u{2026}", "..."),
        ]),
        ocr_artifacts: pairs(&[
            (r"\bfa9ade\b", "façade"),
            (r"\bmedireval\b", "mediaeval"),
            (r"\bsub- sequent\b", "subsequent"),
            (r"\bHermetic A rcanum\b", "Hermetic Arcanum"),
            (r"\bAutJuw\b", "Author"),
            (r"\bTableaz£ de l'inconstance\b", "Tableau de l'inconstance"),
            (r"\bPhysictZ RestituttZ\b", "Physica Restituta"),
        ]),
    }
}

/// Anchored regex key for a plain misspelled word.
pub fn word_fix_pattern(bad: &str) -> String {
    format!(r"\b{}\b", regex::escape(bad))
}

/// Compile an `ocr_artifacts` key. Keys must compile and be anchored with
/// `\b` at both ends so a fix never rewrites part of a longer word.
pub fn compile_word_fix(pattern: &str) -> Result<Regex> {
    let re = Regex::new(pattern)?;
    if !is_word_anchored(pattern) {
        return Err(IngestError::Rules(format!(
            "ocr_artifacts key '{}' must start and end with \\b",
            pattern
        )));
    }
    Ok(re)
}

fn is_word_anchored(pattern: &str) -> bool {
    let Some(body) = pattern.strip_suffix('b') else {
        return false;
    };
    // `\\b` at the end is an escaped backslash followed by a literal `b`
    let trailing = body.chars().rev().take_while(|&c| c == '\\').count();
    pattern.len() >= 4 && pattern.starts_with(r"\b") && trailing % 2 == 1
}

/// An immutable, compiled view of a [`RuleSet`].
#[derive(Debug)]
pub struct RuleSnapshot {
    version: u64,
    rules: RuleSet,
    compiled: Vec<(Regex, String)>,
}

impl RuleSnapshot {
    /// Compile a rule set. Patterns that fail to compile or are not word
    /// anchored are logged and left out.
    pub fn new(version: u64, rules: RuleSet) -> Self {
        let compiled = rules
            .ocr_artifacts
            .iter()
            .filter_map(|(pattern, replacement)| match compile_word_fix(pattern) {
                Ok(re) => Some((re, replacement.clone())),
                Err(e) => {
                    tracing::warn!(pattern = %pattern, error = %e, "skipping ocr_artifacts pattern");
                    None
                }
            })
            .collect();
        Self {
            version,
            rules,
            compiled,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Literal substitutions (ligatures, then punctuation).
    pub fn apply_literals(&self, text: &str) -> String {
        let mut out = text.to_string();
        for map in [&self.rules.ligatures, &self.rules.punctuation] {
            for (bad, good) in map {
                if !bad.is_empty() && out.contains(bad.as_str()) {
                    out = out.replace(bad.as_str(), good);
                }
            }
        }
        out
    }

    /// Regex substitutions from `ocr_artifacts`. Replacements are literal.
    pub fn apply_patterns(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (re, replacement) in &self.compiled {
            if re.is_match(&out) {
                out = re.replace_all(&out, NoExpand(replacement)).into_owned();
            }
        }
        out
    }

    /// Literals, then patterns.
    pub fn apply(&self, text: &str) -> String {
        self.apply_patterns(&self.apply_literals(text))
    }
}

/// File-backed rule store with snapshot reads and serialized writes.
pub struct RuleStore {
    path: PathBuf,
    current: RwLock<Arc<RuleSnapshot>>,
    writer: Mutex<()>,
}

impl RuleStore {
    /// Load the rule file at `path`.
    ///
    /// When the file is absent it is created with [`default_rules`] if
    /// `create_if_missing` is set; otherwise a configuration error is returned.
    pub fn open(path: impl Into<PathBuf>, create_if_missing: bool) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            if !create_if_missing {
                return Err(IngestError::Config(format!(
                    "normalization map missing: {}. Run `corpus init` (or `corpus ingest --rebuild`) to generate it.",
                    path.display()
                )));
            }
            write_rules(&path, &default_rules())?;
            tracing::info!(path = %path.display(), "normalization map created");
        }

        let rules = read_rules(&path)?;
        tracing::info!(path = %path.display(), rules = rules.len(), "normalization map loaded");
        Ok(Self {
            path,
            current: RwLock::new(Arc::new(RuleSnapshot::new(1, rules))),
            writer: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The current snapshot. Hold it for the duration of one file.
    pub fn snapshot(&self) -> Arc<RuleSnapshot> {
        self.current.read().clone()
    }

    /// Re-read the rule file and publish it as a new snapshot.
    pub fn reload(&self) -> Result<Arc<RuleSnapshot>> {
        let _guard = self.writer.lock();
        let rules = read_rules(&self.path)?;
        Ok(self.publish(rules))
    }

    /// Insert or update one entry and persist immediately.
    pub fn add_entry(&self, category: Category, bad: &str, good: &str) -> Result<Arc<RuleSnapshot>> {
        self.mutate(|rules| insert_entry(rules, category, bad, good).map(|_| ()))
    }

    /// Replace the whole rule set and persist it.
    pub fn save(&self, rules: &RuleSet) -> Result<Arc<RuleSnapshot>> {
        for pattern in rules.ocr_artifacts.keys() {
            compile_word_fix(pattern)?;
        }
        let _guard = self.writer.lock();
        write_rules(&self.path, rules)?;
        tracing::info!(path = %self.path.display(), "normalization map saved");
        Ok(self.publish(rules.clone()))
    }

    /// Ratify detected corrections: each `bad -> good` becomes an anchored
    /// `ocr_artifacts` entry. Returns how many entries were new.
    pub fn learn(&self, fixes: &BTreeMap<String, String>) -> Result<usize> {
        if fixes.is_empty() {
            tracing::info!("no new OCR fixes to learn");
            return Ok(0);
        }
        let mut added = 0;
        self.mutate(|rules| {
            for (bad, good) in fixes {
                if insert_entry(rules, Category::OcrArtifacts, &word_fix_pattern(bad), good)? {
                    added += 1;
                }
            }
            Ok(())
        })?;
        Ok(added)
    }

    fn mutate<F>(&self, f: F) -> Result<Arc<RuleSnapshot>>
    where
        F: FnOnce(&mut RuleSet) -> Result<()>,
    {
        let _guard = self.writer.lock();
        // Read-modify-write against the file so edits made by other
        // processes since our last load are not lost.
        let mut rules = if self.path.exists() {
            read_rules(&self.path)?
        } else {
            self.current.read().rules.clone()
        };
        f(&mut rules)?;
        write_rules(&self.path, &rules)?;
        Ok(self.publish(rules))
    }

    fn publish(&self, rules: RuleSet) -> Arc<RuleSnapshot> {
        let mut current = self.current.write();
        let next = Arc::new(RuleSnapshot::new(current.version + 1, rules));
        *current = next.clone();
        next
    }
}

/// Returns `true` when the key was new.
fn insert_entry(rules: &mut RuleSet, category: Category, bad: &str, good: &str) -> Result<bool> {
    if bad.is_empty() {
        return Err(IngestError::Rules(format!("empty key in '{}'", category)));
    }
    if category == Category::OcrArtifacts {
        compile_word_fix(bad)?;
    }
    let map = rules.category_mut(category);
    let is_new = match map.insert(bad.to_string(), good.to_string()) {
        Some(previous) => {
            tracing::info!(%category, bad, previous = %previous, good, "updating rule");
            false
        }
        None => {
            tracing::info!(%category, bad, good, "adding rule");
            true
        }
    };
    Ok(is_new)
}

fn read_rules(path: &Path) -> Result<RuleSet> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| {
        IngestError::Rules(format!("cannot parse {}: {}", path.display(), e))
    })
}

fn write_rules(path: &Path, rules: &RuleSet) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(rules)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(tmp: &TempDir) -> RuleStore {
        RuleStore::open(tmp.path().join("db/normalization_map.json"), true).unwrap()
    }

    #[test]
    fn missing_file_without_permission_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let err = RuleStore::open(tmp.path().join("absent.json"), false)
            .err()
            .unwrap();
        assert!(matches!(err, IngestError::Config(_)));
        assert!(err.to_string().contains("corpus init"));
    }

    #[test]
    fn creates_default_structure() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.rules(), &default_rules());
        assert_eq!(snapshot.rules().ligatures.get("\u{FB01}").unwrap(), "fi");

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn add_entry_is_an_idempotent_upsert() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        let before = store.snapshot().rules().ocr_artifacts.len();

        store.add_entry(Category::OcrArtifacts, r"\bteh\b", "teh").unwrap();
        store.add_entry(Category::OcrArtifacts, r"\bteh\b", "the").unwrap();

        let rules = store.snapshot();
        assert_eq!(rules.rules().ocr_artifacts.len(), before + 1);
        assert_eq!(rules.rules().ocr_artifacts.get(r"\bteh\b").unwrap(), "the");
    }

    #[test]
    fn mutation_persists_and_reloads() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rules.json");
        {
            let store = RuleStore::open(&path, true).unwrap();
            store.add_entry(Category::OcrArtifacts, r"\bteh\b", "the").unwrap();
        }
        let reopened = RuleStore::open(&path, false).unwrap();
        let snapshot = reopened.snapshot();
        assert_eq!(snapshot.rules().ocr_artifacts.get(r"\bteh\b").unwrap(), "the");
        assert_eq!(snapshot.apply("teh cat"), "the cat");
    }

    #[test]
    fn old_snapshot_is_unchanged_after_write() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        let old = store.snapshot();
        let new = store.add_entry(Category::Punctuation, "«", "\"").unwrap();

        assert!(new.version() > old.version());
        assert!(!old.rules().punctuation.contains_key("«"));
        assert!(new.rules().punctuation.contains_key("«"));
        assert_eq!(store.snapshot().version(), new.version());
    }

    #[test]
    fn invalid_pattern_is_rejected_and_not_persisted() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        let err = store
            .add_entry(Category::OcrArtifacts, r"\b(unclosed", "x")
            .unwrap_err();
        assert!(matches!(err, IngestError::Pattern(_)));
        let reopened = RuleStore::open(store.path(), false).unwrap();
        assert!(!reopened
            .snapshot()
            .rules()
            .ocr_artifacts
            .contains_key(r"\b(unclosed"));
    }

    #[test]
    fn unanchored_word_fix_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        let version = store.snapshot().version();
        for key in ["teh", r"\bteh", r"teh\b", r"\bteh\\b"] {
            let err = store.add_entry(Category::OcrArtifacts, key, "the").unwrap_err();
            assert!(matches!(err, IngestError::Rules(_)), "accepted {:?}", key);
        }
        assert_eq!(store.snapshot().version(), version);
        assert_eq!(store.snapshot().apply("tehran teh"), "tehran teh");

        let mut rules = store.snapshot().rules().clone();
        rules.ocr_artifacts.insert("teh".into(), "the".into());
        assert!(matches!(store.save(&rules), Err(IngestError::Rules(_))));
    }

    #[test]
    fn unanchored_pattern_in_file_is_skipped() {
        let mut rules = RuleSet::default();
        rules.ocr_artifacts.insert("teh".into(), "the".into());
        rules.ocr_artifacts.insert(r"\bcta\b".into(), "cat".into());
        let snapshot = RuleSnapshot::new(1, rules);
        assert_eq!(snapshot.apply("tehran cta"), "tehran cat");
    }

    #[test]
    fn unknown_category_is_rejected() {
        assert!("ligatures".parse::<Category>().is_ok());
        assert!("emoji".parse::<Category>().is_err());
    }

    #[test]
    fn learn_escapes_and_anchors_words() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        let mut fixes = BTreeMap::new();
        fixes.insert("tbe".to_string(), "the".to_string());
        fixes.insert("c.at".to_string(), "cat".to_string());

        assert_eq!(store.learn(&fixes).unwrap(), 2);
        assert_eq!(store.learn(&fixes).unwrap(), 0);

        let snapshot = store.snapshot();
        assert!(snapshot.rules().ocr_artifacts.contains_key(r"\btbe\b"));
        assert!(snapshot.rules().ocr_artifacts.contains_key(r"\bc\.at\b"));
        // Anchoring leaves longer words alone.
        assert_eq!(snapshot.apply("tbe tbeory"), "the tbeory");
        assert_eq!(snapshot.apply("cxat c.at"), "cxat cat");
    }

    #[test]
    fn replacement_is_literal() {
        let mut rules = RuleSet::default();
        rules.ocr_artifacts.insert(r"\bprice\b".into(), "$1 cost".into());
        let snapshot = RuleSnapshot::new(1, rules);
        assert_eq!(snapshot.apply("the price"), "the $1 cost");
    }

    #[test]
    fn invalid_pattern_in_file_is_skipped() {
        let mut rules = RuleSet::default();
        rules.ocr_artifacts.insert(r"(".into(), "x".into());
        rules.ocr_artifacts.insert(r"\bteh\b".into(), "the".into());
        let snapshot = RuleSnapshot::new(1, rules);
        assert_eq!(snapshot.apply("teh ("), "the (");
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rules.json");
        std::fs::write(&path, r#"{"ligatures":{},"emoji":{}}"#).unwrap();
        let err = RuleStore::open(&path, false).err().unwrap();
        assert!(matches!(err, IngestError::Rules(_)));
    }

    #[test]
    fn concurrent_writers_do_not_lose_updates() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(store_in(&tmp));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store
                        .add_entry(Category::OcrArtifacts, &format!(r"\bword{}\b", i), "fixed")
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let reopened = RuleStore::open(store.path(), false).unwrap();
        for i in 0..8 {
            assert!(reopened
                .snapshot()
                .rules()
                .ocr_artifacts
                .contains_key(&format!(r"\bword{}\b", i)));
        }
    }
}
