//! OCR artifact candidate detection.
//!
//! Alphabetic tokens of four or more letters that the dictionary does not
//! know are matched against the dictionary's nearest words; the best match
//! is kept when its similarity reaches the threshold. Results are
//! suggestions only: they are written to a JSON report and never touch the
//! rule store until ratified with `corpus rules learn`.

use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};

use crate::config::OcrConfig;
use crate::dictionary::{Dictionary, WordList};
use crate::error::{IngestError, Result};

static TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[a-zA-Z]{4,}\b").unwrap());

const PROGRESS_EVERY: usize = 100;

/// Distinct candidate tokens in `text`, sorted.
pub fn extract_tokens(text: &str) -> BTreeSet<&str> {
    TOKEN.find_iter(text).map(|m| m.as_str()).collect()
}

/// Normalized similarity in `[0, 1]`: `2 * lcs / (len(a) + len(b))`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in &a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    (2 * prev[b.len()]) as f64 / total as f64
}

/// Finds likely OCR misreadings using a [`Dictionary`] and a bounded
/// worker pool.
pub struct OcrArtifactDetector {
    dictionary: Arc<dyn Dictionary>,
    pool: rayon::ThreadPool,
}

impl OcrArtifactDetector {
    pub fn new(dictionary: Arc<dyn Dictionary>, workers: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("ocr-detect-{}", i))
            .build()
            .map_err(|e| IngestError::Config(format!("failed to start OCR workers: {}", e)))?;
        Ok(Self { dictionary, pool })
    }

    /// Build a detector from configuration. `Ok(None)` when detection is off.
    pub fn from_config(config: &OcrConfig, enabled: bool) -> Result<Option<Self>> {
        if !enabled {
            return Ok(None);
        }
        let path = config.dictionary.as_ref().ok_or_else(|| {
            IngestError::Config("OCR detection requires ocr.dictionary to be set".into())
        })?;
        let words = WordList::load(path)?;
        Self::new(Arc::new(words), config.workers).map(Some)
    }

    /// Map of suspect token to suggested correction.
    pub fn detect_candidates(&self, text: &str, threshold: f64) -> BTreeMap<String, String> {
        let unknown: Vec<&str> = extract_tokens(text)
            .into_iter()
            .filter(|token| !self.dictionary.contains(token))
            .collect();
        let total = unknown.len();
        tracing::debug!(unknown = total, "checking OCR candidates");

        let done = AtomicUsize::new(0);
        self.pool.install(|| {
            unknown
                .par_iter()
                .filter_map(|token| {
                    let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                    if n % PROGRESS_EVERY == 0 {
                        tracing::debug!(done = n, total, "OCR candidate progress");
                    }
                    self.suggest(token, threshold)
                        .map(|fix| (token.to_string(), fix))
                })
                .collect()
        })
    }

    /// Best dictionary replacement for one token, if similar enough.
    pub fn suggest(&self, token: &str, threshold: f64) -> Option<String> {
        let lower = token.to_lowercase();
        let mut best: Option<(f64, String)> = None;
        for candidate in self.dictionary.candidates(&lower) {
            let score = similarity(&lower, &candidate);
            let better = match &best {
                None => true,
                Some((top, word)) => score > *top || (score == *top && candidate < *word),
            };
            if better {
                best = Some((score, candidate));
            }
        }
        let (score, word) = best?;
        if score < threshold || word == lower {
            return None;
        }
        Some(match_case(token, &word))
    }
}

/// Capitalize `word` when `like` starts with a capital.
fn match_case(like: &str, word: &str) -> String {
    if like.chars().next().is_some_and(char::is_uppercase) {
        let mut chars = word.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    } else {
        word.to_string()
    }
}

/// Persisted candidate report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateReport {
    pub source: String,
    pub generated_at: String,
    pub candidates: BTreeMap<String, String>,
}

/// Write `candidates` for `source` into `dir` as
/// `ocr_candidates_<stem>_<timestamp>.json` and return the report path.
pub fn write_report(
    dir: &Path,
    source: &Path,
    candidates: &BTreeMap<String, String>,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let now = chrono::Local::now();
    let stem: String = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let path = dir.join(format!(
        "ocr_candidates_{}_{}.json",
        stem,
        now.format("%Y-%m-%d_%H%M%S")
    ));
    let report = CandidateReport {
        source: source.display().to_string(),
        generated_at: now.to_rfc3339(),
        candidates: candidates.clone(),
    };
    std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
    Ok(path)
}

/// Read a report written by [`write_report`]. A bare `{ "bad": "good" }`
/// object is accepted too.
pub fn read_report(path: &Path) -> Result<BTreeMap<String, String>> {
    let content = std::fs::read_to_string(path)?;
    if let Ok(report) = serde_json::from_str::<CandidateReport>(&content) {
        return Ok(report.candidates);
    }
    Ok(serde_json::from_str(&content)?)
}
