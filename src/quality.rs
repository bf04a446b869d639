//! Chunk quality classification and the per-file garbage gate.
//!
//! A chunk is scored on its trimmed text by three ratios:
//!
//! | ratio     | counts                                         |
//! |-----------|------------------------------------------------|
//! | noise     | chars with code point above [`NOISE_CODEPOINT`] |
//! | printable | ASCII letters, digits, punctuation, whitespace |
//! | alnum     | Unicode alphanumerics                          |
//!
//! Trash and high-quality thresholds are fixed constants.

use serde::Serialize;

use crate::models::Quality;

pub const MIN_CHUNK_CHARS: usize = 10;
pub const NOISE_CODEPOINT: u32 = 2000;

pub const TRASH_MAX_NOISE: f64 = 0.3;
pub const TRASH_MIN_PRINTABLE: f64 = 0.6;
pub const TRASH_MIN_ALNUM: f64 = 0.2;

pub const HIGH_MAX_NOISE: f64 = 0.05;
pub const HIGH_MIN_PRINTABLE: f64 = 0.9;
pub const HIGH_MIN_ALNUM: f64 = 0.5;

/// Character statistics of a trimmed chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkStats {
    pub len: usize,
    pub noise_ratio: f64,
    pub printable_ratio: f64,
    pub alnum_ratio: f64,
}

impl ChunkStats {
    pub fn of(chunk: &str) -> Self {
        let text = chunk.trim();
        let (mut len, mut noise, mut printable, mut alnum) = (0usize, 0usize, 0usize, 0usize);
        for c in text.chars() {
            len += 1;
            if u32::from(c) > NOISE_CODEPOINT {
                noise += 1;
            }
            if is_printable(c) {
                printable += 1;
            }
            if c.is_alphanumeric() {
                alnum += 1;
            }
        }
        if len == 0 {
            return Self {
                len: 0,
                noise_ratio: 0.0,
                printable_ratio: 0.0,
                alnum_ratio: 0.0,
            };
        }
        let n = len as f64;
        Self {
            len,
            noise_ratio: noise as f64 / n,
            printable_ratio: printable as f64 / n,
            alnum_ratio: alnum as f64 / n,
        }
    }

    pub fn is_trash(&self) -> bool {
        self.len < MIN_CHUNK_CHARS
            || self.noise_ratio > TRASH_MAX_NOISE
            || self.printable_ratio < TRASH_MIN_PRINTABLE
            || self.alnum_ratio < TRASH_MIN_ALNUM
    }

    pub fn is_high_quality(&self) -> bool {
        self.len >= MIN_CHUNK_CHARS
            && self.noise_ratio <= HIGH_MAX_NOISE
            && self.printable_ratio >= HIGH_MIN_PRINTABLE
            && self.alnum_ratio >= HIGH_MIN_ALNUM
    }
}

fn is_printable(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || c.is_ascii_punctuation()
        || matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0b' | '\x0c')
}

/// Trash takes precedence; a chunk that is not trash is high quality only
/// when it clears every stricter threshold.
pub fn classify(chunk: &str) -> Quality {
    let stats = ChunkStats::of(chunk);
    if stats.is_trash() {
        Quality::Trash
    } else if stats.is_high_quality() {
        Quality::HighQuality
    } else {
        Quality::Acceptable
    }
}

/// Outcome of the garbage gate for one file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GateReport {
    pub trash: usize,
    pub total: usize,
    pub accepted: bool,
}

impl GateReport {
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.trash as f64 / self.total as f64
        }
    }
}

/// Rejects a whole file when its share of trash chunks exceeds a threshold.
#[derive(Debug, Clone, Copy)]
pub struct FileGarbageGate {
    threshold: f64,
}

impl FileGarbageGate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// A file with no chunks is rejected; otherwise the file passes while
    /// `trash / total <= threshold`.
    pub fn assess(&self, qualities: &[Quality]) -> GateReport {
        let total = qualities.len();
        let trash = qualities.iter().filter(|q| **q == Quality::Trash).count();
        let accepted = total > 0 && (trash as f64 / total as f64) <= self.threshold;
        GateReport {
            trash,
            total,
            accepted,
        }
    }

    pub fn accepts(&self, qualities: &[Quality]) -> bool {
        self.assess(qualities).accepted
    }
}
