//! Overlapping fixed-size text chunker.
//!
//! Splits cleaned text into pieces of at most `chunk_size` characters, with
//! each piece starting `chunk_overlap` characters before the previous one
//! ended. Cut points prefer, in order, a paragraph break, a line break, a
//! sentence end, and a space, searching back from the size limit but never
//! below half a chunk. Pieces are not trimmed: the first chunk followed by
//! every later chunk minus its overlap prefix reproduces the input exactly.

use crate::error::{IngestError, Result};

/// Split `text` into overlapping chunks. Sizes are in characters.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Result<Vec<String>> {
    if chunk_size == 0 {
        return Err(IngestError::Config("chunk_size must be > 0".into()));
    }
    if chunk_overlap >= chunk_size {
        return Err(IngestError::Config(format!(
            "chunk_overlap ({}) must be < chunk_size ({})",
            chunk_overlap, chunk_size
        )));
    }

    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    if chars.is_empty() {
        return Ok(chunks);
    }

    let mut start = 0;
    loop {
        if chars.len() - start <= chunk_size {
            chunks.push(chars[start..].iter().collect());
            break;
        }
        let limit = start + chunk_size;
        let floor = (start + chunk_overlap + 1).max(start + chunk_size / 2);
        let end = find_cut(&chars, start, floor, limit).unwrap_or(limit);
        chunks.push(chars[start..end].iter().collect());
        start = end - chunk_overlap;
    }
    Ok(chunks)
}

/// Best exclusive end position in `floor..=limit`.
fn find_cut(chars: &[char], start: usize, floor: usize, limit: usize) -> Option<usize> {
    let after = |end: usize, offset: usize| -> Option<char> {
        if end >= start + offset {
            Some(chars[end - offset])
        } else {
            None
        }
    };

    let paragraph = |end: usize| after(end, 1) == Some('\n') && after(end, 2) == Some('\n');
    let line = |end: usize| after(end, 1) == Some('\n');
    let sentence = |end: usize| {
        after(end, 1).is_some_and(char::is_whitespace)
            && matches!(after(end, 2), Some('.' | '?' | '!'))
    };
    let word = |end: usize| after(end, 1).is_some_and(char::is_whitespace);

    let tests: [&dyn Fn(usize) -> bool; 4] = [&paragraph, &line, &sentence, &word];
    tests
        .iter()
        .find_map(|is_cut| (floor..=limit).rev().find(|&end| is_cut(end)))
}
