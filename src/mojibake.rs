//! Repair of UTF-8 text that was mis-decoded as Windows-1252.
//!
//! A token such as `CafÃ©` or `donâ€™t` is re-encoded to Windows-1252 bytes;
//! if those bytes form valid UTF-8 the decoded form replaces the token.
//! Correctly decoded accented words (`café`) never survive the round trip,
//! and tokens with characters outside Windows-1252 are left alone.

use encoding_rs::WINDOWS_1252;
use std::borrow::Cow;

/// Double-encoded text needs more than one round.
const MAX_ROUNDS: usize = 3;

/// Repair mojibake token by token. Returns the input untouched when nothing
/// changes.
pub fn repair(text: &str) -> Cow<'_, str> {
    let mut current = Cow::Borrowed(text);
    for _ in 0..MAX_ROUNDS {
        match repair_once(&current) {
            Some(next) => current = Cow::Owned(next),
            None => break,
        }
    }
    current
}

fn repair_once(text: &str) -> Option<String> {
    if text.is_ascii() {
        return None;
    }
    let mut out = String::with_capacity(text.len());
    let mut changed = false;
    // ASCII whitespace only; U+00A0 is itself a mojibake trail byte.
    for piece in text.split_inclusive(|c: char| c.is_ascii_whitespace()) {
        let (token, sep) = match piece.char_indices().last() {
            Some((i, c)) if c.is_ascii_whitespace() => piece.split_at(i),
            _ => (piece, ""),
        };
        match repair_token(token) {
            Some(fixed) => {
                out.push_str(&fixed);
                changed = true;
            }
            None => out.push_str(token),
        }
        out.push_str(sep);
    }
    changed.then_some(out)
}

fn repair_token(token: &str) -> Option<String> {
    if token.is_ascii() {
        return None;
    }
    let (bytes, _, unmappable) = WINDOWS_1252.encode(token);
    if unmappable {
        return None;
    }
    String::from_utf8(bytes.into_owned())
        .ok()
        .filter(|fixed| fixed != token)
}
