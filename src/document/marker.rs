//! Tombstone stripping for simulated deletion.
//!
//! The tool has no delete primitive, so deletion sets a sentinel value at
//! the target address and then removes it from the decrypted plaintext
//! textually. The stripped plaintext is re-encrypted through the tool's
//! editor mode. Untouched bytes are preserved exactly; nothing is parsed
//! and re-serialized.

use crate::types::Format;

/// Strip every occurrence of the sentinel from decrypted plaintext.
///
/// JSON gets element-level surgery (key/value pair or array element plus
/// at most one adjacent separating comma). Every other structured format
/// drops full lines containing the token. Stripping marker-free input is
/// a no-op.
pub fn strip_marker(format: Format, plaintext: &[u8], marker: &str) -> Vec<u8> {
    match format {
        Format::Binary => plaintext.to_vec(),
        Format::Json => {
            let text = String::from_utf8_lossy(plaintext);
            strip_json(&text, marker).into_bytes()
        }
        Format::Yaml | Format::Ini | Format::Dotenv => {
            let text = String::from_utf8_lossy(plaintext);
            strip_lines(&text, marker).into_bytes()
        }
    }
}

/// Drop each full line containing the token, keeping line endings of the
/// surviving lines untouched.
fn strip_lines(text: &str, marker: &str) -> String {
    text.split_inclusive('\n')
        .filter(|line| !line.contains(marker))
        .collect()
}

/// Remove the sentinel's key/value pair or array element. The separating
/// comma after the element is consumed when present, otherwise the one
/// before it; a sole element has neither. Lines left blank by the removal
/// are dropped.
fn strip_json(text: &str, marker: &str) -> String {
    let needle = format!("\"{}\"", marker);
    let mut out = text.to_string();
    while let Some(found) = out.find(&needle) {
        let (left, right) = removal_span(out.as_bytes(), found, found + needle.len());
        out.replace_range(left..right, "");
        drop_blank_line(&mut out, left);
    }
    out
}

fn removal_span(bytes: &[u8], value_start: usize, value_end: usize) -> (usize, usize) {
    let mut left = value_start;
    let mut right = value_end;

    // absorb a leading `"key":`
    let mut scan = left;
    while scan > 0 && bytes[scan - 1].is_ascii_whitespace() {
        scan -= 1;
    }
    if scan > 0 && bytes[scan - 1] == b':' {
        scan -= 1;
        while scan > 0 && bytes[scan - 1].is_ascii_whitespace() {
            scan -= 1;
        }
        if scan > 0 && bytes[scan - 1] == b'"' {
            if let Some(open) = string_open(bytes, scan - 1) {
                left = open;
            }
        }
    }

    // prefer consuming the separating comma that follows; fall back to the
    // one before. Taking only one keeps a single comma between survivors.
    let mut after = right;
    while after < bytes.len() && bytes[after].is_ascii_whitespace() {
        after += 1;
    }
    if after < bytes.len() && bytes[after] == b',' {
        right = after + 1;
    } else {
        let mut before = left;
        while before > 0 && bytes[before - 1].is_ascii_whitespace() {
            before -= 1;
        }
        if before > 0 && bytes[before - 1] == b',' {
            left = before - 1;
        }
    }
    (left, right)
}

/// Opening quote of the string whose closing quote sits at `close`,
/// honoring backslash escapes.
fn string_open(bytes: &[u8], close: usize) -> Option<usize> {
    let mut i = close;
    while i > 0 {
        i -= 1;
        if bytes[i] == b'"' {
            let mut backslashes = 0;
            while i > backslashes && bytes[i - 1 - backslashes] == b'\\' {
                backslashes += 1;
            }
            if backslashes % 2 == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// If the removal left its line holding only whitespace, drop the line.
fn drop_blank_line(out: &mut String, at: usize) {
    let at = at.min(out.len());
    let line_start = out[..at].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line_end = out[at..]
        .find('\n')
        .map(|offset| at + offset + 1)
        .unwrap_or(out.len());
    if out[line_start..line_end].trim().is_empty() && line_start < line_end {
        out.replace_range(line_start..line_end, "");
    }
}
