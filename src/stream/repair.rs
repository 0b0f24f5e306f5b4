//! Best-effort fixes for the ways upstream models corrupt SSE payloads.

use std::borrow::Cow;

/// UTF-8 if valid, otherwise every byte mapped to the code point of the
/// same value (Latin-1), so nothing is dropped.
pub fn decode_bytes(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()),
    }
}

/// Where a line's payload sits, if it has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind<'a> {
    /// Blank lines, comments and non-data SSE fields.
    Skip,
    Data(&'a str),
    /// No `data:` prefix; payload recovered from the rest of the line.
    Salvaged(&'a str),
}

const IGNORED_FIELDS: [&str; 3] = ["event:", "id:", "retry:"];

pub fn classify_line(line: &str) -> LineKind<'_> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return LineKind::Skip;
    }
    if let Some(payload) = line.strip_prefix("data:") {
        return LineKind::Data(payload.trim());
    }
    if IGNORED_FIELDS.iter().any(|field| line.starts_with(field)) {
        return LineKind::Skip;
    }
    // A bare JSON object lost its prefix; splitting at its first colon would
    // cut it in half.
    if line.starts_with('{') {
        return LineKind::Salvaged(line);
    }
    match line.split_once(':') {
        Some((_, rest)) => LineKind::Salvaged(rest.trim()),
        None => LineKind::Salvaged(line),
    }
}

/// Substring from the first `{` through the last `}`.
pub fn salvage_object(payload: &str) -> Option<&str> {
    let start = payload.find('{')?;
    let end = payload.rfind('}')?;
    (start < end).then(|| &payload[start..=end])
}

fn is_cjk_punctuation(c: char) -> bool {
    matches!(
        c,
        '\u{3000}'..='\u{303F}'
            | '\u{FF01}'..='\u{FF0F}'
            | '\u{FF1A}'..='\u{FF20}'
            | '\u{FF3B}'..='\u{FF40}'
            | '\u{FF5B}'..='\u{FF65}'
            | '\u{2018}'..='\u{201F}'
            | '\u{2026}'
            | '\u{2014}'
    )
}

fn is_hex4(chars: &[char]) -> bool {
    chars.len() >= 4 && chars[..4].iter().all(char::is_ascii_hexdigit)
}

/// Rewrite invalid escape sequences and raw control characters inside JSON
/// strings so the payload parses.
///
/// A backslash before CJK punctuation is dropped (`\，` becomes `，`); any
/// other invalid escape keeps its text by doubling the backslash (`\(`
/// becomes the literal `\(`). Text outside string literals is untouched.
pub fn repair_escapes(payload: &str) -> Cow<'_, str> {
    if !payload.contains('\\') && !payload.chars().any(char::is_control) {
        return Cow::Borrowed(payload);
    }

    let chars: Vec<char> = payload.chars().collect();
    let mut out = String::with_capacity(payload.len() + 8);
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
            i += 1;
            continue;
        }

        match c {
            '"' => {
                in_string = false;
                out.push(c);
            }
            '\\' => match chars.get(i + 1).copied() {
                Some(next @ ('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't')) => {
                    out.push('\\');
                    out.push(next);
                    i += 1;
                }
                Some('u') if is_hex4(&chars[i + 2..]) => {
                    out.push_str("\\u");
                    i += 1;
                }
                Some(next) if is_cjk_punctuation(next) => {}
                _ => out.push_str("\\\\"),
            },
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", u32::from(c))),
            c => out.push(c),
        }
        i += 1;
    }

    Cow::Owned(out)
}
