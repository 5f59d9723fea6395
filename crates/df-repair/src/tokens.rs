//! A small lexer for diagram source lines.
//!
//! Splits text into code, string and comment segments so rewrites only ever
//! touch code. Triple-quoted strings may span lines; the open quote is
//! carried between calls in [`LexState`].

use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Code,
    Str,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub range: Range<usize>,
}

/// Lexer state carried from one line to the next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LexState {
    #[default]
    Code,
    /// Inside a triple-quoted string opened with this quote byte
    Triple(u8),
}

/// Split `text` into segments, starting (and ending) in `state`.
pub fn lex(text: &str, state: &mut LexState) -> Vec<Segment> {
    let bytes = text.as_bytes();
    let mut segments = Vec::new();
    let mut i = 0;

    if let LexState::Triple(quote) = *state {
        let end = find_triple_close(bytes, 0, quote);
        segments.push(Segment {
            kind: SegmentKind::Str,
            range: 0..end.unwrap_or(bytes.len()),
        });
        match end {
            Some(end) => {
                *state = LexState::Code;
                i = end;
            }
            None => return segments,
        }
    }

    let mut code_start = i;
    while i < bytes.len() {
        match bytes[i] {
            b'#' => {
                push_code(&mut segments, code_start, i);
                let end = bytes[i..]
                    .iter()
                    .position(|&b| b == b'\n')
                    .map_or(bytes.len(), |p| i + p);
                segments.push(Segment {
                    kind: SegmentKind::Comment,
                    range: i..end,
                });
                i = end;
                code_start = i;
            }
            quote @ (b'"' | b'\'') => {
                push_code(&mut segments, code_start, i);
                let triple = bytes.get(i + 1) == Some(&quote) && bytes.get(i + 2) == Some(&quote);
                let end = if triple {
                    match find_triple_close(bytes, i + 3, quote) {
                        Some(end) => end,
                        None => {
                            *state = LexState::Triple(quote);
                            bytes.len()
                        }
                    }
                } else {
                    find_single_close(bytes, i + 1, quote)
                };
                segments.push(Segment {
                    kind: SegmentKind::Str,
                    range: i..end,
                });
                i = end;
                code_start = i;
            }
            _ => i += 1,
        }
    }
    push_code(&mut segments, code_start, bytes.len());
    segments
}

fn push_code(segments: &mut Vec<Segment>, start: usize, end: usize) {
    if end > start {
        segments.push(Segment {
            kind: SegmentKind::Code,
            range: start..end,
        });
    }
}

/// Byte offset just past the closing triple quote.
fn find_triple_close(bytes: &[u8], from: usize, quote: u8) -> Option<usize> {
    let mut i = from;
    while i + 2 < bytes.len() {
        if bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if bytes[i] == quote && bytes[i + 1] == quote && bytes[i + 2] == quote {
            return Some(i + 3);
        }
        i += 1;
    }
    None
}

/// Byte offset just past the closing quote, or the end of the line for an
/// unterminated string.
fn find_single_close(bytes: &[u8], from: usize, quote: u8) -> usize {
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return i,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Code view of `text` with the same byte offsets: string bytes become `"`
/// and comment bytes become spaces.
pub fn mask(text: &str, segments: &[Segment]) -> String {
    let mut bytes = text.as_bytes().to_vec();
    for segment in segments {
        let fill = match segment.kind {
            SegmentKind::Code => continue,
            SegmentKind::Str => b'"',
            SegmentKind::Comment => b' ',
        };
        for b in &mut bytes[segment.range.clone()] {
            // Keep newlines so multi-line views stay line-aligned.
            if *b != b'\n' {
                *b = fill;
            }
        }
    }
    // Only ASCII bytes were written over whole segments.
    String::from_utf8(bytes).unwrap_or_default()
}

/// `text` with comment bytes turned into spaces, offsets unchanged.
pub fn blank_comments(text: &str, segments: &[Segment]) -> String {
    let mut bytes = text.as_bytes().to_vec();
    for segment in segments.iter().filter(|s| s.kind == SegmentKind::Comment) {
        for b in &mut bytes[segment.range.clone()] {
            if *b != b'\n' {
                *b = b' ';
            }
        }
    }
    String::from_utf8(bytes).unwrap_or_default()
}

pub fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

pub fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Byte ranges of identifiers inside code segments.
pub fn identifiers(text: &str, segments: &[Segment]) -> Vec<Range<usize>> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    for segment in segments.iter().filter(|s| s.kind == SegmentKind::Code) {
        let mut i = segment.range.start;
        while i < segment.range.end {
            let b = bytes[i];
            if is_ident_start(b) && (i == 0 || !is_ident_char(bytes[i - 1])) {
                let start = i;
                while i < segment.range.end && is_ident_char(bytes[i]) {
                    i += 1;
                }
                found.push(start..i);
            } else {
                i += 1;
            }
        }
    }
    found
}

/// Replace identifiers in code segments. Returns `None` if nothing changed.
pub fn rewrite_identifiers<F>(text: &str, segments: &[Segment], mut replace: F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut changed = false;
    for range in identifiers(text, segments) {
        if let Some(replacement) = replace(&text[range.clone()]) {
            if replacement != text[range.clone()] {
                out.push_str(&text[last..range.start]);
                out.push_str(&replacement);
                last = range.end;
                changed = true;
            }
        }
    }
    if !changed {
        return None;
    }
    out.push_str(&text[last..]);
    Some(out)
}

/// Whether the code of `masked` calls `name(`.
pub fn calls(masked: &str, name: &str) -> bool {
    let bytes = masked.as_bytes();
    let mut from = 0;
    while let Some(pos) = masked[from..].find(name) {
        let start = from + pos;
        let end = start + name.len();
        let bounded_left = start == 0 || !is_ident_char(bytes[start - 1]);
        let rest = masked[end..].trim_start();
        if bounded_left && rest.starts_with('(') && bytes.get(end).map_or(true, |&b| !is_ident_char(b)) {
            return true;
        }
        from = end;
    }
    false
}

/// Whether the code of `masked` contains `name` as a whole identifier.
pub fn mentions(masked: &str, name: &str) -> bool {
    let bytes = masked.as_bytes();
    let mut from = 0;
    while let Some(pos) = masked[from..].find(name) {
        let start = from + pos;
        let end = start + name.len();
        let left = start == 0 || !is_ident_char(bytes[start - 1]);
        let right = bytes.get(end).map_or(true, |&b| !is_ident_char(b));
        if left && right {
            return true;
        }
        from = end;
    }
    false
}

/// Net bracket depth change over `masked`.
pub fn depth_delta(masked: &str) -> i32 {
    masked.bytes().fold(0, |depth, b| match b {
        b'(' | b'[' | b'{' => depth + 1,
        b')' | b']' | b'}' => depth - 1,
        _ => depth,
    })
}

/// Split `masked[range]` on top-level occurrences of any separator.
///
/// Returns the operand ranges and, between them, the separator that split
/// each pair. Separators inside brackets are ignored. Separators are
/// ASCII, so every returned range sits on char boundaries.
pub fn split_top_level(
    masked: &str,
    range: Range<usize>,
    separators: &[&'static str],
) -> (Vec<Range<usize>>, Vec<&'static str>) {
    let bytes = masked.as_bytes();
    let mut parts = Vec::new();
    let mut seps = Vec::new();
    let mut depth = 0i32;
    let mut start = range.start;
    let mut i = range.start;

    'scan: while i < range.end {
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            _ if depth == 0 => {
                for sep in separators {
                    if bytes[i..range.end].starts_with(sep.as_bytes()) {
                        parts.push(start..i);
                        seps.push(*sep);
                        i += sep.len();
                        start = i;
                        continue 'scan;
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(start..range.end);
    (parts, seps)
}

/// Trim ASCII whitespace from both ends of a range.
pub fn trim_range(text: &str, range: Range<usize>) -> Range<usize> {
    let bytes = text.as_bytes();
    let mut start = range.start;
    let mut end = range.end;
    while start < end && bytes[start].is_ascii_whitespace() {
        start += 1;
    }
    while end > start && bytes[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    start..end
}
