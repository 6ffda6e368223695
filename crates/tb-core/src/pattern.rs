//! Pattern compilation with complexity bounds.
//!
//! Tracker and surrogate patterns are regular expressions taken from
//! external data. Before handing one to the regex builder we bound its
//! length and reject shapes known to blow up matchers (a quantified group
//! that already contains a quantifier). The builder's size limit bounds the
//! rest.

use regex::{Regex, RegexBuilder};

use crate::config::CompileLimits;
use crate::error::DiagnosticKind;

/// Compile a pattern under `limits`.
pub fn compile_pattern(pattern: &str, limits: &CompileLimits) -> Result<Regex, DiagnosticKind> {
    if pattern.is_empty() {
        return Err(DiagnosticKind::EmptyPattern);
    }

    if pattern.len() > limits.max_pattern_len {
        return Err(DiagnosticKind::PatternTooLong {
            len: pattern.len(),
            max: limits.max_pattern_len,
        });
    }

    if limits.reject_nested_quantifiers && has_nested_quantifier(pattern) {
        return Err(DiagnosticKind::NestedQuantifier);
    }

    RegexBuilder::new(pattern)
        .case_insensitive(limits.case_insensitive)
        .size_limit(limits.regex_size_limit)
        .dfa_size_limit(limits.regex_size_limit)
        .build()
        .map_err(|e| DiagnosticKind::InvalidPattern(e.to_string()))
}

/// Detect a quantified group whose body already contains a quantifier,
/// e.g. `(a+)+`, `(?:x.*)*` or `(ab{2,})+`.
///
/// This is a lexical scan, not a full parser: escapes and character
/// classes are skipped so their contents never count as quantifiers.
///
/// The check is conservative. The regex engine matches in linear time, so
/// a flagged pattern such as `(\w+\.)*tracker\.com` cannot backtrack; the
/// hard bound on compiled size is `CompileLimits::regex_size_limit`.
/// Datasets that rely on such shapes can turn the check off with
/// `CompileLimits::reject_nested_quantifiers`.
pub fn has_nested_quantifier(pattern: &str) -> bool {
    let bytes = pattern.as_bytes();
    // One entry per open group: does its body contain a quantifier?
    let mut groups: Vec<bool> = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                i = skip_escape(bytes, i);
                continue;
            }
            b'[' => {
                i = skip_class(bytes, i);
                continue;
            }
            b'(' => {
                groups.push(false);
                // `(?` introduces flags or a non-capturing group, not a quantifier
                if bytes.get(i + 1) == Some(&b'?') {
                    i += 2;
                    continue;
                }
            }
            b')' => {
                let inner = groups.pop().unwrap_or(false);
                if inner && quantifier_len(bytes, i + 1).is_some() {
                    return true;
                }
                if inner {
                    if let Some(parent) = groups.last_mut() {
                        *parent = true;
                    }
                }
            }
            _ => {
                if let Some(len) = quantifier_len(bytes, i) {
                    if let Some(current) = groups.last_mut() {
                        *current = true;
                    }
                    i += len;
                    continue;
                }
            }
        }
        i += 1;
    }

    false
}

/// Length of the quantifier starting at `pos`, if any.
fn quantifier_len(bytes: &[u8], pos: usize) -> Option<usize> {
    match bytes.get(pos)? {
        b'*' | b'+' | b'?' => Some(1),
        b'{' => {
            // {n}, {n,}, {n,m}
            let mut j = pos + 1;
            let digits_start = j;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            if j == digits_start {
                return None;
            }
            if bytes.get(j) == Some(&b',') {
                j += 1;
                while j < bytes.len() && bytes[j].is_ascii_digit() {
                    j += 1;
                }
            }
            if bytes.get(j) == Some(&b'}') {
                Some(j + 1 - pos)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Skip an escape sequence starting at `pos` (the backslash).
fn skip_escape(bytes: &[u8], pos: usize) -> usize {
    let next = pos + 1;
    match bytes.get(next) {
        // \p{Greek}, \x{1F600}
        Some(b'p') | Some(b'P') | Some(b'x') if bytes.get(next + 1) == Some(&b'{') => {
            match bytes[next + 1..].iter().position(|&b| b == b'}') {
                Some(close) => next + 1 + close + 1,
                None => bytes.len(),
            }
        }
        Some(_) => next + 1,
        None => bytes.len(),
    }
}

/// Skip a (possibly nested) character class starting at `pos` (the `[`).
fn skip_class(bytes: &[u8], pos: usize) -> usize {
    let mut depth = 0usize;
    let mut i = pos;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                i = skip_escape(bytes, i);
                continue;
            }
            b'[' => {
                depth += 1;
                i += 1;
                // A leading `^` and/or `]` are literal members
                if bytes.get(i) == Some(&b'^') {
                    i += 1;
                }
                if bytes.get(i) == Some(&b']') {
                    i += 1;
                }
                continue;
            }
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }

    bytes.len()
}
