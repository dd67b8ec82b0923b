// Copyright 2024 Wladimir Palant
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Textual route patterns and their compiler.
//!
//! Host patterns are segmented by `.`, path patterns by `/`. Within a
//! pattern the following forms are recognized:
//!
//! * `literal` — matches exactly this segment.
//! * `:name` — matches any single segment and records it under `name`.
//! * `_` (as a segment) or `:_` — matches any single segment without
//!   recording it.
//! * `[...]` — matches all remaining segments. Authored at the end of a path
//!   pattern and at the beginning of a host pattern, since host patterns
//!   apply to the host labels read from the right.
//! * `[` … `]` — an optional part. Each optional part doubles the number of
//!   compiled variants; the variant without the part is tried first.
//!
//! The whole pattern can also be `_`, matching any host or path, or (for
//! paths) `*`, matching the literal `*` request target of `OPTIONS`
//! requests.
//!
//! Repeated separators at the beginning of a pattern are ignored, an empty
//! segment in the middle is meaningful and matched literally. A trailing
//! separator produces no segment, so `/users` and `/users/` compile to the
//! same pattern.

use log::warn;
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised when compiling routes. Any such error aborts compilation of
/// the whole table, there is no partial compilation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// `:` immediately followed by a separator, a bracket or the end of the
    /// pattern.
    #[error("binding name must not be empty")]
    EmptyBinding,

    /// `[` opening an optional part in the middle of a segment.
    #[error("optional part must start at a segment boundary")]
    MisplacedOpenBracket,

    /// `]` without a matching `[`.
    #[error("unmatched closing bracket")]
    UnmatchedCloseBracket,

    /// `[` without a matching `]`.
    #[error("unterminated optional part")]
    UnterminatedBracket,

    /// A rest marker with further segments after it (before it for host
    /// patterns).
    #[error("rest marker must be the last segment")]
    RestNotLast,

    /// A path pattern that is neither `_` nor `*` has to begin with a slash.
    #[error("path pattern must begin with a slash: {0}")]
    MissingSlash(String),

    /// Wildcard rules accept any input, constraints cannot be applied to
    /// them.
    #[error("constraints cannot be combined with a wildcard pattern")]
    ConstraintsWithWildcard,
}

/// A single compiled pattern segment.
#[derive(Clone, PartialEq, Eq)]
pub enum Segment {
    /// Matches exactly this byte string.
    Literal(Vec<u8>),
    /// Matches any single segment without recording it.
    AnyOne,
    /// Matches any single segment and records it under this name.
    Bind(Arc<str>),
    /// Matches all remaining segments. Only valid as the last segment.
    Rest,
}

impl Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(bytes) => write!(f, "{:?}", String::from_utf8_lossy(bytes)),
            Self::AnyOne => f.write_str("_"),
            Self::Bind(name) => write!(f, ":{name}"),
            Self::Rest => f.write_str("[...]"),
        }
    }
}

/// A compiled host pattern, matched against the reversed host labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPattern {
    /// Matches any host, even one that cannot be split into labels.
    Any,
    /// Matches the host labels segment by segment, rightmost label first.
    Segments(Vec<Segment>),
}

/// A compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    /// Matches any path, even one that cannot be split into segments.
    Any,
    /// Matches the literal `*` request target of `OPTIONS` requests.
    Asterisk,
    /// Matches the path segments in request order.
    Segments(Vec<Segment>),
}

/// Compiles a host pattern into its expanded variants.
pub(crate) fn compile_host(host: &[u8]) -> Result<Vec<HostPattern>, CompileError> {
    if host == b"_" {
        return Ok(vec![HostPattern::Any]);
    }

    let mut variants = compile_rules(host, b'.', Vec::new(), 0, false)?;
    for variant in variants.iter_mut() {
        variant.reverse();
    }
    Ok(finish_variants(host, variants)?
        .into_iter()
        .map(HostPattern::Segments)
        .collect())
}

/// Compiles a path pattern into its expanded variants.
pub(crate) fn compile_path(path: &[u8]) -> Result<Vec<PathPattern>, CompileError> {
    if path == b"_" {
        return Ok(vec![PathPattern::Any]);
    }
    if path == b"*" {
        return Ok(vec![PathPattern::Asterisk]);
    }
    if path.first() != Some(&b'/') {
        return Err(CompileError::MissingSlash(
            String::from_utf8_lossy(path).into_owned(),
        ));
    }

    let variants = compile_rules(&path[1..], b'/', Vec::new(), 0, false)?;
    Ok(finish_variants(path, variants)?
        .into_iter()
        .map(PathPattern::Segments)
        .collect())
}

/// Validates the rest marker position and drops duplicated variants.
fn finish_variants(
    source: &[u8],
    variants: Vec<Vec<Segment>>,
) -> Result<Vec<Vec<Segment>>, CompileError> {
    let mut result: Vec<Vec<Segment>> = Vec::with_capacity(variants.len());
    for variant in variants {
        if variant
            .iter()
            .rev()
            .skip(1)
            .any(|segment| *segment == Segment::Rest)
        {
            return Err(CompileError::RestNotLast);
        }

        if result.contains(&variant) {
            warn!(
                "Optional parts of pattern {} produce identical variants, only considering one",
                String::from_utf8_lossy(source)
            );
        } else {
            result.push(variant);
        }
    }
    Ok(result)
}

/// Compiles pattern text into one segment list per optional-part variant.
///
/// `segments` holds the segments compiled so far, `pending` the number of
/// empty segments seen but not yet materialized. Both are threaded through
/// the recursion for optional parts. `boundary_closed` is set when the text
/// begins right after a closed segment, so that a leading separator doesn't
/// count as an empty segment.
fn compile_rules(
    text: &[u8],
    separator: u8,
    mut segments: Vec<Segment>,
    mut pending: usize,
    mut boundary_closed: bool,
) -> Result<Vec<Vec<Segment>>, CompileError> {
    let mut acc = Vec::new();
    let mut i = 0;
    while i < text.len() {
        let byte = text[i];
        if byte == separator {
            if boundary_closed {
                boundary_closed = false;
            } else if acc.is_empty() {
                if !segments.is_empty() {
                    pending += 1;
                }
            } else {
                push_segment(&mut segments, &mut pending, std::mem::take(&mut acc))?;
            }
            i += 1;
        } else if text[i..].starts_with(b"[...]") {
            if !acc.is_empty() {
                push_segment(&mut segments, &mut pending, std::mem::take(&mut acc))?;
            }
            flush_pending(&mut segments, &mut pending);
            segments.push(Segment::Rest);
            boundary_closed = true;
            i += 5;
        } else if byte == b'[' {
            if !acc.is_empty() {
                // `[` only opens an optional part at a segment boundary or
                // when the part starts with a separator.
                if text.get(i + 1).is_some_and(|next| *next != separator) {
                    return Err(CompileError::MisplacedOpenBracket);
                }
                push_segment(&mut segments, &mut pending, std::mem::take(&mut acc))?;
            }
            let (part, rest) = split_optional(&text[i + 1..])?;

            let mut variants = compile_rules(rest, separator, segments.clone(), pending, true)?;
            let mut with_part = Vec::with_capacity(part.len() + rest.len());
            with_part.extend_from_slice(part);
            with_part.extend_from_slice(rest);
            variants.extend(compile_rules(&with_part, separator, segments, pending, true)?);
            return Ok(variants);
        } else if byte == b']' {
            return Err(CompileError::UnmatchedCloseBracket);
        } else {
            boundary_closed = false;
            acc.push(byte);
            i += 1;
        }
    }

    if !acc.is_empty() {
        push_segment(&mut segments, &mut pending, acc)?;
    }
    Ok(vec![segments])
}

/// Splits the text following `[` into the optional part and the remainder
/// after the matching `]`.
fn split_optional(text: &[u8]) -> Result<(&[u8], &[u8]), CompileError> {
    let mut depth = 0usize;
    for (i, &byte) in text.iter().enumerate() {
        match byte {
            b'[' => depth += 1,
            b']' if depth == 0 => return Ok((&text[..i], &text[i + 1..])),
            b']' => depth -= 1,
            _ => {}
        }
    }
    Err(CompileError::UnterminatedBracket)
}

/// Interprets accumulated segment text and appends the resulting segment.
fn push_segment(
    segments: &mut Vec<Segment>,
    pending: &mut usize,
    acc: Vec<u8>,
) -> Result<(), CompileError> {
    flush_pending(segments, pending);
    let segment = if acc == b"_" {
        Segment::AnyOne
    } else if let Some(name) = acc.strip_prefix(b":") {
        if name.is_empty() {
            return Err(CompileError::EmptyBinding);
        } else if name == b"_" {
            Segment::AnyOne
        } else {
            Segment::Bind(Arc::from(String::from_utf8_lossy(name).as_ref()))
        }
    } else {
        Segment::Literal(acc)
    };
    segments.push(segment);
    Ok(())
}

/// Materializes empty segments preceding a real one.
fn flush_pending(segments: &mut Vec<Segment>, pending: &mut usize) {
    for _ in 0..*pending {
        segments.push(Segment::Literal(Vec::new()));
    }
    *pending = 0;
}
