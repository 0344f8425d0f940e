// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! File directive extraction from message text
//!
//! Messages embed file-transfer instructions as plain-text markers:
//! `<SHOW_FILE>…</SHOW_FILE>` wraps a local path (outgoing) or a remote
//! blob name (incoming), `<GENERATE_FILE>…</GENERATE_FILE>` wraps a
//! desired target path for a file the service will produce. An optional
//! attribute block may carry `external_local_path="…"`.
//!
//! Extraction is a tolerant, total function: malformed or unterminated
//! markers are ignored, never an error. The scanner is a small
//! hand-rolled state walk over the text so its accepting behavior is
//! auditable; all functions here are pure.

use std::path::{Path, PathBuf};

/// Marker tag kinds understood by the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerTag {
    ShowFile,
    GenerateFile,
}

impl MarkerTag {
    fn open_name(&self) -> &'static str {
        match self {
            Self::ShowFile => "SHOW_FILE",
            Self::GenerateFile => "GENERATE_FILE",
        }
    }

    fn close_tag(&self) -> &'static str {
        match self {
            Self::ShowFile => "</SHOW_FILE>",
            Self::GenerateFile => "</GENERATE_FILE>",
        }
    }
}

/// One well-formed marker found in text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub tag: MarkerTag,
    /// Raw attribute segment between the tag name and `>`, possibly empty
    pub attrs: String,
    /// Text between the open and close tags, untrimmed
    pub body: String,
    /// Byte offset of the opening `<`
    pub start: usize,
    /// Byte offset just past the closing tag
    pub end: usize,
}

impl Marker {
    /// Value of the `external_local_path` attribute, if present
    pub fn external_local_path(&self) -> Option<String> {
        attr_value(&self.attrs, "external_local_path")
    }
}

/// A transfer instruction derived from marker text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileDirective {
    /// Upload a local file before sending the message
    Upload { source: PathBuf },
    /// Download a remote file after receiving the message
    Download {
        /// Remote blob name
        remote: String,
        /// Explicit local target, when the marker declares one
        target: Option<PathBuf>,
    },
}

/// Scan text for well-formed markers, in order of their opening `<`.
///
/// A candidate is rejected (and scanning resumes one byte later) when the
/// tag name is not followed by whitespace or `>`, when the attribute
/// segment is unterminated or contains `<`, or when no matching close tag
/// follows. Rejected candidates never consume text.
pub fn scan_markers(text: &str) -> Vec<Marker> {
    let mut markers = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }
        match marker_at(text, i) {
            Some(marker) => {
                i = marker.end;
                markers.push(marker);
            }
            None => i += 1,
        }
    }

    markers
}

/// Try to read one complete marker whose `<` sits at `start`.
fn marker_at(text: &str, start: usize) -> Option<Marker> {
    let rest = &text[start + 1..];

    let tag = if rest.starts_with(MarkerTag::ShowFile.open_name()) {
        MarkerTag::ShowFile
    } else if rest.starts_with(MarkerTag::GenerateFile.open_name()) {
        MarkerTag::GenerateFile
    } else {
        return None;
    };

    let name_end = start + 1 + tag.open_name().len();
    let after_name = &text[name_end..];

    // The name must be delimited: either the tag closes right away or an
    // attribute segment starts with whitespace.
    let first = after_name.chars().next()?;
    if first != '>' && !first.is_whitespace() {
        return None;
    }

    let gt = after_name.find('>')?;
    let attrs = &after_name[..gt];
    if attrs.contains('<') {
        return None;
    }

    let body_start = name_end + gt + 1;
    let close = tag.close_tag();
    let close_pos = text[body_start..].find(close)?;

    Some(Marker {
        tag,
        attrs: attrs.to_string(),
        body: text[body_start..body_start + close_pos].to_string(),
        start,
        end: body_start + close_pos + close.len(),
    })
}

/// Read a double-quoted attribute value out of a raw attribute segment.
fn attr_value(attrs: &str, name: &str) -> Option<String> {
    let mut rest = attrs;
    while let Some(pos) = rest.find(name) {
        let after = rest[pos + name.len()..].trim_start();
        if let Some(after_eq) = after.strip_prefix('=') {
            let quoted = after_eq.trim_start().strip_prefix('"')?;
            let end = quoted.find('"')?;
            return Some(quoted[..end].to_string());
        }
        rest = &rest[pos + name.len()..];
    }
    None
}

/// Resolve a marker path: absolute paths are used verbatim, relative ones
/// against the supplied base directory. No normalization of `..` or
/// symlinks happens here.
pub fn resolve_path(raw: &str, base_dir: &Path) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Extract upload directives from outgoing text.
///
/// Every `SHOW_FILE` marker that carries a plain path body becomes an
/// upload. Markers that already carry an `external_local_path` attribute
/// are history echoes of previously uploaded files and are skipped.
pub fn extract_outgoing(text: &str, base_dir: &Path) -> Vec<FileDirective> {
    scan_markers(text)
        .into_iter()
        .filter(|m| m.tag == MarkerTag::ShowFile)
        .filter(|m| m.external_local_path().is_none())
        .filter_map(|m| {
            let raw = m.body.trim();
            if raw.is_empty() {
                return None;
            }
            Some(FileDirective::Upload {
                source: resolve_path(raw, base_dir),
            })
        })
        .collect()
}

/// Extract download directives from incoming text.
///
/// Every `SHOW_FILE` marker becomes a download of the blob named by its
/// body; an `external_local_path` attribute supplies the explicit target.
pub fn extract_incoming(text: &str) -> Vec<FileDirective> {
    scan_markers(text)
        .into_iter()
        .filter(|m| m.tag == MarkerTag::ShowFile)
        .filter_map(|m| {
            let remote = m.body.trim();
            if remote.is_empty() {
                return None;
            }
            Some(FileDirective::Download {
                remote: remote.to_string(),
                target: m.external_local_path().map(PathBuf::from),
            })
        })
        .collect()
}

/// One splice to apply to marker text
#[derive(Debug, Clone)]
pub struct Replacement {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Rebuild text with the given non-overlapping replacements, which must be
/// sorted by start offset (scan order satisfies this).
pub fn apply_replacements(text: &str, replacements: &[Replacement]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for r in replacements {
        if r.start < cursor || r.end > text.len() {
            continue;
        }
        out.push_str(&text[cursor..r.start]);
        out.push_str(&r.text);
        cursor = r.end;
    }
    out.push_str(&text[cursor..]);
    out
}
