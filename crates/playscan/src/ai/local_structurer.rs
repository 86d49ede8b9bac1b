//! Rule-based structuring for jobs that may not use the remote service.
//!
//! Recognizes the two layouts common in printed scripts: `NAME: speech` on
//! one line, and a capitalized speaker cue on its own line followed by the
//! speech. Parenthesized or bracketed lines are stage directions.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use super::structurer::{parse_scene_response, SceneStructurer};
use crate::error::ImportError;
use crate::scene::ParsedScene;

static RE_INLINE_CUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z][A-Z0-9 .'\-]{0,39}?)\s*(?:\([^)]*\))?\s*[:.]\s+(\S.*)$").unwrap()
});
static RE_CUE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z][A-Z0-9 .'\-]{0,39}?)\s*(?:\([^)]*\))?\s*:?$").unwrap());
static RE_AUTHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:by|written by)\s+(.+)$").unwrap());

/// Headings that look like speaker cues but are not.
const NON_SPEAKERS: &[&str] = &[
    "ACT", "SCENE", "END", "CURTAIN", "THE END", "EXIT", "EXEUNT", "BLACKOUT", "PROLOGUE",
    "EPILOGUE", "INTERMISSION",
];

const UNTITLED: &str = "Untitled scene";

#[derive(Debug, Clone, Default)]
pub struct LocalStructurer;

impl LocalStructurer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SceneStructurer for LocalStructurer {
    async fn structure(&self, raw_text: &str) -> Result<ParsedScene, ImportError> {
        structure_locally(raw_text)
    }
}

/// Builds a draft from raw text with layout heuristics only.
pub fn structure_locally(raw_text: &str) -> Result<ParsedScene, ImportError> {
    let mut title: Option<String> = None;
    let mut author: Option<String> = None;
    let mut lines: Vec<(String, String)> = Vec::new();
    let mut pending_speaker: Option<String> = None;
    let mut continuing = false;

    for line in raw_text.lines().map(str::trim) {
        if line.is_empty() {
            continuing = false;
            continue;
        }
        if is_stage_direction(line) {
            continue;
        }

        if let Some(caps) = RE_INLINE_CUE.captures(line) {
            let speaker = caps[1].trim().to_string();
            if is_speaker(&speaker) {
                lines.push((speaker, caps[2].trim().to_string()));
                pending_speaker = None;
                continuing = true;
                continue;
            }
        }

        if let Some(caps) = RE_CUE_LINE.captures(line) {
            let speaker = caps[1].trim().to_string();
            if is_speaker(&speaker) && (title.is_some() || !lines.is_empty()) {
                pending_speaker = Some(speaker);
                continuing = false;
                continue;
            }
        }

        if let Some(speaker) = pending_speaker.take() {
            lines.push((speaker, line.to_string()));
            continuing = true;
            continue;
        }

        if continuing {
            if let Some((_, text)) = lines.last_mut() {
                text.push(' ');
                text.push_str(line);
                continue;
            }
        }

        if lines.is_empty() {
            if title.is_none() {
                title = Some(line.to_string());
            } else if author.is_none() {
                if let Some(caps) = RE_AUTHOR.captures(line) {
                    author = Some(caps[1].trim().to_string());
                }
            }
        }
    }

    // Reuse the validation and normalization applied to remote responses.
    let lines_json: Vec<_> = lines
        .iter()
        .enumerate()
        .map(|(i, (speaker, text))| {
            json!({ "characterName": speaker, "text": text, "order": i + 1 })
        })
        .collect();
    let response = json!({
        "title": title.unwrap_or_else(|| UNTITLED.to_string()),
        "author": author,
        "lines": lines_json,
    });
    parse_scene_response(&response.to_string())
}

fn is_stage_direction(line: &str) -> bool {
    (line.starts_with('(') && line.ends_with(')')) || (line.starts_with('[') && line.ends_with(']'))
}

fn is_speaker(candidate: &str) -> bool {
    let name = candidate.trim_end_matches('.').trim();
    name.chars().any(|c| c.is_ascii_alphabetic())
        && !NON_SPEAKERS
            .iter()
            .any(|word| name == *word || name.starts_with(&format!("{} ", word)))
}
