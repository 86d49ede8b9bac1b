//! Turns raw script text into a [`ParsedScene`] with one remote completion
//! and validates the answer locally.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::client::{CompletionBackend, CompletionRequest, ContentPart};
use crate::error::ImportError;
use crate::sanitize::truncate_chars;
use crate::scene::{ParsedScene, SceneLine};

static RE_CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*\n?(.*?)\s*```\s*$").unwrap());

const STRUCTURE_PROMPT: &str = r#"You convert raw text of a theatrical script into structured JSON.
Respond with a single JSON object and nothing else, using exactly this shape:
{
  "title": "scene or play title",
  "author": "author name, or null when unknown",
  "characters": ["UNIQUE", "CHARACTER", "NAMES"],
  "lines": [
    {"characterName": "NAME", "text": "what the character says", "order": 1}
  ]
}
Rules:
- "lines" lists spoken dialogue in reading order; "order" starts at 1 and increases by 1.
- Every "characterName" must appear in "characters".
- Leave out stage directions, page numbers and headers.
- Keep the wording of the dialogue; fix only obvious OCR errors.
- If no title is printed, invent a short descriptive one."#;

#[async_trait]
pub trait SceneStructurer: Send + Sync {
    async fn structure(&self, raw_text: &str) -> Result<ParsedScene, ImportError>;
}

pub struct AiStructurer {
    backend: Arc<dyn CompletionBackend>,
    model: String,
    max_input_chars: usize,
}

impl AiStructurer {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        model: impl Into<String>,
        max_input_chars: usize,
    ) -> Self {
        Self {
            backend,
            model: model.into(),
            max_input_chars,
        }
    }
}

#[async_trait]
impl SceneStructurer for AiStructurer {
    async fn structure(&self, raw_text: &str) -> Result<ParsedScene, ImportError> {
        let input_chars = raw_text.chars().count();
        if input_chars > self.max_input_chars {
            tracing::warn!(
                input_chars = input_chars,
                limit = self.max_input_chars,
                "Raw text truncated before structuring"
            );
        }
        let text = truncate_chars(raw_text, self.max_input_chars);

        let response = self
            .backend
            .complete(CompletionRequest {
                model: self.model.clone(),
                system: Some(STRUCTURE_PROMPT.to_string()),
                parts: vec![ContentPart::Text(text)],
                json_response: true,
            })
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ImportError::Timeout(e.to_string())
                } else {
                    ImportError::Structuring(e.to_string())
                }
            })?;

        parse_scene_response(&response)
    }
}

#[derive(Debug, Deserialize)]
struct RawScene {
    title: Option<String>,
    #[serde(default)]
    author: Option<Value>,
    #[serde(default)]
    characters: Option<Vec<Value>>,
    #[serde(default)]
    lines: Option<Vec<Value>>,
}

/// Reads one entry of `lines`, or `None` when its speaker, text or order is
/// missing or unusable.
fn read_line(entry: &Value) -> Option<(String, String)> {
    let name = entry
        .get("characterName")
        .or_else(|| entry.get("character"))
        .and_then(non_empty_str)?;
    let text = entry.get("text").and_then(non_empty_str)?;
    let order = match entry.get("order")? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    order.filter(|o| o.is_finite())?;
    Some((name, text))
}

fn non_empty_str(value: &Value) -> Option<String> {
    let s = value.as_str()?.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Validates and normalizes a structuring response.
///
/// Lines with an unusable speaker, text or order are dropped. The rest keep
/// their position in the response and are renumbered from 1, whatever order
/// the model stated. Characters are the declared names plus any speaker that
/// was not declared.
pub fn parse_scene_response(raw: &str) -> Result<ParsedScene, ImportError> {
    let body = match RE_CODE_FENCE.captures(raw) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
        None => raw.trim(),
    };

    let parsed: RawScene = serde_json::from_str(body).map_err(|e| {
        ImportError::Structuring(format!("Response is not a valid scene object: {}", e))
    })?;

    let title = parsed
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ImportError::Structuring("Response has no title".to_string()))?;

    let author = parsed.author.as_ref().and_then(non_empty_str);

    let entries = parsed.lines.unwrap_or_default();
    let kept: Vec<(String, String)> = entries.iter().filter_map(read_line).collect();
    if kept.len() < entries.len() {
        tracing::debug!(
            dropped = entries.len() - kept.len(),
            kept = kept.len(),
            "Dropped unusable dialogue lines"
        );
    }

    let lines: Vec<SceneLine> = kept
        .into_iter()
        .enumerate()
        .map(|(i, (character_name, text))| SceneLine {
            character_name,
            text,
            order: i as u32 + 1,
        })
        .collect();

    let mut seen = HashSet::new();
    let mut characters = Vec::new();
    let declared = parsed
        .characters
        .unwrap_or_default()
        .iter()
        .filter_map(non_empty_str)
        .collect::<Vec<_>>();
    let speakers = lines.iter().map(|l| l.character_name.clone());
    for name in declared.into_iter().chain(speakers) {
        let name = name.trim().to_string();
        if !name.is_empty() && seen.insert(name.clone()) {
            characters.push(name);
        }
    }

    if lines.is_empty() {
        return Err(ImportError::Structuring(
            "No dialogue lines could be identified".to_string(),
        ));
    }
    if characters.is_empty() {
        return Err(ImportError::Structuring(
            "No characters could be identified".to_string(),
        ));
    }

    Ok(ParsedScene {
        title,
        author,
        characters,
        lines,
    })
}
