//! Structured scene draft produced by a successful import.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SceneLine {
    pub character_name: String,
    pub text: String,
    /// 1-based position of the line within the scene.
    pub order: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParsedScene {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub characters: Vec<String>,
    pub lines: Vec<SceneLine>,
}

impl ParsedScene {
    /// Checks the draft invariants: non-empty title, characters and lines,
    /// dense `order` starting at 1, and every speaker declared.
    pub fn is_well_formed(&self) -> bool {
        if self.title.trim().is_empty() || self.characters.is_empty() || self.lines.is_empty() {
            return false;
        }
        let mut seen = std::collections::HashSet::new();
        if !self
            .characters
            .iter()
            .all(|c| !c.trim().is_empty() && seen.insert(c.as_str()))
        {
            return false;
        }
        self.lines.iter().enumerate().all(|(i, line)| {
            line.order as usize == i + 1 && seen.contains(line.character_name.as_str())
        })
    }
}
