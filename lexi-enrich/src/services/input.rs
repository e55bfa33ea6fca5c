//! Raw input parsing and script detection
//!
//! A submission is either a structured payload of source/translation pairs
//! or a plain newline-separated word list. Structured payloads are JSON
//! (array or object) or line-oriented text where every line carries one of
//! the pair separators.

use crate::error::EnrichError;
use crate::models::SourceItem;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Line separators recognised for pair input, in priority order
const PAIR_SEPARATORS: &[&str] = &["\t", " — ", " - ", " = "];

/// Field names holding the source side of a JSON pair object
const SOURCE_FIELDS: &[&str] = &["word", "text", "source", "term"];

/// Field names holding the translation side of a JSON pair object
const TRANSLATION_FIELDS: &[&str] = &["translation", "meaning", "target", "definition"];

/// Cleaned input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInput {
    pub items: Vec<SourceItem>,
    /// Whether the input was recognised as a pair payload
    pub structured: bool,
}

fn make_item(text: &str, translation: Option<&str>) -> Option<SourceItem> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match translation.map(str::trim).filter(|t| !t.is_empty()) {
        Some(translation) => Some(SourceItem::pair(text, translation)),
        None => Some(SourceItem::plain(text)),
    }
}

fn field<'a>(object: &'a serde_json::Map<String, Value>, names: &[&str]) -> Option<&'a str> {
    names.iter().find_map(|name| object.get(*name).and_then(Value::as_str))
}

fn items_from_json(value: &Value) -> Option<Vec<SourceItem>> {
    match value {
        Value::Array(entries) => entries
            .iter()
            .map(|entry| match entry {
                Value::String(text) => Some(make_item(text, None)),
                Value::Array(pair) => match pair.as_slice() {
                    [Value::String(text), Value::String(translation)] => {
                        Some(make_item(text, Some(translation)))
                    }
                    _ => None,
                },
                Value::Object(object) => {
                    let text = field(object, SOURCE_FIELDS)?;
                    Some(make_item(text, field(object, TRANSLATION_FIELDS)))
                }
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(|items| items.into_iter().flatten().collect()),
        Value::Object(map) => map
            .iter()
            .map(|(text, translation)| translation.as_str().map(|t| make_item(text, Some(t))))
            .collect::<Option<Vec<_>>>()
            .map(|items| items.into_iter().flatten().collect()),
        _ => None,
    }
}

fn split_pair(line: &str) -> Option<(&str, &str)> {
    PAIR_SEPARATORS
        .iter()
        .find_map(|sep| line.split_once(sep))
}

/// Parse a raw submission into cleaned source items
///
/// Lines are trimmed and blank lines dropped. Duplicates are kept; that is
/// the planner's job.
pub fn parse_input(raw: &str) -> ParsedInput {
    let trimmed = raw.trim();

    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        if let Some(items) = serde_json::from_str::<Value>(trimmed)
            .ok()
            .as_ref()
            .and_then(items_from_json)
        {
            return ParsedInput {
                items,
                structured: true,
            };
        }
    }

    let lines: Vec<&str> = trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if !lines.is_empty() && lines.iter().all(|line| split_pair(line).is_some()) {
        let items = lines
            .iter()
            .filter_map(|line| split_pair(line))
            .filter_map(|(text, translation)| make_item(text, Some(translation)))
            .collect();
        return ParsedInput {
            items,
            structured: true,
        };
    }

    ParsedInput {
        items: lines.into_iter().filter_map(|line| make_item(line, None)).collect(),
        structured: false,
    }
}

/// Writing system of source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Script {
    Latin,
    Cyrillic,
    Greek,
    Arabic,
    Hebrew,
    Cjk,
    Kana,
    Hangul,
}

impl Script {
    /// Classify a single character; `None` for digits, punctuation and other scripts
    pub fn of_char(c: char) -> Option<Self> {
        match c as u32 {
            0x0041..=0x005A | 0x0061..=0x007A | 0x00C0..=0x024F | 0x1E00..=0x1EFF => Some(Script::Latin),
            0x0370..=0x03FF | 0x1F00..=0x1FFF => Some(Script::Greek),
            0x0400..=0x052F => Some(Script::Cyrillic),
            0x0590..=0x05FF => Some(Script::Hebrew),
            0x0600..=0x06FF | 0x0750..=0x077F => Some(Script::Arabic),
            0x3040..=0x30FF => Some(Script::Kana),
            0x4E00..=0x9FFF | 0x3400..=0x4DBF => Some(Script::Cjk),
            0xAC00..=0xD7AF | 0x1100..=0x11FF => Some(Script::Hangul),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Script::Latin => "latin",
            Script::Cyrillic => "cyrillic",
            Script::Greek => "greek",
            Script::Arabic => "arabic",
            Script::Hebrew => "hebrew",
            Script::Cjk => "cjk",
            Script::Kana => "kana",
            Script::Hangul => "hangul",
        }
    }

    /// Japanese text mixes kana and kanji; treat the pair as one system
    fn compatible_with(self, other: Script) -> bool {
        self == other || matches!((self, other), (Script::Kana, Script::Cjk) | (Script::Cjk, Script::Kana))
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Script {
    type Err = EnrichError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "latin" => Ok(Script::Latin),
            "cyrillic" => Ok(Script::Cyrillic),
            "greek" => Ok(Script::Greek),
            "arabic" => Ok(Script::Arabic),
            "hebrew" => Ok(Script::Hebrew),
            "cjk" | "han" | "chinese" => Ok(Script::Cjk),
            "kana" | "japanese" => Ok(Script::Kana),
            "hangul" | "korean" => Ok(Script::Hangul),
            other => Err(EnrichError::Config(format!("unknown script '{}'", other))),
        }
    }
}

/// Dominant script over the items' source text, by letter count
pub fn detect_script(items: &[SourceItem]) -> Option<Script> {
    let mut counts: Vec<(Script, usize)> = Vec::new();

    for script in items.iter().flat_map(|item| item.text.chars()).filter_map(Script::of_char) {
        match counts.iter_mut().find(|(s, _)| *s == script) {
            Some((_, n)) => *n += 1,
            None => counts.push((script, 1)),
        }
    }

    // First-seen script wins ties
    counts
        .iter()
        .fold(None, |best: Option<(Script, usize)>, &(script, n)| match best {
            Some((_, best_n)) if best_n >= n => best,
            _ => Some((script, n)),
        })
        .map(|(script, _)| script)
}

/// Whether the items must be translated before enrichment
pub fn needs_translation(items: &[SourceItem], expected: Script) -> bool {
    match detect_script(items) {
        Some(detected) => !detected.compatible_with(expected),
        None => false,
    }
}
