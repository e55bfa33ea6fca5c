//! Enriched word records
//!
//! The validated result for one source item. Records arrive from the backend
//! as loosely-shaped JSON objects; [`EnrichedItem::from_record`] is the single
//! place that turns one of them into a typed item or rejects it.

use crate::models::SourceItem;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Grammatical person used as the conjugation table key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrammaticalPerson {
    #[serde(alias = "1sg")]
    FirstSingular,
    #[serde(alias = "2sg")]
    SecondSingular,
    #[serde(alias = "3sg")]
    ThirdSingular,
    #[serde(alias = "1pl")]
    FirstPlural,
    #[serde(alias = "2pl")]
    SecondPlural,
    #[serde(alias = "3pl")]
    ThirdPlural,
}

/// Present-tense conjugation table
pub type Conjugations = BTreeMap<GrammaticalPerson, String>;

/// Word category
///
/// Closed set. Only `Verb` carries a substructure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WordCategory {
    Noun,
    Verb {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conjugations: Option<Conjugations>,
    },
    Adjective,
    Adverb,
    Phrase,
    Other,
}

impl WordCategory {
    /// Map a backend category label onto the closed set
    fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "noun" | "sustantivo" => WordCategory::Noun,
            "verb" | "verbo" => WordCategory::Verb { conjugations: None },
            "adjective" | "adjetivo" => WordCategory::Adjective,
            "adverb" | "adverbio" => WordCategory::Adverb,
            "phrase" | "expression" | "idiom" | "frase" => WordCategory::Phrase,
            _ => WordCategory::Other,
        }
    }

    pub fn is_verb(&self) -> bool {
        matches!(self, WordCategory::Verb { .. })
    }
}

/// Example sentence with its translation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamplePair {
    pub sentence: String,
    pub translation: String,
}

/// Validated enrichment result for one source item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedItem {
    /// Source text exactly as submitted (position-matched)
    pub source: String,
    /// Text as the backend echoed it (may be a corrected spelling)
    pub word: String,
    pub pronunciation: String,
    pub translation: String,
    pub category: WordCategory,
    #[serde(default)]
    pub examples: Vec<ExamplePair>,
}

/// Why a record could not become an [`EnrichedItem`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRejection {
    pub reason: String,
}

impl std::fmt::Display for ItemRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.reason)
    }
}

fn text_field<'a>(record: &'a Map<String, Value>, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|name| record.get(*name))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
}

fn parse_conjugations(value: &Value) -> Option<Conjugations> {
    let table: Conjugations = value
        .as_object()?
        .iter()
        .filter_map(|(key, form)| {
            let person: GrammaticalPerson =
                serde_json::from_value(Value::String(key.trim().to_lowercase())).ok()?;
            let form = form.as_str()?.trim();
            (!form.is_empty()).then(|| (person, form.to_string()))
        })
        .collect();

    (!table.is_empty()).then_some(table)
}

fn parse_examples(value: Option<&Value>) -> Vec<ExamplePair> {
    let Some(entries) = value.and_then(Value::as_array) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|entry| {
            Some(ExamplePair {
                sentence: text_field(entry, &["sentence", "source", "example"])?.to_string(),
                translation: text_field(entry, &["translation", "target"])?.to_string(),
            })
        })
        .collect()
}

impl EnrichedItem {
    /// Validate one backend record against the source item at the same position
    ///
    /// Translation and pronunciation are mandatory and must be non-empty after
    /// trimming; a missing value is a rejection, never a substitution. When the
    /// source item carries its own translation, that one wins.
    pub fn from_record(source: &SourceItem, record: &Value) -> Result<Self, ItemRejection> {
        let Some(record) = record.as_object() else {
            return Err(ItemRejection {
                reason: format!("record for '{}' is not a JSON object", source.text),
            });
        };

        let pronunciation = text_field(record, &["pronunciation", "transliteration", "transcription"])
            .ok_or_else(|| ItemRejection {
                reason: format!("missing pronunciation for '{}'", source.text),
            })?;

        let translation = match source.translation.as_deref().map(str::trim) {
            Some(given) if !given.is_empty() => given,
            _ => text_field(record, &["translation", "meaning"]).ok_or_else(|| ItemRejection {
                reason: format!("missing translation for '{}'", source.text),
            })?,
        };

        let word = text_field(record, &["word", "source", "original"]).unwrap_or(source.text.as_str());

        let mut category = text_field(record, &["category", "type", "part_of_speech"])
            .map(WordCategory::from_label)
            .unwrap_or(WordCategory::Other);
        if let WordCategory::Verb { conjugations } = &mut category {
            *conjugations = record.get("conjugations").and_then(parse_conjugations);
        }

        Ok(Self {
            source: source.text.clone(),
            word: word.to_string(),
            pronunciation: pronunciation.to_string(),
            translation: translation.to_string(),
            category,
            examples: parse_examples(record.get("examples")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_verb_record() {
        let record = json!({
            "word": "hablar",
            "pronunciation": "a-BLAR",
            "translation": "to speak",
            "category": "Verb",
            "conjugations": {
                "first_singular": "hablo",
                "2sg": "hablas",
                "bogus": "x",
                "third_plural": ""
            },
            "examples": [
                {"sentence": "Hablo español.", "translation": "I speak Spanish."},
                {"sentence": "incomplete"}
            ]
        });

        let item = EnrichedItem::from_record(&SourceItem::plain("hablar"), &record).unwrap();
        assert_eq!(item.translation, "to speak");
        let WordCategory::Verb { conjugations: Some(table) } = &item.category else {
            panic!("expected verb with conjugations, got {:?}", item.category);
        };
        assert_eq!(table.len(), 2);
        assert_eq!(table[&GrammaticalPerson::FirstSingular], "hablo");
        assert_eq!(table[&GrammaticalPerson::SecondSingular], "hablas");
        assert_eq!(item.examples.len(), 1);
    }

    #[test]
    fn test_conjugations_ignored_for_non_verbs() {
        let record = json!({
            "pronunciation": "KA-sa",
            "translation": "house",
            "category": "noun",
            "conjugations": {"first_singular": "caso"}
        });

        let item = EnrichedItem::from_record(&SourceItem::plain("casa"), &record).unwrap();
        assert_eq!(item.category, WordCategory::Noun);
        assert_eq!(item.word, "casa");
    }

    #[test]
    fn test_blank_mandatory_fields_rejected() {
        let source = SourceItem::plain("perro");

        let no_translation = json!({"pronunciation": "PE-rro", "translation": "   "});
        assert!(EnrichedItem::from_record(&source, &no_translation).is_err());

        let no_pronunciation = json!({"translation": "dog"});
        let rejection = EnrichedItem::from_record(&source, &no_pronunciation).unwrap_err();
        assert!(rejection.reason.contains("pronunciation"));

        assert!(EnrichedItem::from_record(&source, &json!("dog")).is_err());
    }

    #[test]
    fn test_given_translation_wins() {
        let record = json!({"pronunciation": "GA-to", "translation": "tomcat"});
        let item = EnrichedItem::from_record(&SourceItem::pair("gato", "cat"), &record).unwrap();
        assert_eq!(item.translation, "cat");

        // Pair input needs no translation from the backend at all
        let record = json!({"pronunciation": "GA-to"});
        assert!(EnrichedItem::from_record(&SourceItem::pair("gato", "cat"), &record).is_ok());
    }

    #[test]
    fn test_unknown_category_is_other() {
        let record = json!({"pronunciation": "o-la", "translation": "hello", "category": "interjection"});
        let item = EnrichedItem::from_record(&SourceItem::plain("hola"), &record).unwrap();
        assert_eq!(item.category, WordCategory::Other);
    }

    #[test]
    fn test_category_serializes_as_tagged_variant() {
        let category = WordCategory::Verb { conjugations: None };
        assert_eq!(serde_json::to_value(&category).unwrap(), json!({"kind": "verb"}));
        assert_eq!(serde_json::to_value(WordCategory::Noun).unwrap(), json!({"kind": "noun"}));
    }
}
