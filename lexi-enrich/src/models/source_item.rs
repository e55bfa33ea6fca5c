//! Source items: cleaned user input awaiting enrichment

use serde::{Deserialize, Serialize};

/// Separator between source text and translation in a pair key
const PAIR_KEY_SEPARATOR: char = '\u{241F}';

/// One user-entered word or phrase
///
/// `translation` is set when the raw input was already a source → target
/// mapping; the backend then only fills in the remaining fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceItem {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
}

impl SourceItem {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            translation: None,
        }
    }

    pub fn pair(text: impl Into<String>, translation: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            translation: Some(translation.into()),
        }
    }

    /// Exact-match dedup key
    pub fn canonical_key(&self) -> String {
        match &self.translation {
            Some(translation) => pair_key(&self.text, translation),
            None => self.text.clone(),
        }
    }
}

/// Dedup key for a source → target pair
pub fn pair_key(text: &str, translation: &str) -> String {
    format!("{}{}{}", text, PAIR_KEY_SEPARATOR, translation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_keys() {
        assert_eq!(SourceItem::plain("casa").canonical_key(), "casa");
        assert_eq!(
            SourceItem::pair("casa", "house").canonical_key(),
            pair_key("casa", "house")
        );
        assert_ne!(
            SourceItem::pair("casa", "house").canonical_key(),
            SourceItem::pair("casa", "home").canonical_key()
        );
    }
}
