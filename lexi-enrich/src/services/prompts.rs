//! Prompt construction for backend requests

use crate::models::SourceItem;
use crate::services::completion_backend::CompletionRequest;
use lexi_common::config::BackendConfig;

/// Languages a prompt is written for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    /// Language translations are produced in
    pub native_language: String,
    /// Language being learned
    pub target_language: String,
}

impl From<&BackendConfig> for PromptContext {
    fn from(config: &BackendConfig) -> Self {
        Self {
            native_language: config.native_language.clone(),
            target_language: config.target_language.clone(),
        }
    }
}

impl Default for PromptContext {
    fn default() -> Self {
        Self::from(&BackendConfig::default())
    }
}

const ENRICHMENT_SYSTEM: &str = "You are a vocabulary assistant. Reply with JSON only, no prose and no markdown.";

const TRANSLATION_SYSTEM: &str = "You are a translator. Reply with a JSON array of strings only.";

fn numbered_items(batch: &[SourceItem]) -> String {
    batch
        .iter()
        .enumerate()
        .map(|(i, item)| match &item.translation {
            Some(translation) => format!("{}. {} (meaning: {})", i + 1, item.text, translation),
            None => format!("{}. {}", i + 1, item.text),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Request enrichment of one batch
///
/// The response must hold exactly one record per item, in input order.
pub fn enrichment_request(ctx: &PromptContext, batch: &[SourceItem]) -> CompletionRequest {
    let user = format!(
        "Enrich the following {count} {target} vocabulary items for a {native} speaker.\n\
         Return a JSON array with exactly {count} objects, one per item, in the same order.\n\
         Each object has the fields:\n\
         - \"word\": the item as given\n\
         - \"pronunciation\": a phonetic transcription readable by a {native} speaker\n\
         - \"translation\": the {native} meaning (keep the given meaning when one is provided)\n\
         - \"category\": one of noun, verb, adjective, adverb, phrase, other\n\
         - \"conjugations\": for verbs only, an object with keys first_singular, second_singular, \
         third_singular, first_plural, second_plural, third_plural (present tense)\n\
         - \"examples\": up to two objects with \"sentence\" ({target}) and \"translation\" ({native})\n\n\
         Items:\n{items}",
        count = batch.len(),
        target = ctx.target_language,
        native = ctx.native_language,
        items = numbered_items(batch),
    );

    CompletionRequest {
        system: ENRICHMENT_SYSTEM.to_string(),
        user,
    }
}

/// Request translation of items into the target language
pub fn translation_request(ctx: &PromptContext, items: &[SourceItem]) -> CompletionRequest {
    let user = format!(
        "Translate each of the following {count} words or phrases into {target}.\n\
         Return a JSON array of exactly {count} strings in the same order.\n\n{items}",
        count = items.len(),
        target = ctx.target_language,
        items = numbered_items(items),
    );

    CompletionRequest {
        system: TRANSLATION_SYSTEM.to_string(),
        user,
    }
}
