//! Batch enrichment through the completion backend
//!
//! One backend request per attempt, retried under the task's
//! [`RetryPolicy`]. Raw responses always pass through the
//! [`ResultValidator`] before records are matched to batch items.

use crate::error::{EnrichError, EnrichResult};
use crate::models::{EnrichedItem, RetryPolicy, SourceItem};
use crate::services::completion_backend::CompletionBackend;
use crate::services::prompts::{enrichment_request, translation_request, PromptContext};
use crate::services::result_validator::ResultValidator;
use crate::utils::retry_with_backoff;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Result for one item of a batch
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Enriched(EnrichedItem),
    Failed { source: String, reason: String },
}

impl ItemOutcome {
    pub fn is_enriched(&self) -> bool {
        matches!(self, ItemOutcome::Enriched(_))
    }
}

/// Enrichment client
pub struct EnrichmentClient {
    backend: Arc<dyn CompletionBackend>,
    validator: ResultValidator,
    retry: RetryPolicy,
    prompts: PromptContext,
}

impl EnrichmentClient {
    pub fn new(backend: Arc<dyn CompletionBackend>, retry: RetryPolicy, prompts: PromptContext) -> Self {
        Self {
            backend,
            validator: ResultValidator::new(),
            retry,
            prompts,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Validate backend credentials without touching the network
    pub fn check_configuration(&self) -> EnrichResult<()> {
        self.backend.check_configuration()
    }

    /// Enrich one batch
    ///
    /// Returns one outcome per batch item, in batch order. An `Err` means the
    /// whole batch failed (after retries) or, for fatal and cancellation
    /// errors, that the task must stop.
    pub async fn enrich(&self, batch: &[SourceItem], cancel: &CancellationToken) -> EnrichResult<Vec<ItemOutcome>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let request = enrichment_request(&self.prompts, batch);
        let operation = format!("enrich {} item(s) via {}", batch.len(), self.backend.name());

        let raw = retry_with_backoff(&operation, &self.retry, cancel, |_| {
            self.backend.complete(request.clone())
        })
        .await?;

        let records = self.validator.parse_records(&raw)?;

        if records.len() > batch.len() {
            warn!(
                expected = batch.len(),
                received = records.len(),
                "Backend returned extra records; ignoring the surplus"
            );
        } else if records.len() < batch.len() {
            debug!(
                expected = batch.len(),
                received = records.len(),
                "Backend response is short; missing items will be failed"
            );
        }

        let outcomes = batch
            .iter()
            .enumerate()
            .map(|(index, source)| match records.get(index) {
                Some(record) => match EnrichedItem::from_record(source, record) {
                    Ok(item) => ItemOutcome::Enriched(item),
                    Err(rejection) => ItemOutcome::Failed {
                        source: source.text.clone(),
                        reason: rejection.reason,
                    },
                },
                None => ItemOutcome::Failed {
                    source: source.text.clone(),
                    reason: format!("no record for '{}' in backend response", source.text),
                },
            })
            .collect();

        Ok(outcomes)
    }

    /// Translate items' source text into the target language
    ///
    /// Any failure other than cancellation is reported as
    /// [`EnrichError::Translation`].
    pub async fn translate(&self, items: &[SourceItem], cancel: &CancellationToken) -> EnrichResult<Vec<String>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let request = translation_request(&self.prompts, items);
        let operation = format!("translate {} item(s) via {}", items.len(), self.backend.name());

        let raw = retry_with_backoff(&operation, &self.retry, cancel, |_| {
            self.backend.complete(request.clone())
        })
        .await
        .map_err(into_translation_error)?;

        let value = self.validator.parse_value(&raw).map_err(into_translation_error)?;
        let translations = string_array(value).ok_or_else(|| {
            EnrichError::Translation("response is not a JSON array of non-empty strings".to_string())
        })?;

        if translations.len() != items.len() {
            return Err(EnrichError::Translation(format!(
                "expected {} translations, received {}",
                items.len(),
                translations.len()
            )));
        }

        Ok(translations)
    }
}

fn into_translation_error(err: EnrichError) -> EnrichError {
    match err {
        EnrichError::Cancelled | EnrichError::Translation(_) => err,
        other => EnrichError::Translation(other.to_string()),
    }
}

/// Array of strings, or an object wrapping exactly one such array
fn string_array(value: Value) -> Option<Vec<String>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => {
            let mut arrays = map.into_iter().filter_map(|(_, v)| match v {
                Value::Array(items) => Some(items),
                _ => None,
            });
            match (arrays.next(), arrays.next()) {
                (Some(items), None) => items,
                _ => return None,
            }
        }
        _ => return None,
    };

    items
        .into_iter()
        .map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::completion_backend::CompletionRequest;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays canned responses in order
    struct Replay {
        responses: Mutex<Vec<EnrichResult<String>>>,
    }

    impl Replay {
        fn new(mut responses: Vec<EnrichResult<String>>) -> Arc<Self> {
            responses.reverse();
            Arc::new(Self {
                responses: Mutex::new(responses),
            })
        }
    }

    #[async_trait]
    impl CompletionBackend for Replay {
        fn name(&self) -> &str {
            "replay"
        }

        fn check_configuration(&self) -> EnrichResult<()> {
            Ok(())
        }

        async fn complete(&self, _request: CompletionRequest) -> EnrichResult<String> {
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(EnrichError::Transport("script exhausted".to_string())))
        }
    }

    fn client(responses: Vec<EnrichResult<String>>) -> EnrichmentClient {
        let retry = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 1.0,
        };
        EnrichmentClient::new(Replay::new(responses), retry, PromptContext::default())
    }

    fn record(word: &str) -> String {
        format!(r#"{{"word": "{w}", "pronunciation": "/{w}/", "translation": "{w}-en"}}"#, w = word)
    }

    #[tokio::test]
    async fn test_positional_matching_with_short_response() {
        let batch = vec![
            SourceItem::plain("uno"),
            SourceItem::plain("dos"),
            SourceItem::plain("tres"),
        ];
        let raw = format!(r#"[{}, {{"word": "dos"}}]"#, record("uno"));
        let outcomes = client(vec![Ok(raw)])
            .enrich(&batch, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_enriched());
        assert!(matches!(&outcomes[1], ItemOutcome::Failed { source, .. } if source == "dos"));
        assert!(matches!(&outcomes[2], ItemOutcome::Failed { reason, .. } if reason.contains("no record")));
    }

    #[tokio::test]
    async fn test_extra_records_ignored() {
        let raw = format!("[{}, {}]", record("uno"), record("dos"));
        let outcomes = client(vec![Ok(raw)])
            .enrich(&[SourceItem::plain("uno")], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 1);
        let ItemOutcome::Enriched(item) = &outcomes[0] else {
            panic!("expected enriched item");
        };
        assert_eq!(item.translation, "uno-en");
    }

    #[tokio::test(start_paused = true)]
    async fn test_truncated_response_is_repaired() {
        let raw = format!(r#"{{"words": [{}"#, record("uno"));
        let outcomes = client(vec![Err(EnrichError::RateLimited), Ok(raw)])
            .enrich(&[SourceItem::plain("uno")], &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcomes[0].is_enriched());
    }

    #[tokio::test]
    async fn test_lone_brace_fails_batch() {
        let err = client(vec![Ok("{".to_string())])
            .enrich(&[SourceItem::plain("uno")], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_translate() {
        let items = vec![SourceItem::plain("house"), SourceItem::plain("dog")];
        let translations = client(vec![Ok(r#"{"translations": ["casa", "perro"]}"#.to_string())])
            .translate(&items, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(translations, vec!["casa", "perro"]);
    }

    #[tokio::test]
    async fn test_translate_length_mismatch() {
        let err = client(vec![Ok(r#"["casa"]"#.to_string())])
            .translate(&[SourceItem::plain("house"), SourceItem::plain("dog")], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichError::Translation(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_translate_backend_rejection_is_translation_error() {
        let err = client(vec![Err(EnrichError::Rejected {
            status: 400,
            body: "bad".to_string(),
        })])
        .translate(&[SourceItem::plain("house")], &CancellationToken::new())
        .await
        .unwrap_err();
        assert!(matches!(err, EnrichError::Translation(_)));
    }
}
