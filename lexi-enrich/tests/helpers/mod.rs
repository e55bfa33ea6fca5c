//! Shared fixtures for lexi-enrich integration tests
//!
//! `ScriptedBackend` replays a queue of canned steps and, once the queue is
//! empty, answers every enrichment prompt with valid records for exactly the
//! items it was asked about.

#![allow(dead_code)]

use async_trait::async_trait;
use lexi_common::events::EventBus;
use lexi_enrich::error::{EnrichError, EnrichResult};
use lexi_enrich::models::{RetryPolicy, ThrottlePolicy};
use lexi_enrich::services::{
    CompletionBackend, CompletionRequest, EnrichmentClient, PromptContext, Script, SharedCollection,
};
use lexi_enrich::{TaskManager, TaskManagerConfig};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted backend reaction
pub enum Step {
    /// Return this text verbatim
    Respond(String),
    /// Fail the attempt
    Fail(EnrichError),
    /// Never answer (until the request future is dropped)
    Hang,
}

pub struct ScriptedBackend {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<CompletionRequest>>,
    calls: AtomicUsize,
    configured: bool,
}

impl ScriptedBackend {
    /// Answers every request with valid records
    pub fn echo() -> Self {
        Self::with_steps(Vec::new())
    }

    pub fn with_steps(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            configured: true,
        }
    }

    /// Fails `check_configuration`
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::echo()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// Item texts listed in a prompt ("1. casa", "2. banco (meaning: bench)")
pub fn prompt_items(prompt: &str) -> Vec<String> {
    prompt
        .lines()
        .filter_map(|line| {
            let (number, rest) = line.split_once(". ")?;
            number.parse::<usize>().ok()?;
            let text = rest.split(" (meaning: ").next().unwrap_or(rest);
            Some(text.to_string())
        })
        .collect()
}

/// Valid enrichment record for `word`
pub fn record(word: &str) -> serde_json::Value {
    serde_json::json!({
        "word": word,
        "pronunciation": format!("/{}/", word),
        "translation": format!("{} (en)", word),
        "category": "noun",
        "examples": [{"sentence": format!("Una {}.", word), "translation": format!("A {}.", word)}]
    })
}

/// JSON array of valid records for `words`
pub fn records_for(words: &[&str]) -> String {
    serde_json::Value::Array(words.iter().map(|w| record(w)).collect()).to_string()
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn check_configuration(&self) -> EnrichResult<()> {
        if self.configured {
            Ok(())
        } else {
            Err(EnrichError::Config("backend API key is missing".to_string()))
        }
    }

    async fn complete(&self, request: CompletionRequest) -> EnrichResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Respond(text)) => Ok(text),
            Some(Step::Fail(err)) => Err(err),
            Some(Step::Hang) => std::future::pending().await,
            None => {
                let items = prompt_items(&request.user);
                let words: Vec<&str> = items.iter().map(String::as_str).collect();
                Ok(records_for(&words))
            }
        }
    }
}

/// Retry policy with short, deterministic delays
pub fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 1.0,
    }
}

pub struct Harness {
    pub manager: TaskManager,
    pub backend: Arc<ScriptedBackend>,
    pub collection: Arc<SharedCollection>,
    pub events: EventBus,
}

pub struct HarnessOptions {
    pub batch_size: usize,
    pub retry: RetryPolicy,
    pub throttle: ThrottlePolicy,
    pub collection: SharedCollection,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            batch_size: 5,
            retry: quick_retry(),
            throttle: ThrottlePolicy::none(),
            collection: SharedCollection::new(),
        }
    }
}

pub fn harness(backend: ScriptedBackend) -> Harness {
    harness_with(backend, HarnessOptions::default())
}

pub fn harness_with(backend: ScriptedBackend, options: HarnessOptions) -> Harness {
    let backend = Arc::new(backend);
    let collection = Arc::new(options.collection);
    let events = EventBus::new(256);

    let client = EnrichmentClient::new(backend.clone(), options.retry, PromptContext::default());
    let manager = TaskManager::new(
        Arc::new(client),
        collection.clone(),
        Arc::new(events.clone()),
        TaskManagerConfig {
            batch_size: options.batch_size,
            throttle: options.throttle,
            expected_script: Script::Latin,
        },
    );

    Harness {
        manager,
        backend,
        collection,
        events,
    }
}

/// Poll until `condition` holds (real time, bounded)
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
