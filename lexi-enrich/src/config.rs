//! Pipeline assembly from the TOML configuration
//!
//! Turns [`TomlConfig`] sections into the policies and collaborators the
//! task manager runs with. Credential problems are deliberately not errors
//! here: they surface on the first task as a configuration failure.

use crate::error::EnrichResult;
use crate::models::{RetryPolicy, ThrottlePolicy};
use crate::services::{
    CompletionBackend, EnrichmentClient, HttpCompletionBackend, PromptContext, Script, WordCollection,
};
use crate::task_manager::{ProgressObserver, TaskManager, TaskManagerConfig};
use lexi_common::config::TomlConfig;
use std::sync::Arc;
use tracing::{info, warn};

/// Worker settings from the `[enrichment]` and `[backend]` sections
pub fn task_manager_config(config: &TomlConfig) -> EnrichResult<TaskManagerConfig> {
    let expected_script: Script = config.backend.expected_script.parse()?;

    if config.enrichment.batch_size == 0 {
        warn!("enrichment.batch_size is 0; using 1");
    }

    Ok(TaskManagerConfig {
        batch_size: config.enrichment.batch_size.max(1),
        throttle: ThrottlePolicy::from(&config.enrichment.throttle),
        expected_script,
    })
}

/// HTTP backend with the resolved API key (ENV → TOML)
pub fn build_backend(config: &TomlConfig) -> EnrichResult<HttpCompletionBackend> {
    let api_key = config.resolve_api_key();
    if api_key.is_none() {
        warn!(
            "No backend API key configured. Set {} or backend.api_key in the config file.",
            lexi_common::config::API_KEY_ENV_VAR
        );
    }
    HttpCompletionBackend::new(&config.backend, api_key)
}

/// Enrichment client with the configured retry policy
pub fn build_client(config: &TomlConfig, backend: Arc<dyn CompletionBackend>) -> EnrichmentClient {
    let retry = RetryPolicy::from(&config.enrichment.retry);
    info!(
        backend = backend.name(),
        max_retries = retry.max_retries,
        base_delay_ms = retry.base_delay.as_millis() as u64,
        "Enrichment client configured"
    );
    EnrichmentClient::new(backend, retry, PromptContext::from(&config.backend))
}

/// Fully wired task manager
pub fn build_task_manager(
    config: &TomlConfig,
    backend: Arc<dyn CompletionBackend>,
    collection: Arc<dyn WordCollection>,
    observer: Arc<dyn ProgressObserver>,
) -> EnrichResult<TaskManager> {
    let manager_config = task_manager_config(config)?;
    let client = build_client(config, backend);
    Ok(TaskManager::new(Arc::new(client), collection, observer, manager_config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EnrichError;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        let manager_config = task_manager_config(&config).unwrap();

        assert_eq!(manager_config.batch_size, 5);
        assert_eq!(manager_config.expected_script, Script::Latin);
        assert_eq!(manager_config.throttle.delay_after(0), Duration::from_millis(500));
    }

    #[test]
    fn test_unknown_script_rejected() {
        let mut config = TomlConfig::default();
        config.backend.expected_script = "runic".to_string();
        assert!(matches!(task_manager_config(&config), Err(EnrichError::Config(_))));
    }

    #[test]
    fn test_zero_batch_size_normalised() {
        let mut config = TomlConfig::default();
        config.enrichment.batch_size = 0;
        assert_eq!(task_manager_config(&config).unwrap().batch_size, 1);
    }
}
