//! Building chat clients from configuration.

use std::sync::Arc;
use std::time::Duration;

use stepwire_config::EngineConfig;
use stepwire_core::error::ProviderError;
use stepwire_core::provider::ChatClient;
use tracing::info;

use crate::openai_compat::OpenAiCompatClient;

/// Create the client described by `config`.
///
/// Fails with [`ProviderError::NotConfigured`] when no API key is set.
pub fn build_from_config(config: &EngineConfig) -> Result<Arc<dyn ChatClient>, ProviderError> {
    let api_key = config
        .api_key
        .as_deref()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| ProviderError::NotConfigured("no API key configured".into()))?;

    let client = OpenAiCompatClient::with_timeouts(
        &config.base_url,
        api_key,
        &config.model,
        Duration::from_secs(config.client.connect_timeout_secs),
        Duration::from_secs(config.client.request_timeout_secs),
    )?;

    info!(model = %config.model, base_url = %config.base_url, "Chat client created");
    Ok(Arc::new(client))
}
