//! Language-model gateway implementations for Forgeloop.
//!
//! Every gateway implements `forgeloop_core::Gateway`. The only backend
//! shipped is the OpenAI-compatible chat-completions client, which also
//! covers GLM (Zhipu), OpenAI, OpenRouter, Ollama and vLLM endpoints.

pub mod openai_compat;
pub mod sse;

pub use openai_compat::OpenAiCompatGateway;

use forgeloop_config::AppConfig;
use forgeloop_core::error::GatewayError;

/// Build the gateway described by the configuration.
///
/// Fails with `NotConfigured` when no API key is available.
pub fn build_from_config(config: &AppConfig) -> Result<OpenAiCompatGateway, GatewayError> {
    let api_key = config.api_key.clone().ok_or_else(|| {
        GatewayError::NotConfigured(
            "no API key; set api_key in config.toml or FORGELOOP_API_KEY".into(),
        )
    })?;

    let name = if config.base_url.contains("bigmodel.cn") {
        "glm"
    } else if config.base_url.contains("openrouter.ai") {
        "openrouter"
    } else if config.base_url.contains("api.openai.com") {
        "openai"
    } else {
        "custom"
    };

    Ok(OpenAiCompatGateway::new(name, &config.base_url, api_key, &config.model)?
        .with_max_tokens(config.max_tokens)
        .with_timeout_secs(config.request_timeout_secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeloop_core::Gateway;

    #[test]
    fn missing_key_is_not_configured() {
        let config = AppConfig::default();
        assert!(matches!(
            build_from_config(&config),
            Err(GatewayError::NotConfigured(_))
        ));
    }

    #[test]
    fn default_base_url_builds_glm_gateway() {
        let config = AppConfig {
            api_key: Some("k".into()),
            ..AppConfig::default()
        };
        let gateway = build_from_config(&config).unwrap();
        assert_eq!(gateway.name(), "glm");
        assert_eq!(gateway.model(), "glm-4");
    }
}
