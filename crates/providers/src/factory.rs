use driftbot_core::Config;

use crate::{OllamaProvider, OpenAIProvider, Provider};

/// Default api_base for the OpenAI-compatible providers.
fn default_api_base(provider_name: &str) -> &'static str {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1",
        "openai" => "https://api.openai.com/v1",
        "deepseek" => "https://api.deepseek.com/v1",
        "groq" => "https://api.groq.com/openai/v1",
        _ => "https://api.openai.com/v1",
    }
}

/// Infer the provider name from the model string prefix.
/// Returns None when the prefix is not recognized (fallback needed).
pub fn infer_provider_from_model(model: &str) -> Option<&'static str> {
    if model.starts_with("ollama/") {
        Some("ollama")
    } else if model.starts_with("openrouter/") {
        Some("openrouter")
    } else if model.starts_with("openai/") || model.starts_with("gpt-") || model.starts_with("o1") || model.starts_with("o3") {
        Some("openai")
    } else if model.starts_with("deepseek") {
        Some("deepseek")
    } else if model.starts_with("groq/") {
        Some("groq")
    } else {
        None
    }
}

/// Strip a routing prefix the upstream API does not understand.
/// OpenRouter keeps its full path-style model names.
fn strip_model_prefix<'a>(provider_name: &str, model: &'a str) -> &'a str {
    match provider_name {
        "openai" => model.strip_prefix("openai/").unwrap_or(model),
        "groq" => model.strip_prefix("groq/").unwrap_or(model),
        "openrouter" => model.strip_prefix("openrouter/").unwrap_or(model),
        _ => model,
    }
}

/// Pick the first provider in config with a usable api_key as fallback.
/// Ollama goes last since it needs no key at all.
fn fallback_provider_name(config: &Config) -> Option<&str> {
    let priority = ["openai", "openrouter", "deepseek", "groq"];
    for name in priority {
        if let Some(p) = config.providers.get(name) {
            if !p.api_key.is_empty() && p.api_key != "dummy" {
                return Some(name);
            }
        }
    }
    if config.providers.contains_key("ollama") {
        return Some("ollama");
    }
    None
}

/// Single entry point for provider construction.
///
/// Resolution order:
/// 1. `explicit_provider` (from config.agents.defaults.provider)
/// 2. model string prefix inference ("ollama/llama3.1:8b" selects ollama)
/// 3. first provider in config with a valid api_key
///
/// An explicitly named provider (other than ollama) must exist in config
/// and carry an api_key, otherwise this returns Err.
pub fn create_provider(
    config: &Config,
    model: &str,
    explicit_provider: Option<&str>,
) -> anyhow::Result<Box<dyn Provider>> {
    let max_tokens = config.agents.defaults.max_tokens;
    let temperature = config.agents.defaults.temperature;

    let effective_provider: &str = if let Some(ep) = explicit_provider {
        ep
    } else if let Some(inferred) = infer_provider_from_model(model) {
        inferred
    } else if let Some(fallback) = fallback_provider_name(config) {
        fallback
    } else {
        return Err(anyhow::anyhow!(
            "No LLM provider configured. Set 'provider' in config, use a recognized model prefix \
             (e.g. 'ollama/llama3.1:8b', 'gpt-4o', 'deepseek-chat'), or add an API key to the providers section."
        ));
    };

    let provider_cfg = config.providers.get(effective_provider);

    if explicit_provider.is_some() && effective_provider != "ollama" {
        match provider_cfg {
            None => {
                return Err(anyhow::anyhow!(
                    "Provider '{}' is explicitly configured but not found in providers section",
                    effective_provider
                ));
            }
            Some(cfg) if cfg.api_key.is_empty() || cfg.api_key == "dummy" => {
                return Err(anyhow::anyhow!(
                    "Provider '{}' is explicitly configured but has no API key",
                    effective_provider
                ));
            }
            _ => {}
        }
    }

    let empty_cfg = driftbot_core::config::ProviderConfig::default();
    let resolved_cfg = provider_cfg.unwrap_or(&empty_cfg);
    let proxy = resolved_cfg.proxy.as_deref();

    match effective_provider {
        "ollama" => {
            let api_base = resolved_cfg
                .api_base
                .as_deref()
                .or(Some("http://localhost:11434"));
            Ok(Box::new(OllamaProvider::new(
                api_base,
                model,
                max_tokens,
                temperature,
                proxy,
            )) as Box<dyn Provider>)
        }
        _ => {
            // OpenAI-compatible: openrouter, openai, deepseek, groq
            let api_base = resolved_cfg
                .api_base
                .as_deref()
                .unwrap_or_else(|| default_api_base(effective_provider));
            let model = strip_model_prefix(effective_provider, model);
            Ok(Box::new(OpenAIProvider::new(
                &resolved_cfg.api_key,
                Some(api_base),
                model,
                max_tokens,
                temperature,
                proxy,
            )) as Box<dyn Provider>)
        }
    }
}

/// Build the provider for the task agent from config defaults.
pub fn create_default_provider(config: &Config) -> anyhow::Result<Box<dyn Provider>> {
    let model = &config.agents.defaults.model;
    let explicit_provider = config.agents.defaults.provider.as_deref();
    create_provider(config, model, explicit_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_provider_from_model() {
        assert_eq!(infer_provider_from_model("ollama/llama3.1:8b"), Some("ollama"));
        assert_eq!(infer_provider_from_model("gpt-4o"), Some("openai"));
        assert_eq!(infer_provider_from_model("openai/gpt-4o-mini"), Some("openai"));
        assert_eq!(infer_provider_from_model("deepseek-chat"), Some("deepseek"));
        assert_eq!(infer_provider_from_model("groq/llama-3.3-70b-versatile"), Some("groq"));
        assert_eq!(infer_provider_from_model("openrouter/meta-llama/llama-3.1-8b"), Some("openrouter"));
        assert_eq!(infer_provider_from_model("some-unknown-model"), None);
    }

    #[test]
    fn test_strip_model_prefix() {
        assert_eq!(strip_model_prefix("groq", "groq/llama-3.3-70b"), "llama-3.3-70b");
        assert_eq!(strip_model_prefix("openai", "gpt-4o"), "gpt-4o");
        assert_eq!(
            strip_model_prefix("deepseek", "deepseek-chat"),
            "deepseek-chat"
        );
    }

    #[test]
    fn test_default_model_resolves_to_ollama() {
        let config = Config::default();
        let result = create_default_provider(&config);
        assert!(result.is_ok(), "ollama needs no api key");
    }

    #[test]
    fn test_explicit_provider_wins_over_prefix() {
        let mut config = Config::default();
        config.providers.get_mut("openai").unwrap().api_key = "sk-test".to_string();
        let result = create_provider(&config, "ollama/llama3.1:8b", Some("openai"));
        assert!(result.is_ok());
    }

    #[test]
    fn test_explicit_provider_without_key_is_error() {
        let config = Config::default();
        let result = create_provider(&config, "gpt-4o", Some("openai"));
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_model_falls_back_to_configured_key() {
        let mut config = Config::default();
        config.providers.get_mut("deepseek").unwrap().api_key = "sk-ds".to_string();
        config.providers.remove("ollama");
        config.providers.remove("openai");
        config.providers.remove("openrouter");
        let result = create_provider(&config, "mystery-model", None);
        assert!(result.is_ok());
    }
}
