use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;
use crate::paths::Paths;

/// Environment variable that overrides `agents.defaults.model`.
/// Read once at startup inside `load_or_default`.
pub const MODEL_ENV_VAR: &str = "DRIFTBOT_MODEL";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_base: Option<String>,
    /// Optional proxy URL for this provider's HTTP client.
    #[serde(default)]
    pub proxy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefaults {
    #[serde(default = "default_model")]
    pub model: String,
    /// Explicit provider name. If unset, inferred from the model prefix
    /// (e.g. "ollama/llama3.1:8b" selects the ollama backend).
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Cap on LLM/tool iterations per task. The only bound on a runaway
    /// task, so keep it small.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_llm_max_retries")]
    pub llm_max_retries: u32,
    #[serde(default = "default_llm_retry_delay_ms")]
    pub llm_retry_delay_ms: u64,
}

fn default_model() -> String {
    "ollama/llama3.1:8b".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_steps() -> u32 {
    10
}

fn default_llm_max_retries() -> u32 {
    3
}

fn default_llm_retry_delay_ms() -> u64 {
    2000
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            model: default_model(),
            provider: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_steps: default_max_steps(),
            llm_max_retries: default_llm_max_retries(),
            llm_retry_delay_ms: default_llm_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentsConfig {
    #[serde(default)]
    pub defaults: AgentDefaults,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            defaults: AgentDefaults::default(),
        }
    }
}

/// Timing parameters for the cluster loop. All durations in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacingConfig {
    /// Tasks sampled per cluster.
    #[serde(default = "default_cluster_count")]
    pub cluster_count: usize,
    /// Nominal gap between tasks within a cluster; jittered by +/- 5s.
    #[serde(default = "default_task_interval_secs")]
    pub task_interval_secs: u64,
    /// Nominal idle period between clusters; scaled by uniform(0.8, 1.2).
    #[serde(default = "default_grouping_interval_secs")]
    pub grouping_interval_secs: u64,
    /// Bounds for generic action delays.
    #[serde(default = "default_min_action_delay_secs")]
    pub min_action_delay_secs: u64,
    #[serde(default = "default_max_action_delay_secs")]
    pub max_action_delay_secs: u64,
    /// Bounds for the pre-task "reading/thinking" delay.
    #[serde(default = "default_pre_task_delay_min_secs")]
    pub pre_task_delay_min_secs: u64,
    #[serde(default = "default_pre_task_delay_max_secs")]
    pub pre_task_delay_max_secs: u64,
}

fn default_cluster_count() -> usize {
    5
}

fn default_task_interval_secs() -> u64 {
    10
}

fn default_grouping_interval_secs() -> u64 {
    500
}

fn default_min_action_delay_secs() -> u64 {
    1
}

fn default_max_action_delay_secs() -> u64 {
    20
}

fn default_pre_task_delay_min_secs() -> u64 {
    2
}

fn default_pre_task_delay_max_secs() -> u64 {
    5
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            cluster_count: default_cluster_count(),
            task_interval_secs: default_task_interval_secs(),
            grouping_interval_secs: default_grouping_interval_secs(),
            min_action_delay_secs: default_min_action_delay_secs(),
            max_action_delay_secs: default_max_action_delay_secs(),
            pre_task_delay_min_secs: default_pre_task_delay_min_secs(),
            pre_task_delay_max_secs: default_pre_task_delay_max_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    /// When false, tasks run with web tools only (no browser launch).
    #[serde(default = "default_browser_enabled")]
    pub enabled: bool,
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// Pass --no-sandbox to the browser. Needed in containers.
    #[serde(default)]
    pub no_sandbox: bool,
    /// Explicit browser binary path. Discovered on PATH when unset.
    #[serde(default)]
    pub binary: Option<String>,
    /// Seconds to allow for page load before giving up.
    #[serde(default = "default_navigation_wait_secs")]
    pub navigation_wait_secs: u64,
}

fn default_browser_enabled() -> bool {
    true
}

fn default_headless() -> bool {
    true
}

fn default_navigation_wait_secs() -> u64 {
    30
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            enabled: default_browser_enabled(),
            headless: default_headless(),
            no_sandbox: false,
            binary: None,
            navigation_wait_secs: default_navigation_wait_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default = "default_providers")]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_providers() -> HashMap<String, ProviderConfig> {
    let mut providers = HashMap::new();
    for name in ["ollama", "openai", "openrouter", "deepseek", "groq"] {
        providers.insert(name.to_string(), ProviderConfig::default());
    }
    providers
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agents: AgentsConfig::default(),
            pacing: PacingConfig::default(),
            browser: BrowserConfig::default(),
            providers: default_providers(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load config.json if present, otherwise defaults. The model env var
    /// override is applied here so every entry point sees the same value.
    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        let mut config = if config_path.exists() {
            Self::load(&config_path)?
        } else {
            Self::default()
        };
        if let Ok(model) = std::env::var(MODEL_ENV_VAR) {
            if !model.trim().is_empty() {
                config.agents.defaults.model = model.trim().to_string();
            }
        }
        Ok(config)
    }

    pub fn save(&self, paths: &Paths) -> Result<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_parameters() {
        let config = Config::default();
        assert_eq!(config.pacing.cluster_count, 5);
        assert_eq!(config.pacing.task_interval_secs, 10);
        assert_eq!(config.pacing.grouping_interval_secs, 500);
        assert_eq!(config.pacing.min_action_delay_secs, 1);
        assert_eq!(config.pacing.max_action_delay_secs, 20);
        assert_eq!(config.pacing.pre_task_delay_min_secs, 2);
        assert_eq!(config.pacing.pre_task_delay_max_secs, 5);
        assert_eq!(config.agents.defaults.model, "ollama/llama3.1:8b");
        assert!(config.browser.headless);
    }

    #[test]
    fn test_parse_partial_config() {
        let json = r#"{
            "pacing": { "clusterCount": 3, "groupingIntervalSecs": 120 },
            "browser": { "noSandbox": true }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.pacing.cluster_count, 3);
        assert_eq!(config.pacing.grouping_interval_secs, 120);
        // Untouched fields fall back to defaults
        assert_eq!(config.pacing.task_interval_secs, 10);
        assert!(config.browser.no_sandbox);
        assert!(config.browser.headless);
    }

    #[test]
    fn test_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.pacing.cluster_count, config.pacing.cluster_count);
        assert_eq!(parsed.agents.defaults.model, config.agents.defaults.model);
    }
}
