//! Runtime configuration for the agent orchestration core.
//!
//! `AgentConfig` collects every recognized option from the external
//! interfaces table into one typed struct, loaded from environment
//! variables with typed fallbacks, following the precedence pattern the
//! teacher uses for `get_base_url`/`get_model`: an explicit env var always
//! wins, otherwise a documented default applies.
//!
//! # Examples
//!
//! ```rust,no_run
//! use crm_agent_core::config::{AgentConfig, LlmProvider};
//!
//! let config = AgentConfig::from_env();
//! assert!(config.ai_react_max_steps > 0);
//! ```

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// The three LLM providers this core is wired to speak to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    Groq,
    Ollama,
}

impl LlmProvider {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "https://api.openai.com/v1",
            LlmProvider::Groq => "https://api.groq.com/openai/v1",
            LlmProvider::Ollama => "http://localhost:11434/v1",
        }
    }
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LlmProvider::OpenAi),
            "groq" => Ok(LlmProvider::Groq),
            "ollama" => Ok(LlmProvider::Ollama),
            other => Err(format!("unknown LLM_PROVIDER: {other}")),
        }
    }
}

/// Which system prompt template [`crate::prompt::build_system_prompt`]
/// selects. The source carried both a verbose and an "optimized" prompt;
/// this crate keeps both as named presets rather than picking one, but a
/// single turn never mixes rules from both (spec §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptPreset {
    Verbose,
    Optimized,
}

impl PromptPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptPreset::Verbose => "verbose",
            PromptPreset::Optimized => "optimized",
        }
    }
}

impl FromStr for PromptPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "verbose" => Ok(PromptPreset::Verbose),
            "optimized" => Ok(PromptPreset::Optimized),
            other => Err(format!("unknown PROMPT_PRESET: {other}")),
        }
    }
}

/// Optional tracing sidecar configuration. Nothing in this crate reads
/// these fields; they exist so the configuration surface is complete and a
/// future tracing integration has a typed home.
#[derive(Debug, Clone, Default)]
pub struct TracingSidecarConfig {
    pub enabled: bool,
    pub host: Option<String>,
    pub public_key: Option<String>,
    pub secret_key: Option<String>,
}

/// Every recognized configuration option, typed and defaulted.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// `AI_REACT_MAX_STEPS` — maximum ReAct iterations per turn.
    pub ai_react_max_steps: u32,
    /// `AI_REACT_HIGH_CONFIDENCE_THRESHOLD` — used in `confidence_label`
    /// mapping and seeded into the system prompt.
    pub ai_react_high_confidence_threshold: f64,
    /// `TASK_TIMEOUT_SECONDS` — deadline for a whole turn.
    pub task_timeout: Duration,
    /// `LLM_TIMEOUT_SECONDS` — deadline for a single LLM call.
    pub llm_timeout: Duration,
    /// `SOBJECT_CACHE_TTL_HOURS` — object-list cache lifetime.
    pub sobject_cache_ttl: Duration,
    /// `METADATA_CACHE_TTL_HOURS` — per-object metadata cache lifetime.
    pub metadata_cache_ttl: Duration,
    /// `LLM_PROVIDER`
    pub llm_provider: LlmProvider,
    /// `LLM_MODEL_NAME`
    pub llm_model_name: String,
    /// `LLM_API_KEY`
    pub llm_api_key: String,
    /// `LLM_BASE_URL?` — overrides the provider default when set.
    pub llm_base_url: String,
    /// `LLM_TEMPERATURE`
    pub llm_temperature: f64,
    /// `LLM_MAX_TOKENS`
    pub llm_max_tokens: u32,
    /// `METADATA_MAX_OBJECTS` — prompt-seeded cap.
    pub metadata_max_objects: u32,
    /// `METADATA_MAX_FIELDS_PER_OBJECT` — prompt-seeded cap.
    pub metadata_max_fields_per_object: u32,
    /// `QUERY_DEFAULT_LIMIT` — default SOQL row cap (spec default 5, max 10).
    pub query_default_limit: u32,
    /// `PROMPT_PRESET` — which system prompt template to build; recorded
    /// into `meta.metadata.prompt_preset` every turn.
    pub prompt_preset: PromptPreset,
    /// `LANGFUSE_ENABLE_TRACING` and related keys.
    pub tracing: Option<TracingSidecarConfig>,
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_hours(key: &str, default_hours: u64) -> Duration {
    let hours = env::var(key).ok().and_then(|v| v.parse::<u64>().ok()).unwrap_or(default_hours);
    Duration::from_secs(hours * 3600)
}

fn env_seconds(key: &str, default_secs: u64) -> Duration {
    let secs = env::var(key).ok().and_then(|v| v.parse::<u64>().ok()).unwrap_or(default_secs);
    Duration::from_secs(secs)
}

impl AgentConfig {
    /// Build a config by reading environment variables, falling back to
    /// documented defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let llm_provider = env::var("LLM_PROVIDER")
            .ok()
            .and_then(|v| v.parse::<LlmProvider>().ok())
            .unwrap_or(LlmProvider::OpenAi);

        let llm_base_url = env::var("LLM_BASE_URL")
            .unwrap_or_else(|_| llm_provider.default_base_url().to_string());

        let query_default_limit = env_u32("QUERY_DEFAULT_LIMIT", 5).min(10);

        let prompt_preset = env::var("PROMPT_PRESET")
            .ok()
            .and_then(|v| v.parse::<PromptPreset>().ok())
            .unwrap_or(PromptPreset::Optimized);

        let tracing_enabled = env::var("LANGFUSE_ENABLE_TRACING")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        let tracing = if tracing_enabled {
            Some(TracingSidecarConfig {
                enabled: true,
                host: env::var("LANGFUSE_HOST").ok(),
                public_key: env::var("LANGFUSE_PUBLIC_KEY").ok(),
                secret_key: env::var("LANGFUSE_SECRET_KEY").ok(),
            })
        } else {
            None
        };

        Self {
            ai_react_max_steps: env_u32("AI_REACT_MAX_STEPS", 10),
            ai_react_high_confidence_threshold: env_f64("AI_REACT_HIGH_CONFIDENCE_THRESHOLD", 0.8),
            task_timeout: env_seconds("TASK_TIMEOUT_SECONDS", 120),
            llm_timeout: env_seconds("LLM_TIMEOUT_SECONDS", 60),
            sobject_cache_ttl: env_hours("SOBJECT_CACHE_TTL_HOURS", 24),
            metadata_cache_ttl: env_hours("METADATA_CACHE_TTL_HOURS", 24),
            llm_provider,
            llm_model_name: env::var("LLM_MODEL_NAME").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            llm_api_key: env::var("LLM_API_KEY").unwrap_or_default(),
            llm_base_url,
            llm_temperature: env_f64("LLM_TEMPERATURE", 0.1),
            llm_max_tokens: env_u32("LLM_MAX_TOKENS", 4096),
            metadata_max_objects: env_u32("METADATA_MAX_OBJECTS", 200),
            metadata_max_fields_per_object: env_u32("METADATA_MAX_FIELDS_PER_OBJECT", 50),
            query_default_limit,
            prompt_preset,
            tracing,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            ai_react_max_steps: 10,
            ai_react_high_confidence_threshold: 0.8,
            task_timeout: Duration::from_secs(120),
            llm_timeout: Duration::from_secs(60),
            sobject_cache_ttl: Duration::from_secs(24 * 3600),
            metadata_cache_ttl: Duration::from_secs(24 * 3600),
            llm_provider: LlmProvider::OpenAi,
            llm_model_name: "gpt-4o-mini".to_string(),
            llm_api_key: String::new(),
            llm_base_url: LlmProvider::OpenAi.default_base_url().to_string(),
            llm_temperature: 0.1,
            llm_max_tokens: 4096,
            metadata_max_objects: 200,
            metadata_max_fields_per_object: 50,
            query_default_limit: 5,
            prompt_preset: PromptPreset::Optimized,
            tracing: None,
        }
    }
}
