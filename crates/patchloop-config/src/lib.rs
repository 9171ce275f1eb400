use anyhow::{Context, Result};
use patchloop_core::DEFAULT_MAX_RETRIES;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "patchloop.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderSetting {
    Auto,
    Ollama,
    Openai,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressSetting {
    Auto,
    Silent,
    Verbose,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub provider: Option<ProviderSetting>,
    pub ollama_url: Option<String>,
    pub ollama_model: Option<String>,
    pub openai_base_url: Option<String>,
    pub openai_model: Option<String>,
    pub max_retries: Option<usize>,
    pub settle_delay_ms: Option<u64>,
    pub hint: Option<String>,
    pub verbose: Option<bool>,
    pub progress: Option<ProgressSetting>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnvConfig {
    pub provider: Option<ProviderSetting>,
    pub ollama_url: Option<String>,
    pub ollama_model: Option<String>,
    pub openai_base_url: Option<String>,
    pub openai_model: Option<String>,
    pub openai_api_key: Option<String>,
    pub max_retries: Option<usize>,
    pub settle_delay_ms: Option<u64>,
    pub hint: Option<String>,
    pub verbose: Option<bool>,
    pub progress: Option<ProgressSetting>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliRunOverrides {
    pub provider: Option<ProviderSetting>,
    pub ollama_url: Option<String>,
    pub model: Option<String>,
    pub max_retries: Option<usize>,
    pub settle_delay_ms: Option<u64>,
    pub hint: Option<String>,
    pub verbose: Option<bool>,
    pub no_progress: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDefaults {
    pub provider: ProviderSetting,
    pub ollama_url: String,
    pub ollama_model: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub openai_api_key: Option<String>,
    pub max_retries: usize,
    pub settle_delay_ms: u64,
    pub hint: Option<String>,
    pub verbose: bool,
    pub progress: ProgressSetting,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            provider: ProviderSetting::Auto,
            ollama_url: "http://127.0.0.1:11434".to_string(),
            ollama_model: "qwen2.5-coder:7b".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-4.1-mini".to_string(),
            openai_api_key: None,
            max_retries: DEFAULT_MAX_RETRIES,
            settle_delay_ms: 1000,
            hint: None,
            verbose: false,
            progress: ProgressSetting::Auto,
        }
    }
}

/// Loads `--config` if given, else `./patchloop.json`, else the per-user file.
pub fn load_file_config(explicit_path: Option<&Path>, cwd: &Path) -> Result<Option<FileConfig>> {
    let user_dir = dirs::config_dir().map(|dir| dir.join("patchloop"));
    load_file_config_from(explicit_path, cwd, user_dir.as_deref())
}

pub fn load_file_config_from(
    explicit_path: Option<&Path>,
    cwd: &Path,
    user_dir: Option<&Path>,
) -> Result<Option<FileConfig>> {
    let Some(path) = locate_config(explicit_path, cwd, user_dir) else {
        return Ok(None);
    };
    debug!(path = %path.display(), "loading config file");

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed reading config file {}", path.display()))?;
    let parsed: FileConfig = serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing config file {}", path.display()))?;
    Ok(Some(parsed))
}

fn locate_config(explicit_path: Option<&Path>, cwd: &Path, user_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit_path {
        return Some(p.to_path_buf());
    }
    let local = cwd.join(CONFIG_FILE_NAME);
    if local.exists() {
        return Some(local);
    }
    user_dir
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .filter(|candidate| candidate.exists())
}

impl EnvConfig {
    pub fn from_current_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            provider: lookup("PATCHLOOP_PROVIDER").and_then(|v| parse_provider(&v)),
            ollama_url: lookup("PATCHLOOP_OLLAMA_URL"),
            ollama_model: lookup("PATCHLOOP_OLLAMA_MODEL"),
            openai_base_url: lookup("OPENAI_BASE_URL"),
            openai_model: lookup("PATCHLOOP_MODEL"),
            openai_api_key: lookup("OPENAI_API_KEY").filter(|v| !v.trim().is_empty()),
            max_retries: lookup("PATCHLOOP_MAX_RETRIES").and_then(|v| v.trim().parse().ok()),
            settle_delay_ms: lookup("PATCHLOOP_SETTLE_MS").and_then(|v| v.trim().parse().ok()),
            hint: lookup("PATCHLOOP_HINT").filter(|v| !v.trim().is_empty()),
            verbose: lookup("PATCHLOOP_VERBOSE").and_then(|v| parse_bool(&v)),
            progress: lookup("PATCHLOOP_PROGRESS").and_then(|v| parse_progress(&v)),
        }
    }
}

pub fn resolve_run_defaults(
    cli: &CliRunOverrides,
    env_cfg: &EnvConfig,
    file_cfg: Option<&FileConfig>,
) -> RunDefaults {
    let base = RunDefaults::default();

    let provider = cli
        .provider
        .or(env_cfg.provider)
        .or(file_cfg.and_then(|c| c.provider))
        .unwrap_or(base.provider);

    let ollama_url = cli
        .ollama_url
        .clone()
        .or_else(|| env_cfg.ollama_url.clone())
        .or_else(|| file_cfg.and_then(|c| c.ollama_url.clone()))
        .unwrap_or(base.ollama_url);

    let ollama_model = cli
        .model
        .clone()
        .or_else(|| env_cfg.ollama_model.clone())
        .or_else(|| file_cfg.and_then(|c| c.ollama_model.clone()))
        .unwrap_or(base.ollama_model);

    let openai_base_url = env_cfg
        .openai_base_url
        .clone()
        .or_else(|| file_cfg.and_then(|c| c.openai_base_url.clone()))
        .unwrap_or(base.openai_base_url);

    let openai_model = cli
        .model
        .clone()
        .or_else(|| env_cfg.openai_model.clone())
        .or_else(|| file_cfg.and_then(|c| c.openai_model.clone()))
        .unwrap_or(base.openai_model);

    let max_retries = cli
        .max_retries
        .or(env_cfg.max_retries)
        .or(file_cfg.and_then(|c| c.max_retries))
        .unwrap_or(base.max_retries);

    let settle_delay_ms = cli
        .settle_delay_ms
        .or(env_cfg.settle_delay_ms)
        .or(file_cfg.and_then(|c| c.settle_delay_ms))
        .unwrap_or(base.settle_delay_ms);

    let hint = cli
        .hint
        .clone()
        .or_else(|| env_cfg.hint.clone())
        .or_else(|| file_cfg.and_then(|c| c.hint.clone()))
        .or(base.hint);

    let verbose = cli
        .verbose
        .or(env_cfg.verbose)
        .or(file_cfg.and_then(|c| c.verbose))
        .unwrap_or(base.verbose);

    let mut progress = env_cfg
        .progress
        .or(file_cfg.and_then(|c| c.progress))
        .unwrap_or(base.progress);

    if cli.no_progress == Some(true) {
        progress = ProgressSetting::Silent;
    }

    RunDefaults {
        provider,
        ollama_url,
        ollama_model,
        openai_base_url,
        openai_model,
        openai_api_key: env_cfg.openai_api_key.clone(),
        max_retries,
        settle_delay_ms,
        hint,
        verbose,
        progress,
    }
}

fn parse_bool(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_provider(input: &str) -> Option<ProviderSetting> {
    match input.trim().to_ascii_lowercase().as_str() {
        "auto" => Some(ProviderSetting::Auto),
        "ollama" => Some(ProviderSetting::Ollama),
        "openai" | "openai-compatible" => Some(ProviderSetting::Openai),
        _ => None,
    }
}

fn parse_progress(input: &str) -> Option<ProgressSetting> {
    match input.trim().to_ascii_lowercase().as_str() {
        "auto" => Some(ProgressSetting::Auto),
        "silent" => Some(ProgressSetting::Silent),
        "verbose" => Some(ProgressSetting::Verbose),
        _ => None,
    }
}
