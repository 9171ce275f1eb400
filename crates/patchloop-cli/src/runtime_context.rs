use crate::ProviderArgs;
use anyhow::{Context, Result};
use patchloop_assist::{AssistOptions, LlmFixProvider, LlmSimulator};
use patchloop_config::{
    CliRunOverrides, EnvConfig, ProgressSetting, ProviderSetting, RunDefaults, load_file_config,
    resolve_run_defaults,
};
use patchloop_core::{CancelToken, EngineRunner, LogEntry, LogKind, RepairLoop, RepairOptions};
use patchloop_engine::BoaEngine;
use patchloop_llm::{ProviderRouter, ProviderSelection};
use patchloop_llm_ollama::OllamaClient;
use patchloop_llm_openai::OpenAiCompatibleClient;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::time::Duration;

type PatchloopRouter = ProviderRouter<OllamaClient, OpenAiCompatibleClient, OllamaClient>;

pub(crate) type PatchloopRepairLoop = RepairLoop<
    EngineRunner<BoaEngine>,
    LlmSimulator<PatchloopRouter>,
    LlmFixProvider<PatchloopRouter>,
>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProgressMode {
    Silent,
    Minimal,
    Verbose,
}

impl ProgressMode {
    /// Program output goes to stdout in every mode; everything else is
    /// progress on stderr.
    pub(crate) fn report(self, entry: &LogEntry) {
        if entry.kind == LogKind::Output {
            println!("{}", entry.message);
            return;
        }
        match self {
            ProgressMode::Silent => {}
            ProgressMode::Minimal => eprintln!("[patchloop] {}", entry.message),
            ProgressMode::Verbose => eprintln!(
                "[patchloop] {} {:?} {}",
                entry.timestamp.format("%H:%M:%S%.3f"),
                entry.level,
                entry.message
            ),
        }
    }

    pub(crate) fn note(self, message: &str) {
        if self != ProgressMode::Silent {
            eprintln!("[patchloop] {message}");
        }
    }
}

pub(crate) fn provider_to_selection(provider: ProviderSetting) -> ProviderSelection {
    match provider {
        ProviderSetting::Auto => ProviderSelection::Auto,
        ProviderSetting::Ollama => ProviderSelection::Ollama,
        ProviderSetting::Openai => ProviderSelection::OpenAiCompatible,
    }
}

pub(crate) fn resolved_progress_mode(progress: ProgressSetting, verbose: bool) -> ProgressMode {
    match progress {
        ProgressSetting::Silent => ProgressMode::Silent,
        ProgressSetting::Verbose => ProgressMode::Verbose,
        ProgressSetting::Auto => {
            if verbose {
                ProgressMode::Verbose
            } else {
                ProgressMode::Minimal
            }
        }
    }
}

pub(crate) fn cli_overrides(provider: &ProviderArgs) -> CliRunOverrides {
    CliRunOverrides {
        provider: provider.provider.map(|p| p.as_setting()),
        ollama_url: provider.ollama_url.clone(),
        model: provider.model.clone(),
        verbose: provider.verbose.then_some(true),
        no_progress: provider.no_progress.then_some(true),
        ..CliRunOverrides::default()
    }
}

pub(crate) fn resolve_config(
    provider: &ProviderArgs,
    cli_overrides: &CliRunOverrides,
) -> Result<RunDefaults> {
    let cwd = std::env::current_dir().context("failed resolving current directory")?;
    let file_cfg = load_file_config(provider.config.as_deref(), &cwd)?;
    let env_cfg = EnvConfig::from_current_env();
    Ok(resolve_run_defaults(
        cli_overrides,
        &env_cfg,
        file_cfg.as_ref(),
    ))
}

fn build_router(resolved: &RunDefaults) -> PatchloopRouter {
    let ollama_client = OllamaClient::new(resolved.ollama_url.clone());
    let openai_client = OpenAiCompatibleClient::from_parts(
        resolved.openai_base_url.clone(),
        resolved.openai_api_key.clone().unwrap_or_default(),
    );

    ProviderRouter {
        ollama: ollama_client.clone(),
        openai: openai_client,
        reachability: ollama_client,
        ollama_model: resolved.ollama_model.clone(),
        openai_model: resolved.openai_model.clone(),
    }
}

pub(crate) fn build_repair_loop(
    resolved: &RunDefaults,
    model_override: Option<String>,
) -> PatchloopRepairLoop {
    let assist = AssistOptions {
        selection: provider_to_selection(resolved.provider),
        model_override,
    };

    RepairLoop {
        local: EngineRunner::new(BoaEngine::new()),
        remote: LlmSimulator::new(build_router(resolved), assist.clone()),
        fixer: LlmFixProvider::new(build_router(resolved), assist),
        options: RepairOptions {
            settle_delay: Duration::from_millis(resolved.settle_delay_ms),
            hint: resolved.hint.clone(),
        },
    }
}

/// Token raised by Ctrl-C or SIGTERM. The run stops at its next checkpoint.
pub(crate) fn interrupt_token() -> Result<CancelToken> {
    let token = CancelToken::new();
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, token.flag())
            .with_context(|| format!("failed registering handler for signal {signal}"))?;
    }
    Ok(token)
}
