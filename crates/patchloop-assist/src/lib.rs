mod prompt;

use patchloop_core::{
    ExecutionOutcome, FixProvider, FixSuggestion, ProjectFileSet, ProviderError, RemoteSimulator,
    RunnerError,
};
use patchloop_llm::{CompletionRequest, CompletionService, ProviderSelection};
use serde::Deserialize;
use tracing::{debug, info};

pub use prompt::{FIX_SYSTEM_PROMPT, SIMULATE_SYSTEM_PROMPT, fix_prompt, simulate_prompt};

#[derive(Debug, Clone)]
pub struct AssistOptions {
    pub selection: ProviderSelection,
    pub model_override: Option<String>,
}

impl Default for AssistOptions {
    fn default() -> Self {
        Self {
            selection: ProviderSelection::Auto,
            model_override: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SimulationReply {
    success: bool,
    output: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Narrates a project's run through a language model.
pub struct LlmSimulator<S: CompletionService> {
    pub service: S,
    pub options: AssistOptions,
}

impl<S: CompletionService> LlmSimulator<S> {
    pub fn new(service: S, options: AssistOptions) -> Self {
        Self { service, options }
    }
}

impl<S: CompletionService> RemoteSimulator for LlmSimulator<S> {
    fn simulate(&self, files: &ProjectFileSet) -> Result<ExecutionOutcome, RunnerError> {
        let req = CompletionRequest {
            system: SIMULATE_SYSTEM_PROMPT.to_string(),
            prompt: simulate_prompt(files),
            purpose: "simulate",
        };
        let response = self
            .service
            .complete(
                self.options.selection,
                &req,
                self.options.model_override.as_deref(),
            )
            .map_err(|err| RunnerError::Remote(format!("{err:#}")))?;
        debug!(provider = ?response.provider, model = %response.model, "simulation reply received");

        let reply: SimulationReply = serde_json::from_str(&response.json)
            .map_err(|err| RunnerError::Remote(format!("malformed simulation reply: {err}")))?;
        Ok(ExecutionOutcome::from_parts(
            reply.success,
            reply.output,
            reply.error,
        ))
    }
}

/// Requests whole-file repairs from a language model.
pub struct LlmFixProvider<S: CompletionService> {
    pub service: S,
    pub options: AssistOptions,
}

impl<S: CompletionService> LlmFixProvider<S> {
    pub fn new(service: S, options: AssistOptions) -> Self {
        Self { service, options }
    }
}

impl<S: CompletionService> FixProvider for LlmFixProvider<S> {
    fn fix(
        &self,
        files: &ProjectFileSet,
        error: &str,
        hint: Option<&str>,
    ) -> Result<FixSuggestion, ProviderError> {
        let req = CompletionRequest {
            system: FIX_SYSTEM_PROMPT.to_string(),
            prompt: fix_prompt(files, error, hint),
            purpose: "fix",
        };
        let response = self
            .service
            .complete(
                self.options.selection,
                &req,
                self.options.model_override.as_deref(),
            )
            .map_err(|err| ProviderError::Unavailable(format!("{err:#}")))?;

        let suggestion = parse_fix(&response.json)?;
        info!(
            provider = ?response.provider,
            model = %response.model,
            files = suggestion.fixed_files.len(),
            "fix suggestion received"
        );
        Ok(suggestion)
    }
}

/// Strict parse of a fix reply: every field present, every file named.
pub fn parse_fix(json: &str) -> Result<FixSuggestion, ProviderError> {
    let suggestion: FixSuggestion =
        serde_json::from_str(json).map_err(|err| ProviderError::Malformed(err.to_string()))?;
    if let Some(index) = suggestion
        .fixed_files
        .iter()
        .position(|f| f.name.trim().is_empty())
    {
        return Err(ProviderError::Malformed(format!(
            "fixedFiles[{index}] has an empty name"
        )));
    }
    Ok(suggestion)
}
