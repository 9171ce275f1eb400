use anyhow::{Result, anyhow};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    OpenAiCompatible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderSelection {
    Auto,
    Ollama,
    OpenAiCompatible,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub provider: Provider,
    pub model: String,
}

/// One structured-output request. Providers are asked for a single JSON object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    /// Short label for diagnostics, e.g. `"simulate"` or `"fix"`.
    pub purpose: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResponse {
    /// The JSON object extracted from the raw model output.
    pub json: String,
    pub provider: Provider,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAttempt {
    pub provider: Provider,
    pub stage: &'static str,
    pub error: String,
}

#[derive(Debug, Error)]
#[error("LLM routing failed: {}", render_attempts(.attempts))]
pub struct ProviderRoutingError {
    pub attempts: Vec<ProviderAttempt>,
}

fn render_attempts(attempts: &[ProviderAttempt]) -> String {
    if attempts.is_empty() {
        return "no provider was available".to_string();
    }
    attempts
        .iter()
        .map(|a| format!("{:?} ({}): {}", a.provider, a.stage, a.error))
        .collect::<Vec<_>>()
        .join("; ")
}

pub trait LlmClient {
    fn complete(&self, req: &CompletionRequest, model: &str) -> Result<String>;
}

pub trait ReachabilityProbe {
    fn ollama_reachable(&self) -> bool;
}

pub trait CompletionService {
    fn candidate_chain(&self, selection: ProviderSelection) -> Vec<ProviderDescriptor>;
    fn complete(
        &self,
        selection: ProviderSelection,
        req: &CompletionRequest,
        model_override: Option<&str>,
    ) -> Result<CompletionResponse>;
}

impl<T: CompletionService + ?Sized> CompletionService for &T {
    fn candidate_chain(&self, selection: ProviderSelection) -> Vec<ProviderDescriptor> {
        (**self).candidate_chain(selection)
    }

    fn complete(
        &self,
        selection: ProviderSelection,
        req: &CompletionRequest,
        model_override: Option<&str>,
    ) -> Result<CompletionResponse> {
        (**self).complete(selection, req, model_override)
    }
}

/// Pulls the JSON object out of a model reply, tolerating code fences and
/// prose around it.
pub fn normalize_json_output(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("LLM returned empty output"));
    }

    let body = match extract_fenced_code(trimmed) {
        Some(block) if block.trim().is_empty() => {
            return Err(anyhow!("LLM returned empty fenced output"));
        }
        Some(block) => block,
        None => trimmed.to_string(),
    };

    let start = body
        .find('{')
        .ok_or_else(|| anyhow!("LLM output contained no JSON object"))?;
    let end = body
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| anyhow!("LLM output contained an unterminated JSON object"))?;
    Ok(body[start..=end].to_string())
}

fn extract_fenced_code(input: &str) -> Option<String> {
    let start = input.find("```")?;
    let remainder = &input[start + 3..];
    let body_start = remainder.find('\n')? + 1;
    let body = &remainder[body_start..];
    let end = body.find("```")?;
    Some(body[..end].to_string())
}

pub struct ProviderRouter<O, P, R>
where
    O: LlmClient,
    P: LlmClient,
    R: ReachabilityProbe,
{
    pub ollama: O,
    pub openai: P,
    pub reachability: R,
    pub ollama_model: String,
    pub openai_model: String,
}

impl<O, P, R> ProviderRouter<O, P, R>
where
    O: LlmClient,
    P: LlmClient,
    R: ReachabilityProbe,
{
    fn call_provider(
        &self,
        provider: Provider,
        req: &CompletionRequest,
        model_override: Option<&str>,
    ) -> Result<CompletionResponse> {
        let (model, output) = match provider {
            Provider::Ollama => {
                let model = model_override.unwrap_or(&self.ollama_model);
                (model, self.ollama.complete(req, model)?)
            }
            Provider::OpenAiCompatible => {
                let model = model_override.unwrap_or(&self.openai_model);
                (model, self.openai.complete(req, model)?)
            }
        };
        Ok(CompletionResponse {
            json: normalize_json_output(&output)?,
            provider,
            model: model.to_string(),
        })
    }
}

impl<O, P, R> CompletionService for ProviderRouter<O, P, R>
where
    O: LlmClient,
    P: LlmClient,
    R: ReachabilityProbe,
{
    fn candidate_chain(&self, selection: ProviderSelection) -> Vec<ProviderDescriptor> {
        let ollama = ProviderDescriptor {
            provider: Provider::Ollama,
            model: self.ollama_model.clone(),
        };
        let openai = ProviderDescriptor {
            provider: Provider::OpenAiCompatible,
            model: self.openai_model.clone(),
        };
        match selection {
            ProviderSelection::Ollama => vec![ollama],
            ProviderSelection::OpenAiCompatible => vec![openai],
            ProviderSelection::Auto => {
                if self.reachability.ollama_reachable() {
                    vec![ollama, openai]
                } else {
                    vec![openai]
                }
            }
        }
    }

    fn complete(
        &self,
        selection: ProviderSelection,
        req: &CompletionRequest,
        model_override: Option<&str>,
    ) -> Result<CompletionResponse> {
        let chain = self.candidate_chain(selection);
        let mut attempts = Vec::new();

        for entry in chain {
            debug!(provider = ?entry.provider, purpose = req.purpose, "requesting completion");
            match self.call_provider(entry.provider, req, model_override) {
                Ok(response) => return Ok(response),
                Err(err) => {
                    warn!(provider = ?entry.provider, purpose = req.purpose, error = %err, "provider attempt failed");
                    attempts.push(ProviderAttempt {
                        provider: entry.provider,
                        stage: req.purpose,
                        error: format!("{err:#}"),
                    });
                }
            }
        }

        Err(ProviderRoutingError { attempts }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CompletionRequest, CompletionService, LlmClient, Provider, ProviderDescriptor,
        ProviderRouter, ProviderRoutingError, ProviderSelection, ReachabilityProbe,
        normalize_json_output,
    };
    use anyhow::{Result, anyhow};

    struct StubClient {
        fail: bool,
        output: String,
    }

    impl LlmClient for StubClient {
        fn complete(&self, _req: &CompletionRequest, _model: &str) -> Result<String> {
            if self.fail {
                return Err(anyhow!("stub failure"));
            }
            Ok(self.output.clone())
        }
    }

    struct Probe(bool);

    impl ReachabilityProbe for Probe {
        fn ollama_reachable(&self) -> bool {
            self.0
        }
    }

    fn req() -> CompletionRequest {
        CompletionRequest {
            system: "system".to_string(),
            prompt: "prompt".to_string(),
            purpose: "fix",
        }
    }

    fn client(fail: bool, output: &str) -> StubClient {
        StubClient {
            fail,
            output: output.to_string(),
        }
    }

    fn router(
        ollama: StubClient,
        openai: StubClient,
        reachable: bool,
    ) -> ProviderRouter<StubClient, StubClient, Probe> {
        ProviderRouter {
            ollama,
            openai,
            reachability: Probe(reachable),
            ollama_model: "ollama-model".to_string(),
            openai_model: "openai-model".to_string(),
        }
    }

    #[test]
    fn strips_fence() {
        let out = normalize_json_output("```json\n{\"a\": 1}\n```").expect("normalize should pass");
        assert_eq!(out, "{\"a\": 1}");
    }

    #[test]
    fn trims_prose_around_object() {
        let out = normalize_json_output("Here you go: {\"ok\": true} hope it helps")
            .expect("normalize should pass");
        assert_eq!(out, "{\"ok\": true}");
    }

    #[test]
    fn rejects_empty() {
        let err = normalize_json_output("  ").expect_err("must fail");
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn rejects_output_without_object() {
        let err = normalize_json_output("no json here").expect_err("must fail");
        assert!(err.to_string().contains("no JSON object"));
    }

    #[test]
    fn auto_prefers_ollama_when_reachable() {
        let router = router(client(false, "{}"), client(false, "{}"), true);
        let chain = router.candidate_chain(ProviderSelection::Auto);
        assert_eq!(chain[0].provider, Provider::Ollama);
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn auto_skips_unreachable_ollama() {
        let router = router(client(false, "{}"), client(false, "{}"), false);
        let chain = router.candidate_chain(ProviderSelection::Auto);
        assert_eq!(
            chain,
            vec![ProviderDescriptor {
                provider: Provider::OpenAiCompatible,
                model: "openai-model".to_string()
            }]
        );
    }

    #[test]
    fn auto_falls_back_to_openai_on_ollama_failure() {
        let router = router(client(true, ""), client(false, "{\"n\": 3}"), true);
        let response = router
            .complete(ProviderSelection::Auto, &req(), None)
            .expect("fallback should work");
        assert_eq!(response.provider, Provider::OpenAiCompatible);
        assert_eq!(response.json, "{\"n\": 3}");
    }

    #[test]
    fn non_json_output_counts_as_provider_failure() {
        let router = router(client(false, "sorry, I cannot"), client(false, "{\"n\": 1}"), true);
        let response = router
            .complete(ProviderSelection::Auto, &req(), None)
            .expect("fallback should work");
        assert_eq!(response.provider, Provider::OpenAiCompatible);
    }

    #[test]
    fn model_override_applies_to_selected_provider() {
        let router = router(client(false, "{}"), client(false, "{}"), true);
        let response = router
            .complete(ProviderSelection::Ollama, &req(), Some("custom"))
            .expect("ollama path should work");
        assert_eq!(response.model, "custom");
    }

    #[test]
    fn routing_error_lists_every_attempt() {
        let router = router(client(true, ""), client(true, ""), true);
        let err = router
            .complete(ProviderSelection::Auto, &req(), None)
            .expect_err("both providers fail");
        let routing = err
            .downcast_ref::<ProviderRoutingError>()
            .expect("routing error should be preserved");
        assert_eq!(routing.attempts.len(), 2);
        assert!(routing.attempts.iter().all(|a| a.stage == "fix"));
        assert!(err.to_string().contains("stub failure"));
    }
}
