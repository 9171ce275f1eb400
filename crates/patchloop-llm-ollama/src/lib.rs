use anyhow::{Context, Result, anyhow};
use patchloop_llm::{CompletionRequest, LlmClient, ReachabilityProbe};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct OllamaClient {
    pub base_url: String,
    /// Budget for the reachability check only.
    pub reach_timeout: Duration,
    pub request_timeout: Duration,
}

impl OllamaClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            reach_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(120),
        }
    }

    pub fn is_reachable(&self) -> bool {
        let client = match Client::builder().timeout(self.reach_timeout).build() {
            Ok(c) => c,
            Err(_) => return false,
        };

        let url = format!("{}/api/tags", self.base_url.trim_end_matches('/'));
        let reachable = client
            .get(url)
            .send()
            .map(|r| r.status().is_success())
            .unwrap_or(false);
        debug!(base_url = %self.base_url, reachable, "checked Ollama reachability");
        reachable
    }
}

impl ReachabilityProbe for OllamaClient {
    fn ollama_reachable(&self) -> bool {
        self.is_reachable()
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    format: &'static str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl LlmClient for OllamaClient {
    fn complete(&self, req: &CompletionRequest, model: &str) -> Result<String> {
        let client = Client::builder()
            .timeout(self.request_timeout)
            .build()
            .context("failed to build HTTP client")?;

        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let response = client
            .post(url)
            .json(&GenerateRequest {
                model,
                system: &req.system,
                prompt: &req.prompt,
                format: "json",
                stream: false,
            })
            .send()
            .context("failed calling Ollama")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_else(|_| "<unavailable>".to_string());
            return Err(anyhow!("Ollama request failed ({status}): {body}"));
        }

        let parsed: GenerateResponse = response
            .json()
            .context("failed to decode Ollama response")?;

        Ok(parsed.response)
    }
}
