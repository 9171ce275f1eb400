use anyhow::{Context, Result, anyhow};
use patchloop_llm::{CompletionRequest, LlmClient};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    pub base_url: String,
    /// May be empty; the request then fails with a clear message so the
    /// router can record the attempt and move on.
    pub api_key: String,
    pub timeout: Duration,
}

impl OpenAiCompatibleClient {
    pub fn from_parts(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(90),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    temperature: f32,
    response_format: ResponseFormat,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

fn chat_request(req: &CompletionRequest, model: &str) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        temperature: 0.0,
        response_format: ResponseFormat {
            kind: "json_object",
        },
        messages: vec![
            Message {
                role: "system",
                content: req.system.clone(),
            },
            Message {
                role: "user",
                content: req.prompt.clone(),
            },
        ],
    }
}

impl LlmClient for OpenAiCompatibleClient {
    fn complete(&self, req: &CompletionRequest, model: &str) -> Result<String> {
        if self.api_key.trim().is_empty() {
            return Err(anyhow!(
                "OPENAI_API_KEY is required for OpenAI-compatible provider"
            ));
        }

        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .context("failed to build HTTP client")?;
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let response = client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&chat_request(req, model))
            .send()
            .context("failed calling OpenAI-compatible endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_else(|_| "<unavailable>".to_string());
            return Err(anyhow!(
                "OpenAI-compatible request failed ({status}): {body}"
            ));
        }

        let parsed: ChatResponse = response
            .json()
            .context("failed to decode OpenAI-compatible response")?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("OpenAI-compatible response had no content"))
    }
}
