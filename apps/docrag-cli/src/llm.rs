//! Minimal chat-completions client used by `docrag ask`.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use docrag_core::config::LlmSettings;
use docrag_core::error::{Error, Result};
use docrag_embed::openai::{build_client, make_snippet};

const PROVIDER: &str = "OpenAI chat";

pub struct ChatClient {
    client: reqwest::Client,
    url: String,
    model: String,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl ChatClient {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        let api_key = settings.api_key().ok_or_else(|| {
            Error::InvalidConfig("OPENAI_API_KEY is not set; it is required to answer questions".into())
        })?;
        let endpoint = settings.endpoint.trim().trim_end_matches('/');
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(Error::InvalidConfig(format!("llm.endpoint must be http(s): '{endpoint}'")));
        }
        Ok(Self {
            client: build_client(api_key, settings.proxy(), settings.timeout_secs)?,
            url: format!("{endpoint}/v1/chat/completions"),
            model: settings.model.clone(),
            temperature: settings.temperature,
        })
    }

    pub async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let started = Instant::now();
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: prompt },
            ],
        };
        debug!(model = %self.model, prompt_len = prompt.len(), "POST {}", self.url);

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("transport error: {e}")))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("failed to read response body: {e}")))?;
        if !status.is_success() {
            let snippet = make_snippet(&text);
            error!(
                %status,
                url = %self.url,
                %snippet,
                latency_ms = started.elapsed().as_millis(),
                "chat completion failed"
            );
            return Err(Error::provider(PROVIDER, format!("HTTP {status}: {snippet}")));
        }

        let out: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            Error::provider(PROVIDER, format!("undecodable response: {e}; expected `choices[0].message.content`"))
        })?;
        let answer = out
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .ok_or_else(|| Error::provider(PROVIDER, "response contained no choices"))?;
        debug!(model = %self.model, latency_ms = started.elapsed().as_millis(), "chat completion completed");
        Ok(answer)
    }
}
