use crate::config::ContentConfig;
use crate::net::{api_error, build_client_with_timeout};
use anyhow::Context;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ContentKind {
    Post,
    ReviewReply,
}

/// One generation request, already rendered to prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub kind: ContentKind,
    pub system: String,
    pub prompt: String,
}

/// A single opaque call to a generative text service.
pub trait ContentProvider: Send + Sync {
    fn name(&self) -> &str;

    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client for OpenAI and API-compatible services.
pub struct OpenAiCompatibleProvider {
    /// Pre-computed `"Bearer <key>"` header value.
    cached_auth_header: Option<String>,
    endpoint: String,
    model: String,
    temperature: f64,
    client: Client,
}

impl OpenAiCompatibleProvider {
    pub fn from_config(config: &ContentConfig) -> Self {
        Self {
            cached_auth_header: config
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(|k| format!("Bearer {k}")),
            endpoint: format!("{}/chat/completions", config.api_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            client: build_client_with_timeout(config.timeout_secs),
        }
    }

    async fn call_api(&self, request: &CompletionRequest) -> anyhow::Result<String> {
        let auth_header = self.cached_auth_header.as_ref().ok_or_else(|| {
            anyhow::anyhow!(
                "content API key not set. Set LOCOPILOT_CONTENT_API_KEY or edit config.toml."
            )
        })?;

        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", auth_header)
            .json(&body)
            .send()
            .await
            .context("content request failed")?;

        if !response.status().is_success() {
            return Err(api_error("content", response).await);
        }

        let chat: ChatResponse = response
            .json()
            .await
            .context("content response JSON decode failed")?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("content provider returned no text"))
    }
}

impl ContentProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        "openai_compatible"
    }

    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
        Box::pin(self.call_api(request))
    }
}
