//! Post and review-reply generation.
//!
//! The [`ContentProvider`] does one opaque call; [`ContentGenerator`] owns
//! the local output contract: word bounds and the trailing address line.

mod prompt;
mod provider;

pub use prompt::ReplyTone;
pub use provider::{CompletionRequest, ContentKind, ContentProvider, OpenAiCompatibleProvider};

use crate::automation::BusinessMetadata;
use crate::config::ContentConfig;
use crate::delivery::Review;
use crate::error::{AutomationError, TimedOperation};
use std::sync::Arc;
use std::time::Duration;

pub const ADDRESS_MARKER: &str = "📍";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedContent {
    pub content: String,
}

pub struct ContentGenerator {
    provider: Arc<dyn ContentProvider>,
    min_words: usize,
    max_words: usize,
    timeout: Duration,
}

impl ContentGenerator {
    pub fn new(provider: Arc<dyn ContentProvider>, config: &ContentConfig) -> Self {
        Self {
            provider,
            min_words: config.min_words,
            max_words: config.max_words.max(1),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        }
    }

    pub async fn generate_post(
        &self,
        business: &BusinessMetadata,
        tone_context: Option<&str>,
    ) -> Result<GeneratedContent, AutomationError> {
        let request =
            prompt::post_request(business, tone_context, self.min_words, self.max_words);
        let raw = self.call(&request).await?;
        let content = finalize_post(&raw, business, self.min_words, self.max_words)?;
        Ok(GeneratedContent { content })
    }

    pub async fn generate_reply(
        &self,
        review: &Review,
        business: &BusinessMetadata,
    ) -> Result<GeneratedContent, AutomationError> {
        let request = prompt::reply_request(review, business);
        let raw = self.call(&request).await?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AutomationError::ContentGenerationFailed(
                "provider returned an empty reply".into(),
            ));
        }
        Ok(GeneratedContent {
            content: clamp_words(trimmed, self.max_words).to_string(),
        })
    }

    async fn call(&self, request: &CompletionRequest) -> Result<String, AutomationError> {
        match tokio::time::timeout(self.timeout, self.provider.complete(request)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(error)) => {
                tracing::warn!(
                    provider = self.provider.name(),
                    kind = %request.kind,
                    error = %error,
                    "content generation failed"
                );
                Err(AutomationError::ContentGenerationFailed(format!("{error:#}")))
            }
            Err(_) => Err(AutomationError::Timeout {
                operation: TimedOperation::ContentGeneration,
                secs: self.timeout.as_secs(),
            }),
        }
    }
}

/// Enforces word bounds on the body and ends it with exactly one address
/// line, separated by a blank line.
pub fn finalize_post(
    raw: &str,
    business: &BusinessMetadata,
    min_words: usize,
    max_words: usize,
) -> Result<String, AutomationError> {
    let body = strip_address_lines(raw);

    let words = body.split_whitespace().count();
    if words < min_words {
        return Err(AutomationError::ContentGenerationFailed(format!(
            "generated post has {words} words; at least {min_words} required"
        )));
    }
    let body = clamp_words(body, max_words);

    Ok(format!("{body}\n\n{ADDRESS_MARKER} {}", address_line(business)))
}

fn address_line(business: &BusinessMetadata) -> &str {
    [&business.address, &business.location_text, &business.name]
        .into_iter()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .unwrap_or("Visit us")
}

/// Drops any trailing address lines the provider wrote itself.
fn strip_address_lines(raw: &str) -> &str {
    let mut body = raw.trim();
    while let Some((head, last)) = body.rsplit_once('\n') {
        if last.trim_start().starts_with(ADDRESS_MARKER) {
            body = head.trim_end();
        } else {
            break;
        }
    }
    if body.trim_start().starts_with(ADDRESS_MARKER) && !body.contains('\n') {
        return "";
    }
    body
}

/// Keeps at most `max` whole words, preserving the original spacing.
fn clamp_words(text: &str, max: usize) -> &str {
    let mut count = 0;
    let mut in_word = false;
    for (index, c) in text.char_indices() {
        if c.is_whitespace() {
            in_word = false;
        } else if !in_word {
            if count == max {
                return text[..index].trim_end();
            }
            count += 1;
            in_word = true;
        }
    }
    text
}
