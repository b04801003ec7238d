//! Posting, review fetching and review replies over two wire protocols.
//!
//! Every operation tries the primary protocol first and falls back to the
//! legacy one on any failure, timeouts included. Nothing about which
//! protocol worked is remembered between calls.

mod legacy;
mod primary;
mod types;
mod wire;

pub use legacy::LegacyProtocol;
pub use primary::PrimaryProtocol;
pub use types::{DeliveryTarget, FetchedReviews, PostDraft, Protocol, PublishedPost, Review};

use crate::config::DeliveryConfig;
use crate::error::{AutomationError, TimedOperation};
use crate::net::build_client_with_timeout;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

pub type DeliveryFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

pub trait DeliveryProtocol: Send + Sync {
    fn protocol(&self) -> Protocol;

    /// Returns the upstream resource name of the created post, if any.
    fn publish_post<'a>(
        &'a self,
        target: &'a DeliveryTarget,
        draft: &'a PostDraft,
    ) -> DeliveryFuture<'a, Option<String>>;

    fn fetch_reviews<'a>(&'a self, target: &'a DeliveryTarget) -> DeliveryFuture<'a, Vec<Review>>;

    fn reply_to_review<'a>(
        &'a self,
        target: &'a DeliveryTarget,
        review_id: &'a str,
        reply: &'a str,
    ) -> DeliveryFuture<'a, ()>;
}

pub struct DualProtocolDelivery {
    primary: Arc<dyn DeliveryProtocol>,
    legacy: Arc<dyn DeliveryProtocol>,
    timeout: Duration,
}

impl DualProtocolDelivery {
    pub fn new(
        primary: Arc<dyn DeliveryProtocol>,
        legacy: Arc<dyn DeliveryProtocol>,
        timeout: Duration,
    ) -> Self {
        Self {
            primary,
            legacy,
            timeout,
        }
    }

    pub fn from_config(config: &DeliveryConfig) -> Self {
        let client = build_client_with_timeout(config.timeout_secs);
        Self::new(
            Arc::new(PrimaryProtocol::new(client.clone(), &config.primary_base_url)),
            Arc::new(LegacyProtocol::new(client, &config.legacy_base_url)),
            Duration::from_secs(config.timeout_secs.max(1)),
        )
    }

    pub async fn publish_post(
        &self,
        target: &DeliveryTarget,
        draft: &PostDraft,
    ) -> Result<PublishedPost, AutomationError> {
        let (name, protocol) = self
            .with_fallback(
                TimedOperation::Delivery,
                "publish_post",
                &target.location_id,
                self.primary.publish_post(target, draft),
                self.legacy.publish_post(target, draft),
            )
            .await?;
        Ok(PublishedPost { name, protocol })
    }

    pub async fn fetch_reviews(
        &self,
        target: &DeliveryTarget,
    ) -> Result<FetchedReviews, AutomationError> {
        let (reviews, protocol) = self
            .with_fallback(
                TimedOperation::ReviewFetch,
                "fetch_reviews",
                &target.location_id,
                self.primary.fetch_reviews(target),
                self.legacy.fetch_reviews(target),
            )
            .await?;
        Ok(FetchedReviews { reviews, protocol })
    }

    pub async fn reply_to_review(
        &self,
        target: &DeliveryTarget,
        review_id: &str,
        reply: &str,
    ) -> Result<Protocol, AutomationError> {
        let ((), protocol) = self
            .with_fallback(
                TimedOperation::Delivery,
                "reply_to_review",
                &target.location_id,
                self.primary.reply_to_review(target, review_id, reply),
                self.legacy.reply_to_review(target, review_id, reply),
            )
            .await?;
        Ok(protocol)
    }

    /// Futures are lazy, so the legacy request is only sent if it is polled.
    async fn with_fallback<T>(
        &self,
        operation: TimedOperation,
        action: &'static str,
        location_id: &str,
        primary: DeliveryFuture<'_, T>,
        legacy: DeliveryFuture<'_, T>,
    ) -> Result<(T, Protocol), AutomationError> {
        let primary_error = match self.attempt(primary).await {
            Ok(value) => return Ok((value, self.primary.protocol())),
            Err(error) => error,
        };
        tracing::warn!(
            location_id,
            action,
            protocol = %self.primary.protocol(),
            error = %primary_error,
            "primary delivery failed; trying legacy protocol"
        );

        let legacy_error = match self.attempt(legacy).await {
            Ok(value) => return Ok((value, self.legacy.protocol())),
            Err(error) => error,
        };
        tracing::error!(
            location_id,
            action,
            protocol = %self.legacy.protocol(),
            error = %legacy_error,
            "legacy delivery failed"
        );

        if primary_error.timed_out && legacy_error.timed_out {
            return Err(AutomationError::Timeout {
                operation,
                secs: self.timeout.as_secs(),
            });
        }
        Err(AutomationError::DeliveryFailed {
            primary: primary_error.message,
            legacy: legacy_error.message,
        })
    }

    async fn attempt<T>(&self, call: DeliveryFuture<'_, T>) -> Result<T, AttemptError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(AttemptError {
                message: format!("{error:#}"),
                timed_out: false,
            }),
            Err(_) => Err(AttemptError {
                message: format!("timed out after {}s", self.timeout.as_secs()),
                timed_out: true,
            }),
        }
    }
}

struct AttemptError {
    message: String,
    timed_out: bool,
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
