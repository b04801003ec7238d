use super::types::{DeliveryTarget, PostDraft, Protocol, Review};
use super::wire::{bare_id, created_name, fetch_review_pages};
use super::{DeliveryFuture, DeliveryProtocol};
use crate::net::api_error;
use anyhow::Context;
use reqwest::Client;
use serde_json::{Value, json};

/// The older account-scoped API, used when the primary one refuses.
pub struct LegacyProtocol {
    client: Client,
    base_url: String,
}

impl LegacyProtocol {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn location_url(&self, target: &DeliveryTarget) -> anyhow::Result<String> {
        let account_id = target
            .account_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "legacy protocol needs an account id for location {}",
                    target.location_id
                )
            })?;
        Ok(format!(
            "{}/accounts/{}/locations/{}",
            self.base_url,
            bare_id(account_id, "accounts"),
            bare_id(&target.location_id, "locations")
        ))
    }

    pub(super) fn post_body(draft: &PostDraft) -> Value {
        let mut body = json!({
            "languageCode": "en",
            "summary": draft.content,
            "topicType": "STANDARD",
        });
        if let Some(url) = draft.learn_more_url.as_deref() {
            body["callToAction"] = json!({ "actionType": "LEARN_MORE", "url": url });
        }
        body
    }

    async fn publish(&self, target: &DeliveryTarget, draft: &PostDraft) -> anyhow::Result<Option<String>> {
        let response = self
            .client
            .post(format!("{}/localPosts", self.location_url(target)?))
            .bearer_auth(&target.access_token)
            .json(&Self::post_body(draft))
            .send()
            .await
            .context("legacy publish request failed")?;

        if !response.status().is_success() {
            return Err(api_error("legacy delivery", response).await);
        }
        let body: Value = response.json().await.unwrap_or(Value::Null);
        Ok(created_name(&body))
    }

    async fn fetch(&self, target: &DeliveryTarget) -> anyhow::Result<Vec<Review>> {
        let url = format!("{}/reviews", self.location_url(target)?);
        fetch_review_pages(&self.client, &url, &target.access_token, "legacy delivery").await
    }

    async fn reply(&self, target: &DeliveryTarget, review_id: &str, reply: &str) -> anyhow::Result<()> {
        let response = self
            .client
            .put(format!(
                "{}/reviews/{}/reply",
                self.location_url(target)?,
                bare_id(review_id, "reviews")
            ))
            .bearer_auth(&target.access_token)
            .json(&json!({ "comment": reply }))
            .send()
            .await
            .context("legacy reply request failed")?;

        if !response.status().is_success() {
            return Err(api_error("legacy delivery", response).await);
        }
        Ok(())
    }
}

impl DeliveryProtocol for LegacyProtocol {
    fn protocol(&self) -> Protocol {
        Protocol::Legacy
    }

    fn publish_post<'a>(
        &'a self,
        target: &'a DeliveryTarget,
        draft: &'a PostDraft,
    ) -> DeliveryFuture<'a, Option<String>> {
        Box::pin(self.publish(target, draft))
    }

    fn fetch_reviews<'a>(&'a self, target: &'a DeliveryTarget) -> DeliveryFuture<'a, Vec<Review>> {
        Box::pin(self.fetch(target))
    }

    fn reply_to_review<'a>(
        &'a self,
        target: &'a DeliveryTarget,
        review_id: &'a str,
        reply: &'a str,
    ) -> DeliveryFuture<'a, ()> {
        Box::pin(self.reply(target, review_id, reply))
    }
}
