//! JSON shapes shared by both delivery protocols.

use super::types::Review;
use crate::net::api_error;
use anyhow::Context;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

const MAX_REVIEW_PAGES: usize = 5;

/// Strips an optional `prefix/` so ids may be given bare or as resource names.
pub(super) fn bare_id<'a>(id: &'a str, prefix: &str) -> &'a str {
    let id = id.trim().trim_matches('/');
    id.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(id)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewPage {
    #[serde(default)]
    reviews: Vec<WireReview>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReview {
    #[serde(default)]
    review_id: Option<String>,
    /// Resource name, e.g. `locations/1/reviews/abc`.
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    reviewer: Option<WireReviewer>,
    #[serde(default)]
    star_rating: Option<Value>,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    create_time: Option<DateTime<Utc>>,
    #[serde(default)]
    review_reply: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReviewer {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    is_anonymous: bool,
}

impl WireReview {
    /// `None` when the upstream sent no way to address the review.
    fn into_review(self) -> Option<Review> {
        let review_id = self
            .review_id
            .filter(|id| !id.is_empty())
            .or_else(|| {
                self.name
                    .as_deref()
                    .and_then(|name| name.rsplit('/').next())
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
            })?;

        let reviewer_name = self
            .reviewer
            .filter(|r| !r.is_anonymous)
            .and_then(|r| r.display_name)
            .filter(|n| !n.trim().is_empty());

        Some(Review {
            review_id,
            reviewer_name,
            rating: self.star_rating.as_ref().map_or(0, parse_star_rating),
            comment: self.comment.filter(|c| !c.trim().is_empty()),
            created_at: self.create_time,
            has_reply: self.review_reply.is_some_and(|reply| !reply.is_null()),
        })
    }
}

fn parse_star_rating(value: &Value) -> u8 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u8::try_from(n).ok())
            .filter(|n| (1..=5).contains(n))
            .unwrap_or(0),
        Value::String(s) => match s.to_ascii_uppercase().as_str() {
            "ONE" | "1" => 1,
            "TWO" | "2" => 2,
            "THREE" | "3" => 3,
            "FOUR" | "4" => 4,
            "FIVE" | "5" => 5,
            _ => 0,
        },
        _ => 0,
    }
}

/// Follows `nextPageToken` from `url`, stopping after [`MAX_REVIEW_PAGES`].
/// `service` names the protocol in errors.
pub(super) async fn fetch_review_pages(
    client: &Client,
    url: &str,
    access_token: &str,
    service: &'static str,
) -> anyhow::Result<Vec<Review>> {
    let mut reviews = Vec::new();
    let mut page_token: Option<String> = None;

    for _ in 0..MAX_REVIEW_PAGES {
        let mut request = client.get(url).bearer_auth(access_token);
        if let Some(token) = page_token.as_deref() {
            request = request.query(&[("pageToken", token)]);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("{service}: review fetch failed"))?;
        if !response.status().is_success() {
            return Err(api_error(service, response).await);
        }

        let page: ReviewPage = response
            .json()
            .await
            .with_context(|| format!("{service}: review page decode failed"))?;
        reviews.extend(page.reviews.into_iter().filter_map(WireReview::into_review));

        match page.next_page_token.filter(|t| !t.is_empty()) {
            Some(next) => page_token = Some(next),
            None => break,
        }
    }
    Ok(reviews)
}

/// Resource name of a created post, if the response carried one.
pub(super) fn created_name(body: &Value) -> Option<String> {
    body.get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
}
