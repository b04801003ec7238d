use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which wire protocol carried a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Protocol {
    Primary,
    Legacy,
}

/// Where and as whom a delivery is made.
#[derive(Clone)]
pub struct DeliveryTarget {
    pub location_id: String,
    /// Only the legacy protocol addresses locations through their account.
    pub account_id: Option<String>,
    pub access_token: String,
}

impl std::fmt::Debug for DeliveryTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryTarget")
            .field("location_id", &self.location_id)
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
    pub content: String,
    /// Rendered as a `LEARN_MORE` call-to-action.
    pub learn_more_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPost {
    /// Upstream resource name, when the endpoint returned one.
    pub name: Option<String>,
    pub protocol: Protocol,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub review_id: String,
    pub reviewer_name: Option<String>,
    /// 1..=5; 0 when the upstream sent no usable rating.
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    /// The upstream already shows a reply for this review.
    pub has_reply: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedReviews {
    pub reviews: Vec<Review>,
    pub protocol: Protocol,
}
