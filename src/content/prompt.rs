use super::provider::{CompletionRequest, ContentKind};
use crate::automation::BusinessMetadata;
use crate::delivery::Review;
use std::fmt::Write as _;

/// The tone a reply should take, derived from the star rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyTone {
    Grateful,
    Appreciative,
    Apologetic,
}

impl ReplyTone {
    pub fn for_rating(rating: u8) -> Self {
        match rating {
            4.. => Self::Grateful,
            3 => Self::Appreciative,
            _ => Self::Apologetic,
        }
    }

    fn instruction(self) -> &'static str {
        match self {
            Self::Grateful => {
                "Thank the reviewer warmly and specifically, and invite them back."
            }
            Self::Appreciative => {
                "Thank the reviewer for the balanced feedback, acknowledge what could be \
                 better, and say you hope to earn five stars next time."
            }
            Self::Apologetic => {
                "Apologize sincerely without being defensive, acknowledge the specific \
                 problem, and offer a concrete way to make it right or to get in touch."
            }
        }
    }
}

pub(super) fn post_request(
    business: &BusinessMetadata,
    tone_context: Option<&str>,
    min_words: usize,
    max_words: usize,
) -> CompletionRequest {
    let system = format!(
        "You write short social posts for a local business profile. Write between \
         {min_words} and {max_words} words of plain text. No hashtags, no markdown, no \
         placeholder text. Do not include the street address; it is appended separately."
    );

    let mut prompt = format!("Write a new post for {}.", display_name(business));
    if !business.category.trim().is_empty() {
        let _ = write!(prompt, "\nCategory: {}", business.category.trim());
    }
    if !business.keywords.is_empty() {
        let _ = write!(prompt, "\nWork in some of: {}", business.keywords.join(", "));
    }
    if !business.location_text.trim().is_empty() {
        let _ = write!(prompt, "\nArea: {}", business.location_text.trim());
    }
    if !business.address.trim().is_empty() {
        let _ = write!(prompt, "\nAddress (for context only): {}", business.address.trim());
    }
    if let Some(tone) = tone_context.map(str::trim).filter(|t| !t.is_empty()) {
        let _ = write!(prompt, "\nTone: {tone}");
    }

    CompletionRequest {
        kind: ContentKind::Post,
        system,
        prompt,
    }
}

pub(super) fn reply_request(review: &Review, business: &BusinessMetadata) -> CompletionRequest {
    let tone = ReplyTone::for_rating(review.rating);
    let system = format!(
        "You reply to customer reviews on behalf of {}. Keep it under 80 words, \
         friendly and human. {}",
        display_name(business),
        tone.instruction()
    );

    let mut prompt = String::from("Write a reply to this review.");
    match review.reviewer_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => {
            let _ = write!(prompt, "\nReviewer: {name} (address them by name)");
        }
        _ => prompt.push_str("\nReviewer: anonymous"),
    }
    let _ = write!(prompt, "\nRating: {}/5", review.rating);
    match review.comment.as_deref().map(str::trim) {
        Some(comment) if !comment.is_empty() => {
            let _ = write!(prompt, "\nReview text: {comment}");
        }
        _ => prompt.push_str("\nReview text: (rating only, no text)"),
    }

    CompletionRequest {
        kind: ContentKind::ReviewReply,
        system,
        prompt,
    }
}

fn display_name(business: &BusinessMetadata) -> &str {
    let name = business.name.trim();
    if name.is_empty() { "the business" } else { name }
}
