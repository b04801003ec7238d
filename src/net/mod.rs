//! Shared outbound HTTP plumbing for the OAuth, content and delivery clients.

mod client;
mod scrub;

pub use client::build_client_with_timeout;
pub use scrub::{ApiError, api_error, sanitize_api_error};
