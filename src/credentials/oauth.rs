use super::types::TokenGrant;
use crate::config::CredentialsConfig;
use crate::net::{build_client_with_timeout, sanitize_api_error};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Why a refresh did not produce a new token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// The provider refused the grant; retrying will not help.
    #[error("refresh rejected: {0}")]
    Rejected(String),
    /// Network trouble, timeouts, 5xx, 408 or 429.
    #[error("refresh failed transiently: {0}")]
    Transient(String),
}

impl RefreshError {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// Exchanges a refresh token for a new access token.
pub trait TokenRefresher: Send + Sync {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenGrant, RefreshError>> + Send + 'a>>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

fn default_expires_in() -> i64 {
    3600
}

/// `grant_type=refresh_token` form POST against the configured token URL.
pub struct OAuthRefresher {
    client: Client,
    token_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
}

impl OAuthRefresher {
    pub fn from_config(config: &CredentialsConfig) -> Self {
        Self {
            client: build_client_with_timeout(config.timeout_secs),
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        }
    }

    async fn exchange(&self, refresh_token: &str) -> Result<TokenGrant, RefreshError> {
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        if let Some(client_id) = self.client_id.as_deref() {
            form.push(("client_id", client_id));
        }
        if let Some(client_secret) = self.client_secret.as_deref() {
            form.push(("client_secret", client_secret));
        }

        let response = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| RefreshError::Transient(sanitize_api_error(&e.to_string())))?;

        let status = response.status();
        if status.is_success() {
            let body: TokenResponse = response
                .json()
                .await
                .map_err(|e| RefreshError::Transient(format!("token response decode: {e}")))?;
            return Ok(TokenGrant {
                access_token: body.access_token,
                refresh_token: body.refresh_token,
                expires_in_secs: body.expires_in,
            });
        }

        let text = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &text))
    }
}

impl TokenRefresher for OAuthRefresher {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenGrant, RefreshError>> + Send + 'a>> {
        Box::pin(self.exchange(refresh_token))
    }
}

fn classify_failure(status: StatusCode, body: &str) -> RefreshError {
    let parsed = serde_json::from_str::<TokenErrorResponse>(body).ok();
    let detail = parsed.as_ref().map_or_else(
        || sanitize_api_error(body),
        |err| match err.error_description.as_deref() {
            Some(description) => format!("{}: {}", err.error, sanitize_api_error(description)),
            None => err.error.clone(),
        },
    );
    let message = format!("HTTP {status}: {detail}");

    let invalid_grant = parsed.is_some_and(|err| err.error == "invalid_grant");
    let code = status.as_u16();
    if invalid_grant || (status.is_client_error() && code != 408 && code != 429) {
        RefreshError::Rejected(message)
    } else {
        RefreshError::Transient(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn refresher(server: &MockServer) -> OAuthRefresher {
        OAuthRefresher::from_config(&CredentialsConfig {
            token_url: format!("{}/token", server.uri()),
            client_id: Some("client-1".into()),
            client_secret: Some("shh".into()),
            ..CredentialsConfig::default()
        })
    }

    #[tokio::test]
    async fn successful_exchange_returns_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=r-1"))
            .and(body_string_contains("client_id=client-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let grant = refresher(&server).refresh("r-1").await.unwrap();
        assert_eq!(grant.access_token, "fresh");
        assert_eq!(grant.expires_in_secs, 3599);
        assert!(grant.refresh_token.is_none());
    }

    #[tokio::test]
    async fn invalid_grant_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .mount(&server)
            .await;

        let err = refresher(&server).refresh("r-1").await.unwrap_err();
        assert!(err.is_rejected());
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[tokio::test]
    async fn server_errors_and_rate_limits_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = refresher(&server).refresh("r-1").await.unwrap_err();
        assert!(!err.is_rejected());

        assert!(!classify_failure(StatusCode::TOO_MANY_REQUESTS, "").is_rejected());
        assert!(!classify_failure(StatusCode::REQUEST_TIMEOUT, "").is_rejected());
        assert!(classify_failure(StatusCode::UNAUTHORIZED, "{}").is_rejected());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transient() {
        let refresher = OAuthRefresher::from_config(&CredentialsConfig {
            token_url: "http://127.0.0.1:9/token".into(),
            timeout_secs: 2,
            ..CredentialsConfig::default()
        });
        let err = refresher.refresh("r-1").await.unwrap_err();
        assert!(!err.is_rejected());
    }
}
