use chrono::{DateTime, Duration, Utc};

// Providers issue hour-scale tokens; anything past a year is bogus.
const MAX_GRANT_LIFETIME_SECS: i64 = 365 * 86_400;

/// One principal's OAuth grant. Tokens are plaintext in memory and
/// encrypted only at rest.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub principal_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub is_valid: bool,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("principal_id", &self.principal_id)
            .field("expires_at", &self.expires_at)
            .field("is_valid", &self.is_valid)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

impl Credential {
    pub fn new(
        principal_id: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            principal_id: principal_id.into(),
            access_token: access_token.into(),
            refresh_token,
            expires_at,
            is_valid: true,
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn expires_within(&self, buffer: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at <= now + buffer
    }

    /// Applies a successful refresh. The stored refresh token survives
    /// unless the provider rotated it.
    pub fn apply_grant(&mut self, grant: TokenGrant, now: DateTime<Utc>) {
        let lifetime = Duration::seconds(grant.expires_in_secs.clamp(0, MAX_GRANT_LIFETIME_SECS));
        self.access_token = grant.access_token;
        self.expires_at = now + lifetime;
        if let Some(rotated) = grant.refresh_token.filter(|t| !t.is_empty()) {
            self.refresh_token = Some(rotated);
        }
        self.is_valid = true;
        self.last_error = None;
        self.updated_at = now;
    }
}

/// Result of a successful `refresh_token` exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in_secs: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_keeps_refresh_token_unless_rotated() {
        let now = Utc::now();
        let mut credential = Credential::new("p", "old", Some("refresh-1".into()), now);

        credential.apply_grant(
            TokenGrant {
                access_token: "new".into(),
                refresh_token: None,
                expires_in_secs: 3600,
            },
            now,
        );
        assert_eq!(credential.access_token, "new");
        assert_eq!(credential.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(credential.expires_at, now + Duration::hours(1));

        credential.apply_grant(
            TokenGrant {
                access_token: "newer".into(),
                refresh_token: Some("refresh-2".into()),
                expires_in_secs: 3600,
            },
            now,
        );
        assert_eq!(credential.refresh_token.as_deref(), Some("refresh-2"));
    }

    #[test]
    fn out_of_range_lifetimes_are_clamped() {
        let now = Utc::now();
        let mut credential = Credential::new("p", "old", None, now);

        credential.apply_grant(
            TokenGrant {
                access_token: "new".into(),
                refresh_token: None,
                expires_in_secs: i64::MAX,
            },
            now,
        );
        assert_eq!(credential.expires_at, now + Duration::days(365));

        credential.apply_grant(
            TokenGrant {
                access_token: "newer".into(),
                refresh_token: None,
                expires_in_secs: -30,
            },
            now,
        );
        assert_eq!(credential.expires_at, now);
    }

    #[test]
    fn debug_output_hides_tokens() {
        let credential = Credential::new("p", "secret-access", Some("secret-refresh".into()), Utc::now());
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
    }
}
