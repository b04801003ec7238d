use super::types::Credential;
use crate::security::SecretStore;
use crate::storage::{Store, format_timestamp, parse_timestamp};
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};

/// Credential rows with tokens encrypted through the [`SecretStore`].
#[derive(Debug, Clone)]
pub(super) struct CredentialRepository {
    pool: SqlitePool,
    secrets: SecretStore,
}

impl CredentialRepository {
    pub(super) fn new(store: &Store, secrets: SecretStore) -> Self {
        Self {
            pool: store.pool().clone(),
            secrets,
        }
    }

    pub(super) async fn get(&self, principal_id: &str) -> Result<Option<Credential>> {
        let row = sqlx::query(
            "SELECT principal_id, access_token, refresh_token, expires_at, is_valid,
                    last_error, updated_at
             FROM credentials WHERE principal_id = ?",
        )
        .bind(principal_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load credential")?;

        row.map(|row| self.row_to_credential(&row)).transpose()
    }

    pub(super) async fn save(&self, credential: &Credential) -> Result<()> {
        let access_token = self.secrets.encrypt(&credential.access_token)?;
        let refresh_token = self
            .secrets
            .encrypt_option(credential.refresh_token.as_deref())?;

        sqlx::query(
            "INSERT INTO credentials (
                principal_id, access_token, refresh_token, expires_at, is_valid,
                last_error, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(principal_id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                is_valid = excluded.is_valid,
                last_error = excluded.last_error,
                updated_at = excluded.updated_at",
        )
        .bind(&credential.principal_id)
        .bind(access_token)
        .bind(refresh_token)
        .bind(format_timestamp(credential.expires_at))
        .bind(credential.is_valid)
        .bind(credential.last_error.as_deref())
        .bind(format_timestamp(credential.updated_at))
        .execute(&self.pool)
        .await
        .context("Failed to save credential")?;
        Ok(())
    }

    pub(super) async fn invalidate(&self, principal_id: &str, reason: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE credentials SET is_valid = 0, last_error = ?, updated_at = ?
             WHERE principal_id = ?",
        )
        .bind(reason)
        .bind(format_timestamp(Utc::now()))
        .bind(principal_id)
        .execute(&self.pool)
        .await
        .context("Failed to invalidate credential")?;
        Ok(result.rows_affected() > 0)
    }

    pub(super) async fn delete(&self, principal_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM credentials WHERE principal_id = ?")
            .bind(principal_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete credential")?;
        Ok(result.rows_affected() > 0)
    }

    /// Other principals holding a valid credential, latest expiry first.
    pub(super) async fn valid_principals_except(&self, principal_id: &str) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT principal_id FROM credentials
             WHERE is_valid = 1 AND principal_id != ?
             ORDER BY expires_at DESC",
        )
        .bind(principal_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list pooled credentials")
    }

    fn row_to_credential(&self, row: &sqlx::sqlite::SqliteRow) -> Result<Credential> {
        let access_token: String = row.get("access_token");
        let refresh_token: Option<String> = row.get("refresh_token");
        let expires_at: String = row.get("expires_at");
        let updated_at: String = row.get("updated_at");

        Ok(Credential {
            principal_id: row.get("principal_id"),
            access_token: self
                .secrets
                .decrypt(&access_token)
                .context("Failed to decrypt access token")?,
            refresh_token: self
                .secrets
                .decrypt_option(refresh_token.as_deref())
                .context("Failed to decrypt refresh token")?,
            expires_at: parse_timestamp(&expires_at)?,
            is_valid: row.get("is_valid"),
            last_error: row.get("last_error"),
            updated_at: parse_timestamp(&updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::temp_store;
    use chrono::Duration;

    #[tokio::test]
    async fn tokens_are_encrypted_at_rest() {
        let (tmp, store) = temp_store().await;
        let repo = CredentialRepository::new(&store, SecretStore::new(tmp.path(), true));
        let credential = Credential::new(
            "p-1",
            "access-plain",
            Some("refresh-plain".into()),
            Utc::now() + Duration::hours(1),
        );
        repo.save(&credential).await.unwrap();

        let raw: String = sqlx::query_scalar("SELECT access_token FROM credentials")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert!(SecretStore::is_encrypted(&raw));
        assert!(!raw.contains("access-plain"));

        let loaded = repo.get("p-1").await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "access-plain");
        assert_eq!(loaded.refresh_token.as_deref(), Some("refresh-plain"));
    }

    #[tokio::test]
    async fn invalidate_keeps_the_row() {
        let (tmp, store) = temp_store().await;
        let repo = CredentialRepository::new(&store, SecretStore::new(tmp.path(), true));
        repo.save(&Credential::new("p-1", "a", None, Utc::now()))
            .await
            .unwrap();

        assert!(repo.invalidate("p-1", "invalid_grant").await.unwrap());
        let loaded = repo.get("p-1").await.unwrap().unwrap();
        assert!(!loaded.is_valid);
        assert_eq!(loaded.last_error.as_deref(), Some("invalid_grant"));

        assert!(repo.delete("p-1").await.unwrap());
        assert!(repo.get("p-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pooled_principals_are_ordered_by_expiry() {
        let (tmp, store) = temp_store().await;
        let repo = CredentialRepository::new(&store, SecretStore::new(tmp.path(), false));
        let now = Utc::now();
        repo.save(&Credential::new("soon", "a", None, now + Duration::minutes(5)))
            .await
            .unwrap();
        repo.save(&Credential::new("later", "b", None, now + Duration::hours(2)))
            .await
            .unwrap();
        repo.save(&Credential::new("me", "c", None, now + Duration::hours(9)))
            .await
            .unwrap();
        repo.save(&Credential::new("dead", "d", None, now + Duration::hours(5)))
            .await
            .unwrap();
        repo.invalidate("dead", "revoked").await.unwrap();

        let pooled = repo.valid_principals_except("me").await.unwrap();
        assert_eq!(pooled, vec!["later".to_string(), "soon".to_string()]);
    }
}
