use super::Config;
use std::path::PathBuf;

impl Config {
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) =
            std::env::var("LOCOPILOT_CONTENT_API_KEY").or_else(|_| std::env::var("OPENAI_API_KEY"))
            && !key.is_empty()
        {
            self.content.api_key = Some(key);
        }

        if let Ok(model) = std::env::var("LOCOPILOT_CONTENT_MODEL")
            && !model.is_empty()
        {
            self.content.model = model;
        }

        if let Ok(client_id) = std::env::var("LOCOPILOT_OAUTH_CLIENT_ID")
            && !client_id.is_empty()
        {
            self.credentials.client_id = Some(client_id);
        }

        if let Ok(secret) = std::env::var("LOCOPILOT_OAUTH_CLIENT_SECRET")
            && !secret.is_empty()
        {
            self.credentials.client_secret = Some(secret);
        }

        if let Ok(workspace) = std::env::var("LOCOPILOT_WORKSPACE")
            && !workspace.is_empty()
        {
            self.workspace_dir = PathBuf::from(workspace);
        }

        if let Ok(level) = std::env::var("LOCOPILOT_LOG")
            && !level.is_empty()
        {
            self.log_level = level;
        }

        if let Ok(admins) = std::env::var("LOCOPILOT_ADMIN_PRINCIPALS") {
            let parsed: Vec<String> = admins
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(ToOwned::to_owned)
                .collect();
            if !parsed.is_empty() {
                self.entitlement.admin_principals = parsed;
            }
        }
    }
}
