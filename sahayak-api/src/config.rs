//! Service configuration resolution
//!
//! Bootstrap values resolve CLI → ENV → TOML → compiled default. The token
//! secret additionally falls back to the `settings` table so issued tokens
//! survive restarts.

use sahayak_common::config::TomlConfig;
use sahayak_common::db::init::load_or_init_jwt_secret;
use sahayak_common::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::services::{GeminiClient, PlaybookModel};

pub const BIND_ENV: &str = "SAHAYAK_BIND";
pub const PORT_ENV: &str = "SAHAYAK_PORT";
pub const GEMINI_KEY_ENV: &str = "GEMINI_API_KEY";
pub const JWT_SECRET_ENV: &str = "SAHAYAK_JWT_SECRET";

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub bind: Option<String>,
    pub port: Option<u16>,
}

/// Resolved runtime configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_address: String,
    pub port: u16,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub gemini_timeout: Duration,
    pub access_token_expire_minutes: i64,
    pub playbook_cache_ttl_secs: u64,
    pub cors_origins: Vec<String>,
    pub offline_pack_version: String,
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl ServiceConfig {
    pub fn resolve(toml: &TomlConfig, cli: &CliOverrides) -> Self {
        let bind_address = cli
            .bind
            .clone()
            .or_else(|| env_value(BIND_ENV))
            .unwrap_or_else(|| toml.bind_address.clone());

        let env_port = env_value(PORT_ENV).and_then(|v| match v.parse::<u16>() {
            Ok(port) => Some(port),
            Err(_) => {
                warn!("Ignoring invalid {}='{}'", PORT_ENV, v);
                None
            }
        });
        let port = cli.port.or(env_port).unwrap_or(toml.port);

        let gemini_api_key = env_value(GEMINI_KEY_ENV).or_else(|| non_blank(toml.gemini_api_key.as_ref()));

        Self {
            bind_address,
            port,
            gemini_api_key,
            gemini_model: toml.gemini_model.clone(),
            gemini_base_url: toml.gemini_base_url.clone(),
            gemini_timeout: Duration::from_secs(toml.gemini_timeout_secs.max(1)),
            access_token_expire_minutes: toml.access_token_expire_minutes,
            playbook_cache_ttl_secs: toml.playbook_cache_ttl_secs,
            cors_origins: toml.cors_origins.clone(),
            offline_pack_version: toml.offline_pack_version.clone(),
        }
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// Gemini client when a key is configured; `None` means fallback mode
    pub fn build_model(&self) -> Option<Arc<dyn PlaybookModel>> {
        let Some(key) = self.gemini_api_key.clone() else {
            warn!("No Gemini API key configured, serving fallback playbooks only");
            return None;
        };

        match GeminiClient::new(
            key,
            self.gemini_model.clone(),
            self.gemini_base_url.clone(),
            self.gemini_timeout,
        ) {
            Ok(client) => {
                info!("Gemini model configured: {}", self.gemini_model);
                Some(Arc::new(client))
            }
            Err(e) => {
                warn!("Gemini client unavailable ({}), serving fallback playbooks only", e);
                None
            }
        }
    }
}

/// Token signing secret: ENV → TOML → settings table (generated on first run)
pub async fn resolve_jwt_secret(db: &SqlitePool, toml: &TomlConfig) -> Result<String> {
    if let Some(secret) = env_value(JWT_SECRET_ENV) {
        info!("Token secret loaded from environment variable");
        return Ok(secret);
    }
    if let Some(secret) = non_blank(toml.jwt_secret.as_ref()) {
        info!("Token secret loaded from TOML config");
        return Ok(secret);
    }
    load_or_init_jwt_secret(db).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for name in [BIND_ENV, PORT_ENV, GEMINI_KEY_ENV, JWT_SECRET_ENV] {
            std::env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_from_toml() {
        clear_env();
        let config = ServiceConfig::resolve(&TomlConfig::default(), &CliOverrides::default());
        assert_eq!(config.listen_address(), "127.0.0.1:8000");
        assert!(config.gemini_api_key.is_none());
        assert!(config.build_model().is_none());
        assert_eq!(config.playbook_cache_ttl_secs, 86_400);
    }

    #[test]
    #[serial]
    fn test_cli_beats_env_beats_toml() {
        clear_env();
        let mut toml = TomlConfig::default();
        toml.port = 9000;
        toml.bind_address = "10.0.0.1".to_string();

        std::env::set_var(PORT_ENV, "9100");
        let config = ServiceConfig::resolve(&toml, &CliOverrides::default());
        assert_eq!(config.port, 9100);
        assert_eq!(config.bind_address, "10.0.0.1");

        let cli = CliOverrides {
            bind: Some("0.0.0.0".to_string()),
            port: Some(9200),
        };
        let config = ServiceConfig::resolve(&toml, &cli);
        assert_eq!(config.listen_address(), "0.0.0.0:9200");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_env_port_ignored() {
        clear_env();
        std::env::set_var(PORT_ENV, "not-a-port");
        let config = ServiceConfig::resolve(&TomlConfig::default(), &CliOverrides::default());
        assert_eq!(config.port, 8000);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_blank_key_means_fallback_mode() {
        clear_env();
        let mut toml = TomlConfig::default();
        toml.gemini_api_key = Some("   ".to_string());
        assert!(ServiceConfig::resolve(&toml, &CliOverrides::default())
            .gemini_api_key
            .is_none());

        std::env::set_var(GEMINI_KEY_ENV, "env-key");
        let config = ServiceConfig::resolve(&toml, &CliOverrides::default());
        assert_eq!(config.gemini_api_key.as_deref(), Some("env-key"));
        assert!(config.build_model().is_some());
        clear_env();
    }

    #[tokio::test]
    #[serial]
    async fn test_jwt_secret_priority() {
        clear_env();
        let (_dir, pool) = crate::db::test_pool().await;
        let mut toml = TomlConfig::default();

        let generated = resolve_jwt_secret(&pool, &toml).await.unwrap();
        assert_eq!(resolve_jwt_secret(&pool, &toml).await.unwrap(), generated);

        toml.jwt_secret = Some("from-toml".to_string());
        assert_eq!(resolve_jwt_secret(&pool, &toml).await.unwrap(), "from-toml");

        std::env::set_var(JWT_SECRET_ENV, "from-env");
        assert_eq!(resolve_jwt_secret(&pool, &toml).await.unwrap(), "from-env");
        clear_env();
    }
}
