use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::auth::models::Level;
use crate::token::SessionTtl;

/// Environment variable that overrides `api.rootkey`.
pub const ROOTKEY_ENV: &str = "REFITT_API_ROOTKEY";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// PostgreSQL connection URL for the credential store
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub api: ApiConfig,
}

/// `api` section: root key and credential defaults.
#[derive(Serialize, Deserialize, Clone)]
pub struct ApiConfig {
    /// 44-digit URL-safe base64 root key
    #[serde(default)]
    pub rootkey: Option<String>,
    /// Session lifetime in seconds
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: i64,
    /// Level given to new clients (0 = administrator)
    #[serde(default = "default_client_level")]
    pub default_client_level: i32,
}

fn default_token_ttl() -> i64 {
    900
}

fn default_client_level() -> i32 {
    Level::DEFAULT.0
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            rootkey: None,
            token_ttl_secs: default_token_ttl(),
            default_client_level: default_client_level(),
        }
    }
}

impl ApiConfig {
    pub fn session_ttl(&self) -> SessionTtl {
        SessionTtl::seconds(self.token_ttl_secs)
    }

    pub fn client_level(&self) -> Level {
        Level(self.default_client_level)
    }

    /// Replace `rootkey` when `value` is set and non-empty.
    pub fn override_rootkey(&mut self, value: Option<String>) {
        if let Some(key) = value.filter(|k| !k.trim().is_empty()) {
            self.rootkey = Some(key.trim().to_string());
        }
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field(
                "rootkey",
                &self.rootkey.as_deref().map(crate::token::digits::redact),
            )
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("default_client_level", &self.default_client_level)
            .finish()
    }
}

impl AppConfig {
    /// Load `config/<env>.yaml`, then apply `REFITT_API_ROOTKEY`.
    pub fn load(env: &str) -> Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config yaml: {}", config_path))?;
        config.api.override_rootkey(std::env::var(ROOTKEY_ENV).ok());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}
