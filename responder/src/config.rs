use config::{Config, ConfigError};
use serde::Deserialize;
use std::{env, path::Path, path::PathBuf, result::Result};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Delay between poll cycles, also the width of the recency query window.
    pub polling_interval_secs: u64,
    pub max_results_per_cycle: u32,
    /// The mailbox the daemon reads and sends as. Also the marker used to
    /// recognize "our own prior message" when extracting thread context.
    pub mailbox_address: String,
    pub reply_signature: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GmailConfig {
    /// Path to the service-account key file (client_email, private_key, token_uri).
    pub key_file: String,
    #[serde(default = "default_gmail_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_gmail_scopes")]
    pub scopes: Vec<String>,
}

fn default_gmail_api_base_url() -> String {
    "https://www.googleapis.com/gmail/v1/users/me".to_string()
}

fn default_gmail_scopes() -> Vec<String> {
    vec![
        "https://www.googleapis.com/auth/gmail.readonly".to_string(),
        "https://www.googleapis.com/auth/gmail.send".to_string(),
    ]
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrmConfig {
    pub instance_url: Url,
    #[serde(default = "default_crm_api_version")]
    pub api_version: String,
    /// Overridden by SALESFORCE_ACCESS_TOKEN when set.
    #[serde(default)]
    pub access_token: String,
}

fn default_crm_api_version() -> String {
    "v61.0".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_ai_api_base_url")]
    pub api_base_url: String,
    /// Overridden by OPENAI_API_KEY when set.
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    /// Stored prompt carrying the responder's instructions.
    pub prompt_id: String,
}

fn default_ai_api_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub checkpoint_file: PathBuf,
    pub conversations_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub settings: Settings,
    pub gmail: GmailConfig,
    pub crm: CrmConfig,
    pub ai: AiConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Loads config.toml from APP_DIR, falling back to the workspace config/
    /// directory next to the manifest during development.
    pub fn load() -> Result<Self, ConfigError> {
        let root = env::var("APP_DIR").unwrap_or_else(|_| {
            let dir =
                env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR or APP_DIR is required");
            let dir = Path::new(&dir).parent().unwrap().display().to_string();
            format!("{}/config", dir)
        });
        Self::from_file(&format!("{root}/config.toml"))
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let mut cfg: AppConfig = Config::builder()
            .add_source(config::File::with_name(path))
            .build()?
            .try_deserialize()?;

        if let Ok(token) = env::var("SALESFORCE_ACCESS_TOKEN") {
            cfg.crm.access_token = token;
        }
        if let Ok(key) = env::var("OPENAI_API_KEY") {
            cfg.ai.api_key = key;
        }

        Ok(cfg)
    }
}
