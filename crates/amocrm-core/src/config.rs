//! Configuration for the AmoCRM integration

use crate::constants::{
    DEFAULT_ACCOUNT_TTL_SECS, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_REFRESH_MARGIN_SECS,
};
use crate::error::{AmoError, Result};
use crate::store::{SettingsStore, SETTINGS_KEY};
use serde::{Deserialize, Serialize};

/// Raw structure matching the stored settings blob exactly. The settings UI
/// writes the `auth_*` key names; older exports used the short names.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(alias = "domain")]
    auth_domain: String,

    #[serde(alias = "client_id")]
    auth_id: String,

    #[serde(alias = "client_secret")]
    auth_key: String,

    #[serde(alias = "redirect_uri")]
    auth_redirect_uri: String,

    // One-shot authorization code, present only until the first grant
    #[serde(default)]
    auth_code: Option<String>,

    #[serde(default = "default_refresh_margin")]
    refresh_margin_secs: i64,

    #[serde(default = "default_account_ttl")]
    account_ttl_secs: i64,

    #[serde(default = "default_http_timeout")]
    http_timeout_secs: u64,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmoConfig {
    /// Account subdomain, e.g. "mycompany" for mycompany.amocrm.ru
    pub domain: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_code: Option<String>,
    pub refresh_margin_secs: i64,
    pub account_ttl_secs: i64,
    pub http_timeout_secs: u64,
}

fn default_refresh_margin() -> i64 {
    DEFAULT_REFRESH_MARGIN_SECS
}

fn default_account_ttl() -> i64 {
    DEFAULT_ACCOUNT_TTL_SECS
}

fn default_http_timeout() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

impl AmoConfig {
    /// Load configuration from the settings store
    pub fn from_store(store: &dyn SettingsStore) -> Result<Self> {
        let raw = store
            .get(SETTINGS_KEY)?
            .ok_or_else(|| AmoError::Config(format!("{} blob is missing", SETTINGS_KEY)))?;
        Self::from_json_str(&raw)
    }

    /// Load configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(json)
            .map_err(|e| AmoError::Config(format!("Failed to parse settings: {}", e)))?;

        let config = Self::from_raw(raw);
        config.validate()?;
        Ok(config)
    }

    fn from_raw(raw: RawConfig) -> Self {
        Self {
            domain: raw.auth_domain,
            client_id: raw.auth_id,
            client_secret: raw.auth_key,
            redirect_uri: raw.auth_redirect_uri,
            auth_code: raw.auth_code.filter(|c| !c.is_empty()),
            refresh_margin_secs: raw.refresh_margin_secs,
            account_ttl_secs: raw.account_ttl_secs,
            http_timeout_secs: raw.http_timeout_secs,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.domain.is_empty() {
            return Err(AmoError::Config("AmoCRM domain is required".to_string()));
        }

        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(AmoError::Config(
                "OAuth client id and client secret are required".to_string(),
            ));
        }

        if self.redirect_uri.is_empty() {
            return Err(AmoError::Config("OAuth redirect URI is required".to_string()));
        }

        Ok(())
    }

    /// Base URL of the account's API host
    pub fn base_url(&self) -> String {
        format!("https://{}.amocrm.ru", self.domain)
    }
}
