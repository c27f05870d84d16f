//! Account metadata cache: pipelines, contact custom-field definitions, and
//! the field/pipeline selections made in the settings UI.
//!
//! Refreshes from the CRM when stale and replaces the cached blob
//! atomically; a partial fetch keeps the previous blob and surfaces the
//! error instead.

use crate::clients::token::TokenManager;
use crate::clients::transport::Transport;
use crate::error::{AmoError, Result};
use crate::store::{get_json, put_json, SettingsStore, ACCOUNT_INFO_KEY};
use amocrm_types::{CustomFieldDef, FieldKind, Pipeline, PipelineStatus};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

const ACCOUNT_PATH: &str = "/api/v4/account";
const PIPELINES_PATH: &str = "/api/v4/leads/pipelines";
const CONTACT_FIELDS_PATH: &str = "/api/v4/contacts/custom_fields";

/// Stored shape of the `amocrm_account_info` blob
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Epoch seconds of the last successful refresh
    pub timestamp: i64,
    #[serde(default)]
    pub pipelines: Vec<Pipeline>,
    #[serde(default)]
    pub contacts_custom_fields: Vec<CustomFieldDef>,
    #[serde(default)]
    pub current_pipeline: i64,
    #[serde(default)]
    pub current_status: i64,
    #[serde(default)]
    pub current_phone_field_id: Option<i64>,
    #[serde(default)]
    pub current_email_field_id: Option<i64>,
}

impl AccountInfo {
    fn is_fresh(&self, ttl_secs: i64, now: i64) -> bool {
        self.timestamp + ttl_secs >= now
    }
}

pub struct AccountCache {
    store: Arc<dyn SettingsStore>,
    ttl_secs: i64,
    info: Mutex<Option<AccountInfo>>,
}

impl AccountCache {
    /// Construct from persisted state; an absent blob starts empty and is
    /// fetched on first use.
    pub fn load(store: Arc<dyn SettingsStore>, ttl_secs: i64) -> Result<Self> {
        let info = get_json::<AccountInfo>(store.as_ref(), ACCOUNT_INFO_KEY)?;
        Ok(Self {
            store,
            ttl_secs,
            info: Mutex::new(info),
        })
    }

    /// Refresh the cached metadata when stale. The account summary,
    /// pipelines list, and contact custom-fields list are fetched together;
    /// the cache is only replaced after all three succeed.
    pub async fn ensure_fresh(&self, transport: &Transport, tokens: &TokenManager) -> Result<()> {
        let mut guard = self.info.lock().await;

        let now = Utc::now().timestamp();
        if let Some(info) = &*guard {
            if info.is_fresh(self.ttl_secs, now) {
                return Ok(());
            }
            log::info!("account metadata is stale (fetched at {}), refreshing", info.timestamp);
        } else {
            log::info!("no cached account metadata, fetching");
        }

        let bearer = tokens.access_token().await?;

        let account = transport
            .get(
                ACCOUNT_PATH,
                &[("with", "users_groups,task_types".to_string())],
                &bearer,
                None,
            )
            .await?
            .ok_or_else(|| AmoError::Api {
                status: 200,
                body: "account summary response is empty".to_string(),
            })?;
        let pipelines_body = transport.get(PIPELINES_PATH, &[], &bearer, None).await?;
        let fields_body = transport.get(CONTACT_FIELDS_PATH, &[], &bearer, None).await?;

        let account_name = account["name"].as_str().unwrap_or("<unnamed>");
        let pipelines = pipelines_body
            .as_ref()
            .map(parse_pipelines)
            .unwrap_or_default();
        let contacts_custom_fields = fields_body
            .as_ref()
            .map(parse_custom_fields)
            .unwrap_or_default();

        log::info!(
            "account '{}': {} pipelines, {} contact fields",
            account_name,
            pipelines.len(),
            contacts_custom_fields.len()
        );

        // Selections survive the refresh; only the fetched metadata changes
        let previous = guard.clone().unwrap_or_default();
        let info = AccountInfo {
            timestamp: now,
            pipelines,
            contacts_custom_fields,
            current_pipeline: previous.current_pipeline,
            current_status: previous.current_status,
            current_phone_field_id: previous.current_phone_field_id,
            current_email_field_id: previous.current_email_field_id,
        };

        put_json(self.store.as_ref(), ACCOUNT_INFO_KEY, &info)?;
        *guard = Some(info);
        Ok(())
    }

    /// Provider field id for a tracked logical field. `None` means the field
    /// is not tracked, which callers must treat as "skip", not as an error.
    pub async fn field_id(&self, kind: FieldKind) -> Option<i64> {
        let guard = self.info.lock().await;
        let info = guard.as_ref()?;
        match kind {
            FieldKind::Phone => info.current_phone_field_id,
            FieldKind::Email => info.current_email_field_id,
        }
    }

    /// Pipeline selected in the settings UI, if any
    pub async fn current_pipeline(&self) -> Option<i64> {
        let guard = self.info.lock().await;
        guard
            .as_ref()
            .map(|info| info.current_pipeline)
            .filter(|id| *id != 0)
    }

    /// Pipeline status selected in the settings UI, if any
    pub async fn current_status(&self) -> Option<i64> {
        let guard = self.info.lock().await;
        guard
            .as_ref()
            .map(|info| info.current_status)
            .filter(|id| *id != 0)
    }

    /// Cached pipelines, for the settings UI
    pub async fn pipelines(&self) -> Vec<Pipeline> {
        let guard = self.info.lock().await;
        guard
            .as_ref()
            .map(|info| info.pipelines.clone())
            .unwrap_or_default()
    }

    /// Cached contact custom-field definitions, for the settings UI
    pub async fn contact_fields(&self) -> Vec<CustomFieldDef> {
        let guard = self.info.lock().await;
        guard
            .as_ref()
            .map(|info| info.contacts_custom_fields.clone())
            .unwrap_or_default()
    }

    /// Record the settings-UI pipeline/status selection
    pub async fn select_pipeline(&self, pipeline_id: i64, status_id: i64) -> Result<()> {
        self.update(|info| {
            info.current_pipeline = pipeline_id;
            info.current_status = status_id;
        })
        .await
    }

    /// Record the settings-UI field mapping for phone or email
    pub async fn select_field(&self, kind: FieldKind, field_id: Option<i64>) -> Result<()> {
        self.update(|info| match kind {
            FieldKind::Phone => info.current_phone_field_id = field_id,
            FieldKind::Email => info.current_email_field_id = field_id,
        })
        .await
    }

    async fn update<F: FnOnce(&mut AccountInfo)>(&self, apply: F) -> Result<()> {
        let mut guard = self.info.lock().await;
        // Selections may be made before the first fetch; a default blob with
        // timestamp 0 is stale and gets filled on the next ensure_fresh
        let mut info = guard.clone().unwrap_or_default();
        apply(&mut info);
        put_json(self.store.as_ref(), ACCOUNT_INFO_KEY, &info)?;
        *guard = Some(info);
        Ok(())
    }
}

fn parse_pipelines(body: &Value) -> Vec<Pipeline> {
    let items = match body["_embedded"]["pipelines"].as_array() {
        Some(items) => items,
        None => return Vec::new(),
    };

    items
        .iter()
        .filter_map(|item| {
            let id = item["id"].as_i64()?;
            let name = item["name"].as_str().unwrap_or("").to_string();
            let statuses = item["_embedded"]["statuses"]
                .as_array()
                .map(|arr| {
                    arr.iter()
                        .filter_map(|status| {
                            Some(PipelineStatus {
                                id: status["id"].as_i64()?,
                                name: status["name"].as_str().unwrap_or("").to_string(),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
            Some(Pipeline { id, name, statuses })
        })
        .collect()
}

fn parse_custom_fields(body: &Value) -> Vec<CustomFieldDef> {
    let items = match body["_embedded"]["custom_fields"].as_array() {
        Some(items) => items,
        None => return Vec::new(),
    };

    items
        .iter()
        .filter_map(|item| serde_json::from_value(item.clone()).ok())
        .collect()
}
