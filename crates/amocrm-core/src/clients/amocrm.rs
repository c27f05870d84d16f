//! AmoCRM API client: search, typed getters, and the create operations the
//! import flow needs. Composes the transport, token manager, and account
//! cache; every resource call goes out with a fresh bearer token.

use crate::clients::account::AccountCache;
use crate::clients::token::TokenManager;
use crate::clients::transport::Transport;
use crate::config::AmoConfig;
use crate::constants::SEARCH_LIMIT_MAX;
use crate::error::{AmoError, Result};
use crate::services::matcher;
use crate::store::SettingsStore;
use amocrm_types::{
    Contact, CustomFieldValues, Deal, FieldKind, Lead, MatchResult, NewDeal, SearchKind,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Search request parameters. Only the parameters actually set end up in the
/// query string, in a fixed order the provider expects.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub kind: SearchKind,
    pub id: Option<i64>,
    pub entity_type: Option<String>,
    pub element_id: Option<i64>,
    pub query: Option<String>,
    pub offset: Option<u32>,
    pub limit: Option<u32>,
    pub modified_since: Option<DateTime<Utc>>,
}

impl SearchQuery {
    pub fn new(kind: SearchKind) -> Self {
        Self {
            kind,
            id: None,
            entity_type: None,
            element_id: None,
            query: None,
            offset: None,
            limit: None,
            modified_since: None,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_entity_type<S: Into<String>>(mut self, entity_type: S) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    pub fn with_element_id(mut self, element_id: i64) -> Self {
        self.element_id = Some(element_id);
        self
    }

    pub fn with_query<S: Into<String>>(mut self, query: S) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_modified_since(mut self, since: DateTime<Utc>) -> Self {
        self.modified_since = Some(since);
        self
    }

    /// Present parameters in provider order: id, type, element_id, query,
    /// offset, limit. The limit is clamped to the provider maximum.
    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(id) = self.id {
            pairs.push(("id", id.to_string()));
        }
        if let Some(entity_type) = &self.entity_type {
            pairs.push(("type", entity_type.clone()));
        }
        if let Some(element_id) = self.element_id {
            pairs.push(("element_id", element_id.to_string()));
        }
        if let Some(query) = &self.query {
            pairs.push(("query", query.clone()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset", offset.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.min(SEARCH_LIMIT_MAX).to_string()));
        }
        pairs
    }
}

pub struct AmoClient {
    transport: Arc<Transport>,
    tokens: TokenManager,
    account: AccountCache,
}

impl AmoClient {
    pub fn new(config: AmoConfig, store: Arc<dyn SettingsStore>) -> Result<Self> {
        let transport = Arc::new(Transport::new(config.base_url(), config.http_timeout_secs)?);
        let account = AccountCache::load(Arc::clone(&store), config.account_ttl_secs)?;
        let tokens = TokenManager::load(config, Arc::clone(&transport), store)?;

        Ok(Self {
            transport,
            tokens,
            account,
        })
    }

    /// Construct with configuration read from the settings store
    pub fn from_store(store: Arc<dyn SettingsStore>) -> Result<Self> {
        let config = AmoConfig::from_store(store.as_ref())?;
        Self::new(config, store)
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn account(&self) -> &AccountCache {
        &self.account
    }

    pub async fn is_authenticated(&self) -> bool {
        self.tokens.is_authenticated().await
    }

    /// Refresh cached account metadata when stale
    pub async fn ensure_account_fresh(&self) -> Result<()> {
        self.account.ensure_fresh(&self.transport, &self.tokens).await
    }

    pub async fn current_pipeline(&self) -> Option<i64> {
        self.account.current_pipeline().await
    }

    pub async fn current_status(&self) -> Option<i64> {
        self.account.current_status().await
    }

    /// Raw search. Returns the parsed response body; `None` means the
    /// provider reported no results (204 or an empty 200 body).
    pub async fn search(&self, query: &SearchQuery) -> Result<Option<Value>> {
        let bearer = self.tokens.access_token().await?;
        let path = format!("/api/v4/{}", query.kind.path());
        let if_modified_since = query.modified_since.map(format_http_date);

        self.transport
            .get(&path, &query.query_pairs(), &bearer, if_modified_since)
            .await
    }

    async fn search_items(&self, query: &SearchQuery) -> Result<Vec<Value>> {
        let body = self.search(query).await?;
        Ok(body
            .map(|b| embedded_items(&b, query.kind.embedded_key()))
            .unwrap_or_default())
    }

    pub async fn get_contact(&self, contact_id: i64) -> Result<Option<Contact>> {
        let items = self
            .search_items(&SearchQuery::new(SearchKind::Contacts).with_id(contact_id))
            .await?;

        let (phone_field, email_field) = self.contact_field_ids().await;
        Ok(items
            .first()
            .map(|item| parse_contact(item, phone_field, email_field)))
    }

    pub async fn get_deal(&self, deal_id: i64) -> Result<Option<Deal>> {
        let items = self
            .search_items(&SearchQuery::new(SearchKind::Leads).with_id(deal_id))
            .await?;
        Ok(items.first().map(parse_deal))
    }

    /// Full-text contact search, decoded into typed records
    pub async fn find_contacts(&self, query: &str) -> Result<Vec<Contact>> {
        let items = self
            .search_items(&SearchQuery::new(SearchKind::Contacts).with_query(query))
            .await?;

        let (phone_field, email_field) = self.contact_field_ids().await;
        Ok(items
            .iter()
            .map(|item| parse_contact(item, phone_field, email_field))
            .collect())
    }

    /// Search candidates by the lead's phone and email and grade them.
    /// Returns the best candidate with a positive grade, or nothing.
    pub async fn find_client(&self, lead: &Lead) -> Result<Option<MatchResult>> {
        let mut candidates = Vec::new();
        if !lead.phone.trim().is_empty() {
            candidates.extend(self.find_contacts(&lead.phone).await?);
        }
        if !lead.email.trim().is_empty() {
            candidates.extend(self.find_contacts(&lead.email).await?);
        }

        Ok(matcher::find_best(candidates, lead))
    }

    /// Create a contact from lead data. Phone and email are attached only
    /// when the corresponding field ids are configured; the responsible user
    /// only when the lead carries a manager.
    pub async fn create_client(&self, lead: &Lead) -> Result<i64> {
        let (phone_field, email_field) = self.contact_field_ids().await;

        let mut custom_fields_values = Vec::new();
        if !lead.phone.trim().is_empty() {
            if let Some(field_id) = phone_field {
                custom_fields_values.push(json!({
                    "field_id": field_id,
                    "values": [{"value": lead.phone, "enum_code": "MOB"}],
                }));
            }
        }
        if !lead.email.trim().is_empty() {
            if let Some(field_id) = email_field {
                custom_fields_values.push(json!({
                    "field_id": field_id,
                    "values": [{"value": lead.email, "enum_code": "WORK"}],
                }));
            }
        }

        let mut contact = json!({
            "name": lead.name,
            "created_at": Utc::now().timestamp(),
        });
        if !custom_fields_values.is_empty() {
            contact["custom_fields_values"] = Value::Array(custom_fields_values);
        }
        if let Some(manager_id) = lead.manager_id {
            contact["responsible_user_id"] = json!(manager_id);
        }

        let bearer = self.tokens.access_token().await?;
        let body = self
            .transport
            .post_json("/api/v4/contacts", &bearer, &json!([contact]))
            .await?;

        let id = created_id(body, "contacts")?;
        log::info!("created contact {} '{}'", id, lead.name);
        Ok(id)
    }

    /// Create a deal bound to an existing contact. Required ids are checked
    /// before any network call.
    pub async fn create_deal(&self, deal: &NewDeal) -> Result<i64> {
        if deal.contact_id == 0 {
            return Err(AmoError::Validation(
                "contact_id is required to create a deal".to_string(),
            ));
        }
        if deal.pipeline_id == 0 {
            return Err(AmoError::Validation(
                "pipeline_id is required to create a deal".to_string(),
            ));
        }
        if deal.status_id == 0 {
            return Err(AmoError::Validation(
                "status_id is required to create a deal".to_string(),
            ));
        }

        let mut payload = json!({
            "name": deal.name,
            "created_at": Utc::now().timestamp(),
            "price": 0,
            "pipeline_id": deal.pipeline_id,
            "status_id": deal.status_id,
            "_embedded": {
                "contacts": [{"id": deal.contact_id, "is_main": true}],
            },
        });
        if let Some(manager_id) = deal.manager_id {
            payload["responsible_user_id"] = json!(manager_id);
        }

        let bearer = self.tokens.access_token().await?;
        let body = self
            .transport
            .post_json("/api/v4/leads", &bearer, &json!([payload]))
            .await?;

        let id = created_id(body, "leads")?;
        log::info!("created deal {} '{}' for contact {}", id, deal.name, deal.contact_id);
        Ok(id)
    }

    /// Attach a text note to a deal
    pub async fn create_text_note(&self, deal_id: i64, text: &str) -> Result<i64> {
        if deal_id == 0 {
            return Err(AmoError::Validation(
                "deal id is required to create a note".to_string(),
            ));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(AmoError::Validation(
                "note text must not be empty".to_string(),
            ));
        }

        let note = json!({
            "entity_id": deal_id,
            "note_type": "common",
            "params": {"text": text},
        });

        let bearer = self.tokens.access_token().await?;
        let body = self
            .transport
            .post_json("/api/v4/leads/notes", &bearer, &json!([note]))
            .await?;

        let id = created_id(body, "notes")?;
        log::info!("created note {} on deal {}", id, deal_id);
        Ok(id)
    }

    async fn contact_field_ids(&self) -> (Option<i64>, Option<i64>) {
        (
            self.account.field_id(FieldKind::Phone).await,
            self.account.field_id(FieldKind::Email).await,
        )
    }
}

/// RFC 1123 date for conditional reads, e.g. "Sun, 06 Nov 1994 08:49:37 GMT"
fn format_http_date(date: DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Items of `_embedded.<key>`; absent nesting is an empty list, never an
/// error
fn embedded_items(body: &Value, key: &str) -> Vec<Value> {
    body["_embedded"][key]
        .as_array()
        .cloned()
        .unwrap_or_default()
}

/// Id of the first created item in a create response
fn created_id(body: Option<Value>, key: &str) -> Result<i64> {
    let body = body.ok_or_else(|| AmoError::Api {
        status: 200,
        body: format!("empty response to {} create", key),
    })?;

    embedded_items(&body, key)
        .first()
        .and_then(|item| item["id"].as_i64())
        .ok_or_else(|| AmoError::Api {
            status: 200,
            body: format!("no created {} id in response", key),
        })
}

/// Decode a contact record, deriving phones/emails through the configured
/// field ids. Missing keys decode to empty collections.
fn parse_contact(item: &Value, phone_field: Option<i64>, email_field: Option<i64>) -> Contact {
    let mut fields: HashMap<i64, Vec<String>> = HashMap::new();
    if let Some(custom) = item["custom_fields_values"].as_array() {
        for raw in custom {
            if let Ok(field) = serde_json::from_value::<CustomFieldValues>(raw.clone()) {
                let values: Vec<String> = field
                    .values
                    .iter()
                    .map(|v| v.value.as_string())
                    .filter(|v| !v.is_empty())
                    .collect();
                fields.insert(field.field_id, values);
            }
        }
    }

    let phones = phone_field
        .and_then(|id| fields.get(&id).cloned())
        .unwrap_or_default();
    let emails = email_field
        .and_then(|id| fields.get(&id).cloned())
        .unwrap_or_default();

    Contact {
        id: item["id"].as_i64().unwrap_or(0),
        name: item["name"].as_str().unwrap_or("").to_string(),
        fields,
        phones,
        emails,
    }
}

fn parse_deal(item: &Value) -> Deal {
    Deal {
        id: item["id"].as_i64().unwrap_or(0),
        name: item["name"].as_str().unwrap_or("").to_string(),
        pipeline_id: item["pipeline_id"].as_i64(),
        status_id: item["status_id"].as_i64(),
        responsible_user_id: item["responsible_user_id"].as_i64(),
    }
}
