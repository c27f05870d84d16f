//! HTTP transport for the AmoCRM API.
//!
//! Issues the actual requests and classifies responses; everything above it
//! works with parsed JSON bodies and never sees a `reqwest::Response`.

use crate::constants::USER_AGENT;
use crate::error::{AmoError, Result};
use reqwest::Client as HttpClient;
use serde_json::Value;
use std::time::Duration;

pub struct Transport {
    http: HttpClient,
    base_url: String,
}

impl Transport {
    pub fn new(base_url: String, timeout_secs: u64) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AmoError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET with bearer auth and an optional IF-MODIFIED-SINCE header
    pub async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
        bearer: &str,
        if_modified_since: Option<String>,
    ) -> Result<Option<Value>> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.http.get(&url).bearer_auth(bearer);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(date) = if_modified_since {
            request = request.header("IF-MODIFIED-SINCE", date);
        }

        log::debug!("GET {}", url);
        let response = request.send().await?;
        Self::classify(response).await
    }

    /// POST a JSON body with bearer auth
    pub async fn post_json(&self, path: &str, bearer: &str, body: &Value) -> Result<Option<Value>> {
        let url = format!("{}{}", self.base_url, path);

        log::debug!("POST {}", url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(bearer)
            .json(body)
            .send()
            .await?;
        Self::classify(response).await
    }

    /// POST an unauthenticated form. Returns the raw status and body so the
    /// token manager can treat grant rejections specially.
    pub async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<(u16, String)> {
        let url = format!("{}{}", self.base_url, path);

        log::debug!("POST {} (form)", url);
        let response = self.http.post(&url).form(form).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok((status, body))
    }

    /// 200/204 with a parseable body is data, 200/204 with an empty body is
    /// "no results", anything else is an API error carrying the status.
    async fn classify(response: reqwest::Response) -> Result<Option<Value>> {
        let status = response.status().as_u16();
        let body = response.text().await?;

        if status != 200 && status != 204 {
            let preview: String = body.chars().take(500).collect();
            log::error!("AmoCRM API error (status {}): {}", status, preview);
            return Err(AmoError::Api { status, body });
        }

        if body.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(serde_json::from_str(&body)?))
    }
}
