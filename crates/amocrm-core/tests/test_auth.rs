use amocrm_core::store::{MemoryStore, SettingsStore, AUTH_KEY};
use amocrm_core::{AmoClient, AmoConfig};
use anyhow::Result;
use std::sync::Arc;

fn config() -> AmoConfig {
    AmoConfig {
        domain: "example".to_string(),
        client_id: "id".to_string(),
        client_secret: "secret".to_string(),
        redirect_uri: "https://example.org/cb".to_string(),
        auth_code: None,
        refresh_margin_secs: 7 * 3600,
        account_ttl_secs: 24 * 3600,
        http_timeout_secs: 15,
    }
}

#[tokio::test]
async fn client_restores_authenticated_state_from_store() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let now = chrono::Utc::now().timestamp();
    store.put(
        AUTH_KEY,
        &format!(
            r#"{{"access_token":"a","refresh_token":"r","expires_in":86400,"server_time":{}}}"#,
            now
        ),
    )?;

    let client = AmoClient::new(config(), store)?;
    assert!(client.is_authenticated().await);
    Ok(())
}

#[tokio::test]
async fn client_with_failed_grant_blob_is_not_authenticated() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.put(
        AUTH_KEY,
        r#"{"error":"grant rejected","out":"{\"hint\":\"Authorization code has expired\"}"}"#,
    )?;

    let client = AmoClient::new(config(), store)?;
    assert!(!client.is_authenticated().await);

    // The failure is terminal: ensure_fresh refuses instead of retrying
    assert!(client.tokens().ensure_fresh().await.is_err());
    Ok(())
}

#[tokio::test]
async fn client_with_expired_blob_is_not_authenticated() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.put(
        AUTH_KEY,
        r#"{"access_token":"a","refresh_token":"r","expires_in":86400,"server_time":1500000000}"#,
    )?;

    let client = AmoClient::new(config(), store)?;
    assert!(!client.is_authenticated().await);
    Ok(())
}

#[tokio::test]
async fn client_without_blob_starts_unauthenticated() -> Result<()> {
    let client = AmoClient::new(config(), Arc::new(MemoryStore::new()))?;
    assert!(!client.is_authenticated().await);
    Ok(())
}
