use amocrm_core::config::AmoConfig;
use amocrm_core::store::{MemoryStore, SettingsStore, SETTINGS_KEY};

#[test]
fn test_parse_settings_blob() {
    // Exact structure the settings UI writes
    let json = r#"{
        "auth_domain": "mycompany",
        "auth_id": "client-id-value",
        "auth_key": "client-secret-value",
        "auth_redirect_uri": "https://example.org/amocrm/callback",
        "auth_code": "one-shot-code"
    }"#;

    let config = AmoConfig::from_json_str(json).expect("Failed to parse settings");

    assert_eq!(config.domain, "mycompany");
    assert_eq!(config.client_id, "client-id-value");
    assert_eq!(config.client_secret, "client-secret-value");
    assert_eq!(config.redirect_uri, "https://example.org/amocrm/callback");
    assert_eq!(config.auth_code.as_deref(), Some("one-shot-code"));
    assert_eq!(config.base_url(), "https://mycompany.amocrm.ru");

    // Tunables fall back to defaults
    assert_eq!(config.refresh_margin_secs, 7 * 60 * 60, "Default refresh margin");
    assert_eq!(config.account_ttl_secs, 24 * 60 * 60, "Default account TTL");
    assert_eq!(config.http_timeout_secs, 15, "Default HTTP timeout");
}

#[test]
fn test_parse_short_key_aliases() {
    // Older exports used the short key names
    let json = r#"{
        "domain": "mycompany",
        "client_id": "id",
        "client_secret": "secret",
        "redirect_uri": "https://example.org/cb",
        "refresh_margin_secs": 3600
    }"#;

    let config = AmoConfig::from_json_str(json).expect("Failed to parse aliased settings");

    assert_eq!(config.domain, "mycompany");
    assert_eq!(config.client_id, "id");
    assert_eq!(config.refresh_margin_secs, 3600, "Explicit margin overrides default");
    assert_eq!(config.auth_code, None, "Absent auth code stays None");
}

#[test]
fn test_empty_auth_code_reads_as_none() {
    let json = r#"{
        "auth_domain": "mycompany",
        "auth_id": "id",
        "auth_key": "secret",
        "auth_redirect_uri": "https://example.org/cb",
        "auth_code": ""
    }"#;

    let config = AmoConfig::from_json_str(json).unwrap();
    assert_eq!(config.auth_code, None);
}

#[test]
fn test_validate_rejects_missing_credentials() {
    let json = r#"{
        "auth_domain": "",
        "auth_id": "id",
        "auth_key": "secret",
        "auth_redirect_uri": "https://example.org/cb"
    }"#;
    assert!(AmoConfig::from_json_str(json).is_err(), "Empty domain must fail");

    let json = r#"{
        "auth_domain": "mycompany",
        "auth_id": "",
        "auth_key": "",
        "auth_redirect_uri": "https://example.org/cb"
    }"#;
    assert!(AmoConfig::from_json_str(json).is_err(), "Empty client id must fail");

    let json = r#"{
        "auth_domain": "mycompany",
        "auth_id": "id",
        "auth_key": "secret",
        "auth_redirect_uri": ""
    }"#;
    assert!(AmoConfig::from_json_str(json).is_err(), "Empty redirect URI must fail");
}

#[test]
fn test_load_from_store() {
    let store = MemoryStore::new();
    store
        .put(
            SETTINGS_KEY,
            r#"{
                "auth_domain": "mycompany",
                "auth_id": "id",
                "auth_key": "secret",
                "auth_redirect_uri": "https://example.org/cb"
            }"#,
        )
        .unwrap();

    let config = AmoConfig::from_store(&store).expect("Failed to load from store");
    assert_eq!(config.domain, "mycompany");

    let empty = MemoryStore::new();
    assert!(AmoConfig::from_store(&empty).is_err(), "Missing blob must fail");
}
