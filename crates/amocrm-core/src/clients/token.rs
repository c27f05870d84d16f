//! OAuth token lifecycle for the AmoCRM API.
//!
//! Owns the credential state, decides when a refresh is due, performs the
//! authorization_code / refresh_token grants, and writes every outcome
//! through to the settings store so a client constructed afterwards observes
//! the latest tokens.

use crate::clients::transport::Transport;
use crate::config::AmoConfig;
use crate::error::{AmoError, Result};
use crate::store::{get_json, put_json, SettingsStore, AUTH_KEY};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

const TOKEN_PATH: &str = "/oauth2/access_token";

/// Credential state. A grant rejected with HTTP 400 is terminal: the state
/// stays `Failed` until a human re-runs the authorization-code flow.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated {
        access_token: String,
        refresh_token: String,
        expires_at: DateTime<Utc>,
    },
    Failed {
        diagnostic: String,
    },
}

/// Stored shape of the `amocrm_auth` blob. Expiry is persisted as the grant
/// response's `expires_in` plus the server time of the exchange.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedAuth {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    server_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    out: Option<String>,
}

impl PersistedAuth {
    fn into_state(self) -> AuthState {
        if let Some(error) = self.error {
            return AuthState::Failed { diagnostic: error };
        }

        match (self.access_token, self.refresh_token, self.server_time, self.expires_in) {
            (Some(access_token), Some(refresh_token), Some(server_time), Some(expires_in)) => {
                match Utc.timestamp_opt(server_time + expires_in, 0).single() {
                    Some(expires_at) => AuthState::Authenticated {
                        access_token,
                        refresh_token,
                        expires_at,
                    },
                    None => AuthState::Unauthenticated,
                }
            }
            _ => AuthState::Unauthenticated,
        }
    }

    fn from_state(state: &AuthState) -> Self {
        match state {
            AuthState::Unauthenticated => Self::default(),
            AuthState::Authenticated {
                access_token,
                refresh_token,
                expires_at,
            } => {
                let now = Utc::now().timestamp();
                Self {
                    access_token: Some(access_token.clone()),
                    refresh_token: Some(refresh_token.clone()),
                    expires_in: Some(expires_at.timestamp() - now),
                    server_time: Some(now),
                    error: None,
                    out: None,
                }
            }
            AuthState::Failed { diagnostic } => Self {
                error: Some("grant rejected".to_string()),
                out: Some(diagnostic.clone()),
                ..Self::default()
            },
        }
    }
}

/// Successful grant response from the token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

pub struct TokenManager {
    config: AmoConfig,
    transport: Arc<Transport>,
    store: Arc<dyn SettingsStore>,
    // Held across the whole check-and-refresh sequence so two concurrent
    // callers produce exactly one grant
    state: Mutex<AuthState>,
    // One-shot authorization code, consumed by the first grant
    auth_code: std::sync::Mutex<Option<String>>,
}

impl TokenManager {
    /// Construct from persisted state; an absent or unreadable blob starts
    /// unauthenticated.
    pub fn load(
        config: AmoConfig,
        transport: Arc<Transport>,
        store: Arc<dyn SettingsStore>,
    ) -> Result<Self> {
        let state = match get_json::<PersistedAuth>(store.as_ref(), AUTH_KEY)? {
            Some(persisted) => persisted.into_state(),
            None => AuthState::Unauthenticated,
        };

        let auth_code = config.auth_code.clone();
        Ok(Self {
            config,
            transport,
            store,
            state: Mutex::new(state),
            auth_code: std::sync::Mutex::new(auth_code),
        })
    }

    /// True iff a token is present, no failure is recorded, and the token is
    /// not definitively expired
    pub async fn is_authenticated(&self) -> bool {
        match &*self.state.lock().await {
            AuthState::Authenticated { expires_at, .. } => *expires_at > Utc::now(),
            _ => false,
        }
    }

    /// Refresh credentials if needed: first grant when an authorization code
    /// is configured, refresh grant when expiry is near, no-op otherwise.
    pub async fn ensure_fresh(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.ensure_fresh_locked(&mut state).await
    }

    /// Run `ensure_fresh` and return the current access token
    pub async fn access_token(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        self.ensure_fresh_locked(&mut state).await?;

        match &*state {
            AuthState::Authenticated { access_token, .. } => Ok(access_token.clone()),
            _ => Err(AmoError::Auth("no access token available".to_string())),
        }
    }

    /// Manual re-authorization entry point: clears any terminal failure and
    /// arms a new one-shot authorization code. The code itself is never
    /// written to the auth blob.
    pub async fn reset(&self, auth_code: Option<String>) -> Result<()> {
        let mut state = self.state.lock().await;
        *state = AuthState::Unauthenticated;
        *self.auth_code.lock().unwrap() = auth_code;
        self.persist(&state)
    }

    async fn ensure_fresh_locked(&self, state: &mut AuthState) -> Result<()> {
        match state {
            AuthState::Failed { diagnostic } => Err(AmoError::Auth(format!(
                "authorization previously failed, manual re-authorization required: {}",
                diagnostic
            ))),
            AuthState::Unauthenticated => {
                let code = self.auth_code.lock().unwrap().clone().ok_or_else(|| {
                    AmoError::Auth(
                        "no access token and no authorization code configured".to_string(),
                    )
                })?;

                log::info!("exchanging authorization code for tokens");
                let form = [
                    ("client_id", self.config.client_id.as_str()),
                    ("client_secret", self.config.client_secret.as_str()),
                    ("redirect_uri", self.config.redirect_uri.as_str()),
                    ("grant_type", "authorization_code"),
                    ("code", code.as_str()),
                ];
                self.grant(state, &form).await?;

                // The code is single-use; drop it so a later expiry goes
                // through the refresh grant, not a dead code exchange
                *self.auth_code.lock().unwrap() = None;
                Ok(())
            }
            AuthState::Authenticated {
                refresh_token,
                expires_at,
                ..
            } => {
                let margin = Duration::seconds(self.config.refresh_margin_secs);
                if *expires_at - Utc::now() >= margin {
                    return Ok(());
                }

                log::info!(
                    "access token expires at {}, refreshing (margin {}s)",
                    expires_at,
                    self.config.refresh_margin_secs
                );
                let refresh = refresh_token.clone();
                let form = [
                    ("client_id", self.config.client_id.as_str()),
                    ("client_secret", self.config.client_secret.as_str()),
                    ("redirect_uri", self.config.redirect_uri.as_str()),
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh.as_str()),
                ];
                self.grant(state, &form).await
            }
        }
    }

    /// Perform one token-endpoint call and persist the outcome. HTTP 400
    /// marks the credentials failed until manual reset; other non-2xx
    /// statuses surface as API errors without touching the state.
    async fn grant(&self, state: &mut AuthState, form: &[(&str, &str)]) -> Result<()> {
        let (status, body) = self.transport.post_form(TOKEN_PATH, form).await?;

        if status == 400 {
            log::error!("grant rejected: {}", body);
            *state = AuthState::Failed { diagnostic: body };
            self.persist(state)?;
            return Err(AmoError::Auth(
                "grant rejected by provider, manual re-authorization required".to_string(),
            ));
        }

        if status != 200 {
            return Err(AmoError::Api { status, body });
        }

        let token: TokenResponse = serde_json::from_str(&body)?;
        *state = AuthState::Authenticated {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        };
        self.persist(state)?;

        log::info!("tokens updated, access token valid for {}s", token.expires_in);
        Ok(())
    }

    fn persist(&self, state: &AuthState) -> Result<()> {
        put_json(self.store.as_ref(), AUTH_KEY, &PersistedAuth::from_state(state))
    }

    #[cfg(test)]
    pub(crate) async fn state_for_test(&self) -> AuthState {
        self.state.lock().await.clone()
    }

    #[cfg(test)]
    pub(crate) async fn set_state_for_test(&self, state: AuthState) {
        *self.state.lock().await = state;
    }
}

/// Raw token-endpoint body decode used by diagnostics in the settings UI
pub fn decode_grant_error(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value["hint"]
        .as_str()
        .or_else(|| value["detail"].as_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn test_config() -> AmoConfig {
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

    fn manager_with_store(store: Arc<MemoryStore>) -> TokenManager {
        let config = test_config();
        let transport = Arc::new(Transport::new(config.base_url(), 15).unwrap());
        TokenManager::load(config, transport, store).unwrap()
    }

    #[test]
    fn persisted_auth_decodes_to_authenticated() {
        let now = Utc::now().timestamp();
        let blob = format!(
            r#"{{"access_token":"a","refresh_token":"r","expires_in":86400,"server_time":{}}}"#,
            now
        );
        let persisted: PersistedAuth = serde_json::from_str(&blob).unwrap();
        match persisted.into_state() {
            AuthState::Authenticated { access_token, expires_at, .. } => {
                assert_eq!(access_token, "a");
                assert!(expires_at > Utc::now());
            }
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[test]
    fn persisted_auth_error_wins_over_tokens() {
        let blob = r#"{"access_token":"a","refresh_token":"r","expires_in":86400,
                       "server_time":1700000000,"error":"grant rejected","out":"{\"hint\":\"bad code\"}"}"#;
        let persisted: PersistedAuth = serde_json::from_str(blob).unwrap();
        assert!(matches!(persisted.into_state(), AuthState::Failed { .. }));
    }

    #[test]
    fn persisted_auth_partial_is_unauthenticated() {
        let blob = r#"{"access_token":"a"}"#;
        let persisted: PersistedAuth = serde_json::from_str(blob).unwrap();
        assert_eq!(persisted.into_state(), AuthState::Unauthenticated);
    }

    #[test]
    fn failed_state_round_trips_through_store() {
        let state = AuthState::Failed {
            diagnostic: r#"{"hint":"Authorization code has expired"}"#.to_string(),
        };
        let raw = serde_json::to_string(&PersistedAuth::from_state(&state)).unwrap();
        let back: PersistedAuth = serde_json::from_str(&raw).unwrap();
        match back.into_state() {
            AuthState::Failed { diagnostic } => assert!(diagnostic.contains("expired")),
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[tokio::test]
    async fn fresh_token_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_with_store(store);
        manager
            .set_state_for_test(AuthState::Authenticated {
                access_token: "valid".to_string(),
                refresh_token: "refresh".to_string(),
                expires_at: Utc::now() + Duration::hours(24),
            })
            .await;

        assert!(manager.is_authenticated().await);
        assert_eq!(manager.access_token().await.unwrap(), "valid");
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_fresh_token() {
        // With a fresh token both callers take the no-op path under the same
        // mutex; exercising an actual double refresh needs a mock token
        // endpoint.
        let store = Arc::new(MemoryStore::new());
        let manager = Arc::new(manager_with_store(store));
        manager
            .set_state_for_test(AuthState::Authenticated {
                access_token: "valid".to_string(),
                refresh_token: "refresh".to_string(),
                expires_at: Utc::now() + Duration::hours(24),
            })
            .await;

        let a = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.access_token().await }
        });
        let b = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.access_token().await }
        });

        assert_eq!(a.await.unwrap().unwrap(), "valid");
        assert_eq!(b.await.unwrap().unwrap(), "valid");
    }

    #[tokio::test]
    async fn failed_state_is_terminal() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_with_store(store);
        manager
            .set_state_for_test(AuthState::Failed {
                diagnostic: "bad code".to_string(),
            })
            .await;

        assert!(!manager.is_authenticated().await);
        assert!(matches!(
            manager.ensure_fresh().await,
            Err(AmoError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn expired_token_is_not_authenticated() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_with_store(store);
        manager
            .set_state_for_test(AuthState::Authenticated {
                access_token: "stale".to_string(),
                refresh_token: "refresh".to_string(),
                expires_at: Utc::now() - Duration::hours(1),
            })
            .await;

        assert!(!manager.is_authenticated().await);
    }

    #[tokio::test]
    async fn reset_clears_failure_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_with_store(Arc::clone(&store));
        manager
            .set_state_for_test(AuthState::Failed {
                diagnostic: "bad code".to_string(),
            })
            .await;

        manager.reset(Some("new-code".to_string())).await.unwrap();
        assert_eq!(manager.state_for_test().await, AuthState::Unauthenticated);

        let raw = store.get(AUTH_KEY).unwrap().unwrap();
        let persisted: PersistedAuth = serde_json::from_str(&raw).unwrap();
        assert_eq!(persisted.into_state(), AuthState::Unauthenticated);
    }

    #[test]
    fn decode_grant_error_prefers_hint() {
        let body = r#"{"hint":"Authorization code has expired","detail":"invalid_grant"}"#;
        assert_eq!(
            decode_grant_error(body).as_deref(),
            Some("Authorization code has expired")
        );
        assert!(decode_grant_error("not json").is_none());
    }
}
