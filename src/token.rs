use crate::credentials::{Credential, CredentialStore};
use crate::errors::AuthError;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::info;

/// Fixed client identifier the source identity provider expects for the
/// password grant.
const GRANT_CLIENT_ID: &str = "rapt-user";

/// A credential inside this window before expiry is proactively renewed.
/// With a 20-minute poll cadence, a failed renewal still leaves at least one
/// more cycle before the old token actually expires.
const RENEWAL_WINDOW_SECS: i64 = 15 * 60;

pub trait TokenSource {
    async fn get_token(&self) -> Result<String, AuthError>;
}

/// Owns the credential lifecycle: serve the cached token while it is outside
/// the renewal window, otherwise exchange the configured username/API key for
/// a fresh one and persist it. One exchange attempt per cycle, no retries.
pub struct TokenManager {
    http: Client,
    token_url: String,
    username: String,
    api_key: String,
    store: Option<Box<dyn CredentialStore>>,
    // Process-local fallback for the storeless path; avoids re-issuing on
    // every cycle within one process lifetime.
    cached: Mutex<Option<Credential>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

impl TokenManager {
    pub fn new(
        http: Client,
        token_url: String,
        username: String,
        api_key: String,
        store: Option<Box<dyn CredentialStore>>,
    ) -> Self {
        Self {
            http,
            token_url,
            username,
            api_key,
            store,
            cached: Mutex::new(None),
        }
    }

    async fn exchange(&self) -> Result<Credential, AuthError> {
        let form = [
            ("client_id", GRANT_CLIENT_ID),
            ("grant_type", "password"),
            ("username", self.username.as_str()),
            ("password", self.api_key.as_str()),
        ];
        let response = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(AuthError::Transport)?;
        let status = response.status();
        let body = response.text().await.map_err(AuthError::Transport)?;
        if !status.is_success() {
            return Err(AuthError::Status { status });
        }
        let parsed: TokenResponse = serde_json::from_str(&body).map_err(AuthError::Decode)?;
        Ok(credential_from_response(parsed, Utc::now()))
    }
}

impl TokenSource for TokenManager {
    async fn get_token(&self) -> Result<String, AuthError> {
        let now = Utc::now();
        if let Some(store) = self.store.as_deref() {
            if let Some(credential) = store.load().map_err(AuthError::Store)? {
                if is_fresh(&credential, now) {
                    return Ok(credential.token);
                }
            }
        } else if let Some(credential) = self.cached.lock().await.clone() {
            if is_fresh(&credential, now) {
                return Ok(credential.token);
            }
        }

        info!("cached token absent or inside renewal window; exchanging for a new one");
        let credential = self.exchange().await?;
        if let Some(store) = self.store.as_deref() {
            store.store(&credential).map_err(AuthError::Store)?;
        } else {
            *self.cached.lock().await = Some(credential.clone());
        }
        info!(expires_at = %credential.expires_at, "issued fresh source API token");
        Ok(credential.token)
    }
}

fn is_fresh(credential: &Credential, now: DateTime<Utc>) -> bool {
    credential.expires_at > now + Duration::seconds(RENEWAL_WINDOW_SECS)
}

fn credential_from_response(response: TokenResponse, now: DateTime<Utc>) -> Credential {
    Credential {
        token: response.access_token,
        expires_at: now + Duration::seconds(response.expires_in),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::FileCredentialStore;
    use tempfile::TempDir;

    fn credential(expires_in_secs: i64) -> Credential {
        Credential {
            token: "cached-token".to_string(),
            expires_at: Utc::now() + Duration::seconds(expires_in_secs),
        }
    }

    // Points at a closed loopback port; any network call would fail loudly.
    fn manager(store: Option<Box<dyn CredentialStore>>) -> TokenManager {
        TokenManager::new(
            Client::new(),
            "http://127.0.0.1:9/connect/token".to_string(),
            "brewer@example.com".to_string(),
            "api-key".to_string(),
            store,
        )
    }

    #[test]
    fn freshness_respects_the_renewal_window() {
        let now = Utc::now();
        assert!(is_fresh(&credential(RENEWAL_WINDOW_SECS + 60), now));
        assert!(!is_fresh(&credential(RENEWAL_WINDOW_SECS - 60), now));
        assert!(!is_fresh(&credential(-10), now));
    }

    #[test]
    fn expiry_is_issuance_time_plus_expires_in() {
        let now = Utc::now();
        let credential = credential_from_response(
            TokenResponse {
                access_token: "t".to_string(),
                expires_in: 3600,
            },
            now,
        );
        assert_eq!(credential.expires_at, now + Duration::seconds(3600));
        assert_eq!(credential.token, "t");
    }

    #[tokio::test]
    async fn fresh_durable_credential_short_circuits_without_network() {
        let dir = TempDir::new().unwrap();
        let store = FileCredentialStore::new(dir.path().join("credential.json"));
        store.store(&credential(3600)).unwrap();

        let manager = manager(Some(Box::new(store)));
        let token = manager.get_token().await.unwrap();
        assert_eq!(token, "cached-token");
    }

    #[tokio::test]
    async fn fresh_process_local_credential_short_circuits_without_network() {
        let manager = manager(None);
        *manager.cached.lock().await = Some(credential(3600));
        assert_eq!(manager.get_token().await.unwrap(), "cached-token");
    }

    #[tokio::test]
    async fn credential_inside_window_forces_an_exchange() {
        let dir = TempDir::new().unwrap();
        let store = FileCredentialStore::new(dir.path().join("credential.json"));
        store.store(&credential(60)).unwrap();

        // The exchange hits the closed port and must surface as AuthError,
        // never the stale cached token.
        let manager = manager(Some(Box::new(store)));
        match manager.get_token().await {
            Err(AuthError::Transport(_)) => {}
            other => panic!("expected transport AuthError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_credential_forces_an_exchange() {
        let manager = manager(None);
        assert!(manager.get_token().await.is_err());
    }
}
