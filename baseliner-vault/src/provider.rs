//! [`CredentialProvider`] over the Vault API.
//!
//! Retrieval is two-phase: *authenticate* (per credential variant) yields a
//! session token, then *read-secret* (shared) fetches the KV entry with it.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use tracing::{debug, info};

use baseliner_core::secrets::{CredentialError, CredentialProvider};
use baseliner_core::types::{CredentialRequest, SecretBundle};
use baseliner_core::Settings;

use crate::client::{VaultApi, VaultHttp};

/// Token obtained by the authenticate phase.
struct Session {
    token: String,
    expires_at: Option<chrono::DateTime<Utc>>,
}

pub struct VaultCredentialProvider<A = VaultHttp> {
    api: A,
    request: CredentialRequest,
}

impl VaultCredentialProvider<VaultHttp> {
    pub fn from_settings(settings: &Settings) -> Result<Self, CredentialError> {
        let api = VaultHttp::new(settings.credential.address(), &settings.vault)
            .map_err(|e| CredentialError::Client(e.to_string()))?;
        Ok(Self::with_api(api, settings.credential.clone()))
    }
}

impl<A: VaultApi> VaultCredentialProvider<A> {
    pub fn with_api(api: A, request: CredentialRequest) -> Self {
        Self { api, request }
    }

    async fn authenticate(&self) -> Result<Session, CredentialError> {
        let method = self.request.method();
        match &self.request {
            CredentialRequest::Token { token, .. } => {
                self.api
                    .lookup_self(token)
                    .await
                    .map_err(|e| CredentialError::Authenticate {
                        method,
                        reason: e.to_string(),
                    })?;
                Ok(Session {
                    token: token.clone(),
                    expires_at: None,
                })
            }
            CredentialRequest::AppRole {
                role_id, secret_id, ..
            } => {
                let auth = self
                    .api
                    .app_role_login(role_id, secret_id)
                    .await
                    .map_err(|e| CredentialError::Authenticate {
                        method,
                        reason: e.to_string(),
                    })?
                    .ok_or(CredentialError::MissingAuth { method })?;
                if auth.client_token.trim().is_empty() {
                    return Err(CredentialError::MissingAuth { method });
                }
                let expires_at = (auth.lease_duration > 0)
                    .then(|| i64::try_from(auth.lease_duration).ok())
                    .flatten()
                    .and_then(ChronoDuration::try_seconds)
                    .map(|lease| Utc::now() + lease);
                Ok(Session {
                    token: auth.client_token,
                    expires_at,
                })
            }
        }
    }

    async fn read_secret(&self, session: &Session) -> Result<SecretBundle, CredentialError> {
        let path = self.request.secret_path();
        let values = self
            .api
            .kv2_read(&session.token, path)
            .await
            .map_err(|e| CredentialError::ReadSecret {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        let bundle = SecretBundle::new(values);
        Ok(match session.expires_at {
            Some(at) => bundle.with_expiry(at),
            None => bundle,
        })
    }
}

#[async_trait]
impl<A: VaultApi> CredentialProvider for VaultCredentialProvider<A> {
    async fn retrieve(&self) -> Result<SecretBundle, CredentialError> {
        let method = self.request.method();
        debug!(method, address = self.request.address(), "authenticating with secret store");
        let session = self.authenticate().await?;
        info!(method, "authenticated with secret store");

        let bundle = self.read_secret(&session).await?;
        info!(
            path = self.request.secret_path(),
            keys = bundle.len(),
            expires_at = ?bundle.expires_at(),
            "secret read"
        );
        Ok(bundle)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
