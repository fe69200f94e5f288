//! Minimal Vault HTTP API: token lookup, AppRole login, KV v2 read.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use baseliner_core::VaultSettings;

use crate::error::VaultError;

const TOKEN_HEADER: &str = "X-Vault-Token";

/// Result of a successful AppRole login.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginAuth {
    pub client_token: String,
    /// Seconds; `0` means the token does not expire.
    pub lease_duration: u64,
}

impl std::fmt::Debug for LoginAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginAuth")
            .field("client_token", &"<redacted>")
            .field("lease_duration", &self.lease_duration)
            .finish()
    }
}

/// The calls the credential provider needs from the secret store.
#[async_trait]
pub trait VaultApi: Send + Sync {
    /// Verify that `token` is accepted.
    async fn lookup_self(&self, token: &str) -> Result<(), VaultError>;

    /// `Ok(None)` when the store answers success without an `auth` block.
    async fn app_role_login(
        &self,
        role_id: &str,
        secret_id: &str,
    ) -> Result<Option<LoginAuth>, VaultError>;

    /// Latest version of the KV v2 secret at `path`.
    async fn kv2_read(&self, token: &str, path: &str)
        -> Result<BTreeMap<String, Value>, VaultError>;
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct LoginResponse {
    auth: Option<AuthBlock>,
}

#[derive(Deserialize)]
struct AuthBlock {
    client_token: String,
    #[serde(default)]
    lease_duration: u64,
}

#[derive(Deserialize)]
struct KvResponse {
    data: Option<KvData>,
}

#[derive(Deserialize)]
struct KvData {
    data: Option<BTreeMap<String, Value>>,
}

// ---------------------------------------------------------------------------
// VaultHttp
// ---------------------------------------------------------------------------

/// reqwest-backed [`VaultApi`].
#[derive(Debug, Clone)]
pub struct VaultHttp {
    client: Client,
    base_url: String,
    kv_mount: String,
    approle_mount: String,
}

impl VaultHttp {
    pub fn new(address: &str, settings: &VaultSettings) -> Result<Self, VaultError> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| VaultError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: address.trim_end_matches('/').to_string(),
            kv_mount: trim_slashes(&settings.kv_mount).to_string(),
            approle_mount: trim_slashes(&settings.approle_mount).to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

fn trim_slashes(s: &str) -> &str {
    s.trim_matches('/')
}

fn transport(path: &str, err: reqwest::Error) -> VaultError {
    VaultError::Transport {
        path: path.to_string(),
        reason: err.to_string(),
    }
}

async fn check(path: &str, response: Response) -> Result<Response, VaultError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(VaultError::Status {
            path: path.to_string(),
            status: status.as_u16(),
            body: body.trim().to_string(),
        })
    }
}

async fn decode<T: DeserializeOwned>(path: &str, response: Response) -> Result<T, VaultError> {
    response.json().await.map_err(|e| VaultError::Decode {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl VaultApi for VaultHttp {
    async fn lookup_self(&self, token: &str) -> Result<(), VaultError> {
        let path = "/v1/auth/token/lookup-self";
        let response = self
            .client
            .get(self.url(path))
            .header(TOKEN_HEADER, token)
            .send()
            .await
            .map_err(|e| transport(path, e))?;
        check(path, response).await?;
        Ok(())
    }

    async fn app_role_login(
        &self,
        role_id: &str,
        secret_id: &str,
    ) -> Result<Option<LoginAuth>, VaultError> {
        let path = format!("/v1/auth/{}/login", self.approle_mount);
        let body = serde_json::json!({ "role_id": role_id, "secret_id": secret_id });
        let response = self
            .client
            .post(self.url(&path))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport(&path, e))?;
        let response = check(&path, response).await?;
        let login: LoginResponse = decode(&path, response).await?;
        Ok(login.auth.map(|auth| LoginAuth {
            client_token: auth.client_token,
            lease_duration: auth.lease_duration,
        }))
    }

    async fn kv2_read(
        &self,
        token: &str,
        secret_path: &str,
    ) -> Result<BTreeMap<String, Value>, VaultError> {
        let path = format!("/v1/{}/data/{}", self.kv_mount, trim_slashes(secret_path));
        let response = self
            .client
            .get(self.url(&path))
            .header(TOKEN_HEADER, token)
            .send()
            .await
            .map_err(|e| transport(&path, e))?;
        let response = check(&path, response).await?;
        let kv: KvResponse = decode(&path, response).await?;
        Ok(kv.data.and_then(|d| d.data).unwrap_or_default())
    }
}
