//! VaultHttp + VaultCredentialProvider against a loopback axum server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use rstest::rstest;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use baseliner_core::secrets::{CredentialError, CredentialProvider};
use baseliner_core::types::CredentialRequest;
use baseliner_core::VaultSettings;
use baseliner_vault::{VaultApi, VaultCredentialProvider, VaultError, VaultHttp};

const ROOT_TOKEN: &str = "s.root";
const EPHEMERAL_TOKEN: &str = "hvs.ephemeral";

#[derive(Default)]
struct Store {
    login_without_auth: bool,
    null_data: bool,
    reads: AtomicUsize,
}

fn token_of(headers: &HeaderMap) -> Option<&str> {
    headers.get("x-vault-token").and_then(|v| v.to_str().ok())
}

async fn lookup_self(headers: HeaderMap) -> impl IntoResponse {
    match token_of(&headers) {
        Some(ROOT_TOKEN) => (StatusCode::OK, Json(json!({ "data": { "ttl": 0 } }))),
        _ => (StatusCode::FORBIDDEN, Json(json!({ "errors": ["permission denied"] }))),
    }
}

async fn login(State(store): State<Arc<Store>>, Json(body): Json<Value>) -> impl IntoResponse {
    if body["role_id"] != "role" || body["secret_id"] != "sid" {
        return (StatusCode::BAD_REQUEST, Json(json!({ "errors": ["invalid role or secret ID"] })));
    }
    if store.login_without_auth {
        return (StatusCode::OK, Json(json!({ "auth": null, "warnings": ["no auth"] })));
    }
    (
        StatusCode::OK,
        Json(json!({ "auth": { "client_token": EPHEMERAL_TOKEN, "lease_duration": 1200 } })),
    )
}

async fn kv_read(
    State(store): State<Arc<Store>>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    store.reads.fetch_add(1, Ordering::SeqCst);
    if !matches!(token_of(&headers), Some(ROOT_TOKEN) | Some(EPHEMERAL_TOKEN)) {
        return (StatusCode::FORBIDDEN, Json(json!({ "errors": ["permission denied"] })));
    }
    if path != "mor/stg/gitlab" {
        return (StatusCode::NOT_FOUND, Json(json!({ "errors": [] })));
    }
    if store.null_data {
        return (StatusCode::OK, Json(json!({ "data": { "data": null, "metadata": null } })));
    }
    (
        StatusCode::OK,
        Json(json!({ "data": { "data": { "token": "glpat-abc", "owner": "platform" }, "metadata": { "version": 3 } } })),
    )
}

async fn spawn_vault(store: Arc<Store>) -> String {
    let app = Router::new()
        .route("/v1/auth/token/lookup-self", get(lookup_self))
        .route("/v1/auth/approle/login", post(login))
        .route("/v1/secret/data/{*path}", get(kv_read))
        .with_state(store);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn settings() -> VaultSettings {
    VaultSettings {
        request_timeout: Duration::from_secs(5),
        ..VaultSettings::default()
    }
}

fn provider(base: &str, request: CredentialRequest) -> VaultCredentialProvider {
    let api = VaultHttp::new(base, &settings()).expect("client");
    VaultCredentialProvider::with_api(api, request)
}

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

#[tokio::test]
async fn token_auth_reads_secret() {
    let base = spawn_vault(Arc::new(Store::default())).await;
    let request = CredentialRequest::token(&base, "mor/stg/gitlab", ROOT_TOKEN).unwrap();
    let bundle = provider(&base, request).retrieve().await.expect("retrieve");
    assert_eq!(bundle.get_str("token"), Some("glpat-abc"));
    assert_eq!(bundle.len(), 2);
    assert!(bundle.expires_at().is_none());
}

#[tokio::test]
async fn missing_secret_path_is_read_error() {
    let base = spawn_vault(Arc::new(Store::default())).await;
    let request = CredentialRequest::token(&base, "mor/prd/gitlab", ROOT_TOKEN).unwrap();
    let err = provider(&base, request).retrieve().await.unwrap_err();
    assert!(matches!(err, CredentialError::ReadSecret { .. }), "got: {err}");
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn null_secret_data_is_empty_bundle() {
    let base = spawn_vault(Arc::new(Store {
        null_data: true,
        ..Default::default()
    }))
    .await;
    let request = CredentialRequest::token(&base, "mor/stg/gitlab", ROOT_TOKEN).unwrap();
    let bundle = provider(&base, request).retrieve().await.expect("retrieve");
    assert!(bundle.is_empty());
}

// ---------------------------------------------------------------------------
// AppRole
// ---------------------------------------------------------------------------

#[tokio::test]
async fn approle_login_then_read() {
    let base = spawn_vault(Arc::new(Store::default())).await;
    let request = CredentialRequest::app_role(&base, "/mor/stg/gitlab/", "role", "sid").unwrap();
    let bundle = provider(&base, request).retrieve().await.expect("retrieve");
    assert_eq!(bundle.get_str("token"), Some("glpat-abc"));
    assert!(bundle.expires_at().is_some());
}

#[tokio::test]
async fn approle_success_without_auth_is_missing_auth() {
    let store = Arc::new(Store {
        login_without_auth: true,
        ..Default::default()
    });
    let base = spawn_vault(store.clone()).await;
    let request = CredentialRequest::app_role(&base, "mor/stg/gitlab", "role", "sid").unwrap();
    let err = provider(&base, request).retrieve().await.unwrap_err();
    assert!(matches!(err, CredentialError::MissingAuth { .. }), "got: {err}");
    assert_eq!(store.reads.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Rejected authentication
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Auth {
    Token(&'static str),
    AppRole(&'static str, &'static str),
}

#[rstest]
#[case::unknown_token(Auth::Token("s.wrong"), "token", "403")]
#[case::wrong_secret_id(Auth::AppRole("role", "nope"), "approle", "400")]
#[case::wrong_role_id(Auth::AppRole("other", "sid"), "approle", "400")]
#[tokio::test]
async fn rejected_credentials_fail_before_reading(
    #[case] auth: Auth,
    #[case] expected_method: &str,
    #[case] expected_status: &str,
) {
    let store = Arc::new(Store::default());
    let base = spawn_vault(store.clone()).await;
    let request = match auth {
        Auth::Token(token) => CredentialRequest::token(&base, "mor/stg/gitlab", token),
        Auth::AppRole(role, secret) => CredentialRequest::app_role(&base, "mor/stg/gitlab", role, secret),
    }
    .unwrap();

    let err = provider(&base, request).retrieve().await.unwrap_err();
    match &err {
        CredentialError::Authenticate { method, .. } => assert_eq!(*method, expected_method),
        other => panic!("expected an authenticate failure, got: {other}"),
    }
    assert!(err.to_string().contains(expected_status), "got: {err}");
    assert_eq!(store.reads.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unreachable_store_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let api = VaultHttp::new(&format!("http://{addr}"), &settings()).expect("client");
    let err = api.lookup_self(ROOT_TOKEN).await.unwrap_err();
    assert!(matches!(err, VaultError::Transport { .. }), "got: {err}");
}
