#![allow(dead_code, missing_docs, clippy::expect_used, clippy::missing_errors_doc)]
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use authflow_core::{ApiClient, ApiClientBuilder};
use axum::extract::{Form, RawQuery, State};
use axum::http::header::{ACCEPT, AUTHORIZATION};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use rstest::fixture;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::info;

pub const CLIENT_ID: &str = "haapi-public-client";
pub const CLIENT_SECRET: &str = "secret";
const CLIENT_BASIC_CREDENTIAL: &str = "Basic aGFhcGktcHVibGljLWNsaWVudDpzZWNyZXQ=";

pub fn init_tracing() {
    // should be run once, fail otherwise, we skip that error
    let _ = tracing_subscriber::fmt()
        .pretty()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();

    info!("Tracing initialized");
}

#[fixture]
pub async fn server() -> FakeIdentityServer {
    init_tracing();
    match FakeIdentityServer::start().await {
        Ok(server) => server,
        Err(error) => {
            panic!("fail to start fake identity server: {error:?}");
        }
    }
}

/// What the fake identity server observed and how it behaves.
#[derive(Debug, Default)]
pub struct ServerState {
    token_requests: AtomicUsize,
    issued: AtomicUsize,
    valid_token: Mutex<Option<String>>,
    reject_all: AtomicBool,
    token_delay_ms: AtomicUsize,
    authorizations: Mutex<Vec<Option<String>>>,
    accepts: Mutex<Vec<Option<String>>>,
    queries: Mutex<Vec<Option<String>>>,
}

impl ServerState {
    fn is_valid(&self, authorization: Option<&str>) -> bool {
        if self.reject_all.load(Ordering::SeqCst) {
            return false;
        }
        let valid = self.valid_token.lock().expect("lock").clone();
        match (authorization, valid) {
            (Some(header), Some(token)) => header == format!("Bearer {token}"),
            _ => false,
        }
    }

    fn issue(&self, scope: Option<&String>) -> serde_json::Value {
        let generation = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let access_token = format!("token-{generation}");
        *self.valid_token.lock().expect("lock") = Some(access_token.clone());
        let mut body = json!({
            "access_token": access_token,
            "token_type": "bearer",
            "expires_in": 300,
            "refresh_token": format!("refresh-{generation}"),
        });
        if let Some(scope) = scope {
            body["scope"] = json!(scope);
        }
        body
    }
}

pub struct FakeIdentityServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    handle: JoinHandle<()>,
}

impl FakeIdentityServer {
    pub async fn start() -> anyhow::Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(ServerState::default());

        let router = Router::new()
            .route("/oauth/v2/oauth-authorize", get(authorize))
            .route("/oauth/v2/oauth-token", post(token))
            .route("/empty", get(|| async { StatusCode::NO_CONTENT }))
            .route("/not-json", get(|| async { "<html>login</html>" }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Json(json!({"type": "authentication-step"}))
                }),
            )
            .with_state(Arc::clone(&state));

        info!(%addr, "launching fake identity server");
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Ok(Self {
            addr,
            state,
            handle,
        })
    }

    pub fn client_builder(&self) -> ApiClientBuilder {
        ApiClient::builder()
            .with_host(self.addr.ip().to_string())
            .with_port(self.addr.port())
    }

    pub fn token_url(&self) -> String {
        format!("http://{}/oauth/v2/oauth-token", self.addr)
    }

    pub fn accept_token(&self, token: &str) {
        *self.state.valid_token.lock().expect("lock") = Some(token.to_string());
    }

    pub fn revoke_tokens(&self) {
        *self.state.valid_token.lock().expect("lock") = None;
    }

    pub fn reject_all(&self) {
        self.state.reject_all.store(true, Ordering::SeqCst);
    }

    pub fn delay_token_responses(&self, delay: Duration) {
        let millis = usize::try_from(delay.as_millis()).unwrap_or(usize::MAX);
        self.state.token_delay_ms.store(millis, Ordering::SeqCst);
    }

    pub fn token_requests(&self) -> usize {
        self.state.token_requests.load(Ordering::SeqCst)
    }

    pub fn authorizations(&self) -> Vec<Option<String>> {
        self.state.authorizations.lock().expect("lock").clone()
    }

    pub fn accepts(&self) -> Vec<Option<String>> {
        self.state.accepts.lock().expect("lock").clone()
    }

    pub fn queries(&self) -> Vec<Option<String>> {
        self.state.queries.lock().expect("lock").clone()
    }
}

impl Drop for FakeIdentityServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn header(headers: &HeaderMap, name: axum::http::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

async fn authorize(
    State(state): State<Arc<ServerState>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> impl IntoResponse {
    let authorization = header(&headers, AUTHORIZATION);
    let valid = state.is_valid(authorization.as_deref());

    state.authorizations.lock().expect("lock").push(authorization);
    state.accepts.lock().expect("lock").push(header(&headers, ACCEPT));
    state.queries.lock().expect("lock").push(query);

    if valid {
        let body = json!({
            "type": "authentication-step",
            "actions": [{"template": "selector", "kind": "authenticator-selector"}],
        });
        (StatusCode::OK, Json(body))
    } else {
        let body = json!({
            "type": "https://curity.se/problems/unexpected",
            "title": "Access denied",
        });
        (StatusCode::UNAUTHORIZED, Json(body))
    }
}

async fn token(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    state.token_requests.fetch_add(1, Ordering::SeqCst);
    let delay = state.token_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(u64::try_from(delay).unwrap_or_default())).await;
    }

    let invalid = |error: &str, description: &str| {
        let body = json!({"error": error, "error_description": description});
        (StatusCode::BAD_REQUEST, Json(body))
    };

    let basic = header(&headers, AUTHORIZATION).as_deref() == Some(CLIENT_BASIC_CREDENTIAL);
    let post = form.get("client_id").map(String::as_str) == Some(CLIENT_ID)
        && form.get("client_secret").map(String::as_str) == Some(CLIENT_SECRET);
    if !basic && !post {
        let body = json!({"error": "invalid_client"});
        return (StatusCode::UNAUTHORIZED, Json(body));
    }

    match form.get("grant_type").map(String::as_str) {
        Some("client_credentials") => (StatusCode::OK, Json(state.issue(form.get("scope")))),
        Some("refresh_token") => {
            let expected = format!("refresh-{}", state.issued.load(Ordering::SeqCst));
            if form.get("refresh_token") == Some(&expected) {
                (StatusCode::OK, Json(state.issue(form.get("scope"))))
            } else {
                invalid("invalid_grant", "unknown refresh token")
            }
        }
        _ => invalid("unsupported_grant_type", "grant not supported"),
    }
}
