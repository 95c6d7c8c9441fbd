// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! HTTP API
//!
//! ```text
//!  GET /api/render   heatmap PNG, or columns as JSON with Accept: application/json
//!  GET /api/query    metric names matching a glob query
//!  GET /api/nonce    per-process random token
//!  GET /api/health   liveness and dump counters
//!  GET /             index page, if configured
//! ```
//!
//! Every request passes basic auth (when configured) before the method
//! guard; anything but GET is refused.

pub mod nonce;
pub mod query;
pub mod render;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self as axum_middleware, Next},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use base64::Engine as _;
use parking_lot::RwLock;
use rothko_core::RothkoError;
use rothko_query::Dumper;
use rothko_storage::Engine;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info};

use crate::config::ApiConfig;

/// API error
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut response = (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(r#"Basic realm="rothko""#),
            );
        }
        response
    }
}

impl From<RothkoError> for ApiError {
    fn from(err: RothkoError) -> Self {
        match err {
            RothkoError::InvalidParameters(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// Basic auth credentials, kept as digests.
#[derive(Debug, Clone)]
pub struct Credentials {
    username: [u8; 32],
    password: [u8; 32],
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: Sha256::digest(username.as_bytes()).into(),
            password: Sha256::digest(password.as_bytes()).into(),
        }
    }

    /// Compare in constant time with respect to the supplied values.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let user: [u8; 32] = Sha256::digest(username.as_bytes()).into();
        let pass: [u8; 32] = Sha256::digest(password.as_bytes()).into();
        let user_ok = constant_time_eq(&user, &self.username);
        let pass_ok = constant_time_eq(&pass, &self.password);
        user_ok & pass_ok
    }

    /// Check an `Authorization: Basic ...` header value.
    fn verify_header(&self, value: &HeaderValue) -> bool {
        let Some(encoded) = value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Basic "))
        else {
            return false;
        };
        let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };
        match decoded.split_once(':') {
            Some((user, pass)) => self.verify(user, pass),
            None => false,
        }
    }
}

fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// The optional page served at `/`.
#[derive(Debug, Default)]
pub struct IndexPage {
    path: Option<PathBuf>,
    cached: RwLock<Option<String>>,
    reload: bool,
}

impl IndexPage {
    /// Read `path` once. With `reload` set every request re-reads it.
    pub fn load(path: Option<PathBuf>, reload: bool) -> Result<Self> {
        let cached = match &path {
            Some(p) => Some(
                std::fs::read_to_string(p)
                    .with_context(|| format!("reading index page {}", p.display()))?,
            ),
            None => None,
        };
        Ok(Self {
            path,
            cached: RwLock::new(cached),
            reload,
        })
    }

    fn contents(&self) -> Result<Option<String>, ApiError> {
        if let (true, Some(path)) = (self.reload, &self.path) {
            let fresh = std::fs::read_to_string(path)
                .map_err(|e| ApiError::Internal(format!("reading index page: {}", e)))?;
            *self.cached.write() = Some(fresh);
        }
        Ok(self.cached.read().clone())
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub token: CancellationToken,
    pub nonce: Arc<str>,
    pub credentials: Option<Arc<Credentials>>,
    pub index: Arc<IndexPage>,
    pub dumper: Option<Dumper>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, token: CancellationToken) -> Self {
        Self {
            engine,
            token,
            nonce: nonce::generate().into(),
            credentials: None,
            index: Arc::new(IndexPage::default()),
            dumper: None,
        }
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some(Arc::new(Credentials::new(username, password)));
        self
    }

    pub fn with_index(mut self, index: IndexPage) -> Self {
        self.index = Arc::new(index);
        self
    }

    pub fn with_dumper(mut self, dumper: Dumper) -> Self {
        self.dumper = Some(dumper);
        self
    }
}

/// Build the application router.
pub fn router(state: AppState, api: &ApiConfig) -> Result<Router> {
    let cors = cors_layer(&api.origin)?;

    Ok(Router::new()
        .route("/", get(index))
        .route("/api/render", get(render::render))
        .route("/api/query", get(query::query))
        .route("/api/nonce", get(nonce::nonce))
        .route("/api/health", get(health))
        .fallback(not_found)
        .layer(axum_middleware::from_fn(method_guard))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            basic_auth,
        ))
        .layer(axum_middleware::from_fn(log_request))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

fn cors_layer(origin: &str) -> Result<CorsLayer> {
    let allow = if origin.is_empty() || origin == "*" {
        AllowOrigin::from(Any)
    } else {
        let value = HeaderValue::from_str(origin)
            .with_context(|| format!("api.origin: invalid header value {:?}", origin))?;
        AllowOrigin::exact(value)
    };
    Ok(CorsLayer::new()
        .allow_origin(allow)
        .allow_methods([Method::GET])
        .allow_headers(Any))
}

async fn basic_auth(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(credentials) = &state.credentials {
        let ok = req
            .headers()
            .get(header::AUTHORIZATION)
            .map(|v| credentials.verify_header(v))
            .unwrap_or(false);
        if !ok {
            debug!(path = %req.uri().path(), "rejected credentials");
            return Err(ApiError::Unauthorized);
        }
    }
    Ok(next.run(req).await)
}

async fn method_guard(req: Request, next: Next) -> Result<Response, ApiError> {
    if req.method() != Method::GET {
        return Err(ApiError::MethodNotAllowed(req.method().to_string()));
    }
    Ok(next.run(req).await)
}

async fn log_request(req: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = next.run(req).await;

    if path != "/api/nonce" {
        info!(
            status = response.status().as_u16(),
            method = %method,
            path = %path,
            duration_ms = started.elapsed().as_millis() as u64,
            "http request"
        );
    }
    response
}

async fn index(State(state): State<AppState>) -> Result<Response, ApiError> {
    match state.index.contents()? {
        Some(page) => Ok(Html(page).into_response()),
        None => Err(ApiError::NotFound("path: \"/\"".to_string())),
    }
}

async fn not_found(req: Request<Body>) -> ApiError {
    ApiError::NotFound(format!("path: {:?}", req.uri().path()))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub dumps: Option<rothko_query::DumpReport>,
}

/// GET /api/health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.token.is_cancelled() {
        "stopping"
    } else {
        "ok"
    };
    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        dumps: state.dumper.as_ref().map(Dumper::stats),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials() {
        let creds = Credentials::new("admin", "hunter2");
        assert!(creds.verify("admin", "hunter2"));
        assert!(!creds.verify("admin", "hunter3"));
        assert!(!creds.verify("root", "hunter2"));
        assert!(!creds.verify("", ""));
    }

    #[test]
    fn test_credentials_header() {
        let creds = Credentials::new("admin", "pa:ss");
        let encoded = base64::engine::general_purpose::STANDARD.encode("admin:pa:ss");
        let good = HeaderValue::from_str(&format!("Basic {}", encoded)).unwrap();
        assert!(creds.verify_header(&good));

        for bad in ["Bearer abc", "Basic !!!", "Basic YWRtaW4="] {
            assert!(!creds.verify_header(&HeaderValue::from_static(bad)), "{}", bad);
        }
    }

    #[test]
    fn test_error_status() {
        let resp = ApiError::Unauthorized.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            resp.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            r#"Basic realm="rothko""#
        );

        let resp = ApiError::from(RothkoError::InvalidParameters("x".into())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let resp = ApiError::from(RothkoError::UnsupportedMerge("random2".into())).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_cors_origin() {
        assert!(cors_layer("*").is_ok());
        assert!(cors_layer("https://example.com").is_ok());
        assert!(cors_layer("bad\nvalue").is_err());
    }
}
