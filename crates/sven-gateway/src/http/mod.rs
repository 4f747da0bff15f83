// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! HTTP surface: route table, middleware stack, and server startup.
//!
//! Every route hangs off [`AppState`], a cheap-to-clone bundle of the
//! [`Orchestrator`] plus whatever the auth middleware needs. Middleware order
//! (outermost first): request-id, security headers, CSRF guard, body-size
//! limit, API-key auth.

pub mod agent;
pub mod auth;
pub mod channels_cfg;
pub mod chats;
pub mod cron;
pub mod models;
pub mod security;
pub mod tls;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tracing::info;

use crate::config::{GatewayConfig, HttpConfig};
use crate::control::service::Orchestrator;
use crate::crypto::token::StoredToken;
use crate::http::auth::{AsAuthState, AuthState};

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub auth: AuthState,
    pub started_at: Arc<Instant>,
}

impl AsAuthState for AppState {
    fn auth_state(&self) -> &AuthState {
        &self.auth
    }
}

#[derive(Clone, Default)]
struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _req: &axum::http::Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        axum::http::HeaderValue::from_str(&id)
            .ok()
            .map(RequestId::new)
    }
}

pub fn build_router(orchestrator: Arc<Orchestrator>, auth: AuthState, http: &HttpConfig) -> Router {
    let state = AppState {
        orchestrator,
        auth,
        started_at: Arc::new(Instant::now()),
    };

    let public = Router::new()
        .route("/healthz", get(healthz))
        .with_state(state.clone());

    let authenticated = Router::new()
        .route("/runtime-config", get(agent::runtime_config))
        .route("/agent/process", post(agent::process))
        .route("/agent/system-layers", get(agent::system_layers))
        .route(
            "/agent/plan/:chat_id",
            get(agent::plan_state).post(agent::plan_action),
        )
        .route("/chats", get(chats::list))
        .route("/chats/:id", get(chats::get).delete(chats::delete))
        .route("/cron/jobs", get(cron::list).post(cron::create))
        .route(
            "/cron/jobs/:job_id",
            get(cron::get).put(cron::update).delete(cron::delete),
        )
        .route("/cron/jobs/:job_id/pause", post(cron::pause))
        .route("/cron/jobs/:job_id/resume", post(cron::resume))
        .route("/cron/jobs/:job_id/run", post(cron::run_now))
        .route("/models/catalog", get(models::catalog))
        .route("/models/active", get(models::active).put(models::set_active))
        .route(
            "/models/:id/config",
            get(models::get_config).put(models::set_config),
        )
        .route("/models/:id", delete(models::delete_config))
        .route(
            "/config/channels",
            get(channels_cfg::list).put(channels_cfg::replace_all),
        )
        .route("/config/channels/types", get(channels_cfg::types))
        .route(
            "/config/channels/:name",
            get(channels_cfg::get)
                .put(channels_cfg::set)
                .delete(channels_cfg::delete),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::api_key_auth_mw::<AppState>,
        ))
        .with_state(state.clone());

    public
        .merge(authenticated)
        .layer(middleware::from_fn(security::csrf_guard))
        .layer(middleware::from_fn(security::security_headers))
        .layer(RequestBodyLimitLayer::new(http.max_body_bytes))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::new(
            axum::http::HeaderName::from_static(REQUEST_ID_HEADER),
            UuidRequestId,
        ))
}

async fn healthz(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

/// Middleware-free request-id extraction for handlers that want it in an
/// error's `details` (axum's `x-request-id` extension, set by
/// [`SetRequestIdLayer`] above).
pub fn request_id(req: &Request) -> Option<String> {
    req.headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Load or generate the API key, returning its hash for [`AuthState`].
fn load_or_generate_key(path: &std::path::Path) -> anyhow::Result<StoredToken> {
    use crate::crypto::token::StoredTokenFile;
    if path.exists() {
        Ok(StoredTokenFile::load(path)?.token_hash)
    } else {
        info!("generating new gateway API key");
        let raw = StoredTokenFile::generate_and_save(path)?;
        info!("=======================================================");
        info!("Gateway API key (shown once — save it now!):");
        info!("  {}", raw.as_str());
        info!("=======================================================");
        Ok(StoredTokenFile::load(path)?.token_hash)
    }
}

/// Start the HTTP server. Blocks until shutdown.
pub async fn serve(config: &GatewayConfig, orchestrator: Arc<Orchestrator>) -> anyhow::Result<()> {
    let token_hash = load_or_generate_key(&config.token_path())?;
    let auth = AuthState::new(token_hash, config.http.auth_max_per_minute, config.http.auth_burst);
    let app = build_router(orchestrator, auth, &config.http);
    let addr: SocketAddr = config
        .http
        .bind
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address {}: {e}", config.http.bind))?;

    if config.http.insecure_dev_mode {
        info!(%addr, tls = false, "starting HTTP gateway (insecure dev mode)");
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
    } else {
        let cert_dir = tls::default_cert_dir();
        let runtime = tls::load_or_generate(&cert_dir)?;
        info!(%addr, tls = true, fingerprint = %runtime.fingerprint_sha256, "starting HTTPS gateway");
        let tls_config =
            axum_server::tls_rustls::RustlsConfig::from_pem_file(&runtime.cert_path, &runtime.key_path)
                .await?;
        axum_server::bind_rustls(addr, tls_config)
            .serve(app.into_make_service_with_connect_info::<SocketAddr>())
            .await?;
    }

    Ok(())
}

/// Shared `AppState` construction for handler tests — not part of the public
/// API, just cuts down on per-file boilerplate for spinning up an
/// `Orchestrator` backed by a throwaway store.
#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Instant;

    use sven_channels::ChannelRegistry;
    use sven_config::{Config, ModelConfig};
    use sven_store::Store;

    use crate::control::service::Orchestrator;
    use crate::crypto::token::StoredToken;
    use crate::http::auth::AuthState;
    use crate::http::AppState;

    pub async fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::load(dir.path().join("state.json")).await.unwrap());
        let channels = Arc::new(ChannelRegistry::with_builtins());
        let config = Config {
            model: ModelConfig {
                provider: "mock".to_string(),
                name: "mock-model".to_string(),
                ..ModelConfig::default()
            },
            ..Config::default()
        };
        let orchestrator = Orchestrator::new(store, channels, Arc::new(config));
        let auth = AuthState::with_defaults(StoredToken::from_hex(&"ab".repeat(32)).unwrap());
        let state = AppState {
            orchestrator,
            auth,
            started_at: Arc::new(Instant::now()),
        };
        (state, dir)
    }
}
