//! HTTP gateway for NeonChat.
//!
//! Exposes the completion pipeline over HTTP:
//!
//! - `GET  /health`
//! - `POST /v1/chat`, the streaming chat turn (`text/event-stream`)
//! - `POST /v1/tools/execute`
//! - `POST /v1/memory/extract`, `GET /v1/memory`
//! - `GET|PUT /v1/settings`, `GET|POST /v1/modes`
//!
//! Built on Axum. Callers identify themselves with `Authorization: Bearer
//! <token>`; tokens map to user ids in the config. Requests without a known
//! token run anonymously.

pub mod api_v1;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::middleware::{self, Next};
use axum::response::{Json, Response};
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use neonchat_agent::{
    CompletionOrchestrator, ContentBuilder, ContextAssembler, DetachedTasks, HttpImageFetcher, MemoryExtractor,
    OrchestratorConfig,
};
use neonchat_config::AppConfig;
use neonchat_core::memory::MemoryStore;
use neonchat_core::provider::Provider;
use neonchat_core::settings::SettingsStore;
use neonchat_memory::{InMemoryMemoryStore, InMemorySemanticIndex, InMemorySettingsStore};
use neonchat_tools::ToolExecutor;

/// Request bodies may carry inline images.
const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// Queue depth of the detached task worker.
const DETACHED_QUEUE: usize = 1024;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub orchestrator: Arc<CompletionOrchestrator>,
    pub extractor: Arc<MemoryExtractor>,
    pub memory: Arc<dyn MemoryStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub tasks: DetachedTasks,
    /// Bearer token → user id.
    pub tokens: HashMap<String, String>,
}

pub type SharedState = Arc<GatewayState>;

/// The authenticated caller of a request.
#[derive(Debug, Clone, Default)]
pub struct Caller {
    pub user_id: Option<String>,
}

impl GatewayState {
    /// Wire every subsystem from `config` around `provider`.
    ///
    /// Must be called inside a tokio runtime (the detached task worker is
    /// spawned here).
    pub fn build(config: &AppConfig, provider: Arc<dyn Provider>) -> SharedState {
        let memory: Arc<dyn MemoryStore> = Arc::new(InMemoryMemoryStore::new(config.memory.max_per_user));
        let settings: Arc<dyn SettingsStore> = Arc::new(InMemorySettingsStore::new());
        let recall = Arc::new(
            InMemorySemanticIndex::new(
                provider.clone(),
                &config.provider.embedding_model,
                config.memory.similarity_threshold,
            )
            .with_memory_store(memory.clone()),
        );

        let executor = Arc::new(ToolExecutor::new(neonchat_tools::default_registry(
            provider.clone(),
            &config.provider.search_model,
        )));
        let assembler = ContextAssembler::new(settings.clone(), memory.clone(), recall.clone(), config.context.clone());
        let content = ContentBuilder::new(Arc::new(HttpImageFetcher::new(Duration::from_secs(
            config.provider.timeout_secs,
        ))));
        let tasks = DetachedTasks::spawn(DETACHED_QUEUE);

        let orchestrator = CompletionOrchestrator::new(
            provider.clone(),
            assembler,
            content,
            executor,
            tasks.clone(),
            OrchestratorConfig::from_app_config(config),
        )
        .with_recall_indexing(recall);

        let extractor = MemoryExtractor::new(
            provider,
            memory.clone(),
            &config.provider.extraction_model,
            config.memory.extraction_window,
        );

        Arc::new(Self {
            orchestrator: Arc::new(orchestrator),
            extractor: Arc::new(extractor),
            memory,
            settings,
            tasks,
            tokens: config.gateway.tokens.clone(),
        })
    }

    /// Resolve the user behind an `Authorization` header value.
    pub fn caller_for(&self, authorization: Option<&str>) -> Caller {
        let user_id = authorization
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .and_then(|token| self.tokens.get(token))
            .cloned();
        Caller { user_id }
    }
}

/// Build the full router: health, the v1 API and the HTTP layers.
pub fn build_router(state: SharedState) -> Router {
    let v1 = api_v1::v1_router(state.clone()).layer(middleware::from_fn_with_state(state, identify_caller));

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::header::AUTHORIZATION])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", v1)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    if !config.has_api_key() {
        warn!("No provider API key configured; chat requests will fail until one is set");
    }
    let provider: Arc<dyn Provider> = Arc::new(neonchat_providers::OpenAiCompatProvider::from_config(&config.provider));
    let state = GatewayState::build(&config, provider);
    let tasks = state.tasks.clone();

    let app = build_router(state);

    info!(addr = %addr, model = %config.provider.model, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!(pending = tasks.pending(), "Draining detached tasks");
    let _ = tokio::time::timeout(Duration::from_secs(10), tasks.wait_idle()).await;
    Ok(())
}

/// Attach the [`Caller`] to every v1 request.
async fn identify_caller(State(state): State<SharedState>, mut req: Request, next: Next) -> Response {
    let caller = state.caller_for(
        req.headers()
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok()),
    );
    if caller.user_id.is_none() && req.headers().contains_key(axum::http::header::AUTHORIZATION) {
        debug!("Unknown bearer token, continuing anonymously");
    }
    req.extensions_mut().insert(caller);
    next.run(req).await
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
