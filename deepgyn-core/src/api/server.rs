//! Request routing built on axum.

use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, Query, State,
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::classifier::ModelHandle;
use crate::config::ServiceConfig;
use crate::error::{DeepGynError, Result};
use crate::identity::{IdentityOracle, TokenIdentity, bearer_token, resolve_owner};
use crate::report::{ReportRenderer, ReportRequest};
use crate::store::{NewScan, RecordStore, SqliteRecordStore};
use crate::taxonomy::TAXONOMY_VERSION;

/// Everything a request handler may touch. Immutable after startup.
pub struct AppState {
    model: ModelHandle,
    store: Arc<dyn RecordStore>,
    renderer: ReportRenderer,
    identity: Arc<dyn IdentityOracle>,
    max_upload_bytes: usize,
    started_at: chrono::DateTime<Utc>,
}

/// Shared state handed to axum.
pub type SharedState = Arc<AppState>;

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("model", &self.model)
            .field("renderer", &self.renderer)
            .field("open_identity", &self.identity.is_open())
            .finish()
    }
}

impl AppState {
    pub fn new(
        model: ModelHandle,
        store: Arc<dyn RecordStore>,
        renderer: ReportRenderer,
        identity: Arc<dyn IdentityOracle>,
    ) -> Self {
        Self {
            model,
            store,
            renderer,
            identity,
            max_upload_bytes: crate::config::ServerConfig::default().max_upload_bytes,
            started_at: Utc::now(),
        }
    }

    /// Wire up the model, store, renderer and identity oracle from configuration.
    ///
    /// A missing or broken model does not fail startup; the store must open.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let model = ModelHandle::load(&config.model);
        let store = SqliteRecordStore::open(&config.store.path)?;
        let identity = TokenIdentity::from_config(&config.auth);
        if identity.is_open() {
            tracing::warn!("no auth tokens configured; owner fields are trusted as sent");
        }
        let mut state = Self::new(
            model,
            Arc::new(store),
            ReportRenderer::new(config.report.clone()),
            Arc::new(identity),
        );
        state.max_upload_bytes = config.server.max_upload_bytes;
        Ok(state)
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    pub fn uptime_secs(&self) -> u64 {
        let elapsed = Utc::now() - self.started_at;
        elapsed.num_seconds().max(0) as u64
    }
}

/// Run blocking work (inference, SQLite, PDF) off the async executor.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DeepGynError::Internal {
            message: format!("task join error: {e}"),
        })?
}

fn request_token(headers: &HeaderMap) -> Option<&str> {
    bearer_token(
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok()),
    )
}

/// Build the axum Router with all service routes.
pub fn router(state: SharedState) -> Router {
    let limit = state.max_upload_bytes;
    Router::new()
        .route("/predict", post(predict_handler))
        .route("/save-scan", post(save_handler))
        .route("/history", get(history_handler))
        .route("/generate-report", post(report_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn read_upload(mut multipart: Multipart) -> Result<Vec<u8>> {
    let invalid = |e: axum::extract::multipart::MultipartError| {
        DeepGynError::invalid_input(format!("malformed upload: {e}"))
    };
    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        if field.name() == Some("file") || field.file_name().is_some() {
            let bytes = field.bytes().await.map_err(invalid)?;
            return Ok(bytes.to_vec());
        }
    }
    Err(DeepGynError::invalid_input(
        "multipart body has no 'file' field",
    ))
}

/// Analyze one uploaded micrograph.
async fn predict_handler(
    State(state): State<SharedState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    // Report an unloaded model before reading the body.
    state.model.classifier()?;
    let multipart = multipart.map_err(|e| DeepGynError::invalid_input(e.body_text()))?;
    let bytes = read_upload(multipart).await?;
    tracing::debug!(bytes = bytes.len(), "analyzing upload");

    let model = state.model.clone();
    let result = blocking(move || model.analyze(&bytes)).await?;
    tracing::info!(
        label = %result.label,
        category = %result.category,
        confidence = result.confidence,
        "prediction complete"
    );
    Ok(Json(result).into_response())
}

/// Persist a scan for the authenticated owner.
async fn save_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: std::result::Result<Json<NewScan>, JsonRejection>,
) -> Result<Response> {
    let Json(mut scan) = body.map_err(|e| DeepGynError::invalid_input(e.body_text()))?;
    scan.owner = resolve_owner(
        state.identity.as_ref(),
        request_token(&headers),
        Some(&scan.owner),
    )?;
    scan.validate()?;

    let store = state.store.clone();
    let id = blocking(move || store.save(&scan)).await?;
    Ok(Json(serde_json::json!({ "status": "saved", "id": id })).into_response())
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    #[serde(alias = "email")]
    owner: Option<String>,
}

/// List the owner's scans, newest first.
async fn history_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    query: std::result::Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Response> {
    let Query(query) = query.map_err(|e| DeepGynError::invalid_input(e.body_text()))?;
    let owner = resolve_owner(
        state.identity.as_ref(),
        request_token(&headers),
        query.owner.as_deref(),
    )?;

    let store = state.store.clone();
    let history = blocking(move || store.history(&owner)).await?;
    Ok(Json(serde_json::json!({ "history": history })).into_response())
}

/// Render a PDF report.
async fn report_handler(
    State(state): State<SharedState>,
    body: std::result::Result<Json<ReportRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = body.map_err(|e| DeepGynError::invalid_input(e.body_text()))?;
    request.validate()?;

    let renderer = state.renderer.clone();
    let rendered = blocking(move || renderer.render(&request)).await?;
    let disposition = format!("attachment; filename=\"{}\"", state.renderer.filename());
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        rendered.bytes,
    )
        .into_response())
}

/// Health check endpoint.
async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let ready = state.model.is_ready();
    Json(serde_json::json!({
        "status": if ready { "ok" } else { "degraded" },
        "classifier": {
            "ready": ready,
            "reason": state.model.unavailable_reason(),
        },
        "taxonomy_version": TAXONOMY_VERSION,
        "uptime_secs": state.uptime_secs(),
    }))
}

/// Serve the API on `host:port` until Ctrl-C.
pub async fn run(state: SharedState, host: &str, port: u16) -> std::io::Result<()> {
    let app = router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await
}
