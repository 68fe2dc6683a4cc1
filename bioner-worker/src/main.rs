//! Worker HTTP do anotador: recebe requisições JSON e processa uma por vez.
//!
//! ## Rotas
//!
//! - `GET /health`
//! - `POST /annotations`: [`AnnotationRequest`] → [`AnnotationResponse`]
//! - `POST /annotations/enrichment`: [`EnrichmentRequest`] → [`EnrichmentResponse`]
//!
//! ## Ambiente
//!
//! | Variável                | Uso                                  |
//! |-------------------------|--------------------------------------|
//! | `BIONER_DICTIONARY_DIR` | diretório dos `*.jsonl` (obrigatória) |
//! | `BIONER_CONFIG`         | YAML do [`AnnotatorConfig`]          |
//! | `BIONER_DOCUMENT_DIR`   | documentos referenciados por `file_id` |
//! | `BIONER_ADDR`           | endereço de escuta (`0.0.0.0:3000`)  |
//! | `RUST_LOG`              | filtro de log (`info`)               |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use bioner_core::{
    AnnotationRequest, AnnotationResponse, AnnotatorConfig, EnrichmentRequest, EnrichmentResponse,
    Error, MemoryDictionary, Pipeline, PlainTextParser,
};
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

type WorkerPipeline = Pipeline<MemoryDictionary, PlainTextParser>;

/// Estado compartilhado da aplicação
struct AppState {
    pipeline: WorkerPipeline,
    /// Uma anotação por vez (prefetch = 1).
    permits: Semaphore,
}

impl AppState {
    fn new(pipeline: WorkerPipeline) -> Self {
        Self {
            pipeline,
            permits: Semaphore::new(1),
        }
    }
}

/// Configuração lida do ambiente.
#[derive(Debug, Clone)]
struct Settings {
    config_path: Option<PathBuf>,
    dictionary_dir: PathBuf,
    document_dir: Option<PathBuf>,
    addr: String,
}

impl Settings {
    fn from_env() -> anyhow::Result<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Ok(Self {
            config_path: var("BIONER_CONFIG").map(PathBuf::from),
            dictionary_dir: var("BIONER_DICTIONARY_DIR")
                .map(PathBuf::from)
                .context("BIONER_DICTIONARY_DIR não definida")?,
            document_dir: var("BIONER_DOCUMENT_DIR").map(PathBuf::from),
            addr: var("BIONER_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
        })
    }
}

fn build_pipeline(settings: &Settings) -> anyhow::Result<WorkerPipeline> {
    let config = match &settings.config_path {
        Some(path) => AnnotatorConfig::load_from_file(path)
            .with_context(|| format!("configuração inválida em {}", path.display()))?,
        None => AnnotatorConfig::new(),
    };
    let dictionary = MemoryDictionary::open_dir(&settings.dictionary_dir)
        .with_context(|| format!("dicionários em {}", settings.dictionary_dir.display()))?;
    let parser = match &settings.document_dir {
        Some(dir) => PlainTextParser::with_document_dir(dir),
        None => PlainTextParser::new(),
    };
    Ok(Pipeline::new(dictionary, parser, config))
}

fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/annotations", post(annotate_handler))
        .route("/annotations/enrichment", post(enrichment_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env()?;
    let state = Arc::new(AppState::new(build_pipeline(&settings)?));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&settings.addr)
        .await
        .with_context(|| format!("não foi possível escutar em {}", settings.addr))?;
    info!("🚀 Worker de anotação iniciado em http://{}", settings.addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Erro devolvido como `{ "error": ..., "retryable": ... }`.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            e if e.is_domain() => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = ?self.0, "falha inesperada na requisição");
        } else {
            warn!(status = status.as_u16(), error = %self.0, "requisição rejeitada");
        }
        let body = serde_json::json!({
            "error": self.0.to_string(),
            "retryable": self.0.is_retryable(),
        });
        (status, Json(body)).into_response()
    }
}

/// JSON malformado é 400, nunca repetível.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    Ok(serde_json::from_slice(body).map_err(Error::from)?)
}

/// Roda `job` no pool bloqueante, segurando a única permissão do worker.
async fn run_exclusive<T, F>(state: Arc<AppState>, job: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&WorkerPipeline) -> bioner_core::Result<T> + Send + 'static,
{
    let _permit = state
        .permits
        .acquire()
        .await
        .map_err(|e| Error::unexpected(e.to_string()))?;
    let worker_state = Arc::clone(&state);
    let result = tokio::task::spawn_blocking(move || job(&worker_state.pipeline))
        .await
        .map_err(|e| Error::unexpected(format!("tarefa de anotação abortada: {e}")))?;
    Ok(result?)
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

async fn annotate_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<AnnotationResponse>, ApiError> {
    let request: AnnotationRequest = parse_body(&body)?;
    info!(document = request.document_label(), "requisição de anotação recebida");
    let response = run_exclusive(state, move |pipeline| pipeline.annotate(&request)).await?;
    Ok(Json(response))
}

async fn enrichment_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<EnrichmentResponse>, ApiError> {
    let request: EnrichmentRequest = parse_body(&body)?;
    info!(rows = request.table.result.genes.len(), "requisição de enriquecimento recebida");
    let response = run_exclusive(state, move |pipeline| pipeline.annotate_enrichment(request)).await?;
    Ok(Json(response))
}
