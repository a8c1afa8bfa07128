use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State, rejection::JsonRejection},
    http::{
        HeaderName, HeaderValue,
        header::{CACHE_CONTROL, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::{
    config::{CorsOrigins, ServerConfig},
    error::{EMPTY_MESSAGES, KNOWLEDGE_BASE_NOT_LOADED, ServerError},
    generation::answer_stream,
    message::ChatRequest,
    state::ServiceContext,
};

pub type AppState = Arc<ServiceContext>;

/// Characters of chunk text shown per search hit.
const SEARCH_PREVIEW_CHARS: usize = 200;

static X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/search", post(search))
}

/// All routes, served both at the root and under `/api`.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .merge(api_routes())
        .nest("/api", api_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub fn cors_layer(origins: &CorsOrigins) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match origins {
        CorsOrigins::Any => layer.allow_origin(Any),
        CorsOrigins::List(list) => {
            let parsed: Vec<HeaderValue> = list
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!(origin = %origin, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            layer.allow_origin(AllowOrigin::list(parsed))
        }
    }
}

pub async fn run_server(state: AppState, config: &ServerConfig) -> anyhow::Result<()> {
    let app = app_router(state.clone()).layer(cors_layer(&config.cors_origins));
    let addr: SocketAddr = config
        .bind_addr()
        .parse()
        .with_context(|| format!("invalid host/port '{}'", config.bind_addr()))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        address = %addr,
        model = %state.info.model,
        knowledge_base_loaded = state.retriever.is_loaded(),
        "medqa-server listening on http://{addr}"
    );
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index(State(state): State<AppState>) -> Json<Value> {
    let loaded = state.retriever.is_loaded();
    Json(json!({
        "status": "ok",
        "message": "医学知识问答系统 API",
        "version": env!("CARGO_PKG_VERSION"),
        "knowledge_base_loaded": loaded,
        "features": { "rag": loaded, "general_qa": true },
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let info = &state.info;
    let exists = tokio::fs::try_exists(&info.vector_store_path).await.unwrap_or(false);
    Json(json!({
        "status": "healthy",
        "google_ai_configured": info.google_ai_configured,
        "knowledge_base_loaded": state.retriever.is_loaded(),
        "vector_store_path": info.vector_store_path.display().to_string(),
        "vector_store_exists": exists,
        "collection": info.collection,
        "embedding": info.embedding,
        "model": info.model,
    }))
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ServerError> {
    let Json(request) = payload.map_err(|e| ServerError::Unprocessable(e.body_text()))?;
    if request.messages.is_empty() {
        return Err(ServerError::BadRequest(EMPTY_MESSAGES.to_string()));
    }
    info!(turns = request.messages.len(), "chat request");

    let events = answer_stream(state.chat_model.clone(), state.retriever.clone(), request.messages);
    let body = Body::from_stream(events.map(|event| Ok::<_, Infallible>(event.render())));

    Ok((
        [
            (CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8")),
            (CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (X_ACCEL_BUFFERING.clone(), HeaderValue::from_static("no")),
        ],
        body,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: String,
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Value>, ServerError> {
    if !state.retriever.is_loaded() {
        return Err(ServerError::Unavailable(KNOWLEDGE_BASE_NOT_LOADED.to_string()));
    }

    let hits = state.retriever.search(&params.query).await.map_err(|e| {
        error!(error = %e, "search failed");
        ServerError::Internal(e.to_string())
    })?;

    let results: Vec<Value> = hits
        .iter()
        .map(|hit| {
            let preview: String = hit.chunk.text.chars().take(SEARCH_PREVIEW_CHARS).collect();
            json!({
                "source": hit.chunk.source_filename(),
                "content": format!("{preview}..."),
                "score": hit.score,
                "metadata": hit.chunk.metadata,
            })
        })
        .collect();

    Ok(Json(json!({
        "query": params.query,
        "results_count": results.len(),
        "results": results,
    })))
}
