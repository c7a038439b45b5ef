use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{ErrorKind, RagError};
use crate::models::{
    AllNotesRequest, ChatRequest, Chunk, EmbeddingRequest, Metadata, NotesRequest, SearchQuery, StatsQuery,
    TranscriptIngestRequest,
};
use crate::rag::result::{assemble, InStage, PipelineResult, Stage};
use crate::rag::RagService;

pub type AppState = Arc<RagService>;

pub fn router(service: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/embedding/create", post(create_embeddings_handler))
        .route("/api/embedding/search", get(search_handler))
        .route("/api/embedding/stats", get(stats_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/rag/generate_notes", post(generate_notes_handler))
        .route("/api/rag/generate_all_notes", post(generate_all_notes_handler))
        .route("/api/ingest/transcript", post(ingest_transcript_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(service)
}

pub fn status_for(kind: ErrorKind, retryable: bool) -> StatusCode {
    match kind {
        ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
        ErrorKind::NotFoundError | ErrorKind::EmptyResultError => StatusCode::NOT_FOUND,
        ErrorKind::UpstreamError if retryable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::UpstreamError => StatusCode::BAD_GATEWAY,
        ErrorKind::DetectionError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn result_status<T>(result: &PipelineResult<T>) -> StatusCode {
    match result.failure() {
        None => StatusCode::OK,
        Some(f) => status_for(f.error_kind, f.retryable),
    }
}

fn respond<T: Serialize>(result: PipelineResult<T>) -> Response {
    (result_status(&result), Json(result)).into_response()
}

/// Malformed request bodies and query strings still get the result envelope.
fn rejected(message: String) -> Response {
    let result: PipelineResult<Metadata> =
        assemble("decode_request", Err(RagError::validation(message)).in_stage(Stage::Validating));
    respond(result)
}

async fn health_check(State(service): State<AppState>) -> Json<serde_json::Value> {
    let generator_healthy = service.generator_healthy().await;

    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "embedding_model": service.embedding_model(),
        "generation_model": service.generation_model(),
        "services": {
            "generator": generator_healthy
        }
    }))
}

async fn create_embeddings_handler(
    State(service): State<AppState>,
    payload: Result<Json<EmbeddingRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(e) => return rejected(e.body_text()),
    };
    let chunks: Vec<Chunk> = request.chunks.into_iter().map(Chunk::from_json).collect();
    respond(service.create_embeddings(request.course_id, chunks).await)
}

async fn search_handler(
    State(service): State<AppState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(e) => return rejected(e.body_text()),
    };
    respond(
        service
            .search(query.course_id, &query.query, query.n_results, query.language_filter.as_deref())
            .await,
    )
}

async fn stats_handler(
    State(service): State<AppState>,
    query: Result<Query<StatsQuery>, QueryRejection>,
) -> Response {
    match query {
        Ok(Query(q)) => respond(service.collection_stats(q.course_id).await),
        Err(e) => rejected(e.body_text()),
    }
}

async fn chat_handler(
    State(service): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(e) => return rejected(e.body_text()),
    };
    respond(
        service
            .chat(request.course_id, &request.question, request.language.as_deref())
            .await,
    )
}

async fn generate_notes_handler(
    State(service): State<AppState>,
    payload: Result<Json<NotesRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(e) => return rejected(e.body_text()),
    };
    respond(
        service
            .generate_notes(request.course_id, &request.language, request.include_sources)
            .await,
    )
}

async fn generate_all_notes_handler(
    State(service): State<AppState>,
    payload: Result<Json<AllNotesRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(e) => return rejected(e.body_text()),
    };
    let results = service.generate_all_notes(request.course_id, request.include_sources).await;

    // 200 when at least one language succeeded, otherwise the first failure decides.
    let status = if results.iter().any(PipelineResult::is_success) {
        StatusCode::OK
    } else {
        results.first().map(result_status).unwrap_or(StatusCode::OK)
    };

    let mut notes = serde_json::Map::new();
    for (language, result) in crate::rag::language::Language::ALL.iter().zip(&results) {
        match serde_json::to_value(result) {
            Ok(value) => {
                notes.insert(language.code().to_string(), value);
            }
            Err(e) => tracing::error!("Failed to serialize {} notes: {}", language, e),
        }
    }

    let body = serde_json::json!({
        "success": status == StatusCode::OK,
        "course_id": request.course_id,
        "notes": notes,
    });
    (status, Json(body)).into_response()
}

async fn ingest_transcript_handler(
    State(service): State<AppState>,
    payload: Result<Json<TranscriptIngestRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(e) => return rejected(e.body_text()),
    };
    respond(service.ingest_transcript(request.course_id, &request.transcript).await)
}
