//! HTTP surface for the document service.
//!
//! - `POST /upload/` – multipart field `file`; stage, copy, parse, chunk, embed, and store it.
//! - `GET /ask/?question=..&file=..` – answer a question, optionally scoped to one file.
//! - `GET /api/files/` – distinct names of every ingested file.
//! - `GET /api/delete/?filename=..` – remove a file's chunks and stored copies.
//! - `GET /metrics/` – activity counters since startup.
//! - `GET /` and `GET /chat/` – embedded upload and chat pages.

use crate::embedding::EmbeddingClientError;
use crate::generation::GenerationError;
use crate::processing::{DocumentApi, LoaderError, ProcessingError};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Query, State, multipart::MultipartRejection},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Largest request body accepted by the upload endpoint.
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

const HOME_PAGE: &str = include_str!("../assets/home.html");
const CHAT_PAGE: &str = include_str!("../assets/chat.html");

/// Build the HTTP router exposing the document API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: DocumentApi + 'static,
{
    Router::new()
        .route("/", get(home_page))
        .route("/chat/", get(chat_page))
        .route("/upload/", post(upload_document::<S>))
        .route("/ask/", get(ask_question::<S>))
        .route("/api/files/", get(list_files::<S>))
        .route("/api/delete/", get(delete_file::<S>))
        .route("/metrics/", get(get_metrics::<S>))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(service)
}

async fn home_page() -> Html<&'static str> {
    Html(HOME_PAGE)
}

async fn chat_page() -> Html<&'static str> {
    Html(CHAT_PAGE)
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
}

/// Ingest the multipart field named `file`.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError>
where
    S: DocumentApi,
{
    let no_file = || {
        (
            StatusCode::BAD_REQUEST,
            Json(StatusResponse {
                status: "No file uploaded.",
            }),
        )
            .into_response()
    };
    let Ok(mut multipart) = multipart else {
        return Ok(no_file());
    };

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Ok(no_file()),
            Err(error) => return Ok(error.into_response()),
        };
        if field.name() != Some("file") {
            continue;
        }
        let Some(file_name) = field
            .file_name()
            .map(str::to_string)
            .filter(|name| !name.is_empty())
        else {
            return Ok(no_file());
        };
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(error) => return Ok(error.into_response()),
        };

        let outcome = service.ingest_upload(&file_name, bytes.to_vec()).await?;
        tracing::info!(
            document = %outcome.document,
            chunks = outcome.chunk_count,
            "Upload request completed"
        );
        return Ok(Json(StatusResponse {
            status: "File processed!",
        })
        .into_response());
    }
}

#[derive(Deserialize)]
struct AskQuery {
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    file: Option<String>,
}

#[derive(Serialize)]
struct AnswerResponse {
    answer: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
}

async fn ask_question<S>(
    State(service): State<Arc<S>>,
    Query(query): Query<AskQuery>,
) -> Result<Response, AppError>
where
    S: DocumentApi,
{
    let Some(question) = query.question.filter(|value| !value.trim().is_empty()) else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "No question provided.",
            }),
        )
            .into_response());
    };

    let answer = service.ask(&question, query.file.as_deref()).await?;
    Ok(Json(AnswerResponse { answer }).into_response())
}

#[derive(Serialize)]
struct FilesResponse {
    files: Vec<String>,
}

async fn list_files<S>(State(service): State<Arc<S>>) -> Result<Json<FilesResponse>, AppError>
where
    S: DocumentApi,
{
    let files = service.list_documents().await?;
    Ok(Json(FilesResponse { files }))
}

#[derive(Deserialize)]
struct DeleteQuery {
    #[serde(default)]
    filename: Option<String>,
}

#[derive(Serialize)]
struct DeleteResponse {
    success: bool,
}

async fn delete_file<S>(
    State(service): State<Arc<S>>,
    Query(query): Query<DeleteQuery>,
) -> Result<Response, AppError>
where
    S: DocumentApi,
{
    let Some(filename) = query.filename.filter(|value| !value.trim().is_empty()) else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(DeleteResponse { success: false }),
        )
            .into_response());
    };

    let success = service.delete_document(&filename).await?;
    Ok(Json(DeleteResponse { success }).into_response())
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Response
where
    S: DocumentApi,
{
    Json(service.metrics_snapshot()).into_response()
}

struct AppError(ProcessingError);

impl AppError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            ProcessingError::MissingInput(_) => StatusCode::BAD_REQUEST,
            ProcessingError::Load(LoaderError::UnsupportedFormat { .. }) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            ProcessingError::Generation(GenerationError::Unavailable(_))
            | ProcessingError::Embedding(EmbeddingClientError::ProviderUnavailable(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, status = status.as_u16(), "Request failed");
        } else {
            tracing::debug!(error = %self.0, status = status.as_u16(), "Request rejected");
        }
        (status, self.0.to_string()).into_response()
    }
}

impl From<ProcessingError> for AppError {
    fn from(inner: ProcessingError) -> Self {
        Self(inner)
    }
}
