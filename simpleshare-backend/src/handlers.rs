use axum::{
    body::Body,
    extract::{
        multipart::{Field, MultipartError},
        ConnectInfo, Multipart, Path, State,
    },
    http::{header, Response, StatusCode},
    response::{IntoResponse, Json, Redirect},
};
use futures::TryStreamExt;
use simpleshare_types::{DeleteResponse, FileSummary, StatsResponse};
use std::net::SocketAddr;
use tokio_util::io::{ReaderStream, StreamReader};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    lifecycle::StagedFile,
    AppState,
};

const TOO_LARGE_MESSAGE: &str = "File too large! Maximum file size is 1GB.";

/// Upper bound for the text fields of the upload form
const MAX_TEXT_FIELD_BYTES: usize = 64 * 1024;

// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "simpleshare-backend",
        "timestamp": chrono::Utc::now()
    }))
}

#[derive(Default)]
struct UploadForm {
    staged: Option<StagedFile>,
    description: Option<String>,
    uploader: Option<String>,
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::BadRequest(format!("Invalid multipart data: {}", e))
    }
}

/// Parse an id from the URL. Anything that is not a valid id cannot name a file.
fn parse_file_id(file_id: &str) -> Result<Uuid> {
    Uuid::parse_str(file_id).map_err(|_| AppError::FileNotFound)
}

// File upload endpoint - streams the `file` field to disk, then records it
pub async fn upload_file(State(state): State<AppState>, mut multipart: Multipart) -> Response<Body> {
    let mut form = UploadForm::default();

    if let Err(e) = read_upload_form(&state, &mut multipart, &mut form).await {
        if let Some(staged) = form.staged.take() {
            state.manager.discard(staged).await;
        }
        return upload_error(e);
    }

    let Some(staged) = form.staged else {
        tracing::warn!("Upload without a file, ignoring");
        return Redirect::to("/").into_response();
    };

    match state
        .manager
        .commit(
            staged,
            form.description.as_deref(),
            form.uploader.as_deref(),
        )
        .await
    {
        Ok(_) => Redirect::to("/").into_response(),
        Err(e) => upload_error(e),
    }
}

async fn read_upload_form(
    state: &AppState,
    multipart: &mut Multipart,
    form: &mut UploadForm,
) -> Result<()> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                if form.staged.is_some() {
                    tracing::warn!("Skipping additional file field, only one file per upload");
                    continue;
                }

                let filename = field.file_name().unwrap_or("").to_string();
                if filename.is_empty() {
                    tracing::warn!("Skipping file field without a filename");
                    continue;
                }

                let reader = StreamReader::new(
                    field.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
                );
                tokio::pin!(reader);

                form.staged = Some(state.manager.stage(&filename, reader).await?);
            }
            "description" => {
                form.description = Some(read_text_field(field, "description").await?);
            }
            "uploader" => {
                form.uploader = Some(read_text_field(field, "uploader").await?);
            }
            _ => {
                // The rest of the field is skipped by the next `next_field`
                tracing::debug!("Ignoring unknown form field {:?}", name);
            }
        }
    }

    Ok(())
}

/// Read a text field chunk by chunk, giving up past `MAX_TEXT_FIELD_BYTES`
async fn read_text_field(mut field: Field<'_>, name: &str) -> Result<String> {
    let mut buffer = Vec::new();

    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if buffer.len() + chunk.len() > MAX_TEXT_FIELD_BYTES {
            return Err(AppError::BadRequest(format!(
                "Field {} exceeds {} bytes",
                name, MAX_TEXT_FIELD_BYTES
            )));
        }
        buffer.extend_from_slice(&chunk);
    }

    String::from_utf8(buffer)
        .map_err(|_| AppError::BadRequest(format!("Field {} is not valid UTF-8", name)))
}

fn upload_error(e: AppError) -> Response<Body> {
    match e {
        AppError::PayloadTooLarge => {
            (StatusCode::PAYLOAD_TOO_LARGE, TOO_LARGE_MESSAGE).into_response()
        }
        e => {
            let status = e.status_code();
            if status.is_server_error() {
                tracing::error!("Upload failed: {}", e);
            } else {
                tracing::warn!("Upload rejected: {}", e);
            }
            (status, format!("Upload error: {}", e.public_message())).into_response()
        }
    }
}

// Download endpoint - streams the file as an attachment
pub async fn download_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> Response<Body> {
    let caller = connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    match stream_download(&state, &file_id, &caller).await {
        Ok(response) => response,
        Err(AppError::FileNotFound) => (StatusCode::NOT_FOUND, "File not found!").into_response(),
        Err(e) => {
            tracing::error!("Download of {} failed: {}", file_id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error!").into_response()
        }
    }
}

async fn stream_download(state: &AppState, file_id: &str, caller: &str) -> Result<Response<Body>> {
    let file_id = parse_file_id(file_id)?;
    let retrieved = state.manager.retrieve(file_id, caller).await?;
    let record = retrieved.record;
    let content_length = retrieved.content.metadata().await?.len();

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            record
                .mime_type
                .as_deref()
                .unwrap_or("application/octet-stream"),
        )
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(&record.original_name),
        )
        .header(header::CONTENT_LENGTH, content_length.to_string())
        .header("X-File-ID", record.id.to_string())
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .body(Body::from_stream(ReaderStream::new(retrieved.content)))
        .map_err(|e| AppError::ServerError(format!("Failed to build download response: {}", e)))
}

/// `Content-Disposition` value suggesting `filename` as the download name.
/// Non-ASCII names also get an RFC 5987 `filename*` parameter.
fn content_disposition(filename: &str) -> String {
    let cleaned: String = filename.chars().filter(|c| !c.is_control()).collect();

    let fallback: String = cleaned
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if !c.is_ascii() => '_',
            c => c,
        })
        .collect();

    if cleaned.is_ascii() {
        return format!("attachment; filename=\"{}\"", fallback);
    }

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(&cleaned)
    )
}

// Delete endpoint - accepts POST and DELETE
pub async fn delete_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> (StatusCode, Json<DeleteResponse>) {
    let result = match parse_file_id(&file_id) {
        Ok(file_id) => state.manager.remove(file_id).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => (StatusCode::OK, Json(DeleteResponse::ok())),
        Err(AppError::FileNotFound) => (
            StatusCode::NOT_FOUND,
            Json(DeleteResponse::failed("File not found")),
        ),
        Err(e) => {
            tracing::error!("Delete of {} failed: {}", file_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(DeleteResponse::failed(format!(
                    "Delete error: {}",
                    e.public_message()
                ))),
            )
        }
    }
}

pub async fn list_files(State(state): State<AppState>) -> (StatusCode, Json<Vec<FileSummary>>) {
    match state.manager.list_all().await {
        Ok(files) => (StatusCode::OK, Json(files)),
        Err(e) => {
            tracing::error!("Failed to list files: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(Vec::new()))
        }
    }
}

pub async fn get_stats(State(state): State<AppState>) -> (StatusCode, Json<StatsResponse>) {
    match state.manager.stats().await {
        Ok(stats) => (StatusCode::OK, Json(stats)),
        Err(e) => {
            tracing::error!("Failed to compute stats: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StatsResponse::default()),
            )
        }
    }
}

// Cleanup endpoint - runs the expiry sweep synchronously
pub async fn cleanup_expired_files(State(state): State<AppState>) -> Result<String> {
    tracing::info!("🧹 Starting cleanup of expired files");

    let cleaned_count = state
        .manager
        .expire_older_than(state.config.retention())
        .await?;

    tracing::info!("✅ Cleaned up {} expired files", cleaned_count);

    Ok(format!(
        "Cleanup completed! Removed {} expired file(s).",
        cleaned_count
    ))
}
