//! http route handlers and router configuration

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path as FsPath, PathBuf};

use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use super::error::{Result, ServerError};
use super::store::{validate_name, ObjectStore};
use crate::archive::ArchiveReader;
use crate::error::IoResultExt;
use crate::transport::{CreateProject, PinMeta, ProjectInfo};
use crate::version::Version;

/// bytes per chunk when streaming a single archive entry
const ENTRY_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct AppState {
    pub store: ObjectStore,
}

/// build the `/api/v1` router
pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/v1/projects", get(list_projects).post(create_project))
        .route(
            "/api/v1/projects/:project",
            get(get_project).delete(delete_project),
        )
        .route(
            "/api/v1/projects/:project/pins",
            get(list_pins)
                .post(upload_pin)
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/api/v1/projects/:project/pins/:version", get(fetch_archive))
        .route(
            "/api/v1/projects/:project/pins/:version/file",
            get(fetch_file),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn list_projects(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(state.store.list_projects()?))
}

async fn create_project(State(state): State<AppState>, body: Bytes) -> Result<Response> {
    let request: CreateProject = serde_json::from_slice(&body)
        .map_err(|e| ServerError::bad_request(format!("invalid request body: {}", e)))?;

    let name = request.name.trim();
    if name.is_empty() {
        return Err(ServerError::bad_request("project name is required"));
    }

    state.store.create_project(name)?;
    Ok((StatusCode::CREATED, "Project created").into_response())
}

async fn get_project(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> Result<Json<ProjectInfo>> {
    let record = state.store.project(&project)?;
    Ok(Json(ProjectInfo {
        project: record.name,
        last_modified: record.last_modified.to_rfc3339(),
    }))
}

async fn delete_project(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> Result<&'static str> {
    state.store.delete_project(&project)?;
    Ok("Project deleted")
}

async fn list_pins(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> Result<Json<Vec<String>>> {
    let pins = state.store.list_pins(&project)?;
    Ok(Json(pins.iter().map(Version::to_string).collect()))
}

/// temp file of an upload in progress; removed on drop unless it was moved
struct PendingUpload {
    path: PathBuf,
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

async fn upload_pin(
    State(state): State<AppState>,
    Path(project): Path<String>,
    mut multipart: Multipart,
) -> Result<Response> {
    validate_name(&project)?;

    let mut meta: Option<PinMeta> = None;
    let mut pending: Option<PendingUpload> = None;

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("meta") => {
                let text = field.text().await?;
                let parsed = serde_json::from_str::<PinMeta>(&text)
                    .map_err(|e| ServerError::bad_request(format!("invalid meta field: {}", e)))?;
                meta = Some(parsed);
            }
            Some("file") => {
                let upload = PendingUpload {
                    path: state.store.upload_path()?,
                };
                let mut out = tokio::fs::File::create(&upload.path)
                    .await
                    .with_path(&upload.path)?;
                let mut received = 0u64;
                while let Some(chunk) = field.chunk().await? {
                    out.write_all(&chunk).await.with_path(&upload.path)?;
                    received += chunk.len() as u64;
                }
                out.sync_all().await.with_path(&upload.path)?;
                debug!(project = %project, bytes = received, "received upload");
                pending = Some(upload);
            }
            other => debug!(field = ?other, "ignoring multipart field"),
        }
    }

    let meta = meta.ok_or_else(|| ServerError::bad_request("missing meta field"))?;
    let version_text = meta.version.trim();
    if version_text.is_empty() {
        return Err(ServerError::bad_request("version is required"));
    }
    let version = Version::parse(version_text)?;
    let upload = pending.ok_or_else(|| ServerError::bad_request("missing file field"))?;

    state.store.commit_upload(&project, version, &upload.path)?;
    info!(project = %project, version = %version, "pin uploaded");

    Ok((StatusCode::CREATED, "Pin uploaded").into_response())
}

async fn fetch_archive(
    State(state): State<AppState>,
    Path((project, version)): Path<(String, String)>,
) -> Result<Response> {
    let version = Version::parse(&version)?;
    let path = state.store.archive_path(&project, version)?;

    let file = tokio::fs::File::open(&path).await.with_path(&path)?;
    let len = file.metadata().await.with_path(&path)?.len();

    let headers = [
        (header::CONTENT_TYPE, "application/gzip".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}.tar.gz\"", version),
        ),
        (header::CONTENT_LENGTH, len.to_string()),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

#[derive(Debug, Deserialize)]
struct FileQuery {
    file: Option<String>,
}

async fn fetch_file(
    State(state): State<AppState>,
    Path((project, version)): Path<(String, String)>,
    Query(query): Query<FileQuery>,
) -> Result<Response> {
    let name = query
        .file
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ServerError::bad_request("missing file parameter"))?;
    let version = Version::parse(&version)?;
    let path = state.store.archive_path(&project, version)?;

    let (found_tx, found_rx) = oneshot::channel();
    let (chunk_tx, chunk_rx) = mpsc::channel(16);
    let entry = name.clone();
    tokio::task::spawn_blocking(move || stream_entry(&path, &entry, found_tx, chunk_tx));

    match found_rx.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(ServerError::Internal("archive reader stopped".to_string())),
    }

    let base = FsPath::new(&name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.clone());
    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{}\"", base),
        ),
    ];
    Ok((headers, Body::from_stream(ReceiverStream::new(chunk_rx))).into_response())
}

/// scan the archive for `name`, report whether it was found, then forward its
/// bytes chunk by chunk until the receiver goes away
fn stream_entry(
    path: &FsPath,
    name: &str,
    found: oneshot::Sender<crate::Result<()>>,
    chunks: mpsc::Sender<io::Result<Bytes>>,
) {
    let file = match File::open(path).with_path(path) {
        Ok(file) => file,
        Err(e) => {
            let _ = found.send(Err(e));
            return;
        }
    };

    let mut reader = ArchiveReader::new(BufReader::new(file));
    let mut entry = match reader.find_file(name) {
        Ok(entry) => entry,
        Err(e) => {
            let _ = found.send(Err(e));
            return;
        }
    };
    if found.send(Ok(())).is_err() {
        return;
    }

    let mut buf = vec![0u8; ENTRY_CHUNK];
    loop {
        match entry.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if chunks.blocking_send(Ok(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = chunks.blocking_send(Err(e));
                break;
            }
        }
    }
}
