//! HTTP surface: upload-and-encrypt, artifact download, health and metrics.

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use filecrypt_core::{FilecryptConfig, FilecryptError};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::metrics::{healthz_handler, metrics_handler, ServerMetrics};
use crate::upload::{encrypt_file, TempUpload};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<FilecryptConfig>,
    pub metrics: ServerMetrics,
}

impl AppState {
    pub fn new(config: FilecryptConfig) -> Self {
        AppState {
            config: Arc::new(config),
            metrics: ServerMetrics::new(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptResponse {
    pub message: String,
    pub download_url: String,
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.server.max_upload_bytes();
    let mut app = Router::new()
        .route("/api/encrypt", post(encrypt_handler))
        .route("/api/downloads/{name}", get(download_handler))
        .route("/healthz", get(healthz_handler));
    if state.config.server.metrics {
        app = app.route("/metrics", get(metrics_handler));
    }
    app.layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Bind `listen` and serve until ctrl-c.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr = state.config.server.listen.clone();
    tokio::fs::create_dir_all(state.config.server.temp_dir()).await?;
    tokio::fs::create_dir_all(state.config.server.uploads_dir()).await?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("bind {addr}: {e}"))?;
    info!(addr = %addr, "listening on /api/encrypt, /api/downloads, /healthz");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .map_err(|e| anyhow::anyhow!("server: {e}"))
}

// ── POST /api/encrypt ────────────────────────────────────────────────────────

async fn encrypt_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<EncryptResponse>> {
    let mut upload: Option<TempUpload> = None;
    let mut password: Option<SecretString> = None;

    if let Err(e) = read_form(&state, &mut multipart, &mut upload, &mut password).await {
        if let Some(staged) = upload.take() {
            staged.release().await;
        }
        state.metrics.record_failure(match e {
            ApiError::Internal(_) => "server_error",
            _ => "client_error",
        });
        return Err(e);
    }

    let Some(upload) = upload else {
        state.metrics.record_failure("client_error");
        return Err(ApiError::BadRequest("no file uploaded".into()));
    };
    let password = match password {
        Some(p) if !p.expose_secret().is_empty() => p,
        _ => {
            upload.release().await;
            state.metrics.record_failure("client_error");
            return Err(ApiError::BadRequest("no password provided".into()));
        }
    };

    let artifact = format!("{}.enc", upload.name());
    let input = upload.path().to_path_buf();
    let output = state.config.server.uploads_dir().join(&artifact);
    let kdf = state.config.crypto.kdf_params();
    let options = state.config.crypto.processor_options();

    let started = Instant::now();
    let joined = tokio::task::spawn_blocking(move || {
        encrypt_file(&input, &output, &password, &kdf, options)
    })
    .await;
    upload.release().await;

    let result = joined.map_err(|e| FilecryptError::Other(anyhow::anyhow!("encryption task: {e}")));
    match result.and_then(|r| r) {
        Ok(written) => {
            state
                .metrics
                .record_success(written, started.elapsed().as_secs_f64());
            info!(artifact = %artifact, bytes = written, "upload encrypted");
            Ok(Json(EncryptResponse {
                message: "File encrypted successfully".into(),
                download_url: format!("/api/downloads/{artifact}"),
            }))
        }
        Err(e) => {
            warn!(artifact = %artifact, "encryption failed: {e}");
            let reason = if e.is_client_error() {
                "client_error"
            } else {
                "server_error"
            };
            state.metrics.record_failure(reason);
            Err(e.into())
        }
    }
}

/// Stream the multipart fields into `upload` and `password`.
///
/// A staged file is left in `upload` even on error so the caller can release it.
async fn read_form(
    state: &AppState,
    multipart: &mut Multipart,
    upload: &mut Option<TempUpload>,
    password: &mut Option<SecretString>,
) -> ApiResult<()> {
    while let Some(mut field) = multipart.next_field().await? {
        let field_name = field.name().map(str::to_owned);
        match field_name.as_deref() {
            Some("file") => {
                let original = field.file_name().unwrap_or("upload").to_string();
                let (staged, mut file) =
                    TempUpload::create(&state.config.server.temp_dir(), &original).await?;
                // A repeated file field replaces the earlier one
                if let Some(previous) = upload.replace(staged) {
                    previous.release().await;
                }
                while let Some(bytes) = field.chunk().await? {
                    TempUpload::write_chunk(&mut file, &bytes).await?;
                }
                TempUpload::finish_writes(file).await?;
            }
            Some("password") => {
                *password = Some(SecretString::from(field.text().await?));
            }
            _ => {}
        }
    }
    Ok(())
}

// ── GET /api/downloads/{name} ────────────────────────────────────────────────

async fn download_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    if !is_plain_file_name(&name) {
        return Err(ApiError::BadRequest(format!("invalid file name: {name}")));
    }

    let path = state.config.server.uploads_dir().join(&name);
    let file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound(format!("no such file: {name}")));
        }
        Err(e) => return Err(ApiError::Internal(format!("open {}: {e}", path.display()))),
    };
    let len = file
        .metadata()
        .await
        .map_err(|e| ApiError::Internal(format!("stat {}: {e}", path.display())))?
        .len();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, len)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{name}\""),
        )
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| ApiError::Internal(format!("building response: {e}")))
}

/// A single path component: no separators, not `.`/`..`, not hidden.
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\', '\0']) && !name.starts_with('.')
}
