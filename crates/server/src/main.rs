use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use shared::{
    error::{ErrorPayload, ServiceException},
    protocol::{
        HealthResponse, HEALTH_ROUTE, IMAGE_FIELD, NO_FILE_SELECTED, NO_IMAGE_PROVIDED,
        REMOVE_BACKGROUND_ROUTE,
    },
};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;
mod remover;

use app_state::AppState;
use config::load_settings;
use remover::{BackgroundRemover, BorderFloodRemover};

type ApiResult<T> = Result<T, (StatusCode, Json<ErrorPayload>)>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings()?;
    let addr = settings.bind_addr()?;
    let state = AppState {
        remover: Arc::new(BorderFloodRemover::new(settings.remover_tolerance)),
        max_upload_bytes: settings.max_upload_bytes,
    };
    let app = build_router(Arc::new(state));

    info!(
        %addr,
        max_upload_bytes = settings.max_upload_bytes,
        tolerance = settings.remover_tolerance,
        "server listening"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(HEALTH_ROUTE, get(health))
        .route(REMOVE_BACKGROUND_ROUTE, post(remove_background))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.max_upload_bytes))
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

async fn remove_background(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    info!("received request");

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_failure)? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        // A part without a filename parameter is a plain form value, not a file.
        let Some(file_name) = field.file_name().map(|name| name.trim().to_string()) else {
            debug!("image field is not a file part; skipping");
            continue;
        };
        let bytes = field.bytes().await.map_err(multipart_failure)?;
        upload = Some((file_name, bytes));
        break;
    }

    let Some((file_name, bytes)) = upload else {
        warn!("no image field in request");
        return Err(reject(ServiceException::new(400, NO_IMAGE_PROVIDED)));
    };
    if file_name.is_empty() {
        warn!("image field without a file name");
        return Err(reject(ServiceException::new(400, NO_FILE_SELECTED)));
    }
    info!(%file_name, size = bytes.len(), "file received");

    let remover = Arc::clone(&state.remover);
    let output = tokio::task::spawn_blocking(move || remover.remove(&bytes))
        .await
        .map_err(|err| {
            error!(%err, "background removal task failed");
            reject(ServiceException::new(500, err.to_string()))
        })?
        .map_err(|err| {
            error!(%file_name, %err, "background removal failed");
            reject(ServiceException::new(500, err.to_string()))
        })?;
    info!(%file_name, size = output.len(), "background removed");

    Ok(([(header::CONTENT_TYPE, "image/png")], output))
}

fn reject(exception: ServiceException) -> (StatusCode, Json<ErrorPayload>) {
    let status =
        StatusCode::from_u16(exception.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorPayload::from(exception)))
}

fn multipart_failure(err: MultipartError) -> (StatusCode, Json<ErrorPayload>) {
    warn!(%err, "failed to read multipart body");
    reject(ServiceException::new(err.status().as_u16(), err.body_text()))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
