use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, Query, State,
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;

use crate::config::ServerConfig;
use crate::dataset;
use crate::error::{DatasetError, UploadError};
use crate::filter::{self, Decimation, FilterRequest, parse_timestamp};
use crate::model::{DeviceDescriptor, DeviceTag, LocationRecord};
use crate::upload::UploadStore;

const RECORDS_FIELD: &str = "records_file";
const SETTINGS_FIELD: &str = "settings_file";

pub struct AppState {
    pub config: ServerConfig,
    pub uploads: UploadStore,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let uploads = UploadStore::new(config.upload_dir.clone());
        AppState { config, uploads }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilterParams {
    #[serde(default)]
    start_date: Value,
    #[serde(default)]
    end_date: Value,
    #[serde(default, rename = "file_path")]
    file_path: Option<String>,
    #[serde(default)]
    selected_devices: Option<Vec<DeviceTag>>,
}

#[derive(Deserialize)]
struct DevicesQuery {
    file_path: Option<String>,
}

#[derive(Serialize)]
struct DevicesResponse {
    devices: Vec<DeviceDescriptor>,
}

#[derive(Serialize)]
struct UploadResponse {
    status: &'static str,
    records_file_path: PathBuf,
    settings_file_path: PathBuf,
    message: &'static str,
}

/// Errors returned by the HTTP handlers
#[derive(Debug)]
pub enum ApiError {
    Dataset(DatasetError),
    Upload(UploadError),
    /// The request could not be extracted (bad JSON, wrong content type, ...)
    Rejected(StatusCode, String),
    Internal(String),
}

impl From<DatasetError> for ApiError {
    fn from(err: DatasetError) -> Self {
        ApiError::Dataset(err)
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        ApiError::Upload(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Rejected(rejection.status(), rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::Rejected(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Dataset(err) => {
                let status = if err.is_client_error() {
                    StatusCode::BAD_REQUEST
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                let body = match &err {
                    DatasetError::DataUnavailable { path, .. } => serde_json::json!({
                        "error": err.to_string(),
                        "path": path,
                    }),
                    _ => serde_json::json!({ "error": err.to_string() }),
                };
                (status, body)
            }
            ApiError::Upload(err) => {
                let status = match err {
                    UploadError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
                    _ => StatusCode::BAD_REQUEST,
                };
                (status, serde_json::json!({ "error": err.to_string() }))
            }
            ApiError::Rejected(status, msg) => (status, serde_json::json!({ "error": msg })),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": msg }),
            ),
        };

        if status.is_server_error() {
            log::error!("request failed: {}", body["error"]);
        } else {
            log::warn!("request rejected: {}", body["error"]);
        }

        (status, Json(body)).into_response()
    }
}

/// Build the router with all routes and middleware
///
/// Kept separate from [`run`] so tests can drive it without binding a socket.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(parse_origins(&state.config.allowed_origins)))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/upload", post(upload_files))
        .route("/filter-data", post(filter_data))
        .route("/devices", get(list_devices));

    if let Some(static_dir) = &state.config.static_dir {
        app = app.fallback_service(ServeDir::new(static_dir));
    }

    app.layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(cors)
        .with_state(state)
}

fn parse_origins(origins: &[String]) -> Vec<HeaderValue> {
    origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("Invalid CORS origin '{}': {}", origin, e);
                None
            }
        })
        .collect()
}

/// Start the web server and the upload sweeper, then serve until the process exits
pub async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::new(config));
    state.uploads.ensure_dir().await?;

    let sweeper = state
        .uploads
        .clone()
        .spawn_sweeper(state.config.sweep_interval, state.config.retention);

    let address = state.config.bind_address();
    let app = build_router(state);

    let listener = TcpListener::bind(&address).await?;
    log::info!("Listening on http://{}", address);
    let served = axum::serve(listener, app).await;

    sweeper.abort();
    served?;
    Ok(())
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn upload_files(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut multipart = multipart?;
    let mut records = None;
    let mut settings = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| UploadError::Multipart(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name != RECORDS_FIELD && name != SETTINGS_FIELD {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| UploadError::Multipart(e.body_text()))?;

        if name == RECORDS_FIELD {
            records = Some((file_name, bytes));
        } else {
            settings = Some((file_name, bytes));
        }
    }

    let (records_name, records_bytes) = records.ok_or(UploadError::MissingPart(RECORDS_FIELD))?;
    let (settings_name, settings_bytes) =
        settings.ok_or(UploadError::MissingPart(SETTINGS_FIELD))?;

    let (records_file_path, settings_file_path) = state
        .uploads
        .store_pair(
            (records_name.as_str(), &records_bytes[..]),
            (settings_name.as_str(), &settings_bytes[..]),
        )
        .await?;
    log::info!(
        "uploaded {} ({} bytes) and {} ({} bytes)",
        records_file_path.display(),
        records_bytes.len(),
        settings_file_path.display(),
        settings_bytes.len()
    );

    Ok(Json(UploadResponse {
        status: "OK",
        records_file_path,
        settings_file_path,
        message: "Files uploaded successfully!",
    }))
}

async fn filter_data(
    State(state): State<Arc<AppState>>,
    params: Result<Json<FilterParams>, JsonRejection>,
) -> Result<Json<Vec<LocationRecord>>, ApiError> {
    let Json(params) = params?;
    let file_path = required_path(params.file_path)?;
    let dataset = dataset::load_dataset(&file_path).await?;

    // An unusable bound matches nothing, the same way an unusable record time does
    let (Some(start), Some(end)) = (
        parse_timestamp(&params.start_date),
        parse_timestamp(&params.end_date),
    ) else {
        log::warn!(
            "filter on {}: unusable date range {} .. {}",
            file_path,
            params.start_date,
            params.end_date
        );
        return Ok(Json(Vec::new()));
    };

    let request =
        FilterRequest::new(start, end).with_devices(params.selected_devices.unwrap_or_default());
    let max_points = state.config.max_points;
    let total = dataset.locations.len();

    let outcome = tokio::task::spawn_blocking(move || filter::filter(&dataset, &request, max_points))
        .await
        .map_err(|e| ApiError::Internal(format!("filter task failed: {e}")))?;

    match outcome.decimation {
        Decimation::NotNeeded => {}
        Decimation::Reduced { step } => {
            log::debug!("decimated {} records with final step {}", outcome.matched, step)
        }
        Decimation::Exhausted { step } => log::warn!(
            "decimation stopped at step {} with {} records over a budget of {}",
            step,
            outcome.records.len(),
            max_points
        ),
    }
    log::info!(
        "filter on {}: {} records, {} matched, {} returned",
        file_path,
        total,
        outcome.matched,
        outcome.records.len()
    );

    Ok(Json(outcome.records))
}

async fn list_devices(
    query: Result<Query<DevicesQuery>, QueryRejection>,
) -> Result<Json<DevicesResponse>, ApiError> {
    let Query(query) = query?;
    let file_path = required_path(query.file_path)?;
    let devices = dataset::list_devices(&file_path).await?;
    Ok(Json(DevicesResponse { devices }))
}

fn required_path(path: Option<String>) -> Result<String, DatasetError> {
    path.filter(|p| !p.trim().is_empty())
        .ok_or(DatasetError::PathMissing)
}
