use crate::directory::Directory;
use crate::model::{DeviceSummary, LatestResponse, SeriesResponse, ACTUATOR_STATE};
use crate::query::Projection;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Clone)]
struct AppState {
    projection: Projection,
    directory: Arc<dyn Directory>,
    cse_name: String,
}

impl AppState {
    fn address_of(&self, name: &str) -> String {
        format!("{}/{}", self.cse_name, name)
    }
}

#[derive(Debug, Deserialize)]
pub struct StateRequest {
    state: String,
}

pub fn create_router(
    projection: Projection,
    directory: Arc<dyn Directory>,
    cse_name: impl Into<String>,
) -> Router {
    let state = AppState {
        projection,
        directory,
        cse_name: cse_name.into(),
    };

    Router::new()
        .route("/api/v1/devices", get(list_devices))
        .route("/api/v1/devices/:name/latest/:metric", get(get_latest))
        .route("/api/v1/devices/:name/series/:metric", get(get_series))
        .route("/api/v1/actuators/:name/state", post(set_actuator_state))
        .with_state(state)
}

async fn list_devices(State(state): State<AppState>) -> Json<Vec<DeviceSummary>> {
    Json(state.projection.devices().await)
}

async fn get_latest(
    State(state): State<AppState>,
    Path((name, metric)): Path<(String, String)>,
) -> Json<LatestResponse> {
    let value = state
        .projection
        .latest_of(&state.address_of(&name), &metric)
        .await;
    Json(LatestResponse { value })
}

async fn get_series(
    State(state): State<AppState>,
    Path((name, metric)): Path<(String, String)>,
) -> Json<SeriesResponse> {
    let (values, timestamps) = state
        .projection
        .series_of(&state.address_of(&name), &metric)
        .await;
    Json(SeriesResponse { values, timestamps })
}

/// Writes the requested state to the actuator's container. The registry is
/// updated when the broker notifies the new content instance.
async fn set_actuator_state(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<StateRequest>,
) -> Result<StatusCode, AppError> {
    let requested = request.state.trim();
    if requested.is_empty() {
        return Err(AppError(anyhow::anyhow!("state cannot be empty")));
    }

    let container = format!("{}/{}", state.address_of(&name), ACTUATOR_STATE);
    info!("Setting {} to {}", container, requested);
    state.directory.write_value(&container, requested).await;
    Ok(StatusCode::ACCEPTED)
}

struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("API error: {}", self.0);
        (StatusCode::BAD_REQUEST, format!("Bad request: {}", self.0)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
