use crate::api::api_error::APIError;
use crate::api::model::{
    NotifyResult, SetSlavesRequest, SettingsResult, SlavesResult, UpdateSettingsRequest,
};
use crate::api::server::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::WithRejection;
use serde_json::json;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub(super) fn new(state: AppState) -> Router {
    Router::new()
        .route("/healthcheck", get(health_check))
        .route("/notify", post(notify))
        .route("/slaves", get(get_slaves).put(set_slaves))
        .route("/settings", get(get_settings).put(update_settings))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(state.config.api_timeout))
        .with_state(state)
}

#[allow(clippy::unused_async)]
async fn health_check() -> impl IntoResponse {
    Json(json!({"ok":"healthy"}))
}

#[allow(clippy::unused_async)]
async fn notify(State(state): State<AppState>) -> Json<NotifyResult> {
    let notified = state.zone_server.notify().len();
    tracing::info!("sending NOTIFY to {notified} slave(s)");
    Json(NotifyResult { notified })
}

#[allow(clippy::unused_async)]
async fn get_slaves(State(state): State<AppState>) -> Json<SlavesResult> {
    Json(state.zone_server.slaves().as_ref().into())
}

async fn set_slaves(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<SetSlavesRequest>, APIError>,
) -> Result<Json<SlavesResult>, APIError> {
    if let Err(err) = state.zone_server.set_slaves(&payload.slaves).await {
        tracing::warn!("rejected slave update: {err}");
        return Err(err.into());
    }
    Ok(Json(state.zone_server.slaves().as_ref().into()))
}

#[allow(clippy::unused_async)]
async fn get_settings(State(state): State<AppState>) -> Json<SettingsResult> {
    Json(state.zone_server.settings())
}

#[allow(clippy::unused_async)]
async fn update_settings(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<UpdateSettingsRequest>, APIError>,
) -> Result<Json<SettingsResult>, APIError> {
    if let Some(batch_size) = payload.batch_size {
        state.zone_server.set_batch_size(batch_size)?;
    }
    if let Some(packet_size) = payload.packet_size {
        state.zone_server.set_packet_size(packet_size)?;
    }
    let settings = state.zone_server.settings();
    tracing::info!("transfer settings now {settings:?}");
    Ok(Json(settings))
}
