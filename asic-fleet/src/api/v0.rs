//! API v0 endpoints.
//!
//! Version 0 signals an unstable API -- breaking changes are expected
//! until the fleet API reaches 1.0.

use std::str::FromStr;
use std::time::Duration;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tokio::sync::oneshot;
use utoipa_axum::{router::OpenApiRouter, routes};

use super::commands::{FleetCommand, Reply};
use super::server::SharedState;
use crate::api_client::types::{
    DeviceState, ErrorBody, FleetSnapshot, NotificationEntry, SetPreferenceRequest,
};
use crate::device::DeviceId;
use crate::error::Error;
use crate::fleet::PowerAction;
use crate::preferences::{Preferences, PreferencesPatch};

/// How long a handler waits for the runner to answer a command.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the v0 API routes with OpenAPI metadata.
pub fn routes() -> OpenApiRouter<SharedState> {
    OpenApiRouter::new()
        .routes(routes!(health))
        .routes(routes!(get_fleet))
        .routes(routes!(start_fleet))
        .routes(routes!(stop_fleet))
        .routes(routes!(get_devices))
        .routes(routes!(get_device))
        .routes(routes!(toggle_power))
        .routes(routes!(toggle_fan))
        .routes(routes!(toggle_overclock))
        .routes(routes!(power_action))
        .routes(routes!(get_preferences, patch_preferences))
        .routes(routes!(put_preference))
        .routes(routes!(get_notifications))
}

/// Error response: a status code plus a JSON [`ErrorBody`].
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(id: DeviceId) -> Self {
        Error::UnknownDevice(id).into()
    }

    fn channel() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "fleet runner unavailable".to_string(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let status = match &e {
            Error::UnknownDevice(_) => StatusCode::NOT_FOUND,
            Error::Transition { .. } => StatusCode::CONFLICT,
            Error::UnknownPreference(_)
            | Error::InvalidPreference { .. }
            | Error::UnknownAction(_) => StatusCode::BAD_REQUEST,
            Error::Config(_) | Error::Io(_) | Error::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// Send a command to the runner and wait for its verdict.
async fn command(
    state: &SharedState,
    make: impl FnOnce(Reply) -> FleetCommand,
) -> Result<(), ApiError> {
    let (tx, rx) = oneshot::channel();
    state
        .command_tx
        .send(make(tx))
        .await
        .map_err(|_| ApiError::channel())?;

    // Result layers: timeout / channel-closed / command-error.
    match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
        Ok(Ok(result)) => result.map_err(ApiError::from),
        Ok(Err(_)) | Err(_) => Err(ApiError::channel()),
    }
}

fn device_state(state: &SharedState, id: DeviceId) -> Result<Json<DeviceState>, ApiError> {
    state
        .snapshot_rx
        .borrow()
        .device(id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::not_found(id))
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = OK, description = "Server is running", body = String),
    ),
)]
async fn health() -> &'static str {
    "OK"
}

/// Return the current fleet snapshot.
#[utoipa::path(
    get,
    path = "/fleet",
    tag = "fleet",
    responses(
        (status = OK, description = "Devices, summary and preferences", body = FleetSnapshot),
    ),
)]
async fn get_fleet(State(state): State<SharedState>) -> Json<FleetSnapshot> {
    Json(state.snapshot())
}

/// Boot every offline device.
#[utoipa::path(
    post,
    path = "/fleet/start",
    tag = "fleet",
    responses(
        (status = OK, description = "Updated fleet snapshot", body = FleetSnapshot),
        (status = INTERNAL_SERVER_ERROR, description = "Command channel error", body = ErrorBody),
    ),
)]
async fn start_fleet(State(state): State<SharedState>) -> Result<Json<FleetSnapshot>, ApiError> {
    command(&state, |reply| FleetCommand::StartAll { reply }).await?;
    Ok(Json(state.snapshot()))
}

/// Shut down every running device.
#[utoipa::path(
    post,
    path = "/fleet/stop",
    tag = "fleet",
    responses(
        (status = OK, description = "Updated fleet snapshot", body = FleetSnapshot),
        (status = INTERNAL_SERVER_ERROR, description = "Command channel error", body = ErrorBody),
    ),
)]
async fn stop_fleet(State(state): State<SharedState>) -> Result<Json<FleetSnapshot>, ApiError> {
    command(&state, |reply| FleetCommand::StopAll { reply }).await?;
    Ok(Json(state.snapshot()))
}

/// Return all devices.
#[utoipa::path(
    get,
    path = "/devices",
    tag = "devices",
    responses(
        (status = OK, description = "All devices in fleet order", body = Vec<DeviceState>),
    ),
)]
async fn get_devices(State(state): State<SharedState>) -> Json<Vec<DeviceState>> {
    Json(state.snapshot().devices)
}

/// Return a single device by id, or 404 if not found.
#[utoipa::path(
    get,
    path = "/devices/{id}",
    tag = "devices",
    params(
        ("id" = u32, Path, description = "Device id"),
    ),
    responses(
        (status = OK, description = "Device details", body = DeviceState),
        (status = NOT_FOUND, description = "Device not found", body = ErrorBody),
    ),
)]
async fn get_device(
    State(state): State<SharedState>,
    Path(id): Path<u32>,
) -> Result<Json<DeviceState>, ApiError> {
    device_state(&state, DeviceId(id))
}

/// Shut down a running device or boot a powered-down one.
#[utoipa::path(
    post,
    path = "/devices/{id}/power",
    tag = "devices",
    params(
        ("id" = u32, Path, description = "Device id"),
    ),
    responses(
        (status = OK, description = "Updated device", body = DeviceState),
        (status = NOT_FOUND, description = "Device not found", body = ErrorBody),
        (status = CONFLICT, description = "Not allowed in the current status", body = ErrorBody),
    ),
)]
async fn toggle_power(
    State(state): State<SharedState>,
    Path(id): Path<u32>,
) -> Result<Json<DeviceState>, ApiError> {
    let id = DeviceId(id);
    command(&state, |reply| FleetCommand::TogglePower { id, reply }).await?;
    device_state(&state, id)
}

/// Flip the fan switch.
#[utoipa::path(
    post,
    path = "/devices/{id}/fan",
    tag = "devices",
    params(
        ("id" = u32, Path, description = "Device id"),
    ),
    responses(
        (status = OK, description = "Updated device", body = DeviceState),
        (status = NOT_FOUND, description = "Device not found", body = ErrorBody),
    ),
)]
async fn toggle_fan(
    State(state): State<SharedState>,
    Path(id): Path<u32>,
) -> Result<Json<DeviceState>, ApiError> {
    let id = DeviceId(id);
    command(&state, |reply| FleetCommand::ToggleFan { id, reply }).await?;
    device_state(&state, id)
}

/// Switch a device between online and overclocked.
#[utoipa::path(
    post,
    path = "/devices/{id}/overclock",
    tag = "devices",
    params(
        ("id" = u32, Path, description = "Device id"),
    ),
    responses(
        (status = OK, description = "Updated device", body = DeviceState),
        (status = NOT_FOUND, description = "Device not found", body = ErrorBody),
        (status = CONFLICT, description = "Device is neither online nor overclocked", body = ErrorBody),
    ),
)]
async fn toggle_overclock(
    State(state): State<SharedState>,
    Path(id): Path<u32>,
) -> Result<Json<DeviceState>, ApiError> {
    let id = DeviceId(id);
    command(&state, |reply| FleetCommand::ToggleOverclock { id, reply }).await?;
    device_state(&state, id)
}

/// Run a power action (`idle`, `standby`, `stop`, `reboot`, `force-stop`,
/// `start-mining`) on a device.
#[utoipa::path(
    post,
    path = "/devices/{id}/actions/{action}",
    tag = "devices",
    params(
        ("id" = u32, Path, description = "Device id"),
        ("action" = String, Path, description = "Power action name"),
    ),
    responses(
        (status = OK, description = "Updated device", body = DeviceState),
        (status = BAD_REQUEST, description = "Unknown action", body = ErrorBody),
        (status = NOT_FOUND, description = "Device not found", body = ErrorBody),
        (status = CONFLICT, description = "Not allowed in the current status", body = ErrorBody),
    ),
)]
async fn power_action(
    State(state): State<SharedState>,
    Path((id, action)): Path<(u32, String)>,
) -> Result<Json<DeviceState>, ApiError> {
    let id = DeviceId(id);
    let action = PowerAction::from_str(&action).map_err(|_| Error::UnknownAction(action))?;
    command(&state, |reply| FleetCommand::PowerAction { id, action, reply }).await?;
    device_state(&state, id)
}

/// Return the current preferences.
#[utoipa::path(
    get,
    path = "/preferences",
    tag = "preferences",
    responses(
        (status = OK, description = "Current preferences", body = Preferences),
    ),
)]
async fn get_preferences(State(state): State<SharedState>) -> Json<Preferences> {
    Json(state.snapshot().preferences)
}

/// Change several preferences at once. Nothing changes if any value is
/// invalid.
#[utoipa::path(
    patch,
    path = "/preferences",
    tag = "preferences",
    request_body = PreferencesPatch,
    responses(
        (status = OK, description = "Updated preferences", body = Preferences),
        (status = BAD_REQUEST, description = "Invalid value", body = ErrorBody),
    ),
)]
async fn patch_preferences(
    State(state): State<SharedState>,
    Json(patch): Json<PreferencesPatch>,
) -> Result<Json<Preferences>, ApiError> {
    command(&state, |reply| FleetCommand::UpdatePreferences { patch, reply }).await?;
    Ok(Json(state.snapshot().preferences))
}

/// Set one preference by its identifier (`preventOverheat`,
/// `preventErrors`, `startupDelay`, `shutdownDelay`).
#[utoipa::path(
    put,
    path = "/preferences/{key}",
    tag = "preferences",
    params(
        ("key" = String, Path, description = "Preference identifier"),
    ),
    request_body = SetPreferenceRequest,
    responses(
        (status = OK, description = "Updated preferences", body = Preferences),
        (status = BAD_REQUEST, description = "Unknown key or invalid value", body = ErrorBody),
    ),
)]
async fn put_preference(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    Json(request): Json<SetPreferenceRequest>,
) -> Result<Json<Preferences>, ApiError> {
    let value = request.as_text();
    command(&state, |reply| FleetCommand::SetPreference { key, value, reply }).await?;
    Ok(Json(state.snapshot().preferences))
}

/// Return recent notifications, oldest first.
#[utoipa::path(
    get,
    path = "/notifications",
    tag = "notifications",
    responses(
        (status = OK, description = "Recent notifications", body = Vec<NotificationEntry>),
    ),
)]
async fn get_notifications(State(state): State<SharedState>) -> Json<Vec<NotificationEntry>> {
    Json(state.notifications.entries())
}

#[cfg(test)]
mod tests {
    use axum::{Router, body::Body};
    use http::{Method, Request};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tokio::sync::{mpsc, watch};
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use super::super::server::build_router;
    use super::*;
    use crate::device::{default_seeds, from_seeds};
    use crate::fleet::Fleet;
    use crate::random::ConstantRandom;
    use crate::runner::FleetRunner;
    use crate::sink::testing::recording_sinks;

    /// Router backed by a live runner that never ticks during a test.
    fn app() -> (Router, CancellationToken) {
        let fleet = Fleet::new(from_seeds(default_seeds()));
        let preferences = Preferences::default();
        let (command_tx, command_rx) = mpsc::channel(16);
        let (snapshot_tx, snapshot_rx) =
            watch::channel(FleetRunner::initial_snapshot(&fleet, &preferences));
        let (sinks, notifications, _player) = recording_sinks();

        let runner = FleetRunner::new(
            fleet,
            preferences,
            Box::new(ConstantRandom(0.5)),
            sinks,
            command_rx,
            snapshot_tx,
        )
        .with_tick_interval(Duration::from_secs(3600));
        let cancellation = CancellationToken::new();
        tokio::spawn(runner.run(cancellation.clone()));

        let router = build_router(SharedState {
            snapshot_rx,
            command_tx,
            notifications,
        });
        (router, cancellation)
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let (app, _cancel) = app();
        let (status, body) = call(&app, Method::GET, "/api/v0/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn fleet_snapshot_includes_summary() {
        let (app, _cancel) = app();
        let (status, body) = call(&app, Method::GET, "/api/v0/fleet", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["devices"].as_array().unwrap().len(), 8);
        assert_eq!(body["summary"]["active_count"], 4);
        assert_eq!(body["summary"]["global_status"], "error");
        assert_eq!(body["pending_transitions"], 0);
    }

    #[tokio::test]
    async fn unknown_device_is_not_found() {
        let (app, _cancel) = app();

        let (status, body) = call(&app, Method::GET, "/api/v0/devices/99", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("99"));

        let (status, _) = call(&app, Method::POST, "/api/v0/devices/99/fan", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn toggle_power_boots_offline_device() {
        let (app, _cancel) = app();
        let (status, body) = call(&app, Method::POST, "/api/v0/devices/6/power", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "booting");

        let (_, fleet) = call(&app, Method::GET, "/api/v0/fleet", None).await;
        assert_eq!(fleet["pending_transitions"], 1);
    }

    #[tokio::test]
    async fn illegal_transition_is_conflict() {
        let (app, _cancel) = app();

        let (status, _) = call(&app, Method::POST, "/api/v0/devices/8/overclock", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) =
            call(&app, Method::POST, "/api/v0/devices/4/actions/idle", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, device) = call(&app, Method::GET, "/api/v0/devices/8", None).await;
        assert_eq!(device["status"], "error");
    }

    #[tokio::test]
    async fn power_action_by_name() {
        let (app, _cancel) = app();

        let (status, body) =
            call(&app, Method::POST, "/api/v0/devices/3/actions/force-stop", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "shuttingDown");
        assert_eq!(body["is_force_stopping"], true);

        let (status, body) =
            call(&app, Method::POST, "/api/v0/devices/3/actions/warp-speed", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("warp-speed"));
    }

    #[tokio::test]
    async fn fleet_stop_then_notifications() {
        let (app, _cancel) = app();

        let (status, body) = call(&app, Method::POST, "/api/v0/fleet/stop", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"]["active_count"], 0);

        let (status, body) = call(&app, Method::GET, "/api/v0/notifications", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["level"], "success");
        assert_eq!(body[0]["message"], "Stopping 4 device(s)");
    }

    #[tokio::test]
    async fn preferences_read_and_write() {
        let (app, _cancel) = app();

        let (status, body) = call(
            &app,
            Method::PUT,
            "/api/v0/preferences/preventOverheat",
            Some(json!({ "value": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["prevent_overheat"], true);

        let (status, body) = call(
            &app,
            Method::PATCH,
            "/api/v0/preferences",
            Some(json!({ "startup_delay_secs": 1.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["startup_delay_secs"], 1.0);
        assert_eq!(body["prevent_overheat"], true);

        let (_, body) = call(&app, Method::GET, "/api/v0/preferences", None).await;
        assert_eq!(body["startup_delay_secs"], 1.0);
    }

    #[tokio::test]
    async fn bad_preferences_are_rejected() {
        let (app, _cancel) = app();

        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/v0/preferences/turbo",
            Some(json!({ "value": true })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/v0/preferences/shutdownDelay",
            Some(json!({ "value": "soon" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            Method::PATCH,
            "/api/v0/preferences",
            Some(json!({ "prevent_errors": true, "shutdown_delay_secs": -1.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = call(&app, Method::GET, "/api/v0/preferences", None).await;
        assert_eq!(body["prevent_errors"], false);
    }

    #[tokio::test]
    async fn stopped_runner_is_internal_error() {
        let (app, cancel) = app();
        cancel.cancel();
        // Let the runner observe the cancellation and drop its receiver.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let (status, _) = call(&app, Method::POST, "/api/v0/devices/1/fan", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn openapi_document_lists_routes() {
        let (app, _cancel) = app();
        let (status, body) = call(&app, Method::GET, "/api-docs/openapi.json", None).await;

        assert_eq!(status, StatusCode::OK);
        let paths = body["paths"].as_object().unwrap();
        assert!(paths.contains_key("/api/v0/devices/{id}/actions/{action}"));
        assert!(paths.contains_key("/api/v0/preferences/{key}"));
    }
}
