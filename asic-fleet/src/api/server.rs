//! HTTP server lifecycle and router construction.

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

use super::commands::FleetCommand;
use super::v0;
use crate::api_client::types::FleetSnapshot;
use crate::sink::NotificationLog;
use crate::tracing::prelude::*;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Address to bind the API server to. Defaults to "127.0.0.1:6570".
    /// Port 6570 represents ASCII 'A' (65) and 'F' (70).
    pub bind_addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:6570".to_string(),
        }
    }
}

/// Shared application state available to all handlers.
#[derive(Clone)]
pub(crate) struct SharedState {
    pub snapshot_rx: watch::Receiver<FleetSnapshot>,
    pub command_tx: mpsc::Sender<FleetCommand>,
    pub notifications: NotificationLog,
}

impl SharedState {
    pub fn snapshot(&self) -> FleetSnapshot {
        self.snapshot_rx.borrow().clone()
    }
}

#[derive(OpenApi)]
#[openapi(info(
    title = "asic-fleet",
    description = "Monitoring and control API for a simulated ASIC mining fleet"
))]
struct ApiDoc;

/// Start the API server and run until `shutdown` is cancelled.
pub async fn serve(
    config: ApiConfig,
    shutdown: CancellationToken,
    snapshot_rx: watch::Receiver<FleetSnapshot>,
    command_tx: mpsc::Sender<FleetCommand>,
    notifications: NotificationLog,
) -> Result<()> {
    let app = build_router(SharedState {
        snapshot_rx,
        command_tx,
        notifications,
    });

    let listener = TcpListener::bind(&config.bind_addr).await?;
    let actual_addr = listener.local_addr()?;

    info!(url = %format!("http://{}", actual_addr), "API server listening.");

    if !actual_addr.ip().is_loopback() {
        warn!(
            "API server is bound to a non-localhost address ({}). \
             This exposes fleet control to the network without authentication.",
            actual_addr.ip()
        );
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
        })
        .await?;

    Ok(())
}

/// Build the application router: the v0 API, its OpenAPI document and
/// Swagger UI.
pub(crate) fn build_router(state: SharedState) -> Router {
    let (router, openapi) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .nest("/api/v0", v0::routes())
        .split_for_parts();

    router
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}
