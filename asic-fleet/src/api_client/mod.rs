//! API client library.
//!
//! A Rust client for the fleet daemon's HTTP API, used by the CLI.

pub mod types;

use anyhow::{Context, Result};
use reqwest::{Client as HttpClient, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::preferences::{Preferences, PreferencesPatch};
use types::{DeviceState, ErrorBody, FleetSnapshot, NotificationEntry};

/// Default API base URL.
///
/// Port 6570 = ASCII 'A' (65) + 'F' (70).
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:6570";

/// HTTP client for the fleet API.
pub struct Client {
    http: HttpClient,
    base_url: String,
}

impl Client {
    /// Create a client connecting to the default local address.
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL.to_string())
    }

    /// Create a client connecting to a specific base URL.
    pub fn with_base_url(base_url: String) -> Self {
        Self {
            http: HttpClient::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn get_fleet(&self) -> Result<FleetSnapshot> {
        self.send(self.request(Method::GET, "fleet")).await
    }

    pub async fn get_devices(&self) -> Result<Vec<DeviceState>> {
        self.send(self.request(Method::GET, "devices")).await
    }

    pub async fn get_device(&self, id: u32) -> Result<DeviceState> {
        self.send(self.request(Method::GET, &format!("devices/{id}")))
            .await
    }

    pub async fn toggle_power(&self, id: u32) -> Result<DeviceState> {
        self.send(self.request(Method::POST, &format!("devices/{id}/power")))
            .await
    }

    pub async fn toggle_fan(&self, id: u32) -> Result<DeviceState> {
        self.send(self.request(Method::POST, &format!("devices/{id}/fan")))
            .await
    }

    pub async fn toggle_overclock(&self, id: u32) -> Result<DeviceState> {
        self.send(self.request(Method::POST, &format!("devices/{id}/overclock")))
            .await
    }

    /// Run a power action by name, e.g. `"force-stop"`.
    pub async fn power_action(&self, id: u32, action: &str) -> Result<DeviceState> {
        self.send(self.request(Method::POST, &format!("devices/{id}/actions/{action}")))
            .await
    }

    pub async fn start_all(&self) -> Result<FleetSnapshot> {
        self.send(self.request(Method::POST, "fleet/start")).await
    }

    pub async fn stop_all(&self) -> Result<FleetSnapshot> {
        self.send(self.request(Method::POST, "fleet/stop")).await
    }

    pub async fn get_preferences(&self) -> Result<Preferences> {
        self.send(self.request(Method::GET, "preferences")).await
    }

    pub async fn patch_preferences(&self, patch: &PreferencesPatch) -> Result<Preferences> {
        self.send(self.request(Method::PATCH, "preferences").json(patch))
            .await
    }

    /// Set one preference by identifier. The value is sent as text and
    /// parsed by the daemon.
    pub async fn set_preference(&self, key: &str, value: &str) -> Result<Preferences> {
        self.send(
            self.request(Method::PUT, &format!("preferences/{key}"))
                .json(&json!({ "value": value })),
        )
        .await
    }

    pub async fn get_notifications(&self) -> Result<Vec<NotificationEntry>> {
        self.send(self.request(Method::GET, "notifications")).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/api/v0/{}", self.base_url, path))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .send()
            .await
            .context("failed to connect to fleet API")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ErrorBody>()
                .await
                .map(|body| body.error)
                .unwrap_or_else(|_| status.to_string());
            anyhow::bail!("API request failed ({}): {}", status.as_u16(), detail);
        }

        response
            .json()
            .await
            .context("failed to parse fleet API response")
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}
