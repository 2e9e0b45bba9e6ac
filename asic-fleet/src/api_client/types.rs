//! API data transfer objects.
//!
//! These types define the API contract shared between the daemon and
//! clients.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::device::{Device, DeviceId, DeviceStatus};
use crate::fleet::{Fleet, FleetSummary, NotificationLevel};
use crate::preferences::Preferences;

/// Immutable copy of the fleet, published after every tick and command.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct FleetSnapshot {
    pub uptime_secs: u64,
    pub devices: Vec<DeviceState>,
    pub summary: FleetSummary,
    /// Transitions scheduled but not yet applied.
    pub pending_transitions: usize,
    pub preferences: Preferences,
}

impl FleetSnapshot {
    pub fn new(fleet: &Fleet, preferences: &Preferences, uptime: Duration) -> Self {
        Self {
            uptime_secs: uptime.as_secs(),
            devices: fleet.devices().iter().map(DeviceState::from).collect(),
            summary: fleet.summary(),
            pending_transitions: fleet.pending().len(),
            preferences: *preferences,
        }
    }

    pub fn device(&self, id: DeviceId) -> Option<&DeviceState> {
        self.devices.iter().find(|d| d.id == id)
    }
}

/// One device as seen by API clients.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct DeviceState {
    #[schema(value_type = u32)]
    pub id: DeviceId,
    pub name: String,
    pub model: String,
    pub status: DeviceStatus,
    pub hashrate: f64,
    pub temperature: f64,
    pub power: f64,
    pub fan_speed: u8,
    pub is_fan_on: bool,
    pub comment: String,
    pub is_force_stopping: bool,
}

impl From<&Device> for DeviceState {
    fn from(device: &Device) -> Self {
        Self {
            id: device.id,
            name: device.name.clone(),
            model: device.model.clone(),
            status: device.status,
            hashrate: device.hashrate,
            temperature: device.temperature,
            power: device.power,
            fan_speed: device.fan_speed,
            is_fan_on: device.is_fan_on,
            comment: device.comment.clone(),
            is_force_stopping: device.is_force_stopping,
        }
    }
}

/// A delivered notification, numbered in delivery order.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct NotificationEntry {
    pub seq: u64,
    pub level: NotificationLevel,
    pub message: String,
}

/// Body of `PUT /preferences/{key}`. Booleans and numbers are accepted
/// as JSON values or as strings.
#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct SetPreferenceRequest {
    #[schema(value_type = Object)]
    pub value: serde_json::Value,
}

impl SetPreferenceRequest {
    /// The value in the string form the preference store parses.
    pub fn as_text(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// JSON error body returned with every non-2xx response.
#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::device::{default_seeds, from_seeds};

    #[test]
    fn snapshot_reflects_fleet() {
        let fleet = Fleet::new(from_seeds(default_seeds()));
        let snapshot = FleetSnapshot::new(&fleet, &Preferences::default(), Duration::from_secs(42));

        assert_eq!(snapshot.uptime_secs, 42);
        assert_eq!(snapshot.devices.len(), 8);
        assert_eq!(snapshot.pending_transitions, 0);
        assert_eq!(snapshot.device(DeviceId(3)).unwrap().status, DeviceStatus::Overclocked);
        assert_eq!(snapshot.summary, fleet.summary());
    }

    #[test]
    fn device_state_serializes_status_in_camel_case() {
        let fleet = Fleet::new(from_seeds(default_seeds()));
        let value = serde_json::to_value(DeviceState::from(&fleet.devices()[0])).unwrap();
        assert_eq!(value["id"], 1);
        assert_eq!(value["status"], "online");
        assert_eq!(value["is_fan_on"], true);
    }

    #[test]
    fn preference_values_accept_json_or_text() {
        let as_bool = SetPreferenceRequest { value: json!(true) };
        let as_number = SetPreferenceRequest { value: json!(1.5) };
        let as_text = SetPreferenceRequest { value: json!("false") };

        assert_eq!(as_bool.as_text(), "true");
        assert_eq!(as_number.as_text(), "1.5");
        assert_eq!(as_text.as_text(), "false");
    }
}
