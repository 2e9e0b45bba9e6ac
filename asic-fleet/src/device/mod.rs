//! Simulated mining devices.
//!
//! A [`Device`] is a plain record of one ASIC's readings and status.
//! Devices are created once from a seed list and mutated in place by the
//! simulator and by user actions.

mod status;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use status::{DeviceEvent, DeviceStatus, TransitionError};

use crate::error::Result;

/// Ambient temperature (°C). No device cools below this.
pub const AMBIENT_TEMPERATURE_C: f64 = 25.0;

/// Stable device identifier, assigned at creation and never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One simulated ASIC.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub model: String,
    pub status: DeviceStatus,
    /// Throughput in TH/s.
    pub hashrate: f64,
    /// Chip temperature (°C).
    pub temperature: f64,
    /// Power draw (W).
    pub power: f64,
    /// Fan duty cycle (0--100).
    pub fan_speed: u8,
    pub is_fan_on: bool,
    pub comment: String,
    /// Set while a force-stop is resolving; the tick leaves the device alone.
    pub is_force_stopping: bool,
    /// Bumped on every status change. Scheduled transitions remember the
    /// generation they were created under and are dropped on mismatch.
    pub(crate) generation: u64,
}

impl Device {
    /// Apply `event` through the transition table.
    ///
    /// On success the status changes and the generation is bumped, which
    /// invalidates every transition scheduled for the previous status.
    pub fn transition(&mut self, event: DeviceEvent) -> std::result::Result<(), TransitionError> {
        self.status = self.status.on(event)?;
        self.generation += 1;
        Ok(())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Initial values for one device, as found in a seed list.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceSeed {
    pub name: String,
    pub model: String,
    pub status: DeviceStatus,
    #[serde(default)]
    pub hashrate: f64,
    #[serde(default = "ambient")]
    pub temperature: f64,
    #[serde(default)]
    pub power: f64,
    #[serde(default)]
    pub fan_speed: u8,
    #[serde(default)]
    pub is_fan_on: bool,
    #[serde(default)]
    pub comment: String,
}

fn ambient() -> f64 {
    AMBIENT_TEMPERATURE_C
}

/// Create devices from seeds, assigning ids 1, 2, 3, ... in order.
pub fn from_seeds(seeds: Vec<DeviceSeed>) -> Vec<Device> {
    seeds
        .into_iter()
        .zip(1..)
        .map(|(seed, id)| Device {
            id: DeviceId(id),
            name: seed.name,
            model: seed.model,
            status: seed.status,
            hashrate: if seed.status.produces_hashrate() {
                seed.hashrate
            } else {
                0.0
            },
            temperature: seed.temperature.max(AMBIENT_TEMPERATURE_C),
            power: seed.power,
            fan_speed: if seed.is_fan_on {
                seed.fan_speed.min(100)
            } else {
                0
            },
            is_fan_on: seed.is_fan_on,
            comment: seed.comment,
            is_force_stopping: false,
            generation: 0,
        })
        .collect()
}

/// Read a JSON array of [`DeviceSeed`] from `path`.
pub fn load_seeds(path: &Path) -> Result<Vec<DeviceSeed>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// The built-in fleet used when no seed file is configured.
pub fn default_seeds() -> Vec<DeviceSeed> {
    fn seed(
        name: &str,
        model: &str,
        status: DeviceStatus,
        hashrate: f64,
        temperature: f64,
        power: f64,
        fan_speed: u8,
    ) -> DeviceSeed {
        DeviceSeed {
            name: name.into(),
            model: model.into(),
            status,
            hashrate,
            temperature,
            power,
            fan_speed,
            is_fan_on: fan_speed > 0,
            comment: String::new(),
        }
    }

    use DeviceStatus::*;
    vec![
        seed("ASIC-01", "Antminer S19 Pro", Online, 104.2, 64.0, 3225.0, 75),
        seed("ASIC-02", "Antminer S19j Pro", Online, 98.7, 61.5, 3210.0, 72),
        seed("ASIC-03", "Whatsminer M30S++", Overclocked, 112.4, 71.0, 3640.0, 85),
        seed("ASIC-04", "AvalonMiner 1246", Idle, 10.0, 45.0, 500.0, 30),
        seed("ASIC-05", "Antminer S19 XP", Standby, 0.0, 33.0, 60.0, 30),
        seed("ASIC-06", "Whatsminer M50", Offline, 0.0, 25.0, 0.0, 0),
        seed("ASIC-07", "Antminer T19", Online, 95.1, 66.5, 3240.0, 78),
        seed("ASIC-08", "Antminer S9", Error, 0.0, 52.0, 50.0, 70),
    ]
}
