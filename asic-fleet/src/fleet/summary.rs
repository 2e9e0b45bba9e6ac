//! Fleet-wide aggregates derived from the current device collection.

use serde::{Deserialize, Serialize};
use strum::Display;
use utoipa::ToSchema;

use super::thermal::MAX_TEMPERATURE_C;
use crate::device::{Device, DeviceStatus};

/// Average temperature above which the fleet is considered elevated (°C).
pub const ELEVATED_TEMPERATURE_C: f64 = 70.0;

/// Average temperature above which the fleet is considered optimal (°C).
pub const OPTIMAL_TEMPERATURE_C: f64 = 40.0;

/// Thermal level of the whole fleet, from its average temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize, ToSchema)]
pub enum TempStatusLevel {
    #[serde(rename = "faible")]
    #[strum(serialize = "faible")]
    Low,
    #[serde(rename = "optimal")]
    #[strum(serialize = "optimal")]
    Optimal,
    #[serde(rename = "eleve")]
    #[strum(serialize = "eleve")]
    Elevated,
    #[serde(rename = "surcharge")]
    #[strum(serialize = "surcharge")]
    Surcharge,
}

impl TempStatusLevel {
    pub fn from_average(avg_temperature: f64) -> Self {
        if avg_temperature > MAX_TEMPERATURE_C {
            TempStatusLevel::Surcharge
        } else if avg_temperature > ELEVATED_TEMPERATURE_C {
            TempStatusLevel::Elevated
        } else if avg_temperature > OPTIMAL_TEMPERATURE_C {
            TempStatusLevel::Optimal
        } else {
            TempStatusLevel::Low
        }
    }
}

/// Overall fleet health, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize, ToSchema)]
pub enum GlobalStatus {
    #[serde(rename = "error")]
    #[strum(serialize = "error")]
    Error,
    #[serde(rename = "surcharge")]
    #[strum(serialize = "surcharge")]
    Surcharge,
    #[serde(rename = "eleve")]
    #[strum(serialize = "eleve")]
    Elevated,
    #[serde(rename = "offline")]
    #[strum(serialize = "offline")]
    Offline,
    #[serde(rename = "optimal")]
    #[strum(serialize = "optimal")]
    Optimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FleetSummary {
    pub total_hashrate: f64,
    pub total_power: f64,
    pub avg_temperature: f64,
    /// Devices online or overclocked.
    pub active_count: usize,
    /// At least 70% of the fleet is overclocked.
    pub overclocked_majority: bool,
    pub temp_status_level: TempStatusLevel,
    pub global_status: GlobalStatus,
}

impl FleetSummary {
    pub fn from_devices(devices: &[Device]) -> Self {
        let total_hashrate = devices.iter().map(|d| d.hashrate).sum();
        let total_power = devices.iter().map(|d| d.power).sum();
        let avg_temperature = if devices.is_empty() {
            0.0
        } else {
            devices.iter().map(|d| d.temperature).sum::<f64>() / devices.len() as f64
        };
        let active_count = devices.iter().filter(|d| d.status.is_active()).count();

        let overclocked = count(devices, DeviceStatus::Overclocked);
        // overclocked / total >= 0.70, kept in integers
        let overclocked_majority = !devices.is_empty() && overclocked * 10 >= devices.len() * 7;

        let temp_status_level = TempStatusLevel::from_average(avg_temperature);

        let global_status = if count(devices, DeviceStatus::Error) > 0 {
            GlobalStatus::Error
        } else if count(devices, DeviceStatus::Overheat) > 0
            || temp_status_level == TempStatusLevel::Surcharge
        {
            GlobalStatus::Surcharge
        } else if temp_status_level == TempStatusLevel::Elevated {
            GlobalStatus::Elevated
        } else if devices.iter().all(|d| d.status == DeviceStatus::Offline) {
            GlobalStatus::Offline
        } else {
            GlobalStatus::Optimal
        };

        Self {
            total_hashrate,
            total_power,
            avg_temperature,
            active_count,
            overclocked_majority,
            temp_status_level,
            global_status,
        }
    }
}

fn count(devices: &[Device], status: DeviceStatus) -> usize {
    devices.iter().filter(|d| d.status == status).count()
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::device::{DeviceSeed, from_seeds};

    fn fleet(statuses: &[DeviceStatus], temperature: f64) -> Vec<Device> {
        from_seeds(
            statuses
                .iter()
                .enumerate()
                .map(|(i, &status)| DeviceSeed {
                    name: format!("rig-{i}"),
                    model: "Test".into(),
                    status,
                    hashrate: 0.0,
                    temperature,
                    power: 0.0,
                    fan_speed: 0,
                    is_fan_on: false,
                    comment: String::new(),
                })
                .collect(),
        )
    }

    fn mixed(overclocked: usize, total: usize) -> Vec<DeviceStatus> {
        (0..total)
            .map(|i| {
                if i < overclocked {
                    DeviceStatus::Overclocked
                } else {
                    DeviceStatus::Online
                }
            })
            .collect()
    }

    #[test]
    fn seven_of_ten_overclocked_is_a_majority() {
        let summary = FleetSummary::from_devices(&fleet(&mixed(7, 10), 50.0));
        assert!(summary.overclocked_majority);
    }

    #[test]
    fn six_of_ten_overclocked_is_not_a_majority() {
        let summary = FleetSummary::from_devices(&fleet(&mixed(6, 10), 50.0));
        assert!(!summary.overclocked_majority);
    }

    #[test]
    fn empty_fleet() {
        let summary = FleetSummary::from_devices(&[]);
        assert_eq!(summary.avg_temperature, 0.0);
        assert!(!summary.overclocked_majority);
        assert_eq!(summary.temp_status_level, TempStatusLevel::Low);
        assert_eq!(summary.global_status, GlobalStatus::Offline);
    }

    #[test_case(85.5, TempStatusLevel::Surcharge; "above_max")]
    #[test_case(85.0, TempStatusLevel::Elevated; "at_max")]
    #[test_case(70.1, TempStatusLevel::Elevated; "above_elevated")]
    #[test_case(70.0, TempStatusLevel::Optimal; "at_elevated")]
    #[test_case(40.0, TempStatusLevel::Low; "at_optimal")]
    #[test_case(25.0, TempStatusLevel::Low; "ambient")]
    fn temperature_levels(avg: f64, level: TempStatusLevel) {
        assert_eq!(TempStatusLevel::from_average(avg), level);
    }

    #[test]
    fn error_outranks_surcharge() {
        let devices = fleet(&[DeviceStatus::Error, DeviceStatus::Overheat], 60.0);
        assert_eq!(
            FleetSummary::from_devices(&devices).global_status,
            GlobalStatus::Error
        );
    }

    #[test]
    fn overheating_device_means_surcharge() {
        let devices = fleet(&[DeviceStatus::Online, DeviceStatus::Overheat], 60.0);
        assert_eq!(
            FleetSummary::from_devices(&devices).global_status,
            GlobalStatus::Surcharge
        );
    }

    #[test]
    fn all_offline() {
        let devices = fleet(&[DeviceStatus::Offline, DeviceStatus::Offline], 25.0);
        assert_eq!(
            FleetSummary::from_devices(&devices).global_status,
            GlobalStatus::Offline
        );
    }

    #[test]
    fn elevated_average_outranks_offline() {
        let devices = fleet(&[DeviceStatus::Offline], 75.0);
        assert_eq!(
            FleetSummary::from_devices(&devices).global_status,
            GlobalStatus::Elevated
        );
    }

    #[test]
    fn totals_and_active_count() {
        let mut devices = fleet(
            &[
                DeviceStatus::Online,
                DeviceStatus::Overclocked,
                DeviceStatus::Idle,
            ],
            50.0,
        );
        devices[0].hashrate = 100.0;
        devices[0].power = 3200.0;
        devices[1].hashrate = 110.0;
        devices[1].power = 3600.0;
        devices[2].hashrate = 10.0;
        devices[2].power = 500.0;
        devices[2].temperature = 44.0;

        let summary = FleetSummary::from_devices(&devices);
        assert_eq!(summary.total_hashrate, 220.0);
        assert_eq!(summary.total_power, 7300.0);
        assert_eq!(summary.avg_temperature, 48.0);
        assert_eq!(summary.active_count, 2);
        assert_eq!(summary.global_status, GlobalStatus::Optimal);
    }
}
