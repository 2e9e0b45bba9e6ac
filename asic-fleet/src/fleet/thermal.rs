//! Physical-analogue model of a single device.
//!
//! Each tick nudges temperature, hashrate, power and fan speed according
//! to the device's status, with a little noise drawn from the simulator's
//! random source.

use super::effects::Effects;
use crate::device::{AMBIENT_TEMPERATURE_C, Device, DeviceEvent, DeviceStatus};
use crate::random::RandomSource;

/// Design limit (°C). Crossing it upward sounds the overheat cue, and
/// overclocking is disabled at or above it.
pub const MAX_TEMPERATURE_C: f64 = 85.0;

/// Online devices at or above this overheat (°C).
pub const OVERHEAT_TEMPERATURE_C: f64 = 100.0;

/// Any powered device at or above this is shut down (°C).
pub const CRITICAL_TEMPERATURE_C: f64 = 115.0;

/// Overheating devices recover once they cool below this (°C).
pub const RECOVERY_TEMPERATURE_C: f64 = 70.0;

/// Idle devices settle toward this temperature (°C).
const IDLE_TARGET_C: f64 = 45.0;

/// With overheat prevention on, readings above this are pulled down (°C).
pub const SOFT_CEILING_C: f64 = MAX_TEMPERATURE_C - 15.0;

/// ...but never below this (°C).
const SOFT_FLOOR_C: f64 = MAX_TEMPERATURE_C - 20.0;

/// Fan speed an online device never regulates below (%).
const FAN_SPEED_MIN_ONLINE: u8 = 70;
const FAN_SPEED_IDLE: u8 = 30;
const FAN_SPEED_MAX: u8 = 100;

const POWER_ONLINE_W: f64 = 3200.0;
const POWER_OVERCLOCKED_W: f64 = 3600.0;
const POWER_BOOT_PLATEAU_W: f64 = 3000.0;
const POWER_RAMP_W: f64 = 300.0;
const POWER_IDLE_W: f64 = 500.0;
const POWER_OVERHEAT_FLOOR_W: f64 = 200.0;
const POWER_STANDBY_FLOOR_W: f64 = 50.0;

const HASHRATE_IDLE: f64 = 10.0;

/// Advance one device's readings by one tick according to its status.
pub fn apply_status_physics<R: RandomSource + ?Sized>(
    device: &mut Device,
    rng: &mut R,
    effects: &mut Effects,
) {
    match device.status {
        DeviceStatus::Online | DeviceStatus::Overclocked => mining(device, rng),

        DeviceStatus::Overheat => {
            device.hashrate = 0.0;
            device.power = (device.power - 200.0).max(POWER_OVERHEAT_FLOOR_W);
            device.is_fan_on = true;
            device.fan_speed = FAN_SPEED_MAX;
            device.temperature = (device.temperature - 1.5).max(AMBIENT_TEMPERATURE_C);

            if device.temperature < RECOVERY_TEMPERATURE_C
                && device.transition(DeviceEvent::Recover).is_ok()
            {
                effects.success(format!(
                    "{}: temperature back to normal, device online again",
                    device.name
                ));
            }
        }

        // The switch to online belongs to the scheduled completion.
        DeviceStatus::Booting => {
            device.power = (device.power + POWER_RAMP_W).min(POWER_BOOT_PLATEAU_W);
        }

        DeviceStatus::ShuttingDown => {
            device.power = (device.power - POWER_RAMP_W).max(0.0);
            device.fan_speed = device.fan_speed.saturating_sub(15);
        }

        DeviceStatus::Idle => {
            device.hashrate = HASHRATE_IDLE + rng.noise(2.0);
            device.power = POWER_IDLE_W + rng.noise(50.0);
            device.temperature = if device.temperature > IDLE_TARGET_C {
                (device.temperature - 0.5).max(IDLE_TARGET_C)
            } else {
                (device.temperature + 0.5).min(IDLE_TARGET_C)
            };
            device.is_fan_on = true;
            device.fan_speed = FAN_SPEED_IDLE;
        }

        DeviceStatus::Standby => {
            device.hashrate = 0.0;
            device.power = (device.power - 100.0).max(POWER_STANDBY_FLOOR_W);
            if device.temperature > AMBIENT_TEMPERATURE_C {
                device.temperature -= 1.0;
            }
        }

        DeviceStatus::Offline => {
            if device.temperature > AMBIENT_TEMPERATURE_C {
                device.temperature -= 0.5;
            }
            device.is_fan_on = false;
            device.fan_speed = 0;
        }

        // Stuck until power-cycled.
        DeviceStatus::Error => {}
    }
}

fn mining<R: RandomSource + ?Sized>(device: &mut Device, rng: &mut R) {
    let overclocked = device.status == DeviceStatus::Overclocked;

    let heating = if overclocked { 0.8 } else { 0.5 };
    let cooling = if device.is_fan_on {
        f64::from(device.fan_speed) / 100.0 * 1.2
    } else {
        -0.1
    };
    device.temperature += (heating - cooling + rng.noise(1.0)) * 1.5;

    let volatility = if overclocked { 1.5 } else { 0.5 };
    device.hashrate += rng.noise(1.0) * volatility;

    device.power = if overclocked {
        POWER_OVERCLOCKED_W + rng.next_f64() * 100.0
    } else {
        POWER_ONLINE_W + rng.next_f64() * 50.0
    };

    device.fan_speed = if !device.is_fan_on {
        0
    } else if device.temperature > MAX_TEMPERATURE_C - 10.0 {
        device.fan_speed.saturating_add(5).min(FAN_SPEED_MAX)
    } else {
        device.fan_speed.saturating_sub(1).max(FAN_SPEED_MIN_ONLINE)
    };
}

/// Soft ceiling used instead of hard shutdowns when overheat prevention
/// is on.
pub fn apply_soft_ceiling(device: &mut Device) {
    if device.temperature > SOFT_CEILING_C {
        device.temperature = (device.temperature - 1.0).max(SOFT_FLOOR_C);
        if device.is_fan_on {
            device.fan_speed = device.fan_speed.saturating_add(10).min(FAN_SPEED_MAX);
        }
    }
}

/// Enforce the record invariants after a step.
pub fn clamp(device: &mut Device) {
    device.power = device.power.max(0.0);
    device.hashrate = if device.status.produces_hashrate() {
        device.hashrate.max(0.0)
    } else {
        0.0
    };
    device.temperature = device.temperature.max(AMBIENT_TEMPERATURE_C);
    device.fan_speed = if device.is_fan_on {
        device.fan_speed.min(FAN_SPEED_MAX)
    } else {
        0
    };
}
