//! The periodic tick.
//!
//! [`step`] is a pure function of the current fleet, the preferences, the
//! simulation clock and a random source. It returns the next fleet and
//! the effects produced along the way; the caller publishes the former and
//! delivers the latter.

use std::time::Duration;

use super::thermal::{self, CRITICAL_TEMPERATURE_C, MAX_TEMPERATURE_C, OVERHEAT_TEMPERATURE_C};
use super::watchdog::{EMERGENCY_STOP_DELAY, WatchdogStatus};
use super::{Completion, Effects, Fleet, Pending, Schedule, SoundCue, TempStatusLevel};
use crate::device::{AMBIENT_TEMPERATURE_C, Device, DeviceEvent, DeviceStatus};
use crate::preferences::Preferences;
use crate::random::RandomSource;
use crate::tracing::prelude::*;

/// Period of the simulator tick.
pub const TICK_INTERVAL: Duration = Duration::from_millis(500);

/// A fault is injected when a roll exceeds this (about 0.2% per tick).
pub const FAULT_THRESHOLD: f64 = 0.998;

const BOOT_POWER_W: f64 = 3200.0;
const BOOT_HASHRATE: f64 = 100.0;
const BOOT_HEAT_C: f64 = 5.0;
const SHUTDOWN_COOLING_C: f64 = 10.0;
const FAULT_POWER_W: f64 = 50.0;

/// Result of one tick.
#[derive(Debug, Clone)]
pub struct Step {
    pub fleet: Fleet,
    pub effects: Effects,
}

/// Advance the fleet by one tick at simulation time `now`.
///
/// Scheduled transitions that have come due are applied first, then every
/// device takes one physics step, then the surcharge watchdog looks at
/// the result.
pub fn step<R: RandomSource + ?Sized>(
    fleet: &Fleet,
    prefs: &Preferences,
    now: Duration,
    rng: &mut R,
) -> Step {
    let mut next = fleet.clone();
    let mut effects = Effects::new();

    for event in next.schedule.take_due(now) {
        next.complete(event.pending, prefs, now, &mut effects);
    }

    let Fleet {
        devices, schedule, ..
    } = &mut next;
    for device in devices.iter_mut() {
        step_device(device, schedule, prefs, now, rng, &mut effects);
    }

    let summary = next.summary();
    let surcharge =
        !prefs.prevent_overheat && summary.temp_status_level == TempStatusLevel::Surcharge;
    match next.watchdog.check(surcharge) {
        WatchdogStatus::Triggered => {
            warn!(
                avg_temp_c = %format!("{:.1}", summary.avg_temperature),
                "Fleet in surcharge, emergency stop scheduled"
            );
            effects.error(format!(
                "Critical average temperature ({:.1}°C): emergency stop in {} seconds",
                summary.avg_temperature,
                EMERGENCY_STOP_DELAY.as_secs()
            ));
            next.schedule
                .push(now + EMERGENCY_STOP_DELAY, Pending::EmergencyStop);
        }
        WatchdogStatus::Resolved => {
            info!("Fleet left surcharge");
        }
        WatchdogStatus::Idle | WatchdogStatus::Active => {}
    }

    Step {
        fleet: next,
        effects,
    }
}

fn step_device<R: RandomSource + ?Sized>(
    device: &mut Device,
    schedule: &mut Schedule,
    prefs: &Preferences,
    now: Duration,
    rng: &mut R,
    effects: &mut Effects,
) {
    if device.is_force_stopping {
        return;
    }
    let previous_temperature = device.temperature;

    if !prefs.prevent_overheat {
        if device.temperature >= CRITICAL_TEMPERATURE_C
            && device.transition(DeviceEvent::ThermalShutdown).is_ok()
        {
            warn!(
                device = %device.id,
                temp_c = %device.temperature,
                "Critical temperature, shutting down"
            );
            effects.error(format!(
                "{}: critical temperature ({:.1}°C), emergency shutdown",
                device.name, device.temperature
            ));
            effects.sound(SoundCue::PowerOff);
            schedule.push(
                now + prefs.shutdown_delay(),
                Pending::Device {
                    id: device.id,
                    generation: device.generation,
                    completion: Completion::FinishShutdown,
                },
            );
        } else if device.temperature >= OVERHEAT_TEMPERATURE_C
            && device.transition(DeviceEvent::Overheat).is_ok()
        {
            warn!(device = %device.id, temp_c = %device.temperature, "Device overheating");
            effects.error(format!(
                "{}: overheating ({:.1}°C), hashing suspended",
                device.name, device.temperature
            ));
        }
    }

    if device.temperature >= MAX_TEMPERATURE_C
        && device.status == DeviceStatus::Overclocked
        && device.transition(DeviceEvent::DisableOverclock).is_ok()
    {
        effects.error(format!(
            "{}: overclock disabled due to overheating",
            device.name
        ));
    }

    if !prefs.prevent_errors {
        let roll = rng.next_f64();
        if roll > FAULT_THRESHOLD && device.transition(DeviceEvent::Fault).is_ok() {
            device.power = FAULT_POWER_W;
            warn!(device = %device.id, "Injected hardware fault");
            effects.error(format!("{}: hardware fault detected", device.name));
        }
    }

    thermal::apply_status_physics(device, rng, effects);

    if prefs.prevent_overheat {
        thermal::apply_soft_ceiling(device);
    }

    thermal::clamp(device);

    if !prefs.prevent_overheat
        && previous_temperature < MAX_TEMPERATURE_C
        && device.temperature >= MAX_TEMPERATURE_C
    {
        effects.sound(SoundCue::Overheat);
    }
}

impl Fleet {
    /// Apply one scheduled event that has come due.
    fn complete(
        &mut self,
        pending: Pending,
        prefs: &Preferences,
        now: Duration,
        effects: &mut Effects,
    ) {
        let (id, generation, completion) = match pending {
            Pending::EmergencyStop => {
                warn!("Emergency stop: shutting down all running devices");
                effects.extend(self.stop_all(prefs, now));
                effects.success("Emergency stop executed");
                return;
            }
            Pending::Device {
                id,
                generation,
                completion,
            } => (id, generation, completion),
        };

        let Some(device) = self.devices.iter_mut().find(|d| d.id == id) else {
            return;
        };

        if device.generation != generation {
            debug!(
                device = %id,
                completion = ?completion,
                "Dropping stale scheduled transition"
            );
            return;
        }

        let event = match completion {
            Completion::FinishBoot => DeviceEvent::BootComplete,
            Completion::FinishShutdown | Completion::FinishForceStop => {
                DeviceEvent::ShutdownComplete
            }
            Completion::SettleIdle => DeviceEvent::SettleIdle,
            Completion::SettleStandby => DeviceEvent::SettleStandby,
            Completion::Restart => DeviceEvent::Restart,
        };

        if completion == Completion::FinishForceStop {
            device.is_force_stopping = false;
        }

        if let Err(e) = device.transition(event) {
            warn!(device = %id, error = %e, "Scheduled transition no longer applies");
            return;
        }

        match completion {
            Completion::FinishBoot => {
                device.power = BOOT_POWER_W;
                device.hashrate = BOOT_HASHRATE;
                device.temperature += BOOT_HEAT_C;
            }
            Completion::FinishShutdown => {
                device.power = 0.0;
                device.hashrate = 0.0;
                device.temperature =
                    (device.temperature - SHUTDOWN_COOLING_C).max(AMBIENT_TEMPERATURE_C);
            }
            Completion::FinishForceStop => {
                device.power = 0.0;
                device.hashrate = 0.0;
            }
            Completion::Restart => {
                let generation = device.generation;
                self.schedule.push(
                    now + prefs.startup_delay(),
                    Pending::Device {
                        id,
                        generation,
                        completion: Completion::FinishBoot,
                    },
                );
            }
            Completion::SettleIdle | Completion::SettleStandby => {}
        }

        debug!(device = %id, completion = ?completion, "Scheduled transition applied");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceId, DeviceSeed, default_seeds, from_seeds};
    use crate::fleet::{FORCE_STOP_DELAY, NotificationLevel, PowerAction};
    use crate::random::{ConstantRandom, SeededRandom};

    const CALM: ConstantRandom = ConstantRandom(0.5);

    fn seed(status: DeviceStatus, temperature: f64, fan_speed: u8) -> DeviceSeed {
        DeviceSeed {
            name: "rig".into(),
            model: "Test".into(),
            status,
            hashrate: if status.produces_hashrate() { 100.0 } else { 0.0 },
            temperature,
            power: 3200.0,
            fan_speed,
            is_fan_on: fan_speed > 0,
            comment: String::new(),
        }
    }

    fn single(status: DeviceStatus, temperature: f64, fan_speed: u8) -> Fleet {
        Fleet::new(from_seeds(vec![seed(status, temperature, fan_speed)]))
    }

    fn first(fleet: &Fleet) -> &Device {
        &fleet.devices()[0]
    }

    /// Run ticks at 500 ms spacing starting after `start`, returning the
    /// fleet, the clock and all effects.
    fn run(
        mut fleet: Fleet,
        prefs: &Preferences,
        start: Duration,
        ticks: u32,
        rng: &mut impl RandomSource,
    ) -> (Fleet, Duration, Effects) {
        let mut now = start;
        let mut all = Effects::new();
        for _ in 0..ticks {
            now += TICK_INTERVAL;
            let out = step(&fleet, prefs, now, rng);
            fleet = out.fleet;
            all.extend(out.effects);
        }
        (fleet, now, all)
    }

    #[test]
    fn invariants_hold_over_long_random_run() {
        let prefs = Preferences::default();
        let mut fleet = Fleet::new(from_seeds(default_seeds()));
        let mut rng = SeededRandom::new(1234);
        let mut now = Duration::ZERO;

        for i in 0..2000u32 {
            now += TICK_INTERVAL;
            if i % 97 == 0 {
                let _ = fleet.toggle_power(DeviceId(i % 8 + 1), &prefs, now);
            }
            if i % 131 == 0 {
                let _ = fleet.toggle_fan(DeviceId(i % 8 + 1));
            }
            if i % 173 == 0 {
                let id = DeviceId(i % 8 + 1);
                let _ = fleet.power_action(id, PowerAction::ForceStop, &prefs, now);
            }
            if i % 211 == 0 {
                let id = DeviceId(i % 8 + 1);
                let _ = fleet.power_action(id, PowerAction::Stop, &prefs, now);
            }
            fleet = step(&fleet, &prefs, now, &mut rng).fleet;

            for d in fleet.devices() {
                assert!(d.temperature >= AMBIENT_TEMPERATURE_C, "{d:?}");
                assert!(d.power >= 0.0, "{d:?}");
                assert!(d.fan_speed <= 100, "{d:?}");
                if !d.status.produces_hashrate() {
                    assert_eq!(d.hashrate, 0.0, "{d:?}");
                }
                if !d.is_fan_on {
                    assert_eq!(d.fan_speed, 0, "{d:?}");
                }
            }
        }
    }

    #[test]
    fn seeded_runs_replay_identically() {
        let prefs = Preferences::default();
        let fleet = Fleet::new(from_seeds(default_seeds()));

        let (a, _, ea) = run(fleet.clone(), &prefs, Duration::ZERO, 200, &mut SeededRandom::new(9));
        let (b, _, eb) = run(fleet, &prefs, Duration::ZERO, 200, &mut SeededRandom::new(9));

        assert_eq!(a.devices(), b.devices());
        assert_eq!(ea, eb);
    }

    #[test]
    fn thermal_shutdown_then_offline_after_delay() {
        let prefs = Preferences::default();
        let mut fleet = single(DeviceStatus::Online, 114.0, 80);
        // Force the reading over the critical limit.
        fleet.devices[0].temperature = 116.0;

        let out = step(&fleet, &prefs, TICK_INTERVAL, &mut CALM);
        assert_eq!(first(&out.fleet).status, DeviceStatus::ShuttingDown);
        assert_eq!(out.effects.sounds(), vec![SoundCue::PowerOff]);
        assert!(
            out.effects
                .messages(NotificationLevel::Error)
                .iter()
                .any(|m| m.contains("emergency shutdown"))
        );

        let ticks = (prefs.shutdown_delay().as_millis() / TICK_INTERVAL.as_millis()) as u32;
        let (fleet, _, _) = run(out.fleet, &prefs, TICK_INTERVAL, ticks, &mut CALM);
        let device = first(&fleet);
        assert_eq!(device.status, DeviceStatus::Offline);
        assert_eq!(device.power, 0.0);
        assert_eq!(device.hashrate, 0.0);
        assert!(device.temperature <= 106.0);
    }

    #[test]
    fn overheat_above_hundred() {
        let fleet = single(DeviceStatus::Overclocked, 101.0, 100);
        let out = step(&fleet, &Preferences::default(), TICK_INTERVAL, &mut CALM);

        let device = first(&out.fleet);
        assert_eq!(device.status, DeviceStatus::Overheat);
        assert_eq!(device.hashrate, 0.0);
        assert_eq!(device.temperature, 99.5);
    }

    #[test]
    fn guard_suppresses_thermal_transitions() {
        let prefs = Preferences {
            prevent_overheat: true,
            ..Default::default()
        };
        let fleet = single(DeviceStatus::Online, 130.0, 100);

        let (fleet, _, effects) = run(fleet, &prefs, Duration::ZERO, 200, &mut CALM);

        let device = first(&fleet);
        assert_eq!(device.status, DeviceStatus::Online);
        assert!(device.temperature <= 70.0, "{}", device.temperature);
        assert!(effects.sounds().is_empty());
        assert!(effects.messages(NotificationLevel::Error).is_empty());
    }

    #[test]
    fn guard_pulls_down_once_above_soft_ceiling() {
        let prefs = Preferences {
            prevent_overheat: true,
            ..Default::default()
        };
        // No fan: the online drift alone would heat by 0.9 per tick.
        let fleet = single(DeviceStatus::Online, 80.0, 0);
        let out = step(&fleet, &prefs, TICK_INTERVAL, &mut CALM);
        assert!((first(&out.fleet).temperature - 79.9).abs() < 1e-9);
    }

    #[test]
    fn overclock_disabled_at_max_temperature() {
        let fleet = single(DeviceStatus::Overclocked, 86.0, 100);
        let out = step(&fleet, &Preferences::default(), TICK_INTERVAL, &mut CALM);

        assert_eq!(first(&out.fleet).status, DeviceStatus::Online);
        assert_eq!(
            out.effects.messages(NotificationLevel::Error),
            vec!["rig: overclock disabled due to overheating"]
        );
    }

    #[test]
    fn fault_injection_when_roll_exceeds_threshold() {
        let fleet = single(DeviceStatus::Online, 60.0, 80);
        let out = step(
            &fleet,
            &Preferences::default(),
            TICK_INTERVAL,
            &mut ConstantRandom(0.999),
        );

        let device = first(&out.fleet);
        assert_eq!(device.status, DeviceStatus::Error);
        assert_eq!(device.power, 50.0);
        assert_eq!(device.hashrate, 0.0);
    }

    #[test]
    fn no_faults_when_errors_prevented() {
        let prefs = Preferences {
            prevent_errors: true,
            ..Default::default()
        };
        let fleet = single(DeviceStatus::Online, 40.0, 80);
        let (fleet, _, _) = run(fleet, &prefs, Duration::ZERO, 50, &mut ConstantRandom(0.999));
        assert_eq!(first(&fleet).status, DeviceStatus::Online);
    }

    #[test]
    fn overheat_sound_once_per_crossing() {
        // Fan off: +0.9 per tick from 83.5 crosses 85 on the second tick.
        let fleet = single(DeviceStatus::Online, 83.5, 0);
        let prefs = Preferences {
            prevent_errors: true,
            ..Default::default()
        };

        let (_, _, effects) = run(fleet, &prefs, Duration::ZERO, 10, &mut CALM);
        assert_eq!(effects.sounds(), vec![SoundCue::Overheat]);
    }

    #[test]
    fn force_stop_holds_device_until_resolved() {
        let prefs = Preferences::default();
        let mut fleet = single(DeviceStatus::Online, 80.0, 0);
        fleet
            .power_action(DeviceId(1), PowerAction::ForceStop, &prefs, Duration::ZERO)
            .unwrap();
        let held = first(&fleet).clone();

        let ticks = (FORCE_STOP_DELAY.as_millis() / TICK_INTERVAL.as_millis()) as u32 - 1;
        let (fleet, now, _) = run(fleet, &prefs, Duration::ZERO, ticks, &mut CALM);
        assert_eq!(first(&fleet), &held);

        let out = step(&fleet, &prefs, now + TICK_INTERVAL, &mut CALM);
        let device = first(&out.fleet);
        assert_eq!(device.status, DeviceStatus::Offline);
        assert!(!device.is_force_stopping);
        assert_eq!(device.power, 0.0);
    }

    #[test]
    fn force_stopped_device_stops_hashing_at_once() {
        let prefs = Preferences::default();
        let mut fleet = single(DeviceStatus::Online, 60.0, 80);
        fleet
            .power_action(DeviceId(1), PowerAction::ForceStop, &prefs, Duration::ZERO)
            .unwrap();
        assert_eq!(first(&fleet).hashrate, 0.0);

        let out = step(&fleet, &prefs, TICK_INTERVAL, &mut CALM);
        let device = first(&out.fleet);
        assert_eq!(device.status, DeviceStatus::ShuttingDown);
        assert!(device.is_force_stopping);
        assert_eq!(device.hashrate, 0.0);
    }

    #[test]
    fn repeated_force_stop_keeps_device_held() {
        let prefs = Preferences::default();
        let mut fleet = single(DeviceStatus::Online, 60.0, 80);
        fleet
            .power_action(DeviceId(1), PowerAction::ForceStop, &prefs, Duration::ZERO)
            .unwrap();
        let (mut fleet, now, _) = run(fleet, &prefs, Duration::ZERO, 2, &mut CALM);
        fleet
            .power_action(DeviceId(1), PowerAction::ForceStop, &prefs, now)
            .unwrap();
        let held = first(&fleet).clone();

        // The first completion falls due at 1.5 s and must not release the hold.
        let (fleet, now, _) = run(fleet, &prefs, now, 2, &mut CALM);
        assert_eq!(first(&fleet), &held);

        let (fleet, _, _) = run(fleet, &prefs, now, 1, &mut CALM);
        let device = first(&fleet);
        assert_eq!(device.status, DeviceStatus::Offline);
        assert!(!device.is_force_stopping);
        assert_eq!(device.power, 0.0);
    }

    #[test]
    fn boot_completes_after_startup_delay() {
        let prefs = Preferences {
            prevent_errors: true,
            ..Default::default()
        };
        let mut fleet = single(DeviceStatus::Offline, 30.0, 0);
        fleet.toggle_power(DeviceId(1), &prefs, Duration::ZERO).unwrap();

        let ticks = (prefs.startup_delay().as_millis() / TICK_INTERVAL.as_millis()) as u32;
        let (fleet, _, _) = run(fleet.clone(), &prefs, Duration::ZERO, ticks - 1, &mut CALM);
        assert_eq!(first(&fleet).status, DeviceStatus::Booting);

        let (fleet, _, _) = run(fleet, &prefs, prefs.startup_delay() - TICK_INTERVAL, 1, &mut CALM);
        let device = first(&fleet);
        assert_eq!(device.status, DeviceStatus::Online);
        assert_eq!(device.hashrate, 100.0);
        assert!(device.power >= 3200.0);
    }

    #[test]
    fn stale_transition_does_not_overwrite_newer_action() {
        let prefs = Preferences {
            prevent_errors: true,
            startup_delay_secs: 3.0,
            shutdown_delay_secs: 2.0,
            ..Default::default()
        };
        let mut fleet = single(DeviceStatus::Offline, 30.0, 0);

        // Boot, then immediately force-stop before the boot completes.
        fleet.toggle_power(DeviceId(1), &prefs, Duration::ZERO).unwrap();
        fleet
            .power_action(
                DeviceId(1),
                PowerAction::ForceStop,
                &prefs,
                Duration::from_millis(500),
            )
            .unwrap();
        // Force-stop resolves at 2 s, then power it on again at 2.5 s.
        let (mut fleet, now, _) = run(fleet, &prefs, Duration::ZERO, 5, &mut CALM);
        assert_eq!(first(&fleet).status, DeviceStatus::Offline);
        fleet.toggle_power(DeviceId(1), &prefs, now).unwrap();

        // The first boot's completion (due at 3 s) must not bring it online.
        let (fleet, _, _) = run(fleet, &prefs, now, 2, &mut CALM);
        assert_eq!(first(&fleet).status, DeviceStatus::Booting);
    }

    #[test]
    fn reboot_runs_shutdown_then_boot() {
        let prefs = Preferences {
            prevent_errors: true,
            startup_delay_secs: 1.0,
            shutdown_delay_secs: 1.0,
            ..Default::default()
        };
        let mut fleet = single(DeviceStatus::Error, 60.0, 70);
        fleet
            .power_action(DeviceId(1), PowerAction::Reboot, &prefs, Duration::ZERO)
            .unwrap();

        let (fleet, now, _) = run(fleet, &prefs, Duration::ZERO, 2, &mut CALM);
        assert_eq!(first(&fleet).status, DeviceStatus::Booting);

        let (fleet, _, _) = run(fleet, &prefs, now, 2, &mut CALM);
        assert_eq!(first(&fleet).status, DeviceStatus::Online);
    }

    #[test]
    fn standby_action_settles_after_shutdown_delay() {
        let prefs = Preferences {
            prevent_errors: true,
            shutdown_delay_secs: 1.0,
            ..Default::default()
        };
        let mut fleet = single(DeviceStatus::Online, 60.0, 80);
        fleet
            .power_action(DeviceId(1), PowerAction::Standby, &prefs, Duration::ZERO)
            .unwrap();

        let (fleet, _, _) = run(fleet, &prefs, Duration::ZERO, 2, &mut CALM);
        assert_eq!(first(&fleet).status, DeviceStatus::Standby);
    }

    fn hot_fleet() -> Fleet {
        Fleet::new(from_seeds(
            (0..4)
                .map(|_| seed(DeviceStatus::Online, 95.0, 0))
                .collect(),
        ))
    }

    #[test]
    fn surcharge_countdown_announced_once() {
        let prefs = Preferences {
            prevent_errors: true,
            ..Default::default()
        };

        // Online with no fan heats 0.9 per tick; five ticks stay under 100.
        let (fleet, _, effects) = run(hot_fleet(), &prefs, Duration::ZERO, 5, &mut CALM);

        let countdowns: Vec<_> = effects
            .messages(NotificationLevel::Error)
            .into_iter()
            .filter(|m| m.contains("emergency stop in 10 seconds"))
            .collect();
        assert_eq!(countdowns.len(), 1);
        assert_eq!(
            fleet
                .pending()
                .iter()
                .filter(|e| e.pending == Pending::EmergencyStop)
                .count(),
            1
        );
    }

    #[test]
    fn emergency_stop_runs_after_ten_seconds() {
        let prefs = Preferences {
            prevent_errors: true,
            ..Default::default()
        };
        let out = step(&hot_fleet(), &prefs, TICK_INTERVAL, &mut CALM);
        assert_eq!(out.fleet.pending().len(), 1);

        let due = TICK_INTERVAL + EMERGENCY_STOP_DELAY;
        let out = step(&out.fleet, &prefs, due, &mut CALM);

        assert!(
            out.effects
                .messages(NotificationLevel::Success)
                .contains(&"Emergency stop executed")
        );
        assert!(
            out.fleet
                .devices()
                .iter()
                .all(|d| d.status == DeviceStatus::ShuttingDown)
        );
    }

    #[test]
    fn watchdog_stays_quiet_when_overheat_prevented() {
        let prefs = Preferences {
            prevent_overheat: true,
            prevent_errors: true,
            ..Default::default()
        };
        let (fleet, _, effects) = run(hot_fleet(), &prefs, Duration::ZERO, 3, &mut CALM);
        assert!(effects.messages(NotificationLevel::Error).is_empty());
        assert!(fleet.pending().is_empty());
    }
}
