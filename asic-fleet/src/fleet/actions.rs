//! Operator actions.
//!
//! Each action changes a device's status immediately and, where the real
//! hardware would take time, schedules the follow-up transition. Sounds
//! and notifications are emitted when the action is invoked, not when the
//! follow-up lands.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use utoipa::ToSchema;

use super::{Completion, Effects, Fleet, SoundCue};
use crate::device::{DeviceEvent, DeviceId, DeviceStatus, TransitionError};
use crate::error::{Error, Result};
use crate::preferences::Preferences;
use crate::tracing::prelude::*;

/// Time a force-stop takes to resolve, regardless of preferences.
pub const FORCE_STOP_DELAY: Duration = Duration::from_millis(1500);

/// Power actions available on a single device.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum PowerAction {
    Idle,
    Standby,
    Stop,
    Reboot,
    ForceStop,
    StartMining,
}

impl Fleet {
    /// Shut a running device down, or boot a powered-down one.
    pub fn toggle_power(
        &mut self,
        id: DeviceId,
        prefs: &Preferences,
        now: Duration,
    ) -> Result<Effects> {
        let status = self.status_of(id)?;
        let mut effects = Effects::new();

        if status.is_running() {
            self.begin(
                id,
                DeviceEvent::PowerOff,
                Completion::FinishShutdown,
                prefs.shutdown_delay(),
                now,
            )?;
            effects.sound(SoundCue::PowerOff);
        } else {
            self.begin(
                id,
                DeviceEvent::PowerOn,
                Completion::FinishBoot,
                prefs.startup_delay(),
                now,
            )?;
            effects.sound(SoundCue::PowerOn);
        }

        debug!(device = %id, from = %status, "Power toggled");
        Ok(effects)
    }

    /// Run one of the named power actions on a device.
    pub fn power_action(
        &mut self,
        id: DeviceId,
        action: PowerAction,
        prefs: &Preferences,
        now: Duration,
    ) -> Result<Effects> {
        let status = self.status_of(id)?;
        let name = self.name_of(id);
        let mut effects = Effects::new();

        let (cue, message) = match action {
            PowerAction::StartMining => {
                self.boot(id, Completion::FinishBoot, prefs, now)?;
                (SoundCue::PowerOn, "starting mining")
            }

            PowerAction::Stop => {
                self.shut_down(id, Completion::FinishShutdown, prefs, now)?;
                (SoundCue::PowerOff, "stopping")
            }

            PowerAction::Idle | PowerAction::Standby => {
                let (target, settle, completion, message) = if action == PowerAction::Idle {
                    (
                        DeviceStatus::Idle,
                        DeviceEvent::SettleIdle,
                        Completion::SettleIdle,
                        "entering idle mode",
                    )
                } else {
                    (
                        DeviceStatus::Standby,
                        DeviceEvent::SettleStandby,
                        Completion::SettleStandby,
                        "entering standby",
                    )
                };

                if status == target {
                    return Err(Error::Transition {
                        device: id,
                        source: TransitionError {
                            from: status,
                            event: settle,
                        },
                    });
                } else if status == DeviceStatus::Offline {
                    self.boot(id, completion, prefs, now)?;
                    (SoundCue::PowerOn, message)
                } else {
                    self.shut_down(id, completion, prefs, now)?;
                    (SoundCue::PowerOff, message)
                }
            }

            PowerAction::Reboot => {
                if status == DeviceStatus::Offline {
                    self.boot(id, Completion::FinishBoot, prefs, now)?;
                    (SoundCue::PowerOn, "rebooting")
                } else {
                    self.shut_down(id, Completion::Restart, prefs, now)?;
                    (SoundCue::PowerOff, "rebooting")
                }
            }

            PowerAction::ForceStop => {
                self.begin(
                    id,
                    DeviceEvent::ForceStop,
                    Completion::FinishForceStop,
                    FORCE_STOP_DELAY,
                    now,
                )?;
                self.device_mut(id)?.is_force_stopping = true;
                (SoundCue::PowerOff, "force stopped")
            }
        };

        effects.sound(cue);
        effects.success(format!("{name}: {message}"));
        info!(device = %id, %action, from = %status, "Power action");
        Ok(effects)
    }

    /// Flip the fan switch. Turning it off also zeroes the speed; the tick
    /// regulates the speed once it is back on.
    pub fn toggle_fan(&mut self, id: DeviceId) -> Result<Effects> {
        let device = self.device_mut(id)?;
        device.is_fan_on = !device.is_fan_on;
        if !device.is_fan_on {
            device.fan_speed = 0;
        }
        debug!(device = %id, fan_on = device.is_fan_on, "Fan toggled");
        Ok(Effects::new())
    }

    /// Switch between online and overclocked.
    pub fn toggle_overclock(&mut self, id: DeviceId) -> Result<Effects> {
        let device = self.device_mut(id)?;
        let event = if device.status == DeviceStatus::Overclocked {
            DeviceEvent::DisableOverclock
        } else {
            DeviceEvent::EnableOverclock
        };
        device
            .transition(event)
            .map_err(|source| Error::Transition { device: id, source })?;
        debug!(device = %id, status = %device.status, "Overclock toggled");
        Ok(Effects::new())
    }

    /// Boot every offline device. One sound for the whole batch.
    pub fn start_all(&mut self, prefs: &Preferences, now: Duration) -> Effects {
        let ids = self.ids_where(|s| s == DeviceStatus::Offline);
        let mut effects = Effects::new();

        let mut started = 0;
        for id in ids {
            match self.boot(id, Completion::FinishBoot, prefs, now) {
                Ok(()) => started += 1,
                Err(e) => warn!(error = %e, "Start all skipped a device"),
            }
        }

        if started > 0 {
            effects.sound(SoundCue::PowerOn);
            effects.success(format!("Starting {started} device(s)"));
        }
        effects
    }

    /// Shut down every running device. One sound for the whole batch.
    pub fn stop_all(&mut self, prefs: &Preferences, now: Duration) -> Effects {
        let ids = self.ids_where(DeviceStatus::is_running);
        let mut effects = Effects::new();

        let mut stopped = 0;
        for id in ids {
            match self.shut_down(id, Completion::FinishShutdown, prefs, now) {
                Ok(()) => stopped += 1,
                Err(e) => warn!(error = %e, "Stop all skipped a device"),
            }
        }

        if stopped > 0 {
            effects.sound(SoundCue::PowerOff);
            effects.success(format!("Stopping {stopped} device(s)"));
        }
        effects
    }

    fn boot(
        &mut self,
        id: DeviceId,
        completion: Completion,
        prefs: &Preferences,
        now: Duration,
    ) -> Result<()> {
        self.begin(
            id,
            DeviceEvent::PowerOn,
            completion,
            prefs.startup_delay(),
            now,
        )
    }

    fn shut_down(
        &mut self,
        id: DeviceId,
        completion: Completion,
        prefs: &Preferences,
        now: Duration,
    ) -> Result<()> {
        self.begin(
            id,
            DeviceEvent::PowerOff,
            completion,
            prefs.shutdown_delay(),
            now,
        )
    }

    fn status_of(&self, id: DeviceId) -> Result<DeviceStatus> {
        self.device(id)
            .map(|d| d.status)
            .ok_or(Error::UnknownDevice(id))
    }

    fn name_of(&self, id: DeviceId) -> String {
        self.device(id).map(|d| d.name.clone()).unwrap_or_default()
    }

    fn ids_where(&self, pred: impl Fn(DeviceStatus) -> bool) -> Vec<DeviceId> {
        self.devices
            .iter()
            .filter(|d| pred(d.status))
            .map(|d| d.id)
            .collect()
    }
}
