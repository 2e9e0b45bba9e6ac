//! The fleet simulator.
//!
//! A [`Fleet`] holds the device collection together with the transitions
//! scheduled for later and the surcharge watchdog. [`step`] advances it by
//! one tick; the methods in `actions` apply operator commands. Neither
//! talks to the outside world: both return [`Effects`] for the caller to
//! deliver.

mod actions;
mod effects;
mod schedule;
mod simulator;
mod summary;
mod thermal;
mod watchdog;

use std::time::Duration;

pub use actions::{FORCE_STOP_DELAY, PowerAction};
pub use effects::{Effect, Effects, Notification, NotificationLevel, SoundCue};
pub use schedule::{Completion, Pending, Schedule, ScheduledEvent};
pub use simulator::{FAULT_THRESHOLD, Step, TICK_INTERVAL, step};
pub use summary::{FleetSummary, GlobalStatus, TempStatusLevel};
pub use thermal::{
    CRITICAL_TEMPERATURE_C, MAX_TEMPERATURE_C, OVERHEAT_TEMPERATURE_C, RECOVERY_TEMPERATURE_C,
    SOFT_CEILING_C,
};
pub use watchdog::{EMERGENCY_STOP_DELAY, SurchargeWatchdog, WatchdogStatus};

use crate::device::{Device, DeviceEvent, DeviceId};
use crate::error::{Error, Result};

/// Device collection plus everything the tick needs to carry between steps.
#[derive(Debug, Clone)]
pub struct Fleet {
    devices: Vec<Device>,
    schedule: Schedule,
    watchdog: SurchargeWatchdog,
}

impl Fleet {
    pub fn new(devices: Vec<Device>) -> Self {
        Self {
            devices,
            schedule: Schedule::new(),
            watchdog: SurchargeWatchdog::new(),
        }
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }

    /// Transitions waiting for their due time.
    pub fn pending(&self) -> &Schedule {
        &self.schedule
    }

    pub fn summary(&self) -> FleetSummary {
        FleetSummary::from_devices(&self.devices)
    }

    fn device_mut(&mut self, id: DeviceId) -> Result<&mut Device> {
        self.devices
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or(Error::UnknownDevice(id))
    }

    /// Move a device with `event` now and schedule `completion` after
    /// `delay`, tied to the device's new generation. A device leaving a
    /// hashing status stops hashing immediately.
    fn begin(
        &mut self,
        id: DeviceId,
        event: DeviceEvent,
        completion: Completion,
        delay: Duration,
        now: Duration,
    ) -> Result<()> {
        let device = self.device_mut(id)?;
        device
            .transition(event)
            .map_err(|source| Error::Transition { device: id, source })?;
        if !device.status.produces_hashrate() {
            device.hashrate = 0.0;
        }
        let generation = device.generation;

        self.schedule.push(
            now + delay,
            Pending::Device {
                id,
                generation,
                completion,
            },
        );
        Ok(())
    }
}
