//! Pending transitions, stored with the fleet and applied by the tick.
//!
//! Delayed follow-ups (boot finishing, ramp-down finishing, the
//! emergency stop) are data rather than timers. The tick takes every
//! event that has come due and applies it as part of its own state
//! transition, so a follow-up can never race the tick.

use std::time::Duration;

use crate::device::DeviceId;

/// How a device finishes a transition that was started earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Booting → online.
    FinishBoot,
    /// Shutting down → offline.
    FinishShutdown,
    /// Booting or shutting down → idle.
    SettleIdle,
    /// Booting or shutting down → standby.
    SettleStandby,
    /// Shutting down → booting, then online after the startup delay.
    Restart,
    /// Resolve a force-stop to offline and release the tick guard.
    FinishForceStop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pending {
    Device {
        id: DeviceId,
        /// Device generation when scheduled.
        generation: u64,
        completion: Completion,
    },
    /// Fleet-wide stop requested by the surcharge watchdog.
    EmergencyStop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledEvent {
    /// Simulation time at which the event applies.
    pub due_at: Duration,
    pub pending: Pending,
}

/// Scheduled events ordered by due time, FIFO among equal times.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    events: Vec<ScheduledEvent>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, due_at: Duration, pending: Pending) {
        let at = self.events.partition_point(|e| e.due_at <= due_at);
        self.events.insert(at, ScheduledEvent { due_at, pending });
    }

    /// Remove and return every event due at or before `now`, in due order.
    pub fn take_due(&mut self, now: Duration) -> Vec<ScheduledEvent> {
        let due = self.events.partition_point(|e| e.due_at <= now);
        self.events.drain(..due).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScheduledEvent> {
        self.events.iter()
    }
}
