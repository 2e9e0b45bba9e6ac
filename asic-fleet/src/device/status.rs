use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use thiserror::Error;
use utoipa::ToSchema;

/// Operating status of a simulated device.
///
/// Exactly one status applies at a time and it drives all per-tick
/// behavior. Status changes go through [`DeviceStatus::on`], which is the
/// single transition table for the whole fleet.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum DeviceStatus {
    Online,
    Offline,
    Booting,
    ShuttingDown,
    Error,
    Standby,
    Idle,
    Overclocked,
    Overheat,
}

/// Something that happens to a device and may move it to a new status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum DeviceEvent {
    PowerOn,
    BootComplete,
    PowerOff,
    ShutdownComplete,
    /// Ramp-down finished and the device restarts (reboot).
    Restart,
    SettleIdle,
    SettleStandby,
    EnableOverclock,
    DisableOverclock,
    Overheat,
    Recover,
    Fault,
    ThermalShutdown,
    ForceStop,
}

/// The event is not legal from the current status.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot {event} while {from}")]
pub struct TransitionError {
    pub from: DeviceStatus,
    pub event: DeviceEvent,
}

impl DeviceStatus {
    /// Look up the status that `event` leads to, if the transition is legal.
    pub fn next(self, event: DeviceEvent) -> Option<DeviceStatus> {
        use DeviceEvent as E;
        use DeviceStatus as S;

        match (self, event) {
            (S::Offline | S::Idle | S::Standby, E::PowerOn) => Some(S::Booting),
            (S::Booting, E::BootComplete) => Some(S::Online),

            (
                S::Online | S::Overclocked | S::Overheat | S::Idle | S::Standby | S::Error,
                E::PowerOff,
            ) => Some(S::ShuttingDown),
            (S::ShuttingDown, E::ShutdownComplete) => Some(S::Offline),
            (S::ShuttingDown, E::Restart) => Some(S::Booting),

            (S::Booting | S::ShuttingDown, E::SettleIdle) => Some(S::Idle),
            (S::Booting | S::ShuttingDown, E::SettleStandby) => Some(S::Standby),

            (S::Online, E::EnableOverclock) => Some(S::Overclocked),
            (S::Overclocked, E::DisableOverclock) => Some(S::Online),

            (S::Online | S::Overclocked, E::Overheat) => Some(S::Overheat),
            (S::Overheat, E::Recover) => Some(S::Online),
            (S::Online | S::Overclocked, E::Fault) => Some(S::Error),

            (S::Offline | S::ShuttingDown, E::ThermalShutdown) => None,
            (_, E::ThermalShutdown) => Some(S::ShuttingDown),

            (S::Offline, E::ForceStop) => None,
            (_, E::ForceStop) => Some(S::ShuttingDown),

            _ => None,
        }
    }

    /// Like [`next`](Self::next), but reports an illegal transition as an error.
    pub fn on(self, event: DeviceEvent) -> Result<DeviceStatus, TransitionError> {
        self.next(event)
            .ok_or(TransitionError { from: self, event })
    }

    /// Powered and mining: the statuses a power toggle shuts down.
    pub fn is_running(self) -> bool {
        matches!(
            self,
            DeviceStatus::Online | DeviceStatus::Overclocked | DeviceStatus::Overheat
        )
    }

    /// Counted as active in fleet aggregates.
    pub fn is_active(self) -> bool {
        matches!(self, DeviceStatus::Online | DeviceStatus::Overclocked)
    }

    /// Statuses allowed to report a nonzero hashrate.
    pub fn produces_hashrate(self) -> bool {
        matches!(
            self,
            DeviceStatus::Online | DeviceStatus::Overclocked | DeviceStatus::Idle
        )
    }
}
