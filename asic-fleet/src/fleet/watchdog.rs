//! One-shot announcement of a fleet-wide surcharge episode.
//!
//! # State Machine
//!
//! ```text
//!          check(true)
//!  Idle ──────────────► Announced
//!   ▲                      │
//!   │     check(false)     │
//!   └──────────────────────┘
//! ```
//!
//! - **Idle:** The fleet is not in surcharge. Waiting for trouble.
//! - **Announced:** The countdown to an emergency stop has been
//!   announced for this episode. Stays here until the condition clears.
//!
//! `check()` returns a [`WatchdogStatus`] describing the transition so the
//! simulator can act on exactly the edges it cares about: it announces
//! and schedules the stop on `Triggered` and re-arms on `Resolved`.

use std::time::Duration;

/// Delay between the surcharge announcement and the emergency stop.
pub const EMERGENCY_STOP_DELAY: Duration = Duration::from_secs(10);

/// Result of [`SurchargeWatchdog::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogStatus {
    /// Condition is false. Nothing to do.
    Idle,

    /// Condition just became true. Returned exactly once per episode.
    Triggered,

    /// Already announced, condition still true. Suppressed.
    Active,

    /// Was announced, condition just cleared. Returned exactly once.
    Resolved,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum State {
    #[default]
    Idle,
    Announced,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurchargeWatchdog {
    state: State,
}

impl SurchargeWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update with the current condition (fleet in surcharge and thermal
    /// shutdowns not suppressed).
    ///
    /// | Previous state | condition | Result |
    /// |----------------|-----------|--------|
    /// | Idle | false | `Idle` |
    /// | Idle | true | `Triggered` |
    /// | Announced | true | `Active` |
    /// | Announced | false | `Resolved` (re-arms) |
    pub fn check(&mut self, condition: bool) -> WatchdogStatus {
        match (self.state, condition) {
            (State::Idle, false) => WatchdogStatus::Idle,
            (State::Idle, true) => {
                self.state = State::Announced;
                WatchdogStatus::Triggered
            }
            (State::Announced, true) => WatchdogStatus::Active,
            (State::Announced, false) => {
                self.state = State::Idle;
                WatchdogStatus::Resolved
            }
        }
    }

    pub fn is_announced(&self) -> bool {
        self.state == State::Announced
    }
}
