//! Command types sent from API handlers to the fleet runner.
//!
//! Each command carries a oneshot reply channel so the handler can
//! await the result and translate it into an HTTP response. The runner
//! publishes a fresh snapshot before it replies, so a handler that reads
//! the snapshot after a successful reply sees the command's effect.

use tokio::sync::oneshot;

use crate::device::DeviceId;
use crate::error::Result;
use crate::fleet::PowerAction;
use crate::preferences::PreferencesPatch;

pub type Reply = oneshot::Sender<Result<()>>;

/// Commands from the API to the runner.
#[derive(Debug)]
pub enum FleetCommand {
    /// Boot a powered-down device or shut down a running one.
    TogglePower { id: DeviceId, reply: Reply },

    /// Flip the fan switch.
    ToggleFan { id: DeviceId, reply: Reply },

    /// Switch between online and overclocked.
    ToggleOverclock { id: DeviceId, reply: Reply },

    /// Run a named power action on one device.
    PowerAction {
        id: DeviceId,
        action: PowerAction,
        reply: Reply,
    },

    /// Boot every offline device.
    StartAll { reply: Reply },

    /// Shut down every running device.
    StopAll { reply: Reply },

    /// Apply several preference changes at once.
    UpdatePreferences {
        patch: PreferencesPatch,
        reply: Reply,
    },

    /// Set one preference by its string identifier.
    SetPreference {
        key: String,
        value: String,
        reply: Reply,
    },
}
