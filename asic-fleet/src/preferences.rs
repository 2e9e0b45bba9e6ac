//! User preferences that alter simulator behavior.
//!
//! Each preference is addressed by a fixed string identifier so it can be
//! read and written independently, the way a key-value preference store
//! exposes it.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::error::{Error, Result};

/// Identifier of a single preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "camelCase")]
pub enum PreferenceKey {
    PreventOverheat,
    PreventErrors,
    StartupDelay,
    ShutdownDelay,
}

/// Simulator knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Preferences {
    /// Replace hard thermal shutdowns with a soft temperature ceiling.
    pub prevent_overheat: bool,
    /// Disable random fault injection.
    pub prevent_errors: bool,
    /// Seconds a device spends booting before it comes online.
    pub startup_delay_secs: f64,
    /// Seconds a device spends shutting down before it goes offline.
    pub shutdown_delay_secs: f64,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            prevent_overheat: false,
            prevent_errors: false,
            startup_delay_secs: 3.0,
            shutdown_delay_secs: 2.0,
        }
    }
}

/// Partial update; `None` leaves the field unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PreferencesPatch {
    pub prevent_overheat: Option<bool>,
    pub prevent_errors: Option<bool>,
    pub startup_delay_secs: Option<f64>,
    pub shutdown_delay_secs: Option<f64>,
}

impl Preferences {
    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs_f64(self.startup_delay_secs)
    }

    pub fn shutdown_delay(&self) -> Duration {
        Duration::from_secs_f64(self.shutdown_delay_secs)
    }

    /// Read a preference as its string form.
    pub fn get(&self, key: PreferenceKey) -> String {
        match key {
            PreferenceKey::PreventOverheat => self.prevent_overheat.to_string(),
            PreferenceKey::PreventErrors => self.prevent_errors.to_string(),
            PreferenceKey::StartupDelay => self.startup_delay_secs.to_string(),
            PreferenceKey::ShutdownDelay => self.shutdown_delay_secs.to_string(),
        }
    }

    /// Parse `value` and store it under `key`. Nothing changes on error.
    pub fn set(&mut self, key: PreferenceKey, value: &str) -> Result<()> {
        let invalid = || Error::InvalidPreference {
            key: key.to_string(),
            value: value.to_string(),
        };
        let value = value.trim();

        match key {
            PreferenceKey::PreventOverheat => {
                self.prevent_overheat = value.parse().map_err(|_| invalid())?
            }
            PreferenceKey::PreventErrors => {
                self.prevent_errors = value.parse().map_err(|_| invalid())?
            }
            PreferenceKey::StartupDelay => {
                self.startup_delay_secs = parse_delay(value).ok_or_else(invalid)?
            }
            PreferenceKey::ShutdownDelay => {
                self.shutdown_delay_secs = parse_delay(value).ok_or_else(invalid)?
            }
        }
        Ok(())
    }

    /// Set by string identifier, e.g. `"preventOverheat"`.
    pub fn set_by_name(&mut self, key: &str, value: &str) -> Result<()> {
        let key =
            PreferenceKey::from_str(key).map_err(|_| Error::UnknownPreference(key.to_string()))?;
        self.set(key, value)
    }

    /// Apply a patch atomically: either every field is valid or nothing changes.
    pub fn apply(&mut self, patch: &PreferencesPatch) -> Result<()> {
        let mut next = *self;
        if let Some(v) = patch.prevent_overheat {
            next.prevent_overheat = v;
        }
        if let Some(v) = patch.prevent_errors {
            next.prevent_errors = v;
        }
        if let Some(v) = patch.startup_delay_secs {
            next.set(PreferenceKey::StartupDelay, &v.to_string())?;
        }
        if let Some(v) = patch.shutdown_delay_secs {
            next.set(PreferenceKey::ShutdownDelay, &v.to_string())?;
        }
        *self = next;
        Ok(())
    }
}

/// Longest accepted startup or shutdown delay (s).
const MAX_DELAY_SECS: f64 = 3600.0;

fn parse_delay(value: &str) -> Option<f64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|secs| (0.0..=MAX_DELAY_SECS).contains(secs))
}
