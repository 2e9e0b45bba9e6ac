//! Daemon configuration from the environment.
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `ASIC_FLEET_API_ADDR` | API bind address | `127.0.0.1:6570` |
//! | `ASIC_FLEET_TICK_MS` | Simulator tick period (ms) | `500` |
//! | `ASIC_FLEET_RNG_SEED` | Seed for reproducible runs | OS entropy |
//! | `ASIC_FLEET_SEED_FILE` | JSON device list | built-in fleet |
//! | `ASIC_FLEET_PREVENT_OVERHEAT` | initial `preventOverheat` | `false` |
//! | `ASIC_FLEET_PREVENT_ERRORS` | initial `preventErrors` | `false` |
//! | `ASIC_FLEET_STARTUP_DELAY` | initial `startupDelay` (s) | `3` |
//! | `ASIC_FLEET_SHUTDOWN_DELAY` | initial `shutdownDelay` (s) | `2` |
//! | `ASIC_FLEET_SOUND_POWER_ON` | clip for the power-on cue | none |
//! | `ASIC_FLEET_SOUND_POWER_OFF` | clip for the power-off cue | none |
//! | `ASIC_FLEET_SOUND_OVERHEAT` | clip for the overheat cue | none |

use std::path::PathBuf;
use std::time::Duration;

use crate::api::server::ApiConfig;
use crate::error::{Error, Result};
use crate::fleet::{SoundCue, TICK_INTERVAL};
use crate::preferences::{PreferenceKey, Preferences};
use crate::sink::SoundBoard;

#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub api: ApiConfig,
    pub tick_interval: Duration,
    /// `None` seeds from OS entropy.
    pub rng_seed: Option<u64>,
    /// `None` uses the built-in fleet.
    pub seed_file: Option<PathBuf>,
    pub preferences: Preferences,
    pub sounds: SoundBoard,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            tick_interval: TICK_INTERVAL,
            rng_seed: None,
            seed_file: None,
            preferences: Preferences::default(),
            sounds: SoundBoard::new(),
        }
    }
}

impl FleetConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key-value source. Unset or empty
    /// variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(addr) = get("ASIC_FLEET_API_ADDR") {
            config.api.bind_addr = addr;
        }

        if let Some(ms) = get("ASIC_FLEET_TICK_MS") {
            let ms: u64 = parse(&ms, "ASIC_FLEET_TICK_MS")?;
            if ms == 0 {
                return Err(Error::Config("ASIC_FLEET_TICK_MS must be positive".into()));
            }
            config.tick_interval = Duration::from_millis(ms);
        }

        if let Some(seed) = get("ASIC_FLEET_RNG_SEED") {
            config.rng_seed = Some(parse(&seed, "ASIC_FLEET_RNG_SEED")?);
        }

        config.seed_file = get("ASIC_FLEET_SEED_FILE").map(PathBuf::from);

        for (var, key) in [
            ("ASIC_FLEET_PREVENT_OVERHEAT", PreferenceKey::PreventOverheat),
            ("ASIC_FLEET_PREVENT_ERRORS", PreferenceKey::PreventErrors),
            ("ASIC_FLEET_STARTUP_DELAY", PreferenceKey::StartupDelay),
            ("ASIC_FLEET_SHUTDOWN_DELAY", PreferenceKey::ShutdownDelay),
        ] {
            if let Some(value) = get(var) {
                config
                    .preferences
                    .set(key, &value)
                    .map_err(|e| Error::Config(format!("{var}: {e}")))?;
            }
        }

        for (var, cue) in [
            ("ASIC_FLEET_SOUND_POWER_ON", SoundCue::PowerOn),
            ("ASIC_FLEET_SOUND_POWER_OFF", SoundCue::PowerOff),
            ("ASIC_FLEET_SOUND_OVERHEAT", SoundCue::Overheat),
        ] {
            if let Some(path) = get(var) {
                config.sounds.assign(cue, path);
            }
        }

        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(value: &str, var: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{var}: cannot parse {value:?}")))
}
