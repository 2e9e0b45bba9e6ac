//! Daemon lifecycle for asic-fleetd.
//!
//! Builds the fleet from its seed, starts the runner and the API server,
//! then waits for a signal and shuts both down cooperatively.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal::unix::{self, SignalKind};
use tokio::sync::{mpsc, watch};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::api;
use crate::config::FleetConfig;
use crate::device::{self, Device};
use crate::fleet::Fleet;
use crate::random::{RandomSource, SeededRandom};
use crate::runner::FleetRunner;
use crate::sink::{LoggingPlayer, NotificationLog, Sinks};
use crate::tracing::prelude::*;

/// Capacity of the API-to-runner command channel.
const COMMAND_CHANNEL_CAPACITY: usize = 32;

pub struct Daemon {
    config: FleetConfig,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Daemon {
    pub fn new(config: FleetConfig) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Run the daemon until SIGINT or SIGTERM.
    pub async fn run(self) -> anyhow::Result<()> {
        let devices = self.load_devices()?;
        let fleet = Fleet::new(devices);
        let preferences = self.config.preferences;

        let rng: Box<dyn RandomSource + Send> = match self.config.rng_seed {
            Some(seed) => {
                info!(seed, "Using seeded random source");
                Box::new(SeededRandom::new(seed))
            }
            None => Box::new(SeededRandom::from_entropy()),
        };

        let notifications = NotificationLog::new();
        let sinks = Sinks::new(
            Arc::new(notifications.clone()),
            self.config.sounds.clone(),
            Arc::new(LoggingPlayer),
        );

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (snapshot_tx, snapshot_rx) =
            watch::channel(FleetRunner::initial_snapshot(&fleet, &preferences));

        let runner = FleetRunner::new(fleet, preferences, rng, sinks, command_rx, snapshot_tx)
            .with_tick_interval(self.config.tick_interval);
        self.tracker.spawn(runner.run(self.shutdown.clone()));

        self.tracker.spawn({
            let config = self.config.api.clone();
            let shutdown = self.shutdown.clone();
            async move {
                if let Err(e) = api::serve(
                    config,
                    shutdown.clone(),
                    snapshot_rx,
                    command_tx,
                    notifications,
                )
                .await
                {
                    error!("API server failed: {e:#}");
                    shutdown.cancel();
                }
            }
        });
        self.tracker.close();

        info!("Started.");

        let mut sigint = unix::signal(SignalKind::interrupt())?;
        let mut sigterm = unix::signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT");
            },
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            },
            _ = self.shutdown.cancelled() => {}
        }

        trace!("Shutting down.");
        self.shutdown.cancel();
        self.tracker.wait().await;
        info!("Exiting.");

        Ok(())
    }

    fn load_devices(&self) -> anyhow::Result<Vec<Device>> {
        let seeds = match &self.config.seed_file {
            Some(path) => {
                let seeds = device::load_seeds(path)
                    .with_context(|| format!("failed to load seed file {}", path.display()))?;
                info!(path = %path.display(), devices = seeds.len(), "Loaded device seeds");
                seeds
            }
            None => device::default_seeds(),
        };
        Ok(device::from_seeds(seeds))
    }
}
