//! The task that owns the fleet.
//!
//! [`FleetRunner`] is the only place the fleet is mutated. A single
//! `select!` loop serializes simulator ticks and operator commands, hands
//! the resulting effects to the sinks, and publishes an immutable
//! [`FleetSnapshot`] after each of them for readers.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::commands::{FleetCommand, Reply};
use crate::api_client::types::FleetSnapshot;
use crate::error::Result;
use crate::fleet::{self, Effects, Fleet, Step, TICK_INTERVAL};
use crate::preferences::Preferences;
use crate::random::RandomSource;
use crate::sink::Sinks;
use crate::tracing::prelude::*;

pub struct FleetRunner {
    fleet: Fleet,
    preferences: Preferences,
    rng: Box<dyn RandomSource + Send>,
    sinks: Sinks,
    tick_interval: Duration,
    started: Instant,
    command_rx: mpsc::Receiver<FleetCommand>,
    snapshot_tx: watch::Sender<FleetSnapshot>,
}

impl FleetRunner {
    pub fn new(
        fleet: Fleet,
        preferences: Preferences,
        rng: Box<dyn RandomSource + Send>,
        sinks: Sinks,
        command_rx: mpsc::Receiver<FleetCommand>,
        snapshot_tx: watch::Sender<FleetSnapshot>,
    ) -> Self {
        Self {
            fleet,
            preferences,
            rng,
            sinks,
            tick_interval: TICK_INTERVAL,
            started: Instant::now(),
            command_rx,
            snapshot_tx,
        }
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    /// Snapshot of the initial state, for seeding the watch channel.
    pub fn initial_snapshot(fleet: &Fleet, preferences: &Preferences) -> FleetSnapshot {
        FleetSnapshot::new(fleet, preferences, Duration::ZERO)
    }

    pub async fn run(mut self, cancellation: CancellationToken) {
        let start = Instant::now();
        self.started = start;
        let mut interval = tokio::time::interval_at(start + self.tick_interval, self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            devices = self.fleet.devices().len(),
            tick_ms = self.tick_interval.as_millis() as u64,
            "Fleet runner started"
        );
        self.publish();

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    break;
                }
                _ = interval.tick() => {
                    self.tick();
                }
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle(command),
                    None => {
                        debug!("Command channel closed");
                        cancellation.cancelled().await;
                        break;
                    }
                },
            }
        }

        debug!("Fleet runner stopped");
    }

    /// Simulation clock: time since the runner started.
    fn now(&self) -> Duration {
        self.started.elapsed()
    }

    fn tick(&mut self) {
        let now = self.now();
        let Step { fleet, effects } =
            fleet::step(&self.fleet, &self.preferences, now, self.rng.as_mut());
        self.fleet = fleet;
        trace!(now_ms = now.as_millis() as u64, "Tick");
        self.sinks.deliver(effects);
        self.publish();
    }

    fn handle(&mut self, command: FleetCommand) {
        let now = self.now();
        let prefs = self.preferences;

        match command {
            FleetCommand::TogglePower { id, reply } => {
                let result = self.fleet.toggle_power(id, &prefs, now);
                self.finish(result, reply);
            }
            FleetCommand::ToggleFan { id, reply } => {
                let result = self.fleet.toggle_fan(id);
                self.finish(result, reply);
            }
            FleetCommand::ToggleOverclock { id, reply } => {
                let result = self.fleet.toggle_overclock(id);
                self.finish(result, reply);
            }
            FleetCommand::PowerAction { id, action, reply } => {
                let result = self.fleet.power_action(id, action, &prefs, now);
                self.finish(result, reply);
            }
            FleetCommand::StartAll { reply } => {
                let effects = self.fleet.start_all(&prefs, now);
                self.finish(Ok(effects), reply);
            }
            FleetCommand::StopAll { reply } => {
                let effects = self.fleet.stop_all(&prefs, now);
                self.finish(Ok(effects), reply);
            }
            FleetCommand::UpdatePreferences { patch, reply } => {
                let result = self.preferences.apply(&patch).map(|()| Effects::new());
                self.log_preferences(&result);
                self.finish(result, reply);
            }
            FleetCommand::SetPreference { key, value, reply } => {
                let result = self
                    .preferences
                    .set_by_name(&key, &value)
                    .map(|()| Effects::new());
                self.log_preferences(&result);
                self.finish(result, reply);
            }
        }
    }

    fn log_preferences(&self, result: &Result<Effects>) {
        if result.is_ok() {
            info!(preferences = ?self.preferences, "Preferences updated");
        }
    }

    /// Deliver effects, publish, then reply.
    fn finish(&mut self, result: Result<Effects>, reply: Reply) {
        let result = match result {
            Ok(effects) => {
                self.sinks.deliver(effects);
                self.publish();
                Ok(())
            }
            Err(e) => {
                debug!(error = %e, "Command rejected");
                Err(e)
            }
        };

        if reply.send(result).is_err() {
            debug!("Command reply receiver dropped");
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(FleetSnapshot::new(
            &self.fleet,
            &self.preferences,
            self.now(),
        ));
    }
}
