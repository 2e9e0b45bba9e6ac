//! Delivery of simulator effects.
//!
//! The simulator only describes what should be shown or played. The
//! traits here are the seams where those descriptions leave the core:
//! a [`NotificationSink`] for operator messages and an [`AudioPlayer`]
//! for sound cues. Delivery is fire-and-forget; a sink that cannot do its
//! job logs a warning and carries on.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::api_client::types::NotificationEntry;
use crate::fleet::{Effect, Effects, NotificationLevel, SoundCue};
use crate::tracing::prelude::*;

/// Notifications kept by [`NotificationLog`].
pub const NOTIFICATION_LOG_CAPACITY: usize = 100;

pub trait NotificationSink: Send + Sync {
    fn report_error(&self, message: &str);
    fn report_success(&self, message: &str);
}

/// A sound clip assigned to a cue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundHandle {
    pub cue: SoundCue,
    pub path: PathBuf,
}

pub trait AudioPlayer: Send + Sync {
    /// Play `clip`. `None` means no clip is assigned and is a no-op.
    fn play(&self, clip: Option<&SoundHandle>);
}

/// Bounded in-memory notification history, shared between the runner
/// (which appends) and the API (which reads).
#[derive(Debug, Clone, Default)]
pub struct NotificationLog {
    inner: Arc<Mutex<LogInner>>,
}

#[derive(Debug, Default)]
struct LogInner {
    next_seq: u64,
    entries: VecDeque<NotificationEntry>,
}

impl NotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Oldest first.
    pub fn entries(&self) -> Vec<NotificationEntry> {
        self.inner.lock().entries.iter().cloned().collect()
    }

    fn push(&self, level: NotificationLevel, message: &str) {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        if inner.entries.len() == NOTIFICATION_LOG_CAPACITY {
            inner.entries.pop_front();
        }
        inner.entries.push_back(NotificationEntry {
            seq,
            level,
            message: message.to_string(),
        });
    }
}

impl NotificationSink for NotificationLog {
    fn report_error(&self, message: &str) {
        warn!(notification = message, "Error notification");
        self.push(NotificationLevel::Error, message);
    }

    fn report_success(&self, message: &str) {
        info!(notification = message, "Success notification");
        self.push(NotificationLevel::Success, message);
    }
}

/// Maps each cue to the clip assigned to it, if any.
#[derive(Debug, Clone, Default)]
pub struct SoundBoard {
    clips: HashMap<SoundCue, SoundHandle>,
}

impl SoundBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, cue: SoundCue, path: impl Into<PathBuf>) {
        self.clips.insert(
            cue,
            SoundHandle {
                cue,
                path: path.into(),
            },
        );
    }

    pub fn clip(&self, cue: SoundCue) -> Option<&SoundHandle> {
        self.clips.get(&cue)
    }
}

/// Audio player for a headless daemon: "playing" a clip means checking it
/// exists and logging it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingPlayer;

impl AudioPlayer for LoggingPlayer {
    fn play(&self, clip: Option<&SoundHandle>) {
        let Some(clip) = clip else {
            return;
        };
        if clip.path.is_file() {
            info!(cue = %clip.cue, path = %clip.path.display(), "Playing sound");
        } else {
            warn!(
                cue = %clip.cue,
                path = %clip.path.display(),
                "Sound clip not found, skipping"
            );
        }
    }
}

/// Everything effects are delivered to.
#[derive(Clone)]
pub struct Sinks {
    pub notifications: Arc<dyn NotificationSink>,
    pub sounds: SoundBoard,
    pub player: Arc<dyn AudioPlayer>,
}

impl Sinks {
    pub fn new(
        notifications: Arc<dyn NotificationSink>,
        sounds: SoundBoard,
        player: Arc<dyn AudioPlayer>,
    ) -> Self {
        Self {
            notifications,
            sounds,
            player,
        }
    }

    /// Deliver effects in the order they were produced.
    pub fn deliver(&self, effects: Effects) {
        for effect in effects {
            match effect {
                Effect::Notify(n) => match n.level {
                    NotificationLevel::Error => self.notifications.report_error(&n.message),
                    NotificationLevel::Success => self.notifications.report_success(&n.message),
                },
                Effect::Sound(cue) => self.player.play(self.sounds.clip(cue)),
            }
        }
    }
}
