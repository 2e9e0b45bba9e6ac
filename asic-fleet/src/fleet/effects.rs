//! Side effects produced by the simulator.
//!
//! The simulator never talks to a notification or audio system directly.
//! It returns a list of [`Effect`] values and the caller decides how to
//! deliver them.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Error,
    Success,
}

/// A human-readable message for the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

/// Named sound cues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum SoundCue {
    PowerOn,
    PowerOff,
    Overheat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Notify(Notification),
    Sound(SoundCue),
}

/// Ordered list of effects collected during one step or action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Effects(Vec<Effect>);

impl Effects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.0.push(Effect::Notify(Notification {
            level: NotificationLevel::Error,
            message: message.into(),
        }));
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.0.push(Effect::Notify(Notification {
            level: NotificationLevel::Success,
            message: message.into(),
        }));
    }

    pub fn sound(&mut self, cue: SoundCue) {
        self.0.push(Effect::Sound(cue));
    }

    pub fn extend(&mut self, other: Effects) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Effect> {
        self.0.iter()
    }

    /// Notifications at `level`, in order.
    pub fn messages(&self, level: NotificationLevel) -> Vec<&str> {
        self.0
            .iter()
            .filter_map(|e| match e {
                Effect::Notify(n) if n.level == level => Some(n.message.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Sound cues, in order.
    pub fn sounds(&self) -> Vec<SoundCue> {
        self.0
            .iter()
            .filter_map(|e| match e {
                Effect::Sound(cue) => Some(*cue),
                _ => None,
            })
            .collect()
    }
}

impl IntoIterator for Effects {
    type Item = Effect;
    type IntoIter = std::vec::IntoIter<Effect>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
