//! Status indicator contract
//!
//! Maps a saver's [`SaveSnapshot`] to what the admin UI shows next to the
//! field. The only state kept here is the fade of the `saved` confirmation,
//! which never feeds back into the saver's own status.

use crate::saver::Autosave;
use crate::types::{AutosaveConfig, SaveSnapshot, SaveStatus};
use chrono::{DateTime, Local, Utc};
use std::time::{Duration, Instant};

pub const SAVED_LABEL: &str = "Saved";
pub const UNSAVED_LABEL: &str = "Unsaved";
pub const SAVING_LABEL: &str = "Saving...";
pub const ERROR_LABEL: &str = "Error";
pub const RETRY_LABEL: &str = "Retry";

/// What to show for a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Affordance {
    /// Nothing
    Hidden,
    /// Subtle pulsing marker, text only for screen readers
    Unsaved,
    /// Transient spinner
    InProgress,
    /// Confirmation, hidden again after the fade delay
    Saved { label: String },
    /// Persistent error with a retry action
    Failed { message: String, retry: bool },
}

impl Affordance {
    /// Static mapping, ignoring the saved fade
    #[must_use]
    pub fn for_status(status: SaveStatus) -> Self {
        match status {
            SaveStatus::Idle => Self::Hidden,
            SaveStatus::Dirty => Self::Unsaved,
            SaveStatus::Saving => Self::InProgress,
            SaveStatus::Saved => Self::Saved {
                label: SAVED_LABEL.to_string(),
            },
            SaveStatus::Error => Self::Failed {
                message: ERROR_LABEL.to_string(),
                retry: true,
            },
        }
    }

    /// Accessible text
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Hidden => None,
            Self::Unsaved => Some(UNSAVED_LABEL),
            Self::InProgress => Some(SAVING_LABEL),
            Self::Saved { label } => Some(label.as_str()),
            Self::Failed { message, .. } => Some(message.as_str()),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_visible(&self) -> bool {
        !matches!(self, Self::Hidden)
    }
}

/// User action attached to an affordance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorAction {
    Retry,
}

/// Indicator for one field
#[derive(Debug, Clone)]
pub struct StatusIndicator {
    auto_fade: Duration,
    show_timestamp: bool,
    saved_since: Option<Instant>,
    seen_save: Option<DateTime<Utc>>,
}

impl StatusIndicator {
    #[must_use]
    pub fn new(config: &AutosaveConfig) -> Self {
        Self {
            auto_fade: config.auto_fade(),
            show_timestamp: config.show_timestamp,
            saved_since: None,
            seen_save: None,
        }
    }

    /// Affordance for `snapshot` as of `now`
    ///
    /// A new successful save (a different `last_saved`) restarts the fade.
    pub fn render(&mut self, snapshot: &SaveSnapshot, now: Instant) -> Affordance {
        if snapshot.status != SaveStatus::Saved {
            self.saved_since = None;
            return match snapshot.status {
                SaveStatus::Error => Affordance::Failed {
                    message: snapshot
                        .error
                        .as_ref()
                        .map_or_else(|| ERROR_LABEL.to_string(), |e| format!("{ERROR_LABEL}: {e}")),
                    retry: true,
                },
                status => Affordance::for_status(status),
            };
        }

        if self.saved_since.is_none() || snapshot.last_saved != self.seen_save {
            self.saved_since = Some(now);
            self.seen_save = snapshot.last_saved;
        }

        let shown_at = self.saved_since.unwrap_or(now);
        if now.saturating_duration_since(shown_at) >= self.auto_fade {
            return Affordance::Hidden;
        }

        let label = match snapshot.last_saved {
            Some(at) if self.show_timestamp => at.with_timezone(&Local).format("%H:%M").to_string(),
            _ => SAVED_LABEL.to_string(),
        };
        Affordance::Saved { label }
    }

    /// Route a user action to the saver behind this indicator
    pub async fn dispatch(&self, action: IndicatorAction, saver: &dyn Autosave) -> SaveStatus {
        match action {
            IndicatorAction::Retry => saver.retry().await,
        }
    }
}
