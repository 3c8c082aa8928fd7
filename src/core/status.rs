//! Status surface - shared snapshot polled by the presentation layer

use std::sync::{Arc, RwLock};

use serde::Serialize;

use super::orchestrator::LaunchState;
use super::readiness::ReadinessProgress;
use super::watcher::TargetId;

/// Point-in-time view of everything the presentation layer shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub client_running: bool,
    pub launcher_running: bool,
    pub game_running: bool,
    pub launch_state: LaunchState,
    pub credential_stored: bool,
    /// Remaining auto-start seconds while a countdown is armed
    pub countdown: Option<u32>,
    pub message: String,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            client_running: false,
            launcher_running: false,
            game_running: false,
            launch_state: LaunchState::Idle,
            credential_stored: false,
            countdown: None,
            message: "Ready to launch".to_string(),
        }
    }
}

impl StatusSnapshot {
    /// Whether starting a launch is currently allowed. The launcher or the
    /// game already running means a second launch would collide.
    pub fn start_allowed(&self) -> bool {
        !(self.launcher_running || self.game_running)
    }
}

/// Thread-safe shared wrapper around the snapshot.
#[derive(Clone)]
pub struct SharedStatus {
    inner: Arc<RwLock<StatusSnapshot>>,
}

impl SharedStatus {
    pub fn new(credential_stored: bool) -> Self {
        let snapshot = StatusSnapshot {
            credential_stored,
            ..Default::default()
        };
        Self {
            inner: Arc::new(RwLock::new(snapshot)),
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.inner
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn start_allowed(&self) -> bool {
        self.inner
            .read()
            .map(|s| s.start_allowed())
            .unwrap_or(false)
    }

    pub fn set_running(&self, target: TargetId, running: bool) {
        if let Ok(mut snapshot) = self.inner.write() {
            match target {
                TargetId::Client => snapshot.client_running = running,
                TargetId::Launcher => snapshot.launcher_running = running,
                TargetId::Game => snapshot.game_running = running,
            }
        }
    }

    pub fn set_launch_state(&self, state: LaunchState) {
        if let Ok(mut snapshot) = self.inner.write() {
            snapshot.launch_state = state;
        }
    }

    pub fn set_credential_stored(&self, stored: bool) {
        if let Ok(mut snapshot) = self.inner.write() {
            snapshot.credential_stored = stored;
        }
    }

    pub fn set_countdown(&self, remaining: Option<u32>) {
        if let Ok(mut snapshot) = self.inner.write() {
            snapshot.countdown = remaining;
        }
    }

    pub fn set_message(&self, message: impl Into<String>) {
        if let Ok(mut snapshot) = self.inner.write() {
            snapshot.message = message.into();
        }
    }

    /// Format a readiness progress update into the display message.
    pub fn set_readiness_progress(&self, progress: ReadinessProgress) {
        let message = match progress {
            ReadinessProgress::Searching {
                attempt,
                max_attempts,
            } => format!(
                "Searching for launcher process... attempt {}/{}",
                attempt, max_attempts
            ),
            ReadinessProgress::Loading {
                percent,
                resident_bytes,
                threshold_bytes,
            } => format!(
                "Launcher loading... {}% ({} MB / {} MB)",
                percent,
                resident_bytes / 1024 / 1024,
                threshold_bytes / 1024 / 1024
            ),
        };
        self.set_message(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_allowed_tracks_launcher_and_game() {
        let status = SharedStatus::new(false);
        assert!(status.start_allowed());

        status.set_running(TargetId::Launcher, true);
        assert!(!status.start_allowed());

        status.set_running(TargetId::Launcher, false);
        status.set_running(TargetId::Game, true);
        assert!(!status.start_allowed());

        status.set_running(TargetId::Game, false);
        assert!(status.start_allowed());

        // The client alone never blocks a launch
        status.set_running(TargetId::Client, true);
        assert!(status.start_allowed());
    }

    #[test]
    fn readiness_progress_becomes_a_display_message() {
        let status = SharedStatus::new(true);
        status.set_readiness_progress(ReadinessProgress::Loading {
            percent: 42,
            resident_bytes: 30 * 1024 * 1024,
            threshold_bytes: 70 * 1024 * 1024,
        });
        assert_eq!(
            status.snapshot().message,
            "Launcher loading... 42% (30 MB / 70 MB)"
        );
    }
}
