//! Coordinator - drives polling, countdown and orchestration on one timeline
//!
//! All recurring work runs as interval ticks inside a single `select!` loop;
//! long waits inside a launch session are suspension points on the same
//! runtime, so process watching and status refresh keep running throughout.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::Result;
use tokio::time::interval;
use tracing::{debug, info, warn};

use super::config::Settings;
use super::orchestrator::{Capabilities, LaunchError, LaunchOrchestrator};
use super::scheduler::{AutoStartScheduler, SchedulerTick};
use super::status::{SharedStatus, StatusSnapshot};
use super::watcher::{ProcessEvent, ProcessWatcher, TargetId};
use crate::platform::SystemProcessQuery;

pub struct App {
    settings: Arc<RwLock<Settings>>,
    status: SharedStatus,
    watcher: ProcessWatcher,
    scheduler: AutoStartScheduler,
    orchestrator: LaunchOrchestrator,
    last_logged: StatusSnapshot,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        let status = SharedStatus::new(settings.has_credential());

        let watcher = ProcessWatcher::new(
            Box::new(SystemProcessQuery::new()),
            vec![
                (TargetId::Client, settings.client_process_names.clone()),
                (TargetId::Launcher, settings.launcher_process_names.clone()),
                (TargetId::Game, settings.game_process_names.clone()),
            ],
        );

        let caps = Capabilities::native(&settings);
        let settings = Arc::new(RwLock::new(settings));
        let orchestrator =
            LaunchOrchestrator::new(Arc::clone(&settings), status.clone(), caps);

        Self {
            settings,
            status,
            watcher,
            scheduler: AutoStartScheduler::default(),
            orchestrator,
            last_logged: StatusSnapshot::default(),
        }
    }

    /// Manually begin a launch attempt (the "start button" entry point).
    pub fn start_launch(&self) -> Result<(), LaunchError> {
        self.orchestrator.start()
    }

    /// Run the coordinator until ctrl-c.
    ///
    /// Shutdown stops all timers; an in-flight session's spawned processes
    /// are left running.
    pub async fn run(mut self) -> Result<()> {
        let (fast_secs, slow_secs, refresh_secs, auto_enabled, auto_delay) = {
            let settings = self.settings.read().expect("settings lock poisoned");
            (
                settings.launcher_poll_interval_secs,
                settings.client_poll_interval_secs,
                settings.status_refresh_secs,
                settings.auto_start_enabled,
                settings.auto_start_delay_secs,
            )
        };

        if auto_enabled {
            self.scheduler.enable(auto_delay);
        }

        let mut fast_poll = interval(Duration::from_secs(fast_secs));
        let mut slow_poll = interval(Duration::from_secs(slow_secs));
        let mut countdown = interval(Duration::from_secs(1));
        let mut refresh = interval(Duration::from_secs(refresh_secs));

        info!(
            "Coordinator running (launcher/game poll {}s, client poll {}s)",
            fast_secs, slow_secs
        );

        loop {
            tokio::select! {
                _ = fast_poll.tick() => {
                    self.poll_targets(&[TargetId::Launcher, TargetId::Game]);
                }
                _ = slow_poll.tick() => {
                    self.poll_targets(&[TargetId::Client]);
                }
                _ = countdown.tick() => {
                    self.tick_scheduler();
                }
                _ = refresh.tick() => {
                    self.refresh_status();
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        Ok(())
    }

    fn poll_targets(&mut self, targets: &[TargetId]) {
        let (_, events) = self.watcher.poll(targets);
        for event in events {
            match event {
                ProcessEvent::Started(target) => {
                    self.status.set_running(target, true);
                    if target == TargetId::Launcher {
                        self.on_launcher_started();
                    }
                }
                ProcessEvent::Stopped(target) => {
                    self.status.set_running(target, false);
                }
            }
        }
    }

    /// The launcher appeared. When no session is driving the launch (it was
    /// started manually or by the client itself), fill in the credential
    /// once per launcher start.
    fn on_launcher_started(&self) {
        let auto_fill = self
            .settings
            .read()
            .map(|s| s.auto_fill_on_launcher_start)
            .unwrap_or(false);
        if !auto_fill {
            return;
        }
        if self.orchestrator.is_active() {
            debug!("Launch session in flight, session handles credential delivery");
            return;
        }

        info!("Launcher detected outside a session - scheduling credential auto-fill");
        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move { orchestrator.auto_fill().await });
    }

    fn tick_scheduler(&mut self) {
        match self.scheduler.tick() {
            SchedulerTick::Disabled => {}
            SchedulerTick::Counting(remaining) => {
                // A launch already in flight makes the pending auto-start moot
                if self.orchestrator.is_active() {
                    self.scheduler.disable();
                    self.status.set_countdown(None);
                    return;
                }
                self.status.set_countdown(Some(remaining));
                info!("Auto-start in {}s", remaining);
            }
            SchedulerTick::Fire => {
                self.status.set_countdown(None);
                if !self.status.start_allowed() {
                    info!("Auto-start skipped - launcher or game already running");
                    return;
                }
                match self.orchestrator.start() {
                    Ok(()) => info!("Auto-start fired"),
                    Err(e) => warn!("Auto-start could not launch: {}", e),
                }
            }
        }
    }

    /// Refresh the externally visible status. Changes are logged at info,
    /// the steady state only at debug.
    fn refresh_status(&mut self) {
        let credential_stored = self
            .settings
            .read()
            .map(|s| s.has_credential())
            .unwrap_or(false);
        self.status.set_credential_stored(credential_stored);

        let snapshot = self.status.snapshot();
        let line = format!(
            "client: {} | launcher: {} | game: {} | session: {} | credential: {} | {}",
            on_off(snapshot.client_running),
            on_off(snapshot.launcher_running),
            on_off(snapshot.game_running),
            snapshot.launch_state.label(),
            if snapshot.credential_stored {
                "stored"
            } else {
                "not stored"
            },
            snapshot.message
        );
        if snapshot != self.last_logged {
            info!("{}", line);
            self.last_logged = snapshot;
        } else {
            debug!("{}", line);
        }
    }
}

fn on_off(running: bool) -> &'static str {
    if running {
        "running"
    } else {
        "stopped"
    }
}
