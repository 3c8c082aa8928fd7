//! Launch orchestration - the state machine sequencing one launch attempt

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::config::Settings;
use super::injector::InputInjector;
use super::readiness::{ReadinessDetector, ReadinessOutcome};
use super::resolver;
use super::status::SharedStatus;
use super::vault;
use crate::platform::{
    native_input_synth, native_window_control, DetachedSpawner, ProcessQuery, ProcessSpawner,
    SystemProcessQuery,
};

/// Settle delay before auto-filling a launcher that appeared on its own.
const AUTO_FILL_SETTLE: Duration = Duration::from_secs(3);
/// Poll interval while waiting for the launcher process to appear.
const LAUNCHER_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Unique identifier for a launch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of the launch state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum LaunchState {
    #[default]
    Idle,
    Starting,
    AwaitingLauncher,
    AwaitingReadiness,
    InjectingCredential,
    Completed,
    Failed,
}

impl LaunchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::AwaitingLauncher => "awaiting launcher",
            Self::AwaitingReadiness => "awaiting readiness",
            Self::InjectingCredential => "injecting credential",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Errors surfaced directly to the caller of [`LaunchOrchestrator::start`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LaunchError {
    #[error("a launch session is already active")]
    Busy,
    #[error("client executable not found")]
    ExecutableNotFound,
    #[error("failed to spawn client: {0}")]
    Spawn(String),
}

/// One end-to-end launch attempt.
#[derive(Debug, Clone)]
pub struct LaunchSession {
    pub id: SessionId,
    pub started_at: DateTime<Utc>,
    pub state: LaunchState,
    pub last_error: Option<String>,
    /// Readiness polls performed so far
    pub attempt_count: u32,
}

impl LaunchSession {
    fn new() -> Self {
        Self {
            id: SessionId::new(),
            started_at: Utc::now(),
            state: LaunchState::Starting,
            last_error: None,
            attempt_count: 0,
        }
    }
}

/// The OS capabilities one launch attempt needs.
pub struct Capabilities {
    pub query: Box<dyn ProcessQuery>,
    pub spawner: Box<dyn ProcessSpawner>,
    pub injector: InputInjector,
}

impl Capabilities {
    pub fn native(settings: &Settings) -> Self {
        Self {
            query: Box::new(SystemProcessQuery::new()),
            spawner: Box::new(DetachedSpawner),
            injector: InputInjector::new(
                native_input_synth(),
                native_window_control(),
                settings.confirm_follow_up_prompt,
            ),
        }
    }
}

/// Sequences watcher observations, readiness waits and injection into one
/// launch attempt. Only one session may be active at a time; `start()` while
/// active is rejected synchronously, not queued.
#[derive(Clone)]
pub struct LaunchOrchestrator {
    settings: Arc<RwLock<Settings>>,
    status: SharedStatus,
    session: Arc<RwLock<Option<LaunchSession>>>,
    caps: Arc<tokio::sync::Mutex<Capabilities>>,
    detector: ReadinessDetector,
}

impl LaunchOrchestrator {
    pub fn new(
        settings: Arc<RwLock<Settings>>,
        status: SharedStatus,
        caps: Capabilities,
    ) -> Self {
        Self {
            settings,
            status,
            session: Arc::new(RwLock::new(None)),
            caps: Arc::new(tokio::sync::Mutex::new(caps)),
            detector: ReadinessDetector::default(),
        }
    }

    /// Begin a launch attempt. Rejected with [`LaunchError::Busy`] while a
    /// session is active; a completed or failed session is replaced.
    pub fn start(&self) -> Result<(), LaunchError> {
        {
            let mut guard = self.session.write().expect("session lock poisoned");
            if guard.as_ref().is_some_and(|s| !s.state.is_terminal()) {
                return Err(LaunchError::Busy);
            }
            let session = LaunchSession::new();
            info!("Launch session {} starting", session.id);
            *guard = Some(session);
        }
        self.status.set_launch_state(LaunchState::Starting);
        self.status.set_message("Launching client...");

        let this = self.clone();
        tokio::spawn(async move { this.run_session().await });
        Ok(())
    }

    /// Whether a non-terminal session is in flight.
    pub fn is_active(&self) -> bool {
        self.session
            .read()
            .map(|s| s.as_ref().is_some_and(|s| !s.state.is_terminal()))
            .unwrap_or(false)
    }

    /// Current state, `Idle` when no session has run yet.
    pub fn current_state(&self) -> LaunchState {
        self.session
            .read()
            .map(|s| s.as_ref().map(|s| s.state).unwrap_or_default())
            .unwrap_or_default()
    }

    /// Snapshot of the current (or last) session.
    pub fn current_session(&self) -> Option<LaunchSession> {
        self.session.read().map(|s| s.clone()).unwrap_or(None)
    }

    fn set_state(&self, state: LaunchState) {
        self.with_session(|session| session.state = state);
        self.status.set_launch_state(state);
        info!("Launch session state: {}", state.label());
    }

    fn fail(&self, message: String) {
        error!("Launch session failed: {}", message);
        self.with_session(|session| {
            session.state = LaunchState::Failed;
            session.last_error = Some(message.clone());
        });
        self.status.set_launch_state(LaunchState::Failed);
        self.status.set_message(message);
    }

    fn with_session(&self, f: impl FnOnce(&mut LaunchSession)) {
        if let Ok(mut guard) = self.session.write() {
            if let Some(session) = guard.as_mut() {
                f(session);
            }
        }
    }

    async fn run_session(&self) {
        let settings = self
            .settings
            .read()
            .expect("settings lock poisoned")
            .clone();
        let max_wait = Duration::from_secs(settings.readiness_max_wait_secs);

        // Starting: resolve and spawn the client
        let Some(command) = resolver::build_launch_command(&settings) else {
            self.fail(LaunchError::ExecutableNotFound.to_string());
            return;
        };
        info!(
            "Launching client: {} {}",
            command.program.display(),
            command.args.join(" ")
        );
        let spawned = {
            let mut caps = self.caps.lock().await;
            caps.spawner.spawn(&command)
        };
        match spawned {
            Ok(pid) => info!("Client spawned with PID {}", pid),
            Err(e) => {
                self.fail(LaunchError::Spawn(format!("{e:#}")).to_string());
                return;
            }
        }

        // Wait for the launcher process to show up. Best effort: a timeout
        // here is a warning, the launcher may simply be slow.
        self.set_state(LaunchState::AwaitingLauncher);
        self.status.set_message("Waiting for the launcher...");
        if !self
            .wait_for_launcher(&settings.launcher_process_names, max_wait)
            .await
        {
            warn!("Launcher process was not observed in time, continuing anyway");
        }

        // Wait until the launcher looks fully loaded
        self.set_state(LaunchState::AwaitingReadiness);
        let outcome = {
            let session = Arc::clone(&self.session);
            let status = self.status.clone();
            let mut caps = self.caps.lock().await;
            self.detector
                .await_ready(
                    caps.query.as_mut(),
                    &settings.launcher_process_names,
                    settings.ram_threshold_bytes(),
                    max_wait,
                    move |progress| {
                        if let Ok(mut guard) = session.write() {
                            if let Some(session) = guard.as_mut() {
                                session.attempt_count += 1;
                            }
                        }
                        status.set_readiness_progress(progress);
                    },
                )
                .await
        };
        match outcome {
            ReadinessOutcome::Ready { elapsed } => {
                info!("Launcher ready after {:.1}s", elapsed.as_secs_f64())
            }
            ReadinessOutcome::TimedOut => {
                warn!("Launcher readiness timed out, continuing anyway")
            }
            ReadinessOutcome::ProcessNeverAppeared => {
                warn!("Launcher process never appeared, continuing anyway")
            }
        }

        // Deliver the credential, unless there is nothing usable stored
        self.set_state(LaunchState::InjectingCredential);
        if !settings.has_credential() {
            info!("No credential stored - skipping auto-fill");
            self.complete("Launched without credential auto-fill");
            return;
        }
        let secret = vault::decrypt(settings.encrypted_password.as_deref().unwrap_or_default());
        if secret.is_empty() {
            warn!("Stored credential could not be decrypted - skipping auto-fill");
            self.complete("Launched without credential auto-fill");
            return;
        }

        {
            let caps = &mut *self.caps.lock().await;
            caps.injector
                .bring_to_foreground(
                    &settings.launcher_window_titles,
                    caps.query.as_mut(),
                    &settings.launcher_process_names,
                )
                .await;
            let report = caps.injector.deliver_credential(&secret).await;
            if report.fully_delivered() {
                info!("Credential delivered");
            } else {
                // Injection is unverifiable; partial delivery is not a failure
                warn!("Credential delivery partially failed: {:?}", report);
            }
        }

        self.complete("Launch completed");
    }

    fn complete(&self, message: &str) {
        self.set_state(LaunchState::Completed);
        self.status.set_message(message);
    }

    async fn wait_for_launcher(&self, variants: &[String], max_wait: Duration) -> bool {
        let started = Instant::now();
        loop {
            {
                let mut caps = self.caps.lock().await;
                caps.query.refresh();
                if caps.query.find_by_name(variants).is_some() {
                    return true;
                }
            }
            if started.elapsed() >= max_wait {
                return false;
            }
            sleep(LAUNCHER_POLL_INTERVAL).await;
        }
    }

    /// Credential auto-fill for a launcher that appeared outside a session
    /// (e.g. started manually). Waits for the launcher to settle, then
    /// activates its window and delivers the credential.
    pub async fn auto_fill(&self) {
        let settings = self
            .settings
            .read()
            .expect("settings lock poisoned")
            .clone();
        if !settings.has_credential() {
            info!("No credential stored - auto-fill skipped");
            return;
        }

        sleep(AUTO_FILL_SETTLE).await;

        let secret = vault::decrypt(settings.encrypted_password.as_deref().unwrap_or_default());
        if secret.is_empty() {
            warn!("Stored credential could not be decrypted - auto-fill skipped");
            return;
        }

        info!("Auto-filling credential into the launcher");
        let caps = &mut *self.caps.lock().await;
        caps.injector
            .bring_to_foreground(
                &settings.launcher_window_titles,
                caps.query.as_mut(),
                &settings.launcher_process_names,
            )
            .await;
        let report = caps.injector.deliver_credential(&secret).await;
        if !report.fully_delivered() {
            warn!("Auto-fill partially failed: {:?}", report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testutil::{
        process, RecordingInput, RecordingSpawner, ScriptedQuery, StaticWindows,
    };

    const MB: u64 = 1024 * 1024;

    struct Fixture {
        orchestrator: LaunchOrchestrator,
        spawner_log: std::sync::Arc<std::sync::Mutex<Vec<crate::platform::LaunchCommand>>>,
        input: RecordingInput,
        _dir: tempfile::TempDir,
    }

    fn fixture(settings_override: impl FnOnce(&mut Settings), launcher_present: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("client-bin");
        std::fs::write(&exe, b"").unwrap();

        let mut settings = Settings {
            client_path: Some(exe),
            ..Default::default()
        };
        settings_override(&mut settings);

        let tables = if launcher_present {
            vec![vec![process("launcher", 10, 200 * MB)]]
        } else {
            vec![vec![]]
        };

        let input = RecordingInput::default();
        let spawner = RecordingSpawner::default();
        let spawner_log = spawner.spawned.clone();
        let caps = Capabilities {
            query: Box::new(ScriptedQuery::new(tables)),
            spawner: Box::new(spawner),
            injector: InputInjector::new(
                Box::new(input.clone()),
                Box::new(StaticWindows {
                    by_title: Some(42),
                    ..Default::default()
                }),
                settings.confirm_follow_up_prompt,
            ),
        };

        let status = SharedStatus::new(settings.has_credential());
        let orchestrator =
            LaunchOrchestrator::new(Arc::new(RwLock::new(settings)), status, caps);
        Fixture {
            orchestrator,
            spawner_log,
            input,
            _dir: dir,
        }
    }

    async fn wait_terminal(orchestrator: &LaunchOrchestrator) -> LaunchState {
        for _ in 0..100_000 {
            let state = orchestrator.current_state();
            if state.is_terminal() {
                return state;
            }
            sleep(Duration::from_millis(50)).await;
        }
        panic!("session never reached a terminal state");
    }

    #[tokio::test(start_paused = true)]
    async fn completes_without_injection_when_no_credential_is_stored() {
        let fixture = fixture(|_| {}, true);
        fixture.orchestrator.start().unwrap();

        assert_eq!(wait_terminal(&fixture.orchestrator).await, LaunchState::Completed);
        assert_eq!(fixture.spawner_log.lock().unwrap().len(), 1);
        // deliver_credential was never invoked
        assert!(fixture.input.keys.lock().unwrap().is_empty());
        assert!(fixture.input.clipboard.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_stored_credential_after_readiness() {
        let fixture = fixture(
            |settings| settings.encrypted_password = Some(vault::encrypt("hunter2")),
            true,
        );
        fixture.orchestrator.start().unwrap();

        assert_eq!(wait_terminal(&fixture.orchestrator).await, LaunchState::Completed);
        assert_eq!(*fixture.input.clipboard.lock().unwrap(), ["hunter2"]);
        // Paste chord + confirm + follow-up confirm
        assert_eq!(fixture.input.keys.lock().unwrap().len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_start_while_a_session_is_active() {
        let fixture = fixture(|_| {}, true);
        fixture.orchestrator.start().unwrap();
        assert_eq!(fixture.orchestrator.start(), Err(LaunchError::Busy));

        assert_eq!(wait_terminal(&fixture.orchestrator).await, LaunchState::Completed);
        // The rejected call never spawned a second client
        assert_eq!(fixture.spawner_log.lock().unwrap().len(), 1);

        // A terminal session re-enables start()
        fixture.orchestrator.start().unwrap();
        assert_eq!(wait_terminal(&fixture.orchestrator).await, LaunchState::Completed);
        assert_eq!(fixture.spawner_log.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn spawn_failure_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("client-bin");
        std::fs::write(&exe, b"").unwrap();

        let settings = Settings {
            client_path: Some(exe),
            ..Default::default()
        };
        let caps = Capabilities {
            query: Box::new(ScriptedQuery::new(vec![vec![]])),
            spawner: Box::new(RecordingSpawner {
                fail: true,
                ..Default::default()
            }),
            injector: InputInjector::new(
                Box::new(RecordingInput::default()),
                Box::new(StaticWindows::default()),
                true,
            ),
        };
        let orchestrator = LaunchOrchestrator::new(
            Arc::new(RwLock::new(settings)),
            SharedStatus::new(false),
            caps,
        );

        orchestrator.start().unwrap();
        assert_eq!(wait_terminal(&orchestrator).await, LaunchState::Failed);
        let session = orchestrator.current_session().unwrap();
        assert!(session.last_error.unwrap().contains("spawn"));
    }

    #[tokio::test(start_paused = true)]
    async fn proceeds_blind_when_launcher_never_appears() {
        // Launcher never shows up: both waits expire with warnings, the
        // credential is still delivered against whatever has focus.
        let fixture = fixture(
            |settings| {
                settings.encrypted_password = Some(vault::encrypt("pw"));
                settings.readiness_max_wait_secs = 10;
            },
            false,
        );
        fixture.orchestrator.start().unwrap();

        assert_eq!(wait_terminal(&fixture.orchestrator).await, LaunchState::Completed);
        assert_eq!(*fixture.input.clipboard.lock().unwrap(), ["pw"]);
        let session = fixture.orchestrator.current_session().unwrap();
        assert!(session.attempt_count > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_fill_skips_without_credential() {
        let fixture = fixture(|_| {}, true);
        fixture.orchestrator.auto_fill().await;
        assert!(fixture.input.keys.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn auto_fill_delivers_stored_credential() {
        let fixture = fixture(
            |settings| settings.encrypted_password = Some(vault::encrypt("pw")),
            true,
        );
        fixture.orchestrator.auto_fill().await;
        assert_eq!(*fixture.input.clipboard.lock().unwrap(), ["pw"]);
    }
}
