//! Process watching - edge-triggered running state for the tracked targets

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::platform::ProcessQuery;
use tracing::{debug, info};

/// One of the three externally observed processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetId {
    /// The intermediary client (e.g. Steam)
    Client,
    /// The companion launcher the game hides behind
    Launcher,
    /// The game itself
    Game,
}

impl TargetId {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Launcher => "launcher",
            Self::Game => "game",
        }
    }
}

/// A single poll result for one target.
///
/// `pid` and `resident_bytes` are present exactly when `is_running` is true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessObservation {
    pub target: TargetId,
    pub is_running: bool,
    pub pid: Option<u32>,
    pub resident_bytes: Option<u64>,
    pub observed_at: DateTime<Utc>,
}

impl ProcessObservation {
    fn running(target: TargetId, pid: u32, resident_bytes: u64) -> Self {
        Self {
            target,
            is_running: true,
            pid: Some(pid),
            resident_bytes: Some(resident_bytes),
            observed_at: Utc::now(),
        }
    }

    fn stopped(target: TargetId) -> Self {
        Self {
            target,
            is_running: false,
            pid: None,
            resident_bytes: None,
            observed_at: Utc::now(),
        }
    }
}

/// A running-state transition, reported once per change (not once per poll).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessEvent {
    Started(TargetId),
    Stopped(TargetId),
}

/// Polls the OS process table for the tracked targets and reports
/// edge-triggered transitions.
pub struct ProcessWatcher {
    query: Box<dyn ProcessQuery>,
    names: HashMap<TargetId, Vec<String>>,
    running: HashMap<TargetId, bool>,
}

impl ProcessWatcher {
    pub fn new(query: Box<dyn ProcessQuery>, names: Vec<(TargetId, Vec<String>)>) -> Self {
        Self {
            query,
            names: names.into_iter().collect(),
            running: HashMap::new(),
        }
    }

    /// Poll the given targets once.
    ///
    /// Returns one observation per target plus the transitions since the
    /// previous poll of that target. A target whose name list is empty, or
    /// that cannot be queried, is reported as not running.
    pub fn poll(&mut self, targets: &[TargetId]) -> (Vec<ProcessObservation>, Vec<ProcessEvent>) {
        self.query.refresh();

        let mut observations = Vec::with_capacity(targets.len());
        let mut events = Vec::new();

        for &target in targets {
            let variants = self.names.get(&target).map(Vec::as_slice).unwrap_or(&[]);
            let observation = match self.query.find_by_name(variants) {
                Some(info) => {
                    debug!(
                        "{} running as '{}' (PID {}, {} MB)",
                        target.label(),
                        info.name,
                        info.pid,
                        info.resident_bytes / 1024 / 1024
                    );
                    ProcessObservation::running(target, info.pid, info.resident_bytes)
                }
                None => ProcessObservation::stopped(target),
            };

            let was_running = self
                .running
                .insert(target, observation.is_running)
                .unwrap_or(false);
            if was_running != observation.is_running {
                let event = if observation.is_running {
                    info!("{} started", target.label());
                    ProcessEvent::Started(target)
                } else {
                    info!("{} stopped", target.label());
                    ProcessEvent::Stopped(target)
                };
                events.push(event);
            }

            observations.push(observation);
        }

        (observations, events)
    }

    /// Last known running state of a target.
    pub fn is_running(&self, target: TargetId) -> bool {
        self.running.get(&target).copied().unwrap_or(false)
    }
}
