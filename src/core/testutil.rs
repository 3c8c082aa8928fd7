//! Deterministic fakes for the capability interfaces

use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::platform::{
    normalize_process_name, InputSynth, KeyEvent, LaunchCommand, ProcessInfo, ProcessQuery,
    ProcessSpawner, WindowControl, WindowHandle,
};

/// Shorthand for building a fake process-table entry.
pub fn process(name: &str, pid: u32, resident_bytes: u64) -> ProcessInfo {
    ProcessInfo {
        pid,
        name: name.to_string(),
        resident_bytes,
    }
}

/// Process query fed by a scripted sequence of process tables.
///
/// Each `refresh()` advances to the next table; the last table repeats once
/// the script runs out. Before the first refresh the table is empty.
pub struct ScriptedQuery {
    tables: Vec<Vec<ProcessInfo>>,
    refreshes: usize,
}

impl ScriptedQuery {
    pub fn new(tables: Vec<Vec<ProcessInfo>>) -> Self {
        Self {
            tables,
            refreshes: 0,
        }
    }

    fn current(&self) -> &[ProcessInfo] {
        if self.refreshes == 0 || self.tables.is_empty() {
            return &[];
        }
        let index = (self.refreshes - 1).min(self.tables.len() - 1);
        &self.tables[index]
    }
}

impl ProcessQuery for ScriptedQuery {
    fn refresh(&mut self) {
        self.refreshes += 1;
    }

    fn find_by_name(&mut self, variants: &[String]) -> Option<ProcessInfo> {
        for variant in variants {
            let wanted = normalize_process_name(variant);
            let found = self
                .current()
                .iter()
                .filter(|info| normalize_process_name(&info.name) == wanted)
                .min_by_key(|info| info.pid);
            if let Some(info) = found {
                return Some(info.clone());
            }
        }
        None
    }
}

/// Input synthesis that records everything and can be told to fail.
#[derive(Clone, Default)]
pub struct RecordingInput {
    pub clipboard: Arc<Mutex<Vec<String>>>,
    pub keys: Arc<Mutex<Vec<KeyEvent>>>,
    pub fail_clipboard: bool,
    pub fail_keys: bool,
}

impl InputSynth for RecordingInput {
    fn set_clipboard_text(&self, text: &str) -> Result<()> {
        if self.fail_clipboard {
            anyhow::bail!("clipboard unavailable");
        }
        self.clipboard.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn send_keys(&self, events: &[KeyEvent]) -> Result<()> {
        if self.fail_keys {
            anyhow::bail!("input synthesis unavailable");
        }
        self.keys.lock().unwrap().extend_from_slice(events);
        Ok(())
    }
}

/// Window control with fixed lookup results and an activation log.
#[derive(Clone, Default)]
pub struct StaticWindows {
    /// Handle returned for any title lookup
    pub by_title: Option<isize>,
    /// Handle returned for any PID lookup
    pub by_pid: Option<isize>,
    pub fail_activate: bool,
    pub activated: Arc<Mutex<Vec<isize>>>,
}

impl WindowControl for StaticWindows {
    fn find_by_title(&self, _title: &str) -> Option<WindowHandle> {
        self.by_title.map(WindowHandle)
    }

    fn main_window_of(&self, _pid: u32) -> Option<WindowHandle> {
        self.by_pid.map(WindowHandle)
    }

    fn activate(&self, window: WindowHandle) -> Result<()> {
        if self.fail_activate {
            anyhow::bail!("activation refused");
        }
        self.activated.lock().unwrap().push(window.0);
        Ok(())
    }
}

/// Spawner that records launch commands instead of spawning.
#[derive(Clone, Default)]
pub struct RecordingSpawner {
    pub spawned: Arc<Mutex<Vec<LaunchCommand>>>,
    pub fail: bool,
}

impl ProcessSpawner for RecordingSpawner {
    fn spawn(&mut self, command: &LaunchCommand) -> Result<u32> {
        if self.fail {
            anyhow::bail!("spawn refused");
        }
        let mut spawned = self.spawned.lock().unwrap();
        spawned.push(command.clone());
        Ok(4242 + spawned.len() as u32)
    }
}
