//! Platform capabilities - process enumeration, window control and synthetic input
//!
//! The orchestration core talks to the operating system exclusively through the
//! traits in this module, so tests can substitute deterministic fakes.

#[cfg(windows)]
pub mod windows;

use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
#[cfg(not(windows))]
use tracing::warn;

/// A process found in the OS process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    /// Resident (working set) memory in bytes
    pub resident_bytes: u64,
}

/// An opaque native window handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHandle(pub isize);

/// Keys the injector is allowed to synthesize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Control,
    Return,
    V,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Press,
    Release,
}

/// A single synthetic key-down or key-up event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub action: KeyAction,
}

impl KeyEvent {
    pub fn press(key: Key) -> Self {
        Self {
            key,
            action: KeyAction::Press,
        }
    }

    pub fn release(key: Key) -> Self {
        Self {
            key,
            action: KeyAction::Release,
        }
    }
}

/// A resolved, spawnable launch command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Query the OS process table by name.
///
/// Implementations never propagate query failures; a target that cannot be
/// queried is reported as absent so monitoring degrades instead of crashing
/// the caller.
pub trait ProcessQuery: Send {
    /// Refresh the underlying process table snapshot.
    fn refresh(&mut self);

    /// Find the first process matching one of the ordered name variants.
    fn find_by_name(&mut self, variants: &[String]) -> Option<ProcessInfo>;
}

/// Locate and activate top-level windows.
pub trait WindowControl: Send + Sync {
    fn find_by_title(&self, title: &str) -> Option<WindowHandle>;
    fn main_window_of(&self, pid: u32) -> Option<WindowHandle>;
    /// Bring the window to the foreground and restore it from minimized.
    fn activate(&self, window: WindowHandle) -> Result<()>;
}

/// Clipboard writes and synthetic keyboard events.
pub trait InputSynth: Send + Sync {
    fn set_clipboard_text(&self, text: &str) -> Result<()>;
    fn send_keys(&self, events: &[KeyEvent]) -> Result<()>;
}

/// Spawn an external process detached from our own lifetime.
pub trait ProcessSpawner: Send {
    fn spawn(&mut self, command: &LaunchCommand) -> Result<u32>;
}

/// Normalize a process name for variant matching: case-insensitive, with or
/// without the `.exe` suffix.
pub fn normalize_process_name(name: &str) -> String {
    let lower = name.to_lowercase();
    lower
        .strip_suffix(".exe")
        .map(str::to_string)
        .unwrap_or(lower)
}

/// Process table query backed by `sysinfo`.
pub struct SystemProcessQuery {
    system: System,
}

impl SystemProcessQuery {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SystemProcessQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessQuery for SystemProcessQuery {
    fn refresh(&mut self) {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::everything(),
        );
    }

    fn find_by_name(&mut self, variants: &[String]) -> Option<ProcessInfo> {
        for variant in variants {
            let wanted = normalize_process_name(variant);
            // Lowest PID wins so repeated polls see a stable representative.
            let found = self
                .system
                .processes()
                .iter()
                .filter(|(_, process)| {
                    normalize_process_name(&process.name().to_string_lossy()) == wanted
                })
                .min_by_key(|(pid, _)| pid.as_u32());

            if let Some((pid, process)) = found {
                return Some(ProcessInfo {
                    pid: pid.as_u32(),
                    name: process.name().to_string_lossy().to_string(),
                    resident_bytes: process.memory(),
                });
            }
        }
        None
    }
}

/// Spawner that detaches the child from our process group and discards its
/// standard streams, so closing launchpilot never takes the client down.
pub struct DetachedSpawner;

impl ProcessSpawner for DetachedSpawner {
    fn spawn(&mut self, command: &LaunchCommand) -> Result<u32> {
        let mut cmd = Command::new(&command.program);

        if let Some(parent) = command.program.parent() {
            cmd.current_dir(parent);
        }
        cmd.args(&command.args);

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            cmd.creation_flags(0x00000008); // DETACHED_PROCESS
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            unsafe {
                cmd.pre_exec(|| {
                    libc::setsid();
                    Ok(())
                });
            }
        }

        let child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("Failed to spawn process")?;

        Ok(child.id())
    }
}

/// Window control for the current platform.
pub fn native_window_control() -> Box<dyn WindowControl> {
    #[cfg(windows)]
    {
        Box::new(windows::NativeWindowControl)
    }
    #[cfg(not(windows))]
    {
        Box::new(UnsupportedWindowControl)
    }
}

/// Input synthesis for the current platform.
pub fn native_input_synth() -> Box<dyn InputSynth> {
    #[cfg(windows)]
    {
        Box::new(windows::NativeInputSynth)
    }
    #[cfg(not(windows))]
    {
        Box::new(UnsupportedInputSynth)
    }
}

/// No-op window control for platforms without an implementation.
#[cfg(not(windows))]
pub struct UnsupportedWindowControl;

#[cfg(not(windows))]
impl WindowControl for UnsupportedWindowControl {
    fn find_by_title(&self, title: &str) -> Option<WindowHandle> {
        warn!(
            "Window lookup for '{}' is not supported on this platform",
            title
        );
        None
    }

    fn main_window_of(&self, pid: u32) -> Option<WindowHandle> {
        warn!(
            "Window lookup for PID {} is not supported on this platform",
            pid
        );
        None
    }

    fn activate(&self, _window: WindowHandle) -> Result<()> {
        anyhow::bail!("Window activation is not supported on this platform")
    }
}

/// No-op input synthesis for platforms without an implementation.
#[cfg(not(windows))]
pub struct UnsupportedInputSynth;

#[cfg(not(windows))]
impl InputSynth for UnsupportedInputSynth {
    fn set_clipboard_text(&self, _text: &str) -> Result<()> {
        anyhow::bail!("Clipboard access is not supported on this platform")
    }

    fn send_keys(&self, _events: &[KeyEvent]) -> Result<()> {
        anyhow::bail!("Synthetic input is not supported on this platform")
    }
}
