//! Credential delivery - clipboard plus synthetic keystrokes
//!
//! Keystrokes are sent against whatever window has focus; there is no
//! feedback channel confirming where they landed. Every step is best-effort:
//! a failed step is logged and the remaining steps still run.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::platform::{InputSynth, Key, KeyEvent, ProcessQuery, WindowControl, WindowHandle};

/// Delay after the clipboard write before pasting.
const CLIPBOARD_SETTLE: Duration = Duration::from_millis(1000);
/// Delay between the paste and the confirm key.
const CONFIRM_DELAY: Duration = Duration::from_millis(500);
/// Delay before the second confirm that dismisses the follow-up prompt.
const PROMPT_DELAY: Duration = Duration::from_millis(2000);

const FOREGROUND_ATTEMPTS: u32 = 10;
const FOREGROUND_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Per-step outcome of one credential delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InjectionReport {
    pub clipboard_ok: bool,
    pub paste_ok: bool,
    pub confirm_ok: bool,
    /// `None` when the second confirm is disabled by configuration
    pub prompt_confirm_ok: Option<bool>,
}

impl InjectionReport {
    pub fn fully_delivered(&self) -> bool {
        self.clipboard_ok
            && self.paste_ok
            && self.confirm_ok
            && self.prompt_confirm_ok.unwrap_or(true)
    }
}

/// The paste chord, in strict press/release order to avoid stuck modifiers.
fn paste_chord() -> [KeyEvent; 4] {
    [
        KeyEvent::press(Key::Control),
        KeyEvent::press(Key::V),
        KeyEvent::release(Key::V),
        KeyEvent::release(Key::Control),
    ]
}

fn key_tap(key: Key) -> [KeyEvent; 2] {
    [KeyEvent::press(key), KeyEvent::release(key)]
}

/// Delivers the decrypted credential into the focused window.
pub struct InputInjector {
    input: Box<dyn InputSynth>,
    windows: Box<dyn WindowControl>,
    confirm_follow_up: bool,
}

impl InputInjector {
    pub fn new(
        input: Box<dyn InputSynth>,
        windows: Box<dyn WindowControl>,
        confirm_follow_up: bool,
    ) -> Self {
        Self {
            input,
            windows,
            confirm_follow_up,
        }
    }

    /// Copy the secret to the clipboard, paste it, confirm, and optionally
    /// confirm the expected follow-up prompt.
    pub async fn deliver_credential(&self, secret: &str) -> InjectionReport {
        let mut report = InjectionReport::default();

        match self.input.set_clipboard_text(secret) {
            Ok(()) => {
                info!("Credential copied to clipboard");
                report.clipboard_ok = true;
            }
            Err(e) => warn!("Clipboard write failed: {e:#}"),
        }

        sleep(CLIPBOARD_SETTLE).await;
        match self.input.send_keys(&paste_chord()) {
            Ok(()) => {
                info!("Paste chord sent");
                report.paste_ok = true;
            }
            Err(e) => warn!("Paste chord failed: {e:#}"),
        }

        sleep(CONFIRM_DELAY).await;
        match self.input.send_keys(&key_tap(Key::Return)) {
            Ok(()) => {
                info!("Confirm key sent");
                report.confirm_ok = true;
            }
            Err(e) => warn!("Confirm key failed: {e:#}"),
        }

        if self.confirm_follow_up {
            sleep(PROMPT_DELAY).await;
            match self.input.send_keys(&key_tap(Key::Return)) {
                Ok(()) => {
                    info!("Follow-up prompt confirmed");
                    report.prompt_confirm_ok = Some(true);
                }
                Err(e) => {
                    warn!("Follow-up confirm failed: {e:#}");
                    report.prompt_confirm_ok = Some(false);
                }
            }
        }

        report
    }

    /// Try to bring the launcher window to the foreground: each candidate
    /// title first, then the main window of the launcher process, retrying
    /// for a bounded number of attempts.
    pub async fn bring_to_foreground(
        &self,
        titles: &[String],
        query: &mut dyn ProcessQuery,
        process_variants: &[String],
    ) -> bool {
        for attempt in 1..=FOREGROUND_ATTEMPTS {
            if let Some(window) = self.locate_window(titles, query, process_variants) {
                match self.windows.activate(window) {
                    Ok(()) => {
                        info!("Launcher window activated");
                        return true;
                    }
                    Err(e) => warn!("Window activation failed: {e:#}"),
                }
            }
            debug!(
                "Launcher window not found, attempt {}/{}",
                attempt, FOREGROUND_ATTEMPTS
            );
            sleep(FOREGROUND_RETRY_DELAY).await;
        }

        warn!("Launcher window could not be brought to the foreground");
        false
    }

    fn locate_window(
        &self,
        titles: &[String],
        query: &mut dyn ProcessQuery,
        process_variants: &[String],
    ) -> Option<WindowHandle> {
        for title in titles {
            if let Some(window) = self.windows.find_by_title(title) {
                debug!("Found launcher window by title '{}'", title);
                return Some(window);
            }
        }

        query.refresh();
        let info = query.find_by_name(process_variants)?;
        self.windows.main_window_of(info.pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testutil::{process, RecordingInput, ScriptedQuery, StaticWindows};
    use crate::platform::KeyAction;

    fn injector(input: RecordingInput, windows: StaticWindows, confirm: bool) -> InputInjector {
        InputInjector::new(Box::new(input), Box::new(windows), confirm)
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_full_key_sequence_in_order() {
        let input = RecordingInput::default();
        let keys = input.keys.clone();
        let clipboard = input.clipboard.clone();

        let report = injector(input, StaticWindows::default(), true)
            .deliver_credential("hunter2")
            .await;

        assert!(report.fully_delivered());
        assert_eq!(*clipboard.lock().unwrap(), ["hunter2"]);

        let recorded = keys.lock().unwrap().clone();
        let expected = [
            (Key::Control, KeyAction::Press),
            (Key::V, KeyAction::Press),
            (Key::V, KeyAction::Release),
            (Key::Control, KeyAction::Release),
            (Key::Return, KeyAction::Press),
            (Key::Return, KeyAction::Release),
            (Key::Return, KeyAction::Press),
            (Key::Return, KeyAction::Release),
        ];
        let recorded: Vec<(Key, KeyAction)> =
            recorded.iter().map(|e| (e.key, e.action)).collect();
        assert_eq!(recorded, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn second_confirm_is_skipped_when_disabled() {
        let input = RecordingInput::default();
        let keys = input.keys.clone();

        let report = injector(input, StaticWindows::default(), false)
            .deliver_credential("secret")
            .await;

        assert_eq!(report.prompt_confirm_ok, None);
        assert!(report.fully_delivered());
        // Paste chord + one confirm tap only
        assert_eq!(keys.lock().unwrap().len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_clipboard_does_not_abort_keystrokes() {
        let input = RecordingInput {
            fail_clipboard: true,
            ..Default::default()
        };
        let keys = input.keys.clone();

        let report = injector(input, StaticWindows::default(), true)
            .deliver_credential("secret")
            .await;

        assert!(!report.clipboard_ok);
        assert!(report.paste_ok);
        assert!(report.confirm_ok);
        assert!(!report.fully_delivered());
        assert_eq!(keys.lock().unwrap().len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn foreground_prefers_title_then_falls_back_to_pid() {
        // No window by title; launcher PID 55 resolves via the process query
        let windows = StaticWindows {
            by_title: None,
            by_pid: Some(77),
            ..Default::default()
        };
        let activated = windows.activated.clone();
        let injector = injector(RecordingInput::default(), windows, true);
        let mut query = ScriptedQuery::new(vec![vec![process("launcher", 55, 1)]]);

        let ok = injector
            .bring_to_foreground(
                &["Launcher".to_string()],
                &mut query,
                &["launcher".to_string()],
            )
            .await;

        assert!(ok);
        assert_eq!(*activated.lock().unwrap(), [77]);
    }

    #[tokio::test(start_paused = true)]
    async fn foreground_gives_up_after_bounded_attempts() {
        let injector = injector(RecordingInput::default(), StaticWindows::default(), true);
        let mut query = ScriptedQuery::new(vec![vec![]]);

        let ok = injector
            .bring_to_foreground(
                &["Launcher".to_string()],
                &mut query,
                &["launcher".to_string()],
            )
            .await;

        assert!(!ok);
    }
}
