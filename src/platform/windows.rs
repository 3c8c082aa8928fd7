//! Windows-specific window activation, clipboard and synthetic keyboard input

use anyhow::{Context, Result};
use tracing::debug;

use windows::core::PCWSTR;
use windows::Win32::Foundation::{GetLastError, BOOL, FALSE, HANDLE, HWND, LPARAM, TRUE};
use windows::Win32::System::DataExchange::{
    CloseClipboard, EmptyClipboard, OpenClipboard, SetClipboardData,
};
use windows::Win32::System::Memory::{
    GlobalAlloc, GlobalFree, GlobalLock, GlobalUnlock, GMEM_MOVEABLE,
};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYBD_EVENT_FLAGS, KEYEVENTF_KEYUP,
    VIRTUAL_KEY, VK_CONTROL, VK_RETURN, VK_V,
};
use windows::Win32::UI::WindowsAndMessaging::{
    BringWindowToTop, EnumWindows, FindWindowW, GetWindow, GetWindowThreadProcessId,
    IsWindowVisible, SetForegroundWindow, ShowWindow, GW_OWNER, SW_RESTORE,
};

use super::{InputSynth, Key, KeyAction, KeyEvent, WindowControl, WindowHandle};

const CF_UNICODETEXT: u32 = 13;

fn to_wide(text: &str) -> Vec<u16> {
    text.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Find a top-level window by its exact title.
pub fn find_window_by_title(title: &str) -> Option<WindowHandle> {
    let wide = to_wide(title);
    let hwnd = unsafe { FindWindowW(PCWSTR::null(), PCWSTR::from_raw(wide.as_ptr())) }.ok()?;
    if hwnd.is_invalid() {
        return None;
    }
    Some(WindowHandle(hwnd.0 as isize))
}

struct EnumState {
    pid: u32,
    found: isize,
}

unsafe extern "system" fn enum_proc(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let state = &mut *(lparam.0 as *mut EnumState);

    let mut pid = 0u32;
    GetWindowThreadProcessId(hwnd, Some(&mut pid));

    // Main window heuristic: visible, unowned top-level window of the process
    let unowned = GetWindow(hwnd, GW_OWNER)
        .map(|owner| owner.is_invalid())
        .unwrap_or(true);
    if pid == state.pid && IsWindowVisible(hwnd).as_bool() && unowned {
        state.found = hwnd.0 as isize;
        return FALSE; // stop enumeration
    }
    TRUE
}

/// Find the main window of a process by walking the top-level windows.
pub fn main_window_of_process(pid: u32) -> Option<WindowHandle> {
    let mut state = EnumState { pid, found: 0 };
    // EnumWindows reports an error when the callback stops it early; the
    // state tells us whether that was a hit.
    let _ = unsafe { EnumWindows(Some(enum_proc), LPARAM(&mut state as *mut EnumState as isize)) };
    (state.found != 0).then_some(WindowHandle(state.found))
}

/// Foreground-activate and restore a window.
pub fn activate_window(window: WindowHandle) -> Result<()> {
    let hwnd = HWND(window.0 as *mut std::ffi::c_void);
    if hwnd.is_invalid() {
        anyhow::bail!("Invalid window handle");
    }
    unsafe {
        if !SetForegroundWindow(hwnd).as_bool() {
            debug!("SetForegroundWindow was refused for handle {:?}", window.0);
        }
        let _ = BringWindowToTop(hwnd);
        let _ = ShowWindow(hwnd, SW_RESTORE);
    }
    Ok(())
}

/// Place text on the clipboard as CF_UNICODETEXT.
pub fn set_clipboard_text(text: &str) -> Result<()> {
    let wide = to_wide(text);
    let bytes = wide.len() * 2;

    unsafe {
        OpenClipboard(None).context("OpenClipboard failed")?;

        let result = (|| -> Result<()> {
            EmptyClipboard().context("EmptyClipboard failed")?;

            let hmem = GlobalAlloc(GMEM_MOVEABLE, bytes).context("GlobalAlloc failed")?;
            let ptr = GlobalLock(hmem);
            if ptr.is_null() {
                let _ = GlobalFree(hmem);
                anyhow::bail!("GlobalLock failed");
            }
            std::ptr::copy_nonoverlapping(wide.as_ptr() as *const u8, ptr as *mut u8, bytes);
            let _ = GlobalUnlock(hmem);

            // On success the clipboard owns the allocation.
            if SetClipboardData(CF_UNICODETEXT, HANDLE(hmem.0)).is_err() {
                let _ = GlobalFree(hmem);
                anyhow::bail!("SetClipboardData failed");
            }
            Ok(())
        })();

        let _ = CloseClipboard();
        result
    }
}

fn virtual_key(key: Key) -> VIRTUAL_KEY {
    match key {
        Key::Control => VK_CONTROL,
        Key::Return => VK_RETURN,
        Key::V => VK_V,
    }
}

fn keyboard_input(key: Key, action: KeyAction) -> INPUT {
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: virtual_key(key),
                wScan: 0,
                dwFlags: match action {
                    KeyAction::Press => KEYBD_EVENT_FLAGS(0),
                    KeyAction::Release => KEYEVENTF_KEYUP,
                },
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

/// Synthesize a sequence of key events against the focused window.
pub fn send_keys(events: &[KeyEvent]) -> Result<()> {
    if events.is_empty() {
        return Ok(());
    }

    let inputs: Vec<INPUT> = events
        .iter()
        .map(|event| keyboard_input(event.key, event.action))
        .collect();

    let sent = unsafe { SendInput(&inputs, std::mem::size_of::<INPUT>() as i32) };
    if sent != inputs.len() as u32 {
        let error = unsafe { GetLastError() };
        anyhow::bail!(
            "SendInput delivered {} of {} events (error {:?})",
            sent,
            inputs.len(),
            error
        );
    }
    Ok(())
}

/// Win32-backed window control.
pub struct NativeWindowControl;

impl WindowControl for NativeWindowControl {
    fn find_by_title(&self, title: &str) -> Option<WindowHandle> {
        find_window_by_title(title)
    }

    fn main_window_of(&self, pid: u32) -> Option<WindowHandle> {
        main_window_of_process(pid)
    }

    fn activate(&self, window: WindowHandle) -> Result<()> {
        activate_window(window)
    }
}

/// Win32-backed clipboard and keyboard synthesis.
pub struct NativeInputSynth;

impl InputSynth for NativeInputSynth {
    fn set_clipboard_text(&self, text: &str) -> Result<()> {
        set_clipboard_text(text)
    }

    fn send_keys(&self, events: &[KeyEvent]) -> Result<()> {
        send_keys(events)
    }
}
