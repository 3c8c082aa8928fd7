//! Launch command resolution - locating the client executable
//!
//! Resolution order: configured override path, well-known install
//! directories, registry lookup, start-menu shortcut. The first hit wins.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use super::config::Settings;
use crate::platform::LaunchCommand;

/// Resolve the client executable, or `None` when no strategy finds one.
pub fn resolve_client_executable(settings: &Settings) -> Option<PathBuf> {
    if let Some(path) = &settings.client_path {
        if path.exists() {
            info!("Using configured client path: {}", path.display());
            return Some(path.clone());
        }
        warn!(
            "Configured client path {} does not exist, falling back to discovery",
            path.display()
        );
    }

    if let Some(path) = find_in_known_directories() {
        info!("Client found in install directory: {}", path.display());
        return Some(path);
    }
    if let Some(path) = find_in_registry() {
        info!("Client found via registry: {}", path.display());
        return Some(path);
    }
    if let Some(path) = find_start_menu_shortcut() {
        info!("Client found via start-menu shortcut: {}", path.display());
        return Some(path);
    }

    warn!("Client executable could not be located");
    None
}

/// Build the full launch command, including the app-launch argument.
pub fn build_launch_command(settings: &Settings) -> Option<LaunchCommand> {
    let program = resolve_client_executable(settings)?;
    let mut args = settings.client_args.clone();
    if let Some(app_id) = settings.app_id {
        args.push("-applaunch".to_string());
        args.push(app_id.to_string());
    }
    Some(LaunchCommand { program, args })
}

fn find_in_known_directories() -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    #[cfg(windows)]
    {
        candidates.push(PathBuf::from(r"C:\Program Files (x86)\Steam\Steam.exe"));
        candidates.push(PathBuf::from(r"C:\Program Files\Steam\Steam.exe"));
        if let Some(local) = dirs::data_local_dir() {
            candidates.push(local.join("Programs").join("Steam").join("Steam.exe"));
            candidates.push(local.join("Steam").join("Steam.exe"));
        }
        if let Some(roaming) = dirs::data_dir() {
            candidates.push(roaming.join("Steam").join("Steam.exe"));
        }
    }

    #[cfg(not(windows))]
    {
        candidates.push(PathBuf::from("/usr/bin/steam"));
        candidates.push(PathBuf::from("/usr/local/bin/steam"));
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".steam").join("steam").join("steam.sh"));
        }
    }

    for candidate in candidates {
        debug!("Probing install candidate {}", candidate.display());
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

#[cfg(windows)]
fn find_in_registry() -> Option<PathBuf> {
    use winreg::enums::HKEY_CURRENT_USER;
    use winreg::RegKey;

    let key = RegKey::predef(HKEY_CURRENT_USER)
        .open_subkey(r"SOFTWARE\Valve\Steam")
        .ok()?;
    let install_path: String = key.get_value("SteamPath").ok()?;
    let exe = PathBuf::from(install_path).join("Steam.exe");
    exe.exists().then_some(exe)
}

#[cfg(not(windows))]
fn find_in_registry() -> Option<PathBuf> {
    None
}

#[cfg(windows)]
fn find_start_menu_shortcut() -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Some(roaming) = dirs::data_dir() {
        let start_menu = roaming
            .join("Microsoft")
            .join("Windows")
            .join("Start Menu")
            .join("Programs");
        candidates.push(start_menu.join("Steam").join("Steam.lnk"));
        candidates.push(start_menu.join("Steam.lnk"));
    }
    let common = PathBuf::from(r"C:\ProgramData\Microsoft\Windows\Start Menu\Programs");
    candidates.push(common.join("Steam").join("Steam.lnk"));
    candidates.push(common.join("Steam.lnk"));

    candidates.into_iter().find(|candidate| candidate.exists())
}

#[cfg(not(windows))]
fn find_start_menu_shortcut() -> Option<PathBuf> {
    None
}
