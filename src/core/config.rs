//! Application settings management

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Flat settings record persisted as JSON.
///
/// Every field is optional in the file; missing fields fall back to the
/// documented defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Credential
    /// Encrypted account password blob (base64 of IV + ciphertext), if stored
    pub encrypted_password: Option<String>,

    // Auto start
    /// Arm the auto-start countdown when the application starts
    pub auto_start_enabled: bool,
    /// Countdown length in seconds before the automatic launch
    pub auto_start_delay_secs: u32,
    /// Auto-fill the credential when the launcher appears outside a session
    pub auto_fill_on_launcher_start: bool,

    // Readiness heuristic
    /// Resident memory (MB) above which the launcher counts as fully loaded
    pub launcher_ram_threshold_mb: u64,
    /// Wall-clock bound on the launcher/readiness waits
    pub readiness_max_wait_secs: u64,

    // Launch command
    /// Explicit client executable override; resolved automatically if unset
    pub client_path: Option<PathBuf>,
    /// Arguments always passed to the client
    pub client_args: Vec<String>,
    /// Client app id, passed as `-applaunch <id>` when set
    pub app_id: Option<u32>,

    // Tracked process names (ordered variants per target, first match wins)
    pub client_process_names: Vec<String>,
    pub launcher_process_names: Vec<String>,
    /// Process name of the game itself; empty until configured
    pub game_process_names: Vec<String>,
    /// Window titles tried when bringing the launcher to the foreground
    pub launcher_window_titles: Vec<String>,

    /// Send a second confirm key for the expected follow-up prompt
    pub confirm_follow_up_prompt: bool,

    // Polling intervals
    /// Client process poll interval in seconds
    pub client_poll_interval_secs: u64,
    /// Launcher/game process poll interval in seconds
    pub launcher_poll_interval_secs: u64,
    /// Status surface refresh interval in seconds
    pub status_refresh_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            encrypted_password: None,

            auto_start_enabled: false,
            auto_start_delay_secs: 5,
            auto_fill_on_launcher_start: true,

            launcher_ram_threshold_mb: 70,
            readiness_max_wait_secs: 120,

            client_path: None,
            client_args: vec!["-silent".to_string()],
            app_id: None,

            client_process_names: vec!["steam".to_string(), "steamwebhelper".to_string()],
            launcher_process_names: vec!["launcher".to_string()],
            game_process_names: Vec::new(),
            launcher_window_titles: vec!["Launcher".to_string()],

            confirm_follow_up_prompt: true,

            client_poll_interval_secs: 5,
            launcher_poll_interval_secs: 1,
            status_refresh_secs: 2,
        }
    }
}

impl Settings {
    /// Default location of the settings file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("launchpilot")
            .join("config.json")
    }

    /// Load settings from the default location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load settings from a specific path, falling back to defaults.
    ///
    /// A missing or unreadable file is normal on first start; a malformed
    /// file is logged and replaced by defaults rather than failing startup.
    pub fn load_from(path: &Path) -> Self {
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str::<Settings>(&json) {
            Ok(mut settings) => {
                settings.validate();
                settings
            }
            Err(e) => {
                warn!("Failed to parse settings at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save settings to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save settings to a specific path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    /// Validate settings and fix any invalid values.
    pub fn validate(&mut self) {
        self.launcher_ram_threshold_mb = self.launcher_ram_threshold_mb.max(1);
        self.readiness_max_wait_secs = self.readiness_max_wait_secs.clamp(10, 600);
        self.client_poll_interval_secs = self.client_poll_interval_secs.clamp(1, 60);
        self.launcher_poll_interval_secs = self.launcher_poll_interval_secs.clamp(1, 60);
        self.status_refresh_secs = self.status_refresh_secs.clamp(1, 60);
    }

    /// Whether a credential blob is stored (not whether it decrypts).
    pub fn has_credential(&self) -> bool {
        self.encrypted_password
            .as_deref()
            .is_some_and(|blob| !blob.is_empty())
    }

    pub fn ram_threshold_bytes(&self) -> u64 {
        self.launcher_ram_threshold_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.launcher_ram_threshold_mb, 70);
        assert_eq!(settings.auto_start_delay_secs, 5);
        assert_eq!(settings.client_poll_interval_secs, 5);
        assert_eq!(settings.launcher_poll_interval_secs, 1);
        assert!(!settings.auto_start_enabled);
        assert!(!settings.has_credential());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let settings = Settings {
            encrypted_password: Some("blob".to_string()),
            app_id: Some(1286830),
            game_process_names: vec!["game".to_string()],
            ..Default::default()
        };
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path);
        assert_eq!(loaded, settings);
        assert!(loaded.has_credential());
    }

    #[test]
    fn load_missing_or_malformed_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert_eq!(Settings::load_from(&missing), Settings::default());

        let malformed = dir.path().join("bad.json");
        std::fs::write(&malformed, "{not json").unwrap();
        assert_eq!(Settings::load_from(&malformed), Settings::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{"launcher_ram_threshold_mb": 128}"#).unwrap();

        let loaded = Settings::load_from(&path);
        assert_eq!(loaded.launcher_ram_threshold_mb, 128);
        assert_eq!(loaded.auto_start_delay_secs, 5);
    }

    #[test]
    fn validate_clamps_out_of_range_values() {
        let mut settings = Settings {
            launcher_ram_threshold_mb: 0,
            readiness_max_wait_secs: 0,
            client_poll_interval_secs: 0,
            launcher_poll_interval_secs: 600,
            ..Default::default()
        };
        settings.validate();
        assert_eq!(settings.launcher_ram_threshold_mb, 1);
        assert_eq!(settings.readiness_max_wait_secs, 10);
        assert_eq!(settings.client_poll_interval_secs, 1);
        assert_eq!(settings.launcher_poll_interval_secs, 60);
    }
}
