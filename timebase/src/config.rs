//! Persistent settings.
//!
//! Settings path: `<config dir>/timebase/settings.json`. Every field has a
//! default, so a partial file is fine; a missing or unreadable file yields
//! the defaults.

use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use timebase_core::PacketLayout;

use crate::recording::manager::recordings_dir;

pub fn get_project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "timebase", "timebase")
}

/// Default settings file location
pub fn settings_path() -> PathBuf {
    get_project_dirs()
        .map(|dirs| dirs.config_dir().join("settings.json"))
        .unwrap_or_else(|| PathBuf::from("./settings.json"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Overrides the per-user data directory
    pub recordings_dir: Option<PathBuf>,
    /// Writer thread poll interval; also bounds stop latency
    pub poll_interval_ms: u64,
    pub layout: PacketLayout,
    /// Playback tick interval
    pub tick_interval_ms: u64,
    pub default_rate: f32,
    pub loop_playback: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            recordings_dir: None,
            poll_interval_ms: 10,
            layout: PacketLayout::default(),
            tick_interval_ms: 16,
            default_rate: 1.0,
            loop_playback: false,
        }
    }
}

impl Settings {
    /// Load from the default settings file
    pub fn load() -> Self {
        Self::load_from(&settings_path())
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            debug!("No settings file at {}, using defaults", path.display());
            return Self::default();
        }

        let parsed = File::open(path)
            .map_err(|e| e.to_string())
            .and_then(|file| {
                serde_json::from_reader(BufReader::new(file)).map_err(|e| e.to_string())
            });
        match parsed {
            Ok(settings) => {
                debug!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                warn!("Failed to read settings {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn recordings_dir(&self) -> PathBuf {
        self.recordings_dir.clone().unwrap_or_else(recordings_dir)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::load_from(&temp.path().join("settings.json"));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.poll_interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "layout": "native", "loopPlayback": true, "recordingsDir": "/data/rec" }"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings.layout, PacketLayout::Native);
        assert!(settings.loop_playback);
        assert_eq!(settings.recordings_dir(), PathBuf::from("/data/rec"));
        assert_eq!(settings.tick_interval_ms, 16);
        assert_eq!(settings.default_rate, 1.0);
    }

    #[test]
    fn test_malformed_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        assert_eq!(Settings::load_from(&path), Settings::default());
    }
}
