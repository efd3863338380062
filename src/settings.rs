use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SettingsError;

pub const SETTINGS_FILE: &str = "panel_settings.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PanelSettings {
    /// Message shown when the window has no tabs.
    pub empty_state_text: String,
    /// Label for tabs whose title is empty.
    pub untitled_title: String,
    /// Accessible label of the per-row close control.
    pub close_label: String,
    pub close_glyph: String,
    pub log_level: String, // "error", "warn", "info", "debug", "trace"
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            empty_state_text: "No tabs in this window".to_string(),
            untitled_title: "New Tab".to_string(),
            close_label: "Close tab".to_string(),
            close_glyph: "×".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl PanelSettings {
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(SETTINGS_FILE)
    }

    #[cfg(feature = "desktop")]
    pub fn get_path(app: &tauri::AppHandle) -> Result<PathBuf, SettingsError> {
        use tauri::Manager;

        let dir = app
            .path()
            .app_data_dir()
            .map_err(|e| SettingsError::Io(std::io::Error::other(e.to_string())))?;
        Ok(Self::path_in(&dir))
    }

    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                log::warn!("[Settings] Failed to parse {:?}: {}, returning defaults", path, e);
                Self::default()
            }),
            Err(e) => {
                log::warn!("[Settings] Failed to read {:?}: {}, returning defaults", path, e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let tmp_path = path.with_extension("tmp");
        let parent = path.parent().ok_or(SettingsError::NoParent)?;

        fs::create_dir_all(parent)?;

        let json = serde_json::to_string_pretty(self)?;

        // Write to tmp, then rename over the real file.
        fs::write(&tmp_path, json)?;
        fs::rename(tmp_path, path)?;

        Ok(())
    }

    pub fn level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let settings = PanelSettings::load(&PanelSettings::path_in(dir.path()));
        assert_eq!(settings, PanelSettings::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);

        let mut settings = PanelSettings::default();
        settings.empty_state_text = "Nothing open".to_string();
        settings.save(&path).unwrap();

        assert!(!path.with_extension("tmp").exists());
        assert_eq!(PanelSettings::load(&path), settings);
    }

    #[test]
    fn test_corrupt_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let path = PanelSettings::path_in(dir.path());
        fs::write(&path, "{ not json").unwrap();

        assert_eq!(PanelSettings::load(&path), PanelSettings::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = PanelSettings::path_in(dir.path());
        fs::write(&path, r#"{"untitled_title": "Untitled"}"#).unwrap();

        let settings = PanelSettings::load(&path);
        assert_eq!(settings.untitled_title, "Untitled");
        assert_eq!(settings.empty_state_text, "No tabs in this window");
    }

    #[rstest]
    #[case("debug", log::LevelFilter::Debug)]
    #[case("WARN", log::LevelFilter::Warn)]
    #[case("off", log::LevelFilter::Off)]
    #[case("loud", log::LevelFilter::Info)]
    fn test_level_filter(#[case] level: &str, #[case] expected: log::LevelFilter) {
        let settings = PanelSettings {
            log_level: level.to_string(),
            ..PanelSettings::default()
        };
        assert_eq!(settings.level_filter(), expected);
    }
}
