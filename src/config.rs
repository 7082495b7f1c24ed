use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Automatic-mode thresholds and margins. Replaced wholesale on update —
/// readers always get a copy, never a live reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoModeConfig {
    #[serde(default)]
    pub is_enabled: bool,
    /// Seconds after the doors first open before the melody may start.
    #[serde(default = "default_delay_after_arrival")]
    pub delay_after_arrival: f64,
    /// Seconds after the signal clears (doors open) before the melody may start.
    #[serde(default = "default_delay_after_signal_open")]
    pub delay_after_signal_open: f64,
    /// Minimum melody play time before an automatic stop may fire.
    #[serde(default = "default_minimum_melody_duration")]
    pub minimum_melody_duration: f64,
    /// Minimum door-open time before an automatic stop may fire.
    #[serde(default = "default_minimum_door_open_duration")]
    pub minimum_door_open_duration: f64,
    /// Announcement length assumed when no clip exists to probe.
    #[serde(default = "default_fallback_announcement_duration")]
    pub fallback_announcement_duration: f64,
    /// Safety buffer subtracted from the scheduled departure, standard stock.
    #[serde(default = "default_standard_margin")]
    pub standard_margin: f64,
    /// Safety buffer for high-speed stock (longer door cycle).
    #[serde(default = "default_high_speed_margin")]
    pub high_speed_margin: f64,
    /// Vehicle-type series prefix that selects the high-speed margin.
    #[serde(default = "default_high_speed_prefix")]
    pub high_speed_prefix: String,
}

fn default_delay_after_arrival() -> f64 {
    1.0
}

fn default_delay_after_signal_open() -> f64 {
    0.5
}

fn default_minimum_melody_duration() -> f64 {
    1.0
}

fn default_minimum_door_open_duration() -> f64 {
    12.0
}

fn default_fallback_announcement_duration() -> f64 {
    3.0
}

fn default_standard_margin() -> f64 {
    8.5
}

fn default_high_speed_margin() -> f64 {
    16.5
}

fn default_high_speed_prefix() -> String {
    "50000".to_string()
}

impl Default for AutoModeConfig {
    fn default() -> Self {
        AutoModeConfig {
            is_enabled: false,
            delay_after_arrival: default_delay_after_arrival(),
            delay_after_signal_open: default_delay_after_signal_open(),
            minimum_melody_duration: default_minimum_melody_duration(),
            minimum_door_open_duration: default_minimum_door_open_duration(),
            fallback_announcement_duration: default_fallback_announcement_duration(),
            standard_margin: default_standard_margin(),
            high_speed_margin: default_high_speed_margin(),
            high_speed_prefix: default_high_speed_prefix(),
        }
    }
}

impl AutoModeConfig {
    /// Load configuration from JSON, or fall back to defaults if not found.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(data) => match serde_json::from_str(&data) {
                    Ok(config) => return config,
                    Err(e) => eprintln!("Warning: corrupt config file, using defaults: {}", e),
                },
                Err(e) => eprintln!("Warning: could not read config file: {}", e),
            }
        }
        AutoModeConfig::default()
    }

    /// Persist the configuration to JSON.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| format!("Serialize error: {}", e))?;
        fs::write(path, json).map_err(|e| format!("Write error: {}", e))?;
        Ok(())
    }

    /// Margin for the current consist: high-speed stock gets the longer one.
    pub fn margin_for(&self, vehicle_type_codes: &[String]) -> f64 {
        let high_speed = !self.high_speed_prefix.is_empty()
            && vehicle_type_codes
                .iter()
                .any(|v| v.starts_with(&self.high_speed_prefix));
        if high_speed {
            self.high_speed_margin
        } else {
            self.standard_margin
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let config = AutoModeConfig::default();
        assert!(!config.is_enabled);
        assert_eq!(config.delay_after_arrival, 1.0);
        assert_eq!(config.delay_after_signal_open, 0.5);
        assert_eq!(config.minimum_melody_duration, 1.0);
        assert_eq!(config.minimum_door_open_duration, 12.0);
        assert_eq!(config.fallback_announcement_duration, 3.0);
        assert_eq!(config.standard_margin, 8.5);
        assert_eq!(config.high_speed_margin, 16.5);
        assert_eq!(config.high_speed_prefix, "50000");
    }

    #[test]
    fn margin_selection_by_vehicle_type() {
        let config = AutoModeConfig::default();
        let standard = vec!["E233".to_string()];
        let high_speed = vec!["50000".to_string()];
        let mixed = vec!["E233".to_string(), "50100".to_string(), "50000".to_string()];
        assert_eq!(config.margin_for(&standard), 8.5);
        assert_eq!(config.margin_for(&high_speed), 16.5);
        assert_eq!(config.margin_for(&mixed), 16.5);
        assert_eq!(config.margin_for(&[]), 8.5);
    }

    #[test]
    fn serde_roundtrip_is_byte_identical() {
        let mut config = AutoModeConfig::default();
        config.is_enabled = true;
        config.delay_after_arrival = 2.0;
        config.minimum_door_open_duration = 15.0;
        let json = serde_json::to_string(&config).unwrap();
        let loaded: AutoModeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, config);
        let json_again = serde_json::to_string(&loaded).unwrap();
        assert_eq!(json, json_again);
    }

    #[test]
    fn missing_fields_get_defaults() {
        let json = r#"{"is_enabled": true}"#;
        let config: AutoModeConfig = serde_json::from_str(json).unwrap();
        assert!(config.is_enabled);
        assert_eq!(config.standard_margin, 8.5);
        assert_eq!(config.high_speed_prefix, "50000");
    }

    #[test]
    fn load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AutoModeConfig::load(&dir.path().join("absent.json"));
        assert_eq!(config, AutoModeConfig::default());
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = AutoModeConfig::default();
        config.is_enabled = true;
        config.high_speed_margin = 20.0;
        config.save(&path).unwrap();
        let loaded = AutoModeConfig::load(&path);
        assert_eq!(loaded, config);
    }
}
