use serde::{Deserialize, Serialize};
use std::fmt;

/// Signal aspect as reported by the simulation. Anything that permits
/// movement is collapsed into `Proceed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalAspect {
    Stop,
    Proceed,
}

impl SignalAspect {
    /// True when the signal permits departure.
    pub fn is_open(&self) -> bool {
        *self != SignalAspect::Stop
    }
}

impl Default for SignalAspect {
    fn default() -> Self {
        SignalAspect::Stop
    }
}

impl fmt::Display for SignalAspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalAspect::Stop => write!(f, "stop"),
            SignalAspect::Proceed => write!(f, "proceed"),
        }
    }
}

/// Identity of one platform track: station name plus track number.
/// Two snapshots refer to the same dwell exactly when their keys are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlatformKey {
    pub station_name: String,
    pub track_number: String,
}

impl PlatformKey {
    pub fn new(station_name: impl Into<String>, track_number: impl Into<String>) -> Self {
        PlatformKey {
            station_name: station_name.into(),
            track_number: track_number.into(),
        }
    }

    /// Lookup key used by the audio profile store (e.g., "Tatehama_1").
    pub fn key(&self) -> String {
        format!("{}_{}", self.station_name, self.track_number)
    }
}

impl fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} track {}", self.station_name, self.track_number)
    }
}

/// One telemetry poll, decoupled from any host-game representation.
/// All times are simulation seconds; the sim clock freezes while paused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub sim_time: f64,
    #[serde(default)]
    pub is_paused: bool,
    /// Speed in km/h.
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub doors_open: bool,
    #[serde(default)]
    pub signal_aspect: SignalAspect,
    /// Running number, e.g. "1206A". Direction is derived from its suffix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub train_number: Option<String>,
    /// Vehicle type codes of the consist, e.g. ["50000", "50100"].
    #[serde(default)]
    pub vehicle_type_codes: Vec<String>,
    /// Timetabled departure, sim seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_departure: Option<f64>,
    /// The platform track currently occupied, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<PlatformKey>,
}

impl TelemetrySnapshot {
    /// Boundary validation. A snapshot that fails here is treated exactly
    /// like missing telemetry: the engine sees "no platform".
    pub fn validate(&self) -> Result<(), String> {
        if !self.sim_time.is_finite() || self.sim_time < 0.0 {
            return Err(format!("invalid sim_time {}", self.sim_time));
        }
        if !self.speed.is_finite() {
            return Err(format!("invalid speed {}", self.speed));
        }
        if let Some(dep) = self.scheduled_departure {
            if !dep.is_finite() || dep < 0.0 {
                return Err(format!("invalid scheduled_departure {}", dep));
            }
        }
        Ok(())
    }

    /// True when the running number's last character is an even digit.
    /// Odd digits and non-numeric suffixes mean outbound, the default.
    pub fn is_inbound(&self) -> bool {
        let Some(number) = &self.train_number else {
            return false;
        };
        match number.chars().last() {
            Some(c) if c.is_ascii_digit() => (c as u8 - b'0') % 2 == 0,
            _ => false,
        }
    }

    /// Stopped threshold mirrors the simulation's own: below 0.1 km/h.
    pub fn is_stopped(&self) -> bool {
        self.speed < 0.1
    }

    /// True if any vehicle in the consist matches the high-speed series prefix.
    pub fn has_high_speed_vehicle(&self, prefix: &str) -> bool {
        !prefix.is_empty() && self.vehicle_type_codes.iter().any(|v| v.starts_with(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> TelemetrySnapshot {
        TelemetrySnapshot {
            sim_time: 100.0,
            is_paused: false,
            speed: 0.0,
            doors_open: false,
            signal_aspect: SignalAspect::Stop,
            train_number: None,
            vehicle_type_codes: vec![],
            scheduled_departure: None,
            platform: None,
        }
    }

    #[test]
    fn aspect_is_open() {
        assert!(!SignalAspect::Stop.is_open());
        assert!(SignalAspect::Proceed.is_open());
    }

    #[test]
    fn platform_key_lookup_format() {
        let key = PlatformKey::new("Tatehama", "1");
        assert_eq!(key.key(), "Tatehama_1");
        assert_eq!(format!("{}", key), "Tatehama track 1");
    }

    #[test]
    fn inbound_when_even_digit_suffix() {
        let mut s = snapshot();
        s.train_number = Some("1206".to_string());
        assert!(s.is_inbound());
        s.train_number = Some("1205".to_string());
        assert!(!s.is_inbound());
    }

    #[test]
    fn outbound_for_non_numeric_suffix() {
        let mut s = snapshot();
        s.train_number = Some("1206A".to_string());
        assert!(!s.is_inbound());
        s.train_number = Some(String::new());
        assert!(!s.is_inbound());
        s.train_number = None;
        assert!(!s.is_inbound());
    }

    #[test]
    fn high_speed_prefix_matches_any_vehicle() {
        let mut s = snapshot();
        s.vehicle_type_codes = vec!["E233".to_string(), "50000".to_string()];
        assert!(s.has_high_speed_vehicle("50000"));
        s.vehicle_type_codes = vec!["E233".to_string()];
        assert!(!s.has_high_speed_vehicle("50000"));
        assert!(!s.has_high_speed_vehicle(""));
    }

    #[test]
    fn stopped_below_threshold() {
        let mut s = snapshot();
        s.speed = 0.05;
        assert!(s.is_stopped());
        s.speed = 1.2;
        assert!(!s.is_stopped());
    }

    #[test]
    fn validate_rejects_bad_times() {
        let mut s = snapshot();
        s.sim_time = f64::NAN;
        assert!(s.validate().is_err());
        s.sim_time = -1.0;
        assert!(s.validate().is_err());
        s.sim_time = 5.0;
        s.scheduled_departure = Some(f64::INFINITY);
        assert!(s.validate().is_err());
        s.scheduled_departure = Some(30.0);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn snapshot_serde_roundtrip() {
        let mut s = snapshot();
        s.platform = Some(PlatformKey::new("Tatehama", "2"));
        s.signal_aspect = SignalAspect::Proceed;
        s.scheduled_departure = Some(180.5);
        let json = serde_json::to_string(&s).unwrap();
        let loaded: TelemetrySnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.platform, s.platform);
        assert_eq!(loaded.signal_aspect, SignalAspect::Proceed);
        assert_eq!(loaded.scheduled_departure, Some(180.5));
    }

    #[test]
    fn snapshot_defaults_when_fields_missing() {
        let json = r#"{"sim_time": 12.0}"#;
        let s: TelemetrySnapshot = serde_json::from_str(json).unwrap();
        assert!(!s.is_paused);
        assert!(!s.doors_open);
        assert_eq!(s.signal_aspect, SignalAspect::Stop);
        assert!(s.platform.is_none());
    }
}
