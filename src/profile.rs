use crate::telemetry::PlatformKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Audio assets for one station platform: the looping departure melody and
/// the direction-dependent door-close announcements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioProfile {
    pub station_name: String,
    pub track_number: String,
    pub melody: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub announcement_inbound: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub announcement_outbound: Option<PathBuf>,
}

impl AudioProfile {
    pub fn key(&self) -> String {
        format!("{}_{}", self.station_name, self.track_number)
    }

    /// Announcement clip for the given direction, if one is configured.
    pub fn announcement_for(&self, inbound: bool) -> Option<&PathBuf> {
        if inbound {
            self.announcement_inbound.as_ref()
        } else {
            self.announcement_outbound.as_ref()
        }
    }
}

/// Profile lookup keyed by "station_track", with a default melody used when
/// a platform has no profile or its melody file is missing.
pub struct ProfileStore {
    profiles: HashMap<String, AudioProfile>,
    default_melody: PathBuf,
}

impl ProfileStore {
    /// Load profiles from a JSON array file.
    pub fn load(path: &Path, default_melody: PathBuf) -> Result<Self, String> {
        let data = fs::read_to_string(path)
            .map_err(|e| format!("Cannot read profiles '{}': {}", path.display(), e))?;
        let list: Vec<AudioProfile> = serde_json::from_str(&data)
            .map_err(|e| format!("Cannot parse profiles '{}': {}", path.display(), e))?;
        let mut profiles = HashMap::new();
        for profile in list {
            profiles.insert(profile.key(), profile);
        }
        Ok(ProfileStore {
            profiles,
            default_melody,
        })
    }

    /// A store with no profiles; every melody resolves to the default.
    pub fn empty(default_melody: PathBuf) -> Self {
        ProfileStore {
            profiles: HashMap::new(),
            default_melody,
        }
    }

    pub fn find(&self, key: &PlatformKey) -> Option<&AudioProfile> {
        self.profiles.get(&key.key())
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn profiles(&self) -> impl Iterator<Item = &AudioProfile> {
        self.profiles.values()
    }

    /// Resolve the melody for a platform. Falls back to the default melody
    /// when the platform has no profile or its file is gone; a missing
    /// default as well is a hard error.
    pub fn resolve_melody(&self, key: &PlatformKey) -> Result<PathBuf, String> {
        if let Some(profile) = self.find(key) {
            if profile.melody.exists() {
                return Ok(profile.melody.clone());
            }
            eprintln!(
                "Warning: melody file missing for {}: {}, using default",
                key,
                profile.melody.display()
            );
        }
        if self.default_melody.exists() {
            return Ok(self.default_melody.clone());
        }
        Err(format!(
            "No melody for {} and default melody '{}' is missing",
            key,
            self.default_melody.display()
        ))
    }

    /// Resolve the door-close announcement for a platform and direction.
    /// Announcements have no fallback; absent or missing files yield None.
    pub fn resolve_announcement(&self, key: &PlatformKey, inbound: bool) -> Option<PathBuf> {
        let profile = self.find(key)?;
        let path = profile.announcement_for(inbound)?;
        if path.exists() {
            Some(path.clone())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn touch(path: &Path) {
        File::create(path).unwrap();
    }

    fn store_with_profile(dir: &Path) -> ProfileStore {
        let melody = dir.join("tatehama_1.mp3");
        let inbound = dir.join("doors_up.mp3");
        touch(&melody);
        touch(&inbound);
        let default = dir.join("default.mp3");
        touch(&default);
        let mut store = ProfileStore::empty(default);
        store.profiles.insert(
            "Tatehama_1".to_string(),
            AudioProfile {
                station_name: "Tatehama".to_string(),
                track_number: "1".to_string(),
                melody,
                announcement_inbound: Some(inbound),
                announcement_outbound: None,
            },
        );
        store
    }

    #[test]
    fn load_parses_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        fs::write(
            &path,
            r#"[{"station_name":"Tatehama","track_number":"1","melody":"m.mp3"}]"#,
        )
        .unwrap();
        let store = ProfileStore::load(&path, dir.path().join("default.mp3")).unwrap();
        assert_eq!(store.len(), 1);
        let profile = store.find(&PlatformKey::new("Tatehama", "1")).unwrap();
        assert_eq!(profile.melody, PathBuf::from("m.mp3"));
        assert!(profile.announcement_inbound.is_none());
    }

    #[test]
    fn load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let result = ProfileStore::load(&dir.path().join("absent.json"), PathBuf::new());
        assert!(result.is_err());
    }

    #[test]
    fn resolve_melody_prefers_profile() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_profile(dir.path());
        let path = store.resolve_melody(&PlatformKey::new("Tatehama", "1")).unwrap();
        assert_eq!(path, dir.path().join("tatehama_1.mp3"));
    }

    #[test]
    fn resolve_melody_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_profile(dir.path());
        // No profile for track 2, default exists
        let path = store.resolve_melody(&PlatformKey::new("Tatehama", "2")).unwrap();
        assert_eq!(path, dir.path().join("default.mp3"));
    }

    #[test]
    fn resolve_melody_hard_error_without_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::empty(dir.path().join("absent_default.mp3"));
        let result = store.resolve_melody(&PlatformKey::new("Nowhere", "9"));
        assert!(result.is_err());
    }

    #[test]
    fn resolve_announcement_by_direction() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_profile(dir.path());
        let key = PlatformKey::new("Tatehama", "1");
        assert_eq!(
            store.resolve_announcement(&key, true),
            Some(dir.path().join("doors_up.mp3"))
        );
        // Outbound variant not configured
        assert_eq!(store.resolve_announcement(&key, false), None);
    }

    #[test]
    fn resolve_announcement_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with_profile(dir.path());
        let key = PlatformKey::new("Tatehama", "1");
        store
            .profiles
            .get_mut("Tatehama_1")
            .unwrap()
            .announcement_inbound = Some(dir.path().join("gone.mp3"));
        assert_eq!(store.resolve_announcement(&key, true), None);
    }
}
