//! Playback Orchestrator — turns engine decisions (or manual overrides)
//! into the visible melody state and the physical audio actions.
//!
//! Owns the process-wide melody and announcement outputs through the
//! `AudioBackend` seam. The door-close announcement is sequenced on the
//! simulation clock: after a stop, 1.0 sim-second must elapse before the
//! announcement plays, advanced by the shared 16 ms tick so pausing the
//! game pauses the settle wait too.

use crate::playback::AudioBackend;
use crate::profile::ProfileStore;
use crate::telemetry::PlatformKey;
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Sim-seconds between stopping the melody and the door-close announcement,
/// so the melody tail is not clipped.
pub const SETTLE_DELAY_SECS: f64 = 1.0;

/// Externally visible playback state. Mutated only by the orchestrator;
/// readers always get a copy.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MelodyState {
    pub is_playing: bool,
    pub current_track: Option<PlatformKey>,
    /// Sim time the melody loop started.
    pub started_at: Option<f64>,
    /// Bookkeeping for observers; never gates further automatic behavior.
    pub announcement_played: bool,
}

/// A door-close announcement waiting out the settle delay.
#[derive(Debug, Clone)]
struct PendingAnnouncement {
    key: PlatformKey,
    due_at: f64,
    inbound: bool,
}

pub struct PlaybackOrchestrator {
    backend: Mutex<Box<dyn AudioBackend>>,
    profiles: Arc<ProfileStore>,
    state: Mutex<MelodyState>,
    pending: Mutex<Option<PendingAnnouncement>>,
}

impl PlaybackOrchestrator {
    pub fn new(backend: Box<dyn AudioBackend>, profiles: Arc<ProfileStore>) -> Self {
        PlaybackOrchestrator {
            backend: Mutex::new(backend),
            profiles,
            state: Mutex::new(MelodyState::default()),
            pending: Mutex::new(None),
        }
    }

    /// Current state snapshot.
    pub fn state(&self) -> MelodyState {
        self.state.lock().unwrap().clone()
    }

    /// Start the melody loop for a platform. Idempotent while playing.
    /// A missing melody (and missing default) aborts and leaves the state
    /// unplaying.
    pub fn start(&self, track: &PlatformKey, now: f64) -> Result<(), String> {
        if self.state.lock().unwrap().is_playing {
            return Ok(());
        }
        let melody = self.profiles.resolve_melody(track)?;
        self.backend.lock().unwrap().play_melody_loop(&melody)?;
        *self.state.lock().unwrap() = MelodyState {
            is_playing: true,
            current_track: Some(track.clone()),
            started_at: Some(now),
            announcement_played: false,
        };
        println!("Melody started: {}", track);
        Ok(())
    }

    /// Stop the melody loop and queue the door-close announcement for
    /// `now + SETTLE_DELAY_SECS` sim time. No-op when not playing.
    pub fn stop(&self, now: f64, inbound: bool) {
        let track = {
            let mut state = self.state.lock().unwrap();
            if !state.is_playing {
                return;
            }
            let Some(track) = state.current_track.clone() else {
                // Playing with no recorded track should be impossible;
                // abort and leave the state untouched.
                eprintln!("Error: stop requested with no recorded track");
                return;
            };
            state.is_playing = false;
            track
        };
        self.backend.lock().unwrap().stop_melody();
        println!("Melody stopped: {}", track);
        *self.pending.lock().unwrap() = Some(PendingAnnouncement {
            key: track,
            due_at: now + SETTLE_DELAY_SECS,
            inbound,
        });
    }

    /// Advance the settle wait. Fires the pending announcement once sim
    /// time reaches its due instant and the train is still at the same
    /// platform; a changed or vacated dwell cancels it instead.
    pub fn tick(&self, now: f64, platform: Option<&PlatformKey>) {
        let due = {
            let mut pending = self.pending.lock().unwrap();
            match pending.as_ref() {
                Some(p) if now >= p.due_at => pending.take(),
                _ => return,
            }
        };
        let Some(due) = due else { return };

        if platform != Some(&due.key) {
            println!("Door-close announcement cancelled: left {}", due.key);
            return;
        }

        match self.profiles.resolve_announcement(&due.key, due.inbound) {
            Some(path) => {
                println!(
                    "Door-close announcement: {} ({})",
                    due.key,
                    if due.inbound { "inbound" } else { "outbound" }
                );
                if let Err(e) = self.backend.lock().unwrap().play_announcement(&path) {
                    // Soft failure: report and continue without the clip.
                    eprintln!("Warning: announcement playback failed: {}", e);
                }
            }
            None => {
                eprintln!(
                    "Warning: no door-close announcement for {} ({})",
                    due.key,
                    if due.inbound { "inbound" } else { "outbound" }
                );
            }
        }
        // Set after the attempt whether or not the clip existed: the flag
        // is bookkeeping for observers, not a gate.
        self.state.lock().unwrap().announcement_played = true;
    }

    /// Abrupt stop for a departing train: kill the loop, cancel any pending
    /// announcement, leave `announcement_played` as it was.
    pub fn force_stop(&self) {
        *self.pending.lock().unwrap() = None;
        let mut state = self.state.lock().unwrap();
        if state.is_playing {
            self.backend.lock().unwrap().stop_melody();
            state.is_playing = false;
            println!("Melody stopped: train left the platform");
        }
    }

    /// Simulation paused: hold both outputs.
    pub fn pause_outputs(&self) {
        self.backend.lock().unwrap().pause_all();
    }

    /// Simulation resumed: release both outputs.
    pub fn resume_outputs(&self) {
        self.backend.lock().unwrap().resume_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::path::Path;

    /// Test backend that records every call.
    struct RecordingBackend {
        actions: Arc<Mutex<Vec<String>>>,
    }

    impl AudioBackend for RecordingBackend {
        fn play_melody_loop(&mut self, path: &Path) -> Result<(), String> {
            self.actions
                .lock()
                .unwrap()
                .push(format!("melody:{}", path.file_name().unwrap().to_string_lossy()));
            Ok(())
        }

        fn stop_melody(&mut self) {
            self.actions.lock().unwrap().push("stop".to_string());
        }

        fn play_announcement(&mut self, path: &Path) -> Result<(), String> {
            self.actions.lock().unwrap().push(format!(
                "announce:{}",
                path.file_name().unwrap().to_string_lossy()
            ));
            Ok(())
        }

        fn pause_all(&mut self) {
            self.actions.lock().unwrap().push("pause".to_string());
        }

        fn resume_all(&mut self) {
            self.actions.lock().unwrap().push("resume".to_string());
        }
    }

    fn key() -> PlatformKey {
        PlatformKey::new("Tatehama", "1")
    }

    fn fixture(dir: &Path) -> Arc<ProfileStore> {
        let melody = dir.join("melody.mp3");
        let inbound = dir.join("up.mp3");
        let outbound = dir.join("down.mp3");
        let default = dir.join("default.mp3");
        for p in [&melody, &inbound, &outbound, &default] {
            File::create(p).unwrap();
        }
        let json = serde_json::to_string(&vec![crate::profile::AudioProfile {
            station_name: "Tatehama".to_string(),
            track_number: "1".to_string(),
            melody,
            announcement_inbound: Some(inbound),
            announcement_outbound: Some(outbound),
        }])
        .unwrap();
        let path = dir.join("profiles.json");
        std::fs::write(&path, json).unwrap();
        Arc::new(ProfileStore::load(&path, default).unwrap())
    }

    fn make(dir: &Path) -> (PlaybackOrchestrator, Arc<Mutex<Vec<String>>>) {
        let actions = Arc::new(Mutex::new(Vec::new()));
        let backend = RecordingBackend {
            actions: actions.clone(),
        };
        let orchestrator = PlaybackOrchestrator::new(Box::new(backend), fixture(dir));
        (orchestrator, actions)
    }

    #[test]
    fn start_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, actions) = make(dir.path());
        orch.start(&key(), 10.0).unwrap();
        let first = orch.state();
        orch.start(&key(), 25.0).unwrap();
        let second = orch.state();
        assert!(second.is_playing);
        assert_eq!(second.started_at, first.started_at);
        assert_eq!(actions.lock().unwrap().len(), 1);
    }

    #[test]
    fn start_sets_full_state() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, _) = make(dir.path());
        orch.start(&key(), 10.0).unwrap();
        let state = orch.state();
        assert!(state.is_playing);
        assert_eq!(state.current_track, Some(key()));
        assert_eq!(state.started_at, Some(10.0));
        assert!(!state.announcement_played);
    }

    #[test]
    fn missing_melody_and_default_is_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        let actions = Arc::new(Mutex::new(Vec::new()));
        let backend = RecordingBackend {
            actions: actions.clone(),
        };
        let profiles = Arc::new(ProfileStore::empty(dir.path().join("absent.mp3")));
        let orch = PlaybackOrchestrator::new(Box::new(backend), profiles);
        assert!(orch.start(&key(), 10.0).is_err());
        assert!(!orch.state().is_playing);
        assert!(actions.lock().unwrap().is_empty());
    }

    #[test]
    fn stop_then_announcement_after_settle_delay() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, actions) = make(dir.path());
        orch.start(&key(), 10.0).unwrap();
        orch.stop(20.0, true);
        assert!(!orch.state().is_playing);

        // Settle delay not yet elapsed on the sim clock.
        orch.tick(20.5, Some(&key()));
        assert!(!orch.state().announcement_played);

        orch.tick(21.0, Some(&key()));
        let state = orch.state();
        assert!(state.announcement_played);
        let recorded = actions.lock().unwrap().clone();
        assert_eq!(recorded, vec!["melody:melody.mp3", "stop", "announce:up.mp3"]);
    }

    #[test]
    fn direction_selects_announcement_variant() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, actions) = make(dir.path());
        orch.start(&key(), 10.0).unwrap();
        orch.stop(20.0, false);
        orch.tick(21.0, Some(&key()));
        assert!(actions
            .lock()
            .unwrap()
            .contains(&"announce:down.mp3".to_string()));
    }

    #[test]
    fn settle_wait_frozen_while_sim_time_frozen() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, _) = make(dir.path());
        orch.start(&key(), 10.0).unwrap();
        orch.stop(20.0, true);
        // Paused simulation: sim time does not advance, so no amount of
        // ticking fires the announcement.
        for _ in 0..50 {
            orch.tick(20.0, Some(&key()));
        }
        assert!(!orch.state().announcement_played);
        orch.tick(21.0, Some(&key()));
        assert!(orch.state().announcement_played);
    }

    #[test]
    fn dwell_change_cancels_pending_announcement() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, actions) = make(dir.path());
        orch.start(&key(), 10.0).unwrap();
        orch.stop(20.0, true);
        let other = PlatformKey::new("Okutsu", "3");
        orch.tick(21.0, Some(&other));
        assert!(!orch.state().announcement_played);
        // Cancelled for good, not deferred.
        orch.tick(25.0, Some(&key()));
        assert!(!orch.state().announcement_played);
        assert!(!actions.lock().unwrap().iter().any(|a| a.starts_with("announce")));
    }

    #[test]
    fn force_stop_skips_announcement_and_keeps_flag() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, actions) = make(dir.path());
        orch.start(&key(), 10.0).unwrap();
        orch.force_stop();
        let state = orch.state();
        assert!(!state.is_playing);
        assert!(!state.announcement_played);
        // No announcement later either.
        orch.tick(30.0, None);
        assert!(!orch.state().announcement_played);
        assert_eq!(
            actions.lock().unwrap().clone(),
            vec!["melody:melody.mp3", "stop"]
        );
    }

    #[test]
    fn force_stop_cancels_in_flight_settle_wait() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, actions) = make(dir.path());
        orch.start(&key(), 10.0).unwrap();
        orch.stop(20.0, true);
        orch.force_stop();
        orch.tick(25.0, Some(&key()));
        assert!(!orch.state().announcement_played);
        assert!(!actions.lock().unwrap().iter().any(|a| a.starts_with("announce")));
    }

    #[test]
    fn stop_without_playing_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, actions) = make(dir.path());
        orch.stop(20.0, true);
        assert!(actions.lock().unwrap().is_empty());
        orch.tick(30.0, Some(&key()));
        assert!(!orch.state().announcement_played);
    }

    #[test]
    fn missing_announcement_is_soft_and_still_sets_flag() {
        let dir = tempfile::tempdir().unwrap();
        let actions = Arc::new(Mutex::new(Vec::new()));
        let backend = RecordingBackend {
            actions: actions.clone(),
        };
        // Default melody exists but the platform has no profile at all,
        // so there is no announcement to play.
        let default = dir.path().join("default.mp3");
        File::create(&default).unwrap();
        let orch =
            PlaybackOrchestrator::new(Box::new(backend), Arc::new(ProfileStore::empty(default)));
        orch.start(&key(), 10.0).unwrap();
        orch.stop(20.0, true);
        orch.tick(21.0, Some(&key()));
        let state = orch.state();
        assert!(state.announcement_played);
        assert!(!actions.lock().unwrap().iter().any(|a| a.starts_with("announce")));
    }

    #[test]
    fn pause_and_resume_forwarded_to_backend() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, actions) = make(dir.path());
        orch.pause_outputs();
        orch.resume_outputs();
        assert_eq!(actions.lock().unwrap().clone(), vec!["pause", "resume"]);
    }
}
