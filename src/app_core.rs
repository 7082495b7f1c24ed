//! AppCore — central hub for the departure-melody controller.
//!
//! Wires the trigger engine, playback orchestrator, duration prober,
//! profile store and configuration behind one interface. The periodic
//! driver calls `tick` with the latest telemetry; UI/API callers read
//! state snapshots and issue manual overrides concurrently. Every per-tick
//! failure is caught here and logged — nothing may terminate the driver.

use crate::config::AutoModeConfig;
use crate::orchestrator::{MelodyState, PlaybackOrchestrator};
use crate::playback::AudioBackend;
use crate::prober::{DurationProber, ProbeRequest};
use crate::profile::ProfileStore;
use crate::telemetry::TelemetrySnapshot;
use crate::trigger::{TriggerDecision, TriggerEngine, TriggerWindow};
use chrono::Local;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

// ── Log buffer ──────────────────────────────────────────────────────────────

const LOG_BUFFER_MAX: usize = 500;

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub message: String,
}

pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
}

impl LogBuffer {
    pub fn new() -> Self {
        LogBuffer {
            entries: VecDeque::new(),
        }
    }

    pub fn push(&mut self, level: &str, message: String) {
        let timestamp = Local::now().format("%H:%M:%S").to_string();
        self.entries.push_back(LogEntry {
            timestamp,
            level: level.to_string(),
            message,
        });
        while self.entries.len() > LOG_BUFFER_MAX {
            self.entries.pop_front();
        }
    }

    pub fn get(&self, since_index: usize) -> Vec<LogEntry> {
        self.entries.iter().skip(since_index).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// ── Status snapshot ─────────────────────────────────────────────────────────

/// Derived UI state, recomputed on every telemetry change. Manual buttons
/// are enabled only on a platform, unpaused, with automatic mode off.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct UiStatus {
    pub ui_enabled: bool,
    pub on_platform: bool,
    pub paused: bool,
    pub auto_enabled: bool,
}

// ── AppCore ─────────────────────────────────────────────────────────────────

pub struct AppCore {
    engine: Mutex<TriggerEngine>,
    orchestrator: PlaybackOrchestrator,
    config: Mutex<AutoModeConfig>,
    prober: DurationProber,
    profiles: Arc<ProfileStore>,
    log: Mutex<LogBuffer>,
    was_paused: Mutex<bool>,
    last_snapshot: Mutex<Option<TelemetrySnapshot>>,
}

impl AppCore {
    pub fn new(
        profiles: ProfileStore,
        config: AutoModeConfig,
        backend: Box<dyn AudioBackend>,
    ) -> Self {
        let profiles = Arc::new(profiles);
        AppCore {
            engine: Mutex::new(TriggerEngine::new()),
            orchestrator: PlaybackOrchestrator::new(backend, profiles.clone()),
            config: Mutex::new(config),
            prober: DurationProber::new(),
            profiles,
            log: Mutex::new(LogBuffer::new()),
            was_paused: Mutex::new(false),
            last_snapshot: Mutex::new(None),
        }
    }

    /// One engine tick. `None` (or invalid telemetry) is treated as "no
    /// platform": the dwell is cleared and any playing melody is cut.
    pub fn tick(&self, snapshot: Option<TelemetrySnapshot>) {
        let snapshot = match snapshot {
            Some(s) => match s.validate() {
                Ok(()) => Some(s),
                Err(e) => {
                    self.log("warn", format!("Telemetry rejected: {}", e));
                    None
                }
            },
            None => None,
        };

        let Some(snapshot) = snapshot else {
            self.engine.lock().unwrap().reset();
            self.orchestrator.force_stop();
            *self.last_snapshot.lock().unwrap() = None;
            return;
        };

        *self.last_snapshot.lock().unwrap() = Some(snapshot.clone());

        // Pause freezes the outputs and the whole evaluation; sim time is
        // frozen anyway, so nothing below could change either.
        {
            let mut was_paused = self.was_paused.lock().unwrap();
            if snapshot.is_paused {
                if !*was_paused {
                    self.orchestrator.pause_outputs();
                    *was_paused = true;
                    self.log("info", "Simulation paused".to_string());
                }
                return;
            }
            if *was_paused {
                self.orchestrator.resume_outputs();
                *was_paused = false;
                self.log("info", "Simulation resumed".to_string());
            }
        }

        if snapshot.platform.is_none() {
            self.engine.lock().unwrap().reset();
            // Departing-train case: abrupt stop, announcement skipped.
            self.orchestrator.force_stop();
            return;
        }

        let config = self.get_config();

        // Fold in any finished duration probes; results for a dwell that
        // has since ended are dropped by the engine.
        while let Some(result) = self.prober.poll() {
            let melody = result.melody_secs.unwrap_or(0.0);
            let announcement = result
                .announcement_secs
                .unwrap_or(config.fallback_announcement_duration);
            self.engine
                .lock()
                .unwrap()
                .set_durations(&result.key, melody, announcement);
            self.log(
                "info",
                format!(
                    "Durations for {}: melody {:.1}s, announcement {:.1}s",
                    result.key, melody, announcement
                ),
            );
        }

        if config.is_enabled {
            let melody = self.orchestrator.state();
            let decision = self
                .engine
                .lock()
                .unwrap()
                .tick(&snapshot, &config, &melody);
            match decision {
                TriggerDecision::RequestOn => {
                    if let Some(key) = snapshot.platform.as_ref() {
                        match self.orchestrator.start(key, snapshot.sim_time) {
                            Ok(()) => self.log("info", format!("Auto: melody on at {}", key)),
                            Err(e) => self.log("error", format!("Auto start failed: {}", e)),
                        }
                    }
                }
                TriggerDecision::RequestOff => {
                    self.orchestrator.stop(snapshot.sim_time, snapshot.is_inbound());
                    self.log("info", "Auto: melody off".to_string());
                }
                TriggerDecision::NoChange => {}
            }

            // A fresh dwell wants its clip durations measured.
            let probe = self.engine.lock().unwrap().take_probe_request();
            if let Some(key) = probe {
                let melody = self.profiles.resolve_melody(&key).ok();
                let announcement =
                    self.profiles.resolve_announcement(&key, snapshot.is_inbound());
                self.prober.probe(ProbeRequest {
                    key,
                    melody,
                    announcement,
                });
            }
        }

        // Advance the settle wait / pending announcement regardless of
        // automatic mode — manual stops use the same sequencing.
        self.orchestrator
            .tick(snapshot.sim_time, snapshot.platform.as_ref());
    }

    // ── Manual overrides (Presentation Adapter entry points) ────────────

    /// Operator pressed the melody button. Rejected while automatic mode
    /// holds the engaged state.
    pub fn request_start(&self) -> Result<(), String> {
        if self.get_config().is_enabled {
            return Err("Automatic mode is engaged".to_string());
        }
        let snapshot = self
            .last_snapshot
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| "No telemetry received yet".to_string())?;
        let key = snapshot
            .platform
            .clone()
            .ok_or_else(|| "Not on a platform track".to_string())?;
        self.orchestrator.start(&key, snapshot.sim_time)?;
        self.log("info", format!("Manual: melody on at {}", key));
        Ok(())
    }

    /// Operator released the melody button.
    pub fn request_stop(&self) -> Result<(), String> {
        if self.get_config().is_enabled {
            return Err("Automatic mode is engaged".to_string());
        }
        let snapshot = self
            .last_snapshot
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| "No telemetry received yet".to_string())?;
        self.orchestrator
            .stop(snapshot.sim_time, snapshot.is_inbound());
        self.log("info", "Manual: melody off".to_string());
        Ok(())
    }

    // ── Snapshots for UI/API consumers ──────────────────────────────────

    pub fn melody_state(&self) -> MelodyState {
        self.orchestrator.state()
    }

    pub fn ui_status(&self) -> UiStatus {
        let auto_enabled = self.get_config().is_enabled;
        match self.last_snapshot.lock().unwrap().as_ref() {
            Some(s) => UiStatus {
                ui_enabled: s.platform.is_some() && !s.is_paused && !auto_enabled,
                on_platform: s.platform.is_some(),
                paused: s.is_paused,
                auto_enabled,
            },
            None => UiStatus {
                auto_enabled,
                ..UiStatus::default()
            },
        }
    }

    /// Derived melody window for the current dwell, for diagnostics.
    pub fn trigger_window(&self) -> Option<TriggerWindow> {
        let config = self.get_config();
        let snapshot = self.last_snapshot.lock().unwrap();
        let codes: &[String] = snapshot
            .as_ref()
            .map(|s| s.vehicle_type_codes.as_slice())
            .unwrap_or(&[]);
        self.engine.lock().unwrap().window(&config, codes)
    }

    // ── Configuration surface ───────────────────────────────────────────

    pub fn get_config(&self) -> AutoModeConfig {
        self.config.lock().unwrap().clone()
    }

    /// Hot-swap the whole configuration; no partial updates.
    pub fn update_config(&self, config: AutoModeConfig) {
        *self.config.lock().unwrap() = config;
        self.log("info", "Configuration updated".to_string());
    }

    pub fn set_auto_enabled(&self, enabled: bool) {
        let mut config = self.get_config();
        config.is_enabled = enabled;
        *self.config.lock().unwrap() = config;
        self.log(
            "info",
            format!("Automatic mode {}", if enabled { "on" } else { "off" }),
        );
    }

    // ── Logging ─────────────────────────────────────────────────────────

    pub fn get_log(&self, since_index: usize) -> Vec<LogEntry> {
        self.log.lock().unwrap().get(since_index)
    }

    fn log(&self, level: &str, message: String) {
        eprintln!("[{}] {}", level, message);
        self.log.lock().unwrap().push(level, message);
    }
}
