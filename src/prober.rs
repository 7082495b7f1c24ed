//! Audio Duration Prober — measures clip lengths off the tick thread.
//!
//! Probing reads file metadata and may block on disk, so each request runs
//! on its own short-lived thread and reports back over a channel. The tick
//! loop polls non-blockingly and keeps evaluating with 0.0 durations until
//! the result lands.

use crate::telemetry::PlatformKey;
use lofty::file::AudioFile;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Mutex;

/// One probe job, raised once per dwell.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub key: PlatformKey,
    /// Melody clip to measure; None when no melody could be resolved.
    pub melody: Option<PathBuf>,
    /// Announcement clip to measure; None when the platform has no clip
    /// for the current direction (the config fallback applies instead).
    pub announcement: Option<PathBuf>,
}

/// Probe outcome, tagged with the dwell it belongs to. `None` means there
/// was no clip to probe, as opposed to a failed probe (reported as 0.0).
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub key: PlatformKey,
    pub melody_secs: Option<f64>,
    pub announcement_secs: Option<f64>,
}

pub struct DurationProber {
    tx: mpsc::Sender<ProbeResult>,
    rx: Mutex<mpsc::Receiver<ProbeResult>>,
}

impl DurationProber {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        DurationProber {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Start probing in the background; the result arrives via `poll`.
    pub fn probe(&self, request: ProbeRequest) {
        let tx = self.tx.clone();
        std::thread::Builder::new()
            .name("duration-probe".into())
            .spawn(move || {
                let result = ProbeResult {
                    key: request.key,
                    melody_secs: request.melody.as_deref().map(measure_or_zero),
                    announcement_secs: request.announcement.as_deref().map(measure_or_zero),
                };
                // Receiver gone means the core shut down; nothing to do.
                let _ = tx.send(result);
            })
            .expect("failed to spawn duration-probe thread");
    }

    /// Non-blocking: the next finished probe, if any.
    pub fn poll(&self) -> Option<ProbeResult> {
        self.rx.lock().unwrap().try_recv().ok()
    }
}

impl Default for DurationProber {
    fn default() -> Self {
        Self::new()
    }
}

/// A failed probe counts as 0.0 seconds, which only ever makes the
/// schedule-based start bound earlier.
fn measure_or_zero(path: &Path) -> f64 {
    match read_duration(path) {
        Ok(secs) => secs,
        Err(e) => {
            eprintln!("Warning: duration probe failed: {}", e);
            0.0
        }
    }
}

/// Read the playable duration of an audio file in seconds.
pub fn read_duration(path: &Path) -> Result<f64, String> {
    let tagged_file = lofty::read_from_path(path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    Ok(tagged_file.properties().duration().as_secs_f64())
}
