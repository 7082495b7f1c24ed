//! Telemetry replay from JSON Lines.
//!
//! Feeds recorded snapshots into the tick driver, one line per tick. Lines
//! that fail to parse count as a dropped sample (`None`) rather than ending
//! the run; end of input flips a shared flag so the caller knows the replay
//! is over.

use crate::runtime::TelemetrySource;
use crate::telemetry::TelemetrySnapshot;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct ReplaySource {
    lines: Box<dyn Iterator<Item = io::Result<String>> + Send>,
    finished: Arc<AtomicBool>,
}

impl ReplaySource {
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let file = File::open(path)
            .map_err(|e| format!("Cannot open telemetry file '{}': {}", path.display(), e))?;
        Ok(Self::from_reader(BufReader::new(file)))
    }

    pub fn from_stdin() -> Self {
        Self::from_reader(BufReader::new(io::stdin()))
    }

    fn from_reader<R: BufRead + Send + 'static>(reader: R) -> Self {
        ReplaySource {
            lines: Box::new(reader.lines()),
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that flips to true once the input is exhausted.
    pub fn finished_flag(&self) -> Arc<AtomicBool> {
        self.finished.clone()
    }
}

impl TelemetrySource for ReplaySource {
    fn poll(&mut self) -> Option<TelemetrySnapshot> {
        loop {
            match self.lines.next() {
                Some(Ok(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<TelemetrySnapshot>(line) {
                        Ok(snapshot) => return Some(snapshot),
                        Err(e) => {
                            eprintln!("Warning: bad telemetry line skipped: {}", e);
                            return None;
                        }
                    }
                }
                Some(Err(e)) => {
                    eprintln!("Warning: telemetry read error: {}", e);
                    return None;
                }
                None => {
                    self.finished.store(true, Ordering::SeqCst);
                    return None;
                }
            }
        }
    }
}
