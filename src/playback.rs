//! Audio output seam.
//!
//! The orchestrator only ever talks to `AudioBackend`. The rodio
//! implementation owns the output stream and both sinks on a dedicated
//! thread (rodio's `OutputStream` is not `Send`) and is driven through an
//! `mpsc` command channel, which is naturally Send+Sync. `NullBackend`
//! stands in for headless runs and tests.

use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

pub trait AudioBackend: Send {
    /// Start looping the melody clip, replacing any current loop.
    fn play_melody_loop(&mut self, path: &Path) -> Result<(), String>;
    /// Stop the melody loop.
    fn stop_melody(&mut self);
    /// Play a one-shot announcement clip.
    fn play_announcement(&mut self, path: &Path) -> Result<(), String>;
    /// Pause both outputs (simulation paused).
    fn pause_all(&mut self);
    /// Resume both outputs.
    fn resume_all(&mut self);
}

// ── Rodio backend ────────────────────────────────────────────────────────────

/// Commands sent to the audio thread.
enum AudioCmd {
    PlayMelodyLoop(PathBuf),
    StopMelody,
    PlayAnnouncement(PathBuf),
    PauseAll,
    ResumeAll,
    Shutdown,
}

/// Rodio-backed output: one sink for the looping melody, one for the
/// one-shot announcement, both owned by the audio thread.
pub struct RodioBackend {
    tx: mpsc::Sender<AudioCmd>,
}

impl RodioBackend {
    /// Spawn the audio thread. Fails if no output device can be opened.
    pub fn new() -> Result<Self, String> {
        // Open the device up front so the caller learns about a missing
        // device now rather than at the first melody.
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();
        let (tx, rx) = mpsc::channel::<AudioCmd>();
        std::thread::Builder::new()
            .name("audio-output".into())
            .spawn(move || audio_thread_loop(rx, ready_tx))
            .map_err(|e| format!("Failed to spawn audio thread: {}", e))?;
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(RodioBackend { tx }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err("Audio thread exited before initializing".to_string()),
        }
    }

    fn send(&self, cmd: AudioCmd) {
        let _ = self.tx.send(cmd);
    }
}

impl Drop for RodioBackend {
    fn drop(&mut self) {
        let _ = self.tx.send(AudioCmd::Shutdown);
    }
}

impl AudioBackend for RodioBackend {
    fn play_melody_loop(&mut self, path: &Path) -> Result<(), String> {
        self.send(AudioCmd::PlayMelodyLoop(path.to_path_buf()));
        Ok(())
    }

    fn stop_melody(&mut self) {
        self.send(AudioCmd::StopMelody);
    }

    fn play_announcement(&mut self, path: &Path) -> Result<(), String> {
        self.send(AudioCmd::PlayAnnouncement(path.to_path_buf()));
        Ok(())
    }

    fn pause_all(&mut self) {
        self.send(AudioCmd::PauseAll);
    }

    fn resume_all(&mut self) {
        self.send(AudioCmd::ResumeAll);
    }
}

/// State owned by the audio thread.
struct AudioOutputs {
    _stream: OutputStream,
    melody: Sink,
    announcement: Sink,
}

impl AudioOutputs {
    fn new() -> Result<Self, String> {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| format!("Failed to open audio output: {}", e))?;
        let melody = make_sink(&handle)?;
        let announcement = make_sink(&handle)?;
        Ok(AudioOutputs {
            _stream: stream,
            melody,
            announcement,
        })
    }
}

fn make_sink(handle: &OutputStreamHandle) -> Result<Sink, String> {
    Sink::try_new(handle).map_err(|e| format!("Failed to create audio sink: {}", e))
}

fn decode(path: &Path) -> Result<Decoder<BufReader<File>>, String> {
    let file = File::open(path).map_err(|e| format!("Cannot open '{}': {}", path.display(), e))?;
    Decoder::new(BufReader::new(file))
        .map_err(|e| format!("Cannot decode '{}': {}", path.display(), e))
}

/// Main loop for the audio thread. Decoding happens here so the tick loop
/// never blocks on disk; decode failures are logged, not fatal.
fn audio_thread_loop(rx: mpsc::Receiver<AudioCmd>, ready_tx: mpsc::Sender<Result<(), String>>) {
    let outputs = match AudioOutputs::new() {
        Ok(outputs) => {
            let _ = ready_tx.send(Ok(()));
            outputs
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    while let Ok(cmd) = rx.recv() {
        match cmd {
            AudioCmd::PlayMelodyLoop(path) => match decode(&path) {
                Ok(source) => {
                    outputs.melody.stop();
                    outputs.melody.append(source.repeat_infinite());
                    outputs.melody.play();
                }
                Err(e) => eprintln!("Warning: melody playback failed: {}", e),
            },
            AudioCmd::StopMelody => outputs.melody.stop(),
            AudioCmd::PlayAnnouncement(path) => match decode(&path) {
                Ok(source) => {
                    outputs.announcement.stop();
                    outputs.announcement.append(source);
                    outputs.announcement.play();
                }
                Err(e) => eprintln!("Warning: announcement playback failed: {}", e),
            },
            AudioCmd::PauseAll => {
                outputs.melody.pause();
                outputs.announcement.pause();
            }
            AudioCmd::ResumeAll => {
                outputs.melody.play();
                outputs.announcement.play();
            }
            AudioCmd::Shutdown => break,
        }
    }
}

// ── Null backend ─────────────────────────────────────────────────────────────

/// Backend that plays nothing. Used when no audio device is available and
/// for headless tests; the decision logic is unaffected.
pub struct NullBackend;

impl AudioBackend for NullBackend {
    fn play_melody_loop(&mut self, _path: &Path) -> Result<(), String> {
        Ok(())
    }

    fn stop_melody(&mut self) {}

    fn play_announcement(&mut self, _path: &Path) -> Result<(), String> {
        Ok(())
    }

    fn pause_all(&mut self) {}

    fn resume_all(&mut self) {}
}
