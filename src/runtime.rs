//! Periodic tick driver.
//!
//! Runs `AppCore::tick` at a fixed cadence on a dedicated thread, pulling
//! the newest telemetry from a `TelemetrySource` each round. The thread is
//! shut down through a command channel so the handle stays cheap to clone
//! around and `Drop` can stop the loop without joining from the tick thread
//! itself.

use crate::app_core::AppCore;
use crate::telemetry::TelemetrySnapshot;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Tick cadence; durations in the decision logic are sim-time so the exact
/// wall period only bounds reaction latency.
pub const TICK_PERIOD: Duration = Duration::from_millis(16);

/// Supplies the freshest telemetry snapshot each tick. `None` means no
/// valid data this round (connection lost, stream ended).
pub trait TelemetrySource: Send {
    fn poll(&mut self) -> Option<TelemetrySnapshot>;
}

impl<F> TelemetrySource for F
where
    F: FnMut() -> Option<TelemetrySnapshot> + Send,
{
    fn poll(&mut self) -> Option<TelemetrySnapshot> {
        self()
    }
}

enum DriverCmd {
    Shutdown,
}

pub struct DriverHandle {
    tx: mpsc::Sender<DriverCmd>,
    join: Option<JoinHandle<()>>,
}

impl DriverHandle {
    /// Stop the tick loop and wait for the thread to exit.
    pub fn shutdown(mut self) {
        let _ = self.tx.send(DriverCmd::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        let _ = self.tx.send(DriverCmd::Shutdown);
    }
}

/// Spawn the tick driver thread. It polls `source` and feeds the core every
/// `TICK_PERIOD` until shut down.
pub fn spawn_tick_driver(
    core: Arc<AppCore>,
    mut source: impl TelemetrySource + 'static,
) -> Result<DriverHandle, String> {
    let (tx, rx) = mpsc::channel::<DriverCmd>();
    let join = std::thread::Builder::new()
        .name("tick-driver".into())
        .spawn(move || loop {
            match rx.recv_timeout(TICK_PERIOD) {
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    core.tick(source.poll());
                }
                Ok(DriverCmd::Shutdown) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        })
        .map_err(|e| format!("Failed to spawn tick driver: {}", e))?;
    Ok(DriverHandle {
        tx,
        join: Some(join),
    })
}
