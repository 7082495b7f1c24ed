//! Trigger Engine — per-dwell state machine deciding when the departure
//! melody should start and stop.
//!
//! The engine is stateless per call: the periodic driver feeds it the latest
//! telemetry snapshot each tick and forwards the returned decision to the
//! playback orchestrator. All recorded instants are simulation seconds, so
//! pausing the game pauses every countdown here.

use crate::config::AutoModeConfig;
use crate::orchestrator::MelodyState;
use crate::telemetry::{PlatformKey, TelemetrySnapshot};

/// Engine output for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
    NoChange,
    RequestOn,
    RequestOff,
}

/// Where the engine is within the current dwell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DwellPhase {
    /// Not on a platform track.
    Idle,
    /// On a platform, waiting for a start condition (or finished playing).
    Armed,
    /// Melody requested and not yet stopped.
    Active,
}

/// Bookkeeping for one continuous dwell at a platform. At most one exists
/// at a time; it is cleared synchronously when the platform is vacated.
#[derive(Debug, Clone)]
pub struct StopContext {
    pub station_key: PlatformKey,
    /// First closed-to-open door edge this dwell.
    pub arrival_time: Option<f64>,
    /// First tick with a proceed aspect while the doors were open.
    pub signal_open_time: Option<f64>,
    /// First tick the doors were observed open, edge or not.
    pub door_open_time: Option<f64>,
    /// Probed clip lengths in seconds; 0.0 until the probe resolves.
    pub melody_duration: f64,
    pub announcement_duration: f64,
    pub scheduled_departure: Option<f64>,
}

impl StopContext {
    fn new(station_key: PlatformKey) -> Self {
        StopContext {
            station_key,
            arrival_time: None,
            signal_open_time: None,
            door_open_time: None,
            melody_duration: 0.0,
            announcement_duration: 0.0,
            scheduled_departure: None,
        }
    }
}

/// Derived melody window, recomputed from the context every tick.
/// Both bounds are infinitely far until the relevant inputs exist.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerWindow {
    pub push_on_time: f64,
    pub push_off_time: f64,
}

pub struct TriggerEngine {
    phase: DwellPhase,
    context: Option<StopContext>,
    previous_doors_open: bool,
    /// Set when the melody has fired this dwell; cleared only with the context.
    triggered: bool,
    probe_request: Option<PlatformKey>,
}

impl TriggerEngine {
    pub fn new() -> Self {
        TriggerEngine {
            phase: DwellPhase::Idle,
            context: None,
            previous_doors_open: false,
            triggered: false,
            probe_request: None,
        }
    }

    pub fn phase(&self) -> DwellPhase {
        self.phase
    }

    pub fn context(&self) -> Option<&StopContext> {
        self.context.as_ref()
    }

    /// Forget the current dwell entirely. Called on platform loss, stale
    /// telemetry, or a simulation restart.
    pub fn reset(&mut self) {
        self.phase = DwellPhase::Idle;
        self.context = None;
        self.previous_doors_open = false;
        self.triggered = false;
        self.probe_request = None;
    }

    /// The platform whose clip durations should be probed, raised once per
    /// dwell on first platform contact.
    pub fn take_probe_request(&mut self) -> Option<PlatformKey> {
        self.probe_request.take()
    }

    /// Install probed durations, ignored when the dwell has moved on.
    pub fn set_durations(&mut self, key: &PlatformKey, melody: f64, announcement: f64) {
        if let Some(ctx) = self.context.as_mut() {
            if ctx.station_key == *key {
                ctx.melody_duration = melody;
                ctx.announcement_duration = announcement;
            }
        }
    }

    /// Evaluate one telemetry snapshot.
    pub fn tick(
        &mut self,
        snapshot: &TelemetrySnapshot,
        config: &AutoModeConfig,
        melody: &MelodyState,
    ) -> TriggerDecision {
        let Some(platform) = snapshot.platform.as_ref() else {
            self.reset();
            return TriggerDecision::NoChange;
        };
        let now = snapshot.sim_time;

        // A dwell begins on the edge from "no platform" to "platform
        // present"; a different platform key is likewise a new dwell.
        let new_dwell = match &self.context {
            Some(ctx) => ctx.station_key != *platform,
            None => true,
        };
        if new_dwell {
            self.reset();
            self.context = Some(StopContext::new(platform.clone()));
            self.probe_request = Some(platform.clone());
            self.phase = DwellPhase::Armed;
        }
        let Some(ctx) = self.context.as_mut() else {
            return TriggerDecision::NoChange;
        };

        if snapshot.scheduled_departure.is_some() {
            ctx.scheduled_departure = snapshot.scheduled_departure;
        }

        // Edge recordings: each instant is latched on first observation and
        // never overwritten until the context is cleared.
        if !self.previous_doors_open && snapshot.doors_open && ctx.arrival_time.is_none() {
            ctx.arrival_time = Some(now);
        }
        if snapshot.doors_open && snapshot.signal_aspect.is_open() && ctx.signal_open_time.is_none()
        {
            ctx.signal_open_time = Some(now);
        }
        if snapshot.doors_open && ctx.door_open_time.is_none() {
            ctx.door_open_time = Some(now);
        }
        self.previous_doors_open = snapshot.doors_open;

        if !self.triggered {
            if should_start(now, ctx, config, &snapshot.vehicle_type_codes) {
                self.triggered = true;
                self.phase = DwellPhase::Active;
                return TriggerDecision::RequestOn;
            }
            return TriggerDecision::NoChange;
        }

        if melody.is_playing
            && should_stop(now, ctx, config, &snapshot.vehicle_type_codes, melody.started_at)
        {
            // Remain armed; `triggered` stays set so the same dwell cannot
            // re-fire, only a fresh dwell can.
            self.phase = DwellPhase::Armed;
            return TriggerDecision::RequestOff;
        }

        TriggerDecision::NoChange
    }

    /// Derived window for the current dwell, for display and diagnostics.
    pub fn window(
        &self,
        config: &AutoModeConfig,
        vehicle_type_codes: &[String],
    ) -> Option<TriggerWindow> {
        let ctx = self.context.as_ref()?;
        let margin = config.margin_for(vehicle_type_codes);
        let mut push_on = f64::INFINITY;
        if let Some(arrived) = ctx.arrival_time {
            push_on = push_on.min(arrived + config.delay_after_arrival);
        }
        if let Some(opened) = ctx.signal_open_time {
            push_on = push_on.min(opened + config.delay_after_signal_open);
        }
        if let Some(departure) = ctx.scheduled_departure {
            push_on = push_on
                .min(departure - (ctx.melody_duration + ctx.announcement_duration + margin));
        }
        let push_off = match ctx.scheduled_departure {
            Some(departure) => (departure - (ctx.announcement_duration + margin)).max(push_on),
            None => f64::INFINITY,
        };
        Some(TriggerWindow {
            push_on_time: push_on,
            push_off_time: push_off,
        })
    }
}

impl Default for TriggerEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Three independent lower bounds on the start instant; whichever becomes
/// true first at tick granularity wins.
fn should_start(
    now: f64,
    ctx: &StopContext,
    config: &AutoModeConfig,
    vehicle_type_codes: &[String],
) -> bool {
    if let Some(arrived) = ctx.arrival_time {
        if now - arrived >= config.delay_after_arrival {
            return true;
        }
    }
    if let Some(opened) = ctx.signal_open_time {
        if now - opened >= config.delay_after_signal_open {
            return true;
        }
    }
    if let Some(departure) = ctx.scheduled_departure {
        // Unknown durations count as 0.0, which can only pull this bound
        // earlier — the engine would rather start early than miss a window.
        let offset = ctx.melody_duration
            + ctx.announcement_duration
            + config.margin_for(vehicle_type_codes);
        if now >= departure - offset {
            return true;
        }
    }
    false
}

/// Stop is vetoed inside the melody/door-open minimums, then fires on the
/// schedule bound. Without a schedule the melody stops only on platform
/// departure or manual override.
fn should_stop(
    now: f64,
    ctx: &StopContext,
    config: &AutoModeConfig,
    vehicle_type_codes: &[String],
    melody_started_at: Option<f64>,
) -> bool {
    if let Some(started) = melody_started_at {
        if now - started < config.minimum_melody_duration {
            return false;
        }
    }
    if let Some(opened) = ctx.door_open_time {
        if now - opened < config.minimum_door_open_duration {
            return false;
        }
    }
    match ctx.scheduled_departure {
        Some(departure) => {
            let offset = ctx.announcement_duration + config.margin_for(vehicle_type_codes);
            now >= departure - offset
        }
        None => false,
    }
}
