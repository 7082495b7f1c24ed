//! depMelody — Core library for the departure melody controller.
//!
//! Decision logic, playback orchestration, and telemetry handling live
//! here. The CLI and any presentation layer consume this crate.

pub mod app_core;
pub mod config;
pub mod orchestrator;
pub mod playback;
pub mod prober;
pub mod profile;
pub mod replay;
pub mod runtime;
pub mod telemetry;
pub mod trigger;
