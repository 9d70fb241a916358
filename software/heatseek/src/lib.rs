//! Closed-loop thermal targeting for a turret driven by an MLX90640 camera.
//!
//! The pipeline runs once per control tick:
//!
//! ```text
//! camera (FrameAcquirer) -> calc::hotspot -> calc::target -> calc::pid (setpoint)
//!                                                               ^
//!                                   encoder (measurement) ------+
//!                                                               |
//!                  sequencer: Idle -> Acquire -> Slew -> Fire -> Return -> Idle
//! ```
//!
//! Hardware is reached only through the traits in [`peripheral`]; the
//! [`peripheral::hootl`] module provides a simulated rig for running
//! the whole loop without hardware.

pub mod calc;
pub mod camera;
pub mod config;
pub mod controller;
pub mod encoder;
pub mod logging;
pub mod peripheral;
pub mod sequencer;
pub mod share;
pub mod task;

pub use config::TurretCfg;
pub use controller::Controller;
pub use sequencer::{FiringPhase, FiringSequencer};

pub use heatseek_shared;
