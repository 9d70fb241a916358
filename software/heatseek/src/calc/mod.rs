//! Calculations run on each acquired frame or control tick.
//!
//! * [`hotspot`] finds the warmest 1x4 cluster in a raw frame
//! * [`target`] maps a hotspot column to an encoder setpoint through a calibration table
//! * [`pid`] tracks that setpoint against the measured encoder position

pub mod hotspot;
pub mod pid;
pub mod target;

pub use hotspot::{HotspotCoordinate, find_hotspot};
pub use pid::{PidController, PidGains, TimingStrategy};
pub use target::{CalibrationTable, InterpMethod, TargetMapper};
