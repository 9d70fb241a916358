//! Turret configuration, stored as JSON.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use heatseek_shared::{DEFAULT_CAMERA_ADDRESS, Pattern};

use crate::calc::{CalibrationTable, InterpMethod, PidGains, TimingStrategy};
use crate::encoder::WrapRule;
use crate::peripheral::{DutyPolarity, MAX_SERVO_ANGLE};

/// Failures while loading, saving or checking a configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Camera discovery and readout
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraCfg {
    /// I2C address the camera is expected at
    pub address: u8,

    /// Readout pattern written during setup
    pub pattern: Pattern,

    /// Subpage rate in Hz; the nearest supported rate is used.
    /// `None` leaves the device setting alone.
    pub refresh_hz: Option<f64>,
}

impl Default for CameraCfg {
    fn default() -> Self {
        Self {
            address: DEFAULT_CAMERA_ADDRESS,
            pattern: Pattern::Chess,
            refresh_hz: None,
        }
    }
}

/// One tracking phase: where to stop and how to get there
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackingCfg {
    pub gains: PidGains,

    /// Largest |measured - setpoint| in counts that counts as arrived
    pub tolerance: i64,

    pub timing: TimingStrategy,

    /// Ticks allowed before the phase faults
    pub max_ticks: u32,
}

impl TrackingCfg {
    /// Slew toward the target
    pub fn slew() -> Self {
        Self {
            gains: PidGains::new(0.17, 0.01, 0.0),
            tolerance: 5,
            timing: TimingStrategy::Coarse,
            max_ticks: 3000,
        }
    }

    /// Return to the home position
    pub fn home() -> Self {
        Self {
            gains: PidGains::new(0.17, 0.1, 0.0),
            tolerance: 3,
            timing: TimingStrategy::Coarse,
            max_ticks: 3000,
        }
    }
}

/// Trigger servo and flywheel timing
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FireCfg {
    /// Servo angle that pushes the dart into the flywheels
    pub fire_angle: f64,

    /// Servo angle at rest
    pub rest_angle: f64,

    /// Time at the fire angle before the flywheel is cut, ms
    pub dwell_ms: u64,

    /// Time at rest before returning home, ms
    pub hold_ms: u64,

    /// Flywheel spin-up before a target may be engaged, ms
    pub spinup_ms: u64,
}

impl Default for FireCfg {
    fn default() -> Self {
        Self {
            fire_angle: MAX_SERVO_ANGLE,
            rest_angle: 0.0,
            dwell_ms: 500,
            hold_ms: 500,
            spinup_ms: 2000,
        }
    }
}

/// Everything needed to run the turret
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurretCfg {
    /// Control tick period, ms
    pub tick_ms: u64,

    pub camera: CameraCfg,

    /// Hotspot column to encoder setpoint
    pub calibration: CalibrationTable,
    pub interp: InterpMethod,

    pub slew: TrackingCfg,

    /// Tracking back to position 0 after firing
    pub home: TrackingCfg,

    pub fire: FireCfg,

    /// Frames without a usable target before the run is abandoned
    pub max_acquire_attempts: u32,

    pub wrap_rule: WrapRule,
    pub polarity: DutyPolarity,
}

impl Default for TurretCfg {
    fn default() -> Self {
        Self {
            tick_ms: 10,
            camera: CameraCfg::default(),
            calibration: CalibrationTable::default(),
            interp: InterpMethod::Nearest,
            slew: TrackingCfg::slew(),
            home: TrackingCfg::home(),
            fire: FireCfg::default(),
            max_acquire_attempts: 10,
            wrap_rule: WrapRule::Modulus,
            polarity: DutyPolarity::Normal,
        }
    }
}

impl TurretCfg {
    /// Read and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json_str = fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&json_str)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Write the config as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json_str = serde_json::to_string_pretty(self)?;
        fs::write(path, json_str)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.check().map_err(ConfigError::Invalid)
    }

    fn check(&self) -> Result<(), String> {
        if self.tick_ms == 0 {
            return Err("tick_ms must be > 0".to_owned());
        }
        self.calibration.validate()?;
        for (name, phase) in [("slew", &self.slew), ("home", &self.home)] {
            if phase.tolerance < 0 {
                return Err(format!("{name} tolerance must be >= 0"));
            }
            if phase.max_ticks == 0 {
                return Err(format!("{name} max_ticks must be > 0"));
            }
            let PidGains { kp, ki, kd } = phase.gains;
            if ![kp, ki, kd].iter().all(|g| g.is_finite()) {
                return Err(format!("{name} gains must be finite"));
            }
        }
        for (name, angle) in [
            ("fire_angle", self.fire.fire_angle),
            ("rest_angle", self.fire.rest_angle),
        ] {
            if !(0.0..=MAX_SERVO_ANGLE).contains(&angle) {
                return Err(format!("{name} {angle} outside 0..={MAX_SERVO_ANGLE}"));
            }
        }
        if let Some(hz) = self.camera.refresh_hz {
            if !(hz.is_finite() && hz > 0.0) {
                return Err(format!("camera refresh_hz {hz} must be a positive rate"));
            }
        }
        if self.max_acquire_attempts == 0 {
            return Err("max_acquire_attempts must be > 0".to_owned());
        }
        Ok(())
    }
}
