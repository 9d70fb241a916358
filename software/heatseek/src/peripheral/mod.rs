//! Hardware seams: actuators, the quadrature counter and the camera transport.
//!
//! Each peripheral is one exclusively-owned handle, constructed once and
//! moved into the component that drives it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod hootl;

/// Largest duty cycle magnitude accepted by a motor driver, in percent
pub const MAX_DUTY: f64 = 100.0;

/// Largest servo command
pub const MAX_SERVO_ANGLE: f64 = 250.0;

/// Servo pulse width at angle 0, in microseconds
pub const SERVO_MIN_PULSE_US: f64 = 500.0;

/// Servo pulse width at [`MAX_SERVO_ANGLE`], in microseconds
pub const SERVO_MAX_PULSE_US: f64 = 2500.0;

/// Failure reported by an actuator driver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("actuator `{actuator}` failed: {message}")]
pub struct ActuatorError {
    pub actuator: String,
    pub message: String,
}

impl ActuatorError {
    pub fn new(actuator: &str, message: impl Into<String>) -> Self {
        Self {
            actuator: actuator.to_owned(),
            message: message.into(),
        }
    }
}

/// Failure of the bus underneath the camera
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("bus transfer at {address:#06x} failed: {message}")]
pub struct TransportError {
    pub address: u16,
    pub message: String,
}

/// H-bridge motor driver
pub trait MotorDriver {
    /// Signed duty cycle in percent. The sign selects the direction, the magnitude
    /// the PWM level on the corresponding channel; 0 disables both channels
    /// while keeping the driver enabled.
    fn set_duty_cycle(&mut self, duty: f64) -> Result<(), ActuatorError>;
}

/// Hobby servo driving the trigger
pub trait Servo {
    /// Command an angle in `0..=250`, mapped linearly to a 500-2500 us pulse
    fn set_angle(&mut self, angle: f64) -> Result<(), ActuatorError>;
}

/// Digital output switching the flywheel motors
pub trait Flywheel {
    fn set_flywheel(&mut self, on: bool) -> Result<(), ActuatorError>;
}

/// Free-running 16-bit hardware counter in quadrature encoder mode
pub trait QuadratureCounter {
    fn counter(&mut self) -> u16;
}

/// Word-addressed register transport to one camera
pub trait CameraInterface {
    /// Read consecutive register words starting at `address` into `buf`
    fn read_into(&mut self, address: u16, buf: &mut [u8]) -> Result<(), TransportError>;

    /// Write consecutive register words starting at `address` from `buf`
    fn write_from(&mut self, address: u16, buf: &[u8]) -> Result<(), TransportError>;
}

/// An I2C bus that can be scanned for devices
pub trait I2cBus {
    type Device: CameraInterface;

    /// Addresses of every device that acknowledged
    fn scan(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Hand the bus over to the device at `address`
    fn into_device(self, address: u8) -> Self::Device;
}

/// Direction convention between the sign of a duty command and the
/// direction the encoder counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DutyPolarity {
    /// Positive duty drives channel 1 and counts up
    #[default]
    Normal,

    /// Positive duty drives channel 2 and counts down
    Reversed,
}

impl DutyPolarity {
    pub fn apply(&self, duty: f64) -> f64 {
        match self {
            DutyPolarity::Normal => duty,
            DutyPolarity::Reversed => -duty,
        }
    }
}

/// Clamp a controller output to the motor's valid command range
pub fn saturate_duty(duty: f64) -> f64 {
    if duty.is_nan() {
        return 0.0;
    }
    duty.clamp(-MAX_DUTY, MAX_DUTY)
}

/// Pulse width in microseconds for a servo angle, clamped to the valid range
pub fn servo_pulse_width_us(angle: f64) -> f64 {
    let angle = angle.clamp(0.0, MAX_SERVO_ANGLE);
    SERVO_MIN_PULSE_US + angle / MAX_SERVO_ANGLE * (SERVO_MAX_PULSE_US - SERVO_MIN_PULSE_US)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duty_saturates_symmetrically() {
        assert_eq!(saturate_duty(170.0), 100.0);
        assert_eq!(saturate_duty(-250.0), -100.0);
        assert_eq!(saturate_duty(42.5), 42.5);
        assert_eq!(saturate_duty(f64::NAN), 0.0);
    }

    #[test]
    fn servo_angle_maps_to_pulse_width() {
        assert_eq!(servo_pulse_width_us(0.0), 500.0);
        assert_eq!(servo_pulse_width_us(250.0), 2500.0);
        assert_eq!(servo_pulse_width_us(125.0), 1500.0);
        assert_eq!(servo_pulse_width_us(400.0), 2500.0);
    }

    #[test]
    fn polarity_flips_sign() {
        assert_eq!(DutyPolarity::Normal.apply(10.0), 10.0);
        assert_eq!(DutyPolarity::Reversed.apply(10.0), -10.0);
    }
}
