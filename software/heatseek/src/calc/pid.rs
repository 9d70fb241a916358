//! Discrete PID controller tracking an encoder setpoint

use serde::{Deserialize, Serialize};

/// Proportional, integral and derivative gains
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl PidGains {
    pub const fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }
}

/// How the time step between samples is measured.
///
/// The caller passes a millisecond time stamp to every [`PidController::run`];
/// the strategy decides what `dt` that stamp produces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimingStrategy {
    /// `dt` is the change in whole seconds elapsed since the first invocation,
    /// so most ticks see `dt == 0` and the integral only accumulates once per
    /// second boundary.
    #[default]
    Coarse,

    /// `dt` is the raw millisecond delta between consecutive invocations,
    /// 0 on the first.
    Fine,
}

/// PID controller with an unclamped output.
///
/// Saturating the output to the actuator's command range is left to the consumer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PidController {
    gains: PidGains,
    setpoint: f64,
    timing: TimingStrategy,

    // Internal state
    integral: f64,
    prev_error: f64,
    start_ms: Option<u64>,
    prev_ms: Option<u64>,
    prev_elapsed_s: u64,
}

impl PidController {
    pub fn new(gains: PidGains, setpoint: f64, timing: TimingStrategy) -> Self {
        Self {
            gains,
            setpoint,
            timing,
            integral: 0.0,
            prev_error: 0.0,
            start_ms: None,
            prev_ms: None,
            prev_elapsed_s: 0,
        }
    }

    /// Evaluate one sample taken at `now_ms`
    pub fn run(&mut self, measured: f64, now_ms: u64) -> f64 {
        let error = self.setpoint - measured;
        let dt = self.dt(now_ms);

        self.integral += error * dt;
        let derivative = if dt == 0.0 {
            0.0
        } else {
            (error - self.prev_error) / dt
        };
        self.prev_error = error;

        let PidGains { kp, ki, kd } = self.gains;
        kp * error + ki * self.integral + kd * derivative
    }

    fn dt(&mut self, now_ms: u64) -> f64 {
        let start_ms = *self.start_ms.get_or_insert(now_ms);
        match self.timing {
            TimingStrategy::Coarse => {
                let elapsed_s = now_ms.saturating_sub(start_ms) / 1000;
                let dt = elapsed_s.saturating_sub(self.prev_elapsed_s);
                self.prev_elapsed_s = elapsed_s;
                dt as f64
            }
            TimingStrategy::Fine => {
                let dt = self.prev_ms.map_or(0, |prev| now_ms.saturating_sub(prev));
                self.prev_ms = Some(now_ms);
                dt as f64
            }
        }
    }

    /// Retarget the controller, discarding accumulated integral and error history
    pub fn set_setpoint(&mut self, setpoint: f64) {
        self.setpoint = setpoint;
        self.integral = 0.0;
        self.prev_error = 0.0;
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    pub fn set_kp(&mut self, kp: f64) {
        self.gains.kp = kp;
    }

    pub fn set_ki(&mut self, ki: f64) {
        self.gains.ki = ki;
    }

    pub fn set_kd(&mut self, kd: f64) {
        self.gains.kd = kd;
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn timing(&self) -> TimingStrategy {
        self.timing
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn prev_error(&self) -> f64 {
        self.prev_error
    }
}
