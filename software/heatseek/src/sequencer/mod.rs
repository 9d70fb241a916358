//! Firing sequence state machine.
//!
//! The sequence runs Idle -> Acquire -> Slew -> Fire -> Return -> Idle and is
//! advanced by exactly one [`FiringSequencer::step`] per control tick. Every
//! wait (frame availability, spin-up, tolerance band, servo dwell) is a check
//! against the tick time stamp, so a step never blocks.
//!
//! Any fault sends the sequence straight back to Idle with the motor stopped,
//! the flywheel off and the trigger at rest. Fire is only reachable from a
//! Slew that arrived inside its tolerance band.

use std::mem;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::calc::{PidController, TargetMapper};
use crate::camera::{CameraError, Mlx90640};
use crate::config::{FireCfg, TrackingCfg, TurretCfg};
use crate::encoder::PositionEncoder;
use crate::peripheral::{
    ActuatorError, CameraInterface, DutyPolarity, Flywheel, MotorDriver, QuadratureCounter, Servo,
    saturate_duty,
};
use crate::share::CancelToken;

pub mod target_source;

pub use target_source::{CameraTargeting, SharedTarget, TargetPoll, TargetSource};

/// Externally visible phase of the sequence
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FiringPhase {
    #[default]
    Idle,
    Acquire,
    Slew,
    Fire,
    Return,
}

/// Reasons a sequence was abandoned
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SequenceFault {
    #[error("camera fault: {0}")]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Actuator(#[from] ActuatorError),

    #[error("no usable target after {0} frames")]
    AcquireExhausted(u32),

    #[error("slew did not settle within {0} ticks")]
    SlewTimeout(u32),

    #[error("return did not settle within {0} ticks")]
    ReturnTimeout(u32),

    #[error("sequence cancelled")]
    Cancelled,
}

/// Outcome of one sequence, kept for the operator
#[derive(Clone, Debug, PartialEq)]
pub struct SequenceReport {
    pub started_ms: u64,
    pub finished_ms: u64,

    /// Setpoint the turret slewed to, if a target was found
    pub setpoint: Option<i64>,

    /// Whether the trigger was pulled
    pub fired: bool,

    /// Why the sequence ended early, if it did
    pub fault: Option<SequenceFault>,
}

/// Hardware driven by the sequencer. Each handle is owned exclusively.
#[derive(Debug)]
pub struct Rig<M, S, F, C> {
    pub motor: M,
    pub servo: S,
    pub flywheel: F,
    pub counter: C,
}

#[derive(Debug)]
enum FireStage {
    Trigger,
    Dwell { since_ms: u64 },
    Hold { since_ms: u64 },
}

#[derive(Debug)]
enum Stage {
    Idle,
    Acquire {
        misses: u32,
        target: Option<i64>,
    },
    Slew {
        pid: PidController,
        ticks: u32,
    },
    Fire(FireStage),
    Return {
        pid: PidController,
        ticks: u32,
    },
}

/// Result of one tracking tick
enum Tracking {
    Arrived,
    Moving,
}

/// Acquire a target, slew to it, fire and return home
pub struct FiringSequencer<T, M, S, F, C> {
    slew: TrackingCfg,
    home: TrackingCfg,
    fire: FireCfg,
    max_acquire_attempts: u32,
    polarity: DutyPolarity,

    source: T,
    motor: M,
    servo: S,
    flywheel: F,
    encoder: PositionEncoder<C>,

    stage: Stage,
    cancel: CancelToken,
    started_ms: u64,
    spinup_until_ms: u64,
    setpoint: Option<i64>,
    fired: bool,
    shots: u32,
    history: Vec<SequenceReport>,
}

impl<T, M, S, F, C> FiringSequencer<T, M, S, F, C>
where
    T: TargetSource,
    M: MotorDriver,
    S: Servo,
    F: Flywheel,
    C: QuadratureCounter,
{
    pub fn new(cfg: &TurretCfg, source: T, rig: Rig<M, S, F, C>) -> Self {
        let Rig {
            motor,
            servo,
            flywheel,
            counter,
        } = rig;
        Self {
            slew: cfg.slew.clone(),
            home: cfg.home.clone(),
            fire: cfg.fire.clone(),
            max_acquire_attempts: cfg.max_acquire_attempts,
            polarity: cfg.polarity,
            source,
            motor,
            servo,
            flywheel,
            encoder: PositionEncoder::new(counter, cfg.wrap_rule),
            stage: Stage::Idle,
            cancel: CancelToken::new(),
            started_ms: 0,
            spinup_until_ms: 0,
            setpoint: None,
            fired: false,
            shots: 0,
            history: Vec::new(),
        }
    }

    /// Begin a sequence: spin up the flywheel and take the current position as home.
    /// Ignored unless Idle.
    pub fn start(&mut self, now_ms: u64) -> Result<(), SequenceFault> {
        if !matches!(self.stage, Stage::Idle) {
            warn!("Sequence start requested while {:?}; ignored", self.phase());
            return Ok(());
        }

        self.started_ms = now_ms;
        self.spinup_until_ms = now_ms.saturating_add(self.fire.spinup_ms);
        self.setpoint = None;
        self.fired = false;
        self.source.reset();
        self.encoder.zero();
        self.stage = Stage::Acquire {
            misses: 0,
            target: None,
        };

        let powered = self
            .servo
            .set_angle(self.fire.rest_angle)
            .and_then(|_| self.flywheel.set_flywheel(true));
        if let Err(e) = powered {
            let fault = SequenceFault::from(e);
            self.abort(fault.clone(), now_ms);
            return Err(fault);
        }

        info!("Sequence started");
        Ok(())
    }

    /// Advance the sequence by one tick
    pub fn step(&mut self, now_ms: u64) -> FiringPhase {
        if matches!(self.stage, Stage::Idle) {
            return FiringPhase::Idle;
        }
        if self.cancel.is_cancelled() {
            // Consumed here so the next sequence can start
            self.cancel.reset();
            self.abort(SequenceFault::Cancelled, now_ms);
            return FiringPhase::Idle;
        }

        let stage = mem::replace(&mut self.stage, Stage::Idle);
        let before = phase_of(&stage);
        match self.advance(stage, now_ms) {
            Ok(next) => {
                let after = phase_of(&next);
                self.stage = next;
                if after != before {
                    info!("{before:?} -> {after:?}");
                }
                if after == FiringPhase::Idle {
                    self.finish(None, now_ms);
                }
            }
            Err(fault) => self.abort(fault, now_ms),
        }

        self.phase()
    }

    fn advance(&mut self, stage: Stage, now_ms: u64) -> Result<Stage, SequenceFault> {
        match stage {
            Stage::Idle => Ok(Stage::Idle),
            Stage::Acquire { misses, target } => self.acquire(misses, target, now_ms),
            Stage::Slew { mut pid, ticks } => {
                match self.track(&mut pid, self.slew.tolerance, now_ms)? {
                    Tracking::Arrived => {
                        info!("On target at {}", self.encoder.position());
                        Ok(Stage::Fire(FireStage::Trigger))
                    }
                    Tracking::Moving if ticks + 1 >= self.slew.max_ticks => {
                        Err(SequenceFault::SlewTimeout(self.slew.max_ticks))
                    }
                    Tracking::Moving => Ok(Stage::Slew {
                        pid,
                        ticks: ticks + 1,
                    }),
                }
            }
            Stage::Fire(fire) => self.fire(fire, now_ms),
            Stage::Return { mut pid, ticks } => {
                match self.track(&mut pid, self.home.tolerance, now_ms)? {
                    Tracking::Arrived => Ok(Stage::Idle),
                    Tracking::Moving if ticks + 1 >= self.home.max_ticks => {
                        Err(SequenceFault::ReturnTimeout(self.home.max_ticks))
                    }
                    Tracking::Moving => Ok(Stage::Return {
                        pid,
                        ticks: ticks + 1,
                    }),
                }
            }
        }
    }

    fn acquire(
        &mut self,
        mut misses: u32,
        mut target: Option<i64>,
        now_ms: u64,
    ) -> Result<Stage, SequenceFault> {
        self.encoder.read();

        match self.source.poll_target()? {
            TargetPoll::Pending => {}
            TargetPoll::NoTarget => {
                // Only the latest evaluated frame counts
                target = None;
                misses += 1;
                debug!("No target ({misses}/{})", self.max_acquire_attempts);
                if misses >= self.max_acquire_attempts {
                    return Err(SequenceFault::AcquireExhausted(misses));
                }
            }
            TargetPoll::Target(setpoint) => {
                target = Some(setpoint);
                misses = 0;
            }
        }

        match target {
            Some(setpoint) if now_ms >= self.spinup_until_ms => {
                info!("Target acquired, slewing to {setpoint}");
                self.setpoint = Some(setpoint);
                let pid = PidController::new(self.slew.gains, setpoint as f64, self.slew.timing);
                Ok(Stage::Slew { pid, ticks: 0 })
            }
            _ => Ok(Stage::Acquire { misses, target }),
        }
    }

    /// One tick of closed-loop tracking. The band is checked on the fresh
    /// reading before the controller runs; arriving stops the motor.
    fn track(
        &mut self,
        pid: &mut PidController,
        tolerance: i64,
        now_ms: u64,
    ) -> Result<Tracking, SequenceFault> {
        let measured = self.encoder.read();
        let error = pid.setpoint() - measured as f64;
        if error.abs() <= tolerance as f64 {
            self.motor.set_duty_cycle(0.0)?;
            return Ok(Tracking::Arrived);
        }

        let output = pid.run(measured as f64, now_ms);
        let duty = self.polarity.apply(saturate_duty(output));
        debug!("measured {measured} error {error} duty {duty:.2}");
        self.motor.set_duty_cycle(duty)?;
        Ok(Tracking::Moving)
    }

    fn fire(&mut self, stage: FireStage, now_ms: u64) -> Result<Stage, SequenceFault> {
        match stage {
            FireStage::Trigger => {
                self.motor.set_duty_cycle(0.0)?;
                self.servo.set_angle(self.fire.fire_angle)?;
                self.fired = true;
                self.shots += 1;
                info!("Fired shot {}", self.shots);
                Ok(Stage::Fire(FireStage::Dwell { since_ms: now_ms }))
            }
            FireStage::Dwell { since_ms } if now_ms.saturating_sub(since_ms) >= self.fire.dwell_ms => {
                self.flywheel.set_flywheel(false)?;
                self.servo.set_angle(self.fire.rest_angle)?;
                Ok(Stage::Fire(FireStage::Hold { since_ms: now_ms }))
            }
            FireStage::Hold { since_ms } if now_ms.saturating_sub(since_ms) >= self.fire.hold_ms => {
                let pid = PidController::new(self.home.gains, 0.0, self.home.timing);
                Ok(Stage::Return { pid, ticks: 0 })
            }
            waiting => Ok(Stage::Fire(waiting)),
        }
    }

    /// Stop immediately, leaving every actuator safe
    pub fn cancel(&mut self, now_ms: u64) {
        if !matches!(self.stage, Stage::Idle) {
            self.abort(SequenceFault::Cancelled, now_ms);
        }
    }

    /// Token that cancels the sequence at its next step
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn abort(&mut self, fault: SequenceFault, now_ms: u64) {
        self.stage = Stage::Idle;

        // Stop the motor first; later failures must not prevent it
        if let Err(e) = self.motor.set_duty_cycle(0.0) {
            error!("Failed to stop motor: {e}");
        }
        if let Err(e) = self.flywheel.set_flywheel(false) {
            error!("Failed to stop flywheel: {e}");
        }
        if let Err(e) = self.servo.set_angle(self.fire.rest_angle) {
            error!("Failed to rest trigger: {e}");
        }

        match fault {
            SequenceFault::Cancelled => warn!("Sequence cancelled"),
            ref other => error!("Sequence aborted: {other}"),
        }
        self.finish(Some(fault), now_ms);
    }

    fn finish(&mut self, fault: Option<SequenceFault>, now_ms: u64) {
        if fault.is_none() {
            info!("Sequence complete");
        }
        self.history.push(SequenceReport {
            started_ms: self.started_ms,
            finished_ms: now_ms,
            setpoint: self.setpoint,
            fired: self.fired,
            fault,
        });
    }

    pub fn phase(&self) -> FiringPhase {
        phase_of(&self.stage)
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.stage, Stage::Idle)
    }

    /// Accumulated encoder position at the last reading
    pub fn position(&self) -> i64 {
        self.encoder.position()
    }

    /// Setpoint of the current or most recent sequence
    pub fn setpoint(&self) -> Option<i64> {
        self.setpoint
    }

    /// Shots fired since construction
    pub fn shots(&self) -> u32 {
        self.shots
    }

    /// Reports of every finished sequence, oldest first
    pub fn history(&self) -> &[SequenceReport] {
        &self.history
    }

    pub fn last_report(&self) -> Option<&SequenceReport> {
        self.history.last()
    }

    pub fn source(&mut self) -> &mut T {
        &mut self.source
    }
}

fn phase_of(stage: &Stage) -> FiringPhase {
    match stage {
        Stage::Idle => FiringPhase::Idle,
        Stage::Acquire { .. } => FiringPhase::Acquire,
        Stage::Slew { .. } => FiringPhase::Slew,
        Stage::Fire(_) => FiringPhase::Fire,
        Stage::Return { .. } => FiringPhase::Return,
    }
}

/// Why a camera-fed sequencer could not be built
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SetupError {
    #[error("invalid calibration: {0}")]
    Calibration(String),

    #[error(transparent)]
    Camera(#[from] CameraError),
}

/// Build a sequencer that computes targets from the camera, applying the
/// configured camera settings first
pub fn camera_sequencer<I, M, S, F, C>(
    cfg: &TurretCfg,
    camera: Mlx90640<I>,
    rig: Rig<M, S, F, C>,
) -> Result<FiringSequencer<CameraTargeting<I>, M, S, F, C>, SetupError>
where
    I: CameraInterface,
    M: MotorDriver,
    S: Servo,
    F: Flywheel,
    C: QuadratureCounter,
{
    let mapper = TargetMapper::new(cfg.calibration.clone(), cfg.interp)
        .map_err(SetupError::Calibration)?;
    let mut targeting = CameraTargeting::new(camera, mapper);
    targeting.setup(&cfg.camera)?;
    Ok(FiringSequencer::new(cfg, targeting, rig))
}
