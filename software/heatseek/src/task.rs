//! Cooperative tasks scheduled by the [`Controller`](crate::controller::Controller).
//!
//! A task is polled once per control tick and must return promptly. Work that
//! waits on hardware is written as a check that succeeds on some later poll.

use thiserror::Error;
use tracing::{debug, info};

use crate::camera::CameraError;
use crate::peripheral::{CameraInterface, Flywheel, MotorDriver, QuadratureCounter, Servo};
use crate::sequencer::{CameraTargeting, FiringPhase, FiringSequencer, SequenceFault, SequenceReport};
use crate::sequencer::{TargetPoll, TargetSource};
use crate::share::{Queue, Share};

/// What a task reports after a poll
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    Finished,
}

/// A fault that ended a task
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Sequence(#[from] SequenceFault),
}

pub trait Task {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Higher priorities are polled first within a tick
    fn priority(&self) -> i32 {
        0
    }

    /// Background tasks run for as long as any other task does, but do not
    /// keep the controller alive on their own
    fn background(&self) -> bool {
        false
    }

    /// Do one tick's worth of work
    fn poll(&mut self, now_ms: u64) -> Result<TaskStatus, TaskError>;

    /// Stop whatever the task is driving. Called once when the controller is cancelled.
    fn cancel(&mut self, _now_ms: u64) {}
}

/// Evaluates camera frames and publishes one queue entry per evaluated frame:
/// `Some(setpoint)` for a hit, `None` for a miss.
pub struct AcquisitionTask<I> {
    targeting: CameraTargeting<I>,
    out: Queue<Option<i64>>,
}

impl<I: CameraInterface> AcquisitionTask<I> {
    pub fn new(targeting: CameraTargeting<I>, out: Queue<Option<i64>>) -> Self {
        Self { targeting, out }
    }
}

impl<I: CameraInterface> Task for AcquisitionTask<I> {
    fn name(&self) -> &str {
        "acquisition"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn background(&self) -> bool {
        true
    }

    fn poll(&mut self, _now_ms: u64) -> Result<TaskStatus, TaskError> {
        let entry = match self.targeting.poll_target()? {
            TargetPoll::Pending => return Ok(TaskStatus::Running),
            TargetPoll::NoTarget => None,
            TargetPoll::Target(setpoint) => Some(setpoint),
        };
        if self.out.push(entry).is_some() {
            debug!("Target queue full; dropped an entry");
        }
        Ok(TaskStatus::Running)
    }
}

/// Runs a number of firing sequences back to back
pub struct SequencerTask<T, M, S, F, C> {
    seq: FiringSequencer<T, M, S, F, C>,
    remaining: u32,
    reports: Option<Share<SequenceReport>>,
}

impl<T, M, S, F, C> SequencerTask<T, M, S, F, C>
where
    T: TargetSource,
    M: MotorDriver,
    S: Servo,
    F: Flywheel,
    C: QuadratureCounter,
{
    pub fn new(seq: FiringSequencer<T, M, S, F, C>, shots: u32) -> Self {
        Self {
            seq,
            remaining: shots,
            reports: None,
        }
    }

    /// Publish each finished sequence's report to `reports`
    pub fn with_reports(mut self, reports: Share<SequenceReport>) -> Self {
        self.reports = Some(reports);
        self
    }

    fn publish_report(&self) {
        if let (Some(reports), Some(report)) = (&self.reports, self.seq.last_report()) {
            reports.put(report.clone());
        }
    }

    pub fn sequencer(&self) -> &FiringSequencer<T, M, S, F, C> {
        &self.seq
    }

    pub fn into_inner(self) -> FiringSequencer<T, M, S, F, C> {
        self.seq
    }
}

impl<T, M, S, F, C> Task for SequencerTask<T, M, S, F, C>
where
    T: TargetSource,
    M: MotorDriver,
    S: Servo,
    F: Flywheel,
    C: QuadratureCounter,
{
    fn name(&self) -> &str {
        "sequencer"
    }

    fn priority(&self) -> i32 {
        5
    }

    fn poll(&mut self, now_ms: u64) -> Result<TaskStatus, TaskError> {
        if self.seq.is_idle() {
            if self.remaining == 0 {
                return Ok(TaskStatus::Finished);
            }
            self.remaining -= 1;
            self.seq.start(now_ms)?;
        }

        if self.seq.step(now_ms) == FiringPhase::Idle {
            self.publish_report();
            if let Some(fault) = self.seq.last_report().and_then(|r| r.fault.clone()) {
                return Err(fault.into());
            }
            info!("{} sequence(s) left", self.remaining);
            if self.remaining == 0 {
                return Ok(TaskStatus::Finished);
            }
        }
        Ok(TaskStatus::Running)
    }

    fn cancel(&mut self, now_ms: u64) {
        self.seq.cancel(now_ms);
        self.publish_report();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::{CalibrationTable, InterpMethod, TargetMapper};
    use crate::camera::Mlx90640;
    use crate::config::TurretCfg;
    use crate::peripheral::hootl::{SimAxis, SimCamera, SimFlywheel, SimServo};
    use crate::sequencer::{Rig, SharedTarget};

    #[test]
    fn acquisition_publishes_each_frame() {
        let sim = SimCamera::with_warm_spot(10, 2);
        let mapper = TargetMapper::new(
            CalibrationTable::new(vec![10], vec![1234]).unwrap(),
            InterpMethod::Nearest,
        )
        .unwrap();
        let queue = Queue::new(4, true);
        let mut task = AcquisitionTask::new(
            CameraTargeting::new(Mlx90640::new(sim.clone()), mapper),
            queue.clone(),
        );

        assert_eq!(task.poll(0).unwrap(), TaskStatus::Running);
        assert!(queue.is_empty());

        sim.publish_subpage();
        task.poll(10).unwrap();
        sim.publish_subpage();
        task.poll(20).unwrap();
        assert_eq!(queue.pop(), Some(Some(1234)));

        // Hotspot moves out of the calibrated columns
        sim.set_scene(crate::peripheral::hootl::warm_spot_scene(20, 2));
        sim.publish_subpage();
        task.poll(30).unwrap();
        sim.publish_subpage();
        task.poll(40).unwrap();
        assert_eq!(queue.pop(), Some(None));
    }

    #[test]
    fn sequencer_task_reports_faults() {
        let mut cfg = TurretCfg::default();
        cfg.fire.spinup_ms = 0;
        cfg.max_acquire_attempts = 1;
        let queue = Queue::new(4, false);
        let axis = SimAxis::new(1.0);
        let rig = Rig {
            motor: axis.motor(),
            servo: SimServo::new(),
            flywheel: SimFlywheel::new(),
            counter: axis.counter(),
        };
        let seq = FiringSequencer::new(&cfg, SharedTarget::new(queue.clone()), rig);
        let reports = Share::new();
        let mut task = SequencerTask::new(seq, 1).with_reports(reports.clone());

        assert_eq!(task.poll(0).unwrap(), TaskStatus::Running);
        assert!(reports.is_empty());
        queue.push(None);
        assert_eq!(
            task.poll(10),
            Err(TaskError::Sequence(SequenceFault::AcquireExhausted(1)))
        );
        assert_eq!(task.poll(20).unwrap(), TaskStatus::Finished);

        let report = reports.get().unwrap();
        assert_eq!(report.fault, Some(SequenceFault::AcquireExhausted(1)));
        assert!(!report.fired);
    }
}
