//! Where the sequencer gets its setpoints from.

use tracing::debug;

use heatseek_shared::{NUM_COLS, NUM_ROWS};

use crate::calc::{TargetMapper, find_hotspot};
use crate::camera::{AcquireStatus, CameraError, FrameAcquirer, Mlx90640};
use crate::config::CameraCfg;
use crate::peripheral::CameraInterface;
use crate::share::Queue;

/// Result of asking a [`TargetSource`] for a setpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetPoll {
    /// Nothing new yet
    Pending,

    /// A frame was evaluated but yielded no usable target
    NoTarget,

    /// Encoder setpoint of the target
    Target(i64),
}

/// Something the sequencer can poll once per tick for a target
pub trait TargetSource {
    fn poll_target(&mut self) -> Result<TargetPoll, CameraError>;

    /// Discard partial progress before a new sequence
    fn reset(&mut self) {}
}

/// Targets computed in place from the camera
#[derive(Debug)]
pub struct CameraTargeting<I> {
    camera: Mlx90640<I>,
    acquirer: FrameAcquirer,
    mapper: TargetMapper,
}

impl<I: CameraInterface> CameraTargeting<I> {
    pub fn new(camera: Mlx90640<I>, mapper: TargetMapper) -> Self {
        Self {
            camera,
            acquirer: FrameAcquirer::new(),
            mapper,
        }
    }

    /// Apply the camera settings before the first poll
    pub fn setup(&mut self, cfg: &CameraCfg) -> Result<(), CameraError> {
        self.camera.configure(cfg)
    }

    pub fn camera(&mut self) -> &mut Mlx90640<I> {
        &mut self.camera
    }

    pub fn acquirer(&self) -> &FrameAcquirer {
        &self.acquirer
    }
}

impl<I: CameraInterface> TargetSource for CameraTargeting<I> {
    fn poll_target(&mut self) -> Result<TargetPoll, CameraError> {
        match self.acquirer.poll(&mut self.camera)? {
            AcquireStatus::Pending | AcquireStatus::Captured(_) => Ok(TargetPoll::Pending),
            AcquireStatus::Ready => {
                let frame = self.acquirer.frame();
                let Some(hot) = find_hotspot(frame.pixels(), NUM_COLS, NUM_ROWS) else {
                    return Ok(TargetPoll::NoTarget);
                };
                match self.mapper.map(hot.column) {
                    Some(setpoint) => {
                        debug!(
                            "Hotspot at column {} row {} maps to {setpoint}",
                            hot.column, hot.row
                        );
                        Ok(TargetPoll::Target(setpoint))
                    }
                    None => {
                        debug!("Hotspot column {} is outside calibration", hot.column);
                        Ok(TargetPoll::NoTarget)
                    }
                }
            }
        }
    }

    fn reset(&mut self) {
        self.acquirer.reset();
    }
}

/// Targets published by another task.
///
/// Each entry is one evaluated frame: `Some(setpoint)` for a hit, `None` for a
/// miss. Entries are consumed in order.
#[derive(Clone, Debug)]
pub struct SharedTarget {
    queue: Queue<Option<i64>>,
}

impl SharedTarget {
    pub fn new(queue: Queue<Option<i64>>) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &Queue<Option<i64>> {
        &self.queue
    }
}

impl TargetSource for SharedTarget {
    fn poll_target(&mut self) -> Result<TargetPoll, CameraError> {
        Ok(match self.queue.pop() {
            None => TargetPoll::Pending,
            Some(None) => TargetPoll::NoTarget,
            Some(Some(setpoint)) => TargetPoll::Target(setpoint),
        })
    }

    fn reset(&mut self) {
        // Stale results from before the sequence started
        while self.queue.pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::{CalibrationTable, InterpMethod};
    use crate::peripheral::hootl::SimCamera;

    fn mapper() -> TargetMapper {
        TargetMapper::new(
            CalibrationTable::new(vec![8, 10, 12], vec![500, 1000, 1500]).unwrap(),
            InterpMethod::Nearest,
        )
        .unwrap()
    }

    #[test]
    fn camera_targeting_needs_a_full_frame() {
        let sim = SimCamera::with_warm_spot(10, 5);
        let mut src = CameraTargeting::new(Mlx90640::new(sim.clone()), mapper());
        src.setup(&CameraCfg::default()).unwrap();

        assert_eq!(src.poll_target().unwrap(), TargetPoll::Pending);
        sim.publish_subpage();
        assert_eq!(src.poll_target().unwrap(), TargetPoll::Pending);
        sim.publish_subpage();
        assert_eq!(src.poll_target().unwrap(), TargetPoll::Target(1000));
    }

    #[test]
    fn hotspot_outside_calibration_is_no_target() {
        let sim = SimCamera::with_warm_spot(20, 5);
        let mut src = CameraTargeting::new(Mlx90640::new(sim.clone()), mapper());
        sim.publish_subpage();
        src.poll_target().unwrap();
        sim.publish_subpage();
        assert_eq!(src.poll_target().unwrap(), TargetPoll::NoTarget);
    }

    #[test]
    fn shared_target_reads_in_order() {
        let queue = Queue::new(4, false);
        let mut src = SharedTarget::new(queue.clone());
        assert_eq!(src.poll_target().unwrap(), TargetPoll::Pending);
        queue.push(None);
        queue.push(Some(42));
        assert_eq!(src.poll_target().unwrap(), TargetPoll::NoTarget);
        assert_eq!(src.poll_target().unwrap(), TargetPoll::Target(42));

        queue.push(Some(7));
        src.reset();
        assert_eq!(src.poll_target().unwrap(), TargetPoll::Pending);
    }
}
