//! Resumable assembly of full frames from alternating subpages.

use tracing::debug;

use super::{CameraError, Mlx90640, RawFrame};
use crate::peripheral::CameraInterface;

/// Outcome of one acquisition poll
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireStatus {
    /// No new subpage yet; poll again next tick
    Pending,

    /// Read the given subpage, but the other one is still missing
    Captured(u8),

    /// Both subpages have been read since the last complete frame
    Ready,
}

/// Collects subpages into a [`RawFrame`] one poll at a time.
///
/// A poll never waits: when the sensor has no new data it reports
/// [`AcquireStatus::Pending`] and the caller retries on its next tick.
#[derive(Clone, Debug, Default)]
pub struct FrameAcquirer {
    frame: RawFrame,

    /// Bit `n` set once subpage `n` has been read into the current frame
    captured: u8,
}

impl FrameAcquirer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the pending subpage, if any
    pub fn poll<I: CameraInterface>(
        &mut self,
        cam: &mut Mlx90640<I>,
    ) -> Result<AcquireStatus, CameraError> {
        if !cam.has_data()? {
            return Ok(AcquireStatus::Pending);
        }

        let subpage = cam.read_image(&mut self.frame)?;
        self.captured |= 1 << subpage;
        debug!("Captured subpage {subpage}");

        if self.captured == 0b11 {
            self.captured = 0;
            Ok(AcquireStatus::Ready)
        } else {
            Ok(AcquireStatus::Captured(subpage))
        }
    }

    /// Latest assembled frame
    pub fn frame(&self) -> &RawFrame {
        &self.frame
    }

    /// Forget subpages captured so far. Pixel values are kept.
    pub fn reset(&mut self) {
        self.captured = 0;
    }
}
