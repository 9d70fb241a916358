use heatseek_shared::{IMAGE_SIZE, NUM_COLS};

/// Uncalibrated signed pixel words of one full frame, row-major.
///
/// Subpage reads overwrite their own indices and leave the rest untouched, so a
/// frame holds the latest value of each pixel regardless of which subpage
/// delivered it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame {
    pixels: [i16; IMAGE_SIZE],
}

impl Default for RawFrame {
    fn default() -> Self {
        Self {
            pixels: [0; IMAGE_SIZE],
        }
    }
}

impl RawFrame {
    pub fn pixels(&self) -> &[i16] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [i16] {
        &mut self.pixels
    }

    /// Pixel at a 0-indexed column and row
    pub fn get(&self, column: usize, row: usize) -> Option<i16> {
        if column >= NUM_COLS {
            return None;
        }
        self.pixels.get(row * NUM_COLS + column).copied()
    }
}
