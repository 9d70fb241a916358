//! Warmest-cluster search over a raw frame.

use serde::{Deserialize, Serialize};

/// Number of horizontally adjacent pixels averaged per window
pub const WINDOW_LEN: usize = 4;

/// Pixel location, 0-indexed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotspotCoordinate {
    pub column: usize,
    pub row: usize,
}

/// Find the left edge of the 1x4 window with the highest mean value.
///
/// Windows never wrap across rows, and neither the last row nor the last three
/// columns start a window. The scan runs row-major, left to right, and the
/// first window reaching the maximum mean wins ties.
///
/// Returns `None` if the frame cannot host a single window or its length does
/// not match `width * height`.
pub fn find_hotspot(frame: &[i16], width: usize, height: usize) -> Option<HotspotCoordinate> {
    if width < WINDOW_LEN || height < 2 || frame.len() != width * height {
        return None;
    }

    let mut best: Option<(f64, HotspotCoordinate)> = None;
    for row in 0..height - 1 {
        for col in 0..=width - WINDOW_LEN {
            let start = row * width + col;
            let sum: i32 = frame[start..start + WINDOW_LEN]
                .iter()
                .map(|&p| p as i32)
                .sum();
            let mean = sum as f64 / WINDOW_LEN as f64;

            let better = match best {
                Some((best_mean, _)) => mean > best_mean,
                None => true,
            };
            if better {
                best = Some((mean, HotspotCoordinate { column: col, row }));
            }
        }
    }

    best.map(|(_, coord)| coord)
}

#[cfg(test)]
mod tests {
    use super::*;
    use heatseek_shared::{IMAGE_SIZE, NUM_COLS, NUM_ROWS};

    fn frame_with_cluster(row: usize, col: usize, len: usize) -> Vec<i16> {
        let mut frame = vec![-120_i16; IMAGE_SIZE];
        for c in col..col + len {
            frame[row * NUM_COLS + c] = 400;
        }
        frame
    }

    #[test]
    fn finds_warm_cluster() {
        let frame = frame_with_cluster(2, 10, 4);
        let hot = find_hotspot(&frame, NUM_COLS, NUM_ROWS).unwrap();
        assert_eq!(hot, HotspotCoordinate { column: 10, row: 2 });
    }

    #[test]
    fn uniform_frame_picks_first_window() {
        let frame = vec![7_i16; IMAGE_SIZE];
        let hot = find_hotspot(&frame, NUM_COLS, NUM_ROWS).unwrap();
        assert_eq!(hot, HotspotCoordinate { column: 0, row: 0 });
    }

    #[test]
    fn last_row_never_hosts_a_window() {
        let frame = frame_with_cluster(NUM_ROWS - 1, 5, 4);
        let hot = find_hotspot(&frame, NUM_COLS, NUM_ROWS).unwrap();
        assert!(hot.row < NUM_ROWS - 1);
    }

    #[test]
    fn windows_do_not_wrap_rows() {
        // Hot pixels at the end of row 3 and the start of row 4 would only
        // form a 4-wide cluster if windows wrapped.
        let mut frame = vec![0_i16; IMAGE_SIZE];
        frame[3 * NUM_COLS + 30] = 100;
        frame[3 * NUM_COLS + 31] = 100;
        frame[4 * NUM_COLS] = 100;
        frame[4 * NUM_COLS + 1] = 100;
        let hot = find_hotspot(&frame, NUM_COLS, NUM_ROWS).unwrap();
        assert_eq!(hot, HotspotCoordinate { column: 28, row: 3 });
    }

    #[test]
    fn rejects_degenerate_frames() {
        assert_eq!(find_hotspot(&[1, 2, 3], 3, 1), None);
        assert_eq!(find_hotspot(&vec![0; 10], NUM_COLS, NUM_ROWS), None);
    }
}
