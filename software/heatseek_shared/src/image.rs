//! Frame geometry and the two subpage readout patterns of the MLX90640.
//!
//! Each frame is delivered in two halves ("subpages"). The read pattern decides
//! which pixel belongs to which half:
//!
//! ```text
//! Chess                    Interleaved
//! row 0: 0 1 0 1 ...       row 0: 0 0 0 0 ...
//! row 1: 1 0 1 0 ...       row 1: 1 1 1 1 ...
//! ```

use byte_struct::ByteStructUnspecifiedByteOrder;
use serde::{Deserialize, Serialize};

use crate::bitfield::RegisterError;
use crate::enum_with_unknown;

/// Number of pixel rows
pub const NUM_ROWS: usize = 24;

/// Number of pixel columns
pub const NUM_COLS: usize = 32;

/// Number of pixels in one frame
pub const IMAGE_SIZE: usize = NUM_ROWS * NUM_COLS;

enum_with_unknown! {
    /// Raw value of the `read_pattern` register field
    pub enum PatternId(u16) {
        Interleaved = 0,
        Chess = 1,
    }
}

/// Rule partitioning pixel indices into subpage 0 and subpage 1
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pattern {
    #[default]
    Chess,
    Interleaved,
}

impl Pattern {
    /// Subpage (0 or 1) that the flat pixel index is read out in.
    /// Assumes the MLX90640's 32-pixel rows.
    pub const fn subpage_of(&self, idx: usize) -> u8 {
        let row_parity = idx / 32 - (idx / 64) * 2;
        match self {
            Pattern::Chess => (row_parity ^ (idx - (idx / 2) * 2)) as u8,
            Pattern::Interleaved => row_parity as u8,
        }
    }

    /// Value written to the `read_pattern` register field
    pub fn pattern_id(&self) -> PatternId {
        match self {
            Pattern::Chess => PatternId::Chess,
            Pattern::Interleaved => PatternId::Interleaved,
        }
    }

    /// Resolve a raw `read_pattern` register value
    pub fn from_id(id: u16) -> Result<Self, RegisterError> {
        match PatternId::from(id) {
            PatternId::Chess => Ok(Pattern::Chess),
            PatternId::Interleaved => Ok(Pattern::Interleaved),
            PatternId::Unknown(other) => Err(RegisterError::UnknownPattern(other)),
        }
    }

    /// Ordered pixel indices of one subpage
    pub fn subpage_indices(self, sp_id: u8) -> impl Iterator<Item = usize> {
        (0..IMAGE_SIZE).filter(move |&idx| self.subpage_of(idx) == sp_id)
    }
}

/// One half of a frame under a given read pattern
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Subpage {
    pub pattern: Pattern,
    pub id: u8,
}

impl Subpage {
    pub fn new(pattern: Pattern, id: u8) -> Self {
        Self { pattern, id }
    }

    /// Ordered pixel indices belonging to this subpage
    pub fn indices(&self) -> impl Iterator<Item = usize> {
        self.pattern.subpage_indices(self.id)
    }
}

/// Value of the 3-bit `refresh_rate` field, selecting a subpage rate of 2^(v-1) Hz
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct RefreshRate(u8);

impl RefreshRate {
    /// All valid register values
    pub const VALUES: [u8; 8] = [0, 1, 2, 3, 4, 5, 6, 7];

    /// Wrap a raw register value, keeping only the three field bits
    pub fn from_register(value: u8) -> Self {
        Self(value & 0b111)
    }

    pub fn register_value(&self) -> u8 {
        self.0
    }

    /// Subpage rate in Hz
    pub fn freq(&self) -> f64 {
        2.0_f64.powi(self.0 as i32 - 1)
    }

    /// The register value whose rate is closest to `freq`.
    /// Ties go to the lower value.
    pub fn from_freq(freq: f64) -> Self {
        let mut best = Self(0);
        let mut best_err = f64::INFINITY;
        for v in Self::VALUES {
            let candidate = Self(v);
            let err = (freq - candidate.freq()).abs();
            if err < best_err {
                best = candidate;
                best_err = err;
            }
        }
        best
    }
}

/// Decode one big-endian signed 16-bit pixel word
pub fn decode_pixel(bytes: &[u8]) -> i16 {
    i16::read_bytes_default_be(bytes)
}

/// Decode one big-endian unsigned 16-bit register word
pub fn decode_word(bytes: &[u8]) -> u16 {
    u16::read_bytes_default_be(bytes)
}

/// Encode one register word as big-endian bytes
pub fn encode_word(value: u16, bytes: &mut [u8]) {
    value.write_bytes_default_be(bytes);
}
