//! Wrap-safe accumulation of a 16-bit quadrature counter into an unbounded position.

use serde::{Deserialize, Serialize};

use crate::peripheral::QuadratureCounter;

/// Constant added back when the counter wraps past 65535 into 0.
///
/// `Modulus` is the arithmetically consistent choice. `Legacy` reproduces the
/// original turret firmware, which added 65535 and so lost one count per
/// positive wrap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WrapRule {
    #[default]
    Modulus,
    Legacy,
}

impl WrapRule {
    fn positive_wrap(&self) -> i64 {
        match self {
            WrapRule::Modulus => 65536,
            WrapRule::Legacy => 65535,
        }
    }
}

/// Signed movement between two counter readings, corrected for wrap-around
pub fn wrap_delta(prev: u16, now: u16, rule: WrapRule) -> i64 {
    let mut delta = now as i64 - prev as i64;
    if delta > 32767 {
        delta -= 65536;
    } else if delta < -32768 {
        delta += rule.positive_wrap();
    }
    delta
}

/// Accumulated encoder position
#[derive(Debug)]
pub struct PositionEncoder<C> {
    counter: C,
    counter_prev: u16,
    position: i64,
    rule: WrapRule,
}

impl<C: QuadratureCounter> PositionEncoder<C> {
    /// Take ownership of the counter. The current count becomes the reference
    /// for the first delta, so the position starts at 0.
    pub fn new(mut counter: C, rule: WrapRule) -> Self {
        let counter_prev = counter.counter();
        Self {
            counter,
            counter_prev,
            position: 0,
            rule,
        }
    }

    /// Sample the counter once and return the updated position
    pub fn read(&mut self) -> i64 {
        let counter_now = self.counter.counter();
        self.position += wrap_delta(self.counter_prev, counter_now, self.rule);
        self.counter_prev = counter_now;
        self.position
    }

    /// Set the accumulated position to 0 at the current location.
    /// The hardware counter and the delta reference are left untouched.
    pub fn zero(&mut self) {
        self.position = 0;
    }

    /// Last accumulated position, without sampling the counter
    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn rule(&self) -> WrapRule {
        self.rule
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counter that replays a fixed list of readings
    struct Replay(Vec<u16>, usize);

    impl QuadratureCounter for Replay {
        fn counter(&mut self) -> u16 {
            let v = self.0[self.1.min(self.0.len() - 1)];
            self.1 += 1;
            v
        }
    }

    #[test]
    fn forward_wrap_counts_one_step() {
        assert_eq!(wrap_delta(65535, 0, WrapRule::Modulus), 1);
        // The original constant loses the count entirely
        assert_eq!(wrap_delta(65535, 0, WrapRule::Legacy), 0);
    }

    #[test]
    fn backward_wrap_counts_one_step() {
        assert_eq!(wrap_delta(0, 65535, WrapRule::Modulus), -1);
        assert_eq!(wrap_delta(0, 65535, WrapRule::Legacy), -1);
    }

    #[test]
    fn small_moves_pass_through() {
        assert_eq!(wrap_delta(1000, 1250, WrapRule::Modulus), 250);
        assert_eq!(wrap_delta(1250, 1000, WrapRule::Modulus), -250);
        assert_eq!(wrap_delta(0, 32767, WrapRule::Modulus), 32767);
    }

    #[test]
    fn accumulates_across_many_wraps() {
        // Ten full forward revolutions of the counter in 16384-count steps
        let mut readings = vec![0_u16];
        let mut raw: u32 = 0;
        for _ in 0..40 {
            raw = (raw + 16384) % 65536;
            readings.push(raw as u16);
        }
        let mut enc = PositionEncoder::new(Replay(readings, 0), WrapRule::Modulus);
        let mut pos = 0;
        for _ in 0..40 {
            pos = enc.read();
        }
        assert_eq!(pos, 40 * 16384);
    }

    #[test]
    fn zero_keeps_the_counter_reference() {
        let mut enc = PositionEncoder::new(Replay(vec![100, 300, 350], 0), WrapRule::Modulus);
        assert_eq!(enc.read(), 200);
        enc.zero();
        assert_eq!(enc.position(), 0);
        // Next delta is relative to 300, not to the construction-time reading
        assert_eq!(enc.read(), 50);
    }
}
