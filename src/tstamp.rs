//! Musical timestamps
//!
//! A timestamp is a whole number of beats plus a fractional remainder
//! expressed in `1 / BEAT_DIVISOR` units. The divisor is highly composite
//! so that common tuplet subdivisions compose exactly under addition.

use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Number of remainder units in one beat.
///
/// `882161280 = 2^7 * 3^4 * 5 * 7 * 11 * 13 * 17`, which divides evenly
/// by every subdivision a pattern is likely to use.
pub const BEAT_DIVISOR: i32 = 882_161_280;

/// A point or distance in musical time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Tstamp {
    beats: i64,
    rem: i32,
}

impl Tstamp {
    /// Create a timestamp, normalizing the remainder into
    /// `[0, BEAT_DIVISOR)` with the sign carried on the beat count.
    pub fn new(beats: i64, rem: i64) -> Self {
        let mut ts = Tstamp { beats, rem: 0 };
        ts.add_rem(rem);
        ts
    }

    pub fn zero() -> Self {
        Tstamp { beats: 0, rem: 0 }
    }

    /// Compile-time constructor; `rem` must already be normalized.
    pub const fn new_const(beats: i64, rem: i32) -> Self {
        assert!(rem >= 0 && rem < BEAT_DIVISOR);
        Tstamp { beats, rem }
    }

    pub fn from_beats(beats: i64) -> Self {
        Tstamp { beats, rem: 0 }
    }

    pub fn beats(&self) -> i64 {
        self.beats
    }

    pub fn rem(&self) -> i32 {
        self.rem
    }

    pub fn is_zero(&self) -> bool {
        self.beats == 0 && self.rem == 0
    }

    /// Add a raw remainder amount, renormalizing.
    fn add_rem(&mut self, rem: i64) {
        let divisor = i64::from(BEAT_DIVISOR);
        let total = i64::from(self.rem) + rem;
        self.beats += total.div_euclid(divisor);
        self.rem = total.rem_euclid(divisor) as i32;
    }

    /// The timestamp as a floating-point beat count.
    pub fn to_beats_f64(&self) -> f64 {
        self.beats as f64 + f64::from(self.rem) / f64::from(BEAT_DIVISOR)
    }

    /// Convert a musical distance to a frame count.
    ///
    /// The result is exact in double precision; callers that need an
    /// integer frame count round half to even so that event dispatch does
    /// not drift in either direction.
    pub fn to_frames(&self, tempo: f64, audio_rate: u32) -> f64 {
        debug_assert!(tempo > 0.0);
        debug_assert!(audio_rate > 0);
        self.to_beats_f64() * 60.0 * f64::from(audio_rate) / tempo
    }

    /// Convert a frame count back to a musical distance.
    pub fn from_frames(frames: f64, tempo: f64, audio_rate: u32) -> Self {
        debug_assert!(tempo > 0.0);
        debug_assert!(audio_rate > 0);
        let beats = frames * tempo / (60.0 * f64::from(audio_rate));
        let whole = beats.floor();
        let rem = ((beats - whole) * f64::from(BEAT_DIVISOR)).round_ties_even() as i64;
        Tstamp::new(whole as i64, rem)
    }
}

impl Add for Tstamp {
    type Output = Tstamp;

    fn add(self, other: Tstamp) -> Tstamp {
        let mut result = Tstamp {
            beats: self.beats + other.beats,
            rem: self.rem,
        };
        result.add_rem(i64::from(other.rem));
        result
    }
}

impl AddAssign for Tstamp {
    fn add_assign(&mut self, other: Tstamp) {
        *self = *self + other;
    }
}

impl Sub for Tstamp {
    type Output = Tstamp;

    fn sub(self, other: Tstamp) -> Tstamp {
        let mut result = Tstamp {
            beats: self.beats - other.beats,
            rem: self.rem,
        };
        result.add_rem(-i64::from(other.rem));
        result
    }
}

impl SubAssign for Tstamp {
    fn sub_assign(&mut self, other: Tstamp) {
        *self = *self - other;
    }
}

/// Round a frame position to an integer frame index, half to even.
pub fn frames_to_index(frames: f64) -> i64 {
    frames.round_ties_even() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn test_normalization_after_add() {
        let a = Tstamp::new(1, i64::from(BEAT_DIVISOR) - 1);
        let b = Tstamp::new(0, 2);
        let sum = a + b;
        assert_eq!(sum.beats(), 2);
        assert_eq!(sum.rem(), 1);
        assert!(sum.rem() >= 0 && sum.rem() < BEAT_DIVISOR);
    }

    #[test]
    fn test_normalization_after_sub() {
        let a = Tstamp::new(2, 0);
        let b = Tstamp::new(0, 1);
        let diff = a - b;
        assert_eq!(diff.beats(), 1);
        assert_eq!(diff.rem(), BEAT_DIVISOR - 1);
    }

    #[test]
    fn test_negative_remainder_carries_sign() {
        let ts = Tstamp::new(0, -1);
        assert_eq!(ts.beats(), -1);
        assert_eq!(ts.rem(), BEAT_DIVISOR - 1);
    }

    #[test]
    fn test_ordering() {
        let a = Tstamp::new(1, 0);
        let b = Tstamp::new(1, 1);
        let c = Tstamp::new(2, 0);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(a.cmp(&a), Ordering::Equal);
    }

    #[test]
    fn test_to_frames_basic() {
        // One beat at 60 BPM and 48000 Hz is exactly one second.
        let ts = Tstamp::from_beats(1);
        let frames = ts.to_frames(60.0, 48000);
        assert_eq!(frames, 48000.0);
    }

    #[test]
    fn test_frame_round_trip() {
        let ts = Tstamp::new(3, i64::from(BEAT_DIVISOR) / 7);
        let frames = ts.to_frames(113.0, 44100);
        let back = ts - Tstamp::from_frames(frames, 113.0, 44100);
        // Round trip is exact up to representable rounding.
        assert!(back.to_beats_f64().abs() < 1e-9);
    }

    #[test]
    fn test_fractional_subdivisions_compose_exactly() {
        let third = Tstamp::new(0, i64::from(BEAT_DIVISOR) / 3);
        let sum = third + third + third;
        assert_eq!(sum, Tstamp::from_beats(1));
    }
}
