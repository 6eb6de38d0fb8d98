//! Crossfading interpolated delay line.
//!
//! A circular buffer with two integer-sample read taps. Changing the delay
//! does not jump the read position; instead the line crossfades from the
//! old tap to the new one at a configurable per-sample rate, which keeps
//! delay changes click-free while the read path stays branch-free.

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use libm::roundf;

use crate::math::ring_modi;

/// Interpolated delay line with crossfaded delay changes.
///
/// # Example
///
/// ```rust
/// use resona_core::CrossfadedDelayLine;
///
/// let mut line = CrossfadedDelayLine::new(0.1, 44100.0);
/// line.set_interpolation_delta(f32::INFINITY); // snap instantly
/// line.set_delay(2.0 / 44100.0);
/// line.advance(1.0);
/// line.advance(0.0);
/// line.advance(0.0);
/// assert_eq!(line.read(), 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct CrossfadedDelayLine {
    line: Vec<f32>,
    write_head: usize,
    /// Old read tap, in samples.
    delay_old: usize,
    /// New read tap the crossfade is moving toward.
    delay_new: usize,
    w_old: f32,
    w_new: f32,
    /// Per-sample weight step.
    delta: f32,
    crossfading: bool,
    sample_rate: f32,
}

impl CrossfadedDelayLine {
    /// Creates a line holding up to `max_delay` seconds at `sample_rate`.
    ///
    /// # Panics
    ///
    /// Panics if the resulting length is zero.
    pub fn new(max_delay: f32, sample_rate: f32) -> Self {
        let line_length = (sample_rate * max_delay) as usize + 1;
        assert!(line_length > 0, "delay line length must be > 0");
        Self {
            line: vec![0.0; line_length],
            write_head: 0,
            delay_old: 0,
            delay_new: 0,
            w_old: 1.0,
            w_new: 0.0,
            delta: 1.0,
            crossfading: false,
            sample_rate,
        }
    }

    /// Returns the line length in samples.
    pub fn length(&self) -> usize {
        self.line.len()
    }

    /// Sets the target delay in seconds, clamped to the line length.
    ///
    /// Starts a crossfade toward the new tap. If a crossfade is already in
    /// flight the weights are left untouched; snapping them back would
    /// re-introduce the click the crossfade exists to avoid.
    pub fn set_delay(&mut self, delay: f32) {
        let mut samples = roundf(delay * self.sample_rate) as usize;
        if samples >= self.line.len() {
            samples = self.line.len() - 1;
        }
        self.delay_new = samples;
        if !self.crossfading {
            self.w_old = 1.0;
            self.w_new = 0.0;
        }
        self.crossfading = true;
    }

    /// Sets the per-sample crossfade step. `f32::INFINITY` snaps on the
    /// next [`advance`](Self::advance).
    pub fn set_interpolation_delta(&mut self, delta: f32) {
        self.delta = delta;
    }

    /// Reads the current output: `w_old·line[delay_old] + w_new·line[delay_new]`.
    #[inline]
    pub fn read(&self) -> f32 {
        self.w_old * self.tap(self.delay_old) + self.w_new * self.tap(self.delay_new)
    }

    /// Writes `sample`, advances the write head, and steps the crossfade.
    #[inline]
    pub fn advance(&mut self, sample: f32) {
        self.write_head = (self.write_head + 1) % self.line.len();
        self.line[self.write_head] = sample;
        if self.crossfading {
            self.w_old -= self.delta;
            if self.w_old < 0.0 {
                self.w_old = 0.0;
            }
            self.w_new += self.delta;
            if self.w_new >= 1.0 {
                self.w_old = 1.0;
                self.w_new = 0.0;
                self.delay_old = self.delay_new;
                self.crossfading = false;
            }
        }
    }

    /// Combined read-then-advance. Returns the value read before `sample`
    /// was written.
    #[inline]
    pub fn tick(&mut self, sample: f32) -> f32 {
        let out = self.read();
        self.advance(sample);
        out
    }

    /// Clears the buffer and ends any crossfade at the new tap.
    pub fn reset(&mut self) {
        self.line.fill(0.0);
        self.write_head = 0;
        self.delay_old = self.delay_new;
        self.w_old = 1.0;
        self.w_new = 0.0;
        self.crossfading = false;
    }

    /// Reads `delay` samples behind the most recent write.
    #[inline]
    fn tap(&self, delay: usize) -> f32 {
        let len = self.line.len() as i64;
        let idx = ring_modi(self.write_head as i64 - delay as i64, len);
        self.line[idx as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapping_line(max_delay: f32, sr: f32) -> CrossfadedDelayLine {
        let mut line = CrossfadedDelayLine::new(max_delay, sr);
        line.set_interpolation_delta(f32::INFINITY);
        line
    }

    #[test]
    fn impulse_arrives_after_delay() {
        let sr = 44100.0;
        let mut line = snapping_line(0.1, sr);
        line.set_delay(441.0 / sr);
        let mut outputs = Vec::new();
        for t in 0..1000 {
            let input = if t == 0 { 1.0 } else { 0.0 };
            line.advance(input);
            outputs.push(line.read());
        }
        // One sample of crossfade settling, then the tap is exact.
        for (t, &o) in outputs.iter().enumerate().skip(1) {
            let expected = if t == 441 { 1.0 } else { 0.0 };
            assert_eq!(o, expected, "at sample {t}");
        }
    }

    #[test]
    fn read_returns_delayed_ramp() {
        let sr = 1000.0;
        let mut line = snapping_line(0.5, sr);
        line.set_delay(10.0 / sr);
        line.advance(0.0); // settle the snap
        for t in 0..100 {
            line.advance(t as f32);
            if t >= 10 {
                assert_eq!(line.read(), (t - 10) as f32, "at sample {t}");
            }
        }
    }

    #[test]
    fn crossfade_weights_saturate() {
        let mut line = CrossfadedDelayLine::new(0.01, 1000.0);
        line.set_interpolation_delta(0.25);
        line.set_delay(0.005);
        // After four advances, w_new has climbed to 1 and the fade ends.
        for _ in 0..4 {
            line.advance(0.0);
        }
        assert!(!line.crossfading);
        assert_eq!(line.w_old, 1.0);
        assert_eq!(line.w_new, 0.0);
        assert_eq!(line.delay_old, line.delay_new);
    }

    #[test]
    fn set_delay_mid_crossfade_keeps_weights() {
        let mut line = CrossfadedDelayLine::new(0.01, 1000.0);
        line.set_interpolation_delta(0.1);
        line.set_delay(0.003);
        line.advance(0.0);
        line.advance(0.0);
        let (w_old, w_new) = (line.w_old, line.w_new);
        line.set_delay(0.007);
        assert_eq!(line.w_old, w_old);
        assert_eq!(line.w_new, w_new);
    }

    #[test]
    fn delay_clamps_to_line_length() {
        let sr = 1000.0;
        let mut line = snapping_line(0.01, sr); // 11 samples
        line.set_delay(10.0); // far beyond the line
        assert_eq!(line.delay_new, line.length() - 1);
    }

    #[test]
    fn reset_silences_and_ends_crossfade() {
        let mut line = snapping_line(0.01, 1000.0);
        line.set_delay(0.005);
        for i in 0..8 {
            line.advance(i as f32);
        }
        line.reset();
        assert_eq!(line.read(), 0.0);
        for _ in 0..20 {
            line.advance(0.0);
            assert_eq!(line.read(), 0.0);
        }
    }
}
