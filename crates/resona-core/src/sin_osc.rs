//! Sine oscillator used by oscillator nodes and the reverb modulator banks.
//!
//! Implemented as a complex rotation: each tick multiplies a unit phasor by
//! `e^{iω}`, so the hot path is four multiplies and two adds with no
//! transcendental calls. The recurrence drifts very slowly off the unit
//! circle; [`normalize`](SinOsc::normalize) pulls it back and is cheap
//! enough to call once per block.

use core::f64::consts::TAU;
use libm::{atan2, cos, sin, sqrt};

/// Rotation-based sine oscillator.
///
/// Phase is expressed in cycles (`0.0..1.0`). State is double precision so
/// block-length recurrences stay accurate to well below audio noise floors.
///
/// # Example
///
/// ```rust
/// use resona_core::SinOsc;
///
/// let mut osc = SinOsc::new(44100.0);
/// osc.set_frequency(441.0);
/// let first = osc.tick();
/// assert!(first.abs() < 1e-9); // sin(0)
/// ```
#[derive(Debug, Clone)]
pub struct SinOsc {
    /// Real part of the phasor (cosine).
    re: f64,
    /// Imaginary part of the phasor (sine) — the output.
    im: f64,
    /// Rotation coefficients for the current frequency.
    rot_re: f64,
    rot_im: f64,
    frequency: f64,
    sample_rate: f64,
}

impl SinOsc {
    /// Creates an oscillator at phase 0 with a 440 Hz default frequency.
    pub fn new(sample_rate: f64) -> Self {
        let mut osc = Self {
            re: 1.0,
            im: 0.0,
            rot_re: 1.0,
            rot_im: 0.0,
            frequency: 440.0,
            sample_rate,
        };
        osc.set_frequency(440.0);
        osc
    }

    /// Sets the frequency in Hz. Phase is preserved.
    pub fn set_frequency(&mut self, frequency: f64) {
        self.frequency = frequency;
        let omega = TAU * frequency / self.sample_rate;
        self.rot_re = cos(omega);
        self.rot_im = sin(omega);
    }

    /// Returns the current frequency in Hz.
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Sets the phase in cycles. Values outside `[0, 1)` wrap.
    pub fn set_phase(&mut self, phase: f64) {
        let angle = TAU * phase;
        self.re = cos(angle);
        self.im = sin(angle);
    }

    /// Returns the current phase in cycles, in `[0, 1)`.
    pub fn phase(&self) -> f64 {
        let p = atan2(self.im, self.re) / TAU;
        if p < 0.0 { p + 1.0 } else { p }
    }

    /// Returns the current sample and advances one sample.
    #[inline]
    pub fn tick(&mut self) -> f64 {
        let out = self.im;
        let re = self.re * self.rot_re - self.im * self.rot_im;
        let im = self.re * self.rot_im + self.im * self.rot_re;
        self.re = re;
        self.im = im;
        out
    }

    /// Fills `out` with consecutive samples.
    pub fn fill_buffer(&mut self, out: &mut [f32]) {
        for o in out.iter_mut() {
            *o = self.tick() as f32;
        }
    }

    /// Advances the phase by `samples` without producing output.
    ///
    /// Analytic: the phase jump is computed directly instead of iterating
    /// the recurrence, so skipping a block costs the same as one sample.
    pub fn skip_samples(&mut self, samples: usize) {
        let phase = self.phase() + samples as f64 * self.frequency / self.sample_rate;
        self.set_phase(phase % 1.0);
    }

    /// Rescales the phasor back onto the unit circle.
    pub fn normalize(&mut self) {
        let mag = sqrt(self.re * self.re + self.im * self.im);
        if mag > 0.0 {
            self.re /= mag;
            self.im /= mag;
        }
    }

    /// Resets to phase 0; frequency is preserved.
    pub fn reset(&mut self) {
        self.re = 1.0;
        self.im = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_reference_sine() {
        let sr = 44100.0;
        let mut osc = SinOsc::new(sr);
        osc.set_frequency(441.0);
        for k in 0..1024 {
            let expected = sin(TAU * 441.0 * k as f64 / sr);
            let got = osc.tick();
            assert!(
                (got - expected).abs() < 1e-9,
                "sample {k}: expected {expected}, got {got}"
            );
        }
    }

    #[test]
    fn phase_round_trips() {
        let mut osc = SinOsc::new(48000.0);
        for &p in &[0.0, 0.125, 0.25, 0.5, 0.75, 0.99] {
            osc.set_phase(p);
            assert!((osc.phase() - p).abs() < 1e-12, "phase {p}");
        }
    }

    #[test]
    fn skip_matches_ticking() {
        let sr = 48000.0;
        let mut a = SinOsc::new(sr);
        let mut b = SinOsc::new(sr);
        a.set_frequency(3.5);
        b.set_frequency(3.5);
        for _ in 0..777 {
            a.tick();
        }
        b.skip_samples(777);
        assert!((a.tick() - b.tick()).abs() < 1e-9);
    }

    #[test]
    fn normalize_restores_unit_amplitude() {
        let mut osc = SinOsc::new(48000.0);
        osc.set_frequency(1000.0);
        // Perturb the phasor off the unit circle.
        osc.re *= 1.01;
        osc.im *= 1.01;
        osc.normalize();
        let mag = sqrt(osc.re * osc.re + osc.im * osc.im);
        assert!((mag - 1.0).abs() < 1e-12);
    }

    #[test]
    fn reset_returns_to_phase_zero() {
        let mut osc = SinOsc::new(48000.0);
        osc.set_frequency(100.0);
        for _ in 0..50 {
            osc.tick();
        }
        osc.reset();
        assert!(osc.tick().abs() < 1e-12);
        assert!((osc.frequency() - 100.0).abs() < 1e-12);
    }
}
