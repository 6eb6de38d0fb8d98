//! Linear-interpolation stream resampler for external-source nodes.
//!
//! Converts an incoming interleaved stream at one rate to the server rate,
//! frame by frame. Quality is deliberately modest — external sources feed
//! the graph, and a first-order interpolator is inaudible against the
//! processing that follows while staying allocation-free after
//! construction.

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

/// Streaming resampler over interleaved frames.
///
/// Push input with [`feed`](Self::feed); pull converted output with
/// [`produce`](Self::produce). `produce` returns how many frames it wrote,
/// which falls short of the request only when the input queue runs dry.
pub struct StreamResampler {
    channels: usize,
    /// Input frames consumed per output frame.
    step: f64,
    /// Fractional read position into the queue, in frames.
    position: f64,
    /// Buffered input, interleaved.
    queue: Vec<f32>,
}

impl StreamResampler {
    /// Creates a resampler converting `input_sr` to `output_sr`.
    ///
    /// # Panics
    ///
    /// Panics if any argument is zero.
    pub fn new(channels: usize, input_sr: u32, output_sr: u32) -> Self {
        assert!(channels > 0 && input_sr > 0 && output_sr > 0);
        Self {
            channels,
            step: input_sr as f64 / output_sr as f64,
            position: 0.0,
            queue: Vec::new(),
        }
    }

    /// Appends interleaved input frames.
    pub fn feed(&mut self, interleaved: &[f32]) {
        debug_assert_eq!(interleaved.len() % self.channels, 0);
        self.queue.extend_from_slice(interleaved);
    }

    /// Writes up to `out.len() / channels` converted frames into `out`.
    ///
    /// Returns the number of frames written. Linear interpolation needs the
    /// frame after the read position, so the final queued frame is held
    /// back until its successor arrives.
    pub fn produce(&mut self, out: &mut [f32]) -> usize {
        let channels = self.channels;
        let requested = out.len() / channels;
        let available = self.queue.len() / channels;
        let mut written = 0;

        while written < requested {
            let base = self.position as usize;
            if base + 1 >= available {
                break;
            }
            let frac = (self.position - base as f64) as f32;
            for c in 0..channels {
                let a = self.queue[base * channels + c];
                let b = self.queue[(base + 1) * channels + c];
                out[written * channels + c] = a + (b - a) * frac;
            }
            self.position += self.step;
            written += 1;
        }

        // Drop fully-consumed frames, keeping the interpolation predecessor.
        let consumed = (self.position as usize).min(available.saturating_sub(1));
        if consumed > 0 {
            self.queue.drain(..consumed * channels);
            self.position -= consumed as f64;
        }
        written
    }
}
