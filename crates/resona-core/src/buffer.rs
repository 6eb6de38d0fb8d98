//! External audio assets referenced by buffer-typed properties.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Immutable interleaved PCM data at a source sample rate.
///
/// Buffers are shared between nodes via `Arc`; the graph never mutates
/// them, so playback nodes can hold references without copying.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: usize,
    data: Vec<f32>,
}

impl AudioBuffer {
    /// Wraps interleaved PCM data.
    ///
    /// # Panics
    ///
    /// Panics if `channels` is zero or `data.len()` is not a multiple of
    /// `channels`.
    pub fn new(sample_rate: u32, channels: usize, data: Vec<f32>) -> Self {
        assert!(channels > 0, "buffer must have at least one channel");
        assert_eq!(data.len() % channels, 0, "data length must be a whole number of frames");
        Self {
            sample_rate,
            channels,
            data,
        }
    }

    /// Source sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Length in frames.
    pub fn frames(&self) -> usize {
        self.data.len() / self.channels
    }

    /// One sample; zero outside the buffer.
    #[inline]
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        if channel >= self.channels {
            return 0.0;
        }
        self.data
            .get(frame * self.channels + channel)
            .copied()
            .unwrap_or(0.0)
    }

    /// The raw interleaved data.
    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_and_sample_access() {
        let buffer = AudioBuffer::new(44100, 2, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(buffer.frames(), 2);
        assert_eq!(buffer.sample(0, 1), 1.0);
        assert_eq!(buffer.sample(1, 0), 2.0);
        // Out of range reads are silent, not panics.
        assert_eq!(buffer.sample(5, 0), 0.0);
        assert_eq!(buffer.sample(0, 7), 0.0);
    }

    #[test]
    #[should_panic]
    fn rejects_ragged_data() {
        AudioBuffer::new(44100, 2, vec![0.0, 1.0, 2.0]);
    }
}
