//! Typed output→input edges and channel-count reconciliation.
//!
//! A connection pairs an *output side* (a node, a starting output-buffer
//! index, and a channel count) with an *input side* (likewise for input
//! buffers) or with a property's a-rate modulation input. Fan-in sums every
//! connected producer into the consumer's buffers.
//!
//! When producer and consumer channel counts differ and the consumer
//! interprets channels as speaker feeds, one of twelve canonical mixing
//! matrices reconciles them; any other mismatch truncates extra producer
//! channels and zero-fills extra consumer channels.
//!
//! Channel orderings follow the usual speaker layouts: mono; stereo
//! `[L, R]`; 5.1 `[FL, FR, C, LFE, BL, BR]`; 7.1
//! `[FL, FR, C, LFE, BL, BR, SL, SR]`.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::node::NodeId;

/// `1/sqrt(2)`, the equal-power pan weight used by the mix matrices.
const EP: f32 = core::f32::consts::FRAC_1_SQRT_2;

// Canonical mixing matrices, row-major `out_channels × in_channels`.
// Mono feeds and folds through the center channel where one exists.

const MIX_1_2: [f32; 2] = [1.0, 1.0];
const MIX_1_6: [f32; 6] = [0.0, 0.0, 1.0, 0.0, 0.0, 0.0];
const MIX_1_8: [f32; 8] = [0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0];

const MIX_2_1: [f32; 2] = [0.5, 0.5];
#[rustfmt::skip]
const MIX_2_6: [f32; 12] = [
    1.0, 0.0,
    0.0, 1.0,
    0.0, 0.0,
    0.0, 0.0,
    0.0, 0.0,
    0.0, 0.0,
];
#[rustfmt::skip]
const MIX_2_8: [f32; 16] = [
    1.0, 0.0,
    0.0, 1.0,
    0.0, 0.0,
    0.0, 0.0,
    0.0, 0.0,
    0.0, 0.0,
    0.0, 0.0,
    0.0, 0.0,
];

const MIX_6_1: [f32; 6] = [EP, EP, 1.0, 0.0, 0.5, 0.5];
#[rustfmt::skip]
const MIX_6_2: [f32; 12] = [
    1.0, 0.0, EP, 0.0, EP, 0.0,
    0.0, 1.0, EP, 0.0, 0.0, EP,
];
#[rustfmt::skip]
const MIX_6_8: [f32; 48] = [
    1.0, 0.0, 0.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0, 0.0, 0.0,
    0.0, 0.0, 1.0, 0.0, 0.0, 0.0,
    0.0, 0.0, 0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.0, 0.0, 1.0, 0.0,
    0.0, 0.0, 0.0, 0.0, 0.0, 1.0,
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
];

const MIX_8_1: [f32; 8] = [EP, EP, 1.0, 0.0, 0.5, 0.5, 0.5, 0.5];
#[rustfmt::skip]
const MIX_8_2: [f32; 16] = [
    1.0, 0.0, EP, 0.0, EP, 0.0, EP, 0.0,
    0.0, 1.0, EP, 0.0, 0.0, EP, 0.0, EP,
];
#[rustfmt::skip]
const MIX_8_6: [f32; 48] = [
    1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
    0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0,
    0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0,
    0.0, 0.0, 0.0, 0.0, 1.0, 0.0, EP,  0.0,
    0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, EP,
];

/// Looks up the canonical mixing matrix for `(in_channels, out_channels)`,
/// row-major `out × in`. `None` means copy/truncate/zero-fill applies.
pub fn mixing_matrix(in_channels: usize, out_channels: usize) -> Option<&'static [f32]> {
    match (in_channels, out_channels) {
        (1, 2) => Some(&MIX_1_2),
        (1, 6) => Some(&MIX_1_6),
        (1, 8) => Some(&MIX_1_8),
        (2, 1) => Some(&MIX_2_1),
        (2, 6) => Some(&MIX_2_6),
        (2, 8) => Some(&MIX_2_8),
        (6, 1) => Some(&MIX_6_1),
        (6, 2) => Some(&MIX_6_2),
        (6, 8) => Some(&MIX_6_8),
        (8, 1) => Some(&MIX_8_1),
        (8, 2) => Some(&MIX_8_2),
        (8, 6) => Some(&MIX_8_6),
        _ => None,
    }
}

/// Accumulates producer channels into consumer channels.
///
/// With `mix` set and a canonical matrix available for the channel pair,
/// the matrix is applied pointwise; otherwise channels are copied
/// index-for-index, dropping trailing producer channels and leaving extra
/// consumer channels untouched (they were zeroed at tick start).
pub fn accumulate_channels(sources: &[&[f32]], destinations: &mut [&mut [f32]], mix: bool) {
    let in_channels = sources.len();
    let out_channels = destinations.len();

    if mix && in_channels != out_channels {
        if let Some(matrix) = mixing_matrix(in_channels, out_channels) {
            for (o, dest) in destinations.iter_mut().enumerate() {
                let row = &matrix[o * in_channels..(o + 1) * in_channels];
                for (i, src) in sources.iter().enumerate() {
                    let weight = row[i];
                    if weight == 0.0 {
                        continue;
                    }
                    for (d, &s) in dest.iter_mut().zip(src.iter()) {
                        *d += weight * s;
                    }
                }
            }
            return;
        }
    }

    for (dest, src) in destinations.iter_mut().zip(sources.iter()) {
        for (d, &s) in dest.iter_mut().zip(src.iter()) {
            *d += s;
        }
    }
}

/// A reference to one output connection of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputRef {
    pub node: NodeId,
    pub output: usize,
}

/// Where an output connection delivers its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// An input connection of another node.
    Input { node: NodeId, input: usize },
    /// The a-rate modulation input of another node's property.
    Property { node: NodeId, slot: i32 },
    /// The server's final-mix connection.
    Server,
}

/// The input side of an edge: a window into a node's input buffers plus the
/// producers currently feeding it.
#[derive(Debug, Clone, Default)]
pub struct InputConnection {
    /// First input buffer this connection covers.
    pub start: usize,
    /// Number of channels.
    pub channels: usize,
    /// Producers currently connected.
    pub(crate) sources: Vec<OutputRef>,
}

impl InputConnection {
    /// A connection covering `channels` buffers starting at `start`.
    pub fn new(start: usize, channels: usize) -> Self {
        Self {
            start,
            channels,
            sources: Vec::new(),
        }
    }

    /// The producers currently connected.
    pub fn sources(&self) -> &[OutputRef] {
        &self.sources
    }
}

/// The output side of an edge: a window into a node's output buffers plus
/// the targets it currently feeds.
#[derive(Debug, Clone, Default)]
pub struct OutputConnection {
    /// First output buffer this connection covers.
    pub start: usize,
    /// Number of channels.
    pub channels: usize,
    /// Consumers currently connected.
    pub(crate) targets: Vec<Target>,
}

impl OutputConnection {
    /// A connection covering `channels` buffers starting at `start`.
    pub fn new(start: usize, channels: usize) -> Self {
        Self {
            start,
            channels,
            targets: Vec::new(),
        }
    }

    /// The consumers currently connected.
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }
}
