//! Resona Core — the audio processing graph.
//!
//! Client programs build a directed acyclic graph of processing nodes on a
//! [`Server`], configure typed [`Property`] values (optionally automated
//! per sample), and pull interleaved blocks of the final mix through
//! [`Server::tick`]. Concrete nodes live in `resona-nodes`; this crate
//! provides:
//!
//! - [`Server`] — node table, connections, property access, and the
//!   block-based pull scheduler
//! - [`Processor`] — the contract every DSP kernel implements
//! - [`Property`] / [`PropertySet`] — typed, range-checked, a-rate
//!   automatable parameters
//! - Connection plumbing with canonical channel-layout mixing
//! - The small DSP primitives the node library builds on:
//!   [`CrossfadedDelayLine`], [`SinOsc`], [`Biquad`],
//!   [`FeedbackDelayNetwork`], [`StreamResampler`]
//!
//! # Threading
//!
//! The graph is single-threaded by construction: every public operation
//! takes `&mut Server`, so the audio pull and client mutations are
//! serialized by exclusive access. `Server` is `Send` — wrap it in a mutex
//! to share it between an audio thread and control threads.
//!
//! # no_std Support
//!
//! This crate is `no_std`-compatible with `alloc`. Disable the default
//! `std` feature:
//!
//! ```toml
//! [dependencies]
//! resona-core = { version = "0.1", default-features = false }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod biquad;
pub mod buffer;
pub mod connection;
pub mod delay_line;
pub mod error;
pub mod fdn;
pub mod math;
pub mod node;
pub mod property;
pub mod resampler;
pub mod server;
pub mod sin_osc;

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, sync::Arc};
#[cfg(feature = "std")]
use std::sync::Arc;

pub use biquad::{allpass, highpass, highshelf, lowpass, Biquad, Coefficients};
pub use buffer::AudioBuffer;
pub use connection::{
    accumulate_channels, mixing_matrix, InputConnection, OutputConnection, OutputRef, Target,
};
pub use delay_line::CrossfadedDelayLine;
pub use error::{Error, Result};
pub use fdn::FeedbackDelayNetwork;
pub use node::{
    standard_slots, ChannelInterpretation, NodeBuilder, NodeId, NodeState, NullProcessor,
    ProcessContext, Processor,
};
pub use property::{
    AutomationPoint, Property, PropertyDescriptor, PropertyKind, PropertySet, PropertyType,
};
pub use resampler::StreamResampler;
pub use server::Server;
pub use sin_osc::SinOsc;

/// Shared handle to an immutable audio asset.
pub type ArcAudioBuffer = Arc<AudioBuffer>;

/// Event callback invoked with the firing node's ID after a tick.
pub type BoxedEventHandler = Box<dyn FnMut(NodeId) + Send>;
