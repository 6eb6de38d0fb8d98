//! Resona Nodes — concrete processing nodes for the resona audio graph.
//!
//! Each node implements the [`Processor`](resona_core::Processor) contract
//! from `resona-core` and registers itself on a
//! [`Server`](resona_core::Server) through a `create` constructor:
//!
//! - [`SineNode`] — sine oscillator with a-rate frequency
//! - [`GainNode`] — N-channel passthrough; attenuation and bias come from
//!   the standard `mul`/`add` properties
//! - [`DelayNode`] — crossfading interpolated delay with feedback
//! - [`LateReflectionsNode`] — 16-line FDN late-reverberation
//! - [`PullNode`] — external-source node pulling a client callback through
//!   a resampler
//!
//! # Example
//!
//! ```rust
//! use resona_core::Server;
//! use resona_nodes::SineNode;
//!
//! let mut server = Server::new(44100, 128);
//! let sine = SineNode::create(&mut server);
//! server.set_float(sine, resona_nodes::sine::slots::FREQUENCY, 220.0).unwrap();
//! server.connect_to_server(sine, 0).unwrap();
//!
//! let mut block = vec![0.0f32; 128 * server.channels()];
//! server.tick(&mut block).unwrap();
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod delay;
pub mod gain;
pub mod late_reflections;
pub mod pull;
pub mod sine;

pub use delay::DelayNode;
pub use gain::GainNode;
pub use late_reflections::LateReflectionsNode;
pub use pull::{PullCallback, PullNode};
pub use sine::SineNode;
