//! Node base: identifiers, lifecycle, buffers, and the processing
//! contract.
//!
//! A node is common bookkeeping — block buffers, connections, properties,
//! events, state — plus a boxed [`Processor`] holding the DSP kernel. The
//! scheduler in [`server`](crate::server) drives the common part; the
//! processor only ever sees a [`ProcessContext`] with its buffers and
//! properties, so kernels cannot mutate the graph mid-tick by
//! construction.

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, collections::BTreeMap, vec, vec::Vec};
#[cfg(feature = "std")]
use std::collections::BTreeMap;

use crate::connection::{InputConnection, OutputConnection, OutputRef};
use crate::property::{Property, PropertyDescriptor, PropertySet};

/// Unique identifier for a node in a server's table.
///
/// IDs are assigned sequentially and never reused within a server
/// instance, so they stay valid across unrelated graph mutations. All
/// graph traversal (scheduling, cycle checks, forwarding) happens over
/// IDs, never over references into the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl core::fmt::Display for NodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Whether a node participates in processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeState {
    #[default]
    Playing,
    /// The node emits silence and its `process` is never invoked.
    Paused,
}

/// How fan-in treats a channel-count mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelInterpretation {
    /// Copy index-for-index; truncate or zero-fill the difference.
    Discrete,
    /// Apply the canonical speaker-layout mixing matrices.
    #[default]
    Speakers,
}

/// Standard property slots present on every node. Negative so node-specific
/// slots can count up from zero.
pub mod standard_slots {
    /// Playing/paused state (int: 0 = playing, 1 = paused).
    pub const STATE: i32 = -1;
    /// Output gain, applied after `process`. A-rate capable.
    pub const MUL: i32 = -2;
    /// Output bias, applied after the gain. A-rate capable.
    pub const ADD: i32 = -3;
    /// Channel interpretation (int: 0 = discrete, 1 = speakers).
    pub const CHANNEL_INTERPRETATION: i32 = -4;
}

/// Everything a processor may touch during one block.
pub struct ProcessContext<'a> {
    /// Input buffers, one block per channel, already mixed from producers.
    pub inputs: &'a [Vec<f32>],
    /// Output buffers, zeroed before `process`.
    pub outputs: &'a mut [Vec<f32>],
    /// The node's property set, automation already advanced for this tick.
    pub properties: &'a mut PropertySet,
    /// Event slots fired during this block; dispatched after the tick.
    pub fired_events: &'a mut Vec<i32>,
    /// Server sample rate in Hz.
    pub sample_rate: u32,
    /// Samples per block.
    pub block_size: usize,
}

/// The DSP contract every concrete node implements.
///
/// `process` reads `ctx.inputs`, writes `ctx.outputs`, and may consult or
/// update properties; the default passes silence through (output buffers
/// arrive zeroed, gain/bias still apply). `reset` clears filter histories,
/// phases, and delay lines back to the just-constructed state.
pub trait Processor: Send {
    /// The DSP kernel. Runs once per tick while the node is playing.
    fn process(&mut self, ctx: ProcessContext<'_>) {
        let _ = ctx;
    }

    /// Clears internal DSP state (filter histories, phases, delay lines)
    /// back to the just-constructed configuration described by
    /// `properties`.
    fn reset(&mut self, properties: &PropertySet) {
        let _ = properties;
    }

    /// Hook invoked before this node's producers are pulled.
    fn will_process_parents(&mut self, properties: &mut PropertySet) {
        let _ = properties;
    }

    /// Downcasting access for node-specific control surfaces (callbacks,
    /// buffers) reached through the server.
    fn as_any_mut(&mut self) -> &mut dyn core::any::Any;
}

/// A passthrough processor for nodes whose behavior is entirely
/// gain/bias/subgraph bookkeeping.
#[derive(Debug, Default)]
pub struct NullProcessor;

impl Processor for NullProcessor {
    fn as_any_mut(&mut self) -> &mut dyn core::any::Any {
        self
    }
}

/// One event slot: an optional handler plus dispatch bookkeeping.
#[derive(Default)]
pub struct Event {
    pub(crate) handler: Option<Box<dyn FnMut(NodeId) + Send>>,
}

impl Event {
    /// Whether a handler is installed.
    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }
}

impl core::fmt::Debug for Event {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Event")
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// Inner nodes backing a subgraph node's I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubgraphLinks {
    /// Connections made to the subgraph land on this node.
    pub input_node: NodeId,
    /// The subgraph's output buffers mirror this node's.
    pub output_node: NodeId,
}

/// Internal bookkeeping for one node in the server's table.
pub(crate) struct NodeData {
    pub id: NodeId,
    /// Node kind tag, e.g. `"sine"` or `"late_reflections"`.
    pub kind: &'static str,
    pub processor: Box<dyn Processor>,
    pub input_buffers: Vec<Vec<f32>>,
    pub output_buffers: Vec<Vec<f32>>,
    pub input_connections: Vec<InputConnection>,
    pub output_connections: Vec<OutputConnection>,
    pub properties: PropertySet,
    pub events: BTreeMap<i32, Event>,
    /// local slot → (target node, target slot).
    pub forwarded_properties: BTreeMap<i32, (NodeId, i32)>,
    /// Property modulation edges: (local slot, producer output).
    pub property_inputs: Vec<(i32, OutputRef)>,
    pub last_processed_tick: u64,
    pub is_processing: bool,
    pub subgraph: Option<SubgraphLinks>,
    /// Event slots fired during the current tick.
    pub pending_events: Vec<i32>,
    /// Set once the client handle is gone; the node is collected as soon as
    /// nothing downstream consumes it.
    pub released: bool,
}

impl NodeData {
    /// Reads the channel interpretation from the standard slot.
    pub fn channel_interpretation(&self) -> ChannelInterpretation {
        match self
            .properties
            .get(standard_slots::CHANNEL_INTERPRETATION)
            .and_then(|p| p.get_int())
        {
            Ok(0) => ChannelInterpretation::Discrete,
            _ => ChannelInterpretation::Speakers,
        }
    }

    /// Reads the state from the standard slot.
    pub fn current_state(&self) -> NodeState {
        match self
            .properties
            .get(standard_slots::STATE)
            .and_then(|p| p.get_int())
        {
            Ok(1) => NodeState::Paused,
            _ => NodeState::Playing,
        }
    }

    /// Applies output gain then bias, a-rate sample-by-sample or k-rate
    /// with the block kernels. Runs after `process` and before any
    /// consumer reads the buffers.
    pub fn apply_gain_bias(&mut self, block_size: usize) {
        if let Ok(mul) = self.properties.get(standard_slots::MUL) {
            if mul.needs_a_rate() {
                for i in 0..block_size {
                    let m = mul.get_float_at(i).unwrap_or(1.0);
                    for buffer in &mut self.output_buffers {
                        buffer[i] *= m;
                    }
                }
            } else if let Ok(m) = mul.get_float() {
                if m != 1.0 {
                    for buffer in &mut self.output_buffers {
                        crate::math::scalar_multiplication_kernel(m, buffer);
                    }
                }
            }
        }
        if let Ok(add) = self.properties.get(standard_slots::ADD) {
            if add.needs_a_rate() {
                for i in 0..block_size {
                    let a = add.get_float_at(i).unwrap_or(0.0);
                    for buffer in &mut self.output_buffers {
                        buffer[i] += a;
                    }
                }
            } else if let Ok(a) = add.get_float() {
                if a != 0.0 {
                    for buffer in &mut self.output_buffers {
                        crate::math::scalar_addition_kernel(a, buffer);
                    }
                }
            }
        }
    }
}

/// Builder assembling a node for [`Server::add_node`](crate::Server::add_node).
///
/// Concrete node constructors declare their buffer shape, connections, and
/// property layout here; the builder adds the standard slots every node
/// carries.
///
/// # Example
///
/// ```rust
/// use resona_core::{NodeBuilder, NullProcessor};
///
/// let builder = NodeBuilder::new("gain", Box::new(NullProcessor))
///     .input(0, 2)
///     .output(0, 2)
///     .buffers(2, 2);
/// ```
pub struct NodeBuilder {
    pub(crate) kind: &'static str,
    pub(crate) processor: Box<dyn Processor>,
    pub(crate) input_channels: usize,
    pub(crate) output_channels: usize,
    pub(crate) input_connections: Vec<(usize, usize)>,
    pub(crate) output_connections: Vec<(usize, usize)>,
    pub(crate) properties: Vec<(i32, Property)>,
    pub(crate) event_slots: Vec<i32>,
}

impl NodeBuilder {
    /// Starts a builder for a node of the given kind.
    pub fn new(kind: &'static str, processor: Box<dyn Processor>) -> Self {
        Self {
            kind,
            processor,
            input_channels: 0,
            output_channels: 0,
            input_connections: Vec::new(),
            output_connections: Vec::new(),
            properties: Vec::new(),
            event_slots: Vec::new(),
        }
    }

    /// Declares input/output buffer counts.
    pub fn buffers(mut self, input_channels: usize, output_channels: usize) -> Self {
        self.input_channels = input_channels;
        self.output_channels = output_channels;
        self
    }

    /// Appends an input connection covering `channels` buffers at `start`.
    pub fn input(mut self, start: usize, channels: usize) -> Self {
        self.input_connections.push((start, channels));
        self
    }

    /// Appends an output connection covering `channels` buffers at `start`.
    pub fn output(mut self, start: usize, channels: usize) -> Self {
        self.output_connections.push((start, channels));
        self
    }

    /// Adds one property.
    pub fn property(mut self, slot: i32, property: Property) -> Self {
        self.properties.push((slot, property));
        self
    }

    /// Adds every property in a static descriptor table.
    pub fn properties(mut self, descriptors: &'static [PropertyDescriptor]) -> Self {
        for d in descriptors {
            self.properties.push((d.slot, Property::from_descriptor(d)));
        }
        self
    }

    /// Declares an event slot.
    pub fn event(mut self, slot: i32) -> Self {
        self.event_slots.push(slot);
        self
    }

    pub(crate) fn build(self, id: NodeId, block_size: usize) -> NodeData {
        let mut properties = PropertySet::new();
        // Standard slots first; node tables may not override them.
        properties.insert(standard_slots::STATE, Property::int("state", 0, 0, 1));
        properties.insert(
            standard_slots::MUL,
            Property::float("mul", 1.0, f32::NEG_INFINITY, f32::INFINITY),
        );
        properties.insert(
            standard_slots::ADD,
            Property::float("add", 0.0, f32::NEG_INFINITY, f32::INFINITY),
        );
        properties.insert(
            standard_slots::CHANNEL_INTERPRETATION,
            Property::int("channel_interpretation", 1, 0, 1),
        );
        for (slot, property) in self.properties {
            properties.insert(slot, property);
        }

        let mut events = BTreeMap::new();
        for slot in self.event_slots {
            events.insert(slot, Event::default());
        }

        NodeData {
            id,
            kind: self.kind,
            processor: self.processor,
            input_buffers: vec![vec![0.0; block_size]; self.input_channels],
            output_buffers: vec![vec![0.0; block_size]; self.output_channels],
            input_connections: self
                .input_connections
                .into_iter()
                .map(|(start, channels)| InputConnection::new(start, channels))
                .collect(),
            output_connections: self
                .output_connections
                .into_iter()
                .map(|(start, channels)| OutputConnection::new(start, channels))
                .collect(),
            properties,
            events,
            forwarded_properties: BTreeMap::new(),
            property_inputs: Vec::new(),
            last_processed_tick: 0,
            is_processing: false,
            subgraph: None,
            pending_events: Vec::new(),
            released: false,
        }
    }
}
