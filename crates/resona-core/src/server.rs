//! The server: node table, graph mutation, property access, and the
//! block-based pull scheduler.
//!
//! All public operations take `&mut self`, so exclusive access — not a
//! lock — serializes client mutation against the audio pull. `Server` is
//! `Send`; callers that share it across threads wrap it in the mutex of
//! their choice and get exactly the serialization the engine requires.
//!
//! # Scheduling
//!
//! There is no standalone scheduler object. [`tick`](Server::tick)
//! advances the monotonic tick counter, walks the dependency graph from
//! the final-mix connection (a DFS over [`NodeId`]s, never over
//! references), and runs every reachable node exactly once in dependency
//! order. Acyclicity is enforced when edges are created, so the traversal
//! always terminates.

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use crate::connection::{accumulate_channels, InputConnection, OutputRef, Target};
use crate::error::{Error, Result};
use crate::node::{
    standard_slots, ChannelInterpretation, NodeBuilder, NodeData, NodeId, NodeState,
    ProcessContext, Processor, SubgraphLinks,
};
use crate::property::{Property, PropertyType};

/// Forwarding chains longer than this indicate a forwarding loop.
const MAX_FORWARD_HOPS: usize = 64;

/// Owns the node table and drives the processing graph.
///
/// # Example
///
/// ```rust,ignore
/// use resona_core::Server;
/// use resona_nodes::SineNode;
///
/// let mut server = Server::new(44100, 128);
/// let sine = SineNode::create(&mut server);
/// server.connect_to_server(sine, 0)?;
///
/// let mut block = vec![0.0f32; 128 * server.channels()];
/// server.tick(&mut block)?;
/// ```
pub struct Server {
    sample_rate: u32,
    block_size: usize,
    channels: usize,
    tick_count: u64,
    nodes: Vec<Option<NodeData>>,
    next_slot: u32,
    final_connection: InputConnection,
    final_buffers: Vec<Vec<f32>>,
}

impl Server {
    /// Creates a server with a stereo final mix.
    ///
    /// # Panics
    ///
    /// Panics if `sample_rate` or `block_size` is zero.
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        Self::with_channels(sample_rate, block_size, 2)
    }

    /// Creates a server with `channels` final-mix channels.
    pub fn with_channels(sample_rate: u32, block_size: usize, channels: usize) -> Self {
        assert!(sample_rate > 0, "sample rate must be positive");
        assert!(block_size > 0, "block size must be positive");
        assert!(channels > 0, "final mix needs at least one channel");
        Self {
            sample_rate,
            block_size,
            channels,
            tick_count: 0,
            nodes: Vec::new(),
            next_slot: 0,
            final_connection: InputConnection::new(0, channels),
            final_buffers: vec![vec![0.0; block_size]; channels],
        }
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples per block.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Final-mix channel count.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of completed ticks. Strictly monotonic.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    // --- Node lifecycle ---

    /// Adds a node assembled by a [`NodeBuilder`]. Returns its ID.
    pub fn add_node(&mut self, builder: NodeBuilder) -> NodeId {
        let id = NodeId(self.next_slot);
        self.next_slot += 1;
        let node = builder.build(id, self.block_size);
        let idx = id.0 as usize;
        if idx >= self.nodes.len() {
            self.nodes.resize_with(idx + 1, || None);
        }
        self.nodes[idx] = Some(node);
        id
    }

    /// Releases the client's handle on a node.
    ///
    /// The node is destroyed immediately unless something downstream still
    /// consumes it (an input connection, a property connection, or the
    /// final mix), in which case it lives until fully disconnected.
    pub fn release(&mut self, id: NodeId) -> Result<()> {
        let node = self.node_ref(id)?;
        let consumed = node
            .output_connections
            .iter()
            .any(|oc| !oc.targets.is_empty());
        if consumed {
            self.node_mut(id)?.released = true;
        } else {
            self.remove_node(id)?;
        }
        Ok(())
    }

    /// The kind tag of a node, e.g. `"sine"`.
    pub fn kind(&self, id: NodeId) -> Result<&'static str> {
        Ok(self.node_ref(id)?.kind)
    }

    /// Downcasts a node's processor for node-specific control.
    ///
    /// Returns [`Error::TypeMismatch`] if the node's processor is not a
    /// `P`.
    pub fn processor_mut<P: Processor + 'static>(&mut self, id: NodeId) -> Result<&mut P> {
        self.node_mut(id)?
            .processor
            .as_any_mut()
            .downcast_mut()
            .ok_or(Error::TypeMismatch)
    }

    /// Resets a node's DSP state (filter histories, phases, delay lines).
    pub fn reset(&mut self, id: NodeId) -> Result<()> {
        let node = self.node_mut(id)?;
        node.processor.reset(&node.properties);
        Ok(())
    }

    /// Sets a node's state.
    pub fn set_state(&mut self, id: NodeId, state: NodeState) -> Result<()> {
        let value = match state {
            NodeState::Playing => 0,
            NodeState::Paused => 1,
        };
        self.node_mut(id)?
            .properties
            .get_mut(standard_slots::STATE)?
            .set_int(value)
    }

    /// A node's current state.
    pub fn state(&self, id: NodeId) -> Result<NodeState> {
        Ok(self.node_ref(id)?.current_state())
    }

    /// The set of nodes a node depends on: producers on its input
    /// connections, producers modulating its properties, and the inner
    /// output node of a subgraph.
    pub fn dependencies(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let node = self.node_ref(id)?;
        let mut deps = Vec::new();
        for ic in &node.input_connections {
            for source in &ic.sources {
                if !deps.contains(&source.node) {
                    deps.push(source.node);
                }
            }
        }
        for (_, source) in &node.property_inputs {
            if !deps.contains(&source.node) {
                deps.push(source.node);
            }
        }
        if let Some(links) = node.subgraph {
            if !deps.contains(&links.output_node) {
                deps.push(links.output_node);
            }
        }
        Ok(deps)
    }

    // --- Connections ---

    /// Connects `from`'s output connection to `to`'s input connection.
    ///
    /// Re-adding an identical edge is idempotent: the previous edge is
    /// removed first. Fails with [`Error::CausesCycle`] if the edge would
    /// make the graph cyclic, leaving the graph unchanged.
    pub fn connect(&mut self, from: NodeId, output: usize, to: NodeId, input: usize) -> Result<()> {
        // Connections made to a subgraph land on its inner input node.
        let to = self.resolve_subgraph_input(to)?;
        let from_node = self.node_ref(from)?;
        if output >= from_node.output_connections.len() {
            return Err(Error::Range);
        }
        let to_node = self.node_ref(to)?;
        if input >= to_node.input_connections.len() {
            return Err(Error::Range);
        }
        if self.creates_cycle(from, to)? {
            return Err(Error::CausesCycle);
        }

        let target = Target::Input { node: to, input };
        let source = OutputRef { node: from, output };
        let from_node = self.node_mut(from)?;
        from_node.output_connections[output]
            .targets
            .retain(|t| *t != target);
        from_node.output_connections[output].targets.push(target);
        let to_node = self.node_mut(to)?;
        to_node.input_connections[input]
            .sources
            .retain(|s| *s != source);
        to_node.input_connections[input].sources.push(source);
        Ok(())
    }

    /// Connects `from`'s output connection to the server's final mix.
    pub fn connect_to_server(&mut self, from: NodeId, output: usize) -> Result<()> {
        let from_node = self.node_ref(from)?;
        if output >= from_node.output_connections.len() {
            return Err(Error::Range);
        }
        let source = OutputRef { node: from, output };
        let from_node = self.node_mut(from)?;
        from_node.output_connections[output]
            .targets
            .retain(|t| *t != Target::Server);
        from_node.output_connections[output].targets.push(Target::Server);
        self.final_connection.sources.retain(|s| *s != source);
        self.final_connection.sources.push(source);
        Ok(())
    }

    /// Connects `from`'s output connection to a property's a-rate input.
    ///
    /// The property must be a numeric scalar; other types fail with
    /// [`Error::CannotConnectToProperty`]. Property edges participate in
    /// the cycle check exactly like audio edges.
    pub fn connect_property(
        &mut self,
        from: NodeId,
        output: usize,
        to: NodeId,
        slot: i32,
    ) -> Result<()> {
        self.node_ref(to)?;
        let (to, slot) = self.resolve_forward(to, slot)?;
        let from_node = self.node_ref(from)?;
        if output >= from_node.output_connections.len() {
            return Err(Error::Range);
        }
        if !self
            .node_ref(to)?
            .properties
            .get(slot)?
            .is_automatable()
        {
            return Err(Error::CannotConnectToProperty);
        }
        if self.creates_cycle(from, to)? {
            return Err(Error::CausesCycle);
        }

        let target = Target::Property { node: to, slot };
        let source = OutputRef { node: from, output };
        let from_node = self.node_mut(from)?;
        from_node.output_connections[output]
            .targets
            .retain(|t| *t != target);
        from_node.output_connections[output].targets.push(target);
        let to_node = self.node_mut(to)?;
        to_node
            .property_inputs
            .retain(|(s, src)| !(*s == slot && *src == source));
        to_node.property_inputs.push((slot, source));
        Ok(())
    }

    /// Clears every edge leaving `from`'s output connection.
    pub fn disconnect(&mut self, from: NodeId, output: usize) -> Result<()> {
        let from_node = self.node_mut(from)?;
        if output >= from_node.output_connections.len() {
            return Err(Error::Range);
        }
        let targets = core::mem::take(&mut from_node.output_connections[output].targets);
        let source = OutputRef { node: from, output };
        for target in targets {
            match target {
                Target::Input { node, input } => {
                    if let Ok(consumer) = self.node_mut(node) {
                        if let Some(ic) = consumer.input_connections.get_mut(input) {
                            ic.sources.retain(|s| *s != source);
                        }
                    }
                }
                Target::Property { node, slot } => {
                    if let Ok(consumer) = self.node_mut(node) {
                        consumer
                            .property_inputs
                            .retain(|(s, src)| !(*s == slot && *src == source));
                    }
                }
                Target::Server => {
                    self.final_connection.sources.retain(|s| *s != source);
                }
            }
        }
        self.collect_if_released(from);
        Ok(())
    }

    // --- Subgraphs ---

    /// Designates inner input/output nodes backing a subgraph node.
    ///
    /// Connections made to the subgraph are redirected to `input_node`;
    /// the subgraph's output buffers mirror `output_node`'s, with the
    /// subgraph's own gain/bias applied on top so internal volumes stay
    /// free.
    pub fn set_subgraph(&mut self, id: NodeId, input_node: NodeId, output_node: NodeId) -> Result<()> {
        self.node_ref(input_node)?;
        let inner_channels = self.node_ref(output_node)?.output_buffers.len();
        // The subgraph node depends on its inner output; that edge must
        // not close a cycle either.
        if id == output_node || self.reaches(output_node, id)? {
            return Err(Error::CausesCycle);
        }
        let block_size = self.block_size;
        let node = self.node_mut(id)?;
        node.subgraph = Some(SubgraphLinks {
            input_node,
            output_node,
        });
        node.output_buffers = vec![vec![0.0; block_size]; inner_channels];
        if node.output_connections.is_empty() {
            node.output_connections
                .push(crate::connection::OutputConnection::new(0, inner_channels));
        }
        Ok(())
    }

    // --- Property access ---

    /// Forwards `slot` on `id` to `target_slot` on `target`.
    ///
    /// Subsequent property operations on the forwarded slot are redirected
    /// through the server's table; a broken target surfaces as
    /// [`Error::Internal`].
    pub fn forward_property(
        &mut self,
        id: NodeId,
        slot: i32,
        target: NodeId,
        target_slot: i32,
    ) -> Result<()> {
        self.node_ref(target)?.properties.get(target_slot)?;
        self.node_mut(id)?
            .forwarded_properties
            .insert(slot, (target, target_slot));
        Ok(())
    }

    /// Removes a forward installed by
    /// [`forward_property`](Self::forward_property).
    pub fn stop_forwarding_property(&mut self, id: NodeId, slot: i32) -> Result<()> {
        match self.node_mut(id)?.forwarded_properties.remove(&slot) {
            Some(_) => Ok(()),
            None => Err(Error::Internal),
        }
    }

    /// Gets an int property.
    pub fn get_int(&self, id: NodeId, slot: i32) -> Result<i32> {
        self.property(id, slot)?.get_int()
    }

    /// Sets an int property.
    pub fn set_int(&mut self, id: NodeId, slot: i32, value: i32) -> Result<()> {
        self.writable_property(id, slot)?.set_int(value)
    }

    /// Gets a float property (k-rate view).
    pub fn get_float(&self, id: NodeId, slot: i32) -> Result<f32> {
        self.property(id, slot)?.get_float()
    }

    /// Gets a float property at a block-relative sample offset.
    pub fn get_float_at(&self, id: NodeId, slot: i32, offset: usize) -> Result<f32> {
        self.property(id, slot)?.get_float_at(offset)
    }

    /// Sets a float property.
    pub fn set_float(&mut self, id: NodeId, slot: i32, value: f32) -> Result<()> {
        self.writable_property(id, slot)?.set_float(value)
    }

    /// Gets a double property.
    pub fn get_double(&self, id: NodeId, slot: i32) -> Result<f64> {
        self.property(id, slot)?.get_double()
    }

    /// Gets a double property at a block-relative sample offset.
    pub fn get_double_at(&self, id: NodeId, slot: i32, offset: usize) -> Result<f64> {
        self.property(id, slot)?.get_double_at(offset)
    }

    /// Sets a double property.
    pub fn set_double(&mut self, id: NodeId, slot: i32, value: f64) -> Result<()> {
        self.writable_property(id, slot)?.set_double(value)
    }

    /// Gets a string property.
    pub fn get_string(&self, id: NodeId, slot: i32) -> Result<&str> {
        self.property(id, slot)?.get_string()
    }

    /// Sets a string property.
    pub fn set_string(&mut self, id: NodeId, slot: i32, value: &str) -> Result<()> {
        self.writable_property(id, slot)?.set_string(value)
    }

    /// Gets a float3 property.
    pub fn get_float3(&self, id: NodeId, slot: i32) -> Result<[f32; 3]> {
        self.property(id, slot)?.get_float3()
    }

    /// Sets a float3 property.
    pub fn set_float3(&mut self, id: NodeId, slot: i32, value: [f32; 3]) -> Result<()> {
        self.writable_property(id, slot)?.set_float3(value)
    }

    /// Gets a float6 property.
    pub fn get_float6(&self, id: NodeId, slot: i32) -> Result<[f32; 6]> {
        self.property(id, slot)?.get_float6()
    }

    /// Sets a float6 property.
    pub fn set_float6(&mut self, id: NodeId, slot: i32, value: [f32; 6]) -> Result<()> {
        self.writable_property(id, slot)?.set_float6(value)
    }

    /// Gets a buffer property.
    pub fn get_buffer(
        &self,
        id: NodeId,
        slot: i32,
    ) -> Result<Option<crate::ArcAudioBuffer>> {
        self.property(id, slot)?.get_buffer()
    }

    /// Sets a buffer property.
    pub fn set_buffer(
        &mut self,
        id: NodeId,
        slot: i32,
        buffer: Option<crate::ArcAudioBuffer>,
    ) -> Result<()> {
        self.writable_property(id, slot)?.set_buffer(buffer)
    }

    /// Replaces a float array property.
    pub fn replace_float_array(&mut self, id: NodeId, slot: i32, values: &[f32]) -> Result<()> {
        self.writable_property(id, slot)?.replace_float_array(values)
    }

    /// Reads one element of a float array property.
    pub fn read_float_array(&self, id: NodeId, slot: i32, index: usize) -> Result<f32> {
        self.property(id, slot)?.read_float_array(index)
    }

    /// Writes `[start, stop)` of a float array property.
    pub fn write_float_array(
        &mut self,
        id: NodeId,
        slot: i32,
        start: usize,
        stop: usize,
        values: &[f32],
    ) -> Result<()> {
        self.writable_property(id, slot)?
            .write_float_array(start, stop, values)
    }

    /// Replaces an int array property.
    pub fn replace_int_array(&mut self, id: NodeId, slot: i32, values: &[i32]) -> Result<()> {
        self.writable_property(id, slot)?.replace_int_array(values)
    }

    /// Reads one element of an int array property.
    pub fn read_int_array(&self, id: NodeId, slot: i32, index: usize) -> Result<i32> {
        self.property(id, slot)?.read_int_array(index)
    }

    /// Writes `[start, stop)` of an int array property.
    pub fn write_int_array(
        &mut self,
        id: NodeId,
        slot: i32,
        start: usize,
        stop: usize,
        values: &[i32],
    ) -> Result<()> {
        self.writable_property(id, slot)?
            .write_int_array(start, stop, values)
    }

    /// A property's type tag.
    pub fn property_type(&self, id: NodeId, slot: i32) -> Result<PropertyType> {
        Ok(self.property(id, slot)?.get_type())
    }

    /// A property's display name.
    pub fn property_name(&self, id: NodeId, slot: i32) -> Result<&'static str> {
        Ok(self.property(id, slot)?.name())
    }

    /// Whether a property is read-only.
    pub fn is_read_only(&self, id: NodeId, slot: i32) -> Result<bool> {
        Ok(self.property(id, slot)?.is_read_only())
    }

    /// Whether a property's range can change at runtime.
    pub fn has_dynamic_range(&self, id: NodeId, slot: i32) -> Result<bool> {
        Ok(self.property(id, slot)?.has_dynamic_range())
    }

    /// `[min, max]` of a float property.
    pub fn float_range(&self, id: NodeId, slot: i32) -> Result<(f32, f32)> {
        self.property(id, slot)?.float_range()
    }

    /// `[min, max]` of an int property.
    pub fn int_range(&self, id: NodeId, slot: i32) -> Result<(i32, i32)> {
        self.property(id, slot)?.int_range()
    }

    /// `[min, max]` of a double property.
    pub fn double_range(&self, id: NodeId, slot: i32) -> Result<(f64, f64)> {
        self.property(id, slot)?.double_range()
    }

    /// Replaces a float property's `[min, max]` range.
    ///
    /// Only properties advertising a dynamic range
    /// ([`has_dynamic_range`](Self::has_dynamic_range)) can be retuned
    /// through the public API; fixed ranges fail with
    /// [`Error::ReadOnly`]. The current value is clamped into the new
    /// range.
    pub fn set_float_range(&mut self, id: NodeId, slot: i32, min: f32, max: f32) -> Result<()> {
        let property = self.writable_property(id, slot)?;
        if !property.has_dynamic_range() {
            return Err(Error::ReadOnly);
        }
        property.set_float_range(min, max)
    }

    /// `[min, max]` length of an array property; a type mismatch for
    /// anything that is not an int or float array.
    pub fn array_length_range(&self, id: NodeId, slot: i32) -> Result<(usize, usize)> {
        self.property(id, slot)?.array_length_range()
    }

    /// A float property's default.
    pub fn float_default(&self, id: NodeId, slot: i32) -> Result<f32> {
        self.property(id, slot)?.float_default()
    }

    /// An int property's default.
    pub fn int_default(&self, id: NodeId, slot: i32) -> Result<i32> {
        self.property(id, slot)?.int_default()
    }

    /// Restores a property to its default and clears its automation.
    pub fn reset_property(&mut self, id: NodeId, slot: i32) -> Result<()> {
        self.writable_property(id, slot)?.reset();
        Ok(())
    }

    /// Schedules an automation point `seconds` from the current block at
    /// `value`.
    pub fn schedule_float(&mut self, id: NodeId, slot: i32, seconds: f64, value: f32) -> Result<()> {
        let now = self.tick_count * self.block_size as u64;
        let time = now + (seconds * self.sample_rate as f64) as u64;
        self.writable_property(id, slot)?.schedule(now, time, value)
    }

    /// Removes automation points scheduled after the current block.
    pub fn cancel_automation(&mut self, id: NodeId, slot: i32) -> Result<()> {
        let now = self.tick_count * self.block_size as u64;
        self.writable_property(id, slot)?.cancel_automation(now);
        Ok(())
    }

    // --- Events ---

    /// Installs (or clears) an event handler.
    pub fn set_event_handler(
        &mut self,
        id: NodeId,
        slot: i32,
        handler: Option<crate::BoxedEventHandler>,
    ) -> Result<()> {
        let node = self.node_mut(id)?;
        let event = node.events.get_mut(&slot).ok_or(Error::Range)?;
        event.handler = handler;
        Ok(())
    }

    /// Whether an event slot has a handler installed.
    pub fn event_has_handler(&self, id: NodeId, slot: i32) -> Result<bool> {
        let node = self.node_ref(id)?;
        node.events
            .get(&slot)
            .map(|e| e.has_handler())
            .ok_or(Error::Range)
    }

    // --- The tick ---

    /// Produces one block of the final mix, interleaved.
    ///
    /// `out` must hold exactly `block_size * channels` samples. The tick
    /// counter advances exactly once, then every node reachable from the
    /// final connection processes exactly once, in dependency order.
    pub fn tick(&mut self, out: &mut [f32]) -> Result<()> {
        if out.len() != self.block_size * self.channels {
            return Err(Error::Range);
        }
        self.tick_count += 1;

        for buffer in &mut self.final_buffers {
            buffer.fill(0.0);
        }

        let order = self.schedule_order();
        for id in order {
            self.tick_node(id);
        }

        // Mix the final producers, speaker-style, into the output frame.
        // Field-precise borrows: the producers live in `nodes`, the mix
        // target in `final_buffers`.
        let sources = self.final_connection.sources.clone();
        for source in sources {
            let Some(producer) = self
                .nodes
                .get(source.node.0 as usize)
                .and_then(|n| n.as_ref())
            else {
                continue;
            };
            let Some(oc) = producer.output_connections.get(source.output) else {
                continue;
            };
            let src_refs: Vec<&[f32]> = (oc.start..oc.start + oc.channels)
                .filter_map(|c| producer.output_buffers.get(c).map(|b| b.as_slice()))
                .collect();
            let mut dst_refs: Vec<&mut [f32]> = self
                .final_buffers
                .iter_mut()
                .map(|b| b.as_mut_slice())
                .collect();
            accumulate_channels(&src_refs, &mut dst_refs, true);
        }
        for (i, frame) in out.chunks_mut(self.channels).enumerate() {
            for (c, sample) in frame.iter_mut().enumerate() {
                *sample = self.final_buffers[c][i];
            }
        }

        self.dispatch_events();
        Ok(())
    }

    // --- Internal helpers ---

    fn node_ref(&self, id: NodeId) -> Result<&NodeData> {
        self.nodes
            .get(id.0 as usize)
            .and_then(|n| n.as_ref())
            .ok_or(Error::NodeNotFound(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut NodeData> {
        self.nodes
            .get_mut(id.0 as usize)
            .and_then(|n| n.as_mut())
            .ok_or(Error::NodeNotFound(id))
    }

    fn node_opt(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0 as usize).and_then(|n| n.as_ref())
    }

    /// Resolves a property lookup through any forwarding chain.
    fn resolve_forward(&self, mut id: NodeId, mut slot: i32) -> Result<(NodeId, i32)> {
        for _ in 0..MAX_FORWARD_HOPS {
            let node = match self.node_ref(id) {
                Ok(node) => node,
                // A forward whose target died is an internal-invariant
                // error, not a missing node.
                Err(_) => return Err(Error::Internal),
            };
            match node.forwarded_properties.get(&slot) {
                Some(&(target, target_slot)) => {
                    id = target;
                    slot = target_slot;
                }
                None => return Ok((id, slot)),
            }
        }
        Err(Error::Internal)
    }

    fn property(&self, id: NodeId, slot: i32) -> Result<&Property> {
        // An invalid handle on the first hop is the caller's error.
        self.node_ref(id)?;
        let (id, slot) = self.resolve_forward(id, slot)?;
        self.node_ref(id)?.properties.get(slot)
    }

    fn writable_property(&mut self, id: NodeId, slot: i32) -> Result<&mut Property> {
        self.node_ref(id)?;
        let (id, slot) = self.resolve_forward(id, slot)?;
        let property = self.node_mut(id)?.properties.get_mut(slot)?;
        if property.is_read_only() {
            return Err(Error::ReadOnly);
        }
        Ok(property)
    }

    /// Follows subgraph input links to the node that actually owns the
    /// input connections.
    fn resolve_subgraph_input(&self, mut id: NodeId) -> Result<NodeId> {
        for _ in 0..MAX_FORWARD_HOPS {
            match self.node_ref(id)?.subgraph {
                Some(links) => id = links.input_node,
                None => return Ok(id),
            }
        }
        Err(Error::Internal)
    }

    /// Would an edge `from → to` close a cycle?
    ///
    /// True iff `to` is `from` itself or already among `from`'s transitive
    /// dependencies. DFS over IDs; property edges participate.
    fn creates_cycle(&self, from: NodeId, to: NodeId) -> Result<bool> {
        if from == to {
            return Ok(true);
        }
        self.reaches(from, to)
    }

    /// DFS over dependencies: can `start` reach `goal` walking toward
    /// producers?
    fn reaches(&self, start: NodeId, goal: NodeId) -> Result<bool> {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            if current == goal {
                return Ok(true);
            }
            let idx = current.0 as usize;
            if idx >= visited.len() || visited[idx] {
                continue;
            }
            visited[idx] = true;
            if self.node_opt(current).is_some() {
                for dep in self.dependencies(current)? {
                    stack.push(dep);
                }
            }
        }
        Ok(false)
    }

    /// Dependency-ordered list of every node reachable from the final
    /// connection. Each node appears exactly once, producers before
    /// consumers.
    fn schedule_order(&self) -> Vec<NodeId> {
        let mut visited = vec![false; self.nodes.len()];
        let mut order = Vec::new();
        for source in &self.final_connection.sources {
            self.visit(source.node, &mut visited, &mut order);
        }
        order
    }

    fn visit(&self, id: NodeId, visited: &mut [bool], order: &mut Vec<NodeId>) {
        let idx = id.0 as usize;
        if idx >= visited.len() || visited[idx] {
            return;
        }
        visited[idx] = true;
        let Some(node) = self.node_opt(id) else {
            return;
        };
        // A paused node short-circuits before pulling its producers, so
        // they are scheduled only if another consumer reaches them.
        if node.current_state() != NodeState::Paused {
            if let Ok(deps) = self.dependencies(id) {
                for dep in deps {
                    self.visit(dep, visited, order);
                }
            }
        }
        order.push(id);
    }

    /// Runs one node's tick: dedup, output zeroing, pause short-circuit,
    /// property advance, fan-in, `process`, gain/bias.
    fn tick_node(&mut self, id: NodeId) {
        let idx = id.0 as usize;
        let Some(mut node) = self.nodes.get_mut(idx).and_then(Option::take) else {
            return;
        };
        if node.last_processed_tick == self.tick_count {
            self.nodes[idx] = Some(node);
            return;
        }
        node.last_processed_tick = self.tick_count;

        // Unconditional: a paused or silent node must still produce
        // silence for its consumers.
        for buffer in &mut node.output_buffers {
            buffer.fill(0.0);
        }
        if node.current_state() == NodeState::Paused {
            self.nodes[idx] = Some(node);
            return;
        }

        let block_start = (self.tick_count - 1) * self.block_size as u64;
        node.properties.tick(block_start, self.block_size);
        node.processor.will_process_parents(&mut node.properties);

        if let Some(links) = node.subgraph {
            // The subgraph's outputs are the inner output node's buffers
            // with our own gain/bias applied on top, leaving internal
            // volumes free.
            if let Some(inner) = self.node_opt(links.output_node) {
                for (dst, src) in node
                    .output_buffers
                    .iter_mut()
                    .zip(inner.output_buffers.iter())
                {
                    dst.copy_from_slice(src);
                }
            }
            node.apply_gain_bias(self.block_size);
            self.nodes[idx] = Some(node);
            return;
        }

        for buffer in &mut node.input_buffers {
            buffer.fill(0.0);
        }

        // A-rate property modulation: each property edge consumes the
        // first channel of the producer's output connection.
        for (slot, source) in node.property_inputs.clone() {
            let Some(producer) = self.node_opt(source.node) else {
                continue;
            };
            let Some(oc) = producer.output_connections.get(source.output) else {
                continue;
            };
            let Some(buffer) = producer.output_buffers.get(oc.start) else {
                continue;
            };
            if let Ok(property) = node.properties.get_mut(slot) {
                property.add_modulation(buffer);
            }
        }

        // Audio fan-in, channel-mixed when this node speaks "speakers".
        let mix = node.channel_interpretation() == ChannelInterpretation::Speakers;
        for ic_index in 0..node.input_connections.len() {
            let (start, channels, sources) = {
                let ic = &node.input_connections[ic_index];
                (ic.start, ic.channels, ic.sources.clone())
            };
            for source in sources {
                let Some(producer) = self.node_opt(source.node) else {
                    continue;
                };
                let Some(oc) = producer.output_connections.get(source.output) else {
                    continue;
                };
                let src_refs: Vec<&[f32]> = (oc.start..oc.start + oc.channels)
                    .filter_map(|c| producer.output_buffers.get(c).map(|b| b.as_slice()))
                    .collect();
                let end = (start + channels).min(node.input_buffers.len());
                let mut dst_refs: Vec<&mut [f32]> = node.input_buffers[start..end]
                    .iter_mut()
                    .map(|b| b.as_mut_slice())
                    .collect();
                accumulate_channels(&src_refs, &mut dst_refs, mix);
            }
        }

        node.is_processing = true;
        node.processor.process(ProcessContext {
            inputs: &node.input_buffers,
            outputs: &mut node.output_buffers,
            properties: &mut node.properties,
            fired_events: &mut node.pending_events,
            sample_rate: self.sample_rate,
            block_size: self.block_size,
        });
        node.is_processing = false;

        node.apply_gain_bias(self.block_size);
        self.nodes[idx] = Some(node);
    }

    /// Calls handlers for events fired during the tick, outside `process`.
    fn dispatch_events(&mut self) {
        let mut fired: Vec<(NodeId, i32)> = Vec::new();
        for node in self.nodes.iter_mut().flatten() {
            for slot in node.pending_events.drain(..) {
                fired.push((node.id, slot));
            }
        }
        for (id, slot) in fired {
            let handler = self
                .node_mut(id)
                .ok()
                .and_then(|n| n.events.get_mut(&slot))
                .and_then(|e| e.handler.take());
            if let Some(mut handler) = handler {
                handler(id);
                if let Ok(node) = self.node_mut(id) {
                    if let Some(event) = node.events.get_mut(&slot) {
                        event.handler = Some(handler);
                    }
                }
            }
        }
    }

    /// Removes a released node once nothing consumes it.
    fn collect_if_released(&mut self, id: NodeId) {
        let Ok(node) = self.node_ref(id) else { return };
        if node.released
            && node
                .output_connections
                .iter()
                .all(|oc| oc.targets.is_empty())
        {
            let _ = self.remove_node(id);
        }
    }

    /// Unconditionally removes a node, clearing every edge touching it.
    fn remove_node(&mut self, id: NodeId) -> Result<()> {
        // Clear the flag so the disconnects below cannot re-enter the
        // collection path for this node.
        self.node_mut(id)?.released = false;
        // Outgoing edges.
        let outputs = self.node_ref(id)?.output_connections.len();
        for output in 0..outputs {
            self.disconnect(id, output)?;
        }
        // Incoming audio edges: clear the producers' reciprocal targets.
        let incoming: Vec<OutputRef> = self
            .node_ref(id)?
            .input_connections
            .iter()
            .flat_map(|ic| ic.sources.iter().copied())
            .collect();
        for source in incoming {
            if let Ok(producer) = self.node_mut(source.node) {
                if let Some(oc) = producer.output_connections.get_mut(source.output) {
                    oc.targets
                        .retain(|t| !matches!(t, Target::Input { node, .. } if *node == id));
                }
            }
            self.collect_if_released(source.node);
        }
        // Incoming property edges.
        let modulators: Vec<OutputRef> = self
            .node_ref(id)?
            .property_inputs
            .iter()
            .map(|(_, src)| *src)
            .collect();
        for source in modulators {
            if let Ok(producer) = self.node_mut(source.node) {
                if let Some(oc) = producer.output_connections.get_mut(source.output) {
                    oc.targets
                        .retain(|t| !matches!(t, Target::Property { node, .. } if *node == id));
                }
            }
            self.collect_if_released(source.node);
        }
        self.nodes[id.0 as usize] = None;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NullProcessor;

    /// Counts `process` invocations and copies input to output.
    struct Passthrough {
        processed: u64,
    }

    impl Processor for Passthrough {
        fn process(&mut self, ctx: ProcessContext<'_>) {
            self.processed += 1;
            for (out, inp) in ctx.outputs.iter_mut().zip(ctx.inputs.iter()) {
                out.copy_from_slice(inp);
            }
        }

        fn as_any_mut(&mut self) -> &mut dyn core::any::Any {
            self
        }
    }

    /// Emits a constant value on every output sample.
    struct Constant {
        value: f32,
    }

    impl Processor for Constant {
        fn process(&mut self, ctx: ProcessContext<'_>) {
            for out in ctx.outputs.iter_mut() {
                out.fill(self.value);
            }
        }

        fn as_any_mut(&mut self) -> &mut dyn core::any::Any {
            self
        }
    }

    fn constant(server: &mut Server, value: f32) -> NodeId {
        server.add_node(
            NodeBuilder::new("constant", Box::new(Constant { value }))
                .buffers(0, 1)
                .output(0, 1),
        )
    }

    fn passthrough(server: &mut Server, channels: usize) -> NodeId {
        server.add_node(
            NodeBuilder::new("passthrough", Box::new(Passthrough { processed: 0 }))
                .buffers(channels, channels)
                .input(0, channels)
                .output(0, channels),
        )
    }

    fn tick(server: &mut Server) -> Vec<f32> {
        let mut out = vec![0.0; server.block_size() * server.channels()];
        server.tick(&mut out).unwrap();
        out
    }

    #[test]
    fn constant_reaches_final_mix() {
        let mut server = Server::new(48000, 64);
        let node = constant(&mut server, 0.25);
        server.connect_to_server(node, 0).unwrap();
        let out = tick(&mut server);
        // Mono source into the stereo mix: both channels carry it.
        assert!(out.iter().all(|&s| s == 0.25));
    }

    #[test]
    fn unconnected_nodes_do_not_run() {
        let mut server = Server::new(48000, 64);
        let heard = constant(&mut server, 1.0);
        let ignored = passthrough(&mut server, 1);
        server.connect_to_server(heard, 0).unwrap();
        tick(&mut server);
        let p: &mut Passthrough = server.processor_mut(ignored).unwrap();
        assert_eq!(p.processed, 0);
    }

    #[test]
    fn diamond_processes_shared_ancestor_once() {
        // src → a, src → b, a+b → sink. src must process exactly once.
        let mut server = Server::new(48000, 32);
        let src = passthrough(&mut server, 1);
        let a = passthrough(&mut server, 1);
        let b = passthrough(&mut server, 1);
        let sink = passthrough(&mut server, 1);
        server.connect(src, 0, a, 0).unwrap();
        server.connect(src, 0, b, 0).unwrap();
        server.connect(a, 0, sink, 0).unwrap();
        server.connect(b, 0, sink, 0).unwrap();
        server.connect_to_server(sink, 0).unwrap();
        tick(&mut server);
        let p: &mut Passthrough = server.processor_mut(src).unwrap();
        assert_eq!(p.processed, 1);
    }

    #[test]
    fn cycle_is_rejected_and_graph_unchanged() {
        let mut server = Server::new(48000, 32);
        let a = passthrough(&mut server, 1);
        let b = passthrough(&mut server, 1);
        let c = passthrough(&mut server, 1);
        server.connect(a, 0, b, 0).unwrap();
        server.connect(b, 0, c, 0).unwrap();
        assert_eq!(server.connect(c, 0, a, 0), Err(Error::CausesCycle));
        assert_eq!(server.connect(a, 0, a, 0), Err(Error::CausesCycle));
        // The failed connect left no half-installed edge behind.
        assert!(server
            .dependencies(a)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn fan_in_sums_producers() {
        let mut server = Server::new(48000, 16);
        let x = constant(&mut server, 0.25);
        let y = constant(&mut server, 0.5);
        let sink = passthrough(&mut server, 1);
        server.connect(x, 0, sink, 0).unwrap();
        server.connect(y, 0, sink, 0).unwrap();
        server.connect_to_server(sink, 0).unwrap();
        let out = tick(&mut server);
        assert!(out.iter().all(|&s| (s - 0.75).abs() < 1e-6));
    }

    #[test]
    fn paused_node_emits_silence_without_processing() {
        let mut server = Server::new(48000, 16);
        let node = constant(&mut server, 1.0);
        server.connect_to_server(node, 0).unwrap();
        server.set_state(node, NodeState::Paused).unwrap();
        let out = tick(&mut server);
        assert!(out.iter().all(|&s| s == 0.0));
        server.set_state(node, NodeState::Playing).unwrap();
        let out = tick(&mut server);
        assert!(out.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn gain_and_bias_apply_after_process() {
        let mut server = Server::new(48000, 16);
        let node = constant(&mut server, 0.5);
        server.connect_to_server(node, 0).unwrap();
        server.set_float(node, standard_slots::MUL, 3.0).unwrap();
        server.set_float(node, standard_slots::ADD, 0.25).unwrap();
        let out = tick(&mut server);
        assert!(out.iter().all(|&s| (s - 1.75).abs() < 1e-6));
    }

    #[test]
    fn a_rate_mul_applies_per_sample() {
        let mut server = Server::new(48000, 16);
        let node = constant(&mut server, 1.0);
        server.connect_to_server(node, 0).unwrap();
        // Ramp mul from 1 to 0 over exactly one block.
        server
            .schedule_float(node, standard_slots::MUL, 16.0 / 48000.0, 0.0)
            .unwrap();
        let out = tick(&mut server);
        // Channel 0 of the interleaved stereo frame.
        let first = out[0];
        let mid = out[8 * 2];
        let last = out[15 * 2];
        assert!((first - 1.0).abs() < 1e-6);
        assert!((mid - 0.5).abs() < 0.05);
        assert!(last < 0.1);
    }

    #[test]
    fn property_connection_modulates_consumer() {
        let mut server = Server::new(48000, 16);
        let modulator = constant(&mut server, 0.5);
        let carrier = constant(&mut server, 1.0);
        server.connect_to_server(carrier, 0).unwrap();
        server
            .connect_property(modulator, 0, carrier, standard_slots::ADD)
            .unwrap();
        let out = tick(&mut server);
        // add = 0 (base) + 0.5 (modulation); output = 1.0 + 0.5.
        assert!(out.iter().all(|&s| (s - 1.5).abs() < 1e-6));
    }

    #[test]
    fn property_connection_rejects_non_numeric() {
        let mut server = Server::new(48000, 16);
        let modulator = constant(&mut server, 0.5);
        let target = server.add_node(
            NodeBuilder::new("stringy", Box::new(NullProcessor))
                .buffers(0, 1)
                .output(0, 1)
                .property(0, Property::string("label", "")),
        );
        assert_eq!(
            server.connect_property(modulator, 0, target, 0),
            Err(Error::CannotConnectToProperty)
        );
        assert_eq!(
            server.connect_property(modulator, 0, target, standard_slots::STATE),
            Err(Error::CannotConnectToProperty)
        );
    }

    #[test]
    fn property_cycle_is_rejected() {
        let mut server = Server::new(48000, 16);
        let a = passthrough(&mut server, 1);
        let b = passthrough(&mut server, 1);
        server.connect(a, 0, b, 0).unwrap();
        assert_eq!(
            server.connect_property(b, 0, a, standard_slots::MUL),
            Err(Error::CausesCycle)
        );
    }

    #[test]
    fn reconnect_is_idempotent() {
        let mut server = Server::new(48000, 16);
        let x = constant(&mut server, 0.5);
        let sink = passthrough(&mut server, 1);
        server.connect(x, 0, sink, 0).unwrap();
        server.connect(x, 0, sink, 0).unwrap();
        server.connect_to_server(sink, 0).unwrap();
        let out = tick(&mut server);
        // A doubled edge would have summed to 1.0.
        assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn disconnect_silences_the_edge() {
        let mut server = Server::new(48000, 16);
        let node = constant(&mut server, 1.0);
        server.connect_to_server(node, 0).unwrap();
        tick(&mut server);
        server.disconnect(node, 0).unwrap();
        let out = tick(&mut server);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn released_node_lives_while_consumed() {
        let mut server = Server::new(48000, 16);
        let src = constant(&mut server, 0.5);
        let sink = passthrough(&mut server, 1);
        server.connect(src, 0, sink, 0).unwrap();
        server.connect_to_server(sink, 0).unwrap();
        server.release(src).unwrap();
        // Still audible: the sink consumes it.
        let out = tick(&mut server);
        assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6));
        assert_eq!(server.node_count(), 2);
        // Dropping the edge collects the node.
        server.disconnect(src, 0).unwrap();
        assert_eq!(server.node_count(), 1);
        assert_eq!(server.get_float(src, standard_slots::MUL), Err(Error::NodeNotFound(src)));
    }

    #[test]
    fn release_without_consumers_removes_immediately() {
        let mut server = Server::new(48000, 16);
        let node = constant(&mut server, 0.5);
        server.release(node).unwrap();
        assert_eq!(server.node_count(), 0);
    }

    #[test]
    fn forwarded_property_redirects_both_ways() {
        let mut server = Server::new(48000, 16);
        let facade = passthrough(&mut server, 1);
        let inner = constant(&mut server, 1.0);
        server
            .forward_property(facade, 100, inner, standard_slots::MUL)
            .unwrap();
        server.set_float(facade, 100, 0.25).unwrap();
        assert_eq!(server.get_float(inner, standard_slots::MUL).unwrap(), 0.25);
        assert_eq!(server.get_float(facade, 100).unwrap(), 0.25);
        assert_eq!(server.property_name(facade, 100).unwrap(), "mul");
    }

    #[test]
    fn broken_forward_is_internal_error() {
        let mut server = Server::new(48000, 16);
        let facade = passthrough(&mut server, 1);
        let inner = constant(&mut server, 1.0);
        server
            .forward_property(facade, 100, inner, standard_slots::MUL)
            .unwrap();
        server.release(inner).unwrap();
        assert_eq!(server.get_float(facade, 100), Err(Error::Internal));
    }

    #[test]
    fn stop_forwarding_missing_is_internal_error() {
        let mut server = Server::new(48000, 16);
        let node = passthrough(&mut server, 1);
        assert_eq!(server.stop_forwarding_property(node, 5), Err(Error::Internal));
    }

    #[test]
    fn read_only_is_enforced_at_the_boundary() {
        let mut server = Server::new(48000, 16);
        let node = server.add_node(
            NodeBuilder::new("fixed", Box::new(NullProcessor))
                .buffers(0, 1)
                .output(0, 1)
                .property(0, Property::float("limit", 1.0, 0.0, 8.0).read_only()),
        );
        assert_eq!(server.set_float(node, 0, 2.0), Err(Error::ReadOnly));
        assert!(server.is_read_only(node, 0).unwrap());
        assert_eq!(server.get_float(node, 0).unwrap(), 1.0);
    }

    #[test]
    fn dynamic_range_is_retunable_through_the_server() {
        let mut server = Server::new(48000, 16);
        let node = server.add_node(
            NodeBuilder::new("filter", Box::new(NullProcessor))
                .buffers(0, 1)
                .output(0, 1)
                .property(
                    0,
                    Property::float("cutoff", 1000.0, 20.0, 20000.0).dynamic_range(),
                )
                .property(1, Property::float("resonance", 0.7, 0.1, 10.0)),
        );
        assert!(server.has_dynamic_range(node, 0).unwrap());
        server.set_float_range(node, 0, 20.0, 500.0).unwrap();
        assert_eq!(server.float_range(node, 0).unwrap(), (20.0, 500.0));
        // The old value lay above the new maximum and was clamped in.
        assert_eq!(server.get_float(node, 0).unwrap(), 500.0);
        assert_eq!(server.set_float(node, 0, 600.0), Err(Error::Range));

        // Fixed-range properties cannot be retuned from outside.
        assert!(!server.has_dynamic_range(node, 1).unwrap());
        assert_eq!(
            server.set_float_range(node, 1, 0.0, 1.0),
            Err(Error::ReadOnly)
        );
        assert_eq!(server.float_range(node, 1).unwrap(), (0.1, 10.0));
    }

    #[test]
    fn tick_count_is_monotonic() {
        let mut server = Server::new(48000, 16);
        assert_eq!(server.tick_count(), 0);
        tick(&mut server);
        tick(&mut server);
        assert_eq!(server.tick_count(), 2);
    }

    #[test]
    fn wrong_output_length_is_range_error() {
        let mut server = Server::new(48000, 16);
        let mut short = vec![0.0; 8];
        assert_eq!(server.tick(&mut short), Err(Error::Range));
    }

    #[test]
    fn subgraph_presents_inner_output_with_own_gain() {
        let mut server = Server::new(48000, 16);
        let inner = constant(&mut server, 0.5);
        let facade = server.add_node(NodeBuilder::new("subgraph", Box::new(NullProcessor)));
        server.set_subgraph(facade, inner, inner).unwrap();
        server.set_float(facade, standard_slots::MUL, 2.0).unwrap();
        server.connect_to_server(facade, 0).unwrap();
        let out = tick(&mut server);
        assert!(out.iter().all(|&s| (s - 1.0).abs() < 1e-6));
        // The inner node's own gain stayed untouched.
        assert_eq!(server.get_float(inner, standard_slots::MUL).unwrap(), 1.0);
    }

    #[test]
    fn connecting_to_subgraph_lands_on_inner_input() {
        let mut server = Server::new(48000, 16);
        let src = constant(&mut server, 0.25);
        let inner = passthrough(&mut server, 1);
        let facade = server.add_node(NodeBuilder::new("subgraph", Box::new(NullProcessor)));
        server.set_subgraph(facade, inner, inner).unwrap();
        server.connect(src, 0, facade, 0).unwrap();
        server.connect_to_server(facade, 0).unwrap();
        let out = tick(&mut server);
        assert!(out.iter().all(|&s| (s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn events_fire_after_the_tick() {
        use core::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        struct Firing;
        impl Processor for Firing {
            fn process(&mut self, ctx: ProcessContext<'_>) {
                ctx.fired_events.push(0);
            }
            fn as_any_mut(&mut self) -> &mut dyn core::any::Any {
                self
            }
        }

        let mut server = Server::new(48000, 16);
        let node = server.add_node(
            NodeBuilder::new("firing", Box::new(Firing))
                .buffers(0, 1)
                .output(0, 1)
                .event(0),
        );
        server.connect_to_server(node, 0).unwrap();

        let count = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&count);
        server
            .set_event_handler(
                node,
                0,
                Some(Box::new(move |_| {
                    seen.fetch_add(1, Ordering::SeqCst);
                })),
            )
            .unwrap();
        assert!(server.event_has_handler(node, 0).unwrap());

        tick(&mut server);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        tick(&mut server);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn processor_downcast_requires_matching_type() {
        let mut server = Server::new(48000, 16);
        let node = constant(&mut server, 1.0);
        assert!(server.processor_mut::<Constant>(node).is_ok());
        assert_eq!(
            server.processor_mut::<Passthrough>(node).err(),
            Some(Error::TypeMismatch)
        );
    }
}
