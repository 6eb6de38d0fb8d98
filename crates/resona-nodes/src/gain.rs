//! N-channel passthrough node.
//!
//! Carries no properties of its own: attenuation, bias, and automation all
//! come from the standard `mul`/`add` slots every node has, so this is the
//! graph's attenuator, summing point, and utility insert.

#[cfg(not(feature = "std"))]
use alloc::boxed::Box;

use resona_core::{NodeBuilder, NodeId, ProcessContext, Processor, Server};

/// Copies its inputs to its outputs; gain/bias applied by the node base.
pub struct GainNode;

impl GainNode {
    /// Creates a gain node with `channels` channels.
    pub fn create(server: &mut Server, channels: usize) -> NodeId {
        server.add_node(
            NodeBuilder::new("gain", Box::new(Self))
                .buffers(channels, channels)
                .input(0, channels)
                .output(0, channels),
        )
    }
}

impl Processor for GainNode {
    fn process(&mut self, ctx: ProcessContext<'_>) {
        for (output, input) in ctx.outputs.iter_mut().zip(ctx.inputs.iter()) {
            output.copy_from_slice(input);
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn core::any::Any {
        self
    }
}
