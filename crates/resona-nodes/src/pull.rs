//! External-source node: pulls interleaved audio from a client callback.

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, vec, vec::Vec};

use resona_core::{
    NodeBuilder, NodeId, ProcessContext, Processor, PropertySet, Result, Server, StreamResampler,
};

/// Client audio callback: fills an interleaved buffer of
/// `block_size * channels` samples at the node's input sample rate.
///
/// Invoked inline on the ticking thread; it must not block.
pub type PullCallback = Box<dyn FnMut(&mut [f32]) + Send>;

/// Presents a client callback as a source node.
///
/// The callback produces interleaved frames at `input_sr`; an internal
/// linear resampler converts to the server rate and a single pass
/// de-interleaves into the output buffers. Without a callback the node
/// emits silence.
pub struct PullNode {
    channels: usize,
    input_sr: u32,
    server_sr: u32,
    resampler: StreamResampler,
    /// Staging buffer handed to the callback, interleaved at `input_sr`.
    incoming: Vec<f32>,
    /// Resampled interleaved frames at the server rate.
    resampled: Vec<f32>,
    callback: Option<PullCallback>,
}

impl PullNode {
    /// Creates a pull node producing `channels` channels from client audio
    /// at `input_sr`.
    pub fn create(server: &mut Server, input_sr: u32, channels: usize) -> NodeId {
        let block_size = server.block_size();
        let server_sr = server.sample_rate();
        let node = Self {
            channels,
            input_sr,
            server_sr,
            resampler: StreamResampler::new(channels, input_sr, server_sr),
            incoming: vec![0.0; block_size * channels],
            resampled: vec![0.0; block_size * channels],
            callback: None,
        };
        server.add_node(
            NodeBuilder::new("pull", Box::new(node))
                .buffers(0, channels)
                .output(0, channels),
        )
    }

    /// Installs (or clears) the audio callback on an existing pull node.
    pub fn set_callback(
        server: &mut Server,
        id: NodeId,
        callback: Option<PullCallback>,
    ) -> Result<()> {
        server.processor_mut::<PullNode>(id)?.callback = callback;
        Ok(())
    }
}

impl Processor for PullNode {
    fn process(&mut self, ctx: ProcessContext<'_>) {
        let block_size = ctx.block_size;
        let channels = self.channels;

        // Keep asking the client for input-rate blocks until the
        // resampler can cover this output block.
        let mut filled = 0;
        while filled < block_size {
            filled += self
                .resampler
                .produce(&mut self.resampled[filled * channels..block_size * channels]);
            if filled >= block_size {
                break;
            }
            match self.callback.as_mut() {
                Some(callback) => callback(&mut self.incoming),
                None => self.incoming.fill(0.0),
            }
            self.resampler.feed(&self.incoming);
        }

        // De-interleave in one pass.
        for i in 0..block_size {
            for c in 0..channels {
                ctx.outputs[c][i] = self.resampled[i * channels + c];
            }
        }
    }

    fn reset(&mut self, _properties: &PropertySet) {
        self.resampler = StreamResampler::new(self.channels, self.input_sr, self.server_sr);
        self.incoming.fill(0.0);
        self.resampled.fill(0.0);
    }

    fn as_any_mut(&mut self) -> &mut dyn core::any::Any {
        self
    }
}
