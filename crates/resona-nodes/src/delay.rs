//! Crossfading interpolated delay node with feedback.

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, vec::Vec};

use resona_core::{
    CrossfadedDelayLine, NodeBuilder, NodeId, ProcessContext, Processor, Property, PropertySet,
    Server,
};

/// Property slots of the delay node.
pub mod slots {
    /// Delay time in seconds, `[0, delay_max]`.
    pub const DELAY: i32 = 0;
    /// Feedback amount, `[0, 1]`.
    pub const FEEDBACK: i32 = 1;
    /// Seconds a delay change takes to crossfade to the new tap.
    pub const INTERPOLATION_TIME: i32 = 2;
    /// The line capacity in seconds. Read-only, fixed at creation.
    pub const DELAY_MAX: i32 = 3;
}

/// Per-channel delay line with crossfaded delay changes and feedback.
pub struct DelayNode {
    lines: Vec<CrossfadedDelayLine>,
    sample_rate: f32,
}

impl DelayNode {
    /// Creates a delay node holding up to `max_delay` seconds on each of
    /// `channels` channels.
    pub fn create(server: &mut Server, max_delay: f32, channels: usize) -> NodeId {
        let sample_rate = server.sample_rate() as f32;
        let lines = (0..channels)
            .map(|_| CrossfadedDelayLine::new(max_delay, sample_rate))
            .collect();
        server.add_node(
            NodeBuilder::new(
                "delay",
                Box::new(Self {
                    lines,
                    sample_rate,
                }),
            )
            .buffers(channels, channels)
            .input(0, channels)
            .output(0, channels)
            .property(
                slots::DELAY,
                Property::float("delay", 0.001, 0.0, max_delay).dynamic_range(),
            )
            .property(slots::FEEDBACK, Property::float("feedback", 0.0, 0.0, 1.0))
            .property(
                slots::INTERPOLATION_TIME,
                Property::float("interpolation_time", 0.001, 0.001, f32::INFINITY).clamping(),
            )
            .property(
                slots::DELAY_MAX,
                Property::float("delay_max", max_delay, max_delay, max_delay).read_only(),
            ),
        )
    }

    fn reconfigure(&mut self, properties: &PropertySet) {
        let delay = properties
            .get(slots::DELAY)
            .and_then(|p| p.get_float())
            .unwrap_or(0.0);
        let interpolation_time = properties
            .get(slots::INTERPOLATION_TIME)
            .and_then(|p| p.get_float())
            .unwrap_or(0.001)
            .max(1.0 / self.sample_rate);
        let delta = 1.0 / (interpolation_time * self.sample_rate);
        for line in &mut self.lines {
            line.set_interpolation_delta(delta);
            line.set_delay(delay);
        }
    }
}

impl Processor for DelayNode {
    fn process(&mut self, ctx: ProcessContext<'_>) {
        if ctx
            .properties
            .any_modified(&[slots::DELAY, slots::INTERPOLATION_TIME])
        {
            self.reconfigure(ctx.properties);
        }
        let feedback = ctx
            .properties
            .get(slots::FEEDBACK)
            .and_then(|p| p.get_float())
            .unwrap_or(0.0);

        for (c, line) in self.lines.iter_mut().enumerate() {
            let input = &ctx.inputs[c];
            let output = &mut ctx.outputs[c];
            for i in 0..ctx.block_size {
                let recirculated = line.read();
                line.advance(input[i] + feedback * recirculated);
                output[i] = line.read();
            }
        }
    }

    fn reset(&mut self, properties: &PropertySet) {
        for line in &mut self.lines {
            line.reset();
        }
        self.reconfigure(properties);
    }

    fn as_any_mut(&mut self) -> &mut dyn core::any::Any {
        self
    }
}
