//! Sine oscillator node.

#[cfg(not(feature = "std"))]
use alloc::boxed::Box;

use resona_core::{
    NodeBuilder, NodeId, ProcessContext, Processor, PropertyDescriptor, PropertyKind, Server,
    SinOsc,
};

/// Property slots of the sine node.
pub mod slots {
    /// Oscillator frequency in Hz. A-rate capable.
    pub const FREQUENCY: i32 = 0;
    /// Multiplier applied to the frequency, for cheap FM-style stacking.
    /// A-rate capable.
    pub const FREQUENCY_MULTIPLIER: i32 = 1;
    /// Phase offset in cycles. Setting it advances the oscillator by the
    /// written amount.
    pub const PHASE: i32 = 2;
}

/// Static property table of the sine node.
pub const PROPERTIES: &[PropertyDescriptor] = &[
    PropertyDescriptor {
        slot: slots::FREQUENCY,
        name: "frequency",
        kind: PropertyKind::Float {
            default: 440.0,
            min: 0.0,
            max: f32::INFINITY,
            clamps: false,
        },
        read_only: false,
    },
    PropertyDescriptor {
        slot: slots::FREQUENCY_MULTIPLIER,
        name: "frequency_multiplier",
        kind: PropertyKind::Float {
            default: 1.0,
            min: f32::NEG_INFINITY,
            max: f32::INFINITY,
            clamps: false,
        },
        read_only: false,
    },
    PropertyDescriptor {
        slot: slots::PHASE,
        name: "phase",
        kind: PropertyKind::Float {
            default: 0.0,
            min: 0.0,
            max: 1.0,
            clamps: true,
        },
        read_only: false,
    },
];

/// A single-channel sine source.
///
/// Frequency and frequency multiplier are honored per sample when either
/// carries automation or modulation; otherwise the block runs at one
/// frequency.
pub struct SineNode {
    oscillator: SinOsc,
}

impl SineNode {
    /// Creates a sine node on `server` and returns its ID.
    pub fn create(server: &mut Server) -> NodeId {
        let oscillator = SinOsc::new(server.sample_rate() as f64);
        server.add_node(
            NodeBuilder::new("sine", Box::new(Self { oscillator }))
                .buffers(0, 1)
                .output(0, 1)
                .properties(PROPERTIES),
        )
    }
}

impl Processor for SineNode {
    fn process(&mut self, ctx: ProcessContext<'_>) {
        let properties = ctx.properties;
        if let Ok(phase) = properties.get(slots::PHASE) {
            if phase.was_modified() {
                let offset = phase.get_float().unwrap_or(0.0) as f64;
                self.oscillator.set_phase(self.oscillator.phase() + offset);
            }
        }
        let Ok(frequency) = properties.get(slots::FREQUENCY) else {
            return;
        };
        let Ok(multiplier) = properties.get(slots::FREQUENCY_MULTIPLIER) else {
            return;
        };
        let output = &mut ctx.outputs[0];
        if frequency.needs_a_rate() || multiplier.needs_a_rate() {
            for (i, sample) in output.iter_mut().enumerate() {
                let f = frequency.get_float_at(i).unwrap_or(0.0)
                    * multiplier.get_float_at(i).unwrap_or(1.0);
                self.oscillator.set_frequency(f as f64);
                *sample = self.oscillator.tick() as f32;
            }
        } else {
            let f = frequency.get_float().unwrap_or(0.0) * multiplier.get_float().unwrap_or(1.0);
            self.oscillator.set_frequency(f as f64);
            for sample in output.iter_mut() {
                *sample = self.oscillator.tick() as f32;
            }
        }
        self.oscillator.normalize();
    }

    fn reset(&mut self, properties: &resona_core::PropertySet) {
        self.oscillator.reset();
        let phase = properties
            .get(slots::PHASE)
            .and_then(|p| p.get_float())
            .unwrap_or(0.0);
        self.oscillator.set_phase(phase as f64);
    }

    fn as_any_mut(&mut self) -> &mut dyn core::any::Any {
        self
    }
}
