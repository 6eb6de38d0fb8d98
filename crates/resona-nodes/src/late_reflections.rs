//! Late-reflections reverberator.
//!
//! A 16-line feedback delay network with per-line shelving EQ and
//! modulation: the FDN recirculates through a mid high-shelf and a high
//! high-shelf per line (band-splitting the decay into three T60 regions),
//! then optionally through a modulatable allpass biquad. Per-line
//! pan-compensation delays align the first echo across all outputs so the
//! tail stays centered when every channel is fed.
//!
//! Band shaping uses two cascaded high shelves and never a low shelf: the
//! cookbook low-shelf formulas misbehave at low corner frequencies, so the
//! lowest band is shaped by per-line gains baked into the feedback matrix
//! and the upper two bands are carved out above it.

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, vec, vec::Vec};

use libm::{log, pow, round};
use resona_core::math::{
    db_to_scalar, hadamard, multiplication_kernel, scalar_addition_kernel,
    scalar_multiplication_kernel, scalar_to_db,
};
use resona_core::{
    allpass, highshelf, Biquad, CrossfadedDelayLine, FeedbackDelayNetwork, NodeBuilder, NodeId,
    ProcessContext, Processor, Property, PropertySet, Server, SinOsc,
};

/// The FDN order. The coprime table and the output-channel layout assume
/// exactly 16 lines.
const ORDER: usize = 16;

/// Pairwise-coprime integers whose powers approximate the line lengths.
const COPRIMES: [u32; ORDER] = [3, 4, 5, 7, 9, 11, 13, 16, 17, 19, 23, 27, 29, 31, 35, 37];

/// Property slots of the late-reflections node.
pub mod slots {
    /// Mid-band decay time in seconds.
    pub const T60: i32 = 0;
    /// Echo density control, `[0, 1]`. Higher is denser (shorter lines).
    pub const DENSITY: i32 = 1;
    /// High-band decay time in seconds.
    pub const HF_T60: i32 = 2;
    /// Low-band decay time in seconds.
    pub const LF_T60: i32 = 3;
    /// Crossover between mid and high bands, Hz, `[0, sr/2]`.
    pub const HF_REFERENCE: i32 = 4;
    /// Crossover between low and mid bands, Hz, `[0, sr/2]`.
    pub const LF_REFERENCE: i32 = 5;
    /// Output amplitude modulation depth, `[0, 1]`.
    pub const AMPLITUDE_MODULATION_DEPTH: i32 = 6;
    /// Output amplitude modulation frequency in Hz.
    pub const AMPLITUDE_MODULATION_FREQUENCY: i32 = 7;
    /// Delay-line modulation depth, `[0, 1]`.
    pub const DELAY_MODULATION_DEPTH: i32 = 8;
    /// Delay-line modulation frequency in Hz.
    pub const DELAY_MODULATION_FREQUENCY: i32 = 9;
    /// Whether the modulatable allpasses run (int 0/1).
    pub const ALLPASS_ENABLED: i32 = 10;
    /// Lower bound of the allpass frequency sweep, Hz.
    pub const ALLPASS_MINFREQ: i32 = 11;
    /// Upper bound of the allpass frequency sweep, Hz.
    pub const ALLPASS_MAXFREQ: i32 = 12;
    /// Q of the allpass biquads.
    pub const ALLPASS_Q: i32 = 13;
    /// Allpass sweep frequency in Hz.
    pub const ALLPASS_MODULATION_FREQUENCY: i32 = 14;
}

/// Slots whose modification forces a full recompute of delays, gains,
/// shelves, and the feedback matrix.
const RECOMPUTE_SLOTS: [i32; 6] = [
    slots::T60,
    slots::DENSITY,
    slots::HF_T60,
    slots::LF_T60,
    slots::HF_REFERENCE,
    slots::LF_REFERENCE,
];

/// Decay gain for one circulation of a line: the gain that loses 60 dB
/// over `t60` seconds when applied every `line_length` seconds.
fn t60_to_gain(t60: f64, line_length: f64) -> f64 {
    if t60 <= 0.0 {
        return 0.0;
    }
    let db_per_second = -60.0 / t60;
    db_to_scalar(db_per_second * line_length, 1.0)
}

/// 16-channel late reverberation over a feedback delay network.
pub struct LateReflectionsNode {
    fdn: FeedbackDelayNetwork,
    delays: [f32; ORDER],
    gains: [f32; ORDER],
    output_frame: [f32; ORDER],
    next_input_frame: [f32; ORDER],
    fdn_matrix: Vec<f32>,
    /// Shapes mid band → high band, per line.
    highshelves: Vec<Biquad>,
    /// Shapes low band → mid band, per line. A high shelf by design.
    midshelves: Vec<Biquad>,
    allpasses: Vec<Biquad>,
    amplitude_modulators: Vec<SinOsc>,
    delay_modulators: Vec<SinOsc>,
    allpass_modulators: Vec<SinOsc>,
    amplitude_modulation_buffer: Vec<f32>,
    /// Aligns the first echo across outputs.
    pan_reducers: Vec<CrossfadedDelayLine>,
    sample_rate: f32,
    needs_recompute: bool,
}

impl LateReflectionsNode {
    /// Creates a late-reflections node on `server` and returns its ID.
    pub fn create(server: &mut Server) -> NodeId {
        let sr = server.sample_rate() as f32;
        let block_size = server.block_size();
        let nyquist = sr / 2.0;

        let make_modulators = |frequency: f32| -> Vec<SinOsc> {
            (0..ORDER)
                .map(|i| {
                    let mut osc = SinOsc::new(sr as f64);
                    osc.set_frequency(frequency as f64);
                    osc.set_phase(i as f64 / ORDER as f64);
                    osc
                })
                .collect()
        };

        let mut pan_reducers = Vec::with_capacity(ORDER);
        for _ in 0..ORDER {
            let mut line = CrossfadedDelayLine::new(1.0, sr);
            line.set_interpolation_delta(f32::INFINITY);
            pan_reducers.push(line);
        }

        let node = Self {
            fdn: FeedbackDelayNetwork::new(ORDER, 1.0, sr),
            delays: [0.0; ORDER],
            gains: [0.0; ORDER],
            output_frame: [0.0; ORDER],
            next_input_frame: [0.0; ORDER],
            fdn_matrix: vec![0.0; ORDER * ORDER],
            highshelves: (0..ORDER).map(|_| Biquad::new()).collect(),
            midshelves: (0..ORDER).map(|_| Biquad::new()).collect(),
            allpasses: (0..ORDER).map(|_| Biquad::new()).collect(),
            amplitude_modulators: make_modulators(10.0),
            delay_modulators: make_modulators(10.0),
            allpass_modulators: make_modulators(10.0),
            amplitude_modulation_buffer: vec![0.0; block_size],
            pan_reducers,
            sample_rate: sr,
            needs_recompute: true,
        };

        let mut builder = NodeBuilder::new("late_reflections", Box::new(node))
            .buffers(ORDER, ORDER)
            .property(slots::T60, Property::float("t60", 1.0, 0.0, f32::INFINITY).clamping())
            .property(slots::DENSITY, Property::float("density", 0.5, 0.0, 1.0).clamping())
            .property(
                slots::HF_T60,
                Property::float("hf_t60", 0.5, 0.0, f32::INFINITY).clamping(),
            )
            .property(
                slots::LF_T60,
                Property::float("lf_t60", 1.0, 0.0, f32::INFINITY).clamping(),
            )
            .property(
                slots::HF_REFERENCE,
                Property::float("hf_reference", 1000.0, 0.0, nyquist)
                    .clamping()
                    .dynamic_range(),
            )
            .property(
                slots::LF_REFERENCE,
                Property::float("lf_reference", 200.0, 0.0, nyquist)
                    .clamping()
                    .dynamic_range(),
            )
            .property(
                slots::AMPLITUDE_MODULATION_DEPTH,
                Property::float("amplitude_modulation_depth", 0.0, 0.0, 1.0).clamping(),
            )
            .property(
                slots::AMPLITUDE_MODULATION_FREQUENCY,
                Property::float("amplitude_modulation_frequency", 10.0, 0.0, nyquist).clamping(),
            )
            .property(
                slots::DELAY_MODULATION_DEPTH,
                Property::float("delay_modulation_depth", 0.0, 0.0, 1.0).clamping(),
            )
            .property(
                slots::DELAY_MODULATION_FREQUENCY,
                Property::float("delay_modulation_frequency", 10.0, 0.0, nyquist).clamping(),
            )
            .property(slots::ALLPASS_ENABLED, Property::int("allpass_enabled", 1, 0, 1))
            .property(
                slots::ALLPASS_MINFREQ,
                Property::float("allpass_minfreq", 500.0, 1.0, nyquist).clamping(),
            )
            .property(
                slots::ALLPASS_MAXFREQ,
                Property::float("allpass_maxfreq", 3000.0, 1.0, nyquist).clamping(),
            )
            .property(
                slots::ALLPASS_Q,
                Property::float("allpass_q", 0.5, 0.01, 100.0).clamping(),
            )
            .property(
                slots::ALLPASS_MODULATION_FREQUENCY,
                Property::float("allpass_modulation_frequency", 0.1, 0.0, nyquist).clamping(),
            );
        // One mono connection per line on each side, so panners can feed
        // and read individual lines.
        for i in 0..ORDER {
            builder = builder.input(i, 1).output(i, 1);
        }
        server.add_node(builder)
    }

    /// Re-derives line lengths, per-line gains, the gain-baked feedback
    /// matrix, the band shelves, and the pan-compensation delays.
    fn recompute(&mut self, properties: &PropertySet) {
        let get = |slot: i32, fallback: f32| -> f32 {
            properties
                .get(slot)
                .and_then(|p| p.get_float())
                .unwrap_or(fallback)
        };
        let density = get(slots::DENSITY, 0.5);
        let t60 = get(slots::T60, 1.0) as f64;
        let t60_high = get(slots::HF_T60, 0.5) as f64;
        let t60_low = get(slots::LF_T60, 1.0) as f64;
        let hf_reference = get(slots::HF_REFERENCE, 1000.0);
        let lf_reference = get(slots::LF_REFERENCE, 200.0);
        let sr = self.sample_rate as f64;

        // Line lengths: powers of coprime integers closest to the base
        // delay, so no two lines share echo periodicity.
        let base_delay = (0.003 + (1.0 - density) * 0.025) as f64;
        for i in 0..ORDER {
            // Walk the table column-first: 0, 4, 8, 12, 1, 5, ...
            let prime = COPRIMES[(i % 4) * 4 + i / 4] as f64;
            let power_approx = log(base_delay * sr) / log(prime);
            let delay_in_samples = pow(prime, round(power_approx));
            self.delays[i] = (delay_in_samples / sr).min(1.0) as f32;
        }
        // The shortest and longest lines end up adjacent by default, and
        // panner-fed inputs make that audible as side bias.
        self.delays.swap(0, 15);
        self.delays.swap(1, 14);
        self.fdn.set_delays(&self.delays);

        for i in 0..ORDER {
            self.gains[i] = t60_to_gain(t60_low, self.delays[i] as f64) as f32;
        }

        // Per-line shelves express the mid and high bands relative to the
        // band below, so the cascade multiplies out to the absolute gains.
        let q = core::f32::consts::FRAC_1_SQRT_2 + 1e-4;
        for i in 0..ORDER {
            let line = self.delays[i] as f64;
            let high_gain = t60_to_gain(t60_high, line);
            let mid_gain = t60_to_gain(t60, line);
            let mid_db = scalar_to_db(mid_gain, self.gains[i] as f64) as f32;
            let high_db = scalar_to_db(high_gain, mid_gain) as f32;
            self.highshelves[i]
                .set_coefficients(highshelf(hf_reference, high_db, q, self.sample_rate));
            self.midshelves[i]
                .set_coefficients(highshelf(lf_reference, mid_db, q, self.sample_rate));
        }

        // Bake the low-band gains into the Hadamard rows.
        hadamard(ORDER, &mut self.fdn_matrix);
        for i in 0..ORDER {
            for j in 0..ORDER {
                self.fdn_matrix[i * ORDER + j] *= self.gains[i];
            }
        }
        self.fdn.set_matrix(&self.fdn_matrix);

        // Align the first echo: every output is delayed so line i's first
        // arrival lands on the same sample. One extra sample keeps the
        // compensation delay nonzero.
        let max_delay = self.delays.iter().copied().fold(0.0f32, f32::max);
        let pan_reduction_delay = max_delay + 1.0 / self.sample_rate;
        for i in 0..ORDER {
            self.pan_reducers[i].set_delay(pan_reduction_delay - self.delays[i]);
        }
    }

    fn set_bank_frequency(bank: &mut [SinOsc], frequency: f32) {
        for osc in bank.iter_mut() {
            osc.set_frequency(frequency as f64);
        }
    }

    fn normalize_oscillators(&mut self) {
        for osc in self
            .amplitude_modulators
            .iter_mut()
            .chain(self.delay_modulators.iter_mut())
        {
            osc.normalize();
        }
    }
}

impl Processor for LateReflectionsNode {
    fn process(&mut self, ctx: ProcessContext<'_>) {
        let properties = ctx.properties;
        if self.needs_recompute || properties.any_modified(&RECOMPUTE_SLOTS) {
            self.recompute(properties);
            self.needs_recompute = false;
        }
        if properties.any_modified(&[slots::AMPLITUDE_MODULATION_FREQUENCY]) {
            let f = properties
                .get(slots::AMPLITUDE_MODULATION_FREQUENCY)
                .and_then(|p| p.get_float())
                .unwrap_or(10.0);
            Self::set_bank_frequency(&mut self.amplitude_modulators, f);
        }
        if properties.any_modified(&[slots::DELAY_MODULATION_FREQUENCY]) {
            let f = properties
                .get(slots::DELAY_MODULATION_FREQUENCY)
                .and_then(|p| p.get_float())
                .unwrap_or(10.0);
            Self::set_bank_frequency(&mut self.delay_modulators, f);
        }
        if properties.any_modified(&[slots::ALLPASS_ENABLED]) {
            for filter in &mut self.allpasses {
                filter.clear_histories();
            }
        }
        if properties.any_modified(&[slots::ALLPASS_MODULATION_FREQUENCY]) {
            let f = properties
                .get(slots::ALLPASS_MODULATION_FREQUENCY)
                .and_then(|p| p.get_float())
                .unwrap_or(0.1);
            Self::set_bank_frequency(&mut self.allpass_modulators, f);
        }
        self.normalize_oscillators();

        let get = |slot: i32, fallback: f32| -> f32 {
            properties
                .get(slot)
                .and_then(|p| p.get_float())
                .unwrap_or(fallback)
        };
        let amplitude_depth = get(slots::AMPLITUDE_MODULATION_DEPTH, 0.0);
        let delay_depth = get(slots::DELAY_MODULATION_DEPTH, 0.0);
        let allpass_min = get(slots::ALLPASS_MINFREQ, 500.0);
        let allpass_max = get(slots::ALLPASS_MAXFREQ, 3000.0);
        let allpass_q = get(slots::ALLPASS_Q, 0.5);
        let allpass_enabled = properties
            .get(slots::ALLPASS_ENABLED)
            .and_then(|p| p.get_int())
            .unwrap_or(0)
            == 1;
        // The sweep center sits halfway; the modulator pushes delta up and
        // down of it, covering exactly [min, max].
        let allpass_delta = (allpass_max - allpass_min) / 2.0;
        let allpass_start = allpass_min + allpass_delta;

        for i in 0..ctx.block_size {
            if delay_depth != 0.0 {
                for m in 0..ORDER {
                    let base = self.delays[m];
                    let wobble = self.delay_modulators[m].tick() as f32;
                    let delay = (base + base * delay_depth * wobble).min(1.0);
                    self.fdn.set_delay(m, delay);
                }
            }
            if allpass_enabled {
                for m in 0..ORDER {
                    let wobble = self.allpass_modulators[m].tick() as f32;
                    self.allpasses[m].set_coefficients(allpass(
                        allpass_start + allpass_delta * wobble,
                        allpass_q,
                        self.sample_rate,
                    ));
                }
            }

            self.fdn.compute_frame(&mut self.output_frame);
            for j in 0..ORDER {
                ctx.outputs[j][i] = self.output_frame[j];
            }
            for j in 0..ORDER {
                // Low-band decay rides in the matrix rows; the shelves
                // only carve the mid and high bands relative to it.
                let shaped =
                    self.midshelves[j].tick(self.highshelves[j].tick(self.output_frame[j]));
                self.output_frame[j] = if allpass_enabled {
                    self.allpasses[j].tick(shaped)
                } else {
                    shaped
                };
            }
            for j in 0..ORDER {
                self.next_input_frame[j] = ctx.inputs[j][i];
            }
            // Low-band gains ride in the matrix rows.
            self.fdn.advance(&self.next_input_frame, &self.output_frame);
        }

        if amplitude_depth != 0.0 {
            let buffer = &mut self.amplitude_modulation_buffer[..ctx.block_size];
            for (channel, output) in ctx.outputs.iter_mut().enumerate() {
                // Per-channel envelope: 1 - d/2 + d·sin(2πft).
                self.amplitude_modulators[channel].fill_buffer(buffer);
                scalar_multiplication_kernel(amplitude_depth, buffer);
                scalar_addition_kernel(1.0 - amplitude_depth / 2.0, buffer);
                multiplication_kernel(output, buffer);
            }
        }

        // Banks that sat out this block still advance, so the same
        // settings always produce the same reverb regardless of what was
        // modulated before.
        if delay_depth == 0.0 {
            for osc in &mut self.delay_modulators {
                osc.skip_samples(ctx.block_size);
            }
        }
        if !allpass_enabled {
            for osc in &mut self.allpass_modulators {
                osc.skip_samples(ctx.block_size);
            }
        }
        if amplitude_depth == 0.0 {
            for osc in &mut self.amplitude_modulators {
                osc.skip_samples(ctx.block_size);
            }
        }

        for (channel, line) in self.pan_reducers.iter_mut().enumerate() {
            let output = &mut ctx.outputs[channel];
            for sample in output.iter_mut() {
                *sample = line.tick(*sample);
            }
        }
    }

    fn reset(&mut self, _properties: &PropertySet) {
        self.fdn.reset();
        for i in 0..ORDER {
            self.midshelves[i].clear_histories();
            self.highshelves[i].clear_histories();
            self.allpasses[i].clear_histories();
            let phase = i as f64 / ORDER as f64;
            self.amplitude_modulators[i].set_phase(phase);
            self.delay_modulators[i].set_phase(phase);
            self.allpass_modulators[i].set_phase(phase);
        }
        for line in &mut self.pan_reducers {
            line.reset();
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn core::any::Any {
        self
    }
}
