//! Integration tests for the resona-core processing graph.
//!
//! Exercises the public server API end to end: scheduling order and
//! dedup, pause semantics, gain/bias application, channel-count
//! reconciliation, a-rate automation across block boundaries, and node
//! lifecycle.

use resona_core::{
    standard_slots, Error, NodeBuilder, NodeId, NodeState, ProcessContext, Processor, Server,
};

/// Emits a fixed ramp so output samples are distinguishable.
struct Ramp {
    scale: f32,
    processed: u64,
}

impl Ramp {
    fn new(scale: f32) -> Self {
        Self {
            scale,
            processed: 0,
        }
    }
}

impl Processor for Ramp {
    fn process(&mut self, ctx: ProcessContext<'_>) {
        self.processed += 1;
        for output in ctx.outputs.iter_mut() {
            for (i, sample) in output.iter_mut().enumerate() {
                *sample = self.scale * i as f32;
            }
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn core::any::Any {
        self
    }
}

/// Copies inputs to outputs and counts invocations.
struct Passthrough {
    processed: u64,
}

impl Processor for Passthrough {
    fn process(&mut self, ctx: ProcessContext<'_>) {
        self.processed += 1;
        for (output, input) in ctx.outputs.iter_mut().zip(ctx.inputs.iter()) {
            output.copy_from_slice(input);
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn core::any::Any {
        self
    }
}

fn ramp(server: &mut Server, scale: f32) -> NodeId {
    server.add_node(
        NodeBuilder::new("ramp", Box::new(Ramp::new(scale)))
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
fn chain_delivers_samples_to_the_final_mix() {
    let mut server = Server::new(48000, 32);
    let source = ramp(&mut server, 1.0);
    let through = passthrough(&mut server, 1);
    server.connect(source, 0, through, 0).unwrap();
    server.connect_to_server(through, 0).unwrap();

    let out = tick(&mut server);
    for k in 0..32 {
        assert_eq!(out[k * 2], k as f32, "left frame {k}");
        assert_eq!(out[k * 2 + 1], k as f32, "right frame {k}");
    }
}

#[test]
fn every_tick_processes_reachable_nodes_exactly_once() {
    // Dense diamond: one source fans out to three layers that all
    // reconverge. Each node must still run once per tick.
    let mut server = Server::new(48000, 16);
    let source = ramp(&mut server, 1.0);
    let layer: Vec<NodeId> = (0..3).map(|_| passthrough(&mut server, 1)).collect();
    let sink = passthrough(&mut server, 1);
    for &node in &layer {
        server.connect(source, 0, node, 0).unwrap();
        server.connect(node, 0, sink, 0).unwrap();
    }
    server.connect_to_server(sink, 0).unwrap();

    for expected in 1..=5u64 {
        tick(&mut server);
        let s: &mut Ramp = server.processor_mut(source).unwrap();
        assert_eq!(s.processed, expected);
        for &node in &layer {
            let p: &mut Passthrough = server.processor_mut(node).unwrap();
            assert_eq!(p.processed, expected);
        }
    }
}

#[test]
fn paused_node_skips_process_and_emits_silence() {
    let mut server = Server::new(48000, 16);
    let source = ramp(&mut server, 1.0);
    server.connect_to_server(source, 0).unwrap();
    server.set_state(source, NodeState::Paused).unwrap();

    let out = tick(&mut server);
    assert!(out.iter().all(|&s| s == 0.0));
    let s: &mut Ramp = server.processor_mut(source).unwrap();
    assert_eq!(s.processed, 0, "paused nodes never process");
}

#[test]
fn observed_output_is_mul_times_raw_plus_add() {
    let mut server = Server::new(48000, 16);
    let source = ramp(&mut server, 2.0);
    server.connect_to_server(source, 0).unwrap();
    server.set_float(source, standard_slots::MUL, 0.5).unwrap();
    server.set_float(source, standard_slots::ADD, 3.0).unwrap();

    let out = tick(&mut server);
    for k in 0..16 {
        // Raw process output is 2k; observed must be 0.5·2k + 3.
        let expected = 0.5 * (2.0 * k as f32) + 3.0;
        assert!((out[k * 2] - expected).abs() < 1e-6, "frame {k}");
    }
}

#[test]
fn mono_into_stereo_consumer_applies_canonical_upmix() {
    let mut server = Server::new(48000, 16);
    let source = ramp(&mut server, 1.0);
    let stereo = passthrough(&mut server, 2);
    server.connect(source, 0, stereo, 0).unwrap();
    server.connect_to_server(stereo, 0).unwrap();

    let out = tick(&mut server);
    for k in 0..16 {
        assert_eq!(out[k * 2], k as f32, "left frame {k}");
        assert_eq!(out[k * 2 + 1], k as f32, "right frame {k}");
    }
}

#[test]
fn stereo_through_mono_and_back_averages_channels() {
    // A two-channel source with distinct channels, squeezed through a
    // mono node and widened again: both outputs carry the average.
    struct TwoChannel;
    impl Processor for TwoChannel {
        fn process(&mut self, ctx: ProcessContext<'_>) {
            ctx.outputs[0].fill(0.8);
            ctx.outputs[1].fill(0.2);
        }
        fn as_any_mut(&mut self) -> &mut dyn core::any::Any {
            self
        }
    }

    let mut server = Server::new(48000, 16);
    let source = server.add_node(
        NodeBuilder::new("two_channel", Box::new(TwoChannel))
            .buffers(0, 2)
            .output(0, 2),
    );
    let mono = passthrough(&mut server, 1);
    let stereo = passthrough(&mut server, 2);
    server.connect(source, 0, mono, 0).unwrap();
    server.connect(mono, 0, stereo, 0).unwrap();
    server.connect_to_server(stereo, 0).unwrap();

    let out = tick(&mut server);
    for (i, &s) in out.iter().enumerate() {
        assert!((s - 0.5).abs() < 1e-6, "sample {i}: {s}");
    }
}

#[test]
fn connect_sequences_preserve_acyclicity() {
    let mut server = Server::new(48000, 16);
    let a = passthrough(&mut server, 1);
    let b = passthrough(&mut server, 1);
    let c = passthrough(&mut server, 1);

    server.connect(a, 0, b, 0).unwrap();
    server.connect(b, 0, c, 0).unwrap();
    assert_eq!(server.connect(c, 0, a, 0), Err(Error::CausesCycle));

    // Breaking the chain re-permits the edge in the other direction.
    server.disconnect(a, 0).unwrap();
    server.connect(c, 0, a, 0).unwrap();
    assert_eq!(server.connect(a, 0, b, 0), Err(Error::CausesCycle));
    server.connect_to_server(c, 0).unwrap();
    tick(&mut server);
}

#[test]
fn automation_ramps_across_block_boundaries() {
    let sr = 48000;
    let block = 32;
    let mut server = Server::new(sr, block);
    let source = ramp(&mut server, 0.0); // silent; we watch `add`
    server.connect_to_server(source, 0).unwrap();
    server.set_float(source, standard_slots::ADD, 1.0).unwrap();
    // Ramp `add` from 1 to 0 over two blocks.
    server
        .schedule_float(source, standard_slots::ADD, 64.0 / sr as f64, 0.0)
        .unwrap();

    let first = tick(&mut server);
    let second = tick(&mut server);
    let third = tick(&mut server);

    assert!((first[0] - 1.0).abs() < 1e-6);
    // Halfway through the ramp at the start of block two.
    assert!((second[0] - 0.5).abs() < 0.02);
    // Fully decayed afterwards, back to k-rate.
    assert!(third.iter().all(|&s| s.abs() < 1e-5));
}

#[test]
fn property_modulation_tracks_the_producer_block() {
    // A ramp modulates another node's `add`: the consumer's output must
    // reproduce the producer's samples one-for-one.
    let mut server = Server::new(48000, 16);
    let modulator = ramp(&mut server, 0.25);
    let carrier = ramp(&mut server, 0.0);
    server.connect_to_server(carrier, 0).unwrap();
    server
        .connect_property(modulator, 0, carrier, standard_slots::ADD)
        .unwrap();

    let out = tick(&mut server);
    for k in 0..16 {
        assert!((out[k * 2] - 0.25 * k as f32).abs() < 1e-6, "frame {k}");
    }
}

#[test]
fn released_producer_survives_until_disconnected() {
    let mut server = Server::new(48000, 16);
    let source = ramp(&mut server, 1.0);
    let sink = passthrough(&mut server, 1);
    server.connect(source, 0, sink, 0).unwrap();
    server.connect_to_server(sink, 0).unwrap();

    server.release(source).unwrap();
    assert_eq!(server.node_count(), 2);
    let out = tick(&mut server);
    assert!(out.iter().any(|&s| s != 0.0));

    server.disconnect(source, 0).unwrap();
    assert_eq!(server.node_count(), 1);
    let out = tick(&mut server);
    assert!(out.iter().all(|&s| s == 0.0));
}

#[test]
fn forwarded_properties_expose_inner_controls() {
    let mut server = Server::new(48000, 16);
    let inner = ramp(&mut server, 1.0);
    let outer = passthrough(&mut server, 1);
    server.connect(inner, 0, outer, 0).unwrap();
    server.connect_to_server(outer, 0).unwrap();
    server
        .forward_property(outer, 10, inner, standard_slots::MUL)
        .unwrap();

    server.set_float(outer, 10, 0.0).unwrap();
    let out = tick(&mut server);
    assert!(out.iter().all(|&s| s == 0.0), "inner gain reached zero");

    server.stop_forwarding_property(outer, 10).unwrap();
    assert_eq!(server.get_float(outer, 10), Err(Error::Range));
}
