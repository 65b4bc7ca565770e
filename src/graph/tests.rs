use super::*;
use crate::audio::synth::synthesize;

/// Handler that submits frames filled with a constant
struct ConstHandler {
    value: f32,
    calls: Arc<AtomicUsize>,
}

impl ConstHandler {
    fn boxed(value: f32) -> (Box<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(Self {
                value,
                calls: Arc::clone(&calls),
            }),
            calls,
        )
    }
}

impl QuantumHandler for ConstHandler {
    fn on_quantum_started(&mut self, request: QuantumRequest, sink: &mut dyn FrameSink) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.required_samples == 0 {
            return;
        }
        if let Ok(mut frame) = sink.acquire_frame(request.required_samples) {
            if let Ok(mut lock) = frame.lock_buffer() {
                lock.fill(self.value);
            }
            sink.add_frame(frame);
        }
    }
}

fn format(channel_count: u16) -> EncodingProperties {
    EncodingProperties {
        sample_rate: 48000,
        channel_count,
        layout: ChannelLayout::Interleaved,
    }
}

fn wired_node(graph: &AudioGraph, output: &OutputNode, channels: u16, value: f32) -> (FrameInputNode, Arc<AtomicUsize>) {
    let node = graph.create_frame_input_node(format(channels)).unwrap();
    node.add_outgoing_connection(output).unwrap();
    let (handler, calls) = ConstHandler::boxed(value);
    node.set_quantum_handler(handler).unwrap();
    (node, calls)
}

#[test]
fn test_single_device_output_per_graph() {
    let graph = AudioGraph::new(GraphConfig::default()).unwrap();
    let output = graph.create_device_output().unwrap();
    assert_eq!(output.channel_count(), graph.settings().output_channels);
    assert!(graph.has_device_output());

    match graph.create_device_output() {
        Err(AudioError::CreationFailed { target, .. }) => {
            assert_eq!(target, CreationTarget::DeviceOutput)
        }
        other => panic!("expected creation failure, got {:?}", other),
    }
}

#[test]
fn test_frame_input_node_validates_format() {
    let graph = AudioGraph::new(GraphConfig::default()).unwrap();

    assert!(graph.create_frame_input_node(format(0)).is_err());
    assert!(graph.create_frame_input_node(format(MAX_CHANNELS + 1)).is_err());

    let mismatched = EncodingProperties {
        sample_rate: 44100,
        ..format(2)
    };
    assert!(matches!(
        graph.create_frame_input_node(mismatched),
        Err(AudioError::CreationFailed {
            target: CreationTarget::FrameInputNode,
            ..
        })
    ));

    let node = graph.create_frame_input_node(format(2)).unwrap();
    assert!(!node.is_running());
    assert!(!node.is_connected());
    assert_eq!(graph.node_count(), 1);

    let second = graph.create_frame_input_node(format(1)).unwrap();
    assert_eq!(second.id().index(), node.id().index() + 1);
    assert_eq!(graph.node_count(), 2);
}

#[test]
fn test_stopped_graph_renders_idle_silence() {
    let graph = AudioGraph::new(GraphConfig::default()).unwrap();
    let output = graph.create_device_output().unwrap();
    let (node, calls) = wired_node(&graph, &output, 2, 0.5);
    node.start();

    let mut out = vec![1.0; 960];
    assert_eq!(graph.render_quantum(480, &mut out), QuantumOutcome::Idle);
    assert!(out.iter().all(|&s| s == 0.0));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_only_started_connected_nodes_are_serviced() {
    let graph = AudioGraph::new(GraphConfig::default()).unwrap();
    let output = graph.create_device_output().unwrap();
    graph.start();

    let (stopped, stopped_calls) = wired_node(&graph, &output, 2, 0.1);

    let unconnected = graph.create_frame_input_node(format(2)).unwrap();
    let (handler, unconnected_calls) = ConstHandler::boxed(0.1);
    unconnected.set_quantum_handler(handler).unwrap();
    unconnected.start();

    let mut out = vec![0.0; 960];
    assert_eq!(
        graph.render_quantum(480, &mut out),
        QuantumOutcome::Rendered {
            streams_serviced: 0,
            frames_mixed: 0
        }
    );
    assert_eq!(stopped_calls.load(Ordering::SeqCst), 0);
    assert_eq!(unconnected_calls.load(Ordering::SeqCst), 0);

    stopped.start();
    graph.render_quantum(480, &mut out);
    assert_eq!(stopped_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_mono_stream_fills_every_output_channel() {
    let graph = AudioGraph::new(GraphConfig::default()).unwrap();
    let output = graph.create_device_output().unwrap();
    let (node, _) = wired_node(&graph, &output, 1, 0.25);
    node.start();
    graph.start();

    let mut out = vec![0.0; 64 * 2];
    graph.render_quantum(64, &mut out);
    assert!(out.iter().all(|&s| (s - 0.25).abs() < 1e-6));
}

#[test]
fn test_streams_are_summed() {
    let graph = AudioGraph::new(GraphConfig::default()).unwrap();
    let output = graph.create_device_output().unwrap();
    let (a, _) = wired_node(&graph, &output, 2, 0.1);
    let (b, _) = wired_node(&graph, &output, 2, 0.2);
    a.start();
    b.start();
    graph.start();

    let mut out = vec![0.0; 32 * 2];
    let outcome = graph.render_quantum(32, &mut out);
    assert_eq!(
        outcome,
        QuantumOutcome::Rendered {
            streams_serviced: 2,
            frames_mixed: 2
        }
    );
    assert!(out.iter().all(|&s| (s - 0.3).abs() < 1e-6));
}

#[test]
fn test_planar_frames_mix_to_interleaved_output() {
    struct SineHandler;
    impl QuantumHandler for SineHandler {
        fn on_quantum_started(&mut self, request: QuantumRequest, sink: &mut dyn FrameSink) {
            let format = sink.format();
            if let Ok(mut frame) = sink.acquire_frame(request.required_samples) {
                if let Ok(mut lock) = frame.lock_buffer() {
                    let _ = synthesize(
                        format.channel_count,
                        request.required_samples,
                        format.sample_rate,
                        format.layout,
                        lock.as_mut_slice(),
                    );
                }
                sink.add_frame(frame);
            }
        }
    }

    let graph = AudioGraph::new(GraphConfig::default()).unwrap();
    let output = graph.create_device_output().unwrap();
    let node = graph
        .create_frame_input_node(EncodingProperties {
            layout: ChannelLayout::Planar,
            ..format(2)
        })
        .unwrap();
    node.add_outgoing_connection(&output).unwrap();
    node.set_quantum_handler(Box::new(SineHandler)).unwrap();
    node.start();
    graph.start();

    let mut out = vec![0.0; 100 * 2];
    graph.render_quantum(100, &mut out);

    let mut expected = vec![0.0; 100 * 2];
    synthesize(2, 100, 48000, ChannelLayout::Interleaved, &mut expected).unwrap();
    for (actual, expected) in out.iter().zip(expected.iter()) {
        assert!((actual - expected).abs() < 1e-6);
    }
}

#[test]
fn test_frames_are_recycled_across_quanta() {
    let graph = AudioGraph::new(GraphConfig::default()).unwrap();
    let output = graph.create_device_output().unwrap();
    let (node, calls) = wired_node(&graph, &output, 2, 0.1);
    node.start();
    graph.start();

    let mut out = vec![0.0; 480 * 2];
    // Far more quanta than pooled frames
    for _ in 0..50 {
        let outcome = graph.render_quantum(480, &mut out);
        assert_eq!(
            outcome,
            QuantumOutcome::Rendered {
                streams_serviced: 1,
                frames_mixed: 1
            }
        );
    }
    assert_eq!(calls.load(Ordering::SeqCst), 50);
    assert_eq!(graph.quanta_rendered(), 50);
}

#[test]
fn test_short_output_buffer_shortens_quantum() {
    let graph = AudioGraph::new(GraphConfig::default()).unwrap();
    let output = graph.create_device_output().unwrap();
    let (node, _) = wired_node(&graph, &output, 2, 0.5);
    node.start();
    graph.start();

    let mut out = vec![0.0; 10 * 2 + 1];
    graph.render_quantum(480, &mut out);
    assert!(out[..20].iter().all(|&s| (s - 0.5).abs() < 1e-6));
    assert_eq!(out[20], 0.0);
}

#[test]
fn test_handler_replacement_rejected_while_running() {
    let graph = AudioGraph::new(GraphConfig::default()).unwrap();
    let output = graph.create_device_output().unwrap();
    let (node, first_calls) = wired_node(&graph, &output, 2, 0.1);

    // Replacing before start is allowed
    let (second, second_calls) = ConstHandler::boxed(0.2);
    node.set_quantum_handler(second).unwrap();

    node.start();
    let (third, _) = ConstHandler::boxed(0.3);
    assert_eq!(node.set_quantum_handler(third), Err(AudioError::HandlerBusy));

    graph.start();
    let mut out = vec![0.0; 16];
    graph.render_quantum(8, &mut out);
    assert_eq!(first_calls.load(Ordering::SeqCst), 0);
    assert_eq!(second_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_render_skips_when_control_holds_graph() {
    let graph = AudioGraph::new(GraphConfig::default()).unwrap();
    let output = graph.create_device_output().unwrap();
    let (node, calls) = wired_node(&graph, &output, 2, 0.5);
    node.start();
    graph.start();

    let mut out = vec![1.0; 32];
    {
        let _held = graph.core.lock_inner().unwrap();
        assert_eq!(graph.render_quantum(16, &mut out), QuantumOutcome::Skipped);
    }
    assert!(out.iter().all(|&s| s == 0.0));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(graph.quanta_skipped(), 1);
}

#[test]
fn test_reset_all_nodes_detaches_handles() {
    let graph = AudioGraph::new(GraphConfig::default()).unwrap();
    let output = graph.create_device_output().unwrap();
    let (node, _) = wired_node(&graph, &output, 2, 0.5);
    node.start();

    graph.reset_all_nodes().unwrap();
    assert_eq!(graph.node_count(), 0);
    assert!(!graph.has_device_output());
    assert!(!node.is_attached());
    assert!(!node.is_running());
    assert!(!node.is_connected());
    assert!(!output.is_attached());

    node.start();
    assert!(!node.is_running());
    assert_eq!(node.add_outgoing_connection(&output), Err(AudioError::NodeRemoved));
    let (handler, _) = ConstHandler::boxed(0.1);
    assert_eq!(node.set_quantum_handler(handler), Err(AudioError::NodeRemoved));

    // A new output can be created after a reset
    assert!(graph.create_device_output().is_ok());
}

#[test]
fn test_connection_to_foreign_output_rejected() {
    let graph = AudioGraph::new(GraphConfig::default()).unwrap();
    let other = AudioGraph::new(GraphConfig::default()).unwrap();
    let foreign = other.create_device_output().unwrap();

    let node = graph.create_frame_input_node(format(2)).unwrap();
    assert!(matches!(
        node.add_outgoing_connection(&foreign),
        Err(AudioError::InvalidConfiguration { .. })
    ));
    assert!(!node.is_connected());
}

#[test]
fn test_renderer_outlives_graph_as_idle() {
    let graph = AudioGraph::new(GraphConfig::default()).unwrap();
    graph.start();
    let renderer = graph.renderer();
    drop(graph);

    let mut out = vec![1.0; 8];
    assert_eq!(renderer.render(4, &mut out), QuantumOutcome::Idle);
    assert!(out.iter().all(|&s| s == 0.0));
}
