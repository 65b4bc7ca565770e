//! Device clock - drives a graph from the default cpal output device
//!
//! `cpal::Stream` is not `Send` on every host, so the stream is built and
//! owned by a dedicated thread. The graph keeps a `DriverGuard`; dropping it
//! signals the thread, which drops the stream and exits.

use std::sync::mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::GraphBackend;
use crate::config::GraphConfig;
use crate::error::{AudioError, CreationTarget};
use crate::graph::{AudioGraph, QuantumRenderer};

/// Backend that plays graphs through the default output device
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalBackend;

impl GraphBackend for CpalBackend {
    fn create_graph(&self, settings: &GraphConfig) -> Result<AudioGraph, AudioError> {
        let mut graph = AudioGraph::new(settings.clone())?;
        let driver = DriverGuard::spawn(graph.renderer(), settings)?;
        graph.attach_driver(driver);
        Ok(graph)
    }

    fn name(&self) -> &'static str {
        "cpal"
    }
}

/// Owns the device thread; stops the stream on drop
pub(crate) struct DriverGuard {
    shutdown: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl DriverGuard {
    fn spawn(renderer: QuantumRenderer, settings: &GraphConfig) -> Result<Self, AudioError> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), AudioError>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sample_rate = settings.sample_rate;

        let thread = std::thread::Builder::new()
            .name("quantum-device".to_string())
            .spawn(move || {
                let stream = match build_output_stream(renderer, sample_rate) {
                    Ok(stream) => stream,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Blocks until the guard sends or is dropped
                let _ = shutdown_rx.recv();
                drop(stream);
                log::info!("[CpalBackend] Output stream closed");
            })
            .map_err(|e| AudioError::creation(CreationTarget::Graph, e.to_string()))?;

        let guard = Self {
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        };

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(guard),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(AudioError::creation(
                CreationTarget::Graph,
                "device thread exited during startup",
            )),
        }
    }
}

impl Drop for DriverGuard {
    fn drop(&mut self) {
        self.shutdown.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("[CpalBackend] Device thread panicked");
            }
        }
    }
}

fn build_output_stream(
    renderer: QuantumRenderer,
    sample_rate: u32,
) -> Result<cpal::Stream, AudioError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or_else(|| {
        AudioError::creation(CreationTarget::Graph, "No default output device found")
    })?;

    let sample_format = device
        .default_output_config()
        .map_err(|e| AudioError::DeviceError {
            details: format!("Failed to get default output config: {:?}", e),
        })?
        .sample_format();

    let channels = renderer.output_channels();
    let stream_config = cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    log::info!(
        "[CpalBackend] Opening {:?} at {} Hz, {} channels, {:?} samples",
        device.name().unwrap_or_else(|_| "unknown".to_string()),
        sample_rate,
        channels,
        sample_format
    );

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_typed_stream::<f32>(&device, &stream_config, renderer),
        cpal::SampleFormat::I16 => build_typed_stream::<i16>(&device, &stream_config, renderer),
        cpal::SampleFormat::U16 => build_typed_stream::<u16>(&device, &stream_config, renderer),
        other => return Err(unsupported_sample_format(other)),
    }
    .map_err(|e| AudioError::creation(CreationTarget::Graph, format!("{:?}", e)))?;

    stream.play().map_err(|e| AudioError::DeviceError {
        details: format!("Output start failed: {}", e),
    })?;

    Ok(stream)
}

fn unsupported_sample_format(format: cpal::SampleFormat) -> AudioError {
    AudioError::DeviceError {
        details: format!(
            "Output sample format {:?} is not supported (expected F32, I16 or U16)",
            format
        ),
    }
}

fn build_typed_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    renderer: QuantumRenderer,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    // Allocated once; the callback only slices it
    let mut scratch = vec![0.0f32; renderer.max_quantum_samples() * channels];
    let err_fn = |err| log::error!("[CpalBackend] Output stream error: {}", err);

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            render_converted(&renderer, &mut scratch, channels, data);
        },
        err_fn,
        None,
    )
}

/// Fill a device buffer one quantum at a time, converting from f32
///
/// `scratch` holds one maximum quantum; the graph never sees more.
fn render_converted<T>(
    renderer: &QuantumRenderer,
    scratch: &mut [f32],
    channels: usize,
    data: &mut [T],
) where
    T: cpal::Sample + cpal::FromSample<f32>,
{
    for chunk in data.chunks_mut(scratch.len()) {
        let mixed = &mut scratch[..chunk.len()];
        renderer.render(chunk.len() / channels, mixed);
        for (out, &sample) in chunk.iter_mut().zip(mixed.iter()) {
            *out = T::from_sample(sample);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(max_quantum_samples: usize) -> GraphConfig {
        GraphConfig {
            max_quantum_samples,
            ..GraphConfig::default()
        }
    }

    #[test]
    fn test_unsupported_format_names_the_format() {
        let err = unsupported_sample_format(cpal::SampleFormat::F64);
        match err {
            AudioError::DeviceError { details } => {
                assert!(details.contains("F64"), "{}", details);
                assert!(details.contains("F32"));
            }
            other => panic!("expected device error, got {:?}", other),
        }
    }

    #[test]
    fn test_render_converted_chunks_by_quantum() {
        let graph = AudioGraph::new(settings(64)).unwrap();
        let _output = graph.create_device_output().unwrap();
        graph.start();
        let renderer = graph.renderer();

        let mut scratch = vec![0.0f32; 64 * 2];
        // 150 sample-frames: two full quanta and a short one
        let mut data = vec![i16::MAX; 150 * 2];
        render_converted(&renderer, &mut scratch, 2, &mut data);

        assert!(data.iter().all(|&s| s == 0));
        assert_eq!(graph.quanta_rendered(), 3);
    }

    #[test]
    fn test_render_converted_unsigned_silence_is_midpoint() {
        let graph = AudioGraph::new(settings(32)).unwrap();
        let _output = graph.create_device_output().unwrap();
        graph.start();
        let renderer = graph.renderer();

        let mut scratch = vec![1.0f32; 32 * 2];
        let mut data = vec![0u16; 32 * 2];
        render_converted(&renderer, &mut scratch, 2, &mut data);

        assert!(data.iter().all(|&s| s == 32768));
    }
}
