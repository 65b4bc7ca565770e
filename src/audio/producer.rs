//! Frame producer - the per-stream quantum handler
//!
//! On every quantum the producer acquires a frame sized for the demand, fills
//! it with its voice, and submits it. It runs on the audio thread, so it never
//! blocks, logs, or panics: failures become a dropped frame plus a
//! `DropReport` queued for the control side.
//!
//! # Architecture
//! ```text
//! QuantumRenderer::render() [Real-time thread]
//!   └─> FrameProducer::on_quantum_started(request, sink)
//!       ├─> sink.acquire_frame(required)      [pooled, no allocation]
//!       ├─> frame.lock_buffer() -> SineVoice::render()
//!       ├─> sink.add_frame(frame)             [ownership moves downstream]
//!       └─> on failure: DropReport -> rtrb queue -> StreamSetManager::drain_reports()
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};
use serde::Serialize;

use super::synth::SineVoice;
use crate::error::RenderError;
use crate::graph::{FrameSink, QuantumHandler, QuantumRequest};

/// A quantum that produced no frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropReport {
    pub stream: usize,
    pub required_samples: usize,
    pub error: RenderError,
}

/// Per-stream counters shared between the audio thread and the control side
#[derive(Debug, Default)]
pub struct StreamStats {
    quanta_serviced: AtomicU64,
    frames_submitted: AtomicU64,
    frames_dropped: AtomicU64,
    reports_lost: AtomicU64,
}

/// Point-in-time copy of [`StreamStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStatsSnapshot {
    pub quanta_serviced: u64,
    pub frames_submitted: u64,
    pub frames_dropped: u64,
    pub reports_lost: u64,
}

impl StreamStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Quanta delivered to the stream, including zero-sample ones
    pub fn quanta_serviced(&self) -> u64 {
        self.quanta_serviced.load(Ordering::Relaxed)
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    /// Drop reports discarded because the report queue was full
    pub fn reports_lost(&self) -> u64 {
        self.reports_lost.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StreamStatsSnapshot {
        StreamStatsSnapshot {
            quanta_serviced: self.quanta_serviced(),
            frames_submitted: self.frames_submitted(),
            frames_dropped: self.frames_dropped(),
            reports_lost: self.reports_lost(),
        }
    }
}

/// Quantum handler that synthesizes one frame per quantum
pub struct FrameProducer {
    stream: usize,
    voice: SineVoice,
    stats: Arc<StreamStats>,
    reports: Producer<DropReport>,
}

impl FrameProducer {
    /// Create a producer for stream `stream`
    ///
    /// # Returns
    /// The producer, its shared stats, and the consumer end of its
    /// drop-report queue
    ///
    /// # Panics
    /// Panics if `report_capacity` is 0
    pub fn new(
        stream: usize,
        voice: SineVoice,
        report_capacity: usize,
    ) -> (Self, Arc<StreamStats>, Consumer<DropReport>) {
        assert!(report_capacity > 0, "report_capacity must be greater than 0");

        let stats = Arc::new(StreamStats::new());
        let (reports, report_consumer) = RingBuffer::new(report_capacity);
        let producer = Self {
            stream,
            voice,
            stats: Arc::clone(&stats),
            reports,
        };
        (producer, stats, report_consumer)
    }

    pub fn stream(&self) -> usize {
        self.stream
    }

    fn produce(&mut self, required: usize, sink: &mut dyn FrameSink) -> Result<(), RenderError> {
        let format = sink.format();
        let mut frame = sink.acquire_frame(required)?;

        let filled = match frame.lock_buffer() {
            Ok(mut lock) => self.voice.render(
                format.channel_count,
                required,
                format.sample_rate,
                format.layout,
                lock.as_mut_slice(),
            ),
            Err(err) => Err(err),
        };

        match filled {
            Ok(_) => {
                sink.add_frame(frame);
                Ok(())
            }
            Err(err) => {
                sink.discard_frame(frame);
                Err(err)
            }
        }
    }

    fn record_drop(&mut self, required_samples: usize, error: RenderError) {
        self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
        let report = DropReport {
            stream: self.stream,
            required_samples,
            error,
        };
        if self.reports.push(report).is_err() {
            self.stats.reports_lost.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl QuantumHandler for FrameProducer {
    fn on_quantum_started(&mut self, request: QuantumRequest, sink: &mut dyn FrameSink) {
        self.stats.quanta_serviced.fetch_add(1, Ordering::Relaxed);

        let required = request.required_samples;
        if required == 0 {
            return;
        }

        match self.produce(required, sink) {
            Ok(()) => {
                self.stats.frames_submitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => self.record_drop(required, err),
        }
    }
}
