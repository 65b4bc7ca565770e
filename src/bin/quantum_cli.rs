use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use clap::{Parser, Subcommand};
use quantum_synth::graph::ManualClockBackend;
use quantum_synth::managers::StreamSetStatus;
use quantum_synth::notify::{Notification, NotificationHub};
use quantum_synth::{AppConfig, QuantumOutcome, StreamSetManager, ToneMode};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "quantum_cli",
    about = "Drive the quantum synth pipeline from the command line"
)]
struct Cli {
    /// Configuration file (defaults to assets/quantum_synth.json)
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render quanta on a manual clock and report stream statistics as JSON
    Render {
        #[arg(long)]
        streams: Option<usize>,
        #[arg(long)]
        channels: Option<u16>,
        /// Quanta to deliver
        #[arg(long, default_value_t = 100)]
        quanta: usize,
        /// Sample-frames per quantum
        #[arg(long, default_value_t = 480)]
        samples: usize,
        /// Use a continuous tone at this frequency instead of the block-locked one
        #[arg(long)]
        frequency: Option<f64>,
        /// Include the first rendered output quantum in the report
        #[arg(long)]
        dump_frame: bool,
    },
    /// Play through the default output device (requires the device_output feature)
    Play {
        #[arg(long)]
        streams: Option<usize>,
        #[arg(long)]
        channels: Option<u16>,
        #[arg(long, default_value_t = 3)]
        seconds: u64,
        #[arg(long)]
        frequency: Option<f64>,
    },
    /// Print the effective configuration
    DumpConfig,
}

#[derive(Serialize)]
struct RenderReport {
    quanta_requested: usize,
    quanta_rendered: usize,
    quanta_skipped: usize,
    status: StreamSetStatus,
    notifications: Vec<Notification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_frame: Option<Vec<f32>>,
}

fn main() -> ExitCode {
    quantum_synth::init_logging();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli
        .config
        .map(AppConfig::load_from_file)
        .unwrap_or_else(AppConfig::load);

    match cli.command {
        Commands::Render {
            streams,
            channels,
            quanta,
            samples,
            frequency,
            dump_frame,
        } => run_render(config, streams, channels, quanta, samples, frequency, dump_frame),
        Commands::Play {
            streams,
            channels,
            seconds,
            frequency,
        } => run_play(config, streams, channels, seconds, frequency),
        Commands::DumpConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::from(0))
        }
    }
}

fn apply_frequency(config: &mut AppConfig, frequency: Option<f64>) -> Result<()> {
    if let Some(frequency_hz) = frequency {
        ensure!(frequency_hz > 0.0, "frequency must be positive");
        config.synthesis.tone = ToneMode::Continuous { frequency_hz };
    }
    Ok(())
}

fn run_render(
    mut config: AppConfig,
    streams: Option<usize>,
    channels: Option<u16>,
    quanta: usize,
    samples: usize,
    frequency: Option<f64>,
    dump_frame: bool,
) -> Result<ExitCode> {
    apply_frequency(&mut config, frequency)?;
    let stream_count = streams.unwrap_or(config.streams.stream_count);
    let channel_count = channels.unwrap_or(config.streams.channel_count);

    let hub = Arc::new(NotificationHub::default());
    let manager = StreamSetManager::from_config(Box::new(ManualClockBackend), &config)
        .with_notification_sink(hub.clone());
    manager
        .configure(stream_count, channel_count)
        .context("configuring stream set")?;
    manager.start_all()?;

    let renderer = manager
        .renderer()
        .context("stream set has no graph after configure")?;
    let mut out = vec![0.0f32; samples * config.graph.output_channels as usize];
    let mut first_frame = None;
    let mut rendered = 0;
    let mut skipped = 0;

    for _ in 0..quanta {
        match renderer.render(samples, &mut out) {
            QuantumOutcome::Rendered { .. } => rendered += 1,
            QuantumOutcome::Skipped => skipped += 1,
            QuantumOutcome::Idle => {}
        }
        if dump_frame && first_frame.is_none() {
            first_frame = Some(out.clone());
        }
    }

    manager.stop_all()?;
    manager.drain_reports()?;

    let report = RenderReport {
        quanta_requested: quanta,
        quanta_rendered: rendered,
        quanta_skipped: skipped,
        status: manager.status(),
        notifications: hub.snapshot().recent,
        first_frame,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    manager.teardown()?;
    Ok(ExitCode::from(0))
}

#[cfg(feature = "device_output")]
fn run_play(
    mut config: AppConfig,
    streams: Option<usize>,
    channels: Option<u16>,
    seconds: u64,
    frequency: Option<f64>,
) -> Result<ExitCode> {
    use quantum_synth::graph::CpalBackend;
    use std::time::Duration;

    apply_frequency(&mut config, frequency)?;
    let stream_count = streams.unwrap_or(config.streams.stream_count);
    let channel_count = channels.unwrap_or(config.streams.channel_count);

    let hub = Arc::new(NotificationHub::default());
    let manager = StreamSetManager::from_config(Box::new(CpalBackend), &config)
        .with_notification_sink(hub.clone());
    manager
        .configure(stream_count, channel_count)
        .context("opening output device")?;
    manager.start_all()?;

    for _ in 0..seconds {
        std::thread::sleep(Duration::from_secs(1));
        manager.drain_reports()?;
    }

    manager.stop_all()?;
    println!("{}", serde_json::to_string_pretty(&manager.status())?);
    manager.teardown()?;
    Ok(ExitCode::from(0))
}

#[cfg(not(feature = "device_output"))]
fn run_play(
    _config: AppConfig,
    _streams: Option<usize>,
    _channels: Option<u16>,
    _seconds: u64,
    _frequency: Option<f64>,
) -> Result<ExitCode> {
    anyhow::bail!("quantum_cli was built without the device_output feature")
}
