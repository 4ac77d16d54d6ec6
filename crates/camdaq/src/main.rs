//! Command-line acquisition runner.
//!
//! Configures the simulated camera through the settings graph, runs one
//! kinetic acquisition session, and persists every frame through the
//! asynchronous sink. Useful for exercising the full stack end to end
//! without hardware:
//!
//! ```bash
//! camdaq --frames 10 --exposure-ms 50 --output ./frames
//! ```

use anyhow::{Context, Result};
use camdaq_core::capabilities::{AcquisitionMode, ReadoutMode, TriggerMode};
use camdaq_core::frame::PixelFormat;
use camdaq_core::CameraSdk;
use camdaq_ctrl::acquisition::{choose, AcquisitionEngine, AcquisitionPlan};
use camdaq_ctrl::config::EngineConfig;
use camdaq_ctrl::settings::SettingsGraph;
use camdaq_mock::MockSdk;
use camdaq_storage::{FrameSink, TiffWriter};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "camdaq")]
#[command(about = "Run a simulated acquisition session end to end", long_about = None)]
struct Cli {
    /// Frames in the kinetic series.
    #[arg(long, default_value = "5")]
    frames: u32,

    /// Exposure time per frame, milliseconds.
    #[arg(long, default_value = "100")]
    exposure_ms: u64,

    /// Output directory for saved frames. Overrides the config file.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Optional TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let mut cfg = EngineConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(output) = cli.output {
        cfg.output_dir = output;
    }

    let sdk = Arc::new(MockSdk::builder().build());
    let exposure_s = cli.exposure_ms as f64 / 1000.0;

    // Configure through the settings graph so every value is validated
    // against the device tables before it reaches the hardware.
    let mut graph = SettingsGraph::new(sdk.clone());
    graph.set_ad_converter(0).await?;
    graph.set_output_amplifier(0).await?;
    graph.set_hs_speed(0).await?;
    graph.set_preamp_gain(0).await?;
    graph.set_acquisition_mode(AcquisitionMode::Kinetic).await?;
    graph.set_readout_mode(ReadoutMode::FullImage).await?;
    graph.set_trigger_mode(TriggerMode::Internal).await?;
    graph.set_exposure_time(exposure_s).await?;
    graph.set_accumulate_cycle(1, 0.0).await?;
    graph.set_kinetic_cycle(cli.frames, exposure_s).await?;

    let report = graph.apply().await?;
    for result in &report.results {
        match &result.outcome {
            Ok(()) => tracing::info!(parameter = result.field.label(), "applied"),
            Err(err) => tracing::warn!(parameter = result.field.label(), error = %err, "rejected"),
        }
    }
    anyhow::ensure!(report.all_ok(), "some settings were rejected by the device");
    tracing::info!(
        exposure_s = report.timings.exposure_s,
        kinetic_cycle_s = report.timings.kinetic_cycle_s,
        "device timings"
    );

    let (width, height) = sdk.properties().detector;
    let strategy = choose(sdk.clone(), cfg.tick_interval(), cfg.event_timeout());
    let engine = AcquisitionEngine::new(sdk, strategy);

    let mut sink = FrameSink::new(&cfg.output_dir, Arc::new(TiffWriter))?;
    sink.begin()?;

    // Bridge the engine's lossless frame output into the sink. The sink's
    // own enqueue is non-blocking, so the forwarder never stalls the
    // monitor beyond channel capacity.
    let (frame_tx, mut frame_rx) = tokio::sync::mpsc::channel(64);
    engine.register_frame_output(Some(frame_tx));
    let sink = Arc::new(tokio::sync::Mutex::new(sink));
    let forwarder_sink = sink.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            forwarder_sink.lock().await.enqueue(frame, "frame");
        }
    });

    let session = engine
        .start(AcquisitionPlan {
            format: PixelFormat::Mono16,
            width,
            height,
            exposure_s: report.timings.exposure_s,
        })
        .await?;
    session.wait().await;
    engine.register_frame_output(None);
    forwarder.await.context("frame forwarder task failed")?;

    let stats = sink.lock().await.finish().await?;
    tracing::info!(
        received = stats.received,
        written = stats.written,
        failed = stats.failed,
        dir = ?cfg.output_dir,
        "session complete"
    );
    Ok(())
}
