//! signal-fusion demo - main entry point
//!
//! Wires a simulated three-axis sensor into a statistics transformer, a
//! logging consumer and a threshold detector whose events trigger a second
//! consumer, then runs until Ctrl+C or a stop request.
//!
//! Usage: `signal-fusion [config.toml|config.json]`

use anyhow::Context;
use signal_fusion::components::{
    EventLog, FrameStats, LogConsumer, SignalPattern, SignalSource, ThresholdDetector,
};
use signal_fusion::{Pipeline, PipelineConfig};
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_logging(config: &PipelineConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = match &config.logging.filter {
        Some(directive) => EnvFilter::try_new(directive)
            .with_context(|| format!("invalid log filter {:?}", directive))?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,signal_fusion=debug")),
    };

    let (file_layer, guard) = match &config.logging.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let name = path
                .file_name()
                .context("logging.file has no file name")?;
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(guard)
}

fn load_config() -> anyhow::Result<PipelineConfig> {
    match std::env::args().nth(1) {
        Some(path) => PipelineConfig::load(&path).with_context(|| format!("loading {}", path)),
        None => Ok(PipelineConfig::default()),
    }
}

fn build(pipeline: &mut Pipeline) -> anyhow::Result<()> {
    let (sensor, channel) = SignalSource::new("imu", 40.0)
        .with_pattern(SignalPattern::Sine {
            frequency: 0.25,
            amplitude: 1.0,
            offset: 0.0,
        })
        .with_pattern(SignalPattern::Triangle {
            period: 3.0,
            amplitude: 2.0,
        })
        .with_pattern(SignalPattern::Counter {
            step: 1.0,
            min: 0.0,
            max: 399.0,
        })
        .with_labels(["x", "y", "z"])
        .with_connect_failures(2)
        .build();
    let (_, imu) = pipeline.add_sensor(sensor, channel)?;

    let stats = pipeline.add_transformer(FrameStats::new("imu-stats"), &[imu], 1.0, 0.0)?;
    pipeline.add_consumer(LogConsumer::new("stats-log"), &[stats], 1.0, 0.0)?;

    let detector = pipeline.add_consumer(ThresholdDetector::new("peak-detector", 0, 0.8), &[imu], 0.5, 0.0)?;
    let peaks = pipeline.register_event_provider(detector)?;
    pipeline.add_event_consumer(LogConsumer::new("peak-log"), &[imu], &peaks)?;

    let log = pipeline.add_event_handler(EventLog::new("event-log").with_summary_interval(Duration::from_secs(10)))?;
    pipeline.register_event_listener(log, &peaks)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    let guard = init_logging(&config)?;

    tracing::info!("Starting signal-fusion demo");

    let mut pipeline = Pipeline::new(config)?;
    build(&mut pipeline)?;

    let shared = std::sync::Arc::clone(pipeline.shared());
    let cancel = pipeline.start_cancel_token();
    ctrlc::set_handler(move || {
        shared.supervisor().request_stop("interrupted");
        cancel.cancel();
    })
    .context("installing Ctrl+C handler")?;

    pipeline.start()?;
    while !pipeline.wait_for_stop_request(Duration::from_secs(1)) {}

    tracing::info!("Shutting down...");
    pipeline.stop()?;
    for failure in pipeline.failures() {
        tracing::warn!(component = %failure.component, fatal = failure.fatal, "{}", failure.message);
    }

    // Flushes the file writer.
    drop(guard);
    Ok(())
}
