mod config;
mod draw;
mod error;
mod logging;
mod monitor;
mod parse;
mod ring;
mod server;
mod session;
mod shutdown;
mod tone;
mod wav;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use config::Config;
use log::{info, warn};
use monitor::{Monitor, PlotTarget};
use parse::{Domain, Sample};
use session::SessionContext;
use shutdown::Shutdown;

#[derive(Parser, Debug)]
#[command(name = "digital-stethoscope")]
#[command(about = "Receive integer samples over WebSocket, show them live and save them as WAV")]
struct Args {
    /// TOML file with configuration overrides
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address (e.g. 0.0.0.0:8080)
    #[arg(long)]
    listen: Option<String>,

    /// Stream every received sample into this WAV file
    #[arg(long)]
    record: Option<PathBuf>,

    /// Write a tone file whenever a sample exceeds the threshold
    #[arg(long)]
    tone: bool,

    /// Tone output file
    #[arg(long)]
    tone_output: Option<PathBuf>,

    /// Tone trigger threshold
    #[arg(long)]
    threshold: Option<Sample>,

    /// Sample rate (Hz) of written files
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Number of samples kept for display
    #[arg(long)]
    buffer_capacity: Option<usize>,

    /// Range samples are clamped into before buffering
    #[arg(long, value_enum)]
    buffer_domain: Option<Domain>,

    /// Zero the display buffer when a client starts sending
    #[arg(long)]
    reset_on_connect: bool,

    /// Disable the status line tick
    #[arg(long)]
    no_monitor: bool,

    /// Presentation tick interval (ms)
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Redraw the live waveform into this PNG
    #[arg(long)]
    plot: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Also append logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Result<Config, error::ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(v) = self.listen {
            config.listen = v;
        }
        if self.record.is_some() {
            config.record = self.record;
        }
        config.tone |= self.tone;
        if let Some(v) = self.tone_output {
            config.tone_output = v;
        }
        if let Some(v) = self.threshold {
            config.tone_threshold = v;
        }
        if let Some(v) = self.sample_rate {
            config.sample_rate = v;
        }
        if let Some(v) = self.buffer_capacity {
            config.buffer_capacity = v;
        }
        if let Some(v) = self.buffer_domain {
            config.buffer_domain = v;
        }
        config.reset_buffer_on_connect |= self.reset_on_connect;
        if self.no_monitor {
            config.monitor = false;
        }
        if let Some(v) = self.tick_ms {
            config.tick_ms = v;
        }
        if self.plot.is_some() {
            config.plot = self.plot;
        }
        if let Some(v) = self.log_level {
            config.log_level = v;
        }
        if self.log_file.is_some() {
            config.log_file = self.log_file;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Resolve on Ctrl-C, or on SIGTERM where the platform has it.
#[cfg(unix)]
async fn wait_for_stop() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = terminate.recv() => {
            info!("SIGTERM received");
            Ok(())
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_stop() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Args::parse().into_config()?;
    let level = config
        .log_level
        .parse()
        .map_err(|_| format!("invalid log level {:?}", config.log_level))?;
    logging::init_logger(level, config.log_file.as_deref())?;

    let format = config.wav_format();
    info!(
        "Audio format: {} ch, {}-bit, {} Hz ({} bytes/s)",
        format.channels,
        format.bits_per_sample(),
        format.sample_rate,
        format.byte_rate()
    );
    if let Some(path) = &config.record {
        info!("Recording to {}", path.display());
    }
    if config.tone {
        info!(
            "Tone trigger above {} -> {}",
            config.tone_threshold,
            config.tone_output.display()
        );
    }

    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    let (shutdown, server_signal) = Shutdown::new();
    let ctx = Arc::new(SessionContext::new(config));
    info!("Display buffer holds {} samples", ctx.buffer.capacity());

    let monitor_task = ctx.config.monitor.then(|| {
        let mut monitor = Monitor::new(
            Arc::clone(&ctx.buffer),
            ctx.config.buffer_range(),
            ctx.config.tick(),
        )
        .with_status_line();
        if let Some(path) = &ctx.config.plot {
            monitor = monitor.with_plot(PlotTarget {
                path: path.clone(),
                width: ctx.config.plot_width,
                height: ctx.config.plot_height,
            });
        }
        tokio::spawn(monitor.run(shutdown.signal()))
    });

    let server = tokio::spawn(server::serve(listener, Arc::clone(&ctx), server_signal));

    wait_for_stop().await?;
    info!("Stopping the Digital Stethoscope...");
    shutdown.trigger();

    server.await??;
    if let Some(task) = monitor_task {
        if let Err(e) = task.await {
            warn!("monitor task failed: {}", e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::Args;

    #[test]
    fn command_is_named_after_package() {
        Args::command().debug_assert();
        assert_eq!(Args::command().get_name(), env!("CARGO_PKG_NAME"));
    }

    #[test]
    fn flags_override_defaults() {
        let config = Args::try_parse_from([
            "digital-stethoscope",
            "--sample-rate",
            "8000",
            "--tone",
            "--buffer-domain",
            "pcm",
        ])
        .unwrap()
        .into_config()
        .unwrap();
        assert_eq!(config.sample_rate, 8000);
        assert!(config.tone);
        assert_eq!(config.buffer_domain, crate::parse::Domain::Pcm);
    }

    #[test]
    fn overflowing_format_is_rejected_before_start() {
        let args = Args::try_parse_from(["digital-stethoscope", "--sample-rate", "4294967295"]).unwrap();
        assert!(args.into_config().is_err());
    }
}
