//! Configuration for ingest, audio format, tone trigger and presentation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::parse::{Domain, Sample, SampleRange};
use crate::tone::ToneParams;
use crate::wav::WavFormat;

/// Application configuration. Every field has a default; a TOML file may
/// override any subset of them.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// WebSocket listen address.
    pub listen: String,
    /// Sample rate (Hz) of every written WAV file.
    pub sample_rate: u32,
    /// Channel count of written WAV files.
    pub channels: u16,
    /// Bytes per sample (1–4).
    pub sample_width_bytes: u16,
    /// Number of samples kept for display.
    pub buffer_capacity: usize,
    /// Visualization range.
    pub display_range: SampleRange,
    /// Persisted audio range.
    pub pcm_range: SampleRange,
    /// Range samples are clamped into before entering the ring buffer.
    pub buffer_domain: Domain,
    /// Zero the ring buffer whenever a session becomes active.
    pub reset_buffer_on_connect: bool,
    /// Stream every accepted sample into this WAV file.
    pub record: Option<PathBuf>,
    /// Emit a tone file when a buffered sample exceeds `tone_threshold`.
    pub tone: bool,
    pub tone_output: PathBuf,
    pub tone_threshold: Sample,
    pub tone_duration_seconds: f64,
    pub tone_frequency_hz: f64,
    pub tone_amplitude: Sample,
    /// Run the presentation tick (status line).
    pub monitor: bool,
    /// Presentation tick interval (ms).
    pub tick_ms: u64,
    /// Redraw the waveform into this PNG when the buffer changes.
    pub plot: Option<PathBuf>,
    pub plot_width: u32,
    pub plot_height: u32,
    /// One of error, warn, info, debug, trace.
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            sample_rate: 44_100,
            channels: 1,
            sample_width_bytes: 2,
            buffer_capacity: 1024,
            display_range: SampleRange::DISPLAY,
            pcm_range: SampleRange::PCM,
            buffer_domain: Domain::Display,
            reset_buffer_on_connect: false,
            record: None,
            tone: false,
            tone_output: PathBuf::from("heartbeat.wav"),
            tone_threshold: 500,
            tone_duration_seconds: 1.0,
            tone_frequency_hz: 100.0,
            tone_amplitude: i16::MAX as Sample,
            monitor: true,
            tick_ms: 50,
            plot: None,
            plot_width: 800,
            plot_height: 600,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load overrides from a TOML file on top of the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if self.sample_rate == 0 {
            return invalid("sample_rate must be positive".into());
        }
        if self.channels == 0 {
            return invalid("channels must be at least 1".into());
        }
        if !(1..=4).contains(&self.sample_width_bytes) {
            return invalid(format!(
                "sample_width_bytes must be 1-4, got {}",
                self.sample_width_bytes
            ));
        }
        let block_align = self.channels.checked_mul(self.sample_width_bytes);
        let byte_rate =
            block_align.and_then(|align| self.sample_rate.checked_mul(u32::from(align)));
        if byte_rate.is_none() {
            return invalid(format!(
                "{} channels x {} bytes at {} Hz does not fit a WAV header",
                self.channels, self.sample_width_bytes, self.sample_rate
            ));
        }
        if self.buffer_capacity == 0 {
            return invalid("buffer_capacity must be positive".into());
        }
        for (name, range) in [("display_range", self.display_range), ("pcm_range", self.pcm_range)] {
            if range.min > range.max {
                return invalid(format!("{} is inverted: [{}, {}]", name, range.min, range.max));
            }
        }
        let width_bounds = self.wav_format().sample_bounds();
        if !self.pcm_range.is_within(&width_bounds) {
            return invalid(format!(
                "pcm_range [{}, {}] exceeds {}-byte samples",
                self.pcm_range.min, self.pcm_range.max, self.sample_width_bytes
            ));
        }
        if !self.tone_duration_seconds.is_finite() || self.tone_duration_seconds < 0.0 {
            return invalid("tone_duration_seconds must be a finite, non-negative number".into());
        }
        if !self.tone_frequency_hz.is_finite() || self.tone_frequency_hz <= 0.0 {
            return invalid("tone_frequency_hz must be a finite, positive number".into());
        }
        if self.tick_ms == 0 {
            return invalid("tick_ms must be positive".into());
        }
        if self.plot_width < 2 || self.plot_height < 2 {
            return invalid("plot dimensions must be at least 2x2".into());
        }
        if self.log_level.parse::<log::LevelFilter>().is_err() {
            return invalid(format!("unknown log_level {:?}", self.log_level));
        }
        Ok(())
    }

    pub fn wav_format(&self) -> WavFormat {
        WavFormat {
            channels: self.channels,
            sample_width_bytes: self.sample_width_bytes,
            sample_rate: self.sample_rate,
        }
    }

    pub fn range(&self, domain: Domain) -> SampleRange {
        match domain {
            Domain::Display => self.display_range,
            Domain::Pcm => self.pcm_range,
        }
    }

    pub fn buffer_range(&self) -> SampleRange {
        self.range(self.buffer_domain)
    }

    pub fn tone_params(&self) -> ToneParams {
        ToneParams {
            threshold: self.tone_threshold,
            duration_seconds: self.tone_duration_seconds,
            frequency_hz: self.tone_frequency_hz,
            amplitude: self.tone_amplitude,
        }
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}
