//! Text token → clamped sample.

use std::num::IntErrorKind;

use serde::Deserialize;

use crate::config::Config;
use crate::error::ParseError;

/// One instant of a waveform.
pub type Sample = i32;

/// Inclusive bounds a sample is saturated into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "[Sample; 2]")]
pub struct SampleRange {
    pub min: Sample,
    pub max: Sample,
}

impl SampleRange {
    /// Visualization domain.
    pub const DISPLAY: SampleRange = SampleRange { min: 0, max: 1000 };
    /// Signed 16-bit PCM domain.
    pub const PCM: SampleRange = SampleRange {
        min: i16::MIN as Sample,
        max: i16::MAX as Sample,
    };

    pub const fn new(min: Sample, max: Sample) -> Self {
        Self { min, max }
    }

    /// Saturate `value` into the range.
    pub fn clamp(&self, value: i64) -> Sample {
        value.clamp(self.min as i64, self.max as i64) as Sample
    }

    pub fn is_within(&self, outer: &SampleRange) -> bool {
        outer.min <= self.min && self.max <= outer.max
    }
}

impl From<[Sample; 2]> for SampleRange {
    fn from([min, max]: [Sample; 2]) -> Self {
        Self { min, max }
    }
}

/// Which range an inbound sample is destined for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    #[default]
    Display,
    Pcm,
}

/// Parse an integer token without clamping. Surrounding whitespace is ignored;
/// magnitudes beyond 64 bits saturate to the i64 bounds.
pub fn parse_raw(token: &str) -> Result<i64, ParseError> {
    let trimmed = token.trim();
    match trimmed.parse::<i64>() {
        Ok(v) => Ok(v),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => Ok(i64::MAX),
            IntErrorKind::NegOverflow => Ok(i64::MIN),
            _ => Err(ParseError::InvalidFormat(token.to_string())),
        },
    }
}

/// Parse `token` and saturate it into `range`.
pub fn parse_sample(token: &str, range: &SampleRange) -> Result<Sample, ParseError> {
    parse_raw(token).map(|v| range.clamp(v))
}

/// Parse `token` into the range `config` assigns to `domain`.
pub fn parse(token: &str, domain: Domain, config: &Config) -> Result<Sample, ParseError> {
    parse_sample(token, &config.range(domain))
}
