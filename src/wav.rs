//! Samples → WAV output (hound)
//!
//! Two modes: [`WavSink`] streams samples of unknown total length and lets
//! hound back-patch the RIFF/data sizes on close; [`write_wav`] renders a
//! complete file in memory so the header is written once with its final size.

use std::fs::File;
use std::io::{BufWriter, Cursor};
use std::path::{Path, PathBuf};

use crate::error::SinkError;
use crate::parse::{Sample, SampleRange};

/// Channel layout, sample width and rate of an uncompressed PCM file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WavFormat {
    pub channels: u16,
    pub sample_width_bytes: u16,
    pub sample_rate: u32,
}

impl Default for WavFormat {
    fn default() -> Self {
        Self {
            channels: 1,
            sample_width_bytes: 2,
            sample_rate: 44_100,
        }
    }
}

impl WavFormat {
    pub fn bits_per_sample(&self) -> u16 {
        self.sample_width_bytes * 8
    }

    pub fn block_align(&self) -> u16 {
        self.channels * self.sample_width_bytes
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }

    /// Signed range representable at this sample width.
    pub fn sample_bounds(&self) -> SampleRange {
        let bits = u32::from(self.bits_per_sample()).clamp(1, 32);
        let max = (1i64 << (bits - 1)) - 1;
        let min = -(1i64 << (bits - 1));
        SampleRange::new(min as Sample, max as Sample)
    }

    fn spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample(),
            sample_format: hound::SampleFormat::Int,
        }
    }
}

/// Write every sample once per channel, saturated to the sample width.
fn write_frames<W>(
    writer: &mut hound::WavWriter<W>,
    format: &WavFormat,
    samples: &[Sample],
) -> Result<(), hound::Error>
where
    W: std::io::Write + std::io::Seek,
{
    let bounds = format.sample_bounds();
    for &s in samples {
        let s = bounds.clamp(s as i64);
        for _ in 0..format.channels {
            writer.write_sample(s)?;
        }
    }
    Ok(())
}

/// Streaming write handle. Owned by exactly one session.
///
/// Dropping an unclosed sink still finalizes the header (hound patches sizes
/// on drop), but only [`WavSink::close`] reports failures.
pub struct WavSink {
    path: PathBuf,
    format: WavFormat,
    writer: hound::WavWriter<BufWriter<File>>,
    frames: u64,
}

impl WavSink {
    /// Create (or truncate) `path` and write a provisional header.
    pub fn open(path: &Path, format: WavFormat) -> Result<Self, SinkError> {
        let writer =
            hound::WavWriter::create(path, format.spec()).map_err(|e| SinkError::wav(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            format,
            writer,
            frames: 0,
        })
    }

    pub fn write(&mut self, samples: &[Sample]) -> Result<(), SinkError> {
        write_frames(&mut self.writer, &self.format, samples)
            .map_err(|e| SinkError::wav(&self.path, e))?;
        self.frames += samples.len() as u64;
        Ok(())
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Patch the header with the final sizes and flush. Returns frames written.
    pub fn close(self) -> Result<u64, SinkError> {
        let frames = self.frames;
        self.writer
            .finalize()
            .map_err(|e| SinkError::wav(&self.path, e))?;
        Ok(frames)
    }
}

/// Write a complete file whose frame count is known up front.
/// Replaces any existing file at `path`.
pub fn write_wav(path: &Path, format: WavFormat, samples: &[Sample]) -> Result<(), SinkError> {
    let mut bytes = Cursor::new(Vec::with_capacity(
        44 + samples.len() * format.block_align() as usize,
    ));
    {
        let mut writer =
            hound::WavWriter::new(&mut bytes, format.spec()).map_err(|e| SinkError::wav(path, e))?;
        write_frames(&mut writer, &format, samples).map_err(|e| SinkError::wav(path, e))?;
        writer.finalize().map_err(|e| SinkError::wav(path, e))?;
    }
    std::fs::write(path, bytes.into_inner()).map_err(|e| SinkError::io(path, e))
}
