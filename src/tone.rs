//! Threshold-triggered sine burst ("heartbeat") written as a WAV file.

use std::f64::consts::TAU;
use std::path::PathBuf;

use log::{debug, info};
use tokio::sync::Mutex;

use crate::error::SinkError;
use crate::parse::Sample;
use crate::wav::{write_wav, WavFormat};

/// Pure sine of `floor(sample_rate * duration_seconds)` samples, each rounded
/// to the nearest integer.
pub fn generate(
    trigger_sample: Sample,
    duration_seconds: f64,
    frequency_hz: f64,
    sample_rate: u32,
    amplitude: Sample,
) -> Vec<Sample> {
    let count = (sample_rate as f64 * duration_seconds).max(0.0) as usize;
    debug!(
        "synthesizing {} samples at {} Hz for trigger {}",
        count, frequency_hz, trigger_sample
    );
    let step = TAU * frequency_hz / sample_rate as f64;
    (0..count)
        .map(|i| (amplitude as f64 * (step * i as f64).sin()).round() as Sample)
        .collect()
}

/// Tone parameters taken from config.
#[derive(Clone, Debug, PartialEq)]
pub struct ToneParams {
    pub threshold: Sample,
    pub duration_seconds: f64,
    pub frequency_hz: f64,
    pub amplitude: Sample,
}

/// Fires a tone into a fixed output path when a sample exceeds the threshold.
///
/// Shared by every session; the lock is held from generation until the file
/// is closed, so concurrent triggers never interleave writes to `path`.
pub struct ToneTrigger {
    params: ToneParams,
    format: WavFormat,
    path: PathBuf,
    lock: Mutex<()>,
}

impl ToneTrigger {
    pub fn new(params: ToneParams, format: WavFormat, path: PathBuf) -> Self {
        Self {
            params,
            format,
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn fires_on(&self, sample: Sample) -> bool {
        sample > self.params.threshold
    }

    /// Generate and write one tone. Returns the number of frames written.
    pub async fn fire(&self, trigger_sample: Sample) -> Result<u64, SinkError> {
        let _guard = self.lock.lock().await;
        let samples = generate(
            trigger_sample,
            self.params.duration_seconds,
            self.params.frequency_hz,
            self.format.sample_rate,
            self.params.amplitude,
        );
        let frames = samples.len() as u64;
        let path = self.path.clone();
        let format = self.format;
        tokio::task::spawn_blocking(move || write_wav(&path, format, &samples))
            .await
            .map_err(|e| SinkError::io(&self.path, std::io::Error::other(e)))??;
        info!("Heartbeat audio saved as {}", self.path.display());
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rustfft::num_complex::Complex;
    use rustfft::FftPlanner;

    use super::{generate, ToneParams, ToneTrigger};
    use crate::wav::WavFormat;

    fn params() -> ToneParams {
        ToneParams {
            threshold: 500,
            duration_seconds: 1.0,
            frequency_hz: 100.0,
            amplitude: 32767,
        }
    }

    #[test]
    fn one_second_at_44100_is_44100_samples() {
        assert_eq!(generate(600, 1.0, 100.0, 44_100, 32767).len(), 44_100);
        assert_eq!(generate(600, 0.5, 100.0, 8_000, 32767).len(), 4_000);
        assert!(generate(600, 0.0, 100.0, 44_100, 32767).is_empty());
    }

    #[test]
    fn samples_stay_within_amplitude_and_start_at_zero() {
        let tone = generate(600, 0.1, 100.0, 44_100, 32767);
        assert_eq!(tone[0], 0);
        assert!(tone.iter().all(|s| s.abs() <= 32767));
        // quarter period of 100 Hz at 44.1 kHz is sample 110.25; peak lands next to it
        assert!(tone[110] > 32700);
    }

    #[test]
    fn values_are_rounded_not_truncated() {
        // 100 * sin(π/4) = 70.71
        let tone = generate(0, 1.0, 1.0, 8, 100);
        assert_eq!(tone, vec![0, 71, 100, 71, 0, -71, -100, -71]);
    }

    #[test]
    fn dominant_frequency_is_requested_frequency() {
        // 4410 samples = 0.1 s → FFT bin spacing 10 Hz, so 100 Hz is bin 10
        let tone = generate(600, 0.1, 100.0, 44_100, 32767);
        let mut buffer: Vec<Complex<f64>> =
            tone.iter().map(|&s| Complex::new(s as f64, 0.0)).collect();
        FftPlanner::new().plan_fft_forward(buffer.len()).process(&mut buffer);
        let peak = buffer[..buffer.len() / 2]
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.norm().total_cmp(&b.1.norm()))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 10);
    }

    #[test]
    fn threshold_is_strictly_greater() {
        let dir = tempfile::tempdir().unwrap();
        let trigger = ToneTrigger::new(params(), WavFormat::default(), dir.path().join("t.wav"));
        assert!(trigger.fires_on(501));
        assert!(!trigger.fires_on(500));
    }

    #[tokio::test]
    async fn fire_writes_full_second() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heartbeat.wav");
        let trigger = ToneTrigger::new(params(), WavFormat::default(), path.clone());
        assert_eq!(trigger.fire(600).await.unwrap(), 44_100);

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.duration(), 44_100);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().bits_per_sample, 16);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_fires_leave_a_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heartbeat.wav");
        let trigger = Arc::new(ToneTrigger::new(
            params(),
            WavFormat::default(),
            path.clone(),
        ));

        let handles: Vec<_> = (0..6)
            .map(|n| {
                let trigger = Arc::clone(&trigger);
                tokio::spawn(async move { trigger.fire(600 + n).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.duration(), 44_100);
        assert_eq!(reader.samples::<i16>().count(), 44_100);
    }

    #[tokio::test]
    async fn fire_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("heartbeat.wav");
        let trigger = ToneTrigger::new(params(), WavFormat::default(), path);
        assert!(trigger.fire(700).await.is_err());
    }
}
