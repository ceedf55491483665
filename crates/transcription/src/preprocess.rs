use biquad::{Biquad, Coefficients, DirectForm1, ToHertz, Type, Q_BUTTERWORTH_F32};
use rubato::{FftFixedIn, Resampler};
use tracing::{debug, warn};

use crate::audio::{self, WavAudio};

const TARGET_SAMPLE_RATE: u32 = 16_000;
const HIGH_PASS_HZ: f32 = 200.0;
const LOW_PASS_HZ: f32 = 3_000.0;
const PEAK_TARGET: f32 = 0.95;

/// Normalizes audio for recognition: 16 kHz mono, 200–3000 Hz band-pass,
/// peak loudness.
///
/// The preprocessor never fails a request: anything it cannot handle
/// (non-WAV container, decode error, resampler failure) is logged and the
/// original bytes pass through untouched.
pub struct AudioPreprocessor {
    enabled: bool,
}

impl AudioPreprocessor {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns processed WAV bytes, or the input unchanged when processing
    /// is disabled or impossible.
    pub fn process(&self, bytes: Vec<u8>) -> Vec<u8> {
        if !self.enabled {
            return bytes;
        }
        if !audio::is_wav(&bytes) {
            debug!("input is not a WAV container, passing through");
            return bytes;
        }

        match self.process_wav(&bytes) {
            Ok(processed) => processed,
            Err(reason) => {
                warn!(%reason, "audio preprocessing failed, passing original through");
                bytes
            }
        }
    }

    fn process_wav(&self, bytes: &[u8]) -> Result<Vec<u8>, String> {
        let decoded = audio::decode_wav(bytes).map_err(|e| e.to_string())?;
        if decoded.samples.is_empty() {
            return Err("empty audio".into());
        }

        let resampled = if decoded.sample_rate == TARGET_SAMPLE_RATE {
            decoded.samples
        } else {
            resample(&decoded.samples, decoded.sample_rate, TARGET_SAMPLE_RATE)?
        };

        let filtered = band_pass(&resampled, TARGET_SAMPLE_RATE)?;
        let normalized = normalize_peak(filtered);

        audio::encode_wav(&WavAudio {
            samples: normalized,
            sample_rate: TARGET_SAMPLE_RATE,
        })
        .map_err(|e| e.to_string())
    }
}

fn resample(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>, String> {
    let chunk = 1024usize;
    let mut resampler = FftFixedIn::<f32>::new(from as usize, to as usize, chunk, 1, 1)
        .map_err(|e| e.to_string())?;

    let mut output = Vec::with_capacity(samples.len() * to as usize / from as usize + chunk);
    let mut offset = 0usize;
    while offset < samples.len() {
        let remaining = &samples[offset..];
        let frame: Vec<f32> = if remaining.len() >= chunk {
            remaining[..chunk].to_vec()
        } else {
            let mut padded = remaining.to_vec();
            padded.resize(chunk, 0.0);
            padded
        };

        let result = resampler
            .process(&[frame], None)
            .map_err(|e| e.to_string())?;
        if let Some(channel) = result.into_iter().next() {
            if remaining.len() >= chunk {
                output.extend(channel);
            } else {
                // Keep only the part that corresponds to real input.
                let ratio = remaining.len() as f64 / chunk as f64;
                let take = (channel.len() as f64 * ratio) as usize;
                output.extend(&channel[..take.min(channel.len())]);
            }
        }
        offset += chunk;
    }

    Ok(output)
}

fn band_pass(samples: &[f32], sample_rate: u32) -> Result<Vec<f32>, String> {
    let high = Coefficients::<f32>::from_params(
        Type::HighPass,
        sample_rate.hz(),
        HIGH_PASS_HZ.hz(),
        Q_BUTTERWORTH_F32,
    )
    .map_err(|e| format!("high-pass init: {:?}", e))?;
    let low = Coefficients::<f32>::from_params(
        Type::LowPass,
        sample_rate.hz(),
        LOW_PASS_HZ.hz(),
        Q_BUTTERWORTH_F32,
    )
    .map_err(|e| format!("low-pass init: {:?}", e))?;

    let mut high_pass = DirectForm1::<f32>::new(high);
    let mut low_pass = DirectForm1::<f32>::new(low);

    Ok(samples
        .iter()
        .map(|s| low_pass.run(high_pass.run(*s)))
        .collect())
}

fn normalize_peak(samples: Vec<f32>) -> Vec<f32> {
    let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
    if peak < 1e-6 {
        return samples;
    }
    let scale = PEAK_TARGET / peak;
    samples.into_iter().map(|s| s * scale).collect()
}
