use std::io::Cursor;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("failed to decode WAV: {0}")]
    Decode(String),
    #[error("failed to encode WAV: {0}")]
    Encode(String),
}

/// Decoded mono audio.
#[derive(Debug, Clone)]
pub struct WavAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl WavAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Slice between two timestamps, clamped to the clip bounds.
    pub fn slice(&self, start_s: f64, end_s: f64) -> WavAudio {
        let start = ((start_s.max(0.0)) * self.sample_rate as f64) as usize;
        let end = ((end_s.max(0.0)) * self.sample_rate as f64) as usize;
        let start = start.min(self.samples.len());
        let end = end.clamp(start, self.samples.len());
        WavAudio {
            samples: self.samples[start..end].to_vec(),
            sample_rate: self.sample_rate,
        }
    }

    /// Keeps at most `max_secs` from the middle of the clip.
    pub fn central_trim(&self, max_secs: f64) -> WavAudio {
        let max_samples = (max_secs * self.sample_rate as f64) as usize;
        if self.samples.len() <= max_samples {
            return self.clone();
        }
        let start = (self.samples.len() - max_samples) / 2;
        WavAudio {
            samples: self.samples[start..start + max_samples].to_vec(),
            sample_rate: self.sample_rate,
        }
    }
}

/// Whether the buffer starts with a RIFF/WAVE header.
pub fn is_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// Decodes WAV bytes into mono f32 samples (channels averaged).
pub fn decode_wav(bytes: &[u8]) -> Result<WavAudio, AudioError> {
    let mut reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| AudioError::Decode(e.to_string()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| AudioError::Decode(e.to_string()))?,
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<Result<_, _>>()
                .map_err(|e| AudioError::Decode(e.to_string()))?
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok(WavAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Encodes mono f32 samples as 16-bit PCM WAV.
pub fn encode_wav(audio: &WavAudio) -> Result<Vec<u8>, AudioError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| AudioError::Encode(e.to_string()))?;
        for sample in &audio.samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer
                .write_sample(value)
                .map_err(|e| AudioError::Encode(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| AudioError::Encode(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}

/// Probes the duration of WAV bytes without keeping the samples.
pub fn wav_duration_secs(bytes: &[u8]) -> Result<f64, AudioError> {
    let reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| AudioError::Decode(e.to_string()))?;
    let spec = reader.spec();
    let frames = reader.duration() as f64;
    if spec.sample_rate == 0 {
        return Ok(0.0);
    }
    Ok(frames / spec.sample_rate as f64)
}
