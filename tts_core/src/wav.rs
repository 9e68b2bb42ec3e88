use std::io::Cursor;
use std::path::Path;

use crate::error::SynthesisError;

/// Header facts about a validated WAV payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSummary {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    /// Sample frames (one sample per channel).
    pub frames: u32,
    pub data_bytes: u64,
}

impl WavSummary {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.frames as u64 * 1000 / self.sample_rate as u64
    }
}

fn mono_pcm16(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn to_i16(sample: f32) -> i16 {
    // Clamp and convert f32 [-1.0, 1.0] -> i16
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Write f32 samples as a 16-bit mono PCM WAV file.
pub fn write_samples(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), SynthesisError> {
    let mut writer = hound::WavWriter::create(path, mono_pcm16(sample_rate))
        .map_err(|e| SynthesisError::InvalidWav(format!("wav create err: {e}")))?;
    for &s in samples {
        writer
            .write_sample(to_i16(s))
            .map_err(|e| SynthesisError::InvalidWav(format!("wav sample err: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| SynthesisError::InvalidWav(format!("wav finalize err: {e}")))
}

/// In-memory WAV of `duration_ms` of silence. Always holds at least one frame.
pub fn silence(duration_ms: u32, sample_rate: u32) -> Result<Vec<u8>, SynthesisError> {
    let frames = ((duration_ms as u64 * sample_rate as u64) / 1000).max(1);

    // WAV header (44 bytes) + 2 bytes per sample
    let mut cursor = Cursor::new(Vec::<u8>::with_capacity(44 + frames as usize * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, mono_pcm16(sample_rate))
            .map_err(|e| SynthesisError::InvalidWav(format!("wav write err: {e}")))?;
        for _ in 0..frames {
            writer
                .write_sample(0i16)
                .map_err(|e| SynthesisError::InvalidWav(format!("wav sample err: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| SynthesisError::InvalidWav(format!("wav finalize err: {e}")))?;
    }
    Ok(cursor.into_inner())
}

/// Check that `bytes` is a RIFF/WAVE container with a non-empty data chunk.
pub fn inspect(bytes: &[u8]) -> Result<WavSummary, SynthesisError> {
    if bytes.is_empty() {
        return Err(SynthesisError::InvalidWav("output file is empty".to_string()));
    }
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| SynthesisError::InvalidWav(e.to_string()))?;
    let spec = reader.spec();
    let frames = reader.duration();
    if frames == 0 {
        return Err(SynthesisError::InvalidWav("data chunk is empty".to_string()));
    }
    Ok(WavSummary {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        bits_per_sample: spec.bits_per_sample,
        frames,
        data_bytes: reader.len() as u64 * (spec.bits_per_sample as u64 / 8),
    })
}
