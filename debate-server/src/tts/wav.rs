//! Silent WAV payload used when local synthesis fails.

use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;

pub const SILENCE_SAMPLE_RATE: u32 = 22_050;
pub const SILENCE_SECONDS: f32 = 1.0;

/// Mono 16-bit PCM silence of `SILENCE_SECONDS` at `SILENCE_SAMPLE_RATE`.
pub fn silent_wav() -> Result<Vec<u8>, hound::Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: SILENCE_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let samples = (SILENCE_SAMPLE_RATE as f32 * SILENCE_SECONDS) as u32;

    let mut buffer = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut buffer, spec)?;
        for _ in 0..samples {
            writer.write_sample(0i16)?;
        }
        writer.finalize()?;
    }
    Ok(buffer.into_inner())
}
