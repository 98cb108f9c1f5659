use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;

use crate::audio::source::{CHANNELS, SAMPLE_RATE};
use crate::error::{JarvisError, JarvisResult};

fn wav_spec() -> WavSpec {
    WavSpec {
        channels: CHANNELS,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Write mono 16 bit PCM samples as a WAV file
pub fn write_wav<P: AsRef<Path>>(path: P, samples: &[i16]) -> JarvisResult<()> {
    let mut writer = WavWriter::create(path.as_ref(), wav_spec())?;
    for sample in samples {
        writer.write_sample(*sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Read a mono 16 bit PCM WAV file back into samples
pub fn read_wav<P: AsRef<Path>>(path: P) -> JarvisResult<Vec<i16>> {
    let mut reader = WavReader::open(path.as_ref())?;
    let spec = reader.spec();
    if spec.channels != CHANNELS
        || spec.bits_per_sample != 16
        || spec.sample_format != SampleFormat::Int
    {
        return Err(JarvisError::FailedToDecodeAudioFile);
    }
    let samples: Result<Vec<i16>, _> = reader.samples::<i16>().collect();
    Ok(samples?)
}
