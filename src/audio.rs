use std::path::Path;

use anyhow::{anyhow, Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use rand::rngs::StdRng;
use rand::Rng;
use tracing::{info, instrument};

use crate::media::SAMPLE_RATE;

pub const CHANNELS: u16 = 1;
pub const BITS_PER_SAMPLE: u16 = 16;

pub fn sample_count(duration: u64) -> Result<u64> {
    (SAMPLE_RATE as u64)
        .checked_mul(duration)
        .ok_or_else(|| anyhow!("Duration of {} seconds is too long", duration))
}

pub fn random_samples(rng: &mut StdRng, count: u64) -> Vec<i16> {
    (0..count).map(|_| rng.gen::<i16>()).collect()
}

/// Write `SAMPLE_RATE * duration` uniform random samples as mono 16-bit WAV.
#[instrument(skip(rng))]
pub fn create_random_audio(duration: u64, path: &Path, rng: &mut StdRng) -> Result<u64> {
    let samples = random_samples(rng, sample_count(duration)?);

    let spec = WavSpec {
        channels: CHANNELS,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for &sample in &samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    info!(samples = samples.len(), "Wrote random audio to {}", path.display());
    Ok(samples.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::make_rng;
    use hound::WavReader;

    #[test]
    fn three_seconds_is_132300_mono_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.wav");
        let written = create_random_audio(3, &path, &mut make_rng(Some(11))).unwrap();
        assert_eq!(written, 132_300);

        let reader = WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_rate, 44_100);
        assert_eq!(spec.sample_format, SampleFormat::Int);
        assert_eq!(reader.len(), 132_300);
    }

    #[test]
    fn samples_cover_both_signs() {
        let samples = random_samples(&mut make_rng(Some(2)), 44_100);
        assert!(samples.iter().any(|&s| s < -16_000));
        assert!(samples.iter().any(|&s| s > 16_000));
    }

    #[test]
    fn same_seed_same_samples() {
        let a = random_samples(&mut make_rng(Some(4)), 1000);
        let b = random_samples(&mut make_rng(Some(4)), 1000);
        let c = random_samples(&mut make_rng(Some(5)), 1000);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn overlong_duration_is_an_error() {
        assert_eq!(sample_count(1).unwrap(), 44_100);
        assert!(sample_count(u64::MAX).is_err());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.wav");
        assert!(create_random_audio(u64::MAX, &path, &mut make_rng(Some(1))).is_err());
    }
}
