//! Mono sample-rate conversion with rubato.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use crate::normalize::NormalizeError;

/// Input frames handed to rubato per call.
const CHUNK_FRAMES: usize = 1024;

/// Resample mono `samples` from `from_rate` to `to_rate`.
///
/// The output has `round(len * to_rate / from_rate)` samples, with the
/// resampler's own delay removed so the clip is not shifted.
pub fn resample_mono(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, NormalizeError> {
    if from_rate == 0 || to_rate == 0 {
        return Err(NormalizeError::Resample(format!(
            "invalid sample rates {from_rate} -> {to_rate}"
        )));
    }
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, CHUNK_FRAMES, 1)
        .map_err(|e| NormalizeError::Resample(format!("cannot create resampler: {e}")))?;

    let expected = (samples.len() as f64 * ratio).round() as usize;
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(expected + delay + CHUNK_FRAMES);
    let mut pos = 0;

    // Keep feeding (zero padding once the input runs out) until the delayed
    // tail has been flushed.
    while output.len() < expected + delay {
        let needed = resampler.input_frames_next();
        let mut input = vec![vec![0.0f32; needed]];
        let available = samples.len().saturating_sub(pos).min(needed);
        input[0][..available].copy_from_slice(&samples[pos..pos + available]);
        pos += available;

        let produced = resampler
            .process(&input, None)
            .map_err(|e| NormalizeError::Resample(e.to_string()))?;
        if produced[0].is_empty() {
            break;
        }
        output.extend_from_slice(&produced[0]);
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, rate: u32, secs: f32) -> Vec<f32> {
        let n = (rate as f32 * secs) as usize;
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_same_rate_is_identity() {
        let s = sine(440.0, 44_100, 0.01);
        assert_eq!(resample_mono(&s, 44_100, 44_100).unwrap(), s);
    }

    #[test]
    fn test_upsample_length() {
        let s = sine(440.0, 24_000, 0.5);
        let out = resample_mono(&s, 24_000, 44_100).unwrap();
        assert_eq!(out.len(), (s.len() as f64 * 44_100.0 / 24_000.0).round() as usize);
    }

    #[test]
    fn test_downsample_length_and_range() {
        let s = sine(220.0, 48_000, 0.25);
        let out = resample_mono(&s, 48_000, 44_100).unwrap();
        assert_eq!(out.len(), 11_025);
        assert!(out.iter().all(|x| x.abs() <= 1.0));
    }

    #[test]
    fn test_deterministic() {
        let s = sine(330.0, 22_050, 0.2);
        assert_eq!(
            resample_mono(&s, 22_050, 44_100).unwrap(),
            resample_mono(&s, 22_050, 44_100).unwrap()
        );
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert!(resample_mono(&[0.0; 4], 0, 44_100).is_err());
    }
}
