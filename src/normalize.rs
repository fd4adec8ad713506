//! Format normalisation: any backend payload in, canonical WAV out.
//!
//! The canonical format is fixed:
//!
//! | Property     | Value                |
//! |--------------|----------------------|
//! | Container    | RIFF/WAVE            |
//! | Channels     | 1 (mono)             |
//! | Sample rate  | 44 100 Hz            |
//! | Sample type  | 16-bit signed PCM    |
//!
//! Payloads already in that format are passed through byte for byte.
//! Everything else is decoded, downmixed, resampled, requantised and
//! re-encoded.  When no decoder is available for an encoding the normaliser
//! fails with [`NormalizeError::UnsupportedEncoding`] rather than emit a file
//! that only looks like a WAV.

use std::io::Cursor;

use thiserror::Error;

use crate::{
    backend::{AudioEncoding, RawAudio},
    resample::resample_mono,
};

// ─────────────────────────────────────────────────────────────────────────────
// Canonical spec
// ─────────────────────────────────────────────────────────────────────────────

/// The one audio format committed clips may have.
pub struct CanonicalAudioSpec;

impl CanonicalAudioSpec {
    pub const CHANNELS: u16 = 1;
    pub const SAMPLE_RATE: u32 = 44_100;
    pub const BITS_PER_SAMPLE: u16 = 16;

    pub fn wav_spec() -> hound::WavSpec {
        hound::WavSpec {
            channels: Self::CHANNELS,
            sample_rate: Self::SAMPLE_RATE,
            bits_per_sample: Self::BITS_PER_SAMPLE,
            sample_format: hound::SampleFormat::Int,
        }
    }

    pub fn matches(spec: &hound::WavSpec) -> bool {
        *spec == Self::wav_spec()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    /// No decoder for this encoding in the current build/configuration.
    #[error("no decoder available for {0} payloads")]
    UnsupportedEncoding(String),

    #[error("cannot decode {encoding} payload: {message}")]
    Decode { encoding: String, message: String },

    #[error("resampling failed: {0}")]
    Resample(String),

    #[error("WAV encoding failed: {0}")]
    Encode(String),
}

fn decode_err(encoding: &AudioEncoding, message: impl Into<String>) -> NormalizeError {
    NormalizeError::Decode {
        encoding: encoding.extension().to_string(),
        message: message.into(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoded PCM
// ─────────────────────────────────────────────────────────────────────────────

/// Interleaved float samples in [-1, 1].
struct Pcm {
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
}

impl Pcm {
    fn into_mono(self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples;
        }
        self.samples
            .chunks(self.channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    }
}

fn decode_wav(bytes: &[u8], encoding: &AudioEncoding) -> Result<Pcm, NormalizeError> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| decode_err(encoding, e.to_string()))?;
    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| decode_err(encoding, e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| decode_err(encoding, e.to_string()))?
        }
    };
    Ok(Pcm {
        samples,
        channels: spec.channels as usize,
        sample_rate: spec.sample_rate,
    })
}

fn decode_pcm16(bytes: &[u8], sample_rate: u32, channels: u16, encoding: &AudioEncoding) -> Result<Pcm, NormalizeError> {
    if sample_rate == 0 || channels == 0 {
        return Err(decode_err(encoding, "declared sample rate and channel count must be positive"));
    }
    if bytes.len() % 2 != 0 {
        return Err(decode_err(encoding, format!("odd byte count {}", bytes.len())));
    }
    let samples = bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32_768.0)
        .collect();
    Ok(Pcm { samples, channels: channels as usize, sample_rate })
}

#[cfg(feature = "mp3")]
fn decode_compressed(bytes: &[u8], encoding: &AudioEncoding) -> Result<Pcm, NormalizeError> {
    use symphonia::core::{
        audio::SampleBuffer,
        codecs::{DecoderOptions, CODEC_TYPE_NULL},
        errors::Error as SymphoniaError,
        formats::FormatOptions,
        io::MediaSourceStream,
        meta::MetadataOptions,
        probe::Hint,
    };

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    let mut hint = Hint::new();
    hint.with_extension(encoding.extension());

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| decode_err(encoding, e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| decode_err(encoding, "no audio track"))?;
    let track_id = track.id;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_err(encoding, e.to_string()))?;

    let mut samples = Vec::new();
    let mut layout: Option<(usize, u32)> = None;
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(decode_err(encoding, e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let this_layout = (spec.channels.count(), spec.rate);
                match layout {
                    None => layout = Some(this_layout),
                    Some(l) if l != this_layout => {
                        return Err(decode_err(encoding, "stream changes channel layout or rate"))
                    }
                    Some(_) => {}
                }
                let buf = sample_buf
                    .get_or_insert_with(|| SampleBuffer::new(decoded.capacity() as u64, spec));
                if buf.capacity() < decoded.capacity() * spec.channels.count() {
                    *buf = SampleBuffer::new(decoded.capacity() as u64, spec);
                }
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            // A damaged frame is dropped; the rest of the stream still decodes.
            Err(SymphoniaError::DecodeError(msg)) => {
                log::debug!("Skipping undecodable {} frame: {}", encoding.extension(), msg);
            }
            Err(e) => return Err(decode_err(encoding, e.to_string())),
        }
    }

    let (channels, sample_rate) = layout.ok_or_else(|| decode_err(encoding, "no audio frames"))?;
    Ok(Pcm { samples, channels, sample_rate })
}

#[cfg(not(feature = "mp3"))]
fn decode_compressed(_bytes: &[u8], encoding: &AudioEncoding) -> Result<Pcm, NormalizeError> {
    Err(NormalizeError::UnsupportedEncoding(encoding.extension().to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Encoding
// ─────────────────────────────────────────────────────────────────────────────

/// Float [-1, 1] → i16 with clipping.
fn quantize(sample: f32) -> i16 {
    (sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Serialise canonical samples into a WAV byte stream.
pub fn encode_canonical_wav(samples: &[i16]) -> Result<Vec<u8>, NormalizeError> {
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, CanonicalAudioSpec::wav_spec())
            .map_err(|e| NormalizeError::Encode(e.to_string()))?;
        for &s in samples {
            writer
                .write_sample(s)
                .map_err(|e| NormalizeError::Encode(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| NormalizeError::Encode(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}

/// True when `bytes` is a complete canonical WAV whose samples all read back.
fn is_intact_canonical_wav(bytes: &[u8]) -> bool {
    match hound::WavReader::new(Cursor::new(bytes)) {
        Ok(mut reader) if CanonicalAudioSpec::matches(&reader.spec()) => {
            reader.len() > 0 && reader.samples::<i16>().all(|s| s.is_ok())
        }
        _ => false,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Normalizer
// ─────────────────────────────────────────────────────────────────────────────

/// Converts [`RawAudio`] into canonical WAV bytes.
///
/// The result depends only on the payload and on which decoders are enabled.
#[derive(Debug, Clone)]
pub struct Normalizer {
    mp3: bool,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self { mp3: cfg!(feature = "mp3") }
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable MP3 decoding.  Enabling has no effect in builds
    /// without the `mp3` feature.
    pub fn with_mp3(mut self, enabled: bool) -> Self {
        self.mp3 = enabled && cfg!(feature = "mp3");
        self
    }

    /// Whether `encoding` can be converted at all.
    pub fn supports(&self, encoding: &AudioEncoding) -> bool {
        match encoding {
            AudioEncoding::Wav | AudioEncoding::Pcm16 { .. } => true,
            AudioEncoding::Mp3 => self.mp3,
            AudioEncoding::Other(_) => false,
        }
    }

    pub fn normalize(&self, raw: &RawAudio) -> Result<Vec<u8>, NormalizeError> {
        let encoding = &raw.encoding;
        if !self.supports(encoding) {
            return Err(NormalizeError::UnsupportedEncoding(encoding.extension().to_string()));
        }

        let pcm = match encoding {
            AudioEncoding::Wav => {
                if is_intact_canonical_wav(&raw.bytes) {
                    return Ok(raw.bytes.clone());
                }
                decode_wav(&raw.bytes, encoding)?
            }
            AudioEncoding::Pcm16 { sample_rate, channels } => {
                if *sample_rate == CanonicalAudioSpec::SAMPLE_RATE && *channels == 1 {
                    return self.wrap_canonical_pcm(&raw.bytes, encoding);
                }
                decode_pcm16(&raw.bytes, *sample_rate, *channels, encoding)?
            }
            AudioEncoding::Mp3 => decode_compressed(&raw.bytes, encoding)?,
            AudioEncoding::Other(name) => {
                return Err(NormalizeError::UnsupportedEncoding(name.clone()))
            }
        };

        if pcm.channels == 0 {
            return Err(decode_err(encoding, "zero channels"));
        }
        let sample_rate = pcm.sample_rate;
        let mono = pcm.into_mono();
        if mono.is_empty() {
            return Err(decode_err(encoding, "payload contains no audio"));
        }
        let resampled = resample_mono(&mono, sample_rate, CanonicalAudioSpec::SAMPLE_RATE)?;
        let quantized: Vec<i16> = resampled.into_iter().map(quantize).collect();
        encode_canonical_wav(&quantized)
    }

    /// Headerless 44.1 kHz mono s16le only needs a WAV header; no float
    /// round trip.
    fn wrap_canonical_pcm(&self, bytes: &[u8], encoding: &AudioEncoding) -> Result<Vec<u8>, NormalizeError> {
        if bytes.is_empty() {
            return Err(decode_err(encoding, "payload contains no audio"));
        }
        if bytes.len() % 2 != 0 {
            return Err(decode_err(encoding, format!("odd byte count {}", bytes.len())));
        }
        let samples: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        encode_canonical_wav(&samples)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(spec: hound::WavSpec, frames: usize) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut w = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames {
                for _ in 0..spec.channels {
                    let v = ((i as f32 * 0.05).sin() * 0.4 * 32_767.0) as i16;
                    match spec.sample_format {
                        hound::SampleFormat::Int => w.write_sample(v).unwrap(),
                        hound::SampleFormat::Float => w.write_sample(v as f32 / 32_768.0).unwrap(),
                    }
                }
            }
            w.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn assert_canonical(bytes: &[u8]) -> usize {
        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert!(CanonicalAudioSpec::matches(&reader.spec()), "spec: {:?}", reader.spec());
        reader.len() as usize
    }

    #[test]
    fn test_canonical_wav_passes_through() {
        let bytes = wav_bytes(CanonicalAudioSpec::wav_spec(), 4_410);
        let out = Normalizer::new().normalize(&RawAudio::new(bytes.clone(), AudioEncoding::Wav)).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn test_stereo_24k_wav_is_converted() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 24_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let out = Normalizer::new()
            .normalize(&RawAudio::new(wav_bytes(spec, 24_000), AudioEncoding::Wav))
            .unwrap();
        assert_eq!(assert_canonical(&out), 44_100);
    }

    #[test]
    fn test_float_wav_is_requantized() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let out = Normalizer::new()
            .normalize(&RawAudio::new(wav_bytes(spec, 1_000), AudioEncoding::Wav))
            .unwrap();
        assert_eq!(assert_canonical(&out), 1_000);
    }

    #[test]
    fn test_canonical_pcm_is_wrapped() {
        let pcm: Vec<u8> = [0i16, 1_000, -1_000, 32_767]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let raw = RawAudio::new(pcm, AudioEncoding::Pcm16 { sample_rate: 44_100, channels: 1 });
        let out = Normalizer::new().normalize(&raw).unwrap();
        let mut reader = hound::WavReader::new(Cursor::new(out)).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
        assert_eq!(samples, vec![0, 1_000, -1_000, 32_767]);
    }

    #[test]
    fn test_pcm_other_rate_is_resampled() {
        let pcm: Vec<u8> = (0..22_050i32)
            .flat_map(|i| (((i % 100) - 50) as i16 * 100).to_le_bytes())
            .collect();
        let raw = RawAudio::new(pcm, AudioEncoding::Pcm16 { sample_rate: 22_050, channels: 1 });
        let out = Normalizer::new().normalize(&raw).unwrap();
        assert_eq!(assert_canonical(&out), 44_100);
    }

    #[test]
    fn test_odd_pcm_rejected() {
        let raw = RawAudio::new(vec![1, 2, 3], AudioEncoding::Pcm16 { sample_rate: 44_100, channels: 1 });
        assert!(matches!(Normalizer::new().normalize(&raw), Err(NormalizeError::Decode { .. })));
    }

    #[test]
    fn test_mp3_without_decoder_is_unsupported() {
        let raw = RawAudio::new(vec![0xFF, 0xFB, 0x90, 0x00], AudioEncoding::Mp3);
        assert_eq!(
            Normalizer::new().with_mp3(false).normalize(&raw),
            Err(NormalizeError::UnsupportedEncoding("mp3".into()))
        );
    }

    #[test]
    fn test_unknown_encoding_is_unsupported() {
        let raw = RawAudio::new(vec![1, 2, 3, 4], AudioEncoding::Other("ogg".into()));
        assert!(!Normalizer::new().supports(&raw.encoding));
        assert_eq!(
            Normalizer::new().normalize(&raw),
            Err(NormalizeError::UnsupportedEncoding("ogg".into()))
        );
    }

    #[cfg(feature = "mp3")]
    #[test]
    fn test_garbage_mp3_fails_to_decode() {
        let raw = RawAudio::new(b"definitely not audio".to_vec(), AudioEncoding::Mp3);
        assert!(matches!(Normalizer::new().normalize(&raw), Err(NormalizeError::Decode { .. })));
    }

    #[test]
    fn test_truncated_wav_is_not_passed_through() {
        let mut bytes = wav_bytes(CanonicalAudioSpec::wav_spec(), 4_410);
        bytes.truncate(bytes.len() - 101);
        let result = Normalizer::new().normalize(&RawAudio::new(bytes, AudioEncoding::Wav));
        assert!(matches!(result, Err(NormalizeError::Decode { .. })));
    }

    #[test]
    fn test_quantize_clips() {
        assert_eq!(quantize(2.0), i16::MAX);
        assert_eq!(quantize(-2.0), i16::MIN);
        assert_eq!(quantize(0.0), 0);
    }

    #[test]
    fn test_deterministic() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let raw = RawAudio::new(wav_bytes(spec, 4_800), AudioEncoding::Wav);
        let n = Normalizer::new();
        assert_eq!(n.normalize(&raw).unwrap(), n.normalize(&raw).unwrap());
    }
}
