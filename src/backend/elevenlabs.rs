//! ElevenLabs text-to-speech.
//!
//! `POST {base}/v1/text-to-speech/{voice_id}?output_format=pcm_44100`
//! with the key in the `xi-api-key` header.  Asking for `pcm_44100` gets
//! headerless 16-bit mono PCM at the canonical rate, so normalisation only
//! has to wrap it in a WAV header.

use reqwest::blocking::Client;
use serde::Serialize;

use super::{
    http, AudioEncoding, BackendError, BackendKind, BackendSettings, RawAudio, SpeechBackend,
};

const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";
const DEFAULT_VOICE: &str = "lisa";
const MODEL_ID: &str = "eleven_monolingual_v1";
const OUTPUT_FORMAT: &str = "pcm_44100";
const OUTPUT_SAMPLE_RATE: u32 = 44_100;

#[derive(Debug, Serialize)]
struct SynthesisBody<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self { stability: 0.5, similarity_boost: 0.75 }
    }
}

pub struct ElevenLabsBackend {
    settings: BackendSettings,
    api_key: String,
    client: Client,
}

impl ElevenLabsBackend {
    pub fn new(settings: BackendSettings) -> Result<Self, BackendError> {
        let api_key = settings.require_key(BackendKind::Elevenlabs)?.to_string();
        let client = http::build_client(BackendKind::Elevenlabs, &settings)?;
        Ok(Self { settings, api_key, client })
    }

    fn url(&self, voice_id: &str) -> String {
        format!(
            "{}/v1/text-to-speech/{}",
            self.settings.base_url(DEFAULT_BASE_URL),
            voice_id
        )
    }
}

impl SpeechBackend for ElevenLabsBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Elevenlabs
    }

    fn synthesize(&self, text: &str, voice_hint: &str) -> Result<RawAudio, BackendError> {
        let voice_id = match voice_hint.trim() {
            "" => DEFAULT_VOICE,
            v => v,
        };
        let body = SynthesisBody {
            text,
            model_id: MODEL_ID,
            voice_settings: VoiceSettings::default(),
        };
        let request = self
            .client
            .post(self.url(voice_id))
            .query(&[("output_format", OUTPUT_FORMAT)])
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/pcm")
            .json(&body);

        let bytes = http::send(BackendKind::Elevenlabs, request)?;
        Ok(RawAudio::new(
            bytes,
            AudioEncoding::Pcm16 { sample_rate: OUTPUT_SAMPLE_RATE, channels: 1 },
        ))
    }
}
