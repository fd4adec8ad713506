//! Google Cloud Text-to-Speech.
//!
//! Uses the REST `text:synthesize` endpoint with an API key and asks for
//! `LINEAR16` at 44.1 kHz.  The base64 `audioContent` in the reply is a
//! complete WAV file.

use base64::Engine as _;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use super::{
    http, AudioEncoding, BackendError, BackendKind, BackendSettings, RawAudio, SpeechBackend,
};

const DEFAULT_BASE_URL: &str = "https://texttospeech.googleapis.com";
const DEFAULT_VOICE: &str = "en-US-Neural2-F";
const SAMPLE_RATE_HERTZ: u32 = 44_100;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesisBody<'a> {
    input: TextInput<'a>,
    voice: VoiceSelectionParams<'a>,
    audio_config: AudioConfig,
}

#[derive(Debug, Serialize)]
struct TextInput<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelectionParams<'a> {
    language_code: String,
    name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
    sample_rate_hertz: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesisResponse {
    audio_content: String,
}

/// Voice names look like `en-US-Neural2-F`; the language code is the first
/// two dash-separated parts.
fn language_code(voice: &str, fallback: &str) -> String {
    let mut parts = voice.splitn(3, '-');
    match (parts.next(), parts.next()) {
        (Some(lang), Some(region)) if lang.len() == 2 && region.len() == 2 => {
            format!("{lang}-{region}")
        }
        _ if fallback.contains('-') => fallback.to_string(),
        _ => "en-US".to_string(),
    }
}

fn decode_response(body: &[u8]) -> Result<Vec<u8>, BackendError> {
    let invalid = |message: String| BackendError::InvalidResponse {
        backend: BackendKind::Google,
        message,
    };
    let parsed: SynthesisResponse =
        serde_json::from_slice(body).map_err(|e| invalid(format!("bad JSON: {e}")))?;
    let audio = base64::engine::general_purpose::STANDARD
        .decode(parsed.audio_content.trim())
        .map_err(|e| invalid(format!("bad base64 audioContent: {e}")))?;
    if audio.is_empty() {
        return Err(invalid("empty audioContent".into()));
    }
    Ok(audio)
}

pub struct GoogleCloudBackend {
    settings: BackendSettings,
    api_key: String,
    client: Client,
}

impl GoogleCloudBackend {
    pub fn new(settings: BackendSettings) -> Result<Self, BackendError> {
        let api_key = settings.require_key(BackendKind::Google)?.to_string();
        let client = http::build_client(BackendKind::Google, &settings)?;
        Ok(Self { settings, api_key, client })
    }

    fn url(&self) -> String {
        format!("{}/v1/text:synthesize", self.settings.base_url(DEFAULT_BASE_URL))
    }
}

impl SpeechBackend for GoogleCloudBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Google
    }

    fn synthesize(&self, text: &str, voice_hint: &str) -> Result<RawAudio, BackendError> {
        let voice = match voice_hint.trim() {
            "" => DEFAULT_VOICE,
            v => v,
        };
        let body = SynthesisBody {
            input: TextInput { text },
            voice: VoiceSelectionParams {
                language_code: language_code(voice, &self.settings.language),
                name: voice,
            },
            audio_config: AudioConfig {
                audio_encoding: "LINEAR16",
                sample_rate_hertz: SAMPLE_RATE_HERTZ,
            },
        };
        let request = self
            .client
            .post(self.url())
            .header("X-Goog-Api-Key", &self.api_key)
            .json(&body);

        let reply = http::send(BackendKind::Google, request)?;
        Ok(RawAudio::new(decode_response(&reply)?, AudioEncoding::Wav))
    }
}
