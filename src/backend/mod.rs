//! Speech backends.
//!
//! Every provider implements [`SpeechBackend`] and hands back a [`RawAudio`]
//! payload tagged with its encoding; turning that into a canonical WAV is
//! the normaliser's job, and writing it is the materialiser's.
//!
//! | Kind         | Credential | Payload                         |
//! |--------------|------------|---------------------------------|
//! | `elevenlabs` | API key    | PCM s16le, 44.1 kHz mono        |
//! | `google`     | API key    | WAV (LINEAR16, 44.1 kHz)        |
//! | `gtts`       | none       | MP3                             |
//! | `playht`     | API key    | not implemented, always fails   |

use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::GeneratorConfig;

mod error;
mod http;

pub mod elevenlabs;
pub mod google;
pub mod gtts;
pub mod playht;

pub use error::BackendError;
pub use elevenlabs::ElevenLabsBackend;
pub use google::GoogleCloudBackend;
pub use gtts::GttsBackend;
pub use playht::PlayHtBackend;

// ─────────────────────────────────────────────────────────────────────────────
// Raw payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Encoding a backend declares for its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioEncoding {
    /// A complete RIFF/WAVE file.
    Wav,
    /// Headerless little-endian signed 16-bit PCM.
    Pcm16 { sample_rate: u32, channels: u16 },
    /// MPEG layer III frames.
    Mp3,
    /// Anything else, named by its usual file extension.
    Other(String),
}

impl AudioEncoding {
    /// File extension used when a payload is kept without conversion.
    pub fn extension(&self) -> &str {
        match self {
            Self::Wav => "wav",
            Self::Pcm16 { .. } => "pcm",
            Self::Mp3 => "mp3",
            Self::Other(ext) => ext,
        }
    }
}

/// Opaque audio bytes plus their declared encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAudio {
    pub bytes: Vec<u8>,
    pub encoding: AudioEncoding,
}

impl RawAudio {
    pub fn new(bytes: Vec<u8>, encoding: AudioEncoding) -> Self {
        Self { bytes, encoding }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend kinds
// ─────────────────────────────────────────────────────────────────────────────

/// The closed set of backends a run can be configured with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// ElevenLabs (primary cloud provider).
    #[default]
    Elevenlabs,
    /// Google Cloud Text-to-Speech (secondary cloud provider).
    Google,
    /// Google Translate speech endpoint; free, no credential.
    Gtts,
    /// Play.ht; selectable but not integrated.
    Playht,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [Self::Elevenlabs, Self::Google, Self::Gtts, Self::Playht];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Elevenlabs => "elevenlabs",
            Self::Google => "google",
            Self::Gtts => "gtts",
            Self::Playht => "playht",
        }
    }

    /// Whether the backend refuses to start without `api_key`.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Gtts)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Elevenlabs => "ElevenLabs cloud TTS (primary)",
            Self::Google => "Google Cloud Text-to-Speech (secondary)",
            Self::Gtts => "Google Translate TTS, free, MP3 output",
            Self::Playht => "Play.ht (integration not implemented)",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a backend name is not one of [`BackendKind::ALL`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown backend '{0}' (expected one of: elevenlabs, google, gtts, playht)")]
pub struct UnknownBackend(pub String);

impl FromStr for BackendKind {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "elevenlabs" | "eleven" => Ok(Self::Elevenlabs),
            "google" | "google-cloud" => Ok(Self::Google),
            "gtts" | "free" => Ok(Self::Gtts),
            "playht" | "play.ht" => Ok(Self::Playht),
            _ => Err(UnknownBackend(s.to_string())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend trait
// ─────────────────────────────────────────────────────────────────────────────

/// A text-to-speech provider.
///
/// Implementations perform network I/O only; they never touch the output
/// tree.
pub trait SpeechBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Synthesise `text`.  `voice_hint` is advisory and may be empty, in
    /// which case the backend picks its own default voice.
    fn synthesize(&self, text: &str, voice_hint: &str) -> Result<RawAudio, BackendError>;
}

/// Connection settings shared by the HTTP backends.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub timeout: Duration,
    pub language: String,
}

impl BackendSettings {
    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self {
            api_key: config.api_key().map(str::to_string),
            endpoint: config.endpoint.clone(),
            timeout: config.timeout(),
            language: config.language.clone(),
        }
    }

    /// The API key, or [`BackendError::AuthenticationMissing`] for `kind`.
    pub(crate) fn require_key(&self, kind: BackendKind) -> Result<&str, BackendError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(BackendError::AuthenticationMissing { backend: kind })
    }

    /// Base URL with any trailing slash removed.
    pub(crate) fn base_url<'a>(&'a self, default: &'a str) -> &'a str {
        self.endpoint
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
    }
}

/// Build the backend selected in `config`.
///
/// Fails with [`BackendError::AuthenticationMissing`] when the backend needs
/// a credential that was not supplied.  This is the only credential check;
/// it runs once, before any entry is processed.
pub fn create_backend(config: &GeneratorConfig) -> Result<Box<dyn SpeechBackend>, BackendError> {
    let settings = BackendSettings::from_config(config);
    let backend: Box<dyn SpeechBackend> = match config.backend {
        BackendKind::Elevenlabs => Box::new(ElevenLabsBackend::new(settings)?),
        BackendKind::Google => Box::new(GoogleCloudBackend::new(settings)?),
        BackendKind::Gtts => Box::new(GttsBackend::new(settings)?),
        BackendKind::Playht => Box::new(PlayHtBackend::new(settings)?),
    };
    log::info!("Backend: {} ({})", config.backend, config.backend.description());
    Ok(backend)
}
