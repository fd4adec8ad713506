//! Free Google Translate speech endpoint (what the `gTTS` tool wraps).
//!
//! No credential is needed.  The endpoint accepts at most
//! [`MAX_CHUNK_CHARS`] characters per request, so longer text is split into
//! sentence/word chunks whose MP3 replies are concatenated.  MPEG frames are
//! self-delimiting, so the joined payload decodes as one stream.

use reqwest::blocking::Client;

use super::{
    http, AudioEncoding, BackendError, BackendKind, BackendSettings, RawAudio, SpeechBackend,
};

const DEFAULT_BASE_URL: &str = "https://translate.google.com";

/// Per-request character limit of the translate endpoint.
pub const MAX_CHUNK_CHARS: usize = 100;

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Sentences (terminated by `.`, `!` or `?`, punctuation kept) are packed
/// whole when they fit; longer ones are packed word by word, and a single
/// word longer than the limit is cut on character boundaries.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    for sentence in text.split_inclusive(['.', '!', '?']) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }
        if sentence.chars().count() <= max_chars {
            chunks.push(sentence.to_string());
            continue;
        }
        let mut current = String::new();
        for word in sentence.split_whitespace() {
            let word_len = word.chars().count();
            let current_len = current.chars().count();
            if !current.is_empty() && current_len + 1 + word_len > max_chars {
                chunks.push(std::mem::take(&mut current));
            }
            if word_len > max_chars {
                let chars: Vec<char> = word.chars().collect();
                for piece in chars.chunks(max_chars) {
                    chunks.push(piece.iter().collect());
                }
                continue;
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        if !current.is_empty() {
            chunks.push(current);
        }
    }
    chunks
}

pub struct GttsBackend {
    settings: BackendSettings,
    client: Client,
}

impl GttsBackend {
    pub fn new(settings: BackendSettings) -> Result<Self, BackendError> {
        let client = http::build_client(BackendKind::Gtts, &settings)?;
        Ok(Self { settings, client })
    }

    fn fetch_chunk(&self, chunk: &str, index: usize, total: usize) -> Result<Vec<u8>, BackendError> {
        let url = format!("{}/translate_tts", self.settings.base_url(DEFAULT_BASE_URL));
        let index = index.to_string();
        let total = total.to_string();
        let textlen = chunk.chars().count().to_string();
        let request = self.client.get(url).query(&[
            ("ie", "UTF-8"),
            ("q", chunk),
            ("tl", self.settings.language.as_str()),
            ("client", "tw-ob"),
            ("idx", index.as_str()),
            ("total", total.as_str()),
            ("textlen", textlen.as_str()),
        ]);
        http::send(BackendKind::Gtts, request)
    }
}

impl SpeechBackend for GttsBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gtts
    }

    /// The translate endpoint has a single voice per language; the hint is
    /// ignored.
    fn synthesize(&self, text: &str, _voice_hint: &str) -> Result<RawAudio, BackendError> {
        let chunks = chunk_text(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(BackendError::InvalidInput {
                backend: BackendKind::Gtts,
                message: "no speakable text".into(),
            });
        }
        let mut mp3 = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            mp3.extend(self.fetch_chunk(chunk, i, chunks.len())?);
        }
        Ok(RawAudio::new(mp3, AudioEncoding::Mp3))
    }
}
