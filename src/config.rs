//! Run configuration.
//!
//! Values are layered, lowest precedence first:
//!
//! 1. built-in defaults ([`GeneratorConfig::default`]),
//! 2. an optional JSON config file ([`GeneratorConfig::from_file`]),
//! 3. process environment ([`GeneratorConfig::apply_env`]),
//! 4. command-line flags (applied by the binary).
//!
//! | Variable            | Field            |
//! |---------------------|------------------|
//! | `TTS_BACKEND`       | `backend`        |
//! | `TTS_API_KEY`       | `api_key`        |
//! | `TTS_VOICE`         | `voice_hint`     |
//! | `TTS_BATCH_SIZE`    | `batch_size`     |
//! | `TTS_PAUSE_SECONDS` | `pause_seconds`  |
//! | `TTS_OUTPUT_DIR`    | `output_dir`     |
//! | `TTS_MAX_RETRIES`   | `max_retries`    |

use std::{path::{Path, PathBuf}, time::Duration};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::backend::BackendKind;

fn default_batch_size() -> usize {
    10
}

fn default_pause_seconds() -> f64 {
    2.0
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("Audio/sentences")
}

fn default_language() -> String {
    "en".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retry_backoff_ms() -> u64 {
    1_000
}

/// Everything a run needs besides the manifest itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Which backend synthesises the clips.
    #[serde(default)]
    pub backend: BackendKind,

    /// Credential for the cloud backends.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Advisory voice identifier; each backend has its own default.
    #[serde(default)]
    pub voice_hint: Option<String>,

    /// Entries processed between pacing pauses.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Length of each pacing pause.
    #[serde(default = "default_pause_seconds")]
    pub pause_seconds: f64,

    /// Root that manifest `outputFile` paths are resolved against.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Language code for backends that take one (`gtts`).
    #[serde(default = "default_language")]
    pub language: String,

    /// Base URL override, e.g. a proxy or a regional endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// HTTP request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra attempts for retryable backend errors.  0 keeps the plain
    /// one-shot policy.
    #[serde(default)]
    pub max_retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Keep payloads the normaliser cannot convert, under their own extension.
    #[serde(default)]
    pub raw_fallback: bool,

    /// Treat all-silent placeholder WAVs as missing.
    #[serde(default)]
    pub replace_silent: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            api_key: None,
            voice_hint: None,
            batch_size: default_batch_size(),
            pause_seconds: default_pause_seconds(),
            output_dir: default_output_dir(),
            language: default_language(),
            endpoint: None,
            timeout_secs: default_timeout_secs(),
            max_retries: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
            raw_fallback: false,
            replace_silent: false,
        }
    }
}

impl GeneratorConfig {
    /// Read a JSON config file.  Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Cannot read config: {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Overlay values from an arbitrary variable lookup.
    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("TTS_BACKEND") {
            self.backend = v.parse().with_context(|| format!("TTS_BACKEND={v}"))?;
        }
        if let Some(v) = get("TTS_API_KEY") {
            self.api_key = Some(v);
        }
        if let Some(v) = get("TTS_VOICE") {
            self.voice_hint = Some(v);
        }
        if let Some(v) = get("TTS_BATCH_SIZE") {
            self.batch_size = v
                .trim()
                .parse()
                .with_context(|| format!("TTS_BATCH_SIZE is not an integer: {v:?}"))?;
        }
        if let Some(v) = get("TTS_PAUSE_SECONDS") {
            self.pause_seconds = v
                .trim()
                .parse()
                .with_context(|| format!("TTS_PAUSE_SECONDS is not a number: {v:?}"))?;
        }
        if let Some(v) = get("TTS_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = get("TTS_MAX_RETRIES") {
            self.max_retries = v
                .trim()
                .parse()
                .with_context(|| format!("TTS_MAX_RETRIES is not an integer: {v:?}"))?;
        }
        Ok(())
    }

    /// Reject values the pacer and HTTP clients cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch_size must be a positive integer");
        }
        if self.pause_seconds < 0.0 || Duration::try_from_secs_f64(self.pause_seconds).is_err() {
            bail!("pause_seconds must be a non-negative number of seconds, got {}", self.pause_seconds);
        }
        if self.timeout_secs == 0 {
            bail!("timeout_secs must be positive");
        }
        Ok(())
    }

    pub fn pause(&self) -> Duration {
        Duration::try_from_secs_f64(self.pause_seconds.max(0.0)).unwrap_or(Duration::MAX)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// The credential, if one was supplied and is not blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }
}
