//! # ttsgen
//!
//! Resumable batch text-to-speech generation: turns a manifest of short
//! sentences into one canonical WAV clip per entry, using one of several
//! cloud or free speech backends.
//!
//! ## Quick start
//!
//! ```no_run
//! use ttsgen::{BackendKind, GeneratorConfig};
//!
//! let mut config = GeneratorConfig { backend: BackendKind::Gtts, ..Default::default() };
//! config.apply_env().unwrap();
//!
//! let summary = ttsgen::generate(&config, std::path::Path::new("SENTENCES_AUDIO_BATCH.json"), None).unwrap();
//! println!("{summary}");
//! ```
//!
//! ## Output contract
//!
//! Every clip is a RIFF/WAVE file, PCM signed 16-bit little-endian, mono,
//! 44 100 Hz, stored at `output_dir/<outputFile>` (by default
//! `difficulty_{d}/{word}_sentence{n}.wav`).  A clip that already exists and
//! reads back as canonical audio is never regenerated, so a run can be
//! interrupted and restarted at any point.
//!
//! ## Pipeline
//! 1. **Manifest**: entries are loaded and validated (unique output paths).
//! 2. **Existence check**: usable outputs are skipped with no network call.
//! 3. **Backend**: the selected provider synthesises the sentence.
//! 4. **Normalise**: whatever came back is decoded, downmixed, resampled
//!    and re-encoded to the canonical WAV format.
//! 5. **Commit**: bytes are written to a temp file and renamed into place.
//! 6. **Pace**: after every `batch_size` entries the run pauses.
//! 7. **Summary**: generated / skipped / failed counts and failure details.

pub mod backend;
pub mod config;
pub mod manifest;
pub mod materialize;
pub mod normalize;
pub mod pacing;
pub mod pipeline;
pub mod resample;
pub mod summary;

// ─── Re-exports for convenience ─────────────────────────────────────────────

pub use backend::{create_backend, AudioEncoding, BackendError, BackendKind, RawAudio, SpeechBackend};
pub use config::GeneratorConfig;
pub use manifest::{Manifest, ManifestEntry, ManifestError};
pub use normalize::{CanonicalAudioSpec, NormalizeError, Normalizer};
pub use pipeline::{generate, GenerateError, Generator, Plan};
pub use summary::{FailureReason, GenerationOutcome, RunSummary};
