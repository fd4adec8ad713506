//! Run orchestration.
//!
//! A run moves through three states:
//!
//! 1. **Initializing**: configuration is validated and the backend is built,
//!    which checks its credential.  Then the manifest is loaded.  Any failure
//!    here is a [`GenerateError`] and nothing is processed.
//! 2. **Processing**: entries are handled one at a time, in manifest order:
//!    existence check, then (only if missing) backend call, normalisation and
//!    atomic commit.  Every entry yields exactly one [`GenerationOutcome`];
//!    a failed entry never stops the loop.
//! 3. **Finalized**: the accumulated outcomes become a read-only
//!    [`RunSummary`].
//!
//! Entries are independent and committed atomically, so an interrupted run
//! can simply be started again: it only fills the gaps.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use thiserror::Error;

use crate::{
    backend::{create_backend, BackendError, BackendKind, RawAudio, SpeechBackend},
    config::GeneratorConfig,
    manifest::{Manifest, ManifestEntry, ManifestError},
    materialize::{Existing, Materializer},
    normalize::{NormalizeError, Normalizer},
    pacing::{Clock, Pacer, RetryPolicy, SystemClock},
    summary::{FailureReason, GenerationOutcome, RunSummary, SummaryBuilder},
};

/// Entries between ETA progress lines.
const PROGRESS_EVERY: usize = 10;

/// Conditions that abort a run before any entry is processed.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{backend} requires an API key (set TTS_API_KEY or pass --api-key)")]
    MissingCredential { backend: BackendKind },

    #[error("cannot create output directory {path}: {source}")]
    OutputRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot set up backend: {0}")]
    Backend(BackendError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Initializing,
    Processing,
    Finalized,
}

/// What a run would do, computed without contacting the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub total: usize,
    pub existing: usize,
    /// Output files that would be generated, in manifest order.
    pub to_generate: Vec<String>,
    pub expected_pauses: usize,
}

impl Plan {
    fn compute(materializer: &Materializer, pacer: &Pacer, manifest: &Manifest) -> Self {
        let to_generate: Vec<String> = manifest
            .entries()
            .iter()
            .filter(|e| !materializer.existing(e).is_present())
            .map(|e| e.output_file.clone())
            .collect();
        Plan {
            total: manifest.len(),
            existing: manifest.len() - to_generate.len(),
            to_generate,
            expected_pauses: pacer.expected_pauses(manifest.len()),
        }
    }

    /// Plan straight from configuration.  No backend is built, so no
    /// credential is needed.
    pub fn from_config(config: &GeneratorConfig, manifest: &Manifest) -> Result<Self, GenerateError> {
        config
            .validate()
            .map_err(|e| GenerateError::Config(format!("{e:#}")))?;
        let materializer = Materializer::new(&config.output_dir)
            .accept_degraded(config.raw_fallback)
            .replace_silent(config.replace_silent);
        let pacer = Pacer::new(config.batch_size, config.pause());
        Ok(Self::compute(&materializer, &pacer, manifest))
    }
}

/// Drives one backend over manifests.
pub struct Generator {
    backend: Box<dyn SpeechBackend>,
    normalizer: Normalizer,
    materializer: Materializer,
    pacer: Pacer,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    voice_hint: String,
    raw_fallback: bool,
}

impl Generator {
    /// A generator with default pacing (10 entries / 2 s), no retries and
    /// the system clock.
    pub fn new(backend: Box<dyn SpeechBackend>, output_root: impl AsRef<Path>) -> Self {
        Self {
            backend,
            normalizer: Normalizer::new(),
            materializer: Materializer::new(output_root.as_ref()),
            pacer: Pacer::new(10, Duration::from_secs(2)),
            retry: RetryPolicy::none(),
            clock: Arc::new(SystemClock),
            voice_hint: String::new(),
            raw_fallback: false,
        }
    }

    /// Initialise from configuration: validates it and builds the selected
    /// backend, failing fast when its credential is missing.
    pub fn from_config(config: &GeneratorConfig) -> Result<Self, GenerateError> {
        log::debug!("Run state: {:?}", RunState::Initializing);
        config
            .validate()
            .map_err(|e| GenerateError::Config(format!("{e:#}")))?;
        let backend = create_backend(config).map_err(|e| match e {
            BackendError::AuthenticationMissing { backend } => GenerateError::MissingCredential { backend },
            other => GenerateError::Backend(other),
        })?;
        Ok(Self::new(backend, &config.output_dir)
            .with_pacer(Pacer::new(config.batch_size, config.pause()))
            .with_retry(RetryPolicy::new(config.max_retries, config.retry_backoff()))
            .with_voice_hint(config.voice_hint.clone().unwrap_or_default())
            .with_raw_fallback(config.raw_fallback)
            .with_replace_silent(config.replace_silent))
    }

    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_voice_hint(mut self, voice_hint: impl Into<String>) -> Self {
        self.voice_hint = voice_hint.into();
        self
    }

    /// Keep payloads that cannot be converted under their own extension
    /// instead of failing the entry.  Such clips are counted as degraded.
    pub fn with_raw_fallback(mut self, enabled: bool) -> Self {
        self.raw_fallback = enabled;
        self.materializer = self.materializer.accept_degraded(enabled);
        self
    }

    pub fn with_replace_silent(mut self, enabled: bool) -> Self {
        self.materializer = self.materializer.replace_silent(enabled);
        self
    }

    pub fn materializer(&self) -> &Materializer {
        &self.materializer
    }

    /// Make sure the output root exists and is a directory.
    pub fn prepare_output_root(&self) -> Result<(), GenerateError> {
        let root = self.materializer.root();
        std::fs::create_dir_all(root).map_err(|source| GenerateError::OutputRoot {
            path: root.to_path_buf(),
            source,
        })
    }

    /// Dry run: which entries are missing, without calling the backend.
    pub fn plan(&self, manifest: &Manifest) -> Plan {
        Plan::compute(&self.materializer, &self.pacer, manifest)
    }

    /// Process every entry of `manifest` and return the final summary.
    pub fn run(&self, manifest: &Manifest) -> RunSummary {
        let total = manifest.len();
        let started = self.clock.now();
        let mut summary = SummaryBuilder::new(self.backend.kind().as_str(), total);

        log::debug!("Run state: {:?}", RunState::Processing);
        log::info!(
            "Generating {} clips with {} into {}",
            total,
            self.backend.kind(),
            self.materializer.root().display()
        );

        for (i, entry) in manifest.entries().iter().enumerate() {
            let position = i + 1;
            let outcome = self.process_entry(entry, position, total);
            summary.record(entry, outcome);

            if position % PROGRESS_EVERY == 0 {
                self.report_progress(&summary, position, total, started);
            }
            if self.pacer.after_entry(position, total, self.clock.as_ref()) {
                summary.record_pause();
            }
        }

        let elapsed = self.clock.now().saturating_duration_since(started);
        log::debug!("Run state: {:?}", RunState::Finalized);
        summary.finish(elapsed)
    }

    fn process_entry(&self, entry: &ManifestEntry, position: usize, total: usize) -> GenerationOutcome {
        match self.materializer.existing(entry) {
            Existing::Complete(path) | Existing::Degraded(path) => {
                log::info!("[{position}/{total}] Skipping (exists): {}", entry.output_file);
                return GenerationOutcome::SkippedExisting { path };
            }
            Existing::Missing => {}
        }

        log::info!("[{position}/{total}] Generating: {}", entry.label());
        log::debug!("    Text: {}", entry.text);

        let outcome = match self.synthesize(entry) {
            Ok(raw) => self.normalize_and_commit(entry, raw),
            Err(e) => GenerationOutcome::Failed(e.into()),
        };
        match &outcome {
            GenerationOutcome::Generated { path, degraded: false } => {
                log::info!("    Saved: {}", path.display());
            }
            GenerationOutcome::Generated { path, degraded: true } => {
                log::warn!("    Saved UNCONVERTED clip (not canonical WAV): {}", path.display());
            }
            GenerationOutcome::Failed(reason) => {
                log::warn!("    Failed {}: {}", entry.output_file, reason);
            }
            GenerationOutcome::SkippedExisting { .. } => {}
        }
        outcome
    }

    /// Call the backend, re-trying retryable errors per the retry policy.
    fn synthesize(&self, entry: &ManifestEntry) -> Result<RawAudio, BackendError> {
        let mut attempt = 0;
        loop {
            match self.backend.synthesize(&entry.text, &self.voice_hint) {
                Ok(raw) => return Ok(raw),
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.delay(attempt);
                    log::warn!(
                        "    {} (retry {}/{} in {:.1}s)",
                        e,
                        attempt,
                        self.retry.max_retries,
                        delay.as_secs_f64()
                    );
                    self.clock.sleep(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn normalize_and_commit(&self, entry: &ManifestEntry, raw: RawAudio) -> GenerationOutcome {
        let io_failure = |path: &Path, e: std::io::Error| {
            GenerationOutcome::Failed(FailureReason::Io {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        };

        match self.normalizer.normalize(&raw) {
            Ok(wav) => match self.materializer.commit(entry, &wav) {
                Ok(path) => GenerationOutcome::Generated { path, degraded: false },
                Err(e) => io_failure(&self.materializer.target(entry), e),
            },
            Err(NormalizeError::UnsupportedEncoding(_)) if self.raw_fallback => {
                let ext = raw.encoding.extension();
                match self.materializer.commit_degraded(entry, &raw.bytes, ext) {
                    Ok(path) => GenerationOutcome::Generated { path, degraded: true },
                    Err(e) => io_failure(&self.materializer.alternate_target(entry, ext), e),
                }
            }
            Err(e) => GenerationOutcome::Failed(e.into()),
        }
    }

    fn report_progress(&self, summary: &SummaryBuilder, position: usize, total: usize, started: std::time::Instant) {
        let elapsed = self.clock.now().saturating_duration_since(started).as_secs_f64();
        let rate = if elapsed > 0.0 { position as f64 / elapsed } else { 0.0 };
        let remaining_min = if rate > 0.0 {
            (total - position) as f64 / rate / 60.0
        } else {
            0.0
        };
        log::info!(
            "[{position}/{total}] Generated: {} | Failed: {} | ETA: {remaining_min:.1} min",
            summary.generated(),
            summary.failed()
        );
    }
}

/// Full run from configuration: initialise (credential check first), load
/// the manifest, optionally restrict it to one difficulty tier, process.
pub fn generate(
    config: &GeneratorConfig,
    manifest_path: &Path,
    difficulty: Option<u32>,
) -> Result<RunSummary, GenerateError> {
    let generator = Generator::from_config(config)?;
    let mut manifest = Manifest::load(manifest_path)?;
    if let Some(tier) = difficulty {
        manifest = manifest.filter_difficulty(tier);
    }
    generator.prepare_output_root()?;
    Ok(generator.run(&manifest))
}
