//! Per-entry outcomes and the run summary they roll up into.

use std::{fmt, path::PathBuf, time::Duration};

use serde::Serialize;
use thiserror::Error;

use crate::{backend::BackendError, manifest::ManifestEntry, normalize::NormalizeError};

/// Why one entry failed.  None of these stop the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error("cannot write {path}: {message}")]
    Io { path: PathBuf, message: String },
}

impl FailureReason {
    /// Stable machine-readable category.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Backend(BackendError::NotImplemented { .. }) => "not_implemented",
            Self::Backend(BackendError::Provider { .. }) => "provider",
            Self::Backend(_) => "backend",
            Self::Normalize(NormalizeError::UnsupportedEncoding(_)) => "unsupported_encoding",
            Self::Normalize(_) => "normalize",
            Self::Io { .. } => "io",
        }
    }
}

/// Result of processing one entry.  Created once, never changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// A new clip was committed.  `degraded` clips were kept unconverted
    /// under a non-WAV extension.
    Generated { path: PathBuf, degraded: bool },
    /// Usable output was already on disk; nothing was called.
    SkippedExisting { path: PathBuf },
    Failed(FailureReason),
}

/// One failed entry, with enough context for a targeted re-run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub key: String,
    pub sequence: u32,
    pub output_file: String,
    pub kind: &'static str,
    pub reason: String,
}

/// Final, read-only account of a run.
///
/// `generated + skipped + failed == total` always holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub backend: String,
    pub total: usize,
    pub generated: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Subset of `generated` stored without conversion.
    pub degraded: usize,
    pub pauses: usize,
    pub elapsed_secs: f64,
    pub failures: Vec<FailureRecord>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn processed(&self) -> usize {
        self.generated + self.skipped + self.failed
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{rule}")?;
        writeln!(f, "Summary ({})", self.backend)?;
        writeln!(f, "  Generated: {}", self.generated)?;
        if self.degraded > 0 {
            writeln!(f, "    of which unconverted (non-WAV): {}", self.degraded)?;
        }
        writeln!(f, "  Skipped:   {}", self.skipped)?;
        writeln!(f, "  Failed:    {}", self.failed)?;
        writeln!(f, "  Total:     {}", self.total)?;
        writeln!(f, "  Time:      {:.1} min", self.elapsed_secs / 60.0)?;
        for failure in &self.failures {
            writeln!(
                f,
                "  ! {} #{} ({}): {}",
                failure.key, failure.sequence, failure.output_file, failure.reason
            )?;
        }
        write!(f, "{rule}")
    }
}

/// Accumulates outcomes while a run is processing.
#[derive(Debug)]
pub struct SummaryBuilder {
    backend: String,
    total: usize,
    generated: usize,
    skipped: usize,
    degraded: usize,
    pauses: usize,
    failures: Vec<FailureRecord>,
}

impl SummaryBuilder {
    pub fn new(backend: impl Into<String>, total: usize) -> Self {
        Self {
            backend: backend.into(),
            total,
            generated: 0,
            skipped: 0,
            degraded: 0,
            pauses: 0,
            failures: Vec::new(),
        }
    }

    pub fn record(&mut self, entry: &ManifestEntry, outcome: GenerationOutcome) {
        match outcome {
            GenerationOutcome::Generated { degraded, .. } => {
                self.generated += 1;
                if degraded {
                    self.degraded += 1;
                }
            }
            GenerationOutcome::SkippedExisting { .. } => self.skipped += 1,
            GenerationOutcome::Failed(reason) => self.failures.push(FailureRecord {
                key: entry.key.clone(),
                sequence: entry.sequence,
                output_file: entry.output_file.clone(),
                kind: reason.kind(),
                reason: reason.to_string(),
            }),
        }
    }

    pub fn record_pause(&mut self) {
        self.pauses += 1;
    }

    pub fn generated(&self) -> usize {
        self.generated
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn processed(&self) -> usize {
        self.generated + self.skipped + self.failures.len()
    }

    pub fn finish(self, elapsed: Duration) -> RunSummary {
        RunSummary {
            backend: self.backend,
            total: self.total,
            generated: self.generated,
            skipped: self.skipped,
            failed: self.failures.len(),
            degraded: self.degraded,
            pauses: self.pauses,
            elapsed_secs: elapsed.as_secs_f64(),
            failures: self.failures,
        }
    }
}
