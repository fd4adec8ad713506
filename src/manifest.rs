//! Sentence manifest: the read-only list of clips to synthesise.
//!
//! The manifest is a JSON document produced by the sentence builder:
//!
//! ```json
//! {
//!   "metadata": { "voice": "Lisa", "format": "WAV (44.1kHz, 16-bit, mono)" },
//!   "sentences": [
//!     { "difficulty": 1, "word": "cat", "sentenceNumber": 1,
//!       "text": "The cat is sleeping.", "outputFile": "difficulty_1/cat_sentence1.wav" }
//!   ]
//! }
//! ```
//!
//! Entries are validated once at load time; a manifest that fails validation
//! aborts the run before any backend is contacted.

use std::{
    collections::{HashMap, HashSet},
    path::{Component, Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Reasons a manifest cannot be used.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("cannot read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("manifest entry #{index} is invalid: {reason}")]
    Invalid { index: usize, reason: String },

    #[error("output file {output_file:?} is used by entries #{first} and #{second}")]
    DuplicateOutput {
        output_file: String,
        first: usize,
        second: usize,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Data model
// ─────────────────────────────────────────────────────────────────────────────

/// One clip to synthesise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// Difficulty tier, starting at 1.
    pub difficulty: u32,

    /// The word (or unit) this sentence belongs to.
    #[serde(rename = "word", alias = "key")]
    pub key: String,

    /// 1-based position among the sentences sharing `key`.
    #[serde(rename = "sentenceNumber", alias = "sequenceNumber", alias = "sequence")]
    pub sequence: u32,

    /// Text handed to the backend.
    pub text: String,

    /// Path of the finished clip, relative to the output root.
    #[serde(rename = "outputFile", alias = "outputPath")]
    pub output_file: String,
}

impl ManifestEntry {
    /// The layout the sentence builder uses:
    /// `difficulty_{d}/{key}_sentence{n}.wav`.
    pub fn canonical_output_path(difficulty: u32, key: &str, sequence: u32) -> String {
        format!("difficulty_{difficulty}/{key}_sentence{sequence}.wav")
    }

    /// Build an entry whose `output_file` follows [`canonical_output_path`](Self::canonical_output_path).
    pub fn new(difficulty: u32, key: impl Into<String>, sequence: u32, text: impl Into<String>) -> Self {
        let key = key.into();
        let output_file = Self::canonical_output_path(difficulty, &key, sequence);
        Self { difficulty, key, sequence, text: text.into(), output_file }
    }

    /// Short label used in logs and failure reports, e.g. `cat #2`.
    pub fn label(&self) -> String {
        format!("{} #{}", self.key, self.sequence)
    }

    fn check(&self) -> Result<(), String> {
        if self.difficulty == 0 {
            return Err("difficulty must be at least 1".into());
        }
        if self.key.trim().is_empty() {
            return Err("key is empty".into());
        }
        if self.sequence == 0 {
            return Err("sentenceNumber must be at least 1".into());
        }
        if self.text.trim().is_empty() {
            return Err("text is empty".into());
        }
        check_relative_path(&self.output_file)
    }
}

/// Output paths must stay inside the output root.
fn check_relative_path(raw: &str) -> Result<(), String> {
    if raw.trim().is_empty() {
        return Err("outputFile is empty".into());
    }
    let path = Path::new(raw);
    if path.file_name().is_none() {
        return Err(format!("outputFile {raw:?} has no file name"));
    }
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(format!("outputFile {raw:?} escapes the output directory"))
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(format!("outputFile {raw:?} must be relative"))
            }
        }
    }
    Ok(())
}

/// The file an output path actually names: `.` and empty segments dropped,
/// so `d1/./cat.wav` and `d1//cat.wav` collide with `d1/cat.wav`.
fn normalized_output(raw: &str) -> String {
    Path::new(raw)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Free-form metadata block written by the builder.  Carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ManifestDocument {
    #[serde(default)]
    metadata: ManifestMetadata,
    sentences: Vec<ManifestEntry>,
}

/// A validated, immutable, ordered list of entries.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    metadata: ManifestMetadata,
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Validate `entries` and wrap them.
    pub fn from_entries(entries: Vec<ManifestEntry>) -> Result<Self, ManifestError> {
        Self::build(ManifestMetadata::default(), entries)
    }

    /// Parse a manifest document from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        let doc: ManifestDocument = serde_json::from_str(json)?;
        Self::build(doc.metadata, doc.sentences)
    }

    /// Read and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let json = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest = Self::from_json(&json)?;
        log::debug!("Loaded {} manifest entries from {}", manifest.len(), path.display());
        Ok(manifest)
    }

    fn build(metadata: ManifestMetadata, entries: Vec<ManifestEntry>) -> Result<Self, ManifestError> {
        let mut seen: HashMap<String, usize> = HashMap::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            entry
                .check()
                .map_err(|reason| ManifestError::Invalid { index, reason })?;
            let target = normalized_output(&entry.output_file);
            if let Some(&first) = seen.get(&target) {
                return Err(ManifestError::DuplicateOutput {
                    output_file: entry.output_file.clone(),
                    first,
                    second: index,
                });
            }
            seen.insert(target, index);
        }
        Ok(Self { metadata, entries })
    }

    pub fn metadata(&self) -> &ManifestMetadata {
        &self.metadata
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keep only the entries of one difficulty tier.
    pub fn filter_difficulty(&self, difficulty: u32) -> Manifest {
        Manifest {
            metadata: self.metadata.clone(),
            entries: self
                .entries
                .iter()
                .filter(|e| e.difficulty == difficulty)
                .cloned()
                .collect(),
        }
    }

    /// Distinct difficulty tiers, ascending.
    pub fn difficulties(&self) -> Vec<u32> {
        let set: HashSet<u32> = self.entries.iter().map(|e| e.difficulty).collect();
        let mut tiers: Vec<u32> = set.into_iter().collect();
        tiers.sort_unstable();
        tiers
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
