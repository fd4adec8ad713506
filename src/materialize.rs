//! Output tree writer.
//!
//! Decides whether an entry still needs generating and commits finished
//! clips atomically: bytes go to a hidden temp file in the target directory
//! and are renamed into place only after they have been flushed.  A crash at
//! any point leaves either no file or the previous file at the target path.

use std::{
    fs::File,
    io::{self, BufReader, Write},
    path::{Path, PathBuf},
};

use crate::{manifest::ManifestEntry, normalize::CanonicalAudioSpec};

/// Extensions a degraded (unconverted) clip may be stored under.
const ALTERNATE_EXTENSIONS: &[&str] = &["mp3"];

/// State of an entry's output on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Existing {
    /// A canonical WAV is already in place.
    Complete(PathBuf),
    /// An unconverted alternate-extension clip is in place.
    Degraded(PathBuf),
    /// Nothing usable; the entry must be generated.
    Missing,
}

impl Existing {
    pub fn is_present(&self) -> bool {
        !matches!(self, Self::Missing)
    }
}

/// What [`check_wav`] found in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WavState {
    Canonical { silent: bool },
    Unusable,
}

/// Read `path` fully.  Wrong format, truncated data or an empty clip all
/// count as unusable.
fn check_wav(path: &Path) -> WavState {
    let Ok(file) = File::open(path) else {
        return WavState::Unusable;
    };
    let Ok(mut reader) = hound::WavReader::new(BufReader::new(file)) else {
        return WavState::Unusable;
    };
    if !CanonicalAudioSpec::matches(&reader.spec()) || reader.len() == 0 {
        return WavState::Unusable;
    }
    let mut silent = true;
    for sample in reader.samples::<i16>() {
        match sample {
            Ok(0) => {}
            Ok(_) => silent = false,
            Err(_) => return WavState::Unusable,
        }
    }
    WavState::Canonical { silent }
}

/// Writes entries under one output root.
#[derive(Debug, Clone)]
pub struct Materializer {
    root: PathBuf,
    accept_degraded: bool,
    replace_silent: bool,
}

impl Materializer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), accept_degraded: false, replace_silent: false }
    }

    /// Count alternate-extension clips as already generated.
    pub fn accept_degraded(mut self, yes: bool) -> Self {
        self.accept_degraded = yes;
        self
    }

    /// Treat all-zero placeholder WAVs as missing.
    pub fn replace_silent(mut self, yes: bool) -> Self {
        self.replace_silent = yes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute target of `entry`.
    pub fn target(&self, entry: &ManifestEntry) -> PathBuf {
        self.root.join(&entry.output_file)
    }

    /// Target with its extension swapped, for degraded clips.
    pub fn alternate_target(&self, entry: &ManifestEntry, extension: &str) -> PathBuf {
        self.target(entry).with_extension(extension)
    }

    /// Inspect what is on disk for `entry`.  No network, no writes.
    pub fn existing(&self, entry: &ManifestEntry) -> Existing {
        let target = self.target(entry);
        if target.is_file() {
            match check_wav(&target) {
                WavState::Canonical { silent: true } if self.replace_silent => {
                    log::debug!("{} is a silent placeholder", target.display());
                }
                WavState::Canonical { .. } => return Existing::Complete(target),
                WavState::Unusable => {
                    log::warn!("{} is corrupt or non-canonical; regenerating", target.display());
                }
            }
        }
        if self.accept_degraded {
            for ext in ALTERNATE_EXTENSIONS {
                let alt = self.alternate_target(entry, ext);
                let non_empty = alt.metadata().map(|m| m.is_file() && m.len() > 0).unwrap_or(false);
                if non_empty {
                    return Existing::Degraded(alt);
                }
            }
        }
        Existing::Missing
    }

    /// Atomically write canonical WAV `bytes` to the entry's target.
    pub fn commit(&self, entry: &ManifestEntry, bytes: &[u8]) -> io::Result<PathBuf> {
        let target = self.target(entry);
        write_atomic(&target, bytes)?;
        Ok(target)
    }

    /// Atomically write an unconverted payload next to the target, under
    /// `extension`.  Never used for `.wav`.
    pub fn commit_degraded(&self, entry: &ManifestEntry, bytes: &[u8], extension: &str) -> io::Result<PathBuf> {
        if extension.eq_ignore_ascii_case("wav") {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "degraded clips cannot use the .wav extension",
            ));
        }
        let alt = self.alternate_target(entry, extension);
        write_atomic(&alt, bytes)?;

        // An unusable `.wav` left at the target would shadow the clip just written.
        let target = self.target(entry);
        if target.is_file() && !self.wav_is_complete(&target) {
            log::warn!("Removing unusable {}", target.display());
            std::fs::remove_file(&target)?;
        }
        Ok(alt)
    }

    fn wav_is_complete(&self, path: &Path) -> bool {
        match check_wav(path) {
            WavState::Canonical { silent } => !(silent && self.replace_silent),
            WavState::Unusable => false,
        }
    }
}

/// Write `bytes` to a temp file beside `target`, fsync, then rename over
/// `target`.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(".part")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}
