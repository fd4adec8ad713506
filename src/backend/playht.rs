//! Play.ht placeholder.
//!
//! The variant can be selected and its credential is checked like any cloud
//! backend, but every call fails with [`BackendError::NotImplemented`] so the
//! run records clean per-entry failures instead of transient faults.

use super::{BackendError, BackendKind, BackendSettings, RawAudio, SpeechBackend};

pub struct PlayHtBackend;

impl PlayHtBackend {
    pub fn new(settings: BackendSettings) -> Result<Self, BackendError> {
        settings.require_key(BackendKind::Playht)?;
        Ok(Self)
    }
}

impl SpeechBackend for PlayHtBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Playht
    }

    fn synthesize(&self, _text: &str, _voice_hint: &str) -> Result<RawAudio, BackendError> {
        Err(BackendError::NotImplemented { backend: BackendKind::Playht })
    }
}
