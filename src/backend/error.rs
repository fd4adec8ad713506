//! Backend error taxonomy.

use thiserror::Error;

use super::BackendKind;

/// Why a backend could not produce audio.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The backend needs a credential that was not supplied.  Fatal for the
    /// whole run.
    #[error("{backend} requires an API key (set TTS_API_KEY or --api-key)")]
    AuthenticationMissing { backend: BackendKind },

    /// The provider answered with a non-success status.
    #[error("{backend} returned HTTP {status}: {message}")]
    Provider {
        backend: BackendKind,
        status: u16,
        message: String,
    },

    /// The request never got a response (DNS, connect, timeout, TLS).
    #[error("{backend} request failed: {message}")]
    Transport { backend: BackendKind, message: String },

    /// The provider answered 2xx but the body was unusable.
    #[error("{backend} sent an unusable response: {message}")]
    InvalidResponse { backend: BackendKind, message: String },

    /// The request was rejected before it was sent.
    #[error("{backend} cannot synthesise this input: {message}")]
    InvalidInput { backend: BackendKind, message: String },

    /// The HTTP client could not be built.
    #[error("{backend} client setup failed: {message}")]
    Setup { backend: BackendKind, message: String },

    /// The variant exists but has no working integration.
    #[error("{backend} integration is not implemented")]
    NotImplemented { backend: BackendKind },
}

impl BackendError {
    pub fn backend(&self) -> BackendKind {
        match self {
            Self::AuthenticationMissing { backend }
            | Self::Provider { backend, .. }
            | Self::Transport { backend, .. }
            | Self::InvalidResponse { backend, .. }
            | Self::InvalidInput { backend, .. }
            | Self::Setup { backend, .. }
            | Self::NotImplemented { backend } => *backend,
        }
    }

    /// Rate limiting (429), server errors (5xx) and transport failures may
    /// succeed on another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { status, .. } => *status == 429 || *status >= 500,
            Self::Transport { .. } => true,
            _ => false,
        }
    }

    /// Errors that abort the run instead of failing a single entry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthenticationMissing { .. } | Self::Setup { .. })
    }
}
