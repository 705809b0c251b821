//! Unified error type for the blivechat clients.

use blivechat_command::{FatalError, FatalErrorKind, NormalizeError};
use blivechat_protocol::ProtocolError;
use blivechat_session::SessionError;
use blivechat_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `blivechat` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// A transport-level error (connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (frame layout, decompression, JSON).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A backend HTTP error (room info, game session).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A business command that could not be normalized.
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    /// Room or game bootstrap failed.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    /// The client task panicked or was aborted.
    #[error("client task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Why a variant could not prepare a connection.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// Retrying cannot help; the client terminates.
    #[error("fatal: {0}")]
    Fatal(FatalError),

    /// A backend call failed; the client reconnects with backoff.
    #[error(transparent)]
    Session(SessionError),
}

impl BootstrapError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

impl From<SessionError> for BootstrapError {
    /// Invalid auth codes become fatal; everything else stays transient.
    fn from(err: SessionError) -> Self {
        if err.is_fatal() {
            Self::Fatal(FatalError::new(
                FatalErrorKind::AuthCodeInvalid,
                err.to_string(),
            ))
        } else {
            Self::Session(err)
        }
    }
}
