//! Classified failures of a rotation run.
//!
//! Most failures are plain [`eyre::Report`]s and are retried by
//! [`RetryPolicy`](crate::retry::RetryPolicy). The variants here are the ones
//! that need to be told apart: either because retrying cannot fix them, or
//! because an operator needs a specific ID to clean up by hand.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RotationError {
    /// There is no cached credential, or it can no longer be refreshed.
    ///
    /// Unattended runs never fall back to the interactive flow; the operator has
    /// to run `broadcast-rotator authorize` once.
    #[error("no usable YouTube credential{}: {reason}", location(.path))]
    CredentialUnavailable {
        /// The credential cache, when the failure is tied to one.
        path: Option<PathBuf>,
        reason: String,
    },

    /// None of the channel's live streams has the configured ingestion key.
    #[error("no live stream found with stream key {stream_key:?}")]
    StreamNotFound { stream_key: String },

    /// A new broadcast was created, but binding it to the stream failed.
    ///
    /// The stream is left unbound and the broadcast is left orphaned.
    #[error("broadcast {broadcast_id} was created but could not be bound to stream {stream_id}")]
    PartialRotation {
        broadcast_id: String,
        stream_id: String,
    },
}

fn location(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" in {}", path.display()),
        None => String::new(),
    }
}

impl RotationError {
    /// Whether trying the same call again could possibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::CredentialUnavailable { .. } | Self::StreamNotFound { .. } => false,
            Self::PartialRotation { .. } => true,
        }
    }
}

/// Returns `false` if any error in the chain is a non-retryable [`RotationError`].
pub(crate) fn is_retryable(report: &eyre::Report) -> bool {
    report.chain().all(|cause| {
        cause
            .downcast_ref::<RotationError>()
            .is_none_or(RotationError::is_retryable)
    })
}
