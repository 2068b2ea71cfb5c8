//! Error types for the session layer.

/// Errors reported by the media collaborators or the session worker.
///
/// Collaborator errors carry a message rather than a source error: the
/// media stack is external and its error types are not ours to name.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Opening the signaling handle or building the media client failed.
    #[error("signaling failed: {0}")]
    SignalingFailed(String),

    /// The media client refused or failed the join.
    #[error("join failed: {0}")]
    JoinFailed(String),

    /// Publishing the local capture failed.
    #[error("publish failed: {0}")]
    PublishFailed(String),

    /// The microphone could not be acquired.
    #[error("capture failed: {0}")]
    CaptureFailed(String),

    /// A rendering sink could not be created for a remote track.
    #[error("render failed: {0}")]
    RenderFailed(String),

    /// Closing the media client failed.
    #[error("close failed: {0}")]
    CloseFailed(String),

    /// The session worker task is gone.
    #[error("session worker unavailable")]
    WorkerUnavailable,
}
