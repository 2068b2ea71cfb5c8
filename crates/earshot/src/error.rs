//! Unified error type for Earshot.

use earshot_protocol::ProtocolError;
use earshot_session::SessionError;
use earshot_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `earshot` crate, you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant auto-generates `From` impls, so the `?`
/// operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum EarshotError {
    /// A position channel error (connect, receive).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A payload could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A media session error (signaling, join, publish, capture).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The operation needs a local identity and none is set.
    #[error("no local identity set")]
    IdentityNotSet,

    /// Loading or saving the local identity failed.
    #[error("identity store: {0}")]
    IdentityStore(#[source] std::io::Error),

    /// The coordinator task has stopped.
    #[error("coordinator unavailable")]
    Unavailable,
}
