//! Seams to the external media stack.
//!
//! Earshot doesn't negotiate media, open microphones or play audio
//! itself. It defines the narrow traits below and drives whatever
//! implementation the host application plugs in: a WebRTC stack in
//! production, logging stand-ins in the demo, recording mocks in tests.
//!
//! # Returned futures are `Send`
//!
//! Methods that suspend are declared as
//! `fn ...(&self) -> impl Future<Output = ...> + Send` rather than
//! `async fn`, because the session worker runs on its own Tokio task and
//! Tokio may move that task between threads. Implementors can still write
//! plain `async fn` in their `impl` blocks; the compiler checks that the
//! resulting future is `Send`.

use std::future::Future;

use earshot_protocol::{Identity, SessionKey};

use crate::{SessionError, TrackSender};

// ---------------------------------------------------------------------------
// Remote tracks
// ---------------------------------------------------------------------------

/// Media kind of an inbound track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// An inbound track as reported by the media client.
///
/// `peer_id` is the remote participant's identity when the media stack
/// knows it; `stream_id` identifies the remote stream and is used to
/// correlate removals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub kind: TrackKind,
    pub peer_id: Option<String>,
    pub stream_id: String,
}

impl RemoteTrack {
    /// An audio track from a known peer.
    pub fn audio(peer_id: impl Into<String>, stream_id: impl Into<String>) -> Self {
        Self {
            kind: TrackKind::Audio,
            peer_id: Some(peer_id.into()),
            stream_id: stream_id.into(),
        }
    }

    /// The participant this track belongs to.
    ///
    /// Falls back to the stream id when the media stack did not report a
    /// peer id.
    pub fn identity(&self) -> Identity {
        match &self.peer_id {
            Some(peer) => Identity::new(peer.as_str()),
            None => Identity::new(self.stream_id.as_str()),
        }
    }

    pub fn is_audio(&self) -> bool {
        self.kind == TrackKind::Audio
    }
}

// ---------------------------------------------------------------------------
// Media client
// ---------------------------------------------------------------------------

/// Builds media clients.
///
/// Each call opens a fresh signaling handle and returns a client once
/// signaling is ready. The session worker calls it once per join and
/// never holds more than one client at a time.
pub trait MediaConnector: Send + Sync + 'static {
    /// The client type produced by this connector.
    type Session: MediaSession;

    /// Opens signaling and constructs a new client.
    fn connect(
        &self,
    ) -> impl Future<Output = Result<Self::Session, SessionError>> + Send;
}

/// One media session client: a member of at most one room.
pub trait MediaSession: Send + 'static {
    /// Registers where inbound track notifications go.
    ///
    /// Called before the microphone is acquired and before
    /// [`join`](Self::join), so no track announced during the join can be
    /// missed. Implementations keep the sender and call
    /// [`TrackSender::added`] / [`TrackSender::removed`] from whatever
    /// thread their media stack uses.
    fn subscribe_tracks(&mut self, tracks: TrackSender);

    /// Joins the room `key` as `identity`.
    fn join(
        &mut self,
        key: &SessionKey,
        identity: &Identity,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Publishes the local capture into the joined room.
    fn publish<H: CaptureHandle>(
        &mut self,
        capture: &H,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Leaves the room and releases the client.
    ///
    /// Takes `self` by value: a closed client cannot be used again.
    fn close(self) -> impl Future<Output = Result<(), SessionError>> + Send;
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

/// Opens the local microphone.
///
/// The session worker acquires at most once and reuses the handle for
/// every later join, so implementations need not be idempotent
/// themselves.
pub trait CaptureSource: Send + 'static {
    /// The handle type produced by this source.
    type Handle: CaptureHandle;

    fn acquire_microphone(
        &mut self,
    ) -> impl Future<Output = Result<Self::Handle, SessionError>> + Send;
}

/// A live microphone capture.
///
/// `Sync` because a shared reference is handed to
/// [`MediaSession::publish`] across an `.await`.
pub trait CaptureHandle: Send + Sync + 'static {
    /// Enables or disables the outgoing audio without releasing the device.
    fn set_enabled(&self, enabled: bool);

    /// Stops capturing and releases the device.
    fn release(&self);
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Creates playback sinks for remote tracks.
pub trait AudioRenderer: Send + 'static {
    /// The sink type produced by this renderer.
    type Sink: AudioSink;

    /// Whether sinks can be placed in the stereo field.
    ///
    /// Decides once per sink whether it is driven with gain only or with
    /// gain and pan.
    fn supports_spatial(&self) -> bool;

    /// Creates a sink playing `track`.
    fn create_sink(&mut self, track: &RemoteTrack) -> Result<Self::Sink, SessionError>;
}

/// One playing remote stream.
pub trait AudioSink: Send + 'static {
    /// Sets the output level, already clamped to `[0, 1]`.
    fn set_gain(&mut self, gain: f32);

    /// Sets the stereo position in `[-1, 1]`. Only called on spatial sinks.
    fn set_pan(&mut self, pan: f32);

    /// Stops playback and frees the sink.
    fn release(self);
}
