//! Media session lifecycle for Earshot.
//!
//! This crate owns everything between "the policy says join `room-2`" and
//! "peer P plays through a sink at gain 0.8":
//!
//! 1. **Collaborator seams**: the media client, microphone capture and
//!    audio rendering are external; they are reached through the traits in
//!    [`media`](crate::MediaConnector).
//! 2. **Session worker**: a single task that runs join and leave
//!    procedures one at a time ([`SessionWorker`], [`SessionHandle`]).
//! 3. **Per-peer audio**: one rendering resource per live remote stream
//!    ([`PeerAudioManager`]).
//!
//! # How it fits in the stack
//!
//! ```text
//! Coordinator (above)  ← decides when to join, feeds gains
//!     ↕
//! Session Layer (this crate)  ← serializes joins, owns sinks and capture
//!     ↕
//! Protocol Layer (below)  ← provides Identity, SessionKey
//! ```

mod audio;
mod error;
mod media;
mod worker;

pub use audio::{PeerAudioManager, Placement};
pub use error::SessionError;
pub use media::{
    AudioRenderer, AudioSink, CaptureHandle, CaptureSource, MediaConnector,
    MediaSession, RemoteTrack, TrackKind,
};
pub use worker::{SessionEvent, SessionHandle, SessionWorker, TrackSender};
