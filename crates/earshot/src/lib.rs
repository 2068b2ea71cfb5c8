//! # Earshot
//!
//! Proximity voice for virtual worlds: positions in, rooms and per-peer
//! volume out.
//!
//! Earshot listens to a positional feed, joins the voice session for the
//! local participant's region, and keeps every remote peer's volume (and
//! optionally stereo pan) in step with in-world distance. The media
//! stack, microphone and audio output are plugged in through the traits
//! in [`earshot_session`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use earshot::prelude::*;
//!
//! // Implement MediaConnector, CaptureSource and AudioRenderer for your
//! // media stack, then:
//! // let voice = ProximityVoice::builder()
//! //     .identity_store(FileIdentityStore::new("identity.json"))
//! //     .build(WebSocketConnector::new("ws://localhost:8765"), media, capture, renderer)
//! //     .await?;
//! // voice.set_identity("1234").await?;
//! // voice.connect().await?;
//! ```

mod config;
mod coordinator;
mod error;
mod identity;
mod voice;

pub use config::{DEFAULT_COMMAND_BUFFER, DEFAULT_SWEEP_INTERVAL, VoiceConfig};
pub use coordinator::VoiceStatus;
pub use error::EarshotError;
pub use identity::{FileIdentityStore, IdentityStore, MemoryIdentityStore};
pub use voice::{ProximityVoice, ProximityVoiceBuilder};

pub use earshot_protocol;
pub use earshot_proximity;
pub use earshot_session;
pub use earshot_transport;

/// Everything needed to embed Earshot, in one import.
pub mod prelude {
    pub use crate::{
        EarshotError, FileIdentityStore, IdentityStore, MemoryIdentityStore,
        ProximityVoice, ProximityVoiceBuilder, VoiceConfig, VoiceStatus,
    };
    pub use earshot_protocol::{
        Codec, Identity, JsonCodec, NearbyPeer, PositionRecord, Region,
        SessionKey,
    };
    pub use earshot_proximity::ProximityConfig;
    pub use earshot_session::{
        AudioRenderer, AudioSink, CaptureHandle, CaptureSource,
        MediaConnector, MediaSession, RemoteTrack, SessionError, TrackKind,
        TrackSender,
    };
    pub use earshot_transport::{
        ChannelConfig, ChannelState, Connection, Connector, TransportError,
        WebSocketConnector,
    };
}
