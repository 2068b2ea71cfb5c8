//! `ProximityVoice` builder and façade.
//!
//! This is the entry point for embedding Earshot. It wires the layers
//! together (channel → protocol → proximity → session) and hands back a
//! cheap handle that talks to the coordinator task.

use earshot_protocol::{Codec, Identity, JsonCodec, NearbyPeer};
use earshot_proximity::{MembershipPolicy, PositionStore};
use earshot_session::{
    AudioRenderer, CaptureSource, MediaConnector, PeerAudioManager,
    SessionWorker,
};
use earshot_transport::{ChannelManager, Connector};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::coordinator::{Command, Coordinator, VoiceStatus};
use crate::{EarshotError, IdentityStore, MemoryIdentityStore, VoiceConfig};

/// Builder for configuring and starting a [`ProximityVoice`].
///
/// # Example
///
/// ```rust,ignore
/// use earshot::prelude::*;
///
/// let voice = ProximityVoice::builder()
///     .identity_store(FileIdentityStore::new("identity.json"))
///     .build(WebSocketConnector::new(url), media, capture, renderer)
///     .await?;
/// voice.set_identity("1234").await?;
/// voice.connect().await?;
/// ```
pub struct ProximityVoiceBuilder<I = MemoryIdentityStore, C = JsonCodec> {
    config: VoiceConfig,
    identities: I,
    codec: C,
}

impl ProximityVoiceBuilder {
    /// Creates a builder with default settings, an in-memory identity
    /// store and the JSON codec.
    pub fn new() -> Self {
        Self {
            config: VoiceConfig::default(),
            identities: MemoryIdentityStore::new(),
            codec: JsonCodec,
        }
    }
}

impl Default for ProximityVoiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: IdentityStore, C: Codec> ProximityVoiceBuilder<I, C> {
    /// Sets the configuration.
    pub fn config(mut self, config: VoiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets where the local identity is persisted.
    pub fn identity_store<S: IdentityStore>(self, store: S) -> ProximityVoiceBuilder<S, C> {
        ProximityVoiceBuilder {
            config: self.config,
            identities: store,
            codec: self.codec,
        }
    }

    /// Sets the codec position payloads are decoded with.
    pub fn codec<D: Codec>(self, codec: D) -> ProximityVoiceBuilder<I, D> {
        ProximityVoiceBuilder {
            config: self.config,
            identities: self.identities,
            codec,
        }
    }

    /// Spawns the coordinator and session worker.
    ///
    /// If the identity store holds a saved identity, it is adopted and the
    /// position channel is opened right away. A store that cannot be read
    /// is logged and treated as empty; the next `set_identity` overwrites
    /// it.
    pub async fn build<T, M, S, R>(
        self,
        channel: T,
        media: M,
        capture: S,
        renderer: R,
    ) -> Result<ProximityVoice, EarshotError>
    where
        T: Connector,
        M: MediaConnector,
        S: CaptureSource,
        R: AudioRenderer,
    {
        let config = self.config.validated();
        let identity = match self.identities.load().await {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(error = %e, "saved identity unreadable, starting without one");
                None
            }
        };

        let (channel_tx, channel_events) = mpsc::unbounded_channel();
        let (session_tx, session_events) = mpsc::unbounded_channel();
        let (mic_enabled, mic_rx) = watch::channel(true);
        let (nearby, nearby_rx) = watch::channel(Vec::new());
        let (commands_tx, commands) = mpsc::channel(config.command_buffer);

        let session = SessionWorker::spawn(
            media,
            capture,
            mic_rx,
            session_tx,
            config.command_buffer,
        );

        let mut coordinator = Coordinator {
            attenuation: config.proximity.attenuation(),
            channel: ChannelManager::new(channel, config.channel.clone(), channel_tx),
            config,
            codec: self.codec,
            identities: self.identities,
            identity,
            channel_events,
            session,
            session_events,
            commands,
            store: PositionStore::new(),
            policy: MembershipPolicy::new(),
            audio: PeerAudioManager::new(renderer),
            current_key: None,
            epoch: 0,
            active_epoch: None,
            pending_join: None,
            muted: false,
            deafened: false,
            mic_enabled,
            nearby,
        };

        if let Some(identity) = &coordinator.identity {
            tracing::info!(%identity, "resuming with saved identity");
            coordinator.channel.connect();
        }

        let task = tokio::spawn(coordinator.run());

        Ok(ProximityVoice {
            commands: commands_tx,
            nearby: nearby_rx,
            task,
        })
    }
}

/// A running proximity voice coordinator.
///
/// Every method forwards to the coordinator task and waits for its
/// answer, except [`nearby_peers`](Self::nearby_peers), which reads the
/// latest published list directly.
pub struct ProximityVoice {
    commands: mpsc::Sender<Command>,
    nearby: watch::Receiver<Vec<NearbyPeer>>,
    task: JoinHandle<()>,
}

impl ProximityVoice {
    /// Creates a new builder.
    pub fn builder() -> ProximityVoiceBuilder {
        ProximityVoiceBuilder::new()
    }

    /// Persists and adopts the local identity.
    ///
    /// A changed identity leaves the current session and forgets the old
    /// self position; the next position message starts over.
    pub async fn set_identity(&self, identity: impl Into<Identity>) -> Result<(), EarshotError> {
        let identity = identity.into();
        self.request(|reply| Command::SetIdentity { identity, reply })
            .await?
    }

    /// Opens the position channel. No-op while connecting or open.
    pub async fn connect(&self) -> Result<(), EarshotError> {
        self.request(|reply| Command::Connect { reply }).await?
    }

    /// Replaces the position channel with a fresh one.
    pub async fn reconnect(&self) -> Result<(), EarshotError> {
        self.request(|reply| Command::Reconnect { reply }).await?
    }

    /// Closes the channel without auto-reconnect and leaves the session.
    ///
    /// Returns once the media client is closed.
    pub async fn disconnect(&self) -> Result<(), EarshotError> {
        self.request(|reply| Command::Disconnect { reply }).await?
    }

    /// Mutes or unmutes the microphone.
    pub async fn set_muted(&self, muted: bool) -> Result<(), EarshotError> {
        self.request(|reply| Command::SetMuted { muted, reply }).await
    }

    /// Silences every peer and the microphone, or restores them.
    pub async fn set_deafened(&self, deafened: bool) -> Result<(), EarshotError> {
        self.request(|reply| Command::SetDeafened { deafened, reply })
            .await
    }

    /// Returns a snapshot of the coordinator's state.
    pub async fn status(&self) -> Result<VoiceStatus, EarshotError> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// The latest nearby list, nearest first.
    pub fn nearby_peers(&self) -> Vec<NearbyPeer> {
        self.nearby.borrow().clone()
    }

    /// A receiver that is notified whenever the nearby list changes.
    pub fn subscribe_nearby(&self) -> watch::Receiver<Vec<NearbyPeer>> {
        self.nearby.clone()
    }

    /// Disconnects, closes the session, releases the microphone and stops
    /// the coordinator.
    pub async fn shutdown(self) -> Result<(), EarshotError> {
        self.request(|reply| Command::Shutdown { reply }).await?;
        self.task.await.map_err(|_| EarshotError::Unavailable)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, EarshotError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply_tx))
            .await
            .map_err(|_| EarshotError::Unavailable)?;
        reply_rx.await.map_err(|_| EarshotError::Unavailable)
    }
}
