//! The coordinator: one task that owns all proximity voice state.
//!
//! Position messages, session results, inbound tracks, façade commands
//! and the stale-peer sweep all arrive here as events and are handled one
//! at a time. Nothing else mutates the position store, the current
//! session key or the per-peer sinks.

use std::ops::ControlFlow;
use std::time::Instant;

use earshot_protocol::{
    Codec, Identity, NearbyPeer, SessionKey, decode_positions,
};
use earshot_proximity::{
    AttenuationModel, MembershipDecision, MembershipPolicy, PeerLocation,
    PositionStore, pan,
};
use earshot_session::{
    AudioRenderer, PeerAudioManager, RemoteTrack, SessionEvent, SessionHandle,
};
use earshot_transport::{ChannelEvent, ChannelManager, ChannelState, Connector};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;

use crate::{EarshotError, IdentityStore, VoiceConfig};

/// A snapshot of the coordinator's state.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceStatus {
    /// The local identity, if set.
    pub identity: Option<Identity>,
    /// Position channel state.
    pub channel: ChannelState,
    /// The session currently joined (or last attempted).
    pub session: Option<SessionKey>,
    pub muted: bool,
    pub deafened: bool,
    /// Current nearby list.
    pub nearby: Vec<NearbyPeer>,
    /// Effective output gain of every live peer sink.
    pub peer_gains: Vec<(Identity, f32)>,
}

/// Commands sent by the façade.
pub(crate) enum Command {
    SetIdentity {
        identity: Identity,
        reply: oneshot::Sender<Result<(), EarshotError>>,
    },
    Connect {
        reply: oneshot::Sender<Result<(), EarshotError>>,
    },
    Reconnect {
        reply: oneshot::Sender<Result<(), EarshotError>>,
    },
    Disconnect {
        reply: oneshot::Sender<Result<(), EarshotError>>,
    },
    SetMuted {
        muted: bool,
        reply: oneshot::Sender<()>,
    },
    SetDeafened {
        deafened: bool,
        reply: oneshot::Sender<()>,
    },
    Status {
        reply: oneshot::Sender<VoiceStatus>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// The coordinator state. Runs inside a Tokio task.
pub(crate) struct Coordinator<T, R, I, C>
where
    T: Connector,
    R: AudioRenderer,
    I: IdentityStore,
    C: Codec,
{
    pub(crate) config: VoiceConfig,
    pub(crate) attenuation: AttenuationModel,
    pub(crate) codec: C,
    pub(crate) identities: I,
    pub(crate) identity: Option<Identity>,

    pub(crate) channel: ChannelManager<T>,
    pub(crate) channel_events: mpsc::UnboundedReceiver<ChannelEvent>,
    pub(crate) session: SessionHandle,
    pub(crate) session_events: mpsc::UnboundedReceiver<SessionEvent>,
    pub(crate) commands: mpsc::Receiver<Command>,

    pub(crate) store: PositionStore,
    pub(crate) policy: MembershipPolicy,
    pub(crate) audio: PeerAudioManager<R>,

    /// Session joined (or last attempted).
    pub(crate) current_key: Option<SessionKey>,
    /// Last epoch handed out.
    pub(crate) epoch: u64,
    /// Epoch whose tracks are accepted.
    pub(crate) active_epoch: Option<u64>,
    /// Epoch of the join the worker is still running.
    pub(crate) pending_join: Option<u64>,

    pub(crate) muted: bool,
    pub(crate) deafened: bool,
    pub(crate) mic_enabled: watch::Sender<bool>,
    pub(crate) nearby: watch::Sender<Vec<NearbyPeer>>,
}

impl<T, R, I, C> Coordinator<T, R, I, C>
where
    T: Connector,
    R: AudioRenderer,
    I: IdentityStore,
    C: Codec,
{
    /// Runs the event loop until shutdown.
    pub(crate) async fn run(mut self) {
        tracing::info!(identity = ?self.identity.as_ref().map(Identity::as_str), "coordinator started");

        let mut sweep = tokio::time::interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => {
                        if self.handle_command(cmd).await.is_break() {
                            return;
                        }
                    }
                    None => break,
                },
                Some(event) = self.channel_events.recv() => {
                    self.handle_channel_event(event).await;
                }
                Some(event) = self.session_events.recv() => {
                    self.handle_session_event(event).await;
                }
                _ = sweep.tick() => self.sweep(),
            }
        }

        self.shutdown().await;
    }

    // -----------------------------------------------------------------------
    // Façade commands
    // -----------------------------------------------------------------------

    /// Breaks once the coordinator has shut down.
    async fn handle_command(&mut self, cmd: Command) -> ControlFlow<()> {
        match cmd {
            Command::SetIdentity { identity, reply } => {
                let result = self.set_identity(identity).await;
                let _ = reply.send(result);
            }
            Command::Connect { reply } => {
                let result = self.require_identity();
                if result.is_ok() {
                    self.channel.connect();
                }
                let _ = reply.send(result);
            }
            Command::Reconnect { reply } => {
                let result = self.require_identity();
                if result.is_ok() {
                    self.channel.reconnect();
                }
                let _ = reply.send(result);
            }
            Command::Disconnect { reply } => self.disconnect(reply).await,
            Command::SetMuted { muted, reply } => {
                self.muted = muted;
                self.update_mic();
                let _ = reply.send(());
            }
            Command::SetDeafened { deafened, reply } => {
                self.deafened = deafened;
                self.audio.set_deafened(deafened);
                self.update_mic();
                tracing::info!(deafened, "deafen toggled");
                let _ = reply.send(());
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
            Command::Shutdown { reply } => {
                self.shutdown().await;
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn require_identity(&self) -> Result<(), EarshotError> {
        match self.identity {
            Some(_) => Ok(()),
            None => Err(EarshotError::IdentityNotSet),
        }
    }

    async fn set_identity(&mut self, identity: Identity) -> Result<(), EarshotError> {
        self.identities
            .save(&identity)
            .await
            .map_err(EarshotError::IdentityStore)?;

        if self.identity.as_ref() == Some(&identity) {
            return Ok(());
        }
        tracing::info!(%identity, "local identity set");
        // Records seen under this identity so far belong to self now.
        self.store.forget_peer(&identity);
        self.identity = Some(identity);

        if self.current_key.is_some() || self.pending_join.is_some() {
            if let Err(e) = self.session.begin_leave().await {
                tracing::error!(error = %e, "session worker lost");
            }
        }
        self.reset_membership();
        self.store.forget_self();
        self.publish_nearby(Vec::new());
        Ok(())
    }

    async fn disconnect(&mut self, reply: oneshot::Sender<Result<(), EarshotError>>) {
        self.channel.disconnect();

        let receipt = self.session.begin_leave().await;
        self.reset_membership();
        self.store.clear();
        self.publish_nearby(Vec::new());
        tracing::info!("disconnected");

        match receipt {
            Ok(done) => {
                // Reply once the worker has closed the client, without
                // blocking this loop on it.
                tokio::spawn(async move {
                    let result = done.await.map_err(|_| EarshotError::Unavailable);
                    let _ = reply.send(result);
                });
            }
            Err(e) => {
                let _ = reply.send(Err(e.into()));
            }
        }
    }

    /// Forgets the session side: sinks, key, epochs, policy memory.
    fn reset_membership(&mut self) {
        self.audio.dispose_all();
        self.current_key = None;
        self.active_epoch = None;
        self.policy.reset();
    }

    fn update_mic(&mut self) {
        let enabled = !(self.muted || self.deafened);
        self.mic_enabled.send_if_modified(|current| {
            let changed = *current != enabled;
            *current = enabled;
            changed
        });
    }

    fn status(&self) -> VoiceStatus {
        VoiceStatus {
            identity: self.identity.clone(),
            channel: self.channel.state(),
            session: self.current_key.clone(),
            muted: self.muted,
            deafened: self.deafened,
            nearby: self.nearby.borrow().clone(),
            peer_gains: self.audio.effective_gains(),
        }
    }

    async fn shutdown(&mut self) {
        self.channel.disconnect();
        if let Err(e) = self.session.shutdown().await {
            tracing::debug!(error = %e, "session worker already stopped");
        }
        self.audio.dispose_all();
        tracing::info!("coordinator stopped");
    }

    // -----------------------------------------------------------------------
    // Position channel
    // -----------------------------------------------------------------------

    async fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Opened(id) => {
                self.channel.on_opened(id);
            }
            ChannelEvent::Closed(id) => {
                self.channel.on_closed(id);
            }
            ChannelEvent::RetryDue => self.channel.on_retry_due(),
            ChannelEvent::Message(id, data) => {
                if !self.channel.is_current(id) {
                    tracing::debug!(%id, "dropping message from stale channel");
                    return;
                }
                self.handle_message(&data).await;
            }
        }
    }

    async fn handle_message(&mut self, data: &[u8]) {
        let Some(identity) = self.identity.clone() else {
            tracing::debug!("no local identity, dropping position message");
            return;
        };

        let records = match decode_positions(&self.codec, data) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, bytes = data.len(), "dropping malformed position message");
                return;
            }
        };

        let count = records.len();
        let peers = self.store.apply(&identity, records, now());
        tracing::debug!(records = count, peers, "positions applied");
        self.recompute().await;
    }

    // -----------------------------------------------------------------------
    // Recompute
    // -----------------------------------------------------------------------

    /// Expiry, nearby list, membership, then audio. Once per message.
    async fn recompute(&mut self) {
        self.expire(now());

        let Some(region) = self.store.self_position().map(|me| me.region.clone()) else {
            tracing::debug!("self position unknown, skipping recompute");
            return;
        };

        let nearby = self.store.nearby(self.config.proximity.nearby_cutoff);
        let has_nearby = !nearby.is_empty();
        self.publish_nearby(nearby);

        if let Some(epoch) = self.pending_join {
            tracing::debug!(epoch, "join in flight, membership deferred");
        } else {
            let decision =
                self.policy
                    .evaluate(&region, has_nearby, self.current_key.as_ref());
            if let MembershipDecision::Join(key) = decision {
                self.begin_join(key).await;
            }
        }

        self.sync_audio();
    }

    async fn begin_join(&mut self, key: SessionKey) {
        let Some(identity) = self.identity.clone() else {
            return;
        };
        self.epoch += 1;
        let epoch = self.epoch;
        self.active_epoch = Some(epoch);
        self.pending_join = Some(epoch);

        tracing::info!(%key, epoch, "requesting session join");
        if let Err(e) = self.session.join(key, identity, epoch).await {
            tracing::error!(error = %e, "session worker lost");
            self.pending_join = None;
        }
    }

    /// Pushes distance-derived gain and pan to every sink.
    ///
    /// Peers with no known position keep their last value; peers known to
    /// be in another region are silenced.
    fn sync_audio(&mut self) {
        let identities: Vec<Identity> = self.audio.identities().cloned().collect();
        for identity in identities {
            match self.store.locate(&identity) {
                PeerLocation::SameRegion { distance, dx, dy } => {
                    let gain = self.attenuation.gain(distance);
                    self.audio.apply(&identity, gain, pan(dx, dy));
                }
                PeerLocation::OtherRegion => {
                    self.audio.silence(&identity);
                }
                PeerLocation::Unknown => {}
            }
        }
    }

    fn expire(&mut self, now: Instant) -> usize {
        let Some(ttl) = self.config.proximity.peer_ttl else {
            return 0;
        };
        let expired = self.store.expire_stale(now, ttl);
        for identity in &expired {
            self.audio.silence(identity);
        }
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "expired stale peers");
        }
        expired.len()
    }

    fn sweep(&mut self) {
        if self.expire(now()) > 0 {
            let nearby = self.store.nearby(self.config.proximity.nearby_cutoff);
            self.publish_nearby(nearby);
        }
    }

    fn publish_nearby(&mut self, nearby: Vec<NearbyPeer>) {
        self.nearby.send_if_modified(|current| {
            if *current == nearby {
                return false;
            }
            *current = nearby;
            true
        });
    }

    // -----------------------------------------------------------------------
    // Session worker
    // -----------------------------------------------------------------------

    async fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::TornDown => {
                self.audio.dispose_all();
            }
            SessionEvent::Joined { epoch, key } => {
                self.settle_join(epoch, key).await;
            }
            SessionEvent::JoinFailed { epoch, key, error } => {
                tracing::warn!(%key, epoch, %error, "join failed, keeping key as current");
                self.settle_join(epoch, key).await;
            }
            SessionEvent::TrackAdded { epoch, track } => {
                if self.active_epoch != Some(epoch) {
                    tracing::debug!(epoch, stream_id = %track.stream_id, "dropping track from stale session");
                    return;
                }
                self.attach_track(&track);
            }
            SessionEvent::TrackRemoved { epoch, stream_id } => {
                if self.active_epoch != Some(epoch) {
                    return;
                }
                self.audio.remove_stream(&stream_id);
            }
        }
    }

    async fn settle_join(&mut self, epoch: u64, key: SessionKey) {
        if self.pending_join == Some(epoch) {
            self.pending_join = None;
        }
        if self.active_epoch == Some(epoch) {
            self.current_key = Some(key);
        }
        self.recompute().await;
    }

    fn attach_track(&mut self, track: &RemoteTrack) {
        let (gain, pan) = match self.store.locate(&track.identity()) {
            PeerLocation::SameRegion { distance, dx, dy } => {
                (self.attenuation.gain(distance), pan(dx, dy))
            }
            PeerLocation::OtherRegion => (0.0, 0.0),
            PeerLocation::Unknown => (1.0, 0.0),
        };
        if let Err(e) = self.audio.attach(track, gain, pan) {
            tracing::warn!(stream_id = %track.stream_id, error = %e, "could not render remote track");
        }
    }
}

/// Wall-clock "now" that follows Tokio's paused clock in tests.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}
