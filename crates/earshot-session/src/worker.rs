//! Session worker: an isolated Tokio task that owns the media client.
//!
//! Join and leave procedures suspend (signaling, microphone, join,
//! publish), so they run here rather than in the coordinator. Commands
//! are handled strictly one at a time, which is what guarantees that a
//! previous client is closed before the next one is built.
//!
//! Results and inbound tracks flow back over a single event channel. A
//! single channel keeps them in order: the coordinator always sees
//! `TornDown` for the old client before any track of the new one.

use earshot_protocol::{Identity, SessionKey};
use tokio::sync::{mpsc, oneshot, watch};

use crate::{
    CaptureHandle, CaptureSource, MediaConnector, MediaSession, RemoteTrack,
    SessionError,
};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// What the worker (or the media stack, through a [`TrackSender`])
/// reports back to the coordinator.
///
/// `epoch` identifies the join attempt that produced the event; the
/// coordinator discards anything from an attempt it has moved past.
#[derive(Debug)]
pub enum SessionEvent {
    /// The previous client was closed; its sinks must go.
    TornDown,
    /// The join for `epoch` completed and the microphone is published.
    Joined { epoch: u64, key: SessionKey },
    /// The join for `epoch` failed at some step.
    JoinFailed {
        epoch: u64,
        key: SessionKey,
        error: SessionError,
    },
    /// A remote track arrived.
    TrackAdded { epoch: u64, track: RemoteTrack },
    /// A remote stream ended.
    TrackRemoved { epoch: u64, stream_id: String },
}

/// The inbound-track callback handed to a [`MediaSession`].
///
/// Cheap to clone. Every notification is stamped with the epoch of the
/// join that created the sender.
#[derive(Debug, Clone)]
pub struct TrackSender {
    epoch: u64,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl TrackSender {
    pub fn new(epoch: u64, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { epoch, events }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Reports a new inbound track. Returns `false` once nobody listens.
    pub fn added(&self, track: RemoteTrack) -> bool {
        self.events
            .send(SessionEvent::TrackAdded {
                epoch: self.epoch,
                track,
            })
            .is_ok()
    }

    /// Reports that the stream `stream_id` ended.
    pub fn removed(&self, stream_id: impl Into<String>) -> bool {
        self.events
            .send(SessionEvent::TrackRemoved {
                epoch: self.epoch,
                stream_id: stream_id.into(),
            })
            .is_ok()
    }
}

// ---------------------------------------------------------------------------
// Commands and handle
// ---------------------------------------------------------------------------

enum SessionCommand {
    Join {
        key: SessionKey,
        identity: Identity,
        epoch: u64,
    },
    Leave {
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running session worker.
///
/// Cheap to clone: it wraps an `mpsc::Sender`.
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Queues a join. The outcome arrives as [`SessionEvent::Joined`] or
    /// [`SessionEvent::JoinFailed`] carrying the same `epoch`.
    pub async fn join(
        &self,
        key: SessionKey,
        identity: Identity,
        epoch: u64,
    ) -> Result<(), SessionError> {
        self.sender
            .send(SessionCommand::Join {
                key,
                identity,
                epoch,
            })
            .await
            .map_err(|_| SessionError::WorkerUnavailable)
    }

    /// Queues a leave and returns a receiver that resolves once the
    /// client is closed.
    ///
    /// Splitting the two lets a caller keep its own command order (the
    /// leave is queued before anything it sends next) without waiting for
    /// the teardown itself.
    pub async fn begin_leave(
        &self,
    ) -> Result<oneshot::Receiver<()>, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::Leave { reply: reply_tx })
            .await
            .map_err(|_| SessionError::WorkerUnavailable)?;
        Ok(reply_rx)
    }

    /// Leaves the current room and waits for the teardown.
    pub async fn leave(&self) -> Result<(), SessionError> {
        self.begin_leave()
            .await?
            .await
            .map_err(|_| SessionError::WorkerUnavailable)
    }

    /// Closes the client, releases the microphone and stops the worker.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::Shutdown { reply: reply_tx })
            .await
            .map_err(|_| SessionError::WorkerUnavailable)?;
        reply_rx.await.map_err(|_| SessionError::WorkerUnavailable)
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// The worker state. Runs inside its own Tokio task.
pub struct SessionWorker<M: MediaConnector, S: CaptureSource> {
    connector: M,
    capture_source: S,
    client: Option<M::Session>,
    capture: Option<S::Handle>,
    mic_enabled: watch::Receiver<bool>,
    commands: mpsc::Receiver<SessionCommand>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl<M: MediaConnector, S: CaptureSource> SessionWorker<M, S> {
    /// Spawns a worker and returns its handle.
    ///
    /// `mic_enabled` drives the capture handle's enabled state for as long
    /// as the worker holds one. `events` receives every [`SessionEvent`].
    pub fn spawn(
        connector: M,
        capture_source: S,
        mic_enabled: watch::Receiver<bool>,
        events: mpsc::UnboundedSender<SessionEvent>,
        buffer: usize,
    ) -> SessionHandle {
        let (sender, commands) = mpsc::channel(buffer.max(1));
        let worker = Self {
            connector,
            capture_source,
            client: None,
            capture: None,
            mic_enabled,
            commands,
            events,
        };
        tokio::spawn(worker.run());
        SessionHandle { sender }
    }

    async fn run(mut self) {
        tracing::debug!("session worker started");

        loop {
            tokio::select! {
                // Mic changes first, so a toggle is applied before any
                // command queued after it.
                biased;

                Ok(()) = self.mic_enabled.changed() => {
                    let enabled = *self.mic_enabled.borrow_and_update();
                    if let Some(capture) = &self.capture {
                        capture.set_enabled(enabled);
                        tracing::debug!(enabled, "microphone toggled");
                    }
                }
                cmd = self.commands.recv() => match cmd {
                    Some(SessionCommand::Join { key, identity, epoch }) => {
                        self.handle_join(key, identity, epoch).await;
                    }
                    Some(SessionCommand::Leave { reply }) => {
                        self.teardown().await;
                        let _ = reply.send(());
                    }
                    Some(SessionCommand::Shutdown { reply }) => {
                        self.commands.close();
                        self.stop().await;
                        let _ = reply.send(());
                        return;
                    }
                    None => break,
                },
            }
        }

        self.stop().await;
    }

    async fn handle_join(&mut self, key: SessionKey, identity: Identity, epoch: u64) {
        self.teardown().await;

        tracing::info!(%key, %identity, epoch, "joining voice session");
        let event = match self.establish(&key, &identity, epoch).await {
            Ok(()) => {
                tracing::info!(%key, epoch, "joined voice session");
                SessionEvent::Joined { epoch, key }
            }
            Err(error) => {
                tracing::warn!(%key, epoch, %error, "voice session join failed");
                SessionEvent::JoinFailed { epoch, key, error }
            }
        };
        let _ = self.events.send(event);
    }

    /// Connect, subscribe, acquire, join, publish. In that order.
    async fn establish(
        &mut self,
        key: &SessionKey,
        identity: &Identity,
        epoch: u64,
    ) -> Result<(), SessionError> {
        let client = self.client.insert(self.connector.connect().await?);
        client.subscribe_tracks(TrackSender::new(epoch, self.events.clone()));

        let enabled = *self.mic_enabled.borrow();
        let capture =
            acquire(&mut self.capture_source, &mut self.capture, enabled).await?;

        client.join(key, identity).await?;
        client.publish(capture).await?;
        Ok(())
    }

    /// Closes the current client, if any. Failures are logged only.
    async fn teardown(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        if let Err(error) = client.close().await {
            tracing::warn!(%error, "closing media client failed");
        }
        let _ = self.events.send(SessionEvent::TornDown);
        tracing::info!("voice session torn down");
    }

    async fn stop(&mut self) {
        self.teardown().await;
        if let Some(capture) = self.capture.take() {
            capture.release();
            tracing::debug!("microphone released");
        }
        tracing::debug!("session worker stopped");
    }
}

/// Returns the cached capture handle, acquiring it on first use.
async fn acquire<'a, S: CaptureSource>(
    source: &mut S,
    slot: &'a mut Option<S::Handle>,
    enabled: bool,
) -> Result<&'a S::Handle, SessionError> {
    let handle = match slot.take() {
        Some(handle) => handle,
        None => {
            let handle = source.acquire_microphone().await?;
            tracing::info!("microphone acquired");
            handle
        }
    };
    handle.set_enabled(enabled);
    Ok(slot.insert(handle))
}
