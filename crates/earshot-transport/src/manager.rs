//! The channel manager: one live channel, reconnected after drops.
//!
//! Each channel attempt runs on its own "pump" task that connects, then
//! forwards every received message as a [`ChannelEvent`]. The manager
//! itself is plain state owned by the caller's event loop: the loop reads
//! events from the receiver it passed in and hands the lifecycle ones
//! back to [`ChannelManager::on_opened`], [`ChannelManager::on_closed`]
//! and [`ChannelManager::on_retry_due`].
//!
//! ```text
//!            connect()            Opened(id)
//!  Closed ─────────────▶ Connecting ─────────▶ Open
//!    ▲  ▲                   │                   │
//!    │  └── Closed(id) ─────┘                   │
//!    └──────────────── Closed(id) ──────────────┘
//!         (unless manually closed: RetryDue after reconnect_delay)
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::{Connection, ConnectionId, Connector};

/// Delay between an unexpected close and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Lifecycle of the position channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Closed,
    Connecting,
    Open,
}

/// Channel manager settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Wait this long after an unexpected close before reconnecting.
    pub reconnect_delay: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

/// Something happened on a channel, or a retry timer fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The channel with this id finished connecting.
    Opened(ConnectionId),
    /// A message arrived on the channel with this id.
    Message(ConnectionId, Vec<u8>),
    /// The channel with this id is gone (failed, dropped, or closed).
    Closed(ConnectionId),
    /// The reconnect delay elapsed.
    RetryDue,
}

struct ActiveChannel {
    id: ConnectionId,
    shutdown: oneshot::Sender<()>,
}

/// Owns the single position channel.
pub struct ChannelManager<C: Connector> {
    connector: Arc<C>,
    config: ChannelConfig,
    state: ChannelState,
    current: Option<ActiveChannel>,
    manually_closed: bool,
    retry: Option<JoinHandle<()>>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    next_id: u64,
}

impl<C: Connector> ChannelManager<C> {
    /// Creates a closed manager that will report on `events`.
    pub fn new(
        connector: C,
        config: ChannelConfig,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Self {
        Self {
            connector: Arc::new(connector),
            config,
            state: ChannelState::Closed,
            current: None,
            manually_closed: false,
            retry: None,
            events,
            next_id: 0,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Id of the current channel attempt, if any.
    pub fn current_id(&self) -> Option<ConnectionId> {
        self.current.as_ref().map(|c| c.id)
    }

    /// Whether events tagged `id` belong to the current channel.
    pub fn is_current(&self, id: ConnectionId) -> bool {
        self.current_id() == Some(id)
    }

    pub fn is_manually_closed(&self) -> bool {
        self.manually_closed
    }

    /// Opens the channel unless one is already connecting or open.
    ///
    /// Clears the manual-close flag, so automatic reconnection resumes.
    pub fn connect(&mut self) {
        if self.state != ChannelState::Closed {
            tracing::debug!(state = ?self.state, "connect ignored, channel busy");
            return;
        }
        self.manually_closed = false;
        self.cancel_retry();
        self.open();
    }

    /// Tears down whatever channel exists and opens a fresh one.
    pub fn reconnect(&mut self) {
        self.manually_closed = false;
        self.cancel_retry();
        self.close_current();
        self.open();
    }

    /// Closes the channel and suppresses automatic reconnection until the
    /// next [`connect`](Self::connect) or [`reconnect`](Self::reconnect).
    pub fn disconnect(&mut self) {
        self.manually_closed = true;
        self.cancel_retry();
        self.close_current();
        self.state = ChannelState::Closed;
    }

    /// Handles [`ChannelEvent::Opened`]. Returns `false` for stale ids.
    pub fn on_opened(&mut self, id: ConnectionId) -> bool {
        if !self.is_current(id) {
            tracing::debug!(%id, "ignoring open of stale channel");
            return false;
        }
        self.state = ChannelState::Open;
        tracing::info!(%id, "position channel open");
        true
    }

    /// Handles [`ChannelEvent::Closed`]. Returns `false` for stale ids.
    pub fn on_closed(&mut self, id: ConnectionId) -> bool {
        if !self.is_current(id) {
            tracing::debug!(%id, "ignoring close of stale channel");
            return false;
        }
        self.current = None;
        self.state = ChannelState::Closed;

        if self.manually_closed {
            tracing::info!(%id, "position channel closed");
        } else {
            tracing::warn!(
                %id,
                delay_ms = self.config.reconnect_delay.as_millis() as u64,
                "position channel lost, scheduling reconnect"
            );
            self.schedule_retry();
        }
        true
    }

    /// Handles [`ChannelEvent::RetryDue`].
    pub fn on_retry_due(&mut self) {
        self.retry = None;
        if self.manually_closed || self.state != ChannelState::Closed {
            return;
        }
        self.open();
    }

    fn open(&mut self) {
        self.next_id += 1;
        let id = ConnectionId::new(self.next_id);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(pump(
            Arc::clone(&self.connector),
            id,
            shutdown_rx,
            self.events.clone(),
        ));

        self.current = Some(ActiveChannel {
            id,
            shutdown: shutdown_tx,
        });
        self.state = ChannelState::Connecting;
        tracing::info!(%id, "opening position channel");
    }

    fn close_current(&mut self) {
        if let Some(active) = self.current.take() {
            // The pump may already have exited; nothing to do then.
            let _ = active.shutdown.send(());
            tracing::debug!(id = %active.id, "closing position channel");
        }
    }

    fn schedule_retry(&mut self) {
        self.cancel_retry();
        let events = self.events.clone();
        let delay = self.config.reconnect_delay;
        self.retry = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(ChannelEvent::RetryDue);
        }));
    }

    fn cancel_retry(&mut self) {
        if let Some(retry) = self.retry.take() {
            retry.abort();
        }
    }
}

impl<C: Connector> Drop for ChannelManager<C> {
    fn drop(&mut self) {
        self.cancel_retry();
        self.close_current();
    }
}

/// Drives one channel attempt from connect to close.
///
/// Always ends by sending `Closed(id)`; the manager decides whether that
/// is still relevant.
async fn pump<C: Connector>(
    connector: Arc<C>,
    id: ConnectionId,
    mut shutdown: oneshot::Receiver<()>,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    let attempt = tokio::select! {
        _ = &mut shutdown => None,
        result = connector.connect() => Some(result),
    };

    let conn = match attempt {
        Some(Ok(conn)) => conn,
        Some(Err(e)) => {
            tracing::warn!(%id, error = %e, "position channel connect failed");
            let _ = events.send(ChannelEvent::Closed(id));
            return;
        }
        None => {
            let _ = events.send(ChannelEvent::Closed(id));
            return;
        }
    };

    if events.send(ChannelEvent::Opened(id)).is_err() {
        let _ = conn.close().await;
        return;
    }

    loop {
        let next = tokio::select! {
            _ = &mut shutdown => None,
            result = conn.recv() => Some(result),
        };

        match next {
            Some(Ok(Some(data))) => {
                if events.send(ChannelEvent::Message(id, data)).is_err() {
                    let _ = conn.close().await;
                    return;
                }
            }
            Some(Ok(None)) => {
                tracing::debug!(%id, "position channel closed by remote");
                break;
            }
            Some(Err(e)) => {
                tracing::warn!(%id, error = %e, "position channel receive failed");
                break;
            }
            None => {
                if let Err(e) = conn.close().await {
                    tracing::debug!(%id, error = %e, "close handshake failed");
                }
                break;
            }
        }
    }

    let _ = events.send(ChannelEvent::Closed(id));
}
