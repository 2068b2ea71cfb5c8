//! Per-peer audio: one rendering sink per live remote stream.

use std::collections::HashMap;

use earshot_protocol::Identity;

use crate::{AudioRenderer, AudioSink, RemoteTrack, SessionError};

/// How a sink is driven, chosen once when it is created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// Gain only.
    Simple { gain: f32 },
    /// Gain plus stereo pan.
    Spatial { gain: f32, pan: f32 },
}

impl Placement {
    /// The distance-derived gain, before deafen is applied.
    pub fn gain(&self) -> f32 {
        match self {
            Self::Simple { gain } | Self::Spatial { gain, .. } => *gain,
        }
    }
}

struct PeerAudio<S> {
    stream_id: String,
    sink: S,
    placement: Placement,
}

/// Owns every live sink, keyed by the identity it plays.
///
/// Deafen is applied on output only: the stored placement keeps the
/// distance-derived gain, so un-deafening restores it without waiting for
/// a new position update.
pub struct PeerAudioManager<R: AudioRenderer> {
    renderer: R,
    peers: HashMap<Identity, PeerAudio<R::Sink>>,
    deafened: bool,
}

impl<R: AudioRenderer> PeerAudioManager<R> {
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            peers: HashMap::new(),
            deafened: false,
        }
    }

    /// Creates a sink for `track` with an initial gain and pan.
    ///
    /// Non-audio tracks are ignored (`Ok(None)`). A second track for an
    /// identity that already has a sink replaces it.
    pub fn attach(
        &mut self,
        track: &RemoteTrack,
        gain: f32,
        pan: f32,
    ) -> Result<Option<Identity>, SessionError> {
        if !track.is_audio() {
            tracing::debug!(stream_id = %track.stream_id, "ignoring non-audio track");
            return Ok(None);
        }

        let identity = track.identity();
        if let Some(previous) = self.peers.remove(&identity) {
            tracing::debug!(%identity, "replacing existing peer sink");
            previous.sink.release();
        }

        let sink = self.renderer.create_sink(track)?;
        let gain = clamp_gain(gain);
        let placement = if self.renderer.supports_spatial() {
            Placement::Spatial {
                gain,
                pan: clamp_pan(pan),
            }
        } else {
            Placement::Simple { gain }
        };

        let mut peer = PeerAudio {
            stream_id: track.stream_id.clone(),
            sink,
            placement,
        };
        render(&mut peer, self.deafened);
        tracing::info!(%identity, stream_id = %track.stream_id, gain, "peer audio attached");
        self.peers.insert(identity.clone(), peer);
        Ok(Some(identity))
    }

    /// Disposes the sink playing `stream_id`, if any.
    pub fn remove_stream(&mut self, stream_id: &str) -> Option<Identity> {
        let identity = self
            .peers
            .iter()
            .find(|(_, peer)| peer.stream_id == stream_id)
            .map(|(identity, _)| identity.clone())?;
        if let Some(peer) = self.peers.remove(&identity) {
            peer.sink.release();
            tracing::info!(%identity, stream_id, "peer audio removed");
        }
        Some(identity)
    }

    /// Disposes every sink. Returns how many were released.
    pub fn dispose_all(&mut self) -> usize {
        let count = self.peers.len();
        for (_, peer) in self.peers.drain() {
            peer.sink.release();
        }
        if count > 0 {
            tracing::debug!(count, "disposed all peer audio");
        }
        count
    }

    /// Updates a peer's distance-derived gain and pan.
    ///
    /// Returns `false` if the peer has no sink. Pan is ignored for simple
    /// sinks.
    pub fn apply(&mut self, identity: &Identity, gain: f32, pan: f32) -> bool {
        let Some(peer) = self.peers.get_mut(identity) else {
            return false;
        };
        let gain = clamp_gain(gain);
        peer.placement = match peer.placement {
            Placement::Simple { .. } => Placement::Simple { gain },
            Placement::Spatial { .. } => Placement::Spatial {
                gain,
                pan: clamp_pan(pan),
            },
        };
        render(peer, self.deafened);
        true
    }

    /// Sets a peer's gain to `0`, keeping its pan.
    pub fn silence(&mut self, identity: &Identity) -> bool {
        let Some(peer) = self.peers.get_mut(identity) else {
            return false;
        };
        peer.placement = match peer.placement {
            Placement::Simple { .. } => Placement::Simple { gain: 0.0 },
            Placement::Spatial { pan, .. } => Placement::Spatial { gain: 0.0, pan },
        };
        render(peer, self.deafened);
        true
    }

    /// Silences every sink, or restores their distance-derived gains.
    pub fn set_deafened(&mut self, deafened: bool) {
        if self.deafened == deafened {
            return;
        }
        self.deafened = deafened;
        for peer in self.peers.values_mut() {
            render(peer, deafened);
        }
    }

    pub fn is_deafened(&self) -> bool {
        self.deafened
    }

    /// The peer's distance-derived gain, ignoring deafen.
    pub fn gain_of(&self, identity: &Identity) -> Option<f32> {
        self.peers.get(identity).map(|p| p.placement.gain())
    }

    /// The gain actually sent to the peer's sink.
    pub fn effective_gain_of(&self, identity: &Identity) -> Option<f32> {
        self.peers
            .get(identity)
            .map(|p| effective(p.placement.gain(), self.deafened))
    }

    /// Effective gain of every sink, sorted by identity.
    pub fn effective_gains(&self) -> Vec<(Identity, f32)> {
        let mut gains: Vec<(Identity, f32)> = self
            .peers
            .iter()
            .map(|(id, p)| (id.clone(), effective(p.placement.gain(), self.deafened)))
            .collect();
        gains.sort_by(|a, b| a.0.cmp(&b.0));
        gains
    }

    /// Identities that currently have a sink.
    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.peers.keys()
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.peers.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

fn render<S: AudioSink>(peer: &mut PeerAudio<S>, deafened: bool) {
    match peer.placement {
        Placement::Simple { gain } => peer.sink.set_gain(effective(gain, deafened)),
        Placement::Spatial { gain, pan } => {
            peer.sink.set_gain(effective(gain, deafened));
            peer.sink.set_pan(pan);
        }
    }
}

fn effective(gain: f32, deafened: bool) -> f32 {
    if deafened { 0.0 } else { gain }
}

fn clamp_gain(gain: f32) -> f32 {
    if gain.is_nan() { 0.0 } else { gain.clamp(0.0, 1.0) }
}

fn clamp_pan(pan: f32) -> f32 {
    if pan.is_nan() { 0.0 } else { pan.clamp(-1.0, 1.0) }
}
