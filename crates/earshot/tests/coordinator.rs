//! Integration tests for the coordinator, driven through the public façade
//! with in-process mock collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use earshot::prelude::*;
use tokio::sync::{Notify, mpsc};

// =========================================================================
// Mock position feed
// =========================================================================

/// Connector whose channels are fed by the test.
#[derive(Clone, Default)]
struct MockFeed {
    connects: Arc<AtomicUsize>,
    feeds: Arc<Mutex<Vec<mpsc::UnboundedSender<Vec<u8>>>>>,
}

impl MockFeed {
    fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Sends `json` on the most recent channel.
    fn send(&self, json: &str) {
        let feeds = self.feeds.lock().unwrap();
        feeds
            .last()
            .expect("no channel open")
            .send(json.as_bytes().to_vec())
            .expect("channel closed");
    }
}

struct MockFeedConnection {
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl Connector for MockFeed {
    type Connection = MockFeedConnection;

    async fn connect(&self) -> Result<MockFeedConnection, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.feeds.lock().unwrap().push(tx);
        Ok(MockFeedConnection {
            rx: tokio::sync::Mutex::new(rx),
        })
    }
}

impl Connection for MockFeedConnection {
    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(self.rx.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.rx.lock().await.close();
        Ok(())
    }
}

// =========================================================================
// Mock media stack
// =========================================================================

#[derive(Clone, Default)]
struct MockMedia {
    calls: Arc<Mutex<Vec<String>>>,
    live: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
    tracks: Arc<Mutex<Option<TrackSender>>>,
    /// Every join is refused by the room.
    fail_join: Arc<AtomicBool>,
    /// Joins block until `release` is notified.
    hold_join: Arc<AtomicBool>,
    release: Arc<Notify>,
}

impl MockMedia {
    fn joins(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with("join"))
            .cloned()
            .collect()
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn track_sender(&self) -> TrackSender {
        self.tracks.lock().unwrap().clone().expect("no session subscribed")
    }
}

struct MockClient(MockMedia);

impl MediaConnector for MockMedia {
    type Session = MockClient;

    async fn connect(&self) -> Result<MockClient, SessionError> {
        self.calls.lock().unwrap().push("connect".into());
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(MockClient(self.clone()))
    }
}

impl MediaSession for MockClient {
    fn subscribe_tracks(&mut self, tracks: TrackSender) {
        *self.0.tracks.lock().unwrap() = Some(tracks);
    }

    async fn join(
        &mut self,
        key: &SessionKey,
        identity: &Identity,
    ) -> Result<(), SessionError> {
        self.0.calls.lock().unwrap().push(format!("join {key} as {identity}"));
        if self.0.hold_join.load(Ordering::SeqCst) {
            self.0.release.notified().await;
        }
        if self.0.fail_join.load(Ordering::SeqCst) {
            return Err(SessionError::JoinFailed("room refused".into()));
        }
        Ok(())
    }

    async fn publish<H: CaptureHandle>(
        &mut self,
        _capture: &H,
    ) -> Result<(), SessionError> {
        Ok(())
    }

    async fn close(self) -> Result<(), SessionError> {
        self.0.calls.lock().unwrap().push("close".into());
        self.0.live.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone, Default)]
struct MockMic {
    enabled: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
}

impl CaptureSource for MockMic {
    type Handle = MockMic;

    async fn acquire_microphone(&mut self) -> Result<MockMic, SessionError> {
        Ok(self.clone())
    }
}

impl CaptureHandle for MockMic {
    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Renderer that records the last gain sent to each stream.
#[derive(Clone, Default)]
struct MockSpeakers {
    gains: Arc<Mutex<HashMap<String, f32>>>,
}

impl MockSpeakers {
    fn gain(&self, stream_id: &str) -> Option<f32> {
        self.gains.lock().unwrap().get(stream_id).copied()
    }
}

struct MockSink {
    stream_id: String,
    gains: Arc<Mutex<HashMap<String, f32>>>,
}

impl AudioRenderer for MockSpeakers {
    type Sink = MockSink;

    fn supports_spatial(&self) -> bool {
        false
    }

    fn create_sink(&mut self, track: &RemoteTrack) -> Result<MockSink, SessionError> {
        Ok(MockSink {
            stream_id: track.stream_id.clone(),
            gains: Arc::clone(&self.gains),
        })
    }
}

impl AudioSink for MockSink {
    fn set_gain(&mut self, gain: f32) {
        self.gains.lock().unwrap().insert(self.stream_id.clone(), gain);
    }

    fn set_pan(&mut self, _pan: f32) {}

    fn release(self) {
        self.gains.lock().unwrap().remove(&self.stream_id);
    }
}

/// Identity store whose saved file is corrupt.
struct UnreadableStore;

impl IdentityStore for UnreadableStore {
    async fn load(&self) -> std::io::Result<Option<Identity>> {
        Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "not json"))
    }

    async fn save(&self, _identity: &Identity) -> std::io::Result<()> {
        Ok(())
    }
}

/// Identity store the test can inspect after handing it to the builder.
#[derive(Clone, Default)]
struct SharedStore(Arc<MemoryIdentityStore>);

impl IdentityStore for SharedStore {
    async fn load(&self) -> std::io::Result<Option<Identity>> {
        self.0.load().await
    }

    async fn save(&self, identity: &Identity) -> std::io::Result<()> {
        self.0.save(identity).await
    }
}

// =========================================================================
// Harness
// =========================================================================

struct Harness {
    voice: ProximityVoice,
    feed: MockFeed,
    media: MockMedia,
    mic: MockMic,
    speakers: MockSpeakers,
}

async fn start_with(store: SharedStore) -> Harness {
    let feed = MockFeed::default();
    let media = MockMedia::default();
    let mic = MockMic::default();
    let speakers = MockSpeakers::default();

    let voice = ProximityVoice::builder()
        .identity_store(store)
        .build(feed.clone(), media.clone(), mic.clone(), speakers.clone())
        .await
        .expect("build should succeed");

    Harness {
        voice,
        feed,
        media,
        mic,
        speakers,
    }
}

/// Starts with identity "me" set and the channel open.
async fn start_connected() -> Harness {
    let h = start_with(SharedStore::default()).await;
    h.voice.set_identity("me").await.unwrap();
    h.voice.connect().await.unwrap();
    wait_status(&h.voice, "channel open", |s| s.channel == ChannelState::Open).await;
    h
}

/// Polls `status()` until `cond` holds.
async fn wait_status(
    voice: &ProximityVoice,
    what: &str,
    cond: impl Fn(&VoiceStatus) -> bool,
) -> VoiceStatus {
    for _ in 0..400 {
        let status = voice.status().await.unwrap();
        if cond(&status) {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Polls `cond` until it holds.
async fn wait_for(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

fn room(region: &str) -> SessionKey {
    SessionKey::for_region(&Region::from(region))
}

fn in_room(region: &'static str) -> impl Fn(&VoiceStatus) -> bool {
    move |s| s.session.as_ref() == Some(&room(region))
}

// =========================================================================
// Façade basics
// =========================================================================

#[tokio::test]
async fn test_connect_without_identity_is_rejected() {
    let h = start_with(SharedStore::default()).await;
    let result = h.voice.connect().await;
    assert!(matches!(result, Err(EarshotError::IdentityNotSet)));
    assert_eq!(h.feed.connects(), 0);
}

#[tokio::test]
async fn test_connect_twice_opens_one_channel() {
    let h = start_connected().await;
    h.voice.connect().await.unwrap();
    h.voice.connect().await.unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.feed.connects(), 1);
}

#[tokio::test]
async fn test_set_identity_persists() {
    let store = SharedStore::default();
    let h = start_with(store.clone()).await;
    h.voice.set_identity(42u64).await.unwrap();

    assert_eq!(store.load().await.unwrap(), Some(Identity::from("42")));
    let status = h.voice.status().await.unwrap();
    assert_eq!(status.identity, Some(Identity::from("42")));
}

#[tokio::test]
async fn test_unreadable_identity_store_starts_without_identity() {
    let feed = MockFeed::default();
    let voice = ProximityVoice::builder()
        .identity_store(UnreadableStore)
        .build(
            feed.clone(),
            MockMedia::default(),
            MockMic::default(),
            MockSpeakers::default(),
        )
        .await
        .expect("an unreadable store must not stop startup");

    let status = voice.status().await.unwrap();
    assert_eq!(status.identity, None);
    assert_eq!(status.channel, ChannelState::Closed);
    assert!(matches!(voice.connect().await, Err(EarshotError::IdentityNotSet)));

    voice.set_identity("me").await.unwrap();
    voice.connect().await.unwrap();
    wait_status(&voice, "channel open", |s| s.channel == ChannelState::Open).await;
    assert_eq!(feed.connects(), 1);
}

#[tokio::test]
async fn test_saved_identity_connects_automatically() {
    let store = SharedStore(Arc::new(MemoryIdentityStore::with_identity("me")));
    let h = start_with(store).await;

    wait_status(&h.voice, "auto connect", |s| s.channel == ChannelState::Open).await;
    assert_eq!(h.feed.connects(), 1);

    h.feed.send(r#"{"identity":"me","region":1,"x":0,"y":0}"#);
    wait_status(&h.voice, "room-1", in_room("1")).await;
}

// =========================================================================
// Membership scenarios
// =========================================================================

#[tokio::test]
async fn test_no_session_before_first_self_position() {
    let h = start_connected().await;
    h.feed.send(r#"{"identity":"p","region":1,"x":1,"y":0}"#);

    tokio::time::sleep(Duration::from_millis(30)).await;
    let status = h.voice.status().await.unwrap();
    assert_eq!(status.session, None);
    assert!(h.media.joins().is_empty());
}

#[tokio::test]
async fn test_scenario_a_peer_ten_units_away_gain() {
    let h = start_connected().await;
    h.feed.send(
        r#"[{"identity":"me","region":1,"x":0,"y":0},
            {"identity":"p","region":1,"x":10,"y":0}]"#,
    );
    wait_status(&h.voice, "room-1", in_room("1")).await;

    let nearby = h.voice.nearby_peers();
    assert_eq!(nearby.len(), 1);
    assert_eq!(nearby[0].identity, Identity::from("p"));
    assert_eq!(nearby[0].distance, 10.0);

    h.media.track_sender().added(RemoteTrack::audio("p", "s-p"));
    wait_for("sink for p", || h.speakers.gain("s-p").is_some()).await;
    let gain = h.speakers.gain("s-p").unwrap();
    assert!((gain - 40.0 / 49.0).abs() < 1e-4, "gain was {gain}");
}

#[tokio::test]
async fn test_scenario_b_region_change_rejoins() {
    let h = start_connected().await;
    h.feed.send(r#"{"identity":"me","region":1,"x":0,"y":0}"#);
    wait_status(&h.voice, "room-1", in_room("1")).await;

    h.feed.send(r#"{"identity":"me","region":2,"x":0,"y":0}"#);
    wait_status(&h.voice, "room-2", in_room("2")).await;

    assert_eq!(h.media.joins(), vec!["join room-1 as me", "join room-2 as me"]);
    let calls = h.media.calls();
    let close = calls.iter().position(|c| c == "close").unwrap();
    let second = calls.iter().rposition(|c| c == "connect").unwrap();
    assert!(close < second, "old client closed before new one: {calls:?}");
    assert_eq!(h.media.max_live.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_scenario_c_empty_neighbourhood_never_leaves() {
    let h = start_connected().await;
    h.feed.send(
        r#"[{"identity":"me","region":1,"x":0,"y":0},
            {"identity":"p","region":1,"x":3,"y":0}]"#,
    );
    wait_status(&h.voice, "room-1 with p", |s| {
        s.session.as_ref() == Some(&room("1")) && s.nearby.len() == 1
    })
    .await;

    h.feed.send(r#"{"identity":"p","region":1,"x":500,"y":0}"#);
    h.feed.send(r#"{"identity":"me","region":1,"x":1,"y":0}"#);
    let status =
        wait_status(&h.voice, "empty nearby", |s| s.nearby.is_empty()).await;

    assert_eq!(status.session, Some(room("1")));
    assert_eq!(h.media.joins().len(), 1);
    assert!(!h.media.calls().contains(&"close".to_string()));
}

#[tokio::test]
async fn test_scenario_d_malformed_message_is_dropped() {
    let h = start_connected().await;
    h.feed.send(
        r#"[{"identity":"me","region":1,"x":0,"y":0},
            {"identity":"p","region":1,"x":5,"y":0}]"#,
    );
    let before = wait_status(&h.voice, "p nearby", |s| s.nearby.len() == 1).await;

    h.feed.send("{not json");
    h.feed.send(r#"{"identity":"p","region":1}"#);
    tokio::time::sleep(Duration::from_millis(30)).await;

    let after = h.voice.status().await.unwrap();
    assert_eq!(after.nearby, before.nearby);
    assert_eq!(after.channel, ChannelState::Open);
    assert_eq!(h.feed.connects(), 1, "no reconnect on bad payload");
}

#[tokio::test]
async fn test_scenario_e_deafen_restores_distance_gain() {
    let h = start_connected().await;
    // (50 - 10.8) / 49 = 0.8
    h.feed.send(
        r#"[{"identity":"me","region":1,"x":0,"y":0},
            {"identity":"p","region":1,"x":10.8,"y":0}]"#,
    );
    wait_status(&h.voice, "room-1", in_room("1")).await;
    h.media.track_sender().added(RemoteTrack::audio("p", "s-p"));
    wait_for("sink for p", || h.speakers.gain("s-p").is_some()).await;
    assert!((h.speakers.gain("s-p").unwrap() - 0.8).abs() < 1e-4);

    h.voice.set_deafened(true).await.unwrap();
    assert_eq!(h.speakers.gain("s-p"), Some(0.0));
    wait_for("mic disabled", || !h.mic.enabled.load(Ordering::SeqCst)).await;

    h.voice.set_deafened(false).await.unwrap();
    assert!((h.speakers.gain("s-p").unwrap() - 0.8).abs() < 1e-4);
    wait_for("mic enabled", || h.mic.enabled.load(Ordering::SeqCst)).await;
}

#[tokio::test]
async fn test_undeafen_keeps_mic_off_when_muted() {
    let h = start_connected().await;
    h.feed.send(r#"{"identity":"me","region":1,"x":0,"y":0}"#);
    wait_status(&h.voice, "room-1", in_room("1")).await;

    h.voice.set_muted(true).await.unwrap();
    h.voice.set_deafened(true).await.unwrap();
    h.voice.set_deafened(false).await.unwrap();

    let status = h.voice.status().await.unwrap();
    assert!(status.muted && !status.deafened);
    wait_for("mic disabled", || !h.mic.enabled.load(Ordering::SeqCst)).await;
}

#[tokio::test]
async fn test_changing_identity_leaves_and_starts_over() {
    let h = start_connected().await;
    h.feed.send(r#"{"identity":"me","region":1,"x":0,"y":0}"#);
    wait_status(&h.voice, "room-1", in_room("1")).await;

    h.voice.set_identity("other").await.unwrap();
    let status = h.voice.status().await.unwrap();
    assert_eq!(status.session, None);
    wait_for("old client closed", || h.media.live() == 0).await;

    // Positions for the old identity are now just a peer.
    h.feed.send(r#"{"identity":"me","region":1,"x":0,"y":0}"#);
    h.feed.send(r#"{"identity":"other","region":1,"x":3,"y":4}"#);
    wait_status(&h.voice, "room-1 as other", in_room("1")).await;

    assert_eq!(h.media.joins(), vec!["join room-1 as me", "join room-1 as other"]);
    assert_eq!(h.voice.nearby_peers()[0].identity, Identity::from("me"));
}

#[tokio::test]
async fn test_switching_to_a_seen_peer_never_lists_self_as_nearby() {
    let h = start_connected().await;
    h.feed.send(
        r#"[{"identity":"me","region":1,"x":0,"y":0},
            {"identity":"p","region":1,"x":3,"y":0}]"#,
    );
    wait_status(&h.voice, "room-1 with p", |s| {
        s.session.as_ref() == Some(&room("1")) && s.nearby.len() == 1
    })
    .await;

    h.voice.set_identity("p").await.unwrap();
    h.feed.send(r#"{"identity":"p","region":1,"x":50,"y":0}"#);
    let status = wait_status(&h.voice, "room-1 as p", in_room("1")).await;
    assert!(status.nearby.is_empty(), "self listed as peer: {:?}", status.nearby);

    h.feed.send(r#"{"identity":"me","region":1,"x":0,"y":0}"#);
    let status = wait_status(&h.voice, "me nearby", |s| s.nearby.len() == 1).await;
    assert_eq!(status.nearby[0].identity, Identity::from("me"));
    assert_eq!(status.nearby[0].distance, 50.0);
}

// =========================================================================
// Join failures and joins in flight
// =========================================================================

#[tokio::test]
async fn test_failed_join_keeps_key_and_does_not_retry() {
    let h = start_connected().await;
    h.media.fail_join.store(true, Ordering::SeqCst);

    h.feed.send(r#"{"identity":"me","region":1,"x":0,"y":0}"#);
    wait_status(&h.voice, "room-1 recorded", in_room("1")).await;

    h.feed.send(
        r#"[{"identity":"me","region":1,"x":1,"y":0},
            {"identity":"p","region":1,"x":4,"y":0}]"#,
    );
    h.feed.send(r#"{"identity":"me","region":1,"x":4,"y":0}"#);
    let status = wait_status(&h.voice, "p at distance 0", |s| {
        s.nearby.len() == 1 && s.nearby[0].distance == 0.0
    })
    .await;

    assert_eq!(status.session, Some(room("1")));
    assert_eq!(h.media.joins(), vec!["join room-1 as me"]);
}

#[tokio::test]
async fn test_region_change_during_join_is_applied_after_it_settles() {
    let h = start_connected().await;
    h.media.hold_join.store(true, Ordering::SeqCst);

    h.feed.send(r#"{"identity":"me","region":1,"x":0,"y":0}"#);
    wait_for("room-1 join started", || h.media.joins().len() == 1).await;

    h.feed.send(
        r#"[{"identity":"me","region":2,"x":0,"y":0},
            {"identity":"q","region":2,"x":1,"y":0}]"#,
    );
    let status = wait_status(&h.voice, "q nearby", |s| s.nearby.len() == 1).await;
    assert_eq!(status.session, None, "join still in flight");
    assert_eq!(h.media.joins().len(), 1, "policy waits for the pending join");

    h.media.hold_join.store(false, Ordering::SeqCst);
    h.media.release.notify_one();
    wait_status(&h.voice, "room-2", in_room("2")).await;

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(h.media.joins(), vec!["join room-1 as me", "join room-2 as me"]);
    assert_eq!(h.media.max_live.load(Ordering::SeqCst), 1);
}

// =========================================================================
// Regions and audio
// =========================================================================

#[tokio::test]
async fn test_other_region_peer_is_silent_and_not_nearby() {
    let h = start_connected().await;
    h.feed.send(r#"{"1":[{"guid":"me","x":0,"y":0}],"2":[{"guid":"p","x":0,"y":0}]}"#);
    wait_status(&h.voice, "room-1", in_room("1")).await;
    assert!(h.voice.nearby_peers().is_empty());

    h.media.track_sender().added(RemoteTrack::audio("p", "s-p"));
    wait_for("sink for p", || h.speakers.gain("s-p").is_some()).await;
    assert_eq!(h.speakers.gain("s-p"), Some(0.0));
}

#[tokio::test]
async fn test_peer_leaving_region_is_silenced() {
    let h = start_connected().await;
    h.feed.send(
        r#"[{"identity":"me","region":1,"x":0,"y":0},
            {"identity":"p","region":1,"x":1,"y":0}]"#,
    );
    wait_status(&h.voice, "room-1", in_room("1")).await;
    h.media.track_sender().added(RemoteTrack::audio("p", "s-p"));
    wait_for("p at full", || h.speakers.gain("s-p") == Some(1.0)).await;

    h.feed.send(r#"{"identity":"p","region":9,"x":1,"y":0}"#);
    wait_for("p silenced", || h.speakers.gain("s-p") == Some(0.0)).await;
}

#[tokio::test]
async fn test_unknown_peer_track_starts_at_full_volume() {
    let h = start_connected().await;
    h.feed.send(r#"{"identity":"me","region":1,"x":0,"y":0}"#);
    wait_status(&h.voice, "room-1", in_room("1")).await;

    h.media.track_sender().added(RemoteTrack::audio("stranger", "s-x"));
    wait_for("sink for stranger", || h.speakers.gain("s-x") == Some(1.0)).await;
}

#[tokio::test]
async fn test_tracks_from_old_session_are_ignored() {
    let h = start_connected().await;
    h.feed.send(r#"{"identity":"me","region":1,"x":0,"y":0}"#);
    wait_status(&h.voice, "room-1", in_room("1")).await;
    let old_tracks = h.media.track_sender();

    h.feed.send(r#"{"identity":"me","region":2,"x":0,"y":0}"#);
    wait_status(&h.voice, "room-2", in_room("2")).await;

    old_tracks.added(RemoteTrack::audio("ghost", "s-old"));
    h.media.track_sender().added(RemoteTrack::audio("p", "s-new"));
    wait_for("new track rendered", || h.speakers.gain("s-new").is_some()).await;
    assert_eq!(h.speakers.gain("s-old"), None);
}

#[tokio::test]
async fn test_rejoin_disposes_previous_sinks() {
    let h = start_connected().await;
    h.feed.send(r#"{"identity":"me","region":1,"x":0,"y":0}"#);
    wait_status(&h.voice, "room-1", in_room("1")).await;
    h.media.track_sender().added(RemoteTrack::audio("p", "s-p"));
    wait_for("sink for p", || h.speakers.gain("s-p").is_some()).await;

    h.feed.send(r#"{"identity":"me","region":2,"x":0,"y":0}"#);
    wait_status(&h.voice, "room-2", in_room("2")).await;
    wait_for("old sink released", || h.speakers.gain("s-p").is_none()).await;
    let status = h.voice.status().await.unwrap();
    assert!(status.peer_gains.is_empty());
}

#[tokio::test]
async fn test_track_removed_releases_sink() {
    let h = start_connected().await;
    h.feed.send(r#"{"identity":"me","region":1,"x":0,"y":0}"#);
    wait_status(&h.voice, "room-1", in_room("1")).await;
    let tracks = h.media.track_sender();
    tracks.added(RemoteTrack::audio("p", "s-p"));
    wait_for("sink for p", || h.speakers.gain("s-p").is_some()).await;

    tracks.removed("s-p");
    wait_for("sink released", || h.speakers.gain("s-p").is_none()).await;
}

// =========================================================================
// Expiry
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_silent_peer_expires_and_is_muted() {
    let h = start_connected().await;
    h.feed.send(
        r#"[{"identity":"me","region":1,"x":0,"y":0},
            {"identity":"p","region":1,"x":1,"y":0}]"#,
    );
    wait_status(&h.voice, "room-1", in_room("1")).await;
    h.media.track_sender().added(RemoteTrack::audio("p", "s-p"));
    wait_for("p at full", || h.speakers.gain("s-p") == Some(1.0)).await;

    // Past the 10 s TTL; the 1 s sweep expires p with no new messages.
    tokio::time::sleep(Duration::from_secs(12)).await;

    let status = h.voice.status().await.unwrap();
    assert!(status.nearby.is_empty());
    assert_eq!(h.speakers.gain("s-p"), Some(0.0));
    assert_eq!(status.session, Some(room("1")), "expiry never leaves");
}

// =========================================================================
// Disconnect and shutdown
// =========================================================================

#[tokio::test]
async fn test_disconnect_closes_everything_without_reconnect() {
    let h = start_connected().await;
    h.feed.send(
        r#"[{"identity":"me","region":1,"x":0,"y":0},
            {"identity":"p","region":1,"x":1,"y":0}]"#,
    );
    wait_status(&h.voice, "room-1", in_room("1")).await;

    h.voice.disconnect().await.unwrap();
    assert_eq!(h.media.live(), 0);

    let status = h.voice.status().await.unwrap();
    assert_eq!(status.channel, ChannelState::Closed);
    assert_eq!(status.session, None);
    assert!(status.nearby.is_empty());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.feed.connects(), 1, "manual close suppresses reconnect");
}

#[tokio::test]
async fn test_connect_after_disconnect_starts_over() {
    let h = start_connected().await;
    h.feed.send(r#"{"identity":"me","region":1,"x":0,"y":0}"#);
    wait_status(&h.voice, "room-1", in_room("1")).await;

    h.voice.disconnect().await.unwrap();
    h.voice.connect().await.unwrap();
    wait_status(&h.voice, "channel open", |s| s.channel == ChannelState::Open).await;

    // Same region as before, but memory was cleared: join again.
    h.feed.send(r#"{"identity":"me","region":1,"x":0,"y":0}"#);
    wait_status(&h.voice, "room-1 again", in_room("1")).await;
    assert_eq!(h.media.joins().len(), 2);
}

#[tokio::test]
async fn test_shutdown_releases_microphone() {
    let h = start_connected().await;
    h.feed.send(r#"{"identity":"me","region":1,"x":0,"y":0}"#);
    wait_status(&h.voice, "room-1", in_room("1")).await;

    let mic = h.mic.clone();
    let media = h.media.clone();
    h.voice.shutdown().await.unwrap();

    assert!(mic.released.load(Ordering::SeqCst));
    assert_eq!(media.live(), 0);
}

// =========================================================================
// Over a real WebSocket
// =========================================================================

#[tokio::test]
async fn test_websocket_feed_drives_membership() {
    use futures_util::SinkExt;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Text(
            r#"{"1":[{"guid":"me","x":0,"y":0},{"guid":"p","x":6,"y":8}]}"#.into(),
        ))
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
    });

    let media = MockMedia::default();
    let voice = ProximityVoice::builder()
        .identity_store(MemoryIdentityStore::with_identity("me"))
        .build(
            WebSocketConnector::new(format!("ws://{addr}")),
            media.clone(),
            MockMic::default(),
            MockSpeakers::default(),
        )
        .await
        .unwrap();

    let status = wait_status(&voice, "room-1 with p", |s| {
        s.session.as_ref() == Some(&room("1")) && s.nearby.len() == 1
    })
    .await;
    assert_eq!(status.nearby[0].distance, 10.0);
    assert_eq!(media.joins(), vec!["join room-1 as me"]);

    voice.shutdown().await.unwrap();
}
