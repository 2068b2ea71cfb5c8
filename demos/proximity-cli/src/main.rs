//! proximity-cli: run Earshot against a live position feed with no real
//! audio.
//!
//! Connects to a positional WebSocket feed, joins rooms as the local
//! participant moves between regions, and logs every join, remote track
//! and volume change. The media stack is a stand-in that only logs, which
//! makes this handy for checking a feed before wiring up real audio.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use clap::Parser;
use earshot::prelude::*;

#[derive(Parser)]
#[command(name = "proximity-cli", about = "Proximity voice against a position feed, logging only")]
struct Args {
    /// WebSocket URL of the position feed.
    #[arg(long, env = "EARSHOT_PROXIMITY_WS", default_value = "ws://localhost:8765")]
    url: String,

    /// Local identity. Falls back to the one saved in --identity-file.
    #[arg(long, env = "EARSHOT_IDENTITY")]
    identity: Option<String>,

    /// Where the identity is persisted between runs.
    #[arg(long, default_value = "earshot-identity.json")]
    identity_file: PathBuf,

    /// Full volume at or below this distance.
    #[arg(long, default_value_t = earshot::earshot_proximity::DEFAULT_NEAR_DISTANCE)]
    near: f64,

    /// Silence at or beyond this distance.
    #[arg(long, default_value_t = earshot::earshot_proximity::DEFAULT_FAR_DISTANCE)]
    far: f64,

    /// Drive sinks with stereo pan as well as gain.
    #[arg(long)]
    spatial: bool,
}

// ---------------------------------------------------------------------------
// Logging media stack
// ---------------------------------------------------------------------------

/// Media connector that hands out numbered logging clients.
#[derive(Default)]
struct LoggingMedia {
    next: AtomicU64,
}

struct LoggingSession {
    id: u64,
    tracks: Option<TrackSender>,
}

impl MediaConnector for LoggingMedia {
    type Session = LoggingSession;

    async fn connect(&self) -> Result<LoggingSession, SessionError> {
        let id = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(client = id, "media client created");
        Ok(LoggingSession { id, tracks: None })
    }
}

impl MediaSession for LoggingSession {
    fn subscribe_tracks(&mut self, tracks: TrackSender) {
        self.tracks = Some(tracks);
    }

    async fn join(&mut self, key: &SessionKey, identity: &Identity) -> Result<(), SessionError> {
        let epoch = self.tracks.as_ref().map(TrackSender::epoch);
        tracing::info!(client = self.id, %key, %identity, ?epoch, "joined room");
        Ok(())
    }

    async fn publish<H: CaptureHandle>(&mut self, _capture: &H) -> Result<(), SessionError> {
        tracing::info!(client = self.id, "microphone published");
        Ok(())
    }

    async fn close(self) -> Result<(), SessionError> {
        tracing::info!(client = self.id, "media client closed");
        Ok(())
    }
}

struct LoggingMic;

impl CaptureSource for LoggingMic {
    type Handle = LoggingMic;

    async fn acquire_microphone(&mut self) -> Result<LoggingMic, SessionError> {
        tracing::info!("microphone acquired");
        Ok(LoggingMic)
    }
}

impl CaptureHandle for LoggingMic {
    fn set_enabled(&self, enabled: bool) {
        tracing::info!(enabled, "microphone toggled");
    }

    fn release(&self) {
        tracing::info!("microphone released");
    }
}

struct LoggingSpeakers {
    spatial: bool,
}

struct LoggingSink {
    stream_id: String,
    gain: f32,
}

impl AudioRenderer for LoggingSpeakers {
    type Sink = LoggingSink;

    fn supports_spatial(&self) -> bool {
        self.spatial
    }

    fn create_sink(&mut self, track: &RemoteTrack) -> Result<LoggingSink, SessionError> {
        tracing::info!(stream_id = %track.stream_id, peer = %track.identity(), "playing remote track");
        Ok(LoggingSink {
            stream_id: track.stream_id.clone(),
            gain: -1.0,
        })
    }
}

impl AudioSink for LoggingSink {
    fn set_gain(&mut self, gain: f32) {
        if (gain - self.gain).abs() >= 0.01 {
            tracing::info!(stream_id = %self.stream_id, gain = format_args!("{gain:.2}"), "volume");
        }
        self.gain = gain;
    }

    fn set_pan(&mut self, pan: f32) {
        tracing::debug!(stream_id = %self.stream_id, pan = format_args!("{pan:.2}"), "pan");
    }

    fn release(self) {
        tracing::info!(stream_id = %self.stream_id, "remote track stopped");
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

fn config(args: &Args) -> VoiceConfig {
    VoiceConfig {
        proximity: ProximityConfig {
            near_distance: args.near,
            far_distance: args.far,
            ..ProximityConfig::default()
        },
        ..VoiceConfig::default()
    }
}

async fn start(args: &Args) -> Result<ProximityVoice, EarshotError> {
    let voice = ProximityVoice::builder()
        .config(config(args))
        .identity_store(FileIdentityStore::new(&args.identity_file))
        .build(
            WebSocketConnector::new(&args.url),
            LoggingMedia::default(),
            LoggingMic,
            LoggingSpeakers {
                spatial: args.spatial,
            },
        )
        .await?;

    if let Some(identity) = &args.identity {
        voice.set_identity(identity.as_str()).await?;
    }
    match voice.connect().await {
        Ok(()) => {}
        Err(EarshotError::IdentityNotSet) => {
            tracing::warn!("no identity given or saved; pass --identity");
        }
        Err(e) => return Err(e),
    }
    Ok(voice)
}

fn print_nearby(nearby: &[NearbyPeer]) {
    if nearby.is_empty() {
        println!("nobody nearby");
        return;
    }
    let list: Vec<String> = nearby
        .iter()
        .map(|p| format!("{} ({:.1})", p.identity, p.distance))
        .collect();
    println!("nearby: {}", list.join(", "));
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    tracing::info!(url = %args.url, "starting proximity voice");

    let voice = start(&args).await?;
    let mut nearby = voice.subscribe_nearby();

    loop {
        tokio::select! {
            changed = nearby.changed() => {
                if changed.is_err() {
                    break;
                }
                print_nearby(&nearby.borrow_and_update());
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, shutting down");
                break;
            }
        }
    }

    voice.shutdown().await?;
    Ok(())
}
