//! Top-level configuration.

use std::time::Duration;

use earshot_proximity::ProximityConfig;
use earshot_transport::ChannelConfig;

/// How often stale peers are swept when no messages arrive.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Capacity of the façade and session command queues.
pub const DEFAULT_COMMAND_BUFFER: usize = 64;

/// Everything the coordinator needs to know up front.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceConfig {
    /// Position channel reconnect behaviour.
    pub channel: ChannelConfig,
    /// Distances, cutoff and peer expiry.
    pub proximity: ProximityConfig,
    /// Period of the stale-peer sweep.
    pub sweep_interval: Duration,
    /// Command queue capacity.
    pub command_buffer: usize,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            proximity: ProximityConfig::default(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            command_buffer: DEFAULT_COMMAND_BUFFER,
        }
    }
}

impl VoiceConfig {
    /// Returns a copy with unusable values replaced.
    ///
    /// A zero `sweep_interval` or `command_buffer` would make Tokio panic,
    /// so both fall back to their defaults.
    pub fn validated(mut self) -> Self {
        self.proximity = self.proximity.validated();
        if self.sweep_interval.is_zero() {
            tracing::warn!("sweep_interval is zero, using default");
            self.sweep_interval = DEFAULT_SWEEP_INTERVAL;
        }
        if self.command_buffer == 0 {
            tracing::warn!("command_buffer is zero, using default");
            self.command_buffer = DEFAULT_COMMAND_BUFFER;
        }
        self
    }
}
