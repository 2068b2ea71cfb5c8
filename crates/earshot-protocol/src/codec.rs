//! Byte-level codecs for position payloads.
//!
//! Everything above this module works with typed records; the [`Codec`]
//! trait is the single place that knows the bytes are JSON. Earshot only
//! ever reads from the feed, so a codec only decodes. Feeds that
//! speak something else plug in their own implementation through
//! `ProximityVoiceBuilder::codec`.

use serde::de::DeserializeOwned;

use crate::ProtocolError;

/// Turns bytes into typed values.
///
/// The codec is moved into the coordinator task for its whole lifetime,
/// hence `Send + Sync + 'static`. Decoded values own their data, so the
/// frame buffer can be dropped right after `decode` returns.
pub trait Codec: Send + Sync + 'static {
    /// # Errors
    /// [`ProtocolError::Decode`] if `data` is not a valid `T`.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// JSON through `serde_json`. Needs the default `json` feature.
///
/// # Example
///
/// ```rust
/// use earshot_protocol::{Codec, JsonCodec, PositionRecord};
///
/// let bytes = br#"{"guid": "player-1", "map": 1, "x": 10, "y": 0}"#;
/// let record: PositionRecord = JsonCodec.decode(bytes).unwrap();
/// assert_eq!(record, PositionRecord::new("player-1", 1u64, 10.0, 0.0));
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
