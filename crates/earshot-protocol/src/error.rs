//! Protocol errors.
//!
//! A `ProtocolError` always means "these bytes are not position records".
//! It never signals a network or session problem, and
//! the coordinator never reconnects because of one.

/// Why a payload could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Malformed JSON, a shape that is none of record/batch/region map,
    /// or a coordinate that is not a number.
    #[cfg(feature = "json")]
    #[error("could not decode position payload: {0}")]
    Decode(serde_json::Error),

    /// Well-formed JSON that still breaks a rule, such as a record with
    /// no region outside a region-keyed map.
    #[error("invalid position message: {0}")]
    InvalidMessage(String),
}
