//! Wire protocol for Earshot.
//!
//! This crate defines what the positional-update feed says and how to read
//! it:
//!
//! - **Types** ([`Identity`], [`Region`], [`PositionRecord`],
//!   [`SessionKey`], [`NearbyPeer`]): the values that travel on the wire
//!   or are handed to the UI.
//! - **Payloads** ([`decode_positions`]): normalization of the single,
//!   batched, and region-keyed message shapes into a flat record list.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those values are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong while doing so.
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (PositionRecord) → Proximity (store, policy)
//! ```

mod codec;
mod error;
mod payload;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use payload::decode_positions;
pub use types::{Identity, NearbyPeer, PositionRecord, Region, SessionKey};
