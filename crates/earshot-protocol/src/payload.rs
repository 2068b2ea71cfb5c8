//! Normalization of the three payload shapes a position feed may send.
//!
//! A single message from the positional channel is one of:
//!
//! ```text
//! { "identity": "a", "region": 1, "x": 0, "y": 0 }          // one record
//! [ { ...record... }, { ...record... } ]                     // a batch
//! { "1": [ { ...record... } ], "2": [ { ...record... } ] }   // keyed by region
//! ```
//!
//! Whatever the shape, the coordinator only ever sees a flat
//! `Vec<PositionRecord>`.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::{Codec, Identity, PositionRecord, ProtocolError, Region};

/// A record as it appears on the wire, before its region is resolved.
///
/// Inside the region-keyed shape the region is usually implied by the key,
/// so it is optional here and filled in during normalization.
#[derive(Deserialize)]
struct WireRecord {
    #[serde(alias = "guid")]
    identity: Identity,
    #[serde(default, alias = "map")]
    region: Option<Region>,
    x: f64,
    y: f64,
    #[serde(default)]
    z: Option<f64>,
    #[serde(default)]
    timestamp: Option<u64>,
}

impl WireRecord {
    fn resolve(
        self,
        implied: Option<&Region>,
    ) -> Result<PositionRecord, ProtocolError> {
        // A record's own region wins over the key it was filed under.
        let region = match (self.region, implied) {
            (Some(region), _) => region,
            (None, Some(region)) => region.clone(),
            (None, None) => {
                return Err(ProtocolError::InvalidMessage(format!(
                    "record for {} has no region",
                    self.identity
                )));
            }
        };
        Ok(PositionRecord {
            identity: self.identity,
            region,
            x: self.x,
            y: self.y,
            z: self.z,
            timestamp: self.timestamp,
        })
    }
}

/// The three accepted payload shapes.
///
/// Variant order matters for `#[serde(untagged)]`: a lone record is tried
/// before the region-keyed map because both are JSON objects. A region map
/// never matches `Single` since it has no `identity` field.
#[derive(Deserialize)]
#[serde(untagged)]
enum PositionPayload {
    Single(WireRecord),
    Batch(Vec<WireRecord>),
    ByRegion(BTreeMap<Region, Vec<WireRecord>>),
}

impl PositionPayload {
    fn into_records(self) -> Result<Vec<PositionRecord>, ProtocolError> {
        match self {
            Self::Single(record) => Ok(vec![record.resolve(None)?]),
            Self::Batch(records) => records
                .into_iter()
                .map(|r| r.resolve(None))
                .collect(),
            Self::ByRegion(regions) => {
                let mut out = Vec::new();
                for (region, records) in regions {
                    for record in records {
                        out.push(record.resolve(Some(&region))?);
                    }
                }
                Ok(out)
            }
        }
    }
}

/// Decodes one positional message into a flat list of records.
///
/// Either the whole message decodes or none of it does: a single bad
/// record rejects the message, so a half-applied update can never reach
/// the position store.
///
/// # Errors
/// - [`ProtocolError::Decode`] if the bytes match none of the shapes.
/// - [`ProtocolError::InvalidMessage`] if a record has no region.
pub fn decode_positions<C: Codec>(
    codec: &C,
    data: &[u8],
) -> Result<Vec<PositionRecord>, ProtocolError> {
    codec.decode::<PositionPayload>(data)?.into_records()
}
