//! Protocol version and feature negotiation over the hello exchange.

use crate::error::MeshError;
use bitmesh_wire::constants::{
    FEATURE_COMPRESSION, FEATURE_COVER_TRAFFIC, FEATURE_FILE_TRANSFER, FEATURE_MESH_RELAY,
    FEATURE_NOISE, FEATURE_RELAY_BRIDGE, FEATURE_STORE_FORWARD, FEATURE_VOICE_NOTE,
};
use bitmesh_wire::Hello;

/// A set of negotiated capability bits.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureSet(pub u16);

impl FeatureSet {
    pub const COMPRESSION: u16 = FEATURE_COMPRESSION;
    pub const NOISE: u16 = FEATURE_NOISE;
    pub const MESH_RELAY: u16 = FEATURE_MESH_RELAY;
    pub const STORE_FORWARD: u16 = FEATURE_STORE_FORWARD;
    pub const COVER_TRAFFIC: u16 = FEATURE_COVER_TRAFFIC;
    pub const RELAY_BRIDGE: u16 = FEATURE_RELAY_BRIDGE;
    pub const FILE_TRANSFER: u16 = FEATURE_FILE_TRANSFER;
    pub const VOICE_NOTE: u16 = FEATURE_VOICE_NOTE;

    pub fn contains(&self, bits: u16) -> bool {
        self.0 & bits == bits
    }

    pub fn intersect(&self, other: FeatureSet) -> FeatureSet {
        FeatureSet(self.0 & other.0)
    }
}

impl std::fmt::Debug for FeatureSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const NAMES: [(u16, &str); 8] = [
            (FEATURE_COMPRESSION, "compression"),
            (FEATURE_NOISE, "noise"),
            (FEATURE_MESH_RELAY, "meshRelay"),
            (FEATURE_STORE_FORWARD, "storeForward"),
            (FEATURE_COVER_TRAFFIC, "coverTraffic"),
            (FEATURE_RELAY_BRIDGE, "relayBridge"),
            (FEATURE_FILE_TRANSFER, "fileTransfer"),
            (FEATURE_VOICE_NOTE, "voiceNote"),
        ];
        let set: Vec<&str> = NAMES
            .iter()
            .filter(|(bit, _)| self.0 & bit != 0)
            .map(|(_, name)| *name)
            .collect();
        write!(f, "FeatureSet({})", set.join("|"))
    }
}

/// The outcome of a successful hello exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    pub version: u8,
    pub features: FeatureSet,
}

/// Intersects two hellos.
///
/// Fails when either side's version falls below the other's minimum.
pub fn negotiate(ours: &Hello, theirs: &Hello) -> Result<Negotiated, MeshError> {
    if theirs.version < ours.min_version || ours.version < theirs.min_version {
        return Err(MeshError::IncompatibleVersions {
            ours: ours.version,
            theirs: theirs.version,
        });
    }
    Ok(Negotiated {
        version: ours.version.min(theirs.version),
        features: FeatureSet(ours.features & theirs.features),
    })
}
