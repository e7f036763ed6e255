//! Test support: deterministic identities, a scripted radio adapter, and a
//! virtual airspace for multi-node mesh simulations.

pub mod adapter;
pub mod airspace;

pub use adapter::{AdapterCall, MockAdapter};
pub use airspace::{AirspaceAdapter, VirtualAirspace};

use crate::identity::MeshIdentity;

/// An identity derived from a fixed, recognizable seed.
pub fn identity_from_byte(byte: u8) -> MeshIdentity {
    MeshIdentity::from_seed([byte; 32])
}
