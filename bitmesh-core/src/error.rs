use crate::identity::IdentityError;
use bitmesh_wire::WireError;
use thiserror::Error;

/// Errors surfaced by the mesh transport core.
///
/// Per-link write failures, individual malformed frames, and relay
/// disconnects never appear here: they are dropped silently and counted in
/// [`crate::metrics::MeshMetrics`].
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),
    #[error("signature invalid")]
    SignatureInvalid,
    #[error("link write failed: {0}")]
    LinkWriteFailed(String),
    #[error("link unavailable: {0}")]
    LinkUnavailable(String),
    #[error("radio adapter is off")]
    AdapterOff,
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("rate limited on channel {0}")]
    RateLimited(String),
    #[error("incompatible protocol versions: ours {ours}, theirs {theirs}")]
    IncompatibleVersions { ours: u8, theirs: u8 },
    #[error("mesh service disposed")]
    Disposed,
}

pub type MeshResult<T> = Result<T, MeshError>;
