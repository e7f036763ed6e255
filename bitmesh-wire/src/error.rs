use thiserror::Error;

/// Errors that can occur while encoding or decoding wire frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),
    #[error("unknown wire version {0}")]
    UnknownVersion(u8),
    #[error("truncated payload: need {needed} bytes, have {have}")]
    TruncatedPayload { needed: usize, have: usize },
    #[error("bad padding")]
    BadPadding,
    #[error("invalid link MTU")]
    InvalidMtu,
    #[error("message too large to fragment")]
    MessageTooLarge,
}

pub type WireResult<T> = Result<T, WireError>;
