use thiserror::Error;

/// Errors from the relay client and the DM crypto layer.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay protocol error: {0}")]
    Protocol(String),
    #[error("invalid key material")]
    InvalidKey,
    #[error("signature invalid")]
    SignatureInvalid,
    #[error("decrypt failed")]
    DecryptFailed,
    #[error("relay pool disposed")]
    Disposed,
}

pub type RelayResult<T> = Result<T, RelayError>;
