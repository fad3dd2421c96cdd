//! Error types for the control-plane client.

use thiserror::Error;

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the control-plane client.
///
/// Transient transport and HTTP failures are retried inside the client and
/// never appear here: every variant below is fatal to the process.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("unable to authenticate or renew credential: {0}")]
    Auth(String),

    #[error("response body still malformed after {attempts} decode attempts: {last}")]
    DecodeThreshold { attempts: u32, last: String },

    #[error("invalid request for {path}: {reason}")]
    Request { path: String, reason: String },
}
