//! Error types for the wire protocol.

use crate::MAX_CONTROL_LEN;

/// Errors produced while encoding, framing or parsing control messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("control message too large: {0} bytes (max {MAX_CONTROL_LEN})")]
    FrameTooLarge(usize),
}
