//! Error types for transfer sessions.

use std::path::PathBuf;

use fleetota_protocol::{ImageDigest, ProtocolError};
use fleetota_transfer::TransferError;

/// Errors that end a single transfer session.
///
/// None of these are fatal to the process; every session is isolated.
#[derive(Debug, thiserror::Error)]
pub enum DataChannelError {
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("connection timed out")]
    Timeout,

    #[error("protocol parse error: {0}")]
    ProtocolParse(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        expected: ImageDigest,
        actual: ImageDigest,
    },

    #[error("metadata acknowledgment failed: {0}")]
    MetadataAckFailure(String),

    #[error("source declined to serve its image")]
    SourceUnavailable,

    #[error("another session is already writing {}", .0.display())]
    FileBusy(PathBuf),
}

impl From<ProtocolError> for DataChannelError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::Io(e) => DataChannelError::Connection(e),
            ProtocolError::Malformed(msg) => DataChannelError::ProtocolParse(msg),
            e @ ProtocolError::FrameTooLarge(_) => DataChannelError::ProtocolParse(e.to_string()),
        }
    }
}

impl From<TransferError> for DataChannelError {
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::Io(e) => DataChannelError::Connection(e),
            TransferError::Timeout(_) => DataChannelError::Timeout,
            TransferError::ChecksumMismatch { expected, actual } => {
                DataChannelError::ChecksumMismatch { expected, actual }
            }
        }
    }
}
