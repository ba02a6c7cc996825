//! Resumable image storage, digest verification and the streaming loop.
//!
//! Everything here is role-agnostic: the same pieces back both the
//! Initiator (receiving) and the Source (serving) side of a session.

mod digest;
mod image;
mod lock;
mod session;
mod status;
mod stream;

use std::time::Duration;

use fleetota_protocol::ImageDigest;

pub use digest::{
    DIGEST_BUF_SIZE, describe_file, digest_bytes, digest_file, digest_reader, verify_file,
};
pub use image::ImageFile;
pub use lock::{WriterGuard, WriterRegistry};
pub use session::TransferSession;
pub use status::ImageStatus;
pub use stream::{StreamOptions, receive_into, send_from};

/// Default streaming block size: 64 KiB.
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Default per-block read/write deadline.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        expected: ImageDigest,
        actual: ImageDigest,
    },

    #[error("I/O deadline of {0:?} expired")]
    Timeout(Duration),
}
