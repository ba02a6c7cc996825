use fleetota_protocol::{ImageDigest, Metadata};

/// Byte accounting for one handshake-plus-streaming exchange.
///
/// Lives exactly as long as the connection carrying it. Nothing here is
/// persisted: the next session re-derives `resume_offset` from the local
/// file size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSession {
    resume_offset: u64,
    declared_size: u64,
    declared_digest: ImageDigest,
    bytes_transferred: u64,
}

impl TransferSession {
    pub fn new(resume_offset: u64, metadata: Metadata) -> Self {
        Self {
            resume_offset,
            declared_size: metadata.size,
            declared_digest: metadata.digest,
            bytes_transferred: 0,
        }
    }

    pub fn resume_offset(&self) -> u64 {
        self.resume_offset
    }

    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }

    pub fn declared_digest(&self) -> &ImageDigest {
        &self.declared_digest
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    /// Bytes the local file should hold right now.
    pub fn local_size(&self) -> u64 {
        self.resume_offset + self.bytes_transferred
    }

    /// Bytes still missing before the declared size is reached.
    pub fn remaining(&self) -> u64 {
        self.declared_size.saturating_sub(self.local_size())
    }

    /// Whether the local file must be opened for this session.
    ///
    /// A fresh session (offset 0) always opens it, so the file is created
    /// or truncated even for an empty image. A resumed session skips it
    /// once the local copy already holds at least the declared size.
    pub fn needs_write(&self) -> bool {
        self.resume_offset == 0 || self.resume_offset < self.declared_size
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    /// Accounts for `n` bytes appended to the local file.
    pub(crate) fn record(&mut self, n: u64) {
        self.bytes_transferred += n;
        debug_assert!(self.local_size() <= self.declared_size);
    }
}
