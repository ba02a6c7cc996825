//! Control message payloads.
//!
//! ```text
//! HELLO (Initiator -> Source):
//!   "<resume_offset>"                 distributor variant
//!   "<digest>:<received_bytes>"       peer variant
//! METADATA (Source -> Initiator):     "<digest>:<size>" | "UNAVAILABLE"
//! ACK (Initiator -> Source):          "ACK_METADATA"
//! REQUEST (peer variant only):        "REQUEST_UPDATE"
//! NOTIFY (Distributor -> Node):       "UPDATE_AVAILABLE"
//! ```

use crate::{ImageDigest, ProtocolError};

/// Acknowledges that metadata was parsed; the Source may start streaming.
pub const ACK_METADATA: &str = "ACK_METADATA";

/// Peer variant: confirms the transfer should proceed.
pub const REQUEST_UPDATE: &str = "REQUEST_UPDATE";

/// Notification pushed to nodes when a new image is published.
pub const UPDATE_AVAILABLE: &str = "UPDATE_AVAILABLE";

/// Sent instead of metadata when a Source declines to serve.
pub const UNAVAILABLE: &str = "UNAVAILABLE";

/// First message of a session, carrying the Initiator's resume point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hello {
    /// Bare byte offset.
    Resume { offset: u64 },
    /// Peer variant: the Initiator's own partial digest and byte count.
    Peer { digest: ImageDigest, received: u64 },
}

impl Hello {
    /// Byte offset the Source should stream from.
    pub fn resume_offset(&self) -> u64 {
        match self {
            Hello::Resume { offset } => *offset,
            Hello::Peer { received, .. } => *received,
        }
    }

    pub fn is_peer(&self) -> bool {
        matches!(self, Hello::Peer { .. })
    }

    pub fn encode(&self) -> String {
        match self {
            Hello::Resume { offset } => offset.to_string(),
            Hello::Peer { digest, received } => format!("{digest}:{received}"),
        }
    }

    /// Parses either hello form.
    pub fn parse(s: &str) -> Result<Self, ProtocolError> {
        match s.split_once(':') {
            None => Ok(Hello::Resume {
                offset: parse_count(s, "resume offset")?,
            }),
            Some((digest, received)) => Ok(Hello::Peer {
                digest: digest.parse()?,
                received: parse_count(received, "received bytes")?,
            }),
        }
    }
}

/// The Source's description of the image it is about to stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub digest: ImageDigest,
    pub size: u64,
}

impl Metadata {
    pub fn encode(&self) -> String {
        format!("{}:{}", self.digest, self.size)
    }

    pub fn parse(s: &str) -> Result<Self, ProtocolError> {
        let (digest, size) = s
            .split_once(':')
            .ok_or_else(|| ProtocolError::Malformed(format!("metadata missing ':': {s:?}")))?;
        Ok(Self {
            digest: digest.parse()?,
            size: parse_count(size, "image size")?,
        })
    }
}

/// Second message of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataReply {
    Available(Metadata),
    Unavailable,
}

impl MetadataReply {
    pub fn encode(&self) -> String {
        match self {
            MetadataReply::Available(meta) => meta.encode(),
            MetadataReply::Unavailable => UNAVAILABLE.to_string(),
        }
    }

    pub fn parse(s: &str) -> Result<Self, ProtocolError> {
        if s == UNAVAILABLE {
            return Ok(MetadataReply::Unavailable);
        }
        Metadata::parse(s).map(MetadataReply::Available)
    }
}

/// Parses a non-negative decimal byte count (ASCII digits only).
fn parse_count(s: &str, what: &str) -> Result<u64, ProtocolError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::Malformed(format!("invalid {what}: {s:?}")));
    }
    s.parse::<u64>()
        .map_err(|e| ProtocolError::Malformed(format!("invalid {what} {s:?}: {e}")))
}
