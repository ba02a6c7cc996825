//! Wire protocol for fleetota firmware distribution.
//!
//! Control messages are short ASCII payloads carried in length-prefixed
//! frames (see [`wire`]). The image bytes that follow the handshake are
//! streamed raw, without framing.

pub mod error;
pub mod messages;
pub mod types;
pub mod wire;

pub use error::ProtocolError;
pub use messages::{
    ACK_METADATA, Hello, Metadata, MetadataReply, REQUEST_UPDATE, UNAVAILABLE, UPDATE_AVAILABLE,
};
pub use types::{DIGEST_LEN, ImageDigest};

/// Largest control message payload accepted on the wire.
pub const MAX_CONTROL_LEN: usize = 1024;
