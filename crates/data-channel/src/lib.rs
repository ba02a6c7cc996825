//! Resumable, digest-verified image transfer over TCP.
//!
//! One protocol, two roles. An [`Initiator`] holds a (possibly partial)
//! local image and asks a [`TransferSource`] for the rest; the Source may be
//! the distributor or any peer node. Each session is a single connection:
//!
//! ```text
//! Initiator                          Source
//!   HELLO  (offset | digest:offset) ->
//!                                   <- METADATA (digest:size | UNAVAILABLE)
//!   ACK_METADATA                    ->
//!   REQUEST_UPDATE (peer only)      ->
//!                                   <- raw bytes offset..size, then close
//! ```
//!
//! See [`fleetota_protocol::wire`] for control-message framing.

pub mod client;
pub mod connection;
pub mod error;
pub mod server;

pub use client::{Initiator, ResumeMode, SourceKind, TransferReport};
pub use connection::Connection;
pub use error::DataChannelError;
pub use server::{ServePolicy, ServeReport, TransferSource};

use std::time::Duration;

use fleetota_transfer::StreamOptions;

/// Timeout for the TCP connection attempt.
pub const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeouts and block size shared by both roles.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub connect_timeout: Duration,
    pub stream: StreamOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: TCP_CONNECT_TIMEOUT,
            stream: StreamOptions::default(),
        }
    }
}
