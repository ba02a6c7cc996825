//! Update notifications.
//!
//! The distributor pushes a single framed `UPDATE_AVAILABLE` to every known
//! node; a node's [`NotificationListener`] turns each receipt into an event
//! that starts a new transfer session.

mod listener;
mod notify;

pub use listener::NotificationListener;
pub use notify::{NotifyOutcome, notify_nodes};

use std::time::Duration;

/// Default per-target deadline for connect + send.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors produced while sending or receiving notifications.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out")]
    Timeout,

    #[error("protocol error: {0}")]
    Protocol(#[from] fleetota_protocol::ProtocolError),
}
