//! Role-agnostic session connection.
//!
//! Wraps a byte stream with deadline-bounded control-message I/O. Both the
//! Initiator and the Source drive their half of the handshake through this
//! type, then take the raw stream for the streaming phase.

use std::future::Future;
use std::time::Duration;

use fleetota_protocol::wire::{
    read_control, read_hello, read_metadata_reply, write_control, write_hello,
    write_metadata_reply,
};
use fleetota_protocol::{Hello, MetadataReply, ProtocolError};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::DataChannelError;

pub struct Connection<S> {
    stream: S,
    io_timeout: Option<Duration>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    pub fn new(stream: S, io_timeout: Option<Duration>) -> Self {
        Self { stream, io_timeout }
    }

    pub async fn send_control(&mut self, payload: &str) -> Result<(), DataChannelError> {
        let limit = self.io_timeout;
        bounded(limit, write_control(&mut self.stream, payload)).await
    }

    pub async fn recv_control(&mut self) -> Result<String, DataChannelError> {
        let limit = self.io_timeout;
        bounded(limit, read_control(&mut self.stream)).await
    }

    pub async fn send_hello(&mut self, hello: &Hello) -> Result<(), DataChannelError> {
        let limit = self.io_timeout;
        bounded(limit, write_hello(&mut self.stream, hello)).await
    }

    pub async fn recv_hello(&mut self) -> Result<Hello, DataChannelError> {
        let limit = self.io_timeout;
        bounded(limit, read_hello(&mut self.stream)).await
    }

    pub async fn send_metadata(&mut self, reply: &MetadataReply) -> Result<(), DataChannelError> {
        let limit = self.io_timeout;
        bounded(limit, write_metadata_reply(&mut self.stream, reply)).await
    }

    pub async fn recv_metadata(&mut self) -> Result<MetadataReply, DataChannelError> {
        let limit = self.io_timeout;
        bounded(limit, read_metadata_reply(&mut self.stream)).await
    }

    /// Reads one control message and requires it to equal `token`.
    ///
    /// Any other payload, or a malformed frame, is a `MetadataAckFailure`.
    pub async fn expect_token(&mut self, token: &str) -> Result<(), DataChannelError> {
        let received = match self.recv_control().await {
            Ok(received) => received,
            Err(DataChannelError::ProtocolParse(msg)) => {
                return Err(DataChannelError::MetadataAckFailure(msg));
            }
            Err(e) => return Err(e),
        };
        if received != token {
            warn!(expected = token, %received, "unexpected acknowledgment token");
            return Err(DataChannelError::MetadataAckFailure(format!(
                "expected {token}, got {received:?}"
            )));
        }
        debug!(token, "acknowledgment received");
        Ok(())
    }

    /// The underlying stream, for the raw streaming phase.
    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Closes the write half so the peer sees end-of-stream.
    pub async fn finish(&mut self) -> Result<(), DataChannelError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

async fn bounded<T, F>(limit: Option<Duration>, op: F) -> Result<T, DataChannelError>
where
    F: Future<Output = Result<T, ProtocolError>>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, op).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(DataChannelError::Timeout),
        },
        None => Ok(op.await?),
    }
}
